use crate::graph::data::{GraphBatch, Split};
use crate::graph::model::GNN;
use burn::prelude::*;

/// Fraction of rows whose arg-max matches the target. Empty input scores 0.
pub fn accuracy<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [rows, _] = output.dims();
    if rows == 0 {
        return 0.0;
    }

    let predictions = output.argmax(1).reshape([rows]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as f64 / rows as f64
}

/// Accuracy of `model` on the nodes of `split`.
pub fn evaluate<B: Backend>(model: &GNN<B>, graph: &GraphBatch<B>, split: Split) -> f64 {
    if graph.node_count(split) == 0 {
        return 0.0;
    }
    let output = model.forward_classification(graph, split);
    accuracy(output.output, output.targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn counts_matching_arg_max() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 2>::from_data(
            [[0.9, 0.1], [0.2, 0.8], [0.7, 0.3], [0.4, 0.6]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data([0, 1, 1, 0], &device);

        assert_eq!(accuracy(output, targets), 0.5);
    }

    #[test]
    fn empty_split_scores_zero() {
        let device = Default::default();
        let output = Tensor::<TestBackend, 2>::zeros([0, 3], &device);
        let targets = Tensor::<TestBackend, 1, Int>::zeros([0], &device);

        assert_eq!(accuracy(output, targets), 0.0);
    }
}
