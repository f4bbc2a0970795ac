use crate::error::{GnnError, Result as GnnResult};
use crate::graph::data::{GraphBatch, Split};
use burn::module::Param;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, relu, softmax};
use burn::train::ClassificationOutput;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const ATTENTION_SLOPE: f64 = 0.2;
const MASKED_SCORE: f32 = -1.0e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Gcn,
    GraphSage,
    Gat,
    Gin,
}

impl FromStr for ModelKind {
    type Err = GnnError;

    fn from_str(s: &str) -> GnnResult<Self> {
        match s {
            "GCN" => Ok(ModelKind::Gcn),
            "GraphSage" => Ok(ModelKind::GraphSage),
            "GAT" => Ok(ModelKind::Gat),
            "GIN" => Ok(ModelKind::Gin),
            other => Err(GnnError::UnknownModel(other.to_string())),
        }
    }
}

/// Stacked graph convolutions followed by a linear node classifier.
#[derive(Module, Debug)]
pub struct GNN<B: Backend> {
    convs: Vec<GraphConv<B>>,
    dropout: Dropout,
    output_linear: Linear<B>,
}

impl<B: Backend> GNN<B> {
    /// Class logits for every node, `[nodes, classes]`.
    pub fn forward(&self, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        let mut x = graph.features.clone();

        for conv in &self.convs {
            x = conv.forward(x, graph);
            x = relu(x);
            x = self.dropout.forward(x);
        }

        self.output_linear.forward(x)
    }

    /// Cross entropy over the nodes of one split.
    pub fn forward_classification(
        &self,
        graph: &GraphBatch<B>,
        split: Split,
    ) -> ClassificationOutput<B> {
        let nodes = graph.nodes(split);
        let output = self.forward(graph).select(0, nodes.clone());
        let targets = graph.targets.clone().select(0, nodes);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }

    pub fn num_layers(&self) -> usize {
        self.convs.len()
    }
}

#[derive(Module, Debug)]
pub enum GraphConv<B: Backend> {
    Gcn(GcnConv<B>),
    Sage(SageConv<B>),
    Gat(GatConv<B>),
    Gin(GinConv<B>),
}

impl<B: Backend> GraphConv<B> {
    pub fn forward(&self, x: Tensor<B, 2>, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        match self {
            GraphConv::Gcn(conv) => conv.forward(x, graph),
            GraphConv::Sage(conv) => conv.forward(x, graph),
            GraphConv::Gat(conv) => conv.forward(x, graph),
            GraphConv::Gin(conv) => conv.forward(x, graph),
        }
    }
}

/// `Â X W + b` with the symmetric normalised adjacency.
#[derive(Module, Debug)]
pub struct GcnConv<B: Backend> {
    linear: Linear<B>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> GcnConv<B> {
    pub fn forward(&self, x: Tensor<B, 2>, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        graph.normalized_adjacency.clone().matmul(x) + self.bias.val().unsqueeze()
    }
}

/// Mean aggregator: `X W_self + mean(N(x)) W_neigh`.
#[derive(Module, Debug)]
pub struct SageConv<B: Backend> {
    self_linear: Linear<B>,
    neighbour_linear: Linear<B>,
}

impl<B: Backend> SageConv<B> {
    pub fn forward(&self, x: Tensor<B, 2>, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        let neighbours = graph
            .mean_adjacency
            .clone()
            .matmul(self.neighbour_linear.forward(x.clone()));
        self.self_linear.forward(x) + neighbours
    }
}

/// Single head attention restricted to neighbours and the node itself.
#[derive(Module, Debug)]
pub struct GatConv<B: Backend> {
    linear: Linear<B>,
    attention_src: Linear<B>,
    attention_dst: Linear<B>,
    bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> GatConv<B> {
    pub fn forward(&self, x: Tensor<B, 2>, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        let h = self.linear.forward(x);

        let src = self.attention_src.forward(h.clone());
        let dst = self.attention_dst.forward(h.clone()).transpose();
        let scores = leaky_relu(src + dst, ATTENTION_SLOPE)
            .mask_fill(graph.attention_mask.clone(), MASKED_SCORE);
        let alpha = softmax(scores, 1);

        alpha.matmul(h) + self.bias.val().unsqueeze()
    }
}

/// `MLP((A + I) X)`, the sum aggregator with epsilon fixed at zero.
#[derive(Module, Debug)]
pub struct GinConv<B: Backend> {
    mlp: MLP<B>,
}

impl<B: Backend> GinConv<B> {
    pub fn forward(&self, x: Tensor<B, 2>, graph: &GraphBatch<B>) -> Tensor<B, 2> {
        self.mlp.forward(graph.adjacency.clone().matmul(x))
    }
}

#[derive(Config, Debug)]
pub struct GNNConfig {
    pub model: ModelKind,
    pub input_size: usize,
    pub hidden_size: usize,
    pub class_num: usize,
    #[config(default = 2)]
    pub num_layers: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl GNNConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GNN<B> {
        let convs: Vec<GraphConv<B>> = (0..self.num_layers)
            .map(|layer| {
                let input_size = if layer == 0 {
                    self.input_size
                } else {
                    self.hidden_size
                };
                self.init_conv::<B>(input_size, device)
            })
            .collect();

        let classifier_input = if self.num_layers == 0 {
            self.input_size
        } else {
            self.hidden_size
        };

        GNN {
            convs,
            dropout: DropoutConfig::new(self.dropout).init(),
            output_linear: LinearConfig::new(classifier_input, self.class_num).init(device),
        }
    }

    fn init_conv<B: Backend>(&self, input_size: usize, device: &B::Device) -> GraphConv<B> {
        let hidden = self.hidden_size;
        let projection = || -> Linear<B> {
            LinearConfig::new(input_size, hidden)
                .with_bias(false)
                .init(device)
        };
        let bias = || -> Param<Tensor<B, 1>> { Param::from_tensor(Tensor::zeros([hidden], device)) };

        match self.model {
            ModelKind::Gcn => GraphConv::Gcn(GcnConv {
                linear: projection(),
                bias: bias(),
            }),
            ModelKind::GraphSage => GraphConv::Sage(SageConv {
                self_linear: LinearConfig::new(input_size, hidden).init(device),
                neighbour_linear: projection(),
            }),
            ModelKind::Gat => GraphConv::Gat(GatConv {
                linear: projection(),
                attention_src: LinearConfig::new(hidden, 1).with_bias(false).init(device),
                attention_dst: LinearConfig::new(hidden, 1).with_bias(false).init(device),
                bias: bias(),
            }),
            ModelKind::Gin => GraphConv::Gin(GinConv {
                mlp: MLPConfig::new(hidden, input_size, hidden).init(device),
            }),
        }
    }
}

#[derive(Module, Debug)]
pub struct MLP<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
}

impl<B: Backend> MLP<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear1.forward(input);
        let x = relu(x);
        self.linear2.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct MLPConfig {
    hidden_size: usize,
    input_size: usize,
    output_size: usize,
}

impl MLPConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MLP<B> {
        MLP {
            linear1: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, self.output_size).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::data::{load_data, GraphDataBatcher};
    use crate::graph::dataset::tests::write_cora;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn batch() -> GraphBatch<TestBackend> {
        let dir = tempfile::tempdir().unwrap();
        let data = load_data(&write_cora(dir.path()), "content", None, 1).unwrap();
        GraphDataBatcher::<TestBackend>::new(Default::default()).batch(&data)
    }

    #[test]
    fn model_names() {
        assert_eq!("GCN".parse::<ModelKind>().unwrap(), ModelKind::Gcn);
        assert_eq!("GraphSage".parse::<ModelKind>().unwrap(), ModelKind::GraphSage);
        assert_eq!("GAT".parse::<ModelKind>().unwrap(), ModelKind::Gat);
        assert_eq!("GIN".parse::<ModelKind>().unwrap(), ModelKind::Gin);
        assert!(matches!(
            "gcn".parse::<ModelKind>(),
            Err(GnnError::UnknownModel(_))
        ));
    }

    #[test]
    fn every_model_produces_class_logits() {
        let graph = batch();
        let device = Default::default();

        for model in [ModelKind::Gcn, ModelKind::GraphSage, ModelKind::Gat, ModelKind::Gin] {
            let gnn = GNNConfig::new(model, 4, 8, 3)
                .with_num_layers(3)
                .init::<TestBackend>(&device);

            assert_eq!(gnn.num_layers(), 3);
            let logits = gnn.forward(&graph);
            assert_eq!(logits.dims(), [6, 3], "{model:?}");

            let values: Vec<f32> = logits.into_data().to_vec().unwrap();
            assert!(values.iter().all(|v| v.is_finite()), "{model:?}");
        }
    }

    #[test]
    fn zero_layers_is_a_linear_classifier() {
        let graph = batch();
        let gnn = GNNConfig::new(ModelKind::Gcn, 4, 8, 3)
            .with_num_layers(0)
            .init::<TestBackend>(&Default::default());

        assert_eq!(gnn.num_layers(), 0);
        assert_eq!(gnn.forward(&graph).dims(), [6, 3]);
    }

    #[test]
    fn classification_covers_the_split() {
        let graph = batch();
        let gnn = GNNConfig::new(ModelKind::GraphSage, 4, 8, 3).init::<TestBackend>(&Default::default());

        let output = gnn.forward_classification(&graph, Split::Train);
        let train_len = graph.node_count(Split::Train);
        assert_eq!(output.output.dims(), [train_len, 3]);
        assert_eq!(output.targets.dims(), [train_len]);

        let loss: f32 = output.loss.into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0);
    }
}
