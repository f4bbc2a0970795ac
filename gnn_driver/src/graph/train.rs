use crate::artifacts::{save_model, save_training_config};
use crate::config::Configuration;
use crate::error::{GnnError, Result as GnnResult};
use crate::graph::data::{GraphBatch, GraphData, GraphDataBatcher, Split};
use crate::graph::evaluate::evaluate;
use crate::graph::model::{GNNConfig, ModelKind, GNN};
use crate::optim::{LrSchedule, OptimizerKind};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, info};

const LOG_EVERY: usize = 10;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub gnn_model: GNNConfig,
    pub optimizer: String,
    pub scheduler: String,
    pub learning_rate: f64,
    pub weight_decay: f64,
    #[config(default = 500)]
    pub num_epochs: usize,
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    pub fn from_run(config: &Configuration, data: &GraphData) -> GnnResult<Self> {
        let model: ModelKind = config.model_type.parse()?;
        if !(0.0..=1.0).contains(&config.dropout) {
            return Err(GnnError::InvalidDropout(config.dropout));
        }
        let gnn_model = GNNConfig::new(model, data.feature_dim, config.hidden_dim, data.num_classes)
            .with_num_layers(config.num_layers)
            .with_dropout(config.dropout);

        Ok(TrainingConfig::new(
            gnn_model,
            config.optimizer.opt.clone(),
            config.optimizer.opt_scheduler.clone(),
            config.optimizer.lr,
            config.optimizer.weight_decay,
        )
        .with_num_epochs(config.epochs)
        .with_seed(config.seed))
    }
}

/// Result of a training run; the model is the one with the best validation accuracy.
pub struct Trained<B: AutodiffBackend> {
    pub graph: GraphBatch<B::InnerBackend>,
    pub model: GNN<B::InnerBackend>,
    /// One entry per epoch, in order.
    pub validation_accuracies: Vec<f64>,
}

/// Full-batch training. The best model so far is written with [`save_model`]
/// whenever validation accuracy improves.
pub fn train<B: AutodiffBackend>(
    data: &GraphData,
    config: &Configuration,
    device: B::Device,
) -> GnnResult<Trained<B>> {
    let optimizer = config.optimizer.kind()?;
    let schedule = config.optimizer.schedule(config.epochs)?;
    let training_config = TrainingConfig::from_run(config, data)?;

    B::seed(training_config.seed);

    let batcher_train = GraphDataBatcher::<B>::new(device.clone());
    let batcher_valid = GraphDataBatcher::<B::InnerBackend>::new(device.clone());
    let graph_train = batcher_train.batch(data);
    let graph_valid = batcher_valid.batch(data);

    let model = training_config.gnn_model.init::<B>(&device);
    info!(
        "training {:?} with {} layers for {} epochs ({} optimizer, lr {})",
        training_config.gnn_model.model,
        model.num_layers(),
        training_config.num_epochs,
        training_config.optimizer,
        training_config.learning_rate
    );

    let run = Fit {
        config,
        schedule,
        graph_train: &graph_train,
        graph_valid: &graph_valid,
    };
    let (model, validation_accuracies) = match optimizer {
        OptimizerKind::Adam => run.fit(model, config.optimizer.adam_config().init()),
        OptimizerKind::Sgd => run.fit(model, config.optimizer.sgd_config().init()),
        OptimizerKind::RmsProp => run.fit(model, config.optimizer.rmsprop_config().init()),
        OptimizerKind::AdaGrad => run.fit(model, config.optimizer.adagrad_config().init()),
    }?;
    save_training_config(config, &training_config)?;

    let test_accuracy = evaluate(&model, &graph_valid, Split::Test);
    info!("test accuracy of the best model: {:.4}", test_accuracy);

    Ok(Trained {
        graph: graph_valid,
        model,
        validation_accuracies,
    })
}

struct Fit<'a, B: AutodiffBackend> {
    config: &'a Configuration,
    schedule: LrSchedule,
    graph_train: &'a GraphBatch<B>,
    graph_valid: &'a GraphBatch<B::InnerBackend>,
}

impl<B: AutodiffBackend> Fit<'_, B> {
    fn fit<O>(&self, mut model: GNN<B>, mut optim: O) -> GnnResult<(GNN<B::InnerBackend>, Vec<f64>)>
    where
        O: Optimizer<GNN<B>, B>,
    {
        let epochs = self.config.epochs;
        let mut validation_accuracies = Vec::with_capacity(epochs);
        let mut best: Option<(f64, GNN<B::InnerBackend>)> = None;

        for epoch in 0..epochs {
            let lr = self.schedule.lr(epoch);

            let output = model.forward_classification(self.graph_train, Split::Train);
            let loss: f64 = output.loss.clone().into_scalar().elem();
            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(lr, model, grads);

            let valid_model = model.valid();
            let accuracy = evaluate(&valid_model, self.graph_valid, Split::Valid);
            validation_accuracies.push(accuracy);

            debug!(epoch = epoch + 1, loss, accuracy, lr, "epoch done");
            if (epoch + 1) % LOG_EVERY == 0 {
                info!(
                    "epoch {}/{}: loss {:.4}, validation accuracy {:.4}",
                    epoch + 1,
                    epochs,
                    loss,
                    accuracy
                );
            }

            if best.as_ref().map_or(true, |(best_accuracy, _)| accuracy > *best_accuracy) {
                let path = save_model(self.config, &valid_model)?;
                debug!("validation accuracy {:.4}, saved {}", accuracy, path.display());
                best = Some((accuracy, valid_model));
            }
        }

        let model = match best {
            Some((accuracy, model)) => {
                info!("best validation accuracy: {:.4}", accuracy);
                model
            }
            None => {
                let model = model.valid();
                save_model(self.config, &model)?;
                model
            }
        };

        Ok((model, validation_accuracies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{model_path, save_name};
    use crate::graph::data::load_data;
    use crate::graph::dataset::tests::write_cora;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn configuration(dir: &std::path::Path, args: &[&str]) -> Configuration {
        let mut argv = vec!["gnn", "--hidden-dim", "8"];
        argv.extend_from_slice(args);
        let mut config = <Configuration as clap::Parser>::parse_from(argv);
        config.models_dir = dir.join("models");
        config.validation_dir = dir.join("validation");
        config
    }

    #[test]
    fn records_one_accuracy_per_epoch_and_saves_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let data = load_data(&write_cora(dir.path()), "content", None, 3).unwrap();
        let config = configuration(dir.path(), &["--epochs", "5"]);

        let trained = train::<TestBackend>(&data, &config, Default::default()).unwrap();

        assert_eq!(trained.validation_accuracies.len(), 5);
        assert!(trained
            .validation_accuracies
            .iter()
            .all(|a| (0.0..=1.0).contains(a)));
        assert!(model_path(&config).is_file());
        assert!(dir
            .path()
            .join("models")
            .join(format!("{}.json", save_name(&config)))
            .is_file());
        assert_eq!(trained.model.num_layers(), 2);
    }

    #[test]
    fn every_optimizer_and_scheduler_trains() {
        let dir = tempfile::tempdir().unwrap();
        let data = load_data(&write_cora(dir.path()), "identity", None, 3).unwrap();

        for (opt, scheduler, model) in [
            ("sgd", "step", "GraphSage"),
            ("rmsprop", "cos", "GAT"),
            ("adagrad", "none", "GIN"),
        ] {
            let config = configuration(
                dir.path(),
                &["--epochs", "2", "--opt", opt, "--opt-scheduler", scheduler, "-m", model, "--weight-decay", "0.001"],
            );
            let trained = train::<TestBackend>(&data, &config, Default::default()).unwrap();
            assert_eq!(trained.validation_accuracies.len(), 2, "{opt}/{scheduler}/{model}");
        }
    }

    #[test]
    fn zero_epochs_still_saves_a_model() {
        let dir = tempfile::tempdir().unwrap();
        let data = load_data(&write_cora(dir.path()), "content", None, 3).unwrap();
        let config = configuration(dir.path(), &["--epochs", "0"]);

        let trained = train::<TestBackend>(&data, &config, Default::default()).unwrap();
        assert!(trained.validation_accuracies.is_empty());
        assert!(model_path(&config).is_file());
    }

    #[test]
    fn bad_settings_fail_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let data = load_data(&write_cora(dir.path()), "content", None, 3).unwrap();

        let config = configuration(dir.path(), &["-m", "MPNN"]);
        assert!(train::<TestBackend>(&data, &config, Default::default()).is_err());

        let config = configuration(dir.path(), &["--opt", "lbfgs"]);
        assert!(train::<TestBackend>(&data, &config, Default::default()).is_err());

        for dropout in ["--dropout=1.5", "--dropout=-0.1", "--dropout=NaN"] {
            let config = configuration(dir.path(), &["-e", "2", dropout]);
            let err = train::<TestBackend>(&data, &config, Default::default()).err().unwrap();
            assert!(matches!(err, GnnError::InvalidDropout(_)), "{dropout}");
        }

        assert!(!dir.path().join("models").exists());
    }
}
