//! Runs one configuration end to end:
//! `Parsed -> DataLoaded -> Trained -> AccuraciesSaved`.
//!
//! Any failure ends the run; artifacts already written are left in place.

use crate::artifacts::save_accuracies;
use crate::config::Configuration;
use crate::error::Result;
use crate::graph::data::{load_data, GraphData};
use crate::graph::train::{train, Trained};
use burn::tensor::backend::AutodiffBackend;
use tracing::{info, info_span};

pub fn run<B: AutodiffBackend>(config: &Configuration, device: B::Device) -> Result<Trained<B>> {
    let _span = info_span!(
        "run",
        model = %config.model_type,
        features = %config.node_features
    )
    .entered();

    let data = load_data(
        &config.data,
        &config.node_features,
        config.embedding_file.as_deref(),
        config.seed,
    )?;
    info!("data loaded from {}", config.data.display());

    train_and_save_gnn(&data, config, device)
}

/// The trainer saves the model itself, so only the accuracies are written here.
pub fn train_and_save_gnn<B: AutodiffBackend>(
    data: &GraphData,
    config: &Configuration,
    device: B::Device,
) -> Result<Trained<B>> {
    let trained = train::<B>(data, config, device)?;

    let path = save_accuracies(config, &trained.validation_accuracies)?;
    info!(
        "saved {} validation accuracies to {}",
        trained.validation_accuracies.len(),
        path.display()
    );

    Ok(trained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{accuracies_path, model_path};
    use crate::error::GnnError;
    use crate::graph::dataset::tests::write_cora;
    use burn::backend::{Autodiff, NdArray};
    use clap::Parser;
    use std::fs;
    use std::path::Path;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn parse(dir: &Path, args: &[&str]) -> std::result::Result<Configuration, clap::Error> {
        let data = dir.join("cora");
        let models = dir.join("models");
        let validation = dir.join("validation");
        let mut argv: Vec<String> = vec![
            "gnn".into(),
            "--data".into(),
            data.display().to_string(),
            "--models-dir".into(),
            models.display().to_string(),
            "--validation-dir".into(),
            validation.display().to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        Configuration::try_parse_from(argv)
    }

    #[test]
    fn run_writes_both_artifacts_under_one_name() {
        let dir = tempfile::tempdir().unwrap();
        write_cora(dir.path());
        let config = parse(dir.path(), &["-e", "4", "--hidden-dim", "8"]).unwrap();

        let trained = run::<TestBackend>(&config, Default::default()).unwrap();

        let model_file = model_path(&config);
        let accuracy_file = accuracies_path(&config);
        assert!(model_file.is_file());
        assert_eq!(
            model_file.file_name().unwrap(),
            "adj__GCN_4_2_8_0.2.mpk"
        );
        assert_eq!(
            accuracy_file.file_name().unwrap(),
            "adj__GCN_4_2_8_0.2.json"
        );

        let saved: Vec<f64> = serde_json::from_slice(&fs::read(accuracy_file).unwrap()).unwrap();
        assert_eq!(saved, trained.validation_accuracies);
        assert_eq!(saved.len(), 4);
    }

    #[test]
    fn rerunning_overwrites_previous_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_cora(dir.path());

        let config = parse(dir.path(), &["-e", "3", "--hidden-dim", "8"]).unwrap();
        run::<TestBackend>(&config, Default::default()).unwrap();
        run::<TestBackend>(&config, Default::default()).unwrap();

        assert_eq!(fs::read_dir(dir.path().join("validation")).unwrap().count(), 1);
    }

    #[test]
    fn unknown_flag_stops_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        write_cora(dir.path());

        assert!(parse(dir.path(), &["--num-epochs", "3"]).is_err());
        assert!(!dir.path().join("models").exists());
        assert!(!dir.path().join("validation").exists());
    }

    #[test]
    fn missing_dataset_fails_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse(dir.path(), &["-e", "2"]).unwrap();

        let err = run::<TestBackend>(&config, Default::default()).err().unwrap();
        assert!(matches!(err, GnnError::Io { .. }));
        assert!(!dir.path().join("models").exists());
        assert!(!dir.path().join("validation").exists());
    }
}
