//! Names and writes the artifacts of a run.
//!
//! The model and the validation accuracies of one configuration share a base
//! name, [`save_name`], in their respective directories. Nothing else links
//! them, so the name must be derived identically for both.

use crate::config::Configuration;
use crate::error::{GnnError, Result};
use crate::graph::model::GNN;
use crate::graph::train::TrainingConfig;
use burn::prelude::*;
use burn::record::CompactRecorder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MODEL_EXTENSION: &str = "mpk";
pub const ACCURACY_EXTENSION: &str = "json";
const SEPARATOR: &str = "_";

/// `adj__GCN_500_2_64_0.2` for the default configuration.
pub fn save_name(config: &Configuration) -> String {
    let feature: String = config.node_features.chars().take(3).collect();

    [
        feature,
        embedding_segment(config),
        config.model_type.clone(),
        config.epochs.to_string(),
        config.num_layers.to_string(),
        config.hidden_dim.to_string(),
        float_text(config.dropout),
    ]
    .join(SEPARATOR)
}

/// Shortest round-trip text of `value` with a two-digit signed exponent
/// when one is needed: `0.2`, `1.0`, `1e-05`, `1.5e+16`.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// Basename of the embedding file without its first and last four characters.
fn embedding_segment(config: &Configuration) -> String {
    let file = match (config.node_features.as_str(), &config.embedding_file) {
        ("embedding", Some(file)) => file,
        _ => return String::new(),
    };

    let basename: Vec<char> = file
        .file_name()
        .map(|name| name.to_string_lossy().chars().collect())
        .unwrap_or_default();

    if basename.len() <= 8 {
        return String::new();
    }
    basename[4..basename.len() - 4].iter().collect()
}

/// Creates `path` and its parents; an existing directory is fine.
pub fn make_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| GnnError::io(path, e))
}

pub fn model_path(config: &Configuration) -> PathBuf {
    config
        .models_dir
        .join(format!("{}.{}", save_name(config), MODEL_EXTENSION))
}

pub fn accuracies_path(config: &Configuration) -> PathBuf {
    config
        .validation_dir
        .join(format!("{}.{}", save_name(config), ACCURACY_EXTENSION))
}

/// Writes the model record, replacing any earlier one for the same configuration.
pub fn save_model<B: Backend>(config: &Configuration, model: &GNN<B>) -> Result<PathBuf> {
    make_dir(&config.models_dir)?;
    let path = model_path(config);

    model
        .clone()
        .save_file(path.clone(), &CompactRecorder::new())
        .map_err(|e| GnnError::Record {
            path: path.clone(),
            reason: format!("{e:?}"),
        })?;

    debug!("saved model to {}", path.display());
    Ok(path)
}

/// Writes the accuracy history as a JSON array, replacing any earlier one.
pub fn save_accuracies(config: &Configuration, validation_accuracies: &[f64]) -> Result<PathBuf> {
    make_dir(&config.validation_dir)?;
    let path = accuracies_path(config);

    let json = serde_json::to_vec(validation_accuracies).map_err(|source| GnnError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|e| GnnError::io(&path, e))?;

    debug!("saved {} accuracies to {}", validation_accuracies.len(), path.display());
    Ok(path)
}

/// Stores the model hyperparameters next to the model so it can be rebuilt.
pub fn save_training_config(config: &Configuration, training_config: &TrainingConfig) -> Result<PathBuf> {
    make_dir(&config.models_dir)?;
    let path = config
        .models_dir
        .join(format!("{}.json", save_name(config)));

    training_config
        .save(&path)
        .map_err(|e| GnnError::io(&path, e))?;
    Ok(path)
}
