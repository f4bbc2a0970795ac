use crate::optim::{OptimizerArgs, MODELS_DIR, VALIDATION_DIR};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Single-dash spellings longer than one letter; clap cannot declare these,
/// so they are rewritten to the long flag before parsing.
const MULTI_LETTER_SHORTS: [(&str, &str); 4] = [
    ("-nf", "--node-features"),
    ("-ef", "--embedding-file"),
    ("-nl", "--num-layers"),
    ("-hd", "--hidden-dim"),
];

/// Hyperparameters and locations for a single training run.
///
/// Parsed once from the command line and only read afterwards. Both the
/// `--kebab-case` and the older `--snake_case` flag spellings are accepted,
/// as are `-nf`, `-ef`, `-nl` and `-hd` when parsed through [`Configuration::parse_args`].
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "gnn", version, about = "Train a graph neural network and record its validation accuracy.")]
pub struct Configuration {
    /// Type of node features: adjacency, embedding, content or identity
    #[arg(long = "node-features", visible_alias = "node_features", default_value = "adjacency")]
    pub node_features: String,

    /// File with node2vec embeddings
    #[arg(long = "embedding-file", visible_alias = "embedding_file")]
    pub embedding_file: Option<PathBuf>,

    /// Type of GNN model: GCN, GraphSage, GAT or GIN
    #[arg(short = 'm', long = "model-type", visible_alias = "model_type", default_value = "GCN")]
    pub model_type: String,

    /// Number of training epochs
    #[arg(short = 'e', long, default_value_t = 500)]
    pub epochs: usize,

    /// Number of graph conv layers
    #[arg(long = "num-layers", visible_alias = "num_layers", default_value_t = 2)]
    pub num_layers: usize,

    /// Training hidden size
    #[arg(long = "hidden-dim", visible_alias = "hidden_dim", default_value_t = 64)]
    pub hidden_dim: usize,

    /// Dropout rate
    #[arg(short = 'd', long, default_value_t = 0.2)]
    pub dropout: f64,

    #[command(flatten)]
    pub optimizer: OptimizerArgs,

    /// Dataset path prefix; `<prefix>.content` and `<prefix>.cites` are read
    #[arg(long, default_value = "data/cora")]
    pub data: PathBuf,

    /// Seed for parameter initialisation and the node split
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long = "models-dir", default_value = MODELS_DIR)]
    pub models_dir: PathBuf,

    #[arg(long = "validation-dir", default_value = VALIDATION_DIR)]
    pub validation_dir: PathBuf,
}

impl Configuration {
    /// Like [`Parser::parse_from`], also accepting the multi-letter short flags.
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }
}

/// Rewrites `-nf value` and `-nf=value` (and the other multi-letter shorts)
/// to their long flags. Arguments after `--` are left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut positional = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if positional {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                positional = true;
                return arg;
            }
            for (short, long) in MULTI_LETTER_SHORTS {
                if text == short {
                    return OsString::from(long);
                }
                if let Some(value) = text.strip_prefix(short).and_then(|rest| rest.strip_prefix('=')) {
                    return OsString::from(format!("{long}={value}"));
                }
            }
            arg
        })
        .collect()
}

impl Default for Configuration {
    fn default() -> Self {
        Self::parse_from(["gnn"])
    }
}
