use crate::error::{GnnError, Result};
use crate::graph::dataset::{read_embeddings, RawGraph};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

const TRAIN_FRACTION: f64 = 0.6;
const VALID_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Each node is described by its row of the adjacency matrix.
    Adjacency,
    /// Pre-trained node2vec vectors.
    Embedding,
    /// The feature columns shipped with the dataset.
    Content,
    /// One-hot node index.
    Identity,
}

impl FromStr for FeatureKind {
    type Err = GnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adjacency" => Ok(FeatureKind::Adjacency),
            "embedding" => Ok(FeatureKind::Embedding),
            "content" => Ok(FeatureKind::Content),
            "identity" => Ok(FeatureKind::Identity),
            other => Err(GnnError::UnknownFeature(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
    pub test: Vec<usize>,
}

impl NodeSplit {
    pub fn random(num_nodes: usize, seed: u64) -> Self {
        let mut nodes: Vec<usize> = (0..num_nodes).collect();
        nodes.shuffle(&mut StdRng::seed_from_u64(seed));

        let train_len = (num_nodes as f64 * TRAIN_FRACTION).round() as usize;
        let valid_len = ((num_nodes as f64 * VALID_FRACTION).round() as usize)
            .min(num_nodes - train_len);

        let test = nodes.split_off(train_len + valid_len);
        let valid = nodes.split_off(train_len);

        NodeSplit {
            train: nodes,
            valid,
            test,
        }
    }
}

/// A node classification dataset held in host memory.
#[derive(Debug, Clone)]
pub struct GraphData {
    pub features: Vec<f32>,
    pub feature_dim: usize,
    pub labels: Vec<usize>,
    pub num_classes: usize,
    pub split: NodeSplit,
    node_neighbour_map: Vec<HashSet<usize>>,
}

/// Loads the dataset at `data` and builds the requested node features.
pub fn load_data(
    data: &Path,
    node_features: &str,
    embedding_file: Option<&Path>,
    seed: u64,
) -> Result<GraphData> {
    let kind: FeatureKind = node_features.parse()?;
    let raw = RawGraph::open(data)?;
    if raw.num_nodes() == 0 {
        return Err(GnnError::EmptyGraph(data.to_path_buf()));
    }
    GraphData::from_raw(raw, kind, embedding_file, seed)
}

impl GraphData {
    pub fn from_raw(
        raw: RawGraph,
        kind: FeatureKind,
        embedding_file: Option<&Path>,
        seed: u64,
    ) -> Result<Self> {
        let node_len = raw.num_nodes();
        let node_neighbour_map = raw.neighbours();

        let (features, feature_dim) = match kind {
            FeatureKind::Adjacency => (dense(&node_neighbour_map, |_, _| 1.0, |_| 0.0), node_len),
            FeatureKind::Identity => {
                let mut features = vec![0.0f32; node_len * node_len];
                features
                    .par_chunks_mut(node_len)
                    .enumerate()
                    .for_each(|(idx, row)| row[idx] = 1.0);
                (features, node_len)
            }
            FeatureKind::Content => {
                let dim = raw.content_dim();
                (raw.content.concat(), dim)
            }
            FeatureKind::Embedding => {
                let path = embedding_file.ok_or(GnnError::MissingEmbeddingFile)?;
                read_embeddings(path, &raw.node_ids)?
            }
        };

        info!(
            "graph: {} nodes, {} edges, {} classes, {:?} features of width {}",
            node_len,
            raw.edges.len(),
            raw.num_classes(),
            kind,
            feature_dim
        );

        Ok(GraphData {
            features,
            feature_dim,
            num_classes: raw.num_classes(),
            labels: raw.targets,
            split: NodeSplit::random(node_len, seed),
            node_neighbour_map,
        })
    }

    pub fn get_node_len(&self) -> usize {
        self.labels.len()
    }

    /// `D^-1/2 (A + I) D^-1/2` with degrees counted after adding self loops.
    pub fn normalized_adjacency(&self) -> Vec<f32> {
        let inv_sqrt: Vec<f32> = self
            .node_neighbour_map
            .iter()
            .map(|n| 1.0 / ((n.len() + 1) as f32).sqrt())
            .collect();
        dense(
            &self.node_neighbour_map,
            |i, j| inv_sqrt[i] * inv_sqrt[j],
            |i| inv_sqrt[i] * inv_sqrt[i],
        )
    }

    /// `D^-1 A`; isolated nodes get an all-zero row.
    pub fn mean_adjacency(&self) -> Vec<f32> {
        dense(
            &self.node_neighbour_map,
            |i, _| 1.0 / self.node_neighbour_map[i].len() as f32,
            |_| 0.0,
        )
    }

    /// `A + I` as 0/1 entries.
    pub fn adjacency_with_self_loops(&self) -> Vec<f32> {
        dense(&self.node_neighbour_map, |_, _| 1.0, |_| 1.0)
    }
}

/// Row-major `[n, n]` matrix with `weight(i, j)` on every edge and `diagonal(i)` on the diagonal.
fn dense(
    node_neighbour_map: &[HashSet<usize>],
    weight: impl Fn(usize, usize) -> f32 + Sync,
    diagonal: impl Fn(usize) -> f32 + Sync,
) -> Vec<f32> {
    let node_len = node_neighbour_map.len();
    let mut matrix = vec![0.0f32; node_len * node_len];
    if node_len == 0 {
        return matrix;
    }

    matrix
        .par_chunks_mut(node_len)
        .enumerate()
        .for_each(|(i, row)| {
            row[i] = diagonal(i);
            for &j in &node_neighbour_map[i] {
                row[j] = weight(i, j);
            }
        });
    matrix
}

/// [`GraphData`] materialised as tensors on one backend.
#[derive(Clone, Debug)]
pub struct GraphBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
    pub normalized_adjacency: Tensor<B, 2>,
    pub mean_adjacency: Tensor<B, 2>,
    /// `A + I`.
    pub adjacency: Tensor<B, 2>,
    /// `true` where attention must not flow: pairs that are neither neighbours nor the same node.
    pub attention_mask: Tensor<B, 2, Bool>,
    pub train_nodes: Tensor<B, 1, Int>,
    pub valid_nodes: Tensor<B, 1, Int>,
    pub test_nodes: Tensor<B, 1, Int>,
}

impl<B: Backend> GraphBatch<B> {
    pub fn nodes(&self, split: Split) -> Tensor<B, 1, Int> {
        match split {
            Split::Train => self.train_nodes.clone(),
            Split::Valid => self.valid_nodes.clone(),
            Split::Test => self.test_nodes.clone(),
        }
    }

    pub fn node_count(&self, split: Split) -> usize {
        self.nodes(split).dims()[0]
    }
}

#[derive(Clone)]
pub struct GraphDataBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> GraphDataBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, data: &GraphData) -> GraphBatch<B> {
        let node_len = data.get_node_len();

        let square = |values: Vec<f32>| -> Tensor<B, 2> {
            Tensor::from_data(TensorData::new(values, [node_len, node_len]), &self.device)
        };
        let index = |nodes: &[usize]| -> Tensor<B, 1, Int> {
            let nodes: Vec<i64> = nodes.iter().map(|&n| n as i64).collect();
            let len = nodes.len();
            Tensor::from_data(TensorData::new(nodes, [len]), &self.device)
        };

        let features = Tensor::from_data(
            TensorData::new(data.features.clone(), [node_len, data.feature_dim]),
            &self.device,
        );
        let targets = index(&data.labels);
        let adjacency = square(data.adjacency_with_self_loops());
        let attention_mask = adjacency.clone().equal_elem(0.0);

        GraphBatch {
            features,
            targets,
            normalized_adjacency: square(data.normalized_adjacency()),
            mean_adjacency: square(data.mean_adjacency()),
            adjacency,
            attention_mask,
            train_nodes: index(&data.split.train),
            valid_nodes: index(&data.split.valid),
            test_nodes: index(&data.split.test),
        }
    }
}
