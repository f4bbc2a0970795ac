use crate::error::{GnnError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONTENT_SUFFIX: &str = "content";
pub const CITES_SUFFIX: &str = "cites";
pub const CACHE_SUFFIX: &str = "ghd";

/// `data/cora` + `cites` -> `data/cora.cites`
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// A citation graph as read from disk, before any feature construction.
///
/// Node indices follow the order of the `.content` file. Edges are undirected,
/// stored once with the smaller index first, without self loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    pub node_ids: Vec<String>,
    pub class_names: Vec<String>,
    pub targets: Vec<usize>,
    pub content: Vec<Vec<f32>>,
    pub edges: Vec<[usize; 2]>,
}

impl RawGraph {
    /// Reads the binary cache at `<prefix>.ghd` when present, the Cora text files otherwise.
    pub fn open(prefix: &Path) -> Result<Self> {
        let cache_path = with_suffix(prefix, CACHE_SUFFIX);
        if cache_path.is_file() {
            info!("loading graph cache {}", cache_path.display());
            return Self::load(&cache_path);
        }
        Self::from_cora(prefix)
    }

    pub fn from_cora(prefix: &Path) -> Result<Self> {
        let content_path = with_suffix(prefix, CONTENT_SUFFIX);
        let cites_path = with_suffix(prefix, CITES_SUFFIX);
        info!("parsing {} and {}", content_path.display(), cites_path.display());

        let content_lines = read_lines(&content_path)?;

        let rows = content_lines
            .par_iter()
            .map(|(line_no, line)| parse_content_line(&content_path, *line_no, line))
            .collect::<Result<Vec<_>>>()?;

        if rows.is_empty() {
            return Err(GnnError::EmptyGraph(content_path));
        }

        let feature_dim = rows[0].1.len();
        let mut node_ids = Vec::with_capacity(rows.len());
        let mut content = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(rows.len());
        let mut class_names: Vec<String> = Vec::new();
        let mut class_index: HashMap<String, usize> = HashMap::new();
        let mut node_index: HashMap<String, usize> = HashMap::new();

        for ((id, features, class_name), (line_no, _)) in rows.into_iter().zip(&content_lines) {
            if features.len() != feature_dim {
                return Err(GnnError::Parse {
                    path: content_path,
                    line: *line_no,
                    reason: format!("expected {feature_dim} features, found {}", features.len()),
                });
            }
            if node_index.insert(id.clone(), node_ids.len()).is_some() {
                return Err(GnnError::Parse {
                    path: content_path,
                    line: *line_no,
                    reason: format!("duplicate node `{id}`"),
                });
            }

            let target = *class_index.entry(class_name.clone()).or_insert_with(|| {
                class_names.push(class_name);
                class_names.len() - 1
            });

            node_ids.push(id);
            content.push(features);
            targets.push(target);
        }

        let mut edges: BTreeSet<[usize; 2]> = BTreeSet::new();
        let mut dangling = 0usize;

        for (line_no, line) in read_lines(&cites_path)? {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(GnnError::Parse {
                    path: cites_path,
                    line: line_no,
                    reason: format!("expected 2 node ids, found {}", fields.len()),
                });
            }

            match (node_index.get(fields[0]), node_index.get(fields[1])) {
                (Some(&a), Some(&b)) if a != b => {
                    edges.insert([a.min(b), a.max(b)]);
                }
                (Some(_), Some(_)) => {}
                _ => dangling += 1,
            }
        }

        if dangling > 0 {
            warn!("skipped {dangling} citations naming unknown nodes");
        }

        let graph = RawGraph {
            node_ids,
            class_names,
            targets,
            content,
            edges: edges.into_iter().collect(),
        };
        debug!(
            "nodes: {}, edges: {}, classes: {}, content dim: {}",
            graph.num_nodes(),
            graph.edges.len(),
            graph.num_classes(),
            graph.content_dim()
        );
        Ok(graph)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| GnnError::io(path, e))?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|source| GnnError::Cache {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| GnnError::io(path, e))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| GnnError::Cache {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn content_dim(&self) -> usize {
        self.content.first().map_or(0, Vec::len)
    }

    pub fn neighbours(&self) -> Vec<HashSet<usize>> {
        let mut node_neighbour_map = vec![HashSet::new(); self.num_nodes()];
        for &[a, b] in &self.edges {
            node_neighbour_map[a].insert(b);
            node_neighbour_map[b].insert(a);
        }
        node_neighbour_map
    }
}

/// Reads a node2vec embedding file into a row-major `[nodes, dim]` matrix
/// ordered like `node_ids`. Nodes without a vector keep zeros.
pub fn read_embeddings(path: &Path, node_ids: &[String]) -> Result<(Vec<f32>, usize)> {
    let node_index: HashMap<&str, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut lines = read_lines(path)?.into_iter().peekable();

    // node2vec writes `<count> <dim>` before the vectors
    let header_dim = lines.peek().and_then(|(_, header)| {
        let fields: Vec<&str> = header.split_whitespace().collect();
        match fields[..] {
            [count, dim] if count.parse::<usize>().is_ok() && !node_index.contains_key(count) => {
                dim.parse::<usize>().ok()
            }
            _ => None,
        }
    });
    let mut dim = header_dim;
    if header_dim.is_some() {
        lines.next();
    }

    let mut vectors: Vec<(usize, Vec<f32>)> = Vec::new();
    let mut unknown = 0usize;

    for (line_no, line) in lines {
        let mut fields = line.split_whitespace();
        let Some(id) = fields.next() else { continue };
        let values = fields
            .map(|v| v.parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GnnError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                reason: e.to_string(),
            })?;

        let expected = *dim.get_or_insert(values.len());
        if values.len() != expected {
            return Err(GnnError::Parse {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("expected {expected} values, found {}", values.len()),
            });
        }

        match node_index.get(id) {
            Some(&node) => vectors.push((node, values)),
            None => unknown += 1,
        }
    }

    let dim = dim.unwrap_or(0);
    let mut matrix = vec![0.0f32; node_ids.len() * dim];
    let mut covered = 0usize;
    for (node, values) in vectors {
        matrix[node * dim..(node + 1) * dim].copy_from_slice(&values);
        covered += 1;
    }

    if unknown > 0 {
        warn!("{} embeddings name nodes outside the graph", unknown);
    }
    if covered < node_ids.len() {
        warn!(
            "{} of {} nodes have no embedding and use zeros",
            node_ids.len() - covered,
            node_ids.len()
        );
    }

    Ok((matrix, dim))
}

type ContentRow = (String, Vec<f32>, String);

fn parse_content_line(path: &Path, line_no: usize, line: &str) -> Result<ContentRow> {
    let mut fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(GnnError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            reason: "expected a node id and a class".to_string(),
        });
    }

    let class_name = fields.remove(fields.len() - 1).to_string();
    let id = fields.remove(0).to_string();

    let features = fields
        .iter()
        .map(|x| x.parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GnnError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            reason: e.to_string(),
        })?;

    Ok((id, features, class_name))
}

/// Non-blank lines with their 1-based line numbers.
fn read_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = File::open(path).map_err(|e| GnnError::io(path, e))?;
    let mut lines = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| GnnError::io(path, e))?;
        if !line.trim().is_empty() {
            lines.push((i + 1, line));
        }
    }
    Ok(lines)
}
