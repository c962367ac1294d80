//! Per-user persistent vector index.
//!
//! Chunks are stored with their embedding and a `source` tag equal to the
//! originating file's ledger key. The whole index is one JSON file,
//! `{index_dir}/index.json`, rewritten atomically on [`VectorIndex::save`].
//! Supported operations are add, delete-by-source, and full-corpus
//! retrieval in insertion order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::TextChunk;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub source: String,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    #[serde(default)]
    pub vector: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    model: String,
    /// Required vector length; `0` stores vectors unchecked.
    #[serde(default)]
    dims: usize,
    chunks: Vec<IndexedChunk>,
}

#[derive(Debug)]
pub struct VectorIndex {
    path: PathBuf,
    data: IndexFile,
}

impl VectorIndex {
    pub fn exists(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Open the index stored in `dir`, or `None` when there is none.
    pub fn open(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read index {}", path.display()))
            }
        };
        let data: IndexFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse index {}", path.display()))?;
        Ok(Some(Self { path, data }))
    }

    /// A new, empty index for `dir`. Nothing is written until [`save`](Self::save).
    pub fn create(dir: &Path, model: &str, dims: usize) -> Self {
        Self {
            path: dir.join(INDEX_FILE),
            data: IndexFile {
                model: model.to_string(),
                dims,
                chunks: Vec::new(),
            },
        }
    }

    /// Delete the index directory and everything in it.
    pub fn destroy(dir: &Path) -> Result<()> {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
        }
    }

    pub fn model(&self) -> &str {
        &self.data.model
    }

    pub fn dims(&self) -> usize {
        self.data.dims
    }

    pub fn len(&self) -> usize {
        self.data.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.chunks.is_empty()
    }

    /// Append chunks with their vectors. Chunks without a source are tagged
    /// with an empty source. Returns the number added.
    ///
    /// Nothing is added when the counts differ or, for an index with
    /// `dims > 0`, when any vector has the wrong length.
    pub fn add(&mut self, chunks: &[TextChunk], vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            anyhow::bail!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        if self.data.dims > 0 {
            if let Some(bad) = vectors.iter().find(|v| v.len() != self.data.dims) {
                anyhow::bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.data.dims,
                    bad.len()
                );
            }
        }
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let hash = format!("{:x}", Sha256::digest(chunk.text.as_bytes()));
            self.data.chunks.push(IndexedChunk {
                id: Uuid::new_v4().to_string(),
                source: chunk.source.clone().unwrap_or_default(),
                text: chunk.text.clone(),
                hash,
                vector,
            });
        }
        Ok(chunks.len())
    }

    /// Remove every chunk tagged with `source`. Returns the number removed.
    pub fn delete_by_source(&mut self, source: &str) -> usize {
        let before = self.data.chunks.len();
        self.data.chunks.retain(|c| c.source != source);
        before - self.data.chunks.len()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.data.chunks
    }

    /// All chunk texts in insertion order.
    pub fn documents(&self) -> Vec<String> {
        self.data.chunks.iter().map(|c| c.text.clone()).collect()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(&self.data)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write index {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace index {}", self.path.display()))?;
        Ok(())
    }
}
