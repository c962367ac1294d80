//! Document ingestion pipeline.
//!
//! Coordinates the per-user flow: ledger diff → delete vectors of removed
//! files → extract → chunk → embed → index. Only files the ledger reports
//! as new or updated are embedded; an unchanged folder costs no embedding
//! calls.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunk::Splitter;
use crate::embedding::Embedder;
use crate::extract;
use crate::index::VectorIndex;
use crate::ledger::{self, IngestDelta};
use crate::models::TextChunk;
use crate::workspace::{is_supported, list_supported_files, WorkspaceManager};

/// What the index looks like after an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// No supported documents remain; index and ledger were deleted.
    NoDocuments,
    /// Nothing new to embed; the existing index was kept as is.
    Unchanged,
    /// New or updated files were embedded.
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub status: IndexStatus,
    pub delta: IngestDelta,
    /// Files that were extracted and embedded in this run.
    pub embedded_files: Vec<String>,
    pub chunks_added: usize,
    pub chunks_total: usize,
}

pub struct DocumentPipeline {
    workspaces: WorkspaceManager,
    embedder: Arc<dyn Embedder>,
    splitter: Splitter,
}

/// Reduce an uploaded filename to a safe single path component:
/// ASCII letters, digits, `.`, `_` and `-`; whitespace becomes `_`;
/// leading and trailing dots and underscores are stripped.
pub fn secure_filename(filename: &str) -> Option<String> {
    let replaced = filename.replace(['/', '\\'], " ");
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl DocumentPipeline {
    pub fn new(workspaces: WorkspaceManager, embedder: Arc<dyn Embedder>, splitter: Splitter) -> Self {
        Self {
            workspaces,
            embedder,
            splitter,
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn splitter(&self) -> &Splitter {
        &self.splitter
    }

    /// Write an upload into the user's data folder. An existing file with
    /// the same sanitized name is overwritten.
    pub fn save_upload(&self, user_id: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = secure_filename(filename)
            .ok_or_else(|| anyhow::anyhow!("invalid filename: {:?}", filename))?;
        let ws = self.workspaces.ensure(user_id)?;
        let path = ws.data_dir.join(&name);
        if !is_supported(&path) {
            bail!("invalid file type: {}", name);
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write upload {}", path.display()))?;
        info!(user = user_id, file = %name, bytes = bytes.len(), "saved upload");
        Ok(path)
    }

    /// Bring the user's vector index in line with their document folder.
    pub async fn ingest(&self, user_id: &str) -> Result<IngestSummary> {
        let ws = self.workspaces.ensure(user_id)?;
        let delta = ledger::diff(&ws)?;

        let mut index = VectorIndex::open(&ws.index_dir)?;
        if let Some(idx) = &index {
            if idx.model() != self.embedder.model_name() || idx.dims() != self.embedder.dims() {
                warn!(
                    user = user_id,
                    model = idx.model(),
                    dims = idx.dims(),
                    "index built with a different embedder, rebuilding"
                );
                index = None;
            }
        }
        if let Some(idx) = index.as_mut() {
            for source in &delta.removed {
                let n = idx.delete_by_source(source);
                info!(user = user_id, file = %source, chunks = n, "deleted vectors for removed file");
            }
            if !delta.removed.is_empty() {
                idx.save()?;
            }
        }

        let documents = list_supported_files(&ws.data_dir)?;
        if documents.is_empty() {
            info!(user = user_id, "no documents left, removing index and ledger");
            VectorIndex::destroy(&ws.index_dir)?;
            remove_file_if_present(&ws.ledger_path)?;
            return Ok(IngestSummary {
                status: IndexStatus::NoDocuments,
                delta,
                embedded_files: Vec::new(),
                chunks_added: 0,
                chunks_total: 0,
            });
        }

        // Without a usable index every document is embedded again, not only
        // the ones the ledger reports as new.
        let to_embed = if index.is_none() {
            if documents.len() > delta.new_or_updated.len() {
                warn!(user = user_id, "no usable index, re-embedding all documents");
            }
            documents.iter().map(|p| ledger::ledger_key(p)).collect()
        } else {
            delta.new_or_updated.clone()
        };

        let mut index = match index {
            Some(idx) if to_embed.is_empty() => {
                info!(user = user_id, "no new files, skipping embeddings");
                return Ok(IngestSummary {
                    status: IndexStatus::Unchanged,
                    delta,
                    embedded_files: Vec::new(),
                    chunks_added: 0,
                    chunks_total: idx.len(),
                });
            }
            Some(idx) => idx,
            None => VectorIndex::create(
                &ws.index_dir,
                self.embedder.model_name(),
                self.embedder.dims(),
            ),
        };

        info!(user = user_id, files = ?to_embed, "new/updated files found");
        let mut chunks = Vec::new();
        for source in &to_embed {
            chunks.extend(self.chunk_file(Path::new(source))?);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .context("Failed to embed document chunks")?;

        for source in &to_embed {
            index.delete_by_source(source);
        }
        let chunks_added = index.add(&chunks, vectors)?;
        index.save()?;

        info!(user = user_id, chunks = chunks_added, total = index.len(), "index updated");
        Ok(IngestSummary {
            status: IndexStatus::Updated,
            delta,
            embedded_files: to_embed,
            chunks_added,
            chunks_total: index.len(),
        })
    }

    /// Extract and split one document, tagging each chunk with its source.
    pub fn chunk_file(&self, path: &Path) -> Result<Vec<TextChunk>> {
        let text = extract::extract_file(path)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        let source = ledger::ledger_key(path);
        Ok(self
            .splitter
            .split(&text)
            .into_iter()
            .map(|text| TextChunk {
                text,
                source: Some(source.clone()),
            })
            .collect())
    }

    /// Every chunk text in the user's index, or `None` without an index.
    pub fn chunks(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        let ws = self.workspaces.paths(user_id)?;
        Ok(VectorIndex::open(&ws.index_dir)?.map(|index| index.documents()))
    }
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_filename_strips_paths_and_odd_characters() {
        assert_eq!(secure_filename("My Lecture.pdf").as_deref(), Some("My_Lecture.pdf"));
        assert_eq!(
            secure_filename("../../etc/passwd.pdf").as_deref(),
            Some("etc_passwd.pdf")
        );
        assert_eq!(secure_filename("C:\\temp\\notes.docx").as_deref(), Some("C_temp_notes.docx"));
        assert_eq!(secure_filename("résumé.pdf").as_deref(), Some("rsum.pdf"));
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename(""), None);
    }
}
