//! Ingestion pipeline tests: ledger-driven incremental embedding against a
//! real on-disk workspace.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{docx_with_paragraphs, pdf_with_pages, pipeline, set_mtime, CountingEmbedder};
use study_harness::index::VectorIndex;
use study_harness::pipeline::IndexStatus;

#[tokio::test]
async fn first_ingest_embeds_then_rerun_is_free() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    p.save_upload("alice", "intro.docx", &docx_with_paragraphs(&["Cells are the unit of life."]))
        .unwrap();
    p.save_upload("alice", "genes.docx", &docx_with_paragraphs(&["Genes encode proteins."]))
        .unwrap();

    let first = p.ingest("alice").await.unwrap();
    assert_eq!(first.status, IndexStatus::Updated);
    assert_eq!(first.delta.new_or_updated.len(), 2);
    assert_eq!(first.chunks_added, 2);
    assert_eq!(embedder.calls(), 1);

    let second = p.ingest("alice").await.unwrap();
    assert_eq!(second.status, IndexStatus::Unchanged);
    assert!(second.delta.is_empty());
    assert_eq!(second.chunks_total, 2);
    assert_eq!(embedder.calls(), 1, "unchanged folder must not re-embed");

    let chunks = p.chunks("alice").unwrap().unwrap();
    assert!(chunks.iter().any(|c| c.contains("Genes encode proteins.")));
    assert!(chunks.iter().any(|c| c.contains("Cells are the unit of life.")));
}

#[tokio::test]
async fn removed_file_drops_its_vectors() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    let keep = p
        .save_upload("bob", "keep.docx", &docx_with_paragraphs(&["Keep this text."]))
        .unwrap();
    let gone = p
        .save_upload("bob", "gone.docx", &docx_with_paragraphs(&["Remove this text."]))
        .unwrap();
    p.ingest("bob").await.unwrap();

    std::fs::remove_file(&gone).unwrap();
    let summary = p.ingest("bob").await.unwrap();
    assert_eq!(summary.status, IndexStatus::Unchanged);
    assert_eq!(summary.delta.removed.len(), 1);
    assert!(summary.delta.removed[0].ends_with("/gone.docx"));

    let chunks = p.chunks("bob").unwrap().unwrap();
    assert_eq!(chunks, vec!["Keep this text."]);
    assert!(keep.exists());
}

#[tokio::test]
async fn removing_every_file_deletes_index_and_ledger() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder);

    let path = p
        .save_upload("carol", "only.docx", &docx_with_paragraphs(&["Lonely document."]))
        .unwrap();
    p.ingest("carol").await.unwrap();
    let ws = p.workspaces().paths("carol").unwrap();
    assert!(VectorIndex::exists(&ws.index_dir));
    assert!(ws.ledger_path.exists());

    std::fs::remove_file(&path).unwrap();
    let summary = p.ingest("carol").await.unwrap();
    assert_eq!(summary.status, IndexStatus::NoDocuments);
    assert!(!ws.index_dir.exists());
    assert!(!ws.ledger_path.exists());
    assert!(p.chunks("carol").unwrap().is_none());
}

#[tokio::test]
async fn updated_file_replaces_old_chunks() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    let path = p
        .save_upload("dave", "notes.docx", &docx_with_paragraphs(&["Version one."]))
        .unwrap();
    set_mtime(&path, 1_700_000_000);
    p.ingest("dave").await.unwrap();

    std::fs::write(&path, docx_with_paragraphs(&["Version two."])).unwrap();
    set_mtime(&path, 1_700_000_100);
    let summary = p.ingest("dave").await.unwrap();

    assert_eq!(summary.status, IndexStatus::Updated);
    assert_eq!(summary.chunks_total, 1);
    assert_eq!(p.chunks("dave").unwrap().unwrap(), vec!["Version two."]);
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn same_mtime_rewrite_is_not_detected() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    let path = p
        .save_upload("erin", "notes.docx", &docx_with_paragraphs(&["Original."]))
        .unwrap();
    set_mtime(&path, 1_700_000_000);
    p.ingest("erin").await.unwrap();

    std::fs::write(&path, docx_with_paragraphs(&["Silently changed."])).unwrap();
    set_mtime(&path, 1_700_000_000);
    let summary = p.ingest("erin").await.unwrap();

    assert_eq!(summary.status, IndexStatus::Unchanged);
    assert_eq!(p.chunks("erin").unwrap().unwrap(), vec!["Original."]);
}

#[tokio::test]
async fn missing_index_with_current_ledger_is_rebuilt() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    p.save_upload("frank", "a.docx", &docx_with_paragraphs(&["Alpha text."]))
        .unwrap();
    p.ingest("frank").await.unwrap();

    let ws = p.workspaces().paths("frank").unwrap();
    VectorIndex::destroy(&ws.index_dir).unwrap();

    let summary = p.ingest("frank").await.unwrap();
    assert_eq!(summary.status, IndexStatus::Updated);
    assert_eq!(summary.chunks_total, 1);
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn new_file_with_missing_index_rebuilds_everything() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder.clone());

    p.save_upload("fern", "old.docx", &docx_with_paragraphs(&["Older notes."]))
        .unwrap();
    p.ingest("fern").await.unwrap();

    let ws = p.workspaces().paths("fern").unwrap();
    VectorIndex::destroy(&ws.index_dir).unwrap();
    p.save_upload("fern", "new.docx", &docx_with_paragraphs(&["Newer notes."]))
        .unwrap();

    let summary = p.ingest("fern").await.unwrap();
    assert_eq!(summary.delta.new_or_updated.len(), 1);
    assert_eq!(summary.embedded_files.len(), 2);
    assert_eq!(summary.chunks_total, 2);
    let chunks = p.chunks("fern").unwrap().unwrap();
    assert!(chunks.iter().any(|c| c == "Older notes."));
    assert!(chunks.iter().any(|c| c == "Newer notes."));
}

#[tokio::test]
async fn switching_embedder_dims_rebuilds_index() {
    let tmp = TempDir::new().unwrap();
    let first = pipeline(tmp.path(), Arc::new(CountingEmbedder::default()));
    first
        .save_upload("gus", "a.docx", &docx_with_paragraphs(&["Alpha text."]))
        .unwrap();
    first.ingest("gus").await.unwrap();

    let embedder = Arc::new(CountingEmbedder::with_dims(2));
    let second = pipeline(tmp.path(), embedder.clone());
    let summary = second.ingest("gus").await.unwrap();
    assert_eq!(summary.status, IndexStatus::Updated);
    assert_eq!(summary.chunks_total, 1);
    assert_eq!(embedder.calls(), 1);

    let ws = second.workspaces().paths("gus").unwrap();
    let index = VectorIndex::open(&ws.index_dir).unwrap().unwrap();
    assert_eq!(index.dims(), 2);
}

#[tokio::test]
async fn vectors_of_the_wrong_length_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path(), Arc::new(CountingEmbedder::with_dims(3)));
    p.save_upload("hugo", "a.docx", &docx_with_paragraphs(&["Alpha text."]))
        .unwrap();

    let err = p.ingest("hugo").await.unwrap_err();
    assert!(format!("{:#}", err).contains("expected 3, got 2"));
    assert!(p.chunks("hugo").unwrap().is_none());
}

#[tokio::test]
async fn corrupt_document_error_names_the_file() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder);

    p.save_upload("gina", "broken.pdf", b"this is not a pdf").unwrap();
    let err = p.ingest("gina").await.unwrap_err();
    assert!(format!("{:#}", err).contains("broken.pdf"));
}

#[tokio::test]
async fn two_page_pdf_is_extracted() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(CountingEmbedder::default());
    let p = pipeline(tmp.path(), embedder);

    p.save_upload(
        "hana",
        "lecture.pdf",
        &pdf_with_pages(&["chlorophyll absorbs light", "mitochondria release energy"]),
    )
    .unwrap();
    let summary = p.ingest("hana").await.unwrap();
    assert_eq!(summary.status, IndexStatus::Updated);

    let text = p.chunks("hana").unwrap().unwrap().join("\n");
    assert!(text.contains("chlorophyll"));
    assert!(text.contains("mitochondria"));
}

#[test]
fn upload_rejects_unsupported_names() {
    let tmp = TempDir::new().unwrap();
    let p = pipeline(tmp.path(), Arc::new(CountingEmbedder::default()));
    assert!(p.save_upload("ivan", "notes.txt", b"x").is_err());
    assert!(p.save_upload("ivan", "...", b"x").is_err());
    assert!(p.save_upload("../escape", "a.pdf", b"x").is_err());

    let stored = p.save_upload("ivan", "../../My Notes.docx", b"x").unwrap();
    assert_eq!(stored.file_name().unwrap(), "My_Notes.docx");
    assert!(stored.starts_with(tmp.path().join("user_data").join("ivan")));
}
