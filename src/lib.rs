//! # Study Harness
//!
//! A per-user study-material service: upload lecture documents (PDF, DOCX)
//! or import YouTube transcripts, then generate multiple-choice quizzes and
//! structured notes from them with an LLM.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Uploads    │──▶│   Pipeline   │──▶│ Vector index │
//! │  PDF/DOCX   │   │ Ledger+Chunk │   │  (per user)  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//! ┌─────────────┐   ┌──────────────┐          ▼
//! │  YouTube    │──▶│ Content cache│──▶ Dedup → Batch → LLM
//! │ transcripts │   │  (TTL, JSON) │          │
//! └─────────────┘   └──────────────┘          ▼
//!                                       Quiz / Notes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`cache`] | File-backed TTL content cache |
//! | [`workspace`] | Per-user directory layout |
//! | [`ledger`] | Incremental ingestion tracking |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Per-user vector index |
//! | [`pipeline`] | Document ingestion pipeline |
//! | [`dedup`] | TF-IDF near-duplicate removal |
//! | [`batch`] | Chunk batching |
//! | [`llm`] | LLM provider abstraction |
//! | [`response`] | JSON extraction from LLM replies |
//! | [`quiz`] | Quiz generation |
//! | [`notes`] | Notes generation and Markdown rendering |
//! | [`youtube`] | Video ids and transcript fetching |
//! | [`server`] | HTTP API |

pub mod batch;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod notes;
pub mod pipeline;
pub mod quiz;
pub mod response;
pub mod server;
pub mod workspace;
pub mod youtube;
