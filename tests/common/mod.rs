#![allow(dead_code)]

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use study_harness::chunk::Splitter;
use study_harness::config::Config;
use study_harness::embedding::Embedder;
use study_harness::llm::LlmClient;
use study_harness::pipeline::DocumentPipeline;
use study_harness::server::AppState;
use study_harness::workspace::WorkspaceManager;
use study_harness::youtube::TranscriptFetcher;

/// Minimal multi-page PDF with one text line per page.
///
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = page_id + 1;
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, content_id
            )
            .as_bytes(),
        );
        let stream = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let size = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", size).as_bytes(),
    );
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal docx (ZIP) with one `w:p` per paragraph.
pub fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

pub fn set_mtime(path: &Path, secs: u64) {
    let f = std::fs::File::options().write(true).open(path).unwrap();
    f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.base_dir = root.join("user_data");
    config.storage.cache_dir = root.join("cache");
    config
}

// ============ Fakes ============

/// Embeds every text as `[len, 1.0]` and counts calls. `dims` is what it
/// advertises, which need not match the vectors it returns.
#[derive(Default)]
pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    pub texts: AtomicUsize,
    pub dims: usize,
}

impl CountingEmbedder {
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting-test"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

pub const NOTES_REPLY: &str = r#"```json
{
  "sections": [
    {
      "title": "Photosynthesis",
      "content": "How plants turn light into sugar.",
      "subsections": [{"subtitle": "Light reactions", "points": ["Happen in thylakoids"]}],
      "key_terms": [{"term": "Chlorophyll", "definition": "Green pigment"}],
      "examples": ["Leaves in sunlight"]
    },
    {
      "title": "Cellular Respiration",
      "content": "Breaking sugar down for energy."
    }
  ]
}
```"#;

pub fn quiz_reply(count: usize) -> String {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "question": format!("Question {}?", i + 1),
                "options": ["Alpha", "Beta", "Gamma", "Delta"],
                "answer": "Gamma",
                "difficulty": if i % 2 == 0 { "easy" } else { "hard" },
                "explanation": "Gamma is correct."
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

/// Answers quiz prompts with five questions and notes prompts with
/// [`NOTES_REPLY`]; records every prompt.
#[derive(Default)]
pub struct FakeLlm {
    pub prompts: Mutex<Vec<String>>,
    pub fail: bool,
}

impl FakeLlm {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            anyhow::bail!("model overloaded");
        }
        if prompt.contains("note-taker") {
            Ok(NOTES_REPLY.to_string())
        } else {
            Ok(quiz_reply(5))
        }
    }
}

/// Returns fixed snippets; the video id `unavailable` fails.
#[derive(Default)]
pub struct FakeTranscripts {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TranscriptFetcher for FakeTranscripts {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if video_id == "unavailable" {
            anyhow::bail!("Failed to fetch transcript: transcripts are disabled");
        }
        Ok(vec![
            "Welcome to the lecture on".to_string(),
            "plate tectonics and earthquakes.".to_string(),
        ])
    }
}

pub fn pipeline(root: &Path, embedder: Arc<CountingEmbedder>) -> DocumentPipeline {
    DocumentPipeline::new(
        WorkspaceManager::new(root.join("user_data")),
        embedder,
        Splitter::new(2000, 100),
    )
}

pub struct Harness {
    pub state: AppState,
    pub llm: Arc<FakeLlm>,
    pub embedder: Arc<CountingEmbedder>,
    pub transcripts: Arc<FakeTranscripts>,
}

pub fn harness(root: &Path, llm: FakeLlm) -> Harness {
    let llm = Arc::new(llm);
    let embedder = Arc::new(CountingEmbedder::default());
    let transcripts = Arc::new(FakeTranscripts::default());
    let state = AppState::new(
        test_config(root),
        llm.clone(),
        embedder.clone(),
        transcripts.clone(),
    )
    .unwrap();
    Harness {
        state,
        llm,
        embedder,
        transcripts,
    }
}
