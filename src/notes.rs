//! Structured study-notes generation and Markdown rendering.
//!
//! Every batch is sent to the LLM and parsed as `{"sections": [...]}`.
//! Sections from all batches are concatenated under a single
//! "Generated Notes" title. A batch that fails contributes no sections.

use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::batch_chunks;
use crate::dedup::dedupe;
use crate::llm::LlmClient;
use crate::models::{GenerationReport, Generated, NotesDocument, Section};
use crate::response;

pub const MERGED_TITLE: &str = "Generated Notes";

#[derive(Debug, Clone, Copy)]
pub struct NotesParams {
    pub similarity_threshold: f64,
    pub batch_size: usize,
}

pub struct NotesGenerator {
    llm: Arc<dyn LlmClient>,
}

pub fn notes_prompt(batch_text: &str) -> String {
    format!(
        r#"
You are an expert note-taker creating comprehensive, well-structured notes from the following content (which contains multiple sections separated by "--- SECTION ---").

Create detailed notes that:
1. Organize information into clear topics and subtopics
2. Extract key concepts, definitions, and important points
3. Include relevant examples and explanations
4. Use bullet points for clarity
5. Highlight important terminology

Output the notes in JSON format with this structure:

{{
  "sections": [
    {{
      "title": "Main Topic Title",
      "content": "Overview or introduction to this section",
      "subsections": [
        {{
          "subtitle": "Subtopic Title",
          "points": [
            "Key point 1",
            "Key point 2",
            "Key point 3"
          ]
        }}
      ],
      "key_terms": [
        {{
          "term": "Important Term",
          "definition": "Definition of the term"
        }}
      ],
      "examples": [
        "Example 1 explanation",
        "Example 2 explanation"
      ]
    }}
  ]
}}

Make sure the output is valid JSON. Do not include any other text outside the JSON structure.

**Content:**
"{batch_text}"
"#
    )
}

/// Keep the sections that deserialize; a malformed one does not sink the batch.
fn select_sections(items: Vec<serde_json::Value>) -> Vec<Section> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Section>(item) {
            Ok(section) => Some(section),
            Err(e) => {
                warn!(error = %e, "skipping malformed notes section");
                None
            }
        })
        .collect()
}

impl NotesGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn generate_batch(&self, batch_text: &str) -> anyhow::Result<Vec<Section>> {
        let reply = self.llm.generate(&notes_prompt(batch_text)).await?;
        // An object is required; a missing `sections` key means no sections.
        let mut notes: serde_json::Map<String, serde_json::Value> = response::parse_json(&reply)?;
        let sections = match notes.remove("sections") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        };
        Ok(select_sections(sections))
    }

    pub async fn generate(&self, chunks: &[String], params: &NotesParams) -> Generated<NotesDocument> {
        let unique = dedupe(chunks, params.similarity_threshold);
        let batches = batch_chunks(&unique, params.batch_size);
        let mut report = GenerationReport {
            batches_total: batches.len(),
            ..GenerationReport::default()
        };

        let mut sections = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            report.batches_run += 1;
            match self.generate_batch(batch).await {
                Ok(batch_sections) => {
                    info!(batch = i + 1, total = batches.len(), sections = batch_sections.len(), "notes batch done");
                    sections.extend(batch_sections);
                }
                Err(e) => {
                    warn!(batch = i + 1, total = batches.len(), error = %e, "notes batch failed");
                    report.batches_failed += 1;
                }
            }
        }

        Generated {
            artifact: NotesDocument {
                title: MERGED_TITLE.to_string(),
                sections,
            },
            report,
        }
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Render notes as Markdown.
///
/// Headings: `#` title, `##` section, `###` subsection, `####` for the
/// key-term and example blocks. Each section ends with a `---` rule.
pub fn to_markdown(doc: &NotesDocument) -> String {
    let mut md = String::new();
    let _ = write!(md, "# {}\n\n", or_default(&doc.title, "Notes"));

    for section in &doc.sections {
        let _ = write!(md, "## {}\n\n", or_default(&section.title, "Untitled Section"));
        if !section.content.is_empty() {
            let _ = write!(md, "{}\n\n", section.content);
        }

        for sub in &section.subsections {
            let _ = write!(md, "### {}\n\n", or_default(&sub.subtitle, "Untitled Subsection"));
            for point in &sub.points {
                let _ = writeln!(md, "- {}", point);
            }
            md.push('\n');
        }

        if !section.key_terms.is_empty() {
            md.push_str("#### Key Terms\n\n");
            for kt in &section.key_terms {
                let _ = write!(md, "**{}**: {}\n\n", kt.term, kt.definition);
            }
        }

        if !section.examples.is_empty() {
            md.push_str("#### Examples\n\n");
            for (i, example) in section.examples.iter().enumerate() {
                let _ = writeln!(md, "{}. {}", i + 1, example);
            }
            md.push('\n');
        }

        md.push_str("---\n\n");
    }
    md
}
