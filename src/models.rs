//! Core data types shared by the ingestion pipeline and the generators.
//!
//! Quiz and notes types double as the wire format: they are deserialized
//! from LLM output, stored in the cache, and returned over HTTP unchanged.

use serde::{Deserialize, Serialize};

/// A bounded-length piece of text extracted from a document or transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Originating file path, when the chunk came from a document.
    pub source: Option<String>,
}

/// Question difficulty as produced by the LLM.
///
/// Serialized lowercase. Deserialization ignores case and surrounding
/// whitespace, since models write `"Medium"` as often as `"medium"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Difficulty::parse(&raw).ok_or_else(|| {
            serde::de::Error::unknown_variant(raw.trim(), &["easy", "medium", "hard"])
        })
    }
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Difficulty selection for a quiz request; `Mixed` disables filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DifficultyFilter {
    #[default]
    Mixed,
    Only(Difficulty),
}

impl DifficultyFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mixed" => Some(DifficultyFilter::Mixed),
            "easy" => Some(DifficultyFilter::Only(Difficulty::Easy)),
            "medium" => Some(DifficultyFilter::Only(Difficulty::Medium)),
            "hard" => Some(DifficultyFilter::Only(Difficulty::Hard)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyFilter::Mixed => "mixed",
            DifficultyFilter::Only(d) => d.as_str(),
        }
    }

    pub fn accepts(&self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyFilter::Mixed => true,
            DifficultyFilter::Only(d) => *d == difficulty,
        }
    }
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub explanation: String,
}

impl QuizQuestion {
    /// Exactly four options, one of which is the answer.
    pub fn is_well_formed(&self) -> bool {
        self.options.len() == 4 && self.options.iter().any(|o| o == &self.answer)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotesDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
    #[serde(default)]
    pub key_terms: Vec<KeyTerm>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subsection {
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyTerm {
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub definition: String,
}

/// Per-generation accounting of LLM batches.
///
/// A non-zero `batches_failed` means the artifact is missing whatever
/// those batches would have contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GenerationReport {
    pub batches_total: usize,
    pub batches_run: usize,
    pub batches_failed: usize,
}

impl GenerationReport {
    pub fn is_degraded(&self) -> bool {
        self.batches_failed > 0
    }
}

/// A generated artifact together with how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub artifact: T,
    pub report: GenerationReport,
}
