//! Multiple-choice quiz generation.
//!
//! Chunks are deduplicated and batched, then each batch is sent to the LLM
//! until enough questions have been collected. Each batch asks for at most
//! `max_per_batch` questions. Output that fails to parse counts as a failed
//! batch and generation moves on to the next one.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::batch::batch_chunks;
use crate::dedup::dedupe;
use crate::llm::LlmClient;
use crate::models::{DifficultyFilter, GenerationReport, Generated, QuizQuestion};
use crate::response;

#[derive(Debug, Clone, Copy)]
pub struct QuizParams {
    pub num_questions: usize,
    pub difficulty: DifficultyFilter,
    pub similarity_threshold: f64,
    pub batch_size: usize,
}

pub struct QuizGenerator {
    llm: Arc<dyn LlmClient>,
    max_per_batch: usize,
}

pub fn quiz_prompt(batch_text: &str) -> String {
    format!(
        r#"
You are a teacher creating quizzes from a lecture transcript. Using the text below, generate a quiz with a question for each important topic. The quiz should include **multiple-choice questions (MCQs)** only. Each question should have:

1. A "question" string.
2. An "options" list with exactly 4 options.
3. An "answer" string indicating the correct option.
4. A "difficulty" string which can be "easy", "medium", or "hard".

Output the quiz strictly in JSON format like this:

[
  {{
    "question": "Example question?",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "answer": "Option B",
    "difficulty": "medium",
    "explanation": "Explanation for the correct answer."
  }},
  ...
]

Make sure the output is parsable. Do not include any other characters other than the structure I have specified.

**Transcript:**
"{batch_text}"
"#
    )
}

/// Keep the questions that parse, match the difficulty, and are well formed.
fn select_questions(
    items: Vec<serde_json::Value>,
    difficulty: DifficultyFilter,
    limit: usize,
) -> Vec<QuizQuestion> {
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<QuizQuestion>(item).ok())
        .filter(|q| difficulty.accepts(q.difficulty))
        .filter(QuizQuestion::is_well_formed)
        .take(limit)
        .collect()
}

impl QuizGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, max_per_batch: usize) -> Self {
        Self {
            llm,
            max_per_batch: max_per_batch.max(1),
        }
    }

    /// Ask the LLM for up to `limit` questions from one batch.
    async fn generate_batch(
        &self,
        batch_text: &str,
        difficulty: DifficultyFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<QuizQuestion>> {
        let reply = self.llm.generate(&quiz_prompt(batch_text)).await?;
        // Objects only, so a stray `[1]` in the prose is not taken for the quiz.
        let items: Vec<serde_json::Map<String, serde_json::Value>> = response::parse_json(&reply)?;
        let items = items.into_iter().map(serde_json::Value::Object).collect();
        Ok(select_questions(items, difficulty, limit))
    }

    pub async fn generate(&self, chunks: &[String], params: &QuizParams) -> Generated<Vec<QuizQuestion>> {
        let unique = dedupe(chunks, params.similarity_threshold);
        let batches = batch_chunks(&unique, params.batch_size);
        let mut report = GenerationReport {
            batches_total: batches.len(),
            ..GenerationReport::default()
        };

        let mut questions: Vec<QuizQuestion> = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            if questions.len() >= params.num_questions {
                break;
            }
            let remaining = params.num_questions - questions.len();
            let limit = remaining.min(self.max_per_batch);

            report.batches_run += 1;
            match self.generate_batch(batch, params.difficulty, limit).await {
                Ok(batch_questions) => {
                    debug!(batch = i, questions = batch_questions.len(), "quiz batch done");
                    questions.extend(batch_questions);
                }
                Err(e) => {
                    warn!(batch = i, error = %e, "quiz batch failed");
                    report.batches_failed += 1;
                }
            }
        }

        questions.truncate(params.num_questions);
        Generated {
            artifact: questions,
            report,
        }
    }
}
