//! Near-duplicate chunk removal with TF-IDF cosine similarity.
//!
//! Vectors follow the usual TF-IDF defaults: lowercased text, tokens of two
//! or more word characters, raw term counts, smoothed inverse document
//! frequency `ln((1 + n) / (1 + df)) + 1`, and L2 normalization.
//!
//! The sweep is forward-only: each kept chunk marks every later chunk whose
//! similarity exceeds the threshold as seen, and seen chunks are dropped.
//! Similarity is computed pairwise, so cost grows with the square of the
//! chunk count.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

/// Similarity at or above this counts as identical when the threshold is 1.0.
const IDENTICAL_EPSILON: f64 = 1e-9;

/// Sparse L2-normalized vector, sorted by term id.
type SparseVector = Vec<(usize, f64)>;

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn tfidf_vectors(chunks: &[String]) -> Vec<SparseVector> {
    let mut vocabulary: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<HashMap<usize, f64>> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let mut tf: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(chunk) {
            let next = vocabulary.len();
            let id = *vocabulary.entry(token).or_insert(next);
            *tf.entry(id).or_insert(0.0) += 1.0;
        }
        counts.push(tf);
    }

    let mut df = vec![0usize; vocabulary.len()];
    for tf in &counts {
        for &id in tf.keys() {
            df[id] += 1;
        }
    }
    let n = chunks.len() as f64;
    let idf: Vec<f64> = df
        .iter()
        .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
        .collect();

    counts
        .into_iter()
        .map(|tf| {
            let mut vector: SparseVector = tf
                .into_iter()
                .map(|(id, count)| (id, count * idf[id]))
                .collect();
            let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, w) in vector.iter_mut() {
                    *w /= norm;
                }
            }
            vector.sort_by_key(|(id, _)| *id);
            vector
        })
        .collect()
}

fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    // Both sides are already unit length, so the dot product is the cosine.
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

fn is_duplicate(similarity: f64, threshold: f64) -> bool {
    if threshold >= 1.0 {
        similarity >= 1.0 - IDENTICAL_EPSILON
    } else {
        similarity > threshold
    }
}

/// Drop chunks that are near-duplicates of an earlier kept chunk.
///
/// Order is preserved. Fewer than two chunks, or chunks with no tokens at
/// all, are returned unchanged.
pub fn dedupe(chunks: &[String], threshold: f64) -> Vec<String> {
    if chunks.len() <= 1 {
        return chunks.to_vec();
    }
    let vectors = tfidf_vectors(chunks);
    if vectors.iter().all(|v| v.is_empty()) {
        return chunks.to_vec();
    }

    let mut seen = vec![false; chunks.len()];
    let mut kept = Vec::new();
    for i in 0..chunks.len() {
        if seen[i] {
            continue;
        }
        kept.push(chunks[i].clone());
        for j in i + 1..chunks.len() {
            if !seen[j] && is_duplicate(cosine(&vectors[i], &vectors[j]), threshold) {
                seen[j] = true;
            }
        }
    }

    tracing::debug!(before = chunks.len(), after = kept.len(), "deduplicated chunks");
    kept
}
