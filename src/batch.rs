//! Groups chunks into LLM-sized batches.

/// Joins the chunks of one batch.
pub const SECTION_SEPARATOR: &str = "\n\n--- SECTION ---\n\n";

/// Consecutive groups of up to `size` chunks, each joined with
/// [`SECTION_SEPARATOR`]. A `size` of 0 is treated as 1.
pub fn batch_chunks(chunks: &[String], size: usize) -> Vec<String> {
    chunks
        .chunks(size.max(1))
        .map(|group| group.join(SECTION_SEPARATOR))
        .collect()
}
