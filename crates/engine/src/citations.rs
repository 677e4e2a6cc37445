//! Citation extraction — a pure function of the generated text and
//! the retrieved context that produced it.
//!
//! A lesson is cited when its title appears in the reply (the prompt
//! instructs the model to cite by exact title). Extraction is
//! idempotent and order-stable: the citation set follows the excerpt
//! order, deduplicated by lesson.

use sherpa_core::retrieval::{Citation, LessonExcerpt};

/// Extract the citation set from a generated reply.
pub fn extract(text: &str, excerpts: &[LessonExcerpt]) -> Vec<Citation> {
    let haystack = text.to_lowercase();
    let mut citations: Vec<Citation> = Vec::new();

    for excerpt in excerpts {
        if excerpt.title.is_empty() {
            continue;
        }
        if haystack.contains(&excerpt.title.to_lowercase())
            && !citations.iter().any(|c| c.lesson_id == excerpt.lesson_id)
        {
            citations.push(Citation::from(excerpt));
        }
    }

    citations
}
