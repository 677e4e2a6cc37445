//! Content retrieval seam — the pluggable search capability over
//! published curriculum content.
//!
//! The engine never talks to a search index directly; it goes through
//! `ContentSearch`, which an embedding index, a SQL full-text search,
//! or an in-memory fixture can all implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// A curriculum lesson as stored by the content collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumItem {
    /// Lesson ID
    pub id: Uuid,

    /// Lesson title
    pub title: String,

    /// Title of the course containing the lesson
    pub course_title: String,

    /// Learning objectives, used as a ranking signal
    #[serde(default)]
    pub learning_objectives: Vec<String>,

    /// Lesson body text
    pub body: String,

    /// Only published lessons are ever searchable
    pub published: bool,
}

/// A ranked excerpt handed to the context assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonExcerpt {
    /// Source lesson ID
    pub lesson_id: Uuid,

    /// Lesson title (the citation key the model is told to use)
    pub title: String,

    /// Containing course title
    pub course_title: String,

    /// Excerpt of the lesson body
    pub excerpt: String,
}

/// A reference from an assistant message to a curriculum lesson.
///
/// A pure function of the generated text and the retrieved context —
/// extracting twice from the same inputs yields the same set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub lesson_id: Uuid,
    pub title: String,
    pub course_title: String,
}

impl From<&LessonExcerpt> for Citation {
    fn from(excerpt: &LessonExcerpt) -> Self {
        Self {
            lesson_id: excerpt.lesson_id,
            title: excerpt.title.clone(),
            course_title: excerpt.course_title.clone(),
        }
    }
}

/// An OR-combined term query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Search terms, any of which may match
    pub terms: Vec<String>,

    /// Maximum candidates to return
    pub limit: usize,
}

/// The external search capability, restricted to published content.
///
/// Implementations must return an empty list for zero matches, never
/// an error.
#[async_trait]
pub trait ContentSearch: Send + Sync {
    /// Find published items matching any query term.
    async fn search(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Vec<CurriculumItem>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_from_excerpt() {
        let excerpt = LessonExcerpt {
            lesson_id: Uuid::new_v4(),
            title: "Managing Overwhelm".into(),
            course_title: "Foundations of Focus".into(),
            excerpt: "When everything feels urgent...".into(),
        };
        let citation = Citation::from(&excerpt);
        assert_eq!(citation.lesson_id, excerpt.lesson_id);
        assert_eq!(citation.title, "Managing Overwhelm");
        assert_eq!(citation.course_title, "Foundations of Focus");
    }

    #[test]
    fn query_serialization() {
        let query = SearchQuery {
            terms: vec!["overwhelmed".into(), "planning".into()],
            limit: 5,
        };
        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("overwhelmed"));
    }
}
