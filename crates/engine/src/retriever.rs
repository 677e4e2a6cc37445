//! Content retriever — a thin ranking adapter over the external
//! search capability.
//!
//! Query construction: terms longer than the configured minimum are
//! extracted from the message (case-folded, punctuation-stripped),
//! capped, and OR-combined. Candidates come back from the search seam;
//! this adapter ranks them with the tie-break title match >
//! learning-objective match > body match and truncates excerpts.
//!
//! Zero matches is a normal outcome (empty list), and a failing search
//! backend degrades to an empty list as well — retrieval is never
//! allowed to take down the response path.

use sherpa_config::RetrievalConfig;
use sherpa_core::retrieval::{ContentSearch, CurriculumItem, LessonExcerpt, SearchQuery};
use std::sync::Arc;
use tracing::{debug, warn};

/// Match-class ranks, descending.
const RANK_TITLE: u8 = 3;
const RANK_OBJECTIVE: u8 = 2;
const RANK_BODY: u8 = 1;

/// Ranks external search candidates into prompt-ready excerpts.
pub struct ContentRetriever {
    search: Arc<dyn ContentSearch>,
    config: RetrievalConfig,
}

impl ContentRetriever {
    pub fn new(search: Arc<dyn ContentSearch>, config: RetrievalConfig) -> Self {
        Self { search, config }
    }

    /// Extract an OR query from a chat message.
    pub fn build_query(&self, message: &str) -> SearchQuery {
        let mut terms: Vec<String> = Vec::new();

        for raw in message.split_whitespace() {
            let term: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if term.chars().count() > self.config.min_term_len && !terms.contains(&term) {
                terms.push(term);
            }
            if terms.len() >= self.config.max_terms {
                break;
            }
        }

        SearchQuery {
            terms,
            limit: self.config.limit,
        }
    }

    /// Retrieve and rank curriculum excerpts for a message.
    pub async fn retrieve(&self, message: &str) -> Vec<LessonExcerpt> {
        let query = self.build_query(message);
        if query.terms.is_empty() {
            return Vec::new();
        }

        let items = match self.search.search(&query).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Content search failed, continuing without excerpts");
                return Vec::new();
            }
        };

        let mut ranked: Vec<(u8, usize, CurriculumItem)> = items
            .into_iter()
            .filter(|item| item.published)
            .filter_map(|item| {
                let (best, matches) = Self::score(&item, &query.terms);
                if best == 0 {
                    None
                } else {
                    Some((best, matches, item))
                }
            })
            .collect();

        // Stable sort keeps the backend's order within equal ranks
        ranked.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        ranked.truncate(query.limit);

        debug!(count = ranked.len(), "Retrieved curriculum excerpts");

        ranked
            .into_iter()
            .map(|(_, _, item)| LessonExcerpt {
                lesson_id: item.id,
                title: item.title.clone(),
                course_title: item.course_title.clone(),
                excerpt: excerpt_of(&item.body, self.config.excerpt_chars),
            })
            .collect()
    }

    /// Best match class for the item, plus how many terms matched.
    fn score(item: &CurriculumItem, terms: &[String]) -> (u8, usize) {
        let title = item.title.to_lowercase();
        let body = item.body.to_lowercase();
        let objectives: Vec<String> = item
            .learning_objectives
            .iter()
            .map(|o| o.to_lowercase())
            .collect();

        let mut best = 0u8;
        let mut matches = 0usize;

        for term in terms {
            let rank = if title.contains(term.as_str()) {
                RANK_TITLE
            } else if objectives.iter().any(|o| o.contains(term.as_str())) {
                RANK_OBJECTIVE
            } else if body.contains(term.as_str()) {
                RANK_BODY
            } else {
                continue;
            };
            matches += 1;
            best = best.max(rank);
        }

        (best, matches)
    }
}

/// Leading slice of a lesson body, cut on a char boundary.
fn excerpt_of(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        body.chars().take(max_chars).collect()
    }
}

/// An in-memory curriculum index. Backs tests and small deployments;
/// the production search seam is expected to be a real index.
pub struct InMemoryCurriculum {
    items: Vec<CurriculumItem>,
}

impl InMemoryCurriculum {
    pub fn new(items: Vec<CurriculumItem>) -> Self {
        Self { items }
    }
}

#[async_trait::async_trait]
impl ContentSearch for InMemoryCurriculum {
    async fn search(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Vec<CurriculumItem>, sherpa_core::error::StoreError> {
        let matches: Vec<CurriculumItem> = self
            .items
            .iter()
            .filter(|item| item.published)
            .filter(|item| {
                let haystack = format!(
                    "{} {} {}",
                    item.title.to_lowercase(),
                    item.learning_objectives.join(" ").to_lowercase(),
                    item.body.to_lowercase()
                );
                query.terms.iter().any(|t| haystack.contains(t.as_str()))
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}
