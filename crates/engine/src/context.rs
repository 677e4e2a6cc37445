//! Context assembly — builds the grounded, provider-agnostic prompt.
//!
//! The system instruction combines four sections:
//! 1. the coaching identity
//! 2. retrieved curriculum excerpts, with an explicit instruction to
//!    cite lessons by their exact titles
//! 3. the user's progress facts
//! 4. a standing safety clause requiring supportive-but-referring
//!    behavior on any crisis indication
//!
//! Conversation history is trimmed to the most recent turns; older
//! history is represented only through the session's long-term
//! summary. Assembly is deterministic: identical inputs always produce
//! the identical prompt.

use crate::retriever::ContentRetriever;
use sherpa_core::message::{ConversationSession, Message, Sender};
use sherpa_core::provider::Turn;
use sherpa_core::retrieval::LessonExcerpt;
use sherpa_core::risk::UserContext;

const IDENTITY: &str = "You are Sherpa, a supportive personal learning coach. \
    Keep replies practical, warm, and grounded in the user's curriculum.";

const SAFETY_CLAUSE: &str = "If the user shows any indication of crisis, \
    self-harm, or acute distress, respond with supportive language, avoid \
    advice beyond your role, and refer them to professional help.";

/// The assembled prompt plus the excerpts that grounded it (kept for
/// citation extraction downstream).
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_instruction: String,
    pub turns: Vec<Turn>,
    pub excerpts: Vec<LessonExcerpt>,
}

/// Builds grounded prompts. Stateless apart from its retriever and the
/// history window size.
pub struct ContextAssembler {
    retriever: ContentRetriever,
    history_turns: usize,
}

impl ContextAssembler {
    pub fn new(retriever: ContentRetriever, history_turns: usize) -> Self {
        Self {
            retriever,
            history_turns,
        }
    }

    /// Assemble the prompt for the current message.
    ///
    /// `history` is the stored session history (oldest first), not yet
    /// including the current message.
    pub async fn build(
        &self,
        session: &ConversationSession,
        history: &[Message],
        user_context: &UserContext,
        message: &str,
    ) -> AssembledPrompt {
        let excerpts = self.retriever.retrieve(message).await;

        let mut system = String::from(IDENTITY);

        if !excerpts.is_empty() {
            system.push_str("\n\n[Curriculum]\n");
            for excerpt in &excerpts {
                system.push_str(&format!(
                    "Lesson \"{}\" (course: {}): {}\n",
                    excerpt.title, excerpt.course_title, excerpt.excerpt
                ));
            }
            system.push_str(
                "When your reply draws on a lesson, cite it by its exact title in quotes.",
            );
        }

        system.push_str("\n\n[User progress]\n");
        system.push_str(&format!(
            "Completed lessons: {}\n",
            user_context.completed_lessons
        ));
        if let Some(level) = &user_context.level {
            system.push_str(&format!("Level: {level}\n"));
        }
        if let Some(activity) = &user_context.recent_activity {
            system.push_str(&format!("Recent activity: {activity}\n"));
        }
        if !user_context.preferences.is_empty() {
            system.push_str(&format!(
                "Preferences: {}\n",
                user_context.preferences.join(", ")
            ));
        }

        if let Some(summary) = &session.long_term_summary {
            system.push_str(&format!("\n[Earlier history]\n{summary}\n"));
        }

        system.push_str(&format!("\n[Safety]\n{SAFETY_CLAUSE}"));

        // Most recent turns only; older context arrives via the
        // long-term summary section above
        let start = history.len().saturating_sub(self.history_turns);
        let mut turns: Vec<Turn> = history[start..]
            .iter()
            .filter(|m| m.sender != Sender::System)
            .map(|m| Turn {
                sender: m.sender,
                text: m.content.clone(),
            })
            .collect();
        turns.push(Turn::user(message));

        AssembledPrompt {
            system_instruction: system,
            turns,
            excerpts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::InMemoryCurriculum;
    use sherpa_config::RetrievalConfig;
    use sherpa_core::message::{SessionId, UserId};
    use sherpa_core::retrieval::CurriculumItem;
    use std::sync::Arc;
    use uuid::Uuid;

    fn assembler_with(items: Vec<CurriculumItem>) -> ContextAssembler {
        ContextAssembler::new(
            ContentRetriever::new(
                Arc::new(InMemoryCurriculum::new(items)),
                RetrievalConfig::default(),
            ),
            10,
        )
    }

    fn lesson(title: &str, body: &str) -> CurriculumItem {
        CurriculumItem {
            id: Uuid::new_v4(),
            title: title.into(),
            course_title: "Foundations of Focus".into(),
            learning_objectives: vec![],
            body: body.into(),
            published: true,
        }
    }

    fn session() -> ConversationSession {
        ConversationSession::new(UserId::new())
    }

    #[tokio::test]
    async fn curriculum_section_with_citation_instruction() {
        let asm = assembler_with(vec![lesson(
            "Managing Overwhelm",
            "triage, then timebox the top three tasks",
        )]);

        let prompt = asm
            .build(&session(), &[], &UserContext::default(), "so overwhelm at work")
            .await;

        assert!(prompt.system_instruction.contains("[Curriculum]"));
        assert!(prompt.system_instruction.contains("Managing Overwhelm"));
        assert!(prompt.system_instruction.contains("cite it by its exact title"));
        assert_eq!(prompt.excerpts.len(), 1);
    }

    #[tokio::test]
    async fn no_curriculum_section_without_matches() {
        let asm = assembler_with(vec![]);
        let prompt = asm
            .build(&session(), &[], &UserContext::default(), "quarterly budget review")
            .await;
        assert!(!prompt.system_instruction.contains("[Curriculum]"));
        assert!(prompt.excerpts.is_empty());
    }

    #[tokio::test]
    async fn safety_clause_always_present() {
        let asm = assembler_with(vec![]);
        let prompt = asm
            .build(&session(), &[], &UserContext::default(), "hello")
            .await;
        assert!(prompt.system_instruction.contains("[Safety]"));
        assert!(prompt.system_instruction.contains("refer them to professional help"));
    }

    #[tokio::test]
    async fn progress_facts_included() {
        let asm = assembler_with(vec![]);
        let ctx = UserContext {
            completed_lessons: 7,
            level: Some("intermediate".into()),
            recent_activity: Some("finished the planning module".into()),
            preferences: vec!["short sessions".into(), "morning work".into()],
            ..UserContext::default()
        };
        let prompt = asm.build(&session(), &[], &ctx, "hello").await;

        assert!(prompt.system_instruction.contains("Completed lessons: 7"));
        assert!(prompt.system_instruction.contains("Level: intermediate"));
        assert!(prompt.system_instruction.contains("planning module"));
        assert!(prompt.system_instruction.contains("short sessions, morning work"));
    }

    #[tokio::test]
    async fn history_trimmed_to_window() {
        let asm = assembler_with(vec![]);
        let sid = SessionId::new();
        let history: Vec<Message> = (0..25)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(sid, format!("question {i}"))
                } else {
                    Message::assistant(sid, format!("answer {i}"))
                }
            })
            .collect();

        let prompt = asm
            .build(&session(), &history, &UserContext::default(), "latest question")
            .await;

        // 10 history turns + the current message
        assert_eq!(prompt.turns.len(), 11);
        // Oldest kept turn is index 15 of the original 25
        assert_eq!(prompt.turns[0].text, "answer 15");
        assert_eq!(prompt.turns[10].text, "latest question");
    }

    #[tokio::test]
    async fn long_term_summary_included_for_older_context() {
        let asm = assembler_with(vec![]);
        let mut s = session();
        s.long_term_summary = Some("- Goal: run a half marathon".into());

        let prompt = asm.build(&s, &[], &UserContext::default(), "hello").await;
        assert!(prompt.system_instruction.contains("[Earlier history]"));
        assert!(prompt.system_instruction.contains("half marathon"));
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let asm = assembler_with(vec![lesson("Managing Overwhelm", "triage first")]);
        let s = session();
        let ctx = UserContext::default();
        let history = vec![Message::user(s.id, "earlier question")];

        let p1 = asm.build(&s, &history, &ctx, "feeling overwhelm").await;
        let p2 = asm.build(&s, &history, &ctx, "feeling overwhelm").await;

        assert_eq!(p1.system_instruction, p2.system_instruction);
        assert_eq!(p1.turns, p2.turns);
        assert_eq!(p1.excerpts, p2.excerpts);
    }
}
