//! The coaching engine — orchestrates one inbound chat message from
//! validation through risk gating, grounded generation, and
//! persistence.
//!
//! Control flow per message: validate → resolve/open the session →
//! assess risk against recent history → on High risk short-circuit to
//! a scripted supportive reply and enqueue an escalation (no vendor
//! call is made) → otherwise assemble a grounded prompt, route it
//! through the vendor chain, extract citations, persist the exchange,
//! and maybe fold old history into the session summary.
//!
//! The engine is an explicitly constructed, dependency-injected
//! instance: no globals, one engine per configuration.
//!
//! User-facing faults never escape `handle`: the caller receives a
//! grounded reply, a scripted safety reply, or a scripted fallback.
//! Only validation rejections and infrastructure (store) faults are
//! surfaced as errors.

use crate::citations;
use crate::context::{AssembledPrompt, ContextAssembler};
use crate::retriever::ContentRetriever;
use serde::{Deserialize, Serialize};
use sherpa_config::{AppConfig, RepliesConfig};
use sherpa_core::error::{Error, ValidationError};
use sherpa_core::event::{DomainEvent, EventBus};
use sherpa_core::message::{ConversationSession, Message, Sender, SessionId, UserId};
use sherpa_core::provider::GenerationRequest;
use sherpa_core::retrieval::{Citation, ContentSearch};
use sherpa_core::risk::{RiskLevel, RiskSignalBundle, UserContext};
use sherpa_core::store::{EscalationStore, SessionStore};
use sherpa_providers::{GenerationOutcome, VendorRouter};
use sherpa_safety::{EscalationQueue, RegionalResources, RiskAssessor};
use sherpa_store::Summarizer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: UserId,

    /// Resume an existing session; a missing, foreign, or closed
    /// session falls back to resolving the user's open session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    pub text: String,

    #[serde(default)]
    pub user_context: UserContext,
}

/// The engine's answer. `fallback` marks degraded replies served when
/// every vendor was exhausted or the caller cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReply {
    pub session_id: SessionId,
    pub reply_text: String,
    pub citations: Vec<Citation>,
    pub risk: RiskSignalBundle,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<Uuid>,
    pub fallback: bool,
}

/// The orchestration engine.
pub struct CoachingEngine {
    sessions: Arc<dyn SessionStore>,
    assessor: RiskAssessor,
    assembler: ContextAssembler,
    router: VendorRouter,
    queue: EscalationQueue,
    resources: RegionalResources,
    summarizer: Summarizer,
    events: Arc<EventBus>,
    replies: RepliesConfig,
    max_message_chars: usize,
    history_fetch: usize,
    max_tokens: u32,
    temperature: f32,
}

impl CoachingEngine {
    /// Wire an engine from configuration and injected collaborators.
    pub fn new(
        config: &AppConfig,
        sessions: Arc<dyn SessionStore>,
        escalations: Arc<dyn EscalationStore>,
        search: Arc<dyn ContentSearch>,
        router: VendorRouter,
        events: Arc<EventBus>,
    ) -> Self {
        let retriever = ContentRetriever::new(search, config.retrieval.clone());
        let queue = EscalationQueue::new(
            escalations,
            RegionalResources::from_config(&config.resources),
            config.risk.urgent_threshold,
        )
        .with_events(events.clone());

        Self {
            sessions,
            assessor: RiskAssessor::new(config.risk.clone()),
            assembler: ContextAssembler::new(retriever, config.history_turns),
            router,
            queue,
            resources: RegionalResources::from_config(&config.resources),
            summarizer: Summarizer::new(config.summarize.clone()),
            events,
            replies: config.replies.clone(),
            max_message_chars: config.max_message_chars,
            // Enough raw messages to cover the prompt window and the
            // assessor's temporal window after sender filtering
            history_fetch: config.history_turns.max(config.risk.temporal_window) * 4,
            max_tokens: config.default_max_tokens,
            temperature: config.default_temperature,
        }
    }

    /// Handle one chat message end to end.
    pub async fn handle(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<EngineReply, Error> {
        // Validation happens before any processing
        if request.text.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let len = request.text.chars().count();
        if len > self.max_message_chars {
            return Err(ValidationError::MessageTooLong {
                len,
                max: self.max_message_chars,
            }
            .into());
        }
        let text = request.text.trim();

        let session = self.resolve_session(&request).await?;
        let history = self.sessions.history(session.id, self.history_fetch).await?;

        // Risk gate: score against recent user turns
        let recent_user: Vec<String> = history
            .iter()
            .filter(|m| m.sender == Sender::User)
            .map(|m| m.content.clone())
            .collect();
        let bundle = self
            .assessor
            .assess(text, &recent_user, &request.user_context);
        let level = bundle.level(&self.assessor.policy().thresholds);

        self.events.publish(DomainEvent::MessageAssessed {
            session_id: session.id.to_string(),
            level,
            composite: bundle.composite,
            timestamp: chrono::Utc::now(),
        });

        let user_message = self
            .sessions
            .append(
                session.id,
                Message::user(session.id, text).with_risk(bundle.clone()),
            )
            .await?;

        match level {
            RiskLevel::High => {
                return self
                    .handle_high_risk(&request, &session, &user_message, bundle, level)
                    .await;
            }
            RiskLevel::Medium => {
                // Logged for monitoring; generation continues
                info!(
                    session_id = %session.id,
                    composite = bundle.composite,
                    policy = %self.assessor.policy().version,
                    "Medium risk signals, monitoring"
                );
            }
            RiskLevel::Normal => {}
        }

        let prompt = self
            .assembler
            .build(&session, &history, &request.user_context, text)
            .await;

        self.generate_and_persist(&session, prompt, bundle, level, cancel)
            .await
    }

    /// Resolve the target session: reuse the caller's open session or
    /// open one for the user.
    async fn resolve_session(
        &self,
        request: &ChatRequest,
    ) -> Result<ConversationSession, Error> {
        if let Some(id) = request.session_id {
            if let Some(session) = self.sessions.get_session(id).await? {
                if session.user_id == request.user_id && session.is_open() {
                    return Ok(session);
                }
            }
            warn!(
                session_id = %id,
                "Requested session unavailable, resolving the user's open session"
            );
        }
        Ok(self.sessions.open(request.user_id).await?)
    }

    /// High-risk short-circuit: scripted supportive reply with regional
    /// hotlines, escalation enqueued, and no vendor call issued.
    async fn handle_high_risk(
        &self,
        request: &ChatRequest,
        session: &ConversationSession,
        user_message: &Message,
        bundle: RiskSignalBundle,
        level: RiskLevel,
    ) -> Result<EngineReply, Error> {
        let locale = &request.user_context.locale;

        // Best-effort: a lost escalation record must never block the
        // safety reply, but it is surfaced as its own failure signal
        let escalation_id = match self
            .queue
            .enqueue(request.user_id, user_message, &bundle, locale)
            .await
        {
            Ok(record) => Some(record.id),
            Err(e) => {
                error!(
                    message_id = %user_message.id,
                    error = %e,
                    "Escalation enqueue failed; response path continues"
                );
                self.events.publish(DomainEvent::EscalationWriteFailed {
                    message_id: user_message.id.to_string(),
                    error: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                None
            }
        };

        let reply_text = self.crisis_reply(locale);
        self.sessions
            .append(session.id, Message::assistant(session.id, &reply_text))
            .await?;

        Ok(EngineReply {
            session_id: session.id,
            reply_text,
            citations: Vec::new(),
            risk: bundle,
            risk_level: level,
            escalation_id,
            fallback: false,
        })
    }

    /// Route the prompt through the vendor chain and persist whatever
    /// complete reply came back.
    async fn generate_and_persist(
        &self,
        session: &ConversationSession,
        prompt: AssembledPrompt,
        bundle: RiskSignalBundle,
        level: RiskLevel,
        cancel: &CancellationToken,
    ) -> Result<EngineReply, Error> {
        let generation_request = GenerationRequest {
            system_prompt: prompt.system_instruction,
            turns: prompt.turns,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.router.generate(&generation_request, cancel).await {
            GenerationOutcome::Generated { reply, provider } => {
                let cited = citations::extract(&reply.text, &prompt.excerpts);

                self.sessions
                    .append(
                        session.id,
                        Message::assistant(session.id, &reply.text)
                            .with_citations(cited.clone())
                            .with_token_count(reply.output_tokens),
                    )
                    .await?;

                self.events.publish(DomainEvent::ReplyGenerated {
                    session_id: session.id.to_string(),
                    provider,
                    tokens_used: reply.total_tokens(),
                    timestamp: chrono::Utc::now(),
                });

                match self
                    .summarizer
                    .maybe_fold(self.sessions.as_ref(), session.id)
                    .await
                {
                    Ok(Some(fold)) => {
                        self.events.publish(DomainEvent::SessionSummarized {
                            session_id: session.id.to_string(),
                            folded_turns: fold.folded_turns,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!(session_id = %session.id, error = %e, "Summarization failed"),
                }

                Ok(EngineReply {
                    session_id: session.id,
                    reply_text: reply.text,
                    citations: cited,
                    risk: bundle,
                    risk_level: level,
                    escalation_id: None,
                    fallback: false,
                })
            }

            GenerationOutcome::Fallback { text, reason } => {
                // A degraded but complete reply: persist it so the
                // transcript matches what the user saw
                self.sessions
                    .append(session.id, Message::assistant(session.id, &text))
                    .await?;

                info!(
                    session_id = %session.id,
                    reason = reason.as_str(),
                    "Served fallback reply"
                );

                Ok(EngineReply {
                    session_id: session.id,
                    reply_text: text,
                    citations: Vec::new(),
                    risk: bundle,
                    risk_level: level,
                    escalation_id: None,
                    fallback: true,
                })
            }

            GenerationOutcome::Cancelled => {
                // Client went away mid-generation: skip persistence of
                // any partial response entirely
                info!(session_id = %session.id, "Generation cancelled by caller");
                Ok(EngineReply {
                    session_id: session.id,
                    reply_text: self.replies.fallback.clone(),
                    citations: Vec::new(),
                    risk: bundle,
                    risk_level: level,
                    escalation_id: None,
                    fallback: true,
                })
            }
        }
    }

    /// The scripted supportive reply with regional hotlines appended.
    fn crisis_reply(&self, locale: &str) -> String {
        let mut reply = self.replies.crisis.clone();
        for hotline in self.resources.resources_for(locale) {
            reply.push_str(&format!("\n- {}: {}", hotline.name, hotline.contact));
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::InMemoryCurriculum;
    use async_trait::async_trait;
    use sherpa_core::error::ProviderError;
    use sherpa_core::provider::{GenerationReply, Provider};
    use sherpa_store::InMemoryStore;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock vendor that returns fixed text and counts calls.
    pub struct ScriptedProvider {
        text: String,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        pub fn new(text: &str) -> Self {
            Self {
                text: text.into(),
                calls: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<GenerationReply, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            Ok(GenerationReply {
                text: self.text.clone(),
                input_tokens: 100,
                output_tokens: 25,
            })
        }
    }

    fn engine_with(provider: Arc<ScriptedProvider>) -> (CoachingEngine, Arc<InMemoryStore>) {
        let config = AppConfig::default();
        let store = Arc::new(InMemoryStore::new());
        let router = VendorRouter::new(&config.replies.fallback).add(
            provider,
            Duration::from_millis(500),
            0,
            Duration::from_millis(10),
        );
        let engine = CoachingEngine::new(
            &config,
            store.clone(),
            store.clone(),
            Arc::new(InMemoryCurriculum::new(vec![])),
            router,
            Arc::new(EventBus::default()),
        );
        (engine, store)
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            user_id: UserId::new(),
            session_id: None,
            text: text.into(),
            user_context: UserContext::default(),
        }
    }

    #[tokio::test]
    async fn empty_message_rejected_before_processing() {
        let provider = Arc::new(ScriptedProvider::new("hello"));
        let (engine, _store) = engine_with(provider.clone());

        let result = engine.handle(request("   "), &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::EmptyMessage))
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_message_rejected() {
        let provider = Arc::new(ScriptedProvider::new("hello"));
        let (engine, _store) = engine_with(provider.clone());

        let result = engine
            .handle(request(&"x".repeat(5000)), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MessageTooLong { .. }))
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn normal_message_generates_and_persists() {
        let provider = Arc::new(ScriptedProvider::new("Let's plan your week."));
        let (engine, store) = engine_with(provider.clone());

        let reply = engine
            .handle(request("Help me plan my study schedule"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!reply.fallback);
        assert_eq!(reply.reply_text, "Let's plan your week.");
        assert_eq!(reply.risk_level, RiskLevel::Normal);
        assert!(reply.escalation_id.is_none());
        assert_eq!(provider.calls(), 1);

        let history = store.history(reply.session_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, Sender::User);
        assert_eq!(history[1].sender, Sender::Assistant);
        // Vendor-reported output tokens override the estimate
        assert_eq!(history[1].token_count, 25);
    }

    #[tokio::test]
    async fn reuses_open_session_across_messages() {
        let provider = Arc::new(ScriptedProvider::new("ok"));
        let (engine, _store) = engine_with(provider);

        let user = UserId::new();
        let mut req1 = request("first message today");
        req1.user_id = user;
        let mut req2 = request("second message today");
        req2.user_id = user;

        let r1 = engine.handle(req1, &CancellationToken::new()).await.unwrap();
        let r2 = engine.handle(req2, &CancellationToken::new()).await.unwrap();
        assert_eq!(r1.session_id, r2.session_id);
    }

    #[tokio::test]
    async fn foreign_session_id_falls_back_to_own_session() {
        let provider = Arc::new(ScriptedProvider::new("ok"));
        let (engine, store) = engine_with(provider);

        let other_user_session = store.open(UserId::new()).await.unwrap();

        let mut req = request("hello coach");
        req.session_id = Some(other_user_session.id);
        let reply = engine.handle(req, &CancellationToken::new()).await.unwrap();
        assert_ne!(reply.session_id, other_user_session.id);
    }

    #[tokio::test]
    async fn high_risk_short_circuits_without_vendor_call() {
        let provider = Arc::new(ScriptedProvider::new("should never be used"));
        let (engine, store) = engine_with(provider.clone());

        let reply = engine
            .handle(request("I want to kill myself"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.risk_level, RiskLevel::High);
        assert_eq!(provider.calls(), 0);
        assert!(reply.escalation_id.is_some());
        assert!(!reply.fallback);
        assert!(reply.reply_text.contains("988"));

        // Scripted reply persisted as the assistant turn
        let history = store.history(reply.session_id, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sender, Sender::Assistant);
    }

    #[tokio::test]
    async fn cancelled_request_skips_reply_persistence() {
        let provider = Arc::new(ScriptedProvider::new("too late"));
        let (engine, store) = engine_with(provider);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let reply = engine
            .handle(request("help me focus"), &cancel)
            .await
            .unwrap();
        assert!(reply.fallback);

        // The user message persisted, the reply did not
        let history = store.history(reply.session_id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender, Sender::User);
    }
}
