//! Vendor router — ordered failover chain with per-attempt timeouts
//! and bounded retries.
//!
//! Each attempt races a hard timeout. Transient faults (timeout, rate
//! limit, network, 5xx) are retried on the same vendor up to its retry
//! budget with a backoff delay; permanent faults (auth, malformed
//! request) skip straight to the next vendor. When the whole chain is
//! exhausted the router returns a scripted fallback payload — it never
//! surfaces an unhandled fault to the caller.
//!
//! Total attempts are bounded by the ordered chain, so worst-case
//! wall-clock latency is bounded by `max_latency()`.

use sherpa_core::error::ProviderError;
use sherpa_core::event::{DomainEvent, EventBus};
use sherpa_core::provider::{GenerationReply, GenerationRequest, Provider};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a fallback payload was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Timeout,
    RateLimit,
    ProviderError,
}

impl FallbackReason {
    /// Classify the last fault seen before the chain ran dry.
    fn from_error(error: &ProviderError) -> Self {
        match error {
            ProviderError::Timeout { .. } => Self::Timeout,
            ProviderError::RateLimited { .. } => Self::RateLimit,
            _ => Self::ProviderError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ProviderError => "provider_error",
        }
    }
}

/// The result of a routed generation.
///
/// An explicit three-way outcome so callers cannot forget the fallback
/// case: the type has no "error" arm to bubble past a match.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// A vendor produced a reply
    Generated {
        reply: GenerationReply,
        provider: String,
    },

    /// Every vendor was exhausted; this is the scripted degraded reply
    Fallback { text: String, reason: FallbackReason },

    /// The caller cancelled mid-flight; nothing should be persisted
    Cancelled,
}

impl GenerationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A single vendor in the chain with its attempt budget.
struct RoutedVendor {
    provider: Arc<dyn Provider>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

/// Routes generation requests through an ordered vendor chain.
pub struct VendorRouter {
    chain: Vec<RoutedVendor>,
    fallback_text: String,
    events: Arc<EventBus>,
}

impl VendorRouter {
    /// Create a new router with no vendors. `fallback_text` is the
    /// scripted reply served when the chain is exhausted.
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            chain: Vec::new(),
            fallback_text: fallback_text.into(),
            events: Arc::new(EventBus::default()),
        }
    }

    /// Add a vendor to the end of the chain.
    pub fn add(
        mut self,
        provider: Arc<dyn Provider>,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Self {
        self.chain.push(RoutedVendor {
            provider,
            timeout,
            max_retries,
            backoff,
        });
        self
    }

    /// Publish routing events to a shared bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Number of vendors in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// The worst-case wall-clock latency of `generate`:
    /// Σ over vendors of timeout × (retries + 1) + backoff × retries.
    ///
    /// This bound is an invariant — the always-timing-out test pins it.
    pub fn max_latency(&self) -> Duration {
        self.chain
            .iter()
            .map(|v| v.timeout * (v.max_retries + 1) + v.backoff * v.max_retries)
            .sum()
    }

    /// Generate a reply, failing over through the chain.
    ///
    /// Retries are sequential, never parallel, to respect vendor rate
    /// limits. Cancelling the token aborts the in-flight attempt and
    /// returns `Cancelled` immediately.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let mut last_error = ProviderError::NotConfigured("No vendors in chain".into());

        for (i, vendor) in self.chain.iter().enumerate() {
            let provider_name = vendor.provider.name().to_string();
            let mut attempt: u32 = 0;

            loop {
                if cancel.is_cancelled() {
                    return GenerationOutcome::Cancelled;
                }

                info!(
                    provider = %provider_name,
                    position = i + 1,
                    chain_len = self.chain.len(),
                    attempt = attempt + 1,
                    "Router: trying vendor"
                );

                let call = vendor.provider.generate(request.clone());
                let result = tokio::select! {
                    _ = cancel.cancelled() => return GenerationOutcome::Cancelled,
                    result = tokio::time::timeout(vendor.timeout, call) => result,
                };

                match result {
                    Ok(Ok(reply)) => {
                        return GenerationOutcome::Generated {
                            reply,
                            provider: provider_name,
                        };
                    }
                    Ok(Err(e)) if e.is_transient() => {
                        warn!(
                            provider = %provider_name,
                            error = %e,
                            attempt = attempt + 1,
                            "Router: transient fault"
                        );
                        last_error = e;
                    }
                    Ok(Err(e)) => {
                        warn!(
                            provider = %provider_name,
                            error = %e,
                            "Router: permanent fault, failing over without retry"
                        );
                        last_error = e;
                        break;
                    }
                    Err(_) => {
                        warn!(
                            provider = %provider_name,
                            timeout_ms = vendor.timeout.as_millis() as u64,
                            "Router: attempt timed out"
                        );
                        last_error = ProviderError::Timeout {
                            provider: provider_name.clone(),
                            after_ms: vendor.timeout.as_millis() as u64,
                        };
                    }
                }

                if attempt >= vendor.max_retries {
                    break;
                }
                attempt += 1;

                tokio::select! {
                    _ = cancel.cancelled() => return GenerationOutcome::Cancelled,
                    _ = tokio::time::sleep(vendor.backoff) => {}
                }
            }

            self.events.publish(DomainEvent::ProviderFailedOver {
                from: provider_name,
                error: last_error.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }

        let reason = FallbackReason::from_error(&last_error);
        warn!(
            reason = reason.as_str(),
            error = %last_error,
            "Router: chain exhausted, serving fallback"
        );
        self.events.publish(DomainEvent::FallbackServed {
            reason: reason.as_str().into(),
            timestamp: chrono::Utc::now(),
        });

        GenerationOutcome::Fallback {
            text: self.fallback_text.clone(),
            reason,
        }
    }
}

/// Build a router from the ordered provider chain in configuration.
pub fn build_from_config(config: &sherpa_config::AppConfig) -> VendorRouter {
    let mut router = VendorRouter::new(&config.replies.fallback);

    for entry in &config.providers {
        let api_key = entry
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let provider: Arc<dyn Provider> = if entry.name == "anthropic" {
            let mut p = crate::anthropic::AnthropicProvider::new(&api_key, &entry.model);
            if let Some(url) = &entry.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        } else {
            let base_url = entry
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(&entry.name));
            Arc::new(crate::openai_compat::OpenAiCompatProvider::new(
                &entry.name,
                &base_url,
                &api_key,
                &entry.model,
            ))
        };

        router = router.add(
            provider,
            Duration::from_millis(entry.timeout_ms),
            entry.max_retries,
            Duration::from_millis(entry.backoff_ms),
        );
    }

    router
}

/// Get the default base URL for well-known OpenAI-compatible vendors.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sherpa_core::provider::Turn;
    use std::sync::Mutex;
    use std::time::Instant;

    /// A mock vendor that always fails with a fixed error.
    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<GenerationReply, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock vendor that always succeeds.
    struct SuccessProvider {
        name: String,
        call_count: Mutex<usize>,
    }

    impl SuccessProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for SuccessProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<GenerationReply, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(GenerationReply {
                text: "generated".into(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    /// A mock vendor that hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> std::result::Result<GenerationReply, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn test_request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a coach".into(),
            turns: vec![Turn::user("hello")],
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    fn fast(router: VendorRouter, p: Arc<dyn Provider>, retries: u32) -> VendorRouter {
        router.add(
            p,
            Duration::from_millis(100),
            retries,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn first_vendor_succeeds() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = VendorRouter::new("fallback text");
        let router = fast(router, p1.clone(), 2);
        let router = fast(router, p2.clone(), 2);

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        match outcome {
            GenerationOutcome::Generated { reply, provider } => {
                assert_eq!(reply.text, "generated");
                assert_eq!(provider, "primary");
            }
            other => panic!("Expected Generated, got: {other:?}"),
        }

        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
    }

    #[tokio::test]
    async fn transient_fault_retries_then_fails_over() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::RateLimited {
                retry_after_secs: 1,
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = VendorRouter::new("fallback text");
        let router = fast(router, p1.clone(), 2);
        let router = fast(router, p2.clone(), 2);

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Generated { .. }));

        // Initial attempt + 2 retries on the rate-limited vendor
        assert_eq!(p1.calls(), 3);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn permanent_fault_skips_retries() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::AuthenticationFailed("bad key".into()),
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = VendorRouter::new("fallback text");
        let router = fast(router, p1.clone(), 3);
        let router = fast(router, p2.clone(), 3);

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Generated { .. }));

        // No retries on a permanent fault
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn chain_exhausted_serves_fallback() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(FailingProvider::new(
            "secondary",
            ProviderError::RateLimited {
                retry_after_secs: 30,
            },
        ));

        let router = VendorRouter::new("sorry, try again");
        let router = fast(router, p1.clone(), 0);
        let router = fast(router, p2.clone(), 0);

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        match outcome {
            GenerationOutcome::Fallback { text, reason } => {
                assert_eq!(text, "sorry, try again");
                // Reason reflects the last fault in the chain
                assert_eq!(reason, FallbackReason::RateLimit);
            }
            other => panic!("Expected Fallback, got: {other:?}"),
        }

        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_triggers_failover() {
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = VendorRouter::new("fallback text")
            .add(
                Arc::new(HangingProvider),
                Duration::from_millis(30),
                0,
                Duration::from_millis(1),
            )
            .add(
                p2.clone(),
                Duration::from_millis(100),
                0,
                Duration::from_millis(1),
            );

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        assert!(matches!(outcome, GenerationOutcome::Generated { .. }));
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn all_timeouts_bounded_by_max_latency() {
        // Every vendor always times out: the router must terminate
        // within the advertised bound and serve a fallback.
        let timeout = Duration::from_millis(40);
        let backoff = Duration::from_millis(10);
        let router = VendorRouter::new("fallback text")
            .add(Arc::new(HangingProvider), timeout, 1, backoff)
            .add(Arc::new(HangingProvider), timeout, 1, backoff);

        // 2 vendors × (40ms × 2 attempts + 10ms backoff) = 180ms
        let bound = router.max_latency();
        assert_eq!(bound, Duration::from_millis(180));

        let start = Instant::now();
        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        let elapsed = start.elapsed();

        match outcome {
            GenerationOutcome::Fallback { reason, .. } => {
                assert_eq!(reason, FallbackReason::Timeout);
            }
            other => panic!("Expected Fallback, got: {other:?}"),
        }

        // Scheduling slack on top of the hard bound
        assert!(
            elapsed < bound + Duration::from_millis(100),
            "elapsed {elapsed:?} exceeded bound {bound:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_aborts_inflight_call() {
        let router = VendorRouter::new("fallback text").add(
            Arc::new(HangingProvider),
            Duration::from_secs(60),
            3,
            Duration::from_millis(100),
        );

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let start = Instant::now();
        let outcome = router.generate(&test_request(), &cancel).await;
        assert!(matches!(outcome, GenerationOutcome::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pre_cancelled_token_never_calls_vendor() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let router = VendorRouter::new("fallback text");
        let router = fast(router, p1.clone(), 0);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = router.generate(&test_request(), &cancel).await;
        assert!(matches!(outcome, GenerationOutcome::Cancelled));
        assert_eq!(p1.calls(), 0);
    }

    #[tokio::test]
    async fn empty_chain_serves_fallback() {
        let router = VendorRouter::new("nothing configured");
        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        match outcome {
            GenerationOutcome::Fallback { reason, .. } => {
                assert_eq!(reason, FallbackReason::ProviderError);
            }
            other => panic!("Expected Fallback, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failover_events_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();

        let router = VendorRouter::new("fallback text").with_events(bus);
        let router = fast(
            router,
            Arc::new(FailingProvider::new(
                "primary",
                ProviderError::Network("down".into()),
            )),
            0,
        );

        let outcome = router.generate(&test_request(), &CancellationToken::new()).await;
        assert!(outcome.is_fallback());

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::ProviderFailedOver { .. }
        ));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::FallbackServed { .. }));
    }

    #[test]
    fn max_latency_sums_chain() {
        let router = VendorRouter::new("f")
            .add(
                Arc::new(HangingProvider),
                Duration::from_millis(1000),
                2,
                Duration::from_millis(100),
            )
            .add(
                Arc::new(HangingProvider),
                Duration::from_millis(500),
                0,
                Duration::from_millis(100),
            );

        // 1000×3 + 100×2 + 500×1 + 0 = 3700ms
        assert_eq!(router.max_latency(), Duration::from_millis(3700));
    }

    #[test]
    fn build_from_default_config() {
        let config = sherpa_config::AppConfig::default();
        let router = build_from_config(&config);
        assert_eq!(router.len(), config.providers.len());
        assert!(!router.is_empty());
        assert!(router.max_latency() > Duration::ZERO);
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }
}
