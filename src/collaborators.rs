//! Contracts for the external extractors and remediation writers.
//!
//! Implementations are free to call LLMs or video services; the pipeline only
//! depends on the shapes below. [`Retrying`] wraps any implementation with
//! per-attempt timeouts and bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::CollaboratorError;
use crate::models::{LabelFix, Role, Signal, Tone, Window};

pub type CallResult<T> = std::result::Result<T, CollaboratorError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermExtraction {
    pub terms: Vec<String>,
    #[serde(default)]
    pub acronyms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsEvidence {
    pub claims: Vec<String>,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTag {
    pub role: Role,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualCheck {
    pub severity: f64,
}

#[async_trait]
pub trait Collaborators: Send + Sync {
    async fn extract_terms(&self, window: &Window) -> CallResult<TermExtraction>;

    async fn classify_claims_evidence(&self, window: &Window) -> CallResult<ClaimsEvidence>;

    async fn role_tag(&self, window: &Window) -> CallResult<RoleTag>;

    async fn check_term_definition(&self, window: &Window, term: &str) -> CallResult<bool>;

    async fn visual_mismatch(&self, window: &Window) -> CallResult<VisualCheck>;

    async fn label_and_fix(
        &self,
        window: &Window,
        triggered: &[Signal],
        terms: &[String],
    ) -> CallResult<LabelFix>;

    async fn roast_variants(&self, remediation: &LabelFix) -> CallResult<Tone>;
}

pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl<C: Collaborators> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy, call_timeout_ms: u64) -> Self {
        Self {
            inner,
            policy,
            call_timeout: Duration::from_millis(call_timeout_ms),
        }
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &str,
        window_id: Option<usize>,
        f: F,
    ) -> CallResult<T>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = CallResult<T>> + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::Timeout(self.call_timeout.as_millis() as u64)),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay_ms = self.policy.delay_ms(attempt);
                    warn!(
                        operation,
                        window_id = ?window_id,
                        attempt,
                        delay_ms,
                        error = %err,
                        "retrying collaborator call"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<C: Collaborators> Collaborators for Retrying<C> {
    async fn extract_terms(&self, window: &Window) -> CallResult<TermExtraction> {
        self.call("extract_terms", Some(window.id), || self.inner.extract_terms(window))
            .await
    }

    async fn classify_claims_evidence(&self, window: &Window) -> CallResult<ClaimsEvidence> {
        self.call("classify_claims_evidence", Some(window.id), || {
            self.inner.classify_claims_evidence(window)
        })
        .await
    }

    async fn role_tag(&self, window: &Window) -> CallResult<RoleTag> {
        self.call("role_tag", Some(window.id), || self.inner.role_tag(window))
            .await
    }

    async fn check_term_definition(&self, window: &Window, term: &str) -> CallResult<bool> {
        self.call("check_term_definition", Some(window.id), || {
            self.inner.check_term_definition(window, term)
        })
        .await
    }

    async fn visual_mismatch(&self, window: &Window) -> CallResult<VisualCheck> {
        self.call("visual_mismatch", Some(window.id), || self.inner.visual_mismatch(window))
            .await
    }

    async fn label_and_fix(
        &self,
        window: &Window,
        triggered: &[Signal],
        terms: &[String],
    ) -> CallResult<LabelFix> {
        self.call("label_and_fix", Some(window.id), || {
            self.inner.label_and_fix(window, triggered, terms)
        })
        .await
    }

    async fn roast_variants(&self, remediation: &LabelFix) -> CallResult<Tone> {
        self.call("roast_variants", None, || self.inner.roast_variants(remediation))
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Scripted responses keyed by window id. Operations named in `failing`
    /// always fail with a malformed-response error.
    #[derive(Default)]
    pub struct Scripted {
        pub terms: BTreeMap<usize, Vec<String>>,
        pub claims: BTreeMap<usize, ClaimsEvidence>,
        pub roles: BTreeMap<usize, Role>,
        pub undefined_terms: BTreeSet<String>,
        pub visual: BTreeMap<usize, f64>,
        pub failing: BTreeSet<&'static str>,
        pub rate_limited_calls: AtomicUsize,
        pub calls: AtomicUsize,
        /// Milliseconds `extract_terms` stalls for, per window.
        pub delays_ms: BTreeMap<usize, u64>,
        /// Window ids in the order their `extract_terms` call finished.
        pub finished: Mutex<Vec<usize>>,
    }

    impl Scripted {
        fn check(&self, operation: &'static str) -> CallResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.rate_limited_calls.load(Ordering::SeqCst);
            if remaining > 0 {
                self.rate_limited_calls.store(remaining - 1, Ordering::SeqCst);
                return Err(CollaboratorError::RateLimited("quota".to_string()));
            }
            if self.failing.contains(operation) {
                return Err(CollaboratorError::Malformed(format!("{operation} failed")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Collaborators for Scripted {
        async fn extract_terms(&self, window: &Window) -> CallResult<TermExtraction> {
            if let Some(delay_ms) = self.delays_ms.get(&window.id) {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            }
            self.finished.lock().unwrap().push(window.id);
            self.check("extract_terms")?;
            Ok(TermExtraction {
                terms: self.terms.get(&window.id).cloned().unwrap_or_default(),
                acronyms: Vec::new(),
            })
        }

        async fn classify_claims_evidence(&self, window: &Window) -> CallResult<ClaimsEvidence> {
            self.check("classify_claims_evidence")?;
            Ok(self.claims.get(&window.id).cloned().unwrap_or_default())
        }

        async fn role_tag(&self, window: &Window) -> CallResult<RoleTag> {
            self.check("role_tag")?;
            Ok(RoleTag {
                role: self.roles.get(&window.id).copied().unwrap_or(Role::Other),
                confidence: 1.0,
            })
        }

        async fn check_term_definition(&self, _window: &Window, term: &str) -> CallResult<bool> {
            self.check("check_term_definition")?;
            Ok(!self.undefined_terms.contains(term))
        }

        async fn visual_mismatch(&self, window: &Window) -> CallResult<VisualCheck> {
            self.check("visual_mismatch")?;
            Ok(VisualCheck {
                severity: self.visual.get(&window.id).copied().unwrap_or(0.0),
            })
        }

        async fn label_and_fix(
            &self,
            _window: &Window,
            triggered: &[Signal],
            _terms: &[String],
        ) -> CallResult<LabelFix> {
            self.check("label_and_fix")?;
            let names: Vec<&str> = triggered.iter().map(|s| s.name()).collect();
            Ok(LabelFix {
                label: format!("scripted: {}", names.join("+")),
                explanation: "scripted explanation".to_string(),
                fix: "scripted fix".to_string(),
            })
        }

        async fn roast_variants(&self, remediation: &LabelFix) -> CallResult<Tone> {
            self.check("roast_variants")?;
            Ok(Tone {
                kind: format!("kind {}", remediation.label),
                honest: format!("honest {}", remediation.label),
                brutal: format!("brutal {}", remediation.label),
            })
        }
    }
}
