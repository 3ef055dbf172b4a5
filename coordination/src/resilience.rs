//! Resilience: ordered attempt strategies and capability health.
//!
//! A [`FallbackChain`] holds an ordered list of strategies (for the call
//! adapter: option sets of decreasing richness). Each tier is tried in turn;
//! the first success wins and the last failure is reported if every tier
//! fails.
//!
//! ```text
//! execute(try_fn)
//!   ├─ tier 0 succeeds         → DegradedResponse { level: Full, .. }
//!   ├─ tier 0 fails, tier n ok → DegradedResponse { level: Partial, warnings, .. }
//!   ├─ tier fails fatally      → ChainFailure { aborted: true, .. }
//!   └─ all tiers fail          → ChainFailure { aborted: false, error: last, .. }
//! ```
//!
//! ```rust,ignore
//! let chain = FallbackChain::new("complete", "full", full_opts)
//!     .add_tier("without_max_length", reduced_opts)
//!     .add_tier("bare", CallOptions::default());
//!
//! let served = chain
//!     .execute(|opts| async move { capability.create(model, prompt, &opts).await },
//!              CapabilityError::is_unavailable)
//!     .await?;
//! ```

use std::fmt::Display;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How much of the primary strategy was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DegradationLevel {
    /// Primary tier succeeded.
    Full,
    /// A fallback tier succeeded.
    Partial,
    /// Nothing succeeded.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A successful chain result with degradation metadata.
#[derive(Debug, Clone)]
pub struct DegradedResponse<T> {
    /// The value produced by the serving tier.
    pub payload: T,
    /// `Full` if the primary tier served the value.
    pub level: DegradationLevel,
    /// Name of the tier that served the value.
    pub served_by: String,
    /// One entry per failed tier before the serving one.
    pub warnings: Vec<String>,
    /// Number of tiers tried, including the serving one.
    pub attempts: usize,
}

impl<T> DegradedResponse<T> {
    pub fn is_full(&self) -> bool {
        self.level == DegradationLevel::Full
    }

    pub fn is_degraded(&self) -> bool {
        self.level != DegradationLevel::Full
    }
}

/// Every tier failed, or one failed fatally.
#[derive(Debug, Clone)]
pub struct ChainFailure<E> {
    /// The last error observed.
    pub error: E,
    /// Tier that produced `error`.
    pub tier: String,
    /// Number of tiers tried.
    pub attempts: usize,
    /// `true` when the chain stopped early on a fatal error.
    pub aborted: bool,
    /// One entry per failed tier.
    pub warnings: Vec<String>,
}

/// A named tier in a fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTier<S> {
    /// Identifier for this tier (e.g. `"full"`, `"bare"`).
    pub name: String,
    /// Strategy handed to the attempt closure.
    pub strategy: S,
}

/// Ordered chain of attempt strategies. Always holds at least one tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackChain<S> {
    /// Operation this chain serves, for warnings.
    pub operation: String,
    tiers: Vec<FallbackTier<S>>,
}

impl<S: Clone> FallbackChain<S> {
    /// Create a chain with its primary tier.
    pub fn new(operation: &str, primary: &str, strategy: S) -> Self {
        Self {
            operation: operation.to_string(),
            tiers: vec![FallbackTier {
                name: primary.to_string(),
                strategy,
            }],
        }
    }

    /// Append a fallback tier. Tiers are kept even when their strategy
    /// equals an earlier one, so every named tier is attempted.
    pub fn add_tier(mut self, name: &str, strategy: S) -> Self {
        self.tiers.push(FallbackTier {
            name: name.to_string(),
            strategy,
        });
        self
    }

    /// Number of tiers in the chain.
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Tier names in order.
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name.as_str()).collect()
    }

    /// Try each tier in order until one succeeds.
    ///
    /// `is_fatal` stops the chain immediately for errors no other tier can fix.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut try_fn: F,
        is_fatal: impl Fn(&E) -> bool,
    ) -> Result<DegradedResponse<T>, ChainFailure<E>>
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut warnings = Vec::new();
        let total = self.tiers.len();

        for (idx, tier) in self.tiers.iter().enumerate() {
            debug!(operation = %self.operation, tier = %tier.name, attempt = idx + 1, "trying tier");
            match try_fn(tier.strategy.clone()).await {
                Ok(payload) => {
                    let level = if idx == 0 {
                        DegradationLevel::Full
                    } else {
                        warnings.push(format!(
                            "{}: primary tier(s) failed, using fallback '{}'",
                            self.operation, tier.name
                        ));
                        DegradationLevel::Partial
                    };
                    return Ok(DegradedResponse {
                        payload,
                        level,
                        served_by: tier.name.clone(),
                        warnings,
                        attempts: idx + 1,
                    });
                }
                Err(error) => {
                    warnings.push(format!(
                        "{} '{}' failed: {}",
                        self.operation, tier.name, error
                    ));
                    let last = idx + 1 == total;
                    if last || is_fatal(&error) {
                        return Err(ChainFailure {
                            error,
                            tier: tier.name.clone(),
                            attempts: idx + 1,
                            aborted: !last,
                            warnings,
                        });
                    }
                }
            }
        }

        unreachable!("fallback chain has at least one tier")
    }
}

/// Health of a capability, tracked over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityHealth {
    /// Capability identifier.
    pub capability: String,
    /// Current degradation level.
    pub level: DegradationLevel,
    /// Consecutive successes since last failure.
    pub consecutive_successes: u32,
    /// Consecutive failures since last success.
    pub consecutive_failures: u32,
    /// Total calls made.
    pub total_calls: u64,
    /// Total failures.
    pub total_failures: u64,
    /// Last observed error message.
    pub last_error: Option<String>,
    /// When the level last changed.
    pub last_change: DateTime<Utc>,
}

impl CapabilityHealth {
    /// Create a healthy tracker.
    pub fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            level: DegradationLevel::Full,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_calls: 0,
            total_failures: 0,
            last_error: None,
            last_change: Utc::now(),
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        // Recover after 3 consecutive successes
        if self.level != DegradationLevel::Full && self.consecutive_successes >= 3 {
            self.level = DegradationLevel::Full;
            self.last_change = Utc::now();
            self.last_error = None;
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self, error: &str) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_error = Some(error.to_string());

        let new_level = if self.consecutive_failures >= 3 {
            DegradationLevel::Unavailable
        } else {
            DegradationLevel::Partial
        };

        if new_level != self.level {
            self.level = new_level;
            self.last_change = Utc::now();
        }
    }

    /// Failure rate as a fraction (0.0–1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}
