//! Ordered strategy list where the first non-empty success wins.
//!
//! Both table-of-contents extraction (outline, headings, model) and
//! web-search fallback (one provider after another) are a [`TierChain`].
//! A tier that errors is logged and skipped; a tier that succeeds with
//! nothing lets the next one try.

use async_trait::async_trait;
use tracing::{debug, warn};

/// One strategy in a [`TierChain`].
#[async_trait]
pub trait Tier<I: ?Sized + Sync, O: Send>: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means "nothing here, try the next tier".
    async fn attempt(&self, input: &I) -> anyhow::Result<Option<O>>;
}

/// A tier that failed while the chain ran.
#[derive(Debug, Clone)]
pub struct TierFailure {
    pub tier: String,
    pub error: String,
}

/// Result of running a chain.
#[derive(Debug)]
pub struct ChainOutcome<O> {
    /// The first non-empty value, if any tier produced one.
    pub value: Option<O>,
    /// Name of the tier that produced `value`.
    pub tier: Option<String>,
    pub failures: Vec<TierFailure>,
}

impl<O> ChainOutcome<O> {
    /// True when every tier errored (and at least one tier ran).
    pub fn all_failed(&self, tiers: usize) -> bool {
        self.value.is_none() && tiers > 0 && self.failures.len() == tiers
    }
}

/// Values that can be "empty", letting a tier succeed without a result.
pub trait IsEmpty {
    fn is_empty_value(&self) -> bool;
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

pub struct TierChain<I: ?Sized + Sync, O: Send> {
    tiers: Vec<Box<dyn Tier<I, O>>>,
}

impl<I: ?Sized + Sync, O: IsEmpty + Send> TierChain<I, O> {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn push(mut self, tier: Box<dyn Tier<I, O>>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn run(&self, input: &I) -> ChainOutcome<O> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            match tier.attempt(input).await {
                Ok(Some(value)) if !value.is_empty_value() => {
                    debug!(tier = tier.name(), "tier produced a result");
                    return ChainOutcome {
                        value: Some(value),
                        tier: Some(tier.name().to_string()),
                        failures,
                    };
                }
                Ok(_) => debug!(tier = tier.name(), "tier empty, trying next"),
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "tier failed, trying next");
                    failures.push(TierFailure {
                        tier: tier.name().to_string(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        ChainOutcome {
            value: None,
            tier: None,
            failures,
        }
    }
}

impl<I: ?Sized + Sync, O: IsEmpty + Send> Default for TierChain<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Fail,
        Empty,
        Value(u32),
    }

    struct Fixed {
        name: String,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tier<str, Vec<u32>> for Fixed {
        fn name(&self) -> &str {
            &self.name
        }

        async fn attempt(&self, _input: &str) -> anyhow::Result<Option<Vec<u32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Fail => anyhow::bail!("{} is down", self.name),
                Behaviour::Empty => Ok(Some(Vec::new())),
                Behaviour::Value(v) => Ok(Some(vec![v])),
            }
        }
    }

    fn tier(name: &str, behaviour: Behaviour, calls: &Arc<AtomicUsize>) -> Box<dyn Tier<str, Vec<u32>>> {
        Box::new(Fixed {
            name: name.to_string(),
            behaviour,
            calls: Arc::clone(calls),
        })
    }

    #[tokio::test]
    async fn test_first_non_empty_wins_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new()
            .push(tier("a", Behaviour::Fail, &calls))
            .push(tier("b", Behaviour::Empty, &calls))
            .push(tier("c", Behaviour::Value(7), &calls))
            .push(tier("d", Behaviour::Value(9), &calls));

        let out = chain.run("q").await;
        assert_eq!(out.value, Some(vec![7]));
        assert_eq!(out.tier.as_deref(), Some("c"));
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].tier, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new()
            .push(tier("a", Behaviour::Fail, &calls))
            .push(tier("b", Behaviour::Fail, &calls));
        let out = chain.run("q").await;
        assert!(out.value.is_none());
        assert!(out.all_failed(chain.len()));
    }

    #[tokio::test]
    async fn test_all_empty_is_not_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new().push(tier("a", Behaviour::Empty, &calls));
        let out = chain.run("q").await;
        assert!(out.value.is_none());
        assert!(!out.all_failed(chain.len()));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain: TierChain<str, Vec<u32>> = TierChain::new();
        let out = chain.run("q").await;
        assert!(out.value.is_none() && out.failures.is_empty());
    }
}
