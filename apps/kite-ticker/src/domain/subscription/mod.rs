//! Subscription Registry
//!
//! Tracks which instrument tokens the caller wants to stream and in which
//! [`Mode`]. The registry records *intent*: it is updated whether or not the
//! ticker is connected, and after every (re)connect the wire is rebuilt from
//! it via [`SubscriptionRegistry::replay_plan`].
//!
//! # Semantics
//!
//! - `subscribe` adds tokens with the default mode (`quote`); tokens that are
//!   already present keep their mode.
//! - `unsubscribe` removes tokens; subscribing again starts from `quote`.
//! - `set_mode` only touches tokens that are already subscribed.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::streaming::Mode;

/// Instrument token as assigned by the exchange.
pub type InstrumentToken = u32;

// =============================================================================
// Replay Plan
// =============================================================================

/// Wire operations needed to make the server's view match the registry.
///
/// Applied in order: unsubscribe everything, subscribe everything, then one
/// mode change per mode group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayPlan {
    /// Every registered token, ascending.
    pub tokens: Vec<InstrumentToken>,
    /// Non-empty mode groups in `ltp`, `quote`, `full` order.
    pub mode_groups: Vec<(Mode, Vec<InstrumentToken>)>,
}

impl ReplayPlan {
    /// Check if there is nothing to replay.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe token → mode map.
///
/// # Example
///
/// ```rust
/// use kite_ticker::domain::streaming::Mode;
/// use kite_ticker::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
/// registry.subscribe(&[408_065, 884_737]);
/// registry.set_mode(&[408_065], Mode::Full);
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot[&408_065], Mode::Full);
/// assert_eq!(snapshot[&884_737], Mode::Quote);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    tokens: RwLock<BTreeMap<InstrumentToken, Mode>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens in the default mode.
    ///
    /// Returns the tokens that were not registered before.
    pub fn subscribe(&self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        let mut map = self.tokens.write();
        let mut added = Vec::new();

        for &token in tokens {
            if !map.contains_key(&token) {
                map.insert(token, Mode::default());
                added.push(token);
            }
        }

        added
    }

    /// Remove tokens.
    ///
    /// Returns the tokens that were actually registered.
    pub fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Vec<InstrumentToken> {
        let mut map = self.tokens.write();
        tokens
            .iter()
            .filter(|token| map.remove(*token).is_some())
            .copied()
            .collect()
    }

    /// Change the mode of already subscribed tokens.
    ///
    /// Unknown tokens are ignored. Returns the tokens whose entry was updated.
    pub fn set_mode(&self, tokens: &[InstrumentToken], mode: Mode) -> Vec<InstrumentToken> {
        let mut map = self.tokens.write();
        let mut updated = Vec::new();

        for token in tokens {
            if let Some(current) = map.get_mut(token) {
                *current = mode;
                updated.push(*token);
            }
        }

        updated
    }

    /// Get the mode of a single token.
    #[must_use]
    pub fn mode_of(&self, token: InstrumentToken) -> Option<Mode> {
        self.tokens.read().get(&token).copied()
    }

    /// Copy of the full token → mode mapping.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<InstrumentToken, Mode> {
        self.tokens.read().clone()
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Check if no tokens are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    /// Build the operations that restore every subscription on a fresh
    /// connection.
    #[must_use]
    pub fn replay_plan(&self) -> ReplayPlan {
        let map = self.tokens.read();
        let tokens: Vec<_> = map.keys().copied().collect();

        let mode_groups = Mode::all()
            .iter()
            .filter_map(|mode| {
                let group: Vec<_> = map
                    .iter()
                    .filter(|(_, m)| *m == mode)
                    .map(|(token, _)| *token)
                    .collect();
                (!group.is_empty()).then_some((*mode, group))
            })
            .collect();

        ReplayPlan {
            tokens,
            mode_groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_defaults_to_quote() {
        let registry = SubscriptionRegistry::new();
        let added = registry.subscribe(&[1, 2]);

        assert_eq!(added, vec![1, 2]);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&1], Mode::Quote);
        assert_eq!(snapshot[&2], Mode::Quote);
    }

    #[test]
    fn set_mode_changes_only_targeted_token() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&[1, 2]);
        registry.set_mode(&[1], Mode::Full);

        assert_eq!(registry.mode_of(1), Some(Mode::Full));
        assert_eq!(registry.mode_of(2), Some(Mode::Quote));
    }

    #[test]
    fn resubscribe_keeps_existing_mode() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&[1]);
        registry.set_mode(&[1], Mode::Ltp);

        let added = registry.subscribe(&[1]);
        assert!(added.is_empty());
        assert_eq!(registry.mode_of(1), Some(Mode::Ltp));
    }

    #[test]
    fn set_mode_on_unknown_token_is_noop() {
        let registry = SubscriptionRegistry::new();
        let updated = registry.set_mode(&[42], Mode::Full);

        assert!(updated.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn unsubscribe_then_subscribe_resets_mode() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&[7, 8]);
        registry.set_mode(&[7], Mode::Full);

        let removed = registry.unsubscribe(&[7, 99]);
        assert_eq!(removed, vec![7]);
        assert!(!registry.snapshot().contains_key(&7));

        registry.subscribe(&[7]);
        assert_eq!(registry.mode_of(7), Some(Mode::Quote));
    }

    #[test]
    fn replay_plan_groups_by_mode() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&[30, 10, 20]);
        registry.set_mode(&[10], Mode::Full);
        registry.set_mode(&[30], Mode::Ltp);

        let plan = registry.replay_plan();
        assert_eq!(plan.tokens, vec![10, 20, 30]);
        assert_eq!(
            plan.mode_groups,
            vec![
                (Mode::Ltp, vec![30]),
                (Mode::Quote, vec![20]),
                (Mode::Full, vec![10]),
            ]
        );
    }

    #[test]
    fn replay_plan_skips_empty_groups() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&[1, 2]);

        let plan = registry.replay_plan();
        assert_eq!(plan.mode_groups, vec![(Mode::Quote, vec![1, 2])]);
    }

    #[test]
    fn empty_registry_has_empty_plan() {
        assert!(SubscriptionRegistry::new().replay_plan().is_empty());
    }

    #[test]
    fn concurrent_updates_are_consistent() {
        let registry = std::sync::Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..4u32)
            .map(|worker| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.subscribe(&[worker * 1000 + i]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 400);
    }
}
