//! Priority policy for competing overlay providers.
//!
//! Overlay slots are scarce: the host shell honors only a handful of
//! overlays per item and breaks ties by each provider's reported priority.
//! There is no runtime negotiation between providers; this module only
//! centralizes the value we declare so every handler instance reports the
//! same number and the policy is testable without the shell.

use crate::status::SyncState;

/// Highest precedence in the shell's 0..=100 scheme. The sync-state badge
/// is this product's primary integration point, so it claims the top slot.
pub const TOP_PRIORITY: i32 = 0;

/// Lowest precedence; reported for providers we know nothing about.
pub const LOWEST_PRIORITY: i32 = 100;

/// Describes this extension instance to the arbiter.
/// Constructed once at process attach, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    provider_id: String,
    declared_priority: i32,
}

impl ProviderDescriptor {
    pub fn new(provider_id: impl Into<String>, declared_priority: i32) -> Self {
        Self {
            provider_id: provider_id.into(),
            declared_priority: declared_priority.clamp(TOP_PRIORITY, LOWEST_PRIORITY),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn declared_priority(&self) -> i32 {
        self.declared_priority
    }
}

#[derive(Debug)]
pub struct PriorityArbiter {
    descriptor: ProviderDescriptor,
}

impl PriorityArbiter {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Priority to report for `provider_id`. We only have authority over our
    /// own declaration; anything else gets the floor value.
    pub fn priority_for(&self, provider_id: &str) -> i32 {
        if provider_id == self.descriptor.provider_id {
            self.descriptor.declared_priority
        } else {
            LOWEST_PRIORITY
        }
    }

    /// Declared priority of this provider, independent of id lookups.
    pub fn declared_priority(&self) -> i32 {
        self.descriptor.declared_priority
    }

    /// Picks the winning state when one path is ambiguously described by
    /// several states (an error badge must never hide behind a synced one).
    pub fn resolve(&self, states: impl IntoIterator<Item = SyncState>) -> SyncState {
        states
            .into_iter()
            .min_by_key(|state| state.precedence())
            .unwrap_or(SyncState::Unknown)
    }
}
