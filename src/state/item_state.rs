/// Work item state definitions for tracking fetch progress
///
/// This module defines every state a work item passes through between being
/// queued and reaching a terminal outcome.
use std::fmt;

/// Represents the current state of a work item in the fetch pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    // ===== Active States =====
    /// Item is queued and waiting for a worker
    Pending,

    /// An attempt is in progress (waiting on the rate limiter or the network)
    InFlight,

    /// The last attempt failed with a retryable error; sleeping before the next one
    AwaitingBackoff,

    // ===== Terminal States =====
    /// Page was fetched, extracted and validated
    Succeeded,

    /// Page failed permanently or ran out of retries
    FailedTerminal,
}

impl ItemState {
    /// Returns true if no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedTerminal)
    }

    /// Returns true if the item may still be processed
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Checks whether moving from `self` to `to` is a legal transition
    ///
    /// ```text
    /// Pending ──> InFlight ──> Succeeded
    ///                │  ▲
    ///                │  └── AwaitingBackoff
    ///                ├────────────┘
    ///                └──> FailedTerminal
    /// ```
    ///
    /// Terminal states have no outgoing transitions.
    pub fn can_transition_to(&self, to: ItemState) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Succeeded)
                | (Self::InFlight, Self::FailedTerminal)
                | (Self::InFlight, Self::AwaitingBackoff)
                | (Self::AwaitingBackoff, Self::InFlight)
        )
    }

    /// Short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::AwaitingBackoff => "awaiting_backoff",
            Self::Succeeded => "succeeded",
            Self::FailedTerminal => "failed_terminal",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
