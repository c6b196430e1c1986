use crate::state::ItemState;
use crate::HarvestError;

/// One URL plus its retry bookkeeping: the unit of scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The URL to fetch, as it appeared in the input
    pub url: String,

    /// Retries performed so far (0 on the first attempt)
    pub attempt_count: u32,

    state: ItemState,
}

impl WorkItem {
    /// Creates a pending work item for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt_count: 0,
            state: ItemState::Pending,
        }
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Total attempts made once the item is terminal
    pub fn attempts(&self) -> u32 {
        self.attempt_count + 1
    }

    /// Moves the item to `to`, rejecting transitions the state machine forbids
    pub fn transition(&mut self, to: ItemState) -> Result<(), HarvestError> {
        if !self.state.can_transition_to(to) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::trace!("{}: {} -> {}", self.url, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Enters backoff and counts the upcoming retry
    pub fn begin_retry(&mut self) -> Result<(), HarvestError> {
        self.transition(ItemState::AwaitingBackoff)?;
        self.attempt_count += 1;
        Ok(())
    }
}
