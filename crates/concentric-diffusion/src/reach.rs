//! Reach table - propagation state of every live message
//!
//! Each entry carries a revision. A recompute reads the entry, ticks the
//! clock on a copy and commits against the revision it read; a commit whose
//! revision no longer matches is rejected as a concurrency conflict.

use std::collections::HashMap;

use concentric_core::{EngineError, EngineResult, Message, MessageId, Timestamp, ValidationError};
use concentric_time::PropagationState;

/// One message and its propagation state
#[derive(Debug, Clone)]
pub struct ReachEntry {
    pub message: Message,
    pub state: PropagationState,
    /// Bumped on every change to `state`
    pub revision: u64,
}

/// Message id -> reach entry
#[derive(Debug, Clone, Default)]
pub struct ReachTable {
    entries: HashMap<MessageId, ReachEntry>,
}

impl ReachTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly seeded message at revision 0
    pub fn insert(&mut self, message: Message, state: PropagationState) -> Result<(), ValidationError> {
        if self.entries.contains_key(&message.id) {
            return Err(ValidationError::DuplicateMessage(message.id));
        }
        self.entries.insert(
            message.id,
            ReachEntry {
                message,
                state,
                revision: 0,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: MessageId) -> Option<&ReachEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Replace the state of `id` if nobody committed since `expected_revision`
    ///
    /// States that would move the message inward or shrink its reach are
    /// treated as stale and rejected the same way. Returns the new revision.
    pub fn commit(
        &mut self,
        id: MessageId,
        expected_revision: u64,
        state: PropagationState,
    ) -> EngineResult<u64> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ValidationError::UnknownMessage(id))?;

        let stale = state.current_ring < entry.state.current_ring
            || !state.reach.is_superset(entry.state.reach);
        if entry.revision != expected_revision || stale {
            return Err(EngineError::ConcurrencyConflict {
                message: id,
                expected: expected_revision,
                found: entry.revision,
            });
        }

        entry.state = state;
        entry.revision += 1;
        Ok(entry.revision)
    }

    /// Bump a revision without changing state
    #[cfg(test)]
    pub(crate) fn touch(&mut self, id: MessageId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.revision += 1;
        }
    }

    /// Rebase every entry's clock after a pause
    pub fn resume_from_pause(&mut self, paused_at: Timestamp, resumed_at: Timestamp) {
        for entry in self.entries.values_mut() {
            entry.state.resume_from_pause(paused_at, resumed_at);
            entry.revision += 1;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReachEntry> {
        self.entries.values()
    }

    /// Messages whose clock still runs
    pub fn live(&self) -> impl Iterator<Item = &ReachEntry> {
        self.entries
            .values()
            .filter(|e| !e.state.terminal && e.message.kind.propagates())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
