//! Visibility index - what each participant may currently see
//!
//! Derived entirely from ring membership and message reach. Views are
//! materialised per participant and maintained incrementally: a reach
//! update touches only the members of newly reached rings, a ring move
//! rebuilds only the moved participant's view.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use concentric_core::{MessageId, ParticipantId, Ring, RingSet, ValidationError};
use parking_lot::RwLock;

/// Index shared between the session worker and readers
pub type SharedVisibility = Arc<RwLock<VisibilityIndex>>;

/// Read-side visibility structure for one session
#[derive(Debug, Clone)]
pub struct VisibilityIndex {
    total_rings: u16,
    /// Messages each ring has received, in arrival order
    ring_messages: Vec<Vec<MessageId>>,
    ring_members: Vec<BTreeSet<ParticipantId>>,
    ring_of: HashMap<ParticipantId, Ring>,
    views: HashMap<ParticipantId, BTreeSet<MessageId>>,
    reach: HashMap<MessageId, RingSet>,
}

impl VisibilityIndex {
    pub fn new(total_rings: u16) -> Self {
        Self {
            total_rings,
            ring_messages: vec![Vec::new(); total_rings as usize],
            ring_members: vec![BTreeSet::new(); total_rings as usize],
            ring_of: HashMap::new(),
            views: HashMap::new(),
            reach: HashMap::new(),
        }
    }

    /// Wrap a new index for sharing
    pub fn shared(total_rings: u16) -> SharedVisibility {
        Arc::new(RwLock::new(Self::new(total_rings)))
    }

    fn check_ring(&self, ring: Ring) -> Result<(), ValidationError> {
        if ring >= self.total_rings {
            return Err(ValidationError::RingOutOfRange {
                ring,
                total_rings: self.total_rings,
            });
        }
        Ok(())
    }

    fn build_view(&self, ring: Ring) -> BTreeSet<MessageId> {
        self.ring_messages[ring as usize].iter().copied().collect()
    }

    pub fn add_participant(&mut self, participant: ParticipantId, ring: Ring) -> Result<(), ValidationError> {
        self.check_ring(ring)?;
        if self.ring_of.contains_key(&participant) {
            return Err(ValidationError::DuplicateParticipant(participant));
        }
        self.ring_members[ring as usize].insert(participant);
        self.ring_of.insert(participant, ring);
        self.views.insert(participant, self.build_view(ring));
        Ok(())
    }

    /// Drop a participant and their view; returns whether they were present
    pub fn remove_participant(&mut self, participant: ParticipantId) -> bool {
        match self.ring_of.remove(&participant) {
            Some(ring) => {
                self.ring_members[ring as usize].remove(&participant);
                self.views.remove(&participant);
                true
            }
            None => false,
        }
    }

    /// Move a participant to another ring and rebuild their view
    pub fn move_participant(&mut self, participant: ParticipantId, to: Ring) -> Result<(), ValidationError> {
        self.check_ring(to)?;
        let from = *self
            .ring_of
            .get(&participant)
            .ok_or(ValidationError::UnknownParticipant(participant))?;
        if from == to {
            return Ok(());
        }
        self.ring_members[from as usize].remove(&participant);
        self.ring_members[to as usize].insert(participant);
        self.ring_of.insert(participant, to);
        self.views.insert(participant, self.build_view(to));
        Ok(())
    }

    /// Extend the reach of `message`; returns the rings that were new
    ///
    /// Rings already holding the message keep it even if `reach` omits them.
    pub fn publish_reach(&mut self, message: MessageId, reach: RingSet) -> RingSet {
        let in_range = reach.intersection(RingSet::full(self.total_rings));
        let known = self.reach.get(&message).copied().unwrap_or(RingSet::EMPTY);
        let added = in_range.difference(known);
        if added.is_empty() {
            return added;
        }

        for ring in added.iter() {
            self.ring_messages[ring as usize].push(message);
            for member in &self.ring_members[ring as usize] {
                if let Some(view) = self.views.get_mut(member) {
                    view.insert(message);
                }
            }
        }
        self.reach.insert(message, known.union(added));
        added
    }

    /// Messages visible to `participant`
    pub fn visible_messages(&self, participant: ParticipantId) -> Result<BTreeSet<MessageId>, ValidationError> {
        self.views
            .get(&participant)
            .cloned()
            .ok_or(ValidationError::UnknownParticipant(participant))
    }

    pub fn is_visible(&self, participant: ParticipantId, message: MessageId) -> bool {
        self.views
            .get(&participant)
            .map_or(false, |view| view.contains(&message))
    }

    /// Messages `ring` has received, oldest first
    pub fn ring_feed(&self, ring: Ring) -> &[MessageId] {
        self.ring_messages
            .get(ring as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn reach_of(&self, message: MessageId) -> RingSet {
        self.reach.get(&message).copied().unwrap_or(RingSet::EMPTY)
    }

    pub fn ring_of(&self, participant: ParticipantId) -> Option<Ring> {
        self.ring_of.get(&participant).copied()
    }

    pub fn participant_count(&self) -> usize {
        self.ring_of.len()
    }

    pub fn message_count(&self) -> usize {
        self.reach.len()
    }
}
