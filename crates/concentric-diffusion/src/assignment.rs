//! Ring assignment - which cohort each participant sits in
//!
//! Placement is deterministic: a SHA-256 hash of the session and participant
//! ids picks a center ring, and the least populated ring in a small window
//! around it wins. Departures trigger rebalancing back to a spread of at most
//! one participant between the fullest and emptiest ring.

use std::collections::{BTreeMap, BTreeSet};

use concentric_core::{
    ConfigError, Participant, ParticipantId, PropagationConfig, Ring, SessionId, Timestamp,
    ValidationError,
};
use sha2::{Digest, Sha256};

/// One participant moved by rebalancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMove {
    pub participant: ParticipantId,
    pub from: Ring,
    pub to: Ring,
}

/// Outcome of planning a rebalance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalancePlan {
    /// Moves in the order they should be applied
    pub moves: Vec<RingMove>,
    /// Imbalance remains because only pinned participants could restore it
    pub deferred: bool,
}

/// Result of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Ring the joining participant ended up in
    pub ring: Ring,
    /// Other participants moved by a deferred rebalance the join unblocked
    pub moves: Vec<RingMove>,
}

/// Placement hash: first 8 bytes (little-endian) of SHA-256(session ‖ participant)
pub fn placement_hash(session: SessionId, participant: ParticipantId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(session.to_bytes());
    hasher.update(participant.to_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// The `k` rings nearest `center`; equal distance puts the lower ring first
fn nearest_rings(center: Ring, k: u16, total_rings: u16) -> Vec<Ring> {
    let k = k.min(total_rings) as usize;
    let mut rings = Vec::with_capacity(k);
    rings.push(center);

    let mut distance: u16 = 1;
    while rings.len() < k {
        if let Some(lower) = center.checked_sub(distance) {
            rings.push(lower);
        }
        if rings.len() < k {
            let upper = center as u32 + distance as u32;
            if upper < total_rings as u32 {
                rings.push(upper as Ring);
            }
        }
        distance += 1;
    }
    rings
}

/// Plan the moves that bring `participants` back to a spread of at most one
///
/// While the fullest and emptiest ring differ by more than one, the most
/// recently joined unpinned participant (ties: higher id) of the fullest
/// ring that has one moves to the emptiest ring (ties: lowest ring). Only
/// rings at least two above the minimum are drained, so every move shrinks
/// the imbalance.
pub fn plan_rebalance(total_rings: u16, participants: &[Participant]) -> RebalancePlan {
    let total = total_rings as usize;
    let mut plan = RebalancePlan::default();
    if total < 2 {
        return plan;
    }

    let mut counts = vec![0usize; total];
    // Movable participants per ring keyed by join order
    let mut movable: Vec<BTreeSet<(Timestamp, ParticipantId)>> = vec![BTreeSet::new(); total];
    for p in participants {
        let ring = p.ring as usize;
        if ring >= total {
            continue;
        }
        counts[ring] += 1;
        if !p.pinned {
            movable[ring].insert((p.joined_at, p.id));
        }
    }

    // participant -> index into plan.moves, so repeated moves collapse
    let mut moved: BTreeMap<ParticipantId, usize> = BTreeMap::new();

    loop {
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        if max - min <= 1 {
            break;
        }
        let target = counts.iter().position(|&c| c == min).unwrap_or(0);

        let mut sources: Vec<usize> = (0..total).filter(|&r| counts[r] >= min + 2).collect();
        sources.sort_by(|a, b| counts[*b].cmp(&counts[*a]).then(a.cmp(b)));

        let Some(source) = sources.into_iter().find(|&r| !movable[r].is_empty()) else {
            plan.deferred = true;
            break;
        };
        let Some(latest) = movable[source].pop_last() else {
            plan.deferred = true;
            break;
        };

        counts[source] -= 1;
        counts[target] += 1;
        movable[target].insert(latest);

        let id = latest.1;
        let to = target as Ring;
        match moved.get(&id) {
            Some(&idx) => plan.moves[idx].to = to,
            None => {
                moved.insert(id, plan.moves.len());
                plan.moves.push(RingMove {
                    participant: id,
                    from: source as Ring,
                    to,
                });
            }
        }
    }

    plan.moves.retain(|m| m.from != m.to);
    plan
}

/// Ring membership for one session
#[derive(Debug, Clone)]
pub struct RingAssignment {
    session: SessionId,
    total_rings: u16,
    ring_size: usize,
    placement_window: u16,
    participants: BTreeMap<ParticipantId, Participant>,
    rings: Vec<BTreeSet<ParticipantId>>,
    deferred: bool,
}

impl RingAssignment {
    /// Create an empty assignment for `session`
    pub fn new(session: SessionId, config: &PropagationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            session,
            total_rings: config.total_rings,
            ring_size: config.ring_size,
            placement_window: config.placement_window,
            participants: BTreeMap::new(),
            rings: vec![BTreeSet::new(); config.total_rings as usize],
            deferred: false,
        })
    }

    /// Ring a new participant would be placed in, given current populations
    pub fn choose_ring(&self, participant: ParticipantId) -> Ring {
        let center = (placement_hash(self.session, participant) % self.total_rings as u64) as Ring;
        let global_min = self.rings.iter().map(|r| r.len()).min().unwrap_or(0);

        let mut window = self.placement_window.max(1).min(self.total_rings);
        loop {
            let best = nearest_rings(center, window, self.total_rings)
                .into_iter()
                .min_by_key(|&r| (self.rings[r as usize].len(), r))
                .unwrap_or(center);

            if self.rings[best as usize].len() <= global_min || window >= self.total_rings {
                return best;
            }
            window = window.saturating_mul(2).min(self.total_rings);
        }
    }

    /// Place a joining participant
    ///
    /// Pinned participants go straight to their ring. If an earlier
    /// departure left a deferred imbalance, the join retries rebalancing.
    pub fn assign(
        &mut self,
        participant: ParticipantId,
        joined_at: Timestamp,
        pinned_ring: Option<Ring>,
    ) -> Result<Placement, ValidationError> {
        if self.participants.contains_key(&participant) {
            return Err(ValidationError::DuplicateParticipant(participant));
        }

        let record = match pinned_ring {
            Some(ring) => {
                if ring >= self.total_rings {
                    return Err(ValidationError::RingOutOfRange {
                        ring,
                        total_rings: self.total_rings,
                    });
                }
                Participant::new(participant, ring, joined_at).pinned()
            }
            None => Participant::new(participant, self.choose_ring(participant), joined_at),
        };

        let ring = record.ring;
        self.rings[ring as usize].insert(participant);
        self.participants.insert(participant, record);

        if self.rings[ring as usize].len() > self.ring_size {
            tracing::debug!(
                session = %self.session,
                ring,
                population = self.rings[ring as usize].len(),
                ring_size = self.ring_size,
                "ring above target size"
            );
        }

        let mut moves = if self.deferred || self.spread() > 1 {
            self.rebalance()
        } else {
            Vec::new()
        };

        let ring = self.ring_of(participant).unwrap_or(ring);
        moves.retain(|m| m.participant != participant);
        Ok(Placement { ring, moves })
    }

    /// Remove a departing participant and rebalance what remains
    pub fn remove(
        &mut self,
        participant: ParticipantId,
    ) -> Result<(Participant, Vec<RingMove>), ValidationError> {
        let record = self
            .participants
            .remove(&participant)
            .ok_or(ValidationError::UnknownParticipant(participant))?;
        self.rings[record.ring as usize].remove(&participant);

        let moves = if self.deferred || self.spread() > 1 {
            self.rebalance()
        } else {
            Vec::new()
        };
        Ok((record, moves))
    }

    /// Plan and apply a rebalance
    pub fn rebalance(&mut self) -> Vec<RingMove> {
        let snapshot: Vec<Participant> = self.participants.values().cloned().collect();
        let plan = plan_rebalance(self.total_rings, &snapshot);

        for m in &plan.moves {
            self.rings[m.from as usize].remove(&m.participant);
            self.rings[m.to as usize].insert(m.participant);
            if let Some(p) = self.participants.get_mut(&m.participant) {
                p.ring = m.to;
            }
        }

        if plan.deferred {
            if !self.deferred {
                tracing::warn!(
                    session = %self.session,
                    spread = self.spread(),
                    "ring imbalance deferred, only pinned participants could restore it"
                );
            }
            self.deferred = true;
        } else {
            self.deferred = false;
        }

        plan.moves
    }

    pub fn ring_of(&self, participant: ParticipantId) -> Option<Ring> {
        self.participants.get(&participant).map(|p| p.ring)
    }

    pub fn participant(&self, participant: ParticipantId) -> Option<&Participant> {
        self.participants.get(&participant)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Members of `ring`, ordered by id
    pub fn members(&self, ring: Ring) -> impl Iterator<Item = ParticipantId> + '_ {
        self.rings
            .get(ring as usize)
            .into_iter()
            .flat_map(|members| members.iter().copied())
    }

    /// Population of every ring, indexed by ring number
    pub fn populations(&self) -> Vec<usize> {
        self.rings.iter().map(|r| r.len()).collect()
    }

    /// Fullest minus emptiest ring population
    pub fn spread(&self) -> usize {
        let max = self.rings.iter().map(|r| r.len()).max().unwrap_or(0);
        let min = self.rings.iter().map(|r| r.len()).min().unwrap_or(0);
        max - min
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Whether an imbalance is waiting for the next join or leave
    pub fn has_deferred_imbalance(&self) -> bool {
        self.deferred
    }
}
