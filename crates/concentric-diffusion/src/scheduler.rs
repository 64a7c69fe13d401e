//! Propagation scheduler - the per-session orchestrator
//!
//! Consumes session events, folds votes, drives the propagation clock and
//! keeps the visibility index current. Vote and message events are
//! acknowledged once recorded; the clock work they cause is queued as
//! recompute tasks ordered by timestamp and drained while the session is
//! active.

use std::collections::{BTreeMap, HashSet};

use concentric_core::{
    ChangeCause, ConfigError, EngineError, EngineResult, Message, MessageId, MessageKind,
    Participant, ParticipantId, PropagationChanged, PropagationConfig, Ring, RingSet, SessionEvent,
    SessionId, Timestamp, ValidationError,
};
use concentric_time::{viral_boost, PropagationClock, PropagationState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    Lifecycle, Placement, ReachTable, RingAssignment, RingMove, ScoreUpdate, SessionStats,
    SharedVisibility, StatsSnapshot, VisibilityIndex, VoteAggregator,
};

/// Queued clock work for one message
#[derive(Debug, Clone, Copy, PartialEq)]
struct RecomputeTask {
    message: MessageId,
    /// Aggregate score in force up to the task's timestamp
    score: f64,
    /// Vote folded in at the end of the interval
    vote: Option<VoteMark>,
}

/// A vote waiting for the clock to catch up to it
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoteMark {
    at: Timestamp,
    /// Score once the vote is counted
    score: f64,
}

/// What an applied event did
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Joined {
        participant: ParticipantId,
        ring: Ring,
        moves: Vec<RingMove>,
    },
    Left {
        participant: ParticipantId,
        moves: Vec<RingMove>,
    },
    MessageSeeded {
        message: MessageId,
        ring: Ring,
        reach: RingSet,
    },
    VoteRecorded(ScoreUpdate),
    Lifecycle(Lifecycle),
    Ended(Box<SessionSnapshot>),
}

/// Final state of one message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub message: Message,
    pub state: PropagationState,
    pub score: f64,
    pub votes: usize,
}

/// Everything a session held when it ended
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub config: PropagationConfig,
    pub ended_at: Timestamp,
    pub participants: Vec<Participant>,
    /// Ordered by message id
    pub messages: Vec<MessageSnapshot>,
    pub stats: StatsSnapshot,
}

/// Per-session propagation engine
#[derive(Debug)]
pub struct PropagationScheduler {
    session: SessionId,
    config: PropagationConfig,
    lifecycle: Lifecycle,
    clock: PropagationClock,
    assignment: RingAssignment,
    votes: VoteAggregator,
    reach: ReachTable,
    visibility: SharedVisibility,
    /// Recompute tasks keyed by (timestamp, arrival sequence)
    pending: BTreeMap<(Timestamp, u64), RecomputeTask>,
    next_seq: u64,
    /// Messages whose score is above the viral threshold
    viral: HashSet<MessageId>,
    outbox: Vec<PropagationChanged>,
    stats: SessionStats,
    rng: StdRng,
    /// Revision bumps to slip in between read and commit
    #[cfg(test)]
    injected_conflicts: u32,
}

impl PropagationScheduler {
    /// Create a session in the `Initializing` state
    pub fn new(session: SessionId, config: PropagationConfig) -> Result<Self, ConfigError> {
        Self::build(session, config, StdRng::from_entropy())
    }

    /// Create a session whose super-message seeding is reproducible
    pub fn with_seed(session: SessionId, config: PropagationConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::build(session, config, StdRng::seed_from_u64(seed))
    }

    fn build(session: SessionId, config: PropagationConfig, rng: StdRng) -> Result<Self, ConfigError> {
        let assignment = RingAssignment::new(session, &config)?;
        Ok(Self {
            session,
            lifecycle: Lifecycle::Initializing,
            clock: PropagationClock::new(config.clone()),
            assignment,
            votes: VoteAggregator::new(),
            reach: ReachTable::new(),
            visibility: VisibilityIndex::shared(config.total_rings),
            pending: BTreeMap::new(),
            next_seq: 0,
            viral: HashSet::new(),
            outbox: Vec::new(),
            stats: SessionStats::new(),
            rng,
            config,
            #[cfg(test)]
            injected_conflicts: 0,
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn assignment(&self) -> &RingAssignment {
        &self.assignment
    }

    /// Handle on the shared visibility index
    pub fn visibility(&self) -> SharedVisibility {
        self.visibility.clone()
    }

    /// Configuration is fixed; resubmitting the same one is accepted
    pub fn update_config(&self, config: &PropagationConfig) -> EngineResult<()> {
        if self.lifecycle.is_ended() {
            return Err(ValidationError::SessionEnded.into());
        }
        match self.config.changed_field(config) {
            Some(field) => Err(ConfigError::Immutable { field }.into()),
            None => Ok(()),
        }
    }

    /// Apply one event and drain whatever clock work it queued
    ///
    /// A recompute that fails stays queued and is retried on the next drain;
    /// the event itself has already been recorded.
    pub fn handle(&mut self, event: SessionEvent) -> EngineResult<Applied> {
        let applied = self.apply(event)?;
        if let Err(err) = self.run_pending() {
            tracing::warn!(session = %self.session, error = %err, "recompute deferred");
        }
        Ok(applied)
    }

    /// Apply one event without draining recompute tasks
    pub fn apply(&mut self, event: SessionEvent) -> EngineResult<Applied> {
        if event.session() != self.session {
            return Err(ValidationError::SessionMismatch {
                expected: self.session,
                got: event.session(),
            }
            .into());
        }

        match event {
            SessionEvent::MessageCreated {
                message,
                author,
                kind,
                created_at,
                ..
            } => {
                let reach = self.create_message(message, author, kind, created_at)?;
                let ring = reach.max().unwrap_or(0);
                Ok(Applied::MessageSeeded { message, ring, reach })
            }
            SessionEvent::VoteSubmitted {
                message,
                participant,
                intensity,
                voted_at,
                ..
            } => Ok(Applied::VoteRecorded(self.submit_vote(
                message,
                participant,
                intensity,
                voted_at,
            )?)),
            SessionEvent::ParticipantJoined {
                participant,
                joined_at,
                pinned_ring,
                ..
            } => {
                let Placement { ring, moves } = self.join(participant, joined_at, pinned_ring)?;
                Ok(Applied::Joined {
                    participant,
                    ring,
                    moves,
                })
            }
            SessionEvent::ParticipantLeft {
                participant,
                left_at,
                ..
            } => {
                let moves = self.leave(participant, left_at)?;
                Ok(Applied::Left { participant, moves })
            }
            SessionEvent::Started { at, .. } => {
                self.start(at)?;
                Ok(Applied::Lifecycle(self.lifecycle))
            }
            SessionEvent::Paused { at, .. } => {
                self.pause(at)?;
                Ok(Applied::Lifecycle(self.lifecycle))
            }
            SessionEvent::Resumed { at, .. } => {
                self.resume(at)?;
                Ok(Applied::Lifecycle(self.lifecycle))
            }
            SessionEvent::Ended { at, .. } => Ok(Applied::Ended(Box::new(self.end(at)?))),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&mut self, at: Timestamp) -> EngineResult<()> {
        self.lifecycle = self.lifecycle.start()?;
        tracing::info!(session = %self.session, ?at, "session started");
        Ok(())
    }

    pub fn pause(&mut self, at: Timestamp) -> EngineResult<()> {
        self.lifecycle = self.lifecycle.pause(at)?;
        tracing::info!(session = %self.session, ?at, "session paused");
        Ok(())
    }

    /// Resume a paused session
    ///
    /// Clock references and queued recomputes are rebased so the pause
    /// window counts toward neither advancement nor decay.
    pub fn resume(&mut self, at: Timestamp) -> EngineResult<()> {
        let (lifecycle, since) = self.lifecycle.resume()?;
        let at = at.max(since);
        self.lifecycle = lifecycle;

        self.reach.resume_from_pause(since, at);

        let pause = at - since;
        let rebase = |t: Timestamp| {
            if t <= since {
                t.saturating_add(pause)
            } else {
                t.max(at)
            }
        };
        let pending = std::mem::take(&mut self.pending);
        for ((t, seq), mut task) in pending {
            if let Some(vote) = task.vote.as_mut() {
                vote.at = rebase(vote.at);
            }
            self.pending.insert((rebase(t), seq), task);
        }

        tracing::info!(
            session = %self.session,
            ?at,
            paused_for = ?pause,
            queued = self.pending.len(),
            "session resumed"
        );
        Ok(())
    }

    /// End the session and hand back its final state
    pub fn end(&mut self, at: Timestamp) -> EngineResult<SessionSnapshot> {
        self.lifecycle = self.lifecycle.end(at)?;

        let mut messages: Vec<MessageSnapshot> = self
            .reach
            .iter()
            .map(|entry| {
                let tally = self.votes.tally(entry.message.id);
                MessageSnapshot {
                    message: entry.message.clone(),
                    state: entry.state.clone(),
                    score: tally.map_or(0.0, |t| t.score()),
                    votes: tally.map_or(0, |t| t.count()),
                }
            })
            .collect();
        messages.sort_by_key(|m| m.message.id);

        let snapshot = SessionSnapshot {
            session: self.session,
            config: self.config.clone(),
            ended_at: at,
            participants: self.assignment.participants().cloned().collect(),
            messages,
            stats: self.stats(at),
        };

        self.reach = ReachTable::new();
        self.votes = VoteAggregator::new();
        self.pending.clear();
        self.viral.clear();
        self.outbox.clear();
        if let Ok(assignment) = RingAssignment::new(self.session, &self.config) {
            self.assignment = assignment;
        }
        *self.visibility.write() = VisibilityIndex::new(self.config.total_rings);

        tracing::info!(
            session = %self.session,
            ?at,
            messages = snapshot.messages.len(),
            participants = snapshot.participants.len(),
            "session ended"
        );
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn join(
        &mut self,
        participant: ParticipantId,
        at: Timestamp,
        pinned_ring: Option<Ring>,
    ) -> EngineResult<Placement> {
        self.lifecycle.check_membership()?;
        let placement = self.assignment.assign(participant, at, pinned_ring)?;

        {
            let mut index = self.visibility.write();
            index.add_participant(participant, placement.ring)?;
            for m in &placement.moves {
                index.move_participant(m.participant, m.to)?;
            }
        }
        self.stats.record_moves(placement.moves.len());

        tracing::debug!(
            session = %self.session,
            participant = %participant,
            ring = placement.ring,
            pinned = pinned_ring.is_some(),
            "participant joined"
        );
        Ok(placement)
    }

    pub fn leave(&mut self, participant: ParticipantId, at: Timestamp) -> EngineResult<Vec<RingMove>> {
        self.lifecycle.check_membership()?;
        let (left, moves) = self.assignment.remove(participant)?;

        {
            let mut index = self.visibility.write();
            index.remove_participant(participant);
            for m in &moves {
                index.move_participant(m.participant, m.to)?;
            }
        }
        self.stats.record_moves(moves.len());

        tracing::debug!(
            session = %self.session,
            participant = %participant,
            ring = left.ring,
            ?at,
            moved = moves.len(),
            "participant left"
        );
        Ok(moves)
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Seed a new message; returns its initial reach
    pub fn create_message(
        &mut self,
        id: MessageId,
        author: ParticipantId,
        kind: MessageKind,
        created_at: Timestamp,
    ) -> EngineResult<RingSet> {
        self.lifecycle.check_content()?;
        let origin_ring = self
            .assignment
            .ring_of(author)
            .ok_or(ValidationError::UnknownParticipant(author))?;
        if self.reach.contains(id) {
            return Err(ValidationError::DuplicateMessage(id).into());
        }

        let seed_ring = match kind {
            MessageKind::Super => self.rng.gen_range(0..self.config.total_rings),
            _ => origin_ring,
        };
        let message = Message {
            id,
            author,
            origin_ring,
            kind,
            created_at,
        };
        let state = PropagationState::seed(&message, seed_ring, &self.config);
        let reach = state.reach;

        self.votes.register_message(id)?;
        self.reach.insert(message, state.clone())?;
        self.visibility.write().publish_reach(id, reach);
        self.stats.record_message(created_at);

        tracing::debug!(
            session = %self.session,
            message = %id,
            kind = kind.as_str(),
            ring = state.current_ring,
            "message seeded"
        );
        self.notify(id, &state, ChangeCause::Seeded, created_at);
        Ok(reach)
    }

    /// Record a vote; the clock catches up when the recompute task runs
    pub fn submit_vote(
        &mut self,
        message: MessageId,
        participant: ParticipantId,
        intensity: f64,
        at: Timestamp,
    ) -> EngineResult<ScoreUpdate> {
        self.lifecycle.check_content()?;
        if self.assignment.ring_of(participant).is_none() {
            return Err(ValidationError::UnknownParticipant(participant).into());
        }

        let update = self.votes.record_vote(message, participant, intensity, at)?;
        if update.applied() {
            self.stats.record_vote();
            self.enqueue(
                at,
                RecomputeTask {
                    message,
                    score: update.previous_score,
                    vote: Some(VoteMark {
                        at,
                        score: update.score,
                    }),
                },
            );
        }
        Ok(update)
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    fn enqueue(&mut self, at: Timestamp, task: RecomputeTask) {
        self.pending.insert((at, self.next_seq), task);
        self.next_seq += 1;
    }

    /// Periodic decay tick: advance every live message to `now`
    pub fn tick(&mut self, now: Timestamp) -> EngineResult<usize> {
        if !self.lifecycle.is_ticking() {
            return Ok(0);
        }
        let live: Vec<MessageId> = self.reach.live().map(|e| e.message.id).collect();
        for message in live {
            let score = self.votes.score(message).unwrap_or(0.0);
            self.enqueue(
                now,
                RecomputeTask {
                    message,
                    score,
                    vote: None,
                },
            );
        }
        self.run_pending()
    }

    /// Drain queued recomputes in timestamp order
    ///
    /// Nothing runs while the session is not active. On failure the task
    /// goes back on the queue and the error is returned.
    pub fn run_pending(&mut self) -> EngineResult<usize> {
        let mut ran = 0;
        while self.lifecycle.is_ticking() {
            let Some(((at, seq), task)) = self.pending.pop_first() else {
                break;
            };
            if let Err(err) = self.recompute(task, at) {
                self.pending.insert((at, seq), task);
                return Err(err);
            }
            ran += 1;
        }
        Ok(ran)
    }

    /// Advance one message to `at` with the score that held until then
    ///
    /// The session worker is the only writer, so a revision conflict means
    /// the entry changed between read and commit; it is retried once.
    fn recompute(&mut self, task: RecomputeTask, at: Timestamp) -> EngineResult<()> {
        let score = task.vote.map_or(task.score, |vote| vote.score);

        for attempt in 0..2 {
            let Some(entry) = self.reach.get(task.message) else {
                // ended or never seeded; nothing left to advance
                return Ok(());
            };
            let revision = entry.revision;
            let outcome = self.clock.tick(&entry.message, &entry.state, task.score, at);

            let mut state = outcome.state;
            if let Some(vote) = task.vote {
                state.record_vote_activity(vote.at);
                state.viral_score = viral_boost(vote.score, &self.config);
            }

            #[cfg(test)]
            self.inject_conflict(task.message);

            match self.reach.commit(task.message, revision, state.clone()) {
                Ok(_) => {
                    if !outcome.newly_reached.is_empty() {
                        self.visibility.write().publish_reach(task.message, state.reach);
                        self.stats.record_advance(outcome.newly_reached.len());
                        self.notify(task.message, &state, ChangeCause::Advanced, at);
                    }
                    self.check_crossing(task.message, score, &state, at);
                    return Ok(());
                }
                Err(EngineError::ConcurrencyConflict { expected, found, .. }) if attempt == 0 => {
                    tracing::debug!(
                        session = %self.session,
                        message = %task.message,
                        expected,
                        found,
                        "reach commit conflict, retrying"
                    );
                }
                Err(EngineError::ConcurrencyConflict { .. }) => {
                    return Err(EngineError::Transient(format!(
                        "reach update for {} conflicted twice",
                        task.message
                    )));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn inject_conflict(&mut self, message: MessageId) {
        if self.injected_conflicts > 0 {
            self.injected_conflicts -= 1;
            self.reach.touch(message);
        }
    }

    fn check_crossing(&mut self, message: MessageId, score: f64, state: &PropagationState, at: Timestamp) {
        let above = score > self.config.viral_threshold;
        let was_above = self.viral.contains(&message);
        if above == was_above {
            return;
        }
        if above {
            self.viral.insert(message);
        } else {
            self.viral.remove(&message);
        }
        self.stats.record_crossing();
        tracing::debug!(
            session = %self.session,
            message = %message,
            score,
            above,
            "viral threshold crossed"
        );
        self.notify(message, state, ChangeCause::ViralCrossing, at);
    }

    fn notify(&mut self, message: MessageId, state: &PropagationState, cause: ChangeCause, at: Timestamp) {
        self.outbox.push(PropagationChanged {
            session: self.session,
            message,
            current_ring: state.current_ring,
            reach: state.reach,
            viral_score: state.viral_score,
            cause,
            at,
        });
    }

    /// Take the notifications produced since the last call
    pub fn drain_notifications(&mut self) -> Vec<PropagationChanged> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn visible_messages(&self, participant: ParticipantId) -> EngineResult<Vec<MessageId>> {
        if self.lifecycle.is_ended() {
            return Err(ValidationError::SessionEnded.into());
        }
        let visible = self.visibility.read().visible_messages(participant)?;
        Ok(visible.into_iter().collect())
    }

    pub fn state_of(&self, message: MessageId) -> Option<&PropagationState> {
        self.reach.get(message).map(|e| &e.state)
    }

    /// Every live message with its propagation state
    pub fn messages(&self) -> impl Iterator<Item = (&Message, &PropagationState)> {
        self.reach.iter().map(|e| (&e.message, &e.state))
    }

    pub fn score_of(&self, message: MessageId) -> Option<f64> {
        self.votes.score(message)
    }

    /// Recompute tasks waiting to run
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self, now: Timestamp) -> StatsSnapshot {
        self.stats
            .snapshot(now, self.assignment.len(), self.assignment.populations())
    }
}
