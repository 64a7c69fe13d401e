//! Vote aggregation
//!
//! Each message keeps one active vote per participant. The running sum and
//! count are adjusted in place on every vote, so recording is O(1) no matter
//! how many votes a message has collected.

use std::collections::HashMap;

use concentric_core::{MessageId, ParticipantId, Timestamp, ValidationError, Vote};

/// What a vote did to the tally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote by this participant on the message
    Recorded,
    /// Replaced the participant's earlier vote
    Replaced,
    /// Older than the stored vote, or an exact replay
    Ignored,
}

/// Score after a vote was folded in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUpdate {
    pub message: MessageId,
    pub score: f64,
    pub previous_score: f64,
    /// Active votes on the message
    pub count: usize,
    pub outcome: VoteOutcome,
}

impl ScoreUpdate {
    /// Whether the tally changed
    #[inline]
    pub fn applied(&self) -> bool {
        self.outcome != VoteOutcome::Ignored
    }
}

/// Running tally for one message
#[derive(Debug, Clone, Default)]
pub struct MessageTally {
    votes: HashMap<ParticipantId, (f64, Timestamp)>,
    sum: f64,
    last_vote_at: Option<Timestamp>,
}

impl MessageTally {
    /// Mean intensity, 0.0 with no votes
    pub fn score(&self) -> f64 {
        if self.votes.is_empty() {
            0.0
        } else {
            (self.sum / self.votes.len() as f64).clamp(-1.0, 1.0)
        }
    }

    pub fn count(&self) -> usize {
        self.votes.len()
    }

    pub fn last_vote_at(&self) -> Option<Timestamp> {
        self.last_vote_at
    }

    /// Active vote of `participant`, if any
    pub fn vote_of(&self, participant: ParticipantId) -> Option<(f64, Timestamp)> {
        self.votes.get(&participant).copied()
    }

    fn apply(&mut self, vote: &Vote) -> VoteOutcome {
        let Vote {
            participant,
            intensity,
            voted_at: at,
            ..
        } = *vote;
        let outcome = match self.votes.get(&participant) {
            None => {
                self.sum += intensity;
                VoteOutcome::Recorded
            }
            Some(&(old, old_at)) => {
                if at < old_at || (at == old_at && old == intensity) {
                    return VoteOutcome::Ignored;
                }
                self.sum += intensity - old;
                VoteOutcome::Replaced
            }
        };

        self.votes.insert(participant, (intensity, at));
        if self.last_vote_at.map_or(true, |last| at > last) {
            self.last_vote_at = Some(at);
        }
        outcome
    }
}

/// Per-session vote aggregator
#[derive(Debug, Clone, Default)]
pub struct VoteAggregator {
    tallies: HashMap<MessageId, MessageTally>,
    total_votes: u64,
}

impl VoteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a message; votes for unregistered messages are rejected
    pub fn register_message(&mut self, message: MessageId) -> Result<(), ValidationError> {
        if self.tallies.contains_key(&message) {
            return Err(ValidationError::DuplicateMessage(message));
        }
        self.tallies.insert(message, MessageTally::default());
        Ok(())
    }

    /// Fold a vote into the message's tally
    ///
    /// A newer vote replaces the participant's previous one. Older or
    /// identical votes leave the tally untouched.
    pub fn record_vote(
        &mut self,
        message: MessageId,
        participant: ParticipantId,
        intensity: f64,
        at: Timestamp,
    ) -> Result<ScoreUpdate, ValidationError> {
        let vote = Vote::new(message, participant, intensity, at)?;
        let tally = self
            .tallies
            .get_mut(&vote.message)
            .ok_or(ValidationError::UnknownMessage(vote.message))?;

        let previous_score = tally.score();
        let outcome = tally.apply(&vote);
        if outcome != VoteOutcome::Ignored {
            self.total_votes += 1;
        }

        Ok(ScoreUpdate {
            message,
            score: tally.score(),
            previous_score,
            count: tally.count(),
            outcome,
        })
    }

    /// Current score, `None` for unknown messages
    pub fn score(&self, message: MessageId) -> Option<f64> {
        self.tallies.get(&message).map(MessageTally::score)
    }

    pub fn tally(&self, message: MessageId) -> Option<&MessageTally> {
        self.tallies.get(&message)
    }

    /// Votes that changed a tally since the session started
    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    pub fn message_count(&self) -> usize {
        self.tallies.len()
    }
}
