//! Session statistics feed

use std::collections::VecDeque;
use std::time::Duration;

use concentric_core::Timestamp;

/// Trailing window for the message rate
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Running counters for one session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Messages created
    pub total_messages: u64,
    /// Votes that changed a tally
    pub total_votes: u64,
    /// Ring advances across all messages
    pub advances: u64,
    /// Viral threshold crossings in either direction
    pub viral_crossings: u64,
    /// Rebalance moves applied
    pub rebalance_moves: u64,
    /// Creation times inside the rate window
    recent_messages: VecDeque<Timestamp>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&mut self, at: Timestamp) {
        self.total_messages += 1;
        self.recent_messages.push_back(at);
        self.prune(at);
    }

    pub fn record_vote(&mut self) {
        self.total_votes += 1;
    }

    pub fn record_advance(&mut self, rings: usize) {
        self.advances += rings as u64;
    }

    pub fn record_crossing(&mut self) {
        self.viral_crossings += 1;
    }

    pub fn record_moves(&mut self, moves: usize) {
        self.rebalance_moves += moves as u64;
    }

    fn prune(&mut self, now: Timestamp) {
        let cutoff = now.saturating_sub(RATE_WINDOW);
        while self.recent_messages.front().map_or(false, |&t| t <= cutoff) {
            self.recent_messages.pop_front();
        }
    }

    /// Messages per minute over the window ending at `now`
    pub fn messages_per_minute(&self, now: Timestamp) -> f64 {
        let cutoff = now.saturating_sub(RATE_WINDOW);
        let count = self
            .recent_messages
            .iter()
            .filter(|&&t| t > cutoff && t <= now)
            .count();
        count as f64 * 60.0 / RATE_WINDOW.as_secs_f64()
    }

    /// Point-in-time view combining counters with membership
    pub fn snapshot(
        &self,
        now: Timestamp,
        active_participants: usize,
        ring_populations: Vec<usize>,
    ) -> StatsSnapshot {
        StatsSnapshot {
            at: now,
            messages_per_minute: self.messages_per_minute(now),
            active_participants,
            total_messages: self.total_messages,
            total_votes: self.total_votes,
            advances: self.advances,
            viral_crossings: self.viral_crossings,
            rebalance_moves: self.rebalance_moves,
            ring_populations,
        }
    }
}

/// Statistics as published to the dashboard feed
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub at: Timestamp,
    pub messages_per_minute: f64,
    pub active_participants: usize,
    pub total_messages: u64,
    pub total_votes: u64,
    pub advances: u64,
    pub viral_crossings: u64,
    pub rebalance_moves: u64,
    /// Participants per ring, indexed by ring number
    pub ring_populations: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_rate_window() {
        let mut stats = SessionStats::new();
        stats.record_message(Timestamp::from_secs(0));
        stats.record_message(Timestamp::from_secs(30));
        stats.record_message(Timestamp::from_secs(50));
        assert_eq!(stats.messages_per_minute(Timestamp::from_secs(55)), 3.0);
        assert_eq!(stats.messages_per_minute(Timestamp::from_secs(70)), 2.0);
        assert_eq!(stats.messages_per_minute(Timestamp::from_secs(200)), 0.0);

        stats.record_message(Timestamp::from_secs(100));
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.messages_per_minute(Timestamp::from_secs(100)), 2.0);
    }

    #[test]
    fn test_snapshot() {
        let mut stats = SessionStats::new();
        stats.record_vote();
        stats.record_advance(2);
        stats.record_crossing();
        let snap = stats.snapshot(Timestamp::from_secs(1), 4, vec![2, 2]);
        assert_eq!(snap.total_votes, 1);
        assert_eq!(snap.advances, 2);
        assert_eq!(snap.viral_crossings, 1);
        assert_eq!(snap.active_participants, 4);
        assert_eq!(snap.ring_populations, vec![2, 2]);
    }
}
