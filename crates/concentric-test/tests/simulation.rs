//! End-to-end session scenarios

use std::time::Duration;

use concentric_core::{
    ChangeCause, MessageId, MessageKind, ParticipantId, PropagationConfig, RingSet, SessionEvent,
    SessionId, Timestamp,
};
use concentric_diffusion::{Applied, PropagationScheduler};
use concentric_runtime::RuntimeConfig;
use concentric_test::{InvariantChecker, RuntimeDriver, SessionSimulator, WorkloadConfig};

const SESSION: SessionId = SessionId(21);

fn started(config: PropagationConfig, participants: u64) -> PropagationScheduler {
    let mut engine = PropagationScheduler::with_seed(SESSION, config, 5).unwrap();
    engine.start(Timestamp::ZERO).unwrap();
    for id in 0..participants {
        engine.join(ParticipantId::new(id), Timestamp::ZERO, None).unwrap();
    }
    engine
}

fn author_in_ring(engine: &PropagationScheduler, ring: u16) -> ParticipantId {
    engine
        .assignment()
        .members(ring)
        .next()
        .expect("ring has members")
}

#[test]
fn test_presets_run_clean() {
    for workload in [
        WorkloadConfig::light(),
        WorkloadConfig::default(),
        WorkloadConfig {
            steps: 400,
            ..WorkloadConfig::heavy()
        },
        WorkloadConfig::adversarial(),
    ] {
        let report = SessionSimulator::new(workload.clone()).run();
        assert!(report.is_valid(), "{:?}: {:?}", workload, report.violations);
    }
}

#[test]
fn test_voted_message_outruns_ignored_one() {
    let mut engine = started(PropagationConfig::default(), 10);
    let author = author_in_ring(&engine, 0);
    engine
        .create_message(MessageId::new(1), author, MessageKind::Normal, Timestamp::ZERO)
        .unwrap();
    engine
        .create_message(MessageId::new(2), author, MessageKind::Normal, Timestamp::ZERO)
        .unwrap();

    let mut checker = InvariantChecker::new();
    for minute in 1..=12 {
        let now = Timestamp::from_secs(minute * 60);
        for voter in 0..10 {
            engine
                .submit_vote(MessageId::new(1), ParticipantId::new(voter), 1.0, now)
                .unwrap();
        }
        engine.run_pending().unwrap();
        engine.tick(now).unwrap();
        checker.observe(&engine);
    }

    let hot = engine.state_of(MessageId::new(1)).unwrap();
    let cold = engine.state_of(MessageId::new(2)).unwrap();
    assert!(hot.current_ring > cold.current_ring);
    assert!(hot.reach.is_superset(cold.reach));
    assert!(checker.is_clean(), "{:?}", checker.violations());

    let crossings = engine
        .drain_notifications()
        .into_iter()
        .filter(|n| n.cause == ChangeCause::ViralCrossing)
        .count();
    assert_eq!(crossings, 1);
}

#[test]
fn test_prober_and_moderator_reach() {
    let mut engine = started(PropagationConfig::default(), 10);
    let author = author_in_ring(&engine, 2);

    engine
        .create_message(MessageId::new(1), author, MessageKind::Prober, Timestamp::ZERO)
        .unwrap();
    engine
        .create_message(MessageId::new(2), author, MessageKind::Moderator, Timestamp::ZERO)
        .unwrap();
    engine.tick(Timestamp::from_secs(3600)).unwrap();

    assert_eq!(engine.state_of(MessageId::new(1)).unwrap().reach, RingSet::full(5));
    assert_eq!(engine.state_of(MessageId::new(2)).unwrap().reach, RingSet::single(2));

    let outsider = author_in_ring(&engine, 4);
    assert_eq!(engine.visible_messages(outsider).unwrap(), vec![MessageId::new(1)]);
    assert_eq!(
        engine.visible_messages(author).unwrap(),
        vec![MessageId::new(1), MessageId::new(2)]
    );
}

#[test]
fn test_late_joiner_sees_ring_history() {
    let mut engine = started(PropagationConfig::default(), 5);
    let author = author_in_ring(&engine, 0);
    engine
        .create_message(MessageId::new(1), author, MessageKind::Normal, Timestamp::ZERO)
        .unwrap();

    let applied = engine
        .handle(SessionEvent::ParticipantJoined {
            session: SESSION,
            participant: ParticipantId::new(99),
            joined_at: Timestamp::from_secs(30),
            pinned_ring: Some(0),
        })
        .unwrap();
    assert!(matches!(applied, Applied::Joined { ring: 0, .. }));
    assert_eq!(
        engine.visible_messages(ParticipantId::new(99)).unwrap(),
        vec![MessageId::new(1)]
    );
}

#[test]
fn test_pause_freezes_workload_clock() {
    let config = PropagationConfig {
        decay_factor: 1.0,
        ..PropagationConfig::default()
    };
    let mut engine = started(config, 5);
    let author = author_in_ring(&engine, 0);
    engine
        .create_message(MessageId::new(1), author, MessageKind::Normal, Timestamp::ZERO)
        .unwrap();

    // base speed 0.2: one ring per five minutes
    engine.pause(Timestamp::from_secs(60)).unwrap();
    assert_eq!(engine.tick(Timestamp::from_secs(3600)).unwrap(), 0);
    engine.resume(Timestamp::from_secs(3600)).unwrap();

    engine.tick(Timestamp::from_secs(3600 + 3 * 60)).unwrap();
    assert_eq!(engine.state_of(MessageId::new(1)).unwrap().current_ring, 0);
    engine.tick(Timestamp::from_secs(3600 + 5 * 60)).unwrap();
    assert_eq!(engine.state_of(MessageId::new(1)).unwrap().current_ring, 1);
}

#[test]
fn test_end_reports_final_state() {
    let mut engine = started(PropagationConfig::small_room(), 6);
    let author = author_in_ring(&engine, 0);
    engine
        .create_message(MessageId::new(1), author, MessageKind::Normal, Timestamp::ZERO)
        .unwrap();
    engine
        .submit_vote(MessageId::new(1), ParticipantId::new(1), 0.5, Timestamp::from_secs(10))
        .unwrap();
    engine.run_pending().unwrap();

    let snapshot = engine.end(Timestamp::from_secs(120)).unwrap();
    assert_eq!(snapshot.participants.len(), 6);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].votes, 1);
    assert_eq!(snapshot.stats.total_messages, 1);
    assert_eq!(snapshot.stats.total_votes, 1);

    assert!(engine.visible_messages(author).is_err());
    assert!(engine.tick(Timestamp::from_secs(600)).is_ok());
    assert_eq!(engine.messages().count(), 0);
}

#[test]
fn test_workload_ticks_follow_period() {
    let workload = WorkloadConfig {
        tick_every: Duration::from_secs(10),
        ..WorkloadConfig::light()
    };
    let report = SessionSimulator::new(workload).run();
    let ended_at = report.snapshot.as_ref().unwrap().ended_at;
    assert_eq!(report.ticks, (ended_at.as_micros() / 10_000_000) as u64);
}

#[tokio::test]
async fn test_runtime_replay_of_default_workload() {
    let workload = WorkloadConfig {
        steps: 300,
        ..WorkloadConfig::default()
    };
    let expected = SessionSimulator::new(workload.clone()).run();

    let driver = RuntimeDriver::new(RuntimeConfig::default());
    let report = driver.run(SESSION, workload).await.unwrap();

    assert_eq!(report.events_applied, expected.events_applied);
    assert_eq!(report.events_rejected, expected.events_rejected);
    assert_eq!(report.lagged, 0);
    assert!(report
        .notifications
        .iter()
        .any(|n| n.cause == ChangeCause::Seeded));
    assert!(driver.runtime().is_empty());
}
