//! Property tests over generated workloads and propagation parameters

use concentric_core::{MessageId, MessageKind, ParticipantId, PropagationConfig, SessionId, Timestamp};
use concentric_diffusion::PropagationScheduler;
use concentric_time::PropagationState;
use concentric_test::{SessionSimulator, WorkloadConfig};
use proptest::prelude::*;

/// Rings covered including the fraction toward the next one
fn position(state: &PropagationState) -> f64 {
    state.current_ring as f64 + state.progress
}

fn propagation_config() -> impl Strategy<Value = PropagationConfig> {
    (2u16..12, 0.05f64..2.0, 0.0f64..0.95, 0.5f64..=1.0, 0.05f64..=1.0).prop_map(
        |(total_rings, base_speed, viral_threshold, decay_factor, decay_floor)| PropagationConfig {
            total_rings,
            base_speed,
            viral_threshold,
            decay_factor,
            decay_floor,
            ..PropagationConfig::default()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_any_seed_keeps_invariants(seed in any::<u64>(), config in propagation_config()) {
        let workload = WorkloadConfig {
            steps: 150,
            propagation: config,
            ..WorkloadConfig::adversarial().with_seed(seed)
        };
        let report = SessionSimulator::new(workload).run();
        prop_assert!(report.is_valid(), "{:?}", report.violations);
    }

    #[test]
    fn prop_ignored_message_reaches_outer_ring(config in propagation_config()) {
        let session = SessionId::new(8);
        let mut engine = PropagationScheduler::with_seed(session, config.clone(), 0).unwrap();
        engine.start(Timestamp::ZERO).unwrap();
        engine.join(ParticipantId::new(1), Timestamp::ZERO, Some(0)).unwrap();
        engine
            .create_message(MessageId::new(1), ParticipantId::new(1), MessageKind::Normal, Timestamp::ZERO)
            .unwrap();

        let deadline = Timestamp::ZERO
            .saturating_add(config.max_time_to_terminal())
            .saturating_add(std::time::Duration::from_secs(60));
        engine.tick(deadline).unwrap();

        let state = engine.state_of(MessageId::new(1)).unwrap();
        prop_assert!(state.terminal);
        prop_assert_eq!(state.current_ring, config.last_ring());
    }

    #[test]
    fn prop_tick_frequency_does_not_change_outcome(
        config in propagation_config(),
        ticks in 1usize..40,
    ) {
        let session = SessionId::new(9);
        let horizon = 30 * 60;
        let run = |steps: usize| {
            let mut engine = PropagationScheduler::with_seed(session, config.clone(), 0).unwrap();
            engine.start(Timestamp::ZERO).unwrap();
            engine.join(ParticipantId::new(1), Timestamp::ZERO, Some(0)).unwrap();
            engine
                .create_message(MessageId::new(1), ParticipantId::new(1), MessageKind::Normal, Timestamp::ZERO)
                .unwrap();
            for i in 1..=steps {
                let at = Timestamp::from_secs((horizon * i / steps) as i64);
                engine.tick(at).unwrap();
            }
            position(engine.state_of(MessageId::new(1)).unwrap())
        };

        let single = run(1);
        let many = run(ticks);
        prop_assert!((single - many).abs() < 1e-9, "single {} vs {} ticks {}", single, ticks, many);
    }
}
