//! Runtime driver - replays a workload through the async runtime
//!
//! Same generated steps as the simulator, but routed through a `Runtime`
//! and a session worker, with simulated time supplied by a manual clock.

use std::sync::Arc;

use concentric_core::{EngineResult, PropagationChanged, SessionEvent, SessionId, Timestamp};
use concentric_diffusion::SessionSnapshot;
use concentric_runtime::{ManualTimeSource, Runtime, RuntimeConfig};
use tokio::sync::broadcast::error::TryRecvError;

use crate::{WorkloadConfig, WorkloadGenerator, WorkloadStep};

/// Outcome of a replay through the runtime
#[derive(Debug, Default)]
pub struct DriverReport {
    pub events_applied: u64,
    pub events_rejected: u64,
    pub ticks: u64,
    pub notifications: Vec<PropagationChanged>,
    /// Notifications dropped because the subscriber fell behind
    pub lagged: u64,
    pub snapshot: Option<SessionSnapshot>,
}

/// Replays workloads against a runtime driven by a manual clock
pub struct RuntimeDriver {
    runtime: Runtime,
    time: Arc<ManualTimeSource>,
}

impl RuntimeDriver {
    pub fn new(config: RuntimeConfig) -> Self {
        let time = Arc::new(ManualTimeSource::new(Timestamp::ZERO));
        RuntimeDriver {
            runtime: Runtime::with_time_source(config, time.clone()),
            time,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Generate `workload` for `session` and replay it
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run(&self, session: SessionId, workload: WorkloadConfig) -> EngineResult<DriverReport> {
        let propagation = workload.propagation.clone();
        let steps = WorkloadGenerator::new(session, workload).generate();

        let handle = self.runtime.create_session(session, Some(propagation))?;
        let mut notifications = handle.subscribe();
        let mut report = DriverReport::default();

        for step in steps {
            match step {
                WorkloadStep::Tick(now) => {
                    self.time.set(now);
                    handle.tick(now).await?;
                    report.ticks += 1;
                }
                WorkloadStep::Event(SessionEvent::Ended { at, .. }) => {
                    self.time.set(at);
                    match self.runtime.end_session(session, at).await {
                        Ok(snapshot) => {
                            report.events_applied += 1;
                            report.snapshot = Some(snapshot);
                        }
                        Err(_) => report.events_rejected += 1,
                    }
                }
                WorkloadStep::Event(event) => {
                    self.time.set(event.timestamp());
                    match handle.submit_and_wait(event).await {
                        Ok(_) => report.events_applied += 1,
                        Err(err) if err.is_transient() => return Err(err),
                        Err(_) => report.events_rejected += 1,
                    }
                }
            }
            drain(&mut notifications, &mut report);
        }
        drain(&mut notifications, &mut report);

        tracing::debug!(
            session = %session,
            applied = report.events_applied,
            rejected = report.events_rejected,
            notifications = report.notifications.len(),
            lagged = report.lagged,
            "replay finished"
        );
        Ok(report)
    }
}

fn drain(
    receiver: &mut tokio::sync::broadcast::Receiver<PropagationChanged>,
    report: &mut DriverReport,
) {
    loop {
        match receiver.try_recv() {
            Ok(notification) => report.notifications.push(notification),
            Err(TryRecvError::Lagged(skipped)) => report.lagged += skipped,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionSimulator;

    #[tokio::test]
    async fn test_replay_matches_simulator_counts() {
        let workload = WorkloadConfig::light();
        let expected = SessionSimulator::new(workload.clone()).run();

        let driver = RuntimeDriver::new(RuntimeConfig::default());
        let report = driver.run(SessionId::new(1), workload).await.unwrap();

        assert_eq!(report.events_applied, expected.events_applied);
        assert_eq!(report.events_rejected, expected.events_rejected);
        assert_eq!(report.ticks, expected.ticks);
        let snapshot = report.snapshot.unwrap();
        assert_eq!(
            snapshot.messages.len(),
            expected.snapshot.unwrap().messages.len()
        );
        assert!(driver.runtime().is_empty());
    }
}
