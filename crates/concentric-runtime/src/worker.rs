//! Session worker
//!
//! One tokio task per session owns the `PropagationScheduler`. Commands
//! arrive over a bounded mpsc queue and are applied in order; a periodic
//! interval drives the decay tick. Notifications fan out over a broadcast
//! channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concentric_core::{
    ConfigError, EngineError, EngineResult, MessageId, ParticipantId, PropagationChanged,
    PropagationConfig, SessionEvent, SessionId, Timestamp, ValidationError,
};
use concentric_diffusion::{Applied, PropagationScheduler, SessionSnapshot, SharedVisibility, StatsSnapshot};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::{RuntimeConfig, TimeSource};

enum Command {
    Event {
        event: SessionEvent,
        ack: Option<oneshot::Sender<EngineResult<Applied>>>,
    },
    Tick {
        now: Timestamp,
        ack: oneshot::Sender<EngineResult<usize>>,
    },
    Stats {
        reply: oneshot::Sender<StatsSnapshot>,
    },
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session: SessionId,
    config: PropagationConfig,
    commands: mpsc::Sender<Command>,
    visibility: SharedVisibility,
    notifications: broadcast::Sender<PropagationChanged>,
    ended: Arc<AtomicBool>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl SessionHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn check_event(&self, event: &SessionEvent) -> EngineResult<()> {
        if self.is_ended() {
            return Err(ValidationError::SessionEnded.into());
        }
        if event.session() != self.session {
            return Err(ValidationError::SessionMismatch {
                expected: self.session,
                got: event.session(),
            }
            .into());
        }
        Ok(())
    }

    fn enqueue(&self, command: Command) -> EngineResult<()> {
        self.commands.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                EngineError::Transient(format!("session {} queue full", self.session))
            }
            mpsc::error::TrySendError::Closed(_) => EngineError::SessionClosed,
        })
    }

    /// Queue an event without waiting for it to be applied
    ///
    /// Fails with `Transient` when the queue is full.
    pub fn submit(&self, event: SessionEvent) -> EngineResult<()> {
        self.check_event(&event)?;
        self.enqueue(Command::Event { event, ack: None })
    }

    /// Queue an event and wait until the worker has applied it
    pub async fn submit_and_wait(&self, event: SessionEvent) -> EngineResult<Applied> {
        self.check_event(&event)?;
        let (ack, done) = oneshot::channel();
        self.enqueue(Command::Event {
            event,
            ack: Some(ack),
        })?;
        done.await.map_err(|_| EngineError::SessionClosed)?
    }

    /// Run the decay tick at `now` out of band
    pub async fn tick(&self, now: Timestamp) -> EngineResult<usize> {
        if self.is_ended() {
            return Err(ValidationError::SessionEnded.into());
        }
        let (ack, done) = oneshot::channel();
        self.enqueue(Command::Tick { now, ack })?;
        done.await.map_err(|_| EngineError::SessionClosed)?
    }

    /// Messages visible to `participant`, read directly from the shared index
    pub fn visible_messages(&self, participant: ParticipantId) -> EngineResult<Vec<MessageId>> {
        if self.is_ended() {
            return Err(ValidationError::SessionEnded.into());
        }
        let visible = self.visibility.read().visible_messages(participant)?;
        Ok(visible.into_iter().collect())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PropagationChanged> {
        self.notifications.subscribe()
    }

    pub async fn stats(&self) -> EngineResult<StatsSnapshot> {
        let (reply, done) = oneshot::channel();
        self.enqueue(Command::Stats { reply })?;
        done.await.map_err(|_| EngineError::SessionClosed)
    }

    /// End the session and wait for its final snapshot
    pub async fn end(&self, at: Timestamp) -> EngineResult<SessionSnapshot> {
        let applied = self
            .submit_and_wait(SessionEvent::Ended {
                session: self.session,
                at,
            })
            .await?;
        match applied {
            Applied::Ended(snapshot) => Ok(*snapshot),
            _ => Err(EngineError::SessionClosed),
        }
    }
}

struct SessionWorker {
    scheduler: PropagationScheduler,
    commands: mpsc::Receiver<Command>,
    notifications: broadcast::Sender<PropagationChanged>,
    time: Arc<dyn TimeSource>,
    tick_interval: Duration,
    ended: Arc<AtomicBool>,
}

impl SessionWorker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("session worker started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("all handles dropped");
                        break;
                    };
                    self.execute(command);
                    if self.ended.load(Ordering::Acquire) {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let now = self.time.now();
                    if let Err(err) = self.scheduler.tick(now) {
                        tracing::warn!(error = %err, "decay tick deferred");
                    }
                    self.publish();
                }
            }
        }

        tracing::info!("session worker stopped");
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Event { event, ack } => {
                let name = event.name();
                let result = self.scheduler.handle(event);
                if let Err(err) = &result {
                    tracing::debug!(event = name, error = %err, "event rejected");
                }
                if matches!(result, Ok(Applied::Ended(_))) {
                    self.ended.store(true, Ordering::Release);
                }
                self.publish();
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            Command::Tick { now, ack } => {
                let result = self.scheduler.tick(now);
                self.publish();
                let _ = ack.send(result);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.scheduler.stats(self.time.now()));
            }
        }
    }

    fn publish(&mut self) {
        for notification in self.scheduler.drain_notifications() {
            // no subscribers is fine
            let _ = self.notifications.send(notification);
        }
    }
}

/// Create a session and spawn its worker on the current tokio runtime
pub fn spawn_session(
    session: SessionId,
    config: PropagationConfig,
    runtime: &RuntimeConfig,
    time: Arc<dyn TimeSource>,
) -> Result<(SessionHandle, JoinHandle<()>), ConfigError> {
    let scheduler = PropagationScheduler::new(session, config.clone())?;
    let visibility = scheduler.visibility();

    let (commands_tx, commands_rx) = mpsc::channel(runtime.queue_depth.max(1));
    let (notifications, _) = broadcast::channel(runtime.notification_capacity.max(1));
    let ended = Arc::new(AtomicBool::new(false));

    let worker = SessionWorker {
        scheduler,
        commands: commands_rx,
        notifications: notifications.clone(),
        time,
        tick_interval: runtime.tick_interval,
        ended: ended.clone(),
    };
    let span = tracing::info_span!("session", session = %session);
    let join = tokio::spawn(worker.run().instrument(span));

    let handle = SessionHandle {
        session,
        config,
        commands: commands_tx,
        visibility,
        notifications,
        ended,
    };
    Ok((handle, join))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualTimeSource;
    use concentric_core::{ChangeCause, MessageKind};

    const SESSION: SessionId = SessionId(5);

    fn runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            tick_interval: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn no_decay() -> PropagationConfig {
        PropagationConfig {
            total_rings: 3,
            base_speed: 0.2,
            viral_threshold: 0.5,
            decay_factor: 1.0,
            ..Default::default()
        }
    }

    fn spawn(queue_depth: usize) -> (SessionHandle, JoinHandle<()>) {
        let runtime = RuntimeConfig {
            queue_depth,
            ..runtime_config()
        };
        let time = Arc::new(ManualTimeSource::new(Timestamp::ZERO));
        spawn_session(SESSION, no_decay(), &runtime, time).unwrap()
    }

    fn join(p: u64) -> SessionEvent {
        SessionEvent::ParticipantJoined {
            session: SESSION,
            participant: ParticipantId::new(p),
            joined_at: Timestamp::ZERO,
            pinned_ring: None,
        }
    }

    async fn setup(handle: &SessionHandle) -> ParticipantId {
        for p in 1..=3 {
            handle.submit_and_wait(join(p)).await.unwrap();
        }
        handle
            .submit_and_wait(SessionEvent::Started {
                session: SESSION,
                at: Timestamp::ZERO,
            })
            .await
            .unwrap();

        let mut author = None;
        for p in 1..=3 {
            let pid = ParticipantId::new(p);
            handle
                .submit_and_wait(SessionEvent::MessageCreated {
                    session: SESSION,
                    message: MessageId::new(100 + p),
                    author: pid,
                    kind: MessageKind::Moderator,
                    created_at: Timestamp::ZERO,
                })
                .await
                .unwrap();
            if handle.visibility.read().ring_of(pid) == Some(0) {
                author = Some(pid);
            }
        }
        author.unwrap()
    }

    #[tokio::test]
    async fn test_message_spreads_through_worker() {
        let (handle, _join) = spawn(64);
        let mut updates = handle.subscribe();
        let author = setup(&handle).await;

        handle
            .submit_and_wait(SessionEvent::MessageCreated {
                session: SESSION,
                message: MessageId::new(1),
                author,
                kind: MessageKind::Normal,
                created_at: Timestamp::ZERO,
            })
            .await
            .unwrap();

        // 0.2 rings/minute for 12 minutes carries it past the last ring
        let ran = handle.tick(Timestamp::from_secs(12 * 60)).await.unwrap();
        assert_eq!(ran, 1);

        let mut causes = Vec::new();
        while let Ok(update) = updates.try_recv() {
            if update.message == MessageId::new(1) {
                causes.push(update.cause);
            }
        }
        assert_eq!(causes, vec![ChangeCause::Seeded, ChangeCause::Advanced]);

        for p in 1..=3 {
            let visible = handle.visible_messages(ParticipantId::new(p)).unwrap();
            assert!(visible.contains(&MessageId::new(1)));
        }
    }

    #[tokio::test]
    async fn test_rejections_reach_the_caller() {
        let (handle, _join) = spawn(64);
        let err = handle
            .submit_and_wait(SessionEvent::VoteSubmitted {
                session: SESSION,
                message: MessageId::new(1),
                participant: ParticipantId::new(1),
                intensity: 0.5,
                voted_at: Timestamp::ZERO,
            })
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::SessionNotStarted));

        let err = handle
            .submit(SessionEvent::Started {
                session: SessionId::new(6),
                at: Timestamp::ZERO,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::SessionMismatch { .. })
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_is_transient() {
        let (handle, _join) = spawn(2);
        // the worker cannot run until this task yields
        handle.submit(join(1)).unwrap();
        handle.submit(join(2)).unwrap();
        let err = handle.submit(join(3)).unwrap_err();
        assert!(err.is_transient());

        // retrying once the worker has drained the queue succeeds
        let mut attempts = 0;
        loop {
            match handle.submit(join(3)) {
                Ok(()) => break,
                Err(err) if err.is_transient() && attempts < 100 => {
                    attempts += 1;
                    tokio::task::yield_now().await;
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        let applied = handle.submit_and_wait(join(4)).await.unwrap();
        assert!(matches!(applied, Applied::Joined { .. }));
    }

    #[tokio::test]
    async fn test_end_returns_snapshot_and_stops_worker() {
        let (handle, join_handle) = spawn(64);
        setup(&handle).await;

        let snapshot = handle.end(Timestamp::from_secs(60)).await.unwrap();
        assert_eq!(snapshot.session, SESSION);
        assert_eq!(snapshot.messages.len(), 3);
        assert_eq!(snapshot.participants.len(), 3);
        join_handle.await.unwrap();

        assert!(handle.is_ended());
        assert_eq!(
            handle.submit(join(9)),
            Err(EngineError::Validation(ValidationError::SessionEnded))
        );
        assert_eq!(
            handle.visible_messages(ParticipantId::new(1)),
            Err(EngineError::Validation(ValidationError::SessionEnded))
        );
        assert_eq!(handle.stats().await.unwrap_err(), EngineError::SessionClosed);
    }

    #[tokio::test]
    async fn test_stats() {
        let (handle, _join) = spawn(64);
        setup(&handle).await;
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.active_participants, 3);
        assert_eq!(stats.ring_populations, vec![1, 1, 1]);
    }
}
