//! Client Session Monitor
//! Mission: Notice a dead session on the client without polling the server
//!
//! A coarse timer watches the bearer's own expiry locally. Only regaining
//! visibility or connectivity triggers a network liveness check. Checks run
//! as separate tasks and carry a generation number; a verdict older than the
//! last one applied is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{
    clock::Clock,
    liveness::{Liveness, StaleReason, Verdict},
};
use crate::client::logout::{LogoutReason, ReasonSlot};
use crate::client::probe::SessionProbe;

/// Inputs from the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    VisibilityRegained,
    NetworkRegained,
    /// The window is going away; fire the beacon and stop
    Closing,
    /// The bearer was re-signed with a new expiry (unix seconds)
    Reissued { expires_at: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    KickedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }

    pub fn logout_reason(&self) -> Option<LogoutReason> {
        match self {
            SessionState::Active => None,
            SessionState::Expired => Some(LogoutReason::Expired),
            SessionState::KickedOut => Some(LogoutReason::KickedOut),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Local expiry check period
    pub tick: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
        }
    }
}

/// Synchronous state machine behind the monitor. Returns the new state only
/// on the transition into a terminal one.
#[derive(Debug)]
pub struct MonitorCore {
    state: SessionState,
    expires_at: i64,
    issued_generation: u64,
    applied_generation: u64,
}

impl MonitorCore {
    pub fn new(expires_at: i64) -> Self {
        Self {
            state: SessionState::Active,
            expires_at,
            issued_generation: 0,
            applied_generation: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn on_tick(&mut self, now: DateTime<Utc>) -> Option<SessionState> {
        if self.state.is_terminal() || now.timestamp() < self.expires_at {
            return None;
        }
        self.finish(SessionState::Expired)
    }

    pub fn on_reissued(&mut self, expires_at: i64) {
        if !self.state.is_terminal() {
            self.expires_at = expires_at;
        }
    }

    /// Allocate a generation for a new network check, or `None` once terminal
    pub fn begin_check(&mut self) -> Option<u64> {
        if self.state.is_terminal() {
            return None;
        }
        self.issued_generation += 1;
        Some(self.issued_generation)
    }

    pub fn on_verdict(&mut self, generation: u64, verdict: &Verdict) -> Option<SessionState> {
        if self.state.is_terminal() {
            return None;
        }
        if generation <= self.applied_generation {
            debug!(generation, applied = self.applied_generation, "Dropping stale liveness verdict");
            return None;
        }
        self.applied_generation = generation;

        match verdict {
            Ok(Liveness::Valid) => None,
            Ok(Liveness::Invalid(StaleReason::Expired)) => self.finish(SessionState::Expired),
            Ok(Liveness::Invalid(reason)) => {
                info!(?reason, "🚪 Session is no longer current");
                self.finish(SessionState::KickedOut)
            }
            Err(e) => {
                warn!(generation, "⚠️ Liveness check inconclusive, keeping session: {}", e);
                None
            }
        }
    }

    fn finish(&mut self, state: SessionState) -> Option<SessionState> {
        self.state = state;
        Some(state)
    }
}

/// Handle to a running monitor
pub struct MonitorHandle {
    events: mpsc::Sender<ClientEvent>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Deliver an event. Returns false once the monitor has stopped.
    pub async fn notify(&self, event: ClientEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for a terminal state. `None` if the monitor stopped without one.
    pub async fn terminal(&mut self) -> Option<SessionState> {
        loop {
            let current = *self.state.borrow_and_update();
            if current.is_terminal() {
                return Some(current);
            }
            if self.state.changed().await.is_err() {
                let last = *self.state.borrow();
                return last.is_terminal().then_some(last);
            }
        }
    }

    /// Wait for the monitor task to exit
    pub async fn stopped(self) {
        drop(self.events);
        let _ = self.task.await;
    }
}

pub struct SessionMonitor;

impl SessionMonitor {
    /// Start monitoring a session whose bearer expires at `expires_at` (unix seconds).
    /// The terminal reason is stashed in `reasons` for whoever renders the next screen.
    pub fn spawn(
        probe: Arc<dyn SessionProbe>,
        clock: Arc<dyn Clock>,
        expires_at: i64,
        config: MonitorConfig,
        reasons: Arc<ReasonSlot>,
    ) -> MonitorHandle {
        let (events_tx, events_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(SessionState::Active);

        let task = tokio::spawn(run(
            MonitorCore::new(expires_at),
            probe,
            clock,
            config,
            reasons,
            events_rx,
            state_tx,
        ));

        MonitorHandle {
            events: events_tx,
            state: state_rx,
            task,
        }
    }
}

async fn run(
    mut core: MonitorCore,
    probe: Arc<dyn SessionProbe>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    reasons: Arc<ReasonSlot>,
    mut events: mpsc::Receiver<ClientEvent>,
    state_tx: watch::Sender<SessionState>,
) {
    let (verdict_tx, mut verdict_rx) = mpsc::unbounded_channel::<(u64, Verdict)>();
    let mut tick = interval(config.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let transition = tokio::select! {
            _ = tick.tick() => core.on_tick(clock.now()),
            Some((generation, verdict)) = verdict_rx.recv() => core.on_verdict(generation, &verdict),
            event = events.recv() => match event {
                Some(ClientEvent::VisibilityRegained) | Some(ClientEvent::NetworkRegained) => {
                    if let Some(generation) = core.begin_check() {
                        let probe = probe.clone();
                        let verdict_tx = verdict_tx.clone();
                        tokio::spawn(async move {
                            let verdict = probe.verify().await;
                            // Receiver is gone once the monitor has stopped
                            let _ = verdict_tx.send((generation, verdict));
                        });
                    }
                    None
                }
                Some(ClientEvent::Reissued { expires_at }) => {
                    core.on_reissued(expires_at);
                    None
                }
                Some(ClientEvent::Closing) => {
                    let probe = probe.clone();
                    tokio::spawn(async move {
                        if let Err(e) = probe.signout_beacon().await {
                            debug!("Sign-out beacon not delivered: {:#}", e);
                        }
                    });
                    debug!("Monitor closing");
                    break;
                }
                None => break,
            },
        };

        if let Some(state) = transition {
            if let Some(reason) = state.logout_reason() {
                reasons.stash(reason);
            }
            info!(?state, "🔐 Session ended");
            let _ = state_tx.send(state);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::liveness::Indeterminate;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    fn indeterminate() -> Verdict {
        Err(Indeterminate(anyhow::anyhow!("store unreachable")))
    }

    #[test]
    fn test_local_expiry() {
        let mut core = MonitorCore::new(1_000);
        let at = |secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();

        assert_eq!(core.on_tick(at(999)), None);
        assert_eq!(core.on_tick(at(1_000)), Some(SessionState::Expired));
        assert_eq!(core.on_tick(at(2_000)), None);
        assert_eq!(core.state(), SessionState::Expired);
    }

    #[test]
    fn test_reissue_moves_expiry() {
        let mut core = MonitorCore::new(1_000);
        core.on_reissued(5_000);
        let now = DateTime::<Utc>::from_timestamp(1_500, 0).unwrap();
        assert_eq!(core.on_tick(now), None);
    }

    #[test]
    fn test_verdict_transitions() {
        let mut core = MonitorCore::new(i64::MAX);
        let g = core.begin_check().unwrap();
        assert_eq!(core.on_verdict(g, &Ok(Liveness::Valid)), None);

        let g = core.begin_check().unwrap();
        assert_eq!(
            core.on_verdict(g, &Ok(Liveness::Invalid(StaleReason::Superseded))),
            Some(SessionState::KickedOut)
        );
        assert_eq!(core.begin_check(), None);

        let mut core = MonitorCore::new(i64::MAX);
        let g = core.begin_check().unwrap();
        assert_eq!(
            core.on_verdict(g, &Ok(Liveness::Invalid(StaleReason::Expired))),
            Some(SessionState::Expired)
        );
    }

    #[test]
    fn test_indeterminate_leaves_state_alone() {
        let mut core = MonitorCore::new(i64::MAX);
        let g = core.begin_check().unwrap();
        assert_eq!(core.on_verdict(g, &indeterminate()), None);
        assert_eq!(core.state(), SessionState::Active);
    }

    #[test]
    fn test_stale_verdict_is_dropped() {
        let mut core = MonitorCore::new(i64::MAX);
        let older = core.begin_check().unwrap();
        let newer = core.begin_check().unwrap();

        assert_eq!(core.on_verdict(newer, &Ok(Liveness::Valid)), None);
        assert_eq!(
            core.on_verdict(older, &Ok(Liveness::Invalid(StaleReason::Superseded))),
            None
        );
        assert_eq!(core.state(), SessionState::Active);
    }

    #[test]
    fn test_first_terminal_state_wins() {
        let mut core = MonitorCore::new(10);
        let g = core.begin_check().unwrap();
        let now = DateTime::<Utc>::from_timestamp(10, 0).unwrap();

        assert_eq!(core.on_tick(now), Some(SessionState::Expired));
        assert_eq!(
            core.on_verdict(g, &Ok(Liveness::Invalid(StaleReason::Superseded))),
            None
        );
        assert_eq!(core.state(), SessionState::Expired);
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Valid,
        Stale(StaleReason),
        Unreachable,
    }

    /// Probe answering from a script; each entry is (delay, outcome)
    #[derive(Default)]
    struct ScriptedProbe {
        script: Mutex<VecDeque<(u64, Outcome)>>,
        beacons: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: Vec<(u64, Outcome)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                beacons: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionProbe for ScriptedProbe {
        async fn verify(&self) -> Verdict {
            let next = self.script.lock().pop_front();
            let (delay_ms, outcome) = next.unwrap_or((0, Outcome::Valid));
            sleep(Duration::from_millis(delay_ms)).await;
            match outcome {
                Outcome::Valid => Ok(Liveness::Valid),
                Outcome::Stale(reason) => Ok(Liveness::Invalid(reason)),
                Outcome::Unreachable => indeterminate(),
            }
        }

        async fn signout_beacon(&self) -> anyhow::Result<()> {
            self.beacons.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn spawn_monitor(
        probe: Arc<ScriptedProbe>,
        clock: Arc<ManualClock>,
        expires_at: i64,
    ) -> (MonitorHandle, Arc<ReasonSlot>) {
        let reasons = Arc::new(ReasonSlot::new());
        let handle = SessionMonitor::spawn(
            probe,
            clock,
            expires_at,
            MonitorConfig {
                tick: Duration::from_millis(10),
            },
            reasons.clone(),
        );
        (handle, reasons)
    }

    #[tokio::test]
    async fn test_kicked_out_on_visibility_check() {
        let clock = Arc::new(ManualClock::default());
        let expires_at = clock.now().timestamp() + 1800;
        let probe = ScriptedProbe::new(vec![(0, Outcome::Stale(StaleReason::Superseded))]);
        let (mut handle, reasons) = spawn_monitor(probe, clock, expires_at);

        assert!(handle.notify(ClientEvent::VisibilityRegained).await);
        let state = timeout(Duration::from_secs(2), handle.terminal())
            .await
            .unwrap();

        assert_eq!(state, Some(SessionState::KickedOut));
        assert_eq!(reasons.take(), Some(LogoutReason::KickedOut));
        assert_eq!(reasons.take(), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_session() {
        let clock = Arc::new(ManualClock::default());
        let expires_at = clock.now().timestamp() + 1800;
        let probe = ScriptedProbe::new(vec![
            (0, Outcome::Unreachable),
            (0, Outcome::Unreachable),
        ]);
        let (handle, reasons) = spawn_monitor(probe, clock, expires_at);

        handle.notify(ClientEvent::NetworkRegained).await;
        handle.notify(ClientEvent::VisibilityRegained).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.state(), SessionState::Active);
        assert_eq!(reasons.take(), None);
    }

    #[tokio::test]
    async fn test_slow_stale_verdict_is_ignored() {
        let clock = Arc::new(ManualClock::default());
        let expires_at = clock.now().timestamp() + 1800;
        let probe = ScriptedProbe::new(vec![
            (150, Outcome::Stale(StaleReason::Superseded)),
            (0, Outcome::Valid),
        ]);
        let (handle, _reasons) = spawn_monitor(probe, clock, expires_at);

        handle.notify(ClientEvent::VisibilityRegained).await;
        sleep(Duration::from_millis(20)).await;
        handle.notify(ClientEvent::VisibilityRegained).await;
        sleep(Duration::from_millis(300)).await;

        assert_eq!(handle.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_local_timer_expires_session() {
        let clock = Arc::new(ManualClock::default());
        let expires_at = clock.now().timestamp() + 60;
        let probe = ScriptedProbe::new(vec![]);
        let (mut handle, reasons) = spawn_monitor(probe, clock.clone(), expires_at);

        sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.state(), SessionState::Active);

        clock.advance(chrono::Duration::seconds(61));
        let state = timeout(Duration::from_secs(2), handle.terminal())
            .await
            .unwrap();
        assert_eq!(state, Some(SessionState::Expired));
        assert_eq!(reasons.take(), Some(LogoutReason::Expired));
    }

    #[tokio::test]
    async fn test_closing_fires_beacon_and_stops() {
        let clock = Arc::new(ManualClock::default());
        let expires_at = clock.now().timestamp() + 1800;
        let probe = ScriptedProbe::new(vec![]);
        let (handle, reasons) = spawn_monitor(probe.clone(), clock, expires_at);

        handle.notify(ClientEvent::Closing).await;
        timeout(Duration::from_secs(2), handle.stopped())
            .await
            .unwrap();

        timeout(Duration::from_secs(2), async {
            while probe.beacons.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(reasons.take(), None);
    }
}
