//! Integrity monitoring: two watcher tasks feeding one warden.
//!
//! The attention watcher owns the camera and the focus watcher polls the
//! active window title. Neither touches session state; they send
//! [`IntegrityEvent`]s over a channel, and the warden counts them under the
//! session lock and decides when the interview has to end.

use crate::capabilities::{AttentionDetector, AttentionSignal, FrameSource, WindowProbe};
use crate::config::InterviewConfig;
use crate::session_state::SharedSession;
use crate::voice::Voice;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};

pub const TERMINATION_NOTICE: &str =
    "Multiple concerning behaviors detected. The interview will now conclude.";

const SYSTEM_WINDOW_MARKERS: &[&str] = &["notification", "system", "settings"];
const CAMERA_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityKind {
    NoFace,
    MultipleFaces,
    LookingAway,
    TabChange,
}

impl IntegrityKind {
    fn from_signal(signal: AttentionSignal) -> Option<Self> {
        match signal {
            AttentionSignal::Normal => None,
            AttentionSignal::NoFace => Some(IntegrityKind::NoFace),
            AttentionSignal::MultipleFaces => Some(IntegrityKind::MultipleFaces),
            AttentionSignal::LookingAway => Some(IntegrityKind::LookingAway),
        }
    }

    pub fn reminder(&self) -> &'static str {
        match self {
            IntegrityKind::NoFace => {
                "Please ensure your face is clearly visible to the camera for the interview."
            }
            IntegrityKind::MultipleFaces => {
                "I notice multiple people in the frame. Please ensure you're alone during this interview."
            }
            IntegrityKind::LookingAway => {
                "Please maintain focus on the interview and avoid looking at other devices."
            }
            IntegrityKind::TabChange => {
                "Please stay focused on the interview window and avoid switching to other applications."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityEvent {
    pub kind: IntegrityKind,
    pub timestamp: DateTime<Utc>,
}

impl IntegrityEvent {
    pub fn now(kind: IntegrityKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Debounces a stream of observations.
///
/// An anomalous state is reported once it has been seen `confirmations`
/// times in a row, and not again until a normal observation resets it.
#[derive(Debug)]
pub struct Hysteresis<S> {
    confirmations: u32,
    candidate: Option<(S, u32)>,
    reported: Option<S>,
}

impl<S: Copy + PartialEq> Hysteresis<S> {
    pub fn new(confirmations: u32) -> Self {
        Self {
            confirmations: confirmations.max(1),
            candidate: None,
            reported: None,
        }
    }

    /// Feeds one observation (`None` meaning normal) and returns the state to
    /// report, if this observation confirmed a new one.
    pub fn observe(&mut self, state: Option<S>) -> Option<S> {
        let Some(state) = state else {
            self.candidate = None;
            self.reported = None;
            return None;
        };
        if self.reported == Some(state) {
            return None;
        }
        let seen = match self.candidate {
            Some((candidate, seen)) if candidate == state => seen + 1,
            _ => 1,
        };
        if seen >= self.confirmations {
            self.candidate = None;
            self.reported = Some(state);
            Some(state)
        } else {
            self.candidate = Some((state, seen));
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Ignored,
    Warned(u32),
    Terminated,
}

/// Counts integrity events and speaks the escalating responses.
pub struct IntegrityWarden {
    session: SharedSession,
    voice: Arc<Voice>,
    limit: u32,
}

impl IntegrityWarden {
    pub fn new(session: SharedSession, voice: Arc<Voice>, limit: u32) -> Self {
        Self {
            session,
            voice,
            limit: limit.max(1),
        }
    }

    pub async fn handle(&self, event: IntegrityEvent) -> Escalation {
        if !self.session.is_active() {
            return Escalation::Ignored;
        }
        let warnings = {
            let mut session = self.session.lock().await;
            session.counters.cheating_warnings += 1;
            session.counters.cheating_warnings
        };
        tracing::warn!(
            kind = ?event.kind,
            at = %event.timestamp.to_rfc3339(),
            warnings,
            "Integrity event"
        );

        if warnings >= self.limit {
            tracing::error!("Integrity limit reached, ending the interview");
            self.session.deactivate();
            self.voice.say(TERMINATION_NOTICE).await;
            Escalation::Terminated
        } else {
            self.voice
                .say(&format!(
                    "Gentle reminder: {} This is notice {} of {}.",
                    event.kind.reminder(),
                    warnings,
                    self.limit
                ))
                .await;
            Escalation::Warned(warnings)
        }
    }

    async fn run(self, mut events: mpsc::Receiver<IntegrityEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event).await == Escalation::Terminated {
                break;
            }
        }
    }
}

/// The devices the monitor may watch. Either can be absent.
#[derive(Default)]
pub struct Sensors {
    pub camera: Option<(Box<dyn FrameSource>, Arc<dyn AttentionDetector>)>,
    pub window: Option<Arc<dyn WindowProbe>>,
}

/// Supervises the watcher tasks for one session.
pub struct IntegrityMonitor {
    tasks: JoinSet<()>,
    stop: watch::Sender<bool>,
}

impl IntegrityMonitor {
    pub fn spawn(
        session: SharedSession,
        voice: Arc<Voice>,
        config: &InterviewConfig,
        sensors: Sensors,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut tasks = JoinSet::new();

        if let Some((camera, detector)) = sensors.camera {
            tasks.spawn(watch_attention(
                camera,
                detector,
                tx.clone(),
                config.attention_poll(),
                config.attention_confirmations,
                stop.subscribe(),
            ));
        }
        if let Some(probe) = sensors.window {
            tasks.spawn(watch_focus(
                probe,
                tx.clone(),
                config.focus_poll(),
                config.focus_arm_delay(),
                config.focus_confirmations,
                stop.subscribe(),
            ));
        }
        drop(tx);

        let warden = IntegrityWarden::new(session, voice, config.warning_limit);
        tasks.spawn(warden.run(rx));
        tracing::info!("Integrity monitoring started");

        Self { tasks, stop }
    }

    /// Signals every watcher to stop and waits for them to release their
    /// devices.
    pub async fn stop(mut self) {
        self.stop.send_replace(true);
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = ?e, "Integrity task ended abnormally");
            }
        }
        tracing::info!("Integrity monitoring stopped");
    }
}

async fn watch_attention(
    mut camera: Box<dyn FrameSource>,
    detector: Arc<dyn AttentionDetector>,
    events: mpsc::Sender<IntegrityEvent>,
    poll: Duration,
    confirmations: u32,
    mut stop: watch::Receiver<bool>,
) {
    if let Err(e) = camera.open().await {
        tracing::warn!(error = ?e, "Could not open camera");
    }
    let mut debounce = Hysteresis::new(confirmations);
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        let frame = match camera.read_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = ?e, "Camera read failed, restarting capture");
                camera.release().await;
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(CAMERA_RETRY_BACKOFF) => {}
                }
                if let Err(e) = camera.open().await {
                    tracing::warn!(error = ?e, "Camera restart failed");
                }
                continue;
            }
        };
        let signal = detector.detect(&frame).await;
        tracing::debug!(?signal, "Attention poll");
        if let Some(kind) = debounce.observe(IntegrityKind::from_signal(signal)) {
            if events.send(IntegrityEvent::now(kind)).await.is_err() {
                break;
            }
        }
    }
    camera.release().await;
}

fn is_system_window(title: &str) -> bool {
    let lower = title.to_lowercase();
    SYSTEM_WINDOW_MARKERS.iter().any(|m| lower.contains(m))
}

fn has_left(initial: Option<&str>, current: Option<&str>) -> bool {
    match (initial, current) {
        (Some(initial), Some(current)) => current != initial && !is_system_window(current),
        _ => false,
    }
}

async fn watch_focus(
    probe: Arc<dyn WindowProbe>,
    events: mpsc::Sender<IntegrityEvent>,
    poll: Duration,
    arm_delay: Duration,
    confirmations: u32,
    mut stop: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = stop.changed() => return,
        _ = tokio::time::sleep(arm_delay) => {}
    }
    let initial = probe.active_window_title().await.unwrap_or_else(|e| {
        tracing::warn!(error = ?e, "Could not read the interview window title");
        None
    });
    tracing::debug!(?initial, "Focus watcher armed");

    let mut debounce = Hysteresis::new(confirmations);
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        let current = match probe.active_window_title().await {
            Ok(title) => title,
            Err(e) => {
                tracing::debug!(error = ?e, "Window poll failed");
                continue;
            }
        };
        let away = has_left(initial.as_deref(), current.as_deref());
        if let Some(kind) = debounce.observe(away.then_some(IntegrityKind::TabChange)) {
            if events.send(IntegrityEvent::now(kind)).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Frame, MockAttentionDetector, MockWindowProbe};
    use crate::session_state::InterviewSession;
    use crate::voice::testing::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn setup() -> (SharedSession, Arc<Voice>, Arc<RecordingSpeaker>) {
        let config = quick_config();
        let speaker = Arc::new(RecordingSpeaker::default());
        let voice = Arc::new(Voice::new(
            speaker.clone(),
            Arc::new(ScriptedListener::default()),
            &config,
        ));
        let session = SharedSession::new(InterviewSession::new(15, 8));
        (session, voice, speaker)
    }

    struct FakeCamera {
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl FrameSource for FakeCamera {
        async fn open(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn read_frame(&mut self) -> anyhow::Result<Frame> {
            Ok(Frame::default())
        }

        async fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn sustained_state_reports_once() {
        let mut h = Hysteresis::new(1);
        assert_eq!(h.observe(Some(IntegrityKind::LookingAway)), Some(IntegrityKind::LookingAway));
        assert_eq!(h.observe(Some(IntegrityKind::LookingAway)), None);
        assert_eq!(h.observe(Some(IntegrityKind::LookingAway)), None);
        assert_eq!(h.observe(None), None);
        assert_eq!(h.observe(Some(IntegrityKind::LookingAway)), Some(IntegrityKind::LookingAway));
    }

    #[test]
    fn distinct_states_report_separately() {
        let mut h = Hysteresis::new(1);
        assert!(h.observe(Some(IntegrityKind::MultipleFaces)).is_some());
        assert_eq!(h.observe(Some(IntegrityKind::LookingAway)), Some(IntegrityKind::LookingAway));
    }

    #[test]
    fn transient_blips_need_confirmation() {
        let mut h = Hysteresis::new(2);
        assert_eq!(h.observe(Some(IntegrityKind::TabChange)), None);
        assert_eq!(h.observe(None), None);
        assert_eq!(h.observe(Some(IntegrityKind::TabChange)), None);
        assert_eq!(h.observe(Some(IntegrityKind::TabChange)), Some(IntegrityKind::TabChange));
        assert_eq!(h.observe(Some(IntegrityKind::TabChange)), None);
    }

    #[test]
    fn system_windows_do_not_count_as_leaving() {
        assert!(has_left(Some("Interview"), Some("Stack Overflow - Browser")));
        assert!(!has_left(Some("Interview"), Some("Interview")));
        assert!(!has_left(Some("Interview"), Some("System Settings")));
        assert!(!has_left(Some("Interview"), Some("Notification Center")));
        assert!(!has_left(None, Some("Browser")));
        assert!(!has_left(Some("Interview"), None));
    }

    #[tokio::test]
    async fn third_event_terminates_and_not_before() {
        let (session, voice, speaker) = setup();
        let warden = IntegrityWarden::new(session.clone(), voice, 3);

        assert_eq!(
            warden.handle(IntegrityEvent::now(IntegrityKind::MultipleFaces)).await,
            Escalation::Warned(1)
        );
        assert_eq!(
            warden.handle(IntegrityEvent::now(IntegrityKind::TabChange)).await,
            Escalation::Warned(2)
        );
        assert!(session.is_active());
        assert_eq!(
            warden.handle(IntegrityEvent::now(IntegrityKind::LookingAway)).await,
            Escalation::Terminated
        );
        assert!(!session.is_active());
        assert_eq!(session.lock().await.counters.cheating_warnings, 3);

        let lines = speaker.lines();
        assert_eq!(
            lines[0],
            "Gentle reminder: I notice multiple people in the frame. Please ensure you're alone during this interview. This is notice 1 of 3."
        );
        assert!(lines[1].ends_with("This is notice 2 of 3."));
        assert_eq!(lines[2], TERMINATION_NOTICE);

        assert_eq!(
            warden.handle(IntegrityEvent::now(IntegrityKind::TabChange)).await,
            Escalation::Ignored
        );
        assert_eq!(session.lock().await.counters.cheating_warnings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn watchers_share_one_counter_and_release_the_camera() {
        let (session, voice, speaker) = setup();
        let released = Arc::new(AtomicBool::new(false));

        let mut detector = MockAttentionDetector::new();
        detector
            .expect_detect()
            .returning(|_| AttentionSignal::LookingAway);

        let polls = Arc::new(AtomicUsize::new(0));
        let mut probe = MockWindowProbe::new();
        {
            let polls = polls.clone();
            probe.expect_active_window_title().returning(move || {
                let title = if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    "Interview"
                } else {
                    "Browser"
                };
                Ok(Some(title.to_string()))
            });
        }

        let sensors = Sensors {
            camera: Some((
                Box::new(FakeCamera {
                    released: released.clone(),
                }),
                Arc::new(detector),
            )),
            window: Some(Arc::new(probe)),
        };
        let monitor = IntegrityMonitor::spawn(session.clone(), voice, &quick_config(), sensors);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(session.lock().await.counters.cheating_warnings, 2);
        assert!(session.is_active());
        assert_eq!(speaker.count_containing("Gentle reminder:"), 2);
        assert!(polls.load(Ordering::SeqCst) > 2);

        monitor.stop().await;
        assert!(released.load(Ordering::SeqCst));
    }
}
