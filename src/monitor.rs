//! Async session runtime
//!
//! [`Monitor`] runs one session on tokio: a video loop sampling the detection
//! source at a fixed interval, an optional faster audio loop, and a sink worker
//! that forwards events to persistence without blocking either loop.
//!
//! Ticks for a session never overlap: each loop awaits a tick's processing before
//! polling its next tick. Stopping is immediate and idempotent, and a detection
//! call that resolves after stop was requested is discarded.

use crate::alerts::{AlertCue, SilentCue, PERSISTENCE_ERROR};
use crate::config::MonitorConfig;
use crate::error::{DetectionError, MonitorError, SinkError};
use crate::pipeline::MonitorProcessor;
use crate::sink::PersistenceSink;
use crate::types::{Alert, AudioSnapshot, DetectionSnapshot, Event, EventOrder, Report, Severity};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Face/object classifier boundary. Called from a blocking worker thread.
pub trait DetectionSource: Send + 'static {
    fn detect(&mut self) -> Result<DetectionSnapshot, DetectionError>;
}

impl<F> DetectionSource for F
where
    F: FnMut() -> Result<DetectionSnapshot, DetectionError> + Send + 'static,
{
    fn detect(&mut self) -> Result<DetectionSnapshot, DetectionError> {
        self()
    }
}

/// Audio analyser boundary. Called inline on the audio loop, so it must be quick.
pub trait AudioSource: Send + 'static {
    fn sample(&mut self) -> Result<AudioSnapshot, DetectionError>;
}

impl<F> AudioSource for F
where
    F: FnMut() -> Result<AudioSnapshot, DetectionError> + Send + 'static,
{
    fn sample(&mut self) -> Result<AudioSnapshot, DetectionError> {
        self()
    }
}

type SharedProcessor = Arc<Mutex<MonitorProcessor>>;
type SharedDetector = Arc<StdMutex<Box<dyn DetectionSource>>>;

/// Wall-clock timestamps anchored to the session start and advanced by the
/// runtime's monotonic clock
#[derive(Debug, Clone, Copy)]
struct TickClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl TickClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_utc + elapsed
    }
}

enum SinkCommand {
    AddEvent { session_id: String, event: Event },
    EndSession { session_id: String },
}

impl SinkCommand {
    fn describe(&self) -> String {
        match self {
            SinkCommand::AddEvent { session_id, event } => {
                format!("{} event for session {session_id}", event.event_type)
            }
            SinkCommand::EndSession { session_id } => format!("end of session {session_id}"),
        }
    }

    fn apply(self, sink: &dyn PersistenceSink) -> Result<(), SinkError> {
        match self {
            SinkCommand::AddEvent { session_id, event } => {
                sink.add_event(&session_id, &event).map(|_| ())
            }
            SinkCommand::EndSession { session_id } => sink.end_session(&session_id).map(|_| ()),
        }
    }
}

/// Configures and starts a [`Monitor`]
pub struct MonitorBuilder {
    config: MonitorConfig,
    sink: Arc<dyn PersistenceSink>,
    cue: Arc<dyn AlertCue>,
    audio: Option<Box<dyn AudioSource>>,
}

impl MonitorBuilder {
    pub fn cue(mut self, cue: Arc<dyn AlertCue>) -> Self {
        self.cue = cue;
        self
    }

    pub fn audio(mut self, source: impl AudioSource) -> Self {
        self.audio = Some(Box::new(source));
        self
    }

    /// Create the session in the sink and start the loops.
    ///
    /// Fails without creating anything if the candidate name or config is invalid.
    pub async fn start(
        self,
        candidate_name: &str,
        detection: impl DetectionSource,
    ) -> Result<Monitor, MonitorError> {
        self.config.validate()?;
        let name = candidate_name.trim().to_string();
        if name.is_empty() {
            return Err(MonitorError::InvalidCandidateName(name));
        }

        let session = {
            let sink = Arc::clone(&self.sink);
            tokio::task::spawn_blocking(move || sink.create_session(&name))
                .await
                .map_err(|e| SinkError::Unavailable(format!("create_session worker failed: {e}")))??
        };
        let session_id = session.id().to_string();
        let clock = TickClock {
            origin: Instant::now(),
            origin_utc: session.start_time(),
        };

        let processor: SharedProcessor = Arc::new(Mutex::new(
            MonitorProcessor::for_session(session, &self.config)?.with_cue(self.cue),
        ));
        let cancel = CancellationToken::new();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();

        let sink_worker = tokio::spawn(sink_worker(
            sink_rx,
            Arc::clone(&self.sink),
            Arc::clone(&processor),
            clock,
        ));

        let mut loops = Vec::new();
        let detector: SharedDetector = Arc::new(StdMutex::new(Box::new(detection)));
        loops.push(tokio::spawn(video_loop(VideoLoop {
            processor: Arc::clone(&processor),
            detector,
            sink_tx: sink_tx.clone(),
            session_id: session_id.clone(),
            clock,
            interval: self.config.sampling_interval(),
            timeout: self.config.detection_timeout(),
            cancel: cancel.clone(),
        })));

        if let Some(audio) = self.audio {
            loops.push(tokio::spawn(audio_loop(
                Arc::clone(&processor),
                audio,
                clock,
                self.config.audio_interval(),
                cancel.clone(),
            )));
        }

        Ok(Monitor {
            processor,
            session_id,
            clock,
            cancel,
            loops,
            sink_tx: Some(sink_tx),
            sink_worker: Some(sink_worker),
        })
    }
}

/// A running monitored session
pub struct Monitor {
    processor: SharedProcessor,
    session_id: String,
    clock: TickClock,
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
    sink_tx: Option<mpsc::UnboundedSender<SinkCommand>>,
    sink_worker: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn builder(config: MonitorConfig, sink: Arc<dyn PersistenceSink>) -> MonitorBuilder {
        MonitorBuilder {
            config,
            sink,
            cue: Arc::new(SilentCue),
            audio: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop both loops. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.loops.drain(..) {
            if let Err(e) = handle.await {
                error!("monitor loop for session {} failed: {e}", self.session_id);
            }
        }
    }

    /// Stop monitoring, complete the session, flush pending writes and return
    /// the final report
    pub async fn end_session(mut self) -> Result<Report, MonitorError> {
        self.stop().await;

        let report = {
            let mut processor = self.processor.lock().await;
            let now = self.clock.now();
            processor.end(now)?;
            processor.report(now)
        };

        if let Some(tx) = self.sink_tx.take() {
            let _ = tx.send(SinkCommand::EndSession {
                session_id: self.session_id.clone(),
            });
        }
        if let Some(worker) = self.sink_worker.take() {
            if let Err(e) = worker.await {
                error!("sink worker for session {} failed: {e}", self.session_id);
            }
        }

        Ok(report)
    }

    pub async fn report(&self) -> Report {
        self.processor.lock().await.report(self.clock.now())
    }

    pub async fn report_with_order(&self, order: EventOrder) -> Report {
        self.processor
            .lock()
            .await
            .report_with_order(self.clock.now(), order)
    }

    pub async fn integrity_score(&self) -> u32 {
        self.processor.lock().await.integrity_score()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.processor.lock().await.session().events().to_vec()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.processor.lock().await.alerts()
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> bool {
        self.processor.lock().await.acknowledge_alert(alert_id)
    }

    pub async fn acknowledge_all_alerts(&self) -> usize {
        self.processor.lock().await.acknowledge_all_alerts()
    }

    pub async fn clear_alerts(&self) {
        self.processor.lock().await.clear_alerts();
    }

    pub async fn clear_log(&self) {
        self.processor.lock().await.clear_log();
    }

    pub async fn pause(&self) -> Result<(), MonitorError> {
        self.processor.lock().await.pause()
    }

    pub async fn resume(&self) -> Result<(), MonitorError> {
        self.processor.lock().await.resume()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct VideoLoop {
    processor: SharedProcessor,
    detector: SharedDetector,
    sink_tx: mpsc::UnboundedSender<SinkCommand>,
    session_id: String,
    clock: TickClock,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

async fn video_loop(ctx: VideoLoop) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // A detection that outlived its timeout; no new one starts until it returns
    let mut in_flight: Option<JoinHandle<Result<DetectionSnapshot, DetectionError>>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(pending) = &in_flight {
                    if !pending.is_finished() {
                        debug!(
                            "previous detection still running for session {}, skipping tick",
                            ctx.session_id
                        );
                        continue;
                    }
                    // Its result is stale
                    in_flight = None;
                }

                let mut detection = {
                    let detector = Arc::clone(&ctx.detector);
                    tokio::task::spawn_blocking(move || detect_once(&detector))
                };

                let result = tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    result = tokio::time::timeout(ctx.timeout, &mut detection) => result,
                };
                let snapshot = match result {
                    Ok(Ok(Ok(snapshot))) => snapshot,
                    Ok(Ok(Err(err))) => {
                        warn!("detection failed for session {}: {err}", ctx.session_id);
                        continue;
                    }
                    Ok(Err(err)) => {
                        error!("detection worker failed for session {}: {err}", ctx.session_id);
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            "detection timeout (> {}ms) for session {}",
                            ctx.timeout.as_millis(),
                            ctx.session_id
                        );
                        in_flight = Some(detection);
                        continue;
                    }
                };

                let mut processor = ctx.processor.lock().await;
                if ctx.cancel.is_cancelled() {
                    break;
                }
                let outcome = processor.process_detection(&snapshot, ctx.clock.now());
                drop(processor);

                for event in outcome.events {
                    let command = SinkCommand::AddEvent {
                        session_id: ctx.session_id.clone(),
                        event,
                    };
                    if ctx.sink_tx.send(command).is_err() {
                        warn!("sink worker gone, event kept locally only");
                    }
                }
            }
            _ = ctx.cancel.cancelled() => break,
        }
    }
    info!("video loop for session {} shutting down", ctx.session_id);
}

fn detect_once(detector: &StdMutex<Box<dyn DetectionSource>>) -> Result<DetectionSnapshot, DetectionError> {
    let mut source = detector
        .lock()
        .map_err(|_| DetectionError::Failed("detector lock poisoned".to_string()))?;
    source.detect()
}

async fn audio_loop(
    processor: SharedProcessor,
    mut source: Box<dyn AudioSource>,
    clock: TickClock,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let audio = match source.sample() {
                    Ok(audio) => audio,
                    Err(err) => {
                        warn!("audio analysis failed: {err}");
                        continue;
                    }
                };
                let mut processor = processor.lock().await;
                if cancel.is_cancelled() {
                    break;
                }
                processor.process_audio(&audio, clock.now());
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!("audio loop shutting down");
}

async fn sink_worker(
    mut rx: mpsc::UnboundedReceiver<SinkCommand>,
    sink: Arc<dyn PersistenceSink>,
    processor: SharedProcessor,
    clock: TickClock,
) {
    while let Some(command) = rx.recv().await {
        let what = command.describe();
        let sink = Arc::clone(&sink);
        let result = tokio::task::spawn_blocking(move || command.apply(sink.as_ref())).await;

        let err = match result {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(err) => format!("sink worker failed: {err}"),
        };
        warn!("failed to persist {what}: {err}");
        processor.lock().await.raise_alert(
            PERSISTENCE_ERROR,
            format!("Could not save to server: {err}"),
            Severity::Low,
            clock.now(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::{EventType, SessionStatus};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn looking_away() -> DetectionSnapshot {
        DetectionSnapshot {
            is_looking_away: true,
            ..DetectionSnapshot::attentive()
        }
    }

    fn with_phone() -> DetectionSnapshot {
        DetectionSnapshot {
            objects_detected: vec!["cell phone".to_string()],
            ..DetectionSnapshot::attentive()
        }
    }

    /// Accepts sessions but rejects every other write
    struct FlakySink(MemorySink);

    impl PersistenceSink for FlakySink {
        fn create_session(&self, candidate_name: &str) -> Result<crate::session::Session, SinkError> {
            self.0.create_session(candidate_name)
        }
        fn add_event(&self, _session_id: &str, _event: &Event) -> Result<Event, SinkError> {
            Err(SinkError::Unavailable("connection refused".to_string()))
        }
        fn end_session(&self, _session_id: &str) -> Result<crate::session::Session, SinkError> {
            Err(SinkError::Unavailable("connection refused".to_string()))
        }
        fn get_report(&self, session_id: &str) -> Result<Report, SinkError> {
            self.0.get_report(session_id)
        }
        fn get_session(&self, session_id: &str) -> Result<crate::session::Session, SinkError> {
            self.0.get_session(session_id)
        }
        fn list_sessions(&self) -> Result<Vec<crate::session::Session>, SinkError> {
            self.0.list_sessions()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_loss_scenario_end_to_end() {
        let sink = Arc::new(MemorySink::new());
        let monitor = Monitor::builder(MonitorConfig::default(), sink.clone())
            .start("Ada", || Ok(looking_away()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(6_500)).await;

        let events = monitor.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::FocusLost);
        assert_eq!(events[0].duration, Some(6.0));
        assert_eq!(monitor.integrity_score().await, 95);

        let session_id = monitor.session_id().to_string();
        let report = monitor.end_session().await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.integrity_score, 95);

        // Sink worker was drained before end_session returned
        let stored = sink.get_report(&session_id).unwrap();
        assert_eq!(stored.total_events, 1);
        assert_eq!(stored.status, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_immediate_and_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut monitor = Monitor::builder(MonitorConfig::default(), Arc::new(MemorySink::new()))
            .start("Ada", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(DetectionSnapshot::attentive())
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());

        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_failures_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let monitor = Monitor::builder(MonitorConfig::default(), Arc::new(MemorySink::new()))
            .start("Ada", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DetectionError::Failed("model not loaded".to_string()))
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(calls.load(Ordering::SeqCst) >= 4);
        assert!(monitor.events().await.is_empty());
        assert_eq!(monitor.integrity_score().await, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_stop_is_discarded() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let crowd = DetectionSnapshot {
            face_count: 3,
            ..DetectionSnapshot::attentive()
        };

        let mut monitor = Monitor::builder(MonitorConfig::default(), Arc::new(MemorySink::new()))
            .start("Ada", move || {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
                Ok(crowd.clone())
            })
            .await
            .unwrap();

        // Wait until the first detection call is in flight
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        monitor.stop().await;
        release_tx.send(()).unwrap();
        tokio::task::yield_now().await;

        assert!(monitor.events().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_detection_skips_ticks_until_it_returns() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let config = MonitorConfig {
            detection_timeout_ms: 300,
            ..MonitorConfig::default()
        };

        let monitor = Monitor::builder(config, Arc::new(MemorySink::new()))
            .start("Ada", move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                    return Ok(DetectionSnapshot::attentive());
                }
                Ok(with_phone())
            })
            .await
            .unwrap();

        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Past the timeout and the next tick while the first call is still stuck
        tokio::time::advance(Duration::from_millis(1_500)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(monitor.events().await.is_empty());

        release_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(3_000)).await;

        // Ticking resumed with fresh detections
        let events = monitor.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::PhoneDetected);
        let seen = calls.load(Ordering::SeqCst);
        assert!((2..=4).contains(&seen), "detector called {seen} times");

        let report = monitor.end_session().await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.total_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_keeps_local_state() {
        let sink = Arc::new(FlakySink(MemorySink::new()));
        let monitor = Monitor::builder(MonitorConfig::default(), sink)
            .start("Ada", || Ok(with_phone()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(monitor.events().await.len(), 1);
        assert_eq!(monitor.integrity_score().await, 90);
        let alerts = monitor.alerts().await;
        assert!(alerts.iter().any(|a| a.alert_type == "phone_detected"));
        assert!(alerts.iter().any(|a| a.alert_type == PERSISTENCE_ERROR));

        let report = monitor.end_session().await.unwrap();
        assert_eq!(report.status, SessionStatus::Completed);
        assert_eq!(report.total_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_candidate_creates_nothing() {
        let sink = Arc::new(MemorySink::new());
        let result = Monitor::builder(MonitorConfig::default(), sink.clone())
            .start("  ", || Ok(DetectionSnapshot::attentive()))
            .await;

        assert!(matches!(result, Err(MonitorError::InvalidCandidateName(_))));
        assert!(sink.list_sessions().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_loop_raises_debounced_alerts() {
        let monitor = Monitor::builder(MonitorConfig::default(), Arc::new(MemorySink::new()))
            .audio(|| {
                Ok(AudioSnapshot {
                    is_speaking: true,
                    volume: 40.0,
                    ..AudioSnapshot::default()
                })
            })
            .start("Ada", || Ok(DetectionSnapshot::attentive()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;

        let alerts = monitor.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "speech");
        assert!(monitor.events().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_log_and_pause_through_monitor() {
        let monitor = Monitor::builder(MonitorConfig::default(), Arc::new(MemorySink::new()))
            .start("Ada", || Ok(with_phone()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(monitor.integrity_score().await, 90);

        monitor.clear_log().await;
        assert_eq!(monitor.integrity_score().await, 100);
        assert!(monitor.events().await.is_empty());

        monitor.pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(monitor.events().await.is_empty());
        assert_eq!(monitor.report().await.status, SessionStatus::Paused);
    }
}
