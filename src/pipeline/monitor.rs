use super::alert_buffer::AlertBuffer;
use super::cancel::CancelToken;
use super::enrich::Enrichment;
use super::frame_buffer::FrameBuffer;
use super::ingest::{Ingestion, Outcome};
use super::record::{AlertCandidate, AlertCounter, FrameRecord};
use super::stream::Streaming;
use crate::analysis::Analyzer;
use crate::capture::{SourceDescriptor, SourceFactory};
use crate::config::PipelineConfig;
use crate::detection::DetectorFactory;
use crate::error::{SessionError, SessionState, SourceError};
use crate::overlay::Overlay;
use crate::publish::{Event, Publisher};
use crate::storage::EvidenceStore;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const SUPERVISE_POLL: Duration = Duration::from_millis(25);

/// External collaborators a [`Monitor`] drives
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceFactory>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub analyzer: Arc<dyn Analyzer>,
    pub store: Arc<dyn EvidenceStore>,
    pub publisher: Arc<dyn Publisher>,
}

/// Session controller: starts and stops the three stages as a unit.
///
/// At most one session runs at a time. Alert ids keep counting across
/// sessions; cooldown state starts fresh with each one.
pub struct Monitor {
    config: Arc<PipelineConfig>,
    parts: Collaborators,
    overlay: Overlay,
    alert_ids: Arc<AlertCounter>,
    session: Mutex<Option<Session>>,
    /// Number of `stop` calls in flight
    stopping: AtomicUsize,
}

struct Session {
    descriptor: SourceDescriptor,
    cancel: CancelToken,
    supervisor: JoinHandle<()>,
    finished: Receiver<()>,
}

impl Session {
    /// The supervisor closes `finished` as its last act, so a closed
    /// channel means the session is over even if the thread is still exiting
    fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
            || matches!(self.finished.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn join(self) {
        if self.supervisor.join().is_err() {
            tracing::error!("Supervisor for {} panicked", self.descriptor);
        }
    }
}

/// Everything spawned for a session before the supervisor takes over
struct Stages {
    ingest: JoinHandle<Outcome>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl Stages {
    fn join(self) {
        let _ = self.ingest.join();
        for (_, handle) in self.workers {
            let _ = handle.join();
        }
    }
}

impl Monitor {
    pub fn new(config: PipelineConfig, parts: Collaborators) -> Self {
        let overlay = match Overlay::new(config.font_path.as_deref()) {
            Ok(overlay) => overlay,
            Err(e) => {
                tracing::warn!("Overlay text disabled: {:#}", e);
                Overlay::default()
            }
        };
        Self {
            config: Arc::new(config),
            parts,
            overlay,
            alert_ids: Arc::new(AlertCounter::new()),
            session: Mutex::new(None),
            stopping: AtomicUsize::new(0),
        }
    }

    /// Open `descriptor` and start a session.
    ///
    /// The source is opened and the detector loaded before any other stage
    /// starts; if either fails nothing keeps running and subscribers get a
    /// single `monitoring_error`.
    pub fn start(&self, descriptor: &str) -> Result<(), SessionError> {
        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(|s| !s.is_finished()) || self.stopping.load(Ordering::Acquire) > 0 {
            return Err(SessionError::AlreadyRunning);
        }
        if let Some(done) = slot.take() {
            done.join();
        }

        match self.launch(descriptor) {
            Ok(session) => {
                tracing::info!("Monitoring started on {}", session.descriptor);
                *slot = Some(session);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start monitoring: {}", e);
                self.notify(Event::MonitoringError {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Cancel the running session and wait for every stage to exit.
    /// No-op when idle.
    pub fn stop(&self) {
        self.stopping.fetch_add(1, Ordering::AcqRel);
        let taken = self.session.lock().take();
        if let Some(session) = taken {
            tracing::info!("Stopping monitoring on {}", session.descriptor);
            session.cancel.cancel();
            session.join();
        }
        self.stopping.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn state(&self) -> SessionState {
        if self.stopping.load(Ordering::Acquire) > 0 {
            return SessionState::Stopping;
        }
        match self.session.lock().as_ref() {
            Some(session) if !session.is_finished() => SessionState::Running,
            _ => SessionState::Idle,
        }
    }

    /// Block until the current session ends on its own, up to `timeout`.
    /// Returns true if no session is running afterwards.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let finished = match self.session.lock().as_ref() {
            Some(session) => session.finished.clone(),
            None => return true,
        };
        match finished.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            _ => {
                let mut slot = self.session.lock();
                // Only reap the session we waited on; a newer one may have started
                if slot.as_ref().is_some_and(|s| s.finished.same_channel(&finished)) {
                    if let Some(done) = slot.take() {
                        done.join();
                    }
                }
                slot.as_ref().map_or(true, Session::is_finished)
            }
        }
    }

    /// Total alerts issued since this monitor was created
    pub fn alerts_issued(&self) -> u64 {
        self.alert_ids.current()
    }

    fn launch(&self, raw: &str) -> Result<Session, SessionError> {
        let descriptor: SourceDescriptor = raw.parse()?;
        let cancel = CancelToken::new();
        let frames: Arc<FrameBuffer<FrameRecord>> =
            Arc::new(FrameBuffer::new(self.config.frame_buffer_capacity));
        let alerts: Arc<AlertBuffer<AlertCandidate>> = Arc::new(AlertBuffer::new());

        let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<(), SessionError>>(1);
        let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(1);

        let ingest = {
            let sources = Arc::clone(&self.parts.sources);
            let detectors = Arc::clone(&self.parts.detectors);
            let config = Arc::clone(&self.config);
            let overlay = self.overlay.clone();
            let frames = Arc::clone(&frames);
            let alerts = Arc::clone(&alerts);
            let cancel = cancel.clone();
            let publisher = Arc::clone(&self.parts.publisher);
            let descriptor = descriptor.clone();

            spawn("ingest", move || {
                let source = match sources.open(&descriptor) {
                    Ok(source) => source,
                    Err(reason) => {
                        let _ = init_tx.send(Err(SourceError::Open {
                            descriptor: descriptor.to_string(),
                            reason,
                        }
                        .into()));
                        return Outcome::Failed;
                    }
                };
                let detector = match detectors.load() {
                    Ok(detector) => detector,
                    Err(e) => {
                        let _ = init_tx.send(Err(SessionError::Detector(e)));
                        return Outcome::Failed;
                    }
                };
                let _ = init_tx.send(Ok(()));

                // Wait until every other stage is up
                if go_rx.recv().is_err() {
                    tracing::debug!("Session for {} aborted before start", descriptor);
                    return Outcome::Stopped;
                }

                Ingestion::new(
                    source, detector, config, overlay, frames, alerts, cancel, publisher,
                )
                .run()
            })?
        };

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = ingest.join();
                return Err(e);
            }
            Err(_) => {
                let _ = ingest.join();
                return Err(SessionError::Aborted("ingest"));
            }
        }

        let mut stages = Stages {
            ingest,
            workers: Vec::with_capacity(2),
        };

        let streaming = Streaming {
            frames,
            publisher: Arc::clone(&self.parts.publisher),
            cancel: cancel.clone(),
            interval: self.config.stream_interval(),
            backoff: self.config.publish_backoff(),
            jpeg_quality: self.config.stream_jpeg_quality,
        };
        let enrichment = Enrichment {
            alerts,
            config: Arc::clone(&self.config),
            analyzer: Arc::clone(&self.parts.analyzer),
            store: Arc::clone(&self.parts.store),
            publisher: Arc::clone(&self.parts.publisher),
            counter: Arc::clone(&self.alert_ids),
            cancel: cancel.clone(),
        };

        let workers: [(&'static str, Box<dyn FnOnce() + Send>); 2] = [
            ("stream", Box::new(move || streaming.run())),
            ("enrich", Box::new(move || enrichment.run())),
        ];
        for (name, body) in workers {
            match spawn(name, body) {
                Ok(handle) => stages.workers.push((name, handle)),
                Err(e) => {
                    abort(&cancel, go_tx, stages);
                    return Err(e);
                }
            }
        }

        let (stages_tx, stages_rx) = crossbeam_channel::bounded::<Stages>(1);
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);
        let supervisor = {
            let cancel = cancel.clone();
            let publisher = Arc::clone(&self.parts.publisher);
            spawn("supervisor", move || {
                let Ok(stages) = stages_rx.recv() else {
                    return;
                };
                let outcome = supervise(stages, &cancel, publisher.as_ref());
                tracing::info!("Monitoring {}", outcome.status());
                if let Err(e) = publisher.publish(Event::MonitoringStopped {
                    status: outcome.status().to_string(),
                }) {
                    tracing::warn!("Failed to publish monitoring_stopped: {}", e);
                }
                drop(finished_tx);
            })
        };
        let supervisor = match supervisor {
            Ok(handle) => handle,
            Err(e) => {
                abort(&cancel, go_tx, stages);
                return Err(e);
            }
        };
        if let Err(returned) = stages_tx.send(stages) {
            abort(&cancel, go_tx, returned.into_inner());
            let _ = supervisor.join();
            return Err(SessionError::Aborted("supervisor"));
        }

        self.notify(Event::MonitoringStarted {
            source: descriptor.to_string(),
        });
        let _ = go_tx.send(());

        Ok(Session {
            descriptor,
            cancel,
            supervisor,
            finished: finished_rx,
        })
    }

    fn notify(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.parts.publisher.publish(event) {
            tracing::warn!("Failed to publish {}: {}", name, e);
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn<T, F>(stage: &'static str, body: F) -> Result<JoinHandle<T>, SessionError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .name(stage.to_string())
        .spawn(body)
        .map_err(|source| SessionError::Spawn { stage, source })
}

/// Tear down a partially started session
fn abort(cancel: &CancelToken, go: Sender<()>, stages: Stages) {
    cancel.cancel();
    drop(go);
    stages.join();
}

/// Join every stage as it finishes. A panicking stage is reported once and
/// cancels the rest.
fn supervise(stages: Stages, cancel: &CancelToken, publisher: &dyn Publisher) -> Outcome {
    let Stages {
        ingest,
        mut workers,
    } = stages;
    let mut ingest = Some(ingest);
    let mut outcome = None;
    let mut panicked = false;

    let mut fail = |stage: &str| {
        cancel.cancel();
        if panicked {
            return;
        }
        panicked = true;
        tracing::error!("{} stage panicked", stage);
        if let Err(e) = publisher.publish(Event::MonitoringError {
            error: format!("{stage} stage panicked"),
        }) {
            tracing::warn!("Failed to publish monitoring error: {}", e);
        }
    };

    loop {
        if ingest.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = ingest.take() {
                match handle.join() {
                    Ok(result) => outcome = Some(result),
                    Err(_) => fail("ingest"),
                }
            }
        }

        let mut i = 0;
        while i < workers.len() {
            if workers[i].1.is_finished() {
                let (name, handle) = workers.swap_remove(i);
                if handle.join().is_err() {
                    fail(name);
                }
            } else {
                i += 1;
            }
        }

        if ingest.is_none() && workers.is_empty() {
            break;
        }
        std::thread::sleep(SUPERVISE_POLL);
    }

    if panicked {
        Outcome::Failed
    } else {
        outcome.unwrap_or(Outcome::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::OfflineAnalyzer;
    use crate::capture::FrameSource;
    use crate::detection::Detector;
    use crate::publish::ChannelPublisher;
    use crate::storage::MemoryStore;
    use anyhow::{bail, Result};

    fn monitor() -> (Monitor, Receiver<Event>) {
        let (publisher, rx) = ChannelPublisher::new();
        let sources = |_: &SourceDescriptor| -> Result<Box<dyn FrameSource>> { bail!("no such device") };
        let detectors = || -> Result<Box<dyn Detector>> { bail!("no model") };
        let parts = Collaborators {
            sources: Arc::new(sources),
            detectors: Arc::new(detectors),
            analyzer: Arc::new(OfflineAnalyzer),
            store: Arc::new(MemoryStore::new()),
            publisher: Arc::new(publisher),
        };
        (Monitor::new(PipelineConfig::default(), parts), rx)
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (monitor, rx) = monitor();
        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.state(), SessionState::Idle);
        assert!(monitor.wait_idle(Duration::from_millis(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn bad_descriptor_is_reported_once() {
        let (monitor, rx) = monitor();
        let err = monitor.start("  ").unwrap_err();
        assert!(matches!(err, SessionError::Source(SourceError::Descriptor(_))));

        let names: Vec<_> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["monitoring_error"]);
        assert_eq!(monitor.state(), SessionState::Idle);
    }

    #[test]
    fn open_failure_starts_nothing() {
        let (monitor, rx) = monitor();
        let err = monitor.start("camera:3").unwrap_err();
        assert!(matches!(err, SessionError::Source(SourceError::Open { .. })));
        assert!(err.to_string().contains("no such device"));

        let names: Vec<_> = rx.try_iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["monitoring_error"]);
        assert_eq!(monitor.state(), SessionState::Idle);
        assert_eq!(monitor.alerts_issued(), 0);
    }
}
