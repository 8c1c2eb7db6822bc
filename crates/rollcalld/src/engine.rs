use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceDecision, ChannelOrder, LiveFrameProcessor, PipelineError, PixelFrame,
    RecognitionEngine, RecognitionSummary,
};
use rollcall_hw::{Camera, CameraError, Frame, FrameStream};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

/// Consecutive capture failures after which a session is abandoned.
const MAX_CAPTURE_FAILURES: u32 = 10;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("recognition failed: {0}")]
    Recognition(#[from] PipelineError),
    #[error("failed to write preview: {0}")]
    Preview(#[source] image::ImageError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of an attendance submission, as recorded in status.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub expected: String,
    #[serde(flatten)]
    pub decision: AttendanceDecision,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub version: &'static str,
    pub camera: String,
    pub session_active: bool,
    pub frames_processed: u64,
    pub dark_frames: u64,
    pub current_face: String,
    pub last_decision: Option<DecisionRecord>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    StartSession {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    StopSession {
        reply: oneshot::Sender<bool>,
    },
    CurrentFace {
        reply: oneshot::Sender<String>,
    },
    LatestLabels {
        reply: oneshot::Sender<Vec<String>>,
    },
    Submit {
        expected: String,
        reply: oneshot::Sender<AttendanceDecision>,
    },
    Photo {
        path: PathBuf,
        reply: oneshot::Sender<Result<RecognitionSummary, EngineError>>,
    },
    SavePreview {
        path: PathBuf,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Start streaming and recognizing frames. Starting an active session is a no-op.
    pub async fn start_session(&self) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::StartSession { reply }).await?
    }

    /// Stop streaming. Returns whether a session was active.
    pub async fn stop_session(&self) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::StopSession { reply }).await
    }

    pub async fn current_face(&self) -> Result<String, EngineError> {
        self.call(|reply| EngineRequest::CurrentFace { reply }).await
    }

    pub async fn latest_labels(&self) -> Result<Vec<String>, EngineError> {
        self.call(|reply| EngineRequest::LatestLabels { reply }).await
    }

    /// Decide on an attendance submission against the latest frame.
    pub async fn submit(&self, expected: String) -> Result<AttendanceDecision, EngineError> {
        self.call(|reply| EngineRequest::Submit { expected, reply }).await
    }

    /// Recognize a still photo from disk.
    pub async fn recognize_photo(&self, path: PathBuf) -> Result<RecognitionSummary, EngineError> {
        self.call(|reply| EngineRequest::Photo { path, reply }).await?
    }

    /// Write the latest annotated frame to `path`. Returns false when no
    /// frame has been processed in the current session.
    pub async fn save_preview(&self, path: PathBuf) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::SavePreview { path, reply }).await?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.call(|reply| EngineRequest::Status { reply }).await
    }
}

/// What the request loop should do after handling a request.
enum Control {
    Continue,
    Start(oneshot::Sender<Result<(), EngineError>>),
    Stop,
}

/// Engine-thread state shared by the idle and streaming loops.
struct Worker {
    engine: Arc<RecognitionEngine>,
    processor: LiveFrameProcessor,
    camera_device: String,
    session_active: bool,
    dark_frames: u64,
    last_decision: Option<DecisionRecord>,
    /// Annotated output of the most recent frame.
    preview: Option<PixelFrame>,
}

impl Worker {
    fn new(engine: Arc<RecognitionEngine>, camera_device: String) -> Self {
        Self {
            processor: LiveFrameProcessor::new(engine.clone()),
            engine,
            camera_device,
            session_active: false,
            dark_frames: 0,
            last_decision: None,
            preview: None,
        }
    }

    fn handle(&mut self, req: EngineRequest) -> Control {
        match req {
            EngineRequest::StartSession { reply } => {
                if self.session_active {
                    let _ = reply.send(Ok(()));
                    return Control::Continue;
                }
                return Control::Start(reply);
            }
            EngineRequest::StopSession { reply } => {
                let was_active = self.session_active;
                let _ = reply.send(was_active);
                if was_active {
                    return Control::Stop;
                }
            }
            EngineRequest::CurrentFace { reply } => {
                let _ = reply.send(self.processor.current_prediction());
            }
            EngineRequest::LatestLabels { reply } => {
                let _ = reply.send(self.processor.latest_labels());
            }
            EngineRequest::Submit { expected, reply } => {
                let decision = rollcall_core::decide(&self.processor.latest_labels(), &expected);
                let accepted = decision.is_accepted();
                self.last_decision = Some(DecisionRecord {
                    expected,
                    decision: decision.clone(),
                    at: Utc::now(),
                });
                let _ = reply.send(decision);
                if accepted && self.session_active {
                    return Control::Stop;
                }
            }
            EngineRequest::Photo { path, reply } => {
                let result = self
                    .engine
                    .recognize_file(&path)
                    .map(|r| r.summary())
                    .map_err(EngineError::from);
                if let Err(err) = &result {
                    tracing::warn!(path = %path.display(), error = %err, "photo recognition failed");
                }
                let _ = reply.send(result);
            }
            EngineRequest::SavePreview { path, reply } => {
                let result = self.save_preview(&path);
                if let Err(err) = &result {
                    tracing::warn!(path = %path.display(), error = %err, "preview save failed");
                }
                let _ = reply.send(result);
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
        Control::Continue
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            version: env!("CARGO_PKG_VERSION"),
            camera: self.camera_device.clone(),
            session_active: self.session_active,
            frames_processed: self.processor.frames_processed(),
            dark_frames: self.dark_frames,
            current_face: self.processor.current_prediction(),
            last_decision: self.last_decision.clone(),
        }
    }

    /// Run one captured frame through the live processor and keep the
    /// annotated result as the preview.
    fn process(&mut self, frame: Frame) {
        if frame.is_dark {
            self.dark_frames += 1;
            tracing::debug!(seq = frame.sequence, "dark frame");
        }
        let pixels = PixelFrame {
            data: frame.data,
            width: frame.width,
            height: frame.height,
            channels: 3,
            order: ChannelOrder::Bgr,
        };
        self.preview = Some(self.processor.process_frame(&pixels));
    }

    fn save_preview(&self, path: &Path) -> Result<bool, EngineError> {
        let Some(preview) = &self.preview else {
            return Ok(false);
        };
        let rgb = preview.to_rgb().map_err(PipelineError::from)?;
        rgb.save(path).map_err(EngineError::Preview)?;
        tracing::debug!(path = %path.display(), "preview saved");
        Ok(true)
    }

    /// Reply to a start request. The session becomes active only if the
    /// stream opened and warmed up.
    fn begin_session<T>(
        &mut self,
        reply: oneshot::Sender<Result<(), EngineError>>,
        opened: Result<T, CameraError>,
    ) -> Option<T> {
        match opened {
            Ok(stream) => {
                self.session_active = true;
                tracing::info!("session started");
                let _ = reply.send(Ok(()));
                Some(stream)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to start capture stream");
                let _ = reply.send(Err(err.into()));
                None
            }
        }
    }

    fn end_session(&mut self) {
        self.session_active = false;
        // Stale labels must not satisfy a later submission.
        self.processor.reset();
        self.preview = None;
        tracing::info!(frames = self.processor.frames_processed(), "session stopped");
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera up front so a missing device fails at startup rather
/// than on the first session.
pub fn spawn_engine(
    engine: Arc<RecognitionEngine>,
    camera_device: &str,
    warmup_frames: usize,
    frame_interval_ms: u64,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(camera_device)?;
    tracing::info!(
        device = camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);
    let mut worker = Worker::new(engine, camera_device.to_string());
    let interval = Duration::from_millis(frame_interval_ms);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let Control::Start(reply) = worker.handle(req) else {
                    continue;
                };
                let opened = camera
                    .stream()
                    .and_then(|mut stream| stream.warm_up(warmup_frames).map(|()| stream));
                let Some(mut stream) = worker.begin_session(reply, opened) else {
                    continue;
                };

                let open = run_session(&mut worker, &mut stream, &mut rx, interval);
                worker.end_session();
                if !open {
                    break;
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Capture and process frames until the session is stopped. Requests are
/// served between frames. Returns false once every handle is dropped.
fn run_session(
    worker: &mut Worker,
    stream: &mut FrameStream<'_>,
    rx: &mut mpsc::Receiver<EngineRequest>,
    interval: Duration,
) -> bool {
    let mut failures = 0u32;
    loop {
        loop {
            match rx.try_recv() {
                Ok(req) => match worker.handle(req) {
                    Control::Continue => {}
                    Control::Start(reply) => {
                        let _ = reply.send(Ok(()));
                    }
                    Control::Stop => return true,
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return false,
            }
        }

        match stream.next_frame() {
            Ok(frame) => {
                failures = 0;
                worker.process(frame);
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(error = %err, failures, "frame capture failed");
                if failures >= MAX_CAPTURE_FAILURES {
                    tracing::error!("too many capture failures; ending session");
                    return true;
                }
            }
        }

        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}
