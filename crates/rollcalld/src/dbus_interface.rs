use crate::engine::{EngineError, EngineHandle};
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Rollcall1";
pub const OBJECT_PATH: &str = "/org/rollcall/Rollcall1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
pub struct RollcallService {
    engine: EngineHandle,
}

impl RollcallService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

/// Short client-facing text for an engine failure. Details stay in the log.
fn user_message(err: &EngineError) -> &'static str {
    match err {
        EngineError::Camera(_) => "camera unavailable",
        EngineError::Recognition(_) => "recognition failed",
        EngineError::Preview(_) => "could not write preview",
        EngineError::Spawn(_) | EngineError::ChannelClosed => "engine unavailable",
    }
}

fn failed(err: EngineError) -> zbus::fdo::Error {
    tracing::warn!(error = %err, "request failed");
    zbus::fdo::Error::Failed(user_message(&err).to_string())
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Start streaming camera frames through live recognition.
    async fn start_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("start_session requested");
        self.engine.start_session().await.map_err(failed)
    }

    /// Stop streaming. Returns whether a session was running.
    async fn stop_session(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop_session requested");
        self.engine.stop_session().await.map_err(failed)
    }

    /// First label of the latest frame, or its diagnostic.
    async fn current_face(&self) -> zbus::fdo::Result<String> {
        self.engine.current_face().await.map_err(failed)
    }

    async fn latest_labels(&self) -> zbus::fdo::Result<Vec<String>> {
        self.engine.latest_labels().await.map_err(failed)
    }

    /// Decide on attendance for `expected_full_name`. Returns (accepted, message).
    async fn submit_attendance(&self, expected_full_name: &str) -> zbus::fdo::Result<(bool, String)> {
        tracing::info!(expected = expected_full_name, "attendance submitted");
        let decision = self
            .engine
            .submit(expected_full_name.to_string())
            .await
            .map_err(failed)?;
        Ok((decision.is_accepted(), decision.message()))
    }

    /// Recognize a photo on disk. Returns a JSON summary.
    async fn recognize_photo(&self, path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(path, "photo recognition requested");
        let summary = self
            .engine
            .recognize_photo(path.into())
            .await
            .map_err(failed)?;
        serde_json::to_string(&summary).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Write the latest annotated frame to `path`. Returns false when no
    /// frame has been processed yet.
    async fn save_preview(&self, path: &str) -> zbus::fdo::Result<bool> {
        self.engine.save_preview(path.into()).await.map_err(failed)
    }

    /// Return daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(failed)?;
        serde_json::to_string(&status).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::PipelineError;
    use rollcall_hw::CameraError;

    #[test]
    fn test_failed_hides_internal_detail() {
        let err = EngineError::Recognition(PipelineError::Decode(image::ImageError::IoError(
            std::io::Error::new(std::io::ErrorKind::InvalidData, "png decoder: bad IHDR chunk"),
        )));
        let zbus::fdo::Error::Failed(message) = failed(err) else {
            panic!("expected Failed");
        };
        assert_eq!(message, "recognition failed");
        assert!(!message.contains("IHDR"));
    }

    #[test]
    fn test_user_messages() {
        let camera = EngineError::Camera(CameraError::CaptureFailed("VIDIOC_DQBUF: EIO".into()));
        assert_eq!(user_message(&camera), "camera unavailable");
        assert_eq!(user_message(&EngineError::ChannelClosed), "engine unavailable");
    }
}
