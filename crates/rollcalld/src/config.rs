use rollcall_core::ModelPaths;
use std::path::PathBuf;

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the detector, embedder, classifier and label artifacts.
    pub model_dir: PathBuf,
    /// Frames discarded at the start of each session while exposure settles.
    pub warmup_frames: usize,
    /// Pause between processed frames; 0 processes frames back-to-back.
    pub frame_interval_ms: u64,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(rollcall_core::default_model_dir);

        let bus = match var("ROLLCALL_BUS").as_deref() {
            Some("system") => BusKind::System,
            _ => BusKind::Session,
        };

        Self {
            camera_device: var("ROLLCALL_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            warmup_frames: parse_or(var("ROLLCALL_WARMUP_FRAMES"), 4),
            frame_interval_ms: parse_or(var("ROLLCALL_FRAME_INTERVAL_MS"), 0),
            bus,
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
