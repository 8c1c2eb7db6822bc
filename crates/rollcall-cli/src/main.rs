use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{ModelPaths, Recognition, RecognitionEngine};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    /// Model directory for local recognition (default: $ROLLCALL_MODEL_DIR or
    /// ~/.local/share/rollcall/models)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize faces in a photo locally
    Recognize {
        image: PathBuf,
        /// Save the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a JSON summary instead of labels
        #[arg(long)]
        json: bool,
    },
    /// Recognize a photo locally and apply the attendance decision
    Check {
        image: PathBuf,
        #[arg(long)]
        first: String,
        #[arg(long, default_value = "")]
        middle: String,
        #[arg(long)]
        last: String,
    },
    /// Start a live attendance session in the daemon
    Start,
    /// Stop the live session
    Stop,
    /// Show the daemon's current prediction
    Current,
    /// Show every label of the latest frame
    Labels,
    /// Submit attendance for a full name against the live session
    Submit {
        #[arg(short, long)]
        name: String,
    },
    /// Ask the daemon to recognize a photo on disk
    Photo { path: PathBuf },
    /// Save the daemon's latest annotated frame
    Preview { output: PathBuf },
    /// Show daemon status
    Status,
    /// List V4L2 capture devices
    Devices,
}

// `#[zbus::proxy]` generates `RollcallProxy` (async) and `RollcallProxyBlocking`.
#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    async fn start_session(&self) -> zbus::Result<()>;
    async fn stop_session(&self) -> zbus::Result<bool>;
    async fn current_face(&self) -> zbus::Result<String>;
    async fn latest_labels(&self) -> zbus::Result<Vec<String>>;
    async fn submit_attendance(&self, expected_full_name: &str) -> zbus::Result<(bool, String)>;
    async fn recognize_photo(&self, path: &str) -> zbus::Result<String>;
    async fn save_preview(&self, path: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.clone();

    match cli.command {
        Commands::Recognize { image, output, json } => {
            let engine = load_engine(model_dir)?;
            let recognition = engine
                .recognize_file(&image)
                .with_context(|| format!("failed to recognize {}", image.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recognition.summary())?);
            } else {
                print_labels(&recognition);
            }
            if let Some(out) = output {
                save_annotated(&recognition, &out)?;
            }
        }
        Commands::Check {
            image,
            first,
            middle,
            last,
        } => {
            let engine = load_engine(model_dir)?;
            let recognition = engine
                .recognize_file(&image)
                .with_context(|| format!("failed to recognize {}", image.display()))?;
            let expected = rollcall_core::full_name(&first, &middle, &last);
            let decision = rollcall_core::decide(&recognition.display_labels(), &expected);
            println!("{}", decision.message());
            if !decision.is_accepted() {
                std::process::exit(1);
            }
        }
        Commands::Start => {
            proxy().await?.start_session().await?;
            println!("session started");
        }
        Commands::Stop => {
            let was_active = proxy().await?.stop_session().await?;
            println!("{}", if was_active { "session stopped" } else { "no session running" });
        }
        Commands::Current => {
            println!("{}", proxy().await?.current_face().await?);
        }
        Commands::Labels => {
            for label in proxy().await?.latest_labels().await? {
                println!("{label}");
            }
        }
        Commands::Submit { name } => {
            let (accepted, message) = proxy().await?.submit_attendance(&name).await?;
            println!("{message}");
            if !accepted {
                std::process::exit(1);
            }
        }
        Commands::Photo { path } => {
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            let summary = proxy().await?.recognize_photo(&path.to_string_lossy()).await?;
            println!("{summary}");
        }
        Commands::Preview { output } => {
            let output = std::env::current_dir()
                .context("cannot resolve working directory")?
                .join(output);
            if !proxy().await?.save_preview(&output.to_string_lossy()).await? {
                bail!("no frame processed yet; start a session first");
            }
            println!("preview saved to {}", output.display());
        }
        Commands::Status => {
            println!("{}", proxy().await?.status().await?);
        }
        Commands::Devices => {
            let devices = rollcall_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for d in devices {
                println!("{}\t{} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

fn load_engine(model_dir: Option<PathBuf>) -> Result<RecognitionEngine> {
    let dir = model_dir
        .or_else(|| std::env::var("ROLLCALL_MODEL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(rollcall_core::default_model_dir);
    RecognitionEngine::load(&ModelPaths::in_dir(&dir))
        .with_context(|| format!("failed to load models from {}", dir.display()))
}

fn print_labels(recognition: &Recognition) {
    for label in recognition.display_labels() {
        println!("{label}");
    }
}

fn save_annotated(recognition: &Recognition, out: &Path) -> Result<()> {
    let Some(image) = recognition.annotated_image() else {
        bail!("no annotated image to save: {}", recognition.display_labels().join(", "));
    };
    image
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("annotated image saved to {}", out.display());
    Ok(())
}

async fn proxy() -> Result<RollcallProxy<'static>> {
    let conn = match std::env::var("ROLLCALL_BUS").as_deref() {
        Ok("system") => zbus::Connection::system().await,
        _ => zbus::Connection::session().await,
    }
    .context("failed to connect to D-Bus")?;
    RollcallProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_middle_name_defaults_empty() {
        let cli = Cli::try_parse_from(["rollcall", "check", "me.jpg", "--first", "Bob", "--last", "X"]).unwrap();
        let Commands::Check { middle, first, last, .. } = cli.command else {
            panic!("expected check");
        };
        assert_eq!(rollcall_core::full_name(&first, &middle, &last), "Bob  X");
    }

    #[test]
    fn test_recognize_flags() {
        let cli = Cli::try_parse_from(["rollcall", "recognize", "a.png", "-o", "out.png", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Recognize { json: true, output: Some(_), .. }
        ));
    }

    #[test]
    fn test_submit_requires_name() {
        assert!(Cli::try_parse_from(["rollcall", "submit"]).is_err());
        assert!(Cli::try_parse_from(["rollcall", "submit", "--name", "Carol Lee"]).is_ok());
    }

    #[test]
    fn test_preview_requires_output() {
        assert!(Cli::try_parse_from(["rollcall", "preview"]).is_err());
        let cli = Cli::try_parse_from(["rollcall", "preview", "frame.png"]).unwrap();
        assert!(matches!(cli.command, Commands::Preview { output } if output == PathBuf::from("frame.png")));
    }

    #[test]
    fn test_global_model_dir() {
        let cli = Cli::try_parse_from(["rollcall", "recognize", "a.png", "--model-dir", "/m"]).unwrap();
        assert_eq!(cli.model_dir, Some(PathBuf::from("/m")));
    }
}
