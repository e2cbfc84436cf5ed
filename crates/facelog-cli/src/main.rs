use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facelog_hw::{Camera, FrameSource};
use std::path::PathBuf;

#[zbus::proxy(
    interface = "io.facelog.Kiosk1",
    default_service = "io.facelog.Kiosk1",
    default_path = "/io/facelog/Kiosk1"
)]
trait Kiosk {
    async fn start_scanner(&self) -> zbus::Result<String>;
    async fn stop_scanner(&self) -> zbus::Result<bool>;
    async fn register(&self, name: &str, role: &str, photo_path: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn list_users(&self) -> zbus::Result<String>;
    async fn list_records(&self) -> zbus::Result<String>;
    async fn dashboard(&self) -> zbus::Result<String>;
    async fn export_csv(&self) -> zbus::Result<(String, String)>;
}

#[derive(Parser)]
#[command(name = "facelog", about = "facelog attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera and start taking attendance
    Start,
    /// Stop the scanner and release the camera
    Stop,
    /// Register a new employee
    Register {
        /// Employee display name
        #[arg(short, long)]
        name: String,
        /// Role or job title
        #[arg(short, long)]
        role: String,
        /// Reference photo file; captured from the camera when omitted
        #[arg(short, long)]
        photo: Option<PathBuf>,
    },
    /// Show daemon and scanner status
    Status,
    /// List registered employees
    Users,
    /// List attendance records, newest first
    Records,
    /// Show today's summary and trends
    Dashboard,
    /// Export attendance records as CSV
    Export {
        /// Output file; defaults to attendance_logs_<date>.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device to probe
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Test { device } => camera_test(&device)?,
        Commands::Start => {
            let snapshot = connect().await?.start_scanner().await?;
            println!("Scanner started");
            print_json(&snapshot)?;
        }
        Commands::Stop => {
            if connect().await?.stop_scanner().await? {
                println!("Scanner stopped");
            } else {
                println!("Scanner was not running");
            }
        }
        Commands::Register { name, role, photo } => {
            let photo_path = match photo {
                Some(path) => std::fs::canonicalize(&path)
                    .with_context(|| format!("photo {}", path.display()))?
                    .to_string_lossy()
                    .into_owned(),
                None => {
                    println!("Look at the camera...");
                    String::new()
                }
            };
            tracing::debug!(name = %name, role = %role, photo = %photo_path, "registering");
            let user = connect().await?.register(&name, &role, &photo_path).await?;
            println!("User registered successfully!");
            print_json(&user)?;
        }
        Commands::Status => print_json(&connect().await?.status().await?)?,
        Commands::Users => print_json(&connect().await?.list_users().await?)?,
        Commands::Records => print_json(&connect().await?.list_records().await?)?,
        Commands::Dashboard => print_json(&connect().await?.dashboard().await?)?,
        Commands::Export { output } => {
            let (filename, csv) = connect().await?.export_csv().await?;
            let path = output.unwrap_or_else(|| PathBuf::from(filename));
            tracing::debug!(path = %path.display(), bytes = csv.len(), "writing export");
            std::fs::write(&path, csv).with_context(|| format!("writing {}", path.display()))?;
            println!("Exported to {}", path.display());
        }
    }

    Ok(())
}

/// Connect to the daemon on the session bus.
async fn connect() -> Result<KioskProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    tracing::debug!("connected to session bus");
    KioskProxy::new(&conn)
        .await
        .context("facelogd is not reachable; is the daemon running?")
}

/// Pretty-print a JSON payload returned by the daemon.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn camera_test(device: &str) -> Result<()> {
    println!("Running camera diagnostics...");

    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for info in &devices {
        println!("  {}  {} ({}, {})", info.path, info.name, info.driver, info.bus);
    }

    tracing::debug!(count = devices.len(), "enumerated capture devices");

    let mut camera = Camera::open(device, 1280, 720).with_context(|| format!("opening {device}"))?;
    println!(
        "Opened {} at {}x{} ({:?})",
        camera.device_path, camera.width, camera.height, camera.fourcc
    );
    camera.discard_warmup(4);

    match camera.capture_still() {
        Ok(frame) => {
            let jpeg = frame.to_jpeg(80)?;
            println!(
                "Captured frame #{}: brightness {:.1}, {} byte JPEG",
                frame.sequence,
                frame.avg_brightness(),
                jpeg.len()
            );
        }
        Err(e) => {
            tracing::warn!(device, error = %e, "diagnostic capture failed");
            println!("Capture failed: {e}");
        }
    }
    Ok(())
}
