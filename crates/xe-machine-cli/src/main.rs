#![forbid(unsafe_code)]

mod machine;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use xe_devices_gpu::{ConversionPath, LinearFrame, XenosConfig};

use crate::machine::{Machine, MachineConfig};

#[derive(Debug, Parser)]
#[command(about = "Headless runner for the console bus fabric (display bring-up debugging)")]
pub struct Args {
    /// Guest RAM size in MiB.
    #[arg(long, default_value_t = 512)]
    ram: u64,

    /// JSON display configuration; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after the display has presented this many frames.
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Give up after this many milliseconds of host time.
    #[arg(long, default_value_t = 10_000)]
    max_ms: u64,

    /// Override the conversion path from the configuration (`cpu` or `kernel`).
    #[arg(long)]
    conversion: Option<String>,

    /// Disable refresh pacing.
    #[arg(long)]
    no_vsync: bool,

    /// Do not draw the test pattern into the framebuffer.
    #[arg(long)]
    no_pattern: bool,

    /// Dump the last presented frame to a PNG file on exit.
    #[arg(long)]
    png: Option<PathBuf>,
}

fn load_xenos_config(args: &Args) -> Result<XenosConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            serde_json::from_str::<XenosConfig>(&text)
                .with_context(|| format!("invalid config: {}", path.display()))?
        }
        None => XenosConfig::default(),
    };
    if let Some(conversion) = &args.conversion {
        config.conversion = match conversion.as_str() {
            "cpu" => ConversionPath::Cpu,
            "kernel" => ConversionPath::Kernel,
            other => bail!("unknown conversion path {other:?} (expected `cpu` or `kernel`)"),
        };
    }
    if args.no_vsync {
        config.vsync = false;
    }
    config.validate().context("invalid display configuration")?;
    Ok(config)
}

fn dump_png(frame: &LinearFrame, path: &Path) -> Result<()> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.to_rgba8())
        .context("invalid frame data")?;
    img.save(path)
        .with_context(|| format!("failed to write PNG: {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ram_bytes = args
        .ram
        .checked_mul(1024 * 1024)
        .context("RAM size overflow")?;
    let xenos = load_xenos_config(&args)?;
    let render = xenos.render_thread_enabled;

    let mut machine = Machine::new(MachineConfig {
        ram_bytes,
        frames: args.frames,
        xenos,
    })?;
    machine.post(0x10);
    machine.log_pci_inventory();
    if !args.no_pattern {
        machine.draw_test_pattern();
    }
    machine.post(0x11);

    if render {
        let deadline = Instant::now() + Duration::from_millis(args.max_ms);
        while machine.display_running() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    frames = machine.frames_presented(),
                    "time limit reached before the frame target"
                );
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        tracing::info!(frames = machine.frames_presented(), "display stopped");
    } else {
        tracing::warn!("display disabled; nothing to present");
    }

    if let Some(path) = &args.png {
        let Some(frame) = machine.last_frame() else {
            bail!("no frame was presented");
        };
        dump_png(&frame, path)?;
        tracing::info!(path = %path.display(), "wrote frame");
    }
    Ok(())
}
