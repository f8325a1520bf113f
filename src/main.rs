use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use boothcam::engine::EngineState;
use boothcam::template::catalog;
use boothcam::{create_camera, BoothConfig, BoothEngine, FileSessionStore};

#[derive(Parser, Debug)]
#[command(name = "boothcam")]
#[command(about = "Event photobooth engine with automated capture sessions and collage composition")]
#[command(version)]
#[command(long_about = "Runs an unattended photobooth capture session: warms up the \
configured camera, counts down and captures each shot, and composes the results \
into a printable collage. Session photos and collages are stored under the \
configured storage root; the surrounding kiosk UI drives the same engine through \
the library API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "boothcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// List built-in collage templates and exit
    #[arg(long, help = "List the built-in collage templates and exit")]
    list_templates: bool,

    /// Dry run mode - connect the camera but take no photos
    #[arg(long, help = "Perform dry run - warm up the camera, then shut down without a session")]
    dry_run: bool,

    /// Template to use instead of the configured default
    #[arg(short, long, value_name = "NAME", help = "Built-in template name for this session")]
    template: Option<String>,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    if args.list_templates {
        print_templates();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting boothcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match BoothConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let template_name = args
        .template
        .clone()
        .unwrap_or_else(|| config.session.default_template.clone());
    let template = catalog::template_by_name(&template_name)
        .ok_or_else(|| anyhow::anyhow!("unknown template '{}'; see --list-templates", template_name))?;

    let camera = create_camera(config.camera.backend, &config.camera)
        .map_err(|e| anyhow::anyhow!("camera setup failed: {}", e))?;
    let store = Arc::new(FileSessionStore::new(config.storage.root.clone()));

    let engine = BoothEngine::builder()
        .with_config(config)
        .with_camera(camera)
        .with_store(store)
        .build()?;

    engine.warmup_camera().await?;
    info!("Camera warm, preview running");

    if args.dry_run {
        println!("✓ Dry run completed - camera connected and released");
        engine.shutdown_camera().await?;
        engine.stop().await;
        return Ok(());
    }

    let session_id = engine.begin_session(template).await?;
    info!("Session {} started", session_id);

    let outcome = run_session_to_end(&engine).await;

    engine.stop().await;
    outcome
}

/// Follow the session until it reaches a terminal state, echoing progress
async fn run_session_to_end(engine: &BoothEngine) -> Result<()> {
    let mut last_progress = (0, 0);
    let mut compose_retried = false;

    loop {
        let state = engine.state();
        let progress = engine.current_progress();

        if progress != last_progress {
            println!("📸 {} / {} photos", progress.0, progress.1);
            last_progress = progress;
        }

        match state {
            EngineState::Complete => {
                let collage = engine
                    .latest_collage()
                    .ok_or_else(|| anyhow::anyhow!("session complete but no collage recorded"))?;
                match collage.path {
                    Some(path) => println!("✓ Collage ready: {}", path.display()),
                    None => println!("✓ Collage ready ({} bytes)", collage.data.len()),
                }
                return Ok(());
            }
            EngineState::SessionFailed => {
                anyhow::bail!(
                    "session failed after {} of {} photos; captured shots were kept",
                    progress.0,
                    progress.1
                );
            }
            EngineState::ComposeFailed => {
                if compose_retried {
                    anyhow::bail!(
                        "collage composition failed: {}",
                        engine.last_failure().unwrap_or_default()
                    );
                }
                compose_retried = true;
                info!("Compose failed; retrying once");
                engine.retry_compose().await?;
            }
            _ => {}
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("boothcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .boxed(),
        None => fmt::layer().with_target(args.debug).boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(args.debug).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

fn print_templates() {
    println!("Built-in collage templates:");
    println!();
    for template in catalog::builtin_templates() {
        println!(
            "  {:<22} {} photos, {}x{} - {}",
            template.name,
            template.frame_count(),
            template.canvas.width,
            template.canvas.height,
            template.description
        );
    }
}

/// Print default configuration in TOML format
fn print_default_config() {
    let default_config = r#"# Boothcam Configuration File
# This is the default configuration with all available options

[camera]
# Camera backend: "webcam", "nikon_dslr", "usb_ptp", "os_camera"
backend = "webcam"
# Camera device index (e.g., 0 for the first webcam)
index = 0
# Capture resolution (width, height)
resolution = [1280, 720]
# Preview polling rate in frames per second
preview_fps = 30

[session]
# Event this booth is running for
event_id = 0
# Countdown length before each shot, in seconds
countdown_seconds = 3
# Pause between the post-shot display and the next countdown, in seconds
inter_shot_delay_seconds = 3
# How long the captured shot is held on screen, in seconds
display_duration_seconds = 2
# Grace delay between the final countdown tick and the capture, in milliseconds
capture_grace_ms = 500
# Manual retries of a failed capture before the session is failed
max_capture_retries = 3
# Built-in template used when no template is given
default_template = "4 Fotos Grid"

[collage]
# JPEG quality factor for the composed output (1-100)
jpeg_quality = 95
# Draw the per-photo border declared by the template
apply_border = true

[storage]
# Base path for session photos and composed collages
root = "./booth_data"
"#;

    println!("{}", default_config);
}
