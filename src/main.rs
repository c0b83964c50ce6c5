use anyhow::{Context, Result};
use camrelay::{CamrelayConfig, RunMode, Supervisor};
use clap::{Parser, ValueEnum};
use std::path::Path;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "camrelay")]
#[command(about = "Camera frame relay: capture, hand off and persist frames across processes")]
#[command(version)]
#[command(long_about = "Runs three loops over shared memory: a capture loop keeping the newest \
camera frame, a relay loop forwarding it on request, and a presenter that shows every frame \
and saves each relayed one exactly once.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camrelay.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the loops")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Append logs to a file in addition to stderr")]
    log_file: Option<String>,

    /// Override system.mode from the configuration
    #[arg(long, value_enum, help = "Run the loops as processes or as threads")]
    mode: Option<ModeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Process,
    Thread,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Process => RunMode::Process,
            ModeArg::Thread => RunMode::Thread,
        }
    }
}

// No tokio runtime here: process mode forks before the supervisor builds one
fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting camrelay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match CamrelayConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(mode) = args.mode {
        config.system.mode = mode.into();
    }

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let exit_code = Supervisor::new(config).run().map_err(|e| {
        error!("camrelay failed: {}", e);
        e
    })?;

    info!("camrelay exited with code: {}", exit_code);
    std::process::exit(exit_code);
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
        .unwrap_or_else(|_| EnvFilter::new(format!("camrelay={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .boxed()
        }
    };

    // Blocking writer: a background flush thread would not survive fork
    let file_layer = match args.log_file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(appender)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camrelay configuration file");
    println!("# Every key can be overridden by environment, e.g. CAMRELAY_RELAY__FRAME_COUNT=5");
    println!("#");
    println!("# [camera.parameters] takes overrides such as `focus = 250.0` or `shutter = true`");
    println!();
    let rendered = toml::to_string_pretty(&CamrelayConfig::default())
        .context("failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}
