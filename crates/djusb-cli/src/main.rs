//! djusb: raw disk backup and restore
//!
//! Commands:
//!   dd --mode backup|restore --if <in> --of <out> --json <controller>
//!        [--filepass <pass>] [--compress true|false]
//!   config show   - display the effective configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::info;

use djusb_core::config::DjusbConfig;
use djusb_core::Mode;
use djusb_pipeline::{DecisionRecord, PipelineError, RunRequest, RunSettings};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "djusb",
    version,
    about = "Raw disk backup and restore",
    long_about = "djusb: copy a disk or file through compression, encryption and an integrity \
                  check, steered by a JSON controller file"
)]
struct Cli {
    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "DJUSB_CONFIG",
        default_value = "/etc/djusb/config.toml",
        global = true
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "DJUSB_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "DJUSB_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Back up or restore one stream
    Dd(DdArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct DdArgs {
    /// backup: disk/file → artifact; restore: artifact → disk/file
    #[arg(long)]
    mode: Mode,

    /// Input path (disk or file)
    #[arg(long = "if", value_name = "PATH")]
    input: PathBuf,

    /// Output path (disk or file)
    #[arg(long = "of", value_name = "PATH")]
    output: PathBuf,

    /// Controller file; created on first use
    #[arg(long = "json", value_name = "PATH")]
    controller: PathBuf,

    /// File passphrase (prompted for when absent)
    #[arg(long, env = "DJUSB_FILEPASS", hide_env_values = true)]
    filepass: Option<String>,

    /// Seed compress.enabled; ignored once the controller records a choice
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    compress: Option<bool>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DjusbConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    match cli.command {
        Commands::Dd(args) => cmd_dd(&config, args),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for `config show`.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── `djusb dd` ─────────────────────────────────────────────────────────────────

fn cmd_dd(config: &DjusbConfig, args: DdArgs) -> Result<()> {
    validate_dd(&args)?;

    let passphrase = match args.filepass {
        Some(pass) => pass,
        None => rpassword::prompt_password("file passphrase: ")
            .context("reading file passphrase")?,
    };
    if passphrase.is_empty() {
        return Err(PipelineError::Config(
            "a file passphrase is required (--filepass or DJUSB_FILEPASS)".into(),
        )
        .into());
    }

    let request = RunRequest {
        mode: args.mode,
        source_path: args.input,
        dest_path: args.output,
        controller_path: args.controller,
        passphrase: SecretString::from(passphrase),
        seed: seed_from(args.compress),
        settings: RunSettings::from(config),
    };

    let report = djusb_pipeline::execute(request)?;
    info!(
        mode = %report.mode,
        bytes = report.bytes_copied,
        "dd finished"
    );
    Ok(())
}

/// Reject argument combinations that cannot work, before touching any file.
fn validate_dd(args: &DdArgs) -> Result<(), PipelineError> {
    let paths = [
        ("--if", &args.input),
        ("--of", &args.output),
        ("--json", &args.controller),
    ];
    for (flag, path) in paths {
        if path.as_os_str().is_empty() {
            return Err(PipelineError::Config(format!("{flag} must not be empty")));
        }
    }
    for (i, (flag_a, a)) in paths.iter().enumerate() {
        for (flag_b, b) in &paths[i + 1..] {
            if a == b {
                return Err(PipelineError::Config(format!(
                    "{flag_a} and {flag_b} name the same path: {}",
                    a.display()
                )));
            }
        }
    }
    Ok(())
}

/// Caller defaults, consulted only for decisions the controller lacks.
fn seed_from(compress: Option<bool>) -> DecisionRecord {
    let mut seed = DecisionRecord::default();
    if let Some(enabled) = compress {
        seed.compress_mut().enabled = Some(enabled);
    }
    seed
}

// ── `djusb config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &DjusbConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
