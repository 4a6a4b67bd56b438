//! spongeshell - drive an interactive shell from a simple surface
//!
//! spongeshell starts one shell (cmd.exe on Windows, `$SHELL` elsewhere)
//! behind plain pipes, forwards key presses to it as bytes and streams its
//! stdout and stderr back to the console.
//!
//! # Quick Start
//!
//! ```text
//! spongeshell                    # Default shell in the home directory
//! spongeshell -s pwsh.exe        # PowerShell 7
//! spongeshell -d C:\work -k      # Start in C:\work, keep open after exit
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Q | Stop the shell and quit |
//! | Ctrl+R | Start a new shell after the last one exited |

mod app;
mod config;
mod core;
mod ui;

use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::Settings;
use crate::config::Config;

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line overrides
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    /// Shell program
    shell: Option<String>,
    /// Start directory
    dir: Option<PathBuf>,
    /// Keep running after the shell exits
    keep_open: bool,
}

#[derive(Debug, PartialEq)]
enum CliAction {
    Run(CliArgs),
    Help,
    Version,
}

fn print_version() {
    eprintln!("spongeshell {}", VERSION);
}

fn print_help() {
    eprintln!("spongeshell {} - Drive an interactive shell over pipes", VERSION);
    eprintln!();
    eprintln!("Usage: spongeshell [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Shell program (default: from config.toml,");
    eprintln!("                        else cmd.exe on Windows, $SHELL elsewhere)");
    eprintln!("  -d, --dir <PATH>      Start directory (default: home directory)");
    eprintln!("  -k, --keep-open       Keep running after the shell exits");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Ctrl+Q                Stop the shell and quit");
    eprintln!("  Ctrl+R                Start a new shell after the last one exited");
    eprintln!();
    eprintln!("Files:");
    eprintln!("  ~/.spongeshell/config.toml       Optional settings");
    eprintln!("  ~/.spongeshell/spongeshell.log   Log (filter with RUST_LOG)");
}

/// Parse command line arguments (without the program name)
fn parse_args<I>(args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-v" | "--version" => return Ok(CliAction::Version),
            "-s" | "--shell" => {
                let shell = args
                    .next()
                    .ok_or_else(|| format!("{} requires a shell command", arg))?;
                cli.shell = Some(shell);
            }
            "-d" | "--dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| format!("{} requires a directory", arg))?;
                cli.dir = Some(PathBuf::from(dir));
            }
            "-k" | "--keep-open" => cli.keep_open = true,
            other => return Err(format!("Unknown option: {}", other)),
        }
    }

    Ok(CliAction::Run(cli))
}

/// Log to `~/.spongeshell/spongeshell.log`; the console belongs to the shell
fn init_logging(level: &str) {
    let Some(dir) = Config::config_dir() else {
        return;
    };
    let _ = fs::create_dir_all(&dir);

    let log_file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("spongeshell.log"))
    {
        Ok(file) => file,
        Err(_) => return,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// CLI flags over the config file over built-in defaults
fn resolve(cli: CliArgs, config: &Config) -> Settings {
    let mut command = config.shell_command();
    if let Some(shell) = cli.shell {
        command = command.with_program(shell);
    }
    if let Some(dir) = cli.dir {
        command.working_dir = Some(dir);
    }
    Settings {
        command,
        close_on_exit: config.close_on_exit && !cli.keep_open,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(CliAction::Run(cli)) => cli,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    // Config comes first so its log level applies; errors are logged after
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config.log_level);
    info!("spongeshell {} starting...", VERSION);
    if let Some(e) = config_error {
        warn!("{}, using defaults", e);
    }

    app::run(resolve(cli, &config))
}
