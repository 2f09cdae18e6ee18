//! Learn Plus CLI - sign in, browse the catalog, and track enrollments
//! from the terminal.

mod commands;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use learnplus_core::Config;

// ============================================================================
// Constants
// ============================================================================

/// File name prefix for the daily rolling log
const LOG_FILE_PREFIX: &str = "learnplus.log";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "learnplus", version, about, long_about = None)]
struct Cli {
    /// Backend base URL. Overrides LEARNPLUS_API_URL and the config file.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account. Does not sign in.
    Signup(Credentials),

    /// Sign in and store the session.
    Signin(Credentials),

    /// Sign out and forget the stored session.
    Signout,

    /// Show who is signed in.
    Status,

    /// List the course catalog.
    Courses,

    /// Show one course and its lessons.
    Course { slug: String },

    /// Enroll in a course.
    Enroll { slug: String },

    /// List your enrollments with progress.
    Enrollments,

    /// Show one enrollment and its lessons.
    Enrollment { slug: String },

    /// Mark a lesson complete, by lesson id or 1-based position.
    Complete { slug: String, lesson: String },

    /// Leave a course.
    Unenroll { slug: String },

    /// Keep the session refreshed until Ctrl-C or expiry.
    Keepalive,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(short, long, env = "LEARNPLUS_USERNAME")]
    username: Option<String>,

    /// Prompted for when not given
    #[arg(long, env = "LEARNPLUS_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Output goes to stderr,
/// and additionally to a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let mut dir_error = None;
    let (file_layer, guard) = match log_dir {
        Some(dir) => match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (
                    Some(fmt::layer().with_ansi(false).with_writer(writer)),
                    Some(guard),
                )
            }
            Err(e) => {
                dir_error = Some(e);
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    if let (Some(e), Some(dir)) = (dir_error, log_dir) {
        warn!(error = %e, dir = %dir.display(), "Could not create log directory");
    }
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(config.log_dir.as_deref());
    info!("learnplus starting");

    match commands::run(cli.command, config, cli.api_url).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
