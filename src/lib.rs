pub mod cli;
pub mod config;
pub mod db;
pub mod maintenance;
pub mod paths;
pub mod permissions;
pub mod platform;
pub mod sensing;
pub mod sync;
pub mod tracker;
pub mod utils;

use std::{ffi::OsString, sync::Arc};

use chrono::Utc;
use clap::Parser;

use cli::{Cli, Command};
use paths::AppPaths;
use platform::{DetachedPlatform, Platform};
use sync::HttpTransport;
use tracker::Tracker;
use utils::logging::init_logging;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

/// Entry point for the stock binary, which has no OS bridge linked in.
pub fn run() -> i32 {
    run_with_platform(Arc::new(DetachedPlatform))
}

/// Entry point for embedders that supply their own [`Platform`]. Returns the
/// process exit code.
pub fn run_with_platform(platform: Arc<dyn Platform>) -> i32 {
    run_with_args(std::env::args_os(), platform)
}

pub fn run_with_args<I, T>(args: I, platform: Arc<dyn Platform>) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    init_logging();

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };

    match cli.command() {
        Command::Version => {
            println!("{}", cli::VERSION_LINE);
            return 0;
        }
        Command::Permissions => {
            print!("{}", cli::permission_instructions());
            return 0;
        }
        Command::Status | Command::Run => {}
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start async runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(async_main(cli, platform))
}

async fn async_main(cli: Cli, platform: Arc<dyn Platform>) -> i32 {
    let paths = match AppPaths::resolve(cli.data_dir.clone()) {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("{err:#}");
            return 1;
        }
    };

    let transport = match HttpTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            eprintln!("{err:#}");
            return 1;
        }
    };

    let tracker = match Tracker::open(paths, platform, transport) {
        Ok(tracker) => tracker,
        Err(err) => {
            eprintln!("Failed to open tracker data: {err:#}");
            return 1;
        }
    };

    match cli.command() {
        Command::Status => show_status(&tracker).await,
        _ => run_tracker(tracker).await,
    }
}

async fn show_status(tracker: &Tracker) -> i32 {
    match tracker.stats().await {
        Ok(stats) => {
            print!(
                "{}",
                cli::status_report(&stats, tracker.config().is_configured())
            );
            0
        }
        Err(err) => {
            eprintln!("Failed to read event stats: {err:#}");
            1
        }
    }
}

async fn run_tracker(mut tracker: Tracker) -> i32 {
    println!("Nebula Tracker starting...");

    let preflight = tracker.preflight();
    if !preflight.configured {
        print!(
            "{}",
            cli::configuration_remediation(tracker.config().path())
        );
        print!("{}", cli::permission_instructions());
        return 1;
    }

    if let Err(err) = tracker.request_missing_permissions(Utc::now()) {
        log_warn!("Could not record permission prompt: {err:#}");
    }

    println!("{}", cli::permission_line("Accessibility", preflight.window_focus));
    println!("{}", cli::permission_line("Screen Recording", preflight.screen_capture));
    if !preflight.has_all_permissions() {
        print!("{}", cli::permission_instructions());
        return 1;
    }

    if let Err(err) = tracker.start() {
        eprintln!("Failed to start tracker: {err:#}");
        return 1;
    }

    println!("Nebula Tracker running...");
    println!("Press Ctrl+C to stop");

    shutdown_signal().await;
    println!("\nShutting down...");

    match tracker.shutdown().await {
        Ok(()) => 0,
        Err(err) => {
            log_error!("Shutdown did not complete cleanly: {err:#}");
            1
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log_error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log_error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &tempfile::TempDir, extra: &[&str]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["nebula-tracker".into()];
        args.extend(extra.iter().map(OsString::from));
        args.push("--data-dir".into());
        args.push(dir.path().as_os_str().to_owned());
        args
    }

    #[test]
    fn informational_flags_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        for flag in ["--version", "-v", "--permissions", "--help"] {
            assert_eq!(
                run_with_args(args(&dir, &[flag]), Arc::new(DetachedPlatform)),
                0,
                "{flag}"
            );
        }
    }

    #[test]
    fn status_exits_zero_and_seeds_the_root() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            run_with_args(args(&dir, &["--status"]), Arc::new(DetachedPlatform)),
            0
        );
        assert!(dir.path().join("config.json").exists());
        assert!(dir.path().join("events.sqlite3").exists());
    }

    #[test]
    fn unconfigured_run_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_with_args(args(&dir, &[]), Arc::new(DetachedPlatform)), 1);
    }

    #[test]
    fn missing_capabilities_exit_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"apiEndpoint":"http://127.0.0.1:9/events","apiToken":"token"}"#,
        )
        .unwrap();
        assert_eq!(run_with_args(args(&dir, &[]), Arc::new(DetachedPlatform)), 1);
        assert!(dir.path().join("permission_state.json").exists());
    }

    #[test]
    fn bad_flag_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        assert_ne!(
            run_with_args(args(&dir, &["--nope"]), Arc::new(DetachedPlatform)),
            0
        );
    }
}
