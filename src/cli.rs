use std::path::{Path, PathBuf};

use clap::Parser;

use crate::db::EventStats;

pub const VERSION_LINE: &str = "Nebula Tracker v1.0.0";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Parser)]
#[command(
    name = "nebula-tracker",
    about = "Nebula Tracker - Background Activity Monitor",
    disable_version_flag = true
)]
pub struct Cli {
    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Show current status and stats
    #[arg(long)]
    pub status: bool,

    /// Show permission setup instructions
    #[arg(long)]
    pub permissions: bool,

    /// Keep config, database and screenshots under PATH
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Version,
    Status,
    Permissions,
    Run,
}

impl Cli {
    /// When several flags are given, the first in this order wins.
    pub fn command(&self) -> Command {
        if self.version {
            Command::Version
        } else if self.status {
            Command::Status
        } else if self.permissions {
            Command::Permissions
        } else {
            Command::Run
        }
    }
}

pub fn status_report(stats: &EventStats, configured: bool) -> String {
    let configuration = if configured { "✓ Valid" } else { "❌ Invalid" };
    format!(
        "Nebula Tracker Status\n\
         ━━━━━━━━━━━━━━━━━━━━━━━\n\
         Total Events: {}\n\
         Synced: {}\n\
         Pending: {}\n\
         Configuration: {configuration}\n",
        stats.total, stats.synced, stats.pending
    )
}

pub fn permission_instructions() -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(RULE);
    out.push_str("\n📋 PERMISSION SETUP REQUIRED\n");
    out.push_str(RULE);
    out.push_str("\n\nNebula Tracker needs the following permissions:\n");
    out.push_str("\n1. ACCESSIBILITY (read the focused window)\n");
    out.push_str("   → System Settings > Privacy & Security > Accessibility\n");
    out.push_str("   → Add NebulaTracker to the list\n");
    out.push_str("\n2. SCREEN RECORDING (capture the screen)\n");
    out.push_str("   → System Settings > Privacy & Security > Screen Recording\n");
    out.push_str("   → Add NebulaTracker to the list\n");
    out.push_str("\nAfter granting permissions, restart Nebula Tracker.\n");
    out.push_str(RULE);
    out.push('\n');
    out
}

pub fn configuration_remediation(config_path: &Path) -> String {
    format!(
        "⚠️  Configuration not complete!\n\
         Please edit the config file at:\n\
         {}\n\
         Add your API endpoint and token, then restart the tracker.\n",
        config_path.display()
    )
}

pub fn permission_line(name: &str, granted: bool) -> String {
    if granted {
        format!("✓ {name} permission granted")
    } else {
        format!("❌ {name} permission not granted")
    }
}
