//! One function per CLI command. Each is a thin caller of the stores, the
//! compiler and the refresh pipeline; user-facing output goes to stdout.

mod hooks;
mod init;
mod projects;
mod rules;
mod session;
mod sync;
mod watch;

pub use hooks::{hooks_install, hooks_status, hooks_uninstall};
pub use init::{init, InitArgs};
pub use projects::{projects_list, projects_remove};
pub use rules::{rules_add, rules_delete, rules_list, rules_validate, tools_check, tools_list};
pub use session::{
    resume, save, session_delete, session_list, session_show, switch, ResumeArgs, SaveArgs,
    SwitchArgs,
};
pub use sync::{status, sync, sync_tools, SyncArgs, SyncReport};
pub use watch::{refresh, watch, watch_stop, WatchArgs};

use std::fmt::Display;

use anyhow::Result;

use crate::config::Project;
use crate::rules::format_chars;

fn open_project() -> Result<Project> {
    Ok(Project::from_cwd()?)
}

fn success(msg: impl Display) {
    println!("✓ {}", msg);
}

fn notice(msg: impl Display) {
    println!("! {}", msg);
}

fn header(title: impl Display) {
    println!("\n{}", title);
}

/// Two aligned columns, indented
fn table(rows: &[(&str, String)]) {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        println!("  {:<width$}  {}", key, value, width = width);
    }
}

fn list(items: &[String]) {
    for item in items {
        println!("  - {}", item);
    }
}

fn file_summary(path: &std::path::Path, content: &str) -> String {
    format!("{} ({})", path.display(), format_chars(content.chars().count()))
}
