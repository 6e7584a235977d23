mod rule_dir;
mod single_file;
mod windsurf;

pub use rule_dir::{Frontmatter, RuleDirAdapter};
pub use single_file::SingleFileAdapter;
pub use windsurf::WindsurfAdapter;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{CtxError, Result};
use crate::fsutil;
use crate::rules::RuleDocument;
use crate::session::Session;

const DETECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Filename the session section is written to by directory-based adapters
pub const SESSION_FILE_STEM: &str = "_session-resume";

/// Static description of one target tool
#[derive(Debug, Clone, Copy)]
pub struct ToolProfile {
    /// Identifier used on the command line and in config
    pub name: &'static str,
    pub display_name: &'static str,
    /// Max characters the tool accepts for injected context
    pub char_budget: usize,
    pub compress: bool,
    /// Config paths relative to the project root
    pub config_paths: &'static [&'static str],
    /// Executable whose `--version` reveals an installation
    pub detect_command: Option<&'static str>,
}

/// Absolute path -> file content
pub type GeneratedFiles = BTreeMap<PathBuf, String>;

/// Per-tool translation from rules + session to that tool's config files
pub trait ToolAdapter: Send + Sync {
    fn profile(&self) -> &ToolProfile;

    /// Files to write for this tool. Pure: nothing touches the disk.
    fn generate(
        &self,
        rules: &[RuleDocument],
        session: Option<&Session>,
        project_root: &Path,
    ) -> GeneratedFiles;

    /// Existing tool configuration as rule content, `None` when there is nothing to import
    fn import_existing(&self, project_root: &Path) -> Option<String>;
}

static CLAUDE: SingleFileAdapter = SingleFileAdapter::new(
    ToolProfile {
        name: "claude",
        display_name: "Claude Code",
        char_budget: 100_000,
        compress: false,
        config_paths: &["CLAUDE.md"],
        detect_command: Some("claude"),
    },
    "CLAUDE.md",
);

static CURSOR: RuleDirAdapter = RuleDirAdapter::new(
    ToolProfile {
        name: "cursor",
        display_name: "Cursor",
        char_budget: 100_000,
        compress: false,
        config_paths: &[".cursor/rules/"],
        detect_command: Some("cursor"),
    },
    ".cursor/rules",
    "mdc",
    Frontmatter::Cursor,
);

static CODEX: SingleFileAdapter = SingleFileAdapter::new(
    ToolProfile {
        name: "codex",
        display_name: "OpenAI Codex",
        char_budget: 32_768,
        compress: false,
        config_paths: &["AGENTS.md"],
        detect_command: Some("codex"),
    },
    "AGENTS.md",
);

static COPILOT: SingleFileAdapter = SingleFileAdapter::new(
    ToolProfile {
        name: "copilot",
        display_name: "GitHub Copilot",
        char_budget: 32_000,
        compress: false,
        config_paths: &[".github/copilot-instructions.md"],
        detect_command: None,
    },
    ".github/copilot-instructions.md",
);

static WINDSURF: WindsurfAdapter = WindsurfAdapter::new(ToolProfile {
    name: "windsurf",
    display_name: "Windsurf",
    char_budget: windsurf::MAX_TOTAL,
    compress: true,
    config_paths: &[".windsurf/rules/"],
    detect_command: Some("windsurf"),
});

static CLINE: RuleDirAdapter = RuleDirAdapter::new(
    ToolProfile {
        name: "cline",
        display_name: "Cline",
        char_budget: 200_000,
        compress: false,
        config_paths: &[".clinerules/"],
        detect_command: None,
    },
    ".clinerules",
    "md",
    Frontmatter::None,
);

static AIDER: SingleFileAdapter = SingleFileAdapter::new(
    ToolProfile {
        name: "aider",
        display_name: "Aider",
        char_budget: 100_000,
        compress: false,
        config_paths: &["CONVENTIONS.md"],
        detect_command: Some("aider"),
    },
    "CONVENTIONS.md",
);

static CONTINUE: RuleDirAdapter = RuleDirAdapter::new(
    ToolProfile {
        name: "continue",
        display_name: "Continue",
        char_budget: 100_000,
        compress: false,
        config_paths: &[".continue/rules/"],
        detect_command: None,
    },
    ".continue/rules",
    "md",
    Frontmatter::Continue,
);

static AMAZONQ: RuleDirAdapter = RuleDirAdapter::new(
    ToolProfile {
        name: "amazonq",
        display_name: "Amazon Q Developer",
        char_budget: 100_000,
        compress: false,
        config_paths: &[".amazonq/rules/"],
        detect_command: Some("q"),
    },
    ".amazonq/rules",
    "md",
    Frontmatter::None,
);

static ZED: SingleFileAdapter = SingleFileAdapter::new(
    ToolProfile {
        name: "zed",
        display_name: "Zed",
        char_budget: 100_000,
        compress: false,
        config_paths: &[".rules"],
        detect_command: Some("zed"),
    },
    ".rules",
);

static ANTIGRAVITY: RuleDirAdapter = RuleDirAdapter::new(
    ToolProfile {
        name: "antigravity",
        display_name: "Antigravity",
        char_budget: 12_000,
        compress: true,
        config_paths: &[".agent/rules/"],
        detect_command: Some("antigravity"),
    },
    ".agent/rules",
    "md",
    Frontmatter::None,
);

static ADAPTERS: [&dyn ToolAdapter; 11] = [
    &CLAUDE,
    &CURSOR,
    &CODEX,
    &COPILOT,
    &WINDSURF,
    &CLINE,
    &AIDER,
    &CONTINUE,
    &AMAZONQ,
    &ZED,
    &ANTIGRAVITY,
];

const ALIASES: &[(&str, &str)] = &[
    ("claude-code", "claude"),
    ("github-copilot", "copilot"),
    ("amazon-q", "amazonq"),
    ("openai-codex", "codex"),
];

/// Every registered adapter, in display order
pub fn all() -> &'static [&'static dyn ToolAdapter] {
    &ADAPTERS
}

/// Look up an adapter by name or alias, case-insensitively
pub fn get(name: &str) -> Result<&'static dyn ToolAdapter> {
    let lower = name.trim().to_lowercase();
    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map_or(lower.as_str(), |(_, target)| *target);

    ADAPTERS
        .iter()
        .copied()
        .find(|a| a.profile().name == canonical)
        .ok_or_else(|| CtxError::UnknownTool(name.to_string()))
}

/// Best-effort installation check: runs `<cmd> --version` with a short timeout
pub async fn detect(adapter: &dyn ToolAdapter) -> bool {
    let Some(cmd) = adapter.profile().detect_command else {
        return false;
    };

    let status = Command::new(cmd)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    matches!(
        tokio::time::timeout(DETECT_TIMEOUT, status).await,
        Ok(Ok(s)) if s.success()
    )
}

/// Write every generated file, creating parent directories as needed
pub async fn write_files(files: &GeneratedFiles) -> Result<()> {
    for (path, content) in files {
        fsutil::write_atomic(path, content).await?;
    }
    Ok(())
}

pub fn total_chars(files: &GeneratedFiles) -> usize {
    files.values().map(|c| c.chars().count()).sum()
}

/// Concatenate the markdown files of a rules directory as `## <stem>` sections
pub(crate) fn import_rule_dir(dir: &Path, ext: &str) -> Option<String> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ext))
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s != SESSION_FILE_STEM)
        })
        .collect();
    files.sort();

    let parts: Vec<String> = files
        .iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(path).ok()?;
            let body = strip_frontmatter(&content).trim().to_string();
            if body.is_empty() {
                return None;
            }
            let stem = path.file_stem()?.to_string_lossy();
            Some(format!("## {}\n\n{}", stem, body))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Drop a leading `---` YAML block
pub fn strip_frontmatter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---\n") else {
        return content;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.trim_start_matches(['\r', '\n'])
        }
        None => content,
    }
}
