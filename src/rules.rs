use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::adapters::ToolAdapter;
use crate::error::{CtxError, Result};

pub const RULE_EXT: &str = "md";

/// Priority given to rule files without a numeric prefix: after every prefixed rule
pub const DEFAULT_PRIORITY: u32 = u32::MAX;

static RE_PRIORITY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-").unwrap());

static RE_UNSAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap());

/// One prioritized rule document from `.ctx/rules/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDocument {
    /// Display name: filename without priority prefix and extension
    pub name: String,
    pub path: PathBuf,
    pub content: String,
    /// Lower = higher precedence
    pub priority: u32,
    pub chars: usize,
}

impl RuleDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>, priority: u32) -> Self {
        let name = name.into();
        let content = content.into();
        Self {
            path: PathBuf::from(rule_filename(priority, &name)),
            chars: content.chars().count(),
            name,
            content,
            priority,
        }
    }

    /// `NN-name.md`, the filename adapters mirror
    pub fn filename(&self) -> String {
        rule_filename(self.priority, &self.name)
    }

    /// `name` with the given extension, prefixed like the source file
    pub fn filename_with_ext(&self, ext: &str) -> String {
        match self.priority {
            DEFAULT_PRIORITY => format!("{}.{}", self.name, ext),
            p => format!("{:02}-{}.{}", p, self.name, ext),
        }
    }

    /// Two-digit priority for listings, `--` when the file has no prefix
    pub fn priority_label(&self) -> String {
        match self.priority {
            DEFAULT_PRIORITY => "--".to_string(),
            p => format!("{:02}", p),
        }
    }
}

fn rule_filename(priority: u32, name: &str) -> String {
    match priority {
        DEFAULT_PRIORITY => format!("{}.{}", name, RULE_EXT),
        p => format!("{:02}-{}.{}", p, name, RULE_EXT),
    }
}

/// Parse `NN-name.md` into (priority, display name)
pub fn parse_rule_filename(file_name: &str) -> (u32, String) {
    let stem = file_name
        .strip_suffix(&format!(".{}", RULE_EXT))
        .unwrap_or(file_name);
    match RE_PRIORITY_PREFIX.captures(stem) {
        Some(caps) => {
            let priority = caps[1].parse().unwrap_or(DEFAULT_PRIORITY);
            (priority, stem[caps[0].len()..].to_string())
        }
        None => (DEFAULT_PRIORITY, stem.to_string()),
    }
}

/// Lowercased, with anything outside `[a-z0-9_-]` replaced by `-`
pub fn sanitize_rule_name(name: &str) -> String {
    RE_UNSAFE_NAME
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

/// Sort ascending by priority, ties broken by name
pub fn sort_rules(rules: &mut [RuleDocument]) {
    rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
}

/// Ordered rule documents stored in one directory
pub struct RuleStore {
    dir: PathBuf,
}

impl RuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All rule documents sorted by (priority, name). A missing directory yields no rules.
    pub async fn read(&self) -> Result<Vec<RuleDocument>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rules = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RULE_EXT) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            let (priority, name) = parse_rule_filename(&file_name);
            let content = tokio::fs::read_to_string(&path).await?;

            rules.push(RuleDocument {
                name,
                chars: content.chars().count(),
                path,
                content,
                priority,
            });
        }

        sort_rules(&mut rules);
        Ok(rules)
    }

    /// Write a new rule file and return its path.
    /// Without an explicit priority the rule goes after every existing one.
    pub async fn add(&self, name: &str, content: &str, priority: Option<u32>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let priority = match priority {
            Some(p) => p,
            None => self
                .read()
                .await?
                .iter()
                .map(|r| r.priority)
                .filter(|p| *p != DEFAULT_PRIORITY)
                .max()
                .map_or(1, |max| max.saturating_add(1)),
        };

        let path = self.dir.join(rule_filename(priority, &sanitize_rule_name(name)));
        if path.exists() {
            return Err(CtxError::RuleExists(path));
        }

        tokio::fs::write(&path, content).await?;
        debug!("Added rule {}", path.display());
        Ok(path)
    }

    /// Delete a rule by display name or filename
    pub async fn delete(&self, name_or_file: &str) -> Result<bool> {
        let rules = self.read().await?;
        let found = rules.iter().find(|r| {
            r.name == name_or_file
                || r.path.file_name().and_then(|n| n.to_str()) == Some(name_or_file)
        });

        match found {
            Some(rule) => {
                tokio::fs::remove_file(&rule.path).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// How the combined rule size compares with one tool's budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetReport {
    pub tool: &'static str,
    pub budget: usize,
    pub used: usize,
    pub overflow: bool,
}

impl BudgetReport {
    pub fn display(&self) -> String {
        let pct = if self.budget == 0 {
            100
        } else {
            (self.used * 100 + self.budget / 2) / self.budget
        };
        format!(
            "{} / {} ({}%){}",
            format_chars(self.used),
            format_chars(self.budget),
            pct,
            if self.overflow { " OVERFLOW" } else { "" }
        )
    }
}

pub fn validate_budget(rules: &[RuleDocument], adapters: &[&dyn ToolAdapter]) -> Vec<BudgetReport> {
    let used: usize = rules.iter().map(|r| r.chars).sum();
    adapters
        .iter()
        .map(|a| {
            let budget = a.profile().char_budget;
            BudgetReport {
                tool: a.profile().name,
                budget,
                used,
                overflow: used > budget,
            }
        })
        .collect()
}

/// Human-readable character count
pub fn format_chars(chars: usize) -> String {
    if chars < 1024 {
        format!("{} chars", chars)
    } else if chars < 1024 * 1024 {
        format!("{:.1}K chars", chars as f64 / 1024.0)
    } else {
        format!("{:.1}M chars", chars as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_filename() {
        assert_eq!(parse_rule_filename("01-project.md"), (1, "project".to_string()));
        assert_eq!(parse_rule_filename("12-code-style.md"), (12, "code-style".to_string()));
        assert_eq!(parse_rule_filename("notes.md"), (DEFAULT_PRIORITY, "notes".to_string()));
    }

    #[test]
    fn test_sanitize_rule_name() {
        assert_eq!(sanitize_rule_name("Code Style!"), "code-style-");
        assert_eq!(sanitize_rule_name("testing_rules"), "testing_rules");
    }

    #[tokio::test]
    async fn test_read_sorts_by_priority_then_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02-b.md"), "b").unwrap();
        std::fs::write(dir.path().join("02-a.md"), "a").unwrap();
        std::fs::write(dir.path().join("01-z.md"), "z").unwrap();
        std::fs::write(dir.path().join("loose.md"), "loose").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "nope").unwrap();

        let rules = RuleStore::new(dir.path()).read().await.unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "b", "loose"]);
        assert_eq!(rules[3].priority, DEFAULT_PRIORITY);
    }

    #[tokio::test]
    async fn test_unprefixed_rules_sort_after_large_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("100-late.md"), "late").unwrap();
        std::fs::write(dir.path().join("notes.md"), "notes").unwrap();
        std::fs::write(dir.path().join("05-early.md"), "early").unwrap();

        let store = RuleStore::new(dir.path());
        let rules = store.read().await.unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late", "notes"]);
        assert_eq!(rules[2].filename(), "notes.md");
        assert_eq!(rules[2].priority_label(), "--");

        let next = store.add("after", "x", None).await.unwrap();
        assert!(next.ends_with("101-after.md"));
    }

    #[tokio::test]
    async fn test_add_assigns_next_priority() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("rules"));

        let first = store.add("Project", "# Project", None).await.unwrap();
        assert!(first.ends_with("01-project.md"));

        let second = store.add("Code Style", "# Style", None).await.unwrap();
        assert!(second.ends_with("02-code-style.md"));

        let pinned = store.add("late", "x", Some(7)).await.unwrap();
        assert!(pinned.ends_with("07-late.md"));

        let next = store.add("after", "y", None).await.unwrap();
        assert!(next.ends_with("08-after.md"));
    }

    #[tokio::test]
    async fn test_add_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path());
        store.add("project", "one", Some(1)).await.unwrap();
        let err = store.add("project", "two", Some(1)).await.unwrap_err();
        assert!(matches!(err, CtxError::RuleExists(_)));
    }

    #[tokio::test]
    async fn test_delete_by_name_or_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(dir.path());
        store.add("project", "one", Some(1)).await.unwrap();
        store.add("style", "two", Some(2)).await.unwrap();

        assert!(store.delete("project").await.unwrap());
        assert!(store.delete("02-style.md").await.unwrap());
        assert!(!store.delete("missing").await.unwrap());
        assert!(store.read().await.unwrap().is_empty());
    }

    #[test]
    fn test_format_chars() {
        assert_eq!(format_chars(512), "512 chars");
        assert_eq!(format_chars(2048), "2.0K chars");
        assert_eq!(format_chars(3 * 1024 * 1024), "3.0M chars");
    }

    #[test]
    fn test_budget_report_display() {
        let report = BudgetReport {
            tool: "windsurf",
            budget: 100,
            used: 150,
            overflow: true,
        };
        assert_eq!(report.display(), "150 chars / 100 chars (150%) OVERFLOW");
    }
}
