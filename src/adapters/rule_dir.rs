use std::path::Path;

use super::{import_rule_dir, GeneratedFiles, ToolAdapter, ToolProfile, SESSION_FILE_STEM};
use crate::compiler::{compile, compress_markdown, TRUNCATION_MARKER};
use crate::rules::RuleDocument;
use crate::session::Session;

/// Header each generated file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontmatter {
    None,
    /// `.mdc` rules: description / globs / alwaysApply
    Cursor,
    /// Continue rules: name / globs / alwaysApply
    Continue,
}

impl Frontmatter {
    fn render(self, title: &str) -> String {
        match self {
            Frontmatter::None => String::new(),
            Frontmatter::Cursor => format!(
                "---\ndescription: {}\nglobs:\nalwaysApply: true\n---\n\n",
                title
            ),
            Frontmatter::Continue => format!(
                "---\nname: {}\nglobs: \"**/*\"\nalwaysApply: true\n---\n\n",
                title
            ),
        }
    }
}

/// Tools that read a directory of rule files: one file per rule plus a session file.
/// Rules past the tool's budget are cut, the first overflowing one truncated.
pub struct RuleDirAdapter {
    profile: ToolProfile,
    dir: &'static str,
    ext: &'static str,
    frontmatter: Frontmatter,
}

impl RuleDirAdapter {
    pub const fn new(
        profile: ToolProfile,
        dir: &'static str,
        ext: &'static str,
        frontmatter: Frontmatter,
    ) -> Self {
        Self {
            profile,
            dir,
            ext,
            frontmatter,
        }
    }
}

impl ToolAdapter for RuleDirAdapter {
    fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    fn generate(
        &self,
        rules: &[RuleDocument],
        session: Option<&Session>,
        project_root: &Path,
    ) -> GeneratedFiles {
        let dir = project_root.join(self.dir);
        let budget = self.profile.char_budget;
        let mut files = GeneratedFiles::new();
        let mut used = 0;

        // Session first so rules are what gets cut when the budget runs out
        if let Some(session) = session {
            let compiled = compile(Some(session), &[], budget, self.profile.compress, self.profile.name);
            let content = self.frontmatter.render("Session Resume") + &compiled.content;
            used += content.chars().count();
            files.insert(dir.join(format!("{}.{}", SESSION_FILE_STEM, self.ext)), content);
        }

        for rule in rules {
            let header = self.frontmatter.render(&rule.name);
            let body = if self.profile.compress {
                compress_markdown(&rule.content)
            } else {
                rule.content.clone()
            };

            let remaining = budget.saturating_sub(used);
            let header_chars = header.chars().count();
            let body_chars = body.chars().count();
            let path = dir.join(rule.filename_with_ext(self.ext));

            if header_chars + body_chars <= remaining {
                used += header_chars + body_chars;
                files.insert(path, header + &body);
                continue;
            }

            let room = remaining.saturating_sub(header_chars + TRUNCATION_MARKER.chars().count());
            if room > 0 {
                let kept: String = body.chars().take(room).collect();
                files.insert(path, header + &kept + TRUNCATION_MARKER);
            }
            break;
        }

        files
    }

    fn import_existing(&self, project_root: &Path) -> Option<String> {
        import_rule_dir(&project_root.join(self.dir), self.ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{get, total_chars};

    fn session() -> Session {
        Session {
            id: "live".to_string(),
            branch: Some("main".to_string()),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
            tool: None,
            task: "Ship the watcher".to_string(),
            decisions: vec![],
            next_steps: vec![],
            files_changed: vec![],
            diff_summary: None,
            recent_commits: vec![],
            head_hash: None,
        }
    }

    #[test]
    fn test_one_file_per_rule_plus_session() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![
            RuleDocument::new("project", "# Project", 1),
            RuleDocument::new("style", "# Style", 2),
        ];

        let files = get("cline")
            .unwrap()
            .generate(&rules, Some(&session()), dir.path());

        let root = dir.path().join(".clinerules");
        assert_eq!(files[&root.join("01-project.md")], "# Project");
        assert_eq!(files[&root.join("02-style.md")], "# Style");
        assert!(files[&root.join("_session-resume.md")].contains("Ship the watcher"));
    }

    #[test]
    fn test_cursor_files_carry_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![RuleDocument::new("project", "# Project", 1)];

        let files = get("cursor").unwrap().generate(&rules, None, dir.path());
        let content = &files[&dir.path().join(".cursor/rules/01-project.mdc")];
        assert!(content.starts_with("---\ndescription: project\n"));
        assert!(content.ends_with("# Project"));
    }

    #[test]
    fn test_rules_past_budget_are_cut() {
        let dir = tempfile::tempdir().unwrap();
        let rules: Vec<_> = (1..=5)
            .map(|n| RuleDocument::new(format!("rule{}", n), "word ".repeat(1_500), n))
            .collect();

        let adapter = get("antigravity").unwrap();
        let files = adapter.generate(&rules, Some(&session()), dir.path());

        assert!(total_chars(&files) <= adapter.profile().char_budget);
        assert!(files.len() < rules.len() + 1);
        let root = dir.path().join(".agent").join("rules");
        assert!(files.contains_key(&root.join("_session-resume.md")));
        assert!(files.contains_key(&root.join("01-rule1.md")));
        assert!(files.values().any(|c| c.ends_with(TRUNCATION_MARKER)));
    }

    #[test]
    fn test_import_strips_frontmatter_and_skips_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules_dir = dir.path().join(".continue").join("rules");
        std::fs::create_dir_all(&rules_dir).unwrap();
        std::fs::write(
            rules_dir.join("01-project.md"),
            "---\nname: project\n---\n\nUse tokio",
        )
        .unwrap();
        std::fs::write(rules_dir.join("_session-resume.md"), "old session").unwrap();

        let imported = get("continue").unwrap().import_existing(dir.path()).unwrap();
        assert_eq!(imported, "## 01-project\n\nUse tokio");
    }
}
