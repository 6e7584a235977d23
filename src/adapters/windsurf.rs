use std::path::Path;

use super::{import_rule_dir, GeneratedFiles, ToolAdapter, ToolProfile, SESSION_FILE_STEM};
use crate::compiler::compile;
use crate::rules::RuleDocument;
use crate::session::Session;

pub const MAX_PER_FILE: usize = 6_000;
pub const MAX_TOTAL: usize = 12_000;

const RULES_DIR: &str = ".windsurf/rules";

/// Windsurf caps each rule file and the directory total, so everything is
/// compressed and the session is written first.
pub struct WindsurfAdapter {
    profile: ToolProfile,
}

impl WindsurfAdapter {
    pub const fn new(profile: ToolProfile) -> Self {
        Self { profile }
    }
}

impl ToolAdapter for WindsurfAdapter {
    fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    fn generate(
        &self,
        rules: &[RuleDocument],
        session: Option<&Session>,
        project_root: &Path,
    ) -> GeneratedFiles {
        let dir = project_root.join(RULES_DIR);
        let mut files = GeneratedFiles::new();
        let mut used = 0;

        if let Some(session) = session {
            let compiled = compile(Some(session), &[], MAX_PER_FILE, true, self.profile.name);
            used += compiled.total_chars;
            files.insert(dir.join(format!("{}.md", SESSION_FILE_STEM)), compiled.content);
        }

        for rule in rules {
            if used >= MAX_TOTAL {
                break;
            }
            let file_budget = MAX_PER_FILE.min(MAX_TOTAL - used);
            let compiled = compile(
                None,
                std::slice::from_ref(rule),
                file_budget,
                true,
                self.profile.name,
            );
            if compiled.rules_included == 0 {
                break;
            }
            used += compiled.total_chars;
            files.insert(dir.join(rule.filename()), compiled.content);
        }

        files
    }

    fn import_existing(&self, project_root: &Path) -> Option<String> {
        import_rule_dir(&project_root.join(RULES_DIR), "md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{get, total_chars};

    #[test]
    fn test_respects_total_budget() {
        let dir = tempfile::tempdir().unwrap();
        let rules: Vec<_> = (1..=5)
            .map(|n| RuleDocument::new(format!("rule{}", n), "w ".repeat(2_500), n))
            .collect();

        let files = get("windsurf").unwrap().generate(&rules, None, dir.path());
        assert!(total_chars(&files) <= MAX_TOTAL);
        assert!(files.values().all(|c| c.chars().count() <= MAX_PER_FILE));
        assert!(files.len() < rules.len());
    }

    #[test]
    fn test_rule_files_keep_priority_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let rules = vec![RuleDocument::new("project", "# Project\n\nShort", 3)];

        let files = get("windsurf").unwrap().generate(&rules, None, dir.path());
        let content = &files[&dir.path().join(RULES_DIR).join("03-project.md")];
        assert!(content.contains("*Project*"));
    }
}
