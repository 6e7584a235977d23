use std::path::Path;

use super::{GeneratedFiles, ToolAdapter, ToolProfile};
use crate::compiler::compile;
use crate::rules::RuleDocument;
use crate::session::Session;

/// Tools that read one markdown file at a fixed path (CLAUDE.md, AGENTS.md, ...)
pub struct SingleFileAdapter {
    profile: ToolProfile,
    path: &'static str,
}

impl SingleFileAdapter {
    pub const fn new(profile: ToolProfile, path: &'static str) -> Self {
        Self { profile, path }
    }
}

impl ToolAdapter for SingleFileAdapter {
    fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    fn generate(
        &self,
        rules: &[RuleDocument],
        session: Option<&Session>,
        project_root: &Path,
    ) -> GeneratedFiles {
        let compiled = compile(
            session,
            rules,
            self.profile.char_budget,
            self.profile.compress,
            self.profile.name,
        );

        let mut files = GeneratedFiles::new();
        files.insert(project_root.join(self.path), compiled.content);
        files
    }

    fn import_existing(&self, project_root: &Path) -> Option<String> {
        let content = std::fs::read_to_string(project_root.join(self.path)).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
