//! Re-probe git, overwrite the live session, and regenerate every resume prompt.

use std::fmt::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::adapters::{self, ToolAdapter};
use crate::compiler::compile;
use crate::config::{Project, CTX_DIR, RESUME_DIR};
use crate::error::Result;
use crate::fsutil;
use crate::git::VcsProbe;
use crate::rules::{RuleDocument, RuleStore};
use crate::session::{now_timestamp, LiveSessionStore, LiveUpdate, Session};

pub const RESUME_INDEX: &str = "README.md";

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub session: Session,
    /// Tools whose resume prompt was written
    pub resume_count: usize,
    /// Tools skipped because they failed, with the reason
    pub failures: Vec<(String, String)>,
}

pub struct RefreshPipeline<P> {
    project: Project,
    probe: P,
}

impl<P: VcsProbe> RefreshPipeline<P> {
    pub fn new(project: Project, probe: P) -> Self {
        Self { project, probe }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Update the live session, then pre-generate resume prompts for all enabled tools
    pub async fn refresh(&self, update: LiveUpdate) -> Result<RefreshOutcome> {
        let defaults = self.project.config().await.session_defaults;
        let ctx = defaults.apply(self.probe.probe(&self.project.root).await);
        let live = LiveSessionStore::new(&self.project.sessions_dir());
        let session = live.update(ctx, update).await?;

        let (resume_count, failures) = self.pre_generate_resumes(&session).await?;
        debug!(
            "Refreshed live session: {} files changed, {} resume prompts",
            session.files_changed.len(),
            resume_count
        );

        Ok(RefreshOutcome {
            session,
            resume_count,
            failures,
        })
    }

    /// Write `resume-prompts/<tool>.md` per enabled tool plus the index.
    /// A failing tool is logged and skipped; the others still get written.
    pub async fn pre_generate_resumes(
        &self,
        live: &Session,
    ) -> Result<(usize, Vec<(String, String)>)> {
        let config = self.project.config().await;
        let rules = RuleStore::new(self.project.rules_dir()).read().await?;
        let resume_dir = self.project.resume_dir();
        tokio::fs::create_dir_all(&resume_dir).await?;

        let generated_at = now_timestamp();
        let mut count = 0;
        let mut failures = Vec::new();

        for tool in &config.enabled_tools {
            let result = match adapters::get(tool) {
                Ok(adapter) => write_resume(adapter, live, &rules, &resume_dir, &generated_at).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => {
                    debug!("Wrote {}", path.display());
                    count += 1;
                }
                Err(e) => {
                    warn!("Skipping resume prompt for {}: {}", tool, e);
                    failures.push((tool.clone(), e.to_string()));
                }
            }
        }

        let index = render_index(live, &config.enabled_tools, &generated_at);
        fsutil::write_atomic(&resume_dir.join(RESUME_INDEX), &index).await?;

        Ok((count, failures))
    }
}

async fn write_resume(
    adapter: &dyn ToolAdapter,
    live: &Session,
    rules: &[RuleDocument],
    resume_dir: &std::path::Path,
    generated_at: &str,
) -> Result<PathBuf> {
    let profile = adapter.profile();
    let compiled = compile(
        Some(live),
        rules,
        profile.char_budget,
        profile.compress,
        profile.name,
    );

    let content = format!(
        "<!-- READY-TO-PASTE resume prompt for {} -->\n<!-- Generated: {} | Branch: {} -->\n\n{}",
        profile.display_name,
        generated_at,
        live.branch_or_default(),
        compiled.resume_prompt
    );

    let path = resume_dir.join(format!("{}.md", profile.name));
    fsutil::write_atomic(&path, &content).await?;
    Ok(path)
}

fn render_index(live: &Session, tools: &[String], generated_at: &str) -> String {
    let mut out = String::from("# Resume Prompts (auto-generated)\n\n");
    let _ = writeln!(out, "**Last updated**: {}", generated_at);
    let _ = writeln!(out, "**Branch**: {}", live.branch_or_default());
    let _ = writeln!(out, "**Task**: {}\n", live.task);
    out.push_str("## Quick Switch\n\nOpen the file for your target tool and paste its contents:\n\n");
    for tool in tools {
        let _ = writeln!(out, "- **{}**: `{}/{}/{}.md`", tool, CTX_DIR, RESUME_DIR, tool);
    }
    out.push_str(
        "\n> These files are refreshed on every commit, checkout and merge, and periodically by `ctx watch`.\n",
    );
    out
}
