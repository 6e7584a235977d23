//! Packs rule documents and a session into a budget-bounded context document,
//! plus a paste-ready resume prompt.

mod compress;

pub use compress::compress_markdown;

use std::fmt::Write;

use crate::rules::{sort_rules, RuleDocument};
use crate::session::Session;

pub const TRUNCATION_MARKER: &str = "\n\n[... truncated to fit tool limits ...]\n";

pub const RESUME_DIRECTIVE: &str = "Continue the following task from a previous AI coding session.";

/// Result of one compile call; never persisted by the compiler itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    pub content: String,
    /// Empty iff no session was given
    pub resume_prompt: String,
    /// Rules that contributed any content, full or cut
    pub rules_included: usize,
    /// Rules whose content was cut short
    pub rules_truncated: usize,
    /// Length of `content` in chars
    pub total_chars: usize,
    /// Header and session alone exceed the budget; output is still complete
    pub over_budget: bool,
}

/// Build the context document for one tool.
///
/// Rules are emitted in (priority, name) order until the budget runs out; the
/// rule crossing the boundary is cut with a visible marker and everything after
/// it is dropped. The session section is never cut, so with a session present
/// the budget only bounds rule content. Without a session the output never
/// exceeds `budget`.
pub fn compile(
    session: Option<&Session>,
    rules: &[RuleDocument],
    budget: usize,
    compress: bool,
    tool_name: &str,
) -> CompiledOutput {
    let mut sorted = rules.to_vec();
    sort_rules(&mut sorted);

    let header = render_header(tool_name);
    let session_section = session.map(render_session);

    let header_chars = header.chars().count();
    let reserved = header_chars + session_section.as_ref().map_or(0, |s| s.chars().count());

    let mut content = String::new();
    let mut remaining = if session_section.is_some() || header_chars <= budget {
        content.push_str(&header);
        budget.saturating_sub(reserved)
    } else {
        0
    };

    let mut rules_included = 0;
    let mut rules_truncated = 0;

    for rule in &sorted {
        let body = if compress {
            compress_markdown(&rule.content)
        } else {
            rule.content.trim_end().to_string()
        };
        if body.trim().is_empty() {
            continue;
        }

        let section = format!("{}\n\n", body);
        let section_chars = section.chars().count();

        if section_chars <= remaining {
            content.push_str(&section);
            remaining -= section_chars;
            rules_included += 1;
            continue;
        }

        let marker_chars = TRUNCATION_MARKER.chars().count();
        if remaining > marker_chars {
            let kept: String = section.chars().take(remaining - marker_chars).collect();
            content.push_str(&kept);
            content.push_str(TRUNCATION_MARKER);
            rules_included += 1;
            rules_truncated += 1;
        }
        break;
    }

    if let Some(section) = &session_section {
        content.push_str(section);
    }

    let resume_prompt = session.map(render_resume_prompt).unwrap_or_default();

    CompiledOutput {
        total_chars: content.chars().count(),
        content,
        resume_prompt,
        rules_included,
        rules_truncated,
        over_budget: session_section.is_some() && reserved > budget,
    }
}

fn render_header(tool_name: &str) -> String {
    format!("# Project Context\n\n<!-- Generated by ctx for {} -->\n\n", tool_name)
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "### {}\n", heading);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
    out.push('\n');
}

/// Session section of the context document
pub fn render_session(session: &Session) -> String {
    let mut out = String::from("## Current Session\n\n");
    let _ = writeln!(out, "**Task**: {}", session.task);
    let _ = writeln!(out, "**Branch**: {}", session.branch_or_default());
    if let Some(hash) = &session.head_hash {
        let _ = writeln!(out, "**HEAD**: {}", hash);
    }
    if let Some(diff) = &session.diff_summary {
        let _ = writeln!(out, "**Diff**: {}", diff);
    }
    out.push('\n');

    push_list(&mut out, "Decisions", &session.decisions);
    push_list(&mut out, "Next Steps", &session.next_steps);
    push_list(&mut out, "Files Changed", &session.files_changed);
    push_list(&mut out, "Recent Commits", &session.recent_commits);

    out
}

/// Self-contained continuation instruction; never budget-constrained
pub fn render_resume_prompt(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\n", RESUME_DIRECTIVE);
    let _ = writeln!(out, "## Task\n\n{}\n", session.task);
    let _ = writeln!(out, "Branch: {}", session.branch_or_default());
    if let Some(hash) = &session.head_hash {
        let _ = writeln!(out, "Last commit: {}", hash);
    }
    out.push('\n');

    if !session.decisions.is_empty() {
        out.push_str("## Decisions already made\n\n");
        for d in &session.decisions {
            let _ = writeln!(out, "- {}", d);
        }
        out.push('\n');
    }

    if !session.next_steps.is_empty() {
        out.push_str("## Next steps\n\n");
        for (i, step) in session.next_steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, step);
        }
        out.push('\n');
    }

    if !session.files_changed.is_empty() {
        let _ = writeln!(out, "Files changed: {}", session.files_changed.join(", "));
    }
    if let Some(diff) = &session.diff_summary {
        let _ = writeln!(out, "Uncommitted changes: {}", diff);
    }
    if !session.files_changed.is_empty() || session.diff_summary.is_some() {
        out.push('\n');
    }

    out.push_str(
        "Pick up exactly where the previous session left off. \
         Do not redo completed work; start with the first next step.\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_session() -> Session {
        Session {
            id: "sess_2026-02-19T10-30-00_001".to_string(),
            branch: Some("feature/auth".to_string()),
            timestamp: "2026-02-19T10:30:00.000Z".to_string(),
            tool: Some("claude-code".to_string()),
            task: "Implementing JWT auth middleware".to_string(),
            decisions: vec!["RS256 over HS256 for key rotation".to_string()],
            next_steps: vec![
                "Add token refresh endpoint".to_string(),
                "Write integration tests".to_string(),
            ],
            files_changed: vec![
                "src/middleware/auth.ts".to_string(),
                "src/routes/login.ts".to_string(),
            ],
            diff_summary: Some("4 files changed, 127 insertions(+)".to_string()),
            recent_commits: vec!["abc1234 Add auth endpoint".to_string()],
            head_hash: Some("abc1234".to_string()),
        }
    }

    fn mock_rules() -> Vec<RuleDocument> {
        vec![
            RuleDocument::new(
                "project",
                "# Project\n\nThis is a Node.js API with Express and TypeScript.",
                1,
            ),
            RuleDocument::new(
                "code-style",
                "# Code Style\n\n- Use ESM imports\n- Strict TypeScript\n- Prefer async/await",
                2,
            ),
        ]
    }

    #[test]
    fn test_compiles_session_and_rules() {
        let session = mock_session();
        let out = compile(Some(&session), &mock_rules(), 100_000, false, "claude");

        assert!(out.content.contains("JWT auth middleware"));
        assert!(out.content.contains("RS256 over HS256"));
        assert!(out.content.contains("Node.js API"));
        assert!(out.content.contains("Code Style"));
        assert_eq!(out.rules_included, 2);
        assert_eq!(out.rules_truncated, 0);
        assert!(!out.over_budget);
        assert_eq!(out.total_chars, out.content.chars().count());
    }

    #[test]
    fn test_rules_sorted_before_session() {
        let session = mock_session();
        let mut rules = mock_rules();
        rules.reverse();
        let out = compile(Some(&session), &rules, 100_000, false, "claude");

        let project = out.content.find("Node.js API").unwrap();
        let style = out.content.find("Code Style").unwrap();
        let current = out.content.find("## Current Session").unwrap();
        assert!(project < style && style < current);
    }

    #[test]
    fn test_truncates_rules_to_budget_without_session() {
        let mut rules = vec![mock_rules()[0].clone()];
        rules.push(RuleDocument::new("large", "x".repeat(500), 3));

        let out = compile(None, &rules, 200, false, "windsurf");
        assert!(out.total_chars <= 200);
        assert_eq!(out.rules_included, 2);
        assert_eq!(out.rules_truncated, 1);
        assert!(out.content.contains("truncated to fit tool limits"));
    }

    #[test]
    fn test_rules_after_truncation_point_are_omitted() {
        let rules = vec![
            RuleDocument::new("big", "y".repeat(400), 1),
            RuleDocument::new("small", "tiny rule", 2),
        ];
        let out = compile(None, &rules, 300, false, "windsurf");
        assert_eq!(out.rules_included, 1);
        assert!(!out.content.contains("tiny rule"));
    }

    #[test]
    fn test_session_never_truncated() {
        let session = mock_session();
        let out = compile(Some(&session), &mock_rules(), 300, false, "windsurf");

        assert!(out.content.contains("Implementing JWT auth middleware"));
        assert!(out.content.contains("RS256 over HS256 for key rotation"));
        assert!(out.content.contains("Write integration tests"));
    }

    #[test]
    fn test_session_kept_with_zero_budget() {
        let session = mock_session();
        let out = compile(Some(&session), &mock_rules(), 0, false, "windsurf");
        assert!(out.over_budget);
        assert_eq!(out.rules_included, 0);
        assert!(out.content.contains(&render_session(&session)));
    }

    #[test]
    fn test_tiny_budget_without_session_stays_within_budget() {
        for budget in [0, 5, 20, 50] {
            let out = compile(None, &mock_rules(), budget, false, "claude");
            assert!(out.total_chars <= budget, "budget {}", budget);
        }
    }

    #[test]
    fn test_rules_included_monotonic_in_budget() {
        let mut rules = mock_rules();
        rules.push(RuleDocument::new("big", "z".repeat(300), 3));
        let session = mock_session();

        for sess in [None, Some(&session)] {
            let mut last = 0;
            for budget in (0..1500).step_by(7) {
                let out = compile(sess, &rules, budget, false, "claude");
                assert!(out.rules_included >= last, "budget {}", budget);
                last = out.rules_included;
            }
        }
    }

    #[test]
    fn test_compress_keeps_rules() {
        let out = compile(None, &mock_rules(), 100_000, true, "windsurf");
        assert_eq!(out.rules_included, 2);
        assert!(out.content.contains("*Code Style*"));
    }

    #[test]
    fn test_resume_prompt() {
        let session = mock_session();
        let out = compile(Some(&session), &[], 100_000, false, "claude");

        assert!(out.resume_prompt.starts_with(RESUME_DIRECTIVE));
        assert!(out.resume_prompt.contains("Implementing JWT auth middleware"));
        assert!(out.resume_prompt.contains("RS256 over HS256 for key rotation"));
        assert!(out.resume_prompt.contains("Add token refresh endpoint"));
        assert!(out.resume_prompt.contains("Write integration tests"));
        assert!(out.resume_prompt.contains("feature/auth"));
        assert_eq!(out.rules_included, 0);
    }

    #[test]
    fn test_null_session_has_empty_resume_prompt() {
        let out = compile(None, &mock_rules(), 100_000, false, "claude");
        assert_eq!(out.resume_prompt, "");
        assert!(out.content.contains("Project"));
        assert_eq!(out.rules_included, 2);
    }

    #[test]
    fn test_deterministic() {
        let session = mock_session();
        let a = compile(Some(&session), &mock_rules(), 250, true, "cursor");
        let b = compile(Some(&session), &mock_rules(), 250, true, "cursor");
        assert_eq!(a, b);
    }
}
