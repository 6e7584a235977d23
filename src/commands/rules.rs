use std::path::Path;

use anyhow::{Context, Result};

use super::{header, open_project, success};
use crate::adapters;
use crate::error::CtxError;
use crate::rules::{format_chars, validate_budget, RuleStore};

pub async fn rules_list() -> Result<()> {
    let project = open_project()?;
    let rules = RuleStore::new(project.rules_dir()).read().await?;
    if rules.is_empty() {
        println!("No rules defined. Run `ctx rules add` to create one.");
        return Ok(());
    }

    header("Rules");
    for rule in &rules {
        println!("  {} {} ({})", rule.priority_label(), rule.name, format_chars(rule.chars));
    }
    Ok(())
}

/// Create a rule from a file, or a placeholder to edit by hand
pub async fn rules_add(name: Option<String>, file: Option<&Path>, priority: Option<u32>) -> Result<()> {
    let project = open_project()?;

    let (name, content) = match file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let name = name.or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            });
            (name, content)
        }
        None => {
            let content = name
                .as_deref()
                .map(|n| format!("# {}\n\n<!-- Edit this file with your rules -->\n", n))
                .unwrap_or_default();
            (name, content)
        }
    };
    let Some(name) = name else {
        anyhow::bail!("Rule name is required. Use: ctx rules add <name> [--file <path>]");
    };

    let path = RuleStore::new(project.rules_dir())
        .add(&name, &content, priority)
        .await?;
    success(format!("Created rule: {}", path.display()));
    if file.is_none() {
        println!("  Edit the file to add your rules.");
    }
    Ok(())
}

pub async fn rules_delete(name: &str) -> Result<()> {
    let project = open_project()?;
    if !RuleStore::new(project.rules_dir()).delete(name).await? {
        return Err(CtxError::RuleNotFound(name.to_string()).into());
    }
    success(format!("Deleted rule: {}", name));
    Ok(())
}

/// Compare the combined rule size with each tool's budget
pub async fn rules_validate() -> Result<()> {
    let project = open_project()?;
    let rules = RuleStore::new(project.rules_dir()).read().await?;
    if rules.is_empty() {
        println!("No rules to validate.");
        return Ok(());
    }

    header("Budget Validation");
    for report in validate_budget(&rules, adapters::all()) {
        let mark = if report.overflow { "✗" } else { "✓" };
        println!("{} {:<14} {}", mark, report.tool, report.display());
    }
    Ok(())
}

pub async fn tools_list() -> Result<()> {
    let enabled = match open_project() {
        Ok(project) => Some(project.config().await.enabled_tools),
        Err(_) => None,
    };

    header("Supported Tools");
    for adapter in adapters::all() {
        let profile = adapter.profile();
        let status = match &enabled {
            Some(tools) if tools.iter().any(|t| t == profile.name) => "enabled",
            Some(_) => "disabled",
            None => "",
        };
        println!(
            "  {:<14} {:<22} {:<14} {:<9} {}",
            profile.name,
            profile.display_name,
            format_chars(profile.char_budget),
            status,
            profile.config_paths.join(", ")
        );
    }
    println!(
        "\n  {} tools supported. Edit .ctx/config.json to enable or disable them.",
        adapters::all().len()
    );
    Ok(())
}

/// Probe every tool's executable concurrently
pub async fn tools_check() -> Result<()> {
    let checks = adapters::all().iter().map(|adapter| async move {
        (*adapter, adapters::detect(*adapter).await)
    });
    let results = spawn_all(checks).await;

    header("Tool Detection");
    for (adapter, found) in results {
        let profile = adapter.profile();
        let state = if found { "detected" } else { "not found" };
        println!("  {:<14} {} ({})", profile.name, profile.display_name, state);
    }
    Ok(())
}

/// Run each future as its own task; results keep input order
async fn spawn_all<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(value) = handle.await {
            out.push(value);
        }
    }
    out
}
