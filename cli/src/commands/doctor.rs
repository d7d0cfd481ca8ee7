//! `wimforge doctor` — build environment diagnostics.

use std::process::ExitCode;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::app::AppContext;
use crate::application::services::doctor::collect_environment;
use crate::domain::health::{
    CheckStatus, EnvironmentReport, ToolCheck, collect_issues, collect_warnings, overall_status,
};
use crate::infra::command_runner::{DEFAULT_PROBE_TIMEOUT, TokioCommandRunner};
use crate::infra::fs::StdWorkspaceFs;
use crate::infra::mountpoint::DirWorkspaceAllocator;
use crate::output::reporter::TerminalReporter;

/// Run the doctor command.
///
/// Exits with `FAILURE` when any blocking issue is found, so scripts can
/// gate a build on `wimforge doctor`.
///
/// # Errors
///
/// Returns an error only when the leftover-workspace scan fails.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let runner = TokioCommandRunner::new(DEFAULT_PROBE_TIMEOUT);
    let probe = StdWorkspaceFs;
    let allocator = DirWorkspaceAllocator::new(app.temp_root.clone());
    let reporter = TerminalReporter::new(&app.output);

    let report = collect_environment(
        &runner,
        &probe,
        &allocator,
        &app.config,
        &app.temp_root,
        &app.cache_dir,
        &reporter,
    )
    .await?;

    if app.json {
        render_json(&report)?;
    } else {
        render_human(app, &report);
    }

    Ok(match overall_status(&report) {
        CheckStatus::Fail => ExitCode::FAILURE,
        CheckStatus::Ok | CheckStatus::Warn => ExitCode::SUCCESS,
    })
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn render_human(app: &AppContext, report: &EnvironmentReport) {
    let out = &app.output;

    out.header("Servicing tools");
    for tool in &report.tools {
        let mark = if tool.found {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        let detail = tool_detail(tool);
        println!("  {mark} {}{detail}", tool.name);
    }

    out.header("Host");
    render_check(report.elevated, "running elevated");
    render_check(report.temp_root_writable, "temp root writable");
    render_check(report.cache_dir_writable, "cache directory writable");
    render_check(
        report.disk_space_ok,
        &format!("disk space ({} GB available)", report.disk_space_gb),
    );

    out.header("Runtime package");
    render_check(
        report.hash_pinned,
        &format!("hash pinned for PowerShell {}", report.default_version),
    );
    render_check(report.download_url_https, "download URL is HTTPS");

    let issues = collect_issues(report);
    let warnings = collect_warnings(report);
    for warning in &warnings {
        out.warn(warning);
    }
    if issues.is_empty() {
        out.success("environment ready");
    } else {
        for issue in &issues {
            out.error(issue);
        }
    }
}

fn render_check(ok: bool, label: &str) {
    let mark = if ok {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    };
    println!("  {mark} {label}");
}

fn tool_detail(tool: &ToolCheck) -> String {
    match (&tool.version, &tool.path) {
        (Some(version), _) => format!(" ({version})"),
        (None, Some(path)) => format!(" ({})", path.display()),
        (None, None) => String::new(),
    }
}

#[derive(Serialize)]
struct JsonTool<'a> {
    name: &'a str,
    found: bool,
    version: Option<&'a str>,
    path: Option<String>,
}

fn render_json(report: &EnvironmentReport) -> Result<()> {
    let tools: Vec<JsonTool<'_>> = report
        .tools
        .iter()
        .map(|t| JsonTool {
            name: &t.name,
            found: t.found,
            version: t.version.as_deref(),
            path: t.path.as_ref().map(|p| p.display().to_string()),
        })
        .collect();
    let body = serde_json::json!({
        "tools": tools,
        "elevated": report.elevated,
        "temp_root_writable": report.temp_root_writable,
        "cache_dir_writable": report.cache_dir_writable,
        "disk_space_gb": report.disk_space_gb,
        "disk_space_ok": report.disk_space_ok,
        "stale_workspaces": report.stale_workspaces,
        "default_version": report.default_version,
        "hash_pinned": report.hash_pinned,
        "download_url_https": report.download_url_https,
        "issues": collect_issues(report),
        "warnings": collect_warnings(report),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
