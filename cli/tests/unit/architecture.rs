//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layering rules hold:
//! domain stays pure, application talks only to ports, infra never prints,
//! and commands wire everything through `AppContext`.

use std::path::Path;

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Read a file and strip comment lines to avoid false positives.
fn read_non_comment_lines(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| {
            let trimmed = l.trim();
            !trimmed.starts_with("//") && !trimmed.starts_with("/*") && !trimmed.starts_with('*')
        })
        .map(String::from)
        .collect()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

// ── Domain purity ─────────────────────────────────────────────────────────────

/// domain/ must not import from any outer layer or do I/O.
#[test]
fn domain_imports_no_outer_layers() {
    let domain_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("domain");

    let forbidden = [
        "crate::application",
        "crate::infra",
        "crate::commands",
        "crate::output",
        "crate::app::",
        "std::fs::",
        "std::process::Command",
        "tokio::",
    ];

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&domain_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            for pattern in &forbidden {
                if line.contains(pattern) {
                    violations.push(format!(
                        "{rel}:{}: forbidden `{pattern}` in domain/: {line}",
                        i + 1
                    ));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "domain/ must stay pure (no outer-layer imports, no I/O, no async):\n{}",
        violations.join("\n")
    );
}

// ── Application layer boundary ────────────────────────────────────────────────

/// application/ must not import from infra/ or output/ layers.
#[test]
fn application_has_no_infra_or_output_imports() {
    let app_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("application");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&app_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let lines = read_non_comment_lines(&file);
        for (i, line) in lines.iter().enumerate() {
            if line.contains("crate::infra::") || line.contains("crate::output::") {
                violations.push(format!("{rel}:{}: forbidden import: {line}", i + 1));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "application/ must not import from infra/ or output/:\n{}",
        violations.join("\n")
    );
}

/// Track whether a line is inside an async fn and outside `spawn_blocking`.
struct AsyncContextTracker {
    in_async_fn: bool,
    in_spawn_blocking: bool,
    brace_depth: i32,
    async_fn_start_depth: i32,
    spawn_blocking_start_depth: i32,
}

impl AsyncContextTracker {
    fn new() -> Self {
        Self {
            in_async_fn: false,
            in_spawn_blocking: false,
            brace_depth: 0,
            async_fn_start_depth: 0,
            spawn_blocking_start_depth: 0,
        }
    }

    /// Process a line. Returns `true` if the line is in an async fn but NOT in `spawn_blocking`.
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if (trimmed.contains("async fn ") || trimmed.contains("async fn\t"))
            && !trimmed.starts_with("//")
        {
            self.in_async_fn = true;
            self.async_fn_start_depth = self.brace_depth;
        } else if trimmed.contains("fn ")
            && !trimmed.contains("async ")
            && !trimmed.starts_with("//")
        {
            self.in_async_fn = false;
            self.in_spawn_blocking = false;
        }
        if self.in_async_fn && line.contains("spawn_blocking") {
            self.in_spawn_blocking = true;
            self.spawn_blocking_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_spawn_blocking && self.brace_depth <= self.spawn_blocking_start_depth
                    {
                        self.in_spawn_blocking = false;
                    }
                    if self.in_async_fn && self.brace_depth <= self.async_fn_start_depth {
                        self.in_async_fn = false;
                    }
                }
                _ => {}
            }
        }
        self.in_async_fn && !self.in_spawn_blocking
    }
}

/// application/ must not use `std::fs` or `std::process::Command` directly
/// in async functions outside `spawn_blocking`.
///
/// Exceptions:
/// - `std::fs` inside `spawn_blocking` closures is allowed (correct async pattern)
/// - `std::fs` inside #[cfg(unix)] blocks is allowed (file permissions)
/// - `std::fs` inside #[cfg(test)] blocks is allowed (test helpers)
/// - `std::fs` in synchronous functions is allowed (worker-thread job code)
#[test]
fn application_has_no_blocking_io_in_async() {
    let app_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("application");

    let mut violations = Vec::new();
    for file in collect_rs_files(&app_dir) {
        if let Some(v) = check_file_for_blocking_io(&file) {
            violations.extend(v);
        }
    }

    assert!(
        violations.is_empty(),
        "Found blocking I/O calls in async functions in application/ layer:\n{}",
        violations.join("\n")
    );
}

fn check_file_for_blocking_io(file: &Path) -> Option<Vec<String>> {
    let rel = file
        .strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string();
    let rel_normalized = rel.replace('\\', "/");

    let content = std::fs::read_to_string(file).ok()?;

    let deny_list = [
        ("std::fs::", "use spawn_blocking for fs operations"),
        (
            "std::process::Command",
            "use crate::application::ports::CommandRunner",
        ),
    ];

    let mut violations = Vec::new();
    let mut tracker = AsyncContextTracker::new();
    let mut in_cfg_unix = false;
    let mut in_cfg_test = false;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with("#[cfg(unix)]") {
            in_cfg_unix = true;
            continue;
        }
        if trimmed.starts_with("#[cfg(test)]") || trimmed.starts_with("#[tokio::test]") {
            in_cfg_test = true;
            continue;
        }

        let in_unguarded_async = tracker.process_line(line);

        if trimmed.starts_with('}') {
            in_cfg_unix = false;
        }

        if !in_unguarded_async || in_cfg_unix || in_cfg_test {
            continue;
        }

        for (pattern, recommendation) in &deny_list {
            if trimmed.contains(pattern) {
                violations.push(format!(
                    "  {}:{}: found `{}` in async context ({})",
                    rel_normalized,
                    i + 1,
                    pattern,
                    recommendation
                ));
            }
        }
    }

    if violations.is_empty() {
        None
    } else {
        Some(violations)
    }
}

// ── Infra layer boundary ──────────────────────────────────────────────────────

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let infra_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("infra");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&infra_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let lines = read_non_comment_lines(&file);
        for (i, line) in lines.iter().enumerate() {
            if line.contains("crate::commands") || line.contains("crate::output") {
                violations.push(format!(
                    "{rel}:{}: forbidden import in infra/: {line}",
                    i + 1
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let infra_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("infra");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&infra_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };

        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") {
                continue;
            }
            if line.contains("println!") || line.contains("eprintln!") {
                violations.push(format!(
                    "{rel}:{}: print macro in infra/ outside #[cfg(test)]: {line}",
                    i + 1
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)] — report through ProgressReporter:\n{}",
        violations.join("\n")
    );
}

/// infra/ async functions must route blocking filesystem work through
/// `spawn_blocking` (or `tokio::fs`), never call `std::fs` directly.
#[test]
fn infra_async_functions_do_not_use_blocking_fs() {
    let infra_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("infra");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&infra_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };

        let mut cfg_tracker = CfgTestTracker::new();
        let mut async_tracker = AsyncContextTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = cfg_tracker.process_line(line);
            let in_unguarded_async = async_tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || !in_unguarded_async || trimmed.starts_with("//") {
                continue;
            }
            if line.contains("std::fs::") {
                violations.push(format!(
                    "{rel}:{}: std::fs in async fn outside spawn_blocking: {line}",
                    i + 1
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "infra/ async functions must not use blocking std::fs outside spawn_blocking:\n{}",
        violations.join("\n")
    );
}

// ── Command layer conventions ─────────────────────────────────────────────────

/// Command files that use `AppContext` fields must receive `&AppContext`
/// rather than individual loose parameters.
///
/// Exception: thin handlers that need nothing from the context (e.g.
/// `version.rs`) may take their few inputs directly.
#[test]
fn command_handlers_accept_app_context() {
    let commands_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("commands");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&commands_dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };

        let uses_app_fields = content.contains("app.output")
            || content.contains("app.config")
            || content.contains("app.confirm")
            || content.contains("app.cache_dir")
            || content.contains("app.temp_root")
            || content.contains("app.json");

        if !uses_app_fields {
            continue;
        }

        let has_app_context = content.contains("app: &AppContext")
            || content.contains("app: &crate::app::AppContext");

        if !has_app_context {
            let rel = file
                .strip_prefix(env!("CARGO_MANIFEST_DIR"))
                .unwrap_or(&file)
                .display()
                .to_string();
            violations.push(format!(
                "{rel}: uses AppContext fields but does not accept &AppContext"
            ));
        }
    }

    assert!(
        violations.is_empty(),
        "Command handlers that use AppContext fields must accept &AppContext:\n{}",
        violations.join("\n")
    );
}

/// All confirmation prompts in `commands/` must go through `app.confirm()`.
#[test]
fn commands_use_standardized_confirmation() {
    let commands_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("commands");

    let mut violations: Vec<String> = Vec::new();

    for file in collect_rs_files(&commands_dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();

        let lines = read_non_comment_lines(&file);
        for (i, line) in lines.iter().enumerate() {
            if line.contains("std::io::stdin().lock()") || line.contains("io::stdin().lock()") {
                violations.push(format!(
                    "{rel}:{}: direct stdin lock — use app.confirm() instead: {line}",
                    i + 1
                ));
            }
            if line.contains("dialoguer::Confirm::new()") || line.contains("Confirm::new()") {
                violations.push(format!(
                    "{rel}:{}: direct dialoguer::Confirm — use app.confirm() instead: {line}",
                    i + 1
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Commands must use app.confirm() for user prompts:\n{}",
        violations.join("\n")
    );
}

// ── Dead-code hygiene ─────────────────────────────────────────────────────────

/// No module-level #![`allow(dead_code)`] in domain/, application/, or infra/.
#[test]
fn no_module_level_dead_code_allows_in_layers() {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let layer_dirs = [
        src_dir.join("domain"),
        src_dir.join("application"),
        src_dir.join("infra"),
    ];

    let mut violations: Vec<String> = Vec::new();

    for dir in &layer_dirs {
        for file in collect_rs_files(dir) {
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            let rel = file
                .strip_prefix(env!("CARGO_MANIFEST_DIR"))
                .unwrap_or(&file)
                .display()
                .to_string();

            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed == "#![allow(dead_code)]" {
                    violations.push(format!(
                        "{rel}:{}: module-level #![allow(dead_code)] — use item-level suppression with a comment explaining why",
                        i + 1
                    ));
                }
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Module-level #![allow(dead_code)] found in architecture layers — use item-level suppression:\n{}",
        violations.join("\n")
    );
}
