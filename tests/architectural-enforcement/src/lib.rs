//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the client's production sources:
//! - No blocking I/O inside async functions
//! - No sleep() calls (the client never retries or polls)
//! - No `unwrap()` / `expect()` outside test code
//!
//! The helpers below are shared by the tests under `tests/`. Test modules
//! (everything from the first `#[cfg(test)]` in a file) are not scanned.

use std::fs;
use std::path::{Path, PathBuf};

/// Source directories scanned by every check, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["otbridge/core/src"];

/// A single production source line
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Full line text
    pub text: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.text.trim())
    }
}

/// Workspace root, derived from this crate's manifest directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every `.rs` file under the production directories
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    files.sort();
    files
}

/// Lines of a file that precede its test module
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .collect()
}

/// Line with any `//` comment removed
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a line declares a function (`fn`, `pub fn`, `async fn`, ...)
pub fn is_fn_declaration(line: &str) -> bool {
    let line = code_part(line).trim_start();
    line.starts_with("fn ") || line.contains(" fn ")
}

/// Whether the line at `current_idx` sits inside an `async fn`
///
/// Scans backwards to the nearest function declaration.
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        let line = lines[i];
        if is_fn_declaration(line) {
            return code_part(line).contains("async fn ");
        }
    }
    false
}

/// Production lines matching `predicate`, across all production files
pub fn scan<F>(predicate: F) -> Vec<SourceLine>
where
    F: Fn(&[&str], usize) -> bool,
{
    let mut hits = Vec::new();

    for path in production_files() {
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let lines = production_lines(&content);

        for idx in 0..lines.len() {
            if predicate(&lines, idx) {
                hits.push(SourceLine {
                    path: path.clone(),
                    number: idx + 1,
                    text: lines[idx].to_string(),
                });
            }
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = production_lines(content);
        assert_eq!(lines, vec!["fn a() {}", ""]);
    }

    #[test]
    fn test_fn_declaration_detection() {
        assert!(is_fn_declaration("fn main() {"));
        assert!(is_fn_declaration("    pub fn load_config() -> Result<()> {"));
        assert!(is_fn_declaration("    pub async fn open<T>(&mut self, transport: &T)"));
        assert!(!is_fn_declaration("    let f = Fn::new();"));
        assert!(!is_fn_declaration("    // fn commented_out() {}"));
    }

    #[test]
    fn test_async_detection() {
        let code = vec![
            "pub async fn open(&mut self) {",
            "    let body = read();",
            "}",
            "pub fn load() {",
            "    let body = std::fs::read_to_string(path);",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_production_sources_found() {
        let files = production_files();
        assert!(
            files.iter().any(|p| p.ends_with("client.rs")),
            "client sources not found under {}",
            workspace_root().display()
        );
    }
}
