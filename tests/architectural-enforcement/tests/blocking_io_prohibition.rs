//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions in the client MUST NOT use blocking I/O.
//! Every robot request goes through the async transport; only configuration
//! loading (a plain `fn`, called before the client starts) may touch the
//! filesystem synchronously.

use architectural_enforcement::{code_part, is_in_async_function, scan};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(|lines, idx| {
        let code = code_part(lines[idx]);
        is_blocking_io(code) && is_in_async_function(lines, idx)
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async fn:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Non-async functions (configuration loading)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The HTTP transport must never use reqwest's blocking client, in any function
#[test]
fn test_no_blocking_http_client() {
    let violations = scan(|lines, idx| code_part(lines[idx]).contains("reqwest::blocking"));
    assert!(
        violations.is_empty(),
        "reqwest::blocking used in production code:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

fn is_blocking_io(code: &str) -> bool {
    code.contains("std::fs::")
        || code.contains("use std::fs")
        || code.contains("std::net::")
        || code.contains("std::process::Command")
        || code.contains("reqwest::blocking")
        || code.contains("std::io::stdin()")
        || code.contains("std::io::stdout()")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_detection() {
        let test_code = vec![
            "async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];

        assert!(is_blocking_io(test_code[1]));
        assert!(is_in_async_function(&test_code, 1));
    }

    #[test]
    fn test_sync_config_loading_allowed() {
        let test_code = vec![
            "pub fn load_config_from_path(path: Option<PathBuf>) {",
            "    let toml = std::fs::read_to_string(path)?;",
            "}",
        ];

        assert!(is_blocking_io(test_code[1]));
        assert!(!is_in_async_function(&test_code, 1));
    }
}
