//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. The client never retries and
//! never polls; a command that should block until the robot finishes uses
//! `waitUntilComplete` on the request instead.

use architectural_enforcement::{code_part, scan};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|lines, idx| is_sleep_call(code_part(lines[idx])));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops (use waitUntilComplete)");
        eprintln!("  - Sleep between retries (the client does not retry)");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep_call(
            "    tokio::time::sleep(Duration::from_millis(100)).await;"
        ));
        assert!(is_sleep_call("    std::thread::sleep(delay);"));
        assert!(!is_sleep_call("    let timeout = Duration::from_secs(300);"));
        assert!(!is_sleep_call(code_part(
            "    // tokio::time::sleep(d).await;"
        )));
    }
}
