//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code MUST NOT call `unwrap()` or `expect()`. Every
//! failure is reported through `SessionError`, `TransportError` or
//! `ConfigError` so the caller can decide what to do with a robot that is
//! mid-protocol.

use architectural_enforcement::{code_part, scan};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(|lines, idx| is_panicking_call(code_part(lines[idx])));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Panicking calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Use `?`, `ok_or_else`, or `unwrap_or_default` instead.");

        panic!(
            "\nFound {} unwrap/expect call(s) in production code.",
            violations.len()
        );
    }
}

fn is_panicking_call(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panicking_call_detection() {
        assert!(is_panicking_call("    let run = session.run().unwrap();"));
        assert!(is_panicking_call("    let id = value.expect(\"id\");"));
        assert!(!is_panicking_call("    let fields = map.unwrap_or_default();"));
        assert!(!is_panicking_call("    let body = body.unwrap_or_else(String::new);"));
    }
}
