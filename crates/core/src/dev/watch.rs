//! Watch pattern translation
//!
//! Globs from `[tasks.dev] watch` become one anchored regular expression for
//! the watcher's `-r` flag.

use globset::Glob;
use regex::Regex;

use crate::types::{PinionError, PinionResult};

const SEPARATOR: &str = r"[/\\]";
const NOT_SEPARATOR: &str = r"[^/\\]";

/// Unanchored regex body for a single glob
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str(NOT_SEPARATOR);
                out.push('*');
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '/' => {
                out.push_str(SEPARATOR);
                i += 1;
            }
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(len) if len > 0 => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    out.push('[');
                    match class.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            out.push_str(&rest.replace('\\', r"\\"));
                        }
                        None => out.push_str(&class.replace('\\', r"\\")),
                    }
                    out.push(']');
                    i += len + 2;
                }
                _ => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    out
}

/// Combine `patterns` into a single anchored expression.
///
/// Each pattern is validated as a glob first; the result is compiled once so
/// a bad pattern fails before the watcher starts.
pub fn watch_regex(patterns: &[String]) -> PinionResult<String> {
    let mut bodies = Vec::new();
    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        Glob::new(pattern).map_err(|e| {
            PinionError::Supervisor(format!("invalid watch pattern '{}': {}", pattern, e))
        })?;
        bodies.push(glob_to_regex(pattern));
    }

    if bodies.is_empty() {
        return Err(PinionError::Supervisor(
            "dev task must declare at least one watch pattern".to_string(),
        ));
    }

    let combined = format!("^(?:{})$", bodies.join("|"));
    Regex::new(&combined).map_err(|e| {
        PinionError::Supervisor(format!("watch patterns produce an invalid expression: {}", e))
    })?;
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> Regex {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        Regex::new(&watch_regex(&patterns).unwrap()).unwrap()
    }

    #[test]
    fn test_double_star_crosses_directories() {
        let re = matcher(&["**/*.go"]);
        assert_eq!(re.as_str(), r"^(?:.*[/\\][^/\\]*\.go)$");
        assert!(re.is_match("cmd/main.go"));
        assert!(re.is_match("cmd/server/main.go"));
        assert!(re.is_match(r"cmd\server\main.go"));
        assert!(!re.is_match("cmd/main.go.orig"));
        assert!(!re.is_match("cmd/README.md"));
    }

    #[test]
    fn test_double_star_slash_requires_a_separator() {
        let re = matcher(&["**/*.go"]);
        assert!(!re.is_match("main.go"));

        let re = matcher(&["**/*.go", "*.go"]);
        assert!(re.is_match("main.go"));
        assert!(re.is_match("pkg/main.go"));
    }

    #[test]
    fn test_single_star_stays_in_directory() {
        let re = matcher(&["*.go"]);
        assert!(re.is_match("main.go"));
        assert!(!re.is_match("cmd/main.go"));

        let re = matcher(&["internal/**"]);
        assert!(re.is_match("internal/a/b.sql"));
        assert!(!re.is_match("vendor/internal/a.go"));
    }

    #[test]
    fn test_literals_are_escaped() {
        let re = matcher(&["go.mod"]);
        assert!(re.is_match("go.mod"));
        assert!(!re.is_match("goxmod"));
        assert!(!re.is_match("sub/go.mod"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        let re = matcher(&["v?.txt", "data/[ab].json", "x[!0-9]"]);
        assert!(re.is_match("v1.txt"));
        assert!(re.is_match("data/a.json"));
        assert!(!re.is_match("data/c.json"));
        assert!(re.is_match("xy"));
        assert!(!re.is_match("x7"));
    }

    #[test]
    fn test_patterns_are_or_combined() {
        let re = matcher(&["**/*.go", "go.mod", "  "]);
        assert!(re.is_match("pkg/x.go"));
        assert!(re.is_match("go.mod"));
        assert!(!re.is_match("go.sum"));
    }

    #[test]
    fn test_invalid_or_empty_patterns() {
        assert!(watch_regex(&["src/[a".to_string()]).is_err());
        assert!(watch_regex(&[]).is_err());
        assert!(watch_regex(&[" ".to_string()]).is_err());
    }
}
