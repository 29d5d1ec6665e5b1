//! Test-runner output parsing.

use forja_core::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pass/fail counts of one test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl TestStats {
    pub fn new(passed: usize, failed: usize) -> Self {
        Self {
            total: passed + failed,
            passed,
            failed,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Total: {}, Pasados: {}, Fallidos: {}",
            self.total, self.passed, self.failed
        )
    }
}

/// Remove ANSI escape sequences (colors, cursor movement).
pub fn strip_ansi(text: &str) -> String {
    match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]") {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Parse runner output for the given language.
pub fn parse_stats(language: Language, output: &str) -> TestStats {
    match language {
        Language::TypeScript => parse_vitest(output),
        Language::Python => parse_pytest(output),
    }
}

fn capture_number(re: &str, text: &str) -> Option<usize> {
    Regex::new(re)
        .ok()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Parse the vitest summary line (`Tests  5 passed | 2 failed (7)`),
/// falling back to counting check and cross marks.
pub fn parse_vitest(output: &str) -> TestStats {
    let clean = strip_ansi(output);

    let summary = Regex::new(
        r"Tests\s+(?:(\d+)\s+failed\s+\|\s+)?(\d+)\s+passed(?:\s+\|\s+(\d+)\s+failed)?[^(\n]*\((\d+)\)",
    )
    .ok()
    .and_then(|re| re.captures(&clean));

    if let Some(caps) = summary {
        let num = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<usize>().ok())
        };
        let passed = num(2).unwrap_or(0);
        let failed = num(1).or_else(|| num(3)).unwrap_or(0);
        let total = num(4).unwrap_or(passed + failed);
        return TestStats {
            total,
            passed,
            failed,
        };
    }

    if let Some(failed) = capture_number(r"Tests\s+(\d+)\s+failed\s+\(\d+\)", &clean) {
        return TestStats::new(0, failed);
    }

    let passed = clean.matches('✓').count();
    let failed = clean.matches('✗').count() + clean.matches('×').count();
    TestStats::new(passed, failed)
}

/// Parse the pytest summary (`3 passed, 1 failed in 0.12s`).
///
/// Collection errors count as failures.
pub fn parse_pytest(output: &str) -> TestStats {
    let clean = strip_ansi(output);
    let passed = capture_number(r"(\d+)\s+passed", &clean).unwrap_or(0);
    let failed = capture_number(r"(\d+)\s+failed", &clean).unwrap_or(0);
    let errors = capture_number(r"(\d+)\s+errors?\b", &clean).unwrap_or(0);
    TestStats::new(passed, failed + errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[32m✓\x1b[39m ok\x1b[2K"), "✓ ok");
    }

    #[test]
    fn test_vitest_summary_variants() {
        let all_passed = " Test Files  1 passed (1)\n      Tests  4 passed (4)\n";
        assert_eq!(parse_vitest(all_passed), TestStats::new(4, 0));

        let mixed = "      Tests  2 failed | 3 passed (5)\n";
        assert_eq!(parse_vitest(mixed), TestStats::new(3, 2));

        let old_order = "Tests  3 passed | 1 failed (4)";
        assert_eq!(parse_vitest(old_order), TestStats::new(3, 1));

        let colored = "\x1b[2m      Tests \x1b[22m \x1b[1m\x1b[32m6 passed\x1b[39m\x1b[22m\x1b[90m (6)\x1b[39m";
        assert_eq!(parse_vitest(colored), TestStats::new(6, 0));

        let only_failed = "      Tests  2 failed (2)";
        assert_eq!(parse_vitest(only_failed), TestStats::new(0, 2));
    }

    #[test]
    fn test_vitest_symbol_fallback() {
        let output = " ✓ suma positivos\n ✓ suma negativos\n × suma decimales\n";
        assert_eq!(parse_vitest(output), TestStats::new(2, 1));
    }

    #[test]
    fn test_pytest_summary() {
        assert_eq!(
            parse_pytest("==== 3 passed, 1 failed in 0.05s ===="),
            TestStats::new(3, 1)
        );
        assert_eq!(parse_pytest("==== 4 passed in 0.01s ===="), TestStats::new(4, 0));
        assert_eq!(
            parse_pytest("==== 1 error in 0.10s ===="),
            TestStats::new(0, 1)
        );
        assert_eq!(parse_pytest(""), TestStats::default());
    }

    #[test]
    fn test_parse_stats_dispatch() {
        assert_eq!(parse_stats(Language::Python, "2 passed"), TestStats::new(2, 0));
        assert_eq!(parse_stats(Language::TypeScript, "Tests  2 passed (2)"), TestStats::new(2, 0));
    }
}
