//! Failure classification: is the fault in the generated tests or in the code under test?
//!
//! The heuristics are deliberately narrow. Anything not recognized as a
//! test-file fault is blamed on production code, and an assertion failure
//! with expected/received wording is always production code for TypeScript.

use forja_core::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::stats::strip_ansi;

/// Where a test failure originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The generated code is wrong; charged to the debug budget.
    ProductionCode,
    /// The generated tests are wrong; regenerate them without charge.
    TestCode,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ProductionCode => "production_code",
            FailureKind::TestCode => "test_code",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verdict of the classifier with the signal that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: FailureKind,
    pub reason: String,
}

impl Classification {
    fn production(reason: &str) -> Self {
        Self {
            kind: FailureKind::ProductionCode,
            reason: reason.to_string(),
        }
    }

    fn test_code(reason: &str) -> Self {
        Self {
            kind: FailureKind::TestCode,
            reason: reason.to_string(),
        }
    }

    pub fn is_test_fault(&self) -> bool {
        self.kind == FailureKind::TestCode
    }
}

/// Errors that point at a malformed TypeScript test file.
const TS_PARSE_SIGNALS: [&str; 14] = [
    "syntaxerror",
    "unexpected token",
    "parse error",
    "parsing error",
    "failed to parse",
    "transform failed",
    "cannot find module",
    "failed to resolve import",
    "does not provide an export named",
    "ts1005",
    "ts1109",
    "error: expected",
    "has already been declared",
    "already been declared",
];

fn matches(re: &str, text: &str) -> bool {
    Regex::new(re).map(|r| r.is_match(text)).unwrap_or(false)
}

/// A standalone negative zero such as `-0` (not `-0.5` or `-01`).
fn mentions_negative_zero(text: &str) -> bool {
    matches(r"(^|[^\w.])-0([^\w.]|$)", text) || text.contains("negative zero")
}

/// Classify a failed run from its combined stdout and stderr.
pub fn classify(language: Language, output: &str, test_file: &str) -> Classification {
    let combined = strip_ansi(output);
    let low = combined.to_lowercase();
    let test_file = test_file.to_lowercase();

    match language {
        Language::TypeScript => {
            if low.contains("assertionerror") && (low.contains("expected") || low.contains("received")) {
                return Classification::production("AssertionError con expected/received");
            }
            if TS_PARSE_SIGNALS.iter().any(|s| low.contains(s))
                && (low.contains(&test_file) || low.contains(".spec."))
            {
                return Classification::test_code("Error de parsing o sintaxis en el archivo de tests");
            }
            if low.contains("expected:") && low.contains("received:") {
                if mentions_negative_zero(&low) {
                    return Classification::test_code("Diferencia -0 vs +0 en las aserciones");
                }
                if matches(r"(?i)(expected|received):\s*[-+]?\d+\.\d+", &combined) {
                    return Classification::test_code("Discrepancia con decimales en el valor esperado");
                }
            }
        }
        Language::Python => {
            if (low.contains("syntaxerror") || low.contains("indentationerror")) && low.contains(&test_file) {
                return Classification::test_code("Error de sintaxis o indentación en el archivo de tests");
            }
            if low.contains("assert")
                && low.contains("expected")
                && low.contains("got")
                && matches(r"\d+\.\d+", &combined)
            {
                return Classification::test_code("Discrepancia con decimales en el valor esperado");
            }
            if mentions_negative_zero(&low) && low.contains(&test_file) {
                return Classification::test_code("Diferencia -0 vs +0 en las aserciones");
            }
        }
    }

    Classification::production("Fallo atribuido al código de producción")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_assertion_is_production() {
        let output = "FAIL sumar.spec.ts > suma\nAssertionError: expected 5 to be 6 // Object.is equality\n- Expected\n+ Received";
        let result = classify(Language::TypeScript, output, "sumar.spec.ts");
        assert_eq!(result.kind, FailureKind::ProductionCode);
    }

    #[test]
    fn test_ts_assertion_wins_over_parse_signal() {
        let output = "SyntaxError somewhere\nAssertionError: expected 1 to be 2\n sumar.spec.ts";
        assert!(!classify(Language::TypeScript, output, "sumar.spec.ts").is_test_fault());
    }

    #[test]
    fn test_ts_syntax_error_in_test_file() {
        let output = "Error: Transform failed with 1 error:\n/out/sumar.spec.ts:12:4: ERROR: Unexpected \"}\"";
        let result = classify(Language::TypeScript, output, "sumar.spec.ts");
        assert_eq!(result.kind, FailureKind::TestCode);
    }

    #[test]
    fn test_ts_duplicate_declaration() {
        let output = "SyntaxError: Identifier 'sumar' has already been declared (sumar.spec.ts:3)";
        assert!(classify(Language::TypeScript, output, "sumar.spec.ts").is_test_fault());
    }

    #[test]
    fn test_ts_negative_zero_and_decimals() {
        let zero = "Expected: -0\nReceived: 0";
        assert!(classify(Language::TypeScript, zero, "x.spec.ts").is_test_fault());

        let decimals = "Expected: 0.30000001\nReceived: 0.3";
        assert!(classify(Language::TypeScript, decimals, "x.spec.ts").is_test_fault());

        let integers = "Expected: 5\nReceived: 6";
        assert!(!classify(Language::TypeScript, integers, "x.spec.ts").is_test_fault());
    }

    #[test]
    fn test_python_syntax_error_in_test_file() {
        let output = "E     File \"/out/test_sumar.py\", line 7\nE       def test_x(\nE   SyntaxError: '(' was never closed";
        assert!(classify(Language::Python, output, "test_sumar.py").is_test_fault());
    }

    #[test]
    fn test_python_syntax_error_in_code_is_production() {
        let output = "E     File \"/out/sumar.py\", line 3\nE   SyntaxError: invalid syntax";
        assert!(!classify(Language::Python, output, "test_sumar.py").is_test_fault());
    }

    #[test]
    fn test_python_plain_assertion_is_production() {
        let output = "test_sumar.py::test_sumar_positivos FAILED\nE       assert 6 == 5\nE        +  where 6 = sumar(2, 3)\n1 failed, 3 passed in 0.02s";
        let result = classify(Language::Python, output, "test_sumar.py");
        assert_eq!(result.kind, FailureKind::ProductionCode);
    }

    #[test]
    fn test_negative_zero_detection() {
        assert!(mentions_negative_zero("assert -0 == 0"));
        assert!(!mentions_negative_zero("assert -0.5 == 0"));
        assert!(!mentions_negative_zero("x-01"));
    }
}
