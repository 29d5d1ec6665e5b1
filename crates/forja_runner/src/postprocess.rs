//! Mechanical fix-ups applied to generated vitest files before they run.

use regex::{Captures, Regex};

/// Maximum decimals kept in float literals of generated tests.
pub const MAX_TEST_DECIMALS: usize = 5;

/// Round a float literal to `max_decimals` and drop trailing zeros.
///
/// Returns `None` when `literal` is not a number.
pub fn format_float_literal(literal: &str, max_decimals: usize) -> Option<String> {
    let value: f64 = literal.trim().parse().ok()?;
    let rendered = format!("{:.*}", max_decimals, value);
    let trimmed = if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered.as_str()
    };
    Some(match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    })
}

fn is_zero(literal: &str) -> bool {
    literal.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
}

fn is_identifier_char(c: Option<char>) -> bool {
    c.map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn replace(code: &str, pattern: &str, rewrite: impl FnMut(&Captures) -> String) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(code, rewrite).into_owned(),
        Err(_) => code.to_string(),
    }
}

/// Normalize assertions in a generated vitest file.
///
/// - `toBeCloseTo(x, n)` becomes `toBeCloseTo(x)`
/// - `.toBe(-0.0)` and `.toBe(0.0)` become `.toBe(-0)` and `.toBe(0)`
/// - `.toBe(<float>)` becomes `.toBeCloseTo(<float>)`
/// - float literals with six or more decimals are rounded to five
pub fn postprocess_typescript_tests(code: &str) -> String {
    let code = replace(
        code,
        r"\btoBeCloseTo\(\s*([^,\n\)]+?)\s*,\s*[^\)\n]+\)",
        |caps| format!("toBeCloseTo({})", &caps[1]),
    );
    let code = replace(&code, r"\.toBe\(\s*-0(?:\.0+)?\s*\)", |_| ".toBe(-0)".to_string());
    let code = replace(&code, r"\.toBe\(\s*0(?:\.0+)?\s*\)", |_| ".toBe(0)".to_string());
    let code = replace(&code, r"\.toBe\(\s*([-+]?\d+\.\d+)\s*\)", |caps| {
        let literal = &caps[1];
        if is_zero(literal) {
            return caps[0].to_string();
        }
        let value = format_float_literal(literal, MAX_TEST_DECIMALS).unwrap_or_else(|| literal.to_string());
        format!(".toBeCloseTo({})", value)
    });

    let original = code.clone();
    replace(&code, r"[-+]?\d+\.\d{6,}", |caps| {
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        let before = original[..m.start()].chars().next_back();
        let after = original[m.end()..].chars().next();
        if is_identifier_char(before) || is_identifier_char(after) {
            return m.as_str().to_string();
        }
        format_float_literal(m.as_str(), MAX_TEST_DECIMALS).unwrap_or_else(|| m.as_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float_literal() {
        assert_eq!(format_float_literal("0.30000000000000004", 5).unwrap(), "0.3");
        assert_eq!(format_float_literal("3.1415926535", 5).unwrap(), "3.14159");
        assert_eq!(format_float_literal("2.000000001", 5).unwrap(), "2");
        assert_eq!(format_float_literal("-0.0000001", 5).unwrap(), "0");
        assert!(format_float_literal("abc", 5).is_none());
    }

    #[test]
    fn test_close_to_drops_precision_argument() {
        let out = postprocess_typescript_tests("expect(x).toBeCloseTo(0.3, 5);");
        assert_eq!(out, "expect(x).toBeCloseTo(0.3);");
    }

    #[test]
    fn test_zero_literals() {
        let out = postprocess_typescript_tests("expect(a).toBe(-0.0);\nexpect(b).toBe(0.000);");
        assert_eq!(out, "expect(a).toBe(-0);\nexpect(b).toBe(0);");
    }

    #[test]
    fn test_float_equality_becomes_close_to() {
        let out = postprocess_typescript_tests("expect(sumar(0.1, 0.2)).toBe(0.3);");
        assert_eq!(out, "expect(sumar(0.1, 0.2)).toBeCloseTo(0.3);");
    }

    #[test]
    fn test_integers_untouched() {
        let code = "expect(sumar(2, 3)).toBe(5);";
        assert_eq!(postprocess_typescript_tests(code), code);
    }

    #[test]
    fn test_long_floats_rounded() {
        let out = postprocess_typescript_tests("const v = 1.23456789;\nexpect(f(v)).toBeCloseTo(2.4691357800001);");
        assert_eq!(out, "const v = 1.23457;\nexpect(f(v)).toBeCloseTo(2.46914);");
    }

    #[test]
    fn test_long_floats_inside_identifiers_untouched() {
        let code = "const id = 'case_1.1234567';";
        assert_eq!(postprocess_typescript_tests(code), code);
    }
}
