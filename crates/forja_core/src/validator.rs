//! Completeness checks for generated code.
//!
//! LLM output is sometimes truncated mid-file. These checks catch the obvious
//! cases before a test file is handed to the sandbox.

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Result of a completeness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub complete: bool,
    pub problems: Vec<String>,
}

impl Completeness {
    fn from_problems(problems: Vec<String>) -> Self {
        Self {
            complete: problems.is_empty(),
            problems,
        }
    }

    pub fn summary(&self) -> String {
        if self.complete {
            "complete".to_string()
        } else {
            self.problems.join("; ")
        }
    }
}

/// Check whether a generated unit-test file looks complete.
pub fn check_test_file(code: &str, language: Language) -> Completeness {
    match language {
        Language::TypeScript => check_typescript(code),
        Language::Python => check_python(code),
    }
}

fn check_typescript(code: &str) -> Completeness {
    let mut problems = Vec::new();
    let stripped = strip_strings_and_comments(code, Language::TypeScript);

    problems.extend(bracket_problems(&stripped));

    let tail = stripped.trim_end();
    if !(tail.ends_with("});") || tail.ends_with(')') || tail.ends_with('}') || tail.ends_with(");")) {
        problems.push("file does not end with a closing '});'".to_string());
    }

    let has_suite = ["describe(", "test(", "it("]
        .iter()
        .any(|marker| stripped.contains(marker));
    if !has_suite {
        problems.push("no describe(), test() or it() block".to_string());
    }

    Completeness::from_problems(problems)
}

fn check_python(code: &str) -> Completeness {
    let mut problems = Vec::new();

    if code.matches("\"\"\"").count() % 2 != 0 || code.matches("'''").count() % 2 != 0 {
        problems.push("unterminated triple-quoted string".to_string());
    }

    let stripped = strip_strings_and_comments(code, Language::Python);
    if !stripped.lines().any(|l| l.trim_start().starts_with("def test_")) {
        problems.push("no test_* function".to_string());
    }

    problems.extend(bracket_problems(&stripped));

    if let Some(last) = stripped.lines().rev().find(|l| !l.trim().is_empty()) {
        let last = last.trim_end();
        if ["(", "[", "{", ",", "\\", ":", "=", "+", "-", "*", "/"]
            .iter()
            .any(|end| last.ends_with(end))
        {
            problems.push(format!("last line looks truncated: '{}'", last.trim()));
        }
    } else {
        problems.push("file is empty".to_string());
    }

    Completeness::from_problems(problems)
}

/// Report unbalanced `{}`, `()` and `[]`.
fn bracket_problems(code: &str) -> Vec<String> {
    let mut stack = Vec::new();
    for c in code.chars() {
        match c {
            '{' | '(' | '[' => stack.push(c),
            '}' | ')' | ']' => {
                let open = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                if stack.pop() != Some(open) {
                    return vec![format!("unexpected '{}'", c)];
                }
            }
            _ => {}
        }
    }
    stack
        .iter()
        .rev()
        .map(|c| format!("unclosed '{}'", c))
        .collect()
}

/// Replace string literals with empty quotes and drop comments.
///
/// Keeps newlines so line-based checks still see the file's shape.
pub fn strip_strings_and_comments(code: &str, language: Language) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (language, c, next) {
            (Language::TypeScript, '/', Some('/')) | (Language::Python, '#', _) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            (Language::TypeScript, '/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
                i += 2;
            }
            (_, '"', _) | (_, '\'', _) | (Language::TypeScript, '`', _) => {
                let quote = c;
                let triple = language == Language::Python
                    && chars.get(i + 1) == Some(&quote)
                    && chars.get(i + 2) == Some(&quote);
                out.push(quote);
                out.push(quote);
                i += if triple { 3 } else { 1 };
                while i < chars.len() {
                    if chars[i] == '\\' {
                        i += 2;
                        continue;
                    }
                    if triple {
                        if chars[i] == quote
                            && chars.get(i + 1) == Some(&quote)
                            && chars.get(i + 2) == Some(&quote)
                        {
                            i += 3;
                            break;
                        }
                    } else if chars[i] == quote {
                        i += 1;
                        break;
                    } else if chars[i] == '\n' && quote != '`' {
                        break;
                    }
                    if chars[i] == '\n' {
                        out.push('\n');
                    }
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}
