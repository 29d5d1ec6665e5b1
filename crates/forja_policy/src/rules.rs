//! Rule catalog of the local analyzer.
//!
//! Rules are lexical and line-oriented. Each rule sees one of three views of a
//! line (the raw line, the code of a non-comment line, or the body of a
//! full-line comment), except source rules which scan the whole file.

use forja_core::Language;
use regex::Regex;
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::findings::{Finding, IssueType, Severity};

/// Maximum line length before S103 fires.
pub const MAX_LINE_LENGTH: usize = 120;

/// More boolean operators than this on one line is a complex condition.
pub const MAX_BOOLEAN_OPERATORS: usize = 3;

/// Which view of a line a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The raw line.
    Any,
    /// Lines that are not full-line comments.
    Code,
    /// The text of full-line comments, without the comment marker.
    Comment,
}

/// How a rule decides that it fires.
pub enum Check {
    /// Fires when the regex matches.
    Pattern(Regex),
    /// Fires when the regex matches more than `n` times.
    MoreThan(Regex, usize),
    /// Fires when the predicate holds.
    Line(fn(&str) -> bool),
    /// Returns the 1-based line numbers where the rule fires.
    Source(fn(&[&str]) -> Vec<usize>),
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            Check::MoreThan(re, n) => write!(f, "MoreThan({}, {})", re.as_str(), n),
            Check::Line(_) => write!(f, "Line(..)"),
            Check::Source(_) => write!(f, "Source(..)"),
        }
    }
}

/// A single analyzer rule.
#[derive(Debug)]
pub struct Rule {
    /// Rule key, e.g. `python:S1135`.
    pub key: String,
    pub severity: Severity,
    pub issue_type: IssueType,
    pub message: String,
    pub scope: Scope,
    pub check: Check,
}

impl Rule {
    fn new(
        language: Language,
        id: &str,
        severity: Severity,
        issue_type: IssueType,
        message: &str,
        scope: Scope,
        check: Check,
    ) -> Self {
        Self {
            key: format!("{}:{}", language.as_str(), id),
            severity,
            issue_type,
            message: message.to_string(),
            scope,
            check,
        }
    }

    fn finding(&self, line: usize) -> Finding {
        Finding::new(&self.key, self.severity, self.issue_type, &self.message).at_line(line)
    }
}

fn pattern(rule: &str, re: &str) -> PolicyResult<Regex> {
    Regex::new(re).map_err(|e| PolicyError::RuleEvaluationFailed {
        rule: rule.to_string(),
        message: format!("Invalid regex: {}", e),
    })
}

/// The rules for one language.
#[derive(Debug)]
pub struct RuleSet {
    pub language: Language,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Build the rule set for `language`.
    pub fn for_language(language: Language) -> PolicyResult<Self> {
        let rules = match language {
            Language::Python => python_rules()?,
            Language::TypeScript => typescript_rules()?,
        };
        debug!("Loaded {} {} analyzer rules", rules.len(), language);
        Ok(Self { language, rules })
    }

    /// Rule keys, in evaluation order.
    pub fn keys(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.key.as_str()).collect()
    }

    /// Run every rule over `code`.
    ///
    /// Findings are ordered by line, then by rule order.
    pub fn evaluate(&self, code: &str) -> Vec<Finding> {
        let lines: Vec<&str> = code.lines().collect();
        let mut findings = Vec::new();

        for (index, raw) in lines.iter().enumerate() {
            let comment = comment_body(raw, self.language);
            for rule in &self.rules {
                let view = match (rule.scope, comment) {
                    (Scope::Any, _) => *raw,
                    (Scope::Code, None) => *raw,
                    (Scope::Comment, Some(body)) => body,
                    _ => continue,
                };
                let fires = match &rule.check {
                    Check::Pattern(re) => re.is_match(view),
                    Check::MoreThan(re, n) => re.find_iter(view).count() > *n,
                    Check::Line(predicate) => predicate(view),
                    Check::Source(_) => false,
                };
                if fires {
                    findings.push(rule.finding(index + 1));
                }
            }
        }

        for rule in &self.rules {
            if let Check::Source(scan) = &rule.check {
                findings.extend(scan(&lines).into_iter().map(|line| rule.finding(line)));
            }
        }

        findings.sort_by_key(|f| f.line.unwrap_or(0));
        findings
    }
}

/// Body of a full-line comment, or `None` for code lines.
pub fn comment_body(line: &str, language: Language) -> Option<&str> {
    let trimmed = line.trim_start();
    let body = match language {
        Language::Python => trimmed.strip_prefix('#'),
        Language::TypeScript => trimmed
            .strip_prefix("//")
            .or_else(|| trimmed.strip_prefix("/*"))
            .or_else(|| trimmed.strip_prefix('*')),
    }?;
    Some(body.trim())
}

#[rustfmt::skip]
fn python_rules() -> PolicyResult<Vec<Rule>> {
    let py = Language::Python;
    Ok(vec![
        Rule::new(py, "S1135", Severity::Info, IssueType::CodeSmell,
            "Completa la tarea pendiente indicada en este comentario TODO/FIXME",
            Scope::Any, Check::Pattern(pattern("S1135", r"\b(TODO|FIXME)\b")?)),
        Rule::new(py, "S1067", Severity::Critical, IssueType::CodeSmell,
            "Reduce el número de operadores lógicos de esta expresión",
            Scope::Code, Check::MoreThan(pattern("S1067", r"\b(and|or)\b")?, MAX_BOOLEAN_OPERATORS)),
        Rule::new(py, "S6437", Severity::Blocker, IssueType::Vulnerability,
            "No escribas credenciales en el código; léelas de la configuración",
            Scope::Code, Check::Line(python_credential)),
        Rule::new(py, "S1523", Severity::Critical, IssueType::SecurityHotspot,
            "Evita ejecutar código dinámico con eval/exec",
            Scope::Code, Check::Pattern(pattern("S1523", r"\b(eval|exec)\s*\(")?)),
        Rule::new(py, "S5754", Severity::Major, IssueType::CodeSmell,
            "Captura un tipo de excepción concreto en lugar de un except genérico",
            Scope::Code, Check::Pattern(pattern(
                "S5754",
                r"^\s*except\s*((Exception|BaseException)(\s+as\s+\w+)?)?\s*:",
            )?)),
        Rule::new(py, "S106", Severity::Minor, IssueType::CodeSmell,
            "Usa logging en lugar de print() en código de producción",
            Scope::Code, Check::Pattern(pattern("S106", r"^\s*print\s*\(")?)),
        Rule::new(py, "S103", Severity::Minor, IssueType::CodeSmell,
            "Divide esta línea; supera los 120 caracteres",
            Scope::Any, Check::Line(too_long)),
        Rule::new(py, "S2737", Severity::Critical, IssueType::Bug,
            "El bloque except no debe estar vacío",
            Scope::Code, Check::Source(python_empty_handlers)),
        Rule::new(py, "S125", Severity::Major, IssueType::CodeSmell,
            "Elimina el código comentado",
            Scope::Comment, Check::Line(looks_like_code)),
        Rule::new(py, "S1481", Severity::Minor, IssueType::CodeSmell,
            "Elimina la variable local sin usar",
            Scope::Code, Check::Source(python_unused_locals)),
    ])
}

#[rustfmt::skip]
fn typescript_rules() -> PolicyResult<Vec<Rule>> {
    let ts = Language::TypeScript;
    Ok(vec![
        Rule::new(ts, "S1135", Severity::Info, IssueType::CodeSmell,
            "Completa la tarea pendiente indicada en este comentario TODO/FIXME",
            Scope::Any, Check::Pattern(pattern("S1135", r"\b(TODO|FIXME)\b")?)),
        Rule::new(ts, "S1067", Severity::Critical, IssueType::CodeSmell,
            "Reduce el número de operadores lógicos de esta expresión",
            Scope::Code, Check::MoreThan(pattern("S1067", r"&&|\|\|")?, MAX_BOOLEAN_OPERATORS)),
        Rule::new(ts, "S6437", Severity::Blocker, IssueType::Vulnerability,
            "No escribas credenciales en el código; léelas de la configuración",
            Scope::Code, Check::Line(typescript_credential)),
        Rule::new(ts, "S1523", Severity::Critical, IssueType::SecurityHotspot,
            "Evita ejecutar código dinámico con eval o new Function",
            Scope::Code, Check::Pattern(pattern("S1523", r"\beval\s*\(|\bnew\s+Function\s*\(")?)),
        Rule::new(ts, "S106", Severity::Minor, IssueType::CodeSmell,
            "Elimina las llamadas a console antes de producción",
            Scope::Code, Check::Pattern(pattern("S106", r"\bconsole\.(log|error|warn|info|debug)\s*\(")?)),
        Rule::new(ts, "S3504", Severity::Major, IssueType::CodeSmell,
            "Usa 'let' o 'const' en lugar de 'var'",
            Scope::Code, Check::Pattern(pattern("S3504", r"^\s*var\s")?)),
        Rule::new(ts, "S1440", Severity::Major, IssueType::Bug,
            "Usa '===' y '!==' en lugar de '==' y '!='",
            Scope::Code, Check::Line(loose_equality)),
        Rule::new(ts, "S4023", Severity::Minor, IssueType::CodeSmell,
            "Declara el tipo de retorno de la función exportada",
            Scope::Code, Check::Pattern(pattern(
                "S4023",
                r"^\s*export\s+(default\s+)?(async\s+)?function\s*\*?\s*\w*\s*(<[^>]*>)?\s*\([^)]*\)\s*\{",
            )?)),
        Rule::new(ts, "S6557", Severity::Major, IssueType::CodeSmell,
            "Evita 'any'; declara un tipo concreto",
            Scope::Code, Check::Pattern(pattern("S6557", r":\s*any\b|<any>|\bany\[\]|\bas\s+any\b")?)),
        Rule::new(ts, "S103", Severity::Minor, IssueType::CodeSmell,
            "Divide esta línea; supera los 120 caracteres",
            Scope::Any, Check::Line(too_long)),
        Rule::new(ts, "S2737", Severity::Critical, IssueType::Bug,
            "El bloque catch no debe estar vacío",
            Scope::Code, Check::Source(typescript_empty_catches)),
        Rule::new(ts, "S125", Severity::Major, IssueType::CodeSmell,
            "Elimina el código comentado",
            Scope::Comment, Check::Line(looks_like_code)),
        Rule::new(ts, "S1481", Severity::Minor, IssueType::CodeSmell,
            "Elimina la variable local sin usar",
            Scope::Code, Check::Source(typescript_unused_locals)),
    ])
}

const CREDENTIAL_KEYWORDS: [&str; 5] = ["password", "secret", "api_key", "apikey", "token"];

fn python_credential(line: &str) -> bool {
    let lower = line.to_lowercase();
    CREDENTIAL_KEYWORDS.iter().any(|k| lower.contains(k))
        && line.contains('=')
        && (line.contains('"') || line.contains('\''))
        && !["\"\"", "''", "None", "os.getenv", "os.environ"]
            .iter()
            .any(|safe| line.contains(safe))
}

fn typescript_credential(line: &str) -> bool {
    let lower = line.to_lowercase();
    CREDENTIAL_KEYWORDS.iter().any(|k| lower.contains(k))
        && (line.contains('=') || line.contains(':'))
        && (line.contains('"') || line.contains('\'') || line.contains('`'))
        && !["\"\"", "''", "``", "null", "undefined", "process.env"]
            .iter()
            .any(|safe| line.contains(safe))
}

fn too_long(line: &str) -> bool {
    line.chars().count() > MAX_LINE_LENGTH
}

/// Replace the contents of string literals with nothing, keeping the quotes.
fn blank_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                }
            }
            None => {
                if c == '"' || c == '\'' || c == '`' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn loose_equality(line: &str) -> bool {
    let code = blank_strings(line);
    let bytes = code.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i + 1] != b'=' {
            continue;
        }
        let next = bytes.get(i + 2).copied();
        if next == Some(b'=') {
            continue;
        }
        match bytes[i] {
            b'!' => return true,
            b'=' => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                if !matches!(prev, b'=' | b'!' | b'<' | b'>') && next != Some(b'>') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn looks_like_code(body: &str) -> bool {
    if body.is_empty() || body.starts_with('!') || body.starts_with("-*-") {
        return false;
    }
    if body.ends_with(';') || body.ends_with('{') || body == "}" || body == "});" {
        return true;
    }
    const KEYWORD_STARTS: [&str; 12] = [
        "return ", "import ", "from ", "def ", "class ", "const ", "let ", "var ", "if (",
        "for (", "while (", "elif ",
    ];
    if KEYWORD_STARTS.iter().any(|k| body.starts_with(k)) && !body.ends_with('.') {
        return true;
    }
    let Some(eq) = body.find('=') else {
        return false;
    };
    let lhs = body[..eq].trim_end();
    !lhs.is_empty()
        && !body[eq + 1..].starts_with('=')
        && lhs
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']')
}

fn next_code_line<'a>(lines: &[&'a str], from: usize) -> Option<&'a str> {
    lines[from..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
}

fn python_empty_handlers(lines: &[&str]) -> Vec<usize> {
    let mut hits = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if !trimmed.starts_with("except") {
            continue;
        }
        let Some(colon) = trimmed.rfind(':') else {
            continue;
        };
        let inline = trimmed[colon + 1..].trim();
        let empty = if inline.is_empty() {
            next_code_line(lines, i + 1) == Some("pass")
        } else {
            inline == "pass"
        };
        if empty {
            hits.push(i + 1);
        }
    }
    hits
}

fn typescript_empty_catches(lines: &[&str]) -> Vec<usize> {
    let mut hits = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let code = blank_strings(line);
        let Some(pos) = code.find("catch") else {
            continue;
        };
        let rest = code[pos + "catch".len()..].trim_start();
        let rest = if rest.starts_with('(') {
            match rest.find(')') {
                Some(close) => rest[close + 1..].trim_start(),
                None => continue,
            }
        } else {
            rest
        };
        let Some(body) = rest.strip_prefix('{') else {
            continue;
        };
        let body = body.trim();
        let empty = if body.is_empty() {
            next_code_line(lines, i + 1).map_or(false, |l| l.starts_with('}'))
        } else {
            body.starts_with('}')
        };
        if empty {
            hits.push(i + 1);
        }
    }
    hits
}

fn count_word(code: &str, word: &str) -> usize {
    Regex::new(&format!(r"(^|[^\w$]){}($|[^\w$])", regex::escape(word)))
        .map(|re| {
            code.lines()
                .map(|line| re.find_iter(line).count())
                .sum()
        })
        .unwrap_or(usize::MAX)
}

fn unused_locals(lines: &[&str], declaration: &str, skip: fn(&str) -> bool) -> Vec<usize> {
    let Ok(re) = Regex::new(declaration) else {
        return Vec::new();
    };
    let code = lines.join("\n");
    let mut hits = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if skip(line) {
            continue;
        }
        let Some(name) = re.captures(line).and_then(|c| c.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if name.starts_with('_') {
            continue;
        }
        if count_word(&code, name) == 1 {
            hits.push(i + 1);
        }
    }
    hits
}

fn python_unused_locals(lines: &[&str]) -> Vec<usize> {
    unused_locals(
        lines,
        r"^\s+([A-Za-z_]\w*)\s*(?::\s*[\w\[\], .|]+)?=[^=]",
        |line| line.trim_start().starts_with('#'),
    )
}

fn typescript_unused_locals(lines: &[&str]) -> Vec<usize> {
    unused_locals(
        lines,
        r"^\s*(?:const|let)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=[^=]",
        |line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("export") || trimmed.starts_with("//")
        },
    )
}
