//! Local rule-based analyzer.

use std::path::Path;

use forja_core::Language;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PolicyError, PolicyResult};
use crate::findings::{AnalysisSource, Finding, FindingsReport};
use crate::rules::RuleSet;

/// Paths skipped when analyzing a directory.
pub const DEFAULT_EXCLUDES: [&str; 4] = [
    "**/node_modules/**",
    "**/.git/**",
    "**/__pycache__/**",
    "**/.venv/**",
];

/// Lexical analyzer holding the compiled rule sets of both languages.
#[derive(Debug)]
pub struct LocalAnalyzer {
    python: RuleSet,
    typescript: RuleSet,
    excludes: Vec<glob::Pattern>,
}

impl LocalAnalyzer {
    pub fn new() -> PolicyResult<Self> {
        let excludes = DEFAULT_EXCLUDES
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        Ok(Self {
            python: RuleSet::for_language(Language::Python)?,
            typescript: RuleSet::for_language(Language::TypeScript)?,
            excludes,
        })
    }

    /// Add a glob of paths to skip in [`LocalAnalyzer::analyze_path`].
    pub fn with_exclude(mut self, pattern: &str) -> PolicyResult<Self> {
        let compiled = glob::Pattern::new(pattern).map_err(|e| PolicyError::RuleEvaluationFailed {
            rule: "exclude".to_string(),
            message: format!("Invalid glob '{}': {}", pattern, e),
        })?;
        self.excludes.push(compiled);
        Ok(self)
    }

    pub fn rules(&self, language: Language) -> &RuleSet {
        match language {
            Language::Python => &self.python,
            Language::TypeScript => &self.typescript,
        }
    }

    fn scan(&self, code: &str, language: Language, component: Option<&str>) -> Vec<Finding> {
        let findings = self.rules(language).evaluate(code);
        match component {
            Some(name) => findings.into_iter().map(|f| f.in_component(name)).collect(),
            None => findings,
        }
    }

    /// Analyze source text.
    pub fn analyze(&self, code: &str, language: Language, component: Option<&str>) -> FindingsReport {
        let findings = self.scan(code, language, component);
        info!(
            "Local analysis ({}): {} issue(s) in {} line(s)",
            language,
            findings.len(),
            code.lines().count()
        );
        FindingsReport::new(AnalysisSource::Local, findings)
    }

    /// Analyze one source file; the language comes from its extension unless given.
    pub fn analyze_file(&self, path: &Path, language: Option<Language>) -> PolicyResult<FindingsReport> {
        let language = language
            .or_else(|| Language::from_path(path))
            .ok_or_else(|| PolicyError::UnsupportedFile(path.display().to_string()))?;
        let code = std::fs::read_to_string(path)?;
        let component = path.file_name().map(|n| n.to_string_lossy().to_string());
        Ok(self.analyze(&code, language, component.as_deref()))
    }

    /// Analyze a file, or every supported source file below a directory.
    pub fn analyze_path(&self, path: &Path) -> PolicyResult<FindingsReport> {
        if path.is_file() {
            return self.analyze_file(path, None);
        }

        let mut findings = Vec::new();
        let mut files = 0usize;
        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
        {
            let file_path = entry.path();
            let relative = file_path.strip_prefix(path).unwrap_or(file_path);
            if self.excludes.iter().any(|p| p.matches_path(relative)) {
                continue;
            }
            let Some(language) = Language::from_path(file_path) else {
                continue;
            };
            let code = std::fs::read_to_string(file_path)?;
            let component = relative.to_string_lossy().replace('\\', "/");
            debug!("Analyzing {} as {}", component, language);
            findings.extend(self.scan(&code, language, Some(&component)));
            files += 1;
        }

        info!("Local analysis of {}: {} issue(s) in {} file(s)", path.display(), findings.len(), files);
        Ok(FindingsReport::new(AnalysisSource::Local, findings).with_metric("files", files.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Severity;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_analyze_text() {
        let analyzer = LocalAnalyzer::new().unwrap();
        let report = analyzer.analyze("password = \"hunter2\"\n", Language::Python, Some("config.py"));

        assert_eq!(report.source, AnalysisSource::Local);
        assert_eq!(report.summary.severity(Severity::Blocker), 1);
        assert_eq!(report.issues[0].component.as_deref(), Some("config.py"));
        assert_eq!(report.issues[0].line, Some(1));
    }

    #[test]
    fn test_analyze_directory_skips_excluded() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules/lib")).unwrap();
        fs::write(temp.path().join("src/a.ts"), "var x = 1;\n").unwrap();
        fs::write(temp.path().join("src/b.py"), "print('hola')\n").unwrap();
        fs::write(temp.path().join("node_modules/lib/c.ts"), "var y = 2;\n").unwrap();
        fs::write(temp.path().join("README.md"), "var z = 3;\n").unwrap();

        let analyzer = LocalAnalyzer::new().unwrap();
        let report = analyzer.analyze_path(temp.path()).unwrap();

        assert_eq!(report.metrics.get("files").map(String::as_str), Some("2"));
        let components: Vec<_> = report.issues.iter().filter_map(|f| f.component.clone()).collect();
        assert!(components.contains(&"src/a.ts".to_string()));
        assert!(components.contains(&"src/b.py".to_string()));
        assert!(!components.iter().any(|c| c.contains("node_modules")));
    }

    #[test]
    fn test_unsupported_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, "x").unwrap();

        let analyzer = LocalAnalyzer::new().unwrap();
        assert!(matches!(
            analyzer.analyze_file(&path, None),
            Err(PolicyError::UnsupportedFile(_))
        ));
        assert!(analyzer.analyze_file(&path, Some(Language::Python)).is_ok());
    }
}
