//! Code-generation target languages.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The two supported code-generation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Curly-brace target, tested with vitest.
    TypeScript,
    /// Indented target, tested with pytest.
    #[default]
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Python => "python",
        }
    }

    /// Source file extension, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TypeScript => ".ts",
            Self::Python => ".py",
        }
    }

    /// Name of the unit-test framework used in the sandbox.
    pub fn test_framework(&self) -> &'static str {
        match self {
            Self::TypeScript => "vitest",
            Self::Python => "pytest",
        }
    }

    /// Tag used on markdown code fences.
    pub fn fence_tag(&self) -> &'static str {
        self.as_str()
    }

    /// File name of the source file for a base name.
    pub fn source_file_name(&self, base_name: &str) -> String {
        format!("{}{}", base_name, self.extension())
    }

    /// File name of the unit-test file for a base name.
    ///
    /// vitest picks up `*.spec.ts`; pytest needs an importable `test_*.py`.
    pub fn test_file_name(&self, base_name: &str) -> String {
        match self {
            Self::TypeScript => format!("{}.spec.ts", base_name),
            Self::Python => format!("test_{}.py", base_name),
        }
    }

    /// Parse a free-form language label such as `"TypeScript 5.x"` or `"Python 3.12"`.
    ///
    /// Anything mentioning `typescript` or `ts` is TypeScript; everything else is Python.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("typescript") || lower.contains("ts") {
            Self::TypeScript
        } else {
            Self::Python
        }
    }

    /// Language of a source file, by extension (`.ts`, `.tsx`, `.js` or `.py`).
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") | Some("tsx") | Some("js") => Some(Self::TypeScript),
            Some("py") => Some(Self::Python),
            _ => None,
        }
    }

    /// Detect the target from a formal-requirements JSON string.
    ///
    /// Reads `lenguaje_version`, falling back to `lenguaje`. Invalid JSON yields Python.
    pub fn from_requirements(requirements_json: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(requirements_json) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not detect language from requirements: {}. Using python", e);
                return Self::Python;
            }
        };

        let label = ["lenguaje_version", "lenguaje"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(|v| v.as_str()))
            .find(|s| !s.trim().is_empty())
            .unwrap_or("");

        let language = Self::from_label(label);
        debug!("Detected language {} from label '{}'", language, label);
        language
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
