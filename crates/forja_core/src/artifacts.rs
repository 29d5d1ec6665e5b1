//! Artifact directory management.
//!
//! Every run writes its outputs into one flat directory with deterministic
//! file names. At the start of a run the directory is wiped except for the
//! test-toolchain files and the logs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::language::Language;

/// Entries that survive [`ArtifactStore::reset`].
pub const RESET_WHITELIST: [&str; 4] = ["package.json", "package-lock.json", "node_modules", "logs"];

/// Outcome suffix of a test-run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
    Error,
}

impl TestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "PASSED",
            TestOutcome::Failed => "FAILED",
            TestOutcome::Error => "ERROR",
        }
    }
}

/// Outcome suffix of a merge report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Failed,
    Skipped,
}

impl MergeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOutcome::Merged => "MERGED",
            MergeOutcome::Failed => "FAILED",
            MergeOutcome::Skipped => "OMITIDO",
        }
    }
}

/// Deterministic artifact file names.
pub mod names {
    use super::{MergeOutcome, TestOutcome};
    use crate::language::Language;

    pub fn requirements(iteration: u32) -> String {
        format!("1_requirements_manager_intento_{}.json", iteration)
    }

    pub fn developer(iteration: u32, debug: u32, quality: u32, language: Language) -> String {
        format!(
            "2_developer_req{}_debug{}_sq{}{}",
            iteration,
            debug,
            quality,
            language.extension()
        )
    }

    pub fn quality_report(iteration: u32, quality: u32) -> String {
        format!("3_sonarqube_report_req{}_sq{}.txt", iteration, quality)
    }

    pub fn quality_instructions(iteration: u32, quality: u32) -> String {
        format!("3_sonarqube_instrucciones_req{}_sq{}.txt", iteration, quality)
    }

    pub fn test_report(iteration: u32, debug: u32, outcome: TestOutcome) -> String {
        format!("4_testing_req{}_debug{}_{}.txt", iteration, debug, outcome.as_str())
    }

    pub fn malformed_tests(iteration: u32, debug: u32, attempt: u32) -> String {
        format!(
            "4_testing_req{}_debug{}_MALFORMED_ATTEMPT{}.txt",
            iteration, debug, attempt
        )
    }

    pub fn review(iteration: u32) -> String {
        format!("5_review_req{}.txt", iteration)
    }

    pub fn merge(iteration: u32, outcome: MergeOutcome) -> String {
        format!("6_complete_pr_req{}_{}.txt", iteration, outcome.as_str())
    }

    pub fn stakeholder(iteration: u32, validated: bool) -> String {
        let verdict = if validated { "VALIDADO" } else { "RECHAZADO" };
        format!("7_stakeholder_intento_{}_{}.txt", iteration, verdict)
    }

    pub fn release_note(iteration: u32) -> String {
        format!("release_note_req{}.md", iteration)
    }

    pub fn final_code(base_name: &str, language: Language) -> String {
        language.source_file_name(base_name)
    }
}

/// The per-run artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Wipe the directory, keeping [`RESET_WHITELIST`] entries.
    pub fn reset(&self) -> CoreResult<usize> {
        fs::create_dir_all(&self.root)?;

        let doomed: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                !RESET_WHITELIST.contains(&name.as_ref())
            })
            .map(|e| e.into_path())
            .collect();

        if !doomed.is_empty() {
            fs_extra::remove_items(&doomed)
                .map_err(|e| CoreError::Artifact(format!("Failed to clean {:?}: {}", self.root, e)))?;
        }
        fs::create_dir_all(self.logs_dir())?;

        info!("Reset artifact directory {:?} ({} entries removed)", self.root, doomed.len());
        Ok(doomed.len())
    }

    /// Write an artifact, creating the directory if needed.
    pub fn write(&self, name: &str, contents: &str) -> CoreResult<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path(name);
        fs::write(&path, contents)?;
        debug!("Wrote artifact {:?} ({} bytes)", path, contents.len());
        Ok(path)
    }

    pub fn read(&self, name: &str) -> CoreResult<String> {
        Ok(fs::read_to_string(self.path(name))?)
    }

    /// Names of the files currently in the directory, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Save the final validated code under its canonical name.
    pub fn save_final_code(&self, base_name: &str, language: Language, code: &str) -> CoreResult<PathBuf> {
        let name = names::final_code(base_name, language);
        let path = self.write(&name, &strip_code_fences(code))?;
        info!("Saved final code to {:?}", path);
        Ok(path)
    }
}

/// Remove markdown code fences around a block.
///
/// Handles a leading fence with an optional language tag and a trailing fence.
/// Repeats until nothing changes, so applying it twice is the same as once.
pub fn strip_code_fences(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Snake-case a function name into a file base name.
///
/// `calcularPromedio` becomes `calcular_promedio`; runs of other characters
/// collapse to a single underscore. Empty input yields `codigo`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c.to_ascii_lowercase());
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        "codigo".to_string()
    } else {
        trimmed
    }
}
