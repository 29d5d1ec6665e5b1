//! Local clone housekeeping through the `git` binary.
//!
//! The hosted repository is driven over REST; this only mirrors generated
//! files into a local clone and removes merged branches from it.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

/// Git operations on a local clone.
#[derive(Debug, Clone)]
pub struct LocalGit {
    repo_path: PathBuf,
}

impl LocalGit {
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Check if Git is available on the system.
    pub fn is_git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    pub fn is_repository(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    fn git(&self, args: &[&str]) -> ClientResult<String> {
        debug!("git -C {} {}", self.repo_path.display(), args.join(" "));
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .output()
            .map_err(|e| ClientError::Git(format!("Failed to run git {}: {}", args[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClientError::Git(format!("git {} failed: {}", args[0], stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn current_branch(&self) -> ClientResult<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn checkout(&self, branch: &str) -> ClientResult<()> {
        self.git(&["checkout", branch]).map(|_| ())
    }

    pub fn branch_exists(&self, branch: &str) -> ClientResult<bool> {
        Ok(!self.git(&["branch", "--list", branch])?.is_empty())
    }

    /// Force-delete a local branch.
    pub fn delete_branch(&self, branch: &str) -> ClientResult<()> {
        self.git(&["branch", "-D", branch]).map(|_| ())
    }

    /// Remove a merged branch, leaving `base` checked out if it was current.
    ///
    /// Returns whether a branch was deleted. The base branch is never deleted.
    pub fn cleanup_branch(&self, branch: &str, base: &str) -> ClientResult<bool> {
        if branch == base {
            warn!("Refusing to delete base branch {}", base);
            return Ok(false);
        }
        if !self.is_repository() {
            debug!("{} is not a git repository, nothing to clean", self.repo_path.display());
            return Ok(false);
        }

        if self.current_branch()? == branch {
            self.checkout(base)?;
        }
        if !self.branch_exists(branch)? {
            return Ok(false);
        }
        self.delete_branch(branch)?;
        info!("Deleted local branch {}", branch);
        Ok(true)
    }

    /// Write `content` at `relative` inside the clone, creating parents.
    pub fn write_file(&self, relative: &str, content: &str) -> ClientResult<PathBuf> {
        let path = self.repo_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        debug!("Local copy written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> LocalGit {
        let git = LocalGit::new(dir);
        git.git(&["init"]).unwrap();
        git.git(&[
            "-c",
            "user.name=forja",
            "-c",
            "user.email=forja@example.com",
            "commit",
            "--allow-empty",
            "-m",
            "init",
        ])
        .unwrap();
        git
    }

    #[test]
    fn test_write_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let git = LocalGit::new(temp_dir.path());

        let path = git.write_file("src/main/sumar.py", "def sumar(a, b): ...").unwrap();
        assert_eq!(path, temp_dir.path().join("src/main/sumar.py"));
        assert!(path.exists());
        assert!(!git.is_repository());
    }

    #[test]
    fn test_cleanup_outside_repository() {
        let temp_dir = TempDir::new().unwrap();
        let git = LocalGit::new(temp_dir.path());
        assert!(!git.cleanup_branch("feature", "main").unwrap());
        assert!(!git.cleanup_branch("main", "main").unwrap());
    }

    #[test]
    fn test_cleanup_checked_out_branch() {
        if !LocalGit::is_git_available() {
            println!("Git not available, skipping test");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let git = init_repo(temp_dir.path());
        let base = git.current_branch().unwrap();

        git.git(&["checkout", "-b", "AI_Generated_Developer_sumar"]).unwrap();
        assert!(git.branch_exists("AI_Generated_Developer_sumar").unwrap());

        assert!(git.cleanup_branch("AI_Generated_Developer_sumar", &base).unwrap());
        assert_eq!(git.current_branch().unwrap(), base);
        assert!(!git.branch_exists("AI_Generated_Developer_sumar").unwrap());

        // Already gone
        assert!(!git.cleanup_branch("AI_Generated_Developer_sumar", &base).unwrap());
    }
}
