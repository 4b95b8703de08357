//! Obtaining a working copy of a source repository.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use harvester_shared::{AppConfig, HarvesterError, Result, expand_home};
use tokio::process::Command;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// A working copy on disk. Temporary clones are deleted on drop.
#[derive(Debug)]
pub struct ClonedRepository {
    path: PathBuf,
    remove_on_drop: bool,
}

impl ClonedRepository {
    /// A directory owned by this value and removed when it is dropped.
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remove_on_drop: true,
        }
    }

    /// A directory that outlives this value.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remove_on_drop: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ClonedRepository {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove clone");
            }
        }
    }
}

/// Produces a working copy for a repository URL.
#[async_trait]
pub trait RepositoryCloner: Send + Sync {
    async fn clone_repo(&self, repo_url: &str) -> Result<ClonedRepository>;
}

// ---------------------------------------------------------------------------
// GitCloner
// ---------------------------------------------------------------------------

/// Shallow clones through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCloner {
    work_dir: PathBuf,
    depth: u32,
}

impl GitCloner {
    pub fn new(work_dir: impl Into<PathBuf>, depth: u32) -> Self {
        Self {
            work_dir: work_dir.into(),
            depth: depth.max(1),
        }
    }

    /// Uses `[git]` settings, cloning under the system temp dir by default.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let work_dir = match &config.git.work_dir {
            Some(dir) => expand_home(dir)?,
            None => std::env::temp_dir().join("ndc-harvester"),
        };
        Ok(Self::new(work_dir, config.git.depth))
    }
}

#[async_trait]
impl RepositoryCloner for GitCloner {
    #[instrument(skip(self), fields(work_dir = %self.work_dir.display()))]
    async fn clone_repo(&self, repo_url: &str) -> Result<ClonedRepository> {
        let url = Url::parse(repo_url)
            .map_err(|e| HarvesterError::clone_failed(repo_url, format!("invalid URL: {e}")))?;

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| HarvesterError::io(&self.work_dir, e))?;

        let target = ClonedRepository::temporary(self.work_dir.join(Uuid::now_v7().to_string()));

        let output = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg(self.depth.to_string())
            .arg("--quiet")
            .arg("--")
            .arg(url.as_str())
            .arg(target.path())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HarvesterError::clone_failed(repo_url, format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarvesterError::clone_failed(
                repo_url,
                format!("git exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        info!(path = %target.path().display(), "repository cloned");
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// LocalCheckout
// ---------------------------------------------------------------------------

/// Serves an existing checkout instead of cloning. The directory is left
/// untouched.
#[derive(Debug, Clone)]
pub struct LocalCheckout {
    path: PathBuf,
}

impl LocalCheckout {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RepositoryCloner for LocalCheckout {
    async fn clone_repo(&self, repo_url: &str) -> Result<ClonedRepository> {
        if !self.path.is_dir() {
            return Err(HarvesterError::clone_failed(
                repo_url,
                format!("{} is not a directory", self.path.display()),
            ));
        }
        Ok(ClonedRepository::existing(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{prefix}_{}", Uuid::now_v7()))
    }

    #[test]
    fn temporary_clone_is_removed_on_drop() {
        let dir = temp_dir("harvester_clone_drop");
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        std::fs::write(dir.join("assets/a.ttl"), "").unwrap();

        drop(ClonedRepository::temporary(&dir));
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn local_checkout_is_left_in_place() {
        let dir = temp_dir("harvester_local_checkout");
        std::fs::create_dir_all(&dir).unwrap();

        let checkout = LocalCheckout::new(&dir);
        let repo = checkout.clone_repo("https://example.org/repo").await.unwrap();
        assert_eq!(repo.path(), dir.as_path());
        drop(repo);
        assert!(dir.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn local_checkout_requires_a_directory() {
        let checkout = LocalCheckout::new(temp_dir("harvester_missing_checkout"));
        let err = checkout.clone_repo("https://example.org/repo").await.unwrap_err();
        assert!(matches!(err, HarvesterError::Clone { .. }));
    }

    #[tokio::test]
    async fn invalid_url_is_a_clone_error() {
        let cloner = GitCloner::new(temp_dir("harvester_git_work"), 1);
        let err = cloner.clone_repo("not a url").await.unwrap_err();
        match err {
            HarvesterError::Clone { repo_url, .. } => assert_eq!(repo_url, "not a url"),
            other => panic!("expected clone error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_clone_leaves_no_directory_behind() {
        let work_dir = temp_dir("harvester_git_work");
        let cloner = GitCloner::new(&work_dir, 1);
        let missing = format!("file://{}", temp_dir("harvester_no_such_repo").display());

        let err = cloner.clone_repo(&missing).await.unwrap_err();
        assert!(matches!(err, HarvesterError::Clone { .. }));

        let leftovers = std::fs::read_dir(&work_dir).unwrap().count();
        assert_eq!(leftovers, 0);
        std::fs::remove_dir_all(&work_dir).unwrap();
    }
}
