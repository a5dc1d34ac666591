//! Resolving a step's `run:` string into one of the three locator kinds
//! the source loader (`loader.py`) supports: an in-process name, a path
//! to a directory containing `spec.yml`, or a `gh://org/repo[@rev]` git
//! reference (§6).

use std::path::{Path, PathBuf};

use common::async_trait::async_trait;
use common::eyre::Result;

use crate::error::WorkflowError;

const GIT_SCHEME: &str = "gh://";

/// A resolved reference to a sub-workflow, before it has been loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowLocator {
    /// A workflow registered in-process under this name (§6's "an
    /// in-process registration... for workflows compiled into the
    /// binary").
    Name(String),
    /// A filesystem path to a directory containing a `spec.yml`.
    Path(PathBuf),
    /// A `gh://org/repo[@rev]` reference, cloned into a cache directory
    /// by a [`WorkflowSource`] before it can be loaded.
    Git {
        org: String,
        repo: String,
        rev: Option<String>,
    },
}

impl WorkflowLocator {
    /// Parse a `run:` string (§6). A bare name with no path separators and
    /// no scheme is a [`WorkflowLocator::Name`]; anything that parses as an
    /// existing-looking filesystem path is a [`WorkflowLocator::Path`];
    /// `gh://org/repo[@rev]` is a [`WorkflowLocator::Git`]. Any other
    /// scheme (e.g. `s3://`) is rejected: this crate does not implement it
    /// (§1, §6).
    pub fn parse(locator: &str) -> Result<Self> {
        if let Some(rest) = locator.strip_prefix(GIT_SCHEME) {
            let (path, rev) = match rest.split_once('@') {
                Some((path, rev)) => (path, Some(rev.to_string())),
                None => (rest, None),
            };
            let (org, repo) = path
                .split_once('/')
                .ok_or_else(|| WorkflowError::UnresolvedLocator(locator.to_string()))?;
            if org.is_empty() || repo.is_empty() {
                return Err(WorkflowError::UnresolvedLocator(locator.to_string()).into());
            }
            return Ok(WorkflowLocator::Git {
                org: org.to_string(),
                repo: repo.to_string(),
                rev,
            });
        }

        if locator.contains("://") {
            return Err(WorkflowError::UnsupportedScheme(locator.to_string()).into());
        }

        if locator.contains('/') || locator.starts_with('.') {
            return Ok(WorkflowLocator::Path(PathBuf::from(locator)));
        }

        Ok(WorkflowLocator::Name(locator.to_string()))
    }
}

/// External collaborator that turns a [`WorkflowLocator::Git`] into a local
/// checkout (§6's "cloning itself is an external collaborator, stubbed
/// behind a `WorkflowSource` trait so the core doesn't depend on a git
/// implementation"). Not implemented by this crate; a caller that needs
/// git-backed workflows supplies their own `WorkflowSource`.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Clone (or reuse an already-cached clone of) `org/repo` at `rev` into
    /// a cache directory, returning the path to the checkout.
    async fn fetch(&self, org: &str, repo: &str, rev: Option<&str>) -> Result<PathBuf>;
}

/// Resolve a locator to the local directory a `spec.yml` should be read
/// from. [`WorkflowLocator::Name`] has no directory (it is loaded
/// in-process instead; see [`crate::subworkflow::WorkflowRegistry`]).
pub async fn resolve_to_path(
    locator: &WorkflowLocator,
    source: Option<&dyn WorkflowSource>,
) -> Result<Option<PathBuf>> {
    match locator {
        WorkflowLocator::Name(_) => Ok(None),
        WorkflowLocator::Path(path) => Ok(Some(path.clone())),
        WorkflowLocator::Git { org, repo, rev } => match source {
            Some(source) => source
                .fetch(org, repo, rev.as_deref())
                .await
                .map(Some),
            None => Err(WorkflowError::UnresolvedLocator(format!(
                "gh://{org}/{repo}{}",
                rev.as_deref()
                    .map(|r| format!("@{r}"))
                    .unwrap_or_default()
            ))
            .into()),
        },
    }
}

pub fn spec_file_in(dir: &Path) -> PathBuf {
    dir.join("spec.yml")
}
