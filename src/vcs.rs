// src/vcs.rs

use crate::error::Result;
use crate::model::CommitInfo;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::{BranchType, Commit, Oid, Repository, Sort};
use std::path::Path;

/// Read-only queries the history store needs from version control.
pub trait VersionControl {
    /// Contents of `path` as of `commit`, `None` when absent or not text.
    fn file_at_commit(&self, commit: &str, path: &str) -> Option<String>;

    /// Commits reachable from HEAD that changed `path`, oldest first.
    /// With `since`, commits reachable from it are excluded.
    fn commits_touching(&self, path: &str, since: Option<&str>) -> Result<Vec<CommitInfo>>;

    /// Full hash of the upstream the local branch is compared against.
    fn resolve_upstream(&self) -> Option<String>;
}

pub struct GitRepo {
    repo: Repository,
    upstream: Option<String>,
}

impl GitRepo {
    /// Opens the repository containing `path`. `upstream` overrides the
    /// current branch's tracking branch.
    pub fn open(path: &Path, upstream: Option<String>) -> Result<Self> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo, upstream })
    }

    fn blob_id(commit: &Commit, path: &str) -> Option<Oid> {
        commit.tree().ok()?.get_path(Path::new(path)).ok().map(|entry| entry.id())
    }

    /// A merge touches `path` only when it differs from every parent.
    fn touches(&self, commit: &Commit, path: &str) -> bool {
        let current = Self::blob_id(commit, path);
        if commit.parent_count() == 0 {
            return current.is_some();
        }
        commit.parents().all(|parent| current != Self::blob_id(&parent, path))
    }

    fn tracking_branch(&self) -> Option<Oid> {
        let head = self.repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        let name = head.shorthand()?;
        let branch = self.repo.find_branch(name, BranchType::Local).ok()?;
        branch.upstream().ok()?.get().target()
    }
}

impl VersionControl for GitRepo {
    fn file_at_commit(&self, commit: &str, path: &str) -> Option<String> {
        let oid = Oid::from_str(commit).ok()?;
        let commit = self.repo.find_commit(oid).ok()?;
        let entry = commit.tree().ok()?.get_path(Path::new(path)).ok()?;
        let blob = self.repo.find_blob(entry.id()).ok()?;
        String::from_utf8(blob.content().to_vec()).ok()
    }

    fn commits_touching(&self, path: &str, since: Option<&str>) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        if let Some(since) = since {
            revwalk.hide(Oid::from_str(since)?)?;
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            if self.touches(&commit, path) {
                commits.push(commit_info(&commit));
            }
        }
        commits.reverse(); // Oldest first
        Ok(commits)
    }

    fn resolve_upstream(&self) -> Option<String> {
        let oid = match &self.upstream {
            Some(spec) => self.repo.revparse_single(spec).ok()?.peel_to_commit().ok()?.id(),
            None => self.tracking_branch()?,
        };
        Some(oid.to_string())
    }
}

fn commit_info(commit: &Commit) -> CommitInfo {
    CommitInfo {
        full_hash: commit.id().to_string(),
        message: commit.summary().unwrap_or_default().to_string(),
        date: format_git_time(commit.author().when()),
    }
}

/// Renders a git timestamp in its own offset, e.g. `2024-03-01 18:22:05 +0100`.
pub fn format_git_time(time: git2::Time) -> String {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .map(|utc| utc.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %z").to_string())
        .unwrap_or_default()
}
