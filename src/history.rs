// src/history.rs
//
// Commit-indexed error trend. Entries are only ever appended; when local
// history is rewritten the log is cut back to the upstream commit and the
// local commits are replayed.

use crate::aggregate::{self, FrameSource};
use crate::artifact;
use crate::error::Result;
use crate::model::{CommitInfo, ErrorCode, HistoryEntry, HistoryLog, ResultSet, Stats};
use crate::vcs::VersionControl;
use std::collections::{BTreeSet, HashSet};

/// What an update did to the log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub rebuilt: bool,
    pub truncated: usize,
    pub appended: Vec<String>,
    pub skipped: usize,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        self.truncated > 0 || !self.appended.is_empty()
    }
}

pub struct HistoryStore<'a, V: VersionControl> {
    vcs: &'a V,
    baseline_path: &'a str,
    dumps_dir: &'a str,
    ignored: &'a BTreeSet<ErrorCode>,
}

/// Dumps as they were at a given commit
struct CommitDumps<'a, V: VersionControl> {
    vcs: &'a V,
    commit: &'a str,
    dumps_dir: &'a str,
}

impl<V: VersionControl> FrameSource for CommitDumps<'_, V> {
    fn dump_content(&self, version: &str, name: &str) -> Option<String> {
        let path = format!("{}/{version}/{name}.json", self.dumps_dir.trim_end_matches('/'));
        self.vcs.file_at_commit(self.commit, &path)
    }
}

impl<'a, V: VersionControl> HistoryStore<'a, V> {
    pub fn new(vcs: &'a V, baseline_path: &'a str, dumps_dir: &'a str, ignored: &'a BTreeSet<ErrorCode>) -> Self {
        Self { vcs, baseline_path, dumps_dir, ignored }
    }

    /// Brings the trend up to date with the current branch. An empty trend is rebuilt
    /// from every commit that touched the baseline.
    pub fn update(&self, trend: &mut HistoryLog) -> Result<UpdateOutcome> {
        let mut outcome = UpdateOutcome { rebuilt: trend.is_empty(), ..UpdateOutcome::default() };

        let commits = if outcome.rebuilt {
            log::info!("no history found, rebuilding from all commits");
            self.vcs.commits_touching(self.baseline_path, None)?
        } else {
            match self.vcs.resolve_upstream() {
                Some(upstream) => {
                    let local = self.vcs.commits_touching(self.baseline_path, Some(&upstream))?;
                    outcome.truncated = truncate_after(trend, &upstream) + truncate_replayed(trend, &local);
                    if outcome.truncated > 0 {
                        log::info!("truncated {} entries after upstream", outcome.truncated);
                    }
                    local
                }
                None => {
                    log::warn!("no upstream branch, leaving history as is");
                    Vec::new()
                }
            }
        };

        let mut known: HashSet<String> = trend.iter().map(|e| e.full_hash.clone()).collect();
        for commit in &commits {
            match self.entry_for(commit, trend.last()) {
                Some(entry) if known.insert(entry.full_hash.clone()) => {
                    log::info!("added {}: {}", entry.short_hash, entry.message);
                    outcome.appended.push(entry.full_hash.clone());
                    trend.push(entry);
                }
                _ => outcome.skipped += 1,
            }
        }
        Ok(outcome)
    }

    fn entry_for(&self, commit: &CommitInfo, last: Option<&HistoryEntry>) -> Option<HistoryEntry> {
        let stats = self.stats_at(&commit.full_hash)?;
        if stats.frame_count == 0 {
            log::debug!("{}: no frames, skipping", commit.full_hash);
            return None;
        }
        if last.is_some_and(|e| e.stats() == stats) {
            return None;
        }
        Some(HistoryEntry::new(commit, stats))
    }

    /// Recomputes the baseline statistic as of `commit`. `None` when the
    /// baseline is missing or unreadable there.
    pub fn stats_at(&self, commit: &str) -> Option<Stats> {
        let content = self.vcs.file_at_commit(commit, self.baseline_path)?;
        let results: ResultSet = match artifact::decode(&content, self.baseline_path) {
            Ok(results) => results,
            Err(e) => {
                log::warn!("{commit}: {e}");
                return None;
            }
        };
        let dumps = CommitDumps { vcs: self.vcs, commit, dumps_dir: self.dumps_dir };
        Some(aggregate::compute_stats(&results, self.ignored, &dumps))
    }
}

/// Drops every entry after the one for `upstream`. Returns how many were dropped.
fn truncate_after(trend: &mut HistoryLog, upstream: &str) -> usize {
    match trend.iter().position(|e| e.full_hash == upstream) {
        Some(idx) => {
            let dropped = trend.len() - (idx + 1);
            trend.truncate(idx + 1);
            dropped
        }
        None => 0,
    }
}

/// Drops the tail starting at the first entry for a commit that is about to be
/// replayed. Covers an upstream commit that was itself never recorded.
fn truncate_replayed(trend: &mut HistoryLog, replayed: &[CommitInfo]) -> usize {
    let hashes: HashSet<&str> = replayed.iter().map(|c| c.full_hash.as_str()).collect();
    match trend.iter().position(|e| hashes.contains(e.full_hash.as_str())) {
        Some(idx) => {
            let dropped = trend.len() - idx;
            trend.truncate(idx);
            dropped
        }
        None => 0,
    }
}

/// Entry describing an accepted but not yet committed baseline.
pub fn pending_entry(stats: Stats, date: String) -> HistoryEntry {
    let commit = CommitInfo { full_hash: "pending".into(), message: "pending changes".into(), date };
    HistoryEntry::new(&commit, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const BASELINE: &str = "tests/current_results.json";
    const DUMPS: &str = "tests/dumps";

    #[derive(Default)]
    struct FakeVcs {
        commits: Vec<CommitInfo>,
        files: HashMap<(String, String), String>,
        upstream: Option<String>,
    }

    impl FakeVcs {
        /// Adds a commit whose baseline reports `errors` type-0 errors over one dump of `frames` frames.
        fn commit(&mut self, hash: &str, errors: u64, frames: usize) {
            self.commits.push(CommitInfo {
                full_hash: hash.into(),
                message: format!("commit {hash}"),
                date: "2024-01-01 00:00:00 +0000".into(),
            });
            let baseline = format!(
                "var currentResults =\n[{{\"testName\":\"t\",\"testVersion\":\"38\",\"finished\":true,\
                 \"errorTypes\":[{{\"count\":{errors},\"firstFrame\":0,\"lastFrame\":0}}]}}];\n"
            );
            let dump = format!("[{}]", vec!["{}"; frames].join(","));
            self.files.insert((hash.into(), BASELINE.into()), baseline);
            self.files.insert((hash.into(), format!("{DUMPS}/38/t.json")), dump);
        }

        fn rewrite_tail(&mut self, keep: usize) {
            self.commits.truncate(keep);
        }
    }

    impl VersionControl for FakeVcs {
        fn file_at_commit(&self, commit: &str, path: &str) -> Option<String> {
            self.files.get(&(commit.to_string(), path.to_string())).cloned()
        }

        fn commits_touching(&self, _path: &str, since: Option<&str>) -> Result<Vec<CommitInfo>> {
            let start = match since {
                Some(hash) => self.commits.iter().position(|c| c.full_hash == hash).map_or(0, |i| i + 1),
                None => 0,
            };
            Ok(self.commits[start..].to_vec())
        }

        fn resolve_upstream(&self) -> Option<String> {
            self.upstream.clone()
        }
    }

    fn ignored() -> BTreeSet<ErrorCode> {
        BTreeSet::from([1, 2, 3, 4])
    }

    fn hashes(log: &HistoryLog) -> Vec<&str> {
        log.iter().map(|e| e.full_hash.as_str()).collect()
    }

    #[test]
    fn rebuilds_empty_log_from_all_commits() {
        let mut vcs = FakeVcs::default();
        vcs.commit("aaaaaaaaaa", 5, 1000);
        vcs.commit("bbbbbbbbbb", 6, 1000);
        let ignored = ignored();
        let store = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored);
        let mut log = HistoryLog::new();
        let outcome = store.update(&mut log).unwrap();
        assert!(outcome.rebuilt);
        assert_eq!(hashes(&log), vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
        assert_eq!(log[0].short_hash, "aaaaaaaa");
        assert_eq!(log[1].error_percent, 0.6);
    }

    #[test]
    fn identical_stats_are_not_appended() {
        let mut vcs = FakeVcs::default();
        vcs.commit("c1", 5, 1000);
        vcs.commit("c2", 5, 1000);
        vcs.commit("c3", 5, 1001);
        vcs.upstream = Some("c1".into());
        let ignored = ignored();
        let store = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored);

        let mut log = vec![HistoryEntry::new(&vcs.commits[0], Stats { error_count: 5, frame_count: 1000 })];
        let outcome = store.update(&mut log).unwrap();
        assert_eq!(hashes(&log), vec!["c1", "c3"]);
        assert_eq!(outcome.skipped, 1);
        for pair in log.windows(2) {
            assert_ne!(pair[0].stats(), pair[1].stats());
        }
    }

    #[test]
    fn zero_frame_and_unreadable_commits_are_skipped() {
        let mut vcs = FakeVcs::default();
        vcs.commit("good", 1, 10);
        vcs.commit("empty", 2, 0);
        vcs.commit("broken", 3, 10);
        vcs.files.insert(("broken".into(), BASELINE.into()), "var currentResults = {oops".into());
        vcs.commits.push(CommitInfo { full_hash: "missing".into(), message: String::new(), date: String::new() });
        let ignored = ignored();
        let store = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored);
        let mut log = HistoryLog::new();
        let outcome = store.update(&mut log).unwrap();
        assert_eq!(hashes(&log), vec!["good"]);
        assert_eq!(outcome.skipped, 3);
    }

    #[test]
    fn rebased_local_entries_are_replaced() {
        let mut vcs = FakeVcs::default();
        vcs.commit("up", 1, 100);
        vcs.commit("old-local", 2, 100);
        vcs.upstream = Some("up".into());
        let ignored = ignored();

        let mut log = HistoryLog::new();
        HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
        assert_eq!(hashes(&log), vec!["up", "old-local"]);

        vcs.rewrite_tail(1);
        vcs.commit("new-local", 3, 100);
        let outcome = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
        assert_eq!(outcome.truncated, 1);
        assert_eq!(hashes(&log), vec!["up", "new-local"]);
    }

    #[test]
    fn repeated_updates_are_no_ops() {
        let mut vcs = FakeVcs::default();
        vcs.commit("base", 1, 100);
        vcs.commit("x", 2, 100);
        vcs.commit("y", 3, 100);
        let ignored = ignored();
        let mut log = HistoryLog::new();
        HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();

        // upstream points at a commit that never made it into the log
        vcs.upstream = Some("base".into());
        vcs.files.insert(("base".into(), BASELINE.into()), "not json".into());
        let mut log = vec![log[1].clone(), log[2].clone()];
        let snapshot = log.clone();
        for _ in 0..2 {
            HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
            assert_eq!(log, snapshot);
        }
    }

    #[test]
    fn skipped_local_commit_stays_skipped_on_rerun() {
        let mut vcs = FakeVcs::default();
        vcs.commit("up", 1, 100);
        vcs.commit("dup", 1, 100);
        vcs.commit("next", 2, 100);
        let ignored = ignored();
        let mut log = HistoryLog::new();
        HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
        assert_eq!(hashes(&log), vec!["up", "next"]);

        // upstream is the skipped commit, so it is not in the log
        vcs.upstream = Some("dup".into());
        for _ in 0..2 {
            HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
            assert_eq!(hashes(&log), vec!["up", "next"]);
        }
    }

    #[test]
    fn missing_upstream_leaves_log_untouched() {
        let mut vcs = FakeVcs::default();
        vcs.commit("a", 1, 100);
        vcs.commit("b", 2, 100);
        let ignored = ignored();
        let mut log = vec![HistoryEntry::new(&vcs.commits[0], Stats { error_count: 1, frame_count: 100 })];
        let outcome = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored).update(&mut log).unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn ignored_codes_do_not_count_towards_history() {
        let mut vcs = FakeVcs::default();
        vcs.commit("a", 7, 100);
        let ignored = BTreeSet::from([0]);
        let store = HistoryStore::new(&vcs, BASELINE, DUMPS, &ignored);
        assert_eq!(store.stats_at("a"), Some(Stats { error_count: 0, frame_count: 100 }));
        assert_eq!(store.stats_at("nope"), None);
    }

    #[test]
    fn pending_entry_is_marked() {
        let entry = pending_entry(Stats { error_count: 1, frame_count: 4 }, "now".into());
        assert_eq!(entry.short_hash, "pending");
        assert_eq!(entry.error_percent, 25.0);
    }
}
