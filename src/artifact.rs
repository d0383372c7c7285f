// src/artifact.rs
//
// Result and history artifacts are JSON payloads wrapped in a script-style
// variable assignment (`var name =\n<json>;\n`) so a static page can load them
// directly. This module only deals with that wrapper and file I/O.

use crate::error::{RegressError, Result};
use crate::model::{HistoryEntry, HistoryLog, ResultSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const NEW_RESULTS_VAR: &str = "newResults";
pub const BASELINE_RESULTS_VAR: &str = "currentResults";
pub const HISTORY_VAR: &str = "historyData";
pub const PENDING_VAR: &str = "pendingEntry";

pub fn wrap(var_name: &str, json: &str) -> String {
    format!("var {var_name} =\n{json};\n")
}

/// Strips the `var <name> =` prefix and trailing `;`, returning the JSON payload.
/// Text without a wrapper is returned trimmed, so bare JSON is accepted too.
pub fn unwrap(content: &str) -> &str {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("var ") {
        if let Some(eq) = rest.find('=') {
            body = rest[eq + 1..].trim();
        }
    }
    body.strip_suffix(';').unwrap_or(body).trim_end()
}

pub fn decode<T: DeserializeOwned>(content: &str, context: &str) -> Result<T> {
    serde_json::from_str(unwrap(content)).map_err(|e| RegressError::json(context, e))
}

pub fn encode<T: Serialize + ?Sized>(var_name: &str, value: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| RegressError::json(var_name, e))?;
    Ok(wrap(var_name, &json))
}

/// Reads a wrapped artifact. A missing file is `Ok(None)`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RegressError::io(path, e)),
    };
    decode(&content, &path.display().to_string()).map(Some)
}

pub fn save<T: Serialize + ?Sized>(path: &Path, var_name: &str, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RegressError::io(parent, e))?;
    }
    fs::write(path, encode(var_name, value)?).map_err(|e| RegressError::io(path, e))
}

pub fn load_results(path: &Path) -> Result<Option<ResultSet>> {
    load(path)
}

/// Loads the trend log. An absent, empty or unparsable log is reported as `None`
/// so the caller rebuilds it from scratch.
pub fn load_history(path: &Path) -> Result<Option<HistoryLog>> {
    match load::<HistoryLog>(path) {
        Ok(Some(log)) if !log.is_empty() => Ok(Some(log)),
        Ok(_) => Ok(None),
        Err(RegressError::Json { context, source }) => {
            log::warn!("ignoring unreadable history log {context}: {source}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub fn save_history(path: &Path, history: &[HistoryEntry]) -> Result<()> {
    save(path, HISTORY_VAR, history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorTypeBucket, TestResult};

    #[test]
    fn unwrap_strips_variable_assignment() {
        assert_eq!(unwrap("var newResults =\n[1, 2];\n"), "[1, 2]");
        assert_eq!(unwrap("  [3]  "), "[3]");
        assert_eq!(unwrap("var x=[];"), "[]");
    }

    #[test]
    fn baseline_and_new_share_shape() {
        let results = vec![TestResult {
            test_name: "a".into(),
            test_version: "1".into(),
            finished: true,
            error_types: vec![ErrorTypeBucket { count: 2, first_frame: 3, last_frame: 9 }],
        }];
        let new = encode(NEW_RESULTS_VAR, &results).unwrap();
        let baseline = encode(BASELINE_RESULTS_VAR, &results).unwrap();
        assert!(new.starts_with("var newResults =\n"));
        assert!(baseline.starts_with("var currentResults =\n"));
        let a: ResultSet = decode(&new, "new").unwrap();
        let b: ResultSet = decode(&baseline, "baseline").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_and_broken_history_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        assert!(load_history(&path).unwrap().is_none());

        fs::write(&path, "var historyData = [ {not json ;").unwrap();
        assert!(load_history(&path).unwrap().is_none());

        fs::write(&path, "var historyData =\n[];\n").unwrap();
        assert!(load_history(&path).unwrap().is_none());
    }
}
