// src/discovery.rs

use crate::error::{RegressError, Result};
use crate::model::TestCase;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DUMP_EXTENSION: &str = "json";

/// Finds every dump under `root`. The parent directory names the version, the
/// file stem names the test. A missing root is an empty suite.
pub fn discover_tests(root: &Path) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound && dir == root => return Ok(Vec::new()),
            Err(e) => return Err(RegressError::io(&dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| RegressError::io(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| RegressError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if let Some(case) = test_case_for(&path) {
                cases.push(case);
            }
        }
    }

    cases.sort();
    log::debug!("discovered {} test dumps under {}", cases.len(), root.display());
    Ok(cases)
}

fn test_case_for(path: &Path) -> Option<TestCase> {
    if path.extension().and_then(|e| e.to_str()) != Some(DUMP_EXTENSION) {
        return None;
    }
    let name = path.file_stem()?.to_str()?.to_string();
    let version = path.parent()?.file_name()?.to_str()?.to_string();
    Some(TestCase { name, path: path.to_path_buf(), version })
}

/// Lists character directories under the data root, skipping the shared `common` one.
pub fn discover_characters(data_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RegressError::io(data_dir, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RegressError::io(data_dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name != "common" {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Every input whose change should invalidate a cached run.
pub fn input_paths(cases: &[TestCase]) -> Vec<PathBuf> {
    cases.iter().map(|c| c.path.clone()).collect()
}
