//! JSON-file persistence that lets every stage skip work it has already done.
//!
//! Entries live at `<root>/<stage>/<sanitized-key>.json`. The files are
//! single-writer: running two pipelines against the same cache root at once
//! is not a supported mode.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::Result;

pub struct ResumableStore {
    root: PathBuf,
}

impl ResumableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, stage: &str, key: &str) -> PathBuf {
        self.root
            .join(stage)
            .join(format!("{}.json", sanitize_filename(key)))
    }

    /// Presence of an entry means that stage's work for the key is complete
    /// and must not be redone unless the caller asked for a refresh.
    pub fn has(&self, stage: &str, key: &str) -> bool {
        self.entry_path(stage, key).is_file()
    }

    /// A corrupt entry is logged and reported as a miss so the caller simply
    /// refetches; it never aborts the pipeline.
    pub fn get(&self, stage: &str, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(stage, key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(stage, key, error = %e, "cache entry is corrupt, treating as a miss");
                Ok(None)
            }
        }
    }

    /// Idempotent overwrite. `put` then `get` with the same key returns the
    /// same payload.
    pub fn put(&self, stage: &str, key: &str, payload: &Value) -> Result<()> {
        let path = self.entry_path(stage, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(payload)?)?;
        Ok(())
    }
}

/// Makes an arbitrary identifier safe to use as a file name: characters from
/// `<>:"/\|?*` become `_`, runs of `_` collapse to one, and leading/trailing
/// spaces, dots, and underscores are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut prev_underscore = false;
    for c in replaced.chars() {
        if c == '_' {
            if prev_underscore {
                continue;
            }
            prev_underscore = true;
        } else {
            prev_underscore = false;
        }
        collapsed.push(c);
    }

    collapsed
        .trim_matches(|c| c == ' ' || c == '.' || c == '_')
        .to_string()
}
