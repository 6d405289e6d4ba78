// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Work directory management.
//!
//! Grafana-keeper keeps every Grafana object as a JSON file in one flat
//! directory called the __work directory__. The work directory is meant to
//! be kept under version control, so that the state of Grafana can always be
//! reproduced from it.
//!
//! # Work Directory Layout
//!
//! Only the top-level of the work directory is evaluated. Datasources live in
//! files named `<name>-datasource.json`, and dashboards live in files named
//! `<slug>-dashboard.json`. Any other file is ignored. Each file holds the
//! sanitized payload of its object, pretty-printed with tab indentation.

use crate::{
    checksum::PayloadError,
    resource::{ResourceKind, ResourceSummary},
};

use glob::Pattern;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use std::path::{Path, PathBuf};
use tokio::fs::write;
use tracing::debug;

/// Flat directory of Grafana object files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Construct new work directory handle.
    ///
    /// Does not check if the path actually exists.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Treat work directory as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.path.as_path()
    }

    /// Create work directory and any missing parents.
    ///
    /// # Errors
    ///
    /// - Return [`WorkDirError::CreateDir`] if directory cannot be created.
    pub fn create(&self) -> Result<()> {
        if let Some(created) = mkdirp::mkdirp(&self.path).map_err(|source| {
            WorkDirError::CreateDir {
                source,
                path: self.path.clone(),
            }
        })? {
            debug!("created work directory {:?}", created.display());
        }

        Ok(())
    }

    /// List files of target kind in alphabetical order.
    ///
    /// A missing work directory contains no files.
    ///
    /// # Errors
    ///
    /// - Return [`WorkDirError::Pattern`] if glob pattern is invalid.
    /// - Return [`WorkDirError::Glob`] if a matching entry cannot be read.
    pub fn list_files(&self, kind: ResourceKind) -> Result<Vec<PathBuf>> {
        // INVARIANT: Escape work directory so that only the file pattern globs.
        let escaped = Pattern::escape(&self.path.to_string_lossy());
        let pattern = Path::new(&escaped)
            .join(kind.file_pattern())
            .to_string_lossy()
            .into_owned();

        let mut files = Vec::new();
        for entry in glob::glob(&pattern).map_err(|source| WorkDirError::Pattern {
            source,
            pattern: pattern.clone(),
        })? {
            files.push(entry?);
        }

        Ok(files)
    }

    /// Determine path to file of listed object.
    pub fn file_path(&self, kind: ResourceKind, summary: &ResourceSummary) -> PathBuf {
        self.path.join(kind.file_name(summary))
    }

    /// Write payload of listed object to its file.
    ///
    /// Overwrites existing file. Payload is pretty-printed with tab
    /// indentation before it is written.
    ///
    /// # Errors
    ///
    /// - Return [`WorkDirError::Payload`] if payload is not valid JSON.
    /// - Return [`WorkDirError::Write`] if file cannot be written.
    pub async fn save(
        &self,
        kind: ResourceKind,
        summary: &ResourceSummary,
        payload: impl AsRef<[u8]>,
    ) -> Result<PathBuf> {
        let path = self.file_path(kind, summary);
        let contents = pretty_json(payload.as_ref())?;
        write(&path, contents)
            .await
            .map_err(|source| WorkDirError::Write {
                source,
                path: path.clone(),
            })?;

        Ok(path)
    }
}

fn pretty_json(payload: &[u8]) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(payload).map_err(PayloadError::Malformed)?;
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"\t");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(PayloadError::Malformed)?;

    Ok(buffer)
}

/// Work directory error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkDirError {
    /// Glob pattern for work directory files is invalid.
    #[error("invalid file pattern {pattern:?}: {source}")]
    Pattern {
        source: glob::PatternError,
        pattern: String,
    },

    /// Matched work directory entry cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Work directory cannot be created.
    #[error("failed to create work directory {path:?}: {source}")]
    CreateDir {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Object file cannot be written.
    #[error("failed to write {path:?}: {source}")]
    Write {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Payload cannot be pretty-printed.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Friendly result alias :3
type Result<T, E = WorkDirError> = std::result::Result<T, E>;
