#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident data port.
//!
//! The map engine never fetches data itself. Whatever owns the incident
//! list (the HTTP client of the dashboard, a JSON export, a test fixture)
//! implements [`IncidentSource`] and hands the engine the current,
//! already-filtered list.

use std::path::{Path, PathBuf};

use incident_map_incident_models::Incident;
use serde::Deserialize;

/// Errors that can occur while reading incidents.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file read).
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Supplies the current incident list.
pub trait IncidentSource {
    /// Returns a short identifier for this source (used in log lines).
    fn id(&self) -> &'static str;

    /// Returns the current (already filtered) incident list.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the incidents cannot be read or decoded.
    fn incidents(&self) -> Result<Vec<Incident>, SourceError>;
}

/// Body shapes accepted from an incident export: either a bare array or a
/// paginated `{ "count": .., "results": [..] }` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum IncidentPayload {
    List(Vec<Incident>),
    Page { results: Vec<Incident> },
}

/// Parses an incident export.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the body is neither an incident array
/// nor a paginated envelope.
pub fn parse_incidents(body: &str) -> Result<Vec<Incident>, SourceError> {
    let payload: IncidentPayload = serde_json::from_str(body)?;
    Ok(match payload {
        IncidentPayload::List(incidents) | IncidentPayload::Page { results: incidents } => {
            incidents
        }
    })
}

/// Reads incidents from a JSON export on disk.
///
/// The file is re-read on every call, so edits show up on the next
/// rebuild.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Creates a source reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the export file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IncidentSource for JsonFileSource {
    fn id(&self) -> &'static str {
        "json_file"
    }

    fn incidents(&self) -> Result<Vec<Incident>, SourceError> {
        let body = std::fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let incidents = parse_incidents(&body)?;
        log::debug!(
            "Read {} incidents from {}",
            incidents.len(),
            self.path.display()
        );
        Ok(incidents)
    }
}

/// A fixed, in-memory incident list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    incidents: Vec<Incident>,
}

impl StaticSource {
    /// Creates a source that always returns `incidents`.
    #[must_use]
    pub const fn new(incidents: Vec<Incident>) -> Self {
        Self { incidents }
    }

    /// Replaces the list returned by subsequent calls.
    pub fn replace(&mut self, incidents: Vec<Incident>) {
        self.incidents = incidents;
    }
}

impl IncidentSource for StaticSource {
    fn id(&self) -> &'static str {
        "static"
    }

    fn incidents(&self) -> Result<Vec<Incident>, SourceError> {
        Ok(self.incidents.clone())
    }
}
