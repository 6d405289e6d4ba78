// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Grafana resource kinds.
//!
//! Grafana-keeper manages two kinds of objects: datasources and dashboards.
//! Both are reconciled by the same algorithm, but each kind is identified,
//! addressed, named on disk, and sanitized differently. [`ResourceKind`]
//! acts as a small strategy table that supplies these differences, so the
//! reconciliation logic never needs to branch on kind itself.
//!
//! # File Naming
//!
//! | Kind       | Identity key       | File name                   |
//! |------------|--------------------|-----------------------------|
//! | Datasource | integer `id`       | `<name>-datasource.json`    |
//! | Dashboard  | string `uid`       | `<slug>-dashboard.json`     |
//!
//! The slug of a dashboard is its listing `uri` with the `db/` prefix
//! stripped.

use crate::{
    checksum::PayloadError,
    sanitize::{sanitize_dashboard, sanitize_datasource},
};

use serde::Deserialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kind of Grafana object under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Named backend configuration, keyed by integer id.
    DataSource,

    /// Visualization document, keyed by string uid.
    Dashboard,
}

impl ResourceKind {
    /// All kinds in reconciliation order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::DataSource, ResourceKind::Dashboard];

    /// Endpoint that lists every object of this kind.
    pub fn list_endpoint(&self) -> &'static str {
        match self {
            Self::DataSource => "api/datasources",
            Self::Dashboard => "api/search",
        }
    }

    /// Endpoint that accepts creation requests for this kind.
    pub fn create_endpoint(&self) -> &'static str {
        match self {
            Self::DataSource => "api/datasources",
            Self::Dashboard => "api/dashboards/db",
        }
    }

    /// Endpoint to fetch or delete a single object of this kind.
    pub fn item_endpoint(&self, key: &ResourceKey) -> String {
        match self {
            Self::DataSource => format!("api/datasources/{key}"),
            Self::Dashboard => format!("api/dashboards/uid/{key}"),
        }
    }

    /// Suffix shared by all work directory files of this kind.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::DataSource => "-datasource.json",
            Self::Dashboard => "-dashboard.json",
        }
    }

    /// Glob pattern matching all work directory files of this kind.
    pub fn file_pattern(&self) -> String {
        format!("*{}", self.file_suffix())
    }

    /// Determine work directory file name of listed object.
    pub fn file_name(&self, summary: &ResourceSummary) -> String {
        format!("{}{}", summary.slug, self.file_suffix())
    }

    /// Neutralize server-assigned identity of fetched payload.
    ///
    /// # Errors
    ///
    /// - Return [`PayloadError`] if payload does not have the expected shape.
    pub fn sanitize(&self, payload: impl AsRef<[u8]>) -> Result<Vec<u8>, PayloadError> {
        match self {
            Self::DataSource => sanitize_datasource(payload),
            Self::Dashboard => sanitize_dashboard(payload),
        }
    }

    /// Parse listing endpoint response into resource summaries.
    ///
    /// Preserves listing order.
    ///
    /// # Errors
    ///
    /// - Return [`PayloadError::Malformed`] if listing cannot be decoded.
    pub fn parse_listing(
        &self,
        listing: impl AsRef<[u8]>,
    ) -> Result<Vec<ResourceSummary>, PayloadError> {
        let listing = listing.as_ref();
        let summaries: Vec<ResourceSummary> = match self {
            Self::DataSource => serde_json::from_slice::<Vec<DataSourceListing>>(listing)?
                .into_iter()
                .map(ResourceSummary::from)
                .collect(),
            Self::Dashboard => serde_json::from_slice::<Vec<DashboardListing>>(listing)?
                .into_iter()
                .map(ResourceSummary::from)
                .collect(),
        };

        Ok(summaries)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::DataSource => fmt.write_str("datasource"),
            Self::Dashboard => fmt.write_str("dashboard"),
        }
    }
}

/// Identity key of a Grafana object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// Integer id of datasource.
    Id(i64),

    /// Unique id of dashboard.
    Uid(String),
}

impl Display for ResourceKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Id(id) => write!(fmt, "{id}"),
            Self::Uid(uid) => fmt.write_str(uid),
        }
    }
}

/// Minimal listing record of a Grafana object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    /// Identity key.
    pub key: ResourceKey,

    /// Human readable name or title.
    pub name: String,

    /// Stem of the work directory file name.
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct DataSourceListing {
    id: i64,
    name: String,
}

impl From<DataSourceListing> for ResourceSummary {
    fn from(listing: DataSourceListing) -> Self {
        Self {
            key: ResourceKey::Id(listing.id),
            slug: listing.name.clone(),
            name: listing.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DashboardListing {
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    uri: String,
}

impl From<DashboardListing> for ResourceSummary {
    fn from(listing: DashboardListing) -> Self {
        // INVARIANT: Fall back to uid so that dashboards without uri never
        // share the file name "-dashboard.json".
        let slug = match listing.uri.strip_prefix("db/").unwrap_or(&listing.uri) {
            "" => listing.uid.clone(),
            slug => slug.to_string(),
        };

        Self {
            key: ResourceKey::Uid(listing.uid),
            name: listing.title,
            slug,
        }
    }
}
