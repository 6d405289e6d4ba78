// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep Grafana objects in step with a directory of JSON files.
//!
//! Grafana-keeper was built to run Grafana in an easily replicable manner
//! without the need of a database. Datasources and dashboards live as plain
//! JSON files in a __work directory__ that can be kept under version control.
//!
//! On start the keeper deletes every datasource and dashboard in Grafana, and
//! loads the objects found in the work directory instead. While running, it
//! checks Grafana for new or changed objects once per interval, and saves
//! them back to the work directory. Thus, on restart the last known state is
//! restored automatically.
//!
//! The keeper can also run in __snapshot mode__ to save the current state of
//! Grafana to the work directory and exit. It is useful before the first
//! regular run, since a regular run begins by deleting everything.
//!
//! # See Also
//!
//! 1. [`keeper`] for the reconciliation engine.
//! 2. [`workdir`] for the layout of the work directory.

pub mod checksum;
pub mod client;
pub mod config;
pub mod keeper;
pub mod ledger;
pub mod path;
pub mod resource;
pub mod sanitize;
pub mod workdir;

pub use client::{GrafanaClient, ResourceClient};
pub use config::{KeeperConfig, Mode};
pub use keeper::{Keeper, KeeperError, RetryPolicy};
pub use workdir::WorkDir;
