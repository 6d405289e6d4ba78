// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation engine.
//!
//! The keeper keeps the objects of one Grafana instance in step with the
//! files of one work directory. It operates in one of two modes that are
//! chosen once at startup.
//!
//! # Snapshot Mode
//!
//! Lists every datasource and dashboard, and saves each of them to the work
//! directory. Any failure is fatal, because this mode is meant to be run
//! once by hand, e.g., before running the keeper for the first time.
//!
//! # Keep Mode
//!
//! Keep mode starts with a __bootstrap__ that makes the work directory the
//! source of truth:
//!
//! 1. Delete every datasource and dashboard in Grafana.
//! 2. Create every datasource and dashboard found in the work directory.
//! 3. Record the checksum of every object now present in Grafana.
//!
//! If any stage fails, the whole bootstrap is abandoned and started over from
//! stage one after the retry interval. Partial progress is never resumed,
//! since a half loaded Grafana is not a valid baseline.
//!
//! Once bootstrapped, the keeper __polls__ Grafana once per interval forever.
//! Each pass fetches every object, and compares its checksum against the
//! [`ChecksumLedger`]. New or changed objects are saved to the work
//! directory. The ledger section of a kind is replaced only when the pass
//! over that kind fully succeeds.

use crate::{
    checksum::{checksum32, PayloadError},
    client::{ClientError, GrafanaClient, ResourceClient},
    ledger::{ChecksumLedger, LedgerSection},
    resource::{ResourceKind, ResourceSummary},
    workdir::{WorkDir, WorkDirError},
};

use indicatif::ProgressBar;
use std::{path::PathBuf, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Default wait between polling passes and bootstrap attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Constant interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between attempts.
    pub interval: Duration,

    /// Maximum number of attempts, unbounded if [`None`].
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Construct unbounded retry policy with constant interval.
    pub fn constant(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Bound number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    fn allows_retry_after(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::constant(DEFAULT_INTERVAL)
    }
}

/// Outcome of one polling pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Files written during the pass.
    pub saved: Vec<PathBuf>,

    /// Kinds whose sub-pass failed and whose ledger section was kept.
    pub failed: Vec<ResourceKind>,
}

/// Reconciliation engine over a Grafana instance and a work directory.
#[derive(Debug)]
pub struct Keeper<C = GrafanaClient>
where
    C: ResourceClient,
{
    client: C,
    workdir: WorkDir,
    retry: RetryPolicy,
    progress: ProgressBar,
}

impl<C> Keeper<C>
where
    C: ResourceClient,
{
    /// Construct new keeper with default retry policy.
    pub fn new(client: C, workdir: WorkDir) -> Self {
        Self {
            client,
            workdir,
            retry: RetryPolicy::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Replace retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Report saved objects through progress bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Borrow resource client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Save every object in Grafana to the work directory.
    ///
    /// Creates the work directory if needed. Existing files are
    /// overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`KeeperError`] on the first failure, no retry is attempted.
    #[instrument(skip(self), level = "debug")]
    pub async fn snapshot(&self) -> Result<Vec<PathBuf>> {
        self.workdir.create()?;

        // INVARIANT: Empty baseline, so every object counts as new.
        let baseline = ChecksumLedger::new();
        let mut saved = Vec::new();
        for kind in ResourceKind::ALL {
            let (_, files) = self.sync_kind(kind, baseline.section(kind)).await?;
            saved.extend(files);
        }
        self.progress.finish_and_clear();

        Ok(saved)
    }

    /// Bootstrap, then poll Grafana once per interval forever.
    ///
    /// # Errors
    ///
    /// - Return [`KeeperError::RetriesExhausted`] if bootstrap gives up, which
    ///   only happens with a bounded retry policy.
    pub async fn keep(&self) -> Result<()> {
        let mut ledger = self.bootstrap().await?;
        loop {
            let (next, report) = self.poll_pass(ledger).await;
            ledger = next;
            debug!(
                "poll pass saved {} objects, tracking {} objects",
                report.saved.len(),
                ledger.len()
            );
            sleep(self.retry.interval).await;
        }
    }

    /// Make work directory the source of truth of Grafana.
    ///
    /// Retries the whole sequence from the delete stage on any failure,
    /// waiting the retry interval between attempts. Returns the checksum
    /// baseline of all objects in Grafana after loading.
    ///
    /// # Errors
    ///
    /// - Return [`KeeperError::RetriesExhausted`] if retry policy is bounded
    ///   and every attempt failed.
    #[instrument(skip(self), level = "debug")]
    pub async fn bootstrap(&self) -> Result<ChecksumLedger> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.bootstrap_once().await {
                Ok(ledger) => {
                    info!("bootstrap done, tracking {} objects", ledger.len());
                    return Ok(ledger);
                }
                Err(error) => {
                    warn!("bootstrap attempt {attempt} failed: {error}");
                    if !self.retry.allows_retry_after(attempt) {
                        return Err(KeeperError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }
                    sleep(self.retry.interval).await;
                }
            }
        }
    }

    /// Run one polling pass over all kinds.
    ///
    /// Kinds are processed concurrently. A failed kind keeps its previous
    /// ledger section and is listed in the report.
    #[instrument(skip(self, ledger), level = "debug")]
    pub async fn poll_pass(&self, mut ledger: ChecksumLedger) -> (ChecksumLedger, PollReport) {
        let (datasources, dashboards) = futures::join!(
            self.sync_kind(
                ResourceKind::DataSource,
                ledger.section(ResourceKind::DataSource)
            ),
            self.sync_kind(
                ResourceKind::Dashboard,
                ledger.section(ResourceKind::Dashboard)
            ),
        );

        let mut report = PollReport::default();
        for (kind, outcome) in [
            (ResourceKind::DataSource, datasources),
            (ResourceKind::Dashboard, dashboards),
        ] {
            match outcome {
                Ok((section, saved)) => {
                    ledger.commit(kind, section);
                    report.saved.extend(saved);
                }
                Err(error) => {
                    error!("save {kind}s error: {error}");
                    report.failed.push(kind);
                }
            }
        }

        (ledger, report)
    }

    async fn bootstrap_once(&self) -> Result<ChecksumLedger> {
        for kind in ResourceKind::ALL {
            self.delete_all(kind).await?;
        }

        for kind in ResourceKind::ALL {
            self.load_all(kind).await?;
        }

        let mut ledger = ChecksumLedger::new();
        for kind in ResourceKind::ALL {
            ledger.commit(kind, self.checksum_all(kind).await?);
        }

        Ok(ledger)
    }

    async fn delete_all(&self, kind: ResourceKind) -> Result<()> {
        for summary in self.list(kind).await? {
            info!("delete {kind}: {:?}", summary.name);
            self.client
                .delete_by_key(kind, &summary.key)
                .await
                .resource_context("delete", kind, &summary.name)?;
        }

        Ok(())
    }

    async fn load_all(&self, kind: ResourceKind) -> Result<()> {
        for path in self.workdir.list_files(kind)? {
            info!("create {kind} from: {:?}", path.display());
            let name = path.to_string_lossy();
            self.client
                .create_from_file(kind, &path)
                .await
                .resource_context("create", kind, &name)?;
        }

        Ok(())
    }

    async fn checksum_all(&self, kind: ResourceKind) -> Result<LedgerSection> {
        let mut section = LedgerSection::new();
        for summary in self.list(kind).await? {
            let (_, checksum) = self.observe(kind, &summary).await?;
            section.insert(summary.key, checksum);
        }

        Ok(section)
    }

    // INVARIANT: Returned section holds exactly the objects listed now.
    async fn sync_kind(
        &self,
        kind: ResourceKind,
        baseline: &LedgerSection,
    ) -> Result<(LedgerSection, Vec<PathBuf>)> {
        let mut section = LedgerSection::new();
        let mut saved = Vec::new();
        for summary in self.list(kind).await? {
            let (payload, checksum) = self.observe(kind, &summary).await?;
            if baseline.get(&summary.key) != Some(&checksum) {
                info!("save {kind}: {:?}", summary.name);
                self.progress.set_message(format!("{kind} {}", summary.name));
                let path = self
                    .workdir
                    .save(kind, &summary, &payload)
                    .await
                    .resource_context("save", kind, &summary.name)?;
                self.progress.inc(1);
                saved.push(path);
            }
            section.insert(summary.key, checksum);
        }

        Ok((section, saved))
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceSummary>> {
        self.client
            .list(kind)
            .await
            .resource_context("list", kind, "all")
    }

    async fn observe(
        &self,
        kind: ResourceKind,
        summary: &ResourceSummary,
    ) -> Result<(Vec<u8>, u32)> {
        let fetched = self
            .client
            .fetch_payload(kind, &summary.key)
            .await
            .resource_context("fetch", kind, &summary.name)?;
        let payload = kind
            .sanitize(fetched)
            .resource_context("sanitize", kind, &summary.name)?;
        let checksum = checksum32(&payload).resource_context("checksum", kind, &summary.name)?;

        Ok((payload, checksum))
    }
}

trait ResourceContext<T> {
    fn resource_context(self, action: &'static str, kind: ResourceKind, name: &str) -> Result<T>;
}

impl<T, E> ResourceContext<T> for std::result::Result<T, E>
where
    E: Into<KeeperError>,
{
    fn resource_context(self, action: &'static str, kind: ResourceKind, name: &str) -> Result<T> {
        self.map_err(|error| KeeperError::Resource {
            action,
            kind,
            name: name.to_string(),
            source: Box::new(error.into()),
        })
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// Grafana API call fails.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Payload has unexpected shape.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Work directory manipulation fails.
    #[error(transparent)]
    WorkDir(#[from] WorkDirError),

    /// Operation on one specific object fails.
    #[error("failed to {action} {kind} {name:?}: {source}")]
    Resource {
        action: &'static str,
        kind: ResourceKind,
        name: String,
        source: Box<KeeperError>,
    },

    /// Bootstrap gave up under bounded retry policy.
    #[error("bootstrap failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: Box<KeeperError>,
    },
}

/// Friendly result alias :3
type Result<T, E = KeeperError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resource::ResourceKey, sanitize::sanitize_dashboard};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::{
        collections::BTreeMap,
        fs::{read_to_string, write},
        path::Path,
        sync::Mutex,
    };

    /// In-memory stand-in for a Grafana instance.
    #[derive(Debug, Default)]
    struct FakeGrafana {
        state: Mutex<FakeState>,
    }

    #[derive(Debug, Default)]
    struct FakeState {
        next_id: i64,
        datasources: BTreeMap<i64, Value>,
        dashboards: BTreeMap<String, Value>,
        fail_create_at: Option<usize>,
        fail_fetch: Option<ResourceKind>,
        fail_list: Option<ResourceKind>,
        creates: usize,
        events: Vec<String>,
    }

    impl FakeGrafana {
        fn put(&self, kind: ResourceKind, body: Value) -> ResourceKey {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            match kind {
                ResourceKind::DataSource => {
                    state.datasources.insert(id, body);
                    ResourceKey::Id(id)
                }
                ResourceKind::Dashboard => {
                    let uid = format!("uid-{id}");
                    state.dashboards.insert(uid.clone(), body);
                    ResourceKey::Uid(uid)
                }
            }
        }

        fn edit(&self, key: &ResourceKey, field: &str, value: Value) {
            let mut state = self.state.lock().unwrap();
            let body = match key {
                ResourceKey::Id(id) => state.datasources.get_mut(id),
                ResourceKey::Uid(uid) => state.dashboards.get_mut(uid),
            };
            body.unwrap()[field] = value;
        }

        fn remove(&self, key: &ResourceKey) {
            let mut state = self.state.lock().unwrap();
            match key {
                ResourceKey::Id(id) => state.datasources.remove(id),
                ResourceKey::Uid(uid) => state.dashboards.remove(uid),
            };
        }

        fn names(&self, kind: ResourceKind) -> Vec<String> {
            let state = self.state.lock().unwrap();
            let bodies: Vec<&Value> = match kind {
                ResourceKind::DataSource => state.datasources.values().collect(),
                ResourceKind::Dashboard => state.dashboards.values().collect(),
            };
            let field = match kind {
                ResourceKind::DataSource => "name",
                ResourceKind::Dashboard => "title",
            };
            bodies
                .into_iter()
                .map(|body| body[field].as_str().unwrap().to_string())
                .collect()
        }

        fn fail_create_at(&self, call: usize) {
            self.state.lock().unwrap().fail_create_at = Some(call);
        }

        fn fail_fetch(&self, kind: Option<ResourceKind>) {
            self.state.lock().unwrap().fail_fetch = kind;
        }

        fn fail_list(&self, kind: Option<ResourceKind>) {
            self.state.lock().unwrap().fail_list = kind;
        }

        fn events(&self) -> Vec<String> {
            self.state.lock().unwrap().events.clone()
        }
    }

    fn slugify(title: &str) -> String {
        title.to_lowercase().replace(' ', "-")
    }

    type ClientResult<T> = std::result::Result<T, ClientError>;

    fn upstream(code: u16) -> ClientError {
        ClientError::UpstreamStatus {
            code,
            message: code.to_string(),
        }
    }

    impl ResourceClient for FakeGrafana {
        async fn list(&self, kind: ResourceKind) -> ClientResult<Vec<ResourceSummary>> {
            let state = self.state.lock().unwrap();
            if state.fail_list == Some(kind) {
                return Err(upstream(401));
            }

            let listing = match kind {
                ResourceKind::DataSource => state
                    .datasources
                    .iter()
                    .map(|(id, body)| json!({"id": id, "name": body["name"]}))
                    .collect::<Vec<_>>(),
                ResourceKind::Dashboard => state
                    .dashboards
                    .iter()
                    .map(|(uid, body)| {
                        let title = body["title"].as_str().unwrap_or_default();
                        json!({"uid": uid, "title": title, "uri": format!("db/{}", slugify(title))})
                    })
                    .collect::<Vec<_>>(),
            };

            Ok(kind.parse_listing(serde_json::to_vec(&listing).unwrap())?)
        }

        async fn fetch_payload(
            &self,
            kind: ResourceKind,
            key: &ResourceKey,
        ) -> ClientResult<Vec<u8>> {
            let state = self.state.lock().unwrap();
            if state.fail_fetch == Some(kind) {
                return Err(upstream(500));
            }

            let payload = match key {
                ResourceKey::Id(id) => {
                    let mut body = state.datasources.get(id).ok_or(upstream(404))?.clone();
                    body["id"] = json!(id);
                    body
                }
                ResourceKey::Uid(uid) => {
                    let mut body = state.dashboards.get(uid).ok_or(upstream(404))?.clone();
                    body["id"] = json!(7);
                    body["uid"] = json!(uid);
                    json!({"meta": {"canSave": true}, "dashboard": body})
                }
            };

            Ok(serde_json::to_vec(&payload).unwrap())
        }

        async fn create_from_payload(
            &self,
            kind: ResourceKind,
            payload: &[u8],
        ) -> ClientResult<()> {
            let mut state = self.state.lock().unwrap();
            state.creates += 1;
            if state.fail_create_at == Some(state.creates) {
                return Err(upstream(500));
            }

            let mut payload: Value = serde_json::from_slice(payload).map_err(PayloadError::from)?;
            state.next_id += 1;
            let id = state.next_id;
            match kind {
                ResourceKind::DataSource => {
                    let name = payload["name"].clone();
                    if state.datasources.values().any(|body| body["name"] == name) {
                        return Err(upstream(409));
                    }
                    assert!(payload.get("id").is_none(), "stale datasource id");
                    state.events.push(format!("create datasource {name}"));
                    state.datasources.insert(id, payload);
                }
                ResourceKind::Dashboard => {
                    let body = payload["dashboard"].take();
                    assert_eq!(body["uid"], Value::Null, "stale dashboard uid");
                    state.events.push(format!("create dashboard {}", body["title"]));
                    state.dashboards.insert(format!("uid-{id}"), body);
                }
            }

            Ok(())
        }

        async fn delete_by_key(
            &self,
            kind: ResourceKind,
            key: &ResourceKey,
        ) -> ClientResult<()> {
            let mut state = self.state.lock().unwrap();
            let removed = match key {
                ResourceKey::Id(id) => state.datasources.remove(id),
                ResourceKey::Uid(uid) => state.dashboards.remove(uid),
            };
            let body = removed.ok_or(upstream(404))?;
            let name = match kind {
                ResourceKind::DataSource => &body["name"],
                ResourceKind::Dashboard => &body["title"],
            };
            state.events.push(format!("delete {kind} {name}"));

            Ok(())
        }
    }

    fn keeper(workdir: &Path) -> Keeper<FakeGrafana> {
        Keeper::new(FakeGrafana::default(), WorkDir::new(workdir))
            .with_retry(RetryPolicy::constant(Duration::ZERO).with_max_attempts(3))
    }

    fn write_datasource(workdir: &Path, name: &str) {
        let body = json!({"name": name, "type": "prometheus", "url": "http://prom:9090"});
        write(
            workdir.join(format!("{name}-datasource.json")),
            body.to_string(),
        )
        .unwrap();
    }

    fn write_dashboard(workdir: &Path, title: &str) {
        let body = json!({"dashboard": {"id": null, "uid": null, "title": title, "panels": []}});
        write(
            workdir.join(format!("{}-dashboard.json", slugify(title))),
            body.to_string(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn bootstrap_loads_work_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_datasource(dir.path(), "prometheus");
        write_dashboard(dir.path(), "Node Exporter");
        let keeper = keeper(dir.path());

        let ledger = keeper.bootstrap().await?;
        let grafana = keeper.client();
        assert_eq!(grafana.names(ResourceKind::DataSource), vec!["prometheus"]);
        assert_eq!(grafana.names(ResourceKind::Dashboard), vec!["Node Exporter"]);
        assert_eq!(ledger.len(), 2);

        for kind in ResourceKind::ALL {
            for summary in grafana.list(kind).await? {
                let payload = kind.sanitize(grafana.fetch_payload(kind, &summary.key).await?)?;
                assert_eq!(ledger.get(kind, &summary.key), Some(checksum32(&payload)?));
            }
        }

        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_replaces_existing_objects() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_datasource(dir.path(), "prometheus");
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        grafana.put(ResourceKind::DataSource, json!({"name": "prometheus"}));
        grafana.put(ResourceKind::Dashboard, json!({"title": "Stale"}));

        let ledger = keeper.bootstrap().await?;
        assert_eq!(grafana.names(ResourceKind::DataSource), vec!["prometheus"]);
        assert!(grafana.names(ResourceKind::Dashboard).is_empty());
        assert_eq!(ledger.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_restarts_from_delete_stage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_datasource(dir.path(), "alpha");
        write_datasource(dir.path(), "beta");
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        grafana.put(ResourceKind::DataSource, json!({"name": "old"}));
        grafana.fail_create_at(2);

        keeper.bootstrap().await?;
        assert_eq!(grafana.names(ResourceKind::DataSource), vec!["alpha", "beta"]);

        let expect = vec![
            r#"delete datasource "old""#,
            r#"create datasource "alpha""#,
            r#"delete datasource "alpha""#,
            r#"create datasource "alpha""#,
            r#"create datasource "beta""#,
        ];
        assert_eq!(grafana.events(), expect);

        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_gives_up_under_bounded_policy() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_dashboard(dir.path(), "Broken");
        let keeper = keeper(dir.path());
        keeper.client().fail_fetch(Some(ResourceKind::Dashboard));

        let result = keeper.bootstrap().await;
        assert!(matches!(
            result,
            Err(KeeperError::RetriesExhausted { attempts: 3, .. })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn poll_pass_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        grafana.put(ResourceKind::DataSource, json!({"name": "loki"}));
        grafana.put(ResourceKind::Dashboard, json!({"title": "Logs"}));

        let (ledger, report) = keeper.poll_pass(ChecksumLedger::new()).await;
        assert_eq!(report.saved.len(), 2);
        assert!(report.failed.is_empty());

        let (next, report) = keeper.poll_pass(ledger.clone()).await;
        assert!(report.saved.is_empty());
        assert_eq!(next, ledger);

        Ok(())
    }

    #[tokio::test]
    async fn poll_pass_saves_changed_objects_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        grafana.put(ResourceKind::DataSource, json!({"name": "loki"}));
        let key = grafana.put(ResourceKind::Dashboard, json!({"title": "Logs", "refresh": "5s"}));

        let (ledger, _) = keeper.poll_pass(ChecksumLedger::new()).await;
        let before = ledger.get(ResourceKind::Dashboard, &key);

        grafana.edit(&key, "refresh", json!("1m"));
        let (ledger, report) = keeper.poll_pass(ledger).await;
        assert_eq!(report.saved, vec![dir.path().join("logs-dashboard.json")]);

        let payload = sanitize_dashboard(
            grafana
                .fetch_payload(ResourceKind::Dashboard, &key)
                .await?,
        )?;
        let after = ledger.get(ResourceKind::Dashboard, &key);
        assert_ne!(after, before);
        assert_eq!(after, Some(checksum32(&payload)?));

        let saved: Value = serde_json::from_str(&read_to_string(&report.saved[0])?)?;
        assert_eq!(saved["dashboard"]["refresh"], json!("1m"));
        assert_eq!(saved["dashboard"]["uid"], Value::Null);

        Ok(())
    }

    #[tokio::test]
    async fn poll_pass_drops_deleted_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        let gone = grafana.put(ResourceKind::DataSource, json!({"name": "loki"}));
        let kept = grafana.put(ResourceKind::DataSource, json!({"name": "tempo"}));

        let (ledger, _) = keeper.poll_pass(ChecksumLedger::new()).await;
        assert!(ledger.get(ResourceKind::DataSource, &gone).is_some());

        grafana.remove(&gone);
        let (ledger, report) = keeper.poll_pass(ledger).await;
        assert!(report.saved.is_empty());
        assert_eq!(ledger.get(ResourceKind::DataSource, &gone), None);
        assert!(ledger.get(ResourceKind::DataSource, &kept).is_some());
        assert_eq!(ledger.section(ResourceKind::DataSource).len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn failed_pass_keeps_ledger_section() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        let datasource = grafana.put(ResourceKind::DataSource, json!({"name": "loki"}));
        let dashboard = grafana.put(ResourceKind::Dashboard, json!({"title": "Logs"}));

        let (ledger, _) = keeper.poll_pass(ChecksumLedger::new()).await;
        let baseline = ledger.section(ResourceKind::Dashboard).clone();

        grafana.edit(&datasource, "url", json!("http://loki:3100"));
        grafana.edit(&dashboard, "refresh", json!("1m"));
        grafana.fail_fetch(Some(ResourceKind::Dashboard));
        let (ledger, report) = keeper.poll_pass(ledger).await;
        assert_eq!(report.failed, vec![ResourceKind::Dashboard]);
        assert_eq!(report.saved, vec![dir.path().join("loki-datasource.json")]);
        assert_eq!(ledger.section(ResourceKind::Dashboard), &baseline);

        // Next pass compares against the same baseline.
        grafana.fail_fetch(None);
        let (_, report) = keeper.poll_pass(ledger).await;
        assert_eq!(report.saved, vec![dir.path().join("logs-dashboard.json")]);

        Ok(())
    }

    #[tokio::test]
    async fn snapshot_saves_everything() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workdir = dir.path().join("objects");
        let keeper = keeper(&workdir);
        let grafana = keeper.client();
        grafana.put(ResourceKind::DataSource, json!({"name": "loki", "type": "loki"}));
        grafana.put(ResourceKind::Dashboard, json!({"title": "Node Exporter"}));

        let saved = keeper.snapshot().await?;
        let expect = vec![
            workdir.join("loki-datasource.json"),
            workdir.join("node-exporter-dashboard.json"),
        ];
        assert_eq!(saved, expect);

        let datasource: Value = serde_json::from_str(&read_to_string(&saved[0])?)?;
        assert_eq!(datasource, json!({"name": "loki", "type": "loki"}));

        // Saved files are replayable.
        let keeper = keeper.with_retry(RetryPolicy::constant(Duration::ZERO).with_max_attempts(1));
        keeper.bootstrap().await?;
        assert_eq!(keeper.client().names(ResourceKind::DataSource), vec!["loki"]);
        assert_eq!(
            keeper.client().names(ResourceKind::Dashboard),
            vec!["Node Exporter"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn snapshot_fails_fast() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        let grafana = keeper.client();
        grafana.put(ResourceKind::Dashboard, json!({"title": "Logs"}));
        grafana.fail_fetch(Some(ResourceKind::Dashboard));

        let result = keeper.snapshot().await;
        assert!(matches!(
            result,
            Err(KeeperError::Resource {
                action: "fetch",
                kind: ResourceKind::Dashboard,
                ..
            })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_names_kind_of_failed_listing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let keeper = keeper(dir.path());
        keeper.client().fail_list(Some(ResourceKind::Dashboard));

        let error = match keeper.bootstrap().await {
            Err(KeeperError::RetriesExhausted { source, .. }) => *source,
            other => anyhow::bail!("unexpected bootstrap outcome: {other:?}"),
        };
        assert!(matches!(
            error,
            KeeperError::Resource {
                action: "list",
                kind: ResourceKind::Dashboard,
                ..
            }
        ));
        assert!(error.to_string().contains("[Invalid credentials]"));

        Ok(())
    }
}
