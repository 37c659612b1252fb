//! Inventory Reconciler
//!
//! Merges a UISP snapshot into the internal topology: devices first, then
//! links, then line-of-sight rows derived from the links. A run either sees a
//! complete snapshot or changes nothing; once the snapshot is in hand,
//! per-record faults become diagnostics and the batch carries on.

use super::heuristics::{
    NameModelHeuristic, NameSubstitution, NetworkNumberParser, SectorGeometryStrategy,
    DEFAULT_NETWORK_NUMBER_PATTERN,
};
use super::status::StatusPolicy;
use super::{devices, links, topology};
use crate::domain::ports::{InventorySourceRef, TopologyRepositoryRef};
use crate::error::{Error, Result};
use crate::model::NodeId;
use crate::notify::{ChangeEvent, NotificationDispatcher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Days a record must be unseen before it is marked inactive
    pub grace_period_days: u32,
    /// Reactivating a record abandoned longer than this raises a warning
    pub reactivation_warning_days: u32,
    /// UISP device categories that are never mirrored
    pub excluded_categories: Vec<String>,
    /// Wireless mode of devices that are created as sectors
    pub sector_wireless_mode: String,
    /// Replacements applied to device names before parsing
    pub name_substitutions: Vec<NameSubstitution>,
    /// Regex with one capture group holding the network number
    pub network_number_pattern: String,
    /// Deactivate links that vanished from UISP (whole-fleet runs only)
    pub deactivate_missing_links: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 30,
            reactivation_warning_days: 30,
            excluded_categories: vec!["optical".to_string()],
            sector_wireless_mode: "ap-ptmp".to_string(),
            name_substitutions: Vec::new(),
            network_number_pattern: DEFAULT_NETWORK_NUMBER_PATTERN.to_string(),
            deactivate_missing_links: true,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grace_period_days == 0 {
            return Err(Error::Configuration(
                "grace_period_days must be at least 1".into(),
            ));
        }
        NetworkNumberParser::new(
            self.name_substitutions.clone(),
            &self.network_number_pattern,
        )?;
        Ok(())
    }

    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy::new(self.grace_period_days, self.reactivation_warning_days)
    }

    pub fn is_excluded_category(&self, category: Option<&str>) -> bool {
        category
            .map(|c| {
                self.excluded_categories
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(c))
            })
            .unwrap_or(false)
    }
}

// =============================================================================
// Scope and Report
// =============================================================================

/// Which part of the fleet a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    All,
    NetworkNumber(u32),
}

impl std::fmt::Display for ReconcileScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileScope::All => write!(f, "all"),
            ReconcileScope::NetworkNumber(nn) => write!(f, "NN{}", nn),
        }
    }
}

/// A record that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// UISP record the problem is about
    pub subject: String,
    pub message: String,
}

/// Result of a reconcile run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub devices_created: u32,
    pub devices_updated: u32,
    pub links_created: u32,
    pub links_updated: u32,
    pub los_created: u32,
    pub los_updated: u32,
    pub diagnostics: Vec<Diagnostic>,
    pub events: Vec<ChangeEvent>,
}

impl ReconcileReport {
    /// Total records created or updated
    pub fn changes(&self) -> u32 {
        self.devices_created
            + self.devices_updated
            + self.links_created
            + self.links_updated
            + self.los_created
            + self.los_updated
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// =============================================================================
// Run Context
// =============================================================================

/// Everything one run needs, shared by the device, link and LOS passes
pub(crate) struct RunContext<'a> {
    pub repo: &'a TopologyRepositoryRef,
    pub inventory: &'a InventorySourceRef,
    pub dispatcher: &'a NotificationDispatcher,
    pub config: &'a ReconcilerConfig,
    pub parser: &'a NetworkNumberParser,
    pub sectors: &'a dyn SectorGeometryStrategy,
    pub policy: StatusPolicy,
    pub scope: ReconcileScope,
    /// Node the run is scoped to, if scoped and the node exists
    pub scoped_node: Option<NodeId>,
    pub now: DateTime<Utc>,
}

impl RunContext<'_> {
    /// Record an event in the report and hand it to the dispatcher
    pub fn emit(&self, report: &mut ReconcileReport, event: ChangeEvent) {
        self.dispatcher.dispatch(event.clone());
        report.events.push(event);
    }

    /// Turn a per-record failure into a diagnostic
    pub fn diagnose(&self, report: &mut ReconcileReport, subject: &str, err: Error) {
        if err.is_per_record() {
            warn!("Skipping {}: {}", subject, err);
        } else {
            error!("Failed to reconcile {}: {}", subject, err);
        }
        report.diagnostics.push(Diagnostic {
            subject: subject.to_string(),
            message: err.to_string(),
        });
    }

    pub fn is_whole_fleet(&self) -> bool {
        self.scope == ReconcileScope::All
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Mirrors UISP inventory into the topology repository
pub struct Reconciler {
    repo: TopologyRepositoryRef,
    inventory: InventorySourceRef,
    dispatcher: NotificationDispatcher,
    config: ReconcilerConfig,
    parser: NetworkNumberParser,
    sectors: Arc<dyn SectorGeometryStrategy>,
    /// Serializes runs
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        repo: TopologyRepositoryRef,
        inventory: InventorySourceRef,
        dispatcher: NotificationDispatcher,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let parser = NetworkNumberParser::new(
            config.name_substitutions.clone(),
            &config.network_number_pattern,
        )?;

        Ok(Self {
            repo,
            inventory,
            dispatcher,
            config,
            parser,
            sectors: Arc::new(NameModelHeuristic::default()),
            running: Mutex::new(()),
        })
    }

    /// Replace the sector geometry guesser
    pub fn with_sector_strategy(mut self, strategy: Arc<dyn SectorGeometryStrategy>) -> Self {
        self.sectors = strategy;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Reconcile `scope` against the current snapshot
    pub async fn run(&self, scope: ReconcileScope) -> Result<ReconcileReport> {
        self.run_at(scope, Utc::now()).await
    }

    /// Reconcile `scope` as if the current time were `now`
    pub async fn run_at(&self, scope: ReconcileScope, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let _running = self.running.lock().await;
        info!(
            "Starting reconcile run ({}) against {}",
            scope,
            self.inventory.source_name()
        );

        // Nothing is written unless the whole snapshot arrives
        let (snapshot_devices, snapshot_links) =
            futures::try_join!(self.inventory.get_devices(), self.inventory.get_links()).map_err(
                |e| {
                    error!("Aborting reconcile run ({}): inventory fetch failed: {}", scope, e);
                    e
                },
            )?;
        debug!(
            "Fetched {} devices and {} links",
            snapshot_devices.len(),
            snapshot_links.len()
        );

        let scoped_node = match scope {
            ReconcileScope::All => None,
            ReconcileScope::NetworkNumber(nn) => {
                self.repo.find_node_by_number(nn).await?.map(|node| node.id)
            }
        };

        let ctx = RunContext {
            repo: &self.repo,
            inventory: &self.inventory,
            dispatcher: &self.dispatcher,
            config: &self.config,
            parser: &self.parser,
            sectors: self.sectors.as_ref(),
            policy: self.config.status_policy(),
            scope,
            scoped_node,
            now,
        };

        let mut report = ReconcileReport::default();
        devices::sync_devices(&ctx, &snapshot_devices, &mut report).await;
        links::sync_links(&ctx, &snapshot_links, &mut report).await;
        topology::sync_los(&ctx, &mut report).await;

        info!(
            "Finished reconcile run ({}): devices {} created / {} updated, links {} created / {} updated, LOS {} created / {} updated, {} diagnostics",
            scope,
            report.devices_created,
            report.devices_updated,
            report.links_created,
            report.links_updated,
            report.los_created,
            report.los_updated,
            report.diagnostics.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        DeviceDetail, InventoryDevice, InventoryLink, LinkEndpoint, NodeLookup, TopologyRepository,
    };
    use crate::inventory::{SnapshotDocument, SnapshotInventory};
    use crate::model::{
        BuildingId, Device, DeviceStatus, Link, LinkStatus, LinkType, Los, LosSource, Node,
        NodeStatus,
    };
    use crate::notify::{MemoryNotifier, NotifierConfig, RecordKind};
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    fn device(id: &str, name: &str, online: bool) -> InventoryDevice {
        InventoryDevice {
            id: id.into(),
            name: name.into(),
            category: Some("wireless".into()),
            device_type: Some("airMax".into()),
            model: Some("LBE-5AC-Gen2".into()),
            wireless_mode: Some("sta-ptp".into()),
            status: Some(if online { "active" } else { "disconnected" }.into()),
            last_seen: Some(now() - Duration::hours(1)),
            created_at: Some(now() - Duration::days(100)),
        }
    }

    fn wireless_link(id: &str, from: &str, to: &str, frequency: u32, active: bool) -> InventoryLink {
        InventoryLink {
            id: id.into(),
            kind: "wireless".into(),
            frequency: Some(frequency),
            state: Some(if active { "active" } else { "disconnected" }.into()),
            from: LinkEndpoint::for_device(from),
            to: LinkEndpoint::for_device(to),
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        inventory: Arc<SnapshotInventory>,
        sink: Arc<MemoryNotifier>,
        dispatcher: NotificationDispatcher,
        reconciler: Reconciler,
        buildings: HashMap<u32, BuildingId>,
    }

    impl Harness {
        /// Store with nodes 227, 1340 and 713, each on its own building
        fn new(snapshot: SnapshotDocument) -> Self {
            let store = MemoryStore::new();
            let mut buildings = HashMap::new();
            for nn in [227, 1340, 713] {
                let building = BuildingId::new();
                buildings.insert(nn, building);
                store
                    .put_node(Node::new(Some(nn), NodeStatus::Active).with_building(building))
                    .unwrap();
            }

            let inventory = Arc::new(SnapshotInventory::new(snapshot));
            let sink = Arc::new(MemoryNotifier::new());
            let dispatcher = NotificationDispatcher::new(sink.clone(), NotifierConfig::default());
            let reconciler = Reconciler::new(
                store.clone(),
                inventory.clone(),
                dispatcher.clone(),
                ReconcilerConfig::default(),
            )
            .unwrap();

            Self {
                store,
                inventory,
                sink,
                dispatcher,
                reconciler,
                buildings,
            }
        }

        async fn run(&self) -> ReconcileReport {
            self.reconciler.run_at(ReconcileScope::All, now()).await.unwrap()
        }

        async fn device(&self, uisp_id: &str) -> Device {
            self.store.find_device_by_uisp_id(uisp_id).await.unwrap().unwrap()
        }

        async fn link(&self, uisp_id: &str) -> Link {
            self.store.find_link_by_uisp_id(uisp_id).await.unwrap().unwrap()
        }
    }

    fn fleet() -> SnapshotDocument {
        SnapshotDocument {
            devices: vec![
                device("d-227", "nycmesh-227-west", true),
                device("d-1340", "nycmesh-1340-east", true),
                device("d-713", "nycmesh-713-north", true),
            ],
            links: vec![
                wireless_link("l-1", "d-227", "d-1340", 5_180, true),
                wireless_link("l-2", "d-1340", "d-713", 61_000, true),
            ],
            details: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_first_run_creates_and_second_run_is_idempotent() {
        let harness = Harness::new(fleet());

        let first = harness.run().await;
        assert_eq!(first.devices_created, 3);
        assert_eq!(first.links_created, 2);
        assert_eq!(first.los_created, 2);
        assert!(first.is_clean());

        assert_eq!(harness.link("l-1").await.link_type, Some(LinkType::FiveGhz));
        assert_eq!(harness.link("l-2").await.link_type, Some(LinkType::SixtyGhz));
        let created = harness.device("d-227").await;
        assert_eq!(created.status, DeviceStatus::Active);
        assert_eq!(created.install_date, Some(today() - Duration::days(100)));

        let second = harness.run().await;
        assert_eq!(second.changes(), 0);
        assert!(second.events.is_empty());
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn test_device_offline_past_grace_goes_inactive() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        let long_gone = now() - Duration::days(31);
        let recently = now() - Duration::days(29);
        snapshot.devices[0].status = Some("disconnected".into());
        snapshot.devices[0].last_seen = Some(long_gone);
        snapshot.devices[1].status = Some("disconnected".into());
        snapshot.devices[1].last_seen = Some(recently);
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.devices_updated, 1);

        let gone = harness.device("d-227").await;
        assert_eq!(gone.status, DeviceStatus::Inactive);
        assert_eq!(gone.abandon_date, Some(long_gone.date_naive()));
        assert_eq!(harness.device("d-1340").await.status, DeviceStatus::Active);

        let event = report
            .events
            .iter()
            .find(|e| e.subject.kind == RecordKind::Device)
            .unwrap();
        assert_eq!(
            event.changes,
            vec!["Marked as Inactive due to it being offline in UISP for more than 30 days"]
        );
    }

    #[tokio::test]
    async fn test_device_comes_back_online() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        let mut inactive = harness.device("d-227").await;
        inactive.status = DeviceStatus::Inactive;
        inactive.abandon_date = Some(today() - Duration::days(200));
        harness.store.save_device(&inactive).await.unwrap();

        snapshot.devices[0].name = "nycmesh-227-southwest".into();
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.devices_updated, 1);

        let device = harness.device("d-227").await;
        assert_eq!(device.status, DeviceStatus::Active);
        assert_eq!(device.abandon_date, None);
        assert_eq!(device.name, "nycmesh-227-southwest");

        let changes = &report.events[0].changes;
        assert_eq!(changes[0], "Changed name from nycmesh-227-west to nycmesh-227-southwest");
        assert_eq!(changes[1], "Marked as Active due to it coming back online in UISP");
        assert!(changes[2].starts_with("Warning: it was abandoned on"));
    }

    #[tokio::test]
    async fn test_unresolvable_devices_become_diagnostics() {
        let mut snapshot = fleet();
        snapshot.devices.push(device("d-x", "office-switch", true));
        snapshot.devices.push(device("d-y", "nycmesh-9999-east", true));
        let mut optical = device("d-z", "nycmesh-227-olt", true);
        optical.category = Some("optical".into());
        snapshot.devices.push(optical);

        let harness = Harness::new(snapshot);
        let report = harness.run().await;

        // Bad rows are skipped, the rest of the batch goes through
        assert_eq!(report.devices_created, 3);
        assert_eq!(report.diagnostics.len(), 2);
        assert!(report.diagnostics[1].message.contains("network number 9999"));
        assert!(harness.store.find_device_by_uisp_id("d-z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_access_point_becomes_sector() {
        let mut snapshot = fleet();
        let mut ap = device("d-ap", "nycmesh-227-northeast", true);
        ap.wireless_mode = Some("ap-ptmp".into());
        ap.model = Some("LAP-120".into());
        snapshot.devices.push(ap);

        let harness = Harness::new(snapshot);
        let report = harness.run().await;

        let sector = harness.device("d-ap").await;
        let geometry = sector.sector.unwrap();
        assert_eq!(geometry.azimuth_deg, 45);
        assert_eq!(geometry.width_deg, 120);

        let event = report
            .events
            .iter()
            .find(|e| e.subject.kind == RecordKind::Sector)
            .unwrap();
        assert!(event.created);
        assert!(event.changes.iter().any(|c| c.contains("please verify")));
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_mutation() {
        let harness = Harness::new(fleet());
        harness.inventory.fail_with("UISP unavailable");

        let result = harness.reconciler.run_at(ReconcileScope::All, now()).await;
        assert_matches!(result, Err(Error::InventoryResponse(_)));
        assert!(harness.store.devices().is_empty());
        assert!(harness.store.links().is_empty());
    }

    #[tokio::test]
    async fn test_link_id_rotation_is_silent() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;
        let original = harness.link("l-1").await;

        snapshot.links[0].id = "l-1-rotated".into();
        // Same pair, reported in the other direction
        let link = &mut snapshot.links[0];
        std::mem::swap(&mut link.from, &mut link.to);
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.links_created, 0);
        assert_eq!(report.changes(), 0);
        assert!(report.events.is_empty());

        let rotated = harness.link("l-1-rotated").await;
        assert_eq!(rotated.id, original.id);
        assert!(harness.store.find_link_by_uisp_id("l-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renamed_device_moves_to_new_node() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        snapshot.devices[0].name = "nycmesh-713-west".into();
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.devices_updated, 1);
        assert!(report.is_clean());

        let event = report
            .events
            .iter()
            .find(|e| e.subject.kind == RecordKind::Device)
            .unwrap();
        assert_eq!(
            event.changes,
            vec![
                "Changed name from nycmesh-227-west to nycmesh-713-west".to_string(),
                "Changed node from NN227 to NN713".to_string(),
            ]
        );

        let node_713 = harness.store.find_node_by_number(713).await.unwrap().unwrap();
        assert_eq!(harness.device("d-227").await.node, node_713.id);

        assert_eq!(harness.run().await.changes(), 0);
    }

    #[tokio::test]
    async fn test_link_frequency_change_updates_type() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        snapshot.links[0].frequency = Some(24_100);
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.links_updated, 1);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].subject.kind, RecordKind::Link);
        assert_eq!(report.events[0].changes, vec!["Changed type from 5 GHz to 24 GHz"]);
        assert_eq!(harness.link("l-1").await.link_type, Some(LinkType::TwentyFourGhz));

        assert_eq!(harness.run().await.changes(), 0);
    }

    #[tokio::test]
    async fn test_link_endpoint_change_is_reported() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;
        let original = harness.link("l-1").await;

        snapshot.links[0].to = LinkEndpoint::for_device("d-713");
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.links_updated, 1);
        assert_eq!(report.links_created, 0);

        let event = report
            .events
            .iter()
            .find(|e| e.subject.kind == RecordKind::Link)
            .unwrap();
        assert_eq!(
            event.changes,
            vec![
                "Changed connected devices from nycmesh-227-west <-> nycmesh-1340-east \
                 to nycmesh-227-west <-> nycmesh-713-north"
                    .to_string()
            ]
        );

        let moved = harness.link("l-1").await;
        assert_eq!(moved.id, original.id);
        assert!(moved.connects(
            harness.device("d-227").await.id,
            harness.device("d-713").await.id
        ));
        // The new building pair gets its own LOS row
        assert_eq!(report.los_created, 1);

        assert_eq!(harness.run().await.changes(), 0);
    }

    #[tokio::test]
    async fn test_link_comes_back_online_with_warning() {
        let harness = Harness::new(fleet());
        harness.run().await;

        let abandoned = today() - Duration::days(200);
        let mut inactive = harness.link("l-1").await;
        inactive.status = LinkStatus::Inactive;
        inactive.abandon_date = Some(abandoned);
        harness.store.save_link(&inactive).await.unwrap();

        let report = harness.run().await;
        assert_eq!(report.links_updated, 1);

        let link = harness.link("l-1").await;
        assert_eq!(link.status, LinkStatus::Active);
        assert_eq!(link.abandon_date, None);

        let event = report
            .events
            .iter()
            .find(|e| e.subject.kind == RecordKind::Link)
            .unwrap();
        assert_eq!(
            event.changes,
            vec![
                "Marked as Active due to it coming back online in UISP".to_string(),
                format!(
                    "Warning: it was abandoned on {} (200 days ago), please verify it is still at this node",
                    abandoned
                ),
            ]
        );

        let second = harness.run().await;
        assert_eq!(second.changes(), 0);
        assert!(second.events.is_empty());
    }

    #[tokio::test]
    async fn test_link_deactivates_on_oldest_endpoint_last_seen() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        let old = now() - Duration::days(45);
        let older = now() - Duration::days(60);
        snapshot.links[0].state = Some("disconnected".into());
        snapshot.details.insert("d-227".into(), DeviceDetail { last_seen: Some(old) });
        snapshot.details.insert("d-1340".into(), DeviceDetail { last_seen: Some(older) });
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.links_updated, 1);

        let link = harness.link("l-1").await;
        assert_eq!(link.status, LinkStatus::Inactive);
        assert_eq!(link.abandon_date, Some(older.date_naive()));
    }

    #[tokio::test]
    async fn test_link_detail_lookup_only_when_needed() {
        let harness = Harness::new(fleet());
        harness.run().await;
        harness.run().await;
        assert_eq!(harness.inventory.detail_requests(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_link_endpoint_is_a_diagnostic() {
        let mut snapshot = fleet();
        snapshot
            .links
            .push(wireless_link("l-ghost", "d-227", "d-missing", 5_500, true));
        snapshot.links.push(InventoryLink {
            kind: "wireless".into(),
            frequency: None,
            ..wireless_link("l-odd", "d-227", "d-713", 0, true)
        });

        let harness = Harness::new(snapshot);
        let report = harness.run().await;
        assert_eq!(report.links_created, 2);
        assert_eq!(report.diagnostics.len(), 2);
        assert!(report.diagnostics[0].message.contains("d-missing"));
        assert!(report.diagnostics[1].message.contains("cannot be classified"));
    }

    #[tokio::test]
    async fn test_vanished_link_is_deactivated_in_full_runs_only() {
        let mut snapshot = fleet();
        let harness = Harness::new(snapshot.clone());
        harness.run().await;

        snapshot.links.remove(1);
        harness.inventory.replace(snapshot);

        let scoped = harness
            .reconciler
            .run_at(ReconcileScope::NetworkNumber(713), now())
            .await
            .unwrap();
        assert_eq!(scoped.links_updated, 0);
        assert_eq!(harness.link("l-2").await.status, LinkStatus::Active);

        let full = harness.run().await;
        assert_eq!(full.links_updated, 1);
        let link = harness.link("l-2").await;
        assert_eq!(link.status, LinkStatus::Inactive);
        assert_eq!(link.abandon_date, Some(today()));
    }

    #[tokio::test]
    async fn test_scoped_run_touches_only_its_node() {
        let harness = Harness::new(fleet());
        let report = harness
            .reconciler
            .run_at(ReconcileScope::NetworkNumber(227), now())
            .await
            .unwrap();

        assert_eq!(report.devices_created, 1);
        // Link l-1 needs d-1340, which this run did not create
        assert_eq!(report.links_created, 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(harness.store.find_device_by_uisp_id("d-1340").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_links_one_los() {
        let mut snapshot = fleet();
        // Second radio pair between the same two nodes
        snapshot.devices.push(device("d-227b", "nycmesh-227-west2", true));
        snapshot.devices.push(device("d-1340b", "nycmesh-1340-east2", true));
        snapshot
            .links
            .push(wireless_link("l-3", "d-227b", "d-1340b", 24_100, true));

        let harness = Harness::new(snapshot);
        let report = harness.run().await;
        assert_eq!(report.links_created, 3);
        assert_eq!(report.los_created, 2);

        let rows = harness
            .store
            .find_los_between(harness.buildings[&227], harness.buildings[&1340])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, LosSource::ExistingLink);
        assert_eq!(rows[0].analysis_date, today());
    }

    #[tokio::test]
    async fn test_human_los_promoted_only_by_active_link() {
        let mut snapshot = fleet();
        snapshot.links[0].state = Some("disconnected".into());
        snapshot.details.insert(
            "d-227".into(),
            DeviceDetail {
                last_seen: Some(now() - Duration::days(90)),
            },
        );

        let harness = Harness::new(snapshot.clone());
        let annotated = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let human = Los::new(
            harness.buildings[&227],
            harness.buildings[&1340],
            LosSource::HumanAnnotated,
            annotated,
        )
        .unwrap();
        harness.store.put_los(human.clone()).unwrap();

        harness.run().await;
        let row = harness
            .store
            .find_los_between(harness.buildings[&1340], harness.buildings[&227])
            .await
            .unwrap()
            .remove(0);
        assert_eq!(row.source, LosSource::HumanAnnotated);
        assert_eq!(row.analysis_date, annotated);

        snapshot.links[0].state = Some("active".into());
        harness.inventory.replace(snapshot);

        let report = harness.run().await;
        assert_eq!(report.los_updated, 1);
        let row = harness
            .store
            .find_los_between(harness.buildings[&227], harness.buildings[&1340])
            .await
            .unwrap()
            .remove(0);
        assert_eq!(row.id, human.id);
        assert_eq!(row.source, LosSource::ExistingLink);
        assert_eq!(row.analysis_date, today());
    }

    #[tokio::test]
    async fn test_inactive_link_los_uses_abandon_date() {
        let mut snapshot = fleet();
        snapshot.links[1].state = Some("disconnected".into());
        let gone = now() - Duration::days(90);
        snapshot
            .details
            .insert("d-713".into(), DeviceDetail { last_seen: Some(gone) });

        let harness = Harness::new(snapshot);
        harness.run().await;

        let link = harness.link("l-2").await;
        assert_eq!(link.status, LinkStatus::Inactive);
        assert_eq!(link.abandon_date, Some(gone.date_naive()));

        let row = harness
            .store
            .find_los_between(harness.buildings[&1340], harness.buildings[&713])
            .await
            .unwrap()
            .remove(0);
        assert_eq!(row.analysis_date, gone.date_naive());
    }

    #[tokio::test]
    async fn test_planned_and_same_building_links_skip_los() {
        let harness = Harness::new(SnapshotDocument::default());
        let node = harness.store.find_node_by_number(227).await.unwrap().unwrap();
        let a = Device::new("nycmesh-227-a", node.id, DeviceStatus::Active);
        let b = Device::new("nycmesh-227-b", node.id, DeviceStatus::Active);
        harness.store.put_device(a.clone()).unwrap();
        harness.store.put_device(b.clone()).unwrap();
        harness
            .store
            .put_link(Link::new(a.id, b.id, LinkStatus::Active))
            .unwrap();

        let other = harness.store.find_node_by_number(713).await.unwrap().unwrap();
        let c = Device::new("nycmesh-713-a", other.id, DeviceStatus::Active);
        harness.store.put_device(c.clone()).unwrap();
        harness
            .store
            .put_link(Link::new(a.id, c.id, LinkStatus::Planned))
            .unwrap();

        let report = harness.run().await;
        assert_eq!(report.los_created, 0);
        assert!(harness.store.los_rows().is_empty());
    }

    #[tokio::test]
    async fn test_events_reach_the_notifier() {
        let harness = Harness::new(fleet());
        let report = harness.run().await;
        harness.dispatcher.flush().await;

        assert_eq!(harness.sink.len(), report.events.len());
        assert!(harness.sink.events().iter().all(|e| e.created));
    }

    #[test]
    fn test_config_validation() {
        let config = ReconcilerConfig {
            grace_period_days: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        let config = ReconcilerConfig {
            network_number_pattern: "(".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        assert!(ReconcilerConfig::default().is_excluded_category(Some("OPTICAL")));
        assert!(!ReconcilerConfig::default().is_excluded_category(None));
    }
}
