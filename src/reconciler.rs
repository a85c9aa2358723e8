//! Reconciler for the whole manifest.
//!
//! Ties the per-resource reconcilers to the state store: every entry point
//! loads the state document, re-reads the tracked interfaces from MAAS,
//! and (for mutating commands) saves the document under the state lock.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Manifest, ResourceKind};
use crate::error::{ConfigError, Result, StateError};
use crate::maas::MaasApi;
use crate::planner::{
    ActionStatus, DiffEngine, DiffResult, DiffType, ExecutionResult, Plan, PlanExecutor,
};
use crate::resources::{
    BridgeReconciler, CancelFlag, MachineLookup, ReadOutcome, VlanReconciler,
};
use crate::state::{BridgeState, HistoryEntry, MachineState, Operation, StateDocument, StateStore};

/// Reconciler for maintaining desired state.
pub struct Reconciler<'a, S: StateStore> {
    manifest: &'a Manifest,
    state_store: &'a S,
    bridges: BridgeReconciler,
    vlans: VlanReconciler,
    machines: MachineLookup,
    diff_engine: DiffEngine,
}

/// Result of re-reading tracked resources.
#[derive(Debug, Default, serde::Serialize)]
pub struct RefreshReport {
    /// Resources re-read from MAAS.
    pub refreshed: usize,
    /// Resources whose snapshot changed.
    pub changed: Vec<String>,
    /// Resources that no longer exist in MAAS and were dropped from state.
    pub removed: Vec<String>,
    /// Machine lookups evaluated.
    pub lookups: usize,
}

/// Result of an apply run.
#[derive(Debug, serde::Serialize)]
pub struct ReconciliationResult {
    /// Whether every action succeeded.
    pub success: bool,
    /// Number of interfaces created.
    pub created: usize,
    /// Number of interfaces updated in place.
    pub updated: usize,
    /// Number of interfaces replaced.
    pub replaced: usize,
    /// Number of interfaces deleted.
    pub deleted: usize,
    /// Number of interfaces unchanged.
    pub unchanged: usize,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Per-action results.
    pub execution: ExecutionResult,
}

/// Report of drift detection.
#[derive(Debug, serde::Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Resources whose remote state or manifest entry differs from state.
    pub drifted_resources: Vec<String>,
    /// Tracked resources that no longer exist in MAAS.
    pub removed_resources: Vec<String>,
    /// Number of interfaces in the manifest.
    pub total_resources: usize,
    /// Number of interfaces tracked in state.
    pub tracked_count: usize,
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(manifest: &'a Manifest, state_store: &'a S, api: Arc<dyn MaasApi>) -> Self {
        Self {
            manifest,
            state_store,
            bridges: BridgeReconciler::new(api.clone()),
            vlans: VlanReconciler::new(api.clone()),
            machines: MachineLookup::new(api),
            diff_engine: DiffEngine::new(),
        }
    }

    /// Shares a cancellation flag with every resource operation.
    #[must_use]
    pub fn with_cancel(self, cancel: &CancelFlag) -> Self {
        Self {
            bridges: self.bridges.with_cancel(cancel.clone()),
            vlans: self.vlans.with_cancel(cancel.clone()),
            machines: self.machines.with_cancel(cancel.clone()),
            ..self
        }
    }

    async fn load_state(&self) -> Result<StateDocument> {
        Ok(self.state_store.load().await?.unwrap_or_default())
    }

    async fn locked<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_lock(self.state_store, operation, f).await
    }

    /// Re-reads every tracked interface and evaluates machine lookups,
    /// updating `state` in memory.
    ///
    /// # Errors
    ///
    /// Returns the first resolution or remote error.
    pub async fn refresh_state(&self, state: &mut StateDocument) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        let bridge_keys: Vec<String> = state.bridges.keys().cloned().collect();
        for key in bridge_keys {
            let Some(managed) = state.bridge(&key) else { continue };
            let (prior, hash) = (managed.snapshot.clone(), managed.spec_hash.clone());
            let label = format!("bridge.{key}");

            match self.bridges.read(&prior).await? {
                ReadOutcome::Present(snapshot) => {
                    if snapshot != prior {
                        report.changed.push(label);
                    }
                    state.set_bridge(&key, &hash, snapshot);
                }
                ReadOutcome::Gone => {
                    state.remove(ResourceKind::Bridge, &key);
                    report.removed.push(label);
                }
            }
            report.refreshed += 1;
        }

        let vlan_keys: Vec<String> = state.vlans.keys().cloned().collect();
        for key in vlan_keys {
            let Some(managed) = state.vlan(&key) else { continue };
            let (prior, hash) = (managed.snapshot.clone(), managed.spec_hash.clone());
            let label = format!("vlan.{key}");

            match self.vlans.read(&prior).await? {
                ReadOutcome::Present(snapshot) => {
                    if snapshot != prior {
                        report.changed.push(label);
                    }
                    state.set_vlan(&key, &hash, snapshot);
                }
                ReadOutcome::Gone => {
                    state.remove(ResourceKind::Vlan, &key);
                    report.removed.push(label);
                }
            }
            report.refreshed += 1;
        }

        for (key, machine) in self.evaluate_lookups().await? {
            state.set_machine(&key, machine);
            report.lookups += 1;
        }
        state
            .machines
            .retain(|key, _| self.manifest.machines.iter().any(|q| &q.key == key));

        debug!(
            "Refreshed {} resources ({} changed, {} removed)",
            report.refreshed,
            report.changed.len(),
            report.removed.len()
        );
        Ok(report)
    }

    async fn evaluate_lookups(&self) -> Result<Vec<(String, MachineState)>> {
        let mut results = Vec::with_capacity(self.manifest.machines.len());
        for query in &self.manifest.machines {
            results.push((query.key.clone(), self.machines.read(query).await?));
        }
        Ok(results)
    }

    /// Re-reads all tracked resources and saves the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere, a read fails or the
    /// state cannot be saved.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        self.locked("refresh", || async move {
            let mut state = self.load_state().await?;
            let report = self.refresh_state(&mut state).await?;

            for removed in &report.removed {
                warn!("{removed} was deleted outside of maas-netif");
            }
            state.add_history(HistoryEntry::new(
                Operation::Refresh,
                report.changed.iter().chain(&report.removed).cloned().collect(),
            ));
            self.state_store.save(&state).await?;
            Ok(report)
        })
        .await
    }

    /// Computes the plan against freshly read remote state without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded or a read fails.
    pub async fn plan(&self) -> Result<(Plan, DiffResult)> {
        let mut state = self.load_state().await?;
        self.refresh_state(&mut state).await?;

        let diff = self.diff_engine.compute_diff(self.manifest, &state);
        info!(
            "Diff: {} creates, {} updates, {} replaces, {} deletes, {} unchanged",
            diff.creates, diff.updates, diff.replaces, diff.deletes, diff.unchanged
        );
        Ok((Plan::from_diff(&diff), diff))
    }

    /// Refreshes, plans and executes under the state lock, then saves.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere, the refresh fails or
    /// the state cannot be saved. Failed actions are reported in the result.
    pub async fn apply(&self, continue_on_error: bool) -> Result<ReconciliationResult> {
        self.locked("apply", || async move {
            let mut state = self.load_state().await?;
            self.refresh_state(&mut state).await?;

            let diff = self.diff_engine.compute_diff(self.manifest, &state);
            let plan = Plan::from_diff(&diff);

            if plan.is_empty() {
                info!("No changes required - state is converged");
            }

            let execution = PlanExecutor::new(&self.bridges, &self.vlans)
                .with_continue_on_error(continue_on_error)
                .execute(&plan, self.manifest, &mut state)
                .await;

            self.state_store.save(&state).await?;

            let errors = execution
                .results
                .iter()
                .filter(|r| r.status == ActionStatus::Failed)
                .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {e}", r.action.description())))
                .collect();

            Ok(ReconciliationResult {
                success: execution.all_successful(),
                created: diff.creates,
                updated: diff.updates,
                replaced: diff.replaces,
                deleted: diff.deletes,
                unchanged: diff.unchanged,
                errors,
                execution,
            })
        })
        .await
    }

    /// Checks for drift without applying changes or saving state.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded or a read fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift");

        let mut state = self.load_state().await?;
        let tracked_count = state.resource_count();
        let refresh = self.refresh_state(&mut state).await?;

        let diff = self.diff_engine.compute_diff(self.manifest, &state);
        let drifted_resources: Vec<String> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type != DiffType::NoChange)
            .map(ToString::to_string)
            .collect();

        Ok(DriftReport {
            has_drift: !drifted_resources.is_empty() || !refresh.removed.is_empty(),
            drifted_resources,
            removed_resources: refresh.removed,
            total_resources: self.manifest.resource_count(),
            tracked_count,
        })
    }

    /// Adopts an existing bridge under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is already tracked or the import fails.
    pub async fn import_bridge(&self, key: &str, import_id: &str) -> Result<BridgeState> {
        self.locked("import", || async move {
            let mut state = self.load_state().await?;
            if state.contains(ResourceKind::Bridge, key) {
                return Err(ConfigError::validation(
                    format!("bridge '{key}' is already managed; remove it from state first"),
                    "key",
                )
                .into());
            }

            let snapshot = self.bridges.import(import_id).await?;
            state.set_bridge(key, "", snapshot.clone());
            state.add_history(HistoryEntry::new(
                Operation::Import,
                vec![format!("bridge.{key}")],
            ));
            self.state_store.save(&state).await?;
            Ok(snapshot)
        })
        .await
    }

    /// Evaluates all machine lookups and records the results.
    ///
    /// # Errors
    ///
    /// Returns the first lookup failure.
    pub async fn lookup(&self) -> Result<Vec<(String, MachineState)>> {
        self.locked("lookup", || async move {
            let mut state = self.load_state().await?;
            let results = self.evaluate_lookups().await?;

            for (key, machine) in &results {
                state.set_machine(key, machine.clone());
            }
            state.add_history(HistoryEntry::new(
                Operation::Lookup,
                results.iter().map(|(k, _)| format!("machine.{k}")).collect(),
            ));
            self.state_store.save(&state).await?;
            Ok(results)
        })
        .await
    }
}

/// Runs `f` while holding the state lock; the lock is released even when
/// `f` fails.
async fn with_lock<S, T, F, Fut>(store: &S, operation: &str, f: F) -> Result<T>
where
    S: StateStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let lock = store.acquire_lock("", operation).await?;
    let result = f().await;
    if let Err(e) = store.release_lock(&lock.lock_id).await {
        error!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    result
}

/// Stops tracking a resource without touching MAAS.
///
/// # Errors
///
/// Returns [`StateError::UnknownResource`] if nothing is tracked under
/// `key`, or an error if the lock is held elsewhere.
pub async fn forget<S: StateStore>(store: &S, kind: ResourceKind, key: &str) -> Result<()> {
    with_lock(store, "state rm", || async move {
        let mut state = store.load().await?.unwrap_or_default();
        if !state.remove(kind, key) {
            return Err(StateError::UnknownResource {
                kind: kind.to_string(),
                key: key.to_string(),
            }
            .into());
        }
        state.add_history(HistoryEntry::new(
            Operation::Forget,
            vec![format!("{kind}.{key}")],
        ));
        store.save(&state).await?;
        info!("Removed {kind}.{key} from state");
        Ok(())
    })
    .await
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift {
            return write!(f, "No drift detected - state is converged");
        }

        writeln!(f, "Drift detected:")?;
        for resource in &self.drifted_resources {
            writeln!(f, "  - {resource}")?;
        }
        for resource in &self.removed_resources {
            writeln!(f, "  - {resource}: deleted outside of maas-netif")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Apply {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Replaced: {}", self.replaced)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeSpec, MaasConfig, MachineQuery, StateConfig, VlanSpec};
    use crate::error::NetifError;
    use crate::maas::testing::{FakeMaas, HOSTNAME, SYSTEM_ID};
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        Manifest {
            maas: MaasConfig {
                url: String::from("http://maas"),
                api_version: String::from("2.0"),
                timeout_secs: 30,
                max_retries: 0,
            },
            state: StateConfig::default(),
            bridges: vec![BridgeSpec {
                key: String::from("mgmt"),
                machine: String::from(SYSTEM_ID),
                name: Some(String::from("cloud-brmgmt")),
                parent: Some(String::from("bond0.3342")),
                ..BridgeSpec::default()
            }],
            vlans: vec![VlanSpec {
                key: String::from("bond0-3342"),
                machine: String::from(SYSTEM_ID),
                parent: String::from("bond0"),
                fabric: String::from("fabric-hydc"),
                vlan: String::from("3342"),
                mtu: Some(9000),
                ..VlanSpec::default()
            }],
            machines: vec![MachineQuery {
                key: String::from("vm1"),
                hostname: Some(String::from(HOSTNAME)),
                pxe_mac_address: None,
            }],
        }
    }

    fn setup() -> (Arc<FakeMaas>, LocalStateStore, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        (Arc::new(FakeMaas::fixture()), store, temp)
    }

    #[tokio::test]
    async fn test_apply_converges_and_persists() {
        let (maas, store, _temp) = setup();
        let manifest = manifest();
        let reconciler = Reconciler::new(&manifest, &store, maas.clone());

        let result = reconciler.apply(false).await.expect("apply");
        assert!(result.success, "{result}");
        assert_eq!(result.created, 2);

        let saved = store.load().await.expect("load").expect("state");
        assert_eq!(saved.resource_count(), 2);
        assert_eq!(saved.machines["vm1"].id, SYSTEM_ID);
        assert!(store.get_lock_info().await.expect("lock").is_none());

        let (plan, _) = reconciler.plan().await.expect("plan");
        assert!(plan.is_empty(), "{plan}");
        assert!(reconciler.check_drift().await.expect("drift").is_converged());
    }

    #[tokio::test]
    async fn test_out_of_band_change_is_drift_and_reapplied() {
        let (maas, store, _temp) = setup();
        let manifest = manifest();
        let reconciler = Reconciler::new(&manifest, &store, maas.clone());
        reconciler.apply(false).await.expect("apply");

        let vlan_id = store
            .load()
            .await
            .expect("load")
            .and_then(|s| s.vlan("bond0-3342").map(|v| v.snapshot.id))
            .expect("vlan");
        maas.edit_out_of_band(SYSTEM_ID, vlan_id, |iface| iface.effective_mtu = 1500);

        let drift = reconciler.check_drift().await.expect("drift");
        assert!(drift.has_drift);
        assert_eq!(drift.drifted_resources, vec!["vlan.bond0-3342: update (mtu)"]);

        let result = reconciler.apply(false).await.expect("apply");
        assert_eq!(result.updated, 1);
        assert_eq!(maas.interface(SYSTEM_ID, vlan_id).map(|i| i.effective_mtu), Some(9000));
    }

    #[tokio::test]
    async fn test_refresh_drops_deleted_interfaces() {
        let (maas, store, _temp) = setup();
        let manifest = manifest();
        let reconciler = Reconciler::new(&manifest, &store, maas.clone());
        reconciler.apply(false).await.expect("apply");

        let bridge_id = store
            .load()
            .await
            .expect("load")
            .and_then(|s| s.bridge("mgmt").map(|b| b.snapshot.id))
            .expect("bridge");
        maas.remove_out_of_band(SYSTEM_ID, bridge_id);

        let report = reconciler.refresh().await.expect("refresh");
        assert_eq!(report.removed, vec!["bridge.mgmt"]);

        let (plan, diff) = reconciler.plan().await.expect("plan");
        assert_eq!(diff.creates, 1);
        assert_eq!(plan.action_count(), 1);
    }

    #[tokio::test]
    async fn test_import_then_forget() {
        let (maas, store, _temp) = setup();
        let empty = Manifest {
            bridges: Vec::new(),
            vlans: Vec::new(),
            machines: Vec::new(),
            ..manifest()
        };
        let reconciler = Reconciler::new(&empty, &store, maas.clone());

        let imported = reconciler
            .import_bridge("existing", &format!("{SYSTEM_ID}:12"))
            .await
            .expect("import");
        assert_eq!(imported.name.as_deref(), Some("bond0.3342"));

        assert!(matches!(
            reconciler.import_bridge("existing", &format!("{SYSTEM_ID}:12")).await,
            Err(NetifError::Config(_))
        ));
        assert!(matches!(
            reconciler.import_bridge("other", "m1").await,
            Err(NetifError::Validation(_))
        ));

        forget(&store, ResourceKind::Bridge, "existing")
            .await
            .expect("forget");
        assert!(matches!(
            forget(&store, ResourceKind::Bridge, "existing").await,
            Err(NetifError::State(StateError::UnknownResource { .. }))
        ));

        // Forgetting never touches MAAS.
        assert!(maas.interface(SYSTEM_ID, 12).is_some());
        assert_eq!(maas.mutations(), 0);
    }

    #[tokio::test]
    async fn test_lookup_records_sensitive_power_parameters() {
        let (maas, store, _temp) = setup();
        let manifest = manifest();
        let reconciler = Reconciler::new(&manifest, &store, maas);

        let results = reconciler.lookup().await.expect("lookup");
        assert_eq!(results.len(), 1);

        let saved = store.load().await.expect("load").expect("state");
        assert!(saved
            .sensitive_attributes
            .contains(&String::from("machines.*.power_parameters")));
        assert!(saved.machines["vm1"]
            .power_parameters
            .expose()
            .contains_key("power_pass"));
    }

    #[tokio::test]
    async fn test_apply_refuses_when_locked() {
        let (maas, store, _temp) = setup();
        let manifest = manifest();
        store.acquire_lock("someone-else", "apply").await.expect("lock");

        let reconciler = Reconciler::new(&manifest, &store, maas.clone());
        assert!(matches!(
            reconciler.apply(false).await,
            Err(NetifError::State(StateError::LockedByOther { .. }))
        ));
        assert_eq!(maas.mutations(), 0);
    }

    #[tokio::test]
    async fn test_refresh_drops_interfaces_of_removed_machine() {
        let (maas, store, _temp) = setup();
        let with_lookups = manifest();
        Reconciler::new(&with_lookups, &store, maas.clone())
            .apply(false)
            .await
            .expect("apply");

        maas.remove_machine(SYSTEM_ID);
        let manifest = Manifest {
            machines: Vec::new(),
            ..manifest()
        };
        let reconciler = Reconciler::new(&manifest, &store, maas.clone());

        let report = reconciler.refresh().await.expect("refresh");
        assert_eq!(report.removed, vec!["bridge.mgmt", "vlan.bond0-3342"]);

        let saved = store.load().await.expect("load").expect("state");
        assert_eq!(saved.resource_count(), 0);
        assert!(saved.machines.is_empty());
    }
}
