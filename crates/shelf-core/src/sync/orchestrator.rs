//! Sequences one device's sync runs against a storage provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;

use super::assets::{download_covers, upload_covers, TransferLimits};
use super::device::load_or_create_device_id;
use super::gate::check_compatibility;
use super::merge::MergeOutcome;
use super::paths::{
    device_metadata_path, DEVICES_DIR, PAYLOAD_PATH, SETTINGS_PATH, SHARED_METADATA_PATH,
    SNAPSHOT_PATH,
};
use super::report::{
    AssetReport, MergeSummary, StepResult, SyncDirection, SyncOutcome, SyncReport, SyncStatus,
};
use super::{timed, SyncError, SyncResult};
use crate::config::{ProviderConfig, SyncSettings, TransferStrategy};
use crate::db::snapshot::{self, SNAPSHOT_FILE_NAME};
use crate::models::{DeviceRecord, LibraryPayload, SettingsMap, SharedSyncMetadata};
use crate::services::CatalogService;
use crate::state::SyncPhase;
use crate::storage::{self, download_json, upload_json, Quota, StorageProvider};

/// Result of [`SyncOrchestrator::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub provider: String,
    pub quota: Option<Quota>,
}

/// Provider and device id captured at the start of a run.
struct RunContext {
    provider: Arc<dyn StorageProvider>,
    device_id: String,
}

/// Marks a run as in flight until dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> SyncResult<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(Self(running))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct RunState {
    phase: SyncPhase,
    last_report: Option<SyncReport>,
}

/// Drives `sync_up` / `sync_down` for one local catalog.
///
/// Each instance owns its provider, device id and "run in flight" guard, so
/// several orchestrators (for example one per test) never share state.
pub struct SyncOrchestrator {
    catalog: CatalogService,
    settings: SyncSettings,
    provider: RwLock<Option<Arc<dyn StorageProvider>>>,
    device_id: RwLock<Option<String>>,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    state: Mutex<RunState>,
}

impl SyncOrchestrator {
    pub fn new(catalog: CatalogService, settings: SyncSettings) -> Self {
        Self {
            catalog,
            settings,
            provider: RwLock::new(None),
            device_id: RwLock::new(None),
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Use an already-built provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        *self
            .provider
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
        self
    }

    /// Select the backend described by `config`. Takes effect from the next run.
    pub fn configure(&self, config: ProviderConfig) -> SyncResult<()> {
        let kind = config.kind();
        let provider = storage::from_config(config)?;
        *self
            .provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
        tracing::info!("Sync provider set to {kind}");
        Ok(())
    }

    /// Load (or create) this device's id. Returns the id.
    pub async fn initialize(&self) -> SyncResult<String> {
        let device_id = load_or_create_device_id(&self.catalog).await?;
        *self
            .device_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(device_id.clone());
        Ok(device_id)
    }

    pub const fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn device_id(&self) -> Option<String> {
        self.device_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn provider(&self) -> SyncResult<Arc<dyn StorageProvider>> {
        self.provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SyncError::NotInitialized)
    }

    fn context(&self) -> SyncResult<RunContext> {
        let provider = self.provider()?;
        let device_id = self.device_id().ok_or(SyncError::NotInitialized)?;
        Ok(RunContext {
            provider,
            device_id,
        })
    }

    /// Ask the running sync to stop at the next step boundary.
    ///
    /// The network call in flight finishes (or times out) first.
    pub fn cancel(&self) {
        if self.running.load(Ordering::Acquire) {
            tracing::info!("Cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel_requested.swap(false, Ordering::SeqCst)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase = phase;
    }

    fn finish(&self, report: SyncReport, outcome: SyncOutcome) -> SyncReport {
        let report = report.finish(outcome);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.phase = outcome.phase();
        state.last_report = Some(report.clone());
        drop(state);

        match outcome {
            SyncOutcome::Success => {
                tracing::info!("Sync {:?} finished successfully", report.direction);
            }
            _ => tracing::warn!(
                "Sync {:?} ended as {:?}: {}",
                report.direction,
                outcome,
                report
                    .error
                    .as_ref()
                    .map_or_else(|| "see step results".to_string(), ToString::to_string)
            ),
        }
        report
    }

    fn stop_cancelled(&self, mut report: SyncReport) -> SyncReport {
        report.error = Some(SyncError::Cancelled);
        self.finish(report, SyncOutcome::Cancelled)
    }

    /// Check that the provider is reachable and the credential works.
    pub async fn test_connection(&self) -> SyncResult<ConnectionCheck> {
        let provider = self.provider()?;
        let limit = self.settings.call_timeout();

        timed(limit, "token", provider.ensure_valid_token()).await?;
        timed(limit, "root listing", provider.list_files("")).await?;
        // Quota is informational; a backend without it still passes
        let quota = match timed(limit, "quota", provider.get_quota()).await {
            Ok(quota) => quota,
            Err(error) => {
                tracing::debug!("Quota unavailable: {error}");
                None
            }
        };

        Ok(ConnectionCheck {
            provider: provider.name().to_string(),
            quota,
        })
    }

    /// Current phase, provider and the last run's report.
    pub fn get_status(&self) -> SyncStatus {
        let provider = self
            .provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let device_id = self.device_id();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        SyncStatus {
            initialized: provider.is_some() && device_id.is_some(),
            in_progress: self.running.load(Ordering::Acquire),
            phase: state.phase,
            authenticated: provider
                .as_ref()
                .is_some_and(|provider| provider.is_authenticated()),
            provider: provider.map(|provider| provider.name().to_string()),
            device_id,
            last_report: state.last_report.clone(),
        }
    }

    /// Every device that has published a record, most recent first.
    ///
    /// Records that are missing or unreadable are skipped.
    pub async fn list_devices(&self) -> SyncResult<Vec<DeviceRecord>> {
        let provider = self.provider()?;
        let limit = self.settings.call_timeout();
        let entries = timed(limit, DEVICES_DIR, provider.list_files(DEVICES_DIR)).await?;

        let mut devices = Vec::new();
        for entry in entries.into_iter().filter(|entry| entry.is_dir) {
            let path = device_metadata_path(&entry.name);
            match timed(limit, &path, download_json::<DeviceRecord>(provider.as_ref(), &path)).await
            {
                Ok(record) => devices.push(record),
                Err(error) => tracing::warn!("Skipping device {}: {error}", entry.name),
            }
        }
        devices.sort_by(|a, b| b.last_sync.cmp(&a.last_sync));
        Ok(devices)
    }

    /// Push this device's catalog, settings and covers.
    ///
    /// Returns `Err` only when the orchestrator is not initialized or another
    /// run is in flight. Every other failure is reported in the `SyncReport`.
    pub async fn sync_up(&self) -> SyncResult<SyncReport> {
        let ctx = self.context()?;
        let _running = RunGuard::acquire(&self.running)?;
        self.cancel_requested.store(false, Ordering::SeqCst);
        tracing::info!("Sync up started via {}", ctx.provider.name());

        Ok(self.run_up(&ctx).await)
    }

    /// Pull and merge the remote catalog, settings and covers.
    ///
    /// Same error contract as [`sync_up`](Self::sync_up).
    pub async fn sync_down(&self) -> SyncResult<SyncReport> {
        let ctx = self.context()?;
        let _running = RunGuard::acquire(&self.running)?;
        self.cancel_requested.store(false, Ordering::SeqCst);
        tracing::info!("Sync down started via {}", ctx.provider.name());

        Ok(self.run_down(&ctx).await)
    }

    /// Token check and compatibility gate. `Err` carries the finished report.
    async fn preflight(
        &self,
        ctx: &RunContext,
        mut report: SyncReport,
    ) -> Result<(SyncReport, i32), SyncReport> {
        self.set_phase(SyncPhase::CheckingCompatibility);
        let limit = self.settings.call_timeout();

        let local_version = match self.catalog.schema_version().await {
            Ok(version) => version,
            Err(error) => {
                report.error = Some(error.into());
                return Err(self.finish(report, SyncOutcome::Failed));
            }
        };

        let checked = match timed(limit, "token", ctx.provider.ensure_valid_token()).await {
            Ok(()) => check_compatibility(ctx.provider.as_ref(), local_version, limit).await,
            Err(error) => Err(error.into()),
        };
        match checked {
            Ok(compatibility) => {
                let blocked = compatibility.blocked_error();
                report.compatibility = Some(compatibility);
                if let Some(error) = blocked {
                    report.error = Some(error);
                    return Err(self.finish(report, SyncOutcome::Blocked));
                }
            }
            Err(error) => {
                report.error = Some(error);
                return Err(self.finish(report, SyncOutcome::TransportError));
            }
        }

        if self.cancelled() {
            return Err(self.stop_cancelled(report));
        }
        self.set_phase(SyncPhase::Transferring);
        Ok((report, local_version))
    }

    async fn run_up(&self, ctx: &RunContext) -> SyncReport {
        let report = SyncReport::new(SyncDirection::Up);
        let (mut report, local_version) = match self.preflight(ctx, report).await {
            Ok(ready) => ready,
            Err(finished) => return finished,
        };

        report.device_metadata = Some(StepResult::from_result(
            self.publish_device_record(ctx, local_version).await,
        ));
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        report.data = Some(StepResult::from_result(self.upload_data(ctx).await));
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        report.settings = Some(StepResult::from_result(self.upload_settings(ctx).await));
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        let (assets, asset_report) = self.transfer_assets(ctx, SyncDirection::Up).await;
        report.assets = Some(assets);
        report.asset_report = asset_report;

        let all_ok = [
            &report.device_metadata,
            &report.data,
            &report.settings,
            &report.assets,
        ]
        .iter()
        .all(|step| step.as_ref().is_some_and(|step| step.ok));
        if !all_ok {
            return self.finish(report, SyncOutcome::PartialFailure);
        }
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        self.set_phase(SyncPhase::Committing);
        let shared = StepResult::from_result(self.publish_shared_metadata(ctx, local_version).await);
        let outcome = if shared.ok {
            SyncOutcome::Success
        } else {
            SyncOutcome::PartialFailure
        };
        report.shared_metadata = Some(shared);
        self.finish(report, outcome)
    }

    async fn run_down(&self, ctx: &RunContext) -> SyncReport {
        let report = SyncReport::new(SyncDirection::Down);
        let (mut report, local_version) = match self.preflight(ctx, report).await {
            Ok(ready) => ready,
            Err(finished) => return finished,
        };

        match self.download_data(ctx, local_version).await {
            Ok(outcome) => {
                report.merge = Some(MergeSummary::from(&outcome));
                report.data = Some(StepResult::ok());
            }
            Err(error @ SyncError::LocalStore(_)) => {
                // The merge transaction rolled back; stop before touching anything else
                report.data = Some(StepResult::failed(error.clone()));
                report.error = Some(error);
                return self.finish(report, SyncOutcome::Failed);
            }
            Err(error @ SyncError::SchemaBlocked { .. }) => {
                // Nothing else from a newer-schema replica is applied
                report.data = Some(StepResult::failed(error.clone()));
                report.error = Some(error);
                return self.finish(report, SyncOutcome::Blocked);
            }
            Err(error) => report.data = Some(StepResult::from_result(Err(error))),
        }
        self.set_phase(SyncPhase::Transferring);
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        report.settings = Some(StepResult::from_result(self.download_settings(ctx).await));
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        let (assets, asset_report) = self.transfer_assets(ctx, SyncDirection::Down).await;
        report.assets = Some(assets);
        report.asset_report = asset_report;

        let caught_up = report.data.as_ref().is_some_and(StepResult::ok_or_not_found)
            && report
                .settings
                .as_ref()
                .is_some_and(StepResult::ok_or_not_found)
            && report.assets.as_ref().is_some_and(|step| step.ok);
        if !caught_up {
            return self.finish(report, SyncOutcome::PartialFailure);
        }
        if self.cancelled() {
            return self.stop_cancelled(report);
        }

        self.set_phase(SyncPhase::Committing);
        let device = StepResult::from_result(self.publish_device_record(ctx, local_version).await);
        let shared = if device.ok {
            StepResult::from_result(self.publish_shared_metadata(ctx, local_version).await)
        } else {
            StepResult::skipped()
        };
        let outcome = if device.ok && shared.ok {
            SyncOutcome::Success
        } else {
            SyncOutcome::PartialFailure
        };
        report.device_metadata = Some(device);
        report.shared_metadata = Some(shared);
        self.finish(report, outcome)
    }

    async fn publish_device_record(&self, ctx: &RunContext, schema_version: i32) -> SyncResult<()> {
        let record = DeviceRecord::new(
            ctx.device_id.as_str(),
            self.settings.device_name.as_str(),
            self.settings.platform.as_str(),
            self.settings.app_version.as_str(),
            schema_version,
            Utc::now(),
        );
        let path = device_metadata_path(&ctx.device_id);
        timed(
            self.settings.call_timeout(),
            &path,
            upload_json(ctx.provider.as_ref(), &path, &record),
        )
        .await?;
        tracing::debug!("Published device record {path}");
        Ok(())
    }

    async fn publish_shared_metadata(&self, ctx: &RunContext, schema_version: i32) -> SyncResult<()> {
        let metadata = SharedSyncMetadata {
            schema_version,
            app_version: self.settings.app_version.clone(),
            device_id: ctx.device_id.clone(),
            synced_at: Utc::now(),
        };
        timed(
            self.settings.call_timeout(),
            SHARED_METADATA_PATH,
            upload_json(ctx.provider.as_ref(), SHARED_METADATA_PATH, &metadata),
        )
        .await?;
        tracing::debug!("Published shared sync metadata");
        Ok(())
    }

    async fn upload_data(&self, ctx: &RunContext) -> SyncResult<()> {
        let limit = self.settings.call_timeout();
        match self.settings.strategy {
            TransferStrategy::EntityPayload => {
                let payload = self.catalog.export_payload(Some(&ctx.device_id)).await?;
                timed(
                    limit,
                    PAYLOAD_PATH,
                    upload_json(ctx.provider.as_ref(), PAYLOAD_PATH, &payload),
                )
                .await?;
                tracing::debug!("Uploaded payload with {} rows", payload.entity_count());
            }
            TransferStrategy::Snapshot => {
                let snapshot = self.catalog.snapshot().await?;
                timed(
                    limit,
                    SNAPSHOT_PATH,
                    ctx.provider.upload_file(snapshot.path(), SNAPSHOT_PATH),
                )
                .await?;
                tracing::debug!("Uploaded database snapshot");
            }
        }
        Ok(())
    }

    async fn download_data(&self, ctx: &RunContext, local_version: i32) -> SyncResult<MergeOutcome> {
        let limit = self.settings.call_timeout();
        let payload: LibraryPayload = match self.settings.strategy {
            TransferStrategy::EntityPayload => {
                timed(
                    limit,
                    PAYLOAD_PATH,
                    download_json(ctx.provider.as_ref(), PAYLOAD_PATH),
                )
                .await?
            }
            TransferStrategy::Snapshot => {
                let dir = tempfile::tempdir()?;
                let path = dir.path().join(SNAPSHOT_FILE_NAME);
                timed(
                    limit,
                    SNAPSHOT_PATH,
                    ctx.provider.download_file(SNAPSHOT_PATH, &path),
                )
                .await?;
                snapshot::read_payload(&path).await?
            }
        };

        // The gate read the shared document; the payload itself may be newer
        if payload.schema_version > local_version {
            return Err(SyncError::SchemaBlocked {
                reason: format!(
                    "Remote payload uses schema version {}, this device supports up to {}",
                    payload.schema_version, local_version
                ),
                local_version,
                remote_version: payload.schema_version,
            });
        }

        self.set_phase(SyncPhase::Committing);
        let outcome = self
            .catalog
            .merge_remote(&payload, self.settings.tie_break)
            .await?;
        let totals = outcome.totals();
        tracing::info!(
            "Merged remote catalog: {} inserted, {} updated, {} deleted, {} conflicts",
            totals.inserted,
            totals.updated,
            totals.deleted,
            totals.conflicts
        );
        Ok(outcome)
    }

    async fn upload_settings(&self, ctx: &RunContext) -> SyncResult<()> {
        let settings = self.catalog.syncable_settings().await?;
        timed(
            self.settings.call_timeout(),
            SETTINGS_PATH,
            upload_json(ctx.provider.as_ref(), SETTINGS_PATH, &settings),
        )
        .await?;
        Ok(())
    }

    async fn download_settings(&self, ctx: &RunContext) -> SyncResult<()> {
        let incoming: SettingsMap = timed(
            self.settings.call_timeout(),
            SETTINGS_PATH,
            download_json(ctx.provider.as_ref(), SETTINGS_PATH),
        )
        .await?;
        self.catalog.apply_incoming_settings(&incoming).await?;
        Ok(())
    }

    async fn transfer_assets(
        &self,
        ctx: &RunContext,
        direction: SyncDirection,
    ) -> (StepResult, AssetReport) {
        let Some(covers_dir) = self.settings.covers_dir.as_deref() else {
            return (StepResult::skipped(), AssetReport::default());
        };
        let limits = TransferLimits {
            concurrency: self.settings.asset_concurrency(),
            call_timeout: self.settings.call_timeout(),
        };

        let result = match direction {
            SyncDirection::Up => upload_covers(ctx.provider.as_ref(), covers_dir, limits).await,
            SyncDirection::Down => download_covers(ctx.provider.as_ref(), covers_dir, limits).await,
        };
        match result {
            Ok(asset_report) => (asset_report.step(), asset_report),
            Err(error) => (StepResult::failed(error), AssetReport::default()),
        }
    }
}
