//! Entry point for import, export and study actions.
//!
//! At most one analyze, import or reset runs at a time; a second request
//! while one is in flight is rejected with [`ImportError::Busy`] rather than
//! queued, so a double-triggered import can't write twice. Loading and
//! studying wait for the running request to finish.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::analysis::{self, ImportAnalysis};
use crate::auth::AuthProvider;
use crate::error::ImportError;
use crate::export::{self, ExportArtifact, ExportFormat};
use crate::import::ImportFile;
use crate::models::{AppState, StreakRecord};
use crate::reconcile::{ImportMode, ImportReconciler, ImportResult};
use crate::remote::RemoteStore;
use crate::storage::LocalCache;

/// Result of an export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub artifact: ExportArtifact,
    /// Whether a copy was also kept remotely.
    pub backed_up: bool,
}

pub struct ImportPipeline<R, C, A> {
    reconciler: ImportReconciler<R, C, A>,
    guard: Mutex<()>,
}

impl<R: RemoteStore, C: LocalCache, A: AuthProvider> ImportPipeline<R, C, A> {
    pub fn new(reconciler: ImportReconciler<R, C, A>) -> Self {
        Self {
            reconciler,
            guard: Mutex::new(()),
        }
    }

    pub fn reconciler(&self) -> &ImportReconciler<R, C, A> {
        &self.reconciler
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>, ImportError> {
        self.guard.try_lock().map_err(|_| {
            log::warn!("Rejected request: another import is in progress");
            ImportError::Busy
        })
    }

    /// Hydrate the in-memory state from storage.
    pub async fn load(&self, today: NaiveDate) -> AppState {
        let _guard = self.guard.lock().await;
        self.reconciler.load(today).await
    }

    /// Dry run; nothing is written.
    pub fn analyze(&self, file: &ImportFile) -> Result<ImportAnalysis, ImportError> {
        let _guard = self.acquire()?;
        Ok(analysis::analyze(file))
    }

    pub async fn import(&self, file: &ImportFile, mode: ImportMode, today: NaiveDate) -> Result<ImportResult, ImportError> {
        let _guard = self.acquire()?;
        let batch = file.parse()?;
        if let Some(reason) = batch.malformed {
            return Err(ImportError::InvalidXml(reason));
        }
        log::info!("Importing {} in {} mode", file.name, mode);
        self.reconciler.commit(batch, mode, today).await
    }

    /// Serialize the current state. A remote backup is attempted when signed
    /// in; its failure does not fail the export.
    pub async fn export(&self, format: ExportFormat, now: DateTime<Utc>) -> Result<ExportOutcome> {
        let state = self.reconciler.snapshot().await;
        let artifact = export::serialize(&state, format, now)?;
        let backed_up = self.reconciler.backup_export(format, &artifact).await;
        Ok(ExportOutcome { artifact, backed_up })
    }

    pub async fn study(&self, today: NaiveDate) -> StreakRecord {
        let _guard = self.guard.lock().await;
        self.reconciler.record_study(today).await
    }

    pub async fn reset(&self) -> Result<(), ImportError> {
        let _guard = self.acquire()?;
        self.reconciler.reset().await
    }
}
