//! Persistence for the PPDA reporting service.
//!
//! Every entity is reached through a [`Repository`] handed out by a
//! [`Store`]. Two backends exist: [`MemoryStore`] for development and tests,
//! and [`PgStore`] on top of sqlx/Postgres. Evidence and report files live
//! outside the database in an [`AttachmentStore`].

mod attachments;
mod memory;
mod pg;
mod record;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ppda_core::{
    Account, Activity, AnnualReport, ConsolidatedReport, CriticalAlert, Indicator, Measure,
    Organization, Plan, ProgressRecord, UserProfile, Validate,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use attachments::{AttachmentStore, StoredAttachment, EVIDENCE_DIR, REPORTS_DIR};
pub use memory::MemoryStore;
pub use pg::PgStore;

pub const CRATE_NAME: &str = "ppda-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ya existe un registro con este valor de `{field}`.")]
    Unique { field: String },
    #[error("El registro referenciado en `{field}` no existe.")]
    ForeignKey { field: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Wire field involved in a constraint violation, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Unique { field } | Self::ForeignKey { field } => Some(field),
            _ => None,
        }
    }
}

/// Outgoing reference from a record to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Wire field holding the reference.
    pub field: &'static str,
    /// [`Record::KIND`] of the referenced entity.
    pub kind: &'static str,
    pub id: i64,
}

/// An entity the store can persist.
pub trait Record: std::fmt::Debug + Clone + Serialize + Send + Sync + 'static {
    type Draft: Validate + DeserializeOwned + Clone + Send + Sync + 'static;
    type Query: DeserializeOwned + Default + Send + Sync + 'static;

    const KIND: &'static str;

    fn id(&self) -> i64;

    fn build(id: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Overwrite the writable fields with `draft`.
    fn apply(&mut self, draft: Self::Draft, now: DateTime<Utc>);

    fn matches(&self, query: &Self::Query) -> bool;

    /// Default list ordering.
    fn order(a: &Self, b: &Self) -> Ordering;

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// Rows of `kind` with `ids` were deleted. Returns true when this row
    /// must be deleted with them; nullable links may be cleared instead.
    fn release(&mut self, kind: &'static str, ids: &BTreeSet<i64>) -> bool {
        self.references()
            .iter()
            .any(|r| r.kind == kind && ids.contains(&r.id))
    }

    /// `(wire field, value)` pairs that must be unique across the table.
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self>;
}

#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    async fn list(&self, query: &R::Query) -> Result<Vec<R>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<R>, StoreError>;

    async fn insert(&self, draft: R::Draft) -> Result<R, StoreError>;

    /// Persist a batch in one write. Either every draft is stored or none is.
    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, StoreError>;

    async fn update(&self, id: i64, draft: R::Draft) -> Result<Option<R>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

pub trait Store: Send + Sync {
    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;

    fn accounts(&self) -> &dyn Repository<Account>;
    fn user_profiles(&self) -> &dyn Repository<UserProfile>;
    fn organizations(&self) -> &dyn Repository<Organization>;
    fn plans(&self) -> &dyn Repository<Plan>;
    fn measures(&self) -> &dyn Repository<Measure>;
    fn progress_records(&self) -> &dyn Repository<ProgressRecord>;
    fn indicators(&self) -> &dyn Repository<Indicator>;
    fn critical_alerts(&self) -> &dyn Repository<CriticalAlert>;
    fn annual_reports(&self) -> &dyn Repository<AnnualReport>;
    fn consolidated_reports(&self) -> &dyn Repository<ConsolidatedReport>;
    fn activities(&self) -> &dyn Repository<Activity>;
}

/// Open the configured backend.
///
/// Falls back to an empty [`MemoryStore`] when no database URL is given.
/// Postgres migrations are applied when `migrate` is set.
pub async fn open_store(
    database_url: Option<&str>,
    migrate: bool,
) -> Result<Arc<dyn Store>, StoreError> {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not survive restarts");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let store = PgStore::connect(url).await?;
    if migrate {
        store.migrate().await?;
    }
    Ok(Arc::new(store))
}
