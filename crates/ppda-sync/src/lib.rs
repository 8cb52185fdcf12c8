//! Indicator ingestion: fetch an upstream feed, translate it, bulk insert.
//!
//! Runs come from two places. The scheduler calls
//! [`IngestionPipeline::run_scheduled`], which swallows "no data" and never
//! retries. The API calls [`IngestionPipeline::trigger`], which reports
//! every failure back to the caller.

mod config;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ppda_adapters::{has_data, translate, HttpSourceFetcher, SourceFetcher, TranslateError};
use ppda_core::IndicatorSource;
use ppda_storage::{Store, StoreError};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use config::{SourceEntry, SourceRegistry, SourceSettings, SyncConfig};

pub const CRATE_NAME: &str = "ppda-sync";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No se recibieron datos de {0}.")]
    NoData(IndicatorSource),
    #[error(transparent)]
    Validation(#[from] TranslateError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error("La fuente {0} no está habilitada.")]
    UnknownSource(IndicatorSource),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub source: IndicatorSource,
    pub persisted: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Upstream returned nothing usable; nothing was written.
    NoData,
    Persisted(IngestSummary),
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn Store>,
    fetchers: HashMap<IndicatorSource, Arc<dyn SourceFetcher>>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("backend", &self.store.backend())
            .field("sources", &self.sources())
            .finish()
    }
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            fetchers: HashMap::new(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetchers.insert(fetcher.source(), fetcher);
        self
    }

    /// HTTP fetchers for every enabled source.
    pub fn from_settings(store: Arc<dyn Store>, settings: &[SourceSettings]) -> Result<Self> {
        let mut pipeline = Self::new(store);
        for entry in settings.iter().filter(|s| s.enabled) {
            let fetcher = HttpSourceFetcher::new(entry.fetcher.clone())
                .with_context(|| format!("building fetcher for {}", entry.source))?;
            pipeline = pipeline.with_fetcher(Arc::new(fetcher));
        }
        Ok(pipeline)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn sources(&self) -> Vec<IndicatorSource> {
        let mut sources: Vec<_> = self.fetchers.keys().copied().collect();
        sources.sort();
        sources
    }

    /// Scheduled run. An empty or failed fetch is not an error.
    pub async fn run_scheduled(&self, source: IndicatorSource) -> Result<IngestOutcome, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", %run_id, %source, trigger = "scheduled");
        async move {
            match self.run(run_id, source).await {
                Ok(summary) => Ok(IngestOutcome::Persisted(summary)),
                Err(IngestError::NoData(_)) => {
                    info!("no data received, skipping run");
                    Ok(IngestOutcome::NoData)
                }
                Err(err) => Err(err),
            }
        }
        .instrument(span)
        .await
    }

    /// Run on behalf of an API caller.
    pub async fn trigger(&self, source: IndicatorSource) -> Result<IngestSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", %run_id, %source, trigger = "manual");
        self.run(run_id, source).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, source: IndicatorSource) -> Result<IngestSummary, IngestError> {
        let fetcher = self
            .fetchers
            .get(&source)
            .ok_or(IngestError::UnknownSource(source))?;
        let started_at = Utc::now();

        let payload = fetcher.fetch().await.ok_or(IngestError::NoData(source))?;
        let persisted = self.persist(source, &payload).await?;

        let summary = IngestSummary {
            run_id,
            source,
            persisted,
            started_at,
            finished_at: Utc::now(),
        };
        info!(persisted, "ingestion run complete");
        Ok(summary)
    }

    async fn persist(&self, source: IndicatorSource, payload: &JsonValue) -> Result<usize, IngestError> {
        if !has_data(payload) {
            return Err(IngestError::NoData(source));
        }
        let drafts = translate(source, payload).inspect_err(|err| {
            warn!(%err, "upstream batch rejected");
        })?;
        let rows = self.store.indicators().insert_many(drafts).await?;
        Ok(rows.len())
    }
}

/// Builds the cron scheduler for every enabled source, or `None` when
/// scheduling is switched off.
pub async fn maybe_build_scheduler(
    enabled: bool,
    pipeline: Arc<IngestionPipeline>,
    settings: &[SourceSettings],
) -> Result<Option<JobScheduler>> {
    if !enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for entry in settings.iter().filter(|s| s.enabled) {
        let source = entry.source;
        let cron = entry.cron.clone();
        let pipeline = pipeline.clone();
        let job = Job::new_async(&cron, move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                if let Err(err) = pipeline.run_scheduled(source).await {
                    error!(%source, error = %err, "scheduled ingestion failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        info!(%source, %cron, "ingestion job scheduled");
    }
    Ok(Some(sched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ppda_core::{IndicatorQuery, OrganizationCode, OrganizationDraft, INGEST_ORGANIZATION_ID};
    use ppda_storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        source: IndicatorSource,
        payload: Option<JsonValue>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(source: IndicatorSource, payload: Option<JsonValue>) -> Arc<Self> {
            Arc::new(Self {
                source,
                payload,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceFetcher for StubFetcher {
        fn source(&self) -> IndicatorSource {
            self.source
        }

        async fn fetch(&self) -> Option<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payload.clone()
        }
    }

    async fn seeded_store() -> Arc<dyn Store> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org = store
            .organizations()
            .insert(OrganizationDraft {
                code: OrganizationCode::Sea,
                contact_email: Some("contacto@sea.gob.cl".into()),
                phone: Some("+56226161000".into()),
            })
            .await
            .unwrap();
        assert_eq!(org.id, INGEST_ORGANIZATION_ID);
        store
    }

    async fn indicator_count(store: &Arc<dyn Store>) -> usize {
        store
            .indicators()
            .list(&IndicatorQuery::default())
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn trigger_persists_snifa_batch() {
        let store = seeded_store().await;
        let fetcher = StubFetcher::new(
            IndicatorSource::Snifa,
            Some(json!([{"parametro": "PM2.5", "valor": 12.3}])),
        );
        let pipeline = IngestionPipeline::new(store.clone()).with_fetcher(fetcher.clone());

        let summary = pipeline.trigger(IndicatorSource::Snifa).await.unwrap();
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.source, IndicatorSource::Snifa);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let rows = store.indicators().list(&IndicatorQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.name, "PM2.5");
        assert_eq!(row.value, 12.3);
        assert_eq!(row.unit, "µg/m³");
        assert_eq!(row.organization_id, INGEST_ORGANIZATION_ID);
        assert_eq!(row.plan_id, None);
        assert_eq!(row.source, Some(IndicatorSource::Snifa));
        assert_eq!(row.recorded_on, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn trigger_reports_missing_data() {
        let store = seeded_store().await;
        let pipeline = IngestionPipeline::new(store.clone())
            .with_fetcher(StubFetcher::new(IndicatorSource::Snifa, None));

        let err = pipeline.trigger(IndicatorSource::Snifa).await.unwrap_err();
        assert!(matches!(err, IngestError::NoData(IndicatorSource::Snifa)));
        assert_eq!(err.to_string(), "No se recibieron datos de SNIFA.");
        assert_eq!(indicator_count(&store).await, 0);
    }

    #[tokio::test]
    async fn scheduled_run_without_data_is_a_no_op() {
        let store = seeded_store().await;
        let pipeline = IngestionPipeline::new(store.clone())
            .with_fetcher(StubFetcher::new(IndicatorSource::Snifa, None))
            .with_fetcher(StubFetcher::new(IndicatorSource::Airecoo, Some(json!([]))));

        for source in [IndicatorSource::Snifa, IndicatorSource::Airecoo] {
            let outcome = pipeline.run_scheduled(source).await.unwrap();
            assert_eq!(outcome, IngestOutcome::NoData);
        }
        assert_eq!(indicator_count(&store).await, 0);
    }

    #[tokio::test]
    async fn incomplete_record_rejects_whole_batch() {
        let store = seeded_store().await;
        let pipeline = IngestionPipeline::new(store.clone()).with_fetcher(StubFetcher::new(
            IndicatorSource::Airecoo,
            Some(json!([
                {"nombre": "O3", "valor": 61, "unidad": "ppb"},
                {"nombre": "NO2", "valor": 4}
            ])),
        ));

        let err = pipeline.trigger(IndicatorSource::Airecoo).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(TranslateError::MissingFields { .. })));
        assert!(pipeline.run_scheduled(IndicatorSource::Airecoo).await.is_err());
        assert_eq!(indicator_count(&store).await, 0);
    }

    #[tokio::test]
    async fn missing_ingest_organization_is_a_persistence_error() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let pipeline = IngestionPipeline::new(store.clone()).with_fetcher(StubFetcher::new(
            IndicatorSource::Snifa,
            Some(json!([{"parametro": "SO2", "valor": 3}])),
        ));

        let err = pipeline.trigger(IndicatorSource::Snifa).await.unwrap_err();
        assert!(matches!(err, IngestError::Persistence(StoreError::ForeignKey { .. })));
        assert!(store.organizations().list(&Default::default()).await.unwrap().is_empty());
        assert_eq!(indicator_count(&store).await, 0);
    }

    #[tokio::test]
    async fn unconfigured_source_is_rejected() {
        let store = seeded_store().await;
        let pipeline = IngestionPipeline::new(store);
        let err = pipeline.trigger(IndicatorSource::Airecoo).await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownSource(IndicatorSource::Airecoo)));
    }

    #[tokio::test]
    async fn disabled_scheduler_builds_nothing() {
        let store = seeded_store().await;
        let pipeline = Arc::new(IngestionPipeline::new(store));
        let sched = maybe_build_scheduler(false, pipeline, &[]).await.unwrap();
        assert!(sched.is_none());
    }

    #[tokio::test]
    async fn settings_only_register_enabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sources.yaml"),
            "sources:\n  - source: airecoo\n    enabled: false\n",
        )
        .unwrap();
        let mut config = SyncConfig::from_lookup(|_| None);
        config.workspace_root = dir.path().to_path_buf();

        let settings = config.source_settings().unwrap();
        let pipeline = IngestionPipeline::from_settings(seeded_store().await, &settings).unwrap();
        assert_eq!(pipeline.sources(), vec![IndicatorSource::Snifa]);
    }
}
