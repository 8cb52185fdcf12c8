//! Generic list/create/retrieve/update/delete endpoints over the store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use ppda_core::{
    Activity, AnnualReport, AnnualReportQuery, ConsolidatedReport, CriticalAlert, Indicator,
    Measure, Operation, Organization, Plan, ProgressRecord, UserProfile, Validate,
    ValidationContext,
};
use ppda_storage::{Record, Store, StoreError, EVIDENCE_DIR, REPORTS_DIR};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::auth::Caller;
use crate::error::AppError;
use crate::labels::{fetch, labels, Labels, Presented};
use crate::policy::{authorize, Access, Resource};
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 200;
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// A stored entity exposed as a REST resource.
#[async_trait]
pub(crate) trait ApiResource: Record {
    const RESOURCE: Resource;

    /// Server-side fields of a new record.
    fn prepare_create(_draft: &mut Self::Draft, _caller: &Caller) {}

    /// Fields the request body cannot change.
    fn prepare_update(_draft: &mut Self::Draft, _existing: &Self) {}

    /// Display fields for each of `rows`, in order.
    async fn labels(_store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        Ok(vec![Labels::new(); rows.len()])
    }
}

fn organization_name(orgs: &BTreeMap<i64, Organization>, id: Option<i64>) -> Option<&'static str> {
    id.and_then(|id| orgs.get(&id)).map(|o| o.code.display_name())
}

impl ApiResource for Organization {
    const RESOURCE: Resource = Resource::Organizations;
}

#[async_trait]
impl ApiResource for Plan {
    const RESOURCE: Resource = Resource::Plans;

    fn prepare_create(draft: &mut Self::Draft, caller: &Caller) {
        draft.created_by = caller.account_id;
    }

    fn prepare_update(draft: &mut Self::Draft, existing: &Self) {
        draft.created_by = existing.created_by;
    }

    async fn labels(store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        let orgs: BTreeMap<i64, Organization> =
            fetch(store, rows.iter().filter_map(|p| p.organization_id).collect()).await?;
        Ok(rows
            .iter()
            .map(|p| labels([("organismo_nombre", organization_name(&orgs, p.organization_id))]))
            .collect())
    }
}

impl ApiResource for Measure {
    const RESOURCE: Resource = Resource::Measures;
}

#[async_trait]
impl ApiResource for ProgressRecord {
    const RESOURCE: Resource = Resource::ProgressRecords;

    async fn labels(store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        let measures: BTreeMap<i64, Measure> =
            fetch(store, rows.iter().map(|r| r.measure_id).collect()).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let measure = measures.get(&r.measure_id);
                labels([
                    ("medida_nombre", measure.map(|m| m.name.as_str())),
                    ("medida_tipo", measure.map(|m| m.kind.label())),
                ])
            })
            .collect())
    }
}

#[async_trait]
impl ApiResource for Indicator {
    const RESOURCE: Resource = Resource::Indicators;

    fn prepare_update(draft: &mut Self::Draft, existing: &Self) {
        draft.evidence_file = existing.evidence_file.clone();
        draft.source = existing.source;
    }

    async fn labels(store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        let orgs: BTreeMap<i64, Organization> =
            fetch(store, rows.iter().map(|i| i.organization_id).collect()).await?;
        let plans: BTreeMap<i64, Plan> =
            fetch(store, rows.iter().filter_map(|i| i.plan_id).collect()).await?;
        Ok(rows
            .iter()
            .map(|i| {
                labels([
                    ("organismo_nombre", organization_name(&orgs, Some(i.organization_id))),
                    (
                        "ppda_nombre",
                        i.plan_id.and_then(|id| plans.get(&id)).map(|p| p.name.as_str()),
                    ),
                ])
            })
            .collect())
    }
}

impl ApiResource for CriticalAlert {
    const RESOURCE: Resource = Resource::CriticalAlerts;
}

#[async_trait]
impl ApiResource for Activity {
    const RESOURCE: Resource = Resource::Activities;

    async fn labels(store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        let orgs: BTreeMap<i64, Organization> =
            fetch(store, rows.iter().map(|a| a.organization_id).collect()).await?;
        let measures: BTreeMap<i64, Measure> =
            fetch(store, rows.iter().map(|a| a.measure_id).collect()).await?;
        Ok(rows
            .iter()
            .map(|a| {
                labels([
                    ("organismo_nombre", organization_name(&orgs, Some(a.organization_id))),
                    ("medida_nombre", measures.get(&a.measure_id).map(|m| m.name.as_str())),
                ])
            })
            .collect())
    }
}

#[async_trait]
impl ApiResource for AnnualReport {
    const RESOURCE: Resource = Resource::AnnualReports;

    // `medida` points at a progress record; the name is its measure's.
    async fn labels(store: &dyn Store, rows: &[Self]) -> Result<Vec<Labels>, StoreError> {
        let orgs: BTreeMap<i64, Organization> =
            fetch(store, rows.iter().map(|r| r.organization_id).collect()).await?;
        let records: BTreeMap<i64, ProgressRecord> =
            fetch(store, rows.iter().map(|r| r.progress_record_id).collect()).await?;
        let measure_ids: BTreeSet<i64> = records.values().map(|r| r.measure_id).collect();
        let measures: BTreeMap<i64, Measure> = fetch(store, measure_ids).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let measure = records
                    .get(&r.progress_record_id)
                    .and_then(|record| measures.get(&record.measure_id));
                labels([
                    ("organismo_nombre", organization_name(&orgs, Some(r.organization_id))),
                    ("medida_nombre", measure.map(|m| m.name.as_str())),
                ])
            })
            .collect())
    }
}

#[async_trait]
impl ApiResource for ConsolidatedReport {
    const RESOURCE: Resource = Resource::ConsolidatedReports;

    fn prepare_update(draft: &mut Self::Draft, existing: &Self) {
        draft.summary_file = existing.summary_file.clone();
    }
}

impl ApiResource for UserProfile {
    const RESOURCE: Resource = Resource::UserProfiles;
}

async fn present<R: ApiResource>(
    store: &dyn Store,
    rows: Vec<R>,
) -> Result<Vec<Presented<R>>, AppError> {
    let labels = R::labels(store, &rows).await?;
    Ok(rows
        .into_iter()
        .zip(labels)
        .map(|(row, labels)| Presented { row, labels })
        .collect())
}

async fn present_one<R: ApiResource>(store: &dyn Store, row: R) -> Result<Presented<R>, AppError> {
    let mut labels = R::labels(store, std::slice::from_ref(&row)).await?;
    Ok(Presented {
        row,
        labels: labels.pop().unwrap_or_default(),
    })
}

pub(crate) fn routes() -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/api/annual-reports/summary", get(annual_summary_handler))
        .route(
            "/api/indicators/{id}/evidence",
            put(upload_evidence_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/consolidated-reports/{id}/file",
            put(upload_report_file_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        );

    let router = resource_routes::<Organization>(router);
    let router = resource_routes::<Plan>(router);
    let router = resource_routes::<Measure>(router);
    let router = resource_routes::<ProgressRecord>(router);
    let router = resource_routes::<Indicator>(router);
    let router = resource_routes::<CriticalAlert>(router);
    let router = resource_routes::<Activity>(router);
    let router = resource_routes::<AnnualReport>(router);
    let router = resource_routes::<ConsolidatedReport>(router);
    resource_routes::<UserProfile>(router)
}

fn resource_routes<R: ApiResource>(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    let base = format!("/api/{}", R::RESOURCE.path());
    router
        .route(&base, get(list_handler::<R>).post(create_handler::<R>))
        .route(
            &format!("{base}/{{id}}"),
            get(retrieve_handler::<R>)
                .put(update_handler::<R>)
                .patch(partial_update_handler::<R>)
                .delete(delete_handler::<R>),
        )
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub page: usize,
    pub total_pages: usize,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn paginate(rows: Vec<T>, params: &PageParams) -> Self {
        let per_page = params
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let count = rows.len();
        let total_pages = count.max(1).div_ceil(per_page);
        let page = params.page.unwrap_or(1).clamp(1, total_pages);
        let start = (page - 1) * per_page;
        let results = rows.into_iter().skip(start).take(per_page).collect();
        Self {
            count,
            page,
            total_pages,
            results,
        }
    }
}

async fn list_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    filters: Result<Query<R::Query>, QueryRejection>,
    paging: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Page<Presented<R>>>, AppError> {
    authorize(&caller, R::RESOURCE, Access::Read)?;
    let Query(filters) = filters?;
    let Query(paging) = paging?;
    let store = state.store.as_ref();
    let rows = R::repository(store).list(&filters).await?;

    let page = Page::paginate(rows, &paging);
    let results = present(store, page.results).await?;
    Ok(Json(Page {
        count: page.count,
        page: page.page,
        total_pages: page.total_pages,
        results,
    }))
}

async fn create_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<R::Draft>, JsonRejection>,
) -> Result<(StatusCode, Json<Presented<R>>), AppError> {
    authorize(&caller, R::RESOURCE, Access::Write)?;
    let Json(mut draft) = payload?;
    draft.validate(&ValidationContext::now(Operation::Create))?;
    R::prepare_create(&mut draft, &caller);

    let store = state.store.as_ref();
    let row = R::repository(store).insert(draft).await?;
    info!(kind = R::KIND, id = row.id(), account_id = ?caller.account_id, "record created");
    Ok((StatusCode::CREATED, Json(present_one(store, row).await?)))
}

async fn retrieve_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Presented<R>>, AppError> {
    authorize(&caller, R::RESOURCE, Access::Read)?;
    let Path(id) = id?;
    let store = state.store.as_ref();
    let row = R::repository(store).get(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(present_one(store, row).await?))
}

async fn update_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<R::Draft>, JsonRejection>,
) -> Result<Json<Presented<R>>, AppError> {
    authorize(&caller, R::RESOURCE, Access::Write)?;
    let Path(id) = id?;
    let store = state.store.as_ref();
    let existing = R::repository(store).get(id).await?.ok_or(AppError::NotFound)?;

    let Json(draft) = payload?;
    save_update(store, &caller, id, &existing, draft).await
}

/// Applies only the fields present in the body on top of the stored row.
async fn partial_update_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<Presented<R>>, AppError> {
    authorize(&caller, R::RESOURCE, Access::Write)?;
    let Path(id) = id?;
    let store = state.store.as_ref();
    let existing = R::repository(store).get(id).await?.ok_or(AppError::NotFound)?;

    let Json(changes) = payload?;
    let mut merged = match serde_json::to_value(&existing) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(AppError::Internal(format!("{} is not a JSON object", R::KIND))),
        Err(err) => return Err(AppError::Internal(err.to_string())),
    };
    merged.extend(changes);
    let draft: R::Draft = serde_json::from_value(Value::Object(merged))
        .map_err(|err| AppError::BadRequest(err.to_string()))?;
    save_update(store, &caller, id, &existing, draft).await
}

async fn save_update<R: ApiResource>(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    existing: &R,
    mut draft: R::Draft,
) -> Result<Json<Presented<R>>, AppError> {
    draft.validate(&ValidationContext::now(Operation::Update))?;
    R::prepare_update(&mut draft, existing);

    let row = R::repository(store)
        .update(id, draft)
        .await?
        .ok_or(AppError::NotFound)?;
    info!(kind = R::KIND, id, account_id = ?caller.account_id, "record updated");
    Ok(Json(present_one(store, row).await?))
}

async fn delete_handler<R: ApiResource>(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    authorize(&caller, R::RESOURCE, Access::Write)?;
    let Path(id) = id?;
    if R::repository(state.store.as_ref()).delete(id).await? {
        info!(kind = R::KIND, id, account_id = ?caller.account_id, "record deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    #[serde(rename = "periodo")]
    pub period: NaiveDate,
    #[serde(rename = "promedio_cumplimiento")]
    pub average_compliance: f64,
}

/// Average compliance per period, newest period first, rounded to two decimals.
pub fn summarize_by_period(reports: &[AnnualReport]) -> Vec<PeriodSummary> {
    let mut periods: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for report in reports {
        let entry = periods.entry(report.period).or_default();
        entry.0 += report.compliance;
        entry.1 += 1;
    }
    periods
        .into_iter()
        .rev()
        .map(|(period, (total, n))| PeriodSummary {
            period,
            average_compliance: ((total / n as f64) * 100.0).round() / 100.0,
        })
        .collect()
}

async fn annual_summary_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<PeriodSummary>>, AppError> {
    authorize(&caller, Resource::AnnualReports, Access::Read)?;
    let reports = state
        .store
        .annual_reports()
        .list(&AnnualReportQuery::default())
        .await?;
    Ok(Json(summarize_by_period(&reports)))
}

#[derive(Debug, Default, Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

async fn store_upload(
    state: &AppState,
    folder: &str,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: &Bytes,
) -> Result<String, AppError> {
    let Query(params) = params?;
    if body.is_empty() {
        return Err(AppError::BadRequest("El archivo enviado está vacío.".into()));
    }
    let filename = params.filename.unwrap_or_default();
    let stored = state
        .attachments
        .store_bytes(folder, &filename, body)
        .await
        .map_err(|err| AppError::Internal(format!("No se pudo guardar el archivo: {err:#}")))?;
    info!(
        path = %stored.recorded_path(),
        bytes = stored.byte_size,
        deduplicated = stored.deduplicated,
        "attachment stored"
    );
    Ok(stored.recorded_path())
}

async fn upload_evidence_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Presented<Indicator>>, AppError> {
    authorize(&caller, Resource::Indicators, Access::Write)?;
    let Path(id) = id?;
    let repo = state.store.indicators();
    let existing = repo.get(id).await?.ok_or(AppError::NotFound)?;

    let path = store_upload(&state, EVIDENCE_DIR, params, &body).await?;
    let mut draft = existing.to_draft();
    draft.evidence_file = Some(path);
    let row = repo.update(id, draft).await?.ok_or(AppError::NotFound)?;
    Ok(Json(present_one(state.store.as_ref(), row).await?))
}

async fn upload_report_file_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Presented<ConsolidatedReport>>, AppError> {
    authorize(&caller, Resource::ConsolidatedReports, Access::Write)?;
    let Path(id) = id?;
    let repo = state.store.consolidated_reports();
    let existing = repo.get(id).await?.ok_or(AppError::NotFound)?;

    let path = store_upload(&state, REPORTS_DIR, params, &body).await?;
    let mut draft = existing.to_draft();
    draft.summary_file = Some(path);
    let row = repo.update(id, draft).await?.ok_or(AppError::NotFound)?;
    Ok(Json(present_one(state.store.as_ref(), row).await?))
}
