use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use ppda_core::*;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;

use crate::{Record, Repository, Store, StoreError};

/// Rows per INSERT statement; keeps bulk writes under the bind parameter limit.
const BATCH_ROWS: usize = 1000;

type Binder<'qb, 'args> = Separated<'qb, 'args, Postgres, &'static str>;

/// Table mapping of a [`Record`].
///
/// Constraint names follow `<table>__<wire field>__<uniq|fk>` so violations can
/// be reported against the offending field.
pub(crate) trait PgRecord: Record {
    const TABLE: &'static str;
    /// Writable columns, in `bind_draft` order.
    const COLUMNS: &'static [&'static str];
    const ORDER_BY: &'static str;

    fn bind_draft(draft: &Self::Draft, row: &mut Binder<'_, '_>);

    fn push_filters(_query: &Self::Query, _qb: &mut QueryBuilder<'_, Postgres>) {}

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

fn constraint_field(constraint: &str) -> Option<&str> {
    let mut parts = constraint.split("__");
    let _table = parts.next()?;
    let field = parts.next()?;
    parts.next()?;
    Some(field)
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(field) = db.constraint().and_then(constraint_field) {
            let field = field.to_string();
            match db.code().as_deref() {
                Some("23505") => return StoreError::Unique { field },
                Some("23503") => return StoreError::ForeignKey { field },
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|err: UnknownVariant| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

fn list_query<R: PgRecord>(query: &R::Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {} WHERE TRUE", R::TABLE));
    R::push_filters(query, &mut qb);
    qb.push(" ORDER BY ");
    qb.push(R::ORDER_BY);
    qb
}

fn update_query<R: PgRecord>(id: i64, draft: &R::Draft) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "UPDATE {} SET ({}) = ROW(",
        R::TABLE,
        R::COLUMNS.join(", ")
    ));
    let mut row = qb.separated(", ");
    R::bind_draft(draft, &mut row);
    qb.push("), updated_at = now() WHERE id = ");
    qb.push_bind(id);
    qb.push(" RETURNING *");
    qb
}

pub(crate) struct PgRepository<R> {
    pool: PgPool,
    _record: PhantomData<fn() -> R>,
}

impl<R> PgRepository<R> {
    fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<R: PgRecord> Repository<R> for PgRepository<R> {
    async fn list(&self, query: &R::Query) -> Result<Vec<R>, StoreError> {
        let mut qb = list_query::<R>(query);
        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_err)?;
        rows.iter()
            .map(|row| R::from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn get(&self, id: i64) -> Result<Option<R>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", R::TABLE);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.as_ref().map(R::from_row).transpose()?)
    }

    async fn insert(&self, draft: R::Draft) -> Result<R, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            R::TABLE,
            R::COLUMNS.join(", ")
        ));
        qb.push_values(std::iter::once(&draft), |mut row, draft| {
            R::bind_draft(draft, &mut row)
        });
        qb.push(" RETURNING *");
        let row = qb.build().fetch_one(&self.pool).await.map_err(map_err)?;
        Ok(R::from_row(&row)?)
    }

    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, StoreError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let mut stored = Vec::with_capacity(drafts.len());
        for chunk in drafts.chunks(BATCH_ROWS) {
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}) ",
                R::TABLE,
                R::COLUMNS.join(", ")
            ));
            qb.push_values(chunk, |mut row, draft| R::bind_draft(draft, &mut row));
            qb.push(" RETURNING *");
            let rows = qb.build().fetch_all(&mut *tx).await.map_err(map_err)?;
            for row in &rows {
                stored.push(R::from_row(row)?);
            }
        }
        tx.commit().await.map_err(map_err)?;
        Ok(stored)
    }

    async fn update(&self, id: i64, draft: R::Draft) -> Result<Option<R>, StoreError> {
        let mut qb = update_query::<R>(id, &draft);
        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.as_ref().map(R::from_row).transpose()?)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", R::TABLE);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Postgres-backed store. Deletes cascade to owned rows.
pub struct PgStore {
    pool: PgPool,
    accounts: PgRepository<Account>,
    user_profiles: PgRepository<UserProfile>,
    organizations: PgRepository<Organization>,
    plans: PgRepository<Plan>,
    measures: PgRepository<Measure>,
    progress_records: PgRepository<ProgressRecord>,
    indicators: PgRepository<Indicator>,
    critical_alerts: PgRepository<CriticalAlert>,
    annual_reports: PgRepository<AnnualReport>,
    consolidated_reports: PgRepository<ConsolidatedReport>,
    activities: PgRepository<Activity>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!("connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            accounts: PgRepository::new(pool.clone()),
            user_profiles: PgRepository::new(pool.clone()),
            organizations: PgRepository::new(pool.clone()),
            plans: PgRepository::new(pool.clone()),
            measures: PgRepository::new(pool.clone()),
            progress_records: PgRepository::new(pool.clone()),
            indicators: PgRepository::new(pool.clone()),
            critical_alerts: PgRepository::new(pool.clone()),
            annual_reports: PgRepository::new(pool.clone()),
            consolidated_reports: PgRepository::new(pool.clone()),
            activities: PgRepository::new(pool.clone()),
            pool,
        }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn accounts(&self) -> &dyn Repository<Account> {
        &self.accounts
    }

    fn user_profiles(&self) -> &dyn Repository<UserProfile> {
        &self.user_profiles
    }

    fn organizations(&self) -> &dyn Repository<Organization> {
        &self.organizations
    }

    fn plans(&self) -> &dyn Repository<Plan> {
        &self.plans
    }

    fn measures(&self) -> &dyn Repository<Measure> {
        &self.measures
    }

    fn progress_records(&self) -> &dyn Repository<ProgressRecord> {
        &self.progress_records
    }

    fn indicators(&self) -> &dyn Repository<Indicator> {
        &self.indicators
    }

    fn critical_alerts(&self) -> &dyn Repository<CriticalAlert> {
        &self.critical_alerts
    }

    fn annual_reports(&self) -> &dyn Repository<AnnualReport> {
        &self.annual_reports
    }

    fn consolidated_reports(&self) -> &dyn Repository<ConsolidatedReport> {
        &self.consolidated_reports
    }

    fn activities(&self) -> &dyn Repository<Activity> {
        &self.activities
    }
}

// ── Table mappings ──────────────────────────────────────────────────────────

impl PgRecord for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &["username", "account_groups"];
    const ORDER_BY: &'static str = "id";

    fn bind_draft(draft: &AccountDraft, row: &mut Binder<'_, '_>) {
        let groups: Vec<String> = draft.groups.iter().map(|g| g.as_str().to_string()).collect();
        row.push_bind(draft.username.clone());
        row.push_bind(groups);
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let raw: Vec<String> = row.try_get("account_groups")?;
        let groups = raw
            .iter()
            .map(|g| g.parse::<Group>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| sqlx::Error::ColumnDecode {
                index: "account_groups".into(),
                source: Box::new(err),
            })?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            groups,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for UserProfile {
    const TABLE: &'static str = "user_profiles";
    const COLUMNS: &'static [&'static str] = &["account_id", "role"];
    const ORDER_BY: &'static str = "id";

    fn bind_draft(draft: &UserProfileDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.account_id);
        row.push_bind(draft.role.clone());
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for Organization {
    const TABLE: &'static str = "organizations";
    const COLUMNS: &'static [&'static str] = &["code", "contact_email", "phone"];
    const ORDER_BY: &'static str = "code, id";

    fn bind_draft(draft: &OrganizationDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.code.as_str());
        row.push_bind(draft.contact_email.clone());
        row.push_bind(draft.phone.clone());
    }

    fn push_filters(query: &OrganizationQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(code) = &query.code {
            qb.push(" AND code ILIKE ");
            qb.push_bind(format!("%{}%", code.replace('%', "\\%").replace('_', "\\_")));
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            code: parse_column(row, "code")?,
            contact_email: row.try_get("contact_email")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for Plan {
    const TABLE: &'static str = "plans";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "start_date",
        "end_date",
        "organization_id",
        "created_by",
    ];
    const ORDER_BY: &'static str = "created_at DESC, id DESC";

    fn bind_draft(draft: &PlanDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.name.clone());
        row.push_bind(draft.description.clone());
        row.push_bind(draft.start_date);
        row.push_bind(draft.end_date);
        row.push_bind(draft.organization_id);
        row.push_bind(draft.created_by);
    }

    fn push_filters(query: &PlanQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = query.organization_id {
            qb.push(" AND organization_id = ");
            qb.push_bind(id);
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            organization_id: row.try_get("organization_id")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for Measure {
    const TABLE: &'static str = "measures";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "kind",
        "description",
        "start_date",
        "end_date",
        "priority",
        "organization_id",
    ];
    const ORDER_BY: &'static str = "name, id";

    fn bind_draft(draft: &MeasureDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.name.clone());
        row.push_bind(draft.kind.as_str());
        row.push_bind(draft.description.clone());
        row.push_bind(draft.start_date);
        row.push_bind(draft.end_date);
        row.push_bind(draft.priority.as_str());
        row.push_bind(draft.organization_id);
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: parse_column(row, "kind")?,
            description: row.try_get("description")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            priority: parse_column(row, "priority")?,
            organization_id: row.try_get("organization_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for ProgressRecord {
    const TABLE: &'static str = "progress_records";
    const COLUMNS: &'static [&'static str] = &[
        "measure_id",
        "description",
        "deadline",
        "progress",
        "state",
        "observations",
    ];
    const ORDER_BY: &'static str = "updated_at DESC, id DESC";

    fn bind_draft(draft: &ProgressRecordDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.measure_id);
        row.push_bind(draft.description.clone());
        row.push_bind(draft.deadline);
        row.push_bind(draft.progress);
        row.push_bind(draft.state.as_str());
        row.push_bind(draft.observations.clone());
    }

    fn push_filters(query: &ProgressRecordQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(state) = query.state {
            qb.push(" AND state = ");
            qb.push_bind(state.as_str());
        }
        if let Some(min) = query.progress_min {
            qb.push(" AND progress >= ");
            qb.push_bind(min);
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            measure_id: row.try_get("measure_id")?,
            description: row.try_get("description")?,
            deadline: row.try_get("deadline")?,
            progress: row.try_get("progress")?,
            state: parse_column(row, "state")?,
            observations: row.try_get("observations")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for Indicator {
    const TABLE: &'static str = "indicators";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "value",
        "unit",
        "organization_id",
        "plan_id",
        "evidence_file",
        "source",
    ];
    const ORDER_BY: &'static str = "recorded_on DESC, id DESC";

    fn bind_draft(draft: &IndicatorDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.name.clone());
        row.push_bind(draft.description.clone());
        row.push_bind(draft.value);
        row.push_bind(draft.unit.clone());
        row.push_bind(draft.organization_id);
        row.push_bind(draft.plan_id);
        row.push_bind(draft.evidence_file.clone());
        row.push_bind(draft.source.map(|s| s.as_str()));
    }

    fn push_filters(query: &IndicatorQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = query.organization_id {
            qb.push(" AND organization_id = ");
            qb.push_bind(id);
        }
        if let Some(id) = query.plan_id {
            qb.push(" AND plan_id = ");
            qb.push_bind(id);
        }
        if let Some(source) = query.source {
            qb.push(" AND source = ");
            qb.push_bind(source.as_str());
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let source: Option<String> = row.try_get("source")?;
        let source = source
            .map(|s| s.parse::<IndicatorSource>())
            .transpose()
            .map_err(|err| sqlx::Error::ColumnDecode {
                index: "source".into(),
                source: Box::new(err),
            })?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            value: row.try_get("value")?,
            unit: row.try_get("unit")?,
            recorded_on: row.try_get("recorded_on")?,
            organization_id: row.try_get("organization_id")?,
            plan_id: row.try_get("plan_id")?,
            evidence_file: row.try_get("evidence_file")?,
            source,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for CriticalAlert {
    const TABLE: &'static str = "critical_alerts";
    const COLUMNS: &'static [&'static str] = &["description", "state", "organization_id", "plan_id"];
    const ORDER_BY: &'static str = "raised_at DESC, id DESC";

    fn bind_draft(draft: &CriticalAlertDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.description.clone());
        row.push_bind(draft.state.as_str());
        row.push_bind(draft.organization_id);
        row.push_bind(draft.plan_id);
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            description: row.try_get("description")?,
            raised_at: row.try_get("raised_at")?,
            state: parse_column(row, "state")?,
            organization_id: row.try_get("organization_id")?,
            plan_id: row.try_get("plan_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for AnnualReport {
    const TABLE: &'static str = "annual_reports";
    const COLUMNS: &'static [&'static str] = &[
        "organization_id",
        "period",
        "progress_record_id",
        "compliance",
        "observations",
    ];
    const ORDER_BY: &'static str = "period DESC, id DESC";

    fn bind_draft(draft: &AnnualReportDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.organization_id);
        row.push_bind(draft.period);
        row.push_bind(draft.progress_record_id);
        row.push_bind(draft.compliance);
        row.push_bind(draft.observations.clone());
    }

    fn push_filters(query: &AnnualReportQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(period) = query.period {
            qb.push(" AND period = ");
            qb.push_bind(period);
        }
        if let Some(id) = query.organization_id {
            qb.push(" AND organization_id = ");
            qb.push_bind(id);
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            period: row.try_get("period")?,
            progress_record_id: row.try_get("progress_record_id")?,
            compliance: row.try_get("compliance")?,
            observations: row.try_get("observations")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for ConsolidatedReport {
    const TABLE: &'static str = "consolidated_reports";
    const COLUMNS: &'static [&'static str] = &[
        "organization_id",
        "period",
        "plan_id",
        "activity_summary",
        "annual_report_ids",
        "compliance",
        "approval",
        "summary_file",
    ];
    const ORDER_BY: &'static str = "period DESC, id DESC";

    fn bind_draft(draft: &ConsolidatedReportDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.organization_id);
        row.push_bind(draft.period);
        row.push_bind(draft.plan_id);
        row.push_bind(draft.activity_summary.clone());
        row.push_bind(draft.annual_report_ids.clone());
        row.push_bind(draft.compliance);
        row.push_bind(draft.approval.as_str());
        row.push_bind(draft.summary_file.clone());
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            period: row.try_get("period")?,
            plan_id: row.try_get("plan_id")?,
            activity_summary: row.try_get("activity_summary")?,
            annual_report_ids: row.try_get("annual_report_ids")?,
            compliance: row.try_get("compliance")?,
            approval: parse_column(row, "approval")?,
            summary_file: row.try_get("summary_file")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgRecord for Activity {
    const TABLE: &'static str = "activities";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "start_date",
        "end_date",
        "measure_id",
        "organization_id",
    ];
    const ORDER_BY: &'static str = "start_date DESC, id DESC";

    fn bind_draft(draft: &ActivityDraft, row: &mut Binder<'_, '_>) {
        row.push_bind(draft.name.clone());
        row.push_bind(draft.description.clone());
        row.push_bind(draft.start_date);
        row.push_bind(draft.end_date);
        row.push_bind(draft.measure_id);
        row.push_bind(draft.organization_id);
    }

    fn push_filters(query: &ActivityQuery, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(id) = query.measure_id {
            qb.push(" AND measure_id = ");
            qb.push_bind(id);
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            measure_id: row.try_get("measure_id")?,
            organization_id: row.try_get("organization_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn constraint_names_resolve_to_wire_fields() {
        assert_eq!(constraint_field("organizations__nombre__uniq"), Some("nombre"));
        assert_eq!(
            constraint_field("indicators__organismo_sectorial__fk"),
            Some("organismo_sectorial")
        );
        assert_eq!(constraint_field("indicators_pkey"), None);
        assert_eq!(constraint_field("a__b"), None);
    }

    #[test]
    fn list_query_chains_filters_before_ordering() {
        let query = IndicatorQuery {
            organization_id: Some(1),
            plan_id: None,
            source: Some(IndicatorSource::Snifa),
        };
        let qb = list_query::<Indicator>(&query);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM indicators WHERE TRUE AND organization_id = $1 AND source = $2 \
             ORDER BY recorded_on DESC, id DESC"
        );
    }

    #[test]
    fn list_query_without_filters() {
        let qb = list_query::<Plan>(&PlanQuery::default());
        assert_eq!(
            qb.sql(),
            "SELECT * FROM plans WHERE TRUE ORDER BY created_at DESC, id DESC"
        );
    }

    #[test]
    fn update_query_binds_every_writable_column() {
        let draft = ActivityDraft {
            name: "Fiscalización".into(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            measure_id: 2,
            organization_id: 3,
        };
        let qb = update_query::<Activity>(9, &draft);
        assert_eq!(
            qb.sql(),
            "UPDATE activities SET (name, description, start_date, end_date, measure_id, \
             organization_id) = ROW($1, $2, $3, $4, $5, $6), updated_at = now() WHERE id = $7 \
             RETURNING *"
        );
    }
}
