use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use chrono::Utc;
use ppda_core::{
    Account, Activity, AnnualReport, ConsolidatedReport, CriticalAlert, Indicator, Measure,
    Organization, Plan, ProgressRecord, UserProfile,
};
use tokio::sync::{Mutex, RwLock};

use crate::{Record, Reference, Repository, Store, StoreError};

/// A table that can drop or detach rows when rows they reference go away.
#[async_trait]
trait Dependents: Send + Sync {
    /// Returns the kind and ids of the rows this table deleted.
    async fn release(&self, kind: &'static str, ids: &BTreeSet<i64>) -> (&'static str, BTreeSet<i64>);
}

/// Ids of live rows per entity kind, shared by all tables of one store so
/// references can be checked and deletes cascaded across them.
#[derive(Default)]
struct Registry {
    ids: Mutex<HashMap<&'static str, BTreeSet<i64>>>,
    tables: std::sync::Mutex<Vec<Weak<dyn Dependents>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    async fn check(&self, refs: &[Reference]) -> Result<(), StoreError> {
        let ids = self.ids.lock().await;
        for r in refs {
            let exists = ids.get(r.kind).is_some_and(|set| set.contains(&r.id));
            if !exists {
                return Err(StoreError::ForeignKey {
                    field: r.field.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn add(&self, kind: &'static str, new_ids: impl IntoIterator<Item = i64>) {
        self.ids.lock().await.entry(kind).or_default().extend(new_ids);
    }

    async fn remove(&self, kind: &'static str, gone: &BTreeSet<i64>) {
        if let Some(set) = self.ids.lock().await.get_mut(kind) {
            set.retain(|id| !gone.contains(id));
        }
    }

    fn track(&self, table: Weak<dyn Dependents>) {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(table);
    }

    fn tables(&self) -> Vec<Arc<dyn Dependents>> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Deletes every row that depends on `kind`/`id`, transitively.
    async fn cascade(&self, kind: &'static str, id: i64) {
        let tables = self.tables();
        let mut pending = vec![(kind, BTreeSet::from([id]))];
        while let Some((kind, ids)) = pending.pop() {
            for table in &tables {
                let (dropped_kind, dropped) = table.release(kind, &ids).await;
                if !dropped.is_empty() {
                    pending.push((dropped_kind, dropped));
                }
            }
        }
    }
}

#[derive(Debug)]
struct Table<R> {
    rows: BTreeMap<i64, R>,
    next_id: i64,
}

impl<R: Record> Table<R> {
    fn check_unique(&self, candidate: &R, batch: &[R]) -> Result<(), StoreError> {
        let keys = candidate.unique_keys();
        if keys.is_empty() {
            return Ok(());
        }
        let others = self
            .rows
            .values()
            .chain(batch.iter())
            .filter(|other| other.id() != candidate.id());
        for other in others {
            let other_keys = other.unique_keys();
            if let Some((field, _)) = keys.iter().find(|k| other_keys.contains(k)) {
                return Err(StoreError::Unique {
                    field: (*field).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// One entity table of a [`MemoryStore`].
///
/// References are checked on write. Deleting a row removes the rows that
/// reference it, mirroring the `ON DELETE` rules of the Postgres schema.
#[derive(Debug)]
pub(crate) struct MemoryRepository<R> {
    table: RwLock<Table<R>>,
    registry: Arc<Registry>,
}

impl<R: Record> MemoryRepository<R> {
    fn new(registry: &Arc<Registry>) -> Arc<Self> {
        let repo = Arc::new(Self {
            table: RwLock::new(Table {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            registry: registry.clone(),
        });
        let dependents: Arc<dyn Dependents> = repo.clone();
        registry.track(Arc::downgrade(&dependents));
        repo
    }
}

#[async_trait]
impl<R: Record> Dependents for MemoryRepository<R> {
    async fn release(&self, kind: &'static str, ids: &BTreeSet<i64>) -> (&'static str, BTreeSet<i64>) {
        let mut table = self.table.write().await;
        let dropped: BTreeSet<i64> = table
            .rows
            .values_mut()
            .filter_map(|row| row.release(kind, ids).then(|| row.id()))
            .collect();
        table.rows.retain(|id, _| !dropped.contains(id));
        drop(table);

        if !dropped.is_empty() {
            self.registry.remove(R::KIND, &dropped).await;
        }
        (R::KIND, dropped)
    }
}

#[async_trait]
impl<R: Record> Repository<R> for MemoryRepository<R> {
    async fn list(&self, query: &R::Query) -> Result<Vec<R>, StoreError> {
        let table = self.table.read().await;
        let mut rows: Vec<R> = table
            .rows
            .values()
            .filter(|r| r.matches(query))
            .cloned()
            .collect();
        rows.sort_by(R::order);
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<R>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn insert(&self, draft: R::Draft) -> Result<R, StoreError> {
        let mut stored = self.insert_many(vec![draft]).await?;
        stored.pop().ok_or_else(|| {
            StoreError::Database(sqlx::Error::Protocol("insert returned no row".into()))
        })
    }

    async fn insert_many(&self, drafts: Vec<R::Draft>) -> Result<Vec<R>, StoreError> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let mut batch: Vec<R> = Vec::with_capacity(drafts.len());
        for (offset, draft) in drafts.into_iter().enumerate() {
            let candidate = R::build(table.next_id + offset as i64, draft, now);
            self.registry.check(&candidate.references()).await?;
            table.check_unique(&candidate, &batch)?;
            batch.push(candidate);
        }

        table.next_id += batch.len() as i64;
        self.registry.add(R::KIND, batch.iter().map(R::id)).await;
        for row in &batch {
            table.rows.insert(row.id(), row.clone());
        }
        Ok(batch)
    }

    async fn update(&self, id: i64, draft: R::Draft) -> Result<Option<R>, StoreError> {
        let mut table = self.table.write().await;
        let Some(existing) = table.rows.get(&id) else {
            return Ok(None);
        };
        let mut updated = existing.clone();
        updated.apply(draft, Utc::now());
        self.registry.check(&updated.references()).await?;
        table.check_unique(&updated, &[])?;
        table.rows.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        if self.table.write().await.rows.remove(&id).is_none() {
            return Ok(false);
        }
        self.registry.remove(R::KIND, &BTreeSet::from([id])).await;
        self.registry.cascade(R::KIND, id).await;
        Ok(true)
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug)]
pub struct MemoryStore {
    accounts: Arc<MemoryRepository<Account>>,
    user_profiles: Arc<MemoryRepository<UserProfile>>,
    organizations: Arc<MemoryRepository<Organization>>,
    plans: Arc<MemoryRepository<Plan>>,
    measures: Arc<MemoryRepository<Measure>>,
    progress_records: Arc<MemoryRepository<ProgressRecord>>,
    indicators: Arc<MemoryRepository<Indicator>>,
    critical_alerts: Arc<MemoryRepository<CriticalAlert>>,
    annual_reports: Arc<MemoryRepository<AnnualReport>>,
    consolidated_reports: Arc<MemoryRepository<ConsolidatedReport>>,
    activities: Arc<MemoryRepository<Activity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::default());
        Self {
            accounts: MemoryRepository::new(&registry),
            user_profiles: MemoryRepository::new(&registry),
            organizations: MemoryRepository::new(&registry),
            plans: MemoryRepository::new(&registry),
            measures: MemoryRepository::new(&registry),
            progress_records: MemoryRepository::new(&registry),
            indicators: MemoryRepository::new(&registry),
            critical_alerts: MemoryRepository::new(&registry),
            annual_reports: MemoryRepository::new(&registry),
            consolidated_reports: MemoryRepository::new(&registry),
            activities: MemoryRepository::new(&registry),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn accounts(&self) -> &dyn Repository<Account> {
        self.accounts.as_ref()
    }

    fn user_profiles(&self) -> &dyn Repository<UserProfile> {
        self.user_profiles.as_ref()
    }

    fn organizations(&self) -> &dyn Repository<Organization> {
        self.organizations.as_ref()
    }

    fn plans(&self) -> &dyn Repository<Plan> {
        self.plans.as_ref()
    }

    fn measures(&self) -> &dyn Repository<Measure> {
        self.measures.as_ref()
    }

    fn progress_records(&self) -> &dyn Repository<ProgressRecord> {
        self.progress_records.as_ref()
    }

    fn indicators(&self) -> &dyn Repository<Indicator> {
        self.indicators.as_ref()
    }

    fn critical_alerts(&self) -> &dyn Repository<CriticalAlert> {
        self.critical_alerts.as_ref()
    }

    fn annual_reports(&self) -> &dyn Repository<AnnualReport> {
        self.annual_reports.as_ref()
    }

    fn consolidated_reports(&self) -> &dyn Repository<ConsolidatedReport> {
        self.consolidated_reports.as_ref()
    }

    fn activities(&self) -> &dyn Repository<Activity> {
        self.activities.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ppda_core::*;

    fn org(code: OrganizationCode) -> OrganizationDraft {
        OrganizationDraft {
            code,
            contact_email: Some("contacto@mma.gob.cl".into()),
            phone: None,
        }
    }

    fn indicator(name: &str, organization_id: i64) -> IndicatorDraft {
        let mut draft =
            IndicatorDraft::ingested(name.into(), 12.3, SNIFA_UNIT.into(), IndicatorSource::Snifa);
        draft.organization_id = organization_id;
        draft
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let store = MemoryStore::new();
        let a = store.organizations().insert(org(OrganizationCode::Sea)).await.unwrap();
        let b = store.organizations().insert(org(OrganizationCode::Sec)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.organizations().get(2).await.unwrap().unwrap().code, OrganizationCode::Sec);
    }

    #[tokio::test]
    async fn duplicate_organization_code_is_rejected() {
        let store = MemoryStore::new();
        store.organizations().insert(org(OrganizationCode::Sea)).await.unwrap();
        let err = store
            .organizations()
            .insert(org(OrganizationCode::Sea))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unique { ref field } if field == "nombre"));
        assert_eq!(store.organizations().list(&Default::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_keeps_own_unique_key() {
        let store = MemoryStore::new();
        let created = store.organizations().insert(org(OrganizationCode::Sag)).await.unwrap();
        let mut draft = org(OrganizationCode::Sag);
        draft.phone = Some("+56 2 2345".into());
        let updated = store.organizations().update(created.id, draft).await.unwrap().unwrap();
        assert_eq!(updated.phone.as_deref(), Some("+56 2 2345"));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn missing_reference_is_a_foreign_key_error() {
        let store = MemoryStore::new();
        let err = store.indicators().insert(indicator("PM2.5", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { ref field } if field == "organismo_sectorial"));
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.organizations().insert(org(OrganizationCode::Sea)).await.unwrap();

        let err = store
            .indicators()
            .insert_many(vec![indicator("PM2.5", 1), indicator("PM10", 99)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));
        assert!(store.indicators().list(&Default::default()).await.unwrap().is_empty());

        let stored = store
            .indicators()
            .insert_many(vec![indicator("PM2.5", 1), indicator("PM10", 1)])
            .await
            .unwrap();
        assert_eq!(stored.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn insert_many_of_nothing_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(store.indicators().insert_many(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_apply_filters_and_ordering() {
        let store = MemoryStore::new();
        store.organizations().insert(org(OrganizationCode::Sea)).await.unwrap();
        let measure = store.measures().insert(measure(1)).await.unwrap();

        for (progress, state) in [(10, ProgressState::Pending), (60, ProgressState::InProgress), (90, ProgressState::InProgress)] {
            store
                .progress_records()
                .insert(ProgressRecordDraft {
                    measure_id: measure.id,
                    description: format!("avance {progress}"),
                    deadline: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
                    progress,
                    state,
                    observations: String::new(),
                })
                .await
                .unwrap();
        }

        let query = ProgressRecordQuery {
            state: Some(ProgressState::InProgress),
            progress_min: Some(70),
        };
        let rows = store.progress_records().list(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].progress, 90);

        let all = store.progress_records().list(&Default::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn organization_code_filter_is_case_insensitive() {
        let store = MemoryStore::new();
        for code in [OrganizationCode::Conaf, OrganizationCode::Sea, OrganizationCode::Sag] {
            store.organizations().insert(org(code)).await.unwrap();
        }
        let query = OrganizationQuery { code: Some("sa".into()) };
        let rows = store.organizations().list(&query).await.unwrap();
        assert_eq!(rows.iter().map(|o| o.code).collect::<Vec<_>>(), vec![OrganizationCode::Sag]);

        let all = store.organizations().list(&Default::default()).await.unwrap();
        let codes: Vec<_> = all.iter().map(|o| o.code.as_str()).collect();
        assert_eq!(codes, vec!["CONAF", "SAG", "SEA"]);
    }

    fn measure(organization_id: i64) -> MeasureDraft {
        MeasureDraft {
            name: "Recambio de calefactores".into(),
            kind: MeasureKind::Regulatory,
            description: "Leña seca".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            priority: Priority::High,
            organization_id,
        }
    }

    #[tokio::test]
    async fn delete_cascades_to_dependent_rows() {
        let store = MemoryStore::new();
        store.organizations().insert(org(OrganizationCode::Sea)).await.unwrap();
        store.organizations().insert(org(OrganizationCode::Sag)).await.unwrap();
        store.indicators().insert(indicator("PM2.5", 1)).await.unwrap();
        store.indicators().insert(indicator("PM10", 2)).await.unwrap();
        let measure = store.measures().insert(measure(1)).await.unwrap();
        let record = store
            .progress_records()
            .insert(ProgressRecordDraft {
                measure_id: measure.id,
                description: "fiscalización".into(),
                deadline: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
                progress: 40,
                state: ProgressState::InProgress,
                observations: String::new(),
            })
            .await
            .unwrap();
        store
            .annual_reports()
            .insert(AnnualReportDraft {
                organization_id: 2,
                period: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
                progress_record_id: record.id,
                compliance: 40.0,
                observations: None,
            })
            .await
            .unwrap();

        assert!(store.organizations().delete(1).await.unwrap());
        assert!(!store.organizations().delete(1).await.unwrap());

        let indicators = store.indicators().list(&Default::default()).await.unwrap();
        assert_eq!(indicators.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(), vec!["PM10"]);
        assert!(store.measures().list(&Default::default()).await.unwrap().is_empty());
        // Two levels down: measure -> progress record -> annual report of another organization.
        assert!(store.progress_records().list(&Default::default()).await.unwrap().is_empty());
        assert!(store.annual_reports().list(&Default::default()).await.unwrap().is_empty());

        let err = store.indicators().insert(indicator("SO2", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));
    }

    #[tokio::test]
    async fn deleting_an_account_clears_plan_attribution() {
        let store = MemoryStore::new();
        let account = store
            .accounts()
            .insert(AccountDraft {
                username: "analista".into(),
                groups: vec![Group::User],
            })
            .await
            .unwrap();
        store
            .user_profiles()
            .insert(UserProfileDraft {
                account_id: account.id,
                role: "analista".into(),
            })
            .await
            .unwrap();
        let plan = store
            .plans()
            .insert(PlanDraft {
                name: "PPDA Concón".into(),
                description: String::new(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
                organization_id: None,
                created_by: Some(account.id),
            })
            .await
            .unwrap();

        assert!(store.accounts().delete(account.id).await.unwrap());

        let kept = store.plans().get(plan.id).await.unwrap().unwrap();
        assert_eq!(kept.created_by, None);
        assert!(store.user_profiles().list(&Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_row_returns_none() {
        let store = MemoryStore::new();
        assert!(store
            .organizations()
            .update(7, org(OrganizationCode::Irv))
            .await
            .unwrap()
            .is_none());
    }
}
