use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ppda_core::*;

use crate::{Record, Reference, Repository, Store};

fn newest<T: Ord>(a: T, b: T, a_id: i64, b_id: i64) -> Ordering {
    b.cmp(&a).then(b_id.cmp(&a_id))
}

fn reference(field: &'static str, kind: &'static str, id: i64) -> Reference {
    Reference { field, kind, id }
}

impl Record for Account {
    type Draft = AccountDraft;
    type Query = NoFilter;

    const KIND: &'static str = "account";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: AccountDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: draft.username,
            groups: draft.groups,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: AccountDraft, now: DateTime<Utc>) {
        self.username = draft.username;
        self.groups = draft.groups;
        self.updated_at = now;
    }

    fn matches(&self, _query: &NoFilter) -> bool {
        true
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.id.cmp(&b.id)
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("username", self.username.clone())]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.accounts()
    }
}

impl Record for UserProfile {
    type Draft = UserProfileDraft;
    type Query = NoFilter;

    const KIND: &'static str = "user_profile";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: UserProfileDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            account_id: draft.account_id,
            role: draft.role,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: UserProfileDraft, now: DateTime<Utc>) {
        self.account_id = draft.account_id;
        self.role = draft.role;
        self.updated_at = now;
    }

    fn matches(&self, _query: &NoFilter) -> bool {
        true
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.id.cmp(&b.id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![reference("usuario", Account::KIND, self.account_id)]
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("usuario", self.account_id.to_string())]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.user_profiles()
    }
}

impl Record for Organization {
    type Draft = OrganizationDraft;
    type Query = OrganizationQuery;

    const KIND: &'static str = "organization";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: OrganizationDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            code: draft.code,
            contact_email: draft.contact_email,
            phone: draft.phone,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: OrganizationDraft, now: DateTime<Utc>) {
        self.code = draft.code;
        self.contact_email = draft.contact_email;
        self.phone = draft.phone;
        self.updated_at = now;
    }

    fn matches(&self, query: &OrganizationQuery) -> bool {
        match &query.code {
            Some(needle) => self
                .code
                .as_str()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.code.as_str().cmp(b.code.as_str()).then(a.id.cmp(&b.id))
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("nombre", self.code.as_str().to_string())]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.organizations()
    }
}

impl Record for Plan {
    type Draft = PlanDraft;
    type Query = PlanQuery;

    const KIND: &'static str = "plan";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: PlanDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            organization_id: draft.organization_id,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    // Attribution is fixed at creation.
    fn apply(&mut self, draft: PlanDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.start_date = draft.start_date;
        self.end_date = draft.end_date;
        self.organization_id = draft.organization_id;
        self.updated_at = now;
    }

    fn matches(&self, query: &PlanQuery) -> bool {
        query
            .organization_id
            .is_none_or(|id| self.organization_id == Some(id))
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.created_at, b.created_at, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        if let Some(id) = self.organization_id {
            refs.push(reference("organismo", Organization::KIND, id));
        }
        if let Some(id) = self.created_by {
            refs.push(reference("creado_por", Account::KIND, id));
        }
        refs
    }

    // The creator link is `ON DELETE SET NULL`.
    fn release(&mut self, kind: &'static str, ids: &BTreeSet<i64>) -> bool {
        if kind == Account::KIND && self.created_by.is_some_and(|id| ids.contains(&id)) {
            self.created_by = None;
        }
        kind == Organization::KIND && self.organization_id.is_some_and(|id| ids.contains(&id))
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.plans()
    }
}

impl Record for Measure {
    type Draft = MeasureDraft;
    type Query = NoFilter;

    const KIND: &'static str = "measure";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: MeasureDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            kind: draft.kind,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            priority: draft.priority,
            organization_id: draft.organization_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: MeasureDraft, now: DateTime<Utc>) {
        let created_at = self.created_at;
        *self = Self::build(self.id, draft, now);
        self.created_at = created_at;
    }

    fn matches(&self, _query: &NoFilter) -> bool {
        true
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name).then(a.id.cmp(&b.id))
    }

    fn references(&self) -> Vec<Reference> {
        vec![reference(
            "organismo_responsable",
            Organization::KIND,
            self.organization_id,
        )]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.measures()
    }
}

impl Record for ProgressRecord {
    type Draft = ProgressRecordDraft;
    type Query = ProgressRecordQuery;

    const KIND: &'static str = "progress_record";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: ProgressRecordDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            measure_id: draft.measure_id,
            description: draft.description,
            deadline: draft.deadline,
            progress: draft.progress,
            state: draft.state,
            observations: draft.observations,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: ProgressRecordDraft, now: DateTime<Utc>) {
        let created_at = self.created_at;
        *self = Self::build(self.id, draft, now);
        self.created_at = created_at;
    }

    fn matches(&self, query: &ProgressRecordQuery) -> bool {
        query.state.is_none_or(|s| self.state == s)
            && query.progress_min.is_none_or(|min| self.progress >= min)
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.updated_at, b.updated_at, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![reference("medida", Measure::KIND, self.measure_id)]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.progress_records()
    }
}

impl Record for Indicator {
    type Draft = IndicatorDraft;
    type Query = IndicatorQuery;

    const KIND: &'static str = "indicator";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: IndicatorDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            value: draft.value,
            unit: draft.unit,
            recorded_on: now.date_naive(),
            organization_id: draft.organization_id,
            plan_id: draft.plan_id,
            evidence_file: draft.evidence_file,
            source: draft.source,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: IndicatorDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.value = draft.value;
        self.unit = draft.unit;
        self.organization_id = draft.organization_id;
        self.plan_id = draft.plan_id;
        self.evidence_file = draft.evidence_file;
        self.source = draft.source;
        self.updated_at = now;
    }

    fn matches(&self, query: &IndicatorQuery) -> bool {
        query
            .organization_id
            .is_none_or(|id| self.organization_id == id)
            && query.plan_id.is_none_or(|id| self.plan_id == Some(id))
            && query.source.is_none_or(|s| self.source == Some(s))
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.recorded_on, b.recorded_on, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![reference(
            "organismo_sectorial",
            Organization::KIND,
            self.organization_id,
        )];
        if let Some(id) = self.plan_id {
            refs.push(reference("ppda", Plan::KIND, id));
        }
        refs
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.indicators()
    }
}

impl Record for CriticalAlert {
    type Draft = CriticalAlertDraft;
    type Query = NoFilter;

    const KIND: &'static str = "critical_alert";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: CriticalAlertDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            description: draft.description,
            raised_at: now,
            state: draft.state,
            organization_id: draft.organization_id,
            plan_id: draft.plan_id,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: CriticalAlertDraft, now: DateTime<Utc>) {
        self.description = draft.description;
        self.state = draft.state;
        self.organization_id = draft.organization_id;
        self.plan_id = draft.plan_id;
        self.updated_at = now;
    }

    fn matches(&self, _query: &NoFilter) -> bool {
        true
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.raised_at, b.raised_at, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![reference(
            "organismo_sectorial",
            Organization::KIND,
            self.organization_id,
        )];
        if let Some(id) = self.plan_id {
            refs.push(reference("ppda", Plan::KIND, id));
        }
        refs
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.critical_alerts()
    }
}

impl Record for AnnualReport {
    type Draft = AnnualReportDraft;
    type Query = AnnualReportQuery;

    const KIND: &'static str = "annual_report";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: AnnualReportDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            organization_id: draft.organization_id,
            period: draft.period,
            progress_record_id: draft.progress_record_id,
            compliance: draft.compliance,
            observations: draft.observations,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: AnnualReportDraft, now: DateTime<Utc>) {
        let created_at = self.created_at;
        *self = Self::build(self.id, draft, now);
        self.created_at = created_at;
    }

    fn matches(&self, query: &AnnualReportQuery) -> bool {
        query.period.is_none_or(|p| self.period == p)
            && query
                .organization_id
                .is_none_or(|id| self.organization_id == id)
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.period, b.period, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            reference(
                "organismo_responsable",
                Organization::KIND,
                self.organization_id,
            ),
            reference("medida", ProgressRecord::KIND, self.progress_record_id),
        ]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.annual_reports()
    }
}

impl Record for ConsolidatedReport {
    type Draft = ConsolidatedReportDraft;
    type Query = NoFilter;

    const KIND: &'static str = "consolidated_report";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: ConsolidatedReportDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            organization_id: draft.organization_id,
            period: draft.period,
            plan_id: draft.plan_id,
            activity_summary: draft.activity_summary,
            annual_report_ids: draft.annual_report_ids,
            compliance: draft.compliance,
            approval: draft.approval,
            summary_file: draft.summary_file,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: ConsolidatedReportDraft, now: DateTime<Utc>) {
        let created_at = self.created_at;
        *self = Self::build(self.id, draft, now);
        self.created_at = created_at;
    }

    fn matches(&self, _query: &NoFilter) -> bool {
        true
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.period, b.period, a.id, b.id)
    }

    // `annual_report_ids` is a loose list and is not checked.
    fn references(&self) -> Vec<Reference> {
        let mut refs = vec![reference(
            "organismo_responsable",
            Organization::KIND,
            self.organization_id,
        )];
        if let Some(id) = self.plan_id {
            refs.push(reference("ppda", Plan::KIND, id));
        }
        refs
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.consolidated_reports()
    }
}

impl Record for Activity {
    type Draft = ActivityDraft;
    type Query = ActivityQuery;

    const KIND: &'static str = "activity";

    fn id(&self) -> i64 {
        self.id
    }

    fn build(id: i64, draft: ActivityDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            measure_id: draft.measure_id,
            organization_id: draft.organization_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, draft: ActivityDraft, now: DateTime<Utc>) {
        let created_at = self.created_at;
        *self = Self::build(self.id, draft, now);
        self.created_at = created_at;
    }

    fn matches(&self, query: &ActivityQuery) -> bool {
        query.measure_id.is_none_or(|id| self.measure_id == id)
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        newest(a.start_date, b.start_date, a.id, b.id)
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            reference("medida", Measure::KIND, self.measure_id),
            reference(
                "organismo_responsable",
                Organization::KIND,
                self.organization_id,
            ),
        ]
    }

    fn repository(store: &dyn Store) -> &dyn Repository<Self> {
        store.activities()
    }
}
