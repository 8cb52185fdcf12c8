use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{is_valid_email, Validate, ValidationContext, ValidationError};
use crate::{
    AlertState, ApprovalState, Group, IndicatorSource, MeasureKind, OrganizationCode, Priority,
    ProgressState,
};

// ── Accounts ────────────────────────────────────────────────────────────────

/// Login account and its group memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(rename = "grupos")]
    pub groups: Vec<Group>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn in_any(&self, groups: &[Group]) -> bool {
        self.groups.iter().any(|g| groups.contains(g))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountDraft {
    pub username: String,
    #[serde(rename = "grupos", default)]
    pub groups: Vec<Group>,
}

impl Validate for AccountDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("username", &self.username);
        err.max_len("username", &self.username, 150);
        err.into_result()
    }
}

/// Role label shown next to an account; authorization uses groups instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(rename = "usuario")]
    pub account_id: i64,
    #[serde(rename = "rol")]
    pub role: String,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfileDraft {
    #[serde(rename = "usuario")]
    pub account_id: i64,
    #[serde(rename = "rol")]
    pub role: String,
}

impl Validate for UserProfileDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("rol", &self.role);
        err.max_len("rol", &self.role, 50);
        err.into_result()
    }
}

// ── Organizations and plans ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub code: OrganizationCode,
    #[serde(rename = "contacto")]
    pub contact_email: Option<String>,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrganizationDraft {
    #[serde(rename = "nombre")]
    pub code: OrganizationCode,
    #[serde(rename = "contacto")]
    pub contact_email: Option<String>,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
}

impl Validate for OrganizationDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if let Some(email) = self.contact_email.as_deref().filter(|e| !e.is_empty()) {
            if !is_valid_email(email) {
                err.add("contacto", "Introduzca una dirección de correo electrónico válida.");
            }
        }
        if let Some(phone) = &self.phone {
            err.max_len("telefono", phone, 15);
        }
        err.into_result()
    }
}

/// Atmospheric pollution prevention and remediation plan (PPDA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "organismo")]
    pub organization_id: Option<i64>,
    #[serde(rename = "creado_por")]
    pub created_by: Option<i64>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlanDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "organismo")]
    pub organization_id: Option<i64>,
    /// Set from the authenticated caller, never from the request body.
    #[serde(skip_deserializing)]
    pub created_by: Option<i64>,
}

impl Validate for PlanDraft {
    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("nombre", &self.name);
        err.max_len("nombre", &self.name, 200);
        if ctx.is_create() && self.start_date < ctx.today {
            err.add("fecha_inicio", "La fecha de inicio no puede ser en el pasado.");
        }
        err.date_order(self.start_date, self.end_date);
        err.into_result()
    }
}

// ── Measures and progress ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub kind: MeasureKind,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "prioridad")]
    pub priority: Priority,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeasureDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "tipo")]
    pub kind: MeasureKind,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "prioridad", default)]
    pub priority: Priority,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
}

impl Validate for MeasureDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("nombre", &self.name);
        err.max_len("nombre", &self.name, 255);
        err.into_result()
    }
}

/// Completion tracking for a measure ("medida de avance").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: i64,
    #[serde(rename = "medida")]
    pub measure_id: i64,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_limite")]
    pub deadline: NaiveDate,
    #[serde(rename = "avance")]
    pub progress: i16,
    #[serde(rename = "estado")]
    pub state: ProgressState,
    #[serde(rename = "observaciones")]
    pub observations: String,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressRecordDraft {
    #[serde(rename = "medida")]
    pub measure_id: i64,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_limite")]
    pub deadline: NaiveDate,
    #[serde(rename = "avance", default)]
    pub progress: i16,
    #[serde(rename = "estado", default)]
    pub state: ProgressState,
    #[serde(rename = "observaciones", default)]
    pub observations: String,
}

impl Validate for ProgressRecordDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.percentage("avance", f64::from(self.progress), "El avance debe estar entre 0 y 100.");
        err.into_result()
    }
}

// ── Indicators and alerts ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "valor")]
    pub value: f64,
    #[serde(rename = "unidad")]
    pub unit: String,
    #[serde(rename = "fecha_registro")]
    pub recorded_on: NaiveDate,
    #[serde(rename = "organismo_sectorial")]
    pub organization_id: i64,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
    /// Path of the evidence file relative to the attachments root.
    #[serde(rename = "medio_verificacion")]
    pub evidence_file: Option<String>,
    #[serde(rename = "fuente")]
    pub source: Option<IndicatorSource>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

impl Indicator {
    pub fn to_draft(&self) -> IndicatorDraft {
        IndicatorDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            value: self.value,
            unit: self.unit.clone(),
            organization_id: self.organization_id,
            plan_id: self.plan_id,
            evidence_file: self.evidence_file.clone(),
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndicatorDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "valor")]
    pub value: f64,
    #[serde(rename = "unidad", default)]
    pub unit: String,
    #[serde(rename = "organismo_sectorial")]
    pub organization_id: i64,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
    /// Only set through the evidence upload endpoint.
    #[serde(skip_deserializing)]
    pub evidence_file: Option<String>,
    /// Only set by the ingestion pipeline.
    #[serde(skip_deserializing)]
    pub source: Option<IndicatorSource>,
}

impl IndicatorDraft {
    /// Draft for a machine-ingested measurement.
    pub fn ingested(name: String, value: f64, unit: String, source: IndicatorSource) -> Self {
        Self {
            name,
            description: String::new(),
            value,
            unit,
            organization_id: crate::INGEST_ORGANIZATION_ID,
            plan_id: None,
            evidence_file: None,
            source: Some(source),
        }
    }
}

impl Validate for IndicatorDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("nombre", &self.name);
        err.max_len("nombre", &self.name, crate::INDICATOR_NAME_MAX);
        err.max_len("unidad", &self.unit, crate::INDICATOR_UNIT_MAX);
        if !self.value.is_finite() {
            err.add("valor", "Introduzca un número válido.");
        } else if self.value < 0.0 {
            err.add("valor", "El valor no puede ser negativo.");
        }
        err.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub id: i64,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "fecha_alerta")]
    pub raised_at: DateTime<Utc>,
    #[serde(rename = "estado")]
    pub state: AlertState,
    #[serde(rename = "organismo_sectorial")]
    pub organization_id: i64,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CriticalAlertDraft {
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "estado")]
    pub state: AlertState,
    #[serde(rename = "organismo_sectorial")]
    pub organization_id: i64,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
}

impl Validate for CriticalAlertDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("descripcion", &self.description);
        err.into_result()
    }
}

// ── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualReport {
    pub id: i64,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "periodo")]
    pub period: NaiveDate,
    #[serde(rename = "medida")]
    pub progress_record_id: i64,
    /// Compliance percentage for the period.
    #[serde(rename = "cumplimiento")]
    pub compliance: f64,
    #[serde(rename = "observaciones")]
    pub observations: Option<String>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnnualReportDraft {
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "periodo")]
    pub period: NaiveDate,
    #[serde(rename = "medida")]
    pub progress_record_id: i64,
    #[serde(rename = "cumplimiento")]
    pub compliance: f64,
    #[serde(rename = "observaciones")]
    pub observations: Option<String>,
}

impl Validate for AnnualReportDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.percentage(
            "cumplimiento",
            self.compliance,
            "El cumplimiento debe estar entre 0 y 100.",
        );
        err.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub id: i64,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "periodo")]
    pub period: NaiveDate,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
    #[serde(rename = "resumen_actividades")]
    pub activity_summary: String,
    #[serde(rename = "reportes_anuales")]
    pub annual_report_ids: Vec<i64>,
    #[serde(rename = "cumplimiento")]
    pub compliance: f64,
    #[serde(rename = "estado_aprobacion")]
    pub approval: ApprovalState,
    #[serde(rename = "archivo_reporte")]
    pub summary_file: Option<String>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

impl ConsolidatedReport {
    pub fn to_draft(&self) -> ConsolidatedReportDraft {
        ConsolidatedReportDraft {
            organization_id: self.organization_id,
            period: self.period,
            plan_id: self.plan_id,
            activity_summary: self.activity_summary.clone(),
            annual_report_ids: self.annual_report_ids.clone(),
            compliance: self.compliance,
            approval: self.approval,
            summary_file: self.summary_file.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsolidatedReportDraft {
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "periodo")]
    pub period: NaiveDate,
    #[serde(rename = "ppda")]
    pub plan_id: Option<i64>,
    #[serde(rename = "resumen_actividades")]
    pub activity_summary: String,
    #[serde(rename = "reportes_anuales", default)]
    pub annual_report_ids: Vec<i64>,
    #[serde(rename = "cumplimiento")]
    pub compliance: f64,
    #[serde(rename = "estado_aprobacion", default)]
    pub approval: ApprovalState,
    /// Only set through the report file upload endpoint.
    #[serde(skip_deserializing)]
    pub summary_file: Option<String>,
}

impl Validate for ConsolidatedReportDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("resumen_actividades", &self.activity_summary);
        err.percentage(
            "cumplimiento",
            self.compliance,
            "El cumplimiento debe estar entre 0 y 100.",
        );
        err.into_result()
    }
}

// ── Activities ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "medida")]
    pub measure_id: i64,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "fecha_actualizacion")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityDraft {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(rename = "fecha_termino")]
    pub end_date: NaiveDate,
    #[serde(rename = "medida")]
    pub measure_id: i64,
    #[serde(rename = "organismo_responsable")]
    pub organization_id: i64,
}

impl Validate for ActivityDraft {
    fn validate(&self, _ctx: &ValidationContext) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        err.not_blank("nombre", &self.name);
        err.max_len("nombre", &self.name, 255);
        err.date_order(self.start_date, self.end_date);
        err.into_result()
    }
}

// ── List filters ────────────────────────────────────────────────────────────

/// Filter for resources listed without query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NoFilter {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrganizationQuery {
    /// Case-insensitive substring of the organization code.
    #[serde(rename = "nombre")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlanQuery {
    #[serde(rename = "organismo_id")]
    pub organization_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressRecordQuery {
    #[serde(rename = "estado")]
    pub state: Option<ProgressState>,
    #[serde(rename = "avance_min")]
    pub progress_min: Option<i16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndicatorQuery {
    #[serde(rename = "organismo_id")]
    pub organization_id: Option<i64>,
    #[serde(rename = "ppda_id")]
    pub plan_id: Option<i64>,
    #[serde(rename = "fuente")]
    pub source: Option<IndicatorSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActivityQuery {
    #[serde(rename = "medida_id")]
    pub measure_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnnualReportQuery {
    #[serde(rename = "periodo")]
    pub period: Option<NaiveDate>,
    #[serde(rename = "organismo_id")]
    pub organization_id: Option<i64>,
}
