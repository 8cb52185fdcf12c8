//! Core domain model for the PPDA compliance reporting service.
//!
//! Entities are plain serde structs whose JSON field names follow the
//! Spanish wire contract of the reporting API. Choice lists are closed
//! enums; every consumer matches on them instead of comparing strings.

mod model;
mod validation;

pub use model::*;
pub use validation::{Operation, Validate, ValidationContext, ValidationError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "ppda-core";

/// Organization id that machine-ingested indicators are attached to.
///
/// Placeholder carried over from the first deployment, where the first
/// organization row always had id 1. Kept as-is until ownership of
/// ingested data is decided.
pub const INGEST_ORGANIZATION_ID: i64 = 1;

/// Unit recorded for SNIFA measurements, which arrive without one.
pub const SNIFA_UNIT: &str = "µg/m³";

/// Column limits of `indicators.name` and `indicators.unit`.
pub const INDICATOR_NAME_MAX: usize = 255;
pub const INDICATOR_UNIT_MAX: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Sector regulatory bodies ("organismos sectoriales").
    pub enum OrganizationCode {
        Sea => "SEA",
        Sec => "SEC",
        Irv => "IRV",
        Dgtm => "DGTM",
        Conaf => "CONAF",
        Sag => "SAG",
    }
}

impl OrganizationCode {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sea => "Servicio de Evaluación Ambiental",
            Self::Sec => "Superintendencia de Electricidad y Combustible",
            Self::Irv => "Intendencia Regional de Valparaíso",
            Self::Dgtm => "Dirección General del Territorio Marítimo y de Marina Mercante",
            Self::Conaf => "Corporación Nacional Forestal",
            Self::Sag => "Servicio Agrícola y Ganadero",
        }
    }
}

wire_enum! {
    pub enum MeasureKind {
        Regulatory => "regulatoria",
        NonRegulatory => "no_regulatoria",
    }
}

impl MeasureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Regulatory => "Regulatoria",
            Self::NonRegulatory => "No Regulatoria",
        }
    }
}

wire_enum! {
    pub enum Priority {
        High => "alta",
        Medium => "media",
        Low => "baja",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

wire_enum! {
    /// Completion state of a progress record.
    pub enum ProgressState {
        Pending => "P",
        InProgress => "E",
        Completed => "C",
        Delayed => "R",
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::Pending
    }
}

impl ProgressState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::InProgress => "En progreso",
            Self::Completed => "Completado",
            Self::Delayed => "Retrasado",
        }
    }
}

wire_enum! {
    pub enum AlertState {
        Pending => "pendiente",
        Resolved => "resuelta",
    }
}

wire_enum! {
    pub enum ApprovalState {
        Pending => "pendiente",
        Approved => "aprobado",
        Rejected => "rechazado",
    }
}

impl Default for ApprovalState {
    fn default() -> Self {
        Self::Pending
    }
}

wire_enum! {
    /// External data sources feeding the ingestion pipeline.
    pub enum IndicatorSource {
        Snifa => "SNIFA",
        Airecoo => "Airecoo",
    }
}

impl IndicatorSource {
    /// Lower-case identifier used in routes, config keys and CLI arguments.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Snifa => "snifa",
            Self::Airecoo => "airecoo",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.slug().eq_ignore_ascii_case(slug))
    }
}

wire_enum! {
    /// Account groups that drive authorization.
    pub enum Group {
        Admin => "admin",
        User => "user",
        Auditor => "auditor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip_through_from_str() {
        for code in OrganizationCode::ALL {
            assert_eq!(code.as_str().parse::<OrganizationCode>().unwrap(), *code);
        }
        assert_eq!("E".parse::<ProgressState>().unwrap(), ProgressState::InProgress);
        assert_eq!("no_regulatoria".parse::<MeasureKind>().unwrap(), MeasureKind::NonRegulatory);
    }

    #[test]
    fn unknown_wire_value_is_rejected() {
        let err = "XYZ".parse::<OrganizationCode>().unwrap_err();
        assert_eq!(err.kind, "OrganizationCode");
        assert!(err.to_string().contains("XYZ"));
    }

    #[test]
    fn enums_serialize_with_wire_names() {
        assert_eq!(serde_json::to_string(&IndicatorSource::Snifa).unwrap(), "\"SNIFA\"");
        assert_eq!(serde_json::to_string(&Priority::default()).unwrap(), "\"media\"");
        let state: ProgressState = serde_json::from_str("\"R\"").unwrap();
        assert_eq!(state, ProgressState::Delayed);
    }

    #[test]
    fn source_slugs_are_case_insensitive() {
        assert_eq!(IndicatorSource::from_slug("SNIFA"), Some(IndicatorSource::Snifa));
        assert_eq!(IndicatorSource::from_slug("airecoo"), Some(IndicatorSource::Airecoo));
        assert_eq!(IndicatorSource::from_slug("sinca"), None);
    }

    #[test]
    fn organization_display_names() {
        assert_eq!(OrganizationCode::Sea.display_name(), "Servicio de Evaluación Ambiental");
        assert_eq!(OrganizationCode::Sag.to_string(), "SAG");
    }
}
