use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

/// Which write produced the draft being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub today: NaiveDate,
    pub operation: Operation,
}

impl ValidationContext {
    pub fn new(today: NaiveDate, operation: Operation) -> Self {
        Self { today, operation }
    }

    pub fn now(operation: Operation) -> Self {
        Self::new(Utc::now().date_naive(), operation)
    }

    pub fn is_create(&self) -> bool {
        self.operation == Operation::Create
    }
}

/// Field-level validation failures keyed by wire field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(name, message);
        err
    }

    pub fn add(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(name.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub(crate) fn max_len(&mut self, name: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                name,
                format!("Asegúrese de que este campo no tenga más de {max} caracteres."),
            );
        }
    }

    pub(crate) fn not_blank(&mut self, name: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(name, "Este campo no puede estar en blanco.");
        }
    }

    pub(crate) fn percentage(&mut self, name: &str, value: f64, message: &str) {
        if !(0.0..=100.0).contains(&value) {
            self.add(name, message);
        }
    }

    pub(crate) fn date_order(&mut self, start: NaiveDate, end: NaiveDate) {
        if start > end {
            self.add(
                "fecha_inicio",
                "La fecha de inicio no puede ser posterior a la fecha de término.",
            );
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Write-time validation of an input draft.
pub trait Validate {
    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidationError>;
}

/// Loose address check matching what the admin forms accepted.
pub(crate) fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_accumulate_per_field() {
        let mut err = ValidationError::new();
        err.add("avance", "uno");
        err.add("avance", "dos");
        err.add("nombre", "tres");
        assert_eq!(err.fields()["avance"].len(), 2);
        assert_eq!(err.to_string(), "avance: uno; avance: dos; nombre: tres");
    }

    #[test]
    fn serializes_as_field_map() {
        let err = ValidationError::field("cumplimiento", "fuera de rango");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({"cumplimiento": ["fuera de rango"]}));
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("contacto@sea.cl"));
        assert!(!is_valid_email("contacto.sea.cl"));
        assert!(!is_valid_email("contacto@sea"));
        assert!(!is_valid_email("a b@sea.cl"));
        assert!(!is_valid_email("@sea.cl"));
    }
}
