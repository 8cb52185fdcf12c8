use ppda_core::{
    IndicatorDraft, IndicatorSource, INDICATOR_NAME_MAX, INDICATOR_UNIT_MAX, SNIFA_UNIT,
};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Rejections of a whole upstream batch. No record of a failed batch is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("Los datos deben ser una lista")]
    NotAList,
    #[error("Datos incompletos en {feed}: {record}")]
    MissingFields { feed: IndicatorSource, record: String },
    #[error("Valor inválido en {feed} para `{field}`: {record}")]
    InvalidValue {
        feed: IndicatorSource,
        field: &'static str,
        record: String,
    },
}

const SNIFA_FIELDS: &[&str] = &["parametro", "valor"];
const AIRECOO_FIELDS: &[&str] = &["nombre", "valor", "unidad"];

pub fn translate(
    source: IndicatorSource,
    payload: &JsonValue,
) -> Result<Vec<IndicatorDraft>, TranslateError> {
    match source {
        IndicatorSource::Snifa => translate_snifa(payload),
        IndicatorSource::Airecoo => translate_airecoo(payload),
    }
}

/// SNIFA records: `{"parametro": .., "valor": ..}`, always in µg/m³.
pub fn translate_snifa(payload: &JsonValue) -> Result<Vec<IndicatorDraft>, TranslateError> {
    let feed = IndicatorSource::Snifa;
    records(feed, payload, SNIFA_FIELDS)?
        .into_iter()
        .map(|record| -> Result<IndicatorDraft, TranslateError> {
            Ok(IndicatorDraft::ingested(
                text(feed, record, "parametro", INDICATOR_NAME_MAX)?,
                number(feed, record, "valor")?,
                SNIFA_UNIT.to_string(),
                feed,
            ))
        })
        .collect()
}

/// Airecoo records: `{"nombre": .., "valor": .., "unidad": ..}`.
pub fn translate_airecoo(payload: &JsonValue) -> Result<Vec<IndicatorDraft>, TranslateError> {
    let feed = IndicatorSource::Airecoo;
    records(feed, payload, AIRECOO_FIELDS)?
        .into_iter()
        .map(|record| -> Result<IndicatorDraft, TranslateError> {
            Ok(IndicatorDraft::ingested(
                text(feed, record, "nombre", INDICATOR_NAME_MAX)?,
                number(feed, record, "valor")?,
                text(feed, record, "unidad", INDICATOR_UNIT_MAX)?,
                feed,
            ))
        })
        .collect()
}

/// Checks the batch shape before any record is mapped.
fn records<'a>(
    feed: IndicatorSource,
    payload: &'a JsonValue,
    required: &[&str],
) -> Result<Vec<&'a Map<String, JsonValue>>, TranslateError> {
    let items = payload.as_array().ok_or(TranslateError::NotAList)?;
    items
        .iter()
        .map(|item| match item.as_object() {
            Some(record) if required.iter().all(|key| record.contains_key(*key)) => Ok(record),
            _ => Err(TranslateError::MissingFields {
                feed,
                record: item.to_string(),
            }),
        })
        .collect()
}

fn invalid(feed: IndicatorSource, field: &'static str, record: &Map<String, JsonValue>) -> TranslateError {
    TranslateError::InvalidValue {
        feed,
        field,
        record: JsonValue::Object(record.clone()).to_string(),
    }
}

/// Text value that fits the column it is stored in.
fn text(
    feed: IndicatorSource,
    record: &Map<String, JsonValue>,
    field: &'static str,
    max_chars: usize,
) -> Result<String, TranslateError> {
    let value = match record.get(field) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(v @ (JsonValue::Number(_) | JsonValue::Bool(_))) => v.to_string(),
        _ => return Err(invalid(feed, field, record)),
    };
    if value.chars().count() > max_chars {
        return Err(invalid(feed, field, record));
    }
    Ok(value)
}

fn number(
    feed: IndicatorSource,
    record: &Map<String, JsonValue>,
    field: &'static str,
) -> Result<f64, TranslateError> {
    let value = match record.get(field) {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(feed, field, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppda_core::INGEST_ORGANIZATION_ID;
    use serde_json::json;

    #[test]
    fn snifa_records_map_one_to_one() {
        let drafts = translate_snifa(&json!([
            {"parametro": "PM2.5", "valor": 12.3},
            {"parametro": "SO2", "valor": "8", "estacion": "Quintero"}
        ]))
        .unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].name, "PM2.5");
        assert_eq!(drafts[0].value, 12.3);
        assert_eq!(drafts[0].unit, "µg/m³");
        assert_eq!(drafts[0].source, Some(IndicatorSource::Snifa));
        assert_eq!(drafts[0].organization_id, INGEST_ORGANIZATION_ID);
        assert_eq!(drafts[1].value, 8.0);
    }

    #[test]
    fn airecoo_keeps_upstream_unit() {
        let drafts = translate_airecoo(&json!([
            {"nombre": "O3", "valor": 61, "unidad": "ppb"}
        ]))
        .unwrap();
        assert_eq!(drafts[0].unit, "ppb");
        assert_eq!(drafts[0].source, Some(IndicatorSource::Airecoo));
    }

    #[test]
    fn one_incomplete_record_rejects_the_batch() {
        let err = translate_snifa(&json!([
            {"parametro": "PM2.5", "valor": 12.3},
            {"parametro": "PM10"}
        ]))
        .unwrap_err();
        assert!(matches!(err, TranslateError::MissingFields { feed: IndicatorSource::Snifa, .. }));
        assert!(err.to_string().starts_with("Datos incompletos en SNIFA"));

        for missing in ["nombre", "valor", "unidad"] {
            let mut record = json!({"nombre": "NO2", "valor": 4, "unidad": "ppb"});
            record.as_object_mut().unwrap().remove(missing);
            let err = translate_airecoo(&json!([record])).unwrap_err();
            assert!(matches!(err, TranslateError::MissingFields { .. }), "{missing}");
        }
    }

    #[test]
    fn payload_must_be_a_list() {
        let err = translate(IndicatorSource::Airecoo, &json!({"nombre": "O3"})).unwrap_err();
        assert_eq!(err, TranslateError::NotAList);
        assert_eq!(err.to_string(), "Los datos deben ser una lista");
    }

    #[test]
    fn non_object_records_count_as_incomplete() {
        let err = translate_snifa(&json!(["PM2.5"])).unwrap_err();
        assert!(matches!(err, TranslateError::MissingFields { .. }));
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let err = translate_snifa(&json!([{"parametro": "PM2.5", "valor": "alto"}])).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidValue { field: "valor", .. }));
    }

    #[test]
    fn oversized_text_rejects_the_batch() {
        let long_name = "P".repeat(INDICATOR_NAME_MAX + 1);
        let err = translate_snifa(&json!([
            {"parametro": "PM2.5", "valor": 1},
            {"parametro": long_name, "valor": 2}
        ]))
        .unwrap_err();
        assert!(matches!(err, TranslateError::InvalidValue { field: "parametro", .. }));

        let long_unit = "u".repeat(INDICATOR_UNIT_MAX + 1);
        let err = translate_airecoo(&json!([{"nombre": "O3", "valor": 61, "unidad": long_unit}])).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidValue { feed: IndicatorSource::Airecoo, field: "unidad", .. }));

        let at_limit = "µ".repeat(INDICATOR_UNIT_MAX);
        let drafts = translate_airecoo(&json!([{"nombre": "O3", "valor": 61, "unidad": at_limit}])).unwrap();
        assert_eq!(drafts[0].unit.chars().count(), INDICATOR_UNIT_MAX);
    }

    #[test]
    fn negative_upstream_values_are_kept() {
        let drafts = translate_snifa(&json!([{"parametro": "T", "valor": -2.5}])).unwrap();
        assert_eq!(drafts[0].value, -2.5);
    }
}
