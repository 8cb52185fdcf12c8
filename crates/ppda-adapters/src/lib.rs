//! External environmental data sources: fetchers and ingestion translators.

mod fetch;
mod translate;

use async_trait::async_trait;
use ppda_core::IndicatorSource;
use serde_json::Value as JsonValue;

pub use fetch::{FetcherConfig, HttpSourceFetcher, AIRECOO_URL, SNIFA_URL};
pub use translate::{translate, translate_airecoo, translate_snifa, TranslateError};

pub const CRATE_NAME: &str = "ppda-adapters";

/// Pulls the current payload of one upstream source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn source(&self) -> IndicatorSource;

    /// One attempt, no retries. `None` when the upstream could not be read.
    async fn fetch(&self) -> Option<JsonValue>;
}

/// Whether a fetched payload carries anything to ingest.
///
/// `null`, `false`, `0`, and empty strings, arrays or objects all count as
/// "no data", the same as a failed fetch.
pub fn has_data(payload: &JsonValue) -> bool {
    match payload {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_payloads_carry_no_data() {
        for payload in [json!(null), json!([]), json!({}), json!(""), json!(0), json!(false)] {
            assert!(!has_data(&payload), "{payload} should be empty");
        }
        assert!(has_data(&json!([{"parametro": "PM10", "valor": 40}])));
        assert!(has_data(&json!({"datos": []})));
    }
}
