//! Read-only display fields (`organismo_nombre`, `medida_nombre`, ...) added
//! next to the stored fields in API responses.

use std::collections::{BTreeMap, BTreeSet};

use ppda_storage::{Record, Store, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};

pub(crate) type Labels = Map<String, Value>;

/// A stored row together with the names of the rows it links to.
#[derive(Debug, Serialize)]
pub struct Presented<R> {
    #[serde(flatten)]
    pub row: R,
    #[serde(flatten)]
    pub labels: Labels,
}

pub(crate) fn labels<const N: usize>(pairs: [(&str, Option<&str>); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(field, value)| {
            let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
            (field.to_string(), value)
        })
        .collect()
}

/// Rows of `T` by id. Ids that no longer exist are left out.
pub(crate) async fn fetch<T: Record>(
    store: &dyn Store,
    ids: BTreeSet<i64>,
) -> Result<BTreeMap<i64, T>, StoreError> {
    let repo = T::repository(store);
    let mut found = BTreeMap::new();
    for id in ids {
        if let Some(row) = repo.get(id).await? {
            found.insert(id, row);
        }
    }
    Ok(found)
}
