//! Conversion of remote JSON records into a dataset.

use csvhub_core::{CellValue, FetchError, TabularDataset};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Turn a decoded response body into rows.
///
/// Accepts an array of objects or a single object. Columns are the union of
/// keys in first-seen order; a key missing from a record becomes null.
pub fn records_to_dataset(body: Value) -> Result<TabularDataset, FetchError> {
    let records = match body {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(FetchError::MalformedBody(format!(
                    "element {} is {}, expected an object",
                    i,
                    json_kind(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(map) => vec![map],
        other => {
            return Err(FetchError::MalformedBody(format!(
                "expected an array of objects or an object, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in &records {
        for key in record.keys() {
            if !positions.contains_key(key) {
                positions.insert(key.clone(), columns.len());
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .into_iter()
        .map(|record| to_row(record, &positions, columns.len()))
        .collect();

    TabularDataset::from_rows(columns, rows).map_err(|e| FetchError::MalformedBody(e.to_string()))
}

fn to_row(record: Map<String, Value>, positions: &HashMap<String, usize>, width: usize) -> Vec<CellValue> {
    let mut row = vec![CellValue::Null; width];
    for (key, value) in record {
        if let Some(&i) = positions.get(&key) {
            row[i] = CellValue::from_json(value);
        }
    }
    row
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_of_objects() {
        let ds = records_to_dataset(json!([
            {"uid": 1, "score": 10},
            {"uid": 3, "score": 30}
        ]))
        .unwrap();
        assert_eq!(ds.columns(), ["uid", "score"]);
        assert_eq!(ds.num_rows(), 2);
        assert_eq!(ds.row(1).unwrap().get("score"), Some(&CellValue::from(30i64)));
    }

    #[test]
    fn test_heterogeneous_keys_union_in_first_seen_order() {
        let ds = records_to_dataset(json!([
            {"b": 1, "a": "x"},
            {"c": true, "b": 2}
        ]))
        .unwrap();
        assert_eq!(ds.columns(), ["b", "a", "c"]);
        let second = ds.row(1).unwrap();
        assert_eq!(second.get("a"), Some(&CellValue::Null));
        assert_eq!(second.get("c"), Some(&CellValue::Bool(true)));
    }

    #[test]
    fn test_single_object_is_one_row() {
        let ds = records_to_dataset(json!({"id": "k1", "tags": ["a", "b"]})).unwrap();
        assert_eq!(ds.num_rows(), 1);
        assert_eq!(
            ds.row(0).unwrap().get("tags"),
            Some(&CellValue::from(r#"["a","b"]"#))
        );
    }

    #[test]
    fn test_empty_array_has_no_columns() {
        let ds = records_to_dataset(json!([])).unwrap();
        assert_eq!(ds.num_columns(), 0);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_rejects_non_record_bodies() {
        for body in [json!(42), json!("text"), json!(null), json!([{"a": 1}, 5])] {
            assert!(
                matches!(records_to_dataset(body.clone()), Err(FetchError::MalformedBody(_))),
                "expected {} to be rejected",
                body
            );
        }
    }
}
