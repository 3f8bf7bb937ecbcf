//! Left outer join of a stored dataset against remote records.
//!
//! Keys are compared by their normalized text form so that a CSV cell `"42"`
//! matches a JSON number `42`. Null keys never match anything.

use crate::dataset::{CellValue, TabularDataset};
use crate::error::{JoinError, JoinSide};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Suffix appended to right-hand columns whose name is already taken.
pub const COLLISION_SUFFIX: &str = "_right";

/// Join `left` with `right` where `left[left_key] == right[right_key]`.
///
/// Every left row appears at least once. Output columns are the left columns
/// followed by the right columns except `right_key`, renamed on collision.
pub fn join(
    left: &TabularDataset,
    right: &TabularDataset,
    left_key: &str,
    right_key: &str,
) -> Result<TabularDataset, JoinError> {
    let left_idx = left
        .column_index(left_key)
        .ok_or_else(|| JoinError::UnknownColumn {
            side: JoinSide::Left,
            name: left_key.to_string(),
        })?;
    let right_idx = right
        .column_index(right_key)
        .ok_or_else(|| JoinError::UnknownColumn {
            side: JoinSide::Right,
            name: right_key.to_string(),
        })?;

    let right_columns: Vec<usize> = (0..right.num_columns())
        .filter(|&i| i != right_idx)
        .collect();
    let columns = output_columns(left, right, &right_columns);

    let mut index: HashMap<Cow<'_, str>, Vec<usize>> = HashMap::new();
    for (row_idx, row) in right.rows().enumerate() {
        if let Some(key) = normalize_key(&row.values()[right_idx]) {
            index.entry(key).or_default().push(row_idx);
        }
    }

    let mut rows = Vec::with_capacity(left.num_rows());
    let mut matched_rows = 0usize;
    for left_row in left.rows() {
        let matches = normalize_key(&left_row.values()[left_idx])
            .and_then(|key| index.get(key.as_ref()))
            .map(Vec::as_slice)
            .unwrap_or_default();

        if matches.is_empty() {
            let mut out = Vec::with_capacity(columns.len());
            out.extend_from_slice(left_row.values());
            out.resize(columns.len(), CellValue::Null);
            rows.push(out);
            continue;
        }

        matched_rows += 1;
        for &right_row_idx in matches {
            let right_values = right
                .row(right_row_idx)
                .map(|r| r.values())
                .unwrap_or_default();
            let mut out = Vec::with_capacity(columns.len());
            out.extend_from_slice(left_row.values());
            out.extend(right_columns.iter().map(|&i| right_values[i].clone()));
            rows.push(out);
        }
    }

    tracing::debug!(
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
        matched_rows,
        output_rows = rows.len(),
        "Join completed"
    );

    Ok(TabularDataset::from_parts_unchecked(columns, rows))
}

/// Text form used to compare join keys, or `None` for null.
///
/// Integral floats drop their fraction so `42.0` matches `42`.
pub fn normalize_key(value: &CellValue) -> Option<Cow<'_, str>> {
    match value {
        CellValue::Null => None,
        CellValue::String(s) => Some(Cow::Borrowed(s.as_str())),
        CellValue::Bool(true) => Some(Cow::Borrowed("true")),
        CellValue::Bool(false) => Some(Cow::Borrowed("false")),
        CellValue::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    // 2^53: beyond this not every integer is representable.
                    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                        return Some(Cow::Owned(format!("{}", f as i64)));
                    }
                }
            }
            Some(Cow::Owned(n.to_string()))
        }
    }
}

fn output_columns(
    left: &TabularDataset,
    right: &TabularDataset,
    right_columns: &[usize],
) -> Vec<String> {
    let mut taken: HashSet<String> = left.columns().iter().cloned().collect();
    let mut columns = left.columns().to_vec();

    for &i in right_columns {
        let name = &right.columns()[i];
        let mut candidate = name.clone();
        if taken.contains(&candidate) {
            candidate = format!("{}{}", name, COLLISION_SUFFIX);
            let mut n = 2;
            while taken.contains(&candidate) {
                candidate = format!("{}{}_{}", name, COLLISION_SUFFIX, n);
                n += 1;
            }
        }
        taken.insert(candidate.clone());
        columns.push(candidate);
    }

    columns
}
