//! Left join of a user-supplied cost request table onto the cost model.
//!
//! Every uploaded row is kept, in order. Rows without a cost-model match
//! get missing values in the cost columns. Key columns are checked on both
//! sides before any row is touched.

use std::collections::HashMap;

use crate::error::{JoinSchemaError, JoinSide};
use crate::models::{Table, Value};

/// Suffix for cost-model columns whose name is already used by the uploaded table.
pub const COLLISION_SUFFIX: &str = "_model";

/// Outcome of a join, with the matched-row count for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub table: Table,
    pub matched: usize,
}

fn key_indices(
    table: &Table,
    keys: &[&str],
    side: JoinSide,
) -> Result<Vec<usize>, JoinSchemaError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|k| !table.has_column(k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(JoinSchemaError { side, missing });
    }
    Ok(keys.iter().filter_map(|k| table.column_index(k)).collect())
}

fn row_key(row: &[Value], indices: &[usize]) -> Option<Vec<String>> {
    indices.iter().map(|&i| row[i].group_key()).collect()
}

/// Left-join `user` onto `cost` on `keys`.
///
/// The result carries all user columns followed by the non-key cost
/// columns. When the cost model has several rows for a key, the last one wins.
pub fn join_cost_model(
    user: &Table,
    cost: &Table,
    keys: &[&str],
) -> Result<JoinOutcome, JoinSchemaError> {
    let user_keys = key_indices(user, keys, JoinSide::Uploaded)?;
    let cost_keys = key_indices(cost, keys, JoinSide::CostModel)?;

    let carried: Vec<usize> = (0..cost.columns().len())
        .filter(|i| !cost_keys.contains(i))
        .collect();

    let mut columns: Vec<String> = user.columns().to_vec();
    for &i in &carried {
        let name = &cost.columns()[i];
        if user.has_column(name) {
            columns.push(format!("{name}{COLLISION_SUFFIX}"));
        } else {
            columns.push(name.clone());
        }
    }

    let mut lookup: HashMap<Vec<String>, &[Value]> = HashMap::new();
    for row in cost.rows() {
        if let Some(key) = row_key(row, &cost_keys) {
            lookup.insert(key, row);
        }
    }

    let mut matched = 0;
    let mut table = Table::new(columns);
    for row in user.rows() {
        let hit = row_key(row, &user_keys).and_then(|key| lookup.get(&key).copied());
        let mut out = row.clone();
        match hit {
            Some(cost_row) => {
                matched += 1;
                out.extend(carried.iter().map(|&i| cost_row[i].clone()));
            }
            None => out.extend(carried.iter().map(|_| Value::Missing)),
        }
        table.push_row(out);
    }

    Ok(JoinOutcome { table, matched })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::columns::*;

    fn cost_model() -> Table {
        Table::from_rows(
            [ORIGIN, DESTINATION, TRUCK_TYPE, TAT, TOTAL_COST_PER_TRIP],
            vec![
                vec![
                    "Pune".into(),
                    "Delhi".into(),
                    "32FT".into(),
                    Value::Number(4.0),
                    Value::Number(52000.0),
                ],
                vec![
                    "Pune".into(),
                    "Goa".into(),
                    "20FT".into(),
                    Value::Number(2.0),
                    Value::Number(18000.0),
                ],
            ],
        )
    }

    #[test]
    fn test_left_join_preserves_rows() {
        let user = Table::from_rows(
            [ORIGIN, DESTINATION, TRUCK_TYPE],
            vec![
                vec!["Pune".into(), "Delhi".into(), "32FT".into()],
                vec!["Pune".into(), "Chennai".into(), "32FT".into()],
            ],
        );
        let out = join_cost_model(&user, &cost_model(), &COST_JOIN_KEYS).unwrap();
        assert_eq!(out.table.len(), 2);
        assert_eq!(out.matched, 1);
        assert_eq!(
            out.table.columns(),
            &[ORIGIN, DESTINATION, TRUCK_TYPE, TAT, TOTAL_COST_PER_TRIP]
        );
        assert_eq!(out.table.get(0, TOTAL_COST_PER_TRIP), Some(&Value::Number(52000.0)));
        assert_eq!(out.table.get(1, TAT), Some(&Value::Missing));
        assert_eq!(out.table.get(1, DESTINATION), Some(&Value::Text("Chennai".into())));
    }

    #[test]
    fn test_missing_key_in_upload() {
        let user = Table::from_rows(
            [ORIGIN, DESTINATION],
            vec![vec!["Pune".into(), "Delhi".into()]],
        );
        let err = join_cost_model(&user, &cost_model(), &COST_JOIN_KEYS).unwrap_err();
        assert_eq!(err.side, JoinSide::Uploaded);
        assert_eq!(err.missing, vec!["TruckType"]);
    }

    #[test]
    fn test_missing_key_in_cost_model() {
        let user = Table::from_rows(
            COST_JOIN_KEYS,
            vec![vec!["Pune".into(), "Delhi".into(), "32FT".into()]],
        );
        let cost = Table::from_rows([ORIGIN, TRUCK_TYPE, TAT], Vec::<Vec<Value>>::new());
        let err = join_cost_model(&user, &cost, &COST_JOIN_KEYS).unwrap_err();
        assert_eq!(err.side, JoinSide::CostModel);
        assert_eq!(err.missing, vec!["Destination"]);
    }

    #[test]
    fn test_duplicate_cost_keys_last_wins() {
        let cost = Table::from_rows(
            [ORIGIN, DESTINATION, TRUCK_TYPE, TAT],
            vec![
                vec!["Pune".into(), "Delhi".into(), "32FT".into(), Value::Number(4.0)],
                vec!["Pune".into(), "Delhi".into(), "32FT".into(), Value::Number(5.0)],
            ],
        );
        let user = Table::from_rows(
            COST_JOIN_KEYS,
            vec![vec!["Pune".into(), "Delhi".into(), "32FT".into()]],
        );
        let out = join_cost_model(&user, &cost, &COST_JOIN_KEYS).unwrap();
        assert_eq!(out.table.len(), 1);
        assert_eq!(out.table.get(0, TAT), Some(&Value::Number(5.0)));
    }

    #[test]
    fn test_colliding_columns_suffixed() {
        let user = Table::from_rows(
            [ORIGIN, DESTINATION, TRUCK_TYPE, TAT],
            vec![vec!["Pune".into(), "Goa".into(), "20FT".into(), Value::Number(9.0)]],
        );
        let out = join_cost_model(&user, &cost_model(), &COST_JOIN_KEYS).unwrap();
        assert!(out.table.has_column("TAT_model"));
        assert_eq!(out.table.get(0, TAT), Some(&Value::Number(9.0)));
        assert_eq!(out.table.get(0, "TAT_model"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_numeric_truck_type_matches_text_key() {
        let cost = Table::from_rows(
            [ORIGIN, DESTINATION, TRUCK_TYPE, TAT],
            vec![vec!["Pune".into(), "Delhi".into(), "32".into(), Value::Number(4.0)]],
        );
        let user = Table::from_rows(
            COST_JOIN_KEYS,
            vec![vec!["Pune".into(), "Delhi".into(), Value::Number(32.0)]],
        );
        let out = join_cost_model(&user, &cost, &COST_JOIN_KEYS).unwrap();
        assert_eq!(out.matched, 1);
    }
}
