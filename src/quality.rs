// src/quality.rs

//! Data quality verdicts over a warehouse result set.
//!
//! The evaluator knows nothing about the relation being checked: the check
//! statement is expected to return a single row of counters (e.g.
//! `user_id_null_count`), and any positive numeric cell fails the check.

use crate::errors::ExecutorError;
use crate::warehouse::RowSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every counter in the row was zero (or non-numeric).
    Pass { columns: usize },
    Fail(QualityFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityFailure {
    /// The check statement produced no row at all.
    NoRows,
    /// First offending column, in result order.
    Column { column: String, value: String },
}

impl From<QualityFailure> for ExecutorError {
    fn from(failure: QualityFailure) -> Self {
        match failure {
            QualityFailure::NoRows => ExecutorError::NoRows,
            QualityFailure::Column { column, value } => {
                ExecutorError::DataQuality { column, value }
            }
        }
    }
}

/// Evaluate the first row of `rows`.
///
/// Extra rows are ignored; the check SQL is an aggregate and should never
/// produce them.
pub fn evaluate(rows: &RowSet) -> Verdict {
    let Some(first) = rows.first_row() else {
        return Verdict::Fail(QualityFailure::NoRows);
    };

    let mut columns = 0;
    for (column, value) in first {
        columns += 1;
        if value.is_positive() {
            return Verdict::Fail(QualityFailure::Column {
                column: column.to_string(),
                value: value.to_string(),
            });
        }
    }

    Verdict::Pass { columns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Value;

    #[test]
    fn positive_counter_fails() {
        let rows = RowSet::new(["x_null_count", "y_null_count"])
            .with_row(vec![Value::Int(0), Value::Int(2)]);
        assert_eq!(
            evaluate(&rows),
            Verdict::Fail(QualityFailure::Column {
                column: "y_null_count".to_string(),
                value: "2".to_string()
            })
        );
    }

    #[test]
    fn all_zero_passes() {
        let rows = RowSet::new(["x_null_count", "y_null_count"])
            .with_row(vec![Value::Int(0), Value::Int(0)]);
        assert_eq!(evaluate(&rows), Verdict::Pass { columns: 2 });
    }

    #[test]
    fn zero_rows_is_a_distinct_failure() {
        let rows = RowSet::new(["x_null_count"]);
        assert_eq!(evaluate(&rows), Verdict::Fail(QualityFailure::NoRows));

        let err: ExecutorError = QualityFailure::NoRows.into();
        assert_eq!(err, ExecutorError::NoRows);
    }

    #[test]
    fn fractional_and_boolean_values_fail_too() {
        let rows = RowSet::new(["ratio"]).with_row(vec![Value::Float(2.5)]);
        assert_eq!(
            evaluate(&rows),
            Verdict::Fail(QualityFailure::Column {
                column: "ratio".to_string(),
                value: "2.5".to_string()
            })
        );

        let rows = RowSet::new(["has_orphans"]).with_row(vec![Value::Bool(true)]);
        assert!(matches!(evaluate(&rows), Verdict::Fail(_)));
    }

    #[test]
    fn non_numeric_cells_do_not_fail() {
        let rows = RowSet::new(["note", "n_null_count"])
            .with_row(vec![Value::Text("ok".into()), Value::Null]);
        assert_eq!(evaluate(&rows), Verdict::Pass { columns: 2 });
    }
}
