// src/exec/target.rs

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ExecutorError;

static INSERT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bINSERT\s+INTO\s+([A-Za-z_][\w.]*)\s*\(")
        .expect("insert target pattern is valid")
});

/// Resolve the relation an `INSERT INTO <name>(...)` statement writes to.
///
/// An explicit column list is required, so the name is always followed by
/// `(`. Schema-qualified names are returned as written.
pub fn resolve_insert_target(sql: &str) -> Result<String, ExecutorError> {
    INSERT_TARGET
        .captures(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ExecutorError::TargetNotResolved(abbreviate(sql)))
}

fn abbreviate(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 60 {
        let head: String = flat.chars().take(60).collect();
        format!("{head}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_target_across_whitespace() {
        let sql = "\n  INSERT INTO users(\n user_id, level)\n SELECT DISTINCT userId, level FROM staging_events";
        assert_eq!(resolve_insert_target(sql).unwrap(), "users");
    }

    #[test]
    fn resolves_schema_qualified_lowercase_insert() {
        let sql = "insert into public.songs (song_id) select song_id from staging_songs";
        assert_eq!(resolve_insert_target(sql).unwrap(), "public.songs");
    }

    #[test]
    fn missing_column_list_is_not_resolved() {
        let err = resolve_insert_target("INSERT INTO users SELECT * FROM x").unwrap_err();
        assert!(matches!(err, ExecutorError::TargetNotResolved(_)));
    }

    #[test]
    fn long_statements_are_abbreviated_in_errors() {
        let sql = format!("SELECT {}", "x, ".repeat(50));
        match resolve_insert_target(&sql).unwrap_err() {
            ExecutorError::TargetNotResolved(snippet) => assert!(snippet.ends_with("...")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
