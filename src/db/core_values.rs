use crate::errors::{AppError, AppResult};
use crate::models::CoreValue;
use rusqlite::{params, Connection, OptionalExtension};

/// Core values form a single-level tree: a child's parent must itself be a root.
pub fn insert_core_value(
    conn: &Connection,
    name: &str,
    description: &str,
    parent_core_value_id: Option<i64>,
) -> AppResult<CoreValue> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("core value name cannot be blank".to_string()));
    }
    if let Some(parent_id) = parent_core_value_id {
        let parent = get_core_value(conn, parent_id)?;
        if parent.parent_core_value_id.is_some() {
            return Err(AppError::Validation(format!(
                "core value {} is itself a child and cannot be used as a parent",
                parent_id
            )));
        }
    }
    conn.execute(
        "INSERT INTO core_values (name, description, parent_core_value_id) VALUES (?1, ?2, ?3)",
        params![name.trim(), description, parent_core_value_id],
    )?;
    Ok(CoreValue {
        id: conn.last_insert_rowid(),
        name: name.trim().to_string(),
        description: description.to_string(),
        parent_core_value_id,
    })
}

pub fn get_core_value(conn: &Connection, core_value_id: i64) -> AppResult<CoreValue> {
    conn.query_row(
        "SELECT id, name, description, parent_core_value_id FROM core_values WHERE id = ?1",
        params![core_value_id],
        |row| {
            Ok(CoreValue {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                parent_core_value_id: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(AppError::CoreValueNotFound(core_value_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn hierarchy_is_one_level_deep() {
        let db = Database::in_memory().expect("db");
        let root = db
            .run(|conn| insert_core_value(conn, "Ownership", "Own the outcome", None))
            .expect("root");
        let child = db
            .run(|conn| insert_core_value(conn, "Follow-through", "", Some(root.id)))
            .expect("child");
        assert_eq!(child.parent_core_value_id, Some(root.id));

        let err = db
            .run(|conn| insert_core_value(conn, "Grandchild", "", Some(child.id)))
            .expect_err("nested");
        assert!(err.to_string().contains("cannot be used as a parent"));

        let err = db
            .run(|conn| insert_core_value(conn, "Orphan", "", Some(404)))
            .expect_err("missing parent");
        assert!(matches!(err, AppError::CoreValueNotFound(404)));
    }

    #[test]
    fn lookup_reports_missing_core_value() {
        let db = Database::in_memory().expect("db");
        let err = db.run(|conn| get_core_value(conn, 5)).expect_err("missing");
        assert!(matches!(err, AppError::CoreValueNotFound(5)));
    }
}
