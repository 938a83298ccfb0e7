use crate::errors::{AppError, AppResult};
use crate::models::Grade;
use rusqlite::{params, Connection, OptionalExtension};

pub fn insert_grade(conn: &Connection, name: &str, points: i64) -> AppResult<Grade> {
    if points < 0 {
        return Err(AppError::Validation(format!("grade points {} cannot be negative", points)));
    }
    conn.execute(
        "INSERT INTO grades (name, points) VALUES (?1, ?2)",
        params![name, points],
    )?;
    Ok(Grade {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        points,
    })
}

pub fn get_grade(conn: &Connection, grade_id: i64) -> AppResult<Option<Grade>> {
    let grade = conn
        .query_row(
            "SELECT id, name, points FROM grades WHERE id = ?1",
            params![grade_id],
            |row| {
                Ok(Grade {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    points: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(grade)
}
