use super::is_unique_violation;
use crate::errors::{AppError, AppResult};
use crate::models::{EpochMillis, ReportStatus, ReportedAppreciation, Resolution};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REPORTED_SELECT: &str = "SELECT
    res.id, res.appreciation_id, res.reporting_comment, res.reported_by, res.reported_at,
    res.moderator_comment, res.moderated_by, res.moderated_at, res.status,
    a.description, cv.name, a.sender, a.receiver, a.is_valid
    FROM resolutions res
    JOIN appreciations a ON a.id = res.appreciation_id
    JOIN core_values cv ON cv.id = a.core_value_id";

pub fn insert_report(
    conn: &Connection,
    appreciation_id: i64,
    reported_by: i64,
    reporting_comment: &str,
    now: EpochMillis,
) -> AppResult<Resolution> {
    match conn.execute(
        "INSERT INTO resolutions (appreciation_id, reporting_comment, reported_by, reported_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            appreciation_id,
            reporting_comment,
            reported_by,
            now,
            ReportStatus::Reported.as_str()
        ],
    ) {
        Ok(_) => get_resolution(conn, conn.last_insert_rowid()),
        Err(error) if is_unique_violation(&error) => Err(AppError::RepeatedReport { appreciation_id }),
        Err(error) => Err(error.into()),
    }
}

pub fn has_duplicate_report(conn: &Connection, appreciation_id: i64, reported_by: i64) -> AppResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM resolutions WHERE appreciation_id = ?1 AND reported_by = ?2)",
        params![appreciation_id, reported_by],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Whether any report on the appreciation is still in a reward-blocking state.
pub fn has_blocking_report(conn: &Connection, appreciation_id: i64) -> AppResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM resolutions WHERE appreciation_id = ?1 AND status <> ?2)",
        params![appreciation_id, ReportStatus::Resolved.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

pub fn get_resolution(conn: &Connection, resolution_id: i64) -> AppResult<Resolution> {
    conn.query_row(
        "SELECT id, appreciation_id, reporting_comment, reported_by, reported_at,
                moderator_comment, moderated_by, moderated_at, status
         FROM resolutions WHERE id = ?1",
        params![resolution_id],
        parse_resolution_row,
    )
    .optional()?
    .ok_or(AppError::ResolutionNotFound(resolution_id))
}

/// Moves a report out of `reported`. A report already moderated is left untouched.
pub fn set_resolution_status(
    conn: &Connection,
    resolution_id: i64,
    status: ReportStatus,
    moderator_id: i64,
    moderator_comment: &str,
    now: EpochMillis,
) -> AppResult<Resolution> {
    let current = get_resolution(conn, resolution_id)?;
    if current.status != ReportStatus::Reported {
        return Err(AppError::ResolutionAlreadyModerated {
            resolution_id,
            status: current.status.as_str().to_string(),
        });
    }
    conn.execute(
        "UPDATE resolutions
         SET status = ?2, moderator_comment = ?3, moderated_by = ?4, moderated_at = ?5
         WHERE id = ?1",
        params![resolution_id, status.as_str(), moderator_comment, moderator_id, now],
    )?;
    get_resolution(conn, resolution_id)
}

pub fn get_reported_appreciation(conn: &Connection, resolution_id: i64) -> AppResult<ReportedAppreciation> {
    let sql = format!("{} WHERE res.id = ?1", REPORTED_SELECT);
    conn.query_row(&sql, params![resolution_id], parse_reported_row)
        .optional()?
        .ok_or(AppError::ResolutionNotFound(resolution_id))
}

pub fn list_reported_appreciations(conn: &Connection) -> AppResult<Vec<ReportedAppreciation>> {
    let sql = format!("{} ORDER BY res.reported_at DESC, res.id DESC", REPORTED_SELECT);
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map([], parse_reported_row)?;
    let mut reports = Vec::new();
    for row in rows {
        reports.push(row?);
    }
    Ok(reports)
}

fn parse_resolution_row(row: &Row<'_>) -> rusqlite::Result<Resolution> {
    let status: String = row.get(8)?;
    Ok(Resolution {
        id: row.get(0)?,
        appreciation_id: row.get(1)?,
        reporting_comment: row.get(2)?,
        reported_by: row.get(3)?,
        reported_at: row.get(4)?,
        moderator_comment: row.get(5)?,
        moderated_by: row.get(6)?,
        moderated_at: row.get(7)?,
        status: parse_status(&status)?,
    })
}

fn parse_reported_row(row: &Row<'_>) -> rusqlite::Result<ReportedAppreciation> {
    Ok(ReportedAppreciation {
        resolution: parse_resolution_row(row)?,
        appreciation_description: row.get(9)?,
        core_value_name: row.get(10)?,
        sender_id: row.get(11)?,
        receiver_id: row.get(12)?,
        appreciation_is_valid: row.get(13)?,
    })
}

fn parse_status(raw: &str) -> rusqlite::Result<ReportStatus> {
    match raw {
        "reported" => Ok(ReportStatus::Reported),
        "resolved" => Ok(ReportStatus::Resolved),
        "deleted" => Ok(ReportStatus::Deleted),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown report status '{}'", other),
            )),
        )),
    }
}
