use crate::errors::{AppError, AppResult};
use crate::models::{EpochMillis, NewUser, User};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, email, first_name, last_name, designation, profile_image_url, grade_id, reward_quota_balance, created_at";

pub fn insert_user(conn: &Connection, user: &NewUser, now: EpochMillis) -> AppResult<User> {
    let email = user.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("user email cannot be blank".to_string()));
    }
    conn.execute(
        "INSERT INTO users (email, first_name, last_name, designation, profile_image_url, grade_id, reward_quota_balance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            email,
            user.first_name,
            user.last_name,
            user.designation,
            user.profile_image_url,
            user.grade_id,
            user.reward_quota_balance,
            now
        ],
    )?;
    get_user(conn, conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, user_id: i64) -> AppResult<User> {
    find_user(conn, user_id)?.ok_or(AppError::UserNotFound(user_id))
}

pub fn find_user(conn: &Connection, user_id: i64) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let user = conn.query_row(&sql, params![user_id], parse_user_row).optional()?;
    Ok(user)
}

pub fn user_exists(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Registers a push token for a user; re-registering the same token is a no-op.
pub fn add_device_token(conn: &Connection, user_id: i64, token: &str, now: EpochMillis) -> AppResult<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("device token cannot be blank".to_string()));
    }
    if !user_exists(conn, user_id)? {
        return Err(AppError::UserNotFound(user_id));
    }
    conn.execute(
        "INSERT OR IGNORE INTO notification_tokens (user_id, token, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, now],
    )?;
    Ok(())
}

pub fn list_device_tokens(conn: &Connection, user_ids: &[i64]) -> AppResult<Vec<String>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!(
        "SELECT token FROM notification_tokens WHERE user_id IN ({}) ORDER BY created_at, token",
        placeholders
    );
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map(rusqlite::params_from_iter(user_ids.iter()), |row| {
        row.get::<_, String>(0)
    })?;
    let mut tokens = Vec::new();
    for row in rows {
        tokens.push(row?);
    }
    Ok(tokens)
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        designation: row.get(4)?,
        profile_image_url: row.get(5)?,
        grade_id: row.get(6)?,
        reward_quota_balance: row.get(7)?,
        created_at: row.get(8)?,
    })
}
