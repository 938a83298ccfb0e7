use super::is_unique_violation;
use crate::errors::{AppError, AppResult};
use crate::models::{EpochMillis, Reward};
use rusqlite::{params, Connection};

/// Inserts a reward. The `(appreciation_id, sender)` unique constraint turns a
/// concurrent duplicate into `RewardAlreadyPresent`.
pub fn insert_reward(
    conn: &Connection,
    appreciation_id: i64,
    sender_id: i64,
    point: i64,
    now: EpochMillis,
) -> AppResult<Reward> {
    match conn.execute(
        "INSERT INTO rewards (appreciation_id, sender, point, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![appreciation_id, sender_id, point, now],
    ) {
        Ok(_) => Ok(Reward {
            id: conn.last_insert_rowid(),
            appreciation_id,
            sender_id,
            point,
            created_at: now,
        }),
        Err(error) if is_unique_violation(&error) => Err(AppError::RewardAlreadyPresent { appreciation_id }),
        Err(error) => Err(error.into()),
    }
}

pub fn reward_exists(conn: &Connection, appreciation_id: i64, sender_id: i64) -> AppResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM rewards WHERE appreciation_id = ?1 AND sender = ?2)",
        params![appreciation_id, sender_id],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

pub fn list_rewards_for_appreciation(conn: &Connection, appreciation_id: i64) -> AppResult<Vec<Reward>> {
    let mut statement = conn.prepare(
        "SELECT id, appreciation_id, sender, point, created_at
         FROM rewards WHERE appreciation_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = statement.query_map(params![appreciation_id], |row| {
        Ok(Reward {
            id: row.get(0)?,
            appreciation_id: row.get(1)?,
            sender_id: row.get(2)?,
            point: row.get(3)?,
            created_at: row.get(4)?,
        })
    })?;
    let mut rewards = Vec::new();
    for row in rows {
        rewards.push(row?);
    }
    Ok(rewards)
}
