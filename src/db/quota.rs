//! Reward quota ledger. Costs are grade-weighted: giving `points` costs
//! `points * grade.points` of the spender's balance.

use crate::errors::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStanding {
    pub balance: i64,
    pub grade_points: i64,
    pub required: i64,
}

impl QuotaStanding {
    pub fn is_sufficient(&self) -> bool {
        self.balance >= self.required
    }
}

pub fn quota_standing(conn: &Connection, user_id: i64, points: i64) -> AppResult<QuotaStanding> {
    let (balance, grade_points): (i64, i64) = conn
        .query_row(
            "SELECT u.reward_quota_balance, g.points
             FROM users u JOIN grades g ON g.id = u.grade_id
             WHERE u.id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or(AppError::UserNotFound(user_id))?;
    let required = points
        .checked_mul(grade_points)
        .ok_or_else(|| AppError::Internal(format!("quota cost overflow for {} points", points)))?;
    Ok(QuotaStanding {
        balance,
        grade_points,
        required,
    })
}

pub fn user_has_reward_quota(conn: &Connection, user_id: i64, points: i64) -> AppResult<bool> {
    Ok(quota_standing(conn, user_id, points)?.is_sufficient())
}

/// Debits the grade-weighted cost of `points`. Returns `false` when no user row matched.
pub fn deduct_reward_quota(conn: &Connection, user_id: i64, points: i64) -> AppResult<bool> {
    let updated = conn.execute(
        "UPDATE users
         SET reward_quota_balance = reward_quota_balance - ?2 * (SELECT points FROM grades WHERE grades.id = users.grade_id)
         WHERE id = ?1",
        params![user_id, points],
    )?;
    Ok(updated > 0)
}

/// Resets every balance to `multiplier * grade.points`.
pub fn refill_reward_quotas(conn: &Connection, multiplier: i64) -> AppResult<usize> {
    let updated = conn.execute(
        "UPDATE users
         SET reward_quota_balance = ?1 * (SELECT points FROM grades WHERE grades.id = users.grade_id)",
        params![multiplier],
    )?;
    Ok(updated)
}

pub fn reward_quota_balance(conn: &Connection, user_id: i64) -> AppResult<i64> {
    conn.query_row(
        "SELECT reward_quota_balance FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(AppError::UserNotFound(user_id))
}
