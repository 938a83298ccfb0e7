//! Fiscal quarter arithmetic.
//!
//! Two schemes live here and are deliberately kept apart:
//! - [`appreciation_quarter`] produces the label stamped on a new appreciation
//!   (financial-year numbering, April starts quarter 1).
//! - [`RewardWindow`] decides whether an appreciation may still be rewarded,
//!   using the March/June/September/December quarters plus a one-month grace
//!   period after a quarter closes.

use crate::errors::{AppError, AppResult};
use crate::models::EpochMillis;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiscalQuarter {
    /// March to May.
    Q1,
    /// June to August.
    Q2,
    /// September to November.
    Q3,
    /// December to February, straddling New Year.
    Q4,
}

impl FiscalQuarter {
    pub fn containing(month: u32) -> Self {
        match month {
            3..=5 => Self::Q1,
            6..=8 => Self::Q2,
            9..=11 => Self::Q3,
            _ => Self::Q4,
        }
    }

    pub fn months(self) -> [u32; 3] {
        match self {
            Self::Q1 => [3, 4, 5],
            Self::Q2 => [6, 7, 8],
            Self::Q3 => [9, 10, 11],
            Self::Q4 => [12, 1, 2],
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Self::Q1 => Self::Q4,
            Self::Q2 => Self::Q1,
            Self::Q3 => Self::Q2,
            Self::Q4 => Self::Q3,
        }
    }

    pub fn first_month(self) -> u32 {
        self.months()[0]
    }

    pub fn last_month(self) -> u32 {
        self.months()[2]
    }

    /// Zero-based position of `month` inside this quarter.
    fn position_of(self, month: u32) -> Option<i64> {
        self.months()
            .iter()
            .position(|candidate| *candidate == month)
            .map(|index| index as i64)
    }
}

/// Quarter label stamped on appreciations at creation time.
pub fn appreciation_quarter(at: DateTime<Utc>) -> i32 {
    match at.month() {
        1..=3 => 4,
        4..=6 => 1,
        7..=9 => 2,
        _ => 3,
    }
}

/// Months counted from year 0, so that month arithmetic never builds dates.
fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

/// Range of calendar months in which appreciations can be rewarded at a
/// given evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardWindow {
    current: FiscalQuarter,
    start: i64,
    end: i64,
    grace: bool,
}

impl RewardWindow {
    pub fn at(now: DateTime<Utc>) -> Self {
        let current = FiscalQuarter::containing(now.month());
        let position = current.position_of(now.month()).unwrap_or(0);
        let quarter_start = month_index(now.year(), now.month()) - position;
        // First month of a quarter still accepts the last month of the previous one.
        let grace = position == 0;
        let start = if grace { quarter_start - 1 } else { quarter_start };
        Self {
            current,
            start,
            end: quarter_start + 3,
            grace,
        }
    }

    pub fn current_quarter(&self) -> FiscalQuarter {
        self.current
    }

    pub fn in_grace_period(&self) -> bool {
        self.grace
    }

    /// `(year, month)` of the earliest month the window accepts.
    pub fn first_month(&self) -> (i32, u32) {
        let year = self.start.div_euclid(12) as i32;
        let month = self.start.rem_euclid(12) as u32 + 1;
        (year, month)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let index = month_index(at.year(), at.month());
        index >= self.start && index < self.end
    }
}

/// Whether an appreciation created at `appreciated_at` may receive a reward at `now`.
pub fn is_appreciation_eligible_for_reward(appreciated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    RewardWindow::at(now).contains(appreciated_at)
}

pub fn from_epoch_millis(millis: EpochMillis) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Internal(format!("timestamp {} out of range", millis)))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> EpochMillis {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to; used for job replays and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
