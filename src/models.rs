use serde::{Deserialize, Serialize};

/// Timestamps are stored and exchanged as Unix epoch milliseconds.
pub type EpochMillis = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: i64,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub designation: Option<String>,
    pub profile_image_url: Option<String>,
    pub grade_id: i64,
    pub reward_quota_balance: i64,
    pub created_at: EpochMillis,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub designation: Option<String>,
    pub profile_image_url: Option<String>,
    pub grade_id: i64,
    pub reward_quota_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreValue {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent_core_value_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appreciation {
    pub id: i64,
    pub core_value_id: i64,
    pub description: String,
    pub quarter: i32,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub is_valid: bool,
    pub total_reward_points: i64,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppreciation {
    pub core_value_id: i64,
    pub description: String,
    pub quarter: i32,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub created_at: EpochMillis,
}

/// Read projection of an appreciation as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppreciationView {
    pub id: i64,
    pub core_value_name: String,
    pub core_value_description: String,
    pub description: String,
    pub is_valid: bool,
    pub total_reward_points: i64,
    pub quarter: i32,
    pub sender_id: i64,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub sender_image_url: Option<String>,
    pub sender_designation: Option<String>,
    pub receiver_id: i64,
    pub receiver_first_name: String,
    pub receiver_last_name: String,
    pub receiver_image_url: Option<String>,
    pub receiver_designation: Option<String>,
    /// Number of rewards attached to the appreciation.
    pub total_rewards: i64,
    /// Points the viewer gave to this appreciation, 0 when none.
    pub given_reward_point: i64,
    /// Whether the viewer has reported this appreciation.
    pub reported_flag: bool,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Raw listing filter as received from a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppreciationFilter {
    pub name: Option<String>,
    #[serde(default)]
    pub self_only: bool,
    pub sort_order: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Filter after validation; see `validation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppreciationQuery {
    pub name: Option<String>,
    pub self_only: bool,
    pub sort_order: SortOrder,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub page_size: i64,
    pub total_records: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64, total_records: i64) -> Self {
        let total_pages = if page_size > 0 {
            total_records / page_size + i64::from(total_records % page_size != 0)
        } else {
            0
        };
        let next = (page < total_pages).then(|| page + 1);
        let previous = (page > 1).then(|| (page - 1).min(total_pages.max(1)));
        Self {
            current_page: page,
            total_pages,
            page_size,
            total_records,
            next,
            previous,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.current_page - 1).max(0).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppreciationPage {
    pub appreciations: Vec<AppreciationView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: i64,
    pub appreciation_id: i64,
    pub sender_id: i64,
    pub point: i64,
    pub created_at: EpochMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Reported,
    Resolved,
    Deleted,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::Resolved => "resolved",
            Self::Deleted => "deleted",
        }
    }

    /// Only resolved reports stop blocking rewards.
    pub fn blocks_rewards(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub id: i64,
    pub appreciation_id: i64,
    pub reporting_comment: String,
    pub reported_by: i64,
    pub reported_at: EpochMillis,
    pub moderator_comment: Option<String>,
    pub moderated_by: Option<i64>,
    pub moderated_at: Option<EpochMillis>,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedAppreciation {
    pub resolution: Resolution,
    pub appreciation_description: String,
    pub core_value_name: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub appreciation_is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppreciationRequest {
    pub core_value_id: i64,
    pub receiver_id: i64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveRewardRequest {
    pub appreciation_id: i64,
    pub point: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAppreciationRequest {
    pub appreciation_id: i64,
    pub reporting_comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub resolution_id: i64,
    pub moderator_comment: String,
}
