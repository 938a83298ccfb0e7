use crate::config::Settings;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AppreciationFilter, AppreciationQuery, CreateAppreciationRequest, GiveRewardRequest, ModerationRequest,
    ReportAppreciationRequest, SortOrder,
};

const MAX_DESCRIPTION_CHARS: usize = 1_000;
const MAX_COMMENT_CHARS: usize = 500;

/// Boundary checks applied before a request reaches a store.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    min_reward_point: i64,
    max_reward_point: i64,
    default_page_size: i64,
    max_page_size: i64,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl RequestPolicy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            min_reward_point: settings.min_reward_point,
            max_reward_point: settings.max_reward_point,
            default_page_size: settings.default_page_size,
            max_page_size: settings.max_page_size,
        }
    }

    pub fn validate_give_reward(&self, request: &GiveRewardRequest) -> AppResult<()> {
        if request.appreciation_id <= 0 {
            return Err(AppError::Validation("enter valid appreciation id".to_string()));
        }
        if !(self.min_reward_point..=self.max_reward_point).contains(&request.point) {
            return Err(AppError::Validation(format!(
                "reward point {} is out of allowed range ({}..={})",
                request.point, self.min_reward_point, self.max_reward_point
            )));
        }
        Ok(())
    }

    pub fn validate_create_appreciation(&self, request: &CreateAppreciationRequest) -> AppResult<()> {
        if request.core_value_id <= 0 {
            return Err(AppError::Validation("enter valid core value id".to_string()));
        }
        if request.receiver_id <= 0 {
            return Err(AppError::Validation("enter valid receiver id".to_string()));
        }
        validate_text("description", &request.description, MAX_DESCRIPTION_CHARS)
    }

    pub fn validate_report(&self, request: &ReportAppreciationRequest) -> AppResult<()> {
        if request.appreciation_id <= 0 {
            return Err(AppError::Validation("enter valid appreciation id".to_string()));
        }
        validate_text("reporting comment", &request.reporting_comment, MAX_COMMENT_CHARS)
    }

    pub fn validate_moderation(&self, request: &ModerationRequest) -> AppResult<()> {
        if request.resolution_id <= 0 {
            return Err(AppError::Validation("enter valid resolution id".to_string()));
        }
        validate_text("moderator comment", &request.moderator_comment, MAX_COMMENT_CHARS)
    }

    pub fn normalize_filter(&self, filter: &AppreciationFilter) -> AppResult<AppreciationQuery> {
        let sort_order = match filter.sort_order.as_deref().map(str::trim) {
            None | Some("") => SortOrder::Desc,
            Some(raw) if raw.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            Some(raw) if raw.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            Some(raw) => {
                return Err(AppError::Validation(format!(
                    "sort order '{}' must be asc or desc",
                    raw
                )))
            }
        };

        let page = filter.page.unwrap_or(1);
        if page < 1 {
            return Err(AppError::Validation(format!("page {} must be at least 1", page)));
        }
        let page_size = filter
            .page_size
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let name = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        Ok(AppreciationQuery {
            name,
            self_only: filter.self_only,
            sort_order,
            page,
            page_size,
        })
    }
}

/// Acting user ids come from an authenticated caller; a non-positive id means
/// the caller never resolved one.
pub fn require_identity(user_id: i64) -> AppResult<i64> {
    if user_id <= 0 {
        return Err(AppError::MissingIdentity(format!(
            "acting user id {} is not an authenticated identity",
            user_id
        )));
    }
    Ok(user_id)
}

fn validate_text(field: &str, value: &str, max_chars: usize) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be blank", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{} exceeds {} characters",
            field, max_chars
        )));
    }
    Ok(())
}
