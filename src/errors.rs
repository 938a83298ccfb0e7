use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("MISSING_IDENTITY: {0}")]
    MissingIdentity(String),
    #[error("INVALID_INPUT: {0}")]
    Validation(String),
    #[error("NOT_FOUND: appreciation {0} not found")]
    AppreciationNotFound(i64),
    #[error("NOT_FOUND: user {0} not found")]
    UserNotFound(i64),
    #[error("NOT_FOUND: core value {0} not found")]
    CoreValueNotFound(i64),
    #[error("NOT_FOUND: resolution {0} not found")]
    ResolutionNotFound(i64),
    #[error("SELF_APPRECIATION: self appreciation is not allowed")]
    SelfAppreciation,
    #[error("SELF_APPRECIATION_REWARD: cannot reward your own appreciation")]
    RewardOwnAppreciation,
    #[error("SELF_REWARD: cannot reward an appreciation you received")]
    RewardReceivedAppreciation,
    #[error("REWARD_ALREADY_PRESENT: reward already given for appreciation {appreciation_id}")]
    RewardAlreadyPresent { appreciation_id: i64 },
    #[error("PREVIOUS_QUARTER_RATING_NOT_ALLOWED: appreciation {appreciation_id} is outside the reward window")]
    PreviousQuarterRewardNotAllowed { appreciation_id: i64 },
    #[error("REPORTED_APPRECIATION: reward not allowed for reported appreciation {appreciation_id}")]
    ReportedAppreciationRewardNotAllowed { appreciation_id: i64 },
    #[error("REWARD_QUOTA_INSUFFICIENT: required {required}, available {available}")]
    RewardQuotaInsufficient { required: i64, available: i64 },
    #[error("REPEATED_REPORT: appreciation {appreciation_id} already reported by this user")]
    RepeatedReport { appreciation_id: i64 },
    #[error("CANNOT_REPORT_OWN_APPRECIATION: cannot report an appreciation you sent or received")]
    CannotReportOwnAppreciation,
    #[error("ALREADY_MODERATED: resolution {resolution_id} is already {status}")]
    ResolutionAlreadyModerated { resolution_id: i64, status: String },
    #[error("DEADLINE_EXCEEDED: {0}")]
    DeadlineExceeded(String),
    #[error("CANCELED: {0}")]
    Canceled(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    InvalidInput,
    NotFound,
    BusinessRule,
    Infrastructure,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingIdentity(_) => ErrorKind::Authentication,
            Self::Validation(_) => ErrorKind::InvalidInput,
            Self::AppreciationNotFound(_)
            | Self::UserNotFound(_)
            | Self::CoreValueNotFound(_)
            | Self::ResolutionNotFound(_) => ErrorKind::NotFound,
            Self::SelfAppreciation
            | Self::RewardOwnAppreciation
            | Self::RewardReceivedAppreciation
            | Self::RewardAlreadyPresent { .. }
            | Self::PreviousQuarterRewardNotAllowed { .. }
            | Self::ReportedAppreciationRewardNotAllowed { .. }
            | Self::RewardQuotaInsufficient { .. }
            | Self::RepeatedReport { .. }
            | Self::CannotReportOwnAppreciation
            | Self::ResolutionAlreadyModerated { .. } => ErrorKind::BusinessRule,
            Self::DeadlineExceeded(_) | Self::Canceled(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Client-class errors may be rendered verbatim; everything else is server-side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::NotFound | ErrorKind::BusinessRule
        )
    }

    /// Message safe to hand to an API caller.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "INTERNAL: internal server error".to_string()
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Internal(format!("parsing settings: {}", value))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", value))
    }
}

pub type AppResult<T> = Result<T, AppError>;
