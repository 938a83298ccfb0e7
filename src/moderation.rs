use crate::config::Settings;
use crate::db::{self, appreciations, reports, users, Database, Deadline};
use crate::errors::{AppError, AppResult};
use crate::models::{ModerationRequest, ReportAppreciationRequest, ReportStatus, ReportedAppreciation, Resolution};
use crate::quarter::Clock;
use crate::telemetry::traced;
use crate::validation::{require_identity, RequestPolicy};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Abuse reports and their moderation. An appreciation with any report that is
/// not `resolved` cannot receive rewards.
#[derive(Clone)]
pub struct ModerationEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: RequestPolicy,
    request_timeout: Duration,
}

impl ModerationEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self {
            db,
            clock,
            policy: RequestPolicy::new(settings),
            request_timeout: settings.request_timeout(),
        }
    }

    pub async fn report_appreciation(
        &self,
        reporter_id: i64,
        request: &ReportAppreciationRequest,
    ) -> AppResult<Resolution> {
        let span = tracing::info_span!(
            "report_appreciation",
            request_id = %Uuid::new_v4(),
            reporter_id,
            appreciation_id = request.appreciation_id
        );
        let request = request.clone();
        let db = self.db.clone();
        let now = self.clock.now_millis();
        let deadline = Deadline::after(self.request_timeout);
        let validation = self.policy.validate_report(&request);
        traced(span, "report_appreciation", async move {
            let reporter_id = require_identity(reporter_id)?;
            validation?;
            let resolution = db::run_transactional(deadline, move |deadline| {
                db.transaction(deadline, |tx| {
                    let appreciation = appreciations::get_appreciation(tx, request.appreciation_id)?;
                    if reports::has_duplicate_report(tx, appreciation.id, reporter_id)? {
                        return Err(AppError::RepeatedReport {
                            appreciation_id: appreciation.id,
                        });
                    }
                    if appreciation.sender_id == reporter_id || appreciation.receiver_id == reporter_id {
                        return Err(AppError::CannotReportOwnAppreciation);
                    }
                    reports::insert_report(
                        tx,
                        appreciation.id,
                        reporter_id,
                        request.reporting_comment.trim(),
                        now,
                    )
                })
            })
            .await?;
            tracing::info!(resolution_id = resolution.id, "appreciation reported");
            Ok(resolution)
        })
        .await
    }

    /// Closes a report without action; rewards are allowed again.
    pub async fn resolve_report(&self, moderator_id: i64, request: &ModerationRequest) -> AppResult<Resolution> {
        let span = tracing::info_span!(
            "resolve_report",
            request_id = %Uuid::new_v4(),
            moderator_id,
            resolution_id = request.resolution_id
        );
        traced(span, "resolve_report", self.moderate(moderator_id, request.clone(), ReportStatus::Resolved)).await
    }

    /// Upholds a report: the report becomes `deleted` and the appreciation is
    /// invalidated in the same transaction.
    pub async fn delete_reported_appreciation(
        &self,
        moderator_id: i64,
        request: &ModerationRequest,
    ) -> AppResult<Resolution> {
        let span = tracing::info_span!(
            "delete_reported_appreciation",
            request_id = %Uuid::new_v4(),
            moderator_id,
            resolution_id = request.resolution_id
        );
        traced(
            span,
            "delete_reported_appreciation",
            self.moderate(moderator_id, request.clone(), ReportStatus::Deleted),
        )
        .await
    }

    async fn moderate(&self, moderator_id: i64, request: ModerationRequest, status: ReportStatus) -> AppResult<Resolution> {
        let moderator_id = require_identity(moderator_id)?;
        self.policy.validate_moderation(&request)?;
        let db = self.db.clone();
        let now = self.clock.now_millis();
        let deadline = Deadline::after(self.request_timeout);
        let resolution = db::run_transactional(deadline, move |deadline| {
            db.transaction(deadline, |tx| {
                if !users::user_exists(tx, moderator_id)? {
                    return Err(AppError::UserNotFound(moderator_id));
                }
                let resolution = reports::set_resolution_status(
                    tx,
                    request.resolution_id,
                    status,
                    moderator_id,
                    request.moderator_comment.trim(),
                    now,
                )?;
                if status == ReportStatus::Deleted {
                    match appreciations::invalidate_appreciation(tx, resolution.appreciation_id, now) {
                        Ok(()) | Err(AppError::AppreciationNotFound(_)) => {}
                        Err(error) => return Err(error),
                    }
                }
                Ok(resolution)
            })
        })
        .await?;
        tracing::info!(status = status.as_str(), "report moderated");
        Ok(resolution)
    }

    pub async fn list_reports(&self) -> AppResult<Vec<ReportedAppreciation>> {
        let span = tracing::info_span!("list_reports", request_id = %Uuid::new_v4());
        let db = self.db.clone();
        traced(span, "list_reports", async move {
            db::run_blocking(move || db.run(reports::list_reported_appreciations)).await
        })
        .await
    }

    pub async fn get_report(&self, resolution_id: i64) -> AppResult<ReportedAppreciation> {
        let span = tracing::info_span!("get_report", request_id = %Uuid::new_v4(), resolution_id);
        let db = self.db.clone();
        traced(span, "get_report", async move {
            db::run_blocking(move || db.run(|conn| reports::get_reported_appreciation(conn, resolution_id))).await
        })
        .await
    }
}
