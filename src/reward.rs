use crate::config::Settings;
use crate::db::{self, appreciations, quota, reports, rewards, Database, Deadline};
use crate::errors::{AppError, AppResult};
use crate::models::{Appreciation, GiveRewardRequest, Reward};
use crate::notification::{Notifier, PushMessage};
use crate::quarter::{self, Clock};
use crate::telemetry::traced;
use crate::validation::{require_identity, RequestPolicy};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct RewardEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    policy: RequestPolicy,
    request_timeout: Duration,
    reward_multiplier: i64,
}

impl RewardEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, notifier: Notifier, settings: &Settings) -> Self {
        Self {
            db,
            clock,
            notifier,
            policy: RequestPolicy::new(settings),
            request_timeout: settings.request_timeout(),
            reward_multiplier: settings.reward_multiplier,
        }
    }

    /// Attaches `request.point` points from `sender_id` to an appreciation and
    /// debits the sender's quota in the same transaction.
    pub async fn give_reward(&self, sender_id: i64, request: &GiveRewardRequest) -> AppResult<Reward> {
        let span = tracing::info_span!(
            "give_reward",
            request_id = %Uuid::new_v4(),
            sender_id,
            appreciation_id = request.appreciation_id,
            point = request.point
        );
        traced(span, "give_reward", self.give_reward_inner(sender_id, *request)).await
    }

    async fn give_reward_inner(&self, sender_id: i64, request: GiveRewardRequest) -> AppResult<Reward> {
        let sender_id = require_identity(sender_id)?;
        self.policy.validate_give_reward(&request)?;

        let now = self.clock.now();
        let deadline = Deadline::after(self.request_timeout);
        let db = self.db.clone();
        let (reward, appreciation) = db::run_transactional(deadline, move |deadline| {
            // Fast rejection without taking the write lock.
            db.run(|conn| check_reward_preconditions(conn, sender_id, &request, now))?;
            db.transaction(deadline, |tx| {
                // Re-checked under the write lock so concurrent requests serialize here.
                let appreciation = check_reward_preconditions(tx, sender_id, &request, now)?;
                let reward = rewards::insert_reward(
                    tx,
                    request.appreciation_id,
                    sender_id,
                    request.point,
                    now.timestamp_millis(),
                )?;
                if !quota::deduct_reward_quota(tx, sender_id, request.point)? {
                    return Err(AppError::Internal(format!(
                        "quota debit matched no row for user {}",
                        sender_id
                    )));
                }
                Ok((reward, appreciation))
            })
        })
        .await?;

        tracing::info!(reward_id = reward.id, "reward committed");
        self.notify_reward(&appreciation, &reward);
        Ok(reward)
    }

    /// Periodic renewal: every balance becomes `rewardMultiplier * grade.points`.
    pub async fn refill_reward_quotas(&self) -> AppResult<usize> {
        let span = tracing::info_span!("refill_reward_quotas", request_id = %Uuid::new_v4());
        let db = self.db.clone();
        let multiplier = self.reward_multiplier;
        let notifier = self.notifier.clone();
        let deadline = Deadline::after(self.request_timeout);
        traced(span, "refill_reward_quotas", async move {
            let users = db::run_transactional(deadline, move |deadline| {
                db.transaction(deadline, |tx| quota::refill_reward_quotas(tx, multiplier))
            })
            .await?;
            tracing::info!(users, multiplier, "reward quotas refilled");
            notifier.broadcast(PushMessage::new(
                "Reward Quota Reset!",
                "Quota for rewards renewed. Time to shower your peers with kudos!",
            ));
            Ok(users)
        })
        .await
    }

    fn notify_reward(&self, appreciation: &Appreciation, reward: &Reward) {
        self.notifier.dispatch(
            vec![appreciation.receiver_id],
            PushMessage::new(
                "Your appreciation was rewarded",
                format!("Someone gave {} points to your appreciation", reward.point),
            ),
        );
        self.notifier.dispatch(
            vec![reward.sender_id],
            PushMessage::new(
                "Reward sent",
                format!("Your {} points were added to the appreciation", reward.point),
            ),
        );
    }
}

/// Ordered eligibility checks; the first failing rule wins.
fn check_reward_preconditions(
    conn: &Connection,
    sender_id: i64,
    request: &GiveRewardRequest,
    now: DateTime<Utc>,
) -> AppResult<Appreciation> {
    let appreciation = appreciations::get_appreciation(conn, request.appreciation_id)?;
    if appreciation.sender_id == sender_id {
        return Err(AppError::RewardOwnAppreciation);
    }
    if appreciation.receiver_id == sender_id {
        return Err(AppError::RewardReceivedAppreciation);
    }

    let appreciated_at = quarter::from_epoch_millis(appreciation.created_at)?;
    if !quarter::is_appreciation_eligible_for_reward(appreciated_at, now) {
        return Err(AppError::PreviousQuarterRewardNotAllowed {
            appreciation_id: appreciation.id,
        });
    }

    if reports::has_blocking_report(conn, appreciation.id)? {
        return Err(AppError::ReportedAppreciationRewardNotAllowed {
            appreciation_id: appreciation.id,
        });
    }

    let standing = quota::quota_standing(conn, sender_id, request.point)?;
    if !standing.is_sufficient() {
        return Err(AppError::RewardQuotaInsufficient {
            required: standing.required,
            available: standing.balance,
        });
    }

    if rewards::reward_exists(conn, appreciation.id, sender_id)? {
        return Err(AppError::RewardAlreadyPresent {
            appreciation_id: appreciation.id,
        });
    }
    Ok(appreciation)
}
