use crate::config::Settings;
use crate::db::{self, appreciations, core_values, users, Database, Deadline};
use crate::errors::{AppError, AppResult};
use crate::models::{
    Appreciation, AppreciationFilter, AppreciationPage, AppreciationView, CreateAppreciationRequest,
    NewAppreciation,
};
use crate::notification::{Notifier, PushMessage};
use crate::quarter::{self, Clock};
use crate::telemetry::traced;
use crate::validation::{require_identity, RequestPolicy};
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppreciationEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    policy: RequestPolicy,
    request_timeout: Duration,
}

impl AppreciationEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, notifier: Notifier, settings: &Settings) -> Self {
        Self {
            db,
            clock,
            notifier,
            policy: RequestPolicy::new(settings),
            request_timeout: settings.request_timeout(),
        }
    }

    pub async fn create_appreciation(
        &self,
        sender_id: i64,
        request: &CreateAppreciationRequest,
    ) -> AppResult<Appreciation> {
        let span = tracing::info_span!(
            "create_appreciation",
            request_id = %Uuid::new_v4(),
            sender_id,
            receiver_id = request.receiver_id,
            core_value_id = request.core_value_id
        );
        traced(span, "create_appreciation", self.create_inner(sender_id, request.clone())).await
    }

    async fn create_inner(&self, sender_id: i64, request: CreateAppreciationRequest) -> AppResult<Appreciation> {
        let sender_id = require_identity(sender_id)?;
        // Pure comparison, so it is answered before any other field is looked at.
        if request.receiver_id == sender_id {
            return Err(AppError::SelfAppreciation);
        }
        self.policy.validate_create_appreciation(&request)?;

        let now = self.clock.now();
        let deadline = Deadline::after(self.request_timeout);
        let db = self.db.clone();
        let (appreciation, sender_name, receiver_name) = db::run_transactional(deadline, move |deadline| {
            let sender = db.run(|conn| users::get_user(conn, sender_id))?;
            let (appreciation, receiver) = db.transaction(deadline, |tx| {
                core_values::get_core_value(tx, request.core_value_id)?;
                let receiver = users::get_user(tx, request.receiver_id)?;
                let appreciation = appreciations::insert_appreciation(
                    tx,
                    &NewAppreciation {
                        core_value_id: request.core_value_id,
                        description: request.description.trim().to_string(),
                        quarter: quarter::appreciation_quarter(now),
                        sender_id,
                        receiver_id: request.receiver_id,
                        created_at: now.timestamp_millis(),
                    },
                )?;
                Ok((appreciation, receiver))
            })?;
            Ok((appreciation, sender.full_name(), receiver.full_name()))
        })
        .await?;

        tracing::info!(appreciation_id = appreciation.id, quarter = appreciation.quarter, "appreciation created");
        self.notifier.dispatch(
            vec![appreciation.receiver_id],
            PushMessage::new(
                "Appreciation incoming!",
                format!("You've been appreciated by {}! Well done!", sender_name),
            ),
        );
        self.notifier.broadcast(PushMessage::new(
            "Appreciation",
            format!("{} has received an appreciation", receiver_name),
        ));
        Ok(appreciation)
    }

    pub async fn get_appreciation_by_id(&self, viewer_id: i64, appreciation_id: i64) -> AppResult<AppreciationView> {
        let span = tracing::info_span!(
            "get_appreciation_by_id",
            request_id = %Uuid::new_v4(),
            viewer_id,
            appreciation_id
        );
        let db = self.db.clone();
        traced(span, "get_appreciation_by_id", async move {
            let viewer_id = require_identity(viewer_id)?;
            db::run_blocking(move || {
                db.run(|conn| appreciations::get_appreciation_view(conn, viewer_id, appreciation_id))
            })
            .await
        })
        .await
    }

    pub async fn list_appreciations(&self, viewer_id: i64, filter: &AppreciationFilter) -> AppResult<AppreciationPage> {
        let span = tracing::info_span!("list_appreciations", request_id = %Uuid::new_v4(), viewer_id);
        let db = self.db.clone();
        let query = self.policy.normalize_filter(filter);
        traced(span, "list_appreciations", async move {
            let viewer_id = require_identity(viewer_id)?;
            let query = query?;
            let (appreciations, pagination) = db::run_blocking(move || {
                db.run(|conn| appreciations::list_appreciation_views(conn, viewer_id, &query))
            })
            .await?;
            tracing::debug!(
                returned = appreciations.len(),
                total_records = pagination.total_records,
                "appreciations listed"
            );
            Ok(AppreciationPage {
                appreciations,
                pagination,
            })
        })
        .await
    }

    /// Soft-deletes an appreciation; it stops appearing in lookups and listings.
    pub async fn delete_appreciation(&self, actor_id: i64, appreciation_id: i64) -> AppResult<()> {
        let span = tracing::info_span!(
            "delete_appreciation",
            request_id = %Uuid::new_v4(),
            actor_id,
            appreciation_id
        );
        let db = self.db.clone();
        let now = self.clock.now_millis();
        let deadline = Deadline::after(self.request_timeout);
        traced(span, "delete_appreciation", async move {
            require_identity(actor_id)?;
            db::run_transactional(deadline, move |deadline| {
                db.transaction(deadline, |tx| appreciations::invalidate_appreciation(tx, appreciation_id, now))
            })
            .await?;
            tracing::info!("appreciation invalidated");
            Ok(())
        })
        .await
    }

    /// Folds the rewards created on `day` (UTC) into each appreciation's
    /// `total_reward_points`. Run once per day, for the day that just ended.
    pub async fn roll_up_rewards_for_day(&self, day: NaiveDate) -> AppResult<usize> {
        let span = tracing::info_span!("roll_up_rewards_for_day", request_id = %Uuid::new_v4(), %day);
        let db = self.db.clone();
        let deadline = Deadline::after(self.request_timeout);
        traced(span, "roll_up_rewards_for_day", async move {
            let next_day = day
                .checked_add_days(Days::new(1))
                .ok_or_else(|| AppError::Validation(format!("day {} has no successor", day)))?;
            let from = day.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis();
            let to = next_day.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis();
            let touched = db::run_transactional(deadline, move |deadline| {
                db.transaction(deadline, |tx| appreciations::accumulate_total_reward_points(tx, from, to))
            })
            .await?;
            tracing::info!(touched, "reward totals rolled up");
            Ok(touched)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, quota, rewards};
    use crate::models::User;
    use crate::notification::{PushSender, TracingPushSender};
    use crate::quarter::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        titles: Mutex<Vec<String>>,
        broadcasts: Mutex<Vec<(String, PushMessage)>>,
    }

    impl PushSender for RecordingSender {
        fn send(&self, _tokens: &[String], message: &PushMessage) -> AppResult<()> {
            self.titles.lock().expect("lock").push(message.title.clone());
            Ok(())
        }

        fn send_to_topic(&self, topic: &str, message: &PushMessage) -> AppResult<()> {
            self.broadcasts
                .lock()
                .expect("lock")
                .push((topic.to_string(), message.clone()));
            Ok(())
        }
    }

    struct Harness {
        db: Arc<Database>,
        clock: Arc<FixedClock>,
        engine: AppreciationEngine,
        core_value_id: i64,
        ada: User,
        bob: User,
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).single().expect("date")
    }

    fn harness_with(sender: Arc<dyn PushSender>) -> Harness {
        let db = Arc::new(Database::in_memory().expect("db"));
        let clock = Arc::new(FixedClock::new(at(2024, 8, 14)));
        let notifier = Notifier::new(db.clone(), sender);
        let engine = AppreciationEngine::new(db.clone(), clock.clone(), notifier, &Settings::default());
        let core_value_id = fixtures::core_value(&db, "Ownership").id;
        let ada = fixtures::user(&db, "ada@peerly.dev", 10, 100);
        let bob = fixtures::user(&db, "bob@peerly.dev", 20, 100);
        Harness {
            db,
            clock,
            engine,
            core_value_id,
            ada,
            bob,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(TracingPushSender))
    }

    fn create_request(h: &Harness, receiver_id: i64) -> CreateAppreciationRequest {
        CreateAppreciationRequest {
            core_value_id: h.core_value_id,
            receiver_id,
            description: "  Unblocked the release  ".to_string(),
        }
    }

    #[tokio::test]
    async fn create_stamps_quarter_label_and_timestamps() {
        let h = harness();
        let appreciation = h
            .engine
            .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
            .await
            .expect("create");
        assert_eq!(appreciation.sender_id, h.ada.id);
        assert_eq!(appreciation.receiver_id, h.bob.id);
        assert_eq!(appreciation.description, "Unblocked the release");
        assert_eq!(appreciation.quarter, 2);
        assert_eq!(appreciation.created_at, at(2024, 8, 14).timestamp_millis());
        assert!(appreciation.is_valid);
        assert_eq!(appreciation.total_reward_points, 0);
    }

    #[tokio::test]
    async fn self_appreciation_is_rejected_regardless_of_other_fields() {
        let h = harness();
        let err = h
            .engine
            .create_appreciation(h.ada.id, &create_request(&h, h.ada.id))
            .await
            .expect_err("self");
        assert!(matches!(err, AppError::SelfAppreciation));

        let err = h
            .engine
            .create_appreciation(
                h.ada.id,
                &CreateAppreciationRequest {
                    core_value_id: 999,
                    receiver_id: h.ada.id,
                    description: String::new(),
                },
            )
            .await
            .expect_err("self with bad fields");
        assert!(matches!(err, AppError::SelfAppreciation));
    }

    #[tokio::test]
    async fn unknown_references_are_not_found_and_nothing_is_written() {
        let h = harness();
        let err = h
            .engine
            .create_appreciation(h.ada.id, &create_request(&h, 404))
            .await
            .expect_err("receiver");
        assert!(matches!(err, AppError::UserNotFound(404)));

        let err = h
            .engine
            .create_appreciation(405, &create_request(&h, h.bob.id))
            .await
            .expect_err("sender");
        assert!(matches!(err, AppError::UserNotFound(405)));

        let mut request = create_request(&h, h.bob.id);
        request.core_value_id = 77;
        let err = h
            .engine
            .create_appreciation(h.ada.id, &request)
            .await
            .expect_err("core value");
        assert!(matches!(err, AppError::CoreValueNotFound(77)));

        let page = h
            .engine
            .list_appreciations(h.ada.id, &AppreciationFilter::default())
            .await
            .expect("list");
        assert_eq!(page.pagination.total_records, 0);
    }

    #[tokio::test]
    async fn receiver_is_notified_after_create() {
        let sender = Arc::new(RecordingSender::default());
        let h = harness_with(sender.clone());
        h.db.run(|conn| users::add_device_token(conn, h.bob.id, "bob-phone", 0))
            .expect("token");

        h.engine
            .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
            .await
            .expect("create");

        for _ in 0..50 {
            let delivered = !sender.titles.lock().expect("lock").is_empty();
            let announced = !sender.broadcasts.lock().expect("lock").is_empty();
            if delivered && announced {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(
            sender.titles.lock().expect("lock").clone(),
            vec!["Appreciation incoming!".to_string()]
        );
        let broadcasts = sender.broadcasts.lock().expect("lock").clone();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, "peerly");
        assert_eq!(broadcasts[0].1.title, "Appreciation");
        assert_eq!(broadcasts[0].1.body, format!("{} has received an appreciation", h.bob.full_name()));
    }

    #[tokio::test]
    async fn deleted_appreciation_is_hidden() {
        let h = harness();
        let appreciation = h
            .engine
            .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
            .await
            .expect("create");
        let view = h
            .engine
            .get_appreciation_by_id(h.bob.id, appreciation.id)
            .await
            .expect("view");
        assert_eq!(view.sender_first_name, "ada");

        h.engine
            .delete_appreciation(h.ada.id, appreciation.id)
            .await
            .expect("delete");
        let err = h
            .engine
            .get_appreciation_by_id(h.bob.id, appreciation.id)
            .await
            .expect_err("hidden");
        assert!(matches!(err, AppError::AppreciationNotFound(_)));
        let err = h
            .engine
            .delete_appreciation(h.ada.id, appreciation.id)
            .await
            .expect_err("already deleted");
        assert!(matches!(err, AppError::AppreciationNotFound(_)));
    }

    #[tokio::test]
    async fn listing_validates_filter() {
        let h = harness();
        let err = h
            .engine
            .list_appreciations(
                h.ada.id,
                &AppreciationFilter {
                    page: Some(0),
                    ..AppreciationFilter::default()
                },
            )
            .await
            .expect_err("page");
        assert!(matches!(err, AppError::Validation(_)));

        for _ in 0..3 {
            h.engine
                .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
                .await
                .expect("create");
            h.clock.advance(chrono::Duration::minutes(1));
        }
        let page = h
            .engine
            .list_appreciations(
                h.bob.id,
                &AppreciationFilter {
                    self_only: true,
                    page_size: Some(2),
                    ..AppreciationFilter::default()
                },
            )
            .await
            .expect("list");
        assert_eq!(page.appreciations.len(), 2);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(page.appreciations[0].created_at > page.appreciations[1].created_at);
    }

    #[tokio::test]
    async fn page_far_beyond_the_end_is_empty() {
        let h = harness();
        h.engine
            .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
            .await
            .expect("create");
        let page = h
            .engine
            .list_appreciations(
                h.ada.id,
                &AppreciationFilter {
                    page: Some(i64::MAX),
                    ..AppreciationFilter::default()
                },
            )
            .await
            .expect("list");
        assert!(page.appreciations.is_empty());
        assert_eq!(page.pagination.total_records, 1);
        assert_eq!(page.pagination.next, None);
        assert_eq!(page.pagination.previous, Some(1));
    }

    #[tokio::test]
    async fn daily_roll_up_counts_only_that_day() {
        let h = harness();
        let carol = fixtures::user(&h.db, "carol@peerly.dev", 50, 1_000);
        let appreciation = h
            .engine
            .create_appreciation(h.ada.id, &create_request(&h, h.bob.id))
            .await
            .expect("create");
        let day = NaiveDate::from_ymd_opt(2024, 8, 14).expect("day");
        h.db.transaction(Deadline::none(), |tx| {
            rewards::insert_reward(tx, appreciation.id, carol.id, 2, at(2024, 8, 14).timestamp_millis())?;
            quota::deduct_reward_quota(tx, carol.id, 2)
        })
        .expect("reward");

        let touched = h.engine.roll_up_rewards_for_day(day).await.expect("roll up");
        assert_eq!(touched, 1);
        let next = day.succ_opt().expect("next day");
        assert_eq!(h.engine.roll_up_rewards_for_day(next).await.expect("roll up"), 0);

        let total = h
            .db
            .run(|conn| appreciations::get_appreciation(conn, appreciation.id))
            .expect("get")
            .total_reward_points;
        assert_eq!(total, 2 * 50);
    }
}
