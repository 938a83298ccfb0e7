use crate::errors::{AppError, AppResult};
use crate::models::{Appreciation, AppreciationQuery, AppreciationView, EpochMillis, NewAppreciation, Pagination};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

const APPRECIATION_COLUMNS: &str =
    "id, core_value_id, description, quarter, sender, receiver, is_valid, total_reward_points, created_at, updated_at";

// Two positional parameters, both the viewer id, precede any filter parameters.
const VIEW_SELECT: &str = "SELECT
    a.id,
    cv.name,
    cv.description,
    a.description,
    a.is_valid,
    a.total_reward_points,
    a.quarter,
    s.id, s.first_name, s.last_name, s.profile_image_url, s.designation,
    r.id, r.first_name, r.last_name, r.profile_image_url, r.designation,
    (SELECT COUNT(*) FROM rewards rw WHERE rw.appreciation_id = a.id),
    COALESCE((SELECT SUM(rw.point) FROM rewards rw WHERE rw.appreciation_id = a.id AND rw.sender = ?), 0),
    EXISTS(SELECT 1 FROM resolutions res WHERE res.appreciation_id = a.id AND res.reported_by = ?),
    a.created_at,
    a.updated_at";

const VIEW_FROM: &str = " FROM appreciations a
    JOIN core_values cv ON cv.id = a.core_value_id
    JOIN users s ON s.id = a.sender
    JOIN users r ON r.id = a.receiver
    WHERE a.is_valid = 1";

pub fn insert_appreciation(conn: &Connection, appreciation: &NewAppreciation) -> AppResult<Appreciation> {
    conn.execute(
        "INSERT INTO appreciations (core_value_id, description, quarter, sender, receiver, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            appreciation.core_value_id,
            appreciation.description,
            appreciation.quarter,
            appreciation.sender_id,
            appreciation.receiver_id,
            appreciation.created_at
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_appreciation(conn, id)
}

/// Loads a valid appreciation; invalidated rows read as not found.
pub fn get_appreciation(conn: &Connection, appreciation_id: i64) -> AppResult<Appreciation> {
    let sql = format!(
        "SELECT {} FROM appreciations WHERE id = ?1 AND is_valid = 1",
        APPRECIATION_COLUMNS
    );
    conn.query_row(&sql, params![appreciation_id], parse_appreciation_row)
        .optional()?
        .ok_or(AppError::AppreciationNotFound(appreciation_id))
}

pub fn invalidate_appreciation(conn: &Connection, appreciation_id: i64, now: EpochMillis) -> AppResult<()> {
    let updated = conn.execute(
        "UPDATE appreciations SET is_valid = 0, updated_at = ?2 WHERE id = ?1 AND is_valid = 1",
        params![appreciation_id, now],
    )?;
    if updated == 0 {
        return Err(AppError::AppreciationNotFound(appreciation_id));
    }
    Ok(())
}

pub fn get_appreciation_view(conn: &Connection, viewer_id: i64, appreciation_id: i64) -> AppResult<AppreciationView> {
    let sql = format!("{}{} AND a.id = ?", VIEW_SELECT, VIEW_FROM);
    conn.query_row(
        &sql,
        params![viewer_id, viewer_id, appreciation_id],
        parse_view_row,
    )
    .optional()?
    .ok_or(AppError::AppreciationNotFound(appreciation_id))
}

/// Makes `%`, `_` and `\` match themselves inside a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn list_appreciation_views(
    conn: &Connection,
    viewer_id: i64,
    query: &AppreciationQuery,
) -> AppResult<(Vec<AppreciationView>, Pagination)> {
    let mut filter_sql = String::new();
    let mut filter_params: Vec<Value> = Vec::new();
    if let Some(name) = &query.name {
        let pattern = format!("%{}%", escape_like(&name.to_lowercase()));
        filter_sql.push_str(
            " AND (LOWER(s.first_name || ' ' || s.last_name) LIKE ? ESCAPE '\\' \
             OR LOWER(r.first_name || ' ' || r.last_name) LIKE ? ESCAPE '\\')",
        );
        filter_params.push(Value::Text(pattern.clone()));
        filter_params.push(Value::Text(pattern));
    }
    if query.self_only {
        filter_sql.push_str(" AND (a.sender = ? OR a.receiver = ?)");
        filter_params.push(Value::Integer(viewer_id));
        filter_params.push(Value::Integer(viewer_id));
    }

    let count_sql = format!("SELECT COUNT(*){}{}", VIEW_FROM, filter_sql);
    let total_records: i64 =
        conn.query_row(&count_sql, rusqlite::params_from_iter(filter_params.iter()), |row| row.get(0))?;
    let pagination = Pagination::new(query.page, query.page_size, total_records);

    let list_sql = format!(
        "{}{}{} ORDER BY a.created_at {order}, a.id {order} LIMIT ? OFFSET ?",
        VIEW_SELECT,
        VIEW_FROM,
        filter_sql,
        order = query.sort_order.as_sql()
    );
    let mut list_params = vec![Value::Integer(viewer_id), Value::Integer(viewer_id)];
    list_params.extend(filter_params);
    list_params.push(Value::Integer(pagination.page_size));
    list_params.push(Value::Integer(pagination.offset()));

    let mut statement = conn.prepare(&list_sql)?;
    let rows = statement.query_map(rusqlite::params_from_iter(list_params.iter()), parse_view_row)?;
    let mut views = Vec::new();
    for row in rows {
        views.push(row?);
    }
    Ok((views, pagination))
}

/// Adds the grade-weighted points of rewards created in `[from, to)` to each
/// valid appreciation's running total. Returns the number of appreciations touched.
pub fn accumulate_total_reward_points(conn: &Connection, from: EpochMillis, to: EpochMillis) -> AppResult<usize> {
    let updated = conn.execute(
        "UPDATE appreciations
         SET total_reward_points = total_reward_points + (
             SELECT COALESCE(SUM(rw.point * g.points), 0)
             FROM rewards rw
             JOIN users u ON u.id = rw.sender
             JOIN grades g ON g.id = u.grade_id
             WHERE rw.appreciation_id = appreciations.id
               AND rw.created_at >= ?1 AND rw.created_at < ?2
         )
         WHERE is_valid = 1
           AND EXISTS (
             SELECT 1 FROM rewards rw
             WHERE rw.appreciation_id = appreciations.id
               AND rw.created_at >= ?1 AND rw.created_at < ?2
           )",
        params![from, to],
    )?;
    Ok(updated)
}

fn parse_appreciation_row(row: &Row<'_>) -> rusqlite::Result<Appreciation> {
    Ok(Appreciation {
        id: row.get(0)?,
        core_value_id: row.get(1)?,
        description: row.get(2)?,
        quarter: row.get(3)?,
        sender_id: row.get(4)?,
        receiver_id: row.get(5)?,
        is_valid: row.get(6)?,
        total_reward_points: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn parse_view_row(row: &Row<'_>) -> rusqlite::Result<AppreciationView> {
    Ok(AppreciationView {
        id: row.get(0)?,
        core_value_name: row.get(1)?,
        core_value_description: row.get(2)?,
        description: row.get(3)?,
        is_valid: row.get(4)?,
        total_reward_points: row.get(5)?,
        quarter: row.get(6)?,
        sender_id: row.get(7)?,
        sender_first_name: row.get(8)?,
        sender_last_name: row.get(9)?,
        sender_image_url: row.get(10)?,
        sender_designation: row.get(11)?,
        receiver_id: row.get(12)?,
        receiver_first_name: row.get(13)?,
        receiver_last_name: row.get(14)?,
        receiver_image_url: row.get(15)?,
        receiver_designation: row.get(16)?,
        total_rewards: row.get(17)?,
        given_reward_point: row.get(18)?,
        reported_flag: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, Database};
    use crate::models::{SortOrder, User};

    struct Seed {
        db: Database,
        ada: User,
        bob: User,
        cy: User,
        core_value_id: i64,
    }

    fn seed() -> Seed {
        let db = Database::in_memory().expect("db");
        let ada = fixtures::user(&db, "ada@peerly.dev", 10, 100);
        let bob = fixtures::user(&db, "bob@peerly.dev", 20, 100);
        let cy = fixtures::user(&db, "cy@peerly.dev", 30, 100);
        let core_value_id = fixtures::core_value(&db, "Ownership").id;
        Seed {
            db,
            ada,
            bob,
            cy,
            core_value_id,
        }
    }

    fn appreciate(seed: &Seed, sender: &User, receiver: &User, created_at: EpochMillis) -> Appreciation {
        seed.db
            .run(|conn| {
                insert_appreciation(
                    conn,
                    &NewAppreciation {
                        core_value_id: seed.core_value_id,
                        description: format!("{} thanks {}", sender.first_name, receiver.first_name),
                        quarter: 1,
                        sender_id: sender.id,
                        receiver_id: receiver.id,
                        created_at,
                    },
                )
            })
            .expect("appreciation")
    }

    fn query(page: i64, page_size: i64) -> AppreciationQuery {
        AppreciationQuery {
            name: None,
            self_only: false,
            sort_order: SortOrder::Desc,
            page,
            page_size,
        }
    }

    #[test]
    fn invalidated_appreciations_disappear_from_lookups() {
        let seed = seed();
        let appreciation = appreciate(&seed, &seed.ada, &seed.bob, 1_000);
        assert!(appreciation.is_valid);
        assert_eq!(appreciation.updated_at, 1_000);

        seed.db
            .run(|conn| invalidate_appreciation(conn, appreciation.id, 2_000))
            .expect("invalidate");
        let err = seed.db.run(|conn| get_appreciation(conn, appreciation.id)).expect_err("gone");
        assert!(matches!(err, AppError::AppreciationNotFound(id) if id == appreciation.id));
        let err = seed
            .db
            .run(|conn| invalidate_appreciation(conn, appreciation.id, 3_000))
            .expect_err("already invalid");
        assert!(matches!(err, AppError::AppreciationNotFound(_)));

        let (views, pagination) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.cy.id, &query(1, 10)))
            .expect("list");
        assert!(views.is_empty());
        assert_eq!(pagination.total_records, 0);
    }

    #[test]
    fn sender_cannot_equal_receiver_at_the_store() {
        let seed = seed();
        let result = seed.db.run(|conn| {
            insert_appreciation(
                conn,
                &NewAppreciation {
                    core_value_id: seed.core_value_id,
                    description: "me".to_string(),
                    quarter: 1,
                    sender_id: seed.ada.id,
                    receiver_id: seed.ada.id,
                    created_at: 0,
                },
            )
        });
        assert!(result.is_err());
    }

    #[test]
    fn view_reports_viewer_specific_fields() {
        let seed = seed();
        let appreciation = appreciate(&seed, &seed.ada, &seed.bob, 1_000);
        seed.db
            .run(|conn| {
                conn.execute(
                    "INSERT INTO rewards (appreciation_id, sender, point, created_at) VALUES (?1, ?2, 4, 5)",
                    params![appreciation.id, seed.cy.id],
                )?;
                Ok(())
            })
            .expect("reward");

        let as_cy = seed
            .db
            .run(|conn| get_appreciation_view(conn, seed.cy.id, appreciation.id))
            .expect("view");
        assert_eq!(as_cy.core_value_name, "Ownership");
        assert_eq!(as_cy.sender_first_name, "ada");
        assert_eq!(as_cy.receiver_first_name, "bob");
        assert_eq!(as_cy.total_rewards, 1);
        assert_eq!(as_cy.given_reward_point, 4);
        assert!(!as_cy.reported_flag);

        let as_ada = seed
            .db
            .run(|conn| get_appreciation_view(conn, seed.ada.id, appreciation.id))
            .expect("view");
        assert_eq!(as_ada.given_reward_point, 0);

        let err = seed
            .db
            .run(|conn| get_appreciation_view(conn, seed.ada.id, 404))
            .expect_err("missing");
        assert!(matches!(err, AppError::AppreciationNotFound(404)));
    }

    #[test]
    fn listing_filters_sorts_and_paginates() {
        let seed = seed();
        let first = appreciate(&seed, &seed.ada, &seed.bob, 1_000);
        let second = appreciate(&seed, &seed.bob, &seed.cy, 2_000);
        let third = appreciate(&seed, &seed.cy, &seed.ada, 3_000);

        let (page_one, pagination) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.ada.id, &query(1, 2)))
            .expect("page one");
        assert_eq!(
            page_one.iter().map(|view| view.id).collect::<Vec<_>>(),
            vec![third.id, second.id]
        );
        assert_eq!(pagination.total_records, 3);
        assert_eq!(pagination.total_pages, 2);
        assert_eq!(pagination.next, Some(2));

        let (page_two, _) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.ada.id, &query(2, 2)))
            .expect("page two");
        assert_eq!(page_two.iter().map(|view| view.id).collect::<Vec<_>>(), vec![first.id]);

        let mut ascending = query(1, 10);
        ascending.sort_order = SortOrder::Asc;
        let (ordered, _) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.ada.id, &ascending))
            .expect("asc");
        assert_eq!(ordered.first().map(|view| view.id), Some(first.id));

        let mut by_name = query(1, 10);
        by_name.name = Some("CY TES".to_string());
        let (named, pagination) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.ada.id, &by_name))
            .expect("by name");
        assert_eq!(pagination.total_records, 2);
        assert!(named.iter().all(|view| view.sender_id == seed.cy.id || view.receiver_id == seed.cy.id));

        for wildcard in ["_", "%", "\\"] {
            let mut literal = query(1, 10);
            literal.name = Some(wildcard.to_string());
            let (matched, _) = seed
                .db
                .run(|conn| list_appreciation_views(conn, seed.ada.id, &literal))
                .expect("wildcard name");
            assert!(matched.is_empty(), "{} matched {} rows", wildcard, matched.len());
        }

        let mut mine = query(1, 10);
        mine.self_only = true;
        let (own, _) = seed
            .db
            .run(|conn| list_appreciation_views(conn, seed.bob.id, &mine))
            .expect("self");
        let mut ids = own.iter().map(|view| view.id).collect::<Vec<_>>();
        ids.sort_unstable();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn accumulator_adds_grade_weighted_points_inside_window() {
        let seed = seed();
        let appreciation = appreciate(&seed, &seed.ada, &seed.bob, 1_000);
        seed.db
            .run(|conn| {
                conn.execute(
                    "INSERT INTO rewards (appreciation_id, sender, point, created_at) VALUES (?1, ?2, 3, 100)",
                    params![appreciation.id, seed.cy.id],
                )?;
                conn.execute(
                    "INSERT INTO rewards (appreciation_id, sender, point, created_at) VALUES (?1, ?2, 2, 500)",
                    params![appreciation.id, seed.ada.id],
                )?;
                Ok(())
            })
            .expect("rewards");

        let touched = seed
            .db
            .run(|conn| accumulate_total_reward_points(conn, 0, 200))
            .expect("accumulate");
        assert_eq!(touched, 1);
        let loaded = seed.db.run(|conn| get_appreciation(conn, appreciation.id)).expect("get");
        assert_eq!(loaded.total_reward_points, 3 * 30);

        seed.db
            .run(|conn| accumulate_total_reward_points(conn, 200, 1_000))
            .expect("accumulate");
        let loaded = seed.db.run(|conn| get_appreciation(conn, appreciation.id)).expect("get");
        assert_eq!(loaded.total_reward_points, 3 * 30 + 2 * 10);

        let touched = seed
            .db
            .run(|conn| accumulate_total_reward_points(conn, 5_000, 6_000))
            .expect("empty window");
        assert_eq!(touched, 0);
    }
}
