use anyhow::Result;
use rusqlite::Connection;

use crate::listings::listing_exists;
use crate::models::{NewReport, OwnerRow, ReportInsert, ReportReview, ReportRow};
use crate::{Database, OptionalExt};

const REPORT_SELECT: &str = "SELECT r.id, r.listing_id, r.reporter_id, r.reason, r.description, r.status,
        r.admin_comment, r.reviewed_by, r.reviewed_at, r.created_at, r.updated_at,
        u.id, u.name, u.email
     FROM reports r
     LEFT JOIN users u ON u.id = r.reporter_id";

impl Database {
    /// Insert a pending report. The (listing, reporter) uniqueness is
    /// enforced by the table constraint, so a concurrent duplicate loses
    /// inside SQLite rather than in a check-then-insert race.
    pub fn insert_report(&self, report: &NewReport) -> Result<ReportInsert> {
        self.with_conn(|conn| {
            if !listing_exists(conn, &report.listing_id)? {
                return Ok(ReportInsert::ListingMissing);
            }

            let inserted = conn.execute(
                "INSERT INTO reports (id, listing_id, reporter_id, reason, description, status,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
                 ON CONFLICT(listing_id, reporter_id) DO NOTHING",
                rusqlite::params![
                    report.id,
                    report.listing_id,
                    report.reporter_id,
                    report.reason,
                    report.description,
                    report.created_at,
                ],
            )?;
            if inserted == 0 {
                return Ok(ReportInsert::Duplicate);
            }

            let row = query_report(conn, &report.id)?
                .ok_or_else(|| anyhow::anyhow!("Report vanished after insert: {}", report.id))?;
            Ok(ReportInsert::Created(row))
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// Newest first, with the total count for the listing.
    pub fn list_reports_for_listing(
        &self,
        listing_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<ReportRow>, u64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reports WHERE listing_id = ?1",
                [listing_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "{} WHERE r.listing_id = ?1 ORDER BY r.created_at DESC, r.rowid DESC LIMIT ?2 OFFSET ?3",
                REPORT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![listing_id, limit, offset as i64], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    pub fn update_report_status(&self, id: &str, review: &ReportReview) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE reports SET status = ?1, admin_comment = ?2, reviewed_by = ?3,
                    reviewed_at = ?4, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    review.status,
                    review.admin_comment,
                    review.reviewed_by,
                    review.reviewed_at,
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_report(conn, id)
        })
    }
}

fn query_report(conn: &Connection, id: &str) -> Result<Option<ReportRow>> {
    let sql = format!("{} WHERE r.id = ?1", REPORT_SELECT);
    conn.query_row(&sql, [id], report_from_row).optional()
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    let reporter_id: Option<String> = row.get(11)?;
    let reporter = match reporter_id {
        Some(id) => Some(OwnerRow {
            id,
            name: row.get(12)?,
            email: row.get(13)?,
        }),
        None => None,
    };

    Ok(ReportRow {
        id: row.get(0)?,
        listing_id: row.get(1)?,
        reporter_id: row.get(2)?,
        reason: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        admin_comment: row.get(6)?,
        reviewed_by: row.get(7)?,
        reviewed_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        reporter,
    })
}

#[cfg(test)]
mod tests {
    use crate::models::{NewReport, ReportInsert, ReportReview};
    use crate::test_support::{db, listing, user};
    use crate::{new_id, now_timestamp};

    fn report(listing_id: &str, reporter_id: &str) -> NewReport {
        NewReport {
            id: new_id(),
            listing_id: listing_id.to_string(),
            reporter_id: reporter_id.to_string(),
            reason: "spam".into(),
            description: "x".into(),
            created_at: now_timestamp(),
        }
    }

    #[test]
    fn second_report_by_same_user_is_a_duplicate() {
        let db = db();
        let owner = user(&db, "owner");
        let reporter = user(&db, "reporter");
        let id = listing(&db, &owner, "Dubious", 2.0);

        let created = match db.insert_report(&report(&id, &reporter)).unwrap() {
            ReportInsert::Created(row) => row,
            _ => panic!("expected Created"),
        };
        assert_eq!(created.status, "pending");
        assert_eq!(created.reporter.as_ref().unwrap().name, "reporter");

        assert!(matches!(db.insert_report(&report(&id, &reporter)).unwrap(), ReportInsert::Duplicate));
        assert!(matches!(db.insert_report(&report(&id, &owner)).unwrap(), ReportInsert::Created(_)));
        assert!(matches!(
            db.insert_report(&report("missing", &reporter)).unwrap(),
            ReportInsert::ListingMissing
        ));

        let (rows, total) = db.list_reports_for_listing(&id, 0, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].reporter_id, owner);
    }

    #[test]
    fn review_sets_status_comment_and_reviewer() {
        let db = db();
        let owner = user(&db, "owner");
        let id = listing(&db, &owner, "Item", 2.0);
        let new = report(&id, &owner);
        db.insert_report(&new).unwrap();

        let review = ReportReview {
            status: "resolved".into(),
            admin_comment: Some("removed".into()),
            reviewed_by: "admin-1".into(),
            reviewed_at: now_timestamp(),
        };
        let row = db.update_report_status(&new.id, &review).unwrap().unwrap();
        assert_eq!(row.status, "resolved");
        assert_eq!(row.admin_comment.as_deref(), Some("removed"));
        assert_eq!(row.reviewed_by.as_deref(), Some("admin-1"));
        assert!(row.reviewed_at.is_some());

        assert!(db.update_report_status("missing", &review).unwrap().is_none());
    }
}
