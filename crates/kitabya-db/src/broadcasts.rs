use anyhow::Result;

use crate::models::BroadcastRow;
use crate::{Database, json_column};

impl Database {
    /// Append a broadcast to the audit log. Rows are never updated.
    pub fn insert_broadcast(&self, row: &BroadcastRow) -> Result<()> {
        let data = serde_json::to_string(&row.data)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO broadcasts (id, title, body, data, sent_by, message_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.title,
                    row.body,
                    data,
                    row.sent_by,
                    row.message_id,
                    row.status,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_broadcasts(&self, offset: u64, limit: u32) -> Result<(Vec<BroadcastRow>, u64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM broadcasts", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(
                "SELECT id, title, body, data, sent_by, message_id, status, created_at
                 FROM broadcasts
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset as i64], |row| {
                    Ok(BroadcastRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        body: row.get(2)?,
                        data: json_column(row, 3)?,
                        sent_by: row.get(4)?,
                        message_id: row.get(5)?,
                        status: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::BroadcastRow;
    use crate::test_support::db;
    use crate::{new_id, now_timestamp};

    fn entry(title: &str, status: &str) -> BroadcastRow {
        BroadcastRow {
            id: new_id(),
            title: title.to_string(),
            body: "body".into(),
            data: json!({ "screen": "home" }),
            sent_by: "admin".into(),
            message_id: None,
            status: status.to_string(),
            created_at: now_timestamp(),
        }
    }

    #[test]
    fn history_is_newest_first_and_paginated() {
        let db = db();
        for title in ["first", "second", "third"] {
            db.insert_broadcast(&entry(title, "sent")).unwrap();
        }
        db.insert_broadcast(&entry("fourth", "failed")).unwrap();

        let (rows, total) = db.list_broadcasts(0, 2).unwrap();
        assert_eq!(total, 4);
        assert_eq!(rows[0].title, "fourth");
        assert_eq!(rows[0].status, "failed");
        assert_eq!(rows[1].title, "third");
        assert_eq!(rows[0].data["screen"], "home");

        let (rows, _) = db.list_broadcasts(2, 2).unwrap();
        assert_eq!(rows[1].title, "first");
    }
}
