use anyhow::Result;

use crate::listings::listing_exists;
use crate::models::{OwnerRow, RecentSearchEntry, RecentSearchRow};
use crate::{Database, json_column, new_id};

impl Database {
    /// Record that `user_id` viewed `listing_id` at `at`. One row per pair:
    /// a repeat view only moves `searched_at`. Returns `None` when the
    /// listing does not exist.
    pub fn upsert_recent_search(
        &self,
        user_id: &str,
        listing_id: &str,
        at: &str,
    ) -> Result<Option<RecentSearchEntry>> {
        self.with_conn(|conn| {
            if !listing_exists(conn, listing_id)? {
                return Ok(None);
            }

            let entry = conn.query_row(
                "INSERT INTO recent_searches (id, user_id, listing_id, searched_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, listing_id) DO UPDATE SET searched_at = excluded.searched_at
                 RETURNING id, searched_at",
                rusqlite::params![new_id(), user_id, listing_id, at],
                |row| {
                    Ok(RecentSearchEntry {
                        id: row.get(0)?,
                        searched_at: row.get(1)?,
                    })
                },
            )?;
            Ok(Some(entry))
        })
    }

    /// Newest first. Rows whose listing is gone drop out through the join.
    pub fn list_recent_searches(&self, user_id: &str, limit: u32) -> Result<Vec<RecentSearchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.searched_at, l.id, l.title, l.price, l.images, l.condition,
                        l.listing_type, u.id, u.name, u.email
                 FROM recent_searches r
                 JOIN listings l ON l.id = r.listing_id
                 LEFT JOIN users u ON u.id = l.owner_id
                 WHERE r.user_id = ?1
                 ORDER BY r.searched_at DESC, r.rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    let owner_id: Option<String> = row.get(8)?;
                    let owner = match owner_id {
                        Some(id) => Some(OwnerRow {
                            id,
                            name: row.get(9)?,
                            email: row.get(10)?,
                        }),
                        None => None,
                    };
                    Ok(RecentSearchRow {
                        id: row.get(0)?,
                        searched_at: row.get(1)?,
                        listing_id: row.get(2)?,
                        title: row.get(3)?,
                        price: row.get(4)?,
                        images: json_column(row, 5)?,
                        condition: row.get(6)?,
                        listing_type: row.get(7)?,
                        owner,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn clear_recent_searches(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM recent_searches WHERE user_id = ?1", [user_id])?;
            Ok(removed)
        })
    }

    pub fn delete_recent_search(&self, user_id: &str, id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM recent_searches WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(removed)
        })
    }

    /// Drop every record last touched before `cutoff`.
    pub fn prune_recent_searches(&self, cutoff: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM recent_searches WHERE searched_at < ?1", [cutoff])?;
            Ok(removed)
        })
    }
}
