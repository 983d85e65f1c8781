use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::models::{OwnerRow, ProfilePatch, SignIn, UserRow};
use crate::{Database, OptionalExt, new_id, now_timestamp};

const USER_COLUMNS: &str = "id, subject, email, name, photo_url, location, date_of_birth, is_admin, created_at, updated_at";

impl Database {
    /// Map a verified sign-in to its local user, creating or linking it:
    /// first by subject, then by email (adopting the new subject), else a
    /// fresh row named after `name` or the email's local part.
    pub fn resolve_user(&self, sign_in: SignIn<'_>) -> Result<UserRow> {
        let SignIn {
            subject,
            email,
            name,
            picture,
            grant_admin,
        } = sign_in;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            let existing = match query_user(&tx, "subject", subject)? {
                Some(user) => Some(user),
                None => {
                    let by_email = query_user(&tx, "email", email)?;
                    if let Some(user) = &by_email {
                        tx.execute(
                            "UPDATE users SET subject = ?1, photo_url = COALESCE(photo_url, ?2),
                                updated_at = ?3
                             WHERE id = ?4",
                            (subject, picture, &now, &user.id),
                        )?;
                        info!("Linked user {} to subject {}", user.id, subject);
                    }
                    by_email
                }
            };

            let id = match existing {
                Some(user) => {
                    if grant_admin && !user.is_admin {
                        tx.execute(
                            "UPDATE users SET is_admin = 1, updated_at = ?1 WHERE id = ?2",
                            (&now, &user.id),
                        )?;
                    }
                    user.id
                }
                None => {
                    let id = new_id();
                    let display_name = name
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| email.split('@').next().unwrap_or(email));
                    tx.execute(
                        "INSERT INTO users (id, subject, email, name, photo_url, is_admin, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                        rusqlite::params![id, subject, email, display_name, picture, grant_admin, now],
                    )?;
                    info!("Created user {} for subject {}", id, subject);
                    id
                }
            };

            let user = query_user(&tx, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("User vanished during resolution: {}", id))?;
            tx.commit()?;
            Ok(user)
        })
    }

    /// Register a user by email ahead of their first sign-in. An existing
    /// user with that email is returned unchanged; the flag says whether a
    /// row was created.
    pub fn register_user(&self, name: &str, email: &str) -> Result<(UserRow, bool)> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            let inserted = conn.execute(
                "INSERT INTO users (id, email, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(email) DO NOTHING",
                (new_id(), email, name, &now),
            )?;

            let user = query_user(conn, "email", email)?
                .ok_or_else(|| anyhow::anyhow!("User vanished during registration: {}", email))?;
            if inserted > 0 {
                info!("Registered user {} ({})", user.id, email);
            }
            Ok((user, inserted > 0))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Apply a profile patch. Returns the updated user and the photo URL it
    /// replaced, if the patch carried a new one.
    pub fn update_profile(
        &self,
        id: &str,
        patch: &ProfilePatch,
    ) -> Result<Option<(UserRow, Option<String>)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(before) = query_user(&tx, "id", id)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE users SET
                    name = COALESCE(?1, name),
                    location = COALESCE(?2, location),
                    date_of_birth = COALESCE(?3, date_of_birth),
                    photo_url = COALESCE(?4, photo_url),
                    updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    patch.name,
                    patch.location,
                    patch.date_of_birth,
                    patch.photo_url,
                    now_timestamp(),
                    id
                ],
            )?;

            let after = query_user(&tx, "id", id)?
                .ok_or_else(|| anyhow::anyhow!("User vanished during update: {}", id))?;
            tx.commit()?;

            let replaced = if patch.photo_url.is_some() { before.photo_url } else { None };
            Ok(Some((after, replaced)))
        })
    }

    /// Batch-fetch owner summaries for a set of user IDs in one query.
    pub fn get_owner_summaries(&self, user_ids: &[String]) -> Result<Vec<OwnerRow>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, name, email FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(user_ids.iter()), |row| {
                    Ok(OwnerRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, key: &'static str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, key);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                subject: row.get(1)?,
                email: row.get(2)?,
                name: row.get(3)?,
                photo_url: row.get(4)?,
                location: row.get(5)?,
                date_of_birth: row.get(6)?,
                is_admin: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}
