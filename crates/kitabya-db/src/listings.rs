use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Value;

use crate::models::{ListingFilter, ListingPatch, ListingRow, ListingSort, NewListing};
use crate::{Database, OptionalExt, json_column, now_timestamp};

const LISTING_COLUMNS: &str = "id, owner_id, title, price, condition, listing_type, language, description, \
     category_id, sub_category_id, location_address, location_latitude, location_longitude, \
     images, view_count, created_at, updated_at";

impl Database {
    pub fn insert_listing(&self, listing: &NewListing) -> Result<()> {
        let images = serde_json::to_string(&listing.images)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, owner_id, title, price, condition, listing_type, language,
                    description, category_id, sub_category_id, location_address, location_latitude,
                    location_longitude, images, created_at, updated_at, title_search, description_search)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?16, ?17)",
                rusqlite::params![
                    listing.id,
                    listing.owner_id,
                    listing.title,
                    listing.price,
                    listing.condition,
                    listing.listing_type,
                    listing.language,
                    listing.description,
                    listing.category_id,
                    listing.sub_category_id,
                    listing.location_address,
                    listing.location_latitude,
                    listing.location_longitude,
                    images,
                    listing.created_at,
                    fold_case(&listing.title),
                    fold_case(&listing.description),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_listing(conn, id))
    }

    pub fn listing_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| listing_exists(conn, id))
    }

    /// Bump the view counter and return the row as it is after the bump.
    /// One statement, so concurrent readers never lose an increment.
    pub fn increment_view_count(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE listings SET view_count = view_count + 1 WHERE id = ?1 RETURNING {}",
                LISTING_COLUMNS
            );
            conn.query_row(&sql, [id], listing_from_row).optional()
        })
    }

    /// Apply `patch` and append `new_images` after the existing ones.
    pub fn update_listing(
        &self,
        id: &str,
        patch: &ListingPatch,
        new_images: &[String],
    ) -> Result<Option<ListingRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = query_listing(&tx, id)? else {
                return Ok(None);
            };

            let mut images = current.images;
            images.extend(new_images.iter().cloned());
            let images = serde_json::to_string(&images)?;

            let sql = format!(
                "UPDATE listings SET
                    title = COALESCE(?1, title),
                    price = COALESCE(?2, price),
                    condition = COALESCE(?3, condition),
                    listing_type = COALESCE(?4, listing_type),
                    language = COALESCE(?5, language),
                    description = COALESCE(?6, description),
                    category_id = COALESCE(?7, category_id),
                    sub_category_id = COALESCE(?8, sub_category_id),
                    location_address = COALESCE(?9, location_address),
                    location_latitude = COALESCE(?10, location_latitude),
                    location_longitude = COALESCE(?11, location_longitude),
                    images = ?12,
                    updated_at = ?13,
                    title_search = COALESCE(?15, title_search),
                    description_search = COALESCE(?16, description_search)
                 WHERE id = ?14
                 RETURNING {}",
                LISTING_COLUMNS
            );
            let updated = tx.query_row(
                &sql,
                rusqlite::params![
                    patch.title,
                    patch.price,
                    patch.condition,
                    patch.listing_type,
                    patch.language,
                    patch.description,
                    patch.category_id,
                    patch.sub_category_id,
                    patch.location_address,
                    patch.location_latitude,
                    patch.location_longitude,
                    images,
                    now_timestamp(),
                    id,
                    patch.title.as_deref().map(fold_case),
                    patch.description.as_deref().map(fold_case),
                ],
                listing_from_row,
            )?;
            tx.commit()?;
            Ok(Some(updated))
        })
    }

    /// Delete a listing, scoped to `owner_id` when given. Returns the deleted
    /// row so the caller can clean up its images.
    pub fn delete_listing(&self, id: &str, owner_id: Option<&str>) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            let row = match owner_id {
                Some(owner) => {
                    let sql = format!(
                        "DELETE FROM listings WHERE id = ?1 AND owner_id = ?2 RETURNING {}",
                        LISTING_COLUMNS
                    );
                    conn.query_row(&sql, [id, owner], listing_from_row).optional()?
                }
                None => {
                    let sql = format!("DELETE FROM listings WHERE id = ?1 RETURNING {}", LISTING_COLUMNS);
                    conn.query_row(&sql, [id], listing_from_row).optional()?
                }
            };
            Ok(row)
        })
    }

    /// Filtered, sorted page of listings plus the total match count.
    pub fn query_listings(
        &self,
        filter: &ListingFilter,
        sort: ListingSort,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<ListingRow>, u64)> {
        let (where_clause, mut params) = build_where(filter);

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM listings{}", where_clause),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM listings{} ORDER BY {} {}, rowid ASC LIMIT ? OFFSET ?",
                LISTING_COLUMNS,
                where_clause,
                sort.field.column(),
                sort.direction.keyword()
            );
            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(offset as i64));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total as u64))
        })
    }

    pub fn popular_listings(&self, limit: u32) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM listings ORDER BY view_count DESC, rowid ASC LIMIT ?1",
                LISTING_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn listing_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM listings WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn query_listing(conn: &Connection, id: &str) -> Result<Option<ListingRow>> {
    let sql = format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS);
    conn.query_row(&sql, [id], listing_from_row).optional()
}

fn listing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        condition: row.get(4)?,
        listing_type: row.get(5)?,
        language: row.get(6)?,
        description: row.get(7)?,
        category_id: row.get(8)?,
        sub_category_id: row.get(9)?,
        location_address: row.get(10)?,
        location_latitude: row.get(11)?,
        location_longitude: row.get(12)?,
        images: json_column(row, 13)?,
        view_count: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// SQLite's LIKE only folds ASCII, so free text is matched against
/// lowercased copies of title and description.
fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Escape LIKE wildcards so user text is matched literally.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn build_where(filter: &ListingFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(text) = &filter.text {
        clauses.push("(title_search LIKE ? ESCAPE '\\' OR description_search LIKE ? ESCAPE '\\')");
        let pattern = like_pattern(&fold_case(text));
        params.push(Value::Text(pattern.clone()));
        params.push(Value::Text(pattern));
    }

    let exact = [
        ("owner_id = ?", &filter.owner_id),
        ("listing_type = ?", &filter.listing_type),
        ("condition = ?", &filter.condition),
        ("language = ?", &filter.language),
        ("category_id = ?", &filter.category_id),
        ("sub_category_id = ?", &filter.sub_category_id),
    ];
    for (clause, value) in exact {
        if let Some(value) = value {
            clauses.push(clause);
            params.push(Value::Text(value.clone()));
        }
    }

    if let Some(min) = filter.min_price {
        clauses.push("price >= ?");
        params.push(Value::Real(min));
    }
    if let Some(max) = filter.max_price {
        clauses.push("price <= ?");
        params.push(Value::Real(max));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}
