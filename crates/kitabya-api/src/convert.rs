//! Row → wire conversions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use kitabya_db::models::{
    BroadcastRow, ListingRow, OwnerRow, QuestionnaireRow, RecentSearchRow, ReportRow, UserRow,
};
use kitabya_types::api::{
    BroadcastResponse, ListingResponse, ListingSnapshot, QuestionnaireResponse,
    RecentSearchResponse, ReportResponse, UserProfile,
};
use kitabya_types::models::{BroadcastStatus, Location, OwnerSummary, ReportReason, ReportStatus};

/// Parse a stored timestamp; a corrupt value is logged and read as "now"
/// rather than failing the whole response.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Failed to parse timestamp '{}': {}", raw, e);
            Utc::now()
        })
}

pub fn owner_summary(row: OwnerRow) -> OwnerSummary {
    OwnerSummary {
        id: row.id,
        name: row.name,
        email: row.email,
    }
}

pub fn listing_response(row: ListingRow, owner: Option<OwnerSummary>) -> ListingResponse {
    ListingResponse {
        id: row.id,
        title: row.title,
        price: row.price,
        condition: row.condition,
        listing_type: row.listing_type,
        language: row.language,
        description: row.description,
        category_id: row.category_id,
        sub_category_id: row.sub_category_id,
        location: Location {
            address: row.location_address,
            latitude: row.location_latitude,
            longitude: row.location_longitude,
        },
        images: row.images,
        view_count: row.view_count,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        user: owner,
    }
}

/// Attach owners from a batch lookup. Listings whose owner is missing from
/// `owners` go out without one.
pub fn with_owners(rows: Vec<ListingRow>, owners: Vec<OwnerRow>) -> Vec<ListingResponse> {
    let owners: HashMap<String, OwnerSummary> = owners
        .into_iter()
        .map(|o| (o.id.clone(), owner_summary(o)))
        .collect();

    rows.into_iter()
        .map(|row| {
            let owner = owners.get(&row.owner_id).cloned();
            listing_response(row, owner)
        })
        .collect()
}

/// Distinct owner ids of a page, in first-seen order.
pub fn distinct_owner_ids(rows: &[ListingRow]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for row in rows {
        if !ids.contains(&row.owner_id) {
            ids.push(row.owner_id.clone());
        }
    }
    ids
}

pub fn recent_search_response(row: RecentSearchRow) -> RecentSearchResponse {
    RecentSearchResponse {
        id: row.id,
        searched_at: parse_timestamp(&row.searched_at),
        product: ListingSnapshot {
            id: row.listing_id,
            title: row.title,
            price: row.price,
            images: row.images,
            condition: row.condition,
            listing_type: row.listing_type,
            user: row.owner.map(owner_summary),
        },
    }
}

pub fn report_response(row: ReportRow) -> anyhow::Result<ReportResponse> {
    let reason: ReportReason = row.reason.parse()?;
    let status: ReportStatus = row.status.parse()?;
    Ok(ReportResponse {
        id: row.id,
        product_id: row.listing_id,
        reason,
        description: row.description,
        status,
        admin_comment: row.admin_comment,
        reviewed_by: row.reviewed_by,
        reviewed_at: row.reviewed_at.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        reporter: row.reporter.map(owner_summary),
    })
}

pub fn broadcast_response(row: BroadcastRow) -> BroadcastResponse {
    let status = row.status.parse().unwrap_or_else(|e| {
        warn!("Broadcast {} has {}", row.id, e);
        BroadcastStatus::Failed
    });
    BroadcastResponse {
        id: row.id,
        title: row.title,
        body: row.body,
        data: row.data.as_object().cloned().unwrap_or_default(),
        sent_by: row.sent_by,
        message_id: row.message_id,
        status,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn user_profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: row.id,
        email: row.email,
        name: row.name,
        photo_url: row.photo_url,
        location: row.location,
        date_of_birth: row.date_of_birth,
        is_admin: row.is_admin,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub fn questionnaire_response(row: QuestionnaireRow) -> anyhow::Result<QuestionnaireResponse> {
    Ok(QuestionnaireResponse {
        age_range: row.age_range.parse()?,
        id: row.id,
        user_id: row.user_id,
        profession: row.profession,
        books_interest: row.books_interest,
        city: row.city,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}
