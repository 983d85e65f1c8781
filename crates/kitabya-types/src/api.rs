use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{
    AgeRange, BroadcastStatus, Location, OwnerSummary, ReportReason, ReportStatus,
};

// -- Identity token claims --

/// Claims carried by the bearer credential. `sub` is the stable subject id
/// issued by the identity provider; local users are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub exp: usize,
}

// -- Envelope --

/// Standard JSON envelope: `{success, message?, data?, error?, pagination?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
            pagination: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
            pagination: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            error: Some(code.into()),
            pagination: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

// -- Query strings --

/// `?page=&limit=&sort=` where `sort` is `field` or `-field`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

/// Search parameters. Prices stay strings so an empty value means "no bound"
/// and a non-numeric one can be reported as a validation error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    #[serde(rename = "type")]
    pub listing_type: Option<String>,
    pub condition: Option<String>,
    pub language: Option<String>,
    pub category_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -- Listings --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub condition: String,
    #[serde(rename = "type")]
    pub listing_type: String,
    pub language: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category_id: Option<String>,
    pub location: Location,
    pub images: Vec<String>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<OwnerSummary>,
}

// -- Recent searches --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordRecentSearchRequest {
    pub product_id: String,
}

/// Present-tense view of the listing a recent search points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub images: Vec<String>,
    pub condition: String,
    #[serde(rename = "type")]
    pub listing_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<OwnerSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSearchResponse {
    pub id: String,
    pub searched_at: DateTime<Utc>,
    pub product: ListingSnapshot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeletedCount {
    pub deleted: usize,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateReportStatusRequest {
    #[serde(default)]
    pub status: String,
    pub admin_comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub product_id: String,
    pub reason: ReportReason,
    pub description: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<OwnerSummary>,
}

// -- Notifications --

#[derive(Debug, Default, Deserialize)]
pub struct SendNotificationRequest {
    pub token: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationResponse {
    pub message_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BroadcastRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub data: Map<String, Value>,
    pub sent_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub status: BroadcastStatus,
    pub created_at: DateTime<Utc>,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `data` of the sign-in endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

// -- Questionnaire --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireRequest {
    pub profession: Option<String>,
    pub books_interest: Option<Vec<String>>,
    pub age_range: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    pub id: String,
    pub user_id: String,
    pub profession: String,
    pub books_interest: Vec<String>,
    pub age_range: AgeRange,
    pub city: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
