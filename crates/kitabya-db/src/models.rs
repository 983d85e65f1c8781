//! Database row types. These map directly to SQLite rows.
//! Distinct from kitabya-types API models to keep the DB layer independent.
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    /// `None` until a user registered by email first signs in.
    pub subject: Option<String>,
    pub email: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<String>,
    pub is_admin: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRow {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub date_of_birth: Option<String>,
    pub photo_url: Option<String>,
}

/// Fields of a sign-in, as verified by the identity provider.
#[derive(Debug, Clone, Copy)]
pub struct SignIn<'a> {
    pub subject: &'a str,
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub picture: Option<&'a str>,
    pub grant_admin: bool,
}

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub price: f64,
    pub condition: String,
    pub listing_type: String,
    pub language: String,
    pub description: String,
    pub category_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub location_address: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub images: Vec<String>,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewListing {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub price: f64,
    pub condition: String,
    pub listing_type: String,
    pub language: String,
    pub description: String,
    pub category_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub location_address: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub images: Vec<String>,
    pub created_at: String,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Default, Clone)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<String>,
    pub listing_type: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub location_address: Option<String>,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Price,
    Title,
    ViewCount,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Price => "price",
            Self::Title => "title",
            Self::ViewCount => "view_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for ListingSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Predicates for a listing query. Every `Some` narrows the result (AND);
/// `text` matches title or description, case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct ListingFilter {
    pub text: Option<String>,
    pub owner_id: Option<String>,
    pub listing_type: Option<String>,
    pub condition: Option<String>,
    pub language: Option<String>,
    pub category_id: Option<String>,
    pub sub_category_id: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

pub struct RecentSearchEntry {
    pub id: String,
    pub searched_at: String,
}

/// A recent search joined with the current state of its listing and owner.
pub struct RecentSearchRow {
    pub id: String,
    pub searched_at: String,
    pub listing_id: String,
    pub title: String,
    pub price: f64,
    pub images: Vec<String>,
    pub condition: String,
    pub listing_type: String,
    pub owner: Option<OwnerRow>,
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub listing_id: String,
    pub reporter_id: String,
    pub reason: String,
    pub description: String,
    pub status: String,
    pub admin_comment: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub reporter: Option<OwnerRow>,
}

pub struct NewReport {
    pub id: String,
    pub listing_id: String,
    pub reporter_id: String,
    pub reason: String,
    pub description: String,
    pub created_at: String,
}

pub enum ReportInsert {
    Created(ReportRow),
    Duplicate,
    ListingMissing,
}

pub struct ReportReview {
    pub status: String,
    pub admin_comment: Option<String>,
    pub reviewed_by: String,
    pub reviewed_at: String,
}

#[derive(Debug, Clone)]
pub struct QuestionnaireRow {
    pub id: String,
    pub user_id: String,
    pub profession: String,
    pub books_interest: Vec<String>,
    pub age_range: String,
    pub city: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct QuestionnaireAnswers {
    pub profession: String,
    pub books_interest: Vec<String>,
    pub age_range: String,
    pub city: String,
}

#[derive(Debug, Clone)]
pub struct BroadcastRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub sent_by: String,
    pub message_id: Option<String>,
    pub status: String,
    pub created_at: String,
}
