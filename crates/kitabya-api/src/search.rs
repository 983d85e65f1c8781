use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use tracing::debug;

use kitabya_db::models::{ListingFilter, ListingSort, SortDirection};
use kitabya_types::api::{Envelope, ListingResponse, SearchQuery};

use crate::error::ApiError;
use crate::listings::{query_page, sort_field};
use crate::pagination::{Page, PageRequest};
use crate::state::{AppState, AppStateInner};

/// Trimmed value, or `None` when absent or blank. A blank filter never
/// matches on the empty string.
fn present(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_bound(value: Option<&str>, name: &str) -> Result<Option<f64>, ApiError> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ApiError::validation(format!("{} must be a number", name)))
}

/// Turn raw search parameters into a storage filter and sort order.
pub fn build_search(query: &SearchQuery) -> Result<(ListingFilter, ListingSort), ApiError> {
    let min_price = parse_bound(query.min_price.as_deref(), "minPrice")?;
    let max_price = parse_bound(query.max_price.as_deref(), "maxPrice")?;
    if let (Some(min), Some(max)) = (min_price, max_price) {
        if min > max {
            return Err(ApiError::validation("minPrice cannot be greater than maxPrice"));
        }
    }

    let filter = ListingFilter {
        text: present(query.query.as_deref()),
        owner_id: None,
        listing_type: present(query.listing_type.as_deref()),
        condition: present(query.condition.as_deref()),
        language: present(query.language.as_deref()),
        category_id: present(query.category_id.as_deref()),
        sub_category_id: present(query.sub_category_id.as_deref()),
        min_price,
        max_price,
    };

    let mut sort = ListingSort::default();
    if let Some(field) = present(query.sort_by.as_deref()) {
        sort.field = sort_field(&field)?;
    }
    if let Some(order) = present(query.sort_order.as_deref()) {
        sort.direction = match order.to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => return Err(ApiError::validation("sortOrder must be 'asc' or 'desc'")),
        };
    }

    Ok((filter, sort))
}

pub async fn search_listings(
    state: &AppStateInner,
    query: &SearchQuery,
) -> Result<Page<ListingResponse>, ApiError> {
    let (filter, sort) = build_search(query)?;
    debug!("Product search: {:?} sorted by {:?}", filter, sort);
    query_page(state, filter, sort, PageRequest::new(query.page, query.limit)).await
}

pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let page = search_listings(&state, &query).await?;

    Ok(Json(
        Envelope::ok(page.items)
            .with_message("Search completed")
            .with_pagination(page.pagination),
    ))
}
