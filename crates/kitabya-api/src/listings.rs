use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use kitabya_db::models::{
    ListingFilter, ListingPatch, ListingSort, NewListing, OwnerRow, SortDirection, SortField,
};
use kitabya_db::{new_id, now_timestamp};
use kitabya_types::api::{Envelope, LimitQuery, ListQuery, ListingResponse};

use crate::blob::Upload;
use crate::convert::{distinct_owner_ids, listing_response, owner_summary, with_owners};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::pagination::{Page, PageRequest, clamp_limit};
use crate::state::{AppState, AppStateInner};
use crate::upload::{Form, read_form};

/// Most images a listing may carry.
pub const MAX_IMAGES: usize = 10;

const IMAGE_FOLDER: &str = "products";

/// Attributes of a listing about to be created, already validated.
#[derive(Debug, Clone)]
pub struct ListingDraft {
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
}

impl ListingDraft {
    pub fn from_form(form: &Form) -> Result<Self, ApiError> {
        let required = [
            "title",
            "price",
            "condition",
            "type",
            "language",
            "description",
            "locationAddress",
        ];
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|name| form.text(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let text = |name: &str| form.text(name).unwrap_or_default().to_string();
        Ok(Self {
            title: text("title"),
            price: parse_price(&text("price"))?,
            condition: text("condition"),
            listing_type: text("type"),
            language: text("language"),
            description: text("description"),
            category_id: form.text("categoryId").map(str::to_string),
            sub_category_id: sub_category(form),
            location_address: text("locationAddress"),
            location_latitude: parse_coordinate(form, "locationLatitude", 90.0)?,
            location_longitude: parse_coordinate(form, "locationLongitude", 180.0)?,
        })
    }
}

/// Build a patch from whichever fields the form carries.
pub fn patch_from_form(form: &Form) -> Result<ListingPatch, ApiError> {
    let owned = |name: &str| form.text(name).map(str::to_string);
    Ok(ListingPatch {
        title: owned("title"),
        price: form.text("price").map(parse_price).transpose()?,
        condition: owned("condition"),
        listing_type: owned("type"),
        language: owned("language"),
        description: owned("description"),
        category_id: owned("categoryId"),
        sub_category_id: sub_category(form),
        location_address: owned("locationAddress"),
        location_latitude: parse_coordinate(form, "locationLatitude", 90.0)?,
        location_longitude: parse_coordinate(form, "locationLongitude", 180.0)?,
    })
}

fn sub_category(form: &Form) -> Option<String> {
    form.text("subCategoryId")
        .or_else(|| form.text("categorySubId"))
        .map(str::to_string)
}

fn parse_price(raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| ApiError::validation("price must be a non-negative number"))
}

fn parse_coordinate(form: &Form, name: &str, bound: f64) -> Result<Option<f64>, ApiError> {
    let Some(raw) = form.text(name) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= bound)
        .map(Some)
        .ok_or_else(|| ApiError::validation(format!("{} must be between -{} and {}", name, bound, bound)))
}

pub fn parse_listing_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::validation("Invalid product id"))
}

pub fn sort_field(name: &str) -> Result<SortField, ApiError> {
    match name {
        "createdAt" => Ok(SortField::CreatedAt),
        "updatedAt" => Ok(SortField::UpdatedAt),
        "price" => Ok(SortField::Price),
        "title" => Ok(SortField::Title),
        "viewCount" => Ok(SortField::ViewCount),
        other => Err(ApiError::validation(format!("Cannot sort by '{}'", other))),
    }
}

/// `field` sorts ascending, `-field` descending; absent means newest first.
pub fn parse_sort(sort: Option<&str>) -> Result<ListingSort, ApiError> {
    let Some(sort) = sort.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(ListingSort::default());
    };
    let (name, direction) = match sort.strip_prefix('-') {
        Some(name) => (name, SortDirection::Desc),
        None => (sort, SortDirection::Asc),
    };
    Ok(ListingSort {
        field: sort_field(name)?,
        direction,
    })
}

// -- Blob helpers --

/// Upload every file concurrently, keeping submission order. If any upload
/// fails the ones that succeeded are deleted and the first error returned.
pub(crate) async fn upload_all(
    state: &AppStateInner,
    folder: &str,
    files: &[Upload],
) -> Result<Vec<String>, ApiError> {
    let results = join_all(files.iter().map(|file| state.blobs.put(folder, file))).await;

    let mut urls = Vec::with_capacity(results.len());
    let mut failure = None;
    for result in results {
        match result {
            Ok(url) => urls.push(url),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = failure {
        discard_blobs(state, &urls).await;
        return Err(e.into());
    }
    Ok(urls)
}

/// Best-effort blob removal; failures are logged only.
pub(crate) async fn discard_blobs(state: &AppStateInner, urls: &[String]) {
    for url in urls {
        if let Err(e) = state.blobs.delete(url).await {
            warn!("Failed to delete blob {}: {}", url, e);
        }
    }
}

async fn owner_of(state: &AppStateInner, owner_id: &str) -> Result<Option<OwnerRow>, ApiError> {
    let ids = vec![owner_id.to_string()];
    let owners = state.with_db(move |db| db.get_owner_summaries(&ids)).await?;
    Ok(owners.into_iter().next())
}

// -- Operations --

pub async fn create_listing(
    state: &AppStateInner,
    owner_id: &str,
    draft: ListingDraft,
    images: Vec<Upload>,
) -> Result<ListingResponse, ApiError> {
    if images.is_empty() {
        return Err(ApiError::validation("At least one image is required"));
    }
    if images.len() > MAX_IMAGES {
        return Err(ApiError::validation(format!(
            "A product may have at most {} images",
            MAX_IMAGES
        )));
    }

    let owner = owner_of(state, owner_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let urls = upload_all(state, IMAGE_FOLDER, &images).await?;

    let id = new_id();
    let listing = NewListing {
        id: id.clone(),
        owner_id: owner.id.clone(),
        title: draft.title,
        price: draft.price,
        condition: draft.condition,
        listing_type: draft.listing_type,
        language: draft.language,
        description: draft.description,
        category_id: draft.category_id,
        sub_category_id: draft.sub_category_id,
        location_address: draft.location_address,
        location_latitude: draft.location_latitude,
        location_longitude: draft.location_longitude,
        images: urls.clone(),
        created_at: now_timestamp(),
    };

    let lookup = id.clone();
    let stored = state
        .with_db(move |db| {
            db.insert_listing(&listing)?;
            db.get_listing(&lookup)
        })
        .await;

    let row = match stored {
        Ok(Some(row)) => row,
        Ok(None) => {
            discard_blobs(state, &urls).await;
            return Err(anyhow::anyhow!("Listing {} missing right after insert", id).into());
        }
        Err(e) => {
            discard_blobs(state, &urls).await;
            return Err(e);
        }
    };

    info!("User {} created product {} with {} image(s)", owner.id, row.id, urls.len());
    Ok(listing_response(row, Some(owner_summary(owner))))
}

/// Owner-only update. New images are appended after the existing ones.
pub async fn update_listing(
    state: &AppStateInner,
    caller_id: &str,
    id: &str,
    patch: ListingPatch,
    images: Vec<Upload>,
) -> Result<ListingResponse, ApiError> {
    let id = parse_listing_id(id)?;

    let lookup = id.clone();
    let current = state
        .with_db(move |db| db.get_listing(&lookup))
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    if current.owner_id != caller_id {
        return Err(ApiError::Forbidden("You can only modify your own products".into()));
    }
    if current.images.len() + images.len() > MAX_IMAGES {
        return Err(ApiError::validation(format!(
            "A product may have at most {} images",
            MAX_IMAGES
        )));
    }

    let urls = upload_all(state, IMAGE_FOLDER, &images).await?;

    let new_images = urls.clone();
    let target = id.clone();
    let updated = state
        .with_db(move |db| db.update_listing(&target, &patch, &new_images))
        .await;

    let row = match updated {
        Ok(Some(row)) => row,
        Ok(None) => {
            discard_blobs(state, &urls).await;
            return Err(ApiError::not_found("Product"));
        }
        Err(e) => {
            discard_blobs(state, &urls).await;
            return Err(e);
        }
    };

    info!("User {} updated product {} (+{} image(s))", caller_id, id, urls.len());
    let owner = owner_of(state, &row.owner_id).await?.map(owner_summary);
    Ok(listing_response(row, owner))
}

/// Delete a listing. With `owner_id` the delete only matches that owner's
/// listing, so other users see "not found". Image cleanup is best-effort.
pub async fn delete_listing(
    state: &AppStateInner,
    id: &str,
    owner_id: Option<&str>,
) -> Result<(), ApiError> {
    let id = parse_listing_id(id)?;

    let target = id.clone();
    let owner = owner_id.map(str::to_string);
    let deleted = state
        .with_db(move |db| db.delete_listing(&target, owner.as_deref()))
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    info!("Deleted product {} owned by {}", id, deleted.owner_id);
    discard_blobs(state, &deleted.images).await;
    Ok(())
}

/// Fetch a listing, counting the read as a view.
pub async fn get_listing(state: &AppStateInner, id: &str) -> Result<ListingResponse, ApiError> {
    let id = parse_listing_id(id)?;

    let row = state
        .with_db(move |db| db.increment_view_count(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    let owner = owner_of(state, &row.owner_id).await?.map(owner_summary);
    Ok(listing_response(row, owner))
}

/// One page of listings matching `filter`, owners resolved in one lookup.
pub async fn query_page(
    state: &AppStateInner,
    filter: ListingFilter,
    sort: ListingSort,
    page: PageRequest,
) -> Result<Page<ListingResponse>, ApiError> {
    let (rows, total, owners) = state
        .with_db(move |db| {
            let (rows, total) = db.query_listings(&filter, sort, page.offset(), page.limit)?;
            let owners = db.get_owner_summaries(&distinct_owner_ids(&rows))?;
            Ok((rows, total, owners))
        })
        .await?;

    Ok(Page {
        items: with_owners(rows, owners),
        pagination: page.pagination(total),
    })
}

pub async fn list_listings(
    state: &AppStateInner,
    owner_id: Option<String>,
    query: &ListQuery,
) -> Result<Page<ListingResponse>, ApiError> {
    let sort = parse_sort(query.sort.as_deref())?;
    let filter = ListingFilter {
        owner_id,
        ..ListingFilter::default()
    };
    query_page(state, filter, sort, PageRequest::new(query.page, query.limit)).await
}

/// Most viewed first. A failed owner lookup only drops the owner fields.
pub async fn popular_listings(
    state: &AppStateInner,
    limit: Option<u32>,
) -> Result<Vec<ListingResponse>, ApiError> {
    let limit = clamp_limit(limit);
    let rows = state.with_db(move |db| db.popular_listings(limit)).await?;

    let ids = distinct_owner_ids(&rows);
    let owners = match state.with_db(move |db| db.get_owner_summaries(&ids)).await {
        Ok(owners) => owners,
        Err(e) => {
            warn!("Owner lookup for popular products failed: {}", e);
            Vec::new()
        }
    };
    Ok(with_owners(rows, owners))
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart?, "images", MAX_IMAGES).await?;
    let draft = ListingDraft::from_form(&form)?;
    let listing = create_listing(&state, &user.id, draft, form.files).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(listing).with_message("Product created successfully")),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(multipart?, "images", MAX_IMAGES).await?;
    let patch = patch_from_form(&form)?;
    let listing = update_listing(&state, &user.id, &id, patch, form.files).await?;

    Ok(Json(Envelope::ok(listing).with_message("Product updated successfully")))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = if user.is_admin { None } else { Some(user.id.as_str()) };
    delete_listing(&state, &id, owner).await?;

    Ok(Json(Envelope::message("Product deleted successfully")))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = get_listing(&state, &id).await?;
    Ok(Json(Envelope::ok(listing)))
}

pub async fn list_all(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let page = list_listings(&state, None, &query).await?;

    Ok(Json(
        Envelope::ok(page.items)
            .with_message("Products retrieved successfully")
            .with_pagination(page.pagination),
    ))
}

pub async fn list_by_owner(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let page = list_listings(&state, Some(user_id), &query).await?;

    Ok(Json(Envelope::ok(page.items).with_pagination(page.pagination)))
}

pub async fn popular(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let listings = popular_listings(&state, query.limit).await?;
    Ok(Json(Envelope::ok(listings)))
}
