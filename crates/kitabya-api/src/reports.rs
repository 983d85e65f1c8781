use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use kitabya_db::models::{NewReport, ReportInsert, ReportReview};
use kitabya_db::{new_id, now_timestamp};
use kitabya_types::api::{
    Envelope, PageQuery, ReportRequest, ReportResponse, UpdateReportStatusRequest,
};
use kitabya_types::models::{ReportReason, ReportStatus};

use crate::convert::report_response;
use crate::error::ApiError;
use crate::listings::parse_listing_id;
use crate::middleware::CurrentUser;
use crate::pagination::{Page, PageRequest};
use crate::state::{AppState, AppStateInner};

pub const MAX_TEXT_LEN: usize = 1000;

fn parse_reason(raw: &str) -> Result<ReportReason, ApiError> {
    raw.trim().parse().map_err(|_| {
        let allowed: Vec<&str> = ReportReason::ALL.iter().map(|r| r.as_str()).collect();
        ApiError::validation(format!("reason must be one of: {}", allowed.join(", ")))
    })
}

fn bounded_text(raw: &str, name: &str) -> Result<String, ApiError> {
    let text = raw.trim();
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ApiError::validation(format!(
            "{} must be at most {} characters",
            name, MAX_TEXT_LEN
        )));
    }
    Ok(text.to_string())
}

/// File a pending report. One report per user per listing; the second
/// attempt is a conflict.
pub async fn report(
    state: &AppStateInner,
    listing_id: &str,
    reporter_id: &str,
    reason: &str,
    description: &str,
) -> Result<ReportResponse, ApiError> {
    let reason = parse_reason(reason)?;
    let description = bounded_text(description, "description")?;
    if description.is_empty() {
        return Err(ApiError::validation("description is required"));
    }
    let listing_id = parse_listing_id(listing_id)?;

    let report = NewReport {
        id: new_id(),
        listing_id,
        reporter_id: reporter_id.to_string(),
        reason: reason.as_str().to_string(),
        description,
        created_at: now_timestamp(),
    };

    let row = match state.with_db(move |db| db.insert_report(&report)).await? {
        ReportInsert::Created(row) => row,
        ReportInsert::Duplicate => {
            return Err(ApiError::Conflict("You have already reported this product".into()));
        }
        ReportInsert::ListingMissing => return Err(ApiError::not_found("Product")),
    };

    info!("User {} reported product {} as {}", reporter_id, row.listing_id, row.reason);
    Ok(report_response(row)?)
}

pub async fn list_for_listing(
    state: &AppStateInner,
    listing_id: &str,
    page: PageRequest,
) -> Result<Page<ReportResponse>, ApiError> {
    let listing_id = parse_listing_id(listing_id)?;
    let (rows, total) = state
        .with_db(move |db| db.list_reports_for_listing(&listing_id, page.offset(), page.limit))
        .await?;

    let items = rows
        .into_iter()
        .map(report_response)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Page {
        items,
        pagination: page.pagination(total),
    })
}

/// Set a report's status. Any status may follow any other; a value outside
/// the known set is rejected before anything is written.
pub async fn update_status(
    state: &AppStateInner,
    report_id: &str,
    status: &str,
    admin_comment: Option<&str>,
    reviewer_id: &str,
) -> Result<ReportResponse, ApiError> {
    let status: ReportStatus = status.trim().parse().map_err(|_| {
        ApiError::validation("status must be one of: pending, reviewed, resolved")
    })?;
    let admin_comment = admin_comment
        .map(|c| bounded_text(c, "adminComment"))
        .transpose()?
        .filter(|c| !c.is_empty());

    let review = ReportReview {
        status: status.as_str().to_string(),
        admin_comment,
        reviewed_by: reviewer_id.to_string(),
        reviewed_at: now_timestamp(),
    };
    let id = report_id.to_string();
    let row = state
        .with_db(move |db| db.update_report_status(&id, &review))
        .await?
        .ok_or_else(|| ApiError::not_found("Report"))?;

    info!("Report {} set to {} by {}", row.id, row.status, reviewer_id);
    Ok(report_response(row)?)
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(listing_id): Path<String>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let filed = report(&state, &listing_id, &user.id, &req.reason, &req.description).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(filed).with_message("Report submitted successfully")),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(listing_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    user.ensure_admin()?;
    let Query(query) = query?;
    let page = list_for_listing(&state, &listing_id, PageRequest::new(query.page, query.limit)).await?;
    Ok(Json(Envelope::ok(page.items).with_pagination(page.pagination)))
}

pub async fn set_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(report_id): Path<String>,
    body: Result<Json<UpdateReportStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    user.ensure_admin()?;
    let Json(req) = body?;
    let updated = update_status(
        &state,
        &report_id,
        &req.status,
        req.admin_comment.as_deref(),
        &user.id,
    )
    .await?;
    Ok(Json(Envelope::ok(updated).with_message("Report status updated")))
}
