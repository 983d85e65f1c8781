use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::info;

use kitabya_db::models::QuestionnaireAnswers;
use kitabya_types::api::{Envelope, QuestionnaireRequest, QuestionnaireResponse};
use kitabya_types::models::AgeRange;

use crate::convert::questionnaire_response;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, AppStateInner};

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{} is required", name)))
}

/// Check a submission and normalize it: text trimmed, blank interests
/// dropped, at least one interest left.
pub fn validate(req: QuestionnaireRequest) -> Result<QuestionnaireAnswers, ApiError> {
    let profession = required(req.profession, "profession")?;
    let city = required(req.city, "city")?;

    let age_range = required(req.age_range, "ageRange")?;
    let age_range: AgeRange = age_range.parse().map_err(|_| {
        let allowed: Vec<&str> = AgeRange::ALL.iter().map(|r| r.as_str()).collect();
        ApiError::validation(format!("ageRange must be one of: {}", allowed.join(", ")))
    })?;

    let books_interest: Vec<String> = req
        .books_interest
        .unwrap_or_default()
        .into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect();
    if books_interest.is_empty() {
        return Err(ApiError::validation("booksInterest needs at least one entry"));
    }

    Ok(QuestionnaireAnswers {
        profession,
        books_interest,
        age_range: age_range.as_str().to_string(),
        city,
    })
}

pub async fn submit(
    state: &AppStateInner,
    user_id: &str,
    req: QuestionnaireRequest,
) -> Result<QuestionnaireResponse, ApiError> {
    let answers = validate(req)?;
    let id = user_id.to_string();
    let row = state
        .with_db(move |db| db.upsert_questionnaire(&id, &answers))
        .await?;

    info!("User {} submitted their questionnaire", user_id);
    Ok(questionnaire_response(row)?)
}

pub async fn fetch(
    state: &AppStateInner,
    user_id: &str,
) -> Result<Option<QuestionnaireResponse>, ApiError> {
    let id = user_id.to_string();
    let row = state.with_db(move |db| db.get_questionnaire(&id)).await?;
    Ok(row.map(questionnaire_response).transpose()?)
}

// -- Handlers --

pub async fn submit_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<QuestionnaireRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let questionnaire = submit(&state, &user.id, req).await?;
    Ok(Json(
        Envelope::ok(questionnaire).with_message("Questionnaire submitted successfully"),
    ))
}

/// `data` is `null` until the user has submitted.
pub async fn get_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let questionnaire = fetch(&state, &user.id).await?;
    Ok(Json(Envelope::ok(questionnaire)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(age_range: &str, interests: &[&str]) -> QuestionnaireRequest {
        QuestionnaireRequest {
            profession: Some(" Teacher ".into()),
            books_interest: Some(interests.iter().map(|s| s.to_string()).collect()),
            age_range: Some(age_range.into()),
            city: Some("Sfax".into()),
        }
    }

    #[test]
    fn valid_answers_are_trimmed() {
        let answers = validate(request("35-44", &["poetry", "  ", " science "])).unwrap();
        assert_eq!(answers.profession, "Teacher");
        assert_eq!(answers.books_interest, ["poetry", "science"]);
        assert_eq!(answers.age_range, "35-44");
    }

    #[test]
    fn bad_age_range_and_empty_interests_are_rejected() {
        let err = validate(request("30-40", &["poetry"])).unwrap_err();
        assert!(err.to_string().starts_with("ageRange must be one of: 13-17"));

        assert!(validate(request("55+", &[" "])).is_err());

        let missing_city = QuestionnaireRequest {
            city: None,
            ..request("55+", &["poetry"])
        };
        assert_eq!(validate(missing_city).unwrap_err().to_string(), "city is required");
    }
}
