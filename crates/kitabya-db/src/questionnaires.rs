use anyhow::Result;
use rusqlite::Connection;

use crate::models::{QuestionnaireAnswers, QuestionnaireRow};
use crate::{Database, OptionalExt, json_column, new_id, now_timestamp};

const QUESTIONNAIRE_COLUMNS: &str =
    "id, user_id, profession, books_interest, age_range, city, created_at, updated_at";

impl Database {
    /// Insert or replace the user's answers. A user has at most one
    /// questionnaire; resubmitting keeps its id and creation time.
    pub fn upsert_questionnaire(
        &self,
        user_id: &str,
        answers: &QuestionnaireAnswers,
    ) -> Result<QuestionnaireRow> {
        let books_interest = serde_json::to_string(&answers.books_interest)?;
        self.with_conn(|conn| {
            let sql = format!(
                "INSERT INTO questionnaires (id, user_id, profession, books_interest, age_range, city,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                    profession = excluded.profession,
                    books_interest = excluded.books_interest,
                    age_range = excluded.age_range,
                    city = excluded.city,
                    updated_at = excluded.updated_at
                 RETURNING {}",
                QUESTIONNAIRE_COLUMNS
            );
            let row = conn.query_row(
                &sql,
                rusqlite::params![
                    new_id(),
                    user_id,
                    answers.profession,
                    books_interest,
                    answers.age_range,
                    answers.city,
                    now_timestamp(),
                ],
                questionnaire_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_questionnaire(&self, user_id: &str) -> Result<Option<QuestionnaireRow>> {
        self.with_conn(|conn| query_questionnaire(conn, user_id))
    }
}

fn query_questionnaire(conn: &Connection, user_id: &str) -> Result<Option<QuestionnaireRow>> {
    let sql = format!(
        "SELECT {} FROM questionnaires WHERE user_id = ?1",
        QUESTIONNAIRE_COLUMNS
    );
    conn.query_row(&sql, [user_id], questionnaire_from_row).optional()
}

fn questionnaire_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuestionnaireRow> {
    Ok(QuestionnaireRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        profession: row.get(2)?,
        books_interest: json_column(row, 3)?,
        age_range: row.get(4)?,
        city: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
