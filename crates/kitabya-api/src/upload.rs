use std::collections::HashMap;

use axum::extract::Multipart;
use axum::extract::multipart::{MultipartError, MultipartRejection};

use crate::blob::Upload;
use crate::error::ApiError;

/// 10 MiB per uploaded file
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// A parsed multipart body: text fields by name plus the files sent under
/// one designated field.
#[derive(Debug, Default)]
pub struct Form {
    pub(crate) fields: HashMap<String, String>,
    pub files: Vec<Upload>,
}

impl Form {
    /// Trimmed value of a text field; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Validation(err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Drain a multipart body. Parts named `file_field` become uploads (at most
/// `max_files`, each at most [`MAX_FILE_SIZE`]); every other part is text.
pub async fn read_form(
    mut multipart: Multipart,
    file_field: &str,
    max_files: usize,
) -> Result<Form, ApiError> {
    let mut form = Form::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == file_field || name == format!("{}[]", file_field) {
            if form.files.len() == max_files {
                return Err(ApiError::validation(format!(
                    "At most {} file(s) may be uploaded",
                    max_files
                )));
            }

            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                return Err(ApiError::validation("Uploaded file is empty"));
            }
            if bytes.len() > MAX_FILE_SIZE {
                return Err(ApiError::validation("Uploaded file exceeds 10 MiB"));
            }

            form.files.push(Upload {
                file_name,
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
