//! Submission endpoint: a multipart survey form with an optional photo

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{FeedbackQueries, FeedbackRecord, FeedbackStatus, FeedbackType, NewFeedback};
use crate::error::{Error, ErrorDetails};
use crate::storage::PhotoStorageInfo;
use crate::utils::gateway::AppState;

pub const ALLOWED_PHOTO_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitFeedbackResponse {
    pub success: bool,
    pub data: FeedbackRecord,
}

/// The form exactly as submitted, before validation
#[derive(Debug, Default)]
pub struct FeedbackForm {
    pub nama: Option<String>,
    pub email: Option<String>,
    pub jenis_feedback: Option<String>,
    pub subjek: Option<String>,
    pub pesan_feedback: Option<String>,
    pub rating_kepuasan: Option<String>,
    pub foto: Option<PhotoUpload>,
}

#[derive(Debug)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl PhotoUpload {
    /// Extension for the stored object, from the file name when it has a usable one
    fn extension(&self) -> &'static str {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match from_name.as_deref() {
            Some("png") => "png",
            Some("jpeg") => "jpeg",
            Some("jpg") => "jpg",
            _ if self.essence().as_deref() == Some("image/png") => "png",
            _ => "jpg",
        }
    }

    fn essence(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .map(|mime| mime.essence_str().to_ascii_lowercase())
    }

    pub fn object_key(&self) -> String {
        format!("{}.{}", Uuid::now_v7(), self.extension())
    }
}

/// HTTP handler for `POST /feedback`
#[instrument(name = "submit_feedback_handler", skip_all)]
pub async fn submit_feedback_handler(
    State(app_state): AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<SubmitFeedbackResponse>), Error> {
    counter!("survei_requests_total", "endpoint" => "submit_feedback").increment(1);
    let multipart = multipart.map_err(|e| {
        Error::new(ErrorDetails::Multipart {
            message: e.body_text(),
        })
    })?;
    let max_photo_size = app_state.config.gateway.max_photo_size_bytes;
    let form = read_feedback_form(multipart, max_photo_size).await?;
    let response = submit_feedback(
        app_state.feedback_store.as_ref(),
        &app_state.photo_storage,
        form,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

fn multipart_error(e: &MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::new(ErrorDetails::PayloadTooLarge {
            message: e.body_text(),
        })
    } else {
        Error::new(ErrorDetails::Multipart {
            message: e.body_text(),
        })
    }
}

/// Read every part of the form. The photo is read chunk by chunk and rejected as soon as it
/// exceeds `max_photo_size`.
pub async fn read_feedback_form(
    mut multipart: Multipart,
    max_photo_size: u64,
) -> Result<FeedbackForm, Error> {
    let mut form = FeedbackForm::default();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "nama" => &mut form.nama,
            "email" => &mut form.email,
            "jenis_feedback" => &mut form.jenis_feedback,
            "subjek" => &mut form.subjek,
            "pesan_feedback" => &mut form.pesan_feedback,
            "rating_kepuasan" => &mut form.rating_kepuasan,
            "foto" => {
                if form.foto.is_some() {
                    return Err(duplicate_field(&name));
                }
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(&e))? {
                    data.extend_from_slice(&chunk);
                    if data.len() as u64 > max_photo_size {
                        return Err(Error::new(ErrorDetails::PhotoTooLarge {
                            size: data.len() as u64,
                            max_size: max_photo_size,
                        }));
                    }
                }
                // An empty file part (what browsers send when no file was picked) means "no photo"
                if !data.is_empty() {
                    form.foto = Some(PhotoUpload {
                        file_name,
                        content_type,
                        data: data.freeze(),
                    });
                }
                continue;
            }
            _ => {
                return Err(Error::new(ErrorDetails::UnknownFeedbackField {
                    field: name.clone(),
                }));
            }
        };
        if slot.is_some() {
            return Err(duplicate_field(&name));
        }
        *slot = Some(field.text().await.map_err(|e| multipart_error(&e))?);
    }
    Ok(form)
}

fn duplicate_field(name: &str) -> Error {
    Error::new(ErrorDetails::InvalidFeedbackField {
        field: name.to_string(),
        message: "given more than once".to_string(),
    })
}

fn required_text(field: &str, value: Option<String>) -> Result<String, Error> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::new(ErrorDetails::MissingFeedbackField {
            field: field.to_string(),
        })),
    }
}

/// Check every field and build the row to insert. `photo_url` is left empty; the photo (if
/// any) is returned alongside for upload.
pub fn validate_feedback_form(
    form: FeedbackForm,
) -> Result<(NewFeedback, Option<PhotoUpload>), Error> {
    let nama = required_text("nama", form.nama)?;
    let jenis_feedback = required_text("jenis_feedback", form.jenis_feedback)?;
    let subjek = required_text("subjek", form.subjek)?;
    let pesan_feedback = required_text("pesan_feedback", form.pesan_feedback)?;
    let rating_kepuasan = required_text("rating_kepuasan", form.rating_kepuasan)?;

    let jenis_feedback = jenis_feedback.parse::<FeedbackType>().map_err(|_| {
        Error::new(ErrorDetails::InvalidFeedbackField {
            field: "jenis_feedback".to_string(),
            message: format!("`{jenis_feedback}` is not one of `saran`, `keluhan`, `pujian`"),
        })
    })?;

    let rating_kepuasan = rating_kepuasan
        .parse::<i64>()
        .ok()
        .filter(|rating| (MIN_RATING..=MAX_RATING).contains(rating))
        .ok_or_else(|| {
            Error::new(ErrorDetails::InvalidFeedbackField {
                field: "rating_kepuasan".to_string(),
                message: format!(
                    "must be a whole number from {MIN_RATING} to {MAX_RATING}, got `{rating_kepuasan}`"
                ),
            })
        })?;

    let email = form
        .email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty());

    if let Some(photo) = &form.foto {
        let essence = photo.essence();
        if !essence
            .as_deref()
            .is_some_and(|essence| ALLOWED_PHOTO_TYPES.contains(&essence))
        {
            return Err(Error::new(ErrorDetails::UnsupportedPhotoType {
                content_type: photo
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "<none>".to_string()),
            }));
        }
    }

    Ok((
        NewFeedback {
            nama,
            email,
            jenis_feedback,
            subjek,
            pesan_feedback,
            rating_kepuasan,
            photo_url: None,
            status: FeedbackStatus::Menunggu,
        },
        form.foto,
    ))
}

/// Core business logic for the submission endpoint
pub async fn submit_feedback(
    database: &(dyn FeedbackQueries + Sync),
    photo_storage: &PhotoStorageInfo,
    form: FeedbackForm,
) -> Result<SubmitFeedbackResponse, Error> {
    let (mut feedback, photo) = validate_feedback_form(form)?;

    if let Some(photo) = photo {
        if !photo_storage.is_enabled() {
            return Err(Error::new(ErrorDetails::PhotoStorageDisabled));
        }
        let key = photo.object_key();
        let photo_url = photo_storage.upload_photo(&key, photo.data).await?;
        tracing::debug!("Stored feedback photo at {photo_url}");
        feedback.photo_url = Some(photo_url);
    }

    let data = database.insert_feedback(&feedback).await?;
    counter!(
        "survei_feedback_submitted_total",
        "jenis_feedback" => feedback.jenis_feedback.to_string(),
    )
    .increment(1);
    Ok(SubmitFeedbackResponse {
        success: true,
        data,
    })
}
