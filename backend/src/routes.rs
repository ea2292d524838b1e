use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use shared::{ErrorResponse, MessageResponse, PredictResponse};

use crate::auth::routes::{
    LOGIN_FIELDS_MISSING, SIGNUP_FIELDS_MISSING, list_users, login, signup,
};
use crate::error::ApiError;
use crate::inference::InferenceService;
use crate::inference::ranking::PredictionResult;

/// Largest accepted `/predict` upload, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

fn json_config(missing_fields: &'static str) -> web::JsonConfig {
    web::JsonConfig::default().error_handler(move |err, _req| {
        log::warn!("Rejected JSON body: {}", err);
        ApiError::Validation(missing_fields.to_string()).into()
    })
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, max_upload_bytes: usize) {
    cfg.app_data(web::Data::new(UploadLimit(max_upload_bytes)))
        .service(web::resource("/").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(
            web::resource("/signup")
                .app_data(json_config(SIGNUP_FIELDS_MISSING))
                .route(web::post().to(signup)),
        )
        .service(
            web::resource("/login")
                .app_data(json_config(LOGIN_FIELDS_MISSING))
                .route(web::post().to(login)),
        )
        .service(web::resource("/users").route(web::get().to(list_users)))
        .default_service(web::to(not_found));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse {
        message: "Plant Disease Detection API is running!".to_string(),
    })
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: "Not found".to_string(),
    })
}

/// Collects the bytes of the first non-empty `file` field, enforcing `limit`.
async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    let multipart_err = |e: actix_multipart::MultipartError| {
        log::warn!("Unreadable multipart body: {}", e);
        ApiError::MissingFile
    };

    while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
        if field.name() != Some("file") {
            continue;
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
            if image_data.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge { limit });
            }
            image_data.extend_from_slice(&chunk);
        }
        if !image_data.is_empty() {
            return Ok(image_data);
        }
    }
    Err(ApiError::MissingFile)
}

fn to_response(result: PredictionResult) -> PredictResponse {
    PredictResponse {
        predicted_class: result.predicted_label,
        confidence: result.confidence,
        all_confidences: result
            .ranked
            .into_iter()
            .map(|class| (class.label, class.confidence))
            .collect(),
    }
}

async fn predict(
    inference: web::Data<InferenceService>,
    limit: web::Data<UploadLimit>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    inference.ensure_ready()?;
    let image_data = read_upload(&mut payload, limit.0).await?;
    log::info!("Prediction request: {} bytes", image_data.len());

    let service = inference.clone();
    let result = web::block(move || service.predict(&image_data))
        .await
        .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))??;

    log::info!(
        "Predicted '{}' (index {}) with {:.2}% confidence, softmax applied: {}",
        result.predicted_label,
        result.predicted_index,
        result.confidence,
        result.normalized
    );
    for class in &result.ranked {
        log::debug!("  {}: {:.2}%", class.label, class.confidence);
    }

    Ok(HttpResponse::Ok().json(to_response(result)))
}
