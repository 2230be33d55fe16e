// src/handlers.rs
use crate::{
    AppState,
    errors::DriveDiagramError,
    models::*,
    services::diagram_store::{LIBRARY_PAGE_LIMIT, SaveOutcome},
    services::image_processor::{ImageFile, MAX_FILE_SIZE_BYTES, IntakeError, guess_mime_type, strip_data_url_prefix},
    services::session_verifier::bearer_token,
};
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, http::Method, http::header, web};
use base64::{Engine as _, engine::general_purpose};
use futures_util::TryStreamExt;
use log::{error, info};

pub fn configure(cfg: &mut web::ServiceConfig) {
    for path in ["/api/generate-diagram", "/api/generate"] {
        cfg.service(
            web::resource(path)
                .route(web::post().to(generate_diagram))
                .route(web::method(Method::OPTIONS).to(preflight))
                .default_service(web::route().to(method_not_allowed)),
        );
    }

    cfg.service(
        web::resource("/api/credits")
            .route(web::get().to(get_credits))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::route().to(method_not_allowed)),
    );

    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/generate/upload")
                    .route(web::post().to(generate_from_upload))
                    .route(web::method(Method::OPTIONS).to(preflight))
                    .default_service(web::route().to(method_not_allowed)),
            )
            .service(
                web::resource("/diagrams")
                    .route(web::get().to(list_diagrams))
                    .route(web::post().to(save_diagram))
                    .route(web::method(Method::OPTIONS).to(preflight))
                    .default_service(web::route().to(method_not_allowed)),
            )
            .service(
                web::resource("/diagrams/{diagram_id}")
                    .route(web::delete().to(delete_diagram))
                    .route(web::method(Method::OPTIONS).to(preflight))
                    .default_service(web::route().to(method_not_allowed)),
            ),
    )
    .route("/health", web::get().to(health_check));
}

fn request_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

async fn require_user(req: &HttpRequest, data: &AppState) -> Result<AuthUser, DriveDiagramError> {
    let token = request_token(req)
        .ok_or_else(|| DriveDiagramError::Unauthorized("Unauthorized".to_string()))?;
    data.session_verifier.verify(token).await
}

/// A bearer token is optional on generation, but must be valid when sent.
async fn optional_user(
    req: &HttpRequest,
    data: &AppState,
) -> Result<Option<AuthUser>, DriveDiagramError> {
    match request_token(req) {
        Some(token) => data.session_verifier.verify(token).await.map(Some),
        None => Ok(None),
    }
}

fn caller(user: &Option<AuthUser>) -> &str {
    user.as_ref().map(|u| u.id.as_str()).unwrap_or("guest")
}

pub async fn generate_diagram(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = optional_user(&req, &data).await?;

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| DriveDiagramError::InvalidJson)?;

    let image_data = payload
        .get("imageData")
        .and_then(|v| v.as_str())
        .map(|v| strip_data_url_prefix(v.trim()))
        .filter(|v| !v.is_empty());
    let mime_type = payload
        .get("mimeType")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let (Some(image_data), Some(mime_type)) = (image_data, mime_type) else {
        return Err(DriveDiagramError::Validation(
            "Missing imageData or mimeType".to_string(),
        ));
    };

    info!(
        "Generating diagram for {} ({}, {} base64 chars)",
        caller(&user),
        mime_type,
        image_data.len()
    );

    let diagram = data.model.generate_diagram(image_data, mime_type).await.map_err(|e| {
        error!("Diagram generation failed: {}", e);
        e
    })?;

    Ok(HttpResponse::Ok().json(diagram))
}

pub async fn generate_from_upload(
    req: HttpRequest,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = optional_user(&req, &data).await?;
    let mut upload = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| DriveDiagramError::Validation(format!("Malformed upload: {}", e)))?
    {
        let Some(filename) = field
            .content_disposition()
            .get_filename()
            .map(str::to_string)
        else {
            continue;
        };

        let declared_type = field.content_type().map(|ct| ct.essence_str().to_string());

        // Collect image data
        let mut image_data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| DriveDiagramError::Validation(format!("Malformed upload: {}", e)))?
        {
            image_data.extend_from_slice(&chunk);
            if image_data.len() > MAX_FILE_SIZE_BYTES {
                return Err(IntakeError::TooLarge {
                    size: image_data.len(),
                }
                .into());
            }
        }

        let mime_type = declared_type
            .filter(|ct| ct != "application/octet-stream")
            .unwrap_or_else(|| guess_mime_type(&image_data).to_string());

        upload = Some(ImageFile {
            name: filename,
            mime_type,
            bytes: image_data.into(),
        });
        break;
    }

    let file = upload
        .ok_or_else(|| DriveDiagramError::Validation("No image file provided".to_string()))?;

    // Validate image
    let loaded = data.image_processor.load(&file)?;

    info!(
        "Generating diagram from upload {} for {} ({}x{})",
        file.name,
        caller(&user),
        loaded.image.width_px,
        loaded.image.height_px
    );

    let encoded = general_purpose::STANDARD.encode(&file.bytes);
    let diagram = data
        .model
        .generate_diagram(&encoded, &file.mime_type)
        .await
        .map_err(|e| {
            error!("Diagram generation failed: {}", e);
            e
        })?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "imageUrl": diagram.image_url,
        "explanation": diagram.explanation,
        "widthPx": loaded.image.width_px,
        "heightPx": loaded.image.height_px,
        "oversizedForProcessing": loaded.oversized_for_processing,
    })))
}

pub async fn get_credits(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = require_user(&req, &data).await?;

    let credits_remaining = data
        .credit_store
        .credits_remaining(&user.id)
        .await
        .map_err(|e| {
            error!("Failed to fetch credits for {}: {}", user.id, e);
            e
        })?;

    Ok(HttpResponse::Ok().json(CreditBalance {
        credits_remaining,
        user_id: user.id,
    }))
}

pub async fn list_diagrams(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = require_user(&req, &data).await?;

    let diagrams = data
        .diagram_store
        .list(&user.id, LIBRARY_PAGE_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to load diagrams for {}: {}", user.id, e);
            e
        })?;

    Ok(HttpResponse::Ok().json(DiagramListing {
        count: diagrams.len(),
        diagrams,
    }))
}

pub async fn save_diagram(
    req: HttpRequest,
    body: web::Json<NewDiagram>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = require_user(&req, &data).await?;

    let outcome = data
        .diagram_store
        .save(&user.id, body.into_inner())
        .await
        .map_err(|e| {
            error!("Failed to save diagram for {}: {}", user.id, e);
            e
        })?;

    Ok(match outcome {
        SaveOutcome::Created(diagram) => {
            info!("Saved diagram {} for {}", diagram.id, user.id);
            HttpResponse::Created().json(diagram)
        }
        SaveOutcome::Existing(diagram) => HttpResponse::Ok().json(diagram),
    })
}

pub async fn delete_diagram(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, DriveDiagramError> {
    let user = require_user(&req, &data).await?;
    let diagram_id = path.into_inner();

    data.diagram_store.delete(&user.id, &diagram_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

pub async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

pub async fn method_not_allowed() -> Result<HttpResponse, DriveDiagramError> {
    Err(DriveDiagramError::MethodNotAllowed)
}

/// App-wide fallback: answers stray preflights, 404s the rest.
pub async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "Not found",
            "code": "not_found"
        }))
    }
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "drivediagram",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().body("API is running")
}

pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &HttpRequest,
) -> actix_web::Error {
    error!("Rejected JSON body: {}", err);
    DriveDiagramError::InvalidJson.into()
}
