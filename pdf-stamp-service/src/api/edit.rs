//! PDF edit endpoints.
//!
//! Handlers for multipart uploads (fixed templates) and JSON annotation
//! requests.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::header_key;
use crate::editor::annotation::from_wire;
use crate::editor::{EditOutput, EditPlan, FixedTemplate, OutputEncoding, WireAnnotation};
use crate::error::{ServiceError, ServiceResult};

use super::AppState;

/// JSON edit request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateRequest {
    pub api_key: Option<String>,
    #[serde(alias = "fileBase64")]
    pub pdf_base64: String,
    pub annotations: Vec<WireAnnotation>,
    #[serde(default)]
    pub output: ResponseFormat,
}

/// Requested response encoding for JSON requests
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Base64,
    Binary,
}

impl From<ResponseFormat> for OutputEncoding {
    fn from(format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::Base64 => OutputEncoding::Base64,
            ResponseFormat::Binary => OutputEncoding::Binary,
        }
    }
}

/// JSON edit response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateResponse {
    pub status: &'static str,
    pub message: String,
    pub file_base64: String,
}

impl IntoResponse for EditOutput {
    fn into_response(self) -> Response {
        match self {
            EditOutput::Binary(bytes) => (
                [
                    (header::CONTENT_TYPE, "application/pdf"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"edited.pdf\"",
                    ),
                ],
                bytes,
            )
                .into_response(),
            EditOutput::Base64(file_base64) => Json(AnnotateResponse {
                status: "success",
                message: "PDF edited successfully".to_string(),
                file_base64,
            })
            .into_response(),
        }
    }
}

/// Edit an uploaded PDF with the "Page N edited!" template
pub async fn edit_pdf_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ServiceResult<EditOutput> {
    run_template(&state, multipart, FixedTemplate::PageEdited).await
}

/// Stamp an uploaded PDF with text, a highlight and the uploaded image
pub async fn stamp_pdf_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ServiceResult<EditOutput> {
    run_template(&state, multipart, FixedTemplate::Stamp).await
}

async fn run_template(
    state: &AppState,
    mut multipart: Multipart,
    template: FixedTemplate,
) -> ServiceResult<EditOutput> {
    let mut pdf: Option<Bytes> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::invalid_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "pdf" | "image" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::invalid_request(e.to_string()))?;
                if name == "pdf" {
                    pdf = Some(data);
                } else if image.is_none() {
                    image = Some(data);
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let pdf = pdf.ok_or_else(|| ServiceError::invalid_request("No PDF uploaded."))?;
    tracing::info!(
        ?template,
        pdf_bytes = pdf.len(),
        has_image = image.is_some(),
        "Template edit requested"
    );

    let output = state
        .session
        .run(pdf, EditPlan::Template { template, image })
        .await?;
    Ok(EditOutput::encode(output, OutputEncoding::Binary))
}

/// Apply an explicit annotation list to a base64-encoded PDF
pub async fn annotate_pdf_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<EditOutput> {
    let header = header_key(&headers);
    if header.is_some() {
        state.guard.verify(header)?;
    }

    let request: AnnotateRequest = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::invalid_request(format!("Malformed JSON body: {}", e)))?;

    if header.is_none() {
        state.guard.verify(request.api_key.as_deref())?;
    }

    let pdf = STANDARD
        .decode(request.pdf_base64.trim())
        .map_err(|e| ServiceError::invalid_request(format!("pdfBase64 is not valid base64: {}", e)))?;
    let annotations = from_wire(request.annotations)?;

    tracing::info!(
        annotations = annotations.len(),
        pdf_bytes = pdf.len(),
        "Annotation edit requested"
    );

    let output = state
        .session
        .run(Bytes::from(pdf), EditPlan::Annotations(annotations))
        .await?;
    Ok(EditOutput::encode(output, request.output.into()))
}
