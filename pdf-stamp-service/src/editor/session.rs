//! One edit request end to end: load, embed shared resources, apply, save.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ServiceError, ServiceResult};

use super::annotation::{Annotation, AnnotationKind, ImageKey, ImageSource};
use super::applicator;
use super::codec::{FontHandle, ImageHandle, PdfCodec, PdfDocument, StandardFont};
use super::resolver::AssetResolver;
use super::template::FixedTemplate;

/// Font used by every text annotation
pub const DEFAULT_FONT: StandardFont = StandardFont::Helvetica;

/// What to do to the document
#[derive(Debug, Clone)]
pub enum EditPlan {
    Annotations(Vec<Annotation>),
    Template {
        template: FixedTemplate,
        image: Option<Bytes>,
    },
}

/// Resources embedded once per document and shared by its annotations
#[derive(Debug, Default)]
pub struct SessionResources {
    /// Present only when at least one text annotation exists
    pub font: Option<FontHandle>,
    pub images: HashMap<ImageKey, ImageHandle>,
}

/// How the edited document is handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Binary,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutput {
    Binary(Vec<u8>),
    Base64(String),
}

impl EditOutput {
    pub fn encode(bytes: Vec<u8>, encoding: OutputEncoding) -> Self {
        match encoding {
            OutputEncoding::Binary => EditOutput::Binary(bytes),
            OutputEncoding::Base64 => EditOutput::Base64(STANDARD.encode(bytes)),
        }
    }
}

/// Runs edit requests. Cheap to share; holds no per-request state.
pub struct EditSession<C: PdfCodec> {
    codec: Arc<C>,
    resolver: AssetResolver,
}

impl<C: PdfCodec> EditSession<C> {
    pub fn new(codec: C, resolver: AssetResolver) -> Self {
        Self {
            codec: Arc::new(codec),
            resolver,
        }
    }

    /// Edit `document` according to `plan` and return the serialized result.
    pub async fn run(&self, document: Bytes, plan: EditPlan) -> ServiceResult<Vec<u8>> {
        let started = Instant::now();
        let input_bytes = document.len();

        let codec = self.codec.clone();
        let mut doc = blocking(move || codec.load(&document).map_err(ServiceError::Load)).await?;

        let annotations = match plan {
            EditPlan::Annotations(annotations) => annotations,
            EditPlan::Template { template, image } => {
                if template.requires_image() && image.is_none() {
                    return Err(ServiceError::invalid_request("An image upload is required."));
                }
                let pages: Vec<_> = (0..doc.page_count())
                    .filter_map(|page| doc.page_size(page))
                    .collect();
                template.expand(&pages, image.as_ref())
            }
        };

        applicator::validate(&doc, &annotations)?;

        let sources = distinct_image_sources(&annotations);
        let images = try_join_all(sources.iter().map(|(key, source)| async move {
            let bytes = self.resolver.resolve(source).await.inspect_err(|e| {
                tracing::warn!(image = %key, error = %e, "Failed to resolve image");
            })?;
            Ok::<_, ServiceError>((key.clone(), bytes))
        }))
        .await?;

        let needs_font = annotations
            .iter()
            .any(|a| matches!(a.kind, AnnotationKind::Text { .. }));
        let annotation_count = annotations.len();

        let output = blocking(move || {
            let mut resources = SessionResources::default();
            if needs_font {
                resources.font = Some(
                    doc.embed_standard_font(DEFAULT_FONT)
                        .map_err(|e| ServiceError::Internal {
                            message: format!("Failed to embed font: {e}"),
                        })?,
                );
            }
            for (key, bytes) in images {
                let handle = doc
                    .embed_raster_image(&bytes)
                    .map_err(|source| ServiceError::Embed {
                        image: key.to_string(),
                        source,
                    })?;
                resources.images.insert(key, handle);
            }

            applicator::apply(&mut doc, &resources, &annotations)?;
            doc.save().map_err(ServiceError::Serialize)
        })
        .await?;

        tracing::info!(
            annotations = annotation_count,
            input_bytes,
            output_bytes = output.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Edited PDF"
        );

        Ok(output)
    }
}

/// Image sources in first-appearance order, one per distinct key.
fn distinct_image_sources(annotations: &[Annotation]) -> Vec<(ImageKey, ImageSource)> {
    let mut seen = std::collections::HashSet::new();
    annotations
        .iter()
        .filter_map(Annotation::image_source)
        .filter_map(|source| {
            let key = source.key();
            seen.insert(key.clone()).then(|| (key, source.clone()))
        })
        .collect()
}

/// Run codec work off the async executor.
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Edit task failed: {e}"),
        })?
}
