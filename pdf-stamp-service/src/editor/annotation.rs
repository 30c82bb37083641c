//! Annotation descriptors and their JSON wire form.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::AnnotationError;

/// Default font size for text annotations
pub const DEFAULT_FONT_SIZE: f32 = 12.0;

/// Default image size when the descriptor gives none
pub const DEFAULT_IMAGE_WIDTH: f32 = 100.0;
pub const DEFAULT_IMAGE_HEIGHT: f32 = 50.0;

/// An RGB color with channels in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const YELLOW: Rgb = Rgb::new(1.0, 1.0, 0.0);

    pub fn is_valid(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

/// Where an image annotation gets its bytes from
#[derive(Clone, PartialEq)]
pub enum ImageSource {
    Inline(Bytes),
    Url(String),
}

impl ImageSource {
    /// Identity used to embed each distinct image once per document.
    pub fn key(&self) -> ImageKey {
        match self {
            ImageSource::Inline(bytes) => ImageKey::Content(compute_content_hash(bytes)),
            ImageSource::Url(url) => ImageKey::Url(url.clone()),
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            ImageSource::Url(url) => write!(f, "Url({url})"),
        }
    }
}

/// Identity of an image source within one request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    Url(String),
    /// SHA-256 hex digest of inline bytes
    Content(String),
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKey::Url(url) => f.write_str(url),
            ImageKey::Content(hash) => write!(f, "sha256:{}", &hash[..hash.len().min(12)]),
        }
    }
}

/// Compute SHA-256 hash of a byte slice, returning a hex string.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Requested size of an image stamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageSize {
    Explicit { width: f32, height: f32 },
    /// Intrinsic pixel size multiplied by a factor
    Scaled(f32),
}

/// What to draw
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Text {
        text: String,
        font_size: f32,
        color: Rgb,
    },
    Rectangle {
        width: f32,
        height: f32,
        color: Rgb,
        opacity: f32,
    },
    Image {
        source: ImageSource,
        size: ImageSize,
    },
}

/// One drawing instruction on one page
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Position in the caller's list, before shapeless descriptors are dropped
    pub source_index: usize,
    pub page_index: u32,
    pub x: f32,
    pub y: f32,
    pub kind: AnnotationKind,
}

impl Annotation {
    #[cfg(test)]
    pub fn text(page_index: u32, x: f32, y: f32, text: impl Into<String>) -> Self {
        Self {
            source_index: 0,
            page_index,
            x,
            y,
            kind: AnnotationKind::Text {
                text: text.into(),
                font_size: DEFAULT_FONT_SIZE,
                color: Rgb::BLUE,
            },
        }
    }

    pub fn image_source(&self) -> Option<&ImageSource> {
        match &self.kind {
            AnnotationKind::Image { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            AnnotationKind::Text { .. } => "text",
            AnnotationKind::Rectangle { .. } => "rectangle",
            AnnotationKind::Image { .. } => "image",
        }
    }
}

// ==================== Wire format ====================

/// An annotation as it arrives in a JSON request.
///
/// Every field is optional here; `into_annotation` decides which variant
/// the descriptor describes and rejects ambiguous shapes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAnnotation {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(alias = "pageIndex")]
    pub pages: Option<serde_json::Value>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub text: Option<String>,
    #[serde(alias = "fontSize")]
    pub size: Option<f32>,
    pub color: Option<[f32; 3]>,
    pub opacity: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub scale: Option<f32>,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
}

impl WireAnnotation {
    /// Convert to an [`Annotation`]. `Ok(None)` means the descriptor has no
    /// recognizable shape (no text and no known type) and is skipped.
    pub fn into_annotation(self, index: usize) -> Result<Option<Annotation>, AnnotationError> {
        let invalid = |message: String| AnnotationError::Invalid { index, message };

        let kind = match (self.kind.as_deref(), self.text.is_some()) {
            (None, false) => return Ok(None),
            (None, true) | (Some("text"), _) => "text",
            (Some(k @ ("rectangle" | "image")), true) => {
                return Err(invalid(format!(
                    "descriptor has both text and type \"{k}\""
                )));
            }
            (Some("rectangle"), false) => "rectangle",
            (Some("image"), false) => "image",
            (Some(other), true) => {
                return Err(invalid(format!(
                    "descriptor has text and unknown type \"{other}\""
                )));
            }
            (Some(_), false) => return Ok(None),
        };

        let page_index = parse_page_index(self.pages.as_ref()).map_err(invalid)?;
        let x = self.x.ok_or_else(|| invalid("missing x".to_string()))?;
        let y = self.y.ok_or_else(|| invalid("missing y".to_string()))?;
        let color = self.color.map(|[r, g, b]| Rgb::new(r, g, b));

        let kind = match kind {
            "text" => AnnotationKind::Text {
                text: self
                    .text
                    .ok_or_else(|| invalid("text annotation is missing text".to_string()))?,
                font_size: self.size.unwrap_or(DEFAULT_FONT_SIZE),
                color: color.unwrap_or(Rgb::BLUE),
            },
            "rectangle" => AnnotationKind::Rectangle {
                width: self
                    .width
                    .ok_or_else(|| invalid("rectangle is missing width".to_string()))?,
                height: self
                    .height
                    .ok_or_else(|| invalid("rectangle is missing height".to_string()))?,
                color: color.unwrap_or(Rgb::YELLOW),
                opacity: self.opacity.unwrap_or(1.0),
            },
            _ => {
                let source = match (self.image_url, self.image_base64) {
                    (Some(_), Some(_)) => {
                        return Err(invalid(
                            "image has both imageUrl and imageBase64".to_string(),
                        ));
                    }
                    (Some(url), None) => ImageSource::Url(url),
                    (None, Some(data)) => ImageSource::Inline(
                        STANDARD
                            .decode(data.trim())
                            .map(Bytes::from)
                            .map_err(|e| invalid(format!("imageBase64 is not valid base64: {e}")))?,
                    ),
                    (None, None) => {
                        return Err(invalid(
                            "image is missing imageUrl or imageBase64".to_string(),
                        ));
                    }
                };
                let size = match (self.scale, self.width, self.height) {
                    (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                        return Err(invalid(
                            "image gives both scale and width/height".to_string(),
                        ));
                    }
                    (Some(factor), None, None) => ImageSize::Scaled(factor),
                    (None, width, height) => ImageSize::Explicit {
                        width: width.unwrap_or(DEFAULT_IMAGE_WIDTH),
                        height: height.unwrap_or(DEFAULT_IMAGE_HEIGHT),
                    },
                };
                AnnotationKind::Image { source, size }
            }
        };

        Ok(Some(Annotation {
            source_index: index,
            page_index,
            x,
            y,
            kind,
        }))
    }
}

/// Accept a non-negative integer, or a string made only of ASCII digits.
fn parse_page_index(value: Option<&serde_json::Value>) -> Result<u32, String> {
    let value = value.ok_or_else(|| "missing pages".to_string())?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s)
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) =>
        {
            s.parse::<u64>().ok()
        }
        _ => None,
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| format!("pages must be a non-negative integer, got {value}"))
}

/// Convert a wire list, dropping descriptors with no recognizable shape.
pub fn from_wire(
    descriptors: Vec<WireAnnotation>,
) -> Result<Vec<Annotation>, AnnotationError> {
    let mut annotations = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.into_iter().enumerate() {
        let kind = descriptor.kind.clone();
        match descriptor.into_annotation(index)? {
            Some(annotation) => annotations.push(annotation),
            None => tracing::warn!(
                index,
                kind = kind.as_deref().unwrap_or(""),
                "Skipping annotation with no text or known type"
            ),
        }
    }
    Ok(annotations)
}
