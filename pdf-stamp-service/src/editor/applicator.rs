//! Validates annotation lists and draws them onto a document.
//!
//! Annotations are drawn in list order, so a later annotation at the same
//! coordinates paints over an earlier one. Validation covers the whole list
//! before the first draw call; a request either applies every annotation or
//! none.

use crate::error::{AnnotationError, ServiceError, ServiceResult};

use super::annotation::{Annotation, AnnotationKind, ImageSize};
use super::codec::{FilledRect, ImagePlacement, PdfDocument, TextRun};
use super::session::{DEFAULT_FONT, SessionResources};

/// Check every annotation against the document without drawing anything.
pub fn validate<D: PdfDocument>(
    doc: &D,
    annotations: &[Annotation],
) -> Result<(), AnnotationError> {
    let page_count = doc.page_count();

    for annotation in annotations {
        let index = annotation.source_index;
        let invalid = |message: String| AnnotationError::Invalid { index, message };

        if annotation.page_index as usize >= page_count {
            return Err(AnnotationError::PageIndex {
                index,
                page_index: annotation.page_index,
                page_count,
            });
        }
        require_finite("x", annotation.x).map_err(invalid)?;
        require_finite("y", annotation.y).map_err(invalid)?;

        match &annotation.kind {
            AnnotationKind::Text {
                text,
                font_size,
                color,
            } => {
                require_positive("font size", *font_size).map_err(invalid)?;
                if !color.is_valid() {
                    return Err(invalid("color channels must be within 0..=1".to_string()));
                }
                DEFAULT_FONT.encode(text).map_err(|ch| {
                    invalid(format!(
                        "character {ch:?} cannot be drawn with {}",
                        DEFAULT_FONT.base_font()
                    ))
                })?;
            }
            AnnotationKind::Rectangle {
                width,
                height,
                color,
                opacity,
            } => {
                require_positive("width", *width).map_err(invalid)?;
                require_positive("height", *height).map_err(invalid)?;
                if !color.is_valid() {
                    return Err(invalid("color channels must be within 0..=1".to_string()));
                }
                if !(opacity.is_finite() && (0.0..=1.0).contains(opacity)) {
                    return Err(invalid(format!("opacity {opacity} is outside 0..=1")));
                }
            }
            AnnotationKind::Image { size, .. } => match *size {
                ImageSize::Explicit { width, height } => {
                    require_positive("width", width).map_err(invalid)?;
                    require_positive("height", height).map_err(invalid)?;
                }
                ImageSize::Scaled(factor) => {
                    require_positive("scale", factor).map_err(invalid)?;
                }
            },
        }
    }

    Ok(())
}

/// Validate, then draw every annotation in order.
pub fn apply<D: PdfDocument>(
    doc: &mut D,
    resources: &SessionResources,
    annotations: &[Annotation],
) -> ServiceResult<()> {
    validate(doc, annotations)?;

    for annotation in annotations {
        let index = annotation.source_index;
        let page = annotation.page_index as usize;
        let drawn = match &annotation.kind {
            AnnotationKind::Text {
                text,
                font_size,
                color,
            } => {
                let font = resources.font.ok_or_else(|| ServiceError::Internal {
                    message: "text annotation without an embedded font".to_string(),
                })?;
                doc.draw_text(
                    page,
                    &TextRun {
                        text: text.clone(),
                        x: annotation.x,
                        y: annotation.y,
                        font,
                        font_size: *font_size,
                        color: *color,
                    },
                )
            }
            AnnotationKind::Rectangle {
                width,
                height,
                color,
                opacity,
            } => doc.draw_rectangle(
                page,
                &FilledRect {
                    x: annotation.x,
                    y: annotation.y,
                    width: *width,
                    height: *height,
                    color: *color,
                    opacity: *opacity,
                },
            ),
            AnnotationKind::Image { source, size } => {
                let key = source.key();
                let image = *resources.images.get(&key).ok_or_else(|| {
                    AnnotationError::Invalid {
                        index,
                        message: format!("image {key} was not embedded"),
                    }
                })?;
                let (width, height) = match *size {
                    ImageSize::Explicit { width, height } => (width, height),
                    ImageSize::Scaled(factor) => (
                        image.pixel_width as f32 * factor,
                        image.pixel_height as f32 * factor,
                    ),
                };
                doc.draw_image(
                    page,
                    image,
                    &ImagePlacement {
                        x: annotation.x,
                        y: annotation.y,
                        width,
                        height,
                    },
                )
            }
        };

        drawn.map_err(|source| ServiceError::Draw { index, source })?;
        tracing::trace!(index, page, kind = annotation.kind_name(), "Applied annotation");
    }

    Ok(())
}

fn require_finite(field: &str, value: f32) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{field} must be a finite number"))
    }
}

fn require_positive(field: &str, value: f32) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be greater than zero, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::annotation::{ImageSource, Rgb};
    use crate::editor::codec::FontHandle;
    use crate::editor::testing::{DrawCall, RecordingDocument};
    use bytes::Bytes;
    use std::collections::HashMap;

    fn resources(doc: &mut RecordingDocument) -> SessionResources {
        SessionResources {
            font: Some(doc.embed_standard_font(DEFAULT_FONT).unwrap()),
            images: HashMap::new(),
        }
    }

    #[test]
    fn test_single_text_annotation_uses_defaults() {
        let mut doc = RecordingDocument::with_pages(1);
        let resources = resources(&mut doc);

        apply(
            &mut doc,
            &resources,
            &[Annotation::text(0, 50.0, 700.0, "Hello")],
        )
        .unwrap();

        assert_eq!(
            doc.calls,
            vec![DrawCall::Text {
                page: 0,
                run: TextRun {
                    text: "Hello".to_string(),
                    x: 50.0,
                    y: 700.0,
                    font: FontHandle {
                        index: 0,
                        font: DEFAULT_FONT
                    },
                    font_size: 12.0,
                    color: Rgb::BLUE,
                },
            }]
        );
    }

    #[test]
    fn test_draw_order_follows_input_order() {
        let mut doc = RecordingDocument::with_pages(1);
        let resources = resources(&mut doc);

        apply(
            &mut doc,
            &resources,
            &[
                Annotation::text(0, 10.0, 10.0, "first"),
                Annotation::text(0, 10.0, 10.0, "second"),
            ],
        )
        .unwrap();

        let texts: Vec<_> = doc
            .calls
            .iter()
            .map(|call| match call {
                DrawCall::Text { run, .. } => run.text.as_str(),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_out_of_range_page_draws_nothing() {
        let mut doc = RecordingDocument::with_pages(2);
        let resources = resources(&mut doc);

        let err = apply(
            &mut doc,
            &resources,
            &[
                Annotation::text(0, 10.0, 10.0, "fine"),
                Annotation {
                    source_index: 1,
                    ..Annotation::text(2, 10.0, 10.0, "too far")
                },
            ],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Annotation(AnnotationError::PageIndex {
                index: 1,
                page_index: 2,
                page_count: 2
            })
        ));
        assert!(doc.calls.is_empty());
    }

    #[test]
    fn test_geometry_validation() {
        let doc = RecordingDocument::with_pages(1);
        let rect = |width: f32, opacity: f32| Annotation {
            source_index: 0,
            page_index: 0,
            x: 0.0,
            y: 0.0,
            kind: AnnotationKind::Rectangle {
                width,
                height: 10.0,
                color: Rgb::YELLOW,
                opacity,
            },
        };

        assert!(validate(&doc, &[rect(10.0, 0.5)]).is_ok());
        assert!(validate(&doc, &[rect(0.0, 0.5)]).is_err());
        assert!(validate(&doc, &[rect(10.0, 1.5)]).is_err());
        assert!(validate(&doc, &[rect(f32::NAN, 0.5)]).is_err());

        let mut bad_text = Annotation::text(0, 0.0, 0.0, "ok");
        bad_text.x = f32::INFINITY;
        assert!(validate(&doc, &[bad_text]).is_err());

        let unencodable = Annotation::text(0, 0.0, 0.0, "こんにちは");
        assert!(matches!(
            validate(&doc, &[unencodable]),
            Err(AnnotationError::Invalid { index: 0, .. })
        ));
    }

    #[test]
    fn test_scaled_image_uses_intrinsic_size() {
        let mut doc = RecordingDocument::with_pages(1);
        let mut resources = resources(&mut doc);
        let source = ImageSource::Inline(Bytes::from_static(b"img"));
        let handle = doc.embed_raster_image(b"img").unwrap();
        resources.images.insert(source.key(), handle);

        apply(
            &mut doc,
            &resources,
            &[Annotation {
                source_index: 0,
                page_index: 0,
                x: 5.0,
                y: 6.0,
                kind: AnnotationKind::Image {
                    source,
                    size: ImageSize::Scaled(0.5),
                },
            }],
        )
        .unwrap();

        match &doc.calls[..] {
            [DrawCall::Image { placement, .. }] => {
                assert_eq!(placement.width, handle.pixel_width as f32 * 0.5);
                assert_eq!(placement.height, handle.pixel_height as f32 * 0.5);
            }
            other => panic!("unexpected calls {other:?}"),
        }
    }

    #[test]
    fn test_missing_embedded_image_is_an_error() {
        let mut doc = RecordingDocument::with_pages(1);
        let resources = resources(&mut doc);

        let err = apply(
            &mut doc,
            &resources,
            &[Annotation {
                source_index: 0,
                page_index: 0,
                x: 0.0,
                y: 0.0,
                kind: AnnotationKind::Image {
                    source: ImageSource::Url("https://example.com/a.png".to_string()),
                    size: ImageSize::Explicit {
                        width: 10.0,
                        height: 10.0,
                    },
                },
            }],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Annotation(AnnotationError::Invalid { index: 0, .. })
        ));
    }
}
