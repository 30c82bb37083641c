//! Fixed edit templates used by the multipart endpoints.
//!
//! A template expands into an ordinary annotation list once the page sizes
//! are known, so it goes through the same validation and drawing path as
//! JSON requests.

use bytes::Bytes;

use super::annotation::{Annotation, AnnotationKind, ImageSize, ImageSource, Rgb};
use super::codec::PageSize;

const STAMP_FONT_SIZE: f32 = 18.0;
const STAMP_MARGIN: f32 = 50.0;
const HIGHLIGHT_OPACITY: f32 = 0.3;
const HIGHLIGHT_WIDTH: f32 = 170.0;
const HIGHLIGHT_HEIGHT: f32 = 26.0;
const LEGACY_IMAGE_OFFSET: f32 = 200.0;
const LEGACY_IMAGE_SCALE: f32 = 0.5;
const CORNER_IMAGE_WIDTH: f32 = 100.0;
const CORNER_IMAGE_HEIGHT: f32 = 50.0;
const CORNER_MARGIN: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedTemplate {
    /// "Page N edited!" with a highlight on every page; the optional image
    /// goes on the first page at half its natural size.
    PageEdited,
    /// Same stamp and highlight, plus the image in the bottom-right corner
    /// of every page.
    Stamp,
}

impl FixedTemplate {
    pub fn requires_image(self) -> bool {
        matches!(self, FixedTemplate::Stamp)
    }

    pub fn expand(self, pages: &[PageSize], image: Option<&Bytes>) -> Vec<Annotation> {
        let mut annotations = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            let page_index = index as u32;
            annotations.push(page_label(page_index, page));
            annotations.push(highlight(page_index, page));

            let Some(image) = image else { continue };
            match self {
                FixedTemplate::PageEdited if index == 0 => annotations.push(Annotation {
                    source_index: 0,
                    page_index,
                    x: page.left + STAMP_MARGIN,
                    y: page.top() - LEGACY_IMAGE_OFFSET,
                    kind: AnnotationKind::Image {
                        source: ImageSource::Inline(image.clone()),
                        size: ImageSize::Scaled(LEGACY_IMAGE_SCALE),
                    },
                }),
                FixedTemplate::Stamp => annotations.push(Annotation {
                    source_index: 0,
                    page_index,
                    x: page.right() - CORNER_IMAGE_WIDTH - CORNER_MARGIN,
                    y: page.bottom + CORNER_MARGIN,
                    kind: AnnotationKind::Image {
                        source: ImageSource::Inline(image.clone()),
                        size: ImageSize::Explicit {
                            width: CORNER_IMAGE_WIDTH,
                            height: CORNER_IMAGE_HEIGHT,
                        },
                    },
                }),
                _ => {}
            }
        }

        for (position, annotation) in annotations.iter_mut().enumerate() {
            annotation.source_index = position;
        }
        annotations
    }
}

fn page_label(page_index: u32, page: &PageSize) -> Annotation {
    Annotation {
        source_index: 0,
        page_index,
        x: page.left + STAMP_MARGIN,
        y: page.top() - STAMP_MARGIN,
        kind: AnnotationKind::Text {
            text: format!("Page {} edited!", page_index + 1),
            font_size: STAMP_FONT_SIZE,
            color: Rgb::RED,
        },
    }
}

fn highlight(page_index: u32, page: &PageSize) -> Annotation {
    Annotation {
        source_index: 0,
        page_index,
        x: page.left + STAMP_MARGIN - 5.0,
        y: page.top() - STAMP_MARGIN - 6.0,
        kind: AnnotationKind::Rectangle {
            width: HIGHLIGHT_WIDTH,
            height: HIGHLIGHT_HEIGHT,
            color: Rgb::YELLOW,
            opacity: HIGHLIGHT_OPACITY,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: PageSize = PageSize::new(612.0, 792.0);

    fn kinds(annotations: &[Annotation], page: u32) -> Vec<&'static str> {
        annotations
            .iter()
            .filter(|a| a.page_index == page)
            .map(Annotation::kind_name)
            .collect()
    }

    #[test]
    fn test_page_edited_without_image() {
        let annotations = FixedTemplate::PageEdited.expand(&[LETTER, LETTER], None);
        assert_eq!(kinds(&annotations, 0), vec!["text", "rectangle"]);
        assert_eq!(kinds(&annotations, 1), vec!["text", "rectangle"]);

        match &annotations[2].kind {
            AnnotationKind::Text { text, font_size, color } => {
                assert_eq!(text, "Page 2 edited!");
                assert_eq!(*font_size, 18.0);
                assert_eq!(*color, Rgb::RED);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert_eq!(annotations[2].y, 742.0);
    }

    #[test]
    fn test_page_edited_image_only_on_first_page() {
        let image = Bytes::from_static(b"png");
        let annotations = FixedTemplate::PageEdited.expand(&[LETTER, LETTER], Some(&image));
        assert_eq!(kinds(&annotations, 0), vec!["text", "rectangle", "image"]);
        assert_eq!(kinds(&annotations, 1), vec!["text", "rectangle"]);

        let stamp = annotations.iter().find(|a| a.kind_name() == "image").unwrap();
        assert_eq!((stamp.x, stamp.y), (50.0, 592.0));
    }

    #[test]
    fn test_stamp_puts_image_bottom_right_on_every_page() {
        let image = Bytes::from_static(b"png");
        let small = PageSize::new(300.0, 400.0);
        let annotations = FixedTemplate::Stamp.expand(&[LETTER, small], Some(&image));
        let images: Vec<_> = annotations
            .iter()
            .filter(|a| a.kind_name() == "image")
            .map(|a| (a.page_index, a.x, a.y))
            .collect();
        assert_eq!(images, vec![(0, 492.0, 20.0), (1, 180.0, 20.0)]);
    }

    #[test]
    fn test_positions_follow_media_box_origin() {
        let image = Bytes::from_static(b"png");
        let shifted = PageSize {
            left: 100.0,
            bottom: 200.0,
            width: 300.0,
            height: 400.0,
        };
        let annotations = FixedTemplate::Stamp.expand(&[shifted], Some(&image));
        let positions: Vec<_> = annotations.iter().map(|a| (a.x, a.y)).collect();
        assert_eq!(
            positions,
            vec![(150.0, 550.0), (145.0, 544.0), (280.0, 220.0)]
        );
    }

    #[test]
    fn test_expanded_annotations_are_numbered_in_order() {
        let annotations = FixedTemplate::PageEdited.expand(&[LETTER, LETTER], None);
        let indices: Vec<_> = annotations.iter().map(|a| a.source_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }
}
