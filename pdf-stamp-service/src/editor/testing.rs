//! In-memory codec that records every call, for engine tests.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use crate::error::CodecError;

use super::codec::{
    FilledRect, FontHandle, ImageHandle, ImagePlacement, PageSize, PdfCodec, PdfDocument,
    StandardFont, TextRun,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Text {
        page: usize,
        run: TextRun,
    },
    Rectangle {
        page: usize,
        rect: FilledRect,
    },
    Image {
        page: usize,
        image: ImageHandle,
        placement: ImagePlacement,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    pub font_embeds: usize,
    pub image_embeds: usize,
    pub saves: usize,
    pub calls: Vec<DrawCall>,
}

/// Loads any input starting with `%PDF` as a document of `page_count`
/// US Letter pages.
#[derive(Clone)]
pub struct RecordingCodec {
    page_count: usize,
    stats: Arc<Mutex<RecordingStats>>,
}

impl RecordingCodec {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> RecordingStats {
        self.stats.lock().unwrap().clone()
    }
}

impl PdfCodec for RecordingCodec {
    type Document = RecordingDocument;

    fn load(&self, bytes: &[u8]) -> Result<RecordingDocument, CodecError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(CodecError::Malformed {
                message: "missing %PDF header".to_string(),
            });
        }
        Ok(RecordingDocument {
            source: bytes.to_vec(),
            page_count: self.page_count,
            fonts: 0,
            images: 0,
            calls: Vec::new(),
            stats: self.stats.clone(),
        })
    }
}

pub struct RecordingDocument {
    source: Vec<u8>,
    page_count: usize,
    fonts: usize,
    images: usize,
    pub calls: Vec<DrawCall>,
    stats: Arc<Mutex<RecordingStats>>,
}

impl RecordingDocument {
    pub fn with_pages(page_count: usize) -> Self {
        RecordingCodec::new(page_count)
            .load(b"%PDF")
            .expect("recording codec accepts %PDF")
    }

    fn record(&mut self, page: usize, call: DrawCall) -> Result<(), CodecError> {
        if page >= self.page_count {
            return Err(CodecError::PageNotFound { page });
        }
        self.stats.lock().unwrap().calls.push(call.clone());
        self.calls.push(call);
        Ok(())
    }
}

impl PdfDocument for RecordingDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        (page < self.page_count).then_some(PageSize::new(612.0, 792.0))
    }

    fn embed_standard_font(&mut self, font: StandardFont) -> Result<FontHandle, CodecError> {
        self.stats.lock().unwrap().font_embeds += 1;
        let handle = FontHandle {
            index: self.fonts,
            font,
        };
        self.fonts += 1;
        Ok(handle)
    }

    fn embed_raster_image(&mut self, bytes: &[u8]) -> Result<ImageHandle, CodecError> {
        self.stats.lock().unwrap().image_embeds += 1;
        let handle = ImageHandle {
            index: self.images,
            pixel_width: 10 * bytes.len() as u32,
            pixel_height: 20,
        };
        self.images += 1;
        Ok(handle)
    }

    fn draw_text(&mut self, page: usize, run: &TextRun) -> Result<(), CodecError> {
        self.record(
            page,
            DrawCall::Text {
                page,
                run: run.clone(),
            },
        )
    }

    fn draw_rectangle(&mut self, page: usize, rect: &FilledRect) -> Result<(), CodecError> {
        self.record(page, DrawCall::Rectangle { page, rect: *rect })
    }

    fn draw_image(
        &mut self,
        page: usize,
        image: ImageHandle,
        placement: &ImagePlacement,
    ) -> Result<(), CodecError> {
        self.record(
            page,
            DrawCall::Image {
                page,
                image,
                placement: *placement,
            },
        )
    }

    /// The source bytes followed by one line per recorded call.
    fn save(self) -> Result<Vec<u8>, CodecError> {
        self.stats.lock().unwrap().saves += 1;
        let mut out = self.source;
        for call in &self.calls {
            out.extend_from_slice(format!("\n{call:?}").as_bytes());
        }
        Ok(out)
    }
}

/// Build a PDF with the given page sizes. Pages inherit Resources from the
/// Pages node and share one content stream.
pub fn sample_pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        b"0 0 0 rg 10 10 20 20 re f".to_vec(),
    ));

    let kids: Vec<Object> = sizes
        .iter()
        .map(|(w, h)| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), Object::Integer(*w), Object::Integer(*h)],
                "Contents" => content_id,
            }))
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => Dictionary::new(),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// A solid red PNG with uniform alpha.
pub fn png(width: u32, height: u32, alpha: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, alpha]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}
