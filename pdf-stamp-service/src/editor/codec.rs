//! PDF codec seam.
//!
//! The engine only talks to documents through these traits so that the
//! production `lopdf` backend and the recording codec used in tests are
//! interchangeable.

use crate::error::CodecError;

use super::annotation::Rgb;

/// Visible page area in user-space points. `left`/`bottom` is the lower-left
/// corner of the MediaBox, which is not always the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub left: f32,
    pub bottom: f32,
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            bottom: 0.0,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn top(&self) -> f32 {
        self.bottom + self.height
    }
}

/// The standard Type1 fonts the engine knows how to reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
        }
    }

    /// Encode text as WinAnsiEncoding bytes.
    ///
    /// Returns the first character that has no WinAnsi code point.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, char> {
        text.chars()
            .map(|ch| win_ansi_byte(ch).ok_or(ch))
            .collect()
    }
}

/// Map a character to its WinAnsiEncoding byte.
fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => match ch {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

/// A font embedded in one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontHandle {
    pub index: usize,
    pub font: StandardFont,
}

/// A raster image embedded in one document, with its intrinsic pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle {
    pub index: usize,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

/// A single-line text run
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font: FontHandle,
    pub font_size: f32,
    pub color: Rgb,
}

/// A filled rectangle anchored at its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilledRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Rgb,
    pub opacity: f32,
}

/// Where to draw an embedded image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Parses raw bytes into page-addressable documents.
pub trait PdfCodec: Send + Sync + 'static {
    type Document: PdfDocument + Send + 'static;

    fn load(&self, bytes: &[u8]) -> Result<Self::Document, CodecError>;
}

/// An in-memory document that accumulates drawing operations per page.
///
/// Draw calls on the same page must be rendered in call order, so later
/// operations paint over earlier ones.
pub trait PdfDocument {
    fn page_count(&self) -> usize;

    fn page_size(&self, page: usize) -> Option<PageSize>;

    fn embed_standard_font(&mut self, font: StandardFont) -> Result<FontHandle, CodecError>;

    fn embed_raster_image(&mut self, bytes: &[u8]) -> Result<ImageHandle, CodecError>;

    fn draw_text(&mut self, page: usize, run: &TextRun) -> Result<(), CodecError>;

    fn draw_rectangle(&mut self, page: usize, rect: &FilledRect) -> Result<(), CodecError>;

    fn draw_image(
        &mut self,
        page: usize,
        image: ImageHandle,
        placement: &ImagePlacement,
    ) -> Result<(), CodecError>;

    fn save(self) -> Result<Vec<u8>, CodecError>;
}
