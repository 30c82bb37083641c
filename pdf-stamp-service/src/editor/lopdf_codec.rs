//! Production PDF codec backed by `lopdf`.
//!
//! Drawing operations are buffered per page and written on `save` as one
//! extra content stream per touched page. The page's original content is
//! wrapped in `q`/`Q` so its graphics state cannot leak into ours.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::BTreeMap;

use crate::error::CodecError;

use super::annotation::Rgb;
use super::codec::{
    FilledRect, FontHandle, ImageHandle, ImagePlacement, PageSize, PdfCodec, PdfDocument,
    StandardFont, TextRun,
};

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_PAGE_SIZE: PageSize = PageSize::new(612.0, 792.0);

/// Limit for walking the page tree looking for inherited attributes
const MAX_TREE_DEPTH: usize = 32;

/// Resource names are prefixed to stay clear of names already on the page.
const FONT_PREFIX: &str = "PsF";
const IMAGE_PREFIX: &str = "PsIm";
const GSTATE_PREFIX: &str = "PsGs";

pub struct LopdfCodec;

impl PdfCodec for LopdfCodec {
    type Document = LopdfDocument;

    fn load(&self, bytes: &[u8]) -> Result<LopdfDocument, CodecError> {
        let doc = Document::load_mem(bytes)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(CodecError::Malformed {
                message: "document has no pages".to_string(),
            });
        }
        let sizes = pages.iter().map(|id| media_box_size(&doc, *id)).collect();

        tracing::debug!(pages = pages.len(), "Loaded PDF");

        Ok(LopdfDocument {
            doc,
            pages,
            sizes,
            fonts: Vec::new(),
            images: Vec::new(),
            gstates: Vec::new(),
            pending: BTreeMap::new(),
        })
    }
}

/// A resource registered with the document
struct Resource {
    name: String,
    id: ObjectId,
}

/// Drawing buffered for one page
#[derive(Default)]
struct PendingPage {
    operations: Vec<Operation>,
    fonts: BTreeMap<String, ObjectId>,
    xobjects: BTreeMap<String, ObjectId>,
    gstates: BTreeMap<String, ObjectId>,
}

pub struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    sizes: Vec<PageSize>,
    fonts: Vec<Resource>,
    images: Vec<Resource>,
    /// Fill-opacity graphics states keyed by the opacity's bit pattern
    gstates: Vec<(u32, Resource)>,
    pending: BTreeMap<usize, PendingPage>,
}

impl LopdfDocument {
    fn pending_page(&mut self, page: usize) -> Result<&mut PendingPage, CodecError> {
        if page >= self.pages.len() {
            return Err(CodecError::PageNotFound { page });
        }
        Ok(self.pending.entry(page).or_default())
    }

    fn opacity_state(&mut self, opacity: f32) -> (String, ObjectId) {
        let bits = opacity.to_bits();
        if let Some((_, resource)) = self.gstates.iter().find(|(b, _)| *b == bits) {
            return (resource.name.clone(), resource.id);
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(opacity),
            "CA" => Object::Real(opacity),
        });
        let name = format!("{}{}", GSTATE_PREFIX, self.gstates.len());
        self.gstates.push((
            bits,
            Resource {
                name: name.clone(),
                id,
            },
        ));
        (name, id)
    }

    /// Write buffered operations and resource references into the page tree.
    fn flush(&mut self) -> Result<(), CodecError> {
        let pending = std::mem::take(&mut self.pending);
        for (page, pending) in pending {
            if pending.operations.is_empty() {
                continue;
            }
            let page_id = self.pages[page];

            let resources = self.resources_location(page_id)?;
            self.register_resources(resources, b"Font", &pending.fonts)?;
            self.register_resources(resources, b"XObject", &pending.xobjects)?;
            self.register_resources(resources, b"ExtGState", &pending.gstates)?;

            let mut operations = Vec::with_capacity(pending.operations.len() + 1);
            operations.push(Operation::new("Q", vec![]));
            operations.extend(pending.operations);
            // Streams are concatenated when rendered; keep the first token separated.
            let mut overlay = b"\n".to_vec();
            overlay.extend(Content { operations }.encode()?);
            self.append_content(page_id, overlay)?;
        }
        Ok(())
    }

    /// Find the page's own Resources dictionary, copying an inherited one
    /// onto the page if needed.
    fn resources_location(&mut self, page_id: ObjectId) -> Result<ResourcesAt, CodecError> {
        let page = self.doc.get_dictionary(page_id)?;
        match page.get(b"Resources") {
            Ok(Object::Reference(id)) => return Ok(ResourcesAt::Object(*id)),
            Ok(Object::Dictionary(_)) => return Ok(ResourcesAt::Inline(page_id)),
            _ => {}
        }

        let inherited = inherited_resources(&self.doc, page_id);
        self.doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Resources", inherited);
        Ok(ResourcesAt::Inline(page_id))
    }

    fn resources_mut(&mut self, at: ResourcesAt) -> Result<&mut Dictionary, CodecError> {
        let dict = match at {
            ResourcesAt::Object(id) => self.doc.get_object_mut(id)?.as_dict_mut()?,
            ResourcesAt::Inline(page_id) => self
                .doc
                .get_object_mut(page_id)?
                .as_dict_mut()?
                .get_mut(b"Resources")?
                .as_dict_mut()?,
        };
        Ok(dict)
    }

    fn register_resources(
        &mut self,
        at: ResourcesAt,
        category: &[u8],
        entries: &BTreeMap<String, ObjectId>,
    ) -> Result<(), CodecError> {
        if entries.is_empty() {
            return Ok(());
        }

        let indirect = match self.resources_mut(at)?.get(category) {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        let target = match indirect {
            Some(id) => self.doc.get_object_mut(id)?.as_dict_mut()?,
            None => {
                let resources = self.resources_mut(at)?;
                if !matches!(resources.get(category), Ok(Object::Dictionary(_))) {
                    resources.set(category.to_vec(), Dictionary::new());
                }
                resources.get_mut(category)?.as_dict_mut()?
            }
        };

        for (name, id) in entries {
            target.set(name.as_bytes().to_vec(), Object::Reference(*id));
        }
        Ok(())
    }

    /// Wrap the existing content in `q`/`Q` and append the overlay stream.
    fn append_content(&mut self, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), CodecError> {
        let existing: Vec<Object> = match self.doc.get_dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let prefix_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let overlay_id = self.doc.add_object(Stream::new(Dictionary::new(), overlay));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(prefix_id));
        contents.extend(existing);
        contents.push(Object::Reference(overlay_id));

        self.doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Contents", contents);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ResourcesAt {
    /// Indirect Resources dictionary
    Object(ObjectId),
    /// Inline in the page dictionary with this id
    Inline(ObjectId),
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        self.sizes.get(page).copied()
    }

    fn embed_standard_font(&mut self, font: StandardFont) -> Result<FontHandle, CodecError> {
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(font.base_font().as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        });
        let index = self.fonts.len();
        self.fonts.push(Resource {
            name: format!("{}{}", FONT_PREFIX, index),
            id,
        });
        Ok(FontHandle { index, font })
    }

    fn embed_raster_image(&mut self, bytes: &[u8]) -> Result<ImageHandle, CodecError> {
        let decoded = image::load_from_memory(bytes)?;
        let (width, height) = (decoded.width(), decoded.height());

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let mut image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };

        if decoded.color().has_alpha() && alpha.iter().any(|a| *a != u8::MAX) {
            let mut smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(width),
                    "Height" => i64::from(height),
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            );
            smask.compress()?;
            let smask_id = self.doc.add_object(smask);
            image_dict.set("SMask", Object::Reference(smask_id));
        }

        let mut stream = Stream::new(image_dict, rgb);
        stream.compress()?;
        let id = self.doc.add_object(stream);

        let index = self.images.len();
        self.images.push(Resource {
            name: format!("{}{}", IMAGE_PREFIX, index),
            id,
        });

        tracing::debug!(index, width, height, "Embedded raster image");

        Ok(ImageHandle {
            index,
            pixel_width: width,
            pixel_height: height,
        })
    }

    fn draw_text(&mut self, page: usize, run: &TextRun) -> Result<(), CodecError> {
        let font = self
            .fonts
            .get(run.font.index)
            .ok_or_else(|| CodecError::Malformed {
                message: format!("font {} was not embedded", run.font.index),
            })?;
        let (name, id) = (font.name.clone(), font.id);
        let encoded = run
            .font
            .font
            .encode(&run.text)
            .map_err(|ch| CodecError::UnencodableText { ch })?;

        let pending = self.pending_page(page)?;
        pending.fonts.insert(name.clone(), id);
        pending.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(name.into_bytes()), Object::Real(run.font_size)],
            ),
            Operation::new("rg", rgb_operands(run.color)),
            Operation::new("Td", vec![Object::Real(run.x), Object::Real(run.y)]),
            Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_rectangle(&mut self, page: usize, rect: &FilledRect) -> Result<(), CodecError> {
        // Validate the page before registering a graphics state for it.
        self.pending_page(page)?;
        let gstate = (rect.opacity < 1.0).then(|| self.opacity_state(rect.opacity));

        let pending = self.pending_page(page)?;
        pending.operations.push(Operation::new("q", vec![]));
        if let Some((name, id)) = gstate {
            pending.gstates.insert(name.clone(), id);
            pending
                .operations
                .push(Operation::new("gs", vec![Object::Name(name.into_bytes())]));
        }
        pending.operations.extend([
            Operation::new("rg", rgb_operands(rect.color)),
            Operation::new(
                "re",
                vec![
                    Object::Real(rect.x),
                    Object::Real(rect.y),
                    Object::Real(rect.width),
                    Object::Real(rect.height),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_image(
        &mut self,
        page: usize,
        image: ImageHandle,
        placement: &ImagePlacement,
    ) -> Result<(), CodecError> {
        let resource = self
            .images
            .get(image.index)
            .ok_or_else(|| CodecError::Malformed {
                message: format!("image {} was not embedded", image.index),
            })?;
        let (name, id) = (resource.name.clone(), resource.id);

        let pending = self.pending_page(page)?;
        pending.xobjects.insert(name.clone(), id);
        pending.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(placement.width),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(placement.height),
                    Object::Real(placement.x),
                    Object::Real(placement.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn save(mut self) -> Result<Vec<u8>, CodecError> {
        self.flush()?;
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| CodecError::Malformed {
                message: format!("Failed to write PDF: {e}"),
            })?;
        Ok(output)
    }
}

fn rgb_operands(color: Rgb) -> Vec<Object> {
    vec![
        Object::Real(color.r),
        Object::Real(color.g),
        Object::Real(color.b),
    ]
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Corner and dimensions from the page's MediaBox, which may be inherited
/// from an ancestor in the page tree.
fn media_box_size(doc: &Document, page_id: ObjectId) -> PageSize {
    let mut current = doc.get_dictionary(page_id).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let Some(dict) = current else { break };

        let media_box = match dict.get(b"MediaBox") {
            Ok(Object::Array(items)) => Some(items),
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => Some(items),
                _ => None,
            },
            _ => None,
        };
        if let Some(items) = media_box {
            let values: Vec<f32> = items.iter().filter_map(number).collect();
            if let [llx, lly, urx, ury] = values[..] {
                return PageSize {
                    left: llx.min(urx),
                    bottom: lly.min(ury),
                    width: (urx - llx).abs(),
                    height: (ury - lly).abs(),
                };
            }
        }

        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    DEFAULT_PAGE_SIZE
}

/// The closest Resources dictionary up the page tree, or an empty one.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc
        .get_dictionary(page_id)
        .and_then(|page| page.get(b"Parent"))
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_dictionary(id))
        .ok();
    for _ in 0..MAX_TREE_DEPTH {
        let Some(dict) = current else { break };
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(resources)) => return resources.clone(),
            Ok(Object::Reference(id)) => {
                if let Ok(resources) = doc.get_dictionary(*id) {
                    return resources.clone();
                }
            }
            _ => {}
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    Dictionary::new()
}
