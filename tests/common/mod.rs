#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use pdf_writer::{Chunk, Rect, Ref};
use sceneprint_pdf::convert::{ConversionFault, PageContent, RasterImage, VectorConverter};
use sceneprint_pdf::model::{Color, PageDocument, SceneObject, TextRun};
use sceneprint_pdf::{FontCache, MemoryFontSource, Unit};

/// Family name the test font is registered under.
pub const FAMILY: &str = "Boxes";
pub const UNITS_PER_EM: u16 = 1000;
pub const ADVANCE: u16 = 600;
/// Mapped in the cmap but without an outline.
pub const EMPTY_GLYPH_CHAR: char = '~';

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Minimal TrueType font: ASCII letters and digits draw a 400x700 box,
/// space and `~` map to an empty glyph, everything else is unmapped.
pub fn test_font() -> Vec<u8> {
    build_font(None)
}

/// The test font with a `name` table declaring `family`.
pub fn named_test_font(family: &str) -> Vec<u8> {
    build_font(Some(family))
}

fn name_table(family: &str) -> Vec<u8> {
    let utf16: Vec<u8> = family.encode_utf16().flat_map(u16::to_be_bytes).collect();
    let mut name = Vec::new();
    push_u16(&mut name, 0);
    push_u16(&mut name, 1);
    push_u16(&mut name, 6 + 12);
    push_u16(&mut name, 0); // Unicode
    push_u16(&mut name, 3);
    push_u16(&mut name, 0);
    push_u16(&mut name, 1); // family
    push_u16(&mut name, utf16.len() as u16);
    push_u16(&mut name, 0);
    name.extend_from_slice(&utf16);
    name
}

fn build_font(family: Option<&str>) -> Vec<u8> {
    // glyph 0: .notdef (empty), 1: box, 2: empty
    const NUM_GLYPHS: u16 = 3;

    let mut mapping: Vec<(u32, u32)> = Vec::new();
    mapping.push((' ' as u32, 2));
    for c in ('0'..='9').chain('A'..='Z').chain('a'..='z') {
        mapping.push((c as u32, 1));
    }
    mapping.push((EMPTY_GLYPH_CHAR as u32, 2));
    mapping.sort();

    let mut cmap = Vec::new();
    push_u16(&mut cmap, 0);
    push_u16(&mut cmap, 1);
    push_u16(&mut cmap, 0); // Unicode
    push_u16(&mut cmap, 4); // full repertoire
    push_u32(&mut cmap, 12);
    push_u16(&mut cmap, 12);
    push_u16(&mut cmap, 0);
    push_u32(&mut cmap, 16 + 12 * mapping.len() as u32);
    push_u32(&mut cmap, 0);
    push_u32(&mut cmap, mapping.len() as u32);
    for (code, gid) in &mapping {
        push_u32(&mut cmap, *code);
        push_u32(&mut cmap, *code);
        push_u32(&mut cmap, *gid);
    }

    let mut glyf = Vec::new();
    push_i16(&mut glyf, 1);
    for v in [100, 0, 500, 700] {
        push_i16(&mut glyf, v);
    }
    push_u16(&mut glyf, 3);
    push_u16(&mut glyf, 0);
    glyf.extend_from_slice(&[0x01; 4]);
    for dx in [100, 0, 400, 0] {
        push_i16(&mut glyf, dx);
    }
    for dy in [0, 700, 0, -700] {
        push_i16(&mut glyf, dy);
    }
    pad4(&mut glyf);
    let box_len = glyf.len() as u32;

    let mut loca = Vec::new();
    for offset in [0, 0, box_len, box_len] {
        push_u32(&mut loca, offset);
    }

    let mut head = Vec::new();
    push_u32(&mut head, 0x0001_0000);
    push_u32(&mut head, 0x0001_0000);
    push_u32(&mut head, 0);
    push_u32(&mut head, 0x5F0F_3CF5);
    push_u16(&mut head, 0);
    push_u16(&mut head, UNITS_PER_EM);
    head.extend_from_slice(&[0; 16]);
    for v in [0, 0, 500, 700] {
        push_i16(&mut head, v);
    }
    push_u16(&mut head, 0);
    push_u16(&mut head, 8);
    push_i16(&mut head, 2);
    push_i16(&mut head, 1); // long loca
    push_i16(&mut head, 0);
    assert_eq!(head.len(), 54);

    let mut hhea = Vec::new();
    push_u32(&mut hhea, 0x0001_0000);
    push_i16(&mut hhea, 800);
    push_i16(&mut hhea, -200);
    push_i16(&mut hhea, 0);
    push_u16(&mut hhea, ADVANCE);
    push_i16(&mut hhea, 0);
    push_i16(&mut hhea, 0);
    push_i16(&mut hhea, 500);
    push_i16(&mut hhea, 1);
    push_i16(&mut hhea, 0);
    push_i16(&mut hhea, 0);
    hhea.extend_from_slice(&[0; 8]);
    push_i16(&mut hhea, 0);
    push_u16(&mut hhea, NUM_GLYPHS);
    assert_eq!(hhea.len(), 36);

    let mut hmtx = Vec::new();
    for lsb in [0, 100, 0] {
        push_u16(&mut hmtx, ADVANCE);
        push_i16(&mut hmtx, lsb);
    }

    let mut maxp = Vec::new();
    push_u32(&mut maxp, 0x0000_5000);
    push_u16(&mut maxp, NUM_GLYPHS);

    let mut tables: Vec<(&[u8; 4], Vec<u8>)> = vec![
        (b"cmap", cmap),
        (b"glyf", glyf),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"loca", loca),
        (b"maxp", maxp),
    ];
    if let Some(family) = family {
        tables.push((b"name", name_table(family)));
    }

    let mut font = Vec::new();
    push_u32(&mut font, 0x0001_0000);
    push_u16(&mut font, tables.len() as u16);
    push_u16(&mut font, 64);
    push_u16(&mut font, 2);
    push_u16(&mut font, 48);

    let mut offset = 12 + 16 * tables.len() as u32;
    let mut body = Vec::new();
    for (tag, data) in &tables {
        font.extend_from_slice(*tag);
        push_u32(&mut font, 0);
        push_u32(&mut font, offset);
        push_u32(&mut font, data.len() as u32);
        body.extend_from_slice(data);
        pad4(&mut body);
        offset = 12 + 16 * tables.len() as u32 + body.len() as u32;
    }
    font.extend_from_slice(&body);
    font
}

pub fn fonts() -> FontCache {
    FontCache::new(MemoryFontSource::new().with_font(FAMILY, test_font()))
}

pub fn run(text: &str) -> TextRun {
    TextRun::new(text, FAMILY, 10.0)
}

pub fn page(id: &str, objects: Vec<SceneObject>) -> PageDocument {
    let mut page = PageDocument::new(id, 100.0, 50.0, Unit::Mm);
    page.objects = objects;
    page
}

pub fn red_square(id: &str) -> SceneObject {
    SceneObject::rect(id, 20.0, 20.0).with_fill(Color([255, 0, 0]))
}

/// 2x2 RGB PNG.
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([0, 128, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Empty form XObject standing in for converted vector content.
pub fn empty_vector_content() -> PageContent {
    let mut chunk = Chunk::new();
    let root = Ref::new(1);
    chunk.form_xobject(root, &[]).bbox(Rect::new(0.0, 0.0, 1.0, 1.0));
    PageContent::Vector { chunk, root }
}

pub fn blank_raster(width: u32, height: u32) -> PageContent {
    PageContent::Raster(RasterImage {
        width,
        height,
        rgb: vec![255; (width * height * 3) as usize],
        alpha: None,
    })
}

/// Scripted converter: each call is recorded, and vector conversion fails
/// while the serialized page still contains any of `fail_on`. With
/// `fail_raster` the bitmap fallback fails for those pages too.
#[derive(Clone, Default)]
pub struct ScriptedConverter {
    pub fail_on: Vec<&'static str>,
    pub fail_raster: bool,
    pub calls: Rc<RefCell<Vec<String>>>,
}

impl ScriptedConverter {
    pub fn failing_on(markers: &[&'static str]) -> Self {
        Self {
            fail_on: markers.to_vec(),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_on: vec!["<svg"],
            fail_raster: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl VectorConverter for ScriptedConverter {
    fn to_vector(&self, svg: &str) -> Result<PageContent, ConversionFault> {
        self.calls.borrow_mut().push(svg.to_string());
        if let Some(marker) = self.fail_on.iter().find(|m| svg.contains(**m)) {
            return Err(ConversionFault::Vector(format!("cannot handle {marker}")));
        }
        Ok(empty_vector_content())
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<PageContent, ConversionFault> {
        self.calls.borrow_mut().push(format!("raster:{svg}"));
        if self.fail_raster && self.fail_on.iter().any(|m| svg.contains(*m)) {
            return Err(ConversionFault::Raster("out of memory".to_string()));
        }
        Ok(blank_raster(width.min(4), height.min(4)))
    }
}
