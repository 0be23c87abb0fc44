//! SVG page → PDF page content, with a fixed chain of fallbacks.
//!
//! Each tier is a plain function returning `Result`; the chain stops at the
//! first tier that succeeds, so a page is never downgraded further than needed.

pub mod images;

use std::fmt;

use pdf_writer::{Chunk, Ref};
use resvg::tiny_skia;
use thiserror::Error;

use crate::svg::{self, Strip, VectorDocument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Primary,
    /// Embedded raster images removed.
    WithoutImages,
    /// Images, filters, masks, clips, markers and references removed.
    Simplified,
    /// Whole page drawn into a bitmap.
    Rasterized,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Primary => "primary",
            Tier::WithoutImages => "without-images",
            Tier::Simplified => "simplified",
            Tier::Rasterized => "rasterized",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionFault {
    #[error("SVG parse failed: {0}")]
    Parse(String),
    #[error("vector conversion failed: {0}")]
    Vector(String),
    #[error("rasterization failed: {0}")]
    Raster(String),
    #[error("could not simplify page: {0}")]
    Strip(String),
}

/// Bitmap rendering of a page: 8-bit RGB plus an optional 8-bit alpha plane.
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

pub enum PageContent {
    /// A form XObject (drawn into the unit square) and the chunk holding it.
    Vector { chunk: Chunk, root: Ref },
    Raster(RasterImage),
}

/// Turns serialized pages into PDF content. Not re-entrant: the exporter
/// calls it for one page at a time.
pub trait VectorConverter {
    fn to_vector(&self, svg: &str) -> Result<PageContent, ConversionFault>;

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<PageContent, ConversionFault>;
}

/// `usvg` parsing, `svg2pdf` for vector output and `resvg` for bitmaps.
#[derive(Default)]
pub struct SvgConverter;

fn parse_tree(svg: &str) -> Result<usvg::Tree, ConversionFault> {
    usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| ConversionFault::Parse(e.to_string()))
}

impl VectorConverter for SvgConverter {
    fn to_vector(&self, svg: &str) -> Result<PageContent, ConversionFault> {
        let tree = parse_tree(svg)?;
        let (chunk, root) = svg2pdf::to_chunk(&tree, svg2pdf::ConversionOptions::default())
            .map_err(|e| ConversionFault::Vector(e.to_string()))?;
        Ok(PageContent::Vector { chunk, root })
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<PageContent, ConversionFault> {
        let tree = parse_tree(svg)?;
        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            ConversionFault::Raster(format!("cannot allocate {width}x{height} pixmap"))
        })?;
        let size = tree.size();
        let transform = tiny_skia::Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let pixel_count = (width * height) as usize;
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for px in pixmap.pixels() {
            let c = px.demultiply();
            rgb.extend([c.red(), c.green(), c.blue()]);
            alpha.push(c.alpha());
        }
        let has_alpha = alpha.iter().any(|&a| a < 255);

        Ok(PageContent::Raster(RasterImage {
            width,
            height,
            rgb,
            alpha: has_alpha.then_some(alpha),
        }))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RasterSettings {
    pub dpi: f32,
    /// Multiplier over the export DPI for the bitmap fallback.
    pub upscale: f32,
    pub max_side: u32,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            upscale: 2.0,
            max_side: 8192,
        }
    }
}

impl RasterSettings {
    pub fn pixel_size(&self, doc: &VectorDocument) -> (u32, u32) {
        let px_per_pt = self.dpi * self.upscale / 72.0;
        let mut w = doc.width_pt * px_per_pt;
        let mut h = doc.height_pt * px_per_pt;
        let longest = w.max(h);
        if longest > self.max_side as f32 {
            let k = self.max_side as f32 / longest;
            w *= k;
            h *= k;
        }
        (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
    }
}

pub struct Converted {
    pub content: PageContent,
    pub tier: Tier,
}

type TierFn =
    fn(&dyn VectorConverter, &VectorDocument, &RasterSettings) -> Result<PageContent, ConversionFault>;

fn primary(
    c: &dyn VectorConverter,
    doc: &VectorDocument,
    _: &RasterSettings,
) -> Result<PageContent, ConversionFault> {
    c.to_vector(&doc.svg)
}

fn stripped(
    c: &dyn VectorConverter,
    doc: &VectorDocument,
    level: Strip,
) -> Result<PageContent, ConversionFault> {
    let svg = svg::strip(&doc.svg, level).map_err(|e| ConversionFault::Strip(e.to_string()))?;
    c.to_vector(&svg)
}

fn without_images(
    c: &dyn VectorConverter,
    doc: &VectorDocument,
    _: &RasterSettings,
) -> Result<PageContent, ConversionFault> {
    stripped(c, doc, Strip::Images)
}

fn simplified(
    c: &dyn VectorConverter,
    doc: &VectorDocument,
    _: &RasterSettings,
) -> Result<PageContent, ConversionFault> {
    stripped(c, doc, Strip::Complex)
}

fn rasterized(
    c: &dyn VectorConverter,
    doc: &VectorDocument,
    raster: &RasterSettings,
) -> Result<PageContent, ConversionFault> {
    let (w, h) = raster.pixel_size(doc);
    c.rasterize(&doc.svg, w, h)
}

const TIERS: [(Tier, TierFn); 4] = [
    (Tier::Primary, primary),
    (Tier::WithoutImages, without_images),
    (Tier::Simplified, simplified),
    (Tier::Rasterized, rasterized),
];

/// Run the tiers in order. On total failure every tier's fault is returned.
pub fn convert_with_recovery(
    converter: &dyn VectorConverter,
    doc: &VectorDocument,
    raster: &RasterSettings,
) -> Result<Converted, Vec<(Tier, ConversionFault)>> {
    let mut faults = Vec::new();
    for (tier, run) in TIERS {
        let t0 = std::time::Instant::now();
        match run(converter, doc, raster) {
            Ok(content) => {
                log::debug!(
                    "convert: tier {tier} succeeded in {:.1}ms",
                    t0.elapsed().as_secs_f64() * 1000.0
                );
                if tier != Tier::Primary {
                    log::warn!("Page recovered at tier {tier} after {} fault(s)", faults.len());
                }
                return Ok(Converted { content, tier });
            }
            Err(fault) => {
                log::warn!("convert: tier {tier} failed: {fault}");
                faults.push((tier, fault));
            }
        }
    }
    Err(faults)
}
