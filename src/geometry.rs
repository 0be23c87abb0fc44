use serde::{Deserialize, Serialize};

pub const MM_PER_INCH: f32 = 25.4;
pub const PT_PER_INCH: f32 = 72.0;
/// CSS reference pixel density; device pixels are converted with the export DPI instead.
const CSS_PX_PER_INCH: f32 = 96.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unit {
    #[default]
    Px,
    Pt,
    Mm,
    In,
}

impl Unit {
    /// Millimetres per one unit. Device pixels depend on the export resolution.
    pub fn to_mm(self, value: f32, dpi: f32) -> f32 {
        match self {
            Unit::Px => {
                let dpi = if dpi > 0.0 { dpi } else { CSS_PX_PER_INCH };
                value / dpi * MM_PER_INCH
            }
            Unit::Pt => value / PT_PER_INCH * MM_PER_INCH,
            Unit::Mm => value,
            Unit::In => value * MM_PER_INCH,
        }
    }
}

pub fn mm_to_pt(mm: f32) -> f32 {
    mm / MM_PER_INCH * PT_PER_INCH
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageSizePolicy {
    /// Page is exactly as large as the content.
    #[default]
    Content,
    /// Physical print size in millimetres.
    Explicit(Size),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeAnchor {
    TopCenter,
    LeftMiddle,
    #[default]
    Center,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    #[default]
    Default,
    NoBoundary,
    Mockup,
    Envelope(EnvelopeAnchor),
}

/// Resolved placement of one page's content, all lengths in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub page: Size,
    pub content: Size,
    /// Offset of the content's top-left corner from the page's top-left corner.
    pub offset: (f32, f32),
    pub orientation: Orientation,
}

impl PageGeometry {
    pub fn page_pt(&self) -> (f32, f32) {
        (mm_to_pt(self.page.width), mm_to_pt(self.page.height))
    }

    pub fn content_pt(&self) -> (f32, f32) {
        (mm_to_pt(self.content.width), mm_to_pt(self.content.height))
    }

    /// Content rectangle in PDF user space (origin bottom-left): `[x, y, w, h]`.
    pub fn placement_pt(&self) -> [f32; 4] {
        let (_, page_h) = self.page_pt();
        let (w, h) = self.content_pt();
        let x = mm_to_pt(self.offset.0);
        let y = page_h - mm_to_pt(self.offset.1) - h;
        [x, y, w, h]
    }
}

fn centered(page: f32, content: f32) -> f32 {
    ((page - content) / 2.0).max(0.0)
}

pub fn resolve(
    content: Size,
    unit: Unit,
    dpi: f32,
    policy: PageSizePolicy,
    mode: RenderMode,
) -> PageGeometry {
    let content_mm = Size::new(unit.to_mm(content.width, dpi), unit.to_mm(content.height, dpi));
    let page = match policy {
        PageSizePolicy::Explicit(size) => size,
        PageSizePolicy::Content => content_mm,
    };

    let offset = match mode {
        RenderMode::Envelope(EnvelopeAnchor::TopCenter) => {
            (centered(page.width, content_mm.width), 0.0)
        }
        RenderMode::Envelope(EnvelopeAnchor::LeftMiddle) => {
            (0.0, centered(page.height, content_mm.height))
        }
        _ => (
            centered(page.width, content_mm.width),
            centered(page.height, content_mm.height),
        ),
    };

    let orientation = if page.width > page.height {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    };

    PageGeometry {
        page,
        content: content_mm,
        offset,
        orientation,
    }
}
