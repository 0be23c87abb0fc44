//! Text to path conversion.
//!
//! Every run is drawn from its own family's outlines at its own size, starting
//! at the baseline origin the editor already computed for it. Glyph outlines
//! come out of `ttf-parser` in font units with y pointing up; they are flipped
//! into the text object's local space (y down) here, and the object's own
//! transform is carried by the composite group so it composes unchanged.

use std::fmt::Write;

use ttf_parser::OutlineBuilder;

use crate::error::Result;
use crate::fonts::FontCache;
use crate::model::{Color, ObjectKind, SceneObject, TextRun};

pub const RUN_CLASS: &str = "text-run";
pub const UNDERLINE_CLASS: &str = "text-underline";

const UNDERLINE_THICKNESS: f32 = 0.05;
const UNDERLINE_OFFSET: f32 = 0.15;

struct SvgPathBuilder {
    d: String,
    origin: (f32, f32),
    scale: f32,
}

impl SvgPathBuilder {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin.0 + x * self.scale, self.origin.1 - y * self.scale)
    }
}

impl OutlineBuilder for SvgPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        let _ = write!(self.d, "M{x:.2} {y:.2}");
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        let _ = write!(self.d, "L{x:.2} {y:.2}");
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        let _ = write!(self.d, "Q{x1:.2} {y1:.2} {x:.2} {y:.2}");
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        let _ = write!(
            self.d,
            "C{x1:.2} {y1:.2} {x2:.2} {y2:.2} {x:.2} {y:.2}"
        );
    }

    fn close(&mut self) {
        self.d.push('Z');
    }
}

struct RunGeometry {
    outline: String,
    advance: f32,
}

fn outline_run(run: &TextRun, fonts: &mut FontCache) -> Result<RunGeometry> {
    let font = fonts.resolve(&run.font_family)?;
    let face = font.face()?;
    let scale = run.font_size / font.units_per_em();

    let mut builder = SvgPathBuilder {
        d: String::new(),
        origin: (run.x, run.y),
        scale,
    };
    let mut pen = run.x;
    for ch in run.text.chars() {
        if ch.is_control() {
            continue;
        }
        if let Some(gid) = face.glyph_index(ch) {
            builder.origin = (pen, run.y);
            face.outline_glyph(gid, &mut builder);
        } else {
            log::debug!("{}: no glyph for {ch:?}", run.font_family);
        }
        pen += font.advance(&face, ch) * scale;
    }

    Ok(RunGeometry {
        outline: builder.d,
        advance: pen - run.x,
    })
}

fn check_weight(run: &TextRun) {
    let weight = if (1..=1000).contains(&run.font_weight) {
        run.font_weight
    } else {
        log::warn!(
            "Invalid font weight {} for '{}', treating as 400",
            run.font_weight,
            run.text
        );
        400
    };
    if weight >= 600 {
        // No synthetic bolding: a real bold needs its own outline resource.
        log::warn!(
            "Weight {weight} requested for {}: drawn with the family's regular outlines",
            run.font_family
        );
    }
}

fn underline_path(run: &TextRun, width: f32) -> String {
    let y = run.y + run.font_size * UNDERLINE_OFFSET;
    let h = run.font_size * UNDERLINE_THICKNESS;
    format!(
        "M{:.2} {:.2}H{:.2}V{:.2}H{:.2}Z",
        run.x,
        y,
        run.x + width,
        y + h,
        run.x
    )
}

/// Replace a text object by a group of path objects, one per run plus one per
/// underline. The group keeps the text object's id, class, opacity, transform
/// and tags so it can take the text object's slot in the page.
pub fn vectorize_text(text: &SceneObject, fonts: &mut FontCache) -> Result<SceneObject> {
    let ObjectKind::Text { runs } = &text.kind else {
        return Ok(text.clone());
    };

    let mut children = Vec::new();
    for (i, run) in runs.iter().enumerate() {
        if run.is_blank() {
            continue;
        }
        check_weight(run);
        let geometry = outline_run(run, fonts)?;
        let fill = run.fill.or(text.fill).unwrap_or(Color::BLACK);

        let mut path = SceneObject::path(format!("{}-run{i}", text.id), geometry.outline);
        path.class = Some(RUN_CLASS.to_string());
        path.fill = Some(fill);
        path.stroke = text.stroke;
        path.stroke_width = text.stroke_width;
        children.push(path);

        if run.underline {
            let mut line = SceneObject::path(
                format!("{}-underline{i}", text.id),
                underline_path(run, geometry.advance),
            );
            line.class = Some(UNDERLINE_CLASS.to_string());
            line.fill = Some(fill);
            children.push(line);
        }
    }

    let mut composite = SceneObject::group(text.id.clone(), children);
    composite.class = text.class.clone();
    composite.opacity = text.opacity;
    composite.transform = text.transform.clone();
    composite.visible = text.visible;
    composite.role = text.role;
    composite.effects = text.effects.clone();
    composite.clip = text.clip.clone();
    Ok(composite)
}
