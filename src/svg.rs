//! Intermediate vector form: one SVG document per output page.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Size, mm_to_pt};
use crate::model::{Color, ObjectKind, SceneObject};

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// A serialized page ready for conversion.
#[derive(Clone, Debug)]
pub struct VectorDocument {
    pub svg: String,
    pub width_pt: f32,
    pub height_pt: f32,
}

impl VectorDocument {
    pub fn with_svg(&self, svg: String) -> Self {
        Self {
            svg,
            width_pt: self.width_pt,
            height_pt: self.height_pt,
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn paint(color: Option<Color>) -> String {
    color.map(Color::to_hex).unwrap_or_else(|| "none".to_string())
}

fn matrix_attr(m: usvg::Transform) -> String {
    if m.is_identity() {
        return String::new();
    }
    format!(
        r#" transform="matrix({} {} {} {} {} {})""#,
        m.sx, m.ky, m.kx, m.sy, m.tx, m.ty
    )
}

/// Bare shape markup, no paint. Groups are expanded by the callers.
fn write_shape(out: &mut String, obj: &SceneObject, attrs: &str) -> Result<()> {
    match &obj.kind {
        ObjectKind::Rect {
            width,
            height,
            radius,
        } => {
            let _ = write!(out, r#"<rect width="{width}" height="{height}""#);
            if *radius > 0.0 {
                let _ = write!(out, r#" rx="{radius}""#);
            }
            let _ = write!(out, "{attrs}/>");
        }
        ObjectKind::Ellipse { rx, ry } => {
            let _ = write!(
                out,
                r#"<ellipse cx="{rx}" cy="{ry}" rx="{rx}" ry="{ry}"{attrs}/>"#
            );
        }
        ObjectKind::Path { data } => {
            let _ = write!(out, r#"<path d="{}"{attrs}/>"#, escape(data));
        }
        ObjectKind::Image(img) => {
            let _ = write!(
                out,
                r#"<image width="{}" height="{}" preserveAspectRatio="none" xlink:href="data:{};base64,{}"{attrs}/>"#,
                img.width,
                img.height,
                img.format.mime(),
                STANDARD.encode(&img.data)
            );
        }
        ObjectKind::Text { .. } => return Err(Error::LiveText(obj.id.clone())),
        ObjectKind::Group { .. } => {}
    }
    Ok(())
}

/// Clip content as flat shapes, each placed by the full matrix `m`.
fn write_clip_shapes(out: &mut String, obj: &SceneObject, m: usvg::Transform) -> Result<()> {
    match &obj.kind {
        ObjectKind::Group { children } => {
            for child in children {
                write_clip_shapes(out, child, m.pre_concat(child.transform.to_matrix()))?;
            }
            Ok(())
        }
        _ => write_shape(out, obj, &matrix_attr(m)),
    }
}

/// Finds `id` and the page-space matrix of its parent.
fn locate<'a>(
    objects: &'a [SceneObject],
    id: &str,
    parent: usvg::Transform,
) -> Option<(&'a SceneObject, usvg::Transform)> {
    objects.iter().find_map(|obj| {
        if obj.id == id {
            return Some((obj, parent));
        }
        locate(
            obj.children(),
            id,
            parent.pre_concat(obj.transform.to_matrix()),
        )
    })
}

/// Clip sources placed in page space, and one `<clipPath>` per distinct
/// user space they are referenced from.
struct ClipDefs<'a> {
    sources: BTreeMap<String, (&'a SceneObject, usvg::Transform)>,
    emitted: Vec<(String, usvg::Transform, String)>,
    defs: String,
}

impl<'a> ClipDefs<'a> {
    fn new(objects: &'a [SceneObject]) -> Self {
        let mut referenced = BTreeSet::new();
        for obj in objects {
            obj.walk(&mut |o| {
                if let Some(target) = &o.clip {
                    referenced.insert(target.clone());
                }
            });
        }

        let mut sources = BTreeMap::new();
        for target in referenced {
            match locate(objects, &target, usvg::Transform::identity()) {
                Some((source, parent)) => {
                    let page = parent.pre_concat(source.transform.to_matrix());
                    sources.insert(target, (source, page));
                }
                None => log::warn!("Clip source '{target}' not on page, drawing unclipped"),
            }
        }
        Self {
            sources,
            emitted: Vec::new(),
            defs: String::new(),
        }
    }

    /// Id of a clip path for `target` as seen from user space `parent`.
    fn id_for(&mut self, target: &str, parent: usvg::Transform) -> Result<Option<String>> {
        let Some(&(source, page)) = self.sources.get(target) else {
            return Ok(None);
        };
        if let Some((_, _, id)) = self
            .emitted
            .iter()
            .find(|(t, m, _)| t == target && *m == parent)
        {
            return Ok(Some(id.clone()));
        }
        let Some(inverse) = parent.invert() else {
            log::warn!("Clip '{target}' referenced from a degenerate transform, drawing unclipped");
            return Ok(None);
        };

        let n = self.emitted.iter().filter(|(t, _, _)| t == target).count();
        let id = if n == 0 {
            format!("clip-{}", escape(target))
        } else {
            format!("clip-{}-{n}", escape(target))
        };
        let _ = write!(self.defs, r#"<clipPath id="{id}">"#);
        write_clip_shapes(&mut self.defs, source, inverse.pre_concat(page))?;
        self.defs.push_str("</clipPath>");
        self.emitted.push((target.to_string(), parent, id.clone()));
        Ok(Some(id))
    }
}

fn transform_attr(obj: &SceneObject) -> String {
    obj.transform
        .to_svg()
        .map(|t| format!(r#" transform="{t}""#))
        .unwrap_or_default()
}

/// `parent` is the page-space matrix of the user space `obj` is drawn in.
fn write_object(
    out: &mut String,
    obj: &SceneObject,
    parent: usvg::Transform,
    clips: &mut ClipDefs<'_>,
) -> Result<()> {
    if !obj.visible {
        return Ok(());
    }
    // The clip wraps the object outside its own transform so the clip shape
    // stays in the parent's space.
    let clip = match obj.clip.as_deref() {
        Some(target) => clips.id_for(target, parent)?,
        None => None,
    };
    if let Some(id) = &clip {
        let _ = write!(out, r#"<g clip-path="url(#{id})">"#);
    }

    let mut attrs = transform_attr(obj);
    let _ = write!(attrs, r#" id="{}""#, escape(&obj.id));
    if let Some(class) = &obj.class {
        let _ = write!(attrs, r#" class="{}""#, escape(class));
    }
    if obj.opacity < 1.0 {
        let _ = write!(attrs, r#" opacity="{}""#, obj.opacity.max(0.0));
    }

    match &obj.kind {
        ObjectKind::Group { children } => {
            let _ = write!(out, "<g{attrs}>");
            let inner = parent.pre_concat(obj.transform.to_matrix());
            for child in children {
                write_object(out, child, inner, clips)?;
            }
            out.push_str("</g>");
        }
        ObjectKind::Image(_) => write_shape(out, obj, &attrs)?,
        _ => {
            let _ = write!(attrs, r#" fill="{}""#, paint(obj.fill));
            if obj.stroke.is_some() && obj.stroke_width > 0.0 {
                let _ = write!(
                    attrs,
                    r#" stroke="{}" stroke-width="{}""#,
                    paint(obj.stroke),
                    obj.stroke_width
                );
            }
            write_shape(out, obj, &attrs)?;
        }
    }

    if clip.is_some() {
        out.push_str("</g>");
    }
    Ok(())
}

/// Serialize page objects to SVG. `viewbox` is the page's content size in its
/// own units; the physical size comes from the resolved geometry.
pub fn render(
    objects: &[SceneObject],
    viewbox: Size,
    geometry: &PageGeometry,
) -> Result<VectorDocument> {
    let width_pt = mm_to_pt(geometry.content.width);
    let height_pt = mm_to_pt(geometry.content.height);

    let mut clips = ClipDefs::new(objects);
    let mut body = String::new();
    for obj in objects {
        write_object(&mut body, obj, usvg::Transform::identity(), &mut clips)?;
    }

    let mut svg = format!(
        r#"<svg xmlns="{SVG_NS}" xmlns:xlink="{XLINK_NS}" width="{width_pt}pt" height="{height_pt}pt" viewBox="0 0 {} {}">"#,
        viewbox.width, viewbox.height
    );
    if !clips.defs.is_empty() {
        let _ = write!(svg, "<defs>{}</defs>", clips.defs);
    }
    svg.push_str(&body);
    svg.push_str("</svg>");

    Ok(VectorDocument {
        svg,
        width_pt,
        height_pt,
    })
}

/// What a recovery tier removes from a serialized page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strip {
    Images,
    /// Images plus filters, masks, clip paths, markers and references.
    Complex,
}

const COMPLEX_ELEMENTS: &[&str] = &[
    "filter", "mask", "clipPath", "marker", "use", "pattern", "symbol",
];
const COMPLEX_ATTRS: &[&str] = &[
    "filter",
    "mask",
    "clip-path",
    "marker-start",
    "marker-mid",
    "marker-end",
];

fn drops_element(name: &str, strip: Strip) -> bool {
    name == "image" || (strip == Strip::Complex && COMPLEX_ELEMENTS.contains(&name))
}

fn write_node(out: &mut String, node: roxmltree::Node, strip: Strip, is_root: bool) {
    if node.is_text() {
        out.push_str(&escape(node.text().unwrap_or_default()));
        return;
    }
    if !node.is_element() {
        return;
    }
    let name = node.tag_name().name();
    if drops_element(name, strip) {
        return;
    }

    let _ = write!(out, "<{name}");
    if is_root {
        let _ = write!(out, r#" xmlns="{SVG_NS}" xmlns:xlink="{XLINK_NS}""#);
    }
    for attr in node.attributes() {
        let local = attr.name();
        if strip == Strip::Complex && COMPLEX_ATTRS.contains(&local) {
            continue;
        }
        let prefix = if attr.namespace() == Some(XLINK_NS) {
            "xlink:"
        } else {
            ""
        };
        let _ = write!(out, r#" {prefix}{local}="{}""#, escape(attr.value()));
    }

    if node.has_children() {
        out.push('>');
        for child in node.children() {
            write_node(out, child, strip, false);
        }
        let _ = write!(out, "</{name}>");
    } else {
        out.push_str("/>");
    }
}

/// Re-serialize an SVG document without the constructs `strip` names.
pub fn strip(svg: &str, strip: Strip) -> std::result::Result<String, roxmltree::Error> {
    let doc = roxmltree::Document::parse(svg)?;
    let mut out = String::with_capacity(svg.len());
    write_node(&mut out, doc.root_element(), strip, true);
    Ok(out)
}

/// Number of elements with the given local name, e.g. to assert that no
/// `text` element ever reaches the converter.
pub fn count_elements(svg: &str, name: &str) -> std::result::Result<usize, roxmltree::Error> {
    let doc = roxmltree::Document::parse(svg)?;
    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .count())
}
