use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Unit;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);
    pub const WHITE: Color = Color([255, 255, 255]);

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.0;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid color '{s}'"));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return Err(format!("invalid color '{s}'")),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| format!("invalid color '{s}'"))
        };
        Ok(Color([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Degrees, clockwise.
    pub rotation: f32,
    pub skew_x: f32,
    pub skew_y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }
}

impl Transform {
    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// SVG `transform` attribute value; `None` for the identity.
    pub fn to_svg(&self) -> Option<String> {
        if self.is_identity() {
            return None;
        }
        let mut parts = Vec::new();
        if self.x != 0.0 || self.y != 0.0 {
            parts.push(format!("translate({} {})", self.x, self.y));
        }
        if self.rotation != 0.0 {
            parts.push(format!("rotate({})", self.rotation));
        }
        if self.skew_x != 0.0 {
            parts.push(format!("skewX({})", self.skew_x));
        }
        if self.skew_y != 0.0 {
            parts.push(format!("skewY({})", self.skew_y));
        }
        let sx = if self.flip_x { -self.scale_x } else { self.scale_x };
        let sy = if self.flip_y { -self.scale_y } else { self.scale_y };
        if sx != 1.0 || sy != 1.0 {
            parts.push(format!("scale({sx} {sy})"));
        }
        Some(parts.join(" "))
    }

    /// Same placement as [`Transform::to_svg`], as an affine matrix.
    pub fn to_matrix(&self) -> usvg::Transform {
        let sx = if self.flip_x { -self.scale_x } else { self.scale_x };
        let sy = if self.flip_y { -self.scale_y } else { self.scale_y };
        usvg::Transform::from_translate(self.x, self.y)
            .pre_concat(usvg::Transform::from_rotate(self.rotation))
            .pre_concat(usvg::Transform::from_skew(
                self.skew_x.to_radians().tan(),
                0.0,
            ))
            .pre_concat(usvg::Transform::from_skew(
                0.0,
                self.skew_y.to_radians().tan(),
            ))
            .pre_concat(usvg::Transform::from_scale(sx, sy))
    }
}

/// Closed set of object roles the export pipeline treats specially.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// The printable workspace boundary.
    Workspace,
    Background,
    CutLine,
    /// Page-specific outline substituted for the boundary clip.
    ClipOutline,
    Accessory,
    AccessoryIcon,
    Guide,
    Overlay,
}

impl Role {
    /// Helpers that only exist while editing and never reach the output.
    pub fn is_editing_only(self) -> bool {
        matches!(self, Role::AccessoryIcon | Role::Guide | Role::Overlay)
    }

    /// Omitted from effect pages.
    pub fn is_page_chrome(self) -> bool {
        matches!(self, Role::Workspace | Role::Background | Role::ClipOutline)
    }
}

/// Print-effect label. Open-ended: unknown tags are kept and still get a page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectTag(pub String);

impl EffectTag {
    pub const RAISED_FINISH: &'static str = "raised-finish";
    pub const FOIL: &'static str = "foil";
    pub const DIE_CUT: &'static str = "die-cut";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed color the effect's dedicated page is rendered in.
    pub fn presentation_color(&self) -> Option<Color> {
        match self.0.as_str() {
            Self::RAISED_FINISH => Some(Color([0xd3, 0xd3, 0xd3])),
            Self::FOIL => Some(Color([0xd4, 0xaf, 0x37])),
            Self::DIE_CUT => Some(Color([0xb2, 0xeb, 0xf2])),
            _ => None,
        }
    }
}

impl fmt::Display for EffectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: f32,
    pub height: f32,
    /// The image relies on its alpha channel and must stay lossless.
    #[serde(default)]
    pub transparent: bool,
}

fn default_weight() -> u16 {
    400
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    #[serde(default = "default_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub fill: Option<Color>,
    /// Baseline origin in the text object's local space.
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, font_family: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            font_family: font_family.into(),
            font_size,
            font_weight: default_weight(),
            underline: false,
            fill: None,
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn is_blank(&self) -> bool {
        self.text.chars().all(|c| c.is_whitespace() || c.is_control())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObjectKind {
    Rect {
        width: f32,
        height: f32,
        #[serde(default)]
        radius: f32,
    },
    Ellipse {
        rx: f32,
        ry: f32,
    },
    Path {
        data: String,
    },
    Image(ImageData),
    Text {
        runs: Vec<TextRun>,
    },
    Group {
        children: Vec<SceneObject>,
    },
}

fn default_opacity() -> f32 {
    1.0
}

fn default_visible() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default)]
    pub stroke: Option<Color>,
    #[serde(default)]
    pub stroke_width: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub effects: Vec<EffectTag>,
    /// Id of another object on the same page whose shape clips this one.
    #[serde(default)]
    pub clip: Option<String>,
    #[serde(flatten)]
    pub kind: ObjectKind,
}

impl SceneObject {
    pub fn new(id: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            class: None,
            transform: Transform::default(),
            fill: None,
            stroke: None,
            stroke_width: 0.0,
            opacity: 1.0,
            visible: true,
            role: None,
            effects: Vec::new(),
            clip: None,
            kind,
        }
    }

    pub fn rect(id: impl Into<String>, width: f32, height: f32) -> Self {
        Self::new(
            id,
            ObjectKind::Rect {
                width,
                height,
                radius: 0.0,
            },
        )
    }

    pub fn path(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(id, ObjectKind::Path { data: data.into() })
    }

    pub fn text(id: impl Into<String>, runs: Vec<TextRun>) -> Self {
        Self::new(id, ObjectKind::Text { runs })
    }

    pub fn group(id: impl Into<String>, children: Vec<SceneObject>) -> Self {
        Self::new(id, ObjectKind::Group { children })
    }

    pub fn with_fill(mut self, color: Color) -> Self {
        self.fill = Some(color);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_effect(mut self, tag: &str) -> Self {
        self.effects.push(EffectTag::new(tag));
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, ObjectKind::Text { .. })
    }

    pub fn children(&self) -> &[SceneObject] {
        match &self.kind {
            ObjectKind::Group { children } => children,
            _ => &[],
        }
    }

    /// Depth-first visit of this object and all descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a SceneObject)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    pub fn find(&self, id: &str) -> Option<&SceneObject> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(id))
    }
}

pub fn text_runs(objects: &[SceneObject]) -> Vec<&TextRun> {
    let mut runs = Vec::new();
    for obj in objects {
        obj.walk(&mut |o| {
            if let ObjectKind::Text { runs: r } = &o.kind {
                runs.extend(r.iter());
            }
        });
    }
    runs
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub id: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

impl PageDocument {
    pub fn new(id: impl Into<String>, width: f32, height: f32, unit: Unit) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            unit,
            objects: Vec::new(),
        }
    }
}

/// On-disk scene: the pages to export and an optional reference outline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    pub pages: Vec<PageDocument>,
    #[serde(default)]
    pub reference: Option<SceneObject>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
