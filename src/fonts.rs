use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use memmap2::Mmap;
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::error::{Error, Result};

/// Raw font bytes plus the face index inside a collection.
pub struct FontData {
    pub bytes: Vec<u8>,
    pub face_index: u32,
}

/// Where outline resources come from. Loading may be slow (disk, network);
/// the cache in front of it makes sure each family is asked for at most once.
pub trait FontSource {
    fn load(&self, family: &str) -> Result<FontData>;
}

/// Parsed outline data for one family. Holds the bytes; faces are
/// re-borrowed on demand since `ttf_parser::Face` cannot own its data.
pub struct FontOutline {
    family: String,
    data: Vec<u8>,
    face_index: u32,
    units_per_em: f32,
}

impl FontOutline {
    pub fn parse(family: &str, data: FontData) -> Result<Self> {
        let face = Face::parse(&data.bytes, data.face_index).map_err(|e| Error::FontParse {
            family: family.to_string(),
            reason: e.to_string(),
        })?;
        let units_per_em = face.units_per_em() as f32;
        Ok(Self {
            family: family.to_string(),
            data: data.bytes,
            face_index: data.face_index,
            units_per_em,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn face(&self) -> Result<Face<'_>> {
        Face::parse(&self.data, self.face_index).map_err(|e| Error::FontParse {
            family: self.family.clone(),
            reason: e.to_string(),
        })
    }

    pub fn units_per_em(&self) -> f32 {
        self.units_per_em
    }

    /// Horizontal advance of `ch` in font units; unmapped characters use `.notdef`.
    pub fn advance(&self, face: &Face<'_>, ch: char) -> f32 {
        let gid = face.glyph_index(ch).unwrap_or(GlyphId(0));
        face.glyph_hor_advance(gid).unwrap_or(0) as f32
    }

    /// Distinct characters of `text` this font cannot draw. Whitespace and
    /// control characters are never reported.
    pub fn missing_chars(&self, text: &str) -> Result<BTreeSet<char>> {
        let face = self.face()?;
        let mut missing = BTreeSet::new();
        for ch in text.chars() {
            if ch.is_whitespace() || ch.is_control() {
                continue;
            }
            let drawable = face
                .glyph_index(ch)
                .is_some_and(|gid| face.outline_glyph(gid, &mut NullOutline).is_some());
            if !drawable {
                missing.insert(ch);
            }
        }
        Ok(missing)
    }
}

struct NullOutline;

impl OutlineBuilder for NullOutline {
    fn move_to(&mut self, _: f32, _: f32) {}
    fn line_to(&mut self, _: f32, _: f32) {}
    fn quad_to(&mut self, _: f32, _: f32, _: f32, _: f32) {}
    fn curve_to(&mut self, _: f32, _: f32, _: f32, _: f32, _: f32, _: f32) {}
    fn close(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontState {
    Unloaded,
    Loaded,
    Failed,
}

enum FontSlot {
    Loaded(Arc<FontOutline>),
    Failed(String),
}

/// Read-through, append-only cache of outline resources keyed by family.
/// Owned by whoever runs the export; pass it on to reuse it across exports.
pub struct FontCache {
    source: Box<dyn FontSource>,
    entries: HashMap<String, FontSlot>,
}

impl FontCache {
    pub fn new(source: impl FontSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            entries: HashMap::new(),
        }
    }

    pub fn state(&self, family: &str) -> FontState {
        match self.entries.get(&family.to_lowercase()) {
            None => FontState::Unloaded,
            Some(FontSlot::Loaded(_)) => FontState::Loaded,
            Some(FontSlot::Failed(_)) => FontState::Failed,
        }
    }

    /// Resolve a family, loading it on first use. Failures are remembered so a
    /// broken family is not reloaded for every run that references it.
    pub fn resolve(&mut self, family: &str) -> Result<Arc<FontOutline>> {
        let key = family.to_lowercase();
        if let Some(slot) = self.entries.get(&key) {
            return match slot {
                FontSlot::Loaded(outline) => Ok(Arc::clone(outline)),
                FontSlot::Failed(reason) => Err(Error::FontResource {
                    family: family.to_string(),
                    reason: reason.clone(),
                }),
            };
        }

        let t0 = std::time::Instant::now();
        let loaded = self
            .source
            .load(family)
            .and_then(|data| FontOutline::parse(family, data));
        match loaded {
            Ok(outline) => {
                log::debug!(
                    "resolve_font: {family} → {:.1}ms",
                    t0.elapsed().as_secs_f64() * 1000.0
                );
                let outline = Arc::new(outline);
                self.entries.insert(key, FontSlot::Loaded(Arc::clone(&outline)));
                Ok(outline)
            }
            Err(e) => {
                let reason = match e {
                    Error::FontResource { reason, .. } => reason,
                    other => other.to_string(),
                };
                log::warn!("Font resource unavailable: {family}: {reason}");
                self.entries.insert(key, FontSlot::Failed(reason.clone()));
                Err(Error::FontResource {
                    family: family.to_string(),
                    reason,
                })
            }
        }
    }

    pub fn check_glyph_support(&mut self, family: &str, text: &str) -> Result<BTreeSet<char>> {
        self.resolve(family)?.missing_chars(text)
    }
}

/// Fonts handed over as bytes, e.g. fetched by the host application.
#[derive(Default)]
pub struct MemoryFontSource {
    fonts: HashMap<String, Vec<u8>>,
}

impl MemoryFontSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, family: &str, bytes: Vec<u8>) {
        self.fonts.insert(family.to_lowercase(), bytes);
    }

    pub fn with_font(mut self, family: &str, bytes: Vec<u8>) -> Self {
        self.insert(family, bytes);
        self
    }
}

impl FontSource for MemoryFontSource {
    fn load(&self, family: &str) -> Result<FontData> {
        self.fonts
            .get(&family.to_lowercase())
            .map(|bytes| FontData {
                bytes: bytes.clone(),
                face_index: 0,
            })
            .ok_or_else(|| Error::FontResource {
                family: family.to_string(),
                reason: "not registered".to_string(),
            })
    }
}

/// lowercase family name -> (file path, face index within TTC), regular faces first
type FontLookup = HashMap<String, (PathBuf, u32)>;

/// Installed fonts found by scanning font directories once per process.
#[derive(Default)]
pub struct SystemFontSource {
    extra_dirs: Vec<PathBuf>,
    index: OnceLock<FontLookup>,
}

impl SystemFontSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dirs(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            extra_dirs: dirs.into_iter().collect(),
            index: OnceLock::new(),
        }
    }

    fn index(&self) -> &FontLookup {
        self.index.get_or_init(|| {
            let mut dirs = self.extra_dirs.clone();
            dirs.extend(font_directories());
            scan_font_dirs(dirs)
        })
    }
}

impl FontSource for SystemFontSource {
    fn load(&self, family: &str) -> Result<FontData> {
        let (path, face_index) =
            self.index()
                .get(&family.to_lowercase())
                .cloned()
                .ok_or_else(|| Error::FontResource {
                    family: family.to_string(),
                    reason: "no installed font with this family name".to_string(),
                })?;
        let bytes = std::fs::read(&path)?;
        Ok(FontData { bytes, face_index })
    }
}

fn font_family_name(face: &Face) -> Option<String> {
    // ID 1 (Family) keeps "Aptos Display" apart from "Aptos";
    // ID 16 (Typographic Family) would merge them.
    for name in face.names() {
        if name.name_id == ttf_parser::name_id::FAMILY
            && name.is_unicode()
            && let Some(s) = name.to_string()
        {
            return Some(s);
        }
    }
    None
}

fn font_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(val) = std::env::var("SCENEPRINT_FONTS") {
        let sep = if cfg!(windows) { ';' } else { ':' };
        for part in val.split(sep) {
            let trimmed = part.trim();
            if !trimmed.is_empty() {
                dirs.push(PathBuf::from(trimmed));
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.extend([
            "/Library/Fonts".into(),
            "/System/Library/Fonts".into(),
            "/System/Library/Fonts/Supplemental".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        } else {
            dirs.push("C:\\Windows\\Fonts".into());
        }
    }

    dirs
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn is_font_collection(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ttc"))
}

fn scan_font_dirs(dirs: Vec<PathBuf>) -> FontLookup {
    let t0 = std::time::Instant::now();
    let mut regular = FontLookup::new();
    let mut styled = FontLookup::new();
    let mut files_scanned = 0u32;
    let mut visited = std::collections::HashSet::new();

    let mut stack = dirs;
    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_font_file(&path) {
                continue;
            }
            files_scanned += 1;
            let Ok(file) = std::fs::File::open(&path) else {
                continue;
            };
            let Ok(data) = (unsafe { Mmap::map(&file) }) else {
                continue;
            };
            let face_count = if is_font_collection(&path) {
                ttf_parser::fonts_in_collection(&data).unwrap_or(1)
            } else {
                1
            };
            for face_idx in 0..face_count {
                let Ok(face) = Face::parse(&data, face_idx) else {
                    continue;
                };
                let Some(family) = font_family_name(&face) else {
                    continue;
                };
                let target = if face.is_bold() || face.is_italic() {
                    &mut styled
                } else {
                    &mut regular
                };
                target
                    .entry(family.to_lowercase())
                    .or_insert((path.clone(), face_idx));
            }
        }
    }

    // Families that only ship styled faces still resolve to something.
    for (family, location) in styled {
        regular.entry(family).or_insert(location);
    }

    log::info!(
        "Font scan: {:.1}ms, {} files parsed → {} families",
        t0.elapsed().as_secs_f64() * 1000.0,
        files_scanned,
        regular.len(),
    );

    regular
}
