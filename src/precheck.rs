use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::fonts::FontCache;
use crate::model::TextRun;

/// Family → characters that family cannot draw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MissingGlyphReport {
    pub missing: BTreeMap<String, BTreeSet<char>>,
}

impl MissingGlyphReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn total(&self) -> usize {
        self.missing.values().map(BTreeSet::len).sum()
    }
}

impl fmt::Display for MissingGlyphReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (family, chars) in &self.missing {
            let list: Vec<String> = chars
                .iter()
                .map(|c| format!("'{c}' (U+{:04X})", *c as u32))
                .collect();
            writeln!(f, "{family}: {}", list.join(", "))?;
        }
        Ok(())
    }
}

/// Scan every run against its family's outline data.
///
/// Families whose resource cannot be resolved are left out of the report;
/// the vectorizer surfaces them as resource faults for the pages that use them.
pub fn find_missing_glyphs<'a>(
    runs: impl IntoIterator<Item = &'a TextRun>,
    fonts: &mut FontCache,
) -> MissingGlyphReport {
    // Keyed by the family spelling of the first run that used it.
    let mut text_per_family: HashMap<String, (String, String)> = HashMap::new();
    for run in runs {
        let entry = text_per_family
            .entry(run.font_family.to_lowercase())
            .or_insert_with(|| (run.font_family.clone(), String::new()));
        entry.1.push_str(&run.text);
    }

    let mut report = MissingGlyphReport::default();
    for (family, text) in text_per_family.into_values() {
        match fonts.check_glyph_support(&family, &text) {
            Ok(missing) if !missing.is_empty() => {
                log::warn!("{family}: {} unsupported characters", missing.len());
                report.missing.insert(family, missing);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Glyph check skipped for {family}: {e}"),
        }
    }
    report
}
