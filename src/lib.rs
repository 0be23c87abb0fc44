pub mod convert;
pub mod effects;
mod error;
pub mod export;
pub mod fonts;
pub mod geometry;
pub mod model;
mod pdf;
pub mod precheck;
pub mod prepare;
pub mod svg;
pub mod transaction;
pub mod vectorize;

pub use error::{Error, Result};
pub use export::{
    ExportEvent, ExportHook, ExportOptions, ExportOutput, ExportReport, ExportRequest,
    ExportResult, ExportTarget, Exporter, OutputPage, OutputPageKind, PageStatus,
    export_document,
};
pub use fonts::{FontCache, FontSource, MemoryFontSource, SystemFontSource};
pub use geometry::{EnvelopeAnchor, PageSizePolicy, RenderMode, Size, Unit};
pub use model::{PageDocument, SceneFile, SceneObject};
pub use transaction::SceneHost;

use std::path::Path;
use std::time::Instant;

/// Load a JSON scene file and export it. A reference object stored in the
/// file is used unless `options` already carries one.
pub fn export_scene_file(
    input: &Path,
    options: &ExportOptions,
    exporter: &mut Exporter,
) -> Result<ExportResult> {
    let t0 = Instant::now();

    let raw = std::fs::read(input)?;
    let scene: SceneFile = serde_json::from_slice(&raw)?;
    let t_parse = t0.elapsed();

    let mut options = options.clone();
    if options.reference.is_none() {
        options.reference = scene.reference;
    }
    let mut pages = scene.pages;
    let result = exporter.export(&mut pages, &options)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: parse={:.1}ms, export={:.1}ms, total={:.1}ms (input {} bytes, {} pages)",
        t_parse.as_secs_f64() * 1000.0,
        (t_total - t_parse).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        raw.len(),
        result.page_count,
    );

    Ok(result)
}
