use std::path::PathBuf;
use std::time::Instant;

use crate::convert::images::ImageLimits;
use crate::convert::{self, RasterSettings, SvgConverter, Tier, VectorConverter};
use crate::error::{Error, Result};
use crate::fonts::FontCache;
use crate::geometry::{self, PageGeometry, PageSizePolicy, RenderMode, Size};
use crate::model::{self, Color, EffectTag, PageDocument, SceneObject};
use crate::pdf::DocumentBuilder;
use crate::precheck::{self, MissingGlyphReport};
use crate::prepare;
use crate::svg::{self, VectorDocument};
use crate::transaction::{PageInfo, RestoreOutcome, SceneHost, Transaction};
use crate::vectorize::vectorize_text;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ExportTarget {
    #[default]
    Memory,
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub page_size: PageSizePolicy,
    pub dpi: f32,
    pub mode: RenderMode,
    /// Outline appended as the last page (e.g. a cut line).
    pub reference: Option<SceneObject>,
    pub target: ExportTarget,
    /// Abort on the first failed page instead of delivering the rest.
    pub all_or_nothing: bool,
    pub image_limits: ImageLimits,
    pub raster_upscale: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: PageSizePolicy::Content,
            dpi: 300.0,
            mode: RenderMode::Default,
            reference: None,
            target: ExportTarget::Memory,
            all_or_nothing: false,
            image_limits: ImageLimits::default(),
            raster_upscale: 2.0,
        }
    }
}

/// Pages plus options, for callers that hold their scene as plain data.
pub struct ExportRequest {
    pub pages: Vec<PageDocument>,
    pub options: ExportOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputPageKind {
    Content { page: usize },
    Effect { page: usize, tag: EffectTag },
    Reference,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PageStatus {
    Converted,
    Recovered(Tier),
    Failed(String),
}

impl From<Tier> for PageStatus {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Primary => PageStatus::Converted,
            other => PageStatus::Recovered(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputPage {
    pub kind: OutputPageKind,
    /// Physical page size in millimetres.
    pub size: Size,
    pub status: PageStatus,
}

impl OutputPage {
    pub fn emitted(&self) -> bool {
        !matches!(self.status, PageStatus::Failed(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportReport {
    /// Every attempted output page in document order, failed ones included.
    pub pages: Vec<OutputPage>,
    pub restores: Vec<(usize, RestoreOutcome)>,
}

impl ExportReport {
    pub fn emitted(&self) -> impl Iterator<Item = &OutputPage> {
        self.pages.iter().filter(|p| p.emitted())
    }

    pub fn failed(&self) -> impl Iterator<Item = &OutputPage> {
        self.pages.iter().filter(|p| !p.emitted())
    }

    pub fn recovered(&self) -> impl Iterator<Item = (&OutputPage, Tier)> {
        self.pages.iter().filter_map(|p| match p.status {
            PageStatus::Recovered(tier) => Some((p, tier)),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub enum ExportOutput {
    Saved(PathBuf),
    Memory(Vec<u8>),
}

#[derive(Debug)]
pub struct ExportResult {
    pub output: ExportOutput,
    pub page_count: usize,
    pub report: ExportReport,
}

pub enum ExportEvent<'a> {
    /// Emitted once the glyph check has passed; a cancelled export emits nothing.
    Start { pages: usize },
    /// A page was serialized and is about to be converted.
    PageSerialized {
        kind: &'a OutputPageKind,
        document: &'a VectorDocument,
    },
    PageComplete { page: usize, outputs: &'a [OutputPage] },
    /// Between pages: a point to let the host breathe or reclaim memory.
    Yield { after_page: usize },
    End { report: &'a ExportReport },
}

/// Observer invoked at fixed points of an export, in registration order.
pub trait ExportHook {
    fn on_event(&mut self, event: &ExportEvent<'_>);
}

impl<F> ExportHook for F
where
    F: FnMut(&ExportEvent<'_>),
{
    fn on_event(&mut self, event: &ExportEvent<'_>) {
        self(event)
    }
}

type ConfirmFn = Box<dyn FnMut(&MissingGlyphReport) -> bool>;

pub struct Exporter {
    fonts: FontCache,
    converter: Box<dyn VectorConverter>,
    hooks: Vec<Box<dyn ExportHook>>,
    confirm: Option<ConfirmFn>,
}

impl Exporter {
    pub fn new(fonts: FontCache) -> Self {
        Self {
            fonts,
            converter: Box::new(SvgConverter),
            hooks: Vec::new(),
            confirm: None,
        }
    }

    pub fn with_converter(mut self, converter: impl VectorConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn with_hook(mut self, hook: impl ExportHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Decide whether to continue when glyphs are missing. Without a
    /// callback the export is cancelled.
    pub fn on_missing_glyphs(
        mut self,
        confirm: impl FnMut(&MissingGlyphReport) -> bool + 'static,
    ) -> Self {
        self.confirm = Some(Box::new(confirm));
        self
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    pub fn into_fonts(self) -> FontCache {
        self.fonts
    }

    fn emit(&mut self, event: &ExportEvent<'_>) {
        for hook in &mut self.hooks {
            hook.on_event(event);
        }
    }

    fn glyph_gate<H: SceneHost + ?Sized>(&mut self, host: &H, options: &ExportOptions) -> Result<()> {
        let mut scanned = Vec::new();
        for page in 0..host.page_count() {
            scanned.extend(host.page_objects(page)?);
        }
        scanned.extend(options.reference.iter().cloned());

        let report = precheck::find_missing_glyphs(model::text_runs(&scanned), &mut self.fonts);
        if report.is_empty() {
            return Ok(());
        }
        log::warn!("Unsupported characters ({}):\n{report}", report.total());
        let proceed = self.confirm.as_mut().is_some_and(|confirm| confirm(&report));
        if proceed {
            log::info!("Continuing export with missing glyphs");
            Ok(())
        } else {
            log::info!("Export cancelled at glyph check");
            Err(Error::Cancelled)
        }
    }

    pub fn export<H: SceneHost + ?Sized>(
        &mut self,
        host: &mut H,
        options: &ExportOptions,
    ) -> Result<ExportResult> {
        let t0 = Instant::now();
        let page_count = host.page_count();
        if page_count == 0 {
            return Err(Error::EmptyRequest);
        }
        if !(options.dpi > 0.0) {
            return Err(Error::Config(format!("dpi must be positive, got {}", options.dpi)));
        }

        self.glyph_gate(host, options)?;
        self.emit(&ExportEvent::Start { pages: page_count });
        let t_gate = t0.elapsed();

        let raster = RasterSettings {
            dpi: options.dpi,
            upscale: options.raster_upscale,
            ..RasterSettings::default()
        };
        let mut builder = DocumentBuilder::new();
        let mut report = ExportReport::default();
        let mut last_page: Option<PageInfo> = None;

        for page in 0..page_count {
            let info = host.page_info(page)?;
            let geometry = geometry::resolve(
                info.size,
                info.unit,
                options.dpi,
                options.page_size,
                options.mode,
            );

            let mut outputs = Vec::new();
            let result = match Transaction::begin(host, page) {
                Ok(mut tx) => {
                    let result = self.run_page(
                        &mut tx,
                        &info,
                        &geometry,
                        options,
                        &raster,
                        &mut builder,
                        &mut outputs,
                    );
                    report.restores.push((page, tx.commit_or_restore()));
                    result
                }
                Err(e) => Err(e),
            };
            if let Err(e) = &result
                && !outputs.iter().any(|o| o.kind == OutputPageKind::Content { page })
            {
                outputs.insert(
                    0,
                    OutputPage {
                        kind: OutputPageKind::Content { page },
                        size: geometry.page,
                        status: PageStatus::Failed(e.to_string()),
                    },
                );
            }

            self.emit(&ExportEvent::PageComplete {
                page,
                outputs: &outputs,
            });
            report.pages.extend(outputs);
            last_page = Some(info);

            if let Err(e) = result {
                log::error!("Page {page} failed: {e}");
                if options.all_or_nothing {
                    return Err(Error::PageFailed {
                        page,
                        reason: e.to_string(),
                    });
                }
            }
            self.emit(&ExportEvent::Yield { after_page: page });
        }
        let t_pages = t0.elapsed();

        if let (Some(reference), Some(info)) = (&options.reference, &last_page) {
            let geometry = geometry::resolve(
                info.size,
                info.unit,
                options.dpi,
                options.page_size,
                options.mode,
            );
            let mut outputs = Vec::new();
            let result = self.reference_page(
                reference,
                info.size,
                &geometry,
                page_count,
                &raster,
                &mut builder,
                &mut outputs,
            );
            if let Err(e) = &result
                && outputs.is_empty()
            {
                outputs.push(OutputPage {
                    kind: OutputPageKind::Reference,
                    size: geometry.page,
                    status: PageStatus::Failed(e.to_string()),
                });
            }
            report.pages.extend(outputs);
            if let Err(e) = result {
                log::error!("Reference page failed: {e}");
                if options.all_or_nothing {
                    return Err(Error::PageFailed {
                        page: page_count,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let realized = builder.page_count();
        let bytes = builder.finish();
        let byte_len = bytes.len();
        let output = match &options.target {
            ExportTarget::Memory => ExportOutput::Memory(bytes),
            ExportTarget::File(path) => {
                std::fs::write(path, &bytes)?;
                ExportOutput::Saved(path.clone())
            }
        };
        let t_total = t0.elapsed();

        log::info!(
            "Timing: glyph check={:.1}ms, pages={:.1}ms, finish={:.1}ms, total={:.1}ms ({} pages, {} failed, {} bytes)",
            t_gate.as_secs_f64() * 1000.0,
            (t_pages - t_gate).as_secs_f64() * 1000.0,
            (t_total - t_pages).as_secs_f64() * 1000.0,
            t_total.as_secs_f64() * 1000.0,
            realized,
            report.failed().count(),
            byte_len,
        );

        self.emit(&ExportEvent::End { report: &report });
        Ok(ExportResult {
            output,
            page_count: realized,
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_page<H: SceneHost + ?Sized>(
        &mut self,
        tx: &mut Transaction<'_, H>,
        info: &PageInfo,
        geometry: &PageGeometry,
        options: &ExportOptions,
        raster: &RasterSettings,
        builder: &mut DocumentBuilder,
        outputs: &mut Vec<OutputPage>,
    ) -> Result<()> {
        let page = tx.page();
        let t0 = Instant::now();

        let prepared =
            prepare::prepare_page(tx, options.mode, &mut self.fonts, &options.image_limits)?;
        let t_prepare = t0.elapsed();
        let document = tx.host().serialize_to_vector_document(page, geometry)?;
        let t_serialize = t0.elapsed();

        let mut first_fault = self
            .emit_page(
                OutputPageKind::Content { page },
                page,
                &document,
                geometry,
                raster,
                builder,
                outputs,
            )
            .err();

        for layer in &prepared.effects {
            let kind = OutputPageKind::Effect {
                page,
                tag: layer.tag.clone(),
            };
            let result = match svg::render(&layer.objects, info.size, geometry) {
                Ok(doc) => self.emit_page(kind, page, &doc, geometry, raster, builder, outputs),
                Err(e) => {
                    outputs.push(OutputPage {
                        kind,
                        size: geometry.page,
                        status: PageStatus::Failed(e.to_string()),
                    });
                    Err(e)
                }
            };
            if let Err(e) = result {
                first_fault.get_or_insert(e);
            }
        }

        log::info!(
            "Page {page} ({}): prepare={:.1}ms, serialize={:.1}ms, convert={:.1}ms, {} text objects, {} effect pages",
            info.id,
            t_prepare.as_secs_f64() * 1000.0,
            (t_serialize - t_prepare).as_secs_f64() * 1000.0,
            (t0.elapsed() - t_serialize).as_secs_f64() * 1000.0,
            prepared.vectorized,
            prepared.effects.len(),
        );

        match first_fault {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn reference_page(
        &mut self,
        reference: &SceneObject,
        viewbox: Size,
        geometry: &PageGeometry,
        index: usize,
        raster: &RasterSettings,
        builder: &mut DocumentBuilder,
        outputs: &mut Vec<OutputPage>,
    ) -> Result<()> {
        let mut outline = if reference.is_text() {
            vectorize_text(reference, &mut self.fonts)?
        } else {
            reference.clone()
        };
        outline.visible = true;
        outline.clip = None;
        if outline.fill.is_none() && outline.stroke.is_none() {
            outline.stroke = Some(Color::BLACK);
            outline.stroke_width = outline.stroke_width.max(1.0);
        }
        let document = svg::render(std::slice::from_ref(&outline), viewbox, geometry)?;
        self.emit_page(
            OutputPageKind::Reference,
            index,
            &document,
            geometry,
            raster,
            builder,
            outputs,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_page(
        &mut self,
        kind: OutputPageKind,
        index: usize,
        document: &VectorDocument,
        geometry: &PageGeometry,
        raster: &RasterSettings,
        builder: &mut DocumentBuilder,
        outputs: &mut Vec<OutputPage>,
    ) -> Result<()> {
        self.emit(&ExportEvent::PageSerialized {
            kind: &kind,
            document,
        });
        match convert::convert_with_recovery(self.converter.as_ref(), document, raster) {
            Ok(converted) => {
                builder.add_page(geometry, converted.content);
                outputs.push(OutputPage {
                    kind,
                    size: geometry.page,
                    status: converted.tier.into(),
                });
                Ok(())
            }
            Err(faults) => {
                let err = Error::Conversion {
                    page: index,
                    faults,
                };
                outputs.push(OutputPage {
                    kind,
                    size: geometry.page,
                    status: PageStatus::Failed(err.to_string()),
                });
                Err(err)
            }
        }
    }
}

/// Export plain page data with the default converter.
pub fn export_document(request: &mut ExportRequest, fonts: FontCache) -> Result<ExportResult> {
    Exporter::new(fonts).export(&mut request.pages, &request.options)
}
