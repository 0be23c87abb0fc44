use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use sceneprint_pdf::model::SceneObject;
use sceneprint_pdf::{
    EnvelopeAnchor, ExportOptions, ExportOutput, ExportTarget, Exporter, FontCache,
    PageSizePolicy, PageStatus, RenderMode, Size, SystemFontSource,
};

#[derive(Parser)]
#[command(name = "sceneprint-pdf")]
#[command(version)]
#[command(about = "Export vector design scenes to print-ready PDF", long_about = None)]
struct Cli {
    /// Scene file (JSON)
    #[arg(value_name = "SCENE")]
    input: PathBuf,

    /// Output PDF file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Export resolution, used for pixel units and the raster fallback
    #[arg(long, default_value_t = 300.0)]
    dpi: f32,

    /// Physical page size in millimetres, e.g. 210x297
    #[arg(long, value_name = "WxH", value_parser = parse_print_size)]
    print_size: Option<Size>,

    #[arg(long, value_enum, default_value = "default")]
    mode: Mode,

    /// Content anchor for the envelope mode
    #[arg(long, value_enum, default_value = "center")]
    anchor: Anchor,

    /// Additional font directory (repeatable)
    #[arg(long, value_name = "DIR")]
    font_dir: Vec<PathBuf>,

    /// Continue without asking when glyphs are missing
    #[arg(long)]
    allow_missing_glyphs: bool,

    /// Fail the whole export if any page fails
    #[arg(long)]
    all_or_nothing: bool,

    /// Object (JSON) drawn on a trailing reference page
    #[arg(long, value_name = "FILE")]
    reference: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Default,
    NoBoundary,
    Mockup,
    Envelope,
}

#[derive(Clone, Copy, ValueEnum)]
enum Anchor {
    TopCenter,
    LeftMiddle,
    Center,
}

fn parse_print_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .ok()
            .filter(|n| *n > 0.0)
            .ok_or_else(|| format!("invalid length '{v}'"))
    };
    Ok(Size::new(parse(w)?, parse(h)?))
}

fn render_mode(mode: Mode, anchor: Anchor) -> RenderMode {
    match mode {
        Mode::Default => RenderMode::Default,
        Mode::NoBoundary => RenderMode::NoBoundary,
        Mode::Mockup => RenderMode::Mockup,
        Mode::Envelope => RenderMode::Envelope(match anchor {
            Anchor::TopCenter => EnvelopeAnchor::TopCenter,
            Anchor::LeftMiddle => EnvelopeAnchor::LeftMiddle,
            Anchor::Center => EnvelopeAnchor::Center,
        }),
    }
}

fn ask_to_continue() -> bool {
    eprint!("Some characters have no glyph and will be dropped. Continue? [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn run(cli: Cli) -> sceneprint_pdf::Result<()> {
    let reference = match &cli.reference {
        Some(path) => {
            let raw = std::fs::read(path)?;
            Some(serde_json::from_slice::<SceneObject>(&raw)?)
        }
        None => None,
    };

    let options = ExportOptions {
        page_size: cli
            .print_size
            .map_or(PageSizePolicy::Content, PageSizePolicy::Explicit),
        dpi: cli.dpi,
        mode: render_mode(cli.mode, cli.anchor),
        reference,
        target: ExportTarget::File(cli.output.clone()),
        all_or_nothing: cli.all_or_nothing,
        ..ExportOptions::default()
    };

    let fonts = FontCache::new(SystemFontSource::with_dirs(cli.font_dir.clone()));
    let allow = cli.allow_missing_glyphs;
    let mut exporter = Exporter::new(fonts).on_missing_glyphs(move |report| {
        eprintln!("Missing glyphs:\n{report}");
        allow || ask_to_continue()
    });

    let result = sceneprint_pdf::export_scene_file(&cli.input, &options, &mut exporter)?;
    for page in &result.report.pages {
        match &page.status {
            PageStatus::Converted => {}
            PageStatus::Recovered(tier) => eprintln!("{:?}: recovered ({tier})", page.kind),
            PageStatus::Failed(reason) => eprintln!("{:?}: failed: {reason}", page.kind),
        }
    }
    if let ExportOutput::Saved(path) = &result.output {
        println!("{} ({} pages)", path.display(), result.page_count);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
