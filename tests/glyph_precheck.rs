mod common;

use std::cell::Cell;
use std::rc::Rc;

use sceneprint_pdf::fonts::FontState;
use sceneprint_pdf::model::{SceneObject, TextRun};
use sceneprint_pdf::precheck::find_missing_glyphs;
use sceneprint_pdf::{Error, ExportEvent, ExportOptions, Exporter};

use common::{EMPTY_GLYPH_CHAR, FAMILY};

#[test]
fn reports_unmapped_and_empty_glyphs_per_family() {
    let mut fonts = common::fonts();
    let runs = [
        common::run("Hello é"),
        common::run(&format!("ok {EMPTY_GLYPH_CHAR}")),
        common::run("é again\n\t"),
    ];

    let report = find_missing_glyphs(&runs, &mut fonts);

    let missing = &report.missing[FAMILY];
    assert_eq!(missing.iter().copied().collect::<Vec<_>>(), vec!['~', 'é']);
    assert_eq!(report.total(), 2);
    let text = report.to_string();
    assert!(text.contains("U+00E9"), "{text}");
    assert_eq!(fonts.state(FAMILY), FontState::Loaded);
}

#[test]
fn whitespace_only_text_reports_nothing() {
    let mut fonts = common::fonts();
    let runs = [common::run("   \n\t"), common::run("Plain ASCII 123")];
    assert!(find_missing_glyphs(&runs, &mut fonts).is_empty());
}

#[test]
fn unresolvable_family_is_skipped_by_the_check() {
    let mut fonts = common::fonts();
    let runs = [TextRun::new("ü", "Nowhere Sans", 12.0)];
    let report = find_missing_glyphs(&runs, &mut fonts);
    assert!(report.is_empty());
    assert_eq!(fonts.state("Nowhere Sans"), FontState::Failed);
}

fn page_with_missing_glyph() -> Vec<sceneprint_pdf::PageDocument> {
    vec![common::page(
        "p1",
        vec![
            common::red_square("bg"),
            SceneObject::text("title", vec![common::run("Crème")]),
        ],
    )]
}

#[test]
fn gate_without_callback_cancels_before_any_mutation() {
    common::init_logging();
    let mut pages = page_with_missing_glyph();
    let before = pages.clone();
    let converter = common::ScriptedConverter::default();

    let mut exporter = Exporter::new(common::fonts()).with_converter(converter.clone());
    let err = exporter
        .export(&mut pages, &ExportOptions::default())
        .expect_err("gate must cancel");

    assert!(matches!(err, Error::Cancelled), "{err}");
    assert_eq!(pages, before);
    assert!(converter.calls().is_empty());
}

#[test]
fn declining_the_gate_cancels() {
    let mut pages = page_with_missing_glyph();
    let before = pages.clone();
    let asked = Rc::new(Cell::new(0));
    let seen = Rc::clone(&asked);

    let events = Rc::new(Cell::new(0));
    let counted = Rc::clone(&events);

    let mut exporter = Exporter::new(common::fonts())
        .with_converter(common::ScriptedConverter::default())
        .with_hook(move |_: &ExportEvent<'_>| counted.set(counted.get() + 1))
        .on_missing_glyphs(move |report| {
            seen.set(seen.get() + 1);
            assert!(report.to_string().contains('è'));
            false
        });
    let result = exporter.export(&mut pages, &ExportOptions::default());

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(asked.get(), 1);
    assert_eq!(pages, before);
    // no Start without a matching End
    assert_eq!(events.get(), 0);
}

#[test]
fn accepting_the_gate_exports() {
    let mut pages = page_with_missing_glyph();
    let mut exporter = Exporter::new(common::fonts())
        .with_converter(common::ScriptedConverter::default())
        .on_missing_glyphs(|_| true);

    let result = exporter
        .export(&mut pages, &ExportOptions::default())
        .expect("export");
    assert_eq!(result.page_count, 1);
}

#[test]
fn gate_is_not_consulted_when_all_glyphs_exist() {
    let mut pages = vec![common::page(
        "p1",
        vec![SceneObject::text("t", vec![common::run("All good")])],
    )];
    let mut exporter = Exporter::new(common::fonts())
        .with_converter(common::ScriptedConverter::default())
        .on_missing_glyphs(|_| panic!("gate consulted"));
    exporter
        .export(&mut pages, &ExportOptions::default())
        .expect("export");
}
