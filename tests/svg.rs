mod common;

use sceneprint_pdf::geometry::{self, PageGeometry};
use sceneprint_pdf::model::{Color, SceneObject, Transform};
use sceneprint_pdf::svg::{self, count_elements};
use sceneprint_pdf::{Error, PageSizePolicy, RenderMode, Size, Unit};

fn geometry() -> PageGeometry {
    geometry::resolve(
        Size::new(100.0, 50.0),
        Unit::Mm,
        300.0,
        PageSizePolicy::Explicit(Size::new(210.0, 297.0)),
        RenderMode::Default,
    )
}

#[test]
fn document_is_sized_to_the_content_not_the_page() {
    let doc = svg::render(&[common::red_square("sq")], Size::new(100.0, 50.0), &geometry())
        .expect("render");
    let parsed = roxmltree::Document::parse(&doc.svg).expect("valid svg");
    let root = parsed.root_element();
    assert_eq!(root.attribute("viewBox"), Some("0 0 100 50"));
    assert!((doc.width_pt - 283.46).abs() < 0.01);
    assert!((doc.height_pt - 141.73).abs() < 0.01);
    assert_eq!(count_elements(&doc.svg, "rect").expect("svg"), 1);
}

#[test]
fn live_text_is_rejected() {
    let objects = [SceneObject::text("t", vec![common::run("Hi")])];
    match svg::render(&objects, Size::new(100.0, 50.0), &geometry()) {
        Err(Error::LiveText(id)) => assert_eq!(id, "t"),
        other => panic!("expected live text error, got {:?}", other.map(|d| d.svg)),
    }
}

#[test]
fn hidden_objects_and_dangling_clips() {
    let mut hidden = common::red_square("hidden");
    hidden.visible = false;
    let mut dangling = common::red_square("dangling");
    dangling.clip = Some("gone".to_string());

    let doc = svg::render(&[hidden, dangling], Size::new(100.0, 50.0), &geometry())
        .expect("render");
    assert!(!doc.svg.contains(r#"id="hidden""#));
    assert!(doc.svg.contains(r#"id="dangling""#));
    assert!(!doc.svg.contains("clip-path"));
}

#[test]
fn transforms_and_images_are_inlined() {
    let moved = common::red_square("moved").with_transform(Transform {
        x: 10.0,
        y: 5.0,
        rotation: 45.0,
        ..Transform::default()
    });
    let photo = SceneObject::new(
        "photo",
        sceneprint_pdf::model::ObjectKind::Image(sceneprint_pdf::model::ImageData {
            data: common::tiny_png(),
            format: sceneprint_pdf::model::ImageFormat::Png,
            width: 4.0,
            height: 4.0,
            transparent: false,
        }),
    );

    let doc = svg::render(&[moved, photo], Size::new(100.0, 50.0), &geometry()).expect("render");
    let parsed = roxmltree::Document::parse(&doc.svg).expect("valid svg");
    let rect = parsed
        .descendants()
        .find(|n| n.attribute("id") == Some("moved"))
        .expect("rect");
    let transform = rect.attribute("transform").expect("transform");
    assert!(transform.contains("translate(10"), "{transform}");
    assert!(transform.contains("rotate(45"), "{transform}");

    let image = parsed
        .descendants()
        .find(|n| n.tag_name().name() == "image")
        .expect("image");
    let href = image
        .attribute(("http://www.w3.org/1999/xlink", "href"))
        .expect("href");
    assert!(href.starts_with("data:image/png;base64,"));
}

fn square_geometry() -> PageGeometry {
    geometry::resolve(
        Size::new(100.0, 100.0),
        Unit::Mm,
        300.0,
        PageSizePolicy::Content,
        RenderMode::Default,
    )
}

/// Alpha of one pixel with the document drawn at one pixel per unit.
fn alpha_at(svg: &str, x: u32, y: u32) -> u8 {
    let tree = resvg::usvg::Tree::from_str(svg, &resvg::usvg::Options::default()).expect("parse");
    let mut pixmap = resvg::tiny_skia::Pixmap::new(100, 100).expect("pixmap");
    let size = tree.size();
    let transform = resvg::tiny_skia::Transform::from_scale(
        100.0 / size.width(),
        100.0 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    pixmap.pixel(x, y).expect("in bounds").alpha()
}

fn boundary() -> SceneObject {
    SceneObject::rect("boundary", 60.0, 60.0)
}

/// A 20 unit square scaled 2x so it covers 40..80 on the page.
fn scaled_square(id: &str, x: f32, y: f32) -> SceneObject {
    let mut sq = common::red_square(id).with_transform(Transform {
        x,
        y,
        scale_x: 2.0,
        scale_y: 2.0,
        ..Transform::default()
    });
    sq.clip = Some("boundary".to_string());
    sq
}

#[test]
fn clip_applies_in_page_space_for_transformed_objects() {
    let objects = [boundary(), scaled_square("sq", 40.0, 40.0)];
    let doc = svg::render(&objects, Size::new(100.0, 100.0), &square_geometry()).expect("render");

    let parsed = roxmltree::Document::parse(&doc.svg).expect("valid svg");
    let sq = parsed
        .descendants()
        .find(|n| n.attribute("id") == Some("sq"))
        .expect("square");
    assert_eq!(sq.attribute("clip-path"), None);
    let wrapper = sq.parent_element().expect("wrapper");
    assert_eq!(wrapper.attribute("clip-path"), Some("url(#clip-boundary)"));
    assert_eq!(wrapper.attribute("transform"), None);

    assert_eq!(alpha_at(&doc.svg, 50, 50), 255);
    assert_eq!(alpha_at(&doc.svg, 70, 70), 0);
    assert_eq!(alpha_at(&doc.svg, 30, 30), 0);
}

#[test]
fn clip_applies_in_page_space_inside_transformed_groups() {
    let mut moved_boundary = SceneObject::rect("boundary", 30.0, 30.0).with_transform(Transform {
        scale_x: 2.0,
        scale_y: 2.0,
        ..Transform::default()
    });
    moved_boundary.fill = None;
    let objects = [
        SceneObject::group("chrome", vec![moved_boundary]),
        SceneObject::group("art", vec![scaled_square("nested", 30.0, 30.0)])
            .with_transform(Transform::translate(10.0, 10.0)),
    ];
    let doc = svg::render(&objects, Size::new(100.0, 100.0), &square_geometry()).expect("render");

    assert_eq!(alpha_at(&doc.svg, 50, 50), 255);
    assert_eq!(alpha_at(&doc.svg, 70, 70), 0);
}

#[test]
fn shared_clip_is_emitted_once_per_user_space() {
    let objects = [
        boundary(),
        scaled_square("a", 40.0, 40.0),
        scaled_square("b", 0.0, 0.0),
        SceneObject::group("g", vec![scaled_square("c", 30.0, 30.0)])
            .with_transform(Transform::translate(10.0, 10.0)),
    ];
    let doc = svg::render(&objects, Size::new(100.0, 100.0), &square_geometry()).expect("render");
    assert_eq!(count_elements(&doc.svg, "clipPath").expect("svg"), 2);
    assert!(doc.svg.contains(r#"<clipPath id="clip-boundary">"#));
    assert!(doc.svg.contains(r#"<clipPath id="clip-boundary-1">"#));
}

#[test]
fn malformed_colors_are_rejected_without_panicking() {
    for raw in ["\"#a\u{e9}bcd\"", "\"\u{e9}ab\"", "\"#12345\"", "\"#ggg\""] {
        assert!(serde_json::from_str::<Color>(raw).is_err(), "{raw}");
    }
    let parsed: Color = serde_json::from_str("\"#D4af37\"").expect("color");
    assert_eq!(parsed, Color([0xd4, 0xaf, 0x37]));
    let short: Color = serde_json::from_str("\"#fff\"").expect("color");
    assert_eq!(short, Color::WHITE);
}
