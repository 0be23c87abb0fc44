use crate::model::{Color, EffectTag, ObjectKind, SceneObject};

/// Objects of one page that carry a given effect tag, recolored for the
/// effect's dedicated output page.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectLayer {
    pub tag: EffectTag,
    pub color: Color,
    pub objects: Vec<SceneObject>,
}

/// Distinct effect tags in order of first appearance (depth-first).
pub fn distinct_tags(objects: &[SceneObject]) -> Vec<EffectTag> {
    let mut tags: Vec<EffectTag> = Vec::new();
    for obj in objects {
        obj.walk(&mut |o| {
            for tag in &o.effects {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        });
    }
    tags
}

fn recolor(obj: &mut SceneObject, color: Color) {
    obj.clip = None;
    obj.visible = true;
    match &mut obj.kind {
        ObjectKind::Group { children } => {
            for child in children {
                recolor(child, color);
            }
        }
        ObjectKind::Image(img) => {
            // Raster content cannot take a flat color; its footprint does.
            let (width, height) = (img.width, img.height);
            obj.kind = ObjectKind::Rect {
                width,
                height,
                radius: 0.0,
            };
            obj.fill = Some(color);
        }
        _ => {
            if obj.fill.is_some() || obj.stroke.is_none() {
                obj.fill = Some(color);
            }
            if obj.stroke.is_some() {
                obj.stroke = Some(color);
            }
        }
    }
}

/// Clone of `obj` reduced to the parts carrying `tag`. Untagged groups keep
/// their transform so nested tagged objects land where they were.
fn filter_tagged(obj: &SceneObject, tag: &EffectTag, color: Color) -> Option<SceneObject> {
    if obj.role.is_some_and(|r| r.is_page_chrome() || r.is_editing_only()) {
        return None;
    }
    if obj.effects.contains(tag) {
        let mut clone = obj.clone();
        recolor(&mut clone, color);
        return Some(clone);
    }
    let ObjectKind::Group { children } = &obj.kind else {
        return None;
    };
    let kept: Vec<SceneObject> = children
        .iter()
        .filter_map(|c| filter_tagged(c, tag, color))
        .collect();
    if kept.is_empty() {
        return None;
    }
    let mut shell = obj.clone();
    shell.clip = None;
    shell.visible = true;
    shell.kind = ObjectKind::Group { children: kept };
    Some(shell)
}

/// One layer per distinct tag. The source objects are left untouched; they
/// still render normally on the content page. Tags found only on page chrome
/// yield no layer.
pub fn decompose(objects: &[SceneObject]) -> Vec<EffectLayer> {
    distinct_tags(objects)
        .into_iter()
        .filter_map(|tag| {
            let color = tag.presentation_color().unwrap_or_else(|| {
                log::warn!("No presentation color for effect '{tag}', using black");
                Color::BLACK
            });
            let objects: Vec<SceneObject> = objects
                .iter()
                .filter_map(|o| filter_tagged(o, &tag, color))
                .collect();
            if objects.is_empty() {
                log::debug!("effects: '{tag}' only on page chrome, no layer");
                return None;
            }
            Some(EffectLayer { tag, color, objects })
        })
        .collect()
}
