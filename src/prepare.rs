//! Export-only mutations applied to a live page inside its transaction.

use crate::convert::images::{self, ImageLimits};
use crate::effects::{self, EffectLayer};
use crate::error::Result;
use crate::fonts::FontCache;
use crate::geometry::RenderMode;
use crate::model::{ObjectKind, Role, SceneObject};
use crate::transaction::{SceneHost, Transaction};
use crate::vectorize::vectorize_text;

pub struct PreparedPage {
    pub effects: Vec<EffectLayer>,
    pub vectorized: usize,
    pub removed: usize,
    pub images_reencoded: usize,
}

/// Remove editing-only helpers and hide page chrome the mode does not print.
fn strip_for_output(objects: &mut Vec<SceneObject>, mode: RenderMode) -> usize {
    let before = objects.len();
    objects.retain(|o| match o.role {
        Some(role) if role.is_editing_only() => false,
        Some(Role::Workspace | Role::ClipOutline) => mode != RenderMode::NoBoundary,
        _ => true,
    });
    let mut removed = before - objects.len();

    for obj in objects.iter_mut() {
        match obj.role {
            Some(Role::ClipOutline) => obj.visible = false,
            Some(Role::Workspace) if mode != RenderMode::Mockup => obj.visible = false,
            _ => {}
        }
        if let ObjectKind::Group { children } = &mut obj.kind {
            removed += strip_for_output(children, mode);
        }
    }
    removed
}

fn ids_with_role(objects: &[SceneObject], role: Role) -> Vec<String> {
    let mut ids = Vec::new();
    for obj in objects {
        obj.walk(&mut |o| {
            if o.role == Some(role) {
                ids.push(o.id.clone());
            }
        });
    }
    ids
}

fn rewrite_clips(objects: &mut [SceneObject], f: &mut impl FnMut(&mut Option<String>)) {
    for obj in objects {
        f(&mut obj.clip);
        if let ObjectKind::Group { children } = &mut obj.kind {
            rewrite_clips(children, f);
        }
    }
}

/// Clip substitution for the render mode: the generic boundary clip becomes
/// the page's own outline, or clipping goes away entirely.
fn apply_clip_policy(objects: &mut [SceneObject], mode: RenderMode) {
    match mode {
        RenderMode::Mockup => {}
        RenderMode::NoBoundary => rewrite_clips(objects, &mut |clip| *clip = None),
        RenderMode::Default | RenderMode::Envelope(_) => {
            let Some(outline) = ids_with_role(objects, Role::ClipOutline).into_iter().next()
            else {
                return;
            };
            let boundaries = ids_with_role(objects, Role::Workspace);
            rewrite_clips(objects, &mut |clip| {
                if clip.as_ref().is_some_and(|c| boundaries.contains(c)) {
                    *clip = Some(outline.clone());
                }
            });
        }
    }
}

/// Replace every text object, at any depth, by its vector composite.
fn vectorize_all(objects: &mut [SceneObject], fonts: &mut FontCache) -> Result<usize> {
    let mut count = 0;
    for obj in objects.iter_mut() {
        if obj.is_text() {
            *obj = vectorize_text(obj, fonts)?;
            count += 1;
        } else if let ObjectKind::Group { children } = &mut obj.kind {
            count += vectorize_all(children, fonts)?;
        }
    }
    Ok(count)
}

/// Apply all export mutations to the transaction's page and compute its
/// effect layers. The live page holds the prepared objects afterwards.
pub fn prepare_page<H: SceneHost + ?Sized>(
    tx: &mut Transaction<'_, H>,
    mode: RenderMode,
    fonts: &mut FontCache,
    limits: &ImageLimits,
) -> Result<PreparedPage> {
    let mut objects = tx.objects()?;

    let removed = strip_for_output(&mut objects, mode);
    apply_clip_policy(&mut objects, mode);
    tx.set_objects(objects.clone())?;

    let vectorized = vectorize_all(&mut objects, fonts)?;
    let images_reencoded = images::prescreen(&mut objects, limits);
    let effects = effects::decompose(&objects);
    tx.set_objects(objects)?;

    log::debug!(
        "prepare: page {} removed={removed} vectorized={vectorized} images={images_reencoded} effects={}",
        tx.page(),
        effects.len()
    );

    Ok(PreparedPage {
        effects,
        vectorized,
        removed,
        images_reencoded,
    })
}
