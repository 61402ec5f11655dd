//! Glyph substitution (`GSUB`) application.
//!
//! > The Glyph Substitution (GSUB) table provides data for substition of
//! > glyphs for appropriate rendering of scripts, such as
//! > cursively-connecting forms in Arabic script, or for advanced
//! > typographic effects, such as ligatures.
//!
//! — <https://docs.microsoft.com/en-us/typography/opentype/spec/gsub>
//!
//! Lookups are applied in the stage order compiled into the plan's feature
//! map. Each lookup makes a full forward pass over the buffer, rewriting the
//! in side onto the out side; pauses registered by the complex shaper run
//! between stages.

use crate::buffer::{Buffer, GlyphInfo, GlyphPropsFlags};
use crate::context::{
    apply_chain_context_lookup, apply_context_lookup, ApplyContext, LookupsRef,
};
use crate::face::Face;
use crate::layout::{LayoutTable, Ligature, SubstLookup, GSUB};
use crate::ot_map::{LookupMap, TableIndex};
use crate::plan::ShapePlan;

/// Apply all GSUB stages of the plan to the buffer.
pub(crate) fn substitute(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let Some(gsub) = plan.tables.gsub.as_ref() else {
        return;
    };

    let stage_count = plan.ot_map.stages(TableIndex::Gsub).len();
    for stage in 0..stage_count {
        for lookup_map in plan.ot_map.stage_lookups(TableIndex::Gsub, stage) {
            if !buffer.allocation_successful() {
                return;
            }
            match gsub.lookups.get(usize::from(lookup_map.index)) {
                Some(lookup) => {
                    apply_string(plan, face, buffer, gsub, lookup_map, lookup);
                }
                None => {
                    log::warn!("GSUB lookup {} out of range; skipped", lookup_map.index);
                }
            }
        }

        if let Some(pause) = plan.ot_map.stages(TableIndex::Gsub)[stage].pause_func {
            pause(plan, face, buffer);
        }
    }
}

fn apply_string(
    plan: &ShapePlan,
    face: &dyn Face,
    buffer: &mut Buffer,
    gsub: &LayoutTable<GSUB>,
    lookup_map: &LookupMap,
    lookup: &crate::layout::Lookup<GSUB>,
) {
    if matches!(lookup.subtables, SubstLookup::Unsupported) || buffer.is_empty() {
        return;
    }

    let mut ctx = ApplyContext::new(
        TableIndex::Gsub,
        face,
        buffer,
        plan.tables.gdef.as_ref(),
        LookupsRef::Subst(gsub),
    );
    ctx.lookup_mask = lookup_map.mask;
    ctx.auto_zwnj = lookup_map.auto_zwnj;
    ctx.auto_zwj = lookup_map.auto_zwj;
    ctx.per_syllable = lookup_map.per_syllable;
    ctx.set_lookup_props(lookup.flag, lookup.mark_filtering_set);

    ctx.buffer.clear_output();
    while ctx.buffer.idx < ctx.buffer.len() && ctx.buffer.allocation_successful() {
        let cur = *ctx.buffer.cur(0);
        let applied = cur.mask & ctx.lookup_mask != 0
            && ctx.check_glyph_property(&cur, ctx.lookup_props)
            && apply_subst_at(&mut ctx, &lookup.subtables);
        if !applied {
            ctx.buffer.next_glyph();
        }
    }
    ctx.buffer.sync();
}

/// Try every subtable of a substitution lookup at the current cursor.
/// On success the cursor has advanced past the rewritten glyphs.
pub(crate) fn apply_subst_at(ctx: &mut ApplyContext<'_, '_>, subtables: &SubstLookup) -> bool {
    let glyph = ctx.buffer.cur(0).codepoint as u16;
    match subtables {
        SubstLookup::SingleSubst(subtables) => {
            for single_subst in subtables {
                if let Some(output) = single_subst.apply_glyph(glyph) {
                    ctx.replace_glyph(output);
                    return true;
                }
            }
            false
        }
        SubstLookup::MultipleSubst(subtables) => {
            for multiple_subst in subtables {
                if multiple_subst.coverage.coverage_value(glyph).is_some() {
                    // Clone keeps the subtable borrow from blocking buffer
                    // mutation; sequences are short.
                    let sequence: Vec<u16> = multiple_subst
                        .apply_glyph(glyph)
                        .map(|seq| seq.to_vec())
                        .unwrap_or_default();
                    apply_multiple(ctx, &sequence);
                    return true;
                }
            }
            false
        }
        SubstLookup::AlternateSubst(subtables) => {
            let shift = ctx.lookup_mask.trailing_zeros();
            let alt_value =
                ((ctx.buffer.cur(0).mask & ctx.lookup_mask) >> shift) as usize;
            for alternate_subst in subtables {
                if let Some(alternates) = alternate_subst.apply_glyph(glyph) {
                    // Feature values are 1-based alternate selectors.
                    let alt_index = alt_value.saturating_sub(1);
                    if let Some(&output) = alternates.get(alt_index) {
                        ctx.replace_glyph(output);
                        return true;
                    }
                    return false;
                }
            }
            false
        }
        SubstLookup::LigatureSubst(subtables) => {
            for ligature_subst in subtables {
                if let Some(ligature_set) = ligature_subst.apply_glyph(glyph) {
                    // First matching ligature wins.
                    for ligature in ligature_set {
                        if apply_ligature(ctx, ligature) {
                            return true;
                        }
                    }
                    return false;
                }
            }
            false
        }
        SubstLookup::ContextSubst(subtables) => {
            for context in subtables {
                if apply_context_lookup(ctx, context) {
                    return true;
                }
            }
            false
        }
        SubstLookup::ChainContextSubst(subtables) => {
            for chain_context in subtables {
                if apply_chain_context_lookup(ctx, chain_context) {
                    return true;
                }
            }
            false
        }
        SubstLookup::Unsupported => false,
    }
}

fn apply_multiple(ctx: &mut ApplyContext<'_, '_>, sequence: &[u16]) {
    match sequence {
        [] => {
            // The spec forbids empty sequences, but fonts rely on them
            // meaning deletion.
            ctx.buffer.replace_glyphs(1, &[]);
        }
        [single] => {
            ctx.replace_glyph(*single);
        }
        _ => {
            let class = if ctx.buffer.cur(0).is_ligature() {
                GlyphPropsFlags::BASE_GLYPH
            } else {
                GlyphPropsFlags::empty()
            };
            for (i, &glyph) in sequence.iter().enumerate() {
                ctx.buffer
                    .cur_mut(0)
                    .set_lig_props_for_component(0, i as u8);
                ctx.output_glyph_for_component(glyph, class);
            }
            ctx.buffer.skip_glyph();
        }
    }
}

fn apply_ligature(ctx: &mut ApplyContext<'_, '_>, ligature: &Ligature) -> bool {
    if ligature.component_glyphs.is_empty() {
        ctx.replace_glyph(ligature.ligature_glyph);
        return true;
    }

    let components = ligature.component_glyphs.as_slice();
    let match_fn = |info: &GlyphInfo, i: u16| {
        components
            .get(usize::from(i))
            .map_or(false, |&g| info.codepoint == u32::from(g))
    };
    match ctx.match_input(components.len(), &match_fn) {
        Some((match_end, total_component_count)) => {
            ctx.ligate_input(
                components.len() + 1,
                match_end,
                total_component_count,
                ligature.ligature_glyph,
            );
            true
        }
        None => false,
    }
}

/// Whether applying `feature`'s lookups to the glyph sequence would change
/// it, ignoring context. Complex shapers use this to probe the font.
pub(crate) fn would_substitute(
    gsub: &LayoutTable<GSUB>,
    lookup_indices: &[u16],
    glyphs: &[u16],
) -> bool {
    for &lookup_index in lookup_indices {
        let Some(lookup) = gsub.lookups.get(usize::from(lookup_index)) else {
            continue;
        };
        let would = match (&lookup.subtables, glyphs) {
            (SubstLookup::SingleSubst(subtables), [glyph]) => subtables
                .iter()
                .any(|subtable| subtable.apply_glyph(*glyph).is_some()),
            (SubstLookup::LigatureSubst(subtables), [first, rest @ ..]) => {
                subtables.iter().any(|subtable| {
                    subtable.apply_glyph(*first).map_or(false, |set| {
                        set.iter()
                            .any(|ligature| ligature.component_glyphs == rest)
                    })
                })
            }
            _ => false,
        };
        if would {
            return true;
        }
    }
    false
}
