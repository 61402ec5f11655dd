//! Glyph positioning (`GPOS`) application.
//!
//! > The Glyph Positioning table (GPOS) provides precise control over glyph
//! > placement for sophisticated text layout and rendering in each script
//! > and language system that a font supports.
//!
//! — <https://docs.microsoft.com/en-us/typography/opentype/spec/gpos>
//!
//! Positioning mutates the `pos` array in place. Mark and cursive
//! attachments are recorded as chains and resolved into absolute offsets by
//! [position_finish_offsets] once every lookup has run.

use crate::buffer::{attach_type, Buffer, BufferScratchFlags, GlyphPosition};
use crate::context::{
    apply_chain_context_lookup, apply_context_lookup, ApplyContext, LookupsRef,
};
use crate::face::Face;
use crate::layout::{Adjust, Anchor, MarkBasePos, PosLookup};
use crate::ot_map::{LookupMap, TableIndex};
use crate::plan::ShapePlan;
use crate::segment::Direction;

/// Apply all GPOS stages of the plan to the buffer.
pub(crate) fn position(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let Some(gpos) = plan.tables.gpos.as_ref() else {
        return;
    };

    let stage_count = plan.ot_map.stages(TableIndex::Gpos).len();
    for stage in 0..stage_count {
        for lookup_map in plan.ot_map.stage_lookups(TableIndex::Gpos, stage) {
            match gpos.lookups.get(usize::from(lookup_map.index)) {
                Some(lookup) => {
                    apply_string(plan, face, buffer, gpos, lookup_map, lookup);
                }
                None => {
                    log::warn!("GPOS lookup {} out of range; skipped", lookup_map.index);
                }
            }
        }

        if let Some(pause) = plan.ot_map.stages(TableIndex::Gpos)[stage].pause_func {
            pause(plan, face, buffer);
        }
    }
}

fn apply_string(
    plan: &ShapePlan,
    face: &dyn Face,
    buffer: &mut Buffer,
    gpos: &crate::layout::LayoutTable<crate::layout::GPOS>,
    lookup_map: &LookupMap,
    lookup: &crate::layout::Lookup<crate::layout::GPOS>,
) {
    if matches!(lookup.subtables, PosLookup::Unsupported) || buffer.is_empty() {
        return;
    }

    let mut ctx = ApplyContext::new(
        TableIndex::Gpos,
        face,
        buffer,
        plan.tables.gdef.as_ref(),
        LookupsRef::Pos(gpos),
    );
    ctx.lookup_mask = lookup_map.mask;
    ctx.auto_zwnj = lookup_map.auto_zwnj;
    ctx.auto_zwj = lookup_map.auto_zwj;
    ctx.set_lookup_props(lookup.flag, lookup.mark_filtering_set);

    ctx.buffer.idx = 0;
    while ctx.buffer.idx < ctx.buffer.len() {
        let cur = *ctx.buffer.cur(0);
        let applied = cur.mask & ctx.lookup_mask != 0
            && ctx.check_glyph_property(&cur, ctx.lookup_props)
            && apply_pos_at(&mut ctx, &lookup.subtables);
        if !applied {
            ctx.buffer.idx += 1;
        }
    }
}

/// Try every subtable of a positioning lookup at the current cursor.
/// On success the cursor has advanced.
pub(crate) fn apply_pos_at(ctx: &mut ApplyContext<'_, '_>, subtables: &PosLookup) -> bool {
    match subtables {
        PosLookup::SinglePos(subtables) => {
            let glyph = ctx.buffer.cur(0).codepoint as u16;
            for single_pos in subtables {
                if let Some(adjust) = single_pos.apply(glyph) {
                    let direction = ctx.buffer.props.direction;
                    let idx = ctx.buffer.idx;
                    apply_value(&adjust, direction, &mut ctx.buffer.pos[idx]);
                    ctx.buffer.idx += 1;
                    return true;
                }
            }
            false
        }
        PosLookup::PairPos(subtables) => {
            let first = ctx.buffer.idx;
            let Some(second) = ctx.next_glyph_pos(first) else {
                return false;
            };
            let glyph1 = ctx.buffer.info[first].codepoint as u16;
            let glyph2 = ctx.buffer.info[second].codepoint as u16;
            for pair_pos in subtables {
                if let Some((value1, value2)) = pair_pos.apply(glyph1, glyph2) {
                    let direction = ctx.buffer.props.direction;
                    if let Some(adjust) = value1 {
                        apply_value(&adjust, direction, &mut ctx.buffer.pos[first]);
                    }
                    if let Some(adjust) = value2 {
                        apply_value(&adjust, direction, &mut ctx.buffer.pos[second]);
                    }
                    ctx.buffer.unsafe_to_break(first, second + 1);
                    // Let the second glyph pair with its successor, unless it
                    // was itself adjusted.
                    ctx.buffer.idx = if value2.is_some() { second + 1 } else { second };
                    return true;
                }
            }
            false
        }
        PosLookup::CursivePos(subtables) => {
            let j = ctx.buffer.idx;
            let Some(i) = ctx.prev_glyph_pos(j) else {
                return false;
            };
            let glyph_prev = ctx.buffer.info[i].codepoint as u16;
            let glyph_cur = ctx.buffer.info[j].codepoint as u16;
            for cursive_pos in subtables {
                if let Some((exit, entry)) = cursive_pos.apply(glyph_prev, glyph_cur) {
                    let rtl_flag = ctx.lookup_props as u16
                        & crate::layout::LookupFlag::RIGHT_TO_LEFT
                        != 0;
                    let exit = resolve_anchor(ctx.face, glyph_prev, exit);
                    let entry = resolve_anchor(ctx.face, glyph_cur, entry);
                    connect_cursive(ctx.buffer, i, j, exit, entry, rtl_flag);
                    ctx.buffer.idx += 1;
                    return true;
                }
            }
            false
        }
        PosLookup::MarkBasePos(subtables) => apply_mark_to_base(ctx, subtables),
        PosLookup::MarkLigPos(subtables) => {
            let mark_idx = ctx.buffer.idx;
            let mark_glyph = ctx.buffer.info[mark_idx].codepoint as u16;
            let Some(lig_idx) = find_attachment_base(ctx, mark_idx) else {
                return false;
            };
            let lig = ctx.buffer.info[lig_idx];
            let lig_glyph = lig.codepoint as u16;
            let mark = ctx.buffer.info[mark_idx];

            // Which ligature component is the mark attached to?
            let comp_count = lig.lig_num_comps();
            let comp_index =
                if lig.lig_id() != 0 && lig.lig_id() == mark.lig_id() && mark.lig_comp() > 0 {
                    usize::from(mark.lig_comp().min(comp_count)) - 1
                } else {
                    usize::from(comp_count).saturating_sub(1)
                };

            for mark_lig_pos in subtables {
                if let Some((lig_anchor, mark_anchor)) =
                    mark_lig_pos.apply(lig_glyph, mark_glyph, comp_index)
                {
                    attach_mark(ctx, lig_idx, lig_glyph, mark_anchor, lig_anchor);
                    return true;
                }
            }
            false
        }
        PosLookup::MarkMarkPos(subtables) => {
            let mark2_candidate = {
                let idx = ctx.buffer.idx;
                ctx.prev_glyph_pos(idx)
            };
            let Some(mark1_idx) = mark2_candidate else {
                return false;
            };
            let mark2_idx = ctx.buffer.idx;
            let mark1 = ctx.buffer.info[mark1_idx];
            let mark2 = ctx.buffer.info[mark2_idx];
            if !mark1.is_mark() {
                return false;
            }

            // Marks belonging to different ligature components do not stack.
            let id1 = mark1.lig_id();
            let id2 = mark2.lig_id();
            let comparable = if id1 == id2 {
                id1 == 0 || mark1.lig_comp() == mark2.lig_comp()
            } else {
                // One of the two may itself be a ligature, which is fine.
                (id1 > 0 && mark1.lig_comp() == 0) || (id2 > 0 && mark2.lig_comp() == 0)
            };
            if !comparable {
                return false;
            }

            let mark1_glyph = mark1.codepoint as u16;
            let mark2_glyph = mark2.codepoint as u16;
            for mark_mark_pos in subtables {
                if let Some((base_anchor, mark_anchor)) =
                    mark_mark_pos.apply(mark1_glyph, mark2_glyph)
                {
                    attach_mark(ctx, mark1_idx, mark1_glyph, mark_anchor, base_anchor);
                    return true;
                }
            }
            false
        }
        PosLookup::ContextPos(subtables) => {
            for context in subtables {
                if apply_context_lookup(ctx, context) {
                    return true;
                }
            }
            false
        }
        PosLookup::ChainContextPos(subtables) => {
            for chain_context in subtables {
                if apply_chain_context_lookup(ctx, chain_context) {
                    return true;
                }
            }
            false
        }
        PosLookup::Unsupported => false,
    }
}

fn apply_mark_to_base(ctx: &mut ApplyContext<'_, '_>, subtables: &[MarkBasePos]) -> bool {
    let mark_idx = ctx.buffer.idx;
    let mark_glyph = ctx.buffer.info[mark_idx].codepoint as u16;
    let Some(base_idx) = find_attachment_base(ctx, mark_idx) else {
        return false;
    };
    let base_glyph = ctx.buffer.info[base_idx].codepoint as u16;

    for mark_base_pos in subtables {
        if let Some((base_anchor, mark_anchor)) = mark_base_pos.apply(base_glyph, mark_glyph) {
            attach_mark(ctx, base_idx, base_glyph, mark_anchor, base_anchor);
            return true;
        }
    }
    false
}

/// The glyph a mark at `mark_idx` attaches to: the closest preceding
/// non-mark glyph.
fn find_attachment_base(ctx: &ApplyContext<'_, '_>, mark_idx: usize) -> Option<usize> {
    let mut i = mark_idx;
    while i > 0 {
        i -= 1;
        if !ctx.buffer.info[i].is_mark() {
            return Some(i);
        }
    }
    None
}

fn attach_mark(
    ctx: &mut ApplyContext<'_, '_>,
    base_idx: usize,
    base_glyph: u16,
    mark_anchor: Anchor,
    base_anchor: Anchor,
) {
    let mark_idx = ctx.buffer.idx;
    let mark_glyph = ctx.buffer.info[mark_idx].codepoint as u16;
    let (base_x, base_y) = resolve_anchor(ctx.face, base_glyph, base_anchor);
    let (mark_x, mark_y) = resolve_anchor(ctx.face, mark_glyph, mark_anchor);

    let pos = &mut ctx.buffer.pos[mark_idx];
    pos.x_offset = base_x - mark_x;
    pos.y_offset = base_y - mark_y;
    pos.attach_type = attach_type::MARK;
    pos.attach_chain = (base_idx as isize - mark_idx as isize) as i16;

    ctx.buffer.scratch_flags |= BufferScratchFlags::HAS_GPOS_ATTACHMENT;
    ctx.buffer.unsafe_to_break(base_idx, mark_idx + 1);
    ctx.buffer.idx += 1;
}

/// A format 2 anchor tracks a contour point, which wins over the design
/// coordinates when the face can resolve it.
fn resolve_anchor(face: &dyn Face, glyph: u16, anchor: Anchor) -> (i32, i32) {
    if let Some(point_index) = anchor.contour_point {
        if let Some((x, y)) = face.contour_point(glyph, point_index) {
            return (x, y);
        }
    }
    (i32::from(anchor.x), i32::from(anchor.y))
}

/// Apply a value record to a position, honouring the segment direction.
pub(crate) fn apply_value(adjust: &Adjust, direction: Direction, pos: &mut GlyphPosition) {
    pos.x_offset += i32::from(adjust.x_placement);
    pos.y_offset += i32::from(adjust.y_placement);
    if direction.is_horizontal() {
        pos.x_advance += i32::from(adjust.x_advance);
    } else {
        // y_advance values grow downward but font space grows upward.
        pos.y_advance -= i32::from(adjust.y_advance);
    }
}

fn connect_cursive(
    buffer: &mut Buffer,
    i: usize,
    j: usize,
    exit: (i32, i32),
    entry: (i32, i32),
    rtl_flag: bool,
) {
    let direction = buffer.props.direction;
    let pos = &mut buffer.pos;

    match direction {
        Direction::LeftToRight => {
            pos[i].x_advance = exit.0 + pos[i].x_offset;
            let d = entry.0 + pos[j].x_offset;
            pos[j].x_advance -= d;
            pos[j].x_offset -= d;
        }
        Direction::RightToLeft => {
            let d = exit.0 + pos[i].x_offset;
            pos[i].x_advance -= d;
            pos[i].x_offset -= d;
            pos[j].x_advance = entry.0 + pos[j].x_offset;
        }
        Direction::TopToBottom => {
            pos[i].y_advance = exit.1 + pos[i].y_offset;
            let d = entry.1 + pos[j].y_offset;
            pos[j].y_advance -= d;
            pos[j].y_offset -= d;
        }
        Direction::BottomToTop => {
            let d = exit.1 + pos[i].y_offset;
            pos[i].y_advance -= d;
            pos[i].y_offset -= d;
            pos[j].y_advance = entry.1 + pos[j].y_offset;
        }
        Direction::Invalid => {}
    }

    // The cross-stream offset attaches one glyph to the other; which one
    // depends on the lookup's right-to-left flag.
    let (child, parent, x_delta, y_delta) = if rtl_flag {
        (i, j, entry.0 - exit.0, entry.1 - exit.1)
    } else {
        (j, i, exit.0 - entry.0, exit.1 - entry.1)
    };
    if direction.is_horizontal() {
        pos[child].y_offset = y_delta;
    } else {
        pos[child].x_offset = x_delta;
    }
    pos[child].attach_type = attach_type::CURSIVE;
    pos[child].attach_chain = (parent as isize - child as isize) as i16;
    buffer.scratch_flags |= BufferScratchFlags::HAS_GPOS_ATTACHMENT;
    buffer.unsafe_to_break(i.min(j), i.max(j) + 1);
}

/// Resolve attachment chains recorded during lookup application into
/// absolute offsets.
pub(crate) fn position_finish_offsets(buffer: &mut Buffer) {
    if !buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_GPOS_ATTACHMENT)
    {
        return;
    }

    let direction = buffer.props.direction;
    let len = buffer.len();
    for i in 0..len {
        propagate_attachment_offsets(&mut buffer.pos, len, i, direction);
    }
}

fn propagate_attachment_offsets(
    pos: &mut Vec<GlyphPosition>,
    len: usize,
    i: usize,
    direction: Direction,
) {
    let chain = pos[i].attach_chain;
    let kind = pos[i].attach_type;
    if chain == 0 {
        return;
    }
    // Break the chain before recursing so cycles terminate.
    pos[i].attach_chain = 0;

    let j = (i as isize + chain as isize) as usize;
    if j >= len {
        return;
    }
    propagate_attachment_offsets(pos, len, j, direction);

    match kind {
        attach_type::CURSIVE => {
            // Threads only the cross-stream offset through the chain.
            if direction.is_horizontal() {
                pos[i].y_offset += pos[j].y_offset;
            } else {
                pos[i].x_offset += pos[j].x_offset;
            }
        }
        attach_type::MARK => {
            pos[i].x_offset += pos[j].x_offset;
            pos[i].y_offset += pos[j].y_offset;

            if j < i {
                if direction.is_forward() {
                    for k in j..i {
                        pos[i].x_offset -= pos[k].x_advance;
                        pos[i].y_offset -= pos[k].y_advance;
                    }
                } else {
                    for k in j + 1..i + 1 {
                        pos[i].x_offset += pos[k].x_advance;
                        pos[i].y_offset += pos[k].y_advance;
                    }
                }
            }
        }
        _ => {}
    }
}
