//! The shape driver.
//!
//! [shape] ties the pipeline together: Unicode property setup, cluster
//! formation, direction handling, normalization, the substitution pass
//! (GSUB or `morx`), positioning (GPOS with `kern`/`kerx` fallbacks), and
//! output cleanup. Everything here is best-effort: the only failure a
//! caller can observe is the buffer's sticky allocation flag.

use crate::buffer::{
    Buffer, BufferFlags, BufferScratchFlags, ContentType, GlyphInfo,
};
use crate::complex::ZeroWidthMarks;
use crate::face::Face;
use crate::fallback;
use crate::gdef;
use crate::gpos;
use crate::gsub;
use crate::plan::ShapePlan;
use crate::segment::{script_horizontal_direction, Direction, Feature};
use crate::unicode::{self, GeneralCategory};

/// Shape `buffer` with `face`.
///
/// Returns true iff shaping succeeded: no allocation failure occurred and
/// the buffer content transitioned to glyphs. Segment properties that were
/// not set are guessed from the buffer contents.
pub fn shape(face: &dyn Face, buffer: &mut Buffer, features: &[Feature]) -> bool {
    buffer.guess_segment_properties();
    let plan = ShapePlan::new(face, &buffer.segment_properties(), features);
    shape_with_plan(&plan, face, buffer)
}

/// Shape with a precompiled plan. The plan must have been compiled for the
/// buffer's segment properties.
pub fn shape_with_plan(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) -> bool {
    if buffer.content_type() != ContentType::Unicode {
        // Misuse: shaping an already-shaped buffer is a no-op failure.
        buffer.successful = false;
        return false;
    }
    if buffer.is_empty() {
        buffer.set_content_type(ContentType::Glyphs);
        return buffer.allocation_successful();
    }

    buffer.props = plan.props.clone();
    buffer.scratch_flags = BufferScratchFlags::default();
    buffer.max_ops = (buffer.len() as i64).saturating_mul(64).max(1024);

    buffer.reset_masks(plan.ot_map.global_mask());

    set_unicode_props(buffer);
    insert_dotted_circle(face, buffer);
    form_clusters(buffer);
    ensure_native_direction(buffer);

    if let Some(func) = plan.shaper.preprocess_text {
        func(plan, face, buffer);
    }

    substitute(plan, face, buffer);
    position(plan, face, buffer);

    if let Some(func) = plan.shaper.postprocess_glyphs {
        func(plan, face, buffer);
    }

    hide_default_ignorables(face, buffer);
    propagate_unsafe_to_break(buffer);

    buffer.set_content_type(ContentType::Glyphs);
    buffer.allocation_successful()
}

fn set_unicode_props(buffer: &mut Buffer) {
    let mut scratch = buffer.scratch_flags;
    for info in &mut buffer.info {
        info.init_unicode_props(&mut scratch);
    }
    buffer.scratch_flags = scratch;
}

/// Orphaned marks at the start of text get a dotted circle to sit on.
fn insert_dotted_circle(face: &dyn Face, buffer: &mut Buffer) {
    if buffer
        .flags
        .contains(BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
        || !buffer.flags.contains(BufferFlags::BEGINNING_OF_TEXT)
        || buffer.context_len[0] != 0
        || !buffer.info[0].is_unicode_mark()
    {
        return;
    }
    if face.glyph_index(unicode::DOTTED_CIRCLE, None).is_none() {
        return;
    }

    let mut dotted_circle = GlyphInfo {
        codepoint: unicode::DOTTED_CIRCLE,
        cluster: buffer.info[0].cluster,
        mask: buffer.info[0].mask,
        ..GlyphInfo::default()
    };
    let mut scratch = buffer.scratch_flags;
    dotted_circle.init_unicode_props(&mut scratch);
    buffer.scratch_flags = scratch;

    buffer.clear_output();
    buffer.idx = 0;
    buffer.output_info(dotted_circle);
    buffer.sync();
}

/// Merge each grapheme into one cluster under the grapheme cluster level.
fn form_clusters(buffer: &mut Buffer) {
    if !buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_NON_ASCII)
    {
        return;
    }
    if buffer.cluster_level() != crate::buffer::ClusterLevel::MonotoneGraphemes {
        return;
    }

    let len = buffer.len();
    let mut start = 0;
    for i in 1..=len {
        if i == len || !buffer.info[i].is_continuation() {
            buffer.merge_clusters(start, i);
            start = i;
        }
    }
}

/// Reverse the buffer when its direction is not the script's native one, so
/// shaping always sees text in native order.
fn ensure_native_direction(buffer: &mut Buffer) {
    let direction = buffer.props.direction;
    let horiz_dir = buffer
        .props
        .script
        .map(script_horizontal_direction)
        .unwrap_or(Direction::LeftToRight);

    let flip = (direction.is_horizontal() && direction != horiz_dir)
        || (direction.is_vertical() && direction != Direction::TopToBottom);
    if flip {
        buffer.reverse_clusters();
        buffer.props.direction = buffer.props.direction.reverse();
    }
}

fn substitute(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    // Mirror brackets for right-to-left segments. Characters with no
    // mirrored counterpart take the rtlm feature so the font may provide
    // one.
    if buffer.props.direction == Direction::RightToLeft {
        for info in &mut buffer.info {
            if let Some(c) = char::from_u32(info.codepoint) {
                match unicode::mirror_char(c) {
                    Some(mirrored) if mirrored != c => info.codepoint = mirrored as u32,
                    _ => info.mask |= plan.rtlm_mask,
                }
            }
        }
    }

    crate::normalize::normalize(plan, face, buffer);

    setup_masks(plan, face, buffer);

    map_glyphs(plan, face, buffer);

    if plan.apply_morx {
        if let Some(morx) = plan.tables.morx.as_ref() {
            crate::aat::apply_morx(morx, &plan.aat_map, buffer);
        }
    } else {
        gsub::substitute(plan, face, buffer);
    }
}

fn setup_masks(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    setup_masks_fraction(plan, buffer);

    if let Some(func) = plan.shaper.setup_masks {
        func(plan, face, buffer);
    }

    for feature in &plan.user_features {
        if !feature.is_global() {
            let (mask, shift) = plan.ot_map.get_mask(feature.tag);
            buffer.set_masks(feature.value << shift, mask, feature.start, feature.end);
        }
    }
}

/// Automatic fractions: digits around U+2044 FRACTION SLASH take the
/// numerator and denominator features.
fn setup_masks_fraction(plan: &ShapePlan, buffer: &mut Buffer) {
    if !buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_NON_ASCII)
        || !plan.has_frac
    {
        return;
    }

    let len = buffer.len();
    let mut i = 0;
    while i < len {
        if buffer.info[i].codepoint != 0x2044 {
            i += 1;
            continue;
        }

        let mut start = i;
        while start > 0
            && buffer.info[start - 1].general_category() == GeneralCategory::DecimalNumber
        {
            start -= 1;
        }
        let mut end = i + 1;
        while end < len
            && buffer.info[end].general_category() == GeneralCategory::DecimalNumber
        {
            end += 1;
        }

        buffer.unsafe_to_break(start, end);
        for info in &mut buffer.info[start..i] {
            info.mask |= plan.numr_mask | plan.frac_mask;
        }
        buffer.info[i].mask |= plan.frac_mask;
        for info in &mut buffer.info[i + 1..end] {
            info.mask |= plan.frac_mask | plan.dnom_mask;
        }

        i = end;
    }
}

/// Promote the cached nominal glyphs to be the buffer content, and work out
/// each glyph's class.
fn map_glyphs(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let gdef = plan.tables.gdef.as_ref();
    for info in &mut buffer.info {
        info.codepoint = info.glyph_index;
        info.lig_props = 0;
        info.glyph_props = if plan.fallback_glyph_classes {
            gdef::fallback_glyph_props(info.general_category())
        } else {
            gdef::glyph_props(gdef, info.codepoint as u16)
        };
    }
}

fn position(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    buffer.clear_positions();

    position_default(face, buffer);

    if buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_SPACE_FALLBACK)
    {
        fallback::adjust_spaces(face, buffer);
    }

    if plan.zero_marks
        && matches!(
            plan.shaper.zero_width_marks,
            ZeroWidthMarks::ByGdefEarly | ZeroWidthMarks::ByUnicodeEarly
        )
    {
        zero_mark_widths(
            buffer,
            plan.shaper.zero_width_marks,
            plan.adjust_mark_positioning_when_zeroing,
        );
    }

    if plan.apply_gpos {
        gpos::position(plan, face, buffer);
    } else if plan.apply_kern {
        if let Some(kern) = plan.tables.kern.as_ref() {
            kern.apply(plan.kern_mask, buffer);
        }
    }
    if plan.apply_kerx {
        if let Some(kerx) = plan.tables.kerx.as_ref() {
            kerx.apply(plan.kern_mask, buffer);
        }
    }

    if plan.zero_marks
        && matches!(
            plan.shaper.zero_width_marks,
            ZeroWidthMarks::ByGdefLate
                | ZeroWidthMarks::ByUnicodeLate
                | ZeroWidthMarks::Advances
        )
    {
        zero_mark_widths(
            buffer,
            plan.shaper.zero_width_marks,
            plan.adjust_mark_positioning_when_zeroing,
        );
    }

    if plan.fallback_mark_positioning {
        fallback::position_marks(plan, face, buffer);
    }

    gpos::position_finish_offsets(buffer);

    if plan.apply_trak {
        if let Some(trak) = plan.tables.trak.as_ref() {
            trak.apply(face, buffer);
        }
    }

    if buffer.props.direction.is_backward() {
        buffer.reverse();
    }
}

/// Advances from the face metrics; offsets start at zero.
fn position_default(face: &dyn Face, buffer: &mut Buffer) {
    let horizontal = buffer.props.direction.is_horizontal();
    for (info, pos) in buffer.info.iter().zip(buffer.pos.iter_mut()) {
        let glyph = info.codepoint as u16;
        if horizontal {
            pos.x_advance = face.advance_h(glyph);
        } else {
            // Vertical advances run downward; origin sits at the horizontal
            // center.
            pos.y_advance = -face.advance_v(glyph);
            pos.x_offset = -face.advance_h(glyph) / 2;
        }
    }
}

fn zero_mark_widths(buffer: &mut Buffer, mode: ZeroWidthMarks, adjust_offsets: bool) {
    let by_unicode = matches!(
        mode,
        ZeroWidthMarks::ByUnicodeEarly | ZeroWidthMarks::ByUnicodeLate
    );
    let advances_only = mode == ZeroWidthMarks::Advances;

    for (info, pos) in buffer.info.iter().zip(buffer.pos.iter_mut()) {
        let is_mark = if by_unicode || advances_only {
            info.is_unicode_mark()
        } else {
            info.is_mark()
        };
        if !is_mark {
            continue;
        }
        if adjust_offsets && !advances_only {
            pos.x_offset -= pos.x_advance;
            pos.y_offset -= pos.y_advance;
        }
        pos.x_advance = 0;
        pos.y_advance = 0;
    }
}

fn hide_default_ignorables(face: &dyn Face, buffer: &mut Buffer) {
    if !buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_DEFAULT_IGNORABLES)
        || buffer
            .flags
            .contains(BufferFlags::PRESERVE_DEFAULT_IGNORABLES)
    {
        return;
    }

    if buffer
        .flags
        .contains(BufferFlags::REMOVE_DEFAULT_IGNORABLES)
    {
        buffer.delete_glyphs_inplace(|info| !info.is_default_ignorable());
        return;
    }

    // Substitute an invisible glyph and zero the advance; fall back to the
    // space glyph, and to deletion when the font has neither.
    let invisible = buffer
        .invisible_glyph()
        .or_else(|| face.glyph_index(' ' as u32, None).map(u32::from));
    match invisible {
        Some(invisible) => {
            for (info, pos) in buffer.info.iter_mut().zip(buffer.pos.iter_mut()) {
                if info.is_default_ignorable() {
                    info.codepoint = invisible;
                    pos.x_advance = 0;
                    pos.y_advance = 0;
                    pos.x_offset = 0;
                    pos.y_offset = 0;
                }
            }
        }
        None => buffer.delete_glyphs_inplace(|info| !info.is_default_ignorable()),
    }
}

/// Make `UNSAFE_TO_BREAK` uniform across every cluster that touches it.
fn propagate_unsafe_to_break(buffer: &mut Buffer) {
    if !buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_UNSAFE_TO_BREAK)
    {
        return;
    }

    let len = buffer.len();
    let mut start = 0;
    while start < len {
        let end = buffer.next_cluster(start);
        if buffer.info[start..end]
            .iter()
            .any(|info| info.mask & crate::buffer::UNSAFE_TO_BREAK != 0)
        {
            for info in &mut buffer.info[start..end] {
                info.mask |= crate::buffer::UNSAFE_TO_BREAK;
            }
        }
        start = end;
    }
}
