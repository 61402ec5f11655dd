//! Fallback mark positioning.
//!
//! When the font has no usable `mark`/`mkmk` lookups, marks are placed from
//! their combining classes and the glyph extents: centered over (or under)
//! the base, stacked outward in sequence. Crude next to real anchors, but
//! far better than overstriking.

use crate::buffer::Buffer;
use crate::face::Face;
use crate::plan::ShapePlan;
use crate::unicode::SpaceWidth;

#[derive(Clone, Copy, PartialEq)]
enum VerticalPlacement {
    Above,
    Below,
}

/// Where a combining class renders relative to its base, vertically.
fn mark_placement(mcc: u8) -> Option<VerticalPlacement> {
    match mcc {
        // Attached and detached below classes.
        202 | 218 | 220 | 222 | 233 => Some(VerticalPlacement::Below),
        // Attached and detached above classes.
        214 | 216 | 228 | 230 | 232 | 234 => Some(VerticalPlacement::Above),
        // Arabic vowel classes: kasratan and kasra render below.
        29 | 32 => Some(VerticalPlacement::Below),
        27 | 28 | 30 | 31 | 33 | 34 | 35 => Some(VerticalPlacement::Above),
        // The renumbered MCM classes fold back onto 220/230.
        22 => Some(VerticalPlacement::Below),
        26 => Some(VerticalPlacement::Above),
        // Hebrew points are predominantly below the letter.
        10..=21 | 23..=25 => Some(VerticalPlacement::Below),
        _ => None,
    }
}

/// Position marks against their bases using glyph extents.
pub(crate) fn position_marks(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let _ = plan;
    let len = buffer.len();
    let mut base: Option<usize> = None;
    let mut advance_since_base = 0i32;
    // Stacking offsets accumulate per base so marks pile outward.
    let mut above_height = 0i32;
    let mut below_depth = 0i32;

    for i in 0..len {
        if !buffer.info[i].is_mark() {
            base = Some(i);
            advance_since_base = buffer.pos[i].x_advance;
            above_height = 0;
            below_depth = 0;
            continue;
        }

        let Some(base_idx) = base else {
            continue;
        };
        // Marks that kept an advance are being treated as spacing by the
        // font; leave them alone.
        if buffer.pos[i].x_advance != 0 {
            advance_since_base += buffer.pos[i].x_advance;
            continue;
        }

        let mcc = buffer.info[i].modified_combining_class();
        let Some(placement) = mark_placement(mcc) else {
            continue;
        };

        let base_glyph = buffer.info[base_idx].codepoint as u16;
        let mark_glyph = buffer.info[i].codepoint as u16;
        let (Some(base_extents), Some(mark_extents)) = (
            face.glyph_extents(base_glyph),
            face.glyph_extents(mark_glyph),
        ) else {
            continue;
        };

        // Center the mark horizontally over the base, compensating for the
        // pen having advanced past it.
        let base_center =
            base_extents.x_bearing + base_extents.width / 2;
        let mark_center = mark_extents.x_bearing + mark_extents.width / 2;
        buffer.pos[i].x_offset = base_center - mark_center - advance_since_base;

        // Note: y_bearing is the top edge and heights run downward.
        match placement {
            VerticalPlacement::Above => {
                let base_top = base_extents.y_bearing;
                let mark_bottom = mark_extents.y_bearing + mark_extents.height;
                buffer.pos[i].y_offset = base_top - mark_bottom + above_height;
                above_height += -mark_extents.height;
            }
            VerticalPlacement::Below => {
                let base_bottom = base_extents.y_bearing + base_extents.height;
                let mark_top = mark_extents.y_bearing;
                buffer.pos[i].y_offset = base_bottom - mark_top - below_depth;
                below_depth += -mark_extents.height;
            }
        }
    }
}

/// Synthesize advances for space variants the font had no glyph for; the
/// plain space glyph was substituted during normalization.
pub(crate) fn adjust_spaces(face: &dyn Face, buffer: &mut Buffer) {
    let upem = i32::from(face.units_per_em());
    for (info, pos) in buffer.info.iter().zip(buffer.pos.iter_mut()) {
        let Some(width) = info.space_fallback() else {
            continue;
        };
        match width {
            SpaceWidth::Em => pos.x_advance = upem,
            SpaceWidth::Em2 => pos.x_advance = upem / 2,
            SpaceWidth::Em3 => pos.x_advance = upem / 3,
            SpaceWidth::Em4 => pos.x_advance = upem / 4,
            SpaceWidth::Em6 => pos.x_advance = upem / 6,
            SpaceWidth::Em16 => pos.x_advance = upem / 16,
            SpaceWidth::FourEm18 => pos.x_advance = upem * 4 / 18,
            SpaceWidth::Space => {}
            SpaceWidth::Figure => {
                if let Some(zero) = face.glyph_index('0' as u32, None) {
                    pos.x_advance = face.advance_h(zero);
                }
            }
            SpaceWidth::Punctuation => {
                let punct = face
                    .glyph_index('.' as u32, None)
                    .or_else(|| face.glyph_index(',' as u32, None));
                if let Some(punct) = punct {
                    pos.x_advance = face.advance_h(punct);
                }
            }
            SpaceWidth::Narrow => {
                // A third of an em, tightened further in East Asian
                // contexts; the third is a reasonable blanket choice.
                pos.x_advance = upem / 3;
            }
        }
    }
}
