//! Shaping for Hangul.
//!
//! Hangul syllables come in two shapes, LV and LVT, and the text may carry
//! them precomposed, partially composed, or as individual jamo. Whichever
//! form arrives, the shaper converts to the form the font can actually
//! render: the whole syllable precomposed when the font has it, otherwise
//! fully decomposed jamo carrying the `ljmo`/`vjmo`/`tjmo` features. A
//! trailing tone mark is reordered in front of its syllable unless it is
//! designed to overstrike.

use crate::buffer::{Buffer, BufferFlags, ClusterLevel};
use crate::face::Face;
use crate::normalize::NormalizationMode;
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode::DOTTED_CIRCLE;

use super::{ComplexShaper, ZeroWidthMarks};

pub(crate) static HANGUL_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(data_create),
    preprocess_text: Some(preprocess_text),
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::None,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::None,
    fallback_position: false,
};

const LJMO: u8 = 1;
const VJMO: u8 = 2;
const TJMO: u8 = 3;

fn collect_features(planner: &mut ShapePlanner<'_>) {
    planner.ot_map.add_feature(tag::LJMO, FeatureFlags::empty(), 1);
    planner.ot_map.add_feature(tag::VJMO, FeatureFlags::empty(), 1);
    planner.ot_map.add_feature(tag::TJMO, FeatureFlags::empty(), 1);
}

fn override_features(planner: &mut ShapePlanner<'_>) {
    // Some fonts hang every jamo lookup off calt, which Uniscribe never
    // applies for Hangul. Neither do we.
    planner.ot_map.disable_feature(tag::CALT);
}

pub(crate) struct HangulShapePlan {
    mask_array: [u32; 4],
}

fn data_create(plan: &ShapePlan) -> ShaperData {
    ShaperData::Hangul(HangulShapePlan {
        mask_array: [
            0,
            plan.ot_map.get_1_mask(tag::LJMO),
            plan.ot_map.get_1_mask(tag::VJMO),
            plan.ot_map.get_1_mask(tag::TJMO),
        ],
    })
}

const L_BASE: u32 = 0x1100;
const V_BASE: u32 = 0x1161;
const T_BASE: u32 = 0x11A7;
const L_COUNT: u32 = 19;
const V_COUNT: u32 = 21;
const T_COUNT: u32 = 28;
const N_COUNT: u32 = V_COUNT * T_COUNT;
const S_COUNT: u32 = L_COUNT * N_COUNT;
const S_BASE: u32 = 0xAC00;

fn is_combining_l(u: u32) -> bool {
    (L_BASE..L_BASE + L_COUNT).contains(&u)
}

fn is_combining_v(u: u32) -> bool {
    (V_BASE..V_BASE + V_COUNT).contains(&u)
}

fn is_combining_t(u: u32) -> bool {
    (T_BASE + 1..T_BASE + T_COUNT).contains(&u)
}

fn is_combined_s(u: u32) -> bool {
    (S_BASE..S_BASE + S_COUNT).contains(&u)
}

fn is_l(u: u32) -> bool {
    (0x1100..=0x115F).contains(&u) || (0xA960..=0xA97C).contains(&u)
}

fn is_v(u: u32) -> bool {
    (0x1160..=0x11A7).contains(&u) || (0xD7B0..=0xD7C6).contains(&u)
}

fn is_t(u: u32) -> bool {
    (0x11A8..=0x11FF).contains(&u) || (0xD7CB..=0xD7FB).contains(&u)
}

fn is_hangul_tone(u: u32) -> bool {
    (0x302E..=0x302F).contains(&u)
}

fn has_glyph(face: &dyn Face, u: u32) -> bool {
    face.glyph_index(u, None).is_some()
}

fn is_zero_width_char(face: &dyn Face, u: u32) -> bool {
    match face.glyph_index(u, None) {
        Some(glyph) => face.advance_h(glyph) == 0,
        None => false,
    }
}

fn preprocess_text(_plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    buffer.clear_output();
    // Extent of the most recently seen syllable on the out side; valid only
    // while start < end.
    let mut start = 0;
    let mut end = 0;
    buffer.idx = 0;

    while buffer.idx < buffer.len() && buffer.allocation_successful() {
        let u = buffer.cur(0).codepoint;

        if is_hangul_tone(u) {
            if start < end && end == buffer.out_len() {
                // The tone mark follows a complete syllable; move it in
                // front unless it is zero width and meant to overstrike.
                buffer.unsafe_to_break_from_outbuffer(start, buffer.idx);
                buffer.next_glyph();
                if !is_zero_width_char(face, u) {
                    buffer.merge_out_clusters(start, end + 1);
                    let out = buffer.out_info_mut();
                    let tone = out[end];
                    out.copy_within(start..end, start + 1);
                    out[start] = tone;
                }
            } else if !buffer
                .flags
                .contains(BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
                && has_glyph(face, DOTTED_CIRCLE)
            {
                // No syllable to attach to; give the tone mark a dotted
                // circle base.
                let chars = if !is_zero_width_char(face, u) {
                    [u, DOTTED_CIRCLE]
                } else {
                    [DOTTED_CIRCLE, u]
                };
                buffer.replace_glyphs(1, &chars);
            } else {
                buffer.next_glyph();
            }

            start = buffer.out_len();
            end = buffer.out_len();
            continue;
        }

        start = buffer.out_len();

        if is_l(u) && buffer.idx + 1 < buffer.len() {
            let l = u;
            let v = buffer.cur(1).codepoint;
            if is_v(v) {
                // <L,V> or <L,V,T>.
                let mut t = 0;
                let mut tindex = 0;
                if buffer.idx + 2 < buffer.len() {
                    t = buffer.cur(2).codepoint;
                    if is_t(t) {
                        tindex = t - T_BASE;
                    } else {
                        t = 0;
                    }
                }

                let offset = if t != 0 { 3 } else { 2 };
                buffer.unsafe_to_break(buffer.idx, buffer.idx + offset);

                if is_combining_l(l) && is_combining_v(v) && (t == 0 || is_combining_t(t)) {
                    let s = S_BASE + (l - L_BASE) * N_COUNT + (v - V_BASE) * T_COUNT + tindex;
                    if has_glyph(face, s) {
                        let n = if t != 0 { 3 } else { 2 };
                        buffer.replace_glyphs(n, &[s]);
                        end = start + 1;
                        continue;
                    }
                }

                // Either an Old Hangul syllable with no precomposed code
                // point, or the font lacks the precomposed glyph. Keep the
                // jamo and mark them for the jamo features.
                buffer.cur_mut(0).complex_aux = LJMO;
                buffer.next_glyph();
                buffer.cur_mut(0).complex_aux = VJMO;
                buffer.next_glyph();
                if t != 0 {
                    buffer.cur_mut(0).complex_aux = TJMO;
                    buffer.next_glyph();
                    end = start + 3;
                } else {
                    end = start + 2;
                }

                if buffer.cluster_level == ClusterLevel::MonotoneGraphemes {
                    buffer.merge_out_clusters(start, end);
                }
                continue;
            }
        } else if is_combined_s(u) {
            // <LV>, <LVT>, or <LV,T>.
            let s = u;
            let s_supported = has_glyph(face, s);

            let lindex = (s - S_BASE) / N_COUNT;
            let nindex = (s - S_BASE) % N_COUNT;
            let vindex = nindex / T_COUNT;
            let tindex = nindex % T_COUNT;

            if tindex == 0
                && buffer.idx + 1 < buffer.len()
                && is_combining_t(buffer.cur(1).codepoint)
            {
                // <LV,T>: try to combine into <LVT>.
                let new_tindex = buffer.cur(1).codepoint - T_BASE;
                let new_s = s + new_tindex;
                if has_glyph(face, new_s) {
                    buffer.replace_glyphs(2, &[new_s]);
                    end = start + 1;
                    continue;
                }
                buffer.unsafe_to_break(buffer.idx, buffer.idx + 2);
            }

            // Decompose if the font lacks the precomposed form, or for a
            // non-combining T right after an LV.
            if !s_supported
                || (tindex == 0
                    && buffer.idx + 1 < buffer.len()
                    && is_t(buffer.cur(1).codepoint))
            {
                let decomposed = [L_BASE + lindex, V_BASE + vindex, T_BASE + tindex];
                if has_glyph(face, decomposed[0])
                    && has_glyph(face, decomposed[1])
                    && (tindex == 0 || has_glyph(face, decomposed[2]))
                {
                    let mut s_len = if tindex != 0 { 3 } else { 2 };
                    buffer.replace_glyphs(1, &decomposed[..s_len]);

                    // An LV decomposed because of a following non-combining
                    // T wants that T inside the syllable.
                    if s_supported && tindex == 0 {
                        buffer.next_glyph();
                        s_len += 1;
                    }

                    end = start + s_len;
                    let out = buffer.out_info_mut();
                    out[start].complex_aux = LJMO;
                    out[start + 1].complex_aux = VJMO;
                    if start + 2 < end {
                        out[start + 2].complex_aux = TJMO;
                    }

                    if buffer.cluster_level == ClusterLevel::MonotoneGraphemes {
                        buffer.merge_out_clusters(start, end);
                    }
                    continue;
                }
            }

            if s_supported {
                end = start + 1;
                buffer.next_glyph();
                continue;
            }
        }

        // Nothing recognizable; leaving end <= start suppresses tone-mark
        // reordering onto this position.
        buffer.next_glyph();
    }

    buffer.sync();
}

fn setup_masks(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Hangul(hangul_plan)) = plan.data.as_ref() else {
        return;
    };
    for info in &mut buffer.info {
        info.mask |= hangul_plan.mask_array[usize::from(info.complex_aux.min(3))];
    }
}
