//! Shaping for Arabic-script text.
//!
//! Joining states are computed with a state machine over the Unicode
//! joining types, selecting one of the `isol`/`fina`/`fin2`/`fin3`/`medi`/
//! `med2`/`init` features per letter. Mark reordering follows AMTRA
//! (<https://www.unicode.org/reports/tr53/>).

use unicode_joining_type::{get_joining_type, JoiningType};
use unicode_script::Script;

use crate::buffer::{Buffer, BufferFlags, BufferScratchFlags, GlyphInfo};
use crate::face::Face;
use crate::normalize::NormalizationMode;
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode::GeneralCategory;

use super::{ComplexShaper, ZeroWidthMarks};

pub(crate) static ARABIC_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: None,
    create_data: Some(data_create),
    preprocess_text: None,
    postprocess_glyphs: Some(postprocess_glyphs),
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: Some(reorder_marks),
    zero_width_marks: ZeroWidthMarks::ByGdefLate,
    fallback_position: true,
};

const ARABIC_HAS_STCH: BufferScratchFlags = BufferScratchFlags::COMPLEX0;

const ARABIC_FEATURES: &[u32] = &[
    tag::ISOL,
    tag::FINA,
    tag::FIN2,
    tag::FIN3,
    tag::MEDI,
    tag::MED2,
    tag::INIT,
];

fn feature_is_syriac(feature_tag: u32) -> bool {
    matches!(feature_tag.to_be_bytes()[3], b'2' | b'3')
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Debug)]
enum Action {
    Isol = 0,
    Fina = 1,
    Fin2 = 2,
    Fin3 = 3,
    Medi = 4,
    Med2 = 5,
    Init = 6,
    None = 7,

    // The same byte doubles as the stretch marker once `stch` has run.
    StretchingFixed = 8,
    StretchingRepeating = 9,
}

impl Action {
    fn is_stch(self) -> bool {
        matches!(self, Action::StretchingFixed | Action::StretchingRepeating)
    }

    fn from_u8(n: u8) -> Action {
        match n {
            0 => Action::Isol,
            1 => Action::Fina,
            2 => Action::Fin2,
            3 => Action::Fin3,
            4 => Action::Medi,
            5 => Action::Med2,
            6 => Action::Init,
            8 => Action::StretchingFixed,
            9 => Action::StretchingRepeating,
            _ => Action::None,
        }
    }
}

/// Columns: joining type U, L, R, D, join-group ALAPH, join-group DALATH RISH.
/// Rows: states. Entries: (prev action, current action, next state).
#[rustfmt::skip]
const STATE_TABLE: &[[(Action, Action, u8); 6]] = &[
    // State 0: prev was U, not willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::None, Action::Isol, 1),
        (Action::None, Action::Isol, 2), (Action::None, Action::Isol, 1), (Action::None, Action::Isol, 6),
    ],
    // State 1: prev was R or ISOL ALAPH, not willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::None, Action::Isol, 1),
        (Action::None, Action::Isol, 2), (Action::None, Action::Fin2, 5), (Action::None, Action::Isol, 6),
    ],
    // State 2: prev was D/L in ISOL form, willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::Init, Action::Fina, 1),
        (Action::Init, Action::Fina, 3), (Action::Init, Action::Fina, 4), (Action::Init, Action::Fina, 6),
    ],
    // State 3: prev was D in FINA form, willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::Medi, Action::Fina, 1),
        (Action::Medi, Action::Fina, 3), (Action::Medi, Action::Fina, 4), (Action::Medi, Action::Fina, 6),
    ],
    // State 4: prev was FINA ALAPH, not willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::Med2, Action::Isol, 1),
        (Action::Med2, Action::Isol, 2), (Action::Med2, Action::Fin2, 5), (Action::Med2, Action::Isol, 6),
    ],
    // State 5: prev was FIN2/FIN3 ALAPH, not willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::Isol, Action::Isol, 1),
        (Action::Isol, Action::Isol, 2), (Action::Isol, Action::Fin2, 5), (Action::Isol, Action::Isol, 6),
    ],
    // State 6: prev was DALATH/RISH, not willing to join.
    [
        (Action::None, Action::None, 0), (Action::None, Action::Isol, 2), (Action::None, Action::Isol, 1),
        (Action::None, Action::Isol, 2), (Action::None, Action::Fin3, 5), (Action::None, Action::Isol, 6),
    ],
];

/// Joining classes in state-table column order.
#[derive(Clone, Copy, PartialEq)]
enum JoiningClass {
    U = 0,
    L = 1,
    R = 2,
    D = 3,
    GroupAlaph = 4,
    GroupDalathRish = 5,
    T = 7,
}

fn joining_class(c: char, gc: GeneralCategory) -> JoiningClass {
    match c {
        // Syriac Alaph and Dalath/Rish/dotless Dalath-Rish have bespoke
        // joining behaviour.
        '\u{0710}' => return JoiningClass::GroupAlaph,
        '\u{0715}' | '\u{0716}' | '\u{072A}' | '\u{072F}' => {
            return JoiningClass::GroupDalathRish
        }
        _ => {}
    }
    match get_joining_type(c) {
        JoiningType::NonJoining => JoiningClass::U,
        JoiningType::LeftJoining => JoiningClass::L,
        JoiningType::RightJoining => JoiningClass::R,
        JoiningType::DualJoining | JoiningType::JoinCausing => JoiningClass::D,
        JoiningType::Transparent => JoiningClass::T,
        // With no joining data, format characters and marks are transparent.
        _ => {
            if matches!(
                gc,
                GeneralCategory::NonspacingMark
                    | GeneralCategory::EnclosingMark
                    | GeneralCategory::Format
            ) {
                JoiningClass::T
            } else {
                JoiningClass::U
            }
        }
    }
}

pub(crate) struct ArabicShapePlan {
    /// One mask per `ARABIC_FEATURES` entry plus the trailing NONE slot,
    /// which conveniently holds zero.
    mask_array: [u32; ARABIC_FEATURES.len() + 1],
    has_stch: bool,
}

fn collect_features(planner: &mut ShapePlanner<'_>) {
    // Features apply in spec order, with pauses in between most. The pause
    // between init/medi/... and rlig is load-bearing; so is the one after
    // calt.

    planner
        .ot_map
        .enable_feature(tag::STCH, FeatureFlags::empty(), 1);
    planner.ot_map.add_gsub_pause(Some(record_stch));

    planner
        .ot_map
        .enable_feature(tag::CCMP, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::LOCL, FeatureFlags::empty(), 1);
    planner.ot_map.add_gsub_pause(None);

    let is_arabic = planner.props.script == Some(Script::Arabic);
    for &feature in ARABIC_FEATURES {
        let has_fallback = is_arabic && !feature_is_syriac(feature);
        let flags = if has_fallback {
            FeatureFlags::HAS_FALLBACK
        } else {
            FeatureFlags::empty()
        };
        planner.ot_map.add_feature(feature, flags, 1);
        planner.ot_map.add_gsub_pause(None);
    }

    // Unicode says a ZWNJ means "don't ligate". In Arabic script a ZWJ
    // should also mean that, so the ligating features run with manual ZWJ.
    planner.ot_map.enable_feature(
        tag::RLIG,
        FeatureFlags::MANUAL_ZWJ | FeatureFlags::HAS_FALLBACK,
        1,
    );
    planner
        .ot_map
        .enable_feature(tag::RCLT, FeatureFlags::MANUAL_ZWJ, 1);
    planner
        .ot_map
        .enable_feature(tag::CALT, FeatureFlags::MANUAL_ZWJ, 1);
    planner.ot_map.add_gsub_pause(None);

    // The spec includes 'cswh', but modern Windows leaves it off by default
    // and so do we.
    planner
        .ot_map
        .enable_feature(tag::MSET, FeatureFlags::empty(), 1);
}

pub(crate) fn data_create(plan: &ShapePlan) -> ShaperData {
    ShaperData::Arabic(build_plan(plan))
}

pub(crate) fn build_plan(plan: &ShapePlan) -> ArabicShapePlan {
    let mut arabic_plan = ArabicShapePlan {
        mask_array: [0; ARABIC_FEATURES.len() + 1],
        has_stch: plan.ot_map.get_1_mask(tag::STCH) != 0,
    };
    for (i, &feature) in ARABIC_FEATURES.iter().enumerate() {
        arabic_plan.mask_array[i] = plan.ot_map.get_1_mask(feature);
    }
    arabic_plan
}

fn setup_masks(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Arabic(arabic_plan)) = plan.data.as_ref() else {
        return;
    };
    setup_masks_inner(arabic_plan, buffer);
}

pub(crate) fn setup_masks_inner(plan: &ArabicShapePlan, buffer: &mut Buffer) {
    arabic_joining(buffer);
    for info in &mut buffer.info {
        info.mask |= plan.mask_array[usize::from(info.complex_aux)];
    }
}

fn arabic_joining(buffer: &mut Buffer) {
    let mut prev: Option<usize> = None;
    let mut state = 0usize;

    // A run that is not the beginning of text joins onto whatever came
    // before it.
    if !buffer.flags.contains(BufferFlags::BEGINNING_OF_TEXT) {
        for i in 0..buffer.context_len[0] {
            let c = buffer.context[0][i];
            let class = joining_class(c, crate::unicode::general_category(c));
            if class == JoiningClass::T {
                continue;
            }
            state = usize::from(STATE_TABLE[state][class as usize].2);
            break;
        }
    }

    for i in 0..buffer.len() {
        let this = &buffer.info[i];
        let class = joining_class(this.as_char(), this.general_category());
        if class == JoiningClass::T {
            buffer.info[i].complex_aux = Action::None as u8;
            continue;
        }

        let entry = &STATE_TABLE[state][class as usize];
        if entry.0 != Action::None {
            if let Some(prev) = prev {
                buffer.info[prev].complex_aux = entry.0 as u8;
                buffer.unsafe_to_break(prev, i + 1);
            }
        }

        buffer.info[i].complex_aux = entry.1 as u8;
        prev = Some(i);
        state = usize::from(entry.2);
    }

    if !buffer.flags.contains(BufferFlags::END_OF_TEXT) {
        for i in 0..buffer.context_len[1] {
            let c = buffer.context[1][i];
            let class = joining_class(c, crate::unicode::general_category(c));
            if class == JoiningClass::T {
                continue;
            }
            let entry = &STATE_TABLE[state][class as usize];
            if entry.0 != Action::None {
                if let Some(prev) = prev {
                    buffer.info[prev].complex_aux = entry.0 as u8;
                }
            }
            break;
        }
    }
}

/// After `stch` has run, anything it multiplied is a stretch tile. Record
/// which kind so the postprocessing pass can justify the subtended marks.
fn record_stch(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Arabic(arabic_plan)) = plan.data.as_ref() else {
        return;
    };
    if !arabic_plan.has_stch {
        return;
    }

    let mut has_stch = false;
    for info in &mut buffer.info {
        if info.is_multiplied() {
            info.complex_aux = if info.lig_comp() % 2 != 0 {
                Action::StretchingRepeating as u8
            } else {
                Action::StretchingFixed as u8
            };
            has_stch = true;
        }
    }
    if has_stch {
        buffer.scratch_flags |= ARABIC_HAS_STCH;
    }
}

fn postprocess_glyphs(_plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    apply_stch(face, buffer)
}

/// Stretch the `stch` tiles to fill the width of the preceding word,
/// repeating the repeating tiles as needed. Two passes: measure, then cut.
fn apply_stch(face: &dyn Face, buffer: &mut Buffer) {
    if !buffer.scratch_flags.contains(ARABIC_HAS_STCH) {
        return;
    }

    const MEASURE: usize = 0;
    const CUT: usize = 1;
    let mut extra_glyphs_needed: usize = 0;

    for step in [MEASURE, CUT] {
        let old_len = buffer.len();
        // Grow up front so the cut pass can write into the tail while it
        // still reads the unmoved glyphs at the front.
        if step == CUT && !buffer.set_len(old_len + extra_glyphs_needed) {
            return;
        }
        let new_len = old_len + extra_glyphs_needed;
        let mut i = old_len;
        let mut j = new_len;
        while i != 0 {
            let action = Action::from_u8(buffer.info[i - 1].complex_aux);
            if !action.is_stch() {
                if step == CUT {
                    j -= 1;
                    buffer.info[j] = buffer.info[i - 1];
                    buffer.pos[j] = buffer.pos[i - 1];
                }
                i -= 1;
                continue;
            }

            // Measure the tiles.
            let mut w_fixed = 0i32;
            let mut w_repeating = 0i32;
            let mut n_repeating = 0i32;
            let end = i;
            while i != 0 && Action::from_u8(buffer.info[i - 1].complex_aux).is_stch() {
                i -= 1;
                let width = face.advance_h(buffer.info[i].codepoint as u16);
                if Action::from_u8(buffer.info[i].complex_aux) == Action::StretchingFixed {
                    w_fixed += width;
                } else {
                    w_repeating += width;
                    n_repeating += 1;
                }
            }

            // Measure the word the tiles subtend.
            let start = i;
            let mut context = i;
            let mut w_total = 0i32;
            while context != 0
                && !Action::from_u8(buffer.info[context - 1].complex_aux).is_stch()
                && (buffer.info[context - 1].is_default_ignorable()
                    || is_word_category(buffer.info[context - 1].general_category()))
            {
                context -= 1;
                w_total += buffer.pos[context].x_advance;
            }

            i += 1; // Don't touch i again.

            let mut n_copies: i32 = 0;
            let w_remaining = w_total - w_fixed;
            if w_remaining > w_repeating && w_repeating > 0 {
                n_copies = w_remaining / w_repeating - 1;
            }

            // An extra repeat squeezed in beats a shortfall.
            let mut extra_repeat_overlap = 0;
            let shortfall = w_remaining - w_repeating * (n_copies + 1);
            if shortfall > 0 && n_repeating > 0 {
                n_copies += 1;
                let excess = (n_copies + 1) * w_repeating - w_remaining;
                if excess > 0 {
                    extra_repeat_overlap = excess / (n_copies * n_repeating);
                }
            }

            if step == MEASURE {
                extra_glyphs_needed += (n_copies * n_repeating) as usize;
            } else {
                buffer.unsafe_to_break(context, end);
                let mut x_offset = 0i32;
                for k in (start + 1..=end).rev() {
                    let width = face.advance_h(buffer.info[k - 1].codepoint as u16);

                    let mut repeat = 1;
                    if Action::from_u8(buffer.info[k - 1].complex_aux)
                        == Action::StretchingRepeating
                    {
                        repeat += n_copies;
                    }

                    for n in 0..repeat {
                        x_offset -= width;
                        if n > 0 {
                            x_offset += extra_repeat_overlap;
                        }
                        buffer.pos[k - 1].x_offset = x_offset;

                        // Append a copy.
                        j -= 1;
                        buffer.info[j] = buffer.info[k - 1];
                        buffer.pos[j] = buffer.pos[k - 1];
                    }
                }
            }
            i -= 1;
        }
    }
}

fn is_word_category(gc: GeneralCategory) -> bool {
    matches!(
        gc,
        GeneralCategory::Unassigned
            | GeneralCategory::PrivateUse
            | GeneralCategory::ModifierLetter
            | GeneralCategory::OtherLetter
            | GeneralCategory::SpacingMark
            | GeneralCategory::EnclosingMark
            | GeneralCategory::NonspacingMark
            | GeneralCategory::DecimalNumber
            | GeneralCategory::LetterNumber
            | GeneralCategory::OtherNumber
            | GeneralCategory::CurrencySymbol
            | GeneralCategory::ModifierSymbol
            | GeneralCategory::MathSymbol
            | GeneralCategory::OtherSymbol
    )
}

// Modifier combining marks, per https://www.unicode.org/reports/tr53/.
const MODIFIER_COMBINING_MARKS: &[u32] = &[
    0x0654, // HAMZA ABOVE
    0x0655, // HAMZA BELOW
    0x0658, // MARK NOON GHUNNA
    0x06DC, // SMALL HIGH SEEN
    0x06E3, // SMALL LOW SEEN
    0x06E7, // SMALL HIGH YEH
    0x06E8, // SMALL HIGH NOON
    0x08D3, // SMALL LOW WAW
    0x08F3, // SMALL HIGH WAW
];

fn reorder_marks(_plan: &ShapePlan, buffer: &mut Buffer, mut start: usize, end: usize) {
    let mut i = start;
    for cc in [220u8, 230] {
        while i < end && buffer.info[i].modified_combining_class() < cc {
            i += 1;
        }
        if i == end {
            break;
        }
        if buffer.info[i].modified_combining_class() > cc {
            continue;
        }

        let mut j = i;
        while j < end
            && buffer.info[j].modified_combining_class() == cc
            && MODIFIER_COMBINING_MARKS.contains(&buffer.info[j].codepoint)
        {
            j += 1;
        }
        if i == j {
            continue;
        }

        // Move the MCM run to the front of the class group.
        buffer.merge_clusters(start, j);
        let mut temp = [GlyphInfo::default(); crate::normalize::MAX_COMBINING_MARKS];
        debug_assert!(j - i <= crate::normalize::MAX_COMBINING_MARKS);
        temp[..j - i].copy_from_slice(&buffer.info[i..j]);
        buffer.info.copy_within(start..i, start + j - i);
        buffer.info[start..start + j - i].copy_from_slice(&temp[..j - i]);

        // Renumber the moved marks so the sequence stays sorted; 22 and 26
        // sit below all Arabic classes and fold back to 220/230 during
        // fallback mark positioning.
        let new_start = start + j - i;
        let new_cc = if cc == 220 { 22 } else { 26 };
        while start < new_start {
            buffer.info[start].set_modified_combining_class(new_cc);
            start += 1;
        }

        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joining_actions(text: &str) -> Vec<Action> {
        let mut buffer = Buffer::new();
        buffer.add_str(text);
        let mut scratch = BufferScratchFlags::default();
        for info in &mut buffer.info {
            info.init_unicode_props(&mut scratch);
        }
        arabic_joining(&mut buffer);
        buffer
            .info
            .iter()
            .map(|info| Action::from_u8(info.complex_aux))
            .collect()
    }

    #[test]
    fn test_isolated_letter() {
        assert_eq!(joining_actions("\u{0628}"), vec![Action::Isol]);
    }

    #[test]
    fn test_two_dual_joining_letters() {
        // BEH + BEH: init + fina.
        assert_eq!(
            joining_actions("\u{0628}\u{0628}"),
            vec![Action::Init, Action::Fina]
        );
    }

    #[test]
    fn test_three_letters_medial() {
        assert_eq!(
            joining_actions("\u{0628}\u{0628}\u{0628}"),
            vec![Action::Init, Action::Medi, Action::Fina]
        );
    }

    #[test]
    fn test_lam_alef() {
        // LAM is dual-joining, ALEF right-joining: init + fina.
        assert_eq!(
            joining_actions("\u{0644}\u{0627}"),
            vec![Action::Init, Action::Fina]
        );
    }

    #[test]
    fn test_transparent_mark_does_not_break_joining() {
        // BEH + FATHA + BEH still joins.
        assert_eq!(
            joining_actions("\u{0628}\u{064E}\u{0628}"),
            vec![Action::Init, Action::None, Action::Fina]
        );
    }
}
