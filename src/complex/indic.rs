//! Shaping for Indic scripts.
//!
//! Covers Devanagari, Bengali, Gurmukhi, Gujarati, Oriya, Tamil, Telugu,
//! Kannada, Malayalam, and Sinhala through their version 2 (`dev2` family)
//! shaping models: syllable segmentation, base-consonant detection, reph
//! and pre-base matra reordering, and the staged feature schedule from
//! `nukt` through the presentation features.
//!
//! Split vowels are handled upstream: the shaper requests fully decomposed
//! normalization, so two-part matras arrive as their canonical pieces and
//! only the pre-base piece needs to move.

use unicode_script::Script;

use crate::buffer::Buffer;
use crate::face::Face;
use crate::normalize::{NormalizationMode, NormalizeContext};
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode::{self, GeneralCategory};

use super::syllable::*;
use super::{insert_dotted_circles, ComplexShaper, ZeroWidthMarks};

pub(crate) static INDIC_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(data_create),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Decomposed,
    decompose: Some(decompose),
    compose: Some(compose),
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::None,
    fallback_position: false,
};

// Categories, kept in `complex_cat`.
mod cat {
    pub const X: u8 = 0; // other
    pub const C: u8 = 1; // consonant
    pub const V: u8 = 2; // independent vowel
    pub const N: u8 = 3; // nukta
    pub const H: u8 = 4; // virama
    pub const M: u8 = 5; // matra
    pub const SM: u8 = 6; // syllable modifier (bindus, visarga)
    pub const ZWNJ: u8 = 7;
    pub const ZWJ: u8 = 8;
    pub const RA: u8 = 9; // consonant Ra, reph candidate
    pub const DOTTED_CIRCLE: u8 = 10;
    pub const SYMBOL: u8 = 11; // avagraha, om
}

// Positions, kept in `complex_aux`.
mod pos {
    pub const RA_TO_BECOME_REPH: u8 = 1;
    pub const PRE_M: u8 = 2;
    pub const PRE_C: u8 = 3;
    pub const BASE_C: u8 = 4;
    pub const ABOVE_M: u8 = 7;
    pub const BELOW_M: u8 = 8;
    pub const POST_C: u8 = 9;
    pub const POST_M: u8 = 10;
    pub const SMVD: u8 = 11;
    pub const END: u8 = 12;
}

// Syllable types, kept in the low nibble of `syllable`.
mod syllable_type {
    pub const CONSONANT: u8 = 0;
    pub const VOWEL: u8 = 1;
    pub const STANDALONE: u8 = 2;
    pub const BROKEN: u8 = 3;
    pub const NON_INDIC: u8 = 4;
}

const BASIC_FEATURES: &[u32] = &[
    tag::NUKT,
    tag::AKHN,
    tag::RPHF,
    tag::RKRF,
    tag::PREF,
    tag::BLWF,
    tag::ABVF,
    tag::HALF,
    tag::PSTF,
    tag::VATU,
    tag::CJCT,
];

const PRESENTATION_FEATURES: &[u32] = &[
    tag::PRES,
    tag::ABVS,
    tag::BLWS,
    tag::PSTS,
    tag::HALN,
];

fn collect_features(planner: &mut ShapePlanner<'_>) {
    planner
        .ot_map
        .enable_feature(tag::LOCL, FeatureFlags::empty(), 1);
    // The Indic specs do not require ccmp, but everyone enables it anyway.
    planner
        .ot_map
        .enable_feature(tag::CCMP, FeatureFlags::empty(), 1);

    planner.ot_map.add_gsub_pause(Some(initial_reordering));

    for &feature in BASIC_FEATURES {
        planner.ot_map.add_feature(
            feature,
            FeatureFlags::MANUAL_JOINERS | FeatureFlags::PER_SYLLABLE,
            1,
        );
        planner.ot_map.add_gsub_pause(None);
    }

    planner.ot_map.add_gsub_pause(Some(final_reordering));

    for &feature in PRESENTATION_FEATURES {
        planner.ot_map.enable_feature(
            feature,
            FeatureFlags::GLOBAL_MANUAL_JOINERS | FeatureFlags::PER_SYLLABLE,
            1,
        );
    }
}

fn override_features(planner: &mut ShapePlanner<'_>) {
    planner.ot_map.disable_feature(tag::LIGA);
}

pub(crate) struct IndicShapePlan {
    rphf_mask: u32,
    half_mask: u32,
    blwf_mask: u32,
    pstf_mask: u32,
    pref_mask: u32,
    virama: u32,
    ra: u32,
}

fn data_create(plan: &ShapePlan) -> ShaperData {
    let script = plan.props.script.unwrap_or(Script::Devanagari);
    ShaperData::Indic(IndicShapePlan {
        rphf_mask: plan.ot_map.get_1_mask(tag::RPHF),
        half_mask: plan.ot_map.get_1_mask(tag::HALF),
        blwf_mask: plan.ot_map.get_1_mask(tag::BLWF),
        pstf_mask: plan.ot_map.get_1_mask(tag::PSTF),
        pref_mask: plan.ot_map.get_1_mask(tag::PREF),
        virama: script_virama(script),
        ra: script_ra(script),
    })
}

fn script_virama(script: Script) -> u32 {
    match script {
        Script::Devanagari => 0x094D,
        Script::Bengali => 0x09CD,
        Script::Gurmukhi => 0x0A4D,
        Script::Gujarati => 0x0ACD,
        Script::Oriya => 0x0B4D,
        Script::Tamil => 0x0BCD,
        Script::Telugu => 0x0C4D,
        Script::Kannada => 0x0CCD,
        Script::Malayalam => 0x0D4D,
        Script::Sinhala => 0x0DCA,
        _ => 0,
    }
}

fn script_ra(script: Script) -> u32 {
    match script {
        Script::Devanagari => 0x0930,
        Script::Bengali => 0x09B0,
        Script::Gurmukhi => 0x0A30,
        Script::Gujarati => 0x0AB0,
        Script::Oriya => 0x0B30,
        Script::Tamil => 0x0BB0,
        Script::Telugu => 0x0C30,
        Script::Kannada => 0x0CB0,
        Script::Malayalam => 0x0D30,
        Script::Sinhala => 0x0DBB,
        _ => 0,
    }
}

/// Pre-base matras, the ones that visually precede the whole syllable.
fn is_pre_base_matra(script: Script, cp: u32) -> bool {
    match script {
        Script::Devanagari => cp == 0x093F,
        Script::Bengali => matches!(cp, 0x09BF | 0x09C7 | 0x09C8),
        Script::Gurmukhi => cp == 0x0A3F,
        Script::Gujarati => cp == 0x0ABF,
        Script::Oriya => cp == 0x0B47,
        Script::Tamil => matches!(cp, 0x0BC6 | 0x0BC7 | 0x0BC8),
        Script::Malayalam => matches!(cp, 0x0D46 | 0x0D47 | 0x0D48),
        Script::Sinhala => matches!(cp, 0x0DD9 | 0x0DDA | 0x0DDB),
        _ => false,
    }
}

fn matra_position(script: Script, cp: u32, gc: GeneralCategory) -> u8 {
    if is_pre_base_matra(script, cp) {
        return pos::PRE_M;
    }
    // The u/uu/vocalic-r signs sit below the base in every one of these
    // scripts; other nonspacing matras sit above, spacing ones after.
    let rel = cp & 0x7F;
    if gc == GeneralCategory::NonspacingMark {
        if matches!(rel, 0x41..=0x44) && script != Script::Sinhala {
            pos::BELOW_M
        } else if script == Script::Sinhala && matches!(cp, 0x0DD4 | 0x0DD6) {
            pos::BELOW_M
        } else {
            pos::ABOVE_M
        }
    } else {
        pos::POST_M
    }
}

fn categorize_char(plan: &IndicShapePlan, script: Script, cp: u32) -> (u8, u8) {
    if cp == plan.virama && plan.virama != 0 {
        return (cat::H, pos::END);
    }
    if cp == unicode::ZWNJ {
        return (cat::ZWNJ, pos::END);
    }
    if cp == unicode::ZWJ {
        return (cat::ZWJ, pos::END);
    }
    if cp == unicode::DOTTED_CIRCLE {
        return (cat::DOTTED_CIRCLE, pos::BASE_C);
    }

    let Some(c) = char::from_u32(cp) else {
        return (cat::X, pos::END);
    };
    let gc = unicode::general_category(c);
    let rel = cp & 0x7F;

    match gc {
        GeneralCategory::OtherLetter => {
            if cp == plan.ra {
                (cat::RA, pos::BASE_C)
            } else if is_consonant(script, cp) {
                (cat::C, pos::BASE_C)
            } else if matches!(rel, 0x3D | 0x50) {
                // avagraha, om
                (cat::SYMBOL, pos::SMVD)
            } else {
                (cat::V, pos::BASE_C)
            }
        }
        GeneralCategory::NonspacingMark | GeneralCategory::SpacingMark => {
            if is_nukta(script, cp) {
                (cat::N, pos::END)
            } else if is_syllable_modifier(script, cp) {
                (cat::SM, pos::SMVD)
            } else {
                (cat::M, matra_position(script, cp, gc))
            }
        }
        _ => (cat::X, pos::END),
    }
}

fn is_consonant(script: Script, cp: u32) -> bool {
    match script {
        Script::Sinhala => (0x0D9A..=0x0DC6).contains(&cp),
        _ => {
            let rel = cp & 0x7F;
            matches!(rel, 0x15..=0x39 | 0x58..=0x5F | 0x7A..=0x7F)
        }
    }
}

fn is_nukta(script: Script, cp: u32) -> bool {
    match script {
        Script::Devanagari
        | Script::Bengali
        | Script::Gurmukhi
        | Script::Gujarati
        | Script::Oriya => cp & 0x7F == 0x3C,
        Script::Kannada => cp == 0x0CBC,
        _ => false,
    }
}

fn is_syllable_modifier(script: Script, cp: u32) -> bool {
    match script {
        Script::Sinhala => matches!(cp, 0x0D81..=0x0D83),
        _ => matches!(cp & 0x7F, 0x00..=0x03 | 0x51..=0x54),
    }
}

/// The shaper prefers fully decomposed text, but composed nukta forms are
/// not decomposed when the font can render them as-is: splitting them just
/// to fail recomposition loses nukta positioning.
fn decompose(ctx: &NormalizeContext<'_>, ab: char) -> Option<(char, Option<char>)> {
    // Sinhala split vowels keep their composed form when the font has it.
    if matches!(ab as u32, 0x0DDA | 0x0DDC | 0x0DDD | 0x0DDE)
        && ctx.face.glyph_index(ab as u32, None).is_some()
    {
        return None;
    }
    unicode::decompose(ab)
}

fn compose(_ctx: &NormalizeContext<'_>, a: char, b: char) -> Option<char> {
    // Avoid recomposing matras and marks; the machine wants them apart.
    if unicode::is_mark(unicode::general_category(a)) {
        return None;
    }
    unicode::compose(a, b)
}

struct IndicChar {
    category: u8,
}

impl SyllableChar for IndicChar {
    fn category(&self) -> u8 {
        self.category
    }
}

// Syllable grammar. `cn` is a consonant cluster unit, `h` a halant with
// optional joiner.
fn match_joiner(cs: &[IndicChar]) -> Option<usize> {
    match_one(cs, |c| c == cat::ZWJ || c == cat::ZWNJ)
}

fn match_cn(cs: &[IndicChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| c == cat::C || c == cat::RA || c == cat::V),
        |cs| match_optional(cs, |cs| match_one(cs, |c| c == cat::N)),
    )
}

fn match_h(cs: &[IndicChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| c == cat::H),
        |cs| match_optional(cs, match_joiner),
    )
}

fn match_matras(cs: &[IndicChar]) -> Option<usize> {
    match_repeat_upto(
        cs,
        4,
        |cs| {
            match_seq(
                cs,
                |cs| match_one(cs, |c| c == cat::M),
                |cs| match_optional(cs, |cs| match_one(cs, |c| c == cat::N || c == cat::H)),
            )
        },
        match_unit,
    )
}

fn match_tail(cs: &[IndicChar]) -> Option<usize> {
    match_seq(cs, match_matras, |cs| {
        match_repeat_upto(
            cs,
            4,
            |cs| match_one(cs, |c| c == cat::SM),
            match_unit,
        )
    })
}

/// `cn (h cn)* h? tail`
fn match_consonant_syllable(cs: &[IndicChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_optional(cs, |cs| match_one(cs, |c| c == cat::SYMBOL)),
        |cs| {
            match_seq(cs, match_cn, |cs| {
                match_seq(
                    cs,
                    |cs| {
                        match_repeat_upto(
                            cs,
                            4,
                            |cs| match_seq(cs, match_h, match_cn),
                            match_unit,
                        )
                    },
                    |cs| {
                        match_seq(
                            cs,
                            |cs| match_optional(cs, match_h),
                            match_tail,
                        )
                    },
                )
            })
        },
    )
}

/// `(v | dotted-circle) n? (h cn)? tail`
fn match_vowel_syllable(cs: &[IndicChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| c == cat::V || c == cat::DOTTED_CIRCLE),
        |cs| {
            match_seq(
                cs,
                |cs| match_optional(cs, |cs| match_one(cs, |c| c == cat::N)),
                |cs| {
                    match_seq(
                        cs,
                        |cs| {
                            match_optional(cs, |cs| match_seq(cs, match_h, match_cn))
                        },
                        match_tail,
                    )
                },
            )
        },
    )
}

/// Matras or modifiers with no base to land on.
fn match_broken_cluster(cs: &[IndicChar]) -> Option<usize> {
    match_nonempty(cs, |cs| {
        match_seq(
            cs,
            |cs| match_optional(cs, match_joiner),
            |cs| {
                match_seq(
                    cs,
                    |cs| {
                        match_repeat_upto(
                            cs,
                            4,
                            |cs| {
                                match_either(
                                    cs,
                                    |cs| match_one(cs, |c| c == cat::N || c == cat::H),
                                    |cs| match_one(cs, |c| c == cat::M),
                                )
                            },
                            match_unit,
                        )
                    },
                    match_tail,
                )
            },
        )
    })
}

fn set_syllables(plan: &IndicShapePlan, script: Script, buffer: &mut Buffer) {
    let chars: Vec<IndicChar> = buffer
        .info
        .iter_mut()
        .map(|info| {
            let (category, position) = categorize_char(plan, script, info.codepoint);
            info.complex_cat = category;
            info.complex_aux = position;
            IndicChar { category }
        })
        .collect();

    let mut start = 0;
    let mut serial = 0u8;
    while start < chars.len() {
        let (len, kind) = if let Some(n) = match_consonant_syllable(&chars[start..]) {
            (n, syllable_type::CONSONANT)
        } else if let Some(n) = match_vowel_syllable(&chars[start..]) {
            (n, syllable_type::VOWEL)
        } else if chars[start].category == cat::SYMBOL {
            (1, syllable_type::STANDALONE)
        } else if let Some(n) = match_broken_cluster(&chars[start..]) {
            (n, syllable_type::BROKEN)
        } else {
            (1, syllable_type::NON_INDIC)
        };

        serial = serial.wrapping_add(1);
        let syllable = (serial << 4) | kind;
        for info in &mut buffer.info[start..start + len] {
            info.set_syllable(syllable);
        }
        start += len;
    }
}

fn setup_masks(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Indic(indic_plan)) = plan.data.as_ref() else {
        return;
    };
    let script = plan.props.script.unwrap_or(Script::Devanagari);
    set_syllables(indic_plan, script, buffer);
}

fn initial_reordering(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Indic(indic_plan)) = plan.data.as_ref() else {
        return;
    };

    insert_dotted_circles(
        face,
        buffer,
        syllable_type::BROKEN,
        cat::DOTTED_CIRCLE,
        Some(cat::RA),
    );

    let mut start = 0;
    while start < buffer.len() {
        let end = buffer.next_syllable(start);
        let kind = buffer.info[start].syllable() & 0x0F;
        if matches!(
            kind,
            syllable_type::CONSONANT | syllable_type::VOWEL | syllable_type::BROKEN
        ) {
            // Only encode a reph the font can actually shape.
            let reph_ok = end - start >= 3
                && buffer.info[start].complex_cat == cat::RA
                && buffer.info[start + 1].complex_cat == cat::H
                && plan.would_substitute(
                    tag::RPHF,
                    &[
                        buffer.info[start].codepoint as u16,
                        buffer.info[start + 1].codepoint as u16,
                    ],
                );
            initial_reordering_syllable(indic_plan, reph_ok, buffer, start, end);
        }
        start = end;
    }
}

fn initial_reordering_syllable(
    plan: &IndicShapePlan,
    reph_ok: bool,
    buffer: &mut Buffer,
    start: usize,
    end: usize,
) {
    // 1. Reph: an initial Ra + halant followed by more material becomes a
    //    reph, shaped by `rphf` and repositioned in the final pass.
    let mut base = end;
    let mut has_reph = false;
    let mut limit = start;
    if plan.rphf_mask != 0 && reph_ok {
        buffer.info[start].complex_aux = pos::RA_TO_BECOME_REPH;
        buffer.info[start].mask |= plan.rphf_mask;
        buffer.info[start + 1].mask |= plan.rphf_mask;
        has_reph = true;
        limit = start + 2;
    }

    // 2. Base consonant: the last consonant in the syllable. (The full
    //    algorithm backtracks over post-base forms; fonts following the
    //    version 2 specs do that part themselves through blwf/pstf.)
    for i in (limit..end).rev() {
        if matches!(buffer.info[i].complex_cat, cat::C | cat::RA | cat::V) {
            base = i;
            break;
        }
    }
    if base == end {
        // No base at all; nothing to reorder around.
        return;
    }
    buffer.info[base].complex_aux = pos::BASE_C;

    // 3. Positions and masks around the base: consonants before it take
    //    half forms, consonants after it below/post forms.
    for i in limit..base {
        let info = &mut buffer.info[i];
        if matches!(info.complex_cat, cat::C | cat::RA | cat::V) {
            info.complex_aux = pos::PRE_C;
            info.mask |= plan.half_mask;
        } else if info.complex_cat == cat::H {
            info.mask |= plan.half_mask;
        }
    }
    for i in base + 1..end {
        let info = &mut buffer.info[i];
        if matches!(info.complex_cat, cat::C | cat::RA) {
            info.complex_aux = pos::POST_C;
            info.mask |= plan.blwf_mask | plan.pstf_mask | plan.pref_mask;
        } else if info.complex_cat == cat::H {
            info.mask |= plan.blwf_mask | plan.pstf_mask | plan.pref_mask;
        }
    }

    // 4. Move pre-base matras to the front of the syllable (after a reph
    //    pair, which is still in logical position).
    let matra_target = if has_reph { start + 2 } else { start };
    let mut i = base + 1;
    while i < end {
        if buffer.info[i].complex_cat == cat::M && buffer.info[i].complex_aux == pos::PRE_M {
            let matra = buffer.info[i];
            buffer.merge_clusters(matra_target, i + 1);
            buffer.info.copy_within(matra_target..i, matra_target + 1);
            buffer.info[matra_target] = matra;
        }
        i += 1;
    }
}

fn final_reordering(plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Indic(_)) = plan.data.as_ref() else {
        return;
    };

    let mut start = 0;
    while start < buffer.len() {
        let end = buffer.next_syllable(start);
        final_reordering_syllable(buffer, start, end);
        start = end;
    }
}

fn final_reordering_syllable(buffer: &mut Buffer, start: usize, end: usize) {
    // Move the reph, now a single ligated glyph, from the front of the
    // syllable to after the base: before post-base matras and modifiers.
    if end - start < 2
        || buffer.info[start].complex_aux != pos::RA_TO_BECOME_REPH
        || !buffer.info[start].is_ligated()
    {
        return;
    }

    // Find the new position: skip the base and everything attached below
    // it, stop before post-base matras and syllable modifiers.
    let mut new_reph_pos = end - 1;
    for i in start + 1..end {
        if matches!(buffer.info[i].complex_aux, pos::POST_M | pos::SMVD) {
            new_reph_pos = i - 1;
            break;
        }
    }
    if new_reph_pos <= start {
        return;
    }

    let reph = buffer.info[start];
    buffer.merge_clusters(start, new_reph_pos + 1);
    buffer.info.copy_within(start + 1..new_reph_pos + 1, start);
    buffer.info[new_reph_pos] = reph;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn plan_for(script: Script) -> IndicShapePlan {
        IndicShapePlan {
            rphf_mask: 0x10,
            half_mask: 0x20,
            blwf_mask: 0x40,
            pstf_mask: 0x80,
            pref_mask: 0x100,
            virama: script_virama(script),
            ra: script_ra(script),
        }
    }

    fn syllables_of(script: Script, text: &str) -> Vec<u8> {
        let plan = plan_for(script);
        let mut buffer = Buffer::new();
        buffer.add_str(text);
        set_syllables(&plan, script, &mut buffer);
        buffer.info.iter().map(|info| info.syllable()).collect()
    }

    #[test]
    fn test_single_consonant_syllable() {
        // KA + virama + TA: one syllable.
        let syllables = syllables_of(Script::Devanagari, "\u{0915}\u{094D}\u{0924}");
        assert!(syllables.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(syllables[0] & 0x0F, syllable_type::CONSONANT);
    }

    #[test]
    fn test_two_syllables_split() {
        // KA MATRA-AA | KHA: two syllables.
        let syllables = syllables_of(Script::Devanagari, "\u{0915}\u{093E}\u{0916}");
        assert_eq!(syllables[0], syllables[1]);
        assert_ne!(syllables[1], syllables[2]);
    }

    #[test]
    fn test_orphan_matra_is_broken() {
        let syllables = syllables_of(Script::Devanagari, "\u{093F}");
        assert_eq!(syllables[0] & 0x0F, syllable_type::BROKEN);
    }

    #[test]
    fn test_pre_base_matra_moves_to_front() {
        let plan = plan_for(Script::Devanagari);
        let mut buffer = Buffer::new();
        // KA + I-matra (pre-base): logical order C M, visual order M C.
        buffer.add_str("\u{0915}\u{093F}");
        set_syllables(&plan, Script::Devanagari, &mut buffer);
        initial_reordering_syllable(&plan, false, &mut buffer, 0, 2);
        assert_eq!(buffer.info[0].codepoint, 0x093F);
        assert_eq!(buffer.info[1].codepoint, 0x0915);
        // The reorder merged the cluster.
        assert_eq!(buffer.info[0].cluster, buffer.info[1].cluster);
    }

    #[test]
    fn test_categorize() {
        let plan = plan_for(Script::Devanagari);
        assert_eq!(
            categorize_char(&plan, Script::Devanagari, 0x0915).0,
            cat::C
        );
        assert_eq!(
            categorize_char(&plan, Script::Devanagari, 0x094D).0,
            cat::H
        );
        assert_eq!(
            categorize_char(&plan, Script::Devanagari, 0x0930).0,
            cat::RA
        );
        assert_eq!(
            categorize_char(&plan, Script::Devanagari, 0x093E).0,
            cat::M
        );
        assert_eq!(
            categorize_char(&plan, Script::Devanagari, 0x0902).0,
            cat::SM
        );
    }
}
