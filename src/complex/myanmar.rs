//! Shaping for Myanmar (the `mym2` model).
//!
//! Myanmar does not use half forms or a visible virama the way Indic
//! scripts do; instead the cluster is sorted into its visual order by
//! position category — kinzi after the base, medial ra and the pre-base
//! vowel E in front — and the font takes it from there.

use crate::buffer::Buffer;
use crate::face::Face;
use crate::normalize::NormalizationMode;
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode;

use super::syllable::*;
use super::{insert_dotted_circles, ComplexShaper, ZeroWidthMarks};

pub(crate) static MYANMAR_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(data_create),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacritics,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::ByGdefEarly,
    fallback_position: false,
};

mod cat {
    pub const X: u8 = 0;
    pub const C: u8 = 1; // consonant
    pub const V: u8 = 2; // independent vowel
    pub const VIRAMA: u8 = 3; // U+1039, the stacker
    pub const ASAT: u8 = 4; // U+103A
    pub const MEDIAL: u8 = 5; // medial ya/wa/ha
    pub const MEDIAL_RA: u8 = 6; // U+103C, renders pre-base
    pub const VPRE: u8 = 7; // U+1031
    pub const VBLW: u8 = 8;
    pub const VABV: u8 = 9;
    pub const VPST: u8 = 10;
    pub const SM: u8 = 11; // anusvara, dot below, visarga, tone marks
    pub const JOINER: u8 = 12;
    pub const DOTTED_CIRCLE: u8 = 13;
    pub const D: u8 = 14; // digits and symbols
}

mod syllable_type {
    pub const CONSONANT: u8 = 0;
    pub const BROKEN: u8 = 1;
    pub const NON_MYANMAR: u8 = 2;
}

/// Sort keys for the in-cluster reorder; lower sorts earlier.
fn position_key(category: u8) -> u8 {
    match category {
        cat::VPRE => 0,
        cat::MEDIAL_RA => 1,
        // Base and stacked consonants stay where they are.
        cat::C | cat::V | cat::VIRAMA | cat::DOTTED_CIRCLE => 2,
        cat::MEDIAL => 3,
        cat::ASAT => 4,
        cat::VBLW => 5,
        cat::VABV => 6,
        cat::VPST => 7,
        cat::SM => 8,
        _ => 9,
    }
}

fn collect_features(planner: &mut ShapePlanner<'_>) {
    planner
        .ot_map
        .enable_feature(tag::LOCL, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::CCMP, FeatureFlags::empty(), 1);

    planner.ot_map.add_gsub_pause(Some(reorder));

    for feature in [tag::RPHF, tag::PREF, tag::BLWF, tag::PSTF] {
        planner.ot_map.add_feature(
            feature,
            FeatureFlags::MANUAL_JOINERS | FeatureFlags::PER_SYLLABLE,
            1,
        );
    }
    planner.ot_map.add_gsub_pause(None);

    for feature in [tag::PRES, tag::ABVS, tag::BLWS, tag::PSTS] {
        planner
            .ot_map
            .enable_feature(feature, FeatureFlags::GLOBAL_MANUAL_JOINERS, 1);
    }
}

fn override_features(planner: &mut ShapePlanner<'_>) {
    planner.ot_map.disable_feature(tag::LIGA);
}

pub(crate) struct MyanmarShapePlan {
    rphf_mask: u32,
}

fn data_create(plan: &ShapePlan) -> ShaperData {
    ShaperData::Myanmar(MyanmarShapePlan {
        rphf_mask: plan.ot_map.get_1_mask(tag::RPHF),
    })
}

fn categorize_char(cp: u32) -> u8 {
    match cp {
        0x1039 => cat::VIRAMA,
        0x103A => cat::ASAT,
        0x103B | 0x103D | 0x103E => cat::MEDIAL,
        0x103C => cat::MEDIAL_RA,
        0x1031 | 0x1084 => cat::VPRE,
        0x102F | 0x1030 | 0x1058 | 0x1059 => cat::VBLW,
        0x102D | 0x102E | 0x1032..=0x1035 | 0x1071..=0x1074 | 0x1085 => cat::VABV,
        0x102B | 0x102C | 0x1056 | 0x1057 | 0x1062..=0x1064 | 0x1083 => cat::VPST,
        0x1036..=0x1038 | 0x1087..=0x108F | 0x109A..=0x109D => cat::SM,
        0x1000..=0x1020 | 0x103F => cat::C,
        0x1021..=0x102A | 0x104E => cat::V,
        unicode::ZWJ | unicode::ZWNJ => cat::JOINER,
        unicode::DOTTED_CIRCLE => cat::DOTTED_CIRCLE,
        0x1040..=0x1049 | 0x104A..=0x104D | 0x104F => cat::D,
        _ => cat::X,
    }
}

struct MyanmarChar {
    category: u8,
}

impl SyllableChar for MyanmarChar {
    fn category(&self) -> u8 {
        self.category
    }
}

/// Kinzi (NGA + asat + virama) then `c (virama c)* medials* vowels* sm*`.
fn match_cluster(cs: &[MyanmarChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| matches!(c, cat::C | cat::V | cat::DOTTED_CIRCLE)),
        |cs| {
            match_seq(
                cs,
                |cs| {
                    match_repeat_upto(
                        cs,
                        4,
                        |cs| {
                            match_either_seq(
                                cs,
                                |cs| match_one(cs, |c| c == cat::ASAT),
                                match_unit,
                                |cs| {
                                    match_seq(
                                        cs,
                                        |cs| match_one(cs, |c| c == cat::VIRAMA),
                                        |cs| match_one(cs, |c| c == cat::C || c == cat::V),
                                    )
                                },
                            )
                        },
                        match_unit,
                    )
                },
                match_tail,
            )
        },
    )
}

fn match_tail(cs: &[MyanmarChar]) -> Option<usize> {
    match_repeat_upto(
        cs,
        8,
        |cs| {
            match_one(cs, |c| {
                matches!(
                    c,
                    cat::MEDIAL
                        | cat::MEDIAL_RA
                        | cat::VPRE
                        | cat::VBLW
                        | cat::VABV
                        | cat::VPST
                        | cat::ASAT
                        | cat::SM
                        | cat::JOINER
                )
            })
        },
        match_unit,
    )
}

fn match_broken_cluster(cs: &[MyanmarChar]) -> Option<usize> {
    match_nonempty(cs, match_tail)
}

fn set_syllables(buffer: &mut Buffer) {
    let chars: Vec<MyanmarChar> = buffer
        .info
        .iter_mut()
        .map(|info| {
            let category = categorize_char(info.codepoint);
            info.complex_cat = category;
            // NGA starts a kinzi; remember it before glyph mapping.
            info.complex_aux = u8::from(info.codepoint == 0x1004);
            MyanmarChar { category }
        })
        .collect();

    let mut start = 0;
    let mut serial = 0u8;
    while start < chars.len() {
        let (len, kind) = if let Some(n) = match_cluster(&chars[start..]) {
            (n, syllable_type::CONSONANT)
        } else if let Some(n) = match_broken_cluster(&chars[start..]) {
            (n, syllable_type::BROKEN)
        } else {
            (1, syllable_type::NON_MYANMAR)
        };

        serial = serial.wrapping_add(1);
        let syllable = (serial << 4) | kind;
        for info in &mut buffer.info[start..start + len] {
            info.set_syllable(syllable);
        }
        start += len;
    }
}

fn setup_masks(_plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    set_syllables(buffer);
}

fn reorder(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Myanmar(myanmar_plan)) = plan.data.as_ref() else {
        return;
    };

    insert_dotted_circles(
        face,
        buffer,
        syllable_type::BROKEN,
        cat::DOTTED_CIRCLE,
        None,
    );

    let mut start = 0;
    while start < buffer.len() {
        let end = buffer.next_syllable(start);
        if buffer.info[start].syllable() & 0x0F == syllable_type::CONSONANT {
            reorder_cluster(myanmar_plan, buffer, start, end);
        }
        start = end;
    }
}

fn reorder_cluster(plan: &MyanmarShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    // Kinzi: NGA + asat + virama at cluster start shapes through rphf and
    // moves after the base.
    if end - start >= 4
        && buffer.info[start].complex_aux != 0
        && buffer.info[start + 1].complex_cat == cat::ASAT
        && buffer.info[start + 2].complex_cat == cat::VIRAMA
    {
        for info in &mut buffer.info[start..start + 3] {
            info.mask |= plan.rphf_mask;
        }
        buffer.merge_clusters(start, end);
        let kinzi: [crate::buffer::GlyphInfo; 3] =
            [buffer.info[start], buffer.info[start + 1], buffer.info[start + 2]];
        // Kinzi lands right after the base consonant.
        buffer.info[start] = buffer.info[start + 3];
        buffer.info[start + 1] = kinzi[0];
        buffer.info[start + 2] = kinzi[1];
        buffer.info[start + 3] = kinzi[2];
    }

    // Stable sort the rest of the cluster into visual order.
    let tail_start = if matches!(
        buffer.info[start].complex_cat,
        cat::C | cat::V | cat::DOTTED_CIRCLE
    ) {
        start + 1
    } else {
        start
    };
    if tail_start < end {
        let needs_sort = buffer.info[tail_start..end]
            .windows(2)
            .any(|w| position_key(w[0].complex_cat) > position_key(w[1].complex_cat));
        if needs_sort {
            buffer.merge_clusters(start, end);
            buffer.info[tail_start..end]
                .sort_by_key(|info| position_key(info.complex_cat));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn test_pre_base_vowel_sorts_to_front_of_tail() {
        let plan = MyanmarShapePlan { rphf_mask: 0x10 };
        let mut buffer = Buffer::new();
        // KA + VPST (102C) + VPRE (1031): the E vowel must sort first in
        // the tail.
        buffer.add_str("\u{1000}\u{102C}\u{1031}");
        set_syllables(&mut buffer);
        reorder_cluster(&plan, &mut buffer, 0, 3);
        assert_eq!(buffer.info[0].codepoint, 0x1000);
        assert_eq!(buffer.info[1].codepoint, 0x1031);
        assert_eq!(buffer.info[2].codepoint, 0x102C);
    }

    #[test]
    fn test_cluster_segmentation() {
        let mut buffer = Buffer::new();
        // Two separate consonant clusters.
        buffer.add_str("\u{1000}\u{1001}");
        set_syllables(&mut buffer);
        assert_ne!(buffer.info[0].syllable(), buffer.info[1].syllable());
    }
}
