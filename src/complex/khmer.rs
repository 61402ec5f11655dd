//! Shaping for Khmer.
//!
//! Khmer clusters stack subscript consonants with the coeng sign rather
//! than a visible halant, and several dependent vowels render to the left
//! of the whole stack. The shaper segments clusters, moves the pre-base
//! vowels (and a coeng-Ro, which also renders pre-base) to the front, and
//! schedules the Khmer feature set.

use crate::buffer::Buffer;
use crate::face::Face;
use crate::normalize::{NormalizationMode, NormalizeContext};
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode;

use super::syllable::*;
use super::{insert_dotted_circles, ComplexShaper, ZeroWidthMarks};

pub(crate) static KHMER_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: Some(override_features),
    create_data: Some(data_create),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacriticsNoShortCircuit,
    decompose: None,
    compose: Some(compose),
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::None,
    fallback_position: false,
};

const COENG: u32 = 0x17D2;
const RO: u32 = 0x179A;

mod cat {
    pub const X: u8 = 0;
    pub const C: u8 = 1; // consonant
    pub const V: u8 = 2; // independent vowel
    pub const COENG: u8 = 3;
    pub const VPRE: u8 = 4; // pre-base dependent vowel
    pub const VOTHER: u8 = 5; // all other dependent vowels
    pub const REG_SHIFT: u8 = 6; // register shifter
    pub const ROBAT: u8 = 7;
    pub const SM: u8 = 8; // signs that end a cluster
    pub const JOINER: u8 = 9;
    pub const DOTTED_CIRCLE: u8 = 10;
}

mod syllable_type {
    pub const CONSONANT: u8 = 0;
    pub const BROKEN: u8 = 1;
    pub const NON_KHMER: u8 = 2;
}

fn collect_features(planner: &mut ShapePlanner<'_>) {
    planner
        .ot_map
        .enable_feature(tag::LOCL, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::CCMP, FeatureFlags::empty(), 1);

    planner.ot_map.add_gsub_pause(Some(reorder));

    for feature in [tag::PREF, tag::BLWF, tag::ABVF, tag::PSTF, tag::CFAR] {
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
    // Khmer spec has 'clig' as part of the presentation forms, but Uniscribe
    // never applies 'liga' here.
    planner.ot_map.disable_feature(tag::LIGA);
}

pub(crate) struct KhmerShapePlan {
    pref_mask: u32,
    cfar_mask: u32,
}

fn data_create(plan: &ShapePlan) -> ShaperData {
    ShaperData::Khmer(KhmerShapePlan {
        pref_mask: plan.ot_map.get_1_mask(tag::PREF),
        cfar_mask: plan.ot_map.get_1_mask(tag::CFAR),
    })
}

fn categorize_char(cp: u32) -> u8 {
    match cp {
        COENG => cat::COENG,
        0x1780..=0x17A2 => cat::C,
        0x17A3..=0x17B3 => cat::V,
        // e, ae, ai render before the base stack.
        0x17C1..=0x17C3 => cat::VPRE,
        0x17B6..=0x17C5 => cat::VOTHER,
        0x17C9 | 0x17CA => cat::REG_SHIFT,
        0x17CC => cat::ROBAT,
        0x17C6..=0x17C8 | 0x17CB | 0x17CD..=0x17D1 | 0x17DD => cat::SM,
        unicode::ZWJ | unicode::ZWNJ => cat::JOINER,
        unicode::DOTTED_CIRCLE => cat::DOTTED_CIRCLE,
        _ => cat::X,
    }
}

struct KhmerChar {
    category: u8,
}

impl SyllableChar for KhmerChar {
    fn category(&self) -> u8 {
        self.category
    }
}

/// `(c | v) (regshift | robat)? (coeng joiner? c vother*)* vpre? vother* sm*`
fn match_cluster(cs: &[KhmerChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| matches!(c, cat::C | cat::V | cat::DOTTED_CIRCLE)),
        |cs| {
            match_seq(
                cs,
                |cs| {
                    match_optional(cs, |cs| {
                        match_one(cs, |c| c == cat::REG_SHIFT || c == cat::ROBAT)
                    })
                },
                |cs| {
                    match_seq(
                        cs,
                        |cs| {
                            match_repeat_upto(
                                cs,
                                4,
                                |cs| {
                                    match_seq(
                                        cs,
                                        |cs| match_one(cs, |c| c == cat::COENG),
                                        |cs| {
                                            match_seq(
                                                cs,
                                                |cs| {
                                                    match_optional(cs, |cs| {
                                                        match_one(cs, |c| c == cat::JOINER)
                                                    })
                                                },
                                                |cs| match_one(cs, |c| c == cat::C || c == cat::V),
                                            )
                                        },
                                    )
                                },
                                match_unit,
                            )
                        },
                        match_vowels_and_signs,
                    )
                },
            )
        },
    )
}

fn match_vowels_and_signs(cs: &[KhmerChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| {
            match_repeat_upto(
                cs,
                4,
                |cs| {
                    match_one(cs, |c| {
                        matches!(c, cat::VPRE | cat::VOTHER | cat::REG_SHIFT | cat::ROBAT)
                    })
                },
                match_unit,
            )
        },
        |cs| match_repeat_upto(cs, 4, |cs| match_one(cs, |c| c == cat::SM), match_unit),
    )
}

fn match_broken_cluster(cs: &[KhmerChar]) -> Option<usize> {
    match_nonempty(cs, match_vowels_and_signs)
}

fn set_syllables(buffer: &mut Buffer) {
    let chars: Vec<KhmerChar> = buffer
        .info
        .iter_mut()
        .map(|info| {
            let category = categorize_char(info.codepoint);
            info.complex_cat = category;
            // The coeng-Ro reorder runs after glyphs replace characters, so
            // remember which consonant was the Ro now.
            info.complex_aux = u8::from(info.codepoint == RO);
            KhmerChar { category }
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
            (1, syllable_type::NON_KHMER)
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
    let Some(ShaperData::Khmer(khmer_plan)) = plan.data.as_ref() else {
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
            reorder_cluster(khmer_plan, buffer, start, end);
        }
        start = end;
    }
}

fn reorder_cluster(plan: &KhmerShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    // A coeng-Ro renders before the base; tag it pref and move the pair to
    // the front. Everything after it in the cluster takes cfar, so the
    // font can tell the two sides of the Ro apart.
    let mut i = start;
    while i + 1 < end {
        if buffer.info[i].complex_cat == cat::COENG && buffer.info[i + 1].complex_aux != 0 {
            buffer.info[i].mask |= plan.pref_mask;
            buffer.info[i + 1].mask |= plan.pref_mask;
            buffer.merge_clusters(start, i + 2);

            let coeng = buffer.info[i];
            let ro = buffer.info[i + 1];
            buffer.info.copy_within(start..i, start + 2);
            buffer.info[start] = coeng;
            buffer.info[start + 1] = ro;

            for info in &mut buffer.info[start + 2..end] {
                info.mask |= plan.cfar_mask;
            }
            break;
        }
        i += 1;
    }

    // Pre-base vowels move to the very front, before a moved coeng-Ro.
    let mut i = start;
    while i < end {
        if buffer.info[i].complex_cat == cat::VPRE && i > start {
            let vowel = buffer.info[i];
            buffer.merge_clusters(start, i + 1);
            buffer.info.copy_within(start..i, start + 1);
            buffer.info[start] = vowel;
        }
        i += 1;
    }
}

/// Decomposed matras interfere with the coeng stacking, so recomposition is
/// forced back on for them.
fn compose(_ctx: &NormalizeContext<'_>, a: char, b: char) -> Option<char> {
    unicode::compose(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn test_cluster_segmentation() {
        // KA + COENG + RO + vowel: one cluster.
        let mut buffer = Buffer::new();
        buffer.add_str("\u{1780}\u{17D2}\u{179A}\u{17B6}");
        set_syllables(&mut buffer);
        let syllables: Vec<u8> = buffer.info.iter().map(|i| i.syllable()).collect();
        assert!(syllables.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_coeng_ro_moves_to_front() {
        let plan = KhmerShapePlan {
            pref_mask: 0x10,
            cfar_mask: 0x20,
        };
        let mut buffer = Buffer::new();
        buffer.add_str("\u{1780}\u{17D2}\u{179A}");
        set_syllables(&mut buffer);
        reorder_cluster(&plan, &mut buffer, 0, 3);
        assert_eq!(buffer.info[0].codepoint, COENG);
        assert_eq!(buffer.info[1].codepoint, RO);
        assert_eq!(buffer.info[2].codepoint, 0x1780);
        assert!(buffer.info[0].mask & plan.pref_mask != 0);
    }

    #[test]
    fn test_pre_base_vowel_moves() {
        let plan = KhmerShapePlan {
            pref_mask: 0x10,
            cfar_mask: 0x20,
        };
        let mut buffer = Buffer::new();
        // KA + E (pre-base vowel).
        buffer.add_str("\u{1780}\u{17C1}");
        set_syllables(&mut buffer);
        reorder_cluster(&plan, &mut buffer, 0, 2);
        assert_eq!(buffer.info[0].codepoint, 0x17C1);
        assert_eq!(buffer.info[1].codepoint, 0x1780);
    }
}
