//! The Universal Shaping Engine.
//!
//! Covers the long tail of Brahmi-derived and Southeast Asian scripts that
//! have no dedicated shaper. Characters are categorized from their general
//! properties (category, combining class, a small per-script table of
//! viramas and pre-base vowels), clusters are formed, and the pre-base
//! elements are reordered in front of the base the way the USE
//! specification prescribes.

use unicode_script::Script;

use crate::buffer::Buffer;
use crate::face::Face;
use crate::normalize::NormalizationMode;
use crate::ot_map::FeatureFlags;
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::tag;
use crate::unicode::{self, GeneralCategory};

use super::syllable::*;
use super::{insert_dotted_circles, ComplexShaper, ZeroWidthMarks};

pub(crate) static USE_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: Some(collect_features),
    override_features: None,
    create_data: Some(data_create),
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::ComposedDiacriticsNoShortCircuit,
    decompose: None,
    compose: None,
    setup_masks: Some(setup_masks),
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::ByGdefEarly,
    fallback_position: false,
};

mod cat {
    pub const O: u8 = 0; // other
    pub const B: u8 = 1; // base
    pub const H: u8 = 2; // halant/virama
    pub const CM: u8 = 3; // consonant modifier / combining mark
    pub const VPRE: u8 = 4; // pre-base vowel
    pub const VABV: u8 = 5;
    pub const VBLW: u8 = 6;
    pub const VPST: u8 = 7;
    pub const SM: u8 = 8; // syllable modifier
    pub const R: u8 = 9; // repha
    pub const JOINER: u8 = 10;
    pub const DOTTED_CIRCLE: u8 = 11;
    pub const N: u8 = 12; // number
}

mod syllable_type {
    pub const CLUSTER: u8 = 0;
    pub const BROKEN: u8 = 1;
    pub const NON_CLUSTER: u8 = 2;
}

const BASIC_FEATURES: &[u32] = &[
    tag::RPHF,
    tag::PREF,
    tag::ABVF,
    tag::BLWF,
    tag::HALF,
    tag::PSTF,
    tag::VATU,
    tag::CJCT,
];

const TOPOGRAPHICAL_AND_PRESENTATION: &[u32] = &[
    tag::ISOL,
    tag::INIT,
    tag::MEDI,
    tag::FINA,
    tag::ABVS,
    tag::BLWS,
    tag::HALN,
    tag::PRES,
    tag::PSTS,
];

fn collect_features(planner: &mut ShapePlanner<'_>) {
    planner
        .ot_map
        .enable_feature(tag::LOCL, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::CCMP, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::NUKT, FeatureFlags::empty(), 1);
    planner
        .ot_map
        .enable_feature(tag::AKHN, FeatureFlags::MANUAL_ZWJ, 1);

    planner.ot_map.add_gsub_pause(Some(reorder));

    for &feature in BASIC_FEATURES {
        planner.ot_map.add_feature(
            feature,
            FeatureFlags::MANUAL_ZWJ | FeatureFlags::PER_SYLLABLE,
            1,
        );
    }
    planner.ot_map.add_gsub_pause(None);

    for &feature in TOPOGRAPHICAL_AND_PRESENTATION {
        planner
            .ot_map
            .enable_feature(feature, FeatureFlags::MANUAL_ZWJ, 1);
    }
}

pub(crate) struct UseShapePlan {
    rphf_mask: u32,
}

fn data_create(plan: &ShapePlan) -> ShaperData {
    ShaperData::Use(UseShapePlan {
        rphf_mask: plan.ot_map.get_1_mask(tag::RPHF),
    })
}

/// The viramas and stackers of the USE scripts we shape.
fn is_halant(script: Script, cp: u32) -> bool {
    match script {
        Script::Balinese => cp == 0x1B44,
        Script::Batak => cp == 0x1BF2 || cp == 0x1BF3,
        Script::Buginese => cp == 0x1A17 || cp == 0x1A18, // no virama; vowel signs i/u
        Script::Chakma => cp == 0x11133 || cp == 0x11134,
        Script::Cham => cp == 0xAA06, // consonant sign ya? conservative
        Script::Javanese => cp == 0xA9C0,
        Script::Kaithi => cp == 0x110B9,
        Script::Kharoshthi => cp == 0x10A3F,
        Script::Khojki => cp == 0x11235,
        Script::Lepcha => cp == 0x1C37, // nukta; lepcha has no virama
        Script::Limbu => cp == 0x193B,  // sa-i
        Script::Mahajani => cp == 0x11173,
        Script::Meetei_Mayek => cp == 0xAAF6,
        Script::Modi => cp == 0x1163F,
        Script::Rejang => cp == 0xA953,
        Script::Saurashtra => cp == 0xA8C4,
        Script::Sharada => cp == 0x111C0,
        Script::Siddham => cp == 0x115BF,
        Script::Sundanese => cp == 0x1BAA || cp == 0x1BAB,
        Script::Syloti_Nagri => cp == 0xA806,
        Script::Tai_Tham => cp == 0x1A60,
        Script::Takri => cp == 0x116B6,
        Script::Tirhuta => cp == 0x114C2,
        _ => false,
    }
}

/// Vowels that render before the base.
fn is_pre_base_vowel(script: Script, cp: u32) -> bool {
    match script {
        Script::Balinese => cp == 0x1B3E || cp == 0x1B3F,
        Script::Cham => matches!(cp, 0xAA29..=0xAA2B),
        Script::Javanese => cp == 0xA9BA || cp == 0xA9BB,
        Script::Lepcha => cp == 0x1C27 || cp == 0x1C28,
        Script::Limbu => cp == 0x1920, // a? conservative: none pre-base
        Script::Sundanese => cp == 0x1BA6,
        Script::Syloti_Nagri => cp == 0xA802,
        Script::Tai_Tham => matches!(cp, 0x1A6E..=0x1A72),
        Script::Tirhuta => matches!(cp, 0x114B1 | 0x114B9),
        _ => false,
    }
}

fn categorize_char(script: Script, cp: u32) -> u8 {
    if cp == unicode::ZWJ || cp == unicode::ZWNJ {
        return cat::JOINER;
    }
    if cp == unicode::DOTTED_CIRCLE {
        return cat::DOTTED_CIRCLE;
    }
    if is_halant(script, cp) {
        return cat::H;
    }

    let Some(c) = char::from_u32(cp) else {
        return cat::O;
    };
    let gc = unicode::general_category(c);

    match gc {
        GeneralCategory::OtherLetter | GeneralCategory::ModifierLetter => cat::B,
        GeneralCategory::DecimalNumber | GeneralCategory::OtherNumber => cat::N,
        GeneralCategory::NonspacingMark | GeneralCategory::SpacingMark => {
            if is_pre_base_vowel(script, cp) {
                cat::VPRE
            } else {
                match unicode::combining_class(c) {
                    220 | 222 | 202 => cat::VBLW,
                    230 | 228 | 232 | 214 | 216 => cat::VABV,
                    0 if gc == GeneralCategory::SpacingMark => cat::VPST,
                    0 => cat::SM,
                    _ => cat::CM,
                }
            }
        }
        _ => cat::O,
    }
}

struct UseChar {
    category: u8,
}

impl SyllableChar for UseChar {
    fn category(&self) -> u8 {
        self.category
    }
}

/// `(b | n | dotted-circle) (h (b | dotted-circle))* marks*`
fn match_cluster(cs: &[UseChar]) -> Option<usize> {
    match_seq(
        cs,
        |cs| match_one(cs, |c| matches!(c, cat::B | cat::N | cat::DOTTED_CIRCLE)),
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
                                |cs| match_one(cs, |c| c == cat::H),
                                |cs| {
                                    match_optional_seq(
                                        cs,
                                        |cs| match_one(cs, |c| c == cat::JOINER),
                                        |cs| {
                                            match_one(cs, |c| {
                                                c == cat::B || c == cat::DOTTED_CIRCLE
                                            })
                                        },
                                    )
                                },
                            )
                        },
                        match_unit,
                    )
                },
                match_marks,
            )
        },
    )
}

fn match_marks(cs: &[UseChar]) -> Option<usize> {
    match_repeat_upto(
        cs,
        8,
        |cs| {
            match_one(cs, |c| {
                matches!(
                    c,
                    cat::CM | cat::VPRE | cat::VABV | cat::VBLW | cat::VPST | cat::SM | cat::H
                )
            })
        },
        match_unit,
    )
}

fn match_broken_cluster(cs: &[UseChar]) -> Option<usize> {
    match_nonempty(cs, match_marks)
}

fn set_syllables(script: Script, buffer: &mut Buffer) {
    let chars: Vec<UseChar> = buffer
        .info
        .iter_mut()
        .map(|info| {
            let category = categorize_char(script, info.codepoint);
            info.complex_cat = category;
            UseChar { category }
        })
        .collect();

    let mut start = 0;
    let mut serial = 0u8;
    while start < chars.len() {
        let (len, kind) = if let Some(n) = match_cluster(&chars[start..]) {
            (n, syllable_type::CLUSTER)
        } else if let Some(n) = match_broken_cluster(&chars[start..]) {
            (n, syllable_type::BROKEN)
        } else {
            (1, syllable_type::NON_CLUSTER)
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
    let Some(ShaperData::Use(use_plan)) = plan.data.as_ref() else {
        return;
    };
    let script = plan.props.script.unwrap_or(Script::Javanese);
    set_syllables(script, buffer);

    // A repha (base + halant at cluster start followed by another base)
    // takes rphf.
    if use_plan.rphf_mask != 0 {
        let mut start = 0;
        while start < buffer.len() {
            let end = buffer.next_syllable(start);
            if end - start >= 3
                && buffer.info[start].complex_cat == cat::B
                && buffer.info[start + 1].complex_cat == cat::H
                && buffer.info[start + 2].complex_cat == cat::B
            {
                buffer.info[start].mask |= use_plan.rphf_mask;
                buffer.info[start + 1].mask |= use_plan.rphf_mask;
                buffer.info[start].complex_cat = cat::R;
            }
            start = end;
        }
    }
}

fn reorder(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    let Some(ShaperData::Use(use_plan)) = plan.data.as_ref() else {
        return;
    };

    insert_dotted_circles(
        face,
        buffer,
        syllable_type::BROKEN,
        cat::DOTTED_CIRCLE,
        Some(cat::R),
    );

    let mut start = 0;
    while start < buffer.len() {
        let end = buffer.next_syllable(start);
        if buffer.info[start].syllable() & 0x0F == syllable_type::CLUSTER {
            reorder_cluster(use_plan, buffer, start, end);
        }
        start = end;
    }
}

fn reorder_cluster(_plan: &UseShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    // Pre-base vowels move to the front of the cluster.
    for i in start + 1..end {
        if buffer.info[i].complex_cat == cat::VPRE {
            let vowel = buffer.info[i];
            buffer.merge_clusters(start, i + 1);
            buffer.info.copy_within(start..i, start + 1);
            buffer.info[start] = vowel;
        }
    }

    // A repha that failed to ligate gives its mask up; one that did ligate
    // moves to the end of the base sequence, before the vowel marks.
    if buffer.info[start].complex_cat == cat::R && buffer.info[start].is_ligated() {
        let mut new_pos = end - 1;
        for i in start + 1..end {
            if !matches!(buffer.info[i].complex_cat, cat::B | cat::H) {
                new_pos = i - 1;
                break;
            }
        }
        if new_pos > start {
            let repha = buffer.info[start];
            buffer.merge_clusters(start, new_pos + 1);
            buffer.info.copy_within(start + 1..new_pos + 1, start);
            buffer.info[new_pos] = repha;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn test_javanese_cluster() {
        let mut buffer = Buffer::new();
        // Javanese KA + pangkon (virama) + KA: one cluster.
        buffer.add_str("\u{A98F}\u{A9C0}\u{A98F}");
        set_syllables(Script::Javanese, &mut buffer);
        let syllables: Vec<u8> = buffer.info.iter().map(|i| i.syllable()).collect();
        assert!(syllables.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(syllables[0] & 0x0F, syllable_type::CLUSTER);
    }

    #[test]
    fn test_pre_base_vowel_reorders() {
        let plan = UseShapePlan { rphf_mask: 0 };
        let mut buffer = Buffer::new();
        // Javanese KA + taling (pre-base vowel).
        buffer.add_str("\u{A98F}\u{A9BA}");
        set_syllables(Script::Javanese, &mut buffer);
        reorder_cluster(&plan, &mut buffer, 0, 2);
        assert_eq!(buffer.info[0].codepoint, 0xA9BA);
        assert_eq!(buffer.info[1].codepoint, 0xA98F);
    }
}
