//! Shaping for Hebrew.
//!
//! Hebrew needs no reordering machinery; the shaper exists for the
//! presentation-form composition fallback old fonts rely on, and a small
//! mark-ordering fix for the patach/sheva/meteg pile-ups.

use crate::buffer::Buffer;
use crate::normalize::{NormalizationMode, NormalizeContext};
use crate::plan::ShapePlan;
use crate::tag;
use crate::unicode::{self, mcc_for_ccc};

use super::{ComplexShaper, ZeroWidthMarks};

pub(crate) static HEBREW_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: Some(compose),
    setup_masks: None,
    gpos_tag: Some(tag::HEBR),
    reorder_marks: Some(reorder_marks),
    zero_width_marks: ZeroWidthMarks::ByGdefLate,
    fallback_position: true,
};

fn reorder_marks(_plan: &ShapePlan, buffer: &mut Buffer, start: usize, end: usize) {
    for i in start + 2..end {
        let c0 = buffer.info[i - 2].modified_combining_class();
        let c1 = buffer.info[i - 1].modified_combining_class();
        let c2 = buffer.info[i].modified_combining_class();

        // patach or qamats; sheva or hiriq; meteg or a below-class mark.
        if (c0 == mcc_for_ccc(17) || c0 == mcc_for_ccc(18))
            && (c1 == mcc_for_ccc(10) || c1 == mcc_for_ccc(14))
            && (c2 == mcc_for_ccc(22) || c2 == 220)
        {
            buffer.merge_clusters(i - 1, i + 1);
            buffer.info.swap(i - 1, i);
            break;
        }
    }
}

/// Dagesh forms for U+05D0..=U+05EA; zero where no presentation form is
/// encoded.
const S_DAGESH_FORMS: &[u32] = &[
    0xFB30, // ALEF
    0xFB31, // BET
    0xFB32, // GIMEL
    0xFB33, // DALET
    0xFB34, // HE
    0xFB35, // VAV
    0xFB36, // ZAYIN
    0x0000, // HET
    0xFB38, // TET
    0xFB39, // YOD
    0xFB3A, // FINAL KAF
    0xFB3B, // KAF
    0xFB3C, // LAMED
    0x0000, // FINAL MEM
    0xFB3E, // MEM
    0x0000, // FINAL NUN
    0xFB40, // NUN
    0xFB41, // SAMEKH
    0x0000, // AYIN
    0xFB43, // FINAL PE
    0xFB44, // PE
    0x0000, // FINAL TSADI
    0xFB46, // TSADI
    0xFB47, // QOF
    0xFB48, // RESH
    0xFB49, // SHIN
    0xFB4A, // TAV
];

/// Hebrew presentation-form shaping: compositions excluded from standard
/// normalization but wanted for old fonts that only carry the Alphabetic
/// Presentation Forms block.
fn compose(ctx: &NormalizeContext<'_>, a: char, b: char) -> Option<char> {
    match unicode::compose(a, b) {
        Some(c) => Some(c),
        None if !ctx.plan.has_gpos_mark => {
            let a = a as u32;
            let composed = match b as u32 {
                0x05B4 => match a {
                    // HIRIQ
                    0x05D9 => Some(0xFB1D), // YOD
                    _ => None,
                },
                0x05B7 => match a {
                    // PATAH
                    0x05F2 => Some(0xFB1F), // YIDDISH YOD YOD
                    0x05D0 => Some(0xFB2E), // ALEF
                    _ => None,
                },
                0x05B8 => match a {
                    // QAMATS
                    0x05D0 => Some(0xFB2F), // ALEF
                    _ => None,
                },
                0x05B9 => match a {
                    // HOLAM
                    0x05D5 => Some(0xFB4B), // VAV
                    _ => None,
                },
                0x05BC => match a {
                    // DAGESH
                    0x05D0..=0x05EA => {
                        match S_DAGESH_FORMS[a as usize - 0x05D0] {
                            0 => None,
                            c => Some(c),
                        }
                    }
                    0xFB2A => Some(0xFB2C), // SHIN WITH SHIN DOT
                    0xFB2B => Some(0xFB2D), // SHIN WITH SIN DOT
                    _ => None,
                },
                0x05BF => match a {
                    // RAFE
                    0x05D1 => Some(0xFB4C), // BET
                    0x05DB => Some(0xFB4D), // KAF
                    0x05E4 => Some(0xFB4E), // PE
                    _ => None,
                },
                0x05C1 => match a {
                    // SHIN DOT
                    0x05E9 => Some(0xFB2A), // SHIN
                    0xFB49 => Some(0xFB2C), // SHIN WITH DAGESH
                    _ => None,
                },
                0x05C2 => match a {
                    // SIN DOT
                    0x05E9 => Some(0xFB2B), // SHIN
                    0xFB49 => Some(0xFB2D), // SHIN WITH DAGESH
                    _ => None,
                },
                _ => None,
            };
            composed.and_then(char::from_u32)
        }
        None => None,
    }
}
