//! The Unicode character property adapter.
//!
//! Everything the shaper needs from the Unicode character database comes
//! through this module: general category, combining classes (in their
//! shaping-modified form), script, mirroring, canonical composition and
//! decomposition, and the various small character classifications the
//! pipeline keys off (default-ignorable, variation selectors, space
//! variants).

use unicode_canonical_combining_class::get_canonical_combining_class;
use unicode_general_category::get_general_category;
pub use unicode_general_category::GeneralCategory;
use unicode_script::{Script, UnicodeScript};

/// ZERO WIDTH NON-JOINER
pub const ZWNJ: u32 = 0x200C;
/// ZERO WIDTH JOINER
pub const ZWJ: u32 = 0x200D;
/// COMBINING GRAPHEME JOINER
pub const CGJ: u32 = 0x034F;
/// DOTTED CIRCLE, the base inserted under orphaned marks
pub const DOTTED_CIRCLE: u32 = 0x25CC;

pub fn general_category(c: char) -> GeneralCategory {
    get_general_category(c)
}

pub fn is_mark(gc: GeneralCategory) -> bool {
    matches!(
        gc,
        GeneralCategory::NonspacingMark
            | GeneralCategory::SpacingMark
            | GeneralCategory::EnclosingMark
    )
}

pub fn combining_class(c: char) -> u8 {
    get_canonical_combining_class(c) as u8
}

/// The canonical combining class of `c` remapped for shaping.
///
/// The canonical order of some mark sequences is typographically undesirable;
/// the Hebrew classes are reordered in accordance with the SBL Hebrew Font
/// User Manual and the Arabic ones so that Shadda sorts before the vowel
/// marks. Telugu length marks and the Thai Phinthu get otherwise-unassigned
/// low classes so they stay put relative to viramas.
pub fn modified_combining_class(c: char) -> u8 {
    if c <= '\u{02FF}' {
        // Latin fast path; nothing below U+0300 reorders.
        0
    } else {
        mcc_for_ccc(combining_class(c))
    }
}

/// Map a canonical combining class value to its modified value.
pub fn mcc_for_ccc(ccc: u8) -> u8 {
    match ccc {
        // Hebrew
        10 => 22, // sheva
        11 => 15, // hataf segol
        12 => 16, // hataf patah
        13 => 17, // hataf qamats
        14 => 23, // hiriq
        15 => 18, // tsere
        16 => 19, // segol
        17 => 20, // patah
        18 => 21, // qamats
        19 => 14, // holam
        20 => 24, // qubuts
        21 => 12, // dagesh
        22 => 25, // meteg
        23 => 13, // rafe
        24 => 10, // shin dot
        25 => 11, // sin dot
        // Telugu length marks would otherwise reorder past a Halant.
        84 => 4,
        91 => 5,
        // Thai U+0E38/U+0E39 must not reorder past a Phinthu.
        103 => 3,
        // Unassigned classes reorder to zero.
        2..=5 | 37..=83 | 85..=90 | 92..=102 | 104..=106 | 108..=117 => 0,
        119..=121 | 123..=128 | 131 | 133..=201 => 0,
        203..=213 | 215 | 217 | 219 | 221 | 223 | 225 | 227 | 229 | 231 => 0,
        235..=239 | 241..=255 => 0,
        other => other,
    }
}

pub fn script(c: char) -> Script {
    c.script()
}

/// The mirrored counterpart of `c` for right-to-left rendering, if any.
pub fn mirror_char(c: char) -> Option<char> {
    unicode_bidi_mirroring::get_mirrored(c)
}

/// Canonically compose two code points.
pub fn compose(a: char, b: char) -> Option<char> {
    unicode_normalization::char::compose(a, b)
}

/// A single step of canonical decomposition: `ab` into a pair `(a, b)`, or
/// `(a, None)` for a singleton decomposition.
///
/// The ecosystem decomposition routine yields the full recursive expansion,
/// so the single-step pair is recovered by re-composing the prefix.
pub fn decompose(ab: char) -> Option<(char, Option<char>)> {
    let mut parts = tinyvec::TinyVec::<[char; 4]>::new();
    unicode_normalization::char::decompose_canonical(ab, |c| parts.push(c));
    match parts.as_slice() {
        [] => None,
        [single] if *single == ab => None,
        [single] => Some((*single, None)),
        [a, b] => Some((*a, Some(*b))),
        [init @ .., last] => {
            let mut head = init[0];
            for &c in &init[1..] {
                head = compose(head, c)?;
            }
            Some((head, Some(*last)))
        }
    }
}

/// Unicode Default_Ignorable_Code_Point.
pub fn is_default_ignorable(cp: u32) -> bool {
    match cp {
        0x00AD => true,                      // SOFT HYPHEN
        0x034F => true,                      // COMBINING GRAPHEME JOINER
        0x061C => true,                      // ARABIC LETTER MARK
        0x115F | 0x1160 => true,             // HANGUL FILLERS
        0x17B4 | 0x17B5 => true,             // KHMER VOWEL INHERENT
        0x180B..=0x180E => true,             // MONGOLIAN FVS, VOWEL SEPARATOR
        0x200B..=0x200F => true,             // ZWSP..RLM
        0x202A..=0x202E => true,             // embedding controls
        0x2060..=0x206F => true,             // WJ..invisible operators
        0x3164 => true,                      // HANGUL FILLER
        0xFE00..=0xFE0F => true,             // variation selectors
        0xFEFF => true,                      // ZWNBSP
        0xFFA0 => true,                      // HALFWIDTH HANGUL FILLER
        0x1BCA0..=0x1BCA3 => true,           // shorthand format controls
        0x1D173..=0x1D17A => true,           // musical controls
        0xE0000..=0xE0FFF => true,           // tags, variation selector supplement
        _ => false,
    }
}

pub fn is_variation_selector(cp: u32) -> bool {
    matches!(cp, 0x180B..=0x180D | 0xFE00..=0xFE0F | 0xE0100..=0xE01EF)
}

/// Classification of Unicode space characters by their typographic width.
///
/// When a font lacks a glyph for a space variant, the plain space glyph is
/// substituted and its advance synthesized from this classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceWidth {
    Em,
    Em2,
    Em3,
    Em4,
    Em6,
    Em16,
    FourEm18,
    Space,
    Figure,
    Punctuation,
    Narrow,
}

impl SpaceWidth {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SpaceWidth::Em => 0,
            SpaceWidth::Em2 => 1,
            SpaceWidth::Em3 => 2,
            SpaceWidth::Em4 => 3,
            SpaceWidth::Em6 => 4,
            SpaceWidth::Em16 => 5,
            SpaceWidth::FourEm18 => 6,
            SpaceWidth::Space => 7,
            SpaceWidth::Figure => 8,
            SpaceWidth::Punctuation => 9,
            SpaceWidth::Narrow => 10,
        }
    }

    pub(crate) fn from_u8(n: u8) -> Option<SpaceWidth> {
        Some(match n {
            0 => SpaceWidth::Em,
            1 => SpaceWidth::Em2,
            2 => SpaceWidth::Em3,
            3 => SpaceWidth::Em4,
            4 => SpaceWidth::Em6,
            5 => SpaceWidth::Em16,
            6 => SpaceWidth::FourEm18,
            7 => SpaceWidth::Space,
            8 => SpaceWidth::Figure,
            9 => SpaceWidth::Punctuation,
            10 => SpaceWidth::Narrow,
            _ => return None,
        })
    }
}

pub fn space_fallback(cp: u32) -> Option<SpaceWidth> {
    match cp {
        0x00A0 | 0x202F => Some(SpaceWidth::Narrow),
        0x2000 | 0x2002 => Some(SpaceWidth::Em2), // EN QUAD, EN SPACE
        0x2001 | 0x2003 => Some(SpaceWidth::Em),  // EM QUAD, EM SPACE
        0x2004 => Some(SpaceWidth::Em3),
        0x2005 => Some(SpaceWidth::Em4),
        0x2006 => Some(SpaceWidth::Em6),
        0x2007 => Some(SpaceWidth::Figure),
        0x2008 => Some(SpaceWidth::Punctuation),
        0x2009 => Some(SpaceWidth::Em),
        0x200A => Some(SpaceWidth::Em16),
        0x205F => Some(SpaceWidth::FourEm18), // MMSP: 4/18 em
        0x3000 => Some(SpaceWidth::Em),
        _ => None,
    }
}

/// Encode a general category into the 5 bits of buffer scratch space.
pub(crate) fn gc_to_u8(gc: GeneralCategory) -> u8 {
    match gc {
        GeneralCategory::Control => 0,
        GeneralCategory::Format => 1,
        GeneralCategory::Unassigned => 2,
        GeneralCategory::PrivateUse => 3,
        GeneralCategory::Surrogate => 4,
        GeneralCategory::LowercaseLetter => 5,
        GeneralCategory::ModifierLetter => 6,
        GeneralCategory::OtherLetter => 7,
        GeneralCategory::TitlecaseLetter => 8,
        GeneralCategory::UppercaseLetter => 9,
        GeneralCategory::SpacingMark => 10,
        GeneralCategory::EnclosingMark => 11,
        GeneralCategory::NonspacingMark => 12,
        GeneralCategory::DecimalNumber => 13,
        GeneralCategory::LetterNumber => 14,
        GeneralCategory::OtherNumber => 15,
        GeneralCategory::ConnectorPunctuation => 16,
        GeneralCategory::DashPunctuation => 17,
        GeneralCategory::ClosePunctuation => 18,
        GeneralCategory::FinalPunctuation => 19,
        GeneralCategory::InitialPunctuation => 20,
        GeneralCategory::OtherPunctuation => 21,
        GeneralCategory::OpenPunctuation => 22,
        GeneralCategory::CurrencySymbol => 23,
        GeneralCategory::ModifierSymbol => 24,
        GeneralCategory::MathSymbol => 25,
        GeneralCategory::OtherSymbol => 26,
        GeneralCategory::LineSeparator => 27,
        GeneralCategory::ParagraphSeparator => 28,
        GeneralCategory::SpaceSeparator => 29,
        _ => unreachable!("GeneralCategory is exhaustively matched above"),
    }
}

pub(crate) fn gc_from_u8(n: u8) -> GeneralCategory {
    match n {
        0 => GeneralCategory::Control,
        1 => GeneralCategory::Format,
        2 => GeneralCategory::Unassigned,
        3 => GeneralCategory::PrivateUse,
        4 => GeneralCategory::Surrogate,
        5 => GeneralCategory::LowercaseLetter,
        6 => GeneralCategory::ModifierLetter,
        7 => GeneralCategory::OtherLetter,
        8 => GeneralCategory::TitlecaseLetter,
        9 => GeneralCategory::UppercaseLetter,
        10 => GeneralCategory::SpacingMark,
        11 => GeneralCategory::EnclosingMark,
        12 => GeneralCategory::NonspacingMark,
        13 => GeneralCategory::DecimalNumber,
        14 => GeneralCategory::LetterNumber,
        15 => GeneralCategory::OtherNumber,
        16 => GeneralCategory::ConnectorPunctuation,
        17 => GeneralCategory::DashPunctuation,
        18 => GeneralCategory::ClosePunctuation,
        19 => GeneralCategory::FinalPunctuation,
        20 => GeneralCategory::InitialPunctuation,
        21 => GeneralCategory::OtherPunctuation,
        22 => GeneralCategory::OpenPunctuation,
        23 => GeneralCategory::CurrencySymbol,
        24 => GeneralCategory::ModifierSymbol,
        25 => GeneralCategory::MathSymbol,
        26 => GeneralCategory::OtherSymbol,
        27 => GeneralCategory::LineSeparator,
        28 => GeneralCategory::ParagraphSeparator,
        _ => GeneralCategory::SpaceSeparator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_pair() {
        assert_eq!(decompose('é'), Some(('e', Some('\u{0301}'))));
    }

    #[test]
    fn test_decompose_chained() {
        // U+01FB LATIN SMALL LETTER A WITH RING ABOVE AND ACUTE decomposes in
        // a single step to U+00E5 + U+0301.
        assert_eq!(decompose('\u{01FB}'), Some(('\u{00E5}', Some('\u{0301}'))));
    }

    #[test]
    fn test_decompose_none() {
        assert_eq!(decompose('a'), None);
    }

    #[test]
    fn test_compose() {
        assert_eq!(compose('e', '\u{0301}'), Some('é'));
        assert_eq!(compose('x', '\u{0301}'), None);
    }

    #[test]
    fn test_modified_combining_class() {
        // Shadda (ccc 33) keeps its class, Hebrew sheva (ccc 10) moves to 22.
        assert_eq!(modified_combining_class('\u{0651}'), 33);
        assert_eq!(modified_combining_class('\u{05B0}'), 22);
        // Thai sara u (ccc 103) maps low.
        assert_eq!(modified_combining_class('\u{0E38}'), 3);
        // Latin fast path.
        assert_eq!(modified_combining_class('a'), 0);
    }

    #[test]
    fn test_default_ignorable() {
        assert!(is_default_ignorable(0x200B));
        assert!(is_default_ignorable(ZWJ));
        assert!(!is_default_ignorable('a' as u32));
    }

    #[test]
    fn test_gc_round_trip() {
        for n in 0..30u8 {
            assert_eq!(gc_to_u8(gc_from_u8(n)), n);
        }
    }
}
