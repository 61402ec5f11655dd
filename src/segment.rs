//! Segment properties: direction, script, language, and user features.

use std::fmt;
use std::str::FromStr;

use unicode_script::Script;

use crate::error::ParseError;
use crate::tag;

/// The direction of a text segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Invalid,
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::LeftToRight | Direction::RightToLeft)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::TopToBottom | Direction::BottomToTop)
    }

    /// Backward directions run against increasing cluster order.
    pub fn is_backward(self) -> bool {
        matches!(self, Direction::RightToLeft | Direction::BottomToTop)
    }

    pub fn is_forward(self) -> bool {
        matches!(self, Direction::LeftToRight | Direction::TopToBottom)
    }

    pub fn reverse(self) -> Direction {
        match self {
            Direction::Invalid => Direction::Invalid,
            Direction::LeftToRight => Direction::RightToLeft,
            Direction::RightToLeft => Direction::LeftToRight,
            Direction::TopToBottom => Direction::BottomToTop,
            Direction::BottomToTop => Direction::TopToBottom,
        }
    }
}

/// The natural horizontal direction of a script.
///
/// Scripts not listed here are either left-to-right or have no horizontal
/// preference.
pub fn script_horizontal_direction(script: Script) -> Direction {
    match script {
        Script::Arabic
        | Script::Hebrew
        | Script::Syriac
        | Script::Thaana
        | Script::Nko
        | Script::Samaritan
        | Script::Mandaic
        | Script::Adlam
        | Script::Hanifi_Rohingya => Direction::RightToLeft,
        _ => Direction::LeftToRight,
    }
}

/// A BCP 47 language tag.
///
/// Comparison is case-insensitive; the tag is stored lowercased.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Language(String);

impl Language {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Language {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Language, ParseError> {
        if s.is_empty() || !s.is_ascii() {
            return Err(ParseError::BadValue);
        }
        Ok(Language(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Properties of a text segment: direction, script, and language.
///
/// Two segments are equal iff all three properties match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SegmentProperties {
    pub direction: Direction,
    pub script: Option<Script>,
    pub language: Option<Language>,
}

/// Value to use for [Feature] `end` to mean "to the end of the buffer".
pub const FEATURE_GLOBAL_END: u32 = u32::MAX;

/// A user-requested feature with a value and an application range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feature {
    /// OpenType feature tag, a big-endian ASCII quad.
    pub tag: u32,
    pub value: u32,
    /// Cluster at which the feature starts applying.
    pub start: u32,
    /// Cluster before which the feature stops applying. `u32::MAX` means to
    /// the end of the buffer.
    pub end: u32,
}

impl Feature {
    pub fn new(tag: u32, value: u32) -> Feature {
        Feature {
            tag,
            value,
            start: 0,
            end: FEATURE_GLOBAL_END,
        }
    }

    pub fn is_global(&self) -> bool {
        self.start == 0 && self.end == FEATURE_GLOBAL_END
    }
}

/// The OpenType script tags to try for a Unicode script, in order of
/// preference. Indic scripts have a version 2 tag that supersedes the
/// original one.
pub fn ot_script_tags(script: Script) -> &'static [u32] {
    match script {
        Script::Arabic => &[tag::ARAB],
        Script::Bengali => &[tag::BNG2, tag::BENG],
        Script::Cyrillic => &[tag::CYRL],
        Script::Devanagari => &[tag::DEV2, tag::DEVA],
        Script::Greek => &[tag::GREK],
        Script::Gujarati => &[tag::GJR2, tag::GUJR],
        Script::Gurmukhi => &[tag::GUR2, tag::GURU],
        Script::Hangul => &[tag::HANG],
        Script::Hebrew => &[tag::HEBR],
        Script::Kannada => &[tag::KND2, tag::KNDA],
        Script::Khmer => &[tag::KHMR],
        Script::Lao => &[tag::LAO],
        Script::Latin => &[tag::LATN],
        Script::Malayalam => &[tag::MLM2, tag::MLYM],
        Script::Myanmar => &[tag::MYM2, tag::MYMR],
        Script::Oriya => &[tag::ORY2, tag::ORYA],
        Script::Sinhala => &[tag::SINH],
        Script::Syriac => &[tag::SYRC],
        Script::Tamil => &[tag::TML2, tag::TAML],
        Script::Telugu => &[tag::TEL2, tag::TELU],
        Script::Thai => &[tag::THAI],
        Script::Tibetan => &[tag::TIBT],
        _ => &[tag::DFLT],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_case_insensitive() {
        let a = Language::from_str("EN-us").unwrap();
        let b = Language::from_str("en-US").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_segment_properties_eq() {
        let a = SegmentProperties {
            direction: Direction::LeftToRight,
            script: Some(Script::Latin),
            language: Some(Language::from_str("en").unwrap()),
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.direction = Direction::RightToLeft;
        assert_ne!(a, b);
    }

    #[test]
    fn test_direction() {
        assert!(Direction::RightToLeft.is_backward());
        assert!(Direction::RightToLeft.is_horizontal());
        assert_eq!(Direction::TopToBottom.reverse(), Direction::BottomToTop);
        assert_eq!(
            script_horizontal_direction(Script::Hebrew),
            Direction::RightToLeft
        );
    }
}
