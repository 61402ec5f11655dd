//! Script-specific shapers.
//!
//! A complex shaper is a capability record: feature collection, text
//! pre/postprocessing, normalization preferences, composition overrides,
//! mask setup, and positioning policies. The planner selects one static
//! instance per script; the default shaper does the minimum.

pub(crate) mod arabic;
pub(crate) mod hangul;
pub(crate) mod hebrew;
pub(crate) mod indic;
pub(crate) mod khmer;
pub(crate) mod myanmar;
pub(crate) mod syllable;
pub(crate) mod thai;
pub(crate) mod use_;

use unicode_script::Script;

use crate::buffer::Buffer;
use crate::face::Face;
use crate::normalize::{NormalizationMode, NormalizeContext};
use crate::plan::{ShapePlan, ShapePlanner, ShaperData};
use crate::segment::Direction;
use crate::tag;
use crate::unicode;

/// When (and by what evidence) mark advances are zeroed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ZeroWidthMarks {
    None,
    ByGdefEarly,
    ByGdefLate,
    ByUnicodeEarly,
    ByUnicodeLate,
    /// Zero advances only, leaving offsets alone. Used on the AAT path,
    /// where fonts position marks with zero-advance glyphs directly.
    Advances,
}

pub(crate) struct ComplexShaper {
    /// Called while planning; adds the shaper's features and pauses.
    pub collect_features: Option<fn(&mut ShapePlanner<'_>)>,
    /// Called after common and user features are in, to override them.
    pub override_features: Option<fn(&mut ShapePlanner<'_>)>,
    /// Compiles shaper-private plan data (e.g. resolved mask arrays).
    pub create_data: Option<fn(&ShapePlan) -> ShaperData>,
    /// May rewrite the text before normalization.
    pub preprocess_text: Option<fn(&ShapePlan, &dyn Face, &mut Buffer)>,
    /// May rewrite the glyphs after positioning.
    pub postprocess_glyphs: Option<fn(&ShapePlan, &dyn Face, &mut Buffer)>,
    pub normalization_mode: NormalizationMode,
    pub decompose: Option<fn(&NormalizeContext<'_>, char) -> Option<(char, Option<char>)>>,
    pub compose: Option<fn(&NormalizeContext<'_>, char, char) -> Option<char>>,
    /// Sets per-glyph feature masks; may not change the characters.
    pub setup_masks: Option<fn(&ShapePlan, &dyn Face, &mut Buffer)>,
    /// If set, GPOS only applies when this script was chosen in GPOS;
    /// otherwise fallback positioning runs.
    pub gpos_tag: Option<u32>,
    /// Adjusts mark ordering within one combining-class run.
    pub reorder_marks: Option<fn(&ShapePlan, &mut Buffer, usize, usize)>,
    pub zero_width_marks: ZeroWidthMarks,
    pub fallback_position: bool,
}

pub(crate) static DEFAULT_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::ByGdefLate,
    fallback_position: true,
};

// Same as the default shaper, but without mark advance zeroing or fallback
// positioning. Used on the AAT path, where the font is trusted to have
// dealt with marks itself.
pub(crate) static DUMBER_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: None,
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::Advances,
    fallback_position: false,
};

/// Pick the shaper for a script.
///
/// The chosen GSUB script matters in two places: Indic scripts whose fonts
/// only carry the version 2 tables go through the Universal Shaping Engine
/// conventions of their fonts, and Arabic-script fallback shaping only
/// exists for Arabic proper.
pub(crate) fn categorize(
    script: Option<Script>,
    direction: Direction,
    chosen_gsub_script: Option<u32>,
) -> &'static ComplexShaper {
    let Some(script) = script else {
        return &DEFAULT_SHAPER;
    };

    match script {
        Script::Arabic | Script::Syriac => {
            // Arabic shaping only makes sense horizontally; for Syriac,
            // only when the font engaged an Arabic-style script.
            if (chosen_gsub_script != Some(tag::DFLT) || script == Script::Arabic)
                && direction.is_horizontal()
            {
                &arabic::ARABIC_SHAPER
            } else {
                &DEFAULT_SHAPER
            }
        }

        Script::Thai | Script::Lao => &thai::THAI_SHAPER,

        Script::Hangul => &hangul::HANGUL_SHAPER,

        Script::Hebrew => &hebrew::HEBREW_SHAPER,

        Script::Bengali
        | Script::Devanagari
        | Script::Gujarati
        | Script::Gurmukhi
        | Script::Kannada
        | Script::Malayalam
        | Script::Oriya
        | Script::Sinhala
        | Script::Tamil
        | Script::Telugu => {
            // If the font only knows the default script, shaping the old way
            // does more harm than good.
            if chosen_gsub_script == Some(tag::DFLT) {
                &DEFAULT_SHAPER
            } else {
                &indic::INDIC_SHAPER
            }
        }

        Script::Khmer => &khmer::KHMER_SHAPER,

        Script::Myanmar => {
            if chosen_gsub_script == Some(tag::MYM2) {
                &myanmar::MYANMAR_SHAPER
            } else {
                // Legacy mymr fonts predate the reordering conventions.
                &DEFAULT_SHAPER
            }
        }

        // Tibetan works with the default shaper plus composed normalization.
        Script::Tibetan => &DEFAULT_SHAPER,

        Script::Balinese
        | Script::Batak
        | Script::Buginese
        | Script::Buhid
        | Script::Chakma
        | Script::Cham
        | Script::Hanunoo
        | Script::Javanese
        | Script::Kaithi
        | Script::Kharoshthi
        | Script::Khojki
        | Script::Lepcha
        | Script::Limbu
        | Script::Mahajani
        | Script::Meetei_Mayek
        | Script::Modi
        | Script::New_Tai_Lue
        | Script::Rejang
        | Script::Saurashtra
        | Script::Sharada
        | Script::Siddham
        | Script::Sundanese
        | Script::Syloti_Nagri
        | Script::Tagalog
        | Script::Tagbanwa
        | Script::Tai_Le
        | Script::Tai_Tham
        | Script::Tai_Viet
        | Script::Takri
        | Script::Tirhuta => &use_::USE_SHAPER,

        _ => &DEFAULT_SHAPER,
    }
}

/// Insert dotted circles under syllables the machine flagged as broken.
/// Used by the syllabic shapers from their first substitution pause.
pub(crate) fn insert_dotted_circles(
    face: &dyn Face,
    buffer: &mut Buffer,
    broken_category: u8,
    dotted_circle_category: u8,
    repha_category: Option<u8>,
) {
    use crate::buffer::BufferFlags;

    if buffer
        .flags
        .contains(BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
    {
        return;
    }

    let has_broken = buffer
        .info
        .iter()
        .any(|info| info.syllable() & 0x0F == broken_category);
    if !has_broken {
        return;
    }

    let Some(dotted_circle_glyph) = face.glyph_index(unicode::DOTTED_CIRCLE, None) else {
        return;
    };

    let mut dotted_circle = crate::buffer::GlyphInfo {
        codepoint: unicode::DOTTED_CIRCLE,
        ..Default::default()
    };
    let mut scratch = buffer.scratch_flags;
    dotted_circle.init_unicode_props(&mut scratch);
    buffer.scratch_flags = scratch;
    dotted_circle.complex_cat = dotted_circle_category;
    dotted_circle.glyph_index = u32::from(dotted_circle_glyph);

    buffer.clear_output();
    buffer.idx = 0;
    let mut last_syllable = 0u8;
    while buffer.idx < buffer.len() && buffer.allocation_successful() {
        let syllable = buffer.cur(0).syllable();
        if last_syllable != syllable && syllable & 0x0F == broken_category {
            last_syllable = syllable;

            let mut ginfo = dotted_circle;
            ginfo.cluster = buffer.cur(0).cluster;
            ginfo.mask = buffer.cur(0).mask;
            ginfo.set_syllable(buffer.cur(0).syllable());

            // An initial repha stays ahead of the inserted base.
            if let Some(repha) = repha_category {
                while buffer.idx < buffer.len()
                    && last_syllable == buffer.cur(0).syllable()
                    && buffer.cur(0).complex_cat == repha
                {
                    buffer.next_glyph();
                }
            }

            buffer.output_info(ginfo);
        } else {
            last_syllable = syllable;
        }
        buffer.next_glyph();
    }
    buffer.sync();
}
