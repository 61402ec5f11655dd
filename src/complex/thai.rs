//! Shaping for Thai and Lao.
//!
//! Thai needs no OpenType machinery beyond the default features; the work
//! here is the SARA AM decomposition: U+0E33 splits into NIKHAHIT + SARA AA
//! (likewise Lao U+0EB3), and the NIKHAHIT then reorders before any tone
//! marks sitting on the same base.

use crate::buffer::{Buffer, BufferScratchFlags, GlyphInfo};
use crate::face::Face;
use crate::normalize::NormalizationMode;
use crate::plan::ShapePlan;

use super::{ComplexShaper, ZeroWidthMarks};

pub(crate) static THAI_SHAPER: ComplexShaper = ComplexShaper {
    collect_features: None,
    override_features: None,
    create_data: None,
    preprocess_text: Some(preprocess_text),
    postprocess_glyphs: None,
    normalization_mode: NormalizationMode::Auto,
    decompose: None,
    compose: None,
    setup_masks: None,
    gpos_tag: None,
    reorder_marks: None,
    zero_width_marks: ZeroWidthMarks::ByGdefLate,
    fallback_position: false,
};

fn is_sara_am(cp: u32) -> bool {
    // Thai and Lao AM.
    cp | 0x0080 == 0x0EB3
}

fn nikhahit_from_sara_am(cp: u32) -> u32 {
    // U+0E33 -> U+0E4D, U+0EB3 -> U+0ECD.
    cp - 0x0E33 + 0x0E4D
}

fn sara_aa_from_sara_am(cp: u32) -> u32 {
    cp - 1
}

fn is_above_base_mark(cp: u32) -> bool {
    // Tone marks and above-vowels that NIKHAHIT must precede.
    matches!(cp | 0x0080, 0x0EB1 | 0x0EB4..=0x0EB7 | 0x0EBB | 0x0EC8..=0x0ECD)
}

fn preprocess_text(_plan: &ShapePlan, _face: &dyn Face, buffer: &mut Buffer) {
    // The SARA AM split runs on all Thai/Lao text; everything else is the
    // font's business.
    if !buffer.info.iter().any(|info| is_sara_am(info.codepoint)) {
        return;
    }

    buffer.clear_output();
    buffer.idx = 0;
    while buffer.idx < buffer.len() && buffer.allocation_successful() {
        let cp = buffer.cur(0).codepoint;
        if !is_sara_am(cp) {
            buffer.next_glyph();
            continue;
        }

        // Break SARA AM into NIKHAHIT + SARA AA, both keeping the cluster.
        let nikhahit_cp = nikhahit_from_sara_am(cp);
        let mut nikhahit = GlyphInfo {
            codepoint: nikhahit_cp,
            cluster: buffer.cur(0).cluster,
            mask: buffer.cur(0).mask,
            ..GlyphInfo::default()
        };
        let mut scratch = buffer.scratch_flags;
        nikhahit.init_unicode_props(&mut scratch);
        buffer.scratch_flags = scratch | BufferScratchFlags::COMPLEX0;

        buffer.output_info(nikhahit);
        buffer.replace_glyph(sara_aa_from_sara_am(cp));

        // Walk the NIKHAHIT back over any above-base marks between it and
        // the base consonant.
        let out_len = buffer.out_len();
        if out_len >= 2 {
            let out = buffer.out_info_mut();
            let mut i = out_len - 2; // position of the NIKHAHIT
            while i > 0 && is_above_base_mark(out[i - 1].codepoint) {
                out.swap(i, i - 1);
                i -= 1;
            }
            buffer.merge_out_clusters(i, out_len);
        }
    }
    buffer.sync();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::Face;

    struct NullFace;
    impl Face for NullFace {
        fn table(&self, _tag: u32) -> Option<&[u8]> {
            None
        }
        fn glyph_index(&self, _cp: u32, _vs: Option<u32>) -> Option<u16> {
            Some(1)
        }
        fn advance_h(&self, _glyph: u16) -> i32 {
            500
        }
    }

    fn preprocessed(text: &str) -> Vec<u32> {
        let mut buffer = Buffer::new();
        buffer.add_str(text);
        let mut scratch = BufferScratchFlags::default();
        for info in &mut buffer.info {
            info.init_unicode_props(&mut scratch);
        }
        let plan = crate::plan::ShapePlan::new(&NullFace, &{
            let mut props = crate::segment::SegmentProperties::default();
            props.script = Some(unicode_script::Script::Thai);
            props.direction = crate::segment::Direction::LeftToRight;
            props
        }, &[]);
        preprocess_text(&plan, &NullFace, &mut buffer);
        buffer.info.iter().map(|info| info.codepoint).collect()
    }

    #[test]
    fn test_sara_am_splits() {
        // KO KAI + SARA AM -> KO KAI + NIKHAHIT + SARA AA.
        assert_eq!(preprocessed("\u{0E01}\u{0E33}"), vec![0x0E01, 0x0E4D, 0x0E32]);
    }

    #[test]
    fn test_nikhahit_reorders_before_tone_mark() {
        // KO KAI + MAI EK + SARA AM: NIKHAHIT jumps the tone mark.
        assert_eq!(
            preprocessed("\u{0E01}\u{0E48}\u{0E33}"),
            vec![0x0E01, 0x0E4D, 0x0E48, 0x0E32]
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(preprocessed("\u{0E01}\u{0E02}"), vec![0x0E01, 0x0E02]);
    }
}
