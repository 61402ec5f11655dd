//! The shaping normalizer.
//!
//! This closely follows the Unicode Normalization Algorithm, yet it is
//! different: each cluster is decomposed into a chain of 1:2 decompositions,
//! marks are reordered by modified combining class, and the result is
//! recomposed if the selected shaper prefers composed text. Decomposition
//! and recomposition only happen when the font supports the resulting
//! characters, so canonically equivalent strings render alike with whatever
//! glyph repertoire the font has. Complex shapers can override the
//! composition and decomposition functions to impose script-specific rules
//! (e.g. Hebrew presentation forms, or forbidding matra recomposition).

use crate::buffer::{Buffer, BufferScratchFlags, GlyphInfo};
use crate::face::Face;
use crate::plan::ShapePlan;
use crate::unicode::{self, GeneralCategory};

pub(crate) const MAX_COMBINING_MARKS: usize = 32;

/// How the selected shaper wants its input normalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    None,
    Decomposed,
    /// Composes diacritics, but never base-to-base.
    ComposedDiacritics,
    /// Always fully decomposes, then recomposes back.
    ComposedDiacriticsNoShortCircuit,
    #[default]
    Auto,
}

/// Context handed to the shaper composition hooks.
pub(crate) struct NormalizeContext<'a> {
    pub plan: &'a ShapePlan,
    pub face: &'a dyn Face,
}

impl NormalizeContext<'_> {
    fn decompose(&self, ab: char) -> Option<(char, Option<char>)> {
        match self.plan.shaper.decompose {
            Some(func) => func(self, ab),
            None => unicode::decompose(ab),
        }
    }

    fn compose(&self, a: char, b: char) -> Option<char> {
        match self.plan.shaper.compose {
            Some(func) => func(self, a, b),
            None => unicode::compose(a, b),
        }
    }
}

pub(crate) fn normalize(plan: &ShapePlan, face: &dyn Face, buffer: &mut Buffer) {
    if buffer.is_empty() {
        return;
    }

    let mut mode = plan.shaper.normalization_mode;
    if mode == NormalizationMode::Auto {
        mode = NormalizationMode::ComposedDiacritics;
    }

    let ctx = NormalizeContext { plan, face };

    let always_short_circuit = mode == NormalizationMode::None;
    let might_short_circuit = always_short_circuit
        || !matches!(
            mode,
            NormalizationMode::Decomposed | NormalizationMode::ComposedDiacriticsNoShortCircuit
        );

    // Three rounds: decompose, reorder, recompose (if desired). The first
    // and last rewrite the buffer; the middle one is in place.

    // First round: decompose.
    let mut all_simple = true;
    {
        let count = buffer.len();
        buffer.idx = 0;
        buffer.clear_output();
        loop {
            let mut end = buffer.idx + 1;
            while end < count && !buffer.info[end].is_unicode_mark() {
                end += 1;
            }

            if end < count {
                // Leave one base for the marks to cluster with.
                end -= 1;
            }

            // Glyphs from idx to end form simple, mark-free clusters.
            if might_short_circuit {
                let len = end - buffer.idx;
                let mut done = 0;
                while done < len {
                    let cp = buffer.cur(done).codepoint;
                    match face.glyph_index(cp, None) {
                        Some(glyph) => buffer.cur_mut(done).glyph_index = u32::from(glyph),
                        None => break,
                    }
                    done += 1;
                }
                buffer.next_glyphs(done);
            }

            while buffer.idx < end && buffer.allocation_successful() {
                decompose_current_character(&ctx, buffer, might_short_circuit);
            }

            if buffer.idx == count || !buffer.allocation_successful() {
                break;
            }

            all_simple = false;

            // Gather the full mark cluster.
            end = buffer.idx + 1;
            while end < count && buffer.info[end].is_unicode_mark() {
                end += 1;
            }

            decompose_multi_char_cluster(&ctx, buffer, end, always_short_circuit);

            if buffer.idx >= count || !buffer.allocation_successful() {
                break;
            }
        }
        buffer.swap_buffers();
    }

    // Second round: reorder marks, in place.
    if !all_simple {
        let count = buffer.len();
        let mut i = 0;
        while i < count {
            if buffer.info[i].modified_combining_class() == 0 {
                i += 1;
                continue;
            }

            let mut end = i + 1;
            while end < count && buffer.info[end].modified_combining_class() != 0 {
                end += 1;
            }

            // The sort is quadratic; leave absurd runs alone.
            if end - i <= MAX_COMBINING_MARKS {
                buffer.sort(i, end, |a, b| {
                    a.modified_combining_class()
                        .cmp(&b.modified_combining_class())
                });

                if let Some(reorder_marks) = plan.shaper.reorder_marks {
                    reorder_marks(plan, buffer, i, end);
                }
            }

            i = end + 1;
        }
    }

    if buffer
        .scratch_flags
        .contains(BufferScratchFlags::HAS_CGJ)
    {
        // A CGJ exists to block reordering. Where it did not actually block
        // anything, make it skippable.
        for i in 1..buffer.len().saturating_sub(1) {
            if buffer.info[i].codepoint == unicode::CGJ {
                let last = buffer.info[i - 1].modified_combining_class();
                let next = buffer.info[i + 1].modified_combining_class();
                if next == 0 || last <= next {
                    buffer.info[i].unhide();
                }
            }
        }
    }

    // Third round: recompose.
    if !all_simple
        && matches!(
            mode,
            NormalizationMode::ComposedDiacritics
                | NormalizationMode::ComposedDiacriticsNoShortCircuit
        )
    {
        // As above, we don't try to combine a ccc=0 character with its
        // preceding starter; Hangul fonts in particular are not designed to
        // mix precomposed syllables and jamo.
        let count = buffer.len();
        let mut starter = 0;
        buffer.clear_output();
        buffer.next_glyph();
        while buffer.idx < count && buffer.allocation_successful() {
            let cur = *buffer.cur(0);
            if cur.is_unicode_mark()
                && (starter == buffer.out_len() - 1
                    || buffer.prev().modified_combining_class() < cur.modified_combining_class())
            {
                let a = buffer.out_info()[starter].as_char();
                let b = cur.as_char();
                if let Some(composed) = ctx.compose(a, b) {
                    if let Some(glyph) = face.glyph_index(composed as u32, None) {
                        buffer.next_glyph();
                        if !buffer.allocation_successful() {
                            return;
                        }
                        buffer.merge_out_clusters(starter, buffer.out_len());
                        buffer.out_pop();

                        let mut scratch = buffer.scratch_flags;
                        let info = &mut buffer.out_info_mut()[starter];
                        info.codepoint = composed as u32;
                        info.glyph_index = u32::from(glyph);
                        info.init_unicode_props(&mut scratch);
                        buffer.scratch_flags = scratch;
                        continue;
                    }
                }
            }

            // Blocked, or does not compose.
            buffer.next_glyph();
            if buffer.prev().modified_combining_class() == 0 {
                starter = buffer.out_len() - 1;
            }
        }
        buffer.swap_buffers();
    }
}

fn decompose_multi_char_cluster(
    ctx: &NormalizeContext<'_>,
    buffer: &mut Buffer,
    end: usize,
    short_circuit: bool,
) {
    for i in buffer.idx..end {
        if unicode::is_variation_selector(buffer.info[i].codepoint) {
            handle_variation_selector_cluster(ctx, buffer, end);
            return;
        }
    }
    while buffer.idx < end && buffer.allocation_successful() {
        decompose_current_character(ctx, buffer, short_circuit);
    }
}

fn handle_variation_selector_cluster(
    ctx: &NormalizeContext<'_>,
    buffer: &mut Buffer,
    end: usize,
) {
    let face = ctx.face;
    while buffer.idx < end.saturating_sub(1) && buffer.allocation_successful() {
        if unicode::is_variation_selector(buffer.cur(1).codepoint) {
            let base = buffer.cur(0).codepoint;
            let selector = buffer.cur(1).codepoint;
            if let Some(glyph) = face.glyph_index(base, Some(selector)) {
                buffer.cur_mut(0).glyph_index = u32::from(glyph);
                buffer.replace_glyphs(2, &[base]);
            } else {
                // Pass the pair through and let GSUB sort it out.
                set_glyph(buffer.cur_mut(0), face);
                buffer.next_glyph();
                set_glyph(buffer.cur_mut(0), face);
                buffer.next_glyph();
            }
            while buffer.idx < end && unicode::is_variation_selector(buffer.cur(0).codepoint) {
                set_glyph(buffer.cur_mut(0), face);
                buffer.next_glyph();
            }
        } else {
            set_glyph(buffer.cur_mut(0), face);
            buffer.next_glyph();
        }
    }
    if buffer.idx < end {
        set_glyph(buffer.cur_mut(0), face);
        buffer.next_glyph();
    }
}

fn decompose_current_character(
    ctx: &NormalizeContext<'_>,
    buffer: &mut Buffer,
    shortest: bool,
) {
    let u = buffer.cur(0).as_char();
    let glyph = ctx.face.glyph_index(u as u32, None);

    if !shortest || glyph.is_none() {
        if decompose(ctx, buffer, shortest, u) > 0 {
            buffer.skip_glyph();
            return;
        }
    }

    if let Some(glyph) = glyph {
        buffer.next_char(u32::from(glyph));
        return;
    }

    // A space variant the font lacks renders as a stretched plain space.
    if buffer.cur(0).general_category() == GeneralCategory::SpaceSeparator {
        if let Some(width) = unicode::space_fallback(u as u32) {
            if let Some(space_glyph) = ctx.face.glyph_index(u32::from(' '), None) {
                buffer.cur_mut(0).set_space_fallback(width);
                buffer.next_char(u32::from(space_glyph));
                buffer.scratch_flags |= BufferScratchFlags::HAS_SPACE_FALLBACK;
                return;
            }
        }
    }

    // U+2011 is the only no-break variant that is not a space.
    if u as u32 == 0x2011 {
        if let Some(other_glyph) = ctx.face.glyph_index(0x2010, None) {
            buffer.next_char(u32::from(other_glyph));
            return;
        }
    }

    // No glyph and no decomposition: emit .notdef.
    buffer.next_char(0);
}

/// Recursively decompose. Returns the number of characters output, zero if
/// nothing decomposed.
fn decompose(ctx: &NormalizeContext<'_>, buffer: &mut Buffer, shortest: bool, ab: char) -> u32 {
    let (a, b) = match ctx.decompose(ab) {
        Some(decomposed) => decomposed,
        None => return 0,
    };

    let a_glyph = ctx.face.glyph_index(a as u32, None);
    let b_glyph = match b {
        Some(b) => match ctx.face.glyph_index(b as u32, None) {
            Some(glyph) => Some((b, glyph)),
            None => return 0,
        },
        None => None,
    };

    if !shortest || a_glyph.is_none() {
        let ret = decompose(ctx, buffer, shortest, a);
        if ret != 0 {
            if let Some((b, b_glyph)) = b_glyph {
                buffer.output_char(b as u32, u32::from(b_glyph));
                return ret + 1;
            }
            return ret;
        }
    }

    if let Some(a_glyph) = a_glyph {
        buffer.output_char(a as u32, u32::from(a_glyph));
        if let Some((b, b_glyph)) = b_glyph {
            buffer.output_char(b as u32, u32::from(b_glyph));
            return 2;
        }
        return 1;
    }

    0
}

fn set_glyph(info: &mut GlyphInfo, face: &dyn Face) {
    if let Some(glyph) = face.glyph_index(info.codepoint, None) {
        info.glyph_index = u32::from(glyph);
    }
}
