//! The shaping buffer.
//!
//! A [Buffer] holds the text being shaped as a pair of glyph arrays, the *in*
//! side and the *out* side. Passes that rewrite the glyph sequence (the
//! normalizer, GSUB) read from the in side at `idx` and emit onto the out
//! side, then [`swap_buffers`](Buffer::swap_buffers) promotes the out side in
//! O(1). Passes that only mutate glyphs in place (GPOS, most preprocessing)
//! work directly on the in side.
//!
//! Each glyph carries its `cluster`, identifying the originating input
//! position. Cluster merges go through one primitive that honours the
//! buffer's [ClusterLevel] and takes care of `UNSAFE_TO_BREAK` propagation;
//! nothing else rewrites cluster values.
//!
//! # Scratch fields
//!
//! [GlyphInfo] carries a few named scratch fields whose meaning is
//! phase-local:
//!
//! * `unicode_props` — set when Unicode properties are computed, stable from
//!   then on: general category (low 5 bits), default-ignorable, hidden and
//!   continuation flags, plus one byte holding the modified combining class
//!   (marks), the ZWJ/ZWNJ distinction (format characters), or the space
//!   fallback width (spaces).
//! * `glyph_props` — GDEF glyph class plus substituted/ligated/multiplied
//!   bits; valid once glyphs have been mapped from characters.
//! * `lig_props` — ligature id and component; valid during and after GSUB.
//! * `syllable` — syllable serial used by the syllabic complex shapers and
//!   per-syllable lookup application; valid between preprocessing and the
//!   end of GSUB.
//! * `complex_cat`/`complex_aux` — complex-shaper category and auxiliary
//!   value (joining action, syllabic category, matra position); valid during
//!   substitution only.
//! * `glyph_index` — cached nominal glyph during normalization only.

use std::cmp::Ordering;

use unicode_script::Script;

use crate::segment::{
    script_horizontal_direction, Direction, Language, SegmentProperties,
};
use crate::unicode::{self, GeneralCategory};

/// Flag on [GlyphInfo] `mask` indicating that breaking the text before the
/// cluster this glyph belongs to and re-shaping the two sides would not
/// reproduce the same result.
pub const UNSAFE_TO_BREAK: u32 = 0x0000_0001;

/// Mask bits reserved for glyph flags rather than features.
pub(crate) const GLYPH_FLAGS_DEFINED: u32 = UNSAFE_TO_BREAK;

/// Default cap on buffer growth. Exceeding it makes shaping fail rather
/// than allocate without bound.
pub(crate) const MAX_LEN_DEFAULT: usize = 0x3FFF_FFFF;
pub(crate) const MAX_OPS_DEFAULT: i64 = 0x1FFF_FFFF;

const CONTEXT_LENGTH: usize = 5;

bitflags::bitflags! {
    /// Buffer flags set by the caller before shaping.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// The buffer is the beginning of text.
        const BEGINNING_OF_TEXT             = 1 << 1;
        /// The buffer is the end of text.
        const END_OF_TEXT                   = 1 << 2;
        /// Keep default-ignorable characters as visible glyphs.
        const PRESERVE_DEFAULT_IGNORABLES   = 1 << 3;
        /// Remove default-ignorable glyphs from the output entirely.
        const REMOVE_DEFAULT_IGNORABLES     = 1 << 4;
        /// Do not insert a dotted circle under orphaned marks.
        const DO_NOT_INSERT_DOTTED_CIRCLE   = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Internal bookkeeping accumulated while shaping.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferScratchFlags: u32 {
        const HAS_NON_ASCII             = 0x0000_0001;
        const HAS_DEFAULT_IGNORABLES    = 0x0000_0002;
        const HAS_SPACE_FALLBACK        = 0x0000_0004;
        const HAS_GPOS_ATTACHMENT       = 0x0000_0008;
        const HAS_UNSAFE_TO_BREAK       = 0x0000_0010;
        const HAS_CGJ                   = 0x0000_0020;

        // Reserved for complex shapers.
        const COMPLEX0                  = 0x0100_0000;
        const COMPLEX1                  = 0x0200_0000;
        const COMPLEX2                  = 0x0400_0000;
        const COMPLEX3                  = 0x0800_0000;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct UnicodeProps: u16 {
        const GENERAL_CATEGORY  = 0x001F;
        const IGNORABLE         = 0x0020;
        // Variation selectors and TAG characters: invisible but must not be
        // stripped before GSUB has had a chance to see them.
        const HIDDEN            = 0x0040;
        const CONTINUATION      = 0x0080;

        // Valid when the general category is Format:
        const CF_ZWJ            = 0x0100;
        const CF_ZWNJ           = 0x0200;
    }
}

bitflags::bitflags! {
    /// Glyph classification: GDEF class bits in the low nibble (matching
    /// lookup-flag ignore bits), substitution bookkeeping above them.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct GlyphPropsFlags: u16 {
        const BASE_GLYPH    = 0x02;
        const LIGATURE      = 0x04;
        const MARK          = 0x08;
        const CLASS_MASK    = Self::BASE_GLYPH.bits() | Self::LIGATURE.bits() | Self::MARK.bits();

        const SUBSTITUTED   = 0x10;
        const LIGATED       = 0x20;
        const MULTIPLIED    = 0x40;

        const PRESERVE      = Self::SUBSTITUTED.bits() | Self::LIGATED.bits() | Self::MULTIPLIED.bits();
    }
}

/// What the buffer currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContentType {
    /// Unicode code points, ready for shaping.
    #[default]
    Unicode,
    /// Shaped glyph indices.
    Glyphs,
}

/// Granularity of cluster values and the merges applied to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClusterLevel {
    /// Clusters are merged to grapheme boundaries and kept monotone.
    #[default]
    MonotoneGraphemes,
    /// Clusters start per character and are kept monotone.
    MonotoneCharacters,
    /// Clusters start per character; merges touch only the requested range.
    Characters,
}

impl ClusterLevel {
    pub fn is_monotone(self) -> bool {
        matches!(
            self,
            ClusterLevel::MonotoneGraphemes | ClusterLevel::MonotoneCharacters
        )
    }
}

/// Glyph attachment kinds recorded during GPOS, consumed when attachment
/// chains are resolved into offsets. Zero means unattached.
pub(crate) mod attach_type {
    pub const MARK: u8 = 1;
    pub const CURSIVE: u8 = 2;
}

/// A single glyph in the buffer.
///
/// Before shaping `codepoint` holds a Unicode scalar value; after shaping it
/// holds a glyph index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphInfo {
    pub codepoint: u32,
    /// Feature mask plus the reserved [UNSAFE_TO_BREAK] bit.
    pub mask: u32,
    /// Index of the originating input position.
    pub cluster: u32,
    pub(crate) glyph_index: u32,
    pub(crate) unicode_props: u16,
    pub(crate) glyph_props: u16,
    pub(crate) lig_props: u8,
    pub(crate) syllable: u8,
    pub(crate) complex_cat: u8,
    pub(crate) complex_aux: u8,
}

const IS_LIG_BASE: u8 = 0x10;

impl GlyphInfo {
    pub(crate) fn as_char(&self) -> char {
        char::try_from(self.codepoint).unwrap_or('\u{FFFD}')
    }

    pub(crate) fn init_unicode_props(&mut self, scratch: &mut BufferScratchFlags) {
        let ch = self.as_char();
        let gc = unicode::general_category(ch);
        let mut props = u16::from(unicode::gc_to_u8(gc));

        if self.codepoint >= 0x80 {
            *scratch |= BufferScratchFlags::HAS_NON_ASCII;

            if unicode::is_default_ignorable(self.codepoint) {
                props |= UnicodeProps::IGNORABLE.bits();
                *scratch |= BufferScratchFlags::HAS_DEFAULT_IGNORABLES;

                match self.codepoint {
                    unicode::ZWJ => props |= UnicodeProps::CF_ZWJ.bits(),
                    unicode::ZWNJ => props |= UnicodeProps::CF_ZWNJ.bits(),
                    unicode::CGJ => *scratch |= BufferScratchFlags::HAS_CGJ,
                    // Mongolian variation selectors and TAG characters need
                    // to survive into GSUB, so hide rather than ignore.
                    0x180B..=0x180D | 0xE0020..=0xE007F => {
                        props |= UnicodeProps::HIDDEN.bits();
                    }
                    _ => {}
                }
            }

            if unicode::is_mark(gc) {
                props |= UnicodeProps::CONTINUATION.bits();
                props |= u16::from(unicode::modified_combining_class(ch)) << 8;
            }
        }

        self.unicode_props = props;
    }

    pub(crate) fn general_category(&self) -> GeneralCategory {
        unicode::gc_from_u8((self.unicode_props & UnicodeProps::GENERAL_CATEGORY.bits()) as u8)
    }

    pub(crate) fn set_general_category(&mut self, gc: GeneralCategory) {
        let n = u16::from(unicode::gc_to_u8(gc));
        self.unicode_props =
            n | (self.unicode_props & !UnicodeProps::GENERAL_CATEGORY.bits());
    }

    pub(crate) fn is_unicode_mark(&self) -> bool {
        unicode::is_mark(self.general_category())
    }

    pub(crate) fn modified_combining_class(&self) -> u8 {
        if self.is_unicode_mark() {
            (self.unicode_props >> 8) as u8
        } else {
            0
        }
    }

    pub(crate) fn set_modified_combining_class(&mut self, mcc: u8) {
        if self.is_unicode_mark() {
            self.unicode_props = (u16::from(mcc) << 8) | (self.unicode_props & 0xFF);
        }
    }

    /// Space variants record their width class where marks keep their
    /// combining class; a space is never a mark.
    pub(crate) fn set_space_fallback(&mut self, width: unicode::SpaceWidth) {
        if self.general_category() == GeneralCategory::SpaceSeparator {
            self.unicode_props =
                (u16::from(width.to_u8() + 1) << 8) | (self.unicode_props & 0xFF);
        }
    }

    pub(crate) fn space_fallback(&self) -> Option<unicode::SpaceWidth> {
        if self.general_category() == GeneralCategory::SpaceSeparator {
            match (self.unicode_props >> 8) as u8 {
                0 => None,
                n => unicode::SpaceWidth::from_u8(n - 1),
            }
        } else {
            None
        }
    }

    pub(crate) fn is_default_ignorable(&self) -> bool {
        self.unicode_props & UnicodeProps::IGNORABLE.bits() != 0 && !self.is_ligated()
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.unicode_props & UnicodeProps::HIDDEN.bits() != 0
    }

    pub(crate) fn unhide(&mut self) {
        self.unicode_props &= !UnicodeProps::HIDDEN.bits();
    }

    pub(crate) fn is_zwnj(&self) -> bool {
        self.general_category() == GeneralCategory::Format
            && self.unicode_props & UnicodeProps::CF_ZWNJ.bits() != 0
    }

    pub(crate) fn is_zwj(&self) -> bool {
        self.general_category() == GeneralCategory::Format
            && self.unicode_props & UnicodeProps::CF_ZWJ.bits() != 0
    }

    pub(crate) fn is_continuation(&self) -> bool {
        self.unicode_props & UnicodeProps::CONTINUATION.bits() != 0
    }

    // Glyph props, derived from GDEF (or guessed) once glyphs exist.

    pub(crate) fn set_glyph_props(&mut self, props: GlyphPropsFlags) {
        self.glyph_props = props.bits();
    }

    pub(crate) fn is_mark(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::MARK.bits() != 0
    }

    pub(crate) fn is_base_glyph(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::BASE_GLYPH.bits() != 0
    }

    pub(crate) fn is_ligature(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::LIGATURE.bits() != 0
    }

    pub(crate) fn is_ligated(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::LIGATED.bits() != 0
    }

    pub(crate) fn is_multiplied(&self) -> bool {
        self.glyph_props & GlyphPropsFlags::MULTIPLIED.bits() != 0
    }

    // Ligature id/component tracking, GSUB and mark-to-ligature attachment.

    pub(crate) fn is_ligated_internal(&self) -> bool {
        self.lig_props & IS_LIG_BASE != 0
    }

    pub(crate) fn lig_id(&self) -> u8 {
        self.lig_props >> 5
    }

    pub(crate) fn lig_comp(&self) -> u8 {
        if self.is_ligated_internal() {
            0
        } else {
            self.lig_props & 0x0F
        }
    }

    pub(crate) fn lig_num_comps(&self) -> u8 {
        if self.is_ligated_internal() && self.glyph_props & GlyphPropsFlags::LIGATURE.bits() != 0 {
            self.lig_props & 0x0F
        } else {
            1
        }
    }

    pub(crate) fn set_lig_props_for_ligature(&mut self, lig_id: u8, lig_num_comps: u8) {
        self.lig_props = (lig_id << 5) | IS_LIG_BASE | (lig_num_comps & 0x0F);
    }

    pub(crate) fn set_lig_props_for_mark(&mut self, lig_id: u8, lig_comp: u8) {
        self.lig_props = (lig_id << 5) | (lig_comp & 0x0F);
    }

    pub(crate) fn set_lig_props_for_component(&mut self, lig_id: u8, comp: u8) {
        self.set_lig_props_for_mark(lig_id, comp);
    }

    pub(crate) fn syllable(&self) -> u8 {
        self.syllable
    }

    pub(crate) fn set_syllable(&mut self, n: u8) {
        self.syllable = n;
    }
}

/// The position of a shaped glyph, in font units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphPosition {
    /// How far the line advances after drawing this glyph horizontally.
    pub x_advance: i32,
    /// How far the line advances after drawing this glyph vertically.
    pub y_advance: i32,
    /// Horizontal shift of the glyph outline; does not affect the advance.
    pub x_offset: i32,
    /// Vertical shift of the glyph outline; does not affect the advance.
    pub y_offset: i32,
    /// Offset (in glyphs) to the glyph this one is attached to, or zero.
    pub(crate) attach_chain: i16,
    pub(crate) attach_type: u8,
}

/// The working buffer for a single shaping request.
pub struct Buffer {
    /// The *in* side. The public glyph array between passes.
    pub(crate) info: Vec<GlyphInfo>,
    /// Positions, parallel to `info` once positioning has started.
    pub(crate) pos: Vec<GlyphPosition>,
    /// The *out* side, accumulated while a rewriting pass runs.
    out: Vec<GlyphInfo>,

    /// Read cursor on the in side.
    pub(crate) idx: usize,
    pub(crate) have_output: bool,
    pub(crate) have_positions: bool,

    /// Sticky success flag; cleared by allocation failure and never set
    /// again until the buffer is cleared.
    pub(crate) successful: bool,
    pub(crate) max_len: usize,
    pub(crate) max_ops: i64,

    pub(crate) content_type: ContentType,
    pub(crate) props: SegmentProperties,
    pub(crate) flags: BufferFlags,
    pub(crate) cluster_level: ClusterLevel,
    pub(crate) scratch_flags: BufferScratchFlags,
    pub(crate) replacement: u32,
    pub(crate) invisible_glyph: Option<u32>,

    /// Code points logically before/after the buffer, for joining context.
    pub(crate) context: [[char; CONTEXT_LENGTH]; 2],
    pub(crate) context_len: [usize; 2],

    serial: u8,
}

impl Default for Buffer {
    fn default() -> Buffer {
        Buffer::new()
    }
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            info: Vec::new(),
            pos: Vec::new(),
            out: Vec::new(),
            idx: 0,
            have_output: false,
            have_positions: false,
            successful: true,
            max_len: MAX_LEN_DEFAULT,
            max_ops: MAX_OPS_DEFAULT,
            content_type: ContentType::Unicode,
            props: SegmentProperties::default(),
            flags: BufferFlags::default(),
            cluster_level: ClusterLevel::default(),
            scratch_flags: BufferScratchFlags::default(),
            replacement: 0xFFFD,
            invisible_glyph: None,
            context: [['\0'; CONTEXT_LENGTH]; 2],
            context_len: [0, 0],
            serial: 0,
        }
    }

    /// Reset the buffer to its freshly-created state.
    pub fn reset(&mut self) {
        self.clear_contents();
        self.props = SegmentProperties::default();
        self.flags = BufferFlags::default();
        self.cluster_level = ClusterLevel::default();
        self.replacement = 0xFFFD;
        self.invisible_glyph = None;
    }

    /// Discard the buffer contents, keeping segment properties and flags.
    pub fn clear_contents(&mut self) {
        self.info.clear();
        self.pos.clear();
        self.out.clear();
        self.idx = 0;
        self.have_output = false;
        self.have_positions = false;
        self.successful = true;
        self.max_ops = MAX_OPS_DEFAULT;
        self.content_type = ContentType::Unicode;
        self.scratch_flags = BufferScratchFlags::default();
        self.context = [['\0'; CONTEXT_LENGTH]; 2];
        self.context_len = [0, 0];
        self.serial = 0;
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub(crate) fn out_len(&self) -> usize {
        self.out.len()
    }

    /// Whether every operation so far has succeeded. Sticky: once an
    /// allocation fails all further operations are no-ops.
    pub fn allocation_successful(&self) -> bool {
        self.successful
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = content_type;
    }

    pub fn direction(&self) -> Direction {
        self.props.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.props.direction = direction;
    }

    pub fn script(&self) -> Option<Script> {
        self.props.script
    }

    pub fn set_script(&mut self, script: Script) {
        self.props.script = Some(script);
    }

    pub fn language(&self) -> Option<&Language> {
        self.props.language.as_ref()
    }

    pub fn set_language(&mut self, language: Language) {
        self.props.language = Some(language);
    }

    pub fn segment_properties(&self) -> SegmentProperties {
        self.props.clone()
    }

    pub fn set_segment_properties(&mut self, props: SegmentProperties) {
        self.props = props;
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.flags = flags;
    }

    pub fn cluster_level(&self) -> ClusterLevel {
        self.cluster_level
    }

    pub fn set_cluster_level(&mut self, level: ClusterLevel) {
        self.cluster_level = level;
    }

    /// The code point substituted for ill-formed UTF-8 input.
    pub fn replacement_codepoint(&self) -> u32 {
        self.replacement
    }

    pub fn set_replacement_codepoint(&mut self, replacement: u32) {
        self.replacement = replacement;
    }

    /// The glyph substituted for default-ignorable characters when they are
    /// hidden rather than removed. `None` zeroes the advance of whatever
    /// glyph the font produced.
    pub fn invisible_glyph(&self) -> Option<u32> {
        self.invisible_glyph
    }

    pub fn set_invisible_glyph(&mut self, glyph: Option<u32>) {
        self.invisible_glyph = glyph;
    }

    pub fn glyph_infos(&self) -> &[GlyphInfo] {
        &self.info
    }

    pub fn glyph_positions(&self) -> &[GlyphPosition] {
        &self.pos
    }

    /// Grow the buffer to hold at least `size` glyphs. Failure (the cap was
    /// exceeded) sets the sticky failure flag.
    pub fn ensure(&mut self, size: usize) -> bool {
        if !self.successful {
            return false;
        }
        if size > self.max_len {
            self.successful = false;
            return false;
        }
        if size <= self.info.capacity() {
            return true;
        }
        let additional = size - self.info.len();
        if self.info.try_reserve(additional).is_err() {
            self.successful = false;
            return false;
        }
        true
    }

    pub fn pre_allocate(&mut self, size: usize) -> bool {
        self.ensure(size)
    }

    /// Resize the in side. Returns false iff allocation fails.
    pub fn set_len(&mut self, len: usize) -> bool {
        if !self.ensure(len) {
            return false;
        }
        self.info.resize(len, GlyphInfo::default());
        if self.have_positions {
            self.pos.resize(len, GlyphPosition::default());
        }
        true
    }

    pub(crate) fn next_serial(&mut self) -> u8 {
        // Ligature ids fit in 3 bits; zero means "no ligature".
        self.serial = if self.serial >= 7 { 1 } else { self.serial + 1 };
        self.serial
    }

    /// Append a code point with an explicit cluster value.
    pub fn add(&mut self, codepoint: u32, cluster: u32) {
        if !self.ensure(self.len() + 1) {
            return;
        }
        self.info.push(GlyphInfo {
            codepoint,
            cluster,
            ..GlyphInfo::default()
        });
    }

    /// Append a string, clusters numbered by byte offset.
    pub fn add_str(&mut self, text: &str) {
        self.add_utf8(text.as_bytes(), 0, text.len());
    }

    /// Append UTF-8 bytes `[item_offset..item_offset + item_length)`,
    /// replacing ill-formed sequences with the replacement code point.
    /// Clusters are numbered by byte offset into `bytes`.
    pub fn add_utf8(&mut self, bytes: &[u8], item_offset: usize, item_length: usize) {
        let end = item_offset.saturating_add(item_length).min(bytes.len());
        let start = item_offset.min(end);
        let mut chunk = &bytes[start..end];
        let mut cluster = start;

        self.ensure(self.len() + chunk.len());

        while !chunk.is_empty() {
            match std::str::from_utf8(chunk) {
                Ok(s) => {
                    for (i, ch) in s.char_indices() {
                        self.add(ch as u32, (cluster + i) as u32);
                    }
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // Safe: validated above.
                    let s = std::str::from_utf8(&chunk[..valid]).unwrap();
                    for (i, ch) in s.char_indices() {
                        self.add(ch as u32, (cluster + i) as u32);
                    }
                    self.add(self.replacement, (cluster + valid) as u32);
                    let skip = err.error_len().unwrap_or(chunk.len() - valid).max(1);
                    cluster += valid + skip;
                    chunk = &chunk[valid + skip..];
                }
            }
        }
        self.content_type = ContentType::Unicode;
    }

    /// Append a range of glyphs from another buffer.
    pub fn append(&mut self, other: &Buffer, start: usize, end: usize) {
        let end = end.min(other.len());
        let start = start.min(end);
        if !self.ensure(self.len() + (end - start)) {
            return;
        }
        self.info.extend_from_slice(&other.info[start..end]);
        if self.have_positions && other.have_positions {
            self.pos.extend_from_slice(&other.pos[start..end]);
        }
    }

    /// Guess direction, script, and language for the current contents.
    ///
    /// The script is taken from the first character with a definite script;
    /// the direction follows the script's horizontal direction. Properties
    /// already set are left alone.
    pub fn guess_segment_properties(&mut self) {
        if self.props.script.is_none() {
            for info in &self.info {
                let script = unicode::script(info.as_char());
                if !matches!(
                    script,
                    Script::Common | Script::Inherited | Script::Unknown
                ) {
                    self.props.script = Some(script);
                    break;
                }
            }
        }

        if self.props.direction == Direction::Invalid {
            self.props.direction = match self.props.script {
                Some(script) => script_horizontal_direction(script),
                None => Direction::LeftToRight,
            };
        }
    }

    // In/out machinery.

    pub(crate) fn cur(&self, i: usize) -> &GlyphInfo {
        &self.info[self.idx + i]
    }

    pub(crate) fn cur_mut(&mut self, i: usize) -> &mut GlyphInfo {
        let offset = self.idx + i;
        &mut self.info[offset]
    }

    pub(crate) fn prev(&self) -> &GlyphInfo {
        &self.out[self.out.len() - 1]
    }

    pub(crate) fn out_info(&self) -> &[GlyphInfo] {
        &self.out
    }

    pub(crate) fn out_info_mut(&mut self) -> &mut [GlyphInfo] {
        &mut self.out
    }

    /// Drop the most recently emitted glyph.
    pub(crate) fn out_pop(&mut self) {
        self.out.pop();
    }

    /// Glyphs behind the cursor: the out side when a rewriting pass is
    /// running, otherwise the glyphs before `idx`.
    pub(crate) fn backtrack_len(&self) -> usize {
        if self.have_output {
            self.out.len()
        } else {
            self.idx
        }
    }

    pub(crate) fn lookahead_len(&self) -> usize {
        self.len() - self.idx
    }

    /// Start a rewriting pass: the out side is emptied and the cursor
    /// rewound.
    pub(crate) fn clear_output(&mut self) {
        self.have_output = true;
        self.have_positions = false;
        self.out.clear();
        self.idx = 0;
    }

    /// Allocate positions, zeroed, parallel to the in side.
    pub(crate) fn clear_positions(&mut self) {
        self.have_output = false;
        self.have_positions = true;
        self.pos.clear();
        self.pos.resize(self.info.len(), GlyphPosition::default());
    }

    /// Finish a rewriting pass: promote the out side to the in side.
    pub(crate) fn swap_buffers(&mut self) {
        if !self.successful {
            return;
        }
        debug_assert!(self.have_output);
        self.have_output = false;
        std::mem::swap(&mut self.info, &mut self.out);
        self.out.clear();
        self.idx = 0;
    }

    /// Restore the out side onto the in side without rewriting the rest,
    /// used when a pass aborts mid-way.
    pub(crate) fn sync(&mut self) {
        if self.have_output {
            if self.successful && self.idx <= self.len() {
                // Copy the remainder over and swap.
                let idx = self.idx;
                let rest: Vec<GlyphInfo> = self.info[idx..].to_vec();
                self.out.extend_from_slice(&rest);
                std::mem::swap(&mut self.info, &mut self.out);
            }
            self.have_output = false;
            self.out.clear();
            self.idx = 0;
        }
    }

    /// Copy the current glyph to the out side and advance.
    pub(crate) fn next_glyph(&mut self) {
        if self.have_output {
            if !self.ensure_out(self.out.len() + 1) {
                return;
            }
            let info = self.info[self.idx];
            self.out.push(info);
        }
        self.idx += 1;
    }

    pub(crate) fn next_glyphs(&mut self, n: usize) {
        if self.have_output {
            if !self.ensure_out(self.out.len() + n) {
                return;
            }
            let idx = self.idx;
            // Split borrow: out and info are distinct fields.
            let (info, out) = (&self.info, &mut self.out);
            out.extend_from_slice(&info[idx..idx + n]);
        }
        self.idx += n;
    }

    /// Consume the current glyph without emitting it.
    pub(crate) fn skip_glyph(&mut self) {
        self.idx += 1;
    }

    /// Consume one glyph, emit it with a new glyph value.
    pub(crate) fn replace_glyph(&mut self, glyph: u32) {
        if self.have_output {
            if !self.ensure_out(self.out.len() + 1) {
                return;
            }
            let mut info = self.info[self.idx];
            info.codepoint = glyph;
            self.out.push(info);
            self.idx += 1;
        } else {
            self.info[self.idx].codepoint = glyph;
            self.idx += 1;
        }
    }

    /// Consume `num_in` glyphs, emit `glyph_data`. All outputs take the
    /// minimum cluster of the consumed glyphs.
    pub(crate) fn replace_glyphs(&mut self, num_in: usize, glyph_data: &[u32]) {
        if !self.ensure_out(self.out.len() + glyph_data.len()) {
            return;
        }
        self.merge_clusters(self.idx, self.idx + num_in);

        let orig_info = self.info[self.idx];
        for &glyph in glyph_data {
            let mut info = orig_info;
            info.codepoint = glyph;
            self.out.push(info);
        }
        self.idx += num_in;
    }

    /// Emit a glyph carrying the current glyph's properties, without
    /// consuming input.
    pub(crate) fn output_glyph(&mut self, glyph: u32) {
        if !self.ensure_out(self.out.len() + 1) {
            return;
        }
        let mut info = if self.idx < self.len() {
            self.info[self.idx]
        } else if let Some(&last) = self.out.last() {
            last
        } else {
            GlyphInfo::default()
        };
        info.codepoint = glyph;
        self.out.push(info);
    }

    pub(crate) fn output_info(&mut self, info: GlyphInfo) {
        if !self.ensure_out(self.out.len() + 1) {
            return;
        }
        self.out.push(info);
    }

    /// Emit the current character with a different code point, consuming it.
    pub(crate) fn output_char(&mut self, codepoint: u32, glyph_index: u32) {
        // The cached glyph index keeps normalization from re-querying cmap.
        let mut info = self.info[self.idx];
        info.codepoint = codepoint;
        info.glyph_index = glyph_index;
        let mut scratch = self.scratch_flags;
        info.init_unicode_props(&mut scratch);
        self.scratch_flags = scratch;
        self.output_info(info);
    }

    /// Consume the current character, emitting it with a cached glyph index.
    pub(crate) fn next_char(&mut self, glyph_index: u32) {
        self.cur_mut(0).glyph_index = glyph_index;
        self.next_glyph();
    }

    /// Reposition the pass cursor so that `pos` glyphs are behind it,
    /// shuffling glyphs between the two sides as needed.
    pub(crate) fn move_to(&mut self, pos: usize) -> bool {
        if !self.have_output {
            debug_assert!(pos <= self.len());
            self.idx = pos;
            return true;
        }
        if !self.successful {
            return false;
        }

        if pos >= self.out.len() {
            let count = pos - self.out.len();
            if self.idx + count > self.len() {
                self.successful = false;
                return false;
            }
            self.next_glyphs(count);
        } else {
            let count = self.out.len() - pos;
            if self.idx < count {
                self.successful = false;
                return false;
            }
            self.idx -= count;
            let out_len = self.out.len();
            for i in 0..count {
                self.info[self.idx + i] = self.out[pos + i];
            }
            self.out.truncate(out_len - count);
        }
        true
    }

    fn ensure_out(&mut self, size: usize) -> bool {
        if !self.successful || size > self.max_len {
            self.successful = false;
            return false;
        }
        if self.out.capacity() < size && self.out.try_reserve(size - self.out.len()).is_err() {
            self.successful = false;
            return false;
        }
        true
    }

    // Reversal.

    pub fn reverse(&mut self) {
        let len = self.len();
        self.reverse_range(0, len);
    }

    pub fn reverse_range(&mut self, start: usize, end: usize) {
        if end <= start + 1 {
            return;
        }
        self.info[start..end].reverse();
        if self.have_positions {
            self.pos[start..end].reverse();
        }
    }

    /// Reverse the order of clusters while keeping the glyphs within each
    /// cluster in order.
    pub fn reverse_clusters(&mut self) {
        self.reverse();
        let len = self.len();
        let mut start = 0;
        for i in 1..=len {
            if i == len || self.info[i].cluster != self.info[start].cluster {
                self.reverse_range(start, i);
                start = i;
            }
        }
    }

    /// Renumber clusters monotonically from zero by glyph position.
    pub fn reset_clusters(&mut self) {
        for (i, info) in self.info.iter_mut().enumerate() {
            info.cluster = i as u32;
        }
    }

    // Cluster handling. All cluster rewrites funnel through these.

    fn cluster_range_min(info: &[GlyphInfo], start: usize, end: usize) -> u32 {
        info[start..end]
            .iter()
            .map(|i| i.cluster)
            .min()
            .unwrap_or(0)
    }

    pub(crate) fn merge_clusters(&mut self, start: usize, end: usize) {
        if end - start < 2 {
            return;
        }
        if self.cluster_level == ClusterLevel::Characters {
            self.unsafe_to_break(start, end);
            return;
        }
        self.merge_clusters_impl(start, end);
    }

    fn merge_clusters_impl(&mut self, mut start: usize, mut end: usize) {
        let cluster = Self::cluster_range_min(&self.info, start, end);

        // Extend to full clusters so monotonicity is restored.
        while start > 0 && self.info[start - 1].cluster == self.info[start].cluster {
            start -= 1;
        }
        while end < self.len() && self.info[end - 1].cluster == self.info[end].cluster {
            end += 1;
        }

        let crosses = self.info[start..end].iter().any(|i| i.cluster != cluster);
        for info in &mut self.info[start..end] {
            if crosses {
                info.mask |= UNSAFE_TO_BREAK;
            }
            info.cluster = cluster;
        }
        if crosses {
            self.scratch_flags |= BufferScratchFlags::HAS_UNSAFE_TO_BREAK;
        }
    }

    pub(crate) fn merge_out_clusters(&mut self, mut start: usize, mut end: usize) {
        if self.cluster_level == ClusterLevel::Characters || end - start < 2 {
            return;
        }
        let cluster = Self::cluster_range_min(&self.out, start, end);

        while start > 0 && self.out[start - 1].cluster == self.out[start].cluster {
            start -= 1;
        }
        while end < self.out.len() && self.out[end - 1].cluster == self.out[end].cluster {
            end += 1;
        }

        let crosses = self.out[start..end].iter().any(|i| i.cluster != cluster);
        for info in &mut self.out[start..end] {
            if crosses {
                info.mask |= UNSAFE_TO_BREAK;
            }
            info.cluster = cluster;
        }
        if crosses {
            self.scratch_flags |= BufferScratchFlags::HAS_UNSAFE_TO_BREAK;
        }
    }

    /// Mark the whole clusters covering `[start, end)` of the in side as
    /// unsafe to break.
    pub(crate) fn unsafe_to_break(&mut self, mut start: usize, mut end: usize) {
        if end <= start {
            return;
        }
        while start > 0 && self.info[start - 1].cluster == self.info[start].cluster {
            start -= 1;
        }
        end = end.min(self.len());
        while end < self.len() && self.info[end - 1].cluster == self.info[end].cluster {
            end += 1;
        }
        for info in &mut self.info[start..end] {
            info.mask |= UNSAFE_TO_BREAK;
        }
        self.scratch_flags |= BufferScratchFlags::HAS_UNSAFE_TO_BREAK;
    }

    /// As [unsafe_to_break](Self::unsafe_to_break), for a range that starts
    /// on the out side and ends on the in side mid-pass.
    pub(crate) fn unsafe_to_break_from_outbuffer(&mut self, mut start: usize, mut end: usize) {
        if !self.have_output {
            self.unsafe_to_break(start, end);
            return;
        }
        while start > 0 && self.out[start - 1].cluster == self.out[start].cluster {
            start -= 1;
        }
        end = end.min(self.len());
        while end < self.len() && self.info[end - 1].cluster == self.info[end].cluster {
            end += 1;
        }
        for info in &mut self.out[start..] {
            info.mask |= UNSAFE_TO_BREAK;
        }
        for info in &mut self.info[self.idx.min(end)..end] {
            info.mask |= UNSAFE_TO_BREAK;
        }
        self.scratch_flags |= BufferScratchFlags::HAS_UNSAFE_TO_BREAK;
    }

    // Masks.

    /// Set every glyph's mask to `mask`, preserving glyph flag bits.
    pub(crate) fn reset_masks(&mut self, mask: u32) {
        for info in &mut self.info {
            info.mask = (info.mask & GLYPH_FLAGS_DEFINED) | mask;
        }
    }

    /// Update `mask` bits to `value` on glyphs whose cluster lies within
    /// `[cluster_start, cluster_end)`.
    pub(crate) fn set_masks(
        &mut self,
        value: u32,
        mask: u32,
        cluster_start: u32,
        cluster_end: u32,
    ) {
        let mask = mask & !GLYPH_FLAGS_DEFINED;
        if mask == 0 {
            return;
        }
        let value = value & mask;
        if cluster_start == 0 && cluster_end == u32::MAX {
            for info in &mut self.info {
                info.mask = (info.mask & !mask) | value;
            }
        } else {
            for info in &mut self.info {
                if cluster_start <= info.cluster && info.cluster < cluster_end {
                    info.mask = (info.mask & !mask) | value;
                }
            }
        }
    }

    /// Stable insertion sort of `[start, end)` on the in side. Clusters are
    /// merged whenever reordering moves a glyph across a cluster boundary.
    pub(crate) fn sort(
        &mut self,
        start: usize,
        end: usize,
        cmp: impl Fn(&GlyphInfo, &GlyphInfo) -> Ordering,
    ) {
        debug_assert!(!self.have_positions);
        for i in start + 1..end {
            let mut j = i;
            while j > start && cmp(&self.info[j - 1], &self.info[i]) == Ordering::Greater {
                j -= 1;
            }
            if j == i {
                continue;
            }
            // Merge clusters so the rotation cannot break monotonicity.
            self.merge_clusters(j, i + 1);
            self.info[j..=i].rotate_right(1);
        }
    }

    /// Remove glyphs for which `keep` returns false, preserving the cluster
    /// values of the surviving neighbours.
    pub(crate) fn delete_glyphs_inplace(&mut self, keep: impl Fn(&GlyphInfo) -> bool) {
        debug_assert!(!self.have_output);
        let mut j = 0;
        for i in 0..self.info.len() {
            if keep(&self.info[i]) {
                if i != j {
                    self.info[j] = self.info[i];
                    if self.have_positions {
                        self.pos[j] = self.pos[i];
                    }
                }
                j += 1;
            }
        }
        self.info.truncate(j);
        if self.have_positions {
            self.pos.truncate(j);
        }
    }

    pub(crate) fn next_cluster(&self, start: usize) -> usize {
        let mut end = start + 1;
        let cluster = self.info[start].cluster;
        while end < self.len() && self.info[end].cluster == cluster {
            end += 1;
        }
        end
    }

    /// Walk syllable values set by a complex shaper.
    pub(crate) fn next_syllable(&self, start: usize) -> usize {
        let mut end = start + 1;
        let syllable = self.info[start].syllable();
        while end < self.len() && self.info[end].syllable() == syllable {
            end += 1;
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(text: &str) -> Buffer {
        let mut buffer = Buffer::new();
        buffer.add_str(text);
        buffer
    }

    #[test]
    fn test_add_utf8_clusters_are_byte_offsets() {
        let buffer = buffer_with("aé?");
        let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, vec![0, 1, 3]);
    }

    #[test]
    fn test_add_utf8_replaces_ill_formed() {
        let mut buffer = Buffer::new();
        buffer.add_utf8(&[0x61, 0xFF, 0x62], 0, 3);
        let cps: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.codepoint).collect();
        assert_eq!(cps, vec![0x61, 0xFFFD, 0x62]);
    }

    #[test]
    fn test_replace_glyphs_takes_min_cluster() {
        let mut buffer = buffer_with("fi");
        buffer.clear_output();
        buffer.replace_glyphs(2, &[99]);
        buffer.swap_buffers();
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.info[0].codepoint, 99);
        assert_eq!(buffer.info[0].cluster, 0);
        assert!(buffer.info[0].mask & UNSAFE_TO_BREAK != 0);
    }

    #[test]
    fn test_merge_clusters_extends_to_boundaries() {
        let mut buffer = Buffer::new();
        for (i, cluster) in [0u32, 1, 1, 2].iter().enumerate() {
            buffer.add(i as u32, *cluster);
        }
        // Merging [1, 4) must also pull in index 1 (same cluster as 2).
        buffer.merge_clusters(2, 4);
        let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_merge_clusters_characters_level() {
        let mut buffer = Buffer::new();
        buffer.set_cluster_level(ClusterLevel::Characters);
        for cluster in 0..3u32 {
            buffer.add(cluster, cluster);
        }
        buffer.merge_clusters(0, 3);
        // No merge, but unsafe-to-break is recorded.
        let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, vec![0, 1, 2]);
        assert!(buffer.info[1].mask & UNSAFE_TO_BREAK != 0);
    }

    #[test]
    fn test_reverse_clusters() {
        let mut buffer = Buffer::new();
        for (cp, cluster) in [(10u32, 0u32), (11, 0), (12, 1), (13, 2)] {
            buffer.add(cp, cluster);
        }
        buffer.reverse_clusters();
        let cps: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.codepoint).collect();
        assert_eq!(cps, vec![13, 12, 10, 11]);
    }

    #[test]
    fn test_reset_clusters() {
        let mut buffer = Buffer::new();
        for cluster in [5u32, 9, 100] {
            buffer.add(cluster, cluster);
        }
        buffer.reset_clusters();
        let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
        assert_eq!(clusters, vec![0, 1, 2]);
    }

    #[test]
    fn test_move_to_round_trip() {
        let mut buffer = buffer_with("abcd");
        buffer.clear_output();
        buffer.next_glyph();
        buffer.next_glyph();
        assert_eq!(buffer.backtrack_len(), 2);
        assert!(buffer.move_to(1));
        assert_eq!(buffer.out_len(), 1);
        assert_eq!(buffer.idx, 1);
        assert!(buffer.move_to(4));
        assert_eq!(buffer.out_len(), 4);
        buffer.swap_buffers();
        let cps: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.codepoint).collect();
        assert_eq!(cps, "abcd".chars().map(|c| c as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_allocation_failure_is_sticky() {
        let mut buffer = Buffer::new();
        buffer.max_len = 2;
        buffer.add('a' as u32, 0);
        buffer.add('b' as u32, 1);
        buffer.add('c' as u32, 2);
        assert!(!buffer.allocation_successful());
        // Still failed after further operations.
        buffer.add('d' as u32, 3);
        assert!(!buffer.allocation_successful());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_guess_segment_properties() {
        let mut buffer = buffer_with("שלום");
        buffer.guess_segment_properties();
        assert_eq!(buffer.script(), Some(Script::Hebrew));
        assert_eq!(buffer.direction(), Direction::RightToLeft);

        let mut buffer = buffer_with("hello");
        buffer.guess_segment_properties();
        assert_eq!(buffer.script(), Some(Script::Latin));
        assert_eq!(buffer.direction(), Direction::LeftToRight);
    }

    #[test]
    fn test_sort_merges_crossed_clusters() {
        let mut buffer = Buffer::new();
        let mut scratch = BufferScratchFlags::default();
        for (cp, cluster) in [(0x0061u32, 0u32), (0x0316, 1), (0x0301, 2)] {
            buffer.add(cp, cluster);
        }
        for info in &mut buffer.info {
            info.init_unicode_props(&mut scratch);
        }
        let start = 1;
        let end = 3;
        buffer.sort(start, end, |a, b| {
            a.modified_combining_class().cmp(&b.modified_combining_class())
        });
        // 0x0316 (ccc 220) sorts after 0x0301 (ccc 230)? No: 220 < 230, no move.
        assert_eq!(buffer.info[1].codepoint, 0x0316);

        // Now the reverse order, which must reorder and merge clusters.
        let mut buffer = Buffer::new();
        for (cp, cluster) in [(0x0061u32, 0u32), (0x0301, 1), (0x0316, 2)] {
            buffer.add(cp, cluster);
        }
        for info in &mut buffer.info {
            info.init_unicode_props(&mut scratch);
        }
        buffer.sort(1, 3, |a, b| {
            a.modified_combining_class().cmp(&b.modified_combining_class())
        });
        assert_eq!(buffer.info[1].codepoint, 0x0316);
        assert_eq!(buffer.info[1].cluster, buffer.info[2].cluster);
    }

    #[test]
    fn test_lig_props() {
        let mut info = GlyphInfo::default();
        info.set_lig_props_for_ligature(3, 2);
        info.set_glyph_props(GlyphPropsFlags::LIGATURE);
        assert_eq!(info.lig_id(), 3);
        assert_eq!(info.lig_comp(), 0);
        assert_eq!(info.lig_num_comps(), 2);

        let mut mark = GlyphInfo::default();
        mark.set_lig_props_for_mark(3, 1);
        assert_eq!(mark.lig_id(), 3);
        assert_eq!(mark.lig_comp(), 1);
    }
}
