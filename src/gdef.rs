//! Helpers for looking up GDEF glyph classes.

use crate::buffer::GlyphPropsFlags;
use crate::layout::GDEFTable;
use crate::unicode::{self, GeneralCategory};

pub(crate) const GLYPH_CLASS_BASE: u16 = 1;
pub(crate) const GLYPH_CLASS_LIGATURE: u16 = 2;
pub(crate) const GLYPH_CLASS_MARK: u16 = 3;

pub fn glyph_class(opt_gdef_table: Option<&GDEFTable>, glyph: u16) -> u16 {
    opt_gdef_table
        .and_then(|gdef| gdef.glyph_class_def.as_ref())
        .map_or(0, |class_def| class_def.glyph_class_value(glyph))
}

pub fn mark_attach_class(opt_gdef_table: Option<&GDEFTable>, glyph: u16) -> u16 {
    opt_gdef_table
        .and_then(|gdef| gdef.mark_attach_class_def.as_ref())
        .map_or(0, |class_def| class_def.glyph_class_value(glyph))
}

pub fn gdef_is_mark(opt_gdef_table: Option<&GDEFTable>, glyph: u16) -> bool {
    glyph_class(opt_gdef_table, glyph) == GLYPH_CLASS_MARK
}

pub(crate) fn is_mark_glyph(opt_gdef_table: Option<&GDEFTable>, glyph: u16, set: u16) -> bool {
    opt_gdef_table
        .and_then(|gdef| gdef.mark_glyph_sets.get(usize::from(set)))
        .map_or(false, |coverage| coverage.coverage_value(glyph).is_some())
}

/// The glyph-props bits for a glyph, from GDEF classes. Includes the
/// mark attachment class in the high byte for marks.
pub(crate) fn glyph_props(opt_gdef_table: Option<&GDEFTable>, glyph: u16) -> u16 {
    match glyph_class(opt_gdef_table, glyph) {
        GLYPH_CLASS_BASE => GlyphPropsFlags::BASE_GLYPH.bits(),
        GLYPH_CLASS_LIGATURE => GlyphPropsFlags::LIGATURE.bits(),
        GLYPH_CLASS_MARK => {
            GlyphPropsFlags::MARK.bits() | (mark_attach_class(opt_gdef_table, glyph) << 8)
        }
        _ => 0,
    }
}

/// Glyph props guessed from the Unicode general category, when the font
/// has no usable GDEF glyph classes.
pub(crate) fn fallback_glyph_props(gc: GeneralCategory) -> u16 {
    if unicode::is_mark(gc) {
        GlyphPropsFlags::MARK.bits()
    } else {
        GlyphPropsFlags::BASE_GLYPH.bits()
    }
}
