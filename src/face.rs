//! The read-only font interface consumed by the shaper.
//!
//! Table parsing happens inside the shaper; a [Face] only hands out raw table
//! bytes and glyph metrics. Everything has a sensible default so simple test
//! faces stay small.

/// Extents of a single glyph, in font units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphExtents {
    /// Left side of glyph from origin.
    pub x_bearing: i32,
    /// Top side of glyph from origin.
    pub y_bearing: i32,
    pub width: i32,
    pub height: i32,
}

/// A read-only font face.
///
/// Implementations supply raw table data and per-glyph metrics. The shaper
/// parses GSUB/GPOS/GDEF/kern/morx/kerx/trak out of the byte slices itself,
/// once, at plan-compile time.
pub trait Face {
    /// Raw bytes of the table with the given tag, if present.
    fn table(&self, tag: u32) -> Option<&[u8]>;

    fn has_table(&self, tag: u32) -> bool {
        self.table(tag).is_some()
    }

    /// Map a code point (with optional variation selector) to a glyph index.
    fn glyph_index(&self, codepoint: u32, variation_selector: Option<u32>) -> Option<u16>;

    /// Horizontal advance of a glyph in font units.
    fn advance_h(&self, glyph: u16) -> i32;

    /// Vertical advance of a glyph in font units. Defaults to the em size.
    fn advance_v(&self, glyph: u16) -> i32 {
        let _ = glyph;
        i32::from(self.units_per_em())
    }

    fn side_bearing_h(&self, glyph: u16) -> i32 {
        let _ = glyph;
        0
    }

    fn side_bearing_v(&self, glyph: u16) -> i32 {
        let _ = glyph;
        0
    }

    fn glyph_extents(&self, glyph: u16) -> Option<GlyphExtents> {
        let _ = glyph;
        None
    }

    /// A contour point of a glyph, used to resolve format 2 anchors.
    fn contour_point(&self, glyph: u16, point_index: u16) -> Option<(i32, i32)> {
        let _ = (glyph, point_index);
        None
    }

    fn units_per_em(&self) -> u16 {
        1000
    }

    /// Point size the face is being used at, if known. Consulted by `trak`.
    fn point_size(&self) -> Option<f32> {
        None
    }
}
