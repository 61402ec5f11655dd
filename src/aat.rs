//! Apple Advanced Typography fallbacks: `morx`, `kerx`, and `trak`.
//!
//! These run when the OpenType equivalents are absent or when the plan
//! prefers them. Coverage is deliberately partial: `morx` type 4
//! (noncontextual) substitutions and `kerx` format 0 pair kerning are
//! applied; the state-machine subtable types are recognized and skipped
//! with a warning, since a font carrying them almost always carries the
//! simpler forms too.

use crate::binary::{ReadCtxt, ReadScope};
use crate::buffer::Buffer;
use crate::error::ParseError;
use crate::face::Face;
use crate::segment::Feature;
use crate::tag;

/// A lookup table as used throughout AAT: glyph id to 16-bit value.
pub(crate) enum AatLookup {
    /// Format 0: value per glyph id, from glyph 0.
    Simple(Vec<u16>),
    /// Formats 2/4: glyph ranges with one value (or one value each).
    Segments(Vec<(u16, u16, Vec<u16>)>),
    /// Format 6: sparse glyph/value entries, sorted.
    Single(Vec<(u16, u16)>),
    /// Format 8: trimmed array.
    Trimmed { first_glyph: u16, values: Vec<u16> },
}

impl AatLookup {
    fn read(scope: ReadScope<'_>) -> Result<AatLookup, ParseError> {
        let mut ctxt = scope.ctxt();
        match ctxt.read_u16()? {
            0 => {
                let count = ctxt.bytes_available() / 2;
                Ok(AatLookup::Simple(ctxt.read_u16s(count)?))
            }
            2 => {
                let segments = read_bin_srch_segments(&mut ctxt)?;
                let segments = segments
                    .into_iter()
                    .map(|(first, last, value)| (first, last, vec![value]))
                    .collect();
                Ok(AatLookup::Segments(segments))
            }
            4 => {
                let segments = read_bin_srch_segments(&mut ctxt)?;
                let mut out = Vec::with_capacity(segments.len());
                for (first, last, offset) in segments {
                    let count = usize::from(last) - usize::from(first) + 1;
                    let mut values_ctxt = scope.offset(usize::from(offset))?.ctxt();
                    out.push((first, last, values_ctxt.read_u16s(count)?));
                }
                Ok(AatLookup::Segments(out))
            }
            6 => {
                let _unit_size = ctxt.read_u16()?;
                let n_units = usize::from(ctxt.read_u16()?);
                ctxt.skip(6)?; // searchRange, entrySelector, rangeShift
                let mut entries = Vec::with_capacity(n_units.min(ctxt.bytes_available() / 4));
                for _ in 0..n_units {
                    let glyph = ctxt.read_u16()?;
                    let value = ctxt.read_u16()?;
                    entries.push((glyph, value));
                }
                entries.sort_by_key(|&(glyph, _)| glyph);
                Ok(AatLookup::Single(entries))
            }
            8 => {
                let first_glyph = ctxt.read_u16()?;
                let count = usize::from(ctxt.read_u16()?);
                Ok(AatLookup::Trimmed {
                    first_glyph,
                    values: ctxt.read_u16s(count)?,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }

    pub fn value(&self, glyph: u16) -> Option<u16> {
        match self {
            AatLookup::Simple(values) => values.get(usize::from(glyph)).copied(),
            AatLookup::Segments(segments) => segments
                .iter()
                .find(|&&(first, last, _)| first <= glyph && glyph <= last)
                .and_then(|(first, _, values)| {
                    values
                        .get(usize::from(glyph - first).min(values.len() - 1))
                        .copied()
                }),
            AatLookup::Single(entries) => entries
                .binary_search_by_key(&glyph, |&(g, _)| g)
                .ok()
                .map(|index| entries[index].1),
            AatLookup::Trimmed {
                first_glyph,
                values,
            } => {
                if glyph >= *first_glyph {
                    values.get(usize::from(glyph - first_glyph)).copied()
                } else {
                    None
                }
            }
        }
    }
}

/// Segments of a binary-searched AAT lookup: `(first, last, value)`, with
/// the 0xFFFF terminator dropped.
fn read_bin_srch_segments(
    ctxt: &mut ReadCtxt<'_>,
) -> Result<Vec<(u16, u16, u16)>, ParseError> {
    let _unit_size = ctxt.read_u16()?;
    let n_units = usize::from(ctxt.read_u16()?);
    ctxt.skip(6)?; // searchRange, entrySelector, rangeShift
    let mut segments = Vec::with_capacity(n_units.min(ctxt.bytes_available() / 6));
    for _ in 0..n_units {
        let last = ctxt.read_u16()?;
        let first = ctxt.read_u16()?;
        let value = ctxt.read_u16()?;
        if first == 0xFFFF && last == 0xFFFF {
            continue;
        }
        segments.push((first, last, value));
    }
    Ok(segments)
}

// morx

pub(crate) struct MorxTable {
    chains: Vec<MorxChain>,
}

struct MorxChain {
    default_flags: u32,
    features: Vec<MorxFeature>,
    subtables: Vec<MorxSubtable>,
}

struct MorxFeature {
    feature_type: u16,
    feature_setting: u16,
    enable_flags: u32,
    disable_flags: u32,
}

struct MorxSubtable {
    coverage: u32,
    sub_feature_flags: u32,
    kind: MorxSubtableKind,
}

enum MorxSubtableKind {
    NonContextual(AatLookup),
    Unsupported(u8),
}

const MORX_COVERAGE_VERTICAL: u32 = 0x8000_0000;

impl MorxTable {
    pub fn read(data: &[u8]) -> Result<MorxTable, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let version = ctxt.read_u16()?;
        if !(2..=3).contains(&version) {
            return Err(ParseError::BadVersion);
        }
        let _unused = ctxt.read_u16()?;
        let n_chains = ctxt.read_u32()? as usize;

        let mut chains = Vec::with_capacity(n_chains.min(16));
        let mut chain_offset = 8usize;
        for _ in 0..n_chains {
            let chain_scope = scope.offset(chain_offset)?;
            let mut chain_ctxt = chain_scope.ctxt();
            let default_flags = chain_ctxt.read_u32()?;
            let chain_length = chain_ctxt.read_u32()? as usize;
            let n_features = chain_ctxt.read_u32()? as usize;
            let n_subtables = chain_ctxt.read_u32()? as usize;

            let mut features = Vec::with_capacity(n_features.min(64));
            for _ in 0..n_features {
                features.push(MorxFeature {
                    feature_type: chain_ctxt.read_u16()?,
                    feature_setting: chain_ctxt.read_u16()?,
                    enable_flags: chain_ctxt.read_u32()?,
                    disable_flags: chain_ctxt.read_u32()?,
                });
            }

            let mut subtables = Vec::with_capacity(n_subtables.min(64));
            let mut subtable_offset = 16 + n_features * 12;
            for _ in 0..n_subtables {
                let subtable_scope = chain_scope.offset(subtable_offset)?;
                let mut subtable_ctxt = subtable_scope.ctxt();
                let length = subtable_ctxt.read_u32()? as usize;
                let coverage = subtable_ctxt.read_u32()?;
                let sub_feature_flags = subtable_ctxt.read_u32()?;
                let kind_byte = (coverage & 0xFF) as u8;

                let kind = match kind_byte {
                    4 => {
                        let lookup_scope = subtable_scope.offset(12)?;
                        match AatLookup::read(lookup_scope) {
                            Ok(lookup) => MorxSubtableKind::NonContextual(lookup),
                            Err(err) => {
                                log::warn!("malformed morx noncontextual subtable: {}", err);
                                MorxSubtableKind::Unsupported(kind_byte)
                            }
                        }
                    }
                    other => MorxSubtableKind::Unsupported(other),
                };
                subtables.push(MorxSubtable {
                    coverage,
                    sub_feature_flags,
                    kind,
                });
                if length < 12 {
                    return Err(ParseError::BadValue);
                }
                subtable_offset += length;
            }

            chains.push(MorxChain {
                default_flags,
                features,
                subtables,
            });
            if chain_length < 16 {
                return Err(ParseError::BadValue);
            }
            chain_offset += chain_length;
        }

        Ok(MorxTable { chains })
    }
}

/// The per-chain subtable selection flags compiled from the chain defaults
/// and the user's requested features.
pub(crate) struct AatMap {
    chain_flags: Vec<u32>,
}

impl Default for AatMap {
    fn default() -> AatMap {
        AatMap {
            chain_flags: Vec::new(),
        }
    }
}

impl AatMap {
    pub fn compile(morx: &MorxTable, user_features: &[Feature]) -> AatMap {
        let mut chain_flags = Vec::with_capacity(morx.chains.len());
        for chain in &morx.chains {
            let mut flags = chain.default_flags;
            for feature in user_features {
                let Some((feature_type, on_setting, off_setting)) =
                    aat_feature_for_tag(feature.tag)
                else {
                    continue;
                };
                let setting = if feature.value != 0 {
                    on_setting
                } else {
                    off_setting
                };
                for entry in &chain.features {
                    if entry.feature_type == feature_type && entry.feature_setting == setting {
                        flags = (flags & entry.disable_flags) | entry.enable_flags;
                    }
                }
            }
            chain_flags.push(flags);
        }
        AatMap { chain_flags }
    }
}

/// OpenType tag to AAT `(featureType, onSetting, offSetting)` for the
/// features commonly found in both worlds.
fn aat_feature_for_tag(ot_tag: u32) -> Option<(u16, u16, u16)> {
    const DLIG: u32 = crate::tag::tag_from_bytes(*b"dlig");
    const HLIG: u32 = crate::tag::tag_from_bytes(*b"hlig");
    const SMCP: u32 = crate::tag::tag_from_bytes(*b"smcp");
    match ot_tag {
        tag::LIGA => Some((1, 2, 3)),            // common ligatures on/off
        DLIG => Some((1, 4, 5)),                 // rare ligatures
        HLIG => Some((1, 20, 21)),               // historical ligatures
        SMCP => Some((38, 3, 0)),                // lower case to small caps
        tag::VERT | tag::VRT2 => Some((4, 1, 0)), // vertical substitution
        _ => None,
    }
}

/// Apply `morx` substitutions. This replaces the GSUB pass when the plan
/// selected AAT shaping.
pub(crate) fn apply_morx(morx: &MorxTable, map: &AatMap, buffer: &mut Buffer) {
    for (chain, &flags) in morx.chains.iter().zip(map.chain_flags.iter()) {
        for subtable in &chain.subtables {
            if subtable.sub_feature_flags & flags == 0 {
                continue;
            }
            if subtable.coverage & MORX_COVERAGE_VERTICAL != 0
                && buffer.props.direction.is_horizontal()
            {
                continue;
            }
            match &subtable.kind {
                MorxSubtableKind::NonContextual(lookup) => {
                    for info in &mut buffer.info {
                        if let Some(replacement) = lookup.value(info.codepoint as u16) {
                            info.codepoint = u32::from(replacement);
                        }
                    }
                }
                MorxSubtableKind::Unsupported(kind) => {
                    log::warn!("morx subtable type {} not supported; skipped", kind);
                }
            }
        }
    }
}

// kerx

pub(crate) struct KerxTable {
    subtables: Vec<KerxSubtable>,
}

struct KerxSubtable {
    horizontal: bool,
    cross_stream: bool,
    /// Sorted by `(left << 16) | right`.
    pairs: Vec<(u32, i16)>,
}

impl KerxTable {
    pub fn read(data: &[u8]) -> Result<KerxTable, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let _version = ctxt.read_u16()?;
        let _padding = ctxt.read_u16()?;
        let n_tables = ctxt.read_u32()? as usize;

        let mut subtables = Vec::new();
        let mut offset = 8usize;
        for _ in 0..n_tables {
            let subtable_scope = scope.offset(offset)?;
            let mut subtable_ctxt = subtable_scope.ctxt();
            let length = subtable_ctxt.read_u32()? as usize;
            let coverage = subtable_ctxt.read_u32()?;
            let _tuple_count = subtable_ctxt.read_u32()?;
            let format = (coverage & 0xFF) as u8;
            let horizontal = coverage & 0x8000_0000 == 0;
            let cross_stream = coverage & 0x4000_0000 != 0;

            if format == 0 {
                let n_pairs = subtable_ctxt.read_u32()? as usize;
                subtable_ctxt.skip(12)?; // searchRange, entrySelector, rangeShift
                let mut pairs = Vec::with_capacity(n_pairs.min(subtable_ctxt.bytes_available() / 6));
                for _ in 0..n_pairs {
                    let left = subtable_ctxt.read_u16()?;
                    let right = subtable_ctxt.read_u16()?;
                    let value = subtable_ctxt.read_i16()?;
                    pairs.push(((u32::from(left) << 16) | u32::from(right), value));
                }
                pairs.sort_by_key(|&(key, _)| key);
                subtables.push(KerxSubtable {
                    horizontal,
                    cross_stream,
                    pairs,
                });
            } else {
                log::warn!("kerx subtable format {} not supported; skipped", format);
            }

            if length < 12 {
                return Err(ParseError::BadValue);
            }
            offset += length;
        }

        Ok(KerxTable { subtables })
    }

    pub fn apply(&self, kern_mask: u32, buffer: &mut Buffer) {
        for subtable in &self.subtables {
            if !subtable.horizontal {
                continue;
            }
            let len = buffer.len();
            let mut i = 0;
            while i + 1 < len {
                let j = i + 1;
                if buffer.info[i].mask & kern_mask == 0 {
                    i += 1;
                    continue;
                }
                let key = (buffer.info[i].codepoint << 16) | buffer.info[j].codepoint;
                if let Ok(index) = subtable.pairs.binary_search_by_key(&key, |&(k, _)| k) {
                    let value = i32::from(subtable.pairs[index].1);
                    if subtable.cross_stream {
                        buffer.pos[j].y_offset += value;
                    } else {
                        let kern1 = value >> 1;
                        let kern2 = value - kern1;
                        buffer.pos[i].x_advance += kern1;
                        buffer.pos[j].x_advance += kern2;
                        buffer.pos[j].x_offset += kern2;
                    }
                    buffer.unsafe_to_break(i, j + 1);
                }
                i += 1;
            }
        }
    }
}

// trak

pub(crate) struct TrakTable {
    horiz: Option<TrackData>,
}

struct TrackData {
    sizes: Vec<f32>,
    /// Per-size values of the track 0.0 entry.
    neutral_values: Vec<i16>,
}

impl TrakTable {
    pub fn read(data: &[u8]) -> Result<TrakTable, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let _version = ctxt.read_u32()?;
        let _format = ctxt.read_u16()?;
        let horiz_offset = usize::from(ctxt.read_u16()?);
        let _vert_offset = ctxt.read_u16()?;
        let _reserved = ctxt.read_u16()?;

        let horiz = if horiz_offset != 0 {
            read_track_data(scope, horiz_offset)?
        } else {
            None
        };
        Ok(TrakTable { horiz })
    }

    /// Apply tracking to horizontal advances. Needs the face's point size;
    /// without one, tracking is a no-op.
    pub fn apply(&self, face: &dyn Face, buffer: &mut Buffer) {
        let Some(track) = &self.horiz else {
            return;
        };
        let Some(ptem) = face.point_size() else {
            log::debug!("trak requested but face has no point size");
            return;
        };
        let Some(delta) = track.value_for_size(ptem) else {
            return;
        };
        for pos in &mut buffer.pos {
            pos.x_advance += delta;
        }
    }
}

fn read_track_data(
    scope: ReadScope<'_>,
    offset: usize,
) -> Result<Option<TrackData>, ParseError> {
    let mut ctxt = scope.offset(offset)?.ctxt();
    let n_tracks = usize::from(ctxt.read_u16()?);
    let n_sizes = usize::from(ctxt.read_u16()?);
    let size_table_offset = ctxt.read_u32()? as usize;

    // Find the neutral (0.0) track.
    let mut neutral_offset = None;
    for _ in 0..n_tracks {
        let track = ctxt.read_i32()?;
        let _name_index = ctxt.read_u16()?;
        let values_offset = ctxt.read_u16()?;
        if track == 0 {
            neutral_offset = Some(usize::from(values_offset));
        }
    }
    let Some(neutral_offset) = neutral_offset else {
        return Ok(None);
    };

    let mut sizes_ctxt = scope.offset(size_table_offset)?.ctxt();
    let mut sizes = Vec::with_capacity(n_sizes);
    for _ in 0..n_sizes {
        // 16.16 fixed point sizes.
        sizes.push(sizes_ctxt.read_i32()? as f32 / 65536.0);
    }

    let mut values_ctxt = scope.offset(neutral_offset)?.ctxt();
    let neutral_values = values_ctxt.read_i16s(n_sizes)?;

    Ok(Some(TrackData {
        sizes,
        neutral_values,
    }))
}

impl TrackData {
    fn value_for_size(&self, ptem: f32) -> Option<i32> {
        if self.sizes.is_empty() {
            return None;
        }
        if self.sizes.len() == 1 || ptem <= self.sizes[0] {
            return Some(i32::from(self.neutral_values[0]));
        }
        let last = self.sizes.len() - 1;
        if ptem >= self.sizes[last] {
            return Some(i32::from(self.neutral_values[last]));
        }
        // Linear interpolation between the bracketing sizes.
        for i in 0..last {
            let (lo, hi) = (self.sizes[i], self.sizes[i + 1]);
            if lo <= ptem && ptem <= hi {
                let t = (ptem - lo) / (hi - lo);
                let a = f32::from(self.neutral_values[i]);
                let b = f32::from(self.neutral_values[i + 1]);
                return Some((a + (b - a) * t).round() as i32);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aat_lookup_format6() {
        let mut data = Vec::new();
        data.extend_from_slice(&6u16.to_be_bytes()); // format
        data.extend_from_slice(&4u16.to_be_bytes()); // unitSize
        data.extend_from_slice(&2u16.to_be_bytes()); // nUnits
        data.extend_from_slice(&[0; 6]); // bin search header
        for (glyph, value) in [(5u16, 50u16), (9, 90)] {
            data.extend_from_slice(&glyph.to_be_bytes());
            data.extend_from_slice(&value.to_be_bytes());
        }
        let lookup = AatLookup::read(ReadScope::new(&data)).unwrap();
        assert_eq!(lookup.value(5), Some(50));
        assert_eq!(lookup.value(9), Some(90));
        assert_eq!(lookup.value(6), None);
    }

    #[test]
    fn test_aat_lookup_format8() {
        let mut data = Vec::new();
        data.extend_from_slice(&8u16.to_be_bytes());
        data.extend_from_slice(&10u16.to_be_bytes()); // firstGlyph
        data.extend_from_slice(&2u16.to_be_bytes()); // glyphCount
        data.extend_from_slice(&100u16.to_be_bytes());
        data.extend_from_slice(&200u16.to_be_bytes());
        let lookup = AatLookup::read(ReadScope::new(&data)).unwrap();
        assert_eq!(lookup.value(10), Some(100));
        assert_eq!(lookup.value(11), Some(200));
        assert_eq!(lookup.value(9), None);
        assert_eq!(lookup.value(12), None);
    }
}
