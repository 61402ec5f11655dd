//! `kern` table parsing and application.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/kern>
//!
//! Both the OpenType (version 0) and AAT (version 1) headers are accepted.
//! Format 0 pair kerning is applied; the state-machine formats only inform
//! the plan (their presence disables mark zeroing, matching other shapers)
//! and are otherwise skipped.

use crate::binary::ReadScope;
use crate::buffer::Buffer;
use crate::error::ParseError;

pub(crate) struct KernTable {
    subtables: Vec<KernSubtable>,
}

struct KernSubtable {
    horizontal: bool,
    cross_stream: bool,
    data: KernData,
}

enum KernData {
    Format0 {
        /// Sorted by `(left << 16) | right`.
        pairs: Vec<(u32, i16)>,
    },
    StateMachine,
    Unsupported,
}

impl KernTable {
    pub fn read(data: &[u8]) -> Result<KernTable, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let first = ctxt.read_u16()?;

        let mut subtables = Vec::new();
        if first == 0 {
            // OpenType header.
            let n_tables = usize::from(ctxt.read_u16()?);
            for _ in 0..n_tables {
                let _version = ctxt.read_u16()?;
                let length = usize::from(ctxt.read_u16()?);
                let coverage = ctxt.read_u16()?;
                let format = (coverage >> 8) as u8;
                let horizontal = coverage & 0x0001 != 0;
                let cross_stream = coverage & 0x0004 != 0;
                let header_len = 6;
                let data_len = length.checked_sub(header_len).ok_or(ParseError::BadValue)?;
                let data = read_kern_data(&mut ctxt, format, data_len)?;
                subtables.push(KernSubtable {
                    horizontal,
                    cross_stream,
                    data,
                });
            }
        } else if first == 1 {
            // AAT header: version 1.0 as a 32-bit fixed.
            if ctxt.read_u16()? != 0 {
                return Err(ParseError::BadVersion);
            }
            let n_tables = ctxt.read_u32()? as usize;
            for _ in 0..n_tables {
                let length = ctxt.read_u32()? as usize;
                let coverage = ctxt.read_u16()?;
                let _tuple_index = ctxt.read_u16()?;
                let format = (coverage & 0x00FF) as u8;
                let horizontal = coverage & 0x8000 == 0;
                let cross_stream = coverage & 0x4000 != 0;
                let header_len = 8;
                let data_len = length.checked_sub(header_len).ok_or(ParseError::BadValue)?;
                let data = read_kern_data(&mut ctxt, format, data_len)?;
                subtables.push(KernSubtable {
                    horizontal,
                    cross_stream,
                    data,
                });
            }
        } else {
            return Err(ParseError::BadVersion);
        }

        Ok(KernTable { subtables })
    }

    /// Any horizontal format 0 pairs present?
    pub fn has_kerning(&self) -> bool {
        self.subtables
            .iter()
            .any(|st| st.horizontal && matches!(st.data, KernData::Format0 { .. }))
    }

    pub fn has_state_machine(&self) -> bool {
        self.subtables
            .iter()
            .any(|st| matches!(st.data, KernData::StateMachine))
    }

    pub fn has_cross_stream(&self) -> bool {
        self.subtables.iter().any(|st| st.cross_stream)
    }

    /// Apply pair kerning to glyphs carrying the kern mask bit.
    pub fn apply(&self, kern_mask: u32, buffer: &mut Buffer) {
        for subtable in &self.subtables {
            if !subtable.horizontal {
                continue;
            }
            let KernData::Format0 { pairs } = &subtable.data else {
                continue;
            };

            let len = buffer.len();
            let mut i = 0;
            while i + 1 < len {
                let j = i + 1;
                if buffer.info[i].mask & kern_mask == 0 {
                    i += 1;
                    continue;
                }
                let left = buffer.info[i].codepoint as u16;
                let right = buffer.info[j].codepoint as u16;
                let key = (u32::from(left) << 16) | u32::from(right);
                if let Ok(index) = pairs.binary_search_by_key(&key, |&(k, _)| k) {
                    let value = i32::from(pairs[index].1);
                    if subtable.cross_stream {
                        buffer.pos[j].y_offset += value;
                    } else {
                        // Split the kern between the pair, the offset keeping
                        // the second glyph snug against the first.
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

fn read_kern_data(
    ctxt: &mut crate::binary::ReadCtxt<'_>,
    format: u8,
    data_len: usize,
) -> Result<KernData, ParseError> {
    match format {
        0 => {
            let n_pairs = usize::from(ctxt.read_u16()?);
            let _search_range = ctxt.read_u16()?;
            let _entry_selector = ctxt.read_u16()?;
            let _range_shift = ctxt.read_u16()?;
            if n_pairs * 6 + 8 > data_len {
                return Err(ParseError::BadEof);
            }
            let mut pairs = Vec::with_capacity(n_pairs);
            for _ in 0..n_pairs {
                let left = ctxt.read_u16()?;
                let right = ctxt.read_u16()?;
                let value = ctxt.read_i16()?;
                pairs.push(((u32::from(left) << 16) | u32::from(right), value));
            }
            // Fonts are supposed to sort the pairs, but trust nothing.
            pairs.sort_by_key(|&(key, _)| key);
            ctxt.skip(data_len - 8 - n_pairs * 6)?;
            Ok(KernData::Format0 { pairs })
        }
        1 => {
            ctxt.skip(data_len)?;
            Ok(KernData::StateMachine)
        }
        _ => {
            ctxt.skip(data_len)?;
            Ok(KernData::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format0_kern_table(pairs: &[(u16, u16, i16)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes()); // version
        data.extend_from_slice(&1u16.to_be_bytes()); // nTables
        let length = 6 + 8 + pairs.len() * 6;
        data.extend_from_slice(&0u16.to_be_bytes()); // subtable version
        data.extend_from_slice(&(length as u16).to_be_bytes());
        data.extend_from_slice(&0x0001u16.to_be_bytes()); // coverage: horizontal
        data.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // searchRange
        data.extend_from_slice(&0u16.to_be_bytes()); // entrySelector
        data.extend_from_slice(&0u16.to_be_bytes()); // rangeShift
        for &(left, right, value) in pairs {
            data.extend_from_slice(&left.to_be_bytes());
            data.extend_from_slice(&right.to_be_bytes());
            data.extend_from_slice(&value.to_be_bytes());
        }
        data
    }

    #[test]
    fn test_parse_and_apply_format0() {
        let data = format0_kern_table(&[(1, 2, -50)]);
        let kern = KernTable::read(&data).unwrap();
        assert!(kern.has_kerning());
        assert!(!kern.has_state_machine());

        let mut buffer = Buffer::new();
        buffer.add(1, 0);
        buffer.add(2, 1);
        buffer.clear_positions();
        for info in &mut buffer.info {
            info.mask = u32::MAX & !crate::buffer::UNSAFE_TO_BREAK;
        }
        kern.apply(2, &mut buffer);
        let total: i32 = buffer.pos.iter().map(|p| p.x_advance).sum();
        assert_eq!(total, -50);
    }
}
