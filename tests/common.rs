//! Shared test fixtures: an in-memory `Face` and builders that assemble
//! minimal GSUB/GPOS/GDEF tables byte by byte.

#![allow(dead_code)]

use std::collections::HashMap;

use shapeset::face::{Face, GlyphExtents};

/// A synthetic face: cmap, metrics, and raw tables supplied directly.
#[derive(Default)]
pub struct TestFace {
    pub glyphs: HashMap<u32, u16>,
    pub advances: HashMap<u16, i32>,
    pub default_advance: i32,
    pub extents: HashMap<u16, GlyphExtents>,
    pub tables: HashMap<u32, Vec<u8>>,
}

impl TestFace {
    pub fn new() -> TestFace {
        TestFace {
            default_advance: 600,
            ..TestFace::default()
        }
    }

    pub fn with_cmap(mut self, mapping: &[(u32, u16)]) -> TestFace {
        self.glyphs.extend(mapping.iter().copied());
        self
    }

    /// Map a string of characters to consecutive glyph ids from `first`.
    pub fn with_chars(mut self, chars: &str, first: u16) -> TestFace {
        for (i, c) in chars.chars().enumerate() {
            self.glyphs.insert(c as u32, first + i as u16);
        }
        self
    }

    pub fn with_advance(mut self, glyph: u16, advance: i32) -> TestFace {
        self.advances.insert(glyph, advance);
        self
    }

    pub fn with_extents(mut self, glyph: u16, extents: GlyphExtents) -> TestFace {
        self.extents.insert(glyph, extents);
        self
    }

    pub fn with_table(mut self, tag: u32, data: Vec<u8>) -> TestFace {
        self.tables.insert(tag, data);
        self
    }
}

impl Face for TestFace {
    fn table(&self, tag: u32) -> Option<&[u8]> {
        self.tables.get(&tag).map(Vec::as_slice)
    }

    fn glyph_index(&self, codepoint: u32, _variation_selector: Option<u32>) -> Option<u16> {
        self.glyphs.get(&codepoint).copied()
    }

    fn advance_h(&self, glyph: u16) -> i32 {
        self.advances
            .get(&glyph)
            .copied()
            .unwrap_or(self.default_advance)
    }

    fn glyph_extents(&self, glyph: u16) -> Option<GlyphExtents> {
        self.extents.get(&glyph).copied()
    }
}

// Byte assembly helpers. All OpenType offsets are relative to the start of
// the structure that holds them, so tables compose bottom-up.

fn push_u16(data: &mut Vec<u8>, value: u16) {
    data.extend_from_slice(&value.to_be_bytes());
}

fn push_i16(data: &mut Vec<u8>, value: i16) {
    data.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_be_bytes());
}

/// Coverage table format 1.
pub fn coverage(glyphs: &[u16]) -> Vec<u8> {
    let mut sorted = glyphs.to_vec();
    sorted.sort_unstable();
    let mut data = Vec::new();
    push_u16(&mut data, 1);
    push_u16(&mut data, sorted.len() as u16);
    for glyph in sorted {
        push_u16(&mut data, glyph);
    }
    data
}

/// Class definition format 1.
pub fn class_def(start: u16, classes: &[u16]) -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, 1);
    push_u16(&mut data, start);
    push_u16(&mut data, classes.len() as u16);
    for &class in classes {
        push_u16(&mut data, class);
    }
    data
}

/// Single substitution format 2: explicit input/output pairs.
pub fn single_subst(pairs: &[(u16, u16)]) -> Vec<u8> {
    let mut pairs = pairs.to_vec();
    pairs.sort_unstable();
    let inputs: Vec<u16> = pairs.iter().map(|&(input, _)| input).collect();
    let cov = coverage(&inputs);

    let mut data = Vec::new();
    push_u16(&mut data, 2); // format
    let cov_offset = 6 + 2 * pairs.len();
    push_u16(&mut data, cov_offset as u16);
    push_u16(&mut data, pairs.len() as u16);
    for &(_, output) in &pairs {
        push_u16(&mut data, output);
    }
    data.extend_from_slice(&cov);
    data
}

/// Ligature substitution: one ligature set per distinct first glyph.
pub fn ligature_subst(ligatures: &[(&[u16], u16)]) -> Vec<u8> {
    // Group by first component, preserving order.
    let mut firsts: Vec<u16> = Vec::new();
    for (components, _) in ligatures {
        let first = components[0];
        if !firsts.contains(&first) {
            firsts.push(first);
        }
    }
    firsts.sort_unstable();

    // Build each ligature set.
    let mut sets: Vec<Vec<u8>> = Vec::new();
    for &first in &firsts {
        let mut ligature_tables: Vec<Vec<u8>> = Vec::new();
        for (components, lig_glyph) in ligatures {
            if components[0] != first {
                continue;
            }
            let mut lig = Vec::new();
            push_u16(&mut lig, *lig_glyph);
            push_u16(&mut lig, components.len() as u16);
            for &component in &components[1..] {
                push_u16(&mut lig, component);
            }
            ligature_tables.push(lig);
        }

        let mut set = Vec::new();
        push_u16(&mut set, ligature_tables.len() as u16);
        let mut offset = 2 + 2 * ligature_tables.len();
        for lig in &ligature_tables {
            push_u16(&mut set, offset as u16);
            offset += lig.len();
        }
        for lig in ligature_tables {
            set.extend_from_slice(&lig);
        }
        sets.push(set);
    }

    let cov = coverage(&firsts);
    let mut data = Vec::new();
    push_u16(&mut data, 1); // format
    let header_len = 6 + 2 * sets.len();
    let sets_len: usize = sets.iter().map(Vec::len).sum();
    push_u16(&mut data, (header_len + sets_len) as u16); // coverage offset
    push_u16(&mut data, sets.len() as u16);
    let mut offset = header_len;
    for set in &sets {
        push_u16(&mut data, offset as u16);
        offset += set.len();
    }
    for set in sets {
        data.extend_from_slice(&set);
    }
    data.extend_from_slice(&cov);
    data
}

/// Pair positioning format 1 with x-advance adjustment on the first glyph.
pub fn pair_pos_x_advance(pairs: &[(u16, u16, i16)]) -> Vec<u8> {
    let mut firsts: Vec<u16> = Vec::new();
    for &(first, _, _) in pairs {
        if !firsts.contains(&first) {
            firsts.push(first);
        }
    }
    firsts.sort_unstable();

    let mut pair_sets: Vec<Vec<u8>> = Vec::new();
    for &first in &firsts {
        let records: Vec<&(u16, u16, i16)> =
            pairs.iter().filter(|&&(f, _, _)| f == first).collect();
        let mut set = Vec::new();
        push_u16(&mut set, records.len() as u16);
        for &&(_, second, value) in &records {
            push_u16(&mut set, second);
            push_i16(&mut set, value); // value record 1: XAdvance
        }
        pair_sets.push(set);
    }

    let cov = coverage(&firsts);
    let mut data = Vec::new();
    push_u16(&mut data, 1); // format
    let header_len = 10 + 2 * pair_sets.len();
    let sets_len: usize = pair_sets.iter().map(Vec::len).sum();
    push_u16(&mut data, (header_len + sets_len) as u16); // coverage offset
    push_u16(&mut data, 0x0004); // valueFormat1: XAdvance
    push_u16(&mut data, 0); // valueFormat2
    push_u16(&mut data, pair_sets.len() as u16);
    let mut offset = header_len;
    for set in &pair_sets {
        push_u16(&mut data, offset as u16);
        offset += set.len();
    }
    for set in pair_sets {
        data.extend_from_slice(&set);
    }
    data.extend_from_slice(&cov);
    data
}

fn anchor(x: i16, y: i16) -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, 1); // format
    push_i16(&mut data, x);
    push_i16(&mut data, y);
    data
}

/// Mark-to-base positioning with a single mark class.
pub fn mark_base_pos(
    base: u16,
    base_anchor: (i16, i16),
    mark: u16,
    mark_anchor: (i16, i16),
) -> Vec<u8> {
    let mark_cov = coverage(&[mark]);
    let base_cov = coverage(&[base]);

    // MarkArray: one record, anchor right after it.
    let mut mark_array = Vec::new();
    push_u16(&mut mark_array, 1); // markCount
    push_u16(&mut mark_array, 0); // class
    push_u16(&mut mark_array, 6); // anchor offset from MarkArray start
    mark_array.extend_from_slice(&anchor(mark_anchor.0, mark_anchor.1));

    // BaseArray: one base, one class.
    let mut base_array = Vec::new();
    push_u16(&mut base_array, 1); // baseCount
    push_u16(&mut base_array, 4); // anchor offset from BaseArray start
    base_array.extend_from_slice(&anchor(base_anchor.0, base_anchor.1));

    let mut data = Vec::new();
    push_u16(&mut data, 1); // format
    let mark_cov_offset = 12;
    let base_cov_offset = mark_cov_offset + mark_cov.len();
    let mark_array_offset = base_cov_offset + base_cov.len();
    let base_array_offset = mark_array_offset + mark_array.len();
    push_u16(&mut data, mark_cov_offset as u16);
    push_u16(&mut data, base_cov_offset as u16);
    push_u16(&mut data, 1); // markClassCount
    push_u16(&mut data, mark_array_offset as u16);
    push_u16(&mut data, base_array_offset as u16);
    data.extend_from_slice(&mark_cov);
    data.extend_from_slice(&base_cov);
    data.extend_from_slice(&mark_array);
    data.extend_from_slice(&base_array);
    data
}

/// A complete lookup table.
pub fn lookup(lookup_type: u16, flag: u16, subtables: &[Vec<u8>]) -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, lookup_type);
    push_u16(&mut data, flag);
    push_u16(&mut data, subtables.len() as u16);
    let mut offset = 6 + 2 * subtables.len();
    for subtable in subtables {
        push_u16(&mut data, offset as u16);
        offset += subtable.len();
    }
    for subtable in subtables {
        data.extend_from_slice(subtable);
    }
    data
}

/// A complete GSUB or GPOS table: one DFLT script whose default language
/// system carries every feature; `features` maps tags to lookup indices.
pub fn layout_table(features: &[(u32, &[u16])], lookups: &[Vec<u8>]) -> Vec<u8> {
    // LangSys listing every feature.
    let mut langsys = Vec::new();
    push_u16(&mut langsys, 0); // lookupOrderOffset
    push_u16(&mut langsys, 0xFFFF); // requiredFeatureIndex
    push_u16(&mut langsys, features.len() as u16);
    for i in 0..features.len() as u16 {
        push_u16(&mut langsys, i);
    }

    // ScriptTable with only a default LangSys, at offset 4.
    let mut script_table = Vec::new();
    push_u16(&mut script_table, 4);
    push_u16(&mut script_table, 0);
    script_table.extend_from_slice(&langsys);

    // ScriptList with the single DFLT script at offset 8.
    let mut script_list = Vec::new();
    push_u16(&mut script_list, 1);
    push_u32(&mut script_list, u32::from_be_bytes(*b"DFLT"));
    push_u16(&mut script_list, 8);
    script_list.extend_from_slice(&script_table);

    // FeatureList.
    let mut feature_tables: Vec<Vec<u8>> = Vec::new();
    for &(_, lookup_indices) in features {
        let mut table = Vec::new();
        push_u16(&mut table, 0); // featureParamsOffset
        push_u16(&mut table, lookup_indices.len() as u16);
        for &index in lookup_indices {
            push_u16(&mut table, index);
        }
        feature_tables.push(table);
    }
    let mut feature_list = Vec::new();
    push_u16(&mut feature_list, features.len() as u16);
    let mut offset = 2 + 6 * features.len();
    for (i, &(tag, _)) in features.iter().enumerate() {
        push_u32(&mut feature_list, tag);
        push_u16(&mut feature_list, offset as u16);
        offset += feature_tables[i].len();
    }
    for table in feature_tables {
        feature_list.extend_from_slice(&table);
    }

    // LookupList.
    let mut lookup_list = Vec::new();
    push_u16(&mut lookup_list, lookups.len() as u16);
    let mut offset = 2 + 2 * lookups.len();
    for lookup_table in lookups {
        push_u16(&mut lookup_list, offset as u16);
        offset += lookup_table.len();
    }
    for lookup_table in lookups {
        lookup_list.extend_from_slice(lookup_table);
    }

    // Header.
    let mut data = Vec::new();
    push_u16(&mut data, 1);
    push_u16(&mut data, 0);
    let script_offset = 10;
    let feature_offset = script_offset + script_list.len();
    let lookup_offset = feature_offset + feature_list.len();
    push_u16(&mut data, script_offset as u16);
    push_u16(&mut data, feature_offset as u16);
    push_u16(&mut data, lookup_offset as u16);
    data.extend_from_slice(&script_list);
    data.extend_from_slice(&feature_list);
    data.extend_from_slice(&lookup_list);
    data
}

/// A GDEF table carrying only a glyph class definition.
pub fn gdef_table(class_def_bytes: Vec<u8>) -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, 1);
    push_u16(&mut data, 0);
    push_u16(&mut data, 12); // glyphClassDefOffset
    push_u16(&mut data, 0); // attachListOffset
    push_u16(&mut data, 0); // ligCaretListOffset
    push_u16(&mut data, 0); // markAttachClassDefOffset
    data.extend_from_slice(&class_def_bytes);
    data
}

pub fn ot_tag(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}
