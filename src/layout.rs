//! Parsed GSUB, GPOS, and GDEF tables.
//!
//! The tables are parsed once, at plan-compile time, into owned structures.
//! Anything malformed fails with a [ParseError] and the caller drops the
//! table; shaping then proceeds without it.
//!
//! > The Glyph Substitution (GSUB) table provides data for substition of
//! > glyphs for appropriate rendering of scripts. The Glyph Positioning
//! > table (GPOS) provides precise control over glyph placement.
//!
//! — <https://docs.microsoft.com/en-us/typography/opentype/spec/gsub>

use crate::binary::{ReadCtxt, ReadScope};
use crate::error::ParseError;

/// Marker type for the GSUB table.
pub enum GSUB {}
/// Marker type for the GPOS table.
pub enum GPOS {}

/// Flag word attached to every lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LookupFlag(pub u16);

impl LookupFlag {
    pub const RIGHT_TO_LEFT: u16 = 0x0001;
    pub const IGNORE_BASE_GLYPHS: u16 = 0x0002;
    pub const IGNORE_LIGATURES: u16 = 0x0004;
    pub const IGNORE_MARKS: u16 = 0x0008;
    pub const USE_MARK_FILTERING_SET: u16 = 0x0010;
    pub const MARK_ATTACHMENT_TYPE_MASK: u16 = 0xFF00;

    pub fn rtl(self) -> bool {
        self.0 & Self::RIGHT_TO_LEFT != 0
    }

    pub fn ignore_flags(self) -> u16 {
        self.0 & (Self::IGNORE_BASE_GLYPHS | Self::IGNORE_LIGATURES | Self::IGNORE_MARKS)
    }

    pub fn use_mark_filtering_set(self) -> bool {
        self.0 & Self::USE_MARK_FILTERING_SET != 0
    }

    pub fn mark_attachment_type(self) -> u16 {
        (self.0 & Self::MARK_ATTACHMENT_TYPE_MASK) >> 8
    }
}

/// A GSUB or GPOS table: script list, feature list, and lookup list.
pub struct LayoutTable<T: LayoutTableType> {
    pub scripts: Vec<ScriptRecord>,
    pub features: Vec<FeatureRecord>,
    pub lookups: Vec<Lookup<T>>,
}

pub struct ScriptRecord {
    pub tag: u32,
    pub script: ScriptTable,
}

pub struct ScriptTable {
    pub default_langsys: Option<LangSys>,
    pub langsys_records: Vec<LangSysRecord>,
}

pub struct LangSysRecord {
    pub tag: u32,
    pub langsys: LangSys,
}

#[derive(Clone)]
pub struct LangSys {
    pub required_feature: Option<u16>,
    pub feature_indices: Vec<u16>,
}

pub struct FeatureRecord {
    pub tag: u32,
    pub lookup_indices: Vec<u16>,
}

pub struct Lookup<T: LayoutTableType> {
    pub flag: LookupFlag,
    pub mark_filtering_set: Option<u16>,
    pub subtables: T::Subtables,
}

/// Dispatch for the per-table lookup subtable sets.
pub trait LayoutTableType: Sized {
    type Subtables: Sized;
    const TABLE_TAG: u32;
    const EXTENSION_TYPE: u16;

    fn read_subtables(
        lookup_type: u16,
        scopes: &[ReadScope<'_>],
    ) -> Result<Self::Subtables, ParseError>;
}

/// GSUB lookup subtables, one variant per lookup type.
pub enum SubstLookup {
    SingleSubst(Vec<SingleSubst>),
    MultipleSubst(Vec<MultipleSubst>),
    AlternateSubst(Vec<AlternateSubst>),
    LigatureSubst(Vec<LigatureSubst>),
    ContextSubst(Vec<ContextLookup>),
    ChainContextSubst(Vec<ChainContextLookup>),
    // TODO implement support for reverse chaining single substitution
    Unsupported,
}

/// GPOS lookup subtables, one variant per lookup type.
pub enum PosLookup {
    SinglePos(Vec<SinglePos>),
    PairPos(Vec<PairPos>),
    CursivePos(Vec<CursivePos>),
    MarkBasePos(Vec<MarkBasePos>),
    MarkLigPos(Vec<MarkLigPos>),
    MarkMarkPos(Vec<MarkBasePos>),
    ContextPos(Vec<ContextLookup>),
    ChainContextPos(Vec<ChainContextLookup>),
    Unsupported,
}

impl LayoutTableType for GSUB {
    type Subtables = SubstLookup;
    const TABLE_TAG: u32 = crate::tag::GSUB;
    const EXTENSION_TYPE: u16 = 7;

    fn read_subtables(
        lookup_type: u16,
        scopes: &[ReadScope<'_>],
    ) -> Result<SubstLookup, ParseError> {
        let lookup = match lookup_type {
            1 => SubstLookup::SingleSubst(read_all(scopes, read_single_subst)?),
            2 => SubstLookup::MultipleSubst(read_all(scopes, read_multiple_subst)?),
            3 => SubstLookup::AlternateSubst(read_all(scopes, read_alternate_subst)?),
            4 => SubstLookup::LigatureSubst(read_all(scopes, read_ligature_subst)?),
            5 => SubstLookup::ContextSubst(read_all(scopes, read_context)?),
            6 => SubstLookup::ChainContextSubst(read_all(scopes, read_chain_context)?),
            // Reverse chaining single substitution and anything unknown.
            _ => SubstLookup::Unsupported,
        };
        Ok(lookup)
    }
}

impl LayoutTableType for GPOS {
    type Subtables = PosLookup;
    const TABLE_TAG: u32 = crate::tag::GPOS;
    const EXTENSION_TYPE: u16 = 9;

    fn read_subtables(
        lookup_type: u16,
        scopes: &[ReadScope<'_>],
    ) -> Result<PosLookup, ParseError> {
        let lookup = match lookup_type {
            1 => PosLookup::SinglePos(read_all(scopes, read_single_pos)?),
            2 => PosLookup::PairPos(read_all(scopes, read_pair_pos)?),
            3 => PosLookup::CursivePos(read_all(scopes, read_cursive_pos)?),
            4 => PosLookup::MarkBasePos(read_all(scopes, read_mark_base_pos)?),
            5 => PosLookup::MarkLigPos(read_all(scopes, read_mark_lig_pos)?),
            6 => PosLookup::MarkMarkPos(read_all(scopes, read_mark_base_pos)?),
            7 => PosLookup::ContextPos(read_all(scopes, read_context)?),
            8 => PosLookup::ChainContextPos(read_all(scopes, read_chain_context)?),
            _ => PosLookup::Unsupported,
        };
        Ok(lookup)
    }
}

fn read_all<S>(
    scopes: &[ReadScope<'_>],
    read: impl Fn(ReadScope<'_>) -> Result<S, ParseError>,
) -> Result<Vec<S>, ParseError> {
    scopes.iter().map(|scope| read(*scope)).collect()
}

impl<T: LayoutTableType> LayoutTable<T> {
    /// Parse a GSUB or GPOS table out of `data`.
    pub fn read(data: &[u8]) -> Result<LayoutTable<T>, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let major_version = ctxt.read_u16()?;
        let _minor_version = ctxt.read_u16()?;
        if major_version != 1 {
            return Err(ParseError::BadVersion);
        }
        let script_list_offset = usize::from(ctxt.read_u16()?);
        let feature_list_offset = usize::from(ctxt.read_u16()?);
        let lookup_list_offset = usize::from(ctxt.read_u16()?);

        let scripts = read_script_list(scope.offset(script_list_offset)?)?;
        let features = read_feature_list(scope.offset(feature_list_offset)?)?;
        let lookups = read_lookup_list::<T>(scope.offset(lookup_list_offset)?)?;

        Ok(LayoutTable {
            scripts,
            features,
            lookups,
        })
    }

    pub fn find_script(&self, script_tag: u32) -> Option<&ScriptTable> {
        self.scripts
            .iter()
            .find(|record| record.tag == script_tag)
            .map(|record| &record.script)
    }

    pub fn find_script_or_default(&self, script_tag: u32) -> Option<&ScriptTable> {
        self.find_script(script_tag)
            .or_else(|| self.find_script(crate::tag::DFLT))
            .or_else(|| self.find_script(crate::tag::LATN))
    }

    pub fn feature_by_index(&self, index: u16) -> Result<&FeatureRecord, ParseError> {
        self.features
            .get(usize::from(index))
            .ok_or(ParseError::BadIndex)
    }

    /// Index into the feature list of the feature with `feature_tag` in
    /// `langsys`, if any.
    pub fn find_langsys_feature_index(&self, langsys: &LangSys, feature_tag: u32) -> Option<u16> {
        langsys.feature_indices.iter().copied().find(|&index| {
            self.features
                .get(usize::from(index))
                .map_or(false, |record| record.tag == feature_tag)
        })
    }
}

impl ScriptTable {
    pub fn find_langsys(&self, langsys_tag: u32) -> Option<&LangSys> {
        self.langsys_records
            .iter()
            .find(|record| record.tag == langsys_tag)
            .map(|record| &record.langsys)
    }

    pub fn find_langsys_or_default(&self, opt_langsys_tag: Option<u32>) -> Option<&LangSys> {
        match opt_langsys_tag {
            Some(tag) => self
                .find_langsys(tag)
                .or(self.default_langsys.as_ref()),
            None => self.default_langsys.as_ref(),
        }
    }
}

fn read_script_list(scope: ReadScope<'_>) -> Result<Vec<ScriptRecord>, ParseError> {
    let mut ctxt = scope.ctxt();
    let count = usize::from(ctxt.read_u16()?);
    let mut headers = Vec::with_capacity(count.min(ctxt.bytes_available() / 6));
    for _ in 0..count {
        let tag = ctxt.read_u32()?;
        let offset = usize::from(ctxt.read_u16()?);
        headers.push((tag, offset));
    }
    let mut records = Vec::with_capacity(headers.len());
    for (tag, offset) in headers {
        let script = read_script_table(scope.offset(offset)?)?;
        records.push(ScriptRecord { tag, script });
    }
    Ok(records)
}

fn read_script_table(scope: ReadScope<'_>) -> Result<ScriptTable, ParseError> {
    let mut ctxt = scope.ctxt();
    let default_langsys_offset = usize::from(ctxt.read_u16()?);
    let count = usize::from(ctxt.read_u16()?);
    let mut headers = Vec::with_capacity(count.min(ctxt.bytes_available() / 6));
    for _ in 0..count {
        let tag = ctxt.read_u32()?;
        let offset = usize::from(ctxt.read_u16()?);
        headers.push((tag, offset));
    }

    let default_langsys = if default_langsys_offset != 0 {
        Some(read_langsys(scope.offset(default_langsys_offset)?)?)
    } else {
        None
    };
    let mut langsys_records = Vec::with_capacity(headers.len());
    for (tag, offset) in headers {
        let langsys = read_langsys(scope.offset(offset)?)?;
        langsys_records.push(LangSysRecord { tag, langsys });
    }

    Ok(ScriptTable {
        default_langsys,
        langsys_records,
    })
}

fn read_langsys(scope: ReadScope<'_>) -> Result<LangSys, ParseError> {
    let mut ctxt = scope.ctxt();
    let _lookup_order_offset = ctxt.read_u16()?;
    let required_feature = match ctxt.read_u16()? {
        0xFFFF => None,
        index => Some(index),
    };
    let feature_indices = ctxt.read_counted_u16s()?;
    Ok(LangSys {
        required_feature,
        feature_indices,
    })
}

fn read_feature_list(scope: ReadScope<'_>) -> Result<Vec<FeatureRecord>, ParseError> {
    let mut ctxt = scope.ctxt();
    let count = usize::from(ctxt.read_u16()?);
    let mut headers = Vec::with_capacity(count.min(ctxt.bytes_available() / 6));
    for _ in 0..count {
        let tag = ctxt.read_u32()?;
        let offset = usize::from(ctxt.read_u16()?);
        headers.push((tag, offset));
    }
    let mut records = Vec::with_capacity(headers.len());
    for (tag, offset) in headers {
        let mut feature_ctxt = scope.offset(offset)?.ctxt();
        let _feature_params = feature_ctxt.read_u16()?;
        let lookup_indices = feature_ctxt.read_counted_u16s()?;
        records.push(FeatureRecord {
            tag,
            lookup_indices,
        });
    }
    Ok(records)
}

fn read_lookup_list<T: LayoutTableType>(
    scope: ReadScope<'_>,
) -> Result<Vec<Lookup<T>>, ParseError> {
    let mut ctxt = scope.ctxt();
    let offsets = ctxt.read_counted_u16s()?;
    let mut lookups = Vec::with_capacity(offsets.len());
    for offset in offsets {
        lookups.push(read_lookup::<T>(scope.offset(usize::from(offset))?)?);
    }
    Ok(lookups)
}

fn read_lookup<T: LayoutTableType>(scope: ReadScope<'_>) -> Result<Lookup<T>, ParseError> {
    let mut ctxt = scope.ctxt();
    let mut lookup_type = ctxt.read_u16()?;
    let flag = LookupFlag(ctxt.read_u16()?);
    let subtable_offsets = ctxt.read_counted_u16s()?;
    let mark_filtering_set = if flag.use_mark_filtering_set() {
        Some(ctxt.read_u16()?)
    } else {
        None
    };

    let mut scopes = Vec::with_capacity(subtable_offsets.len());
    for offset in subtable_offsets {
        scopes.push(scope.offset(usize::from(offset))?);
    }

    // Extension lookups wrap the actual subtables behind 32-bit offsets.
    if lookup_type == T::EXTENSION_TYPE {
        let mut resolved = Vec::with_capacity(scopes.len());
        let mut actual_type = None;
        for ext_scope in &scopes {
            let mut ext = ext_scope.ctxt();
            let format = ext.read_u16()?;
            if format != 1 {
                return Err(ParseError::BadVersion);
            }
            let extension_lookup_type = ext.read_u16()?;
            let extension_offset = ext.read_u32()?;
            match actual_type {
                None => actual_type = Some(extension_lookup_type),
                Some(t) if t == extension_lookup_type => {}
                Some(_) => return Err(ParseError::BadValue),
            }
            resolved.push(ext_scope.offset(extension_offset as usize)?);
        }
        lookup_type = actual_type.ok_or(ParseError::MissingValue)?;
        if lookup_type == T::EXTENSION_TYPE {
            return Err(ParseError::BadValue);
        }
        scopes = resolved;
    }

    let subtables = T::read_subtables(lookup_type, &scopes)?;
    Ok(Lookup {
        flag,
        mark_filtering_set,
        subtables,
    })
}

// Coverage and class definition tables.

/// A coverage table: the set of glyphs a subtable applies to, each with a
/// coverage index.
pub enum Coverage {
    Format1 { glyphs: Vec<u16> },
    Format2 { ranges: Vec<CoverageRange> },
}

pub struct CoverageRange {
    pub start: u16,
    pub end: u16,
    pub start_index: u16,
}

impl Coverage {
    pub fn read(scope: ReadScope<'_>) -> Result<Coverage, ParseError> {
        let mut ctxt = scope.ctxt();
        match ctxt.read_u16()? {
            1 => {
                let glyphs = ctxt.read_counted_u16s()?;
                Ok(Coverage::Format1 { glyphs })
            }
            2 => {
                let count = usize::from(ctxt.read_u16()?);
                let mut ranges = Vec::with_capacity(count.min(ctxt.bytes_available() / 6));
                for _ in 0..count {
                    let start = ctxt.read_u16()?;
                    let end = ctxt.read_u16()?;
                    let start_index = ctxt.read_u16()?;
                    if end < start {
                        return Err(ParseError::BadValue);
                    }
                    ranges.push(CoverageRange {
                        start,
                        end,
                        start_index,
                    });
                }
                Ok(Coverage::Format2 { ranges })
            }
            _ => Err(ParseError::BadVersion),
        }
    }

    /// The coverage index of `glyph`, if covered.
    pub fn coverage_value(&self, glyph: u16) -> Option<u16> {
        match self {
            Coverage::Format1 { glyphs } => glyphs
                .binary_search(&glyph)
                .ok()
                .map(|index| index as u16),
            Coverage::Format2 { ranges } => {
                let index = ranges
                    .binary_search_by(|range| {
                        if glyph < range.start {
                            std::cmp::Ordering::Greater
                        } else if glyph > range.end {
                            std::cmp::Ordering::Less
                        } else {
                            std::cmp::Ordering::Equal
                        }
                    })
                    .ok()?;
                let range = &ranges[index];
                Some(range.start_index + (glyph - range.start))
            }
        }
    }
}

/// A class definition table, mapping glyphs to class values. Unlisted glyphs
/// have class 0.
pub enum ClassDef {
    Format1 { start: u16, classes: Vec<u16> },
    Format2 { ranges: Vec<(u16, u16, u16)> },
}

impl ClassDef {
    pub fn read(scope: ReadScope<'_>) -> Result<ClassDef, ParseError> {
        let mut ctxt = scope.ctxt();
        match ctxt.read_u16()? {
            1 => {
                let start = ctxt.read_u16()?;
                let classes = ctxt.read_counted_u16s()?;
                Ok(ClassDef::Format1 { start, classes })
            }
            2 => {
                let count = usize::from(ctxt.read_u16()?);
                let mut ranges = Vec::with_capacity(count.min(ctxt.bytes_available() / 6));
                for _ in 0..count {
                    let start = ctxt.read_u16()?;
                    let end = ctxt.read_u16()?;
                    let class = ctxt.read_u16()?;
                    if end < start {
                        return Err(ParseError::BadValue);
                    }
                    ranges.push((start, end, class));
                }
                Ok(ClassDef::Format2 { ranges })
            }
            _ => Err(ParseError::BadVersion),
        }
    }

    pub fn glyph_class_value(&self, glyph: u16) -> u16 {
        match self {
            ClassDef::Format1 { start, classes } => {
                if glyph >= *start {
                    classes
                        .get(usize::from(glyph - start))
                        .copied()
                        .unwrap_or(0)
                } else {
                    0
                }
            }
            ClassDef::Format2 { ranges } => ranges
                .binary_search_by(|&(start, end, _)| {
                    if glyph < start {
                        std::cmp::Ordering::Greater
                    } else if glyph > end {
                        std::cmp::Ordering::Less
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .map(|index| ranges[index].2)
                .unwrap_or(0),
        }
    }
}

// GSUB subtables.

pub enum SingleSubst {
    Format1 { coverage: Coverage, delta: i16 },
    Format2 {
        coverage: Coverage,
        substitutes: Vec<u16>,
    },
}

impl SingleSubst {
    pub fn apply_glyph(&self, glyph: u16) -> Option<u16> {
        match self {
            SingleSubst::Format1 { coverage, delta } => {
                coverage.coverage_value(glyph)?;
                Some((i32::from(glyph) + i32::from(*delta)) as u16)
            }
            SingleSubst::Format2 {
                coverage,
                substitutes,
            } => {
                let index = coverage.coverage_value(glyph)?;
                substitutes.get(usize::from(index)).copied()
            }
        }
    }
}

fn read_single_subst(scope: ReadScope<'_>) -> Result<SingleSubst, ParseError> {
    let mut ctxt = scope.ctxt();
    match ctxt.read_u16()? {
        1 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let delta = ctxt.read_i16()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            Ok(SingleSubst::Format1 { coverage, delta })
        }
        2 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let substitutes = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            Ok(SingleSubst::Format2 {
                coverage,
                substitutes,
            })
        }
        _ => Err(ParseError::BadVersion),
    }
}

pub struct MultipleSubst {
    pub coverage: Coverage,
    pub sequences: Vec<Vec<u16>>,
}

impl MultipleSubst {
    pub fn apply_glyph(&self, glyph: u16) -> Option<&[u16]> {
        let index = self.coverage.coverage_value(glyph)?;
        self.sequences.get(usize::from(index)).map(Vec::as_slice)
    }
}

fn read_multiple_subst(scope: ReadScope<'_>) -> Result<MultipleSubst, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let coverage_offset = usize::from(ctxt.read_u16()?);
    let sequence_offsets = ctxt.read_counted_u16s()?;
    let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
    let mut sequences = Vec::with_capacity(sequence_offsets.len());
    for offset in sequence_offsets {
        let mut seq_ctxt = scope.offset(usize::from(offset))?.ctxt();
        sequences.push(seq_ctxt.read_counted_u16s()?);
    }
    Ok(MultipleSubst {
        coverage,
        sequences,
    })
}

pub struct AlternateSubst {
    pub coverage: Coverage,
    pub alternate_sets: Vec<Vec<u16>>,
}

impl AlternateSubst {
    pub fn apply_glyph(&self, glyph: u16) -> Option<&[u16]> {
        let index = self.coverage.coverage_value(glyph)?;
        self.alternate_sets
            .get(usize::from(index))
            .map(Vec::as_slice)
    }
}

fn read_alternate_subst(scope: ReadScope<'_>) -> Result<AlternateSubst, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let coverage_offset = usize::from(ctxt.read_u16()?);
    let set_offsets = ctxt.read_counted_u16s()?;
    let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
    let mut alternate_sets = Vec::with_capacity(set_offsets.len());
    for offset in set_offsets {
        let mut set_ctxt = scope.offset(usize::from(offset))?.ctxt();
        alternate_sets.push(set_ctxt.read_counted_u16s()?);
    }
    Ok(AlternateSubst {
        coverage,
        alternate_sets,
    })
}

pub struct LigatureSubst {
    pub coverage: Coverage,
    pub ligature_sets: Vec<Vec<Ligature>>,
}

pub struct Ligature {
    pub ligature_glyph: u16,
    /// Component glyphs after the first.
    pub component_glyphs: Vec<u16>,
}

impl LigatureSubst {
    pub fn apply_glyph(&self, glyph: u16) -> Option<&[Ligature]> {
        let index = self.coverage.coverage_value(glyph)?;
        self.ligature_sets
            .get(usize::from(index))
            .map(Vec::as_slice)
    }
}

fn read_ligature_subst(scope: ReadScope<'_>) -> Result<LigatureSubst, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let coverage_offset = usize::from(ctxt.read_u16()?);
    let set_offsets = ctxt.read_counted_u16s()?;
    let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
    let mut ligature_sets = Vec::with_capacity(set_offsets.len());
    for set_offset in set_offsets {
        let set_scope = scope.offset(usize::from(set_offset))?;
        let mut set_ctxt = set_scope.ctxt();
        let ligature_offsets = set_ctxt.read_counted_u16s()?;
        let mut ligatures = Vec::with_capacity(ligature_offsets.len());
        for offset in ligature_offsets {
            let mut lig_ctxt = set_scope.offset(usize::from(offset))?.ctxt();
            let ligature_glyph = lig_ctxt.read_u16()?;
            let component_count = usize::from(lig_ctxt.read_u16()?);
            if component_count == 0 {
                return Err(ParseError::BadValue);
            }
            let component_glyphs = lig_ctxt.read_u16s(component_count - 1)?;
            ligatures.push(Ligature {
                ligature_glyph,
                component_glyphs,
            });
        }
        ligature_sets.push(ligatures);
    }
    Ok(LigatureSubst {
        coverage,
        ligature_sets,
    })
}

// Contextual lookups, shared between GSUB and GPOS.

#[derive(Clone, Copy, Debug)]
pub struct SequenceLookupRecord {
    pub sequence_index: u16,
    pub lookup_index: u16,
}

pub struct ContextRule {
    /// Input sequence, first glyph excluded. Glyph ids in format 1 rules,
    /// classes in format 2 rules.
    pub input: Vec<u16>,
    pub lookup_records: Vec<SequenceLookupRecord>,
}

pub struct ChainRule {
    /// Backtrack sequence in reverse logical order.
    pub backtrack: Vec<u16>,
    /// Input sequence, first glyph excluded.
    pub input: Vec<u16>,
    pub lookahead: Vec<u16>,
    pub lookup_records: Vec<SequenceLookupRecord>,
}

pub enum ContextLookup {
    Format1 {
        coverage: Coverage,
        rule_sets: Vec<Option<Vec<ContextRule>>>,
    },
    Format2 {
        coverage: Coverage,
        class_def: ClassDef,
        rule_sets: Vec<Option<Vec<ContextRule>>>,
    },
    Format3 {
        coverages: Vec<Coverage>,
        lookup_records: Vec<SequenceLookupRecord>,
    },
}

pub enum ChainContextLookup {
    Format1 {
        coverage: Coverage,
        rule_sets: Vec<Option<Vec<ChainRule>>>,
    },
    Format2 {
        coverage: Coverage,
        backtrack_classes: ClassDef,
        input_classes: ClassDef,
        lookahead_classes: ClassDef,
        rule_sets: Vec<Option<Vec<ChainRule>>>,
    },
    Format3 {
        backtrack_coverages: Vec<Coverage>,
        input_coverages: Vec<Coverage>,
        lookahead_coverages: Vec<Coverage>,
        lookup_records: Vec<SequenceLookupRecord>,
    },
}

fn read_sequence_lookup_records(
    ctxt: &mut ReadCtxt<'_>,
    count: usize,
) -> Result<Vec<SequenceLookupRecord>, ParseError> {
    if count > ctxt.bytes_available() / 4 {
        return Err(ParseError::BadEof);
    }
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let sequence_index = ctxt.read_u16()?;
        let lookup_index = ctxt.read_u16()?;
        records.push(SequenceLookupRecord {
            sequence_index,
            lookup_index,
        });
    }
    Ok(records)
}

fn read_context_rule_sets(
    scope: ReadScope<'_>,
    offsets: &[u16],
) -> Result<Vec<Option<Vec<ContextRule>>>, ParseError> {
    let mut rule_sets = Vec::with_capacity(offsets.len());
    for &set_offset in offsets {
        if set_offset == 0 {
            rule_sets.push(None);
            continue;
        }
        let set_scope = scope.offset(usize::from(set_offset))?;
        let mut set_ctxt = set_scope.ctxt();
        let rule_offsets = set_ctxt.read_counted_u16s()?;
        let mut rules = Vec::with_capacity(rule_offsets.len());
        for offset in rule_offsets {
            let mut rule_ctxt = set_scope.offset(usize::from(offset))?.ctxt();
            let glyph_count = usize::from(rule_ctxt.read_u16()?);
            let lookup_count = usize::from(rule_ctxt.read_u16()?);
            if glyph_count == 0 {
                return Err(ParseError::BadValue);
            }
            let input = rule_ctxt.read_u16s(glyph_count - 1)?;
            let lookup_records = read_sequence_lookup_records(&mut rule_ctxt, lookup_count)?;
            rules.push(ContextRule {
                input,
                lookup_records,
            });
        }
        rule_sets.push(Some(rules));
    }
    Ok(rule_sets)
}

fn read_context(scope: ReadScope<'_>) -> Result<ContextLookup, ParseError> {
    let mut ctxt = scope.ctxt();
    match ctxt.read_u16()? {
        1 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let rule_set_offsets = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let rule_sets = read_context_rule_sets(scope, &rule_set_offsets)?;
            Ok(ContextLookup::Format1 {
                coverage,
                rule_sets,
            })
        }
        2 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let class_def_offset = usize::from(ctxt.read_u16()?);
            let rule_set_offsets = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let class_def = ClassDef::read(scope.offset(class_def_offset)?)?;
            let rule_sets = read_context_rule_sets(scope, &rule_set_offsets)?;
            Ok(ContextLookup::Format2 {
                coverage,
                class_def,
                rule_sets,
            })
        }
        3 => {
            let glyph_count = usize::from(ctxt.read_u16()?);
            let lookup_count = usize::from(ctxt.read_u16()?);
            if glyph_count == 0 {
                return Err(ParseError::BadValue);
            }
            let coverage_offsets = ctxt.read_u16s(glyph_count)?;
            let lookup_records = read_sequence_lookup_records(&mut ctxt, lookup_count)?;
            let mut coverages = Vec::with_capacity(coverage_offsets.len());
            for offset in coverage_offsets {
                coverages.push(Coverage::read(scope.offset(usize::from(offset))?)?);
            }
            Ok(ContextLookup::Format3 {
                coverages,
                lookup_records,
            })
        }
        _ => Err(ParseError::BadVersion),
    }
}

fn read_chain_rule_sets(
    scope: ReadScope<'_>,
    offsets: &[u16],
) -> Result<Vec<Option<Vec<ChainRule>>>, ParseError> {
    let mut rule_sets = Vec::with_capacity(offsets.len());
    for &set_offset in offsets {
        if set_offset == 0 {
            rule_sets.push(None);
            continue;
        }
        let set_scope = scope.offset(usize::from(set_offset))?;
        let mut set_ctxt = set_scope.ctxt();
        let rule_offsets = set_ctxt.read_counted_u16s()?;
        let mut rules = Vec::with_capacity(rule_offsets.len());
        for offset in rule_offsets {
            let mut rule_ctxt = set_scope.offset(usize::from(offset))?.ctxt();
            let backtrack = rule_ctxt.read_counted_u16s()?;
            let input_count = usize::from(rule_ctxt.read_u16()?);
            if input_count == 0 {
                return Err(ParseError::BadValue);
            }
            let input = rule_ctxt.read_u16s(input_count - 1)?;
            let lookahead = rule_ctxt.read_counted_u16s()?;
            let lookup_count = usize::from(rule_ctxt.read_u16()?);
            let lookup_records = read_sequence_lookup_records(&mut rule_ctxt, lookup_count)?;
            rules.push(ChainRule {
                backtrack,
                input,
                lookahead,
                lookup_records,
            });
        }
        rule_sets.push(Some(rules));
    }
    Ok(rule_sets)
}

fn read_coverages(
    scope: ReadScope<'_>,
    offsets: &[u16],
) -> Result<Vec<Coverage>, ParseError> {
    let mut coverages = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        coverages.push(Coverage::read(scope.offset(usize::from(offset))?)?);
    }
    Ok(coverages)
}

fn read_chain_context(scope: ReadScope<'_>) -> Result<ChainContextLookup, ParseError> {
    let mut ctxt = scope.ctxt();
    match ctxt.read_u16()? {
        1 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let rule_set_offsets = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let rule_sets = read_chain_rule_sets(scope, &rule_set_offsets)?;
            Ok(ChainContextLookup::Format1 {
                coverage,
                rule_sets,
            })
        }
        2 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let backtrack_offset = usize::from(ctxt.read_u16()?);
            let input_offset = usize::from(ctxt.read_u16()?);
            let lookahead_offset = usize::from(ctxt.read_u16()?);
            let rule_set_offsets = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let backtrack_classes = ClassDef::read(scope.offset(backtrack_offset)?)?;
            let input_classes = ClassDef::read(scope.offset(input_offset)?)?;
            let lookahead_classes = ClassDef::read(scope.offset(lookahead_offset)?)?;
            let rule_sets = read_chain_rule_sets(scope, &rule_set_offsets)?;
            Ok(ChainContextLookup::Format2 {
                coverage,
                backtrack_classes,
                input_classes,
                lookahead_classes,
                rule_sets,
            })
        }
        3 => {
            let backtrack_offsets = ctxt.read_counted_u16s()?;
            let input_offsets = ctxt.read_counted_u16s()?;
            if input_offsets.is_empty() {
                return Err(ParseError::BadValue);
            }
            let lookahead_offsets = ctxt.read_counted_u16s()?;
            let lookup_count = usize::from(ctxt.read_u16()?);
            let lookup_records = read_sequence_lookup_records(&mut ctxt, lookup_count)?;
            Ok(ChainContextLookup::Format3 {
                backtrack_coverages: read_coverages(scope, &backtrack_offsets)?,
                input_coverages: read_coverages(scope, &input_offsets)?,
                lookahead_coverages: read_coverages(scope, &lookahead_offsets)?,
                lookup_records,
            })
        }
        _ => Err(ParseError::BadVersion),
    }
}

// GPOS subtables.

/// A positioning adjustment from a value record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adjust {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
}

/// An optional positioning adjustment.
pub type ValueRecord = Option<Adjust>;

#[derive(Clone, Copy, Debug)]
pub struct ValueFormat(pub u16);

impl ValueFormat {
    const X_PLACEMENT: u16 = 0x0001;
    const Y_PLACEMENT: u16 = 0x0002;
    const X_ADVANCE: u16 = 0x0004;
    const Y_ADVANCE: u16 = 0x0008;
    const DEVICE_BITS: u16 = 0x00F0;

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn read_value(self, ctxt: &mut ReadCtxt<'_>) -> Result<ValueRecord, ParseError> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut adjust = Adjust::default();
        if self.0 & Self::X_PLACEMENT != 0 {
            adjust.x_placement = ctxt.read_i16()?;
        }
        if self.0 & Self::Y_PLACEMENT != 0 {
            adjust.y_placement = ctxt.read_i16()?;
        }
        if self.0 & Self::X_ADVANCE != 0 {
            adjust.x_advance = ctxt.read_i16()?;
        }
        if self.0 & Self::Y_ADVANCE != 0 {
            adjust.y_advance = ctxt.read_i16()?;
        }
        // Device table offsets carry hinting data we do not consume.
        let device_count = (self.0 & Self::DEVICE_BITS).count_ones() as usize;
        ctxt.skip(device_count * 2)?;
        Ok(Some(adjust))
    }
}

/// An attachment point on a glyph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Anchor {
    pub x: i16,
    pub y: i16,
    /// Format 2 anchors nominate a contour point that, when hinting has
    /// moved it, overrides the design coordinates.
    pub contour_point: Option<u16>,
}

impl Anchor {
    fn read(scope: ReadScope<'_>) -> Result<Anchor, ParseError> {
        let mut ctxt = scope.ctxt();
        let format = ctxt.read_u16()?;
        let x = ctxt.read_i16()?;
        let y = ctxt.read_i16()?;
        let contour_point = match format {
            1 | 3 => None,
            2 => Some(ctxt.read_u16()?),
            _ => return Err(ParseError::BadVersion),
        };
        Ok(Anchor {
            x,
            y,
            contour_point,
        })
    }
}

fn read_optional_anchor(
    scope: ReadScope<'_>,
    offset: u16,
) -> Result<Option<Anchor>, ParseError> {
    if offset == 0 {
        Ok(None)
    } else {
        Anchor::read(scope.offset(usize::from(offset))?).map(Some)
    }
}

pub enum SinglePos {
    Format1 { coverage: Coverage, value: ValueRecord },
    Format2 {
        coverage: Coverage,
        values: Vec<ValueRecord>,
    },
}

impl SinglePos {
    pub fn apply(&self, glyph: u16) -> Option<Adjust> {
        match self {
            SinglePos::Format1 { coverage, value } => {
                coverage.coverage_value(glyph)?;
                *value
            }
            SinglePos::Format2 { coverage, values } => {
                let index = coverage.coverage_value(glyph)?;
                values.get(usize::from(index)).copied().flatten()
            }
        }
    }
}

fn read_single_pos(scope: ReadScope<'_>) -> Result<SinglePos, ParseError> {
    let mut ctxt = scope.ctxt();
    match ctxt.read_u16()? {
        1 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let value_format = ValueFormat(ctxt.read_u16()?);
            let value = value_format.read_value(&mut ctxt)?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            Ok(SinglePos::Format1 { coverage, value })
        }
        2 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let value_format = ValueFormat(ctxt.read_u16()?);
            let count = usize::from(ctxt.read_u16()?);
            let mut values = Vec::with_capacity(count.min(ctxt.bytes_available() / 2 + 1));
            for _ in 0..count {
                values.push(value_format.read_value(&mut ctxt)?);
            }
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            Ok(SinglePos::Format2 { coverage, values })
        }
        _ => Err(ParseError::BadVersion),
    }
}

pub struct PairValueRecord {
    pub second_glyph: u16,
    pub value1: ValueRecord,
    pub value2: ValueRecord,
}

pub enum PairPos {
    Format1 {
        coverage: Coverage,
        pair_sets: Vec<Vec<PairValueRecord>>,
    },
    Format2 {
        coverage: Coverage,
        class1: ClassDef,
        class2: ClassDef,
        class2_count: u16,
        values: Vec<(ValueRecord, ValueRecord)>,
    },
}

impl PairPos {
    /// Adjustments for the pair `(glyph1, glyph2)`, if kerned.
    pub fn apply(&self, glyph1: u16, glyph2: u16) -> Option<(ValueRecord, ValueRecord)> {
        match self {
            PairPos::Format1 {
                coverage,
                pair_sets,
            } => {
                let index = coverage.coverage_value(glyph1)?;
                let set = pair_sets.get(usize::from(index))?;
                set.iter()
                    .find(|record| record.second_glyph == glyph2)
                    .map(|record| (record.value1, record.value2))
            }
            PairPos::Format2 {
                coverage,
                class1,
                class2,
                class2_count,
                values,
            } => {
                coverage.coverage_value(glyph1)?;
                let c1 = class1.glyph_class_value(glyph1);
                let c2 = class2.glyph_class_value(glyph2);
                let index = usize::from(c1) * usize::from(*class2_count) + usize::from(c2);
                values.get(index).copied()
            }
        }
    }
}

fn read_pair_pos(scope: ReadScope<'_>) -> Result<PairPos, ParseError> {
    let mut ctxt = scope.ctxt();
    match ctxt.read_u16()? {
        1 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let value_format1 = ValueFormat(ctxt.read_u16()?);
            let value_format2 = ValueFormat(ctxt.read_u16()?);
            let pair_set_offsets = ctxt.read_counted_u16s()?;
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let mut pair_sets = Vec::with_capacity(pair_set_offsets.len());
            for set_offset in pair_set_offsets {
                let set_scope = scope.offset(usize::from(set_offset))?;
                let mut set_ctxt = set_scope.ctxt();
                let count = usize::from(set_ctxt.read_u16()?);
                let mut records = Vec::with_capacity(count.min(set_ctxt.bytes_available() / 2));
                for _ in 0..count {
                    let second_glyph = set_ctxt.read_u16()?;
                    let value1 = value_format1.read_value(&mut set_ctxt)?;
                    let value2 = value_format2.read_value(&mut set_ctxt)?;
                    records.push(PairValueRecord {
                        second_glyph,
                        value1,
                        value2,
                    });
                }
                pair_sets.push(records);
            }
            Ok(PairPos::Format1 {
                coverage,
                pair_sets,
            })
        }
        2 => {
            let coverage_offset = usize::from(ctxt.read_u16()?);
            let value_format1 = ValueFormat(ctxt.read_u16()?);
            let value_format2 = ValueFormat(ctxt.read_u16()?);
            let class1_offset = usize::from(ctxt.read_u16()?);
            let class2_offset = usize::from(ctxt.read_u16()?);
            let class1_count = usize::from(ctxt.read_u16()?);
            let class2_count = ctxt.read_u16()?;
            let total = class1_count
                .checked_mul(usize::from(class2_count))
                .ok_or(ParseError::LimitExceeded)?;
            if total > ctxt.bytes_available() {
                return Err(ParseError::BadEof);
            }
            let mut values = Vec::with_capacity(total);
            for _ in 0..total {
                let value1 = value_format1.read_value(&mut ctxt)?;
                let value2 = value_format2.read_value(&mut ctxt)?;
                values.push((value1, value2));
            }
            let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
            let class1 = ClassDef::read(scope.offset(class1_offset)?)?;
            let class2 = ClassDef::read(scope.offset(class2_offset)?)?;
            Ok(PairPos::Format2 {
                coverage,
                class1,
                class2,
                class2_count,
                values,
            })
        }
        _ => Err(ParseError::BadVersion),
    }
}

pub struct CursivePos {
    pub coverage: Coverage,
    /// Entry and exit anchors per covered glyph.
    pub entry_exits: Vec<(Option<Anchor>, Option<Anchor>)>,
}

impl CursivePos {
    /// The exit anchor of `glyph1` and entry anchor of `glyph2`, when both
    /// glyphs participate in cursive connection.
    pub fn apply(&self, glyph1: u16, glyph2: u16) -> Option<(Anchor, Anchor)> {
        let index1 = self.coverage.coverage_value(glyph1)?;
        let index2 = self.coverage.coverage_value(glyph2)?;
        let exit = self.entry_exits.get(usize::from(index1))?.1?;
        let entry = self.entry_exits.get(usize::from(index2))?.0?;
        Some((exit, entry))
    }
}

fn read_cursive_pos(scope: ReadScope<'_>) -> Result<CursivePos, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let coverage_offset = usize::from(ctxt.read_u16()?);
    let count = usize::from(ctxt.read_u16()?);
    if count > ctxt.bytes_available() / 4 {
        return Err(ParseError::BadEof);
    }
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = ctxt.read_u16()?;
        let exit = ctxt.read_u16()?;
        offsets.push((entry, exit));
    }
    let coverage = Coverage::read(scope.offset(coverage_offset)?)?;
    let mut entry_exits = Vec::with_capacity(offsets.len());
    for (entry_offset, exit_offset) in offsets {
        entry_exits.push((
            read_optional_anchor(scope, entry_offset)?,
            read_optional_anchor(scope, exit_offset)?,
        ));
    }
    Ok(CursivePos {
        coverage,
        entry_exits,
    })
}

/// Mark class and anchor per covered mark glyph.
pub type MarkArray = Vec<(u16, Anchor)>;

fn read_mark_array(scope: ReadScope<'_>) -> Result<MarkArray, ParseError> {
    let mut ctxt = scope.ctxt();
    let count = usize::from(ctxt.read_u16()?);
    if count > ctxt.bytes_available() / 4 {
        return Err(ParseError::BadEof);
    }
    let mut headers = Vec::with_capacity(count);
    for _ in 0..count {
        let class = ctxt.read_u16()?;
        let anchor_offset = ctxt.read_u16()?;
        headers.push((class, anchor_offset));
    }
    let mut marks = Vec::with_capacity(headers.len());
    for (class, anchor_offset) in headers {
        let anchor = Anchor::read(scope.offset(usize::from(anchor_offset))?)?;
        marks.push((class, anchor));
    }
    Ok(marks)
}

/// Mark-to-base attachment; also used for mark-to-mark, where the "base"
/// coverage lists the attachment-target marks.
pub struct MarkBasePos {
    pub mark_coverage: Coverage,
    pub base_coverage: Coverage,
    pub class_count: u16,
    pub marks: MarkArray,
    /// `[base][class]` anchor matrix.
    pub bases: Vec<Vec<Option<Anchor>>>,
}

impl MarkBasePos {
    /// Anchors for attaching `mark_glyph` to `base_glyph`:
    /// `(base_anchor, mark_anchor)`.
    pub fn apply(&self, base_glyph: u16, mark_glyph: u16) -> Option<(Anchor, Anchor)> {
        let mark_index = self.mark_coverage.coverage_value(mark_glyph)?;
        let base_index = self.base_coverage.coverage_value(base_glyph)?;
        let &(class, mark_anchor) = self.marks.get(usize::from(mark_index))?;
        let base_anchor = (*self
            .bases
            .get(usize::from(base_index))?
            .get(usize::from(class))?)?;
        Some((base_anchor, mark_anchor))
    }
}

fn read_mark_base_pos(scope: ReadScope<'_>) -> Result<MarkBasePos, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let mark_coverage_offset = usize::from(ctxt.read_u16()?);
    let base_coverage_offset = usize::from(ctxt.read_u16()?);
    let class_count = ctxt.read_u16()?;
    let mark_array_offset = usize::from(ctxt.read_u16()?);
    let base_array_offset = usize::from(ctxt.read_u16()?);

    let mark_coverage = Coverage::read(scope.offset(mark_coverage_offset)?)?;
    let base_coverage = Coverage::read(scope.offset(base_coverage_offset)?)?;
    let marks = read_mark_array(scope.offset(mark_array_offset)?)?;

    let base_scope = scope.offset(base_array_offset)?;
    let mut base_ctxt = base_scope.ctxt();
    let base_count = usize::from(base_ctxt.read_u16()?);
    if base_count * usize::from(class_count) > base_ctxt.bytes_available() / 2 {
        return Err(ParseError::BadEof);
    }
    let mut bases = Vec::with_capacity(base_count);
    for _ in 0..base_count {
        let mut row = Vec::with_capacity(usize::from(class_count));
        for _ in 0..class_count {
            let offset = base_ctxt.read_u16()?;
            row.push(read_optional_anchor(base_scope, offset)?);
        }
        bases.push(row);
    }

    Ok(MarkBasePos {
        mark_coverage,
        base_coverage,
        class_count,
        marks,
        bases,
    })
}

/// Mark-to-ligature attachment.
pub struct MarkLigPos {
    pub mark_coverage: Coverage,
    pub ligature_coverage: Coverage,
    pub class_count: u16,
    pub marks: MarkArray,
    /// `[ligature][component][class]` anchor matrix.
    pub ligatures: Vec<Vec<Vec<Option<Anchor>>>>,
}

impl MarkLigPos {
    pub fn apply(
        &self,
        lig_glyph: u16,
        mark_glyph: u16,
        lig_component: usize,
    ) -> Option<(Anchor, Anchor)> {
        let mark_index = self.mark_coverage.coverage_value(mark_glyph)?;
        let lig_index = self.ligature_coverage.coverage_value(lig_glyph)?;
        let &(class, mark_anchor) = self.marks.get(usize::from(mark_index))?;
        let components = self.ligatures.get(usize::from(lig_index))?;
        // Marks attached past the last component stick to the last one.
        let component = components
            .get(lig_component)
            .or_else(|| components.last())?;
        let lig_anchor = (*component.get(usize::from(class))?)?;
        Some((lig_anchor, mark_anchor))
    }
}

fn read_mark_lig_pos(scope: ReadScope<'_>) -> Result<MarkLigPos, ParseError> {
    let mut ctxt = scope.ctxt();
    let format = ctxt.read_u16()?;
    if format != 1 {
        return Err(ParseError::BadVersion);
    }
    let mark_coverage_offset = usize::from(ctxt.read_u16()?);
    let lig_coverage_offset = usize::from(ctxt.read_u16()?);
    let class_count = ctxt.read_u16()?;
    let mark_array_offset = usize::from(ctxt.read_u16()?);
    let lig_array_offset = usize::from(ctxt.read_u16()?);

    let mark_coverage = Coverage::read(scope.offset(mark_coverage_offset)?)?;
    let ligature_coverage = Coverage::read(scope.offset(lig_coverage_offset)?)?;
    let marks = read_mark_array(scope.offset(mark_array_offset)?)?;

    let lig_array_scope = scope.offset(lig_array_offset)?;
    let mut lig_array_ctxt = lig_array_scope.ctxt();
    let attach_offsets = lig_array_ctxt.read_counted_u16s()?;
    let mut ligatures = Vec::with_capacity(attach_offsets.len());
    for attach_offset in attach_offsets {
        let attach_scope = lig_array_scope.offset(usize::from(attach_offset))?;
        let mut attach_ctxt = attach_scope.ctxt();
        let component_count = usize::from(attach_ctxt.read_u16()?);
        if component_count * usize::from(class_count) > attach_ctxt.bytes_available() / 2 {
            return Err(ParseError::BadEof);
        }
        let mut components = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let mut row = Vec::with_capacity(usize::from(class_count));
            for _ in 0..class_count {
                let offset = attach_ctxt.read_u16()?;
                row.push(read_optional_anchor(attach_scope, offset)?);
            }
            components.push(row);
        }
        ligatures.push(components);
    }

    Ok(MarkLigPos {
        mark_coverage,
        ligature_coverage,
        class_count,
        marks,
        ligatures,
    })
}

// GDEF.

/// The parts of GDEF the shaper consumes: glyph classes, mark attachment
/// classes, and mark filtering sets.
pub struct GDEFTable {
    pub glyph_class_def: Option<ClassDef>,
    pub mark_attach_class_def: Option<ClassDef>,
    pub mark_glyph_sets: Vec<Coverage>,
}

impl GDEFTable {
    pub fn read(data: &[u8]) -> Result<GDEFTable, ParseError> {
        let scope = ReadScope::new(data);
        let mut ctxt = scope.ctxt();
        let major_version = ctxt.read_u16()?;
        let minor_version = ctxt.read_u16()?;
        if major_version != 1 {
            return Err(ParseError::BadVersion);
        }
        let glyph_class_def_offset = usize::from(ctxt.read_u16()?);
        let _attach_list_offset = ctxt.read_u16()?;
        let _lig_caret_list_offset = ctxt.read_u16()?;
        let mark_attach_class_def_offset = usize::from(ctxt.read_u16()?);
        let mark_glyph_sets_offset = if minor_version >= 2 {
            usize::from(ctxt.read_u16()?)
        } else {
            0
        };

        let glyph_class_def = if glyph_class_def_offset != 0 {
            Some(ClassDef::read(scope.offset(glyph_class_def_offset)?)?)
        } else {
            None
        };
        let mark_attach_class_def = if mark_attach_class_def_offset != 0 {
            Some(ClassDef::read(scope.offset(mark_attach_class_def_offset)?)?)
        } else {
            None
        };
        let mut mark_glyph_sets = Vec::new();
        if mark_glyph_sets_offset != 0 {
            let sets_scope = scope.offset(mark_glyph_sets_offset)?;
            let mut sets_ctxt = sets_scope.ctxt();
            let format = sets_ctxt.read_u16()?;
            if format == 1 {
                let count = usize::from(sets_ctxt.read_u16()?);
                let offsets = sets_ctxt.read_u32s(count)?;
                for offset in offsets {
                    mark_glyph_sets.push(Coverage::read(sets_scope.offset(offset as usize)?)?);
                }
            }
        }

        Ok(GDEFTable {
            glyph_class_def,
            mark_attach_class_def,
            mark_glyph_sets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_format1() {
        // format 1, 3 glyphs: 2, 5, 9
        let data = [0, 1, 0, 3, 0, 2, 0, 5, 0, 9];
        let coverage = Coverage::read(ReadScope::new(&data)).unwrap();
        assert_eq!(coverage.coverage_value(2), Some(0));
        assert_eq!(coverage.coverage_value(5), Some(1));
        assert_eq!(coverage.coverage_value(9), Some(2));
        assert_eq!(coverage.coverage_value(3), None);
    }

    #[test]
    fn test_coverage_format2() {
        // format 2, range 10..=12 starting at coverage index 4
        let data = [0, 2, 0, 1, 0, 10, 0, 12, 0, 4];
        let coverage = Coverage::read(ReadScope::new(&data)).unwrap();
        assert_eq!(coverage.coverage_value(10), Some(4));
        assert_eq!(coverage.coverage_value(12), Some(6));
        assert_eq!(coverage.coverage_value(13), None);
    }

    #[test]
    fn test_class_def_format2() {
        let data = [0, 2, 0, 1, 0, 20, 0, 29, 0, 3];
        let class_def = ClassDef::read(ReadScope::new(&data)).unwrap();
        assert_eq!(class_def.glyph_class_value(25), 3);
        assert_eq!(class_def.glyph_class_value(30), 0);
    }

    #[test]
    fn test_single_subst_format1() {
        // delta +3 applied to glyphs 4 and 7
        let data = [
            0, 1, // format
            0, 6, // coverage offset
            0, 3, // delta
            0, 1, 0, 2, 0, 4, 0, 7, // coverage: format 1, 2 glyphs
        ];
        let subst = read_single_subst(ReadScope::new(&data)).unwrap();
        assert_eq!(subst.apply_glyph(4), Some(7));
        assert_eq!(subst.apply_glyph(7), Some(10));
        assert_eq!(subst.apply_glyph(5), None);
    }

    #[test]
    fn test_malformed_coverage_is_error() {
        let data = [0, 9, 0, 0];
        assert!(Coverage::read(ReadScope::new(&data)).is_err());
    }
}
