//! The feature map: resolving requested features against the font.
//!
//! A [MapBuilder] accumulates feature requests from the shaper and the user,
//! then [compile](MapBuilder::compile) resolves them against the font's GSUB
//! and GPOS feature lists, allocates mask bits, and produces the
//! stage-partitioned lookup lists that drive substitution and positioning.
//! Complex shapers insert pauses between stages to run their reordering
//! callbacks mid-substitution.

use rustc_hash::FxHashMap;

use crate::buffer::Buffer;
use crate::face::Face;
use crate::layout::{LangSys, LayoutTable, LayoutTableType, GPOS, GSUB};
use crate::plan::ShapePlan;
use crate::segment::{ot_script_tags, SegmentProperties};
use crate::tag;

/// Bit 0 of glyph masks is [crate::buffer::UNSAFE_TO_BREAK]; the global
/// feature bit comes right after it, and per-feature bits above that.
const GLOBAL_BIT_SHIFT: u32 = 1;
const GLOBAL_BIT_MASK: u32 = 1 << GLOBAL_BIT_SHIFT;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FeatureFlags: u32 {
        /// The feature applies to the whole buffer.
        const GLOBAL        = 0x0001;
        /// The shaper synthesizes this feature if the font lacks it.
        const HAS_FALLBACK  = 0x0002;
        /// Do not skip over ZWNJ when matching this feature's lookups.
        const MANUAL_ZWNJ   = 0x0004;
        /// Do not skip over ZWJ when matching this feature's lookups.
        const MANUAL_ZWJ    = 0x0008;
        /// Match only within one syllable, as tagged by the shaper.
        const PER_SYLLABLE  = 0x0010;
        const MANUAL_JOINERS        = Self::MANUAL_ZWNJ.bits() | Self::MANUAL_ZWJ.bits();
        const GLOBAL_MANUAL_JOINERS = Self::GLOBAL.bits() | Self::MANUAL_JOINERS.bits();
        const GLOBAL_HAS_FALLBACK   = Self::GLOBAL.bits() | Self::HAS_FALLBACK.bits();
    }
}

/// Which layout table a map entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableIndex {
    Gsub = 0,
    Gpos = 1,
}

impl TableIndex {
    pub const COUNT: usize = 2;

    pub fn iter() -> impl Iterator<Item = TableIndex> {
        [TableIndex::Gsub, TableIndex::Gpos].into_iter()
    }
}

/// A function run between substitution stages.
pub type PauseFunc = fn(&ShapePlan, &dyn Face, &mut Buffer);

struct FeatureInfo {
    tag: u32,
    /// Addition order; later additions win when merging duplicates.
    seq: usize,
    max_value: u32,
    flags: FeatureFlags,
    default_value: u32,
    stage: [usize; 2],
}

struct StageInfo {
    index: usize,
    pause_func: Option<PauseFunc>,
}

/// Builder for a [Map]. See the module docs.
pub struct MapBuilder<'a> {
    gsub: Option<&'a LayoutTable<GSUB>>,
    gpos: Option<&'a LayoutTable<GPOS>>,
    chosen_script: [Option<u32>; 2],
    found_script: [bool; 2],
    langsys: [Option<LangSys>; 2],
    feature_infos: Vec<FeatureInfo>,
    stages: [Vec<StageInfo>; 2],
    current_stage: [usize; 2],
}

/// A compiled feature in a [Map].
#[derive(Clone, Copy, Debug)]
pub struct FeatureMap {
    pub tag: u32,
    pub index: [Option<u16>; 2],
    pub stage: [usize; 2],
    pub shift: u32,
    pub mask: u32,
    /// Mask for value 1, the lowest bit of `mask`.
    pub one_mask: u32,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub per_syllable: bool,
    pub needs_fallback: bool,
}

/// A lookup scheduled for application, with the mask gating it.
#[derive(Clone, Copy, Debug)]
pub struct LookupMap {
    pub index: u16,
    pub mask: u32,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub per_syllable: bool,
}

/// One substitution/positioning stage: the lookups up to `last_lookup`
/// (exclusive, into the per-table lookup list) followed by an optional pause.
pub struct StageMap {
    pub last_lookup: usize,
    pub pause_func: Option<PauseFunc>,
}

/// The compiled feature map.
pub struct Map {
    global_mask: u32,
    features: Vec<FeatureMap>,
    feature_index: FxHashMap<u32, usize>,
    lookups: [Vec<LookupMap>; 2],
    stages: [Vec<StageMap>; 2],
    chosen_script: [Option<u32>; 2],
    found_script: [bool; 2],
}

impl<'a> MapBuilder<'a> {
    pub fn new(
        gsub: Option<&'a LayoutTable<GSUB>>,
        gpos: Option<&'a LayoutTable<GPOS>>,
        props: &SegmentProperties,
    ) -> MapBuilder<'a> {
        let script_tags = match props.script {
            Some(script) => ot_script_tags(script),
            None => &[tag::DFLT][..],
        };
        let lang_tag = props
            .language
            .as_ref()
            .and_then(|lang| ot_language_tag(lang.as_str()));

        let mut builder = MapBuilder {
            gsub,
            gpos,
            chosen_script: [None; 2],
            found_script: [false; 2],
            langsys: [None, None],
            feature_infos: Vec::new(),
            stages: [Vec::new(), Vec::new()],
            current_stage: [0, 0],
        };

        builder.select_script_gsub(script_tags, lang_tag);
        builder.select_script_gpos(script_tags, lang_tag);
        builder
    }

    fn select_script_gsub(&mut self, script_tags: &[u32], lang_tag: Option<u32>) {
        if let Some(table) = self.gsub {
            let (chosen, found, langsys) = select_script_in(table, script_tags, lang_tag);
            self.chosen_script[0] = chosen;
            self.found_script[0] = found;
            self.langsys[0] = langsys;
        }
    }

    fn select_script_gpos(&mut self, script_tags: &[u32], lang_tag: Option<u32>) {
        if let Some(table) = self.gpos {
            let (chosen, found, langsys) = select_script_in(table, script_tags, lang_tag);
            self.chosen_script[1] = chosen;
            self.found_script[1] = found;
            self.langsys[1] = langsys;
        }
    }

    pub fn chosen_script(&self, table_index: TableIndex) -> Option<u32> {
        self.chosen_script[table_index as usize]
    }

    pub fn add_feature(&mut self, tag: u32, flags: FeatureFlags, value: u32) {
        let seq = self.feature_infos.len();
        self.feature_infos.push(FeatureInfo {
            tag,
            seq,
            max_value: value,
            flags,
            default_value: if flags.contains(FeatureFlags::GLOBAL) {
                value
            } else {
                0
            },
            stage: self.current_stage,
        });
    }

    pub fn enable_feature(&mut self, tag: u32, flags: FeatureFlags, value: u32) {
        self.add_feature(tag, flags | FeatureFlags::GLOBAL, value);
    }

    pub fn disable_feature(&mut self, tag: u32) {
        self.add_feature(tag, FeatureFlags::GLOBAL, 0);
    }

    pub fn add_gsub_pause(&mut self, pause_func: Option<PauseFunc>) {
        self.add_pause(TableIndex::Gsub, pause_func);
    }

    fn add_pause(&mut self, table_index: TableIndex, pause_func: Option<PauseFunc>) {
        let t = table_index as usize;
        self.stages[t].push(StageInfo {
            index: self.current_stage[t],
            pause_func,
        });
        self.current_stage[t] += 1;
    }

    pub fn compile(mut self) -> Map {
        // Merge duplicate feature requests; the most recent global request
        // wins, non-global requests accumulate the largest value.
        self.feature_infos.sort_by_key(|info| (info.tag, info.seq));
        let mut merged: Vec<FeatureInfo> = Vec::with_capacity(self.feature_infos.len());
        for info in self.feature_infos.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.tag == info.tag => {
                    if info.flags.contains(FeatureFlags::GLOBAL) {
                        prev.flags |= FeatureFlags::GLOBAL;
                        prev.max_value = info.max_value;
                        prev.default_value = info.default_value;
                    } else {
                        prev.flags &= !FeatureFlags::GLOBAL;
                        prev.max_value = prev.max_value.max(info.max_value);
                    }
                    let inherited = FeatureFlags::HAS_FALLBACK
                        | FeatureFlags::MANUAL_JOINERS
                        | FeatureFlags::PER_SYLLABLE;
                    prev.flags |= info.flags & inherited;
                    prev.stage[0] = prev.stage[0].min(info.stage[0]);
                    prev.stage[1] = prev.stage[1].min(info.stage[1]);
                }
                _ => merged.push(info),
            }
        }

        let mut global_mask = GLOBAL_BIT_MASK;
        let mut next_bit = GLOBAL_BIT_SHIFT + 1;
        let mut features = Vec::with_capacity(merged.len());

        for info in &merged {
            let index = [
                self.feature_index_in::<GSUB>(info.tag),
                self.feature_index_in::<GPOS>(info.tag),
            ];
            let needs_fallback = info.flags.contains(FeatureFlags::HAS_FALLBACK);
            if index[0].is_none() && index[1].is_none() && !needs_fallback {
                continue;
            }
            if info.max_value == 0 {
                continue;
            }

            let global = info.flags.contains(FeatureFlags::GLOBAL);
            let (shift, mask) = if global && info.max_value == 1 {
                (GLOBAL_BIT_SHIFT, GLOBAL_BIT_MASK)
            } else {
                let bits_needed = 32 - info.max_value.leading_zeros();
                if next_bit + bits_needed >= 32 {
                    // Out of mask bits; feature is dropped.
                    continue;
                }
                let shift = next_bit;
                let mask = ((1u32 << bits_needed) - 1) << shift;
                next_bit += bits_needed;
                if global {
                    global_mask |= (info.default_value << shift) & mask;
                }
                (shift, mask)
            };

            features.push(FeatureMap {
                tag: info.tag,
                index,
                stage: info.stage,
                shift,
                mask,
                one_mask: (1 << shift) & mask,
                auto_zwnj: !info.flags.contains(FeatureFlags::MANUAL_ZWNJ),
                auto_zwj: !info.flags.contains(FeatureFlags::MANUAL_ZWJ),
                per_syllable: info.flags.contains(FeatureFlags::PER_SYLLABLE),
                needs_fallback: needs_fallback && index[0].is_none() && index[1].is_none(),
            });
        }

        let feature_index = features
            .iter()
            .enumerate()
            .map(|(i, feature)| (feature.tag, i))
            .collect();

        // Close the final stage of each table.
        for table in 0..2 {
            self.stages[table].push(StageInfo {
                index: self.current_stage[table],
                pause_func: None,
            });
        }

        let lookups_gsub = self.collect_lookups::<GSUB>(&features, TableIndex::Gsub);
        let lookups_gpos = self.collect_lookups::<GPOS>(&features, TableIndex::Gpos);

        Map {
            global_mask,
            features,
            feature_index,
            lookups: [lookups_gsub.0, lookups_gpos.0],
            stages: [lookups_gsub.1, lookups_gpos.1],
            chosen_script: self.chosen_script,
            found_script: self.found_script,
        }
    }

    fn feature_index_in<T: LayoutTableType>(&self, feature_tag: u32) -> Option<u16> {
        let (table_features, langsys) = self.table_features::<T>()?;
        let langsys = langsys.as_ref()?;
        langsys.feature_indices.iter().copied().find(|&index| {
            table_features
                .get(usize::from(index))
                .map_or(false, |record| record.tag == feature_tag)
        })
    }

    fn table_features<T: LayoutTableType>(
        &self,
    ) -> Option<(&[crate::layout::FeatureRecord], &Option<LangSys>)> {
        match T::TABLE_TAG {
            tag if tag == tag::GSUB => self
                .gsub
                .map(|table| (table.features.as_slice(), &self.langsys[0])),
            tag if tag == tag::GPOS => self
                .gpos
                .map(|table| (table.features.as_slice(), &self.langsys[1])),
            _ => None,
        }
    }

    fn lookup_indices_in<T: LayoutTableType>(&self, feature_index: u16) -> &'a [u16] {
        let records = match T::TABLE_TAG {
            tag if tag == tag::GSUB => self.gsub.map(|table| table.features.as_slice()),
            _ => self.gpos.map(|table| table.features.as_slice()),
        };
        records
            .and_then(|records| records.get(usize::from(feature_index)))
            .map(|record| record.lookup_indices.as_slice())
            .unwrap_or(&[])
    }

    fn collect_lookups<T: LayoutTableType>(
        &self,
        features: &[FeatureMap],
        table_index: TableIndex,
    ) -> (Vec<LookupMap>, Vec<StageMap>) {
        let t = table_index as usize;
        let mut lookups: Vec<LookupMap> = Vec::new();
        let mut stage_maps: Vec<StageMap> = Vec::new();

        let required_feature = self.langsys[t]
            .as_ref()
            .and_then(|langsys| langsys.required_feature);

        let n_stages = self.current_stage[t] + 1;
        for stage in 0..n_stages {
            if stage == 0 {
                if let Some(required) = required_feature {
                    for &lookup_index in self.lookup_indices_in::<T>(required) {
                        lookups.push(LookupMap {
                            index: lookup_index,
                            mask: GLOBAL_BIT_MASK,
                            auto_zwnj: true,
                            auto_zwj: true,
                            per_syllable: false,
                        });
                    }
                }
            }

            for feature in features {
                if feature.stage[t] != stage {
                    continue;
                }
                let Some(feature_index) = feature.index[t] else {
                    continue;
                };
                for &lookup_index in self.lookup_indices_in::<T>(feature_index) {
                    lookups.push(LookupMap {
                        index: lookup_index,
                        mask: feature.mask,
                        auto_zwnj: feature.auto_zwnj,
                        auto_zwj: feature.auto_zwj,
                        per_syllable: feature.per_syllable,
                    });
                }
            }

            // Sort and merge within the stage so each lookup runs once with
            // the union of its feature masks.
            let stage_start = stage_maps.last().map_or(0, |s| s.last_lookup);
            let stage_lookups = &mut lookups[stage_start..];
            stage_lookups.sort_by_key(|lookup| lookup.index);
            let mut merged: Vec<LookupMap> = Vec::with_capacity(stage_lookups.len());
            for lookup in stage_lookups.iter() {
                match merged.last_mut() {
                    Some(prev) if prev.index == lookup.index => {
                        prev.mask |= lookup.mask;
                        prev.auto_zwnj &= lookup.auto_zwnj;
                        prev.auto_zwj &= lookup.auto_zwj;
                        prev.per_syllable &= lookup.per_syllable;
                    }
                    _ => merged.push(*lookup),
                }
            }
            lookups.truncate(stage_start);
            lookups.extend(merged);

            let pause_func = self.stages[t]
                .iter()
                .find(|info| info.index == stage)
                .and_then(|info| info.pause_func);
            stage_maps.push(StageMap {
                last_lookup: lookups.len(),
                pause_func,
            });
        }

        (lookups, stage_maps)
    }
}

fn select_script_in<T: LayoutTableType>(
    table: &LayoutTable<T>,
    script_tags: &[u32],
    lang_tag: Option<u32>,
) -> (Option<u32>, bool, Option<LangSys>) {
    for &script_tag in script_tags {
        if let Some(script) = table.find_script(script_tag) {
            let langsys = script.find_langsys_or_default(lang_tag).cloned();
            return (Some(script_tag), true, langsys);
        }
    }
    for fallback in [tag::DFLT, tag::LATN] {
        if let Some(script) = table.find_script(fallback) {
            let langsys = script.find_langsys_or_default(lang_tag).cloned();
            return (Some(fallback), false, langsys);
        }
    }
    (None, false, None)
}

/// Best-effort mapping from a BCP 47 primary subtag to an OpenType language
/// system tag: the subtag uppercased and padded. Fonts using registry tags
/// that differ from this convention fall back to the default language
/// system.
fn ot_language_tag(language: &str) -> Option<u32> {
    let primary = language.split('-').next()?;
    if primary.is_empty() || primary.len() > 4 {
        return None;
    }
    let mut bytes = [b' '; 4];
    for (i, b) in primary.bytes().enumerate() {
        bytes[i] = b.to_ascii_uppercase();
    }
    Some(u32::from_be_bytes(bytes))
}

impl Map {
    pub fn global_mask(&self) -> u32 {
        self.global_mask
    }

    fn feature(&self, feature_tag: u32) -> Option<&FeatureMap> {
        self.feature_index
            .get(&feature_tag)
            .map(|&index| &self.features[index])
    }

    /// The mask and shift of a feature; zero if absent.
    pub fn get_mask(&self, feature_tag: u32) -> (u32, u32) {
        self.feature(feature_tag)
            .map_or((0, 0), |feature| (feature.mask, feature.shift))
    }

    /// The lowest mask bit of a feature; what a value of 1 sets.
    pub fn get_1_mask(&self, feature_tag: u32) -> u32 {
        self.feature(feature_tag)
            .map_or(0, |feature| feature.one_mask)
    }

    pub fn get_feature_index(
        &self,
        table_index: TableIndex,
        feature_tag: u32,
    ) -> Option<u16> {
        self.feature(feature_tag)
            .and_then(|feature| feature.index[table_index as usize])
    }

    pub fn feature_needs_fallback(&self, feature_tag: u32) -> bool {
        self.feature(feature_tag)
            .map_or(false, |feature| feature.needs_fallback)
    }

    pub fn chosen_script(&self, table_index: TableIndex) -> Option<u32> {
        self.chosen_script[table_index as usize]
    }

    pub fn found_script(&self, table_index: TableIndex) -> bool {
        self.found_script[table_index as usize]
    }

    pub fn stages(&self, table_index: TableIndex) -> &[StageMap] {
        &self.stages[table_index as usize]
    }

    pub fn lookups(&self, table_index: TableIndex) -> &[LookupMap] {
        &self.lookups[table_index as usize]
    }

    pub fn stage_lookups(&self, table_index: TableIndex, stage: usize) -> &[LookupMap] {
        let stages = self.stages(table_index);
        let start = if stage == 0 {
            0
        } else {
            stages[stage - 1].last_lookup
        };
        let end = stages[stage].last_lookup;
        &self.lookups(table_index)[start..end]
    }
}
