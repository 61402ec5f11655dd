//! The shape plan: everything shaping needs that depends only on the face,
//! the segment properties, and the user features.
//!
//! A [ShapePlan] is compiled once per (face, properties, features) triple
//! and is immutable afterwards, so it can be cached and shared between
//! threads. It owns the parsed layout tables, the compiled feature map, the
//! selected complex shaper with its private data, and the flags that decide
//! which positioning machinery runs.

use crate::aat::{AatMap, KerxTable, MorxTable, TrakTable};
use crate::complex::{self, ComplexShaper, ZeroWidthMarks};
use crate::gsub;
use crate::kern::KernTable;
use crate::layout::{GDEFTable, LayoutTable, GPOS, GSUB};
use crate::ot_map::{FeatureFlags, Map, MapBuilder, TableIndex};
use crate::segment::{Direction, Feature, SegmentProperties};
use crate::tag;

/// Plan data private to the selected complex shaper.
pub(crate) enum ShaperData {
    Arabic(complex::arabic::ArabicShapePlan),
    Hangul(complex::hangul::HangulShapePlan),
    Indic(complex::indic::IndicShapePlan),
    Khmer(complex::khmer::KhmerShapePlan),
    Myanmar(complex::myanmar::MyanmarShapePlan),
    Use(complex::use_::UseShapePlan),
}

/// The parsed font tables the shaper consumes. Malformed tables are
/// dropped with a warning; shaping proceeds without them.
pub(crate) struct Tables {
    pub gsub: Option<LayoutTable<GSUB>>,
    pub gpos: Option<LayoutTable<GPOS>>,
    pub gdef: Option<GDEFTable>,
    pub kern: Option<KernTable>,
    pub morx: Option<MorxTable>,
    pub kerx: Option<KerxTable>,
    pub trak: Option<TrakTable>,
}

fn parse_table<T>(
    face: &dyn crate::face::Face,
    table_tag: u32,
    read: impl FnOnce(&[u8]) -> Result<T, crate::error::ParseError>,
) -> Option<T> {
    let data = face.table(table_tag)?;
    match read(data) {
        Ok(table) => Some(table),
        Err(err) => {
            log::warn!(
                "malformed '{}' table ({}); ignoring it",
                crate::tag::DisplayTag(table_tag),
                err
            );
            None
        }
    }
}

impl Tables {
    fn parse(face: &dyn crate::face::Face) -> Tables {
        Tables {
            gsub: parse_table(face, tag::GSUB, LayoutTable::<GSUB>::read),
            gpos: parse_table(face, tag::GPOS, LayoutTable::<GPOS>::read),
            gdef: parse_table(face, tag::GDEF, GDEFTable::read),
            kern: parse_table(face, tag::KERN, KernTable::read),
            morx: parse_table(face, tag::MORX, MorxTable::read),
            kerx: parse_table(face, tag::KERX, KerxTable::read),
            trak: parse_table(face, tag::TRAK, TrakTable::read),
        }
    }
}

/// Transient state while a plan is being compiled. Complex shapers see this
/// in their `collect_features`/`override_features` hooks.
pub struct ShapePlanner<'a> {
    pub(crate) props: SegmentProperties,
    pub(crate) ot_map: MapBuilder<'a>,
    pub(crate) apply_morx: bool,
    pub(crate) script_zero_marks: bool,
    pub(crate) script_fallback_mark_positioning: bool,
    pub(crate) shaper: &'static ComplexShaper,
}

/// A compiled, immutable shape plan.
pub struct ShapePlan {
    pub(crate) props: SegmentProperties,
    pub(crate) shaper: &'static ComplexShaper,
    pub(crate) ot_map: Map,
    pub(crate) aat_map: AatMap,
    pub(crate) tables: Tables,
    pub(crate) data: Option<ShaperData>,
    pub(crate) user_features: Vec<Feature>,

    pub(crate) frac_mask: u32,
    pub(crate) numr_mask: u32,
    pub(crate) dnom_mask: u32,
    pub(crate) rtlm_mask: u32,
    pub(crate) kern_mask: u32,

    pub(crate) requested_kerning: bool,
    pub(crate) has_frac: bool,
    pub(crate) has_vert: bool,
    pub(crate) has_gpos_mark: bool,
    pub(crate) zero_marks: bool,
    pub(crate) fallback_glyph_classes: bool,
    pub(crate) fallback_mark_positioning: bool,
    pub(crate) adjust_mark_positioning_when_zeroing: bool,
    pub(crate) apply_gpos: bool,
    pub(crate) apply_kern: bool,
    pub(crate) apply_kerx: bool,
    pub(crate) apply_morx: bool,
    pub(crate) apply_trak: bool,
}

impl ShapePlan {
    /// Compile a plan for shaping `props` text with `face`.
    pub fn new(
        face: &dyn crate::face::Face,
        props: &SegmentProperties,
        user_features: &[Feature],
    ) -> ShapePlan {
        let tables = Tables::parse(face);

        let ot_map = MapBuilder::new(tables.gsub.as_ref(), tables.gpos.as_ref(), props);

        let mut shaper = complex::categorize(
            props.script,
            props.direction,
            ot_map.chosen_script(TableIndex::Gsub),
        );

        // AAT shaping replaces GSUB when the font carries morx and either
        // shapes horizontally or has no GSUB to prefer.
        let apply_morx =
            tables.morx.is_some() && (props.direction.is_horizontal() || tables.gsub.is_none());
        if apply_morx && !std::ptr::eq(shaper, &complex::DEFAULT_SHAPER) {
            shaper = &complex::DUMBER_SHAPER;
        }

        let mut planner = ShapePlanner {
            props: props.clone(),
            ot_map,
            apply_morx,
            script_zero_marks: shaper.zero_width_marks != ZeroWidthMarks::None,
            script_fallback_mark_positioning: shaper.fallback_position,
            shaper,
        };

        planner.collect_features(user_features);

        // Compiling the feature map consumes the builder and with it the
        // borrows of the tables, which can then move into the plan.
        let ShapePlanner {
            props,
            ot_map,
            apply_morx,
            script_zero_marks,
            script_fallback_mark_positioning,
            shaper,
        } = planner;
        let ot_map = ot_map.compile();

        compile(
            props,
            shaper,
            ot_map,
            tables,
            user_features,
            apply_morx,
            script_zero_marks,
            script_fallback_mark_positioning,
        )
    }

    /// Whether applying `feature_tag`'s GSUB lookups to the glyph sequence
    /// would change it.
    pub(crate) fn would_substitute(&self, feature_tag: u32, glyphs: &[u16]) -> bool {
        let Some(gsub_table) = self.tables.gsub.as_ref() else {
            return false;
        };
        let Some(feature_index) = self.ot_map.get_feature_index(TableIndex::Gsub, feature_tag)
        else {
            return false;
        };
        let Some(record) = gsub_table.features.get(usize::from(feature_index)) else {
            return false;
        };
        gsub::would_substitute(gsub_table, &record.lookup_indices, glyphs)
    }
}

const COMMON_FEATURES: &[(u32, FeatureFlags)] = &[
    (tag::ABVM, FeatureFlags::GLOBAL),
    (tag::BLWM, FeatureFlags::GLOBAL),
    (tag::CCMP, FeatureFlags::GLOBAL),
    (tag::LOCL, FeatureFlags::GLOBAL),
    (tag::MARK, FeatureFlags::GLOBAL_MANUAL_JOINERS),
    (tag::MKMK, FeatureFlags::GLOBAL_MANUAL_JOINERS),
    (tag::RLIG, FeatureFlags::GLOBAL),
];

const HORIZONTAL_FEATURES: &[(u32, FeatureFlags)] = &[
    (tag::CALT, FeatureFlags::GLOBAL),
    (tag::CLIG, FeatureFlags::GLOBAL),
    (tag::CURS, FeatureFlags::GLOBAL),
    (tag::DIST, FeatureFlags::GLOBAL),
    (tag::KERN, FeatureFlags::GLOBAL_HAS_FALLBACK),
    (tag::LIGA, FeatureFlags::GLOBAL),
    (tag::RCLT, FeatureFlags::GLOBAL),
];

impl<'a> ShapePlanner<'a> {
    fn collect_features(&mut self, user_features: &[Feature]) {
        let empty = FeatureFlags::empty();

        self.ot_map.enable_feature(tag::RVRN, empty, 1);
        self.ot_map.add_gsub_pause(None);

        match self.props.direction {
            Direction::LeftToRight => {
                self.ot_map.enable_feature(tag::LTRA, empty, 1);
                self.ot_map.enable_feature(tag::LTRM, empty, 1);
            }
            Direction::RightToLeft => {
                self.ot_map.enable_feature(tag::RTLA, empty, 1);
                self.ot_map.add_feature(tag::RTLM, empty, 1);
            }
            _ => {}
        }

        // Automatic fractions; masked over ranges around U+2044 later.
        self.ot_map.add_feature(tag::FRAC, empty, 1);
        self.ot_map.add_feature(tag::NUMR, empty, 1);
        self.ot_map.add_feature(tag::DNOM, empty, 1);

        // A dummy trak feature so users can toggle the AAT table.
        self.ot_map
            .enable_feature(tag::TRAK, FeatureFlags::HAS_FALLBACK, 1);

        if let Some(func) = self.shaper.collect_features {
            func(self);
        }

        for &(feature_tag, flags) in COMMON_FEATURES {
            self.ot_map.add_feature(feature_tag, flags, 1);
        }

        if self.props.direction.is_horizontal() {
            for &(feature_tag, flags) in HORIZONTAL_FEATURES {
                self.ot_map.add_feature(feature_tag, flags, 1);
            }
        } else {
            // Vertical text wants `vert` and nothing else horizontal.
            self.ot_map.enable_feature(tag::VERT, empty, 1);
        }

        for feature in user_features {
            let flags = if feature.is_global() {
                FeatureFlags::GLOBAL
            } else {
                empty
            };
            self.ot_map.add_feature(feature.tag, flags, feature.value);
        }

        if let Some(func) = self.shaper.override_features {
            func(self);
        }
    }

}

#[allow(clippy::too_many_arguments)]
fn compile(
    props: SegmentProperties,
    shaper: &'static ComplexShaper,
    ot_map: Map,
    tables: Tables,
    user_features: &[Feature],
    apply_morx: bool,
    script_zero_marks: bool,
    script_fallback_mark_positioning: bool,
) -> ShapePlan {
    let frac_mask = ot_map.get_1_mask(tag::FRAC);
    let numr_mask = ot_map.get_1_mask(tag::NUMR);
    let dnom_mask = ot_map.get_1_mask(tag::DNOM);
    let has_frac = frac_mask != 0 || (numr_mask != 0 && dnom_mask != 0);

    let rtlm_mask = ot_map.get_1_mask(tag::RTLM);
    let has_vert = ot_map.get_1_mask(tag::VERT) != 0;

    let horizontal = props.direction.is_horizontal();
    let kern_tag = if horizontal { tag::KERN } else { tag::VKRN };
    let (kern_mask, _) = ot_map.get_mask(kern_tag);
    let requested_kerning = kern_mask != 0;
    let (trak_mask, _) = ot_map.get_mask(tag::TRAK);
    let requested_tracking = trak_mask != 0;

    let has_gpos_kern = ot_map.get_feature_index(TableIndex::Gpos, kern_tag).is_some();
    let disable_gpos = shaper.gpos_tag.is_some()
        && shaper.gpos_tag != ot_map.chosen_script(TableIndex::Gpos);

    // Who provides glyph classes: GDEF or Unicode.
    let fallback_glyph_classes = tables
        .gdef
        .as_ref()
        .map_or(true, |gdef| gdef.glyph_class_def.is_none());

    // Who does positioning: GPOS, kerx, kern, or nobody.
    let has_kerx = tables.kerx.is_some();
    let has_gsub = tables.gsub.is_some();
    let has_gpos = !disable_gpos && tables.gpos.is_some();

    let mut apply_gpos = false;
    let mut apply_kerx = false;
    let mut apply_kern = false;

    // Prefer GPOS over kerx when GSUB is also present.
    if has_kerx && !(has_gsub && has_gpos) {
        apply_kerx = true;
    } else if has_gpos {
        apply_gpos = true;
    }

    if !apply_kerx && (!has_gpos_kern || !apply_gpos) {
        if has_kerx {
            apply_kerx = true;
        } else if tables.kern.as_ref().map_or(false, |kern| kern.has_kerning()) {
            apply_kern = true;
        }
    }

    let has_machine_kerning = tables
        .kern
        .as_ref()
        .map_or(false, |kern| kern.has_state_machine());
    let has_cross_kerning = tables
        .kern
        .as_ref()
        .map_or(false, |kern| kern.has_cross_stream());

    let zero_marks =
        script_zero_marks && !apply_kerx && (!apply_kern || !has_machine_kerning);
    let has_gpos_mark = ot_map.get_1_mask(tag::MARK) != 0;

    let mut adjust_mark_positioning_when_zeroing =
        !apply_gpos && !apply_kerx && (!apply_kern || !has_cross_kerning);
    let fallback_mark_positioning =
        adjust_mark_positioning_when_zeroing && script_fallback_mark_positioning;

    // Color-font conventions on the AAT path assume mark positions are
    // left alone.
    if apply_morx {
        adjust_mark_positioning_when_zeroing = false;
    }

    let apply_trak = requested_tracking && tables.trak.is_some();

    let aat_map = match (&tables.morx, apply_morx) {
        (Some(morx), true) => AatMap::compile(morx, user_features),
        _ => AatMap::default(),
    };

    let mut plan = ShapePlan {
        props,
        shaper,
        ot_map,
        aat_map,
        tables,
        data: None,
        user_features: user_features.to_vec(),
        frac_mask,
        numr_mask,
        dnom_mask,
        rtlm_mask,
        kern_mask,
        requested_kerning,
        has_frac,
        has_vert,
        has_gpos_mark,
        zero_marks,
        fallback_glyph_classes,
        fallback_mark_positioning,
        adjust_mark_positioning_when_zeroing,
        apply_gpos,
        apply_kern,
        apply_kerx,
        apply_morx,
        apply_trak,
    };

    if let Some(func) = plan.shaper.create_data {
        plan.data = Some(func(&plan));
    }

    plan
}
