//! Utilities for performing contextual lookup matching in gpos and gsub.
//!
//! The [ApplyContext] carries the state of one lookup application: the
//! lookup's mask and flags, the GDEF classes used for skipping, and the
//! match positions of the current rule. Glyphs are skipped when their GDEF
//! class is filtered by the lookup flags, or when they are default-ignorable
//! joiners the lookup did not ask to see.

use crate::buffer::{Buffer, GlyphInfo, GlyphPropsFlags};
use crate::face::Face;
use crate::gdef;
use crate::layout::{
    GDEFTable, LayoutTable, LookupFlag, SequenceLookupRecord, GPOS, GSUB,
};
use crate::ot_map::TableIndex;
use crate::unicode::GeneralCategory;

pub(crate) const MAX_NESTING_LEVEL: usize = 6;
pub(crate) const MAX_CONTEXT_LENGTH: usize = 64;

/// A glyph-sequence predicate used during matching: does `info` match the
/// `value` at the current position of the pattern?
pub(crate) type MatchFn<'a> = dyn Fn(&GlyphInfo, u16) -> bool + 'a;

pub(crate) fn match_glyph(info: &GlyphInfo, value: u16) -> bool {
    info.codepoint == u32::from(value)
}

/// The lookup lists nested lookups recurse into.
#[derive(Clone, Copy)]
pub(crate) enum LookupsRef<'a> {
    Subst(&'a LayoutTable<GSUB>),
    Pos(&'a LayoutTable<GPOS>),
}

pub(crate) struct ApplyContext<'a, 'b> {
    pub table_index: TableIndex,
    pub face: &'a dyn Face,
    pub buffer: &'b mut Buffer,
    pub gdef: Option<&'a GDEFTable>,
    pub lookups: LookupsRef<'a>,
    pub lookup_mask: u32,
    pub lookup_props: u32,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub per_syllable: bool,
    pub nesting_level_left: usize,
    pub match_positions: [usize; MAX_CONTEXT_LENGTH],
}

#[derive(Clone, Copy, PartialEq)]
enum Skip {
    Yes,
    No,
    Maybe,
}

#[derive(Clone, Copy, PartialEq)]
enum MatchRes {
    Match,
    NotMatch,
    Skip,
}

/// Matching configuration derived from the active lookup.
struct Matcher {
    lookup_props: u32,
    mask: u32,
    ignore_zwnj: bool,
    ignore_zwj: bool,
    ignore_hidden: bool,
    per_syllable: bool,
    syllable: u8,
}

impl<'a, 'b> ApplyContext<'a, 'b> {
    pub fn new(
        table_index: TableIndex,
        face: &'a dyn Face,
        buffer: &'b mut Buffer,
        gdef: Option<&'a GDEFTable>,
        lookups: LookupsRef<'a>,
    ) -> Self {
        ApplyContext {
            table_index,
            face,
            buffer,
            gdef,
            lookups,
            lookup_mask: 1,
            lookup_props: 0,
            auto_zwnj: true,
            auto_zwj: true,
            per_syllable: false,
            nesting_level_left: MAX_NESTING_LEVEL,
            match_positions: [0; MAX_CONTEXT_LENGTH],
        }
    }

    pub fn set_lookup_props(&mut self, flag: LookupFlag, mark_filtering_set: Option<u16>) {
        self.lookup_props =
            u32::from(flag.0) | (u32::from(mark_filtering_set.unwrap_or(0)) << 16);
    }

    /// Whether `info` survives the lookup-flag class filtering.
    pub fn check_glyph_property(&self, info: &GlyphInfo, match_props: u32) -> bool {
        let glyph_props = info.glyph_props;

        let ignore_flags = LookupFlag::IGNORE_BASE_GLYPHS
            | LookupFlag::IGNORE_LIGATURES
            | LookupFlag::IGNORE_MARKS;
        if glyph_props & (match_props as u16) & ignore_flags != 0 {
            return false;
        }

        if glyph_props & GlyphPropsFlags::MARK.bits() != 0 {
            if match_props as u16 & LookupFlag::USE_MARK_FILTERING_SET != 0 {
                let set_index = (match_props >> 16) as u16;
                return gdef::is_mark_glyph(self.gdef, info.codepoint as u16, set_index);
            }
            if match_props as u16 & LookupFlag::MARK_ATTACHMENT_TYPE_MASK != 0 {
                return (match_props as u16 & LookupFlag::MARK_ATTACHMENT_TYPE_MASK)
                    == (glyph_props & LookupFlag::MARK_ATTACHMENT_TYPE_MASK);
            }
        }

        true
    }

    fn matcher(&self, context_match: bool) -> Matcher {
        Matcher {
            lookup_props: self.lookup_props,
            // ZWNJ is invisible to GPOS, and to GSUB context matching when
            // the feature asked for automatic joiner handling.
            ignore_zwnj: self.table_index == TableIndex::Gpos
                || (context_match && self.auto_zwnj),
            ignore_zwj: context_match || self.auto_zwj,
            ignore_hidden: self.table_index == TableIndex::Gpos,
            mask: if context_match {
                u32::MAX
            } else {
                self.lookup_mask
            },
            per_syllable: self.table_index == TableIndex::Gsub && self.per_syllable,
            syllable: if self.buffer.idx < self.buffer.len() {
                self.buffer.cur(0).syllable()
            } else {
                0
            },
        }
    }

    fn may_skip(&self, matcher: &Matcher, info: &GlyphInfo) -> Skip {
        if !self.check_glyph_property(info, matcher.lookup_props) {
            return Skip::Yes;
        }

        if info.is_default_ignorable()
            && (matcher.ignore_zwnj || !info.is_zwnj())
            && (matcher.ignore_zwj || !info.is_zwj())
            && (matcher.ignore_hidden || !info.is_hidden())
        {
            return Skip::Maybe;
        }

        Skip::No
    }

    fn match_at(
        &self,
        matcher: &Matcher,
        info: &GlyphInfo,
        glyph_data: u16,
        match_fn: Option<&MatchFn<'_>>,
    ) -> MatchRes {
        let skip = self.may_skip(matcher, info);
        if skip == Skip::Yes {
            return MatchRes::Skip;
        }

        let matches = if (info.mask & matcher.mask) == 0
            || (matcher.per_syllable
                && matcher.syllable != 0
                && matcher.syllable != info.syllable())
        {
            Some(false)
        } else {
            match_fn.map(|f| f(info, glyph_data))
        };

        match matches {
            Some(true) => MatchRes::Match,
            None if skip == Skip::No => MatchRes::Match,
            Some(false) if skip == Skip::No => MatchRes::NotMatch,
            _ => MatchRes::Skip,
        }
    }

    fn backtrack_info(&self, i: usize) -> &GlyphInfo {
        if self.buffer.have_output {
            &self.buffer.out_info()[i]
        } else {
            &self.buffer.info[i]
        }
    }

    /// Match `input_rest` glyphs (beyond the one at the cursor) forward.
    /// On success returns the position one past the last matched glyph and
    /// the total ligature component count, and records the match positions.
    pub fn match_input(
        &mut self,
        input_rest: usize,
        match_fn: &MatchFn<'_>,
    ) -> Option<(usize, u8)> {
        let count = input_rest + 1;
        if count > MAX_CONTEXT_LENGTH {
            return None;
        }

        let matcher = self.matcher(false);
        let first = *self.buffer.cur(0);
        let first_lig_id = first.lig_id();
        let first_lig_comp = first.lig_comp();
        let mut total_component_count = first.lig_num_comps();

        self.match_positions[0] = self.buffer.idx;
        let mut idx = self.buffer.idx;

        for i in 1..count {
            loop {
                idx += 1;
                if idx >= self.buffer.len() {
                    return None;
                }
                match self.match_at(
                    &matcher,
                    &self.buffer.info[idx],
                    (i - 1) as u16,
                    Some(match_fn),
                ) {
                    MatchRes::Match => break,
                    MatchRes::NotMatch => return None,
                    MatchRes::Skip => continue,
                }
            }

            let this = &self.buffer.info[idx];
            let this_lig_id = this.lig_id();
            let this_lig_comp = this.lig_comp();

            if first_lig_id != 0 && first_lig_comp != 0 {
                // The first glyph sits inside an earlier ligature; the rest
                // of the match must belong to the same component or the
                // pieces straddle a ligature boundary.
                if this_lig_id != first_lig_id || this_lig_comp != first_lig_comp {
                    return None;
                }
            } else if this_lig_id != 0 && this_lig_comp != 0 && this_lig_id != first_lig_id {
                return None;
            }

            total_component_count += this.lig_num_comps();
            self.match_positions[i] = idx;
        }

        Some((idx + 1, total_component_count))
    }

    /// Match `count` glyphs backward from the cursor over already-emitted
    /// glyphs. Returns the match start on success.
    pub fn match_backtrack(&mut self, count: usize, match_fn: &MatchFn<'_>) -> Option<usize> {
        let matcher = self.matcher(true);
        let mut idx = self.buffer.backtrack_len();

        for i in 0..count {
            loop {
                if idx == 0 {
                    return None;
                }
                idx -= 1;
                match self.match_at(
                    &matcher,
                    self.backtrack_info(idx),
                    i as u16,
                    Some(match_fn),
                ) {
                    MatchRes::Match => break,
                    MatchRes::NotMatch => return None,
                    MatchRes::Skip => continue,
                }
            }
        }

        Some(idx)
    }

    /// Match `count` glyphs forward starting at `start_index` (one past the
    /// matched input). Returns one past the last matched glyph.
    pub fn match_lookahead(
        &mut self,
        count: usize,
        match_fn: &MatchFn<'_>,
        start_index: usize,
    ) -> Option<usize> {
        let matcher = self.matcher(true);
        let mut idx = start_index - 1;

        for i in 0..count {
            loop {
                idx += 1;
                if idx >= self.buffer.len() {
                    return None;
                }
                match self.match_at(
                    &matcher,
                    &self.buffer.info[idx],
                    i as u16,
                    Some(match_fn),
                ) {
                    MatchRes::Match => break,
                    MatchRes::NotMatch => return None,
                    MatchRes::Skip => continue,
                }
            }
        }

        Some(idx + 1)
    }

    /// Position of the next non-skipped glyph after the cursor, for pairwise
    /// positioning.
    pub fn next_glyph_pos(&self, from: usize) -> Option<usize> {
        let matcher = self.matcher(false);
        let mut idx = from;
        loop {
            idx += 1;
            if idx >= self.buffer.len() {
                return None;
            }
            match self.match_at(&matcher, &self.buffer.info[idx], 0, None) {
                MatchRes::Match => return Some(idx),
                MatchRes::NotMatch => return None,
                MatchRes::Skip => continue,
            }
        }
    }

    /// Position of the previous non-skipped glyph, for attachments.
    pub fn prev_glyph_pos(&self, from: usize) -> Option<usize> {
        let matcher = self.matcher(false);
        let mut idx = from;
        loop {
            if idx == 0 {
                return None;
            }
            idx -= 1;
            match self.match_at(&matcher, &self.buffer.info[idx], 0, None) {
                MatchRes::Match => return Some(idx),
                MatchRes::NotMatch => return None,
                MatchRes::Skip => continue,
            }
        }
    }

    // Glyph rewrites that keep the glyph-props classification current.

    fn set_glyph_class(&mut self, glyph: u16, class_guess: GlyphPropsFlags, ligature: bool, component: bool) {
        let has_glyph_classes = self
            .gdef
            .map_or(false, |gdef| gdef.glyph_class_def.is_some());
        let gdef = self.gdef;

        let cur = self.buffer.cur_mut(0);
        let mut props = cur.glyph_props;

        props |= GlyphPropsFlags::SUBSTITUTED.bits();
        if ligature {
            props |= GlyphPropsFlags::LIGATED.bits();
            // A ligature that is later expanded and re-ligated counts as a
            // plain ligature again.
            props &= !GlyphPropsFlags::MULTIPLIED.bits();
        }
        if component {
            props |= GlyphPropsFlags::MULTIPLIED.bits();
        }

        if has_glyph_classes {
            props &= GlyphPropsFlags::PRESERVE.bits();
            cur.glyph_props = props | gdef::glyph_props(gdef, glyph);
        } else if !class_guess.is_empty() {
            props &= GlyphPropsFlags::PRESERVE.bits();
            cur.glyph_props = props | class_guess.bits();
        } else {
            cur.glyph_props = props;
        }
    }

    pub fn replace_glyph(&mut self, glyph: u16) {
        self.set_glyph_class(glyph, GlyphPropsFlags::empty(), false, false);
        self.buffer.replace_glyph(u32::from(glyph));
    }

    pub fn replace_glyph_with_ligature(&mut self, glyph: u16, class_guess: GlyphPropsFlags) {
        self.set_glyph_class(glyph, class_guess, true, false);
        self.buffer.replace_glyph(u32::from(glyph));
    }

    pub fn output_glyph_for_component(&mut self, glyph: u16, class_guess: GlyphPropsFlags) {
        self.set_glyph_class(glyph, class_guess, false, true);
        self.buffer.output_glyph(u32::from(glyph));
    }

    /// Form a ligature from the matched input. `count` and `match_end`
    /// include the first glyph; marks between components are carried along
    /// and reassigned to the new ligature's components.
    pub fn ligate_input(
        &mut self,
        count: usize,
        match_end: usize,
        total_component_count: u8,
        lig_glyph: u16,
    ) {
        let positions = self.match_positions;
        self.buffer.merge_clusters(self.buffer.idx, match_end);

        // A base with marks ligated onto it stays a base so following marks
        // can still attach; all-mark ligatures keep their ligature id.
        let mut is_base_ligature = self.buffer.info[positions[0]].is_base_glyph();
        let mut is_mark_ligature = self.buffer.info[positions[0]].is_mark();
        for i in 1..count {
            if !self.buffer.info[positions[i]].is_mark() {
                is_base_ligature = false;
                is_mark_ligature = false;
            }
        }
        let is_ligature = !is_base_ligature && !is_mark_ligature;

        let class = if is_ligature {
            GlyphPropsFlags::LIGATURE
        } else {
            GlyphPropsFlags::empty()
        };
        let lig_id = if is_ligature {
            self.buffer.next_serial()
        } else {
            0
        };

        let first = self.buffer.cur_mut(0);
        let mut last_lig_id = first.lig_id();
        let mut last_num_comps = first.lig_num_comps();
        let mut comps_so_far = last_num_comps;

        if is_ligature {
            first.set_lig_props_for_ligature(lig_id, total_component_count);
            if first.general_category() == GeneralCategory::NonspacingMark {
                first.set_general_category(GeneralCategory::OtherLetter);
            }
        }

        self.replace_glyph_with_ligature(lig_glyph, class);

        for i in 1..count {
            while self.buffer.idx < positions[i] && self.buffer.successful {
                if is_ligature {
                    let cur = self.buffer.cur_mut(0);
                    let mut this_comp = cur.lig_comp();
                    if this_comp == 0 {
                        this_comp = last_num_comps;
                    }
                    let new_lig_comp =
                        comps_so_far - last_num_comps + this_comp.min(last_num_comps);
                    cur.set_lig_props_for_mark(lig_id, new_lig_comp);
                }
                self.buffer.next_glyph();
            }

            let cur = self.buffer.cur(0);
            last_lig_id = cur.lig_id();
            last_num_comps = cur.lig_num_comps();
            comps_so_far += last_num_comps;

            // Skip the matched component itself.
            self.buffer.skip_glyph();
        }

        // Marks after the last component still belong to the old ligature;
        // move them onto the new one.
        if !is_mark_ligature && last_lig_id != 0 {
            for i in self.buffer.idx..self.buffer.len() {
                let info = &mut self.buffer.info[i];
                if info.lig_id() != last_lig_id {
                    break;
                }
                let this_comp = info.lig_comp();
                if this_comp == 0 {
                    break;
                }
                let new_lig_comp = comps_so_far - last_num_comps + this_comp.min(last_num_comps);
                info.set_lig_props_for_mark(lig_id, new_lig_comp);
            }
        }
    }

    /// Apply the nested lookups of a matched context rule. `count` and
    /// `match_end` include the first glyph.
    pub fn apply_nested_lookups(
        &mut self,
        count: usize,
        match_end: usize,
        records: &[SequenceLookupRecord],
    ) {
        let mut count = count;

        // Positions are tracked as distances from the start of the output.
        let mut end: isize = {
            let backtrack_len = self.buffer.backtrack_len() as isize;
            let delta = backtrack_len - self.buffer.idx as isize;
            for j in 0..count {
                self.match_positions[j] = (self.match_positions[j] as isize + delta) as usize;
            }
            backtrack_len + match_end as isize - self.buffer.idx as isize
        };

        for record in records {
            if !self.buffer.successful {
                break;
            }
            let idx = usize::from(record.sequence_index);
            if idx >= count {
                continue;
            }

            let orig_len = self.buffer.backtrack_len() + self.buffer.lookahead_len();
            if self.match_positions[idx] >= orig_len {
                continue;
            }
            if !self.buffer.move_to(self.match_positions[idx]) {
                break;
            }

            if !self.recurse(record.lookup_index) {
                continue;
            }

            let new_len = self.buffer.backtrack_len() + self.buffer.lookahead_len();
            let mut delta = new_len as isize - orig_len as isize;
            if delta == 0 {
                continue;
            }

            // The recursed lookup changed the glyph count; shift the
            // remaining match positions to compensate.
            end += delta;
            if end < self.match_positions[idx] as isize {
                delta += self.match_positions[idx] as isize - end;
                end = self.match_positions[idx] as isize;
            }

            let mut next = idx + 1;
            if delta > 0 {
                if delta as usize + count > MAX_CONTEXT_LENGTH {
                    break;
                }
            } else {
                delta = delta.max(next as isize - count as isize);
                next = (next as isize - delta) as usize;
            }

            let shifted_next = (next as isize + delta) as usize;
            let new_count = (count as isize + delta) as usize;
            self.match_positions
                .copy_within(next..count, shifted_next);
            next = shifted_next;
            count = new_count;

            for j in idx + 1..next.min(count) {
                self.match_positions[j] = self.match_positions[j - 1] + 1;
            }
            let mut j = next;
            while j < count {
                self.match_positions[j] =
                    (self.match_positions[j] as isize + delta) as usize;
                j += 1;
            }
        }

        if end >= 0 {
            self.buffer.move_to(end as usize);
        }
    }

    /// Apply a single lookup by index at the current cursor position.
    fn recurse(&mut self, lookup_index: u16) -> bool {
        if self.nesting_level_left == 0 {
            return false;
        }
        self.nesting_level_left -= 1;

        let saved_props = self.lookup_props;
        let lookups = self.lookups;
        let applied = match lookups {
            LookupsRef::Subst(table) => {
                match table.lookups.get(usize::from(lookup_index)) {
                    Some(lookup) => {
                        self.set_lookup_props(lookup.flag, lookup.mark_filtering_set);
                        crate::gsub::apply_subst_at(self, &lookup.subtables)
                    }
                    None => false,
                }
            }
            LookupsRef::Pos(table) => match table.lookups.get(usize::from(lookup_index)) {
                Some(lookup) => {
                    self.set_lookup_props(lookup.flag, lookup.mark_filtering_set);
                    crate::gpos::apply_pos_at(self, &lookup.subtables)
                }
                None => false,
            },
        };

        self.lookup_props = saved_props;
        self.nesting_level_left += 1;
        applied
    }
}

/// Apply a contextual lookup at the current cursor position. First matching
/// rule wins; nested lookups run in declared order with index remapping.
pub(crate) fn apply_context_lookup(
    ctx: &mut ApplyContext<'_, '_>,
    lookup: &crate::layout::ContextLookup,
) -> bool {
    use crate::layout::ContextLookup;

    let glyph = ctx.buffer.cur(0).codepoint as u16;
    match lookup {
        ContextLookup::Format1 {
            coverage,
            rule_sets,
        } => {
            let Some(index) = coverage.coverage_value(glyph) else {
                return false;
            };
            let Some(Some(rules)) = rule_sets.get(usize::from(index)) else {
                return false;
            };
            for rule in rules {
                let input = rule.input.as_slice();
                let match_fn = |info: &GlyphInfo, i: u16| {
                    input
                        .get(usize::from(i))
                        .map_or(false, |&g| match_glyph(info, g))
                };
                if let Some((match_end, _)) = ctx.match_input(input.len(), &match_fn) {
                    ctx.buffer.unsafe_to_break(ctx.buffer.idx, match_end);
                    ctx.apply_nested_lookups(input.len() + 1, match_end, &rule.lookup_records);
                    return true;
                }
            }
            false
        }
        ContextLookup::Format2 {
            coverage,
            class_def,
            rule_sets,
        } => {
            if coverage.coverage_value(glyph).is_none() {
                return false;
            }
            let class = class_def.glyph_class_value(glyph);
            let Some(Some(rules)) = rule_sets.get(usize::from(class)) else {
                return false;
            };
            for rule in rules {
                let input = rule.input.as_slice();
                let match_fn = |info: &GlyphInfo, i: u16| {
                    input.get(usize::from(i)).map_or(false, |&c| {
                        class_def.glyph_class_value(info.codepoint as u16) == c
                    })
                };
                if let Some((match_end, _)) = ctx.match_input(input.len(), &match_fn) {
                    ctx.buffer.unsafe_to_break(ctx.buffer.idx, match_end);
                    ctx.apply_nested_lookups(input.len() + 1, match_end, &rule.lookup_records);
                    return true;
                }
            }
            false
        }
        ContextLookup::Format3 {
            coverages,
            lookup_records,
        } => {
            let Some(first) = coverages.first() else {
                return false;
            };
            if first.coverage_value(glyph).is_none() {
                return false;
            }
            let rest = &coverages[1..];
            let match_fn = |info: &GlyphInfo, i: u16| {
                rest.get(usize::from(i)).map_or(false, |coverage| {
                    coverage.coverage_value(info.codepoint as u16).is_some()
                })
            };
            if let Some((match_end, _)) = ctx.match_input(rest.len(), &match_fn) {
                ctx.buffer.unsafe_to_break(ctx.buffer.idx, match_end);
                ctx.apply_nested_lookups(rest.len() + 1, match_end, lookup_records);
                return true;
            }
            false
        }
    }
}

pub(crate) fn apply_chain_context_lookup(
    ctx: &mut ApplyContext<'_, '_>,
    lookup: &crate::layout::ChainContextLookup,
) -> bool {
    use crate::layout::ChainContextLookup;

    let glyph = ctx.buffer.cur(0).codepoint as u16;
    match lookup {
        ChainContextLookup::Format1 {
            coverage,
            rule_sets,
        } => {
            let Some(index) = coverage.coverage_value(glyph) else {
                return false;
            };
            let Some(Some(rules)) = rule_sets.get(usize::from(index)) else {
                return false;
            };
            for rule in rules {
                let input = rule.input.as_slice();
                let backtrack = rule.backtrack.as_slice();
                let lookahead = rule.lookahead.as_slice();
                let input_fn = |info: &GlyphInfo, i: u16| {
                    input
                        .get(usize::from(i))
                        .map_or(false, |&g| match_glyph(info, g))
                };
                let backtrack_fn = |info: &GlyphInfo, i: u16| {
                    backtrack
                        .get(usize::from(i))
                        .map_or(false, |&g| match_glyph(info, g))
                };
                let lookahead_fn = |info: &GlyphInfo, i: u16| {
                    lookahead
                        .get(usize::from(i))
                        .map_or(false, |&g| match_glyph(info, g))
                };
                if let Some(match_end) = match_chain(
                    ctx,
                    backtrack.len(),
                    &backtrack_fn,
                    input.len(),
                    &input_fn,
                    lookahead.len(),
                    &lookahead_fn,
                ) {
                    ctx.apply_nested_lookups(input.len() + 1, match_end, &rule.lookup_records);
                    return true;
                }
            }
            false
        }
        ChainContextLookup::Format2 {
            coverage,
            backtrack_classes,
            input_classes,
            lookahead_classes,
            rule_sets,
        } => {
            if coverage.coverage_value(glyph).is_none() {
                return false;
            }
            let class = input_classes.glyph_class_value(glyph);
            let Some(Some(rules)) = rule_sets.get(usize::from(class)) else {
                return false;
            };
            for rule in rules {
                let input = rule.input.as_slice();
                let backtrack = rule.backtrack.as_slice();
                let lookahead = rule.lookahead.as_slice();
                let input_fn = |info: &GlyphInfo, i: u16| {
                    input.get(usize::from(i)).map_or(false, |&c| {
                        input_classes.glyph_class_value(info.codepoint as u16) == c
                    })
                };
                let backtrack_fn = |info: &GlyphInfo, i: u16| {
                    backtrack.get(usize::from(i)).map_or(false, |&c| {
                        backtrack_classes.glyph_class_value(info.codepoint as u16) == c
                    })
                };
                let lookahead_fn = |info: &GlyphInfo, i: u16| {
                    lookahead.get(usize::from(i)).map_or(false, |&c| {
                        lookahead_classes.glyph_class_value(info.codepoint as u16) == c
                    })
                };
                if let Some(match_end) = match_chain(
                    ctx,
                    backtrack.len(),
                    &backtrack_fn,
                    input.len(),
                    &input_fn,
                    lookahead.len(),
                    &lookahead_fn,
                ) {
                    ctx.apply_nested_lookups(input.len() + 1, match_end, &rule.lookup_records);
                    return true;
                }
            }
            false
        }
        ChainContextLookup::Format3 {
            backtrack_coverages,
            input_coverages,
            lookahead_coverages,
            lookup_records,
        } => {
            let Some(first) = input_coverages.first() else {
                return false;
            };
            if first.coverage_value(glyph).is_none() {
                return false;
            }
            let rest = &input_coverages[1..];
            let input_fn = |info: &GlyphInfo, i: u16| {
                rest.get(usize::from(i)).map_or(false, |coverage| {
                    coverage.coverage_value(info.codepoint as u16).is_some()
                })
            };
            let backtrack_fn = |info: &GlyphInfo, i: u16| {
                backtrack_coverages.get(usize::from(i)).map_or(false, |coverage| {
                    coverage.coverage_value(info.codepoint as u16).is_some()
                })
            };
            let lookahead_fn = |info: &GlyphInfo, i: u16| {
                lookahead_coverages.get(usize::from(i)).map_or(false, |coverage| {
                    coverage.coverage_value(info.codepoint as u16).is_some()
                })
            };
            if let Some(match_end) = match_chain(
                ctx,
                backtrack_coverages.len(),
                &backtrack_fn,
                rest.len(),
                &input_fn,
                lookahead_coverages.len(),
                &lookahead_fn,
            ) {
                ctx.apply_nested_lookups(rest.len() + 1, match_end, lookup_records);
                return true;
            }
            false
        }
    }
}

/// Backtrack, input, and lookahead must all match for a chain rule to fire.
fn match_chain(
    ctx: &mut ApplyContext<'_, '_>,
    backtrack_len: usize,
    backtrack_fn: &MatchFn<'_>,
    input_rest: usize,
    input_fn: &MatchFn<'_>,
    lookahead_len: usize,
    lookahead_fn: &MatchFn<'_>,
) -> Option<usize> {
    let (match_end, _) = ctx.match_input(input_rest, input_fn)?;
    ctx.match_lookahead(lookahead_len, lookahead_fn, match_end)?;
    if backtrack_len > 0 {
        ctx.match_backtrack(backtrack_len, backtrack_fn)?;
    }
    ctx.buffer.unsafe_to_break(ctx.buffer.idx, match_end);
    Some(match_end)
}
