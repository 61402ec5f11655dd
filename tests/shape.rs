//! End-to-end shaping tests against synthetic faces.

mod common;

use common::{
    gdef_table, layout_table, ligature_subst, lookup, mark_base_pos, ot_tag,
    pair_pos_x_advance, TestFace,
};
use shapeset::buffer::{Buffer, BufferFlags, ContentType, UNSAFE_TO_BREAK};
use shapeset::segment::Direction;
use shapeset::shape;

fn shaped(face: &TestFace, text: &str) -> Buffer {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut buffer = Buffer::new();
    buffer.add_str(text);
    buffer.guess_segment_properties();
    assert!(shape(face, &mut buffer, &[]));
    buffer
}

#[test]
fn test_trivial_ascii_round_trip() {
    // A font with no layout tables: one glyph per code point, cluster ==
    // input index, advance straight from the metrics.
    let face = TestFace::new().with_chars("abc", 1);
    let buffer = shaped(&face, "abc");

    assert_eq!(buffer.content_type(), ContentType::Glyphs);
    assert_eq!(buffer.len(), 3);
    let infos = buffer.glyph_infos();
    let positions = buffer.glyph_positions();
    assert_eq!(infos.len(), positions.len());
    for (i, (info, pos)) in infos.iter().zip(positions).enumerate() {
        assert_eq!(info.codepoint, 1 + i as u32);
        assert_eq!(info.cluster, i as u32);
        assert_eq!(pos.x_advance, 600);
        assert_eq!(pos.x_offset, 0);
    }
}

#[test]
fn test_missing_glyph_maps_to_notdef() {
    let face = TestFace::new().with_chars("a", 1);
    let buffer = shaped(&face, "ab");
    assert_eq!(buffer.glyph_infos()[0].codepoint, 1);
    assert_eq!(buffer.glyph_infos()[1].codepoint, 0);
}

#[test]
fn test_pair_kerning() {
    // "AV" with a GPOS pair adjustment of -80 on the first glyph.
    let gpos = layout_table(
        &[(ot_tag(b"kern"), &[0])],
        &[lookup(2, 0, &[pair_pos_x_advance(&[(1, 2, -80)])])],
    );
    let face = TestFace::new()
        .with_cmap(&[('A' as u32, 1), ('V' as u32, 2)])
        .with_table(ot_tag(b"GPOS"), gpos);

    let buffer = shaped(&face, "AV");
    let positions = buffer.glyph_positions();
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].x_advance, 600 - 80);
    assert_eq!(positions[1].x_advance, 600);
}

#[test]
fn test_ligature_substitution() {
    // "fi" with a GSUB liga lookup f+i -> fi.
    let gsub = layout_table(
        &[(ot_tag(b"liga"), &[0])],
        &[lookup(4, 0, &[ligature_subst(&[(&[1, 2], 3)])])],
    );
    let face = TestFace::new()
        .with_cmap(&[('f' as u32, 1), ('i' as u32, 2)])
        .with_table(ot_tag(b"GSUB"), gsub);

    let buffer = shaped(&face, "fi");
    let infos = buffer.glyph_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].codepoint, 3);
    assert_eq!(infos[0].cluster, 0);
    assert!(infos[0].mask & UNSAFE_TO_BREAK != 0);
}

#[test]
fn test_mark_attachment() {
    // "é" as e + COMBINING ACUTE with mark-to-base anchoring. The face has
    // no precomposed é, so the sequence stays decomposed.
    const E: u16 = 1;
    const ACUTE: u16 = 2;
    let gpos = layout_table(
        &[(ot_tag(b"mark"), &[0])],
        &[lookup(4, 0, &[mark_base_pos(E, (250, 400), ACUTE, (10, -50))])],
    );
    // GDEF classifies the acute as a mark (class 3).
    let gdef = gdef_table(common::class_def(ACUTE, &[3]));
    let face = TestFace::new()
        .with_cmap(&[('e' as u32, E), (0x0301, ACUTE)])
        .with_table(ot_tag(b"GPOS"), gpos)
        .with_table(ot_tag(b"GDEF"), gdef);

    let buffer = shaped(&face, "e\u{0301}");
    let infos = buffer.glyph_infos();
    let positions = buffer.glyph_positions();
    assert_eq!(infos.len(), 2);

    // Both glyphs belong to the grapheme's cluster.
    assert_eq!(infos[0].cluster, 0);
    assert_eq!(infos[1].cluster, 0);

    // The mark has zero advance and sits at the anchor delta, compensated
    // for the base's advance.
    assert_eq!(positions[1].x_advance, 0);
    assert_eq!(positions[1].x_offset, (250 - 10) - 600);
    assert_eq!(positions[1].y_offset, 400 - (-50));
}

#[test]
fn test_zero_width_space_removed() {
    let face = TestFace::new().with_chars("ab", 1).with_cmap(&[(0x200B, 9)]);
    let mut buffer = Buffer::new();
    buffer.add_str("a\u{200B}b");
    buffer.set_flags(BufferFlags::REMOVE_DEFAULT_IGNORABLES);
    buffer.guess_segment_properties();
    assert!(shape(&face, &mut buffer, &[]));

    let infos = buffer.glyph_infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].codepoint, 1);
    assert_eq!(infos[1].codepoint, 2);
    // Adjacent clusters keep their original values.
    assert_eq!(infos[0].cluster, 0);
    assert_eq!(infos[1].cluster, 4);
}

#[test]
fn test_zero_width_space_hidden_without_removal() {
    // Without REMOVE, the ZWSP stays but becomes invisible: space glyph,
    // zero advance.
    let face = TestFace::new()
        .with_chars("ab", 1)
        .with_cmap(&[(0x200B, 9), (' ' as u32, 8)]);
    let buffer = shaped(&face, "a\u{200B}b");
    let infos = buffer.glyph_infos();
    let positions = buffer.glyph_positions();
    assert_eq!(infos.len(), 3);
    assert_eq!(infos[1].codepoint, 8);
    assert_eq!(positions[1].x_advance, 0);
}

#[test]
fn test_rtl_output_is_reversed() {
    // Hebrew bet + dalet in RTL: output order reversed, clusters
    // non-increasing.
    let face = TestFace::new().with_cmap(&[(0x05D1, 1), (0x05D3, 2)]);
    let buffer = shaped(&face, "\u{05D1}\u{05D3}");

    assert_eq!(buffer.direction(), Direction::RightToLeft);
    let infos = buffer.glyph_infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].codepoint, 2);
    assert_eq!(infos[1].codepoint, 1);
    assert!(infos[0].cluster >= infos[1].cluster);
}

#[test]
fn test_clusters_monotone_ltr() {
    let face = TestFace::new().with_chars("abcd", 1);
    let buffer = shaped(&face, "abcd");
    let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
    let mut sorted = clusters.clone();
    sorted.sort_unstable();
    assert_eq!(clusters, sorted);
}

#[test]
fn test_determinism() {
    let gsub = layout_table(
        &[(ot_tag(b"liga"), &[0])],
        &[lookup(4, 0, &[ligature_subst(&[(&[1, 2], 3)])])],
    );
    let face = TestFace::new()
        .with_chars("fix", 1)
        .with_table(ot_tag(b"GSUB"), gsub);

    let a = shaped(&face, "fix fix");
    let b = shaped(&face, "fix fix");
    assert_eq!(a.glyph_infos(), b.glyph_infos());
    assert_eq!(a.glyph_positions(), b.glyph_positions());
}

#[test]
fn test_shaping_glyphs_buffer_is_misuse() {
    let face = TestFace::new().with_chars("a", 1);
    let mut buffer = Buffer::new();
    buffer.add_str("a");
    buffer.guess_segment_properties();
    assert!(shape(&face, &mut buffer, &[]));
    // Shaping again without resetting is misuse and fails.
    assert!(!shape(&face, &mut buffer, &[]));
    assert!(!buffer.allocation_successful());
}

#[test]
fn test_unsafe_to_break_propagates_through_cluster() {
    // A ligature that swallows "fi" inside "afib" marks the merged cluster
    // unsafe on every glyph that shares it.
    let gsub = layout_table(
        &[(ot_tag(b"liga"), &[0])],
        &[lookup(4, 0, &[ligature_subst(&[(&[2, 3], 9)])])],
    );
    let face = TestFace::new()
        .with_chars("afib", 1)
        .with_table(ot_tag(b"GSUB"), gsub);
    let buffer = shaped(&face, "afib");

    for info in buffer.glyph_infos() {
        let cluster = info.cluster;
        let cluster_flagged = buffer
            .glyph_infos()
            .iter()
            .filter(|i| i.cluster == cluster)
            .any(|i| i.mask & UNSAFE_TO_BREAK != 0);
        if cluster_flagged {
            assert!(
                buffer
                    .glyph_infos()
                    .iter()
                    .filter(|i| i.cluster == cluster)
                    .all(|i| i.mask & UNSAFE_TO_BREAK != 0),
                "unsafe-to-break must cover whole cluster"
            );
        }
    }
}

#[test]
fn test_feature_disabled_by_user() {
    let gsub = layout_table(
        &[(ot_tag(b"liga"), &[0])],
        &[lookup(4, 0, &[ligature_subst(&[(&[1, 2], 3)])])],
    );
    let face = TestFace::new()
        .with_cmap(&[('f' as u32, 1), ('i' as u32, 2)])
        .with_table(ot_tag(b"GSUB"), gsub);

    let mut buffer = Buffer::new();
    buffer.add_str("fi");
    buffer.guess_segment_properties();
    let liga_off = shapeset::Feature::new(ot_tag(b"liga"), 0);
    assert!(shape(&face, &mut buffer, &[liga_off]));
    assert_eq!(buffer.len(), 2, "liga=0 must suppress the ligature");
}

#[test]
fn test_malformed_gsub_is_ignored() {
    let face = TestFace::new()
        .with_chars("ab", 1)
        .with_table(ot_tag(b"GSUB"), vec![0xFF, 0xFF, 0x00]);
    let buffer = shaped(&face, "ab");
    assert_eq!(buffer.len(), 2);
}

#[test]
fn test_empty_buffer_shapes_to_empty_glyphs() {
    let face = TestFace::new();
    let mut buffer = Buffer::new();
    buffer.guess_segment_properties();
    assert!(shape(&face, &mut buffer, &[]));
    assert_eq!(buffer.content_type(), ContentType::Glyphs);
    assert!(buffer.is_empty());
}
