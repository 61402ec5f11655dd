//! Arabic shaping tests: joining forms and the lam-alef ligature.

mod common;

use common::{layout_table, ligature_subst, lookup, ot_tag, single_subst, TestFace};
use shapeset::buffer::Buffer;
use shapeset::shape;

const LAM: u32 = 0x0644;
const ALEF: u32 = 0x0627;
const BEH: u32 = 0x0628;

// Base glyph ids.
const G_LAM: u16 = 10;
const G_ALEF: u16 = 11;
const G_BEH: u16 = 12;

// Positional forms are base + offset.
const INIT_DELTA: u16 = 10;
const MEDI_DELTA: u16 = 20;
const FINA_DELTA: u16 = 30;

const G_LAM_ALEF: u16 = 90;

/// A face whose init/medi/fina features bump the glyph id by a known
/// delta, plus an rlig ligature for init-lam + fina-alef.
fn arabic_face() -> TestFace {
    let init = single_subst(&[
        (G_LAM, G_LAM + INIT_DELTA),
        (G_BEH, G_BEH + INIT_DELTA),
    ]);
    let medi = single_subst(&[
        (G_LAM, G_LAM + MEDI_DELTA),
        (G_BEH, G_BEH + MEDI_DELTA),
    ]);
    let fina = single_subst(&[
        (G_LAM, G_LAM + FINA_DELTA),
        (G_ALEF, G_ALEF + FINA_DELTA),
        (G_BEH, G_BEH + FINA_DELTA),
    ]);
    let rlig = ligature_subst(&[(&[G_LAM + INIT_DELTA, G_ALEF + FINA_DELTA], G_LAM_ALEF)]);

    let gsub = layout_table(
        &[
            (ot_tag(b"fina"), &[0]),
            (ot_tag(b"init"), &[1]),
            (ot_tag(b"medi"), &[2]),
            (ot_tag(b"rlig"), &[3]),
        ],
        &[
            lookup(1, 0, &[fina]),
            lookup(1, 0, &[init]),
            lookup(1, 0, &[medi]),
            lookup(4, 0, &[rlig]),
        ],
    );

    TestFace::new()
        .with_cmap(&[(LAM, G_LAM), (ALEF, G_ALEF), (BEH, G_BEH)])
        .with_table(ot_tag(b"GSUB"), gsub)
}

fn shaped(face: &TestFace, text: &str) -> Buffer {
    let mut buffer = Buffer::new();
    buffer.add_str(text);
    buffer.guess_segment_properties();
    assert!(shape(face, &mut buffer, &[]));
    buffer
}

#[test]
fn test_joining_forms_applied() {
    // BEH + BEH + BEH: init, medi, fina. Output is in visual (RTL) order,
    // so the final form comes first.
    let buffer = shaped(&arabic_face(), "\u{0628}\u{0628}\u{0628}");
    let glyphs: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.codepoint).collect();
    assert_eq!(
        glyphs,
        vec![
            u32::from(G_BEH + FINA_DELTA),
            u32::from(G_BEH + MEDI_DELTA),
            u32::from(G_BEH + INIT_DELTA),
        ]
    );
}

#[test]
fn test_isolated_letter_keeps_base_form() {
    // A single BEH is isolated; with no isol feature in the font, the base
    // glyph survives.
    let buffer = shaped(&arabic_face(), "\u{0628}");
    assert_eq!(buffer.glyph_infos()[0].codepoint, u32::from(G_BEH));
}

#[test]
fn test_lam_alef_ligature() {
    // LAM + ALEF joins into the lam-alef ligature through rlig, keeping
    // the lam's cluster.
    let buffer = shaped(&arabic_face(), "\u{0644}\u{0627}");
    let infos = buffer.glyph_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].codepoint, u32::from(G_LAM_ALEF));
    assert_eq!(infos[0].cluster, 0);
}

#[test]
fn test_clusters_non_increasing_in_rtl_output() {
    let buffer = shaped(&arabic_face(), "\u{0628}\u{0628} \u{0628}");
    let clusters: Vec<u32> = buffer.glyph_infos().iter().map(|i| i.cluster).collect();
    for pair in clusters.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}
