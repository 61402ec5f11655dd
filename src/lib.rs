#![warn(rust_2018_idioms)]

//! # Complex-script text shaping engine
//!
//! Shapeset turns a run of Unicode code points plus an OpenType or AAT font
//! into a sequence of positioned glyphs. It performs script-aware
//! reordering, contextual glyph substitution (ligatures, marks,
//! presentation forms), and glyph positioning (kerning, mark attachment,
//! cursive joining), honouring the font's `GSUB`/`GPOS`/`morx`/`kerx`/
//! `kern`/`GDEF` tables.
//!
//! ## What is font shaping?
//!
//! Font shaping is the process of taking text in the form of Unicode
//! codepoints and a font, and laying out glyphs from the font according to
//! the text. This involves honouring kerning, ligatures, and substitutions
//! specified by the font. For some languages this is relatively
//! straightforward. For others, such as Indic scripts, it is quite complex.
//! After shaping, another library is responsible for rendering the glyphs.
//!
//! ## Usage
//!
//! Implement [Face] for your font (or use an existing font parser to back
//! it), fill a [Buffer] with text, and call [shape]:
//!
//! ```no_run
//! use shapeset::{shape, Buffer};
//!
//! # fn example(face: &dyn shapeset::Face) {
//! let mut buffer = Buffer::new();
//! buffer.add_str("Привіт!");
//! buffer.guess_segment_properties();
//! if shape(face, &mut buffer, &[]) {
//!     for (info, pos) in buffer
//!         .glyph_infos()
//!         .iter()
//!         .zip(buffer.glyph_positions())
//!     {
//!         println!("gid{} cluster {} advance {}", info.codepoint, info.cluster, pos.x_advance);
//!     }
//! }
//! # }
//! ```
//!
//! Shaping is synchronous CPU work with no suspension points. A compiled
//! [ShapePlan] is immutable and can be shared across threads; a [Buffer] is
//! exclusively owned while shaping. The only observable failure is the
//! buffer's sticky allocation flag: on any internal failure the output is
//! empty of meaningful glyphs and [`shape`] returns false. Malformed font
//! tables never abort shaping; the offending table is skipped.
//!
//! ## Supported scripts
//!
//! Dedicated shapers exist for Arabic/Syriac, Hebrew, Thai/Lao, Hangul,
//! the ten Indic scripts, Khmer, and Myanmar; a Universal Shaping Engine
//! pass covers the long tail of Brahmi-derived scripts, and everything else
//! takes the default shaper.

pub(crate) mod aat;
pub mod binary;
pub mod buffer;
pub(crate) mod complex;
pub(crate) mod context;
pub mod error;
pub mod face;
pub(crate) mod fallback;
pub mod gdef;
pub(crate) mod gpos;
pub(crate) mod gsub;
pub(crate) mod kern;
pub mod layout;
pub(crate) mod normalize;
pub mod ot_map;
pub mod plan;
pub mod segment;
pub mod shape;
pub mod tag;
pub mod unicode;

pub use buffer::{
    Buffer, BufferFlags, ClusterLevel, ContentType, GlyphInfo, GlyphPosition, UNSAFE_TO_BREAK,
};
pub use error::ParseError;
pub use face::{Face, GlyphExtents};
pub use plan::ShapePlan;
pub use segment::{Direction, Feature, Language, SegmentProperties};
pub use shape::{shape, shape_with_plan};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
