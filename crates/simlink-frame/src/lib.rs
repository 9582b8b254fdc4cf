//! Newline-delimited JSON framing for the simulator wire protocol.
//!
//! The simulator writes JSON objects separated by `\n`, but TCP hands them
//! over in arbitrary pieces. [`FrameReassembler`] turns those pieces back
//! into whole objects:
//! - UTF-8 sequences split across reads are carried over
//! - lines split across reads are held until they complete
//! - objects spread over several lines are joined when the closing brace arrives
//! - comma decimal separators written by non-English locales are repaired
//!   before parsing (see [`fix_locale_floats`])

pub mod error;
pub mod locale;
pub mod reassembler;

pub use error::{FrameError, Result};
pub use locale::fix_locale_floats;
pub use reassembler::{FrameConfig, FrameReassembler, DEFAULT_MAX_PARTIAL};
