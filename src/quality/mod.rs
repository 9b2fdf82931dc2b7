//! Quality gate over resolved catalog rows.
//!
//! - soft issues: astrometry, classification (`check_quality`)
//! - hard failure: missing sampled spectrum (`enforce`)

pub mod gate;

pub use gate::*;
