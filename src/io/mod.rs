//! Input/output helpers.
//!
//! - per-run staging directories + product file naming (`staging`)
//! - staged spectrum loading (`spectrum`)
//! - batch request files (`batch`)

pub mod batch;
pub mod spectrum;
pub mod staging;

pub use batch::*;
pub use spectrum::*;
pub use staging::*;
