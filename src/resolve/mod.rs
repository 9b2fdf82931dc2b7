//! Source resolution.
//!
//! - identifier parsing (`identifier`)
//! - request validation into a `SourceQuery` (`query`)
//! - catalog lookups, coordinates via cone search (`resolver`)

pub mod identifier;
pub mod query;
pub mod resolver;

pub use identifier::*;
pub use query::*;
pub use resolver::*;
