//! Symbol extraction: one walk over a translation unit that fills a
//! [`SymbolModel`](crate::model::SymbolModel).

pub mod calls;
pub mod docs;
pub mod locality;
pub mod walker;

pub use locality::LocalityFilter;
pub use walker::{walk, WalkOptions};
