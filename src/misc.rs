//! Miscilaneous *non core related* utilities

pub mod paths;
pub mod take;

pub use paths::RecordsPath;
pub use take::Take;
