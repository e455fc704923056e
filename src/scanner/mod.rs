pub mod matcher;
pub mod walker;

pub use matcher::{matches, PathMatcher};
pub use walker::{walk, WalkStats};
