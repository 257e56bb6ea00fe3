//! Graph construction: builder, processing and learning passes, and the
//! topological machinery they share.
//!
//! Entry point is [`SystemBuilder`]; the construction and learning modules
//! hold the traversal passes it drives, and [`toposort`] the layering both
//! passes probe with.

pub mod builder;
pub mod construction;
pub mod learning;
pub mod toposort;

#[cfg(test)]
mod tests;

pub use builder::{GraphBuildError, InternalError, SystemBuilder};
pub use construction::GraphLayout;
pub use learning::{
    ACTIVATION_PORT, ERROR_SIGNAL_PORT, LearningLayout, SAMPLE_PORT, TARGET_PORT,
};
