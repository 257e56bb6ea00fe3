//! Small shared helpers: vector arithmetic and canned test mechanisms.

pub mod collections;
pub mod testing;
