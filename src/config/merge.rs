//! Merge rules applied before any source is read.

pub mod merge_policy;
