//! Auto-generated by `cargo hakari`. Do not edit.
//!
//! This crate exists solely to unify feature flags across the workspace so
//! that every member builds each dependency with the same feature set,
//! avoiding redundant rebuilds. It has no functionality of its own.
