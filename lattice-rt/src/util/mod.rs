//! Utility types and helpers for the module host

pub mod errnum;
pub mod ids;

pub use ids::ModuleId;
