//! DNS query filtering module.
//!
//! Compiles the configured blacklist rules and answers membership queries
//! for the relay's block-or-forward decision.

mod blacklist;

pub use blacklist::Blacklist;
