//! Bouncer - a filtering DNS forwarding relay.
//!
//! Inspects every UDP query, answers blacklisted names locally with a
//! denial or redirect, and forwards everything else to a single upstream
//! resolver, relaying its reply back to the original client.

pub mod config;
pub mod dns;
pub mod filter;
pub mod proxy;
pub mod relay;
pub mod stats;
