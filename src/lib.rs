//! Venue booking engine: conflict detection, availability gap reporting,
//! deposit-gated approval, and a crash-safe commit journal.
//!
//! The embedding application drives everything through [`engine::Engine`];
//! `directory` is the boundary it implements to resolve events and payers,
//! and `notify` is where post-commit booking notices come out.

pub mod clock;
pub mod directory;
pub mod engine;
pub mod journal;
mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod response;
