//! Feature flag evaluation service.
//!
//! Flags carry a global default plus user, group and region overrides.
//! [`domain::evaluation`] resolves them for a request context,
//! [`application::flags::FlagService`] runs the load/validate/persist
//! cycle, and [`cache::CachedFlagsRepo`] keeps hot reads off the store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
