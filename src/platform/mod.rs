//! Service plumbing shared by every route: state, errors, auth, persistence.

pub mod aliases;
pub mod app_error;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod middleware;
pub mod outbox;
pub mod pagination;
pub mod swagger;
