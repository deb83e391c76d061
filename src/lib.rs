//! Stagegate, a guarded linear wizard engine.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod i18n;
pub mod routes;
pub mod session;
pub mod step;
pub mod token;
pub mod wizard;
