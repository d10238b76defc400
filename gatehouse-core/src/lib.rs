//! Shared domain layer for the gatehouse services: opaque-token sessions,
//! the user directory, dependency health probing, the live settings document
//! and the runtime diagnostics endpoint. The binaries wire these pieces to
//! their transports and add nothing else.

pub mod auth;
pub mod checker;
pub mod diagnostics;
pub mod error;
pub mod password;
pub mod settings;
pub mod users;
