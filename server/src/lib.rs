//! Chat hub server library.
//! Exposes the connection registry, fan-out engine and HTTP surface so the
//! binary in main.rs and the integration tests share one implementation.

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod routes;
pub mod state;
pub mod ws;
