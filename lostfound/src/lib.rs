//! Client core for the campus lost-and-found service: identity sync,
//! conversation list, and polling message sync.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod display;
pub mod guard;
pub mod session;
pub mod sync;
