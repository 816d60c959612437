//! Shared wire definitions for the lost-and-found backend API.

pub mod model;
pub mod route;
