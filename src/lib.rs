// Main library entry point for callreplay.

pub mod api;
pub mod application;
pub mod common;
pub mod domain;
pub mod infrastructure;
pub mod ports;
