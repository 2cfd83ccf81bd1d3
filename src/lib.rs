//! Folio: an HTML to PDF rendering service.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
