//! Application services: validation, the render pipeline, and health.

pub mod error;
pub mod health;
pub mod render;
pub mod validate;
