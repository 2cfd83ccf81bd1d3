//! Render pipeline.
//!
//! Requests flow validator → [`ConcurrencyGate`] → [`EngineAdapter`] →
//! [`RenderEngine`]. Every failure is converted to a
//! [`RenderError`](crate::domain::error::RenderError) at the boundary where it
//! occurs; nothing engine-specific leaves the adapter.

mod adapter;
mod engine;
mod gate;
mod orchestrator;

pub use adapter::EngineAdapter;
pub use engine::{EngineFault, RenderEngine};
pub use gate::{ConcurrencyGate, GateError, GateSlot};
pub use orchestrator::{RenderOrchestrator, RenderedDocument};

pub(crate) use gate::IN_FLIGHT_GAUGE;
pub(crate) use orchestrator::{RENDER_DURATION_MS, RENDER_QUEUE_WAIT_MS, RENDER_TOTAL};
