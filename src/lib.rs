//! Finassist - LLM provider abstraction and tool-calling orchestration
//! core for an accounting assistant.
//!
//! Three vendor wire protocols normalize behind one neutral call/stream
//! interface; user intent classifies and plans across domain handlers;
//! each handler drives the model's tool requests through a
//! confirmation-gated, audited registry.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
