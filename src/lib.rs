//! Event-choreographed order pipeline.
//!
//! A purchase order moves through independent stages - intake, payment
//! capture, shipment arrangement - coordinated purely by topic-routed events
//! on a shared exchange. No stage calls another; each consumes the facts it
//! cares about, publishes its own, and the status reconciler folds pipeline
//! progress back into the order store. Delivery is at-least-once, so every
//! consumer is idempotent and every transition is a guard-checked,
//! replay-safe state machine step.

pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod utils;
