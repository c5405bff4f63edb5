//! Core notification engine.
//!
//! The [`orchestrator::Orchestrator`] is the public entry point for domain
//! collaborators: it resolves channels, renders templates, persists a
//! delivery record per channel, and dispatches through the transport
//! registry. The [`retry::RetryScheduler`] independently re-dispatches due
//! failed/pending records with exponential backoff.

pub mod orchestrator;
pub mod retry;
pub mod router;
pub mod store;
pub mod subscriptions;
pub mod templates;
