//! Scale-from-zero middleware for a functions gateway.
//!
//! [`scaling::ScaleFromZero`] wraps the function invocation routes. Before a
//! request reaches its function it makes sure at least one replica is ready,
//! asking the provider to scale up and polling for readiness when the
//! function is idle.
pub mod config;
pub mod handlers;
pub mod scaling;
