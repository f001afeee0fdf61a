//! WardSign display agent
//!
//! Runs on each signage screen: reports liveness to the registry, rotates
//! through the hospital views and keeps a refreshed snapshot of hospital
//! data on screen.

pub mod config;
pub mod fetch;
pub mod heartbeat;
pub mod model;
pub mod render;
pub mod rotation;
pub mod session;
pub mod simulation;
pub mod timer;
