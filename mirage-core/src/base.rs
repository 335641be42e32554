//! Collaborators of the training core.
//!
//! The neural networks, the environment and the parameter store are external to
//! this library. They are plugged into the driver and the coordinator through the
//! traits defined here.
mod env;
mod model;
mod policy;
pub use env::{Env, EnvStep};
pub use model::{GradientReport, LocalModel, SharedModel, SyncModel};
pub use policy::{Policy, PolicyOutput};
