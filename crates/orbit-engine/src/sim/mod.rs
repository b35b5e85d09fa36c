//! Particle simulation.

mod integrator;
mod pool;

pub use integrator::{CentralForce, Integrator, Scheme};
pub use pool::{ParticlePool, Snapshot};
