//! # Módulo de Pools
//! src/pool/mod.rs
//!
//! - `WorkerPool`: N threads consumiendo una cola FIFO compartida de tareas
//! - `ResourcePool`: pool acotado de recursos con checkout que se devuelve solo

pub mod resource;
pub mod worker;

pub use resource::{Checkout, ResourcePool};
pub use worker::{Task, WorkerPool};

/// Errores de los pools
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// El pool ya fue cerrado
    #[error("pool is closed")]
    Closed,

    /// Tamaño cero
    #[error("pool size must be at least 1")]
    InvalidSize,

    /// No se obtuvo un recurso antes del timeout
    #[error("timed out waiting for a pooled resource")]
    Timeout,

    /// No se pudo crear un thread worker
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}
