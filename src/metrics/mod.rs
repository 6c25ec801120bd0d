//! # Estadísticas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas, rechazadas, cerradas y expulsadas
//! - Respuestas por código de estado
//! - Latencia de procesamiento (p50, p95, p99)
//! - Solapamiento máximo de tareas por conexión

pub mod collector;

pub use collector::{ServerStats, StatsSnapshot};
