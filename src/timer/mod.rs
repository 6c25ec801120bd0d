//! # Módulo de Timers
//! src/timer/mod.rs
//!
//! Min-heap indexado de deadlines. El servidor lo usa para expulsar
//! conexiones inactivas: cada actividad empuja el deadline hacia adelante
//! y el thread del reactor llama a `tick` entre cada `wait`.

pub mod heap;

pub use heap::{TimerError, TimerHeap};
