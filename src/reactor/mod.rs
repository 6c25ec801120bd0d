//! # Módulo del Reactor
//! src/reactor/mod.rs
//!
//! Envoltorio sobre `epoll` que reporta qué descriptores están listos.
//! El reactor no hace I/O de requests: solo espera eventos y mantiene la
//! tabla de registros (descriptor → máscara de interés).
//!
//! ## Disciplina oneshot
//!
//! Las conexiones se registran con `Interest::ONESHOT`: después de entregar
//! un evento el kernel deshabilita el registro hasta que alguien llame a
//! `modify_interest`. Así nunca hay dos tareas sobre la misma conexión.

pub mod epoll;
pub mod interest;
pub mod sys;

pub use epoll::{Event, Events, Reactor, ReactorError, WAKE_TOKEN};
pub use interest::Interest;
