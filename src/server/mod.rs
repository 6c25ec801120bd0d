//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Orquestación del servidor:
//! 1. `webserver`: loop del reactor, accept, timers y cierre de conexiones
//! 2. `connection`: lectura, parseo y escritura de un cliente
//! 3. `context`: servicios compartidos que reciben las tareas
//! 4. `slab`: arena de conexiones direccionada por handles con generación

pub mod connection;
pub mod context;
pub mod slab;
pub mod webserver;

// Re-exportar para facilitar el uso
pub use connection::{Connection, WriteStatus};
pub use context::{Command, ServerContext};
pub use slab::{ConnectionSlab, Handle};
pub use webserver::{Server, ServerError, ServerHandle, LISTEN_TOKEN};
