//! # Reactor HTTP
//! src/lib.rs
//!
//! Servidor HTTP/1.1 construido sobre un reactor `epoll`: un thread espera
//! readiness y acepta clientes, un pool fijo de workers hace toda la I/O y
//! el parseo. La exclusión mutua por conexión la da el interés ONESHOT.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `buffer`: Buffer de bytes con cursores de lectura/escritura y `readv`
//! - `reactor`: Registro de interés y espera sobre `epoll`
//! - `timer`: Heap de timers para expulsar conexiones inactivas
//! - `pool`: Pool de workers y pool acotado de recursos
//! - `http`: Parser de requests, armado de respuestas y archivos estáticos
//! - `auth`: Verificación de credenciales (login y registro)
//! - `server`: Loop del reactor y manejo de conexiones
//! - `metrics`: Estadísticas del servidor
//! - `config` / `logging`: Configuración CLI y log asíncrono
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use reactor_http::config::Config;
//! use reactor_http::server::Server;
//!
//! let config = Config::default();
//! let server = Server::new(config).expect("Error al iniciar servidor");
//! server.run().expect("Error en el loop del servidor");
//! ```

pub mod auth;
pub mod buffer;
pub mod config;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod reactor;
pub mod server;
pub mod timer;
