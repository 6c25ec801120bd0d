//! # Reactor HTTP - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor: parsea la configuración (CLI + entorno),
//! instala el log y corre el reactor hasta que el proceso termine.

use reactor_http::config::Config;
use reactor_http::logging;
use reactor_http::server::Server;
use tracing::error;

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("❌ Configuración inválida: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    // El guard vacía la cola de log al salir de main
    let log_guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let result = Server::new(config).and_then(|server| server.run());
    if let Err(e) = result {
        error!(error = %e, "server failed");
        eprintln!("💥 Error fatal: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}
