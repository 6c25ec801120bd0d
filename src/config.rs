//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración con soporte para argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./reactor_http --port 1316 \
//!   --trig-mode 3 \
//!   --timeout-ms 60000 \
//!   --workers 6 \
//!   --auth-pool 12
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=9006 TRIG_MODE=1 WORKERS=8 ./reactor_http
//! ```
//!
//! ## Modos de disparo (`--trig-mode`)
//!
//! | Modo | Listener | Conexiones |
//! |------|----------|------------|
//! | 0    | LT       | LT         |
//! | 1    | LT       | ET         |
//! | 2    | ET       | LT         |
//! | 3    | ET       | ET         |

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "reactor_http")]
#[command(about = "Servidor HTTP/1.1 basado en un reactor epoll con pool de workers")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = puerto efímero)
    #[arg(short, long, default_value = "1316", env = "HTTP_PORT")]
    pub port: u16,

    /// Modo de disparo: 0 LT/LT, 1 LT/ET, 2 ET/LT, 3 ET/ET
    #[arg(long = "trig-mode", default_value = "3", env = "TRIG_MODE")]
    pub trig_mode: u8,

    /// Timeout de inactividad por conexión en milisegundos (0 = sin timeout)
    #[arg(long = "timeout-ms", default_value = "60000", env = "TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Cierre elegante: SO_LINGER de 1 segundo
    #[arg(long, env = "HTTP_LINGER")]
    pub linger: bool,

    // === Pools ===

    /// Número de workers que leen, parsean y escriben
    #[arg(long, default_value = "6", env = "WORKERS")]
    pub workers: usize,

    /// Sesiones concurrentes contra el almacén de usuarios
    #[arg(long = "auth-pool", default_value = "12", env = "AUTH_POOL")]
    pub auth_pool_size: usize,

    /// Máximo de conexiones simultáneas antes de responder "Server Busy!"
    #[arg(long = "max-conn", default_value = "65535", env = "MAX_CONN")]
    pub max_connections: usize,

    // === Logging ===

    /// Desactiva el log
    #[arg(long = "no-log", action = ArgAction::SetFalse)]
    pub open_log: bool,

    /// Nivel de log: 0 debug, 1 info, 2 warn, 3 error
    #[arg(long = "log-level", default_value = "1", env = "LOG_LEVEL")]
    pub log_level: u8,

    /// Capacidad de la cola de log asíncrona (0 = log síncrono)
    #[arg(long = "log-queue", default_value = "1024", env = "LOG_QUEUE")]
    pub log_queue_size: usize,

    // === Archivos ===

    /// Directorio de recursos estáticos
    #[arg(long = "resources", default_value = "./resources", env = "RESOURCES_DIR")]
    pub resources_dir: PathBuf,

    /// Archivo JSON con los usuarios registrados
    #[arg(long = "users", default_value = "./data/users.json", env = "USERS_FILE")]
    pub users_file: PathBuf,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Dirección de bind (todas las interfaces)
    ///
    /// # Ejemplo
    /// ```rust
    /// use reactor_http::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:1316");
    /// ```
    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// El listener usa edge-triggered (modos 2 y 3)
    pub fn listen_edge(&self) -> bool {
        matches!(self.trig_mode, 2 | 3)
    }

    /// Las conexiones usan edge-triggered (modos 1 y 3)
    pub fn conn_edge(&self) -> bool {
        matches!(self.trig_mode, 1 | 3)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.port != 0 && self.port < 1024 {
            return Err(format!("Port must be >= 1024 (got {})", self.port));
        }
        if self.trig_mode > 3 {
            return Err(format!("Trigger mode must be 0-3 (got {})", self.trig_mode));
        }
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.auth_pool_size == 0 {
            return Err("Auth pool size must be >= 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("Max connections must be >= 1".to_string());
        }
        if self.log_level > 3 {
            return Err(format!("Log level must be 0-3 (got {})", self.log_level));
        }
        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        let mode = |edge: bool| if edge { "ET" } else { "LT" };
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║              Reactor HTTP/1.1 Server Configuration           ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!(
            "   Trigger:      listen {} / conn {} (mode {})",
            mode(self.listen_edge()),
            mode(self.conn_edge()),
            self.trig_mode
        );
        println!("   Linger:       {}", if self.linger { "on (1s)" } else { "off" });
        if self.timeout_ms > 0 {
            println!("   Idle timeout: {} ms", self.timeout_ms);
        } else {
            println!("   Idle timeout: disabled");
        }
        println!("   Max conn:     {}", self.max_connections);
        println!();
        println!("👷 Pools:");
        println!("   Workers:      {}", self.workers);
        println!("   Auth pool:    {}", self.auth_pool_size);
        println!();
        println!("📁 Files:");
        println!("   Resources:    {}", self.resources_dir.display());
        println!("   Users:        {}", self.users_file.display());
        println!();
        println!("📝 Log:");
        if self.open_log {
            println!("   Level:        {}", self.log_level);
            if self.log_queue_size > 0 {
                println!("   Queue:        async ({} entries)", self.log_queue_size);
            } else {
                println!("   Queue:        sync");
            }
        } else {
            println!("   disabled");
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 1316,
            trig_mode: 3,
            timeout_ms: 60_000,
            linger: false,
            workers: 6,
            auth_pool_size: 12,
            max_connections: 65_535,
            open_log: true,
            log_level: 1,
            log_queue_size: 1024,
            resources_dir: PathBuf::from("./resources"),
            users_file: PathBuf::from("./data/users.json"),
        }
    }
}
