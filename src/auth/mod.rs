//! # Autenticación
//! src/auth/mod.rs
//!
//! El parser de requests solo conoce el trait `Authenticator`. La
//! implementación real es `UserStore`, un almacén JSON de usuarios con
//! contraseñas hasheadas, accedido a través de un pool acotado de sesiones.

pub mod store;

pub use store::{AuthError, StoreSession, UserStore};

/// Verificación de credenciales
///
/// Se llama desde los workers y puede bloquear (I/O de disco, espera por
/// una sesión libre del pool).
pub trait Authenticator: Send + Sync {
    /// `is_login = true` valida un login; `false` intenta registrar al usuario
    fn verify(&self, user: &str, password: &str, is_login: bool) -> bool;
}

/// Rechaza todo: para servidores sin almacén de usuarios y para tests
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn verify(&self, _user: &str, _password: &str, _is_login: bool) -> bool {
        false
    }
}
