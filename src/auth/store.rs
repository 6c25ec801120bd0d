//! # Almacén de Usuarios
//! src/auth/store.rs
//!
//! Archivo JSON `{ "usuario": "sha256 hex" }` cargado al arrancar y
//! reescrito de forma atómica (archivo temporal + rename) en cada registro.
//! El hash es SHA-256 de `usuario:contraseña`.

use super::Authenticator;
use crate::pool::{PoolError, ResourcePool};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tiempo máximo esperando una sesión libre
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errores del almacén de usuarios
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("user store pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Tabla de usuarios compartida por todas las sesiones
struct UserTable {
    path: PathBuf,
    users: Mutex<HashMap<String, String>>,
}

impl UserTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, users: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, users)?;
        writer.flush()?;

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Sesión prestada por el pool; todas las consultas pasan por aquí
pub struct StoreSession {
    id: usize,
    table: Arc<UserTable>,
    queries: u64,
}

impl StoreSession {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Consultas atendidas por esta sesión
    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Digest guardado para `user`
    pub fn find(&mut self, user: &str) -> Option<String> {
        self.queries += 1;
        self.table.lock().get(user).cloned()
    }

    /// Registra `user` si el nombre está libre
    ///
    /// # Retorna
    ///
    /// `Ok(false)` si el usuario ya existía; `Ok(true)` si quedó persistido.
    ///
    /// # Errores
    ///
    /// Si falla la escritura el registro se deshace y se retorna el error.
    pub fn insert(&mut self, user: &str, digest: String) -> Result<bool, AuthError> {
        self.queries += 1;
        let mut users = self.table.lock();
        if users.contains_key(user) {
            return Ok(false);
        }
        users.insert(user.to_string(), digest);
        if let Err(e) = self.table.save(&users) {
            users.remove(user);
            return Err(e);
        }
        Ok(true)
    }
}

/// Almacén de usuarios con pool acotado de sesiones
pub struct UserStore {
    table: Arc<UserTable>,
    pool: ResourcePool<StoreSession>,
}

impl UserStore {
    /// Abre (o crea vacío) el almacén en `path` con `pool_size` sesiones
    ///
    /// # Errores
    ///
    /// - `AuthError::Io` si el archivo existe pero no se puede leer
    /// - `AuthError::Json` si el contenido no es un mapa JSON válido
    /// - `AuthError::Pool` si `pool_size == 0`
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, AuthError> {
        let path = path.as_ref().to_path_buf();
        let users: HashMap<String, String> = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            HashMap::new()
        };

        info!(users = users.len(), path = %path.display(), "user store loaded");

        let table = Arc::new(UserTable {
            path,
            users: Mutex::new(users),
        });
        let pool = ResourcePool::new(pool_size, |id| StoreSession {
            id,
            table: Arc::clone(&table),
            queries: 0,
        })?;

        Ok(Self { table, pool })
    }

    /// Cantidad de usuarios registrados
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pool_size(&self) -> usize {
        self.pool.capacity()
    }

    /// SHA-256 hex de `usuario:contraseña`
    pub fn digest(user: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl Authenticator for UserStore {
    fn verify(&self, user: &str, password: &str, is_login: bool) -> bool {
        if user.is_empty() || password.is_empty() {
            return false;
        }

        let mut session = match self.pool.acquire(ACQUIRE_TIMEOUT) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "no user store session available");
                return false;
            }
        };

        let digest = Self::digest(user, password);
        let ok = if is_login {
            session.find(user).is_some_and(|stored| stored == digest)
        } else {
            match session.insert(user, digest) {
                Ok(created) => created,
                Err(e) => {
                    warn!(user, error = %e, "failed to persist new user");
                    false
                }
            }
        };

        debug!(user, is_login, ok, session = session.id(), "credentials checked");
        ok
    }
}
