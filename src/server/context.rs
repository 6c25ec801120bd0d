//! # Contexto Compartido
//! src/server/context.rs
//!
//! Servicios que el servidor inyecta en cada tarea: reactor para re-armar
//! interés, autenticador, origen de archivos, estadísticas y el canal de
//! comandos hacia el thread del reactor. Los tests pueden construirlo con
//! dobles de prueba.

use super::connection::Connection;
use super::slab::Handle;
use crate::auth::Authenticator;
use crate::http::FileSource;
use crate::metrics::ServerStats;
use crate::reactor::{Interest, Reactor, ReactorError};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pedidos que solo el thread del reactor puede ejecutar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Cerrar la conexión (error de I/O, peer cerró, fin sin keep-alive)
    Close(Handle),

    /// Cerrar por inactividad (lo dispara el heap de timers)
    Evict(Handle),
}

/// Servicios compartidos por el reactor y los workers
pub struct ServerContext {
    pub reactor: Arc<Reactor>,
    pub auth: Arc<dyn Authenticator>,
    pub files: Arc<dyn FileSource>,
    pub stats: ServerStats,
    pub src_dir: PathBuf,

    /// Flags de interés para conexiones (ONESHOT | RDHUP, + ET según el modo)
    pub conn_interest: Interest,

    commands: Sender<Command>,
}

impl ServerContext {
    pub fn new(
        reactor: Arc<Reactor>,
        auth: Arc<dyn Authenticator>,
        files: Arc<dyn FileSource>,
        stats: ServerStats,
        src_dir: PathBuf,
        conn_interest: Interest,
        commands: Sender<Command>,
    ) -> Self {
        Self {
            reactor,
            auth,
            files,
            stats,
            src_dir,
            conn_interest,
            commands,
        }
    }

    /// Encola un comando para el reactor y lo despierta
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            // El reactor ya terminó; no hay nadie a quien avisar
            return;
        }
        if let Err(e) = self.reactor.wake() {
            warn!(error = %e, "failed to wake reactor");
        }
    }

    /// Vuelve a armar el interés ONESHOT de una conexión
    ///
    /// Si el reactor ya la quitó (cierre concurrente) no hace nada.
    pub fn rearm(&self, conn: &Connection, ready: Interest) {
        if conn.is_closed() {
            return;
        }
        let token = conn.handle().to_token();
        match self
            .reactor
            .modify_interest(conn.fd(), token, self.conn_interest | ready)
        {
            Ok(()) | Err(ReactorError::NotRegistered(_)) => {}
            Err(e) => {
                debug!(handle = %conn.handle(), error = %e, "rearm failed");
                self.request_close(conn.handle());
            }
        }
    }

    pub fn request_close(&self, handle: Handle) {
        self.send(Command::Close(handle));
    }

    /// Emisor extra, para callbacks de timers
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands.clone()
    }
}
