//! # Servidor Web
//! src/server/webserver.rs
//!
//! Loop del reactor: un único thread espera readiness, acepta clientes,
//! expulsa conexiones inactivas y delega toda la I/O de los sockets a un
//! pool de workers. Las conexiones viven en un slab propiedad de este
//! thread; los workers reciben un `Arc<Connection>` y piden cierres por un
//! canal de comandos.

use super::connection::{Connection, WriteStatus};
use super::context::{Command, ServerContext};
use super::slab::{ConnectionSlab, Handle};
use crate::auth::{AuthError, Authenticator, UserStore};
use crate::config::Config;
use crate::http::{DiskFiles, FileSource};
use crate::metrics::ServerStats;
use crate::pool::{PoolError, WorkerPool};
use crate::reactor::sys::{listen_socket, LISTEN_BACKLOG};
use crate::reactor::{Events, Interest, Reactor, ReactorError};
use crate::timer::TimerHeap;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Token del socket de escucha (los handles nunca llegan a este valor)
pub const LISTEN_TOKEN: u64 = u64::MAX - 1;

/// Mensaje enviado a los clientes que exceden `max_connections`
const BUSY_MESSAGE: &[u8] = b"Server Busy!";

/// Errores de arranque y del loop del servidor
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("port {0} is reserved (use 0 or >= 1024)")]
    InvalidPort(u16),

    #[error("cannot listen: {0}")]
    Bind(io::Error),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Qué hacer con una conexión cuando termina una tarea
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Read,
    Write,
    Close,
}

/// Servidor HTTP con reactor `epoll` y pool de workers
pub struct Server {
    config: Config,
    listener: TcpListener,
    listen_interest: Interest,
    ctx: Arc<ServerContext>,
    pool: WorkerPool,
    timer: TimerHeap<Handle>,
    slab: ConnectionSlab<Arc<Connection>>,
    commands: Receiver<Command>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Crea el servidor con los servicios por defecto: usuarios en
    /// `config.users_file` y archivos servidos desde disco
    ///
    /// # Errores
    ///
    /// - `ServerError::Config` / `InvalidPort` si la configuración no valida
    /// - `ServerError::Auth` si el almacén de usuarios no se puede abrir
    /// - `ServerError::Bind` si no se puede escuchar en el puerto
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let auth = UserStore::open(&config.users_file, config.auth_pool_size)?;
        Self::with_services(config, Arc::new(auth), Arc::new(DiskFiles))
    }

    /// Crea el servidor con autenticador y origen de archivos propios
    pub fn with_services(
        config: Config,
        auth: Arc<dyn Authenticator>,
        files: Arc<dyn FileSource>,
    ) -> Result<Self, ServerError> {
        if config.port != 0 && config.port < 1024 {
            return Err(ServerError::InvalidPort(config.port));
        }
        config.validate().map_err(ServerError::Config)?;

        let listener =
            listen_socket(config.port, config.linger, LISTEN_BACKLOG).map_err(ServerError::Bind)?;

        let mut listen_interest = Interest::PEER_HANGUP;
        let mut conn_interest = Interest::ONESHOT | Interest::PEER_HANGUP;
        if config.listen_edge() {
            listen_interest |= Interest::EDGE;
        }
        if config.conn_edge() {
            conn_interest |= Interest::EDGE;
        }

        let reactor = Arc::new(Reactor::new()?);
        reactor.add_interest(
            listener.as_raw_fd(),
            LISTEN_TOKEN,
            listen_interest | Interest::READABLE,
        )?;

        let pool = WorkerPool::new(config.workers)?;
        let (tx, rx) = mpsc::channel();
        let ctx = Arc::new(ServerContext::new(
            reactor,
            auth,
            files,
            ServerStats::new(),
            config.resources_dir.clone(),
            conn_interest,
            tx,
        ));

        let port = listener.local_addr().map(|addr| addr.port()).unwrap_or(config.port);
        info!(
            port,
            listen = if config.listen_edge() { "ET" } else { "LT" },
            conn = if config.conn_edge() { "ET" } else { "LT" },
            workers = config.workers,
            timeout_ms = config.timeout_ms,
            resources = %config.resources_dir.display(),
            "server init"
        );

        Ok(Self {
            config,
            listener,
            listen_interest,
            ctx,
            pool,
            timer: TimerHeap::new(),
            slab: ConnectionSlab::new(),
            commands: rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Dirección real de escucha (útil con el puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> ServerStats {
        self.ctx.stats.clone()
    }

    /// Handle para detener el servidor desde otro thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            reactor: Arc::clone(&self.ctx.reactor),
            stats: self.ctx.stats.clone(),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        (self.config.timeout_ms > 0).then(|| Duration::from_millis(self.config.timeout_ms))
    }

    /// Corre el loop del reactor hasta que se pida el shutdown
    ///
    /// # Errores
    ///
    /// `ServerError::Reactor` si `epoll_wait` falla de forma no recuperable.
    pub fn run(mut self) -> Result<(), ServerError> {
        info!(addr = ?self.local_addr().ok(), "server start");
        let mut events = Events::default();

        let result = loop {
            if self.shutdown.load(Ordering::Acquire) {
                break Ok(());
            }

            let mut wait_for = None;
            if self.timeout().is_some() {
                let expired = self.timer.tick();
                if expired > 0 {
                    debug!(expired, "idle timers fired");
                }
                self.drain_commands();
                wait_for = self.timer.next_deadline();
            }

            if let Err(e) = self.ctx.reactor.wait(&mut events, wait_for) {
                error!(error = %e, "reactor wait failed");
                break Err(e.into());
            }

            for event in events.iter() {
                if event.token == LISTEN_TOKEN {
                    self.accept_clients();
                    continue;
                }

                let handle = Handle::from_token(event.token);
                if event.ready.is_closed() {
                    self.close_conn(handle, false);
                } else if event.ready.is_readable() {
                    self.dispatch(handle, Next::Read);
                } else if event.ready.is_writable() {
                    self.dispatch(handle, Next::Write);
                } else {
                    warn!(handle = %handle, ready = ?event.ready, "unexpected event");
                }
            }

            self.drain_commands();
        };

        self.teardown();
        result
    }

    fn teardown(&mut self) {
        self.pool.shutdown();
        self.drain_commands();
        for handle in self.slab.handles() {
            self.close_conn(handle, false);
        }

        match self.ctx.stats.to_json() {
            Ok(json) => info!(stats = %json, "server stopped"),
            Err(e) => info!(error = %e, "server stopped"),
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Close(handle) => self.close_conn(handle, false),
                Command::Evict(handle) => self.close_conn(handle, true),
            }
        }
    }

    // === Accept ===

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.slab.len() >= self.config.max_connections {
                        self.reject(stream, peer);
                    } else {
                        self.add_client(stream, peer);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }

            if !self.listen_interest.is_edge() {
                return;
            }
        }
    }

    fn reject(&self, mut stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.write_all(BUSY_MESSAGE) {
            debug!(peer = %peer, error = %e, "busy message not delivered");
        }
        self.ctx.stats.record_reject();
        warn!(peer = %peer, users = self.slab.len(), "clients are full");
    }

    fn add_client(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(peer = %peer, error = %e, "cannot make socket non-blocking");
            return;
        }

        let edge = self.ctx.conn_interest.is_edge();
        let handle = self
            .slab
            .insert_with(|handle| Arc::new(Connection::new(stream, peer, handle, edge)));
        let Some(fd) = self.slab.get(handle).map(|conn| conn.fd()) else {
            return;
        };

        if let Some(timeout) = self.timeout() {
            let commands = self.ctx.command_sender();
            self.timer.add(handle, timeout, move || {
                let _ = commands.send(Command::Evict(handle));
            });
        }

        let interest = self.ctx.conn_interest | Interest::READABLE;
        if let Err(e) = self.ctx.reactor.add_interest(fd, handle.to_token(), interest) {
            warn!(fd, peer = %peer, error = %e, "cannot register client");
            let _ = self.timer.remove(handle);
            self.slab.remove(handle);
            return;
        }

        self.ctx.stats.record_accept();
        info!(fd, peer = %peer, users = self.ctx.stats.live_users(), "client in");
    }

    // === Dispatch ===

    fn dispatch(&mut self, handle: Handle, next: Next) {
        let Some(conn) = self.slab.get(handle).cloned() else {
            debug!(handle = %handle, "event for stale handle");
            return;
        };

        if let Some(timeout) = self.timeout() {
            let _ = self.timer.adjust(handle, timeout);
        }

        let ctx = Arc::clone(&self.ctx);
        let submitted = match next {
            Next::Read => self.pool.submit(move || on_read(&conn, &ctx)),
            Next::Write => self.pool.submit(move || on_write(&conn, &ctx)),
            Next::Close => Ok(()),
        };

        if let Err(e) = submitted {
            warn!(handle = %handle, error = %e, "cannot submit task");
            self.close_conn(handle, false);
        }
    }

    /// Cierra una conexión; llamadas repetidas con el mismo handle no hacen nada
    fn close_conn(&mut self, handle: Handle, evicted: bool) {
        let Some(conn) = self.slab.remove(handle) else {
            return;
        };

        if let Err(e) = self.ctx.reactor.remove_interest(conn.fd()) {
            debug!(handle = %handle, error = %e, "remove interest failed");
        }
        let _ = self.timer.remove(handle);
        conn.close();

        if evicted {
            self.ctx.stats.record_eviction();
        }
        self.ctx.stats.record_close();
        info!(
            fd = conn.fd(),
            peer = %conn.peer(),
            users = self.ctx.stats.live_users(),
            evicted,
            "client quit"
        );
    }
}

// === Tareas de los workers ===

fn on_read(conn: &Connection, ctx: &ServerContext) {
    if conn.is_closed() {
        return;
    }

    let next = {
        let _task = conn.enter_task(&ctx.stats);
        match conn.read() {
            Ok(_) => process_next(conn, ctx),
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    debug!(handle = %conn.handle(), error = %e, "read failed");
                }
                Next::Close
            }
        }
    };
    finish(conn, ctx, next);
}

fn on_write(conn: &Connection, ctx: &ServerContext) {
    if conn.is_closed() {
        return;
    }

    let next = {
        let _task = conn.enter_task(&ctx.stats);
        match conn.write() {
            Ok(WriteStatus::Done) if conn.is_keep_alive() => process_next(conn, ctx),
            Ok(WriteStatus::Done) => Next::Close,
            Ok(WriteStatus::Pending) => Next::Write,
            Err(e) => {
                debug!(handle = %conn.handle(), error = %e, "write failed");
                Next::Close
            }
        }
    };
    finish(conn, ctx, next);
}

fn process_next(conn: &Connection, ctx: &ServerContext) -> Next {
    if conn.process(ctx) {
        Next::Write
    } else {
        Next::Read
    }
}

fn finish(conn: &Connection, ctx: &ServerContext, next: Next) {
    match next {
        Next::Read => ctx.rearm(conn, Interest::READABLE),
        Next::Write => ctx.rearm(conn, Interest::WRITABLE),
        Next::Close => ctx.request_close(conn.handle()),
    }
}

/// Control remoto de un servidor corriendo en otro thread
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    reactor: Arc<Reactor>,
    stats: ServerStats,
}

impl ServerHandle {
    /// Pide al reactor que termine; `Server::run` retorna después de
    /// esperar a los workers y cerrar las conexiones abiertas
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.reactor.wake() {
            warn!(error = %e, "failed to wake reactor for shutdown");
        }
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DenyAll;
    use crate::http::files::testing::MemoryFiles;

    fn test_config() -> Config {
        Config {
            port: 0,
            timeout_ms: 0,
            workers: 2,
            open_log: false,
            ..Config::default()
        }
    }

    fn build(config: Config) -> Result<Server, ServerError> {
        Server::with_services(config, Arc::new(DenyAll), Arc::new(MemoryFiles::default()))
    }

    #[test]
    fn test_reserved_port_rejected() {
        let config = Config {
            port: 80,
            ..test_config()
        };
        assert!(matches!(build(config), Err(ServerError::InvalidPort(80))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            workers: 0,
            ..test_config()
        };
        assert!(matches!(build(config), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_trigger_mode_interests() {
        let modes = [
            (0, false, false),
            (1, false, true),
            (2, true, false),
            (3, true, true),
        ];
        for (mode, listen_edge, conn_edge) in modes {
            let server = build(Config {
                trig_mode: mode,
                ..test_config()
            })
            .unwrap();
            assert_eq!(server.listen_interest.is_edge(), listen_edge, "mode {}", mode);
            assert_eq!(server.ctx.conn_interest.is_edge(), conn_edge, "mode {}", mode);
            assert!(server.ctx.conn_interest.is_oneshot());
            assert!(server.ctx.conn_interest.contains(Interest::PEER_HANGUP));
        }
    }

    #[test]
    fn test_listener_registered_with_reactor() {
        let server = build(test_config()).unwrap();
        let fd = server.listener.as_raw_fd();
        let interest = server.ctx.reactor.interest_of(fd).unwrap();
        assert!(interest.is_readable());
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_close_conn_runs_once() {
        let mut server = build(test_config()).unwrap();
        let addr = server.local_addr().unwrap();
        let _client = TcpStream::connect(("127.0.0.1", addr.port())).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        server.accept_clients();
        assert_eq!(server.slab.len(), 1);
        let handle = server.slab.handles()[0];

        server.close_conn(handle, true);
        server.close_conn(handle, true);

        let snapshot = server.stats().snapshot();
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.evicted, 1);
        assert_eq!(snapshot.live_users, 0);
        assert_eq!(server.ctx.reactor.registered(), 1);
    }

    #[test]
    fn test_shutdown_before_run_returns() {
        let server = build(test_config()).unwrap();
        server.handle().shutdown();
        assert!(server.run().is_ok());
    }
}
