//! # Conexión HTTP
//! src/server/connection.rs
//!
//! Estado de un cliente: socket, buffers de lectura y escritura, el request
//! en parseo y la respuesta en envío. El interés ONESHOT del reactor
//! garantiza que a lo sumo un worker toca la conexión a la vez, así que el
//! mutex interno nunca se disputa; existe para que `Connection` sea `Sync`.

use super::context::ServerContext;
use super::slab::Handle;
use crate::buffer::ByteBuffer;
use crate::http::{ParseStatus, Request, Response, StatusCode};
use crate::metrics::ServerStats;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};

/// En modo LT se deja de escribir cuando quedan menos bytes que esto
pub const LOW_WATER: usize = 10 * 1024;

/// Resultado de un intento de escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Ambos segmentos enviados
    Done,

    /// Quedan bytes; hay que esperar a que el socket sea escribible
    Pending,
}

struct ConnIo {
    read_buf: ByteBuffer,
    write_buf: ByteBuffer,
    request: Request,
    response: Response,
    file_sent: usize,
}

/// Un cliente conectado
pub struct Connection {
    stream: TcpStream,
    fd: RawFd,
    peer: SocketAddr,
    handle: Handle,
    edge: bool,
    closed: AtomicBool,
    active_tasks: AtomicUsize,
    io: Mutex<ConnIo>,
}

impl Connection {
    /// Envuelve un socket ya aceptado (debe estar en modo no bloqueante)
    pub fn new(stream: TcpStream, peer: SocketAddr, handle: Handle, edge: bool) -> Self {
        let fd = stream.as_raw_fd();
        Self {
            stream,
            fd,
            peer,
            handle,
            edge,
            closed: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            io: Mutex::new(ConnIo {
                read_buf: ByteBuffer::new(),
                write_buf: ByteBuffer::new(),
                request: Request::new(),
                response: Response::new(),
                file_sent: 0,
            }),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marca la conexión como cerrada; `true` solo la primera vez
    ///
    /// El descriptor se libera cuando se suelta el último `Arc`, de modo
    /// que una tarea en curso nunca escribe sobre un fd reutilizado.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    fn lock_io(&self) -> MutexGuard<'_, ConnIo> {
        self.io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lee del socket hacia el buffer de entrada
    ///
    /// En modo ET lee hasta vaciar el socket.
    ///
    /// # Retorna
    ///
    /// * `Ok(n)` - bytes leídos (puede ser 0 si no había nada)
    /// * `Err(UnexpectedEof)` - el peer cerró sin mandar nada nuevo
    /// * `Err(e)` - error del socket
    pub fn read(&self) -> io::Result<usize> {
        let mut state = self.lock_io();
        let mut total = 0;

        loop {
            match state.read_buf.read_from_fd(self.fd) {
                Ok(0) if total == 0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                // Medio cierre: procesar lo recibido, el próximo read verá el EOF
                Ok(0) => return Ok(total),
                Ok(n) => {
                    total += n;
                    if !self.edge {
                        return Ok(total);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Parsea un request del buffer de entrada y arma la respuesta
    ///
    /// Un request mal formado produce un 400 sin keep-alive y descarta lo
    /// que quedaba en el buffer.
    ///
    /// # Retorna
    ///
    /// `true` si hay una respuesta lista para escribir, `false` si faltan
    /// bytes del request.
    pub fn process(&self, ctx: &ServerContext) -> bool {
        let mut guard = self.lock_io();
        let state = &mut *guard;

        if state.read_buf.readable_bytes() == 0 {
            return false;
        }

        let started = Instant::now();
        match state.request.parse(&mut state.read_buf, ctx.auth.as_ref()) {
            Ok(ParseStatus::Incomplete) => return false,
            Ok(ParseStatus::Complete) => {
                debug!(
                    handle = %self.handle,
                    method = state.request.method(),
                    path = state.request.path(),
                    "request parsed"
                );
                state.response.init(
                    &ctx.src_dir,
                    state.request.path(),
                    state.request.is_keep_alive(),
                    None,
                );
            }
            Err(e) => {
                warn!(handle = %self.handle, peer = %self.peer, error = %e, "bad request");
                state.read_buf.retrieve_all();
                state.response
                    .init(&ctx.src_dir, "", false, Some(StatusCode::BadRequest));
            }
        }

        state.write_buf.retrieve_all();
        state.response.make_response(&mut state.write_buf, ctx.files.as_ref());
        state.file_sent = 0;

        let code = state.response.code().map_or(0, |code| code.as_u16());
        ctx.stats.record_response(code, started.elapsed());
        true
    }

    /// Envía headers y archivo con `writev`
    ///
    /// Los bytes enviados avanzan primero sobre los headers y después
    /// sobre el archivo. En modo LT corta cuando lo pendiente baja de
    /// `LOW_WATER` y devuelve `Pending`.
    pub fn write(&self) -> io::Result<WriteStatus> {
        let mut guard = self.lock_io();
        let state = &mut *guard;

        loop {
            let sent = state.file_sent;
            let header = state.write_buf.peek();
            let file = state
                .response
                .file()
                .map_or(&[][..], |bytes| &bytes[sent.min(bytes.len())..]);
            let header_len = header.len();
            let remaining = header_len + file.len();

            if remaining == 0 {
                state.response.unmap_file();
                return Ok(WriteStatus::Done);
            }

            let iov = [
                libc::iovec {
                    iov_base: header.as_ptr() as *mut libc::c_void,
                    iov_len: header_len,
                },
                libc::iovec {
                    iov_base: file.as_ptr() as *mut libc::c_void,
                    iov_len: file.len(),
                },
            ];

            let n = unsafe { libc::writev(self.fd, iov.as_ptr(), iov.len() as libc::c_int) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return Ok(WriteStatus::Pending),
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(err),
                }
            }

            let n = n as usize;
            if n > header_len {
                state.file_sent += n - header_len;
                state.write_buf.retrieve_all();
            } else {
                state.write_buf.retrieve(n).map_err(io::Error::other)?;
            }

            let left = remaining - n;
            if left == 0 {
                state.response.unmap_file();
                return Ok(WriteStatus::Done);
            }
            if !self.edge && left <= LOW_WATER {
                return Ok(WriteStatus::Pending);
            }
        }
    }

    /// La última respuesta pidió mantener la conexión
    pub fn is_keep_alive(&self) -> bool {
        self.lock_io().response.keep_alive()
    }

    /// Bytes pendientes de enviar (headers + archivo)
    pub fn to_write_bytes(&self) -> usize {
        let state = self.lock_io();
        let file_left = state.response.file_len().saturating_sub(state.file_sent);
        state.write_buf.readable_bytes() + file_left
    }

    /// Marca el inicio de una tarea sobre esta conexión
    ///
    /// Registra en `stats` cuántas tareas corren a la vez; con ONESHOT
    /// nunca debería pasar de 1.
    pub fn enter_task<'a>(&'a self, stats: &'a ServerStats) -> TaskGuard<'a> {
        let running = self.active_tasks.fetch_add(1, Ordering::AcqRel) + 1;
        stats.record_task_overlap(running);
        TaskGuard { conn: self }
    }
}

/// Decrementa el contador de tareas activas al soltarse
pub struct TaskGuard<'a> {
    conn: &'a Connection,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.conn.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}
