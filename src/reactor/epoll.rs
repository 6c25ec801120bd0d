//! # Reactor basado en `epoll`
//! src/reactor/epoll.rs
//!
//! Responsabilidades:
//! - Registrar, modificar y quitar descriptores con su máscara de interés
//! - Bloquear esperando readiness con timeout opcional
//! - Despertar el `wait` desde otros threads vía un `eventfd`
//!
//! `modify_interest` y `remove_interest` se pueden llamar desde cualquier
//! thread (los workers re-arman sus conexiones); `wait` solo lo llama el
//! thread del reactor.

use super::interest::Interest;
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Mutex;
use std::time::Duration;

/// Token reservado para el evento de wake-up. Nunca colisiona con los handles.
pub const WAKE_TOKEN: u64 = u64::MAX;

/// Cantidad de eventos por defecto que se recogen en cada `wait`
const DEFAULT_EVENTS: usize = 1024;

/// Errores del reactor
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    /// Error del sistema operativo (fatal para `wait`)
    #[error("reactor io error: {0}")]
    Io(#[from] io::Error),

    /// Se intentó modificar o quitar un descriptor que no está registrado
    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),

    /// Se intentó registrar dos veces el mismo descriptor
    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),
}

/// Un evento de readiness entregado por `wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Token asociado al registro (handle de la conexión o del listener)
    pub token: u64,

    /// Qué está listo (lectura, escritura, hangup, error)
    pub ready: Interest,
}

/// Buffer reutilizable de eventos para `wait`
pub struct Events {
    raw: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Itera sobre los eventos del último `wait`
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.raw[..self.len].iter().map(|raw| {
            let token = raw.u64;
            let bits = raw.events;
            Event {
                token,
                ready: Interest::from_bits(bits),
            }
        })
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENTS)
    }
}

/// Reactor: instancia de `epoll` + `eventfd` de wake-up + tabla de registros
pub struct Reactor {
    epoll: OwnedFd,
    waker: OwnedFd,
    registrations: Mutex<HashMap<RawFd, Interest>>,
}

impl Reactor {
    /// Crea el `epoll` y registra el `eventfd` de wake-up
    pub fn new() -> Result<Self, ReactorError> {
        let epoll = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let epoll = unsafe { OwnedFd::from_raw_fd(epoll) };

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let waker = unsafe { OwnedFd::from_raw_fd(eventfd) };

        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };
        let rc = unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                waker.as_raw_fd(),
                &mut event,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self {
            epoll,
            waker,
            registrations: Mutex::new(HashMap::new()),
        })
    }

    /// Registra un descriptor nuevo
    pub fn add_interest(
        &self,
        fd: RawFd,
        token: u64,
        interest: Interest,
    ) -> Result<(), ReactorError> {
        let mut registrations = self.lock_registrations();
        if registrations.contains_key(&fd) {
            return Err(ReactorError::AlreadyRegistered(fd));
        }
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)?;
        registrations.insert(fd, interest);
        Ok(())
    }

    /// Cambia la máscara de un descriptor registrado (re-arma los oneshot)
    pub fn modify_interest(
        &self,
        fd: RawFd,
        token: u64,
        interest: Interest,
    ) -> Result<(), ReactorError> {
        let mut registrations = self.lock_registrations();
        if !registrations.contains_key(&fd) {
            return Err(ReactorError::NotRegistered(fd));
        }
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)?;
        registrations.insert(fd, interest);
        Ok(())
    }

    /// Quita un descriptor del `epoll`
    pub fn remove_interest(&self, fd: RawFd) -> Result<(), ReactorError> {
        let mut registrations = self.lock_registrations();
        if registrations.remove(&fd).is_none() {
            return Err(ReactorError::NotRegistered(fd));
        }
        let rc = unsafe {
            libc::epoll_ctl(
                self.epoll.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Máscara con la que está registrado `fd`, si lo está
    pub fn interest_of(&self, fd: RawFd) -> Option<Interest> {
        self.lock_registrations().get(&fd).copied()
    }

    /// Cantidad de descriptores registrados (sin contar el wake-up)
    pub fn registered(&self) -> usize {
        self.lock_registrations().len()
    }

    /// Espera eventos de readiness
    ///
    /// `timeout = None` bloquea indefinidamente. Las interrupciones por
    /// señal (`EINTR`) se reintentan; los eventos de wake-up se consumen
    /// aquí y no se reportan.
    ///
    /// # Retorna
    ///
    /// La cantidad de eventos disponibles en `events`.
    pub fn wait(
        &self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> Result<usize, ReactorError> {
        let timeout_ms = timeout.map(duration_to_ms).unwrap_or(-1);

        let n = loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.epoll.as_raw_fd(),
                    events.raw.as_mut_ptr(),
                    events.raw.len() as libc::c_int,
                    timeout_ms,
                )
            };
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        };

        // Compactar quitando el evento de wake-up
        let mut kept = 0;
        for i in 0..n {
            let token = events.raw[i].u64;
            if token == WAKE_TOKEN {
                self.drain_waker();
                continue;
            }
            events.raw[kept] = events.raw[i];
            kept += 1;
        }
        events.len = kept;
        Ok(kept)
    }

    /// Despierta un `wait` bloqueado desde otro thread
    pub fn wake(&self) -> io::Result<()> {
        let buf: u64 = 1;
        let n = unsafe {
            libc::write(
                self.waker.as_raw_fd(),
                &buf as *const u64 as *const libc::c_void,
                8,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            // Contador saturado: ya hay un wake-up pendiente
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    fn drain_waker(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(
                self.waker.as_raw_fd(),
                &mut buf as *mut u64 as *mut libc::c_void,
                8,
            );
        }
    }

    fn ctl(
        &self,
        op: libc::c_int,
        fd: RawFd,
        token: u64,
        interest: Interest,
    ) -> Result<(), ReactorError> {
        let mut event = libc::epoll_event {
            events: interest.bits(),
            u64: token,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn lock_registrations(&self) -> std::sync::MutexGuard<'_, HashMap<RawFd, Interest>> {
        // Un panic en otro thread no deja la tabla a medio actualizar
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Redondea hacia arriba a milisegundos para no despertar antes del deadline
fn duration_to_ms(timeout: Duration) -> libc::c_int {
    let ms = timeout.as_nanos().div_ceil(1_000_000);
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_without_events() {
        let reactor = Reactor::new().unwrap();
        let mut events = Events::with_capacity(8);
        let n = reactor
            .wait(&mut events, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_readable_event_carries_token() {
        let reactor = Reactor::new().unwrap();
        let (mut tx, rx) = UnixStream::pair().unwrap();
        reactor
            .add_interest(rx.as_raw_fd(), 42, Interest::READABLE)
            .unwrap();

        tx.write_all(b"ping").unwrap();

        let mut events = Events::with_capacity(8);
        let n = reactor
            .wait(&mut events, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(n, 1);
        let event = events.iter().next().unwrap();
        assert_eq!(event.token, 42);
        assert!(event.ready.is_readable());
    }

    #[test]
    fn test_oneshot_disables_until_rearmed() {
        let reactor = Reactor::new().unwrap();
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        reactor
            .add_interest(fd, 7, Interest::READABLE | Interest::ONESHOT)
            .unwrap();
        tx.write_all(b"data").unwrap();

        let mut events = Events::with_capacity(8);
        assert_eq!(reactor.wait(&mut events, Some(Duration::from_millis(100))).unwrap(), 1);
        // Los datos siguen ahí pero el registro está deshabilitado
        assert_eq!(reactor.wait(&mut events, Some(Duration::from_millis(20))).unwrap(), 0);

        reactor
            .modify_interest(fd, 7, Interest::READABLE | Interest::ONESHOT)
            .unwrap();
        assert_eq!(reactor.wait(&mut events, Some(Duration::from_millis(100))).unwrap(), 1);
    }

    #[test]
    fn test_registration_table() {
        let reactor = Reactor::new().unwrap();
        let (_tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();

        assert!(matches!(
            reactor.modify_interest(fd, 1, Interest::READABLE),
            Err(ReactorError::NotRegistered(_))
        ));

        reactor.add_interest(fd, 1, Interest::READABLE).unwrap();
        assert!(matches!(
            reactor.add_interest(fd, 1, Interest::READABLE),
            Err(ReactorError::AlreadyRegistered(_))
        ));
        assert_eq!(reactor.interest_of(fd), Some(Interest::READABLE));

        reactor.modify_interest(fd, 1, Interest::WRITABLE).unwrap();
        assert_eq!(reactor.interest_of(fd), Some(Interest::WRITABLE));

        reactor.remove_interest(fd).unwrap();
        assert_eq!(reactor.registered(), 0);
        assert!(matches!(
            reactor.remove_interest(fd),
            Err(ReactorError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_wake_interrupts_blocking_wait() {
        let reactor = Arc::new(Reactor::new().unwrap());
        let waker = Arc::clone(&reactor);

        let start = Instant::now();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            waker.wake().unwrap();
        });

        let mut events = Events::with_capacity(8);
        let n = reactor
            .wait(&mut events, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_secs(5));
        t.join().unwrap();
    }

    #[test]
    fn test_duration_to_ms_rounds_up() {
        assert_eq!(duration_to_ms(Duration::from_micros(1)), 1);
        assert_eq!(duration_to_ms(Duration::from_millis(5)), 5);
        assert_eq!(duration_to_ms(Duration::ZERO), 0);
    }
}
