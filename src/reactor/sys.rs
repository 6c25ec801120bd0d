//! # Sockets a bajo nivel
//! src/reactor/sys.rs
//!
//! `std::net::TcpListener::bind` no permite fijar `SO_LINGER` ni el backlog,
//! así que el socket de escucha se arma a mano con `libc`.

use std::io;
use std::mem;
use std::net::TcpListener;
use std::os::fd::{FromRawFd, RawFd};

/// Backlog de `listen`
pub const LISTEN_BACKLOG: i32 = 128;

/// Crea un socket TCP no bloqueante escuchando en `0.0.0.0:port`
///
/// Aplica `SO_REUSEADDR` y, si `linger` es true, `SO_LINGER {1, 1}` para
/// que el cierre espere hasta 1 segundo a que salgan los datos pendientes.
///
/// # Errores
///
/// Retorna el error del sistema de la primera llamada que falle; el
/// descriptor se cierra en ese caso.
pub fn listen_socket(port: u16, linger: bool, backlog: i32) -> io::Result<TcpListener> {
    let fd = cvt(unsafe {
        libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0)
    })?;
    // A partir de aquí el listener es dueño del fd y lo cierra si algo falla
    let listener = unsafe { TcpListener::from_raw_fd(fd) };

    if linger {
        let value = libc::linger {
            l_onoff: 1,
            l_linger: 1,
        };
        set_option(fd, libc::SOL_SOCKET, libc::SO_LINGER, &value)?;
    }

    let reuse: libc::c_int = 1;
    set_option(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &reuse)?;

    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_addr.s_addr = u32::from(std::net::Ipv4Addr::UNSPECIFIED).to_be();
    addr.sin_port = port.to_be();

    cvt(unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })?;
    cvt(unsafe { libc::listen(fd, backlog) })?;

    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn set_option<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}
