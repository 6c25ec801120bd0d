//! # Máscaras de Interés
//! src/reactor/interest.rs

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Máscara de interés / readiness de `epoll`
///
/// Se usa tanto para registrar descriptores como para describir los
/// eventos que entrega `Reactor::wait`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Interest(u32);

impl Interest {
    pub const NONE: Interest = Interest(0);

    /// Hay datos para leer (`EPOLLIN`)
    pub const READABLE: Interest = Interest(libc::EPOLLIN as u32);

    /// Se puede escribir sin bloquear (`EPOLLOUT`)
    pub const WRITABLE: Interest = Interest(libc::EPOLLOUT as u32);

    /// El peer cerró su mitad de la conexión (`EPOLLRDHUP`)
    pub const PEER_HANGUP: Interest = Interest(libc::EPOLLRDHUP as u32);

    /// Hangup (`EPOLLHUP`), siempre reportado por el kernel
    pub const HANGUP: Interest = Interest(libc::EPOLLHUP as u32);

    /// Error en el descriptor (`EPOLLERR`), siempre reportado por el kernel
    pub const ERROR: Interest = Interest(libc::EPOLLERR as u32);

    /// Modo edge-triggered (`EPOLLET`)
    pub const EDGE: Interest = Interest(libc::EPOLLET as u32);

    /// Deshabilitar tras una entrega (`EPOLLONESHOT`)
    pub const ONESHOT: Interest = Interest(libc::EPOLLONESHOT as u32);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        Interest(bits)
    }

    /// Verifica si contiene todos los bits de `other`
    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    pub fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Hangup del peer, hangup completo o error
    pub fn is_closed(self) -> bool {
        self.0 & (Self::PEER_HANGUP.0 | Self::HANGUP.0 | Self::ERROR.0) != 0
    }

    pub fn is_edge(self) -> bool {
        self.contains(Self::EDGE)
    }

    pub fn is_oneshot(self) -> bool {
        self.contains(Self::ONESHOT)
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::READABLE, "READABLE"),
            (Self::WRITABLE, "WRITABLE"),
            (Self::PEER_HANGUP, "PEER_HANGUP"),
            (Self::HANGUP, "HANGUP"),
            (Self::ERROR, "ERROR"),
            (Self::EDGE, "EDGE"),
            (Self::ONESHOT, "ONESHOT"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "Interest(NONE)")
        } else {
            write!(f, "Interest({})", set.join(" | "))
        }
    }
}
