//! # Buffer de Bytes
//! src/buffer/byte_buffer.rs
//!
//! Implementa `ByteBuffer`, un `Vec<u8>` con dos cursores. Los bytes ya
//! consumidos al inicio (prependable) se recuperan compactando antes de
//! pedir más memoria.

use std::io;
use std::os::fd::RawFd;

/// Tamaño inicial de cada buffer
const INITIAL_SIZE: usize = 1024;

/// Tamaño del área auxiliar en el stack usada por `read_from_fd`
const SCRATCH_SIZE: usize = 65535;

/// Errores de operación sobre el buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Se pidió avanzar un cursor más allá de los datos disponibles
    #[error("out of range: requested {requested} bytes, only {available} available")]
    OutOfRange { requested: usize, available: usize },
}

/// Buffer crecible con cursores de lectura y escritura
///
/// Invariante: `read_pos <= write_pos <= buf.len()`.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl ByteBuffer {
    /// Crea un buffer con la capacidad por defecto (1 KiB)
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SIZE)
    }

    /// Crea un buffer con una capacidad inicial específica
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    // === Tamaños de cada zona ===

    /// Bytes listos para leer: `[read_pos, write_pos)`
    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Espacio libre al final: `[write_pos, capacity)`
    pub fn writable_bytes(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    /// Espacio ya consumido al inicio: `[0, read_pos)`
    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    /// Capacidad total reservada
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    // === Lectura ===

    /// Datos sin consumir (no avanza el cursor)
    pub fn peek(&self) -> &[u8] {
        &self.buf[self.read_pos..self.write_pos]
    }

    /// Posición de la primera aparición de `pattern` dentro de `peek()`
    pub fn find(&self, pattern: &[u8]) -> Option<usize> {
        find_bytes(self.peek(), pattern)
    }

    /// Avanza el cursor de lectura `len` bytes
    ///
    /// # Errores
    ///
    /// `OutOfRange` si `len` supera los bytes legibles. El buffer no cambia.
    pub fn retrieve(&mut self, len: usize) -> Result<(), BufferError> {
        let available = self.readable_bytes();
        if len > available {
            return Err(BufferError::OutOfRange {
                requested: len,
                available,
            });
        }
        self.read_pos += len;
        Ok(())
    }

    /// Consume todo hasta `marker` inclusive y devuelve lo que había antes
    ///
    /// Retorna `None` (sin consumir nada) si el marcador no está presente.
    pub fn retrieve_until(&mut self, marker: &[u8]) -> Option<Vec<u8>> {
        let pos = self.find(marker)?;
        let data = self.peek()[..pos].to_vec();
        self.read_pos += pos + marker.len();
        Some(data)
    }

    /// Descarta todo el contenido y reinicia ambos cursores
    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Consume todo el contenido y lo devuelve como `String`
    pub fn retrieve_all_to_string(&mut self) -> String {
        let text = String::from_utf8_lossy(self.peek()).into_owned();
        self.retrieve_all();
        text
    }

    // === Escritura ===

    /// Zona escribible para llenarla desde fuera (seguido de `has_written`)
    pub fn begin_write(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_pos..]
    }

    /// Avanza el cursor de escritura tras un llenado externo
    pub fn has_written(&mut self, len: usize) -> Result<(), BufferError> {
        let available = self.writable_bytes();
        if len > available {
            return Err(BufferError::OutOfRange {
                requested: len,
                available,
            });
        }
        self.write_pos += len;
        Ok(())
    }

    /// Agrega bytes al final, creciendo si hace falta
    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        self.buf[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }

    /// Agrega un string al final
    pub fn append_str(&mut self, data: &str) {
        self.append(data.as_bytes());
    }

    /// Garantiza que haya al menos `len` bytes escribibles
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() < len {
            self.make_space(len);
        }
    }

    /// Compacta si alcanza con el espacio prependable; si no, crece justo lo necesario
    fn make_space(&mut self, len: usize) {
        if self.writable_bytes() + self.prependable_bytes() < len {
            self.buf.resize(self.write_pos + len, 0);
        } else {
            let readable = self.readable_bytes();
            self.buf.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        }
    }

    // === I/O sobre descriptores ===

    /// Lee del descriptor con un único `readv`
    ///
    /// El primer segmento es la zona escribible del buffer y el segundo un
    /// área de 64 KiB en el stack; lo que desborda se agrega con `append`.
    ///
    /// # Retorna
    ///
    /// * `Ok(n)` - bytes leídos (0 = el peer cerró)
    /// * `Err(e)` - error del sistema (incluye `WouldBlock`)
    pub fn read_from_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut scratch = [0u8; SCRATCH_SIZE];
        let writable = self.writable_bytes();

        let iov = [
            libc::iovec {
                iov_base: self.buf[self.write_pos..].as_mut_ptr() as *mut libc::c_void,
                iov_len: writable,
            },
            libc::iovec {
                iov_base: scratch.as_mut_ptr() as *mut libc::c_void,
                iov_len: scratch.len(),
            },
        ];

        let n = unsafe { libc::readv(fd, iov.as_ptr(), iov.len() as libc::c_int) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let n = n as usize;
        if n <= writable {
            self.write_pos += n;
        } else {
            self.write_pos = self.buf.len();
            self.append(&scratch[..n - writable]);
        }
        Ok(n)
    }

    /// Escribe los bytes legibles al descriptor, avanzando lo realmente enviado
    pub fn write_to_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let readable = self.peek();
        let n = unsafe {
            libc::write(
                fd,
                readable.as_ptr() as *const libc::c_void,
                readable.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        self.read_pos += n as usize;
        Ok(n as usize)
    }
}

/// Posición de la primera aparición de `needle` en `haystack`
///
/// Un `needle` vacío aparece en la posición 0.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    // ==================== Cursores ====================

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = ByteBuffer::new();
        assert_eq!(buf.readable_bytes(), 0);
        assert_eq!(buf.writable_bytes(), 1024);
        assert_eq!(buf.prependable_bytes(), 0);
    }

    #[test]
    fn test_append_and_peek() {
        let mut buf = ByteBuffer::new();
        buf.append(b"hello");
        assert_eq!(buf.peek(), b"hello");
        assert_eq!(buf.readable_bytes(), 5);
        assert_eq!(buf.writable_bytes(), 1019);
    }

    #[test]
    fn test_retrieve_advances_read_cursor() {
        let mut buf = ByteBuffer::new();
        buf.append(b"hello world");
        buf.retrieve(6).unwrap();
        assert_eq!(buf.peek(), b"world");
        assert_eq!(buf.prependable_bytes(), 6);
    }

    #[test]
    fn test_retrieve_out_of_range() {
        let mut buf = ByteBuffer::new();
        buf.append(b"abc");
        let result = buf.retrieve(4);
        assert_eq!(
            result,
            Err(BufferError::OutOfRange {
                requested: 4,
                available: 3
            })
        );
        // El buffer no debe cambiar
        assert_eq!(buf.peek(), b"abc");
    }

    #[test]
    fn test_has_written_out_of_range() {
        let mut buf = ByteBuffer::with_capacity(8);
        assert!(buf.has_written(9).is_err());
        buf.begin_write()[..3].copy_from_slice(b"xyz");
        buf.has_written(3).unwrap();
        assert_eq!(buf.peek(), b"xyz");
    }

    #[test]
    fn test_retrieve_until_marker() {
        let mut buf = ByteBuffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x\r\n");
        let line = buf.retrieve_until(b"\r\n").unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
        assert_eq!(buf.peek(), b"Host: x\r\n");
        assert!(buf.retrieve_until(b"\r\n\r\n").is_none());
    }

    #[test]
    fn test_find_bytes_on_slices() {
        assert_eq!(find_bytes(b"GET / HTTP/1.1\r\n", b"\r\n"), Some(14));
        assert_eq!(find_bytes(b"sin fin", b"\r\n"), None);
        assert_eq!(find_bytes(b"abc", b""), Some(0));
        assert_eq!(find_bytes(b"", b"x"), None);
    }

    #[test]
    fn test_retrieve_all_to_string() {
        let mut buf = ByteBuffer::new();
        buf.append_str("payload");
        assert_eq!(buf.retrieve_all_to_string(), "payload");
        assert_eq!(buf.readable_bytes(), 0);
        assert_eq!(buf.prependable_bytes(), 0);
    }

    // ==================== Crecimiento ====================

    #[test]
    fn test_compaction_reuses_prependable_space() {
        let mut buf = ByteBuffer::with_capacity(16);
        buf.append(b"0123456789");
        buf.retrieve(8).unwrap();
        // 6 escribibles + 8 prependables alcanzan para 12 bytes
        buf.append(b"abcdefghijkl");
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.prependable_bytes(), 0);
        assert_eq!(buf.peek(), b"89abcdefghijkl");
    }

    #[test]
    fn test_growth_when_compaction_is_not_enough() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(b"1234");
        buf.append(b"abcdefghij");
        assert_eq!(buf.peek(), b"1234abcdefghij");
        assert_eq!(buf.capacity(), 14);
    }

    #[test]
    fn test_retrieve_conservation_property() {
        // Secuencia pseudo-aleatoria determinista de append/retrieve
        let mut buf = ByteBuffer::with_capacity(4);
        let mut seed: u32 = 12345;
        let mut appended = 0usize;
        let mut retrieved = 0usize;

        for _ in 0..2000 {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            let n = (seed >> 16) as usize % 97;
            if seed % 3 == 0 {
                let take = n.min(buf.readable_bytes());
                buf.retrieve(take).unwrap();
                retrieved += take;
            } else {
                buf.append(&vec![b'x'; n]);
                appended += n;
            }
            assert_eq!(buf.readable_bytes() + retrieved, appended);
            assert!(buf.prependable_bytes() + buf.readable_bytes() <= buf.capacity());
        }
    }

    // ==================== I/O ====================

    #[test]
    fn test_read_from_fd_overflows_into_scratch() {
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let payload: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        tx.write_all(&payload).unwrap();
        drop(tx);

        let mut buf = ByteBuffer::with_capacity(64);
        let mut total = 0;
        loop {
            let n = buf.read_from_fd(rx.as_raw_fd()).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, payload.len());
        assert_eq!(buf.peek(), &payload[..]);
    }

    #[test]
    fn test_write_to_fd_drains_readable() {
        let (tx, mut rx) = UnixStream::pair().unwrap();
        let mut buf = ByteBuffer::new();
        buf.append(b"response bytes");

        let n = buf.write_to_fd(tx.as_raw_fd()).unwrap();
        assert_eq!(n, 14);
        assert_eq!(buf.readable_bytes(), 0);
        drop(tx);

        let mut received = Vec::new();
        rx.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"response bytes");
    }

    #[test]
    fn test_read_from_fd_would_block() {
        let (_tx, rx) = UnixStream::pair().unwrap();
        rx.set_nonblocking(true).unwrap();
        let mut buf = ByteBuffer::new();
        let err = buf.read_from_fd(rx.as_raw_fd()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
