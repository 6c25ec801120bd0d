//! # Módulo de Buffers
//! src/buffer/mod.rs
//!
//! Buffer de bytes crecible con cursores independientes de lectura y
//! escritura. Cada conexión usa dos: uno para lo que llega del socket y
//! otro para la respuesta que se va a enviar.
//!
//! ```text
//! +-------------------+------------------+------------------+
//! | prependable bytes |  readable bytes  |  writable bytes  |
//! |                   |     (CONTENT)    |                  |
//! +-------------------+------------------+------------------+
//! 0      <=      read_pos    <=     write_pos    <=     capacity
//! ```

pub mod byte_buffer;

pub use byte_buffer::{find_bytes, BufferError, ByteBuffer};
