//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto mínimo de HTTP/1.1 que necesita el servidor:
//!
//! - Parsing incremental de requests sobre un `ByteBuffer`
//! - Decodificación de formularios urlencoded
//! - Construcción de respuestas en dos segmentos (headers + archivo)
//! - Acceso a archivos estáticos vía `FileSource`
//!
//! Sin chunked transfer-encoding, sin TLS, sin HTTP/2.
//!
//! ### Formato de Request
//!
//! ```text
//! GET /index HTTP/1.1\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```

pub mod files;
pub mod request;
pub mod response;
pub mod status;
pub mod urlencoded;

pub use files::{DiskFiles, FileBody, FileInfo, FileSource};
pub use request::{ParseError, ParseState, ParseStatus, Request};
pub use response::Response;
pub use status::StatusCode;
