//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! La respuesta sale en dos segmentos para un único `writev`:
//!
//! 1. Headers, escritos en el buffer de escritura de la conexión
//! 2. Contenido del archivo, mapeado en memoria (opcional)
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Connection: keep-alive\r\n
//! keep-alive: max=6, timeout=120\r\n
//! Content-type: text/html\r\n
//! Content-length: 1024\r\n
//! \r\n
//! ```
//!
//! Si el recurso falta o no se puede leer, el código cambia a 404/403 y se
//! sirve la página de error correspondiente. Sin página de error, el body
//! HTML se arma en línea dentro del primer segmento.

use super::files::{FileBody, FileInfo, FileSource};
use super::StatusCode;
use crate::buffer::ByteBuffer;
use std::path::{Path, PathBuf};

/// Tipo de contenido por sufijo
const MIME_TYPES: [(&str, &str); 19] = [
    (".html", "text/html"),
    (".xml", "text/xml"),
    (".xhtml", "application/xhtml+xml"),
    (".txt", "text/plain"),
    (".rtf", "application/rtf"),
    (".pdf", "application/pdf"),
    (".word", "application/nsword"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".au", "audio/basic"),
    (".mpeg", "video/mpeg"),
    (".mpg", "video/mpeg"),
    (".avi", "video/x-msvideo"),
    (".gz", "application/x-gzip"),
    (".tar", "application/x-tar"),
    (".css", "text/css"),
    (".js", "text/javascript"),
];

const DEFAULT_MIME: &str = "text/plain";

/// Respuesta HTTP en construcción
#[derive(Debug, Default)]
pub struct Response {
    code: Option<StatusCode>,
    keep_alive: bool,
    path: String,
    src_dir: PathBuf,
    file: Option<FileBody>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepara la respuesta para un request nuevo
    ///
    /// `code = None` significa "decidir según el recurso". Suelta el
    /// archivo de la respuesta anterior.
    pub fn init(&mut self, src_dir: &Path, path: &str, keep_alive: bool, code: Option<StatusCode>) {
        self.unmap_file();
        self.src_dir = src_dir.to_path_buf();
        self.path = path.to_string();
        self.keep_alive = keep_alive;
        self.code = code;
    }

    /// Escribe status line y headers en `buf` y prepara el contenido
    ///
    /// El código final queda disponible en `code()`.
    pub fn make_response(&mut self, buf: &mut ByteBuffer, files: &dyn FileSource) {
        let status = match self.code {
            Some(code) if !code.is_success() => code,
            _ => {
                let info = files.inspect(&self.src_dir, &self.path);
                if !info.exists || info.is_dir {
                    StatusCode::NotFound
                } else if !info.readable {
                    StatusCode::Forbidden
                } else {
                    self.code.unwrap_or(StatusCode::Ok)
                }
            }
        };
        self.code = Some(status);

        if let Some(page) = status.error_page() {
            self.path = page.to_string();
        }

        self.add_state_line(buf, status);
        self.add_headers(buf);
        self.add_content(buf, files, status);
    }

    fn add_state_line(&self, buf: &mut ByteBuffer, status: StatusCode) {
        buf.append_str(&format!("HTTP/1.1 {}\r\n", status));
    }

    fn add_headers(&self, buf: &mut ByteBuffer) {
        buf.append_str("Connection: ");
        if self.keep_alive {
            buf.append_str("keep-alive\r\n");
            buf.append_str("keep-alive: max=6, timeout=120\r\n");
        } else {
            buf.append_str("close\r\n");
        }
        buf.append_str(&format!("Content-type: {}\r\n", self.file_type()));
    }

    fn add_content(&mut self, buf: &mut ByteBuffer, files: &dyn FileSource, status: StatusCode) {
        let info = files.inspect(&self.src_dir, &self.path);
        if !servable(&info) {
            self.error_content(buf, status, "File NotFound!");
            return;
        }

        match files.open(&self.src_dir, &self.path) {
            Ok(body) => {
                buf.append_str(&format!("Content-length: {}\r\n\r\n", body.len()));
                if !body.is_empty() {
                    self.file = Some(body);
                }
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "failed to open resource");
                self.error_content(buf, status, "File NotFound!");
            }
        }
    }

    /// Body HTML generado en línea cuando no hay archivo que servir
    pub fn error_content(&self, buf: &mut ByteBuffer, status: StatusCode, message: &str) {
        let body = format!(
            "<html><title>Error</title><body bgcolor=\"ffffff\">{} : {}\n<p>{}</p><hr><em>reactor_http</em></body></html>",
            status.as_u16(),
            status.reason_phrase(),
            message
        );
        buf.append_str(&format!("Content-length: {}\r\n\r\n", body.len()));
        buf.append_str(&body);
    }

    fn file_type(&self) -> &'static str {
        let Some(dot) = self.path.rfind('.') else {
            return DEFAULT_MIME;
        };
        let suffix = &self.path[dot..];
        MIME_TYPES
            .iter()
            .find(|(ext, _)| *ext == suffix)
            .map(|(_, mime)| *mime)
            .unwrap_or(DEFAULT_MIME)
    }

    /// Código final (después de `make_response`)
    pub fn code(&self) -> Option<StatusCode> {
        self.code
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Segundo segmento del `writev`, si hay archivo
    pub fn file(&self) -> Option<&[u8]> {
        self.file.as_ref().map(FileBody::as_bytes)
    }

    pub fn file_len(&self) -> usize {
        self.file.as_ref().map_or(0, FileBody::len)
    }

    /// Suelta el contenido mapeado
    pub fn unmap_file(&mut self) {
        self.file = None;
    }
}

fn servable(info: &FileInfo) -> bool {
    info.exists && !info.is_dir && info.readable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::files::testing::MemoryFiles;

    fn render(
        files: &MemoryFiles,
        path: &str,
        keep_alive: bool,
        code: Option<StatusCode>,
    ) -> (Response, String) {
        let mut response = Response::new();
        let mut buf = ByteBuffer::new();
        response.init(Path::new("/srv"), path, keep_alive, code);
        response.make_response(&mut buf, files);
        let head = buf.retrieve_all_to_string();
        (response, head)
    }

    // ==================== Recursos existentes ====================

    #[test]
    fn test_ok_response_with_file_segment() {
        let files = MemoryFiles::default().with_file("/index.html", b"<h1>hola</h1>");
        let (response, head) = render(&files, "/index.html", true, None);

        assert_eq!(response.code(), Some(StatusCode::Ok));
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\n\
             Connection: keep-alive\r\n\
             keep-alive: max=6, timeout=120\r\n\
             Content-type: text/html\r\n\
             Content-length: 13\r\n\r\n"
        );
        assert_eq!(response.file(), Some(&b"<h1>hola</h1>"[..]));
        assert_eq!(response.file_len(), 13);
    }

    #[test]
    fn test_connection_close_header() {
        let files = MemoryFiles::default().with_file("/a.css", b"body{}");
        let (_, head) = render(&files, "/a.css", false, None);
        assert!(head.contains("Connection: close\r\n"));
        assert!(!head.contains("keep-alive: max"));
        assert!(head.contains("Content-type: text/css\r\n"));
    }

    #[test]
    fn test_unknown_suffix_is_text_plain() {
        let files = MemoryFiles::default().with_file("/README", b"x").with_file("/data.bin", b"y");
        assert!(render(&files, "/README", false, None).1.contains("Content-type: text/plain"));
        assert!(render(&files, "/data.bin", false, None).1.contains("Content-type: text/plain"));
    }

    #[test]
    fn test_zero_length_file_has_no_segment() {
        let files = MemoryFiles::default().with_file("/empty.txt", b"");
        let (response, head) = render(&files, "/empty.txt", false, None);
        assert!(head.ends_with("Content-length: 0\r\n\r\n"));
        assert!(response.file().is_none());
    }

    // ==================== Errores ====================

    #[test]
    fn test_missing_resource_inline_404() {
        let files = MemoryFiles::default();
        let (response, head) = render(&files, "/nope.html", false, None);

        assert_eq!(response.code(), Some(StatusCode::NotFound));
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        let body = head.split("\r\n\r\n").nth(1).unwrap();
        assert!(!body.is_empty());
        assert!(body.contains("404"));
        assert!(response.file().is_none());
    }

    #[test]
    fn test_error_page_served_when_present() {
        let files = MemoryFiles::default().with_file("/404.html", b"<p>no existe</p>");
        let (response, head) = render(&files, "/nope.html", true, None);

        assert_eq!(response.code(), Some(StatusCode::NotFound));
        assert_eq!(response.path(), "/404.html");
        assert!(head.contains("Content-length: 16\r\n"));
        assert_eq!(response.file(), Some(&b"<p>no existe</p>"[..]));
    }

    #[test]
    fn test_directory_is_404() {
        let dir = FileInfo {
            exists: true,
            is_dir: true,
            readable: true,
            size: 0,
        };
        let files = MemoryFiles::default().with_entry("/videos", dir);
        let (response, _) = render(&files, "/videos", false, None);
        assert_eq!(response.code(), Some(StatusCode::NotFound));
    }

    #[test]
    fn test_unreadable_is_403() {
        let locked = FileInfo {
            exists: true,
            is_dir: false,
            readable: false,
            size: 4,
        };
        let files = MemoryFiles::default()
            .with_entry("/secret.html", locked)
            .with_file("/403.html", b"forbidden");
        let (response, head) = render(&files, "/secret.html", false, None);
        assert_eq!(response.code(), Some(StatusCode::Forbidden));
        assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert_eq!(response.file(), Some(&b"forbidden"[..]));
    }

    #[test]
    fn test_bad_request_skips_resource_check() {
        let files = MemoryFiles::default().with_file("/index.html", b"x");
        let (response, head) = render(&files, "", false, Some(StatusCode::BadRequest));
        assert_eq!(response.code(), Some(StatusCode::BadRequest));
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(head.contains("400 : Bad Request"));
    }

    #[test]
    fn test_init_releases_previous_file() {
        let files = MemoryFiles::default().with_file("/index.html", b"abc");
        let (mut response, _) = render(&files, "/index.html", false, None);
        assert!(response.file().is_some());

        response.init(Path::new("/srv"), "/other", false, None);
        assert!(response.file().is_none());
        assert_eq!(response.code(), None);
    }
}
