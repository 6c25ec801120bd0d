//! # Parsing de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Máquina de estados sobre el buffer de lectura de la conexión:
//!
//! ```text
//! RequestLine ──► Headers ──► Body ──► Finished
//! ```
//!
//! Cada paso extrae una línea terminada en `\r\n`. Si todavía no llegó el
//! terminador, el parse se detiene sin error (`ParseStatus::Incomplete`) y
//! no consume nada: la próxima lectura agrega bytes y se vuelve a intentar
//! desde el principio. Solo cuando el request está completo se avanza el
//! cursor de lectura del buffer.
//!
//! ## Formato
//!
//! ```text
//! POST /login HTTP/1.1\r\n
//! Content-Type: application/x-www-form-urlencoded\r\n
//! Content-Length: 26\r\n
//! \r\n
//! username=ana&password=1234
//! ```

use super::urlencoded;
use crate::auth::Authenticator;
use crate::buffer::{find_bytes, ByteBuffer};
use regex::bytes::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Largo máximo de una línea de request line o header
pub const MAX_LINE: usize = 8192;

/// `Content-Length` máximo aceptado
pub const MAX_BODY: usize = 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// Paths que se sirven agregando `.html`
const DEFAULT_HTML: [&str; 6] = ["/index", "/register", "/login", "/welcome", "/video", "/picture"];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Estado del parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finished,
}

/// Resultado de un intento de parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Request completo; sus bytes ya se consumieron del buffer
    Complete,

    /// Faltan bytes; el buffer queda intacto
    Incomplete,
}

/// Errores de parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("request line or header exceeds the maximum length")]
    LineTooLong,

    #[error("declared body of {0} bytes exceeds the maximum")]
    BodyTooLarge(usize),

    #[error("request grammar failed to compile: {0}")]
    Grammar(String),
}

struct Grammar {
    request_line: Regex,
    header: Regex,
}

impl Grammar {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            request_line: Regex::new(r"(?-u)^([^ ]*) ([^ ]*) HTTP/([^ ]*)$")?,
            // El valor puede venir sin espacio después de ':'
            header: Regex::new(r"(?-u)^([^:]*): ?(.*)$")?,
        })
    }

    fn get() -> Result<&'static Grammar, ParseError> {
        static GRAMMAR: OnceLock<Result<Grammar, regex::Error>> = OnceLock::new();
        GRAMMAR
            .get_or_init(Grammar::compile)
            .as_ref()
            .map_err(|e| ParseError::Grammar(e.to_string()))
    }
}

/// Request HTTP parseado
#[derive(Debug, Clone)]
pub struct Request {
    state: ParseState,
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    body: String,
    form: HashMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            method: String::new(),
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: String::new(),
            form: HashMap::new(),
        }
    }

    /// Vuelve al estado inicial
    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.method.clear();
        self.path.clear();
        self.version.clear();
        self.headers.clear();
        self.body.clear();
        self.form.clear();
    }

    /// Intenta parsear un request completo desde `buf`
    ///
    /// Los formularios POST de `/login.html` y `/register.html` se validan
    /// con `auth` y el path se reescribe a `/welcome.html` o `/error.html`.
    ///
    /// # Retorna
    ///
    /// - `Ok(ParseStatus::Complete)`: request listo, bytes consumidos
    /// - `Ok(ParseStatus::Incomplete)`: faltan bytes, nada consumido
    ///
    /// # Errores
    ///
    /// `ParseError` si la request line no cumple la gramática, si
    /// `Content-Length` no es un número o si una línea excede `MAX_LINE`.
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::auth::DenyAll;
    /// use reactor_http::buffer::ByteBuffer;
    /// use reactor_http::http::{ParseStatus, Request};
    ///
    /// let mut buf = ByteBuffer::new();
    /// buf.append(b"GET /index HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
    ///
    /// let mut request = Request::new();
    /// assert_eq!(request.parse(&mut buf, &DenyAll).unwrap(), ParseStatus::Complete);
    /// assert_eq!(request.path(), "/index.html");
    /// assert!(request.is_keep_alive());
    /// ```
    pub fn parse(
        &mut self,
        buf: &mut ByteBuffer,
        auth: &dyn Authenticator,
    ) -> Result<ParseStatus, ParseError> {
        self.reset();
        let grammar = Grammar::get()?;
        let data = buf.peek();
        let mut off = 0;

        while self.state != ParseState::Finished {
            match self.state {
                ParseState::RequestLine => {
                    let Some(line) = next_line(data, off)? else {
                        return Ok(ParseStatus::Incomplete);
                    };
                    off += line.len() + CRLF.len();
                    self.parse_request_line(grammar, line)?;
                    self.normalize_path();
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = next_line(data, off)? else {
                        return Ok(ParseStatus::Incomplete);
                    };
                    off += line.len() + CRLF.len();
                    self.parse_header(grammar, line);

                    if self.state == ParseState::Headers {
                        // Solo queda el CRLF final: el body, si lo hay, no llegó
                        match &data[off..] {
                            b"\r\n" => {
                                off += CRLF.len();
                                self.state = match self.content_length()? {
                                    Some(len) if len > 0 => ParseState::Body,
                                    _ => ParseState::Finished,
                                };
                            }
                            [] | b"\r" => return Ok(ParseStatus::Incomplete),
                            _ => {}
                        }
                    }
                }
                ParseState::Body => {
                    let Some(consumed) = self.parse_body(&data[off..])? else {
                        return Ok(ParseStatus::Incomplete);
                    };
                    off += consumed;
                    self.state = ParseState::Finished;
                }
                ParseState::Finished => {}
            }
        }

        if self.method == "POST" {
            self.parse_post(auth);
        }

        // off nunca supera lo legible: todas las líneas salieron de `data`
        buf.retrieve(off).map_err(|_| ParseError::LineTooLong)?;
        Ok(ParseStatus::Complete)
    }

    fn parse_request_line(&mut self, grammar: &Grammar, line: &[u8]) -> Result<(), ParseError> {
        let caps = grammar
            .request_line
            .captures(line)
            .ok_or_else(|| ParseError::InvalidRequestLine(lossy(line)))?;
        self.method = lossy(&caps[1]);
        self.path = lossy(&caps[2]);
        self.version = lossy(&caps[3]);
        Ok(())
    }

    fn normalize_path(&mut self) {
        if self.path == "/" {
            self.path = "/index.html".to_string();
        } else if DEFAULT_HTML.contains(&self.path.as_str()) {
            self.path.push_str(".html");
        }
    }

    fn parse_header(&mut self, grammar: &Grammar, line: &[u8]) {
        match grammar.header.captures(line) {
            Some(caps) => {
                self.headers.insert(lossy(&caps[1]), lossy(&caps[2]));
            }
            None => self.state = ParseState::Body,
        }
    }

    /// Retorna cuántos bytes del body se consumieron, o `None` si faltan
    fn parse_body(&mut self, rest: &[u8]) -> Result<Option<usize>, ParseError> {
        if let Some(len) = self.content_length()? {
            if rest.len() < len {
                return Ok(None);
            }
            self.body = lossy(&rest[..len]);
            return Ok(Some(len));
        }

        // Sin Content-Length solo un POST lleva body: la línea restante
        if self.method != "POST" {
            return Ok(Some(0));
        }
        match find_bytes(rest, CRLF) {
            Some(end) => {
                self.body = lossy(&rest[..end]);
                Ok(Some(end + CRLF.len()))
            }
            None => {
                self.body = lossy(rest);
                Ok(Some(rest.len()))
            }
        }
    }

    /// `Content-Length` declarado, acotado por `MAX_BODY`
    fn content_length(&self) -> Result<Option<usize>, ParseError> {
        let Some(raw) = self.headers.get("Content-Length") else {
            return Ok(None);
        };
        let len: usize = raw
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidContentLength(raw.clone()))?;
        if len > MAX_BODY {
            return Err(ParseError::BodyTooLarge(len));
        }
        Ok(Some(len))
    }

    fn parse_post(&mut self, auth: &dyn Authenticator) {
        if self.headers.get("Content-Type").map(String::as_str) != Some(FORM_CONTENT_TYPE) {
            return;
        }
        self.form = urlencoded::parse_form(&self.body);

        let is_login = match self.path.as_str() {
            "/register.html" => false,
            "/login.html" => true,
            _ => return,
        };

        let user = self.form.get("username").map(String::as_str).unwrap_or("");
        let password = self.form.get("password").map(String::as_str).unwrap_or("");
        self.path = if auth.verify(user, password, is_login) {
            "/welcome.html".to_string()
        } else {
            "/error.html".to_string()
        };
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Header exacto, respetando mayúsculas tal como llegó
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Campo del formulario urlencoded de un POST
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    /// Keep-alive solo con `Connection: keep-alive` sobre HTTP/1.1
    pub fn is_keep_alive(&self) -> bool {
        self.header("Connection") == Some("keep-alive") && self.version == "1.1"
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

/// Próxima línea a partir de `off`, sin el CRLF
fn next_line(data: &[u8], off: usize) -> Result<Option<&[u8]>, ParseError> {
    let rest = &data[off..];
    match find_bytes(rest, CRLF) {
        Some(end) if end > MAX_LINE => Err(ParseError::LineTooLong),
        Some(end) => Ok(Some(&rest[..end])),
        None if rest.len() > MAX_LINE => Err(ParseError::LineTooLong),
        None => Ok(None),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
