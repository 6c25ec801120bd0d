//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Solo los códigos que el servidor de archivos produce:
//!
//! - **200**: el recurso existe y se puede leer
//! - **400**: request line malformada
//! - **403**: el recurso existe pero no es legible para otros
//! - **404**: el recurso no existe o es un directorio

/// Códigos de estado que soporta el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK
    Ok = 200,

    /// 400 Bad Request - Request line inválida
    BadRequest = 400,

    /// 403 Forbidden - Sin permiso de lectura
    Forbidden = 403,

    /// 404 Not Found - No existe o es un directorio
    NotFound = 404,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Texto de razón que va en la status line
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Página de error asociada al código, una por código
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::http::StatusCode;
    /// assert_eq!(StatusCode::NotFound.error_page(), Some("/404.html"));
    /// assert_eq!(StatusCode::Ok.error_page(), None);
    /// ```
    pub fn error_page(&self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => Some("/400.html"),
            StatusCode::Forbidden => Some("/403.html"),
            StatusCode::NotFound => Some("/404.html"),
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
