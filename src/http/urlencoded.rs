//! # Decodificación `application/x-www-form-urlencoded`
//! src/http/urlencoded.rs
//!
//! `+` → espacio, `%XX` → byte, `&` separa pares y `=` separa clave y valor.
//! Un `%` que no va seguido de dos dígitos hex se deja tal cual.

use std::collections::HashMap;

/// Decodifica un body urlencoded a un mapa clave → valor
///
/// Claves repetidas: gana la última. Los pares sin `=` quedan con valor
/// vacío y los pares con clave vacía se ignoran.
///
/// # Ejemplo
/// ```
/// use reactor_http::http::urlencoded::parse_form;
///
/// let form = parse_form("username=a%20b&password=pw");
/// assert_eq!(form["username"], "a b");
/// assert_eq!(form["password"], "pw");
/// ```
pub fn parse_form(body: &str) -> HashMap<String, String> {
    let mut form = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        form.insert(decode(key), decode(value));
    }
    form
}

/// Decodifica un componente urlencoded
pub fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (bytes.get(i + 1).and_then(hex), bytes.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex(b: &u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_login_form() {
        let form = parse_form("username=a%20b&password=pw");
        assert_eq!(form.len(), 2);
        assert_eq!(form.get("username").map(String::as_str), Some("a b"));
        assert_eq!(form.get("password").map(String::as_str), Some("pw"));
    }

    #[test]
    fn test_plus_is_space() {
        assert_eq!(decode("hola+mundo"), "hola mundo");
    }

    #[test]
    fn test_mixed_case_hex() {
        assert_eq!(decode("%2f%2F%41"), "//A");
    }

    #[test]
    fn test_malformed_percent_passes_through() {
        assert_eq!(decode("100%"), "100%");
        assert_eq!(decode("a%2"), "a%2");
        assert_eq!(decode("%zz1"), "%zz1");
    }

    #[test]
    fn test_utf8_sequence() {
        assert_eq!(decode("Jos%C3%A9"), "José");
    }

    #[test]
    fn test_edge_pairs() {
        let form = parse_form("a=1&&flag&=x&a=2");
        assert_eq!(form.get("a").map(String::as_str), Some("2"));
        assert_eq!(form.get("flag").map(String::as_str), Some(""));
        assert_eq!(form.len(), 2);
    }
}
