use crate::error::{JaspelError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            _ => Method::Other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Other => "OTHER",
        };
        f.write_str(name)
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes and `+` in a query component.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_query(raw: &str) -> BTreeMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// A transport-neutral HTTP request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Header names are stored lowercase
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub remote_addr: Option<String>,
}

impl ApiRequest {
    /// Build a request from a method and a request target such as `/a/b?x=1`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, BTreeMap::new()),
        };
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: BTreeMap::new(),
            body: Vec::new(),
            remote_addr: None,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(Method::Post, target)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_actor(self, user_id: u64) -> Self {
        self.with_header(super::ACTOR_HEADER, user_id.to_string())
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(self, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json")
            .with_body(body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Acting user id; a malformed header counts as absent.
    pub fn actor_id(&self) -> Option<u64> {
        self.header(super::ACTOR_HEADER)
            .and_then(|raw| raw.trim().parse().ok())
    }

    /// Client address, preferring the first `X-Forwarded-For` hop.
    pub fn client_ip(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|raw| raw.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.remote_addr.clone())
    }

    /// Typed query parameter; empty values count as absent.
    pub fn query_param<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.query.get(name).map(|raw| raw.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e| {
                JaspelError::BadRequest(format!("parameter {} tidak valid: {}", name, e))
            }),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(JaspelError::BadRequest("body JSON kosong".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| JaspelError::BadRequest(format!("body JSON tidak valid: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|e| {
            log::error!(target: "jaspel::api", "failed to serialize response: {}", e);
            br#"{"success":false,"message":"Terjadi kesalahan pada server"}"#.to_vec()
        });
        Self {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body,
        }
    }

    pub fn raw(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            422 => "Unprocessable Entity",
            _ => "Internal Server Error",
        }
    }

    /// Parsed JSON body, `Null` for non-JSON bodies.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        let req = ApiRequest::get("/api/v2/validated-jaspel-data/?from=2024-06-01&role=dokter&q=a%20b+c");
        assert_eq!(req.path, "/api/v2/validated-jaspel-data");
        assert_eq!(req.query.get("from").map(String::as_str), Some("2024-06-01"));
        assert_eq!(req.query.get("q").map(String::as_str), Some("a b c"));
        assert_eq!(ApiRequest::get("/").path, "/");
    }

    #[test]
    fn test_percent_decoding_edge_cases() {
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz"), "%zz");
        assert_eq!(decode_component("%C3%A9"), "é");
    }

    #[test]
    fn test_actor_header_is_case_insensitive() {
        let req = ApiRequest::get("/health").with_header("X-User-Id", " 7 ");
        assert_eq!(req.actor_id(), Some(7));
        let bad = ApiRequest::get("/health").with_header("X-User-Id", "abc");
        assert_eq!(bad.actor_id(), None);
    }

    #[test]
    fn test_query_param_typing() {
        let req = ApiRequest::get("/x?year=2024&month=&user_id=abc");
        assert_eq!(req.query_param::<i32>("year").unwrap(), Some(2024));
        assert_eq!(req.query_param::<u32>("month").unwrap(), None);
        assert!(matches!(
            req.query_param::<u64>("user_id"),
            Err(JaspelError::BadRequest(_))
        ));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut req = ApiRequest::get("/").with_header("X-Forwarded-For", "10.0.0.7, 172.16.0.1");
        req.remote_addr = Some("127.0.0.1".into());
        assert_eq!(req.client_ip().as_deref(), Some("10.0.0.7"));
    }
}
