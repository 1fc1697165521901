//! HTTP request/response types exchanged across the Server Endpoint's
//! `onHttpRequest` callback.

use std::collections::HashMap;

/// An inbound HTTP request delivered to a registered callback.
///
/// `headers` and `query` are derived from the underlying framework's request
/// object rather than required fields of the abstract protocol; they are
/// carried here so callbacks do not need to reach back into `axum` types.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    pub method: String,
    pub uri: String,
    pub protocol: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpMessage {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let query = uri
            .split_once('?')
            .map(|(_, q)| crate::util::parse_query_string(q))
            .unwrap_or_default();
        Self {
            method: method.into(),
            uri,
            protocol: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            query,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// The reply a callback hands back to the Server Endpoint for one [`HttpMessage`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: "application/octet-stream".to_string(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(403, reason.into().into_bytes())
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(404, reason.into().into_bytes())
    }

    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::new(501, reason.into().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_with_query_is_parsed_eagerly() {
        let msg = HttpMessage::new("GET", "/servers?name=ecal&active=true");
        assert_eq!(msg.query.get("name").map(String::as_str), Some("ecal"));
        assert_eq!(msg.query.get("active").map(String::as_str), Some("true"));
    }

    #[test]
    fn forbidden_response_carries_403() {
        let resp = HttpResponse::forbidden("http disabled on this bind");
        assert_eq!(resp.status, 403);
    }
}
