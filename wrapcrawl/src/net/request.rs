//! Fetch request and response types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// All parameters on the query string.
    #[default]
    Get,
    /// Form parameters in a URL-encoded body.
    Post,
}

impl Method {
    /// Parses a method name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// One HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL without the query parameters below.
    pub url: String,
    /// Query string parameters in order; names may repeat.
    pub query: Vec<(String, String)>,
    /// Body parameters for POST.
    pub form: Vec<(String, String)>,
    /// Raw cookie values to relay in a `Cookie` header.
    pub cookies: Vec<String>,
    /// Declared response encoding, used when the server does not send one.
    pub encoding: Option<String>,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a form parameter.
    #[must_use]
    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Sets the cookies to relay.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<String>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Sets the declared encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Builds the `Cookie` header value: the `name=value` part of each
    /// relayed `Set-Cookie` value, joined with `; `.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<&str> = self
            .cookies
            .iter()
            .filter_map(|raw| raw.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Renders the request for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!("{} {}\n", self.method, self.url);
        for (name, value) in &self.query {
            out.push_str(&format!("param {name}={value}\n"));
        }
        for (name, value) in &self.form {
            out.push_str(&format!("form {name}={value}\n"));
        }
        out
    }
}

/// The decoded response of a fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub final_url: String,
    /// Body decoded to text.
    pub body: String,
    /// Raw `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
    /// Time taken in milliseconds.
    pub duration_ms: f64,
}

impl FetchResponse {
    /// Creates a 200 response.
    #[must_use]
    pub fn ok(final_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            final_url: final_url.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Whether the fetch was successful (2xx status).
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("post"), Some(Method::Post));
        assert_eq!(Method::parse("Get"), Some(Method::Get));
        assert_eq!(Method::parse("PUT"), None);
    }

    #[test]
    fn test_cookie_header() {
        let request = FetchRequest::get("http://example.org").with_cookies(vec![
            "JSESSIONID=abc; Path=/; HttpOnly".to_string(),
            "lang=en".to_string(),
        ]);
        assert_eq!(
            request.cookie_header().as_deref(),
            Some("JSESSIONID=abc; lang=en")
        );
        assert_eq!(FetchRequest::get("http://example.org").cookie_header(), None);
    }

    #[test]
    fn test_is_success() {
        assert!(FetchResponse::ok("http://example.org", "").is_success());
        let moved = FetchResponse {
            status: 301,
            ..FetchResponse::default()
        };
        assert!(!moved.is_success());
    }

    #[test]
    fn test_response_compares_with_timing() {
        let response = FetchResponse {
            duration_ms: 12.5,
            ..FetchResponse::ok("http://example.org", "body")
        };
        assert_eq!(response.clone(), response);
        assert_ne!(response, FetchResponse::ok("http://example.org", "body"));
    }

    #[test]
    fn test_describe() {
        let request = FetchRequest::post("http://example.org/search")
            .with_query("lang", "en")
            .with_form("q", "rust");
        assert_eq!(
            request.describe(),
            "POST http://example.org/search\nparam lang=en\nform q=rust\n"
        );
    }
}
