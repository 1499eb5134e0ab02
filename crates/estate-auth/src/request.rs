//! Outbound request description.

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;

use crate::error::{AuthError, Result};

/// One logical outbound call.
///
/// Method, URL and body are fixed once built; headers may be re-stamped
/// between the first attempt and its single retry. `retried` flips to `true`
/// at most once.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    retried: bool,
}

impl RequestDescriptor {
    /// Create a descriptor without a body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Attach a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a JSON body and set the content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| AuthError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether this request has already been resubmitted after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Mark the request as retried.
    ///
    /// Returns `false` if it was already marked, in which case it must not be
    /// retried again.
    pub fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }

    /// The `Authorization` header currently stamped on the request.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
    }

    /// Access token carried in the bearer header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization()
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://api.example.com").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_mark_retried_flips_once() {
        let mut request = RequestDescriptor::get(url("/properties"));
        assert!(!request.is_retried());

        assert!(request.mark_retried());
        assert!(request.is_retried());

        assert!(!request.mark_retried());
        assert!(request.is_retried());
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = RequestDescriptor::post(url("/appointments"))
            .with_json(&serde_json::json!({ "property_id": 7 }))
            .unwrap();

        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(request.body().unwrap().as_ref(), br#"{"property_id":7}"#);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = RequestDescriptor::get(url("/contracts"))
            .with_header(AUTHORIZATION, "Bearer T1")
            .unwrap();
        assert_eq!(request.bearer_token(), Some("T1"));

        let request = RequestDescriptor::get(url("/contracts"))
            .with_header(AUTHORIZATION, "Basic abc")
            .unwrap();
        assert_eq!(request.bearer_token(), None);
    }
}
