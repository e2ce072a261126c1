//! Outgoing HTTP requests: parameters, multipart bodies and cancellable sending
//!
//! A [`Request`] is single-use. It is built, signed once and sent once; `send`
//! consumes it. Signing is deferred until the request is complete so that
//! the signature covers every form parameter the caller added.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::account::Account;
use crate::error::{Result, SocialError};
use crate::oauth::{account_tokens, OAuth1Signer};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Content of one multipart part
#[derive(Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    Binary {
        data: Vec<u8>,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl std::fmt::Debug for PartValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            PartValue::Binary {
                data,
                file_name,
                content_type,
            } => f
                .debug_struct("Binary")
                .field("len", &data.len())
                .field("file_name", file_name)
                .field("content_type", content_type)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub value: PartValue,
}

impl MultipartPart {
    pub fn is_binary(&self) -> bool {
        matches!(self.value, PartValue::Binary { .. })
    }
}

/// OAuth1 signing context captured when the request is created
#[derive(Clone)]
struct Signing {
    signer: Arc<OAuth1Signer>,
    token: Option<String>,
    token_secret: String,
    oauth_params: Vec<(String, String)>,
}

pub struct Request {
    method: Method,
    url: Url,
    parameters: BTreeMap<String, String>,
    parts: Vec<MultipartPart>,
    boundary: Option<String>,
    signing: Option<Signing>,
    authorization: Option<String>,
}

impl Request {
    /// An unsigned request
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            parameters: BTreeMap::new(),
            parts: Vec::new(),
            boundary: None,
            signing: None,
            authorization: None,
        }
    }

    /// A request that will carry an OAuth1 `Authorization` header for `account`
    ///
    /// Only the account's token and token secret are copied; the account
    /// itself is not retained.
    pub fn create(
        method: Method,
        url: Url,
        account: &Account,
        signer: Arc<OAuth1Signer>,
    ) -> Result<Self> {
        let (token, token_secret) = account_tokens(account)?;
        Ok(Self::new(method, url).with_oauth(signer, Some(token), token_secret))
    }

    pub(crate) fn with_oauth(
        mut self,
        signer: Arc<OAuth1Signer>,
        token: Option<&str>,
        token_secret: &str,
    ) -> Self {
        self.signing = Some(Signing {
            signer,
            token: token.map(str::to_string),
            token_secret: token_secret.to_string(),
            oauth_params: Vec::new(),
        });
        self
    }

    /// Protocol parameter (e.g. `oauth_verifier`) sent in the header, not the body
    pub(crate) fn with_oauth_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        if let Some(signing) = self.signing.as_mut() {
            signing.oauth_params.push((key.into(), value.into()));
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    pub fn is_multipart(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signing.is_some()
    }

    /// Form parameter; the last write for a key wins
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Add a text field and switch the body to multipart/form-data
    pub fn add_multipart_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push_part(name.into(), PartValue::Text(value.into()));
    }

    /// Add raw bytes and switch the body to multipart/form-data
    pub fn add_multipart_binary(
        &mut self,
        name: impl Into<String>,
        data: Vec<u8>,
        file_name: Option<String>,
        content_type: Option<String>,
    ) {
        self.push_part(
            name.into(),
            PartValue::Binary {
                data,
                file_name,
                content_type,
            },
        );
    }

    fn push_part(&mut self, name: String, value: PartValue) {
        if self.boundary.is_none() {
            self.boundary = Some(generate_boundary());
        }
        self.parts.push(MultipartPart { name, value });
    }

    /// Parameters covered by the OAuth signature
    ///
    /// Multipart bodies are never signed, including form parameters that
    /// travel inside one as text parts; form-encoded parameters always are.
    pub fn signature_parameters(&self) -> Vec<(String, String)> {
        if self.is_multipart() {
            return Vec::new();
        }
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Compute the `Authorization` header, once
    ///
    /// Unsigned requests return `None`.
    pub fn sign(&mut self) -> Result<Option<&str>> {
        if self.authorization.is_none() {
            if let Some(signing) = &self.signing {
                let header = signing.signer.authorization_header(
                    self.method.as_str(),
                    &self.url,
                    &self.signature_parameters(),
                    signing.token.as_deref(),
                    &signing.token_secret,
                    &signing.oauth_params,
                )?;
                self.authorization = Some(header);
            }
        }
        Ok(self.authorization.as_deref())
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    fn sends_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }

    /// Where the request goes; GET parameters travel in the query string
    pub fn target_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.sends_body() && !self.parameters.is_empty() {
            url.query_pairs_mut().extend_pairs(self.parameters.iter());
        }
        url
    }

    pub fn content_type(&self) -> String {
        match &self.boundary {
            Some(boundary) => format!("multipart/form-data; boundary={}", boundary),
            None => FORM_CONTENT_TYPE.to_string(),
        }
    }

    /// Serialized body: multipart when any part was added, form-encoded otherwise
    ///
    /// In multipart mode the form parameters are sent as text parts ahead of
    /// the added parts.
    pub fn body(&self) -> Vec<u8> {
        match &self.boundary {
            Some(boundary) => encode_multipart(boundary, &self.parameters, &self.parts),
            None => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.parameters.iter())
                .finish()
                .into_bytes(),
        }
    }

    /// Sign (if needed) and execute the request
    ///
    /// Cancellation before the call starts performs no I/O; cancellation while
    /// the call is in flight drops the connection. Both yield
    /// `SocialError::Cancelled`. Transport failures become
    /// `SocialError::Network`; nothing is retried.
    pub async fn send(mut self, client: &reqwest::Client, cancel: &CancellationToken) -> Result<Response> {
        if cancel.is_cancelled() {
            tracing::debug!(url = %self.url, "Cancelled before sending");
            return Err(SocialError::Cancelled);
        }

        let authorization = self.sign()?.map(str::to_string);
        let endpoint = self.url.to_string();

        let mut builder = client.request(self.method.clone(), self.target_url());
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if self.sends_body() {
            builder = builder
                .header(CONTENT_TYPE, self.content_type())
                .body(self.body());
        }

        tracing::debug!(
            method = %self.method,
            url = %endpoint,
            multipart = self.is_multipart(),
            parts = self.parts.len(),
            "Sending request"
        );

        let exchange = async {
            let response = builder
                .send()
                .await
                .map_err(|e| SocialError::network(endpoint.as_str(), e))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| SocialError::network(endpoint.as_str(), e))?;
            Ok(Response { status, body })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(url = %endpoint, "Request aborted by cancellation");
                Err(SocialError::Cancelled)
            }
            result = exchange => result,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("parameters", &self.parameters)
            .field("parts", &self.parts)
            .field("signed", &self.signing.is_some())
            .finish()
    }
}

fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("sharekit-{}", token)
}

/// Quote a `Content-Disposition` value the way browsers do
///
/// `"`, CR and LF would end the header or the quoted string early.
fn escape_disposition(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\r' => escaped.push_str("%0D"),
            '\n' => escaped.push_str("%0A"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn encode_text_part(body: &mut Vec<u8>, boundary: &str, name: &str, text: &str) {
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
            boundary,
            escape_disposition(name)
        )
        .as_bytes(),
    );
    body.extend_from_slice(text.as_bytes());
    body.extend_from_slice(b"\r\n");
}

/// Form parameters become leading text parts, followed by the explicit parts
fn encode_multipart(
    boundary: &str,
    parameters: &BTreeMap<String, String>,
    parts: &[MultipartPart],
) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in parameters {
        encode_text_part(&mut body, boundary, name, value);
    }

    for part in parts {
        match &part.value {
            PartValue::Text(text) => encode_text_part(&mut body, boundary, &part.name, text),
            PartValue::Binary {
                data,
                file_name,
                content_type,
            } => {
                let mut header = format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
                    boundary,
                    escape_disposition(&part.name)
                );
                if let Some(file_name) = file_name {
                    header.push_str(&format!("; filename=\"{}\"", escape_disposition(file_name)));
                }
                let content_type = content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream")
                    .replace(['\r', '\n'], "");
                header.push_str(&format!("\r\nContent-Type: {}\r\n\r\n", content_type));

                body.extend_from_slice(header.as_bytes());
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

/// Status and full body text of a completed exchange
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    body: String,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn into_text(self) -> String {
        self.body
    }
}
