//! OAuth 1.0a request signing and the three-legged token handshake
//!
//! Signing is a pure function of the request, the consumer credentials, the
//! token secret, a nonce and a timestamp. [`OAuth1Signer`] draws a fresh nonce
//! and timestamp for every signature; [`OAuth1Signer::authorization_header_with`]
//! takes them explicitly so the canonical form can be checked against known
//! vectors.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use reqwest::Method;
use sha1::Sha1;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::account::{Account, TOKEN_KEY, TOKEN_SECRET_KEY};
use crate::error::{ConfigError, Result, SocialError};
use crate::request::{Request, Response};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay as-is, everything else is encoded
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";
pub const OUT_OF_BAND_CALLBACK: &str = "oob";

/// Percent-encode a string per RFC 3986
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Random nonce: 32 random bytes, base64 encoded, non-alphanumerics stripped
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD
        .encode(bytes)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Seconds since the Unix epoch
pub fn timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Encode every pair, sort by key then value, join as `k=v&k=v`
pub fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Scheme, authority and path of `url`; query and fragment are dropped
pub fn base_string_uri(url: &Url) -> String {
    let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        base.push_str(&format!(":{}", port));
    }
    base.push_str(url.path());
    base
}

/// `METHOD&encode(base URI)&encode(normalized parameters)`
pub fn signature_base_string(method: &str, url: &Url, normalized_params: &str) -> String {
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&base_string_uri(url)),
        percent_encode(normalized_params)
    )
}

/// Base64 HMAC-SHA1 of `base_string`, keyed by `encode(consumer)&encode(token)`
pub fn hmac_sha1_signature(
    consumer_secret: &str,
    token_secret: &str,
    base_string: &str,
) -> Result<String> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| SocialError::Authentication(format!("Invalid signing key: {}", e)))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Endpoints and consumer credentials of an OAuth1 provider
#[derive(Clone)]
pub struct OAuth1Config {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub request_token_url: Url,
    pub authorize_url: Url,
    pub access_token_url: Url,
    /// Sent as `oauth_callback`; `oob` (PIN flow) when absent
    pub callback_url: Option<String>,
}

impl OAuth1Config {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        request_token_url: Url,
        authorize_url: Url,
        access_token_url: Url,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            request_token_url,
            authorize_url,
            access_token_url,
            callback_url: None,
        }
    }

    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Consumer credentials must be present before anything is signed
    pub fn validate(&self) -> Result<()> {
        if self.consumer_key.trim().is_empty() {
            return Err(ConfigError::MissingField("consumer_key".to_string()).into());
        }
        if self.consumer_secret.trim().is_empty() {
            return Err(ConfigError::MissingField("consumer_secret".to_string()).into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuth1Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Config")
            .field("consumer_key", &self.consumer_key)
            .field("request_token_url", &self.request_token_url.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("access_token_url", &self.access_token_url.as_str())
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

/// Computes OAuth1 `Authorization` headers from consumer credentials
///
/// Holds no mutable state, so one signer is shared by every operation of a
/// service.
#[derive(Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    pub fn from_config(config: &OAuth1Config) -> Self {
        Self::new(&config.consumer_key, &config.consumer_secret)
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Sign `request` on behalf of `account`
    ///
    /// # Errors
    ///
    /// Returns `SocialError::Authentication` if the account lacks an access
    /// token or token secret.
    pub fn sign(&self, request: &Request, account: &Account) -> Result<String> {
        let (token, token_secret) = account_tokens(account)?;
        self.authorization_header(
            request.method().as_str(),
            request.url(),
            &request.signature_parameters(),
            Some(token),
            token_secret,
            &[],
        )
    }

    /// Build an `Authorization` header with a fresh nonce and timestamp
    ///
    /// `extra_oauth` carries protocol parameters such as `oauth_callback` or
    /// `oauth_verifier`; they are signed and included in the header.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &Url,
        params: &[(String, String)],
        token: Option<&str>,
        token_secret: &str,
        extra_oauth: &[(String, String)],
    ) -> Result<String> {
        self.authorization_header_with(
            method,
            url,
            params,
            token,
            token_secret,
            extra_oauth,
            &generate_nonce(),
            timestamp(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &Url,
        params: &[(String, String)],
        token: Option<&str>,
        token_secret: &str,
        extra_oauth: &[(String, String)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String> {
        let mut oauth_params: BTreeMap<String, String> = BTreeMap::new();
        oauth_params.insert("oauth_consumer_key".to_string(), self.consumer_key.clone());
        oauth_params.insert("oauth_nonce".to_string(), nonce.to_string());
        oauth_params.insert(
            "oauth_signature_method".to_string(),
            SIGNATURE_METHOD.to_string(),
        );
        oauth_params.insert("oauth_timestamp".to_string(), timestamp.to_string());
        oauth_params.insert("oauth_version".to_string(), OAUTH_VERSION.to_string());
        if let Some(token) = token {
            oauth_params.insert("oauth_token".to_string(), token.to_string());
        }
        for (k, v) in extra_oauth {
            oauth_params.insert(k.clone(), v.clone());
        }

        // Signed set: oauth params, request params and any query already in the URL
        let mut all_params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all_params.extend(params.iter().cloned());
        all_params.extend(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));

        let base_string = signature_base_string(method, url, &normalize_parameters(&all_params));
        let signature = hmac_sha1_signature(&self.consumer_secret, token_secret, &base_string)?;
        oauth_params.insert("oauth_signature".to_string(), signature);

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

pub(crate) fn account_tokens(account: &Account) -> Result<(&str, &str)> {
    let token = account.token().ok_or_else(|| {
        SocialError::Authentication(format!(
            "Account '{}' has no {}",
            account.username(),
            TOKEN_KEY
        ))
    })?;
    let token_secret = account.token_secret().ok_or_else(|| {
        SocialError::Authentication(format!(
            "Account '{}' has no {}",
            account.username(),
            TOKEN_SECRET_KEY
        ))
    })?;
    Ok((token, token_secret))
}

/// Temporary credentials from the first leg
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: String,
    pub callback_confirmed: bool,
}

/// Token credentials from the last leg plus whatever else the provider sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub token_secret: String,
    pub extra: BTreeMap<String, String>,
}

impl AccessToken {
    /// `screen_name`, falling back to `user_id`
    pub fn username(&self) -> &str {
        self.extra
            .get("screen_name")
            .or_else(|| self.extra.get("user_id"))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn into_account(self) -> Account {
        let username = self.username().to_string();
        Account::from_tokens(username, self.token, self.token_secret, self.extra)
    }
}

/// Parse a form-encoded token response into token, secret and the remainder
pub fn parse_token_response(body: &str) -> Result<(String, String, BTreeMap<String, String>)> {
    let mut params: BTreeMap<String, String> = url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let token = params
        .remove(TOKEN_KEY)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SocialError::Authentication(format!("Token response missing {}", TOKEN_KEY)))?;
    let token_secret = params.remove(TOKEN_SECRET_KEY).ok_or_else(|| {
        SocialError::Authentication(format!("Token response missing {}", TOKEN_SECRET_KEY))
    })?;

    Ok((token, token_secret, params))
}

/// Host-side step of the handshake: show the authorize page, collect the verifier
///
/// Returning `Ok(None)` means the user backed out.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, authorize_url: &Url) -> Result<Option<String>>;
}

/// Drives the request token → user authorization → access token exchange
#[derive(Debug, Clone)]
pub struct OAuth1Handshake {
    config: OAuth1Config,
    signer: Arc<OAuth1Signer>,
    client: reqwest::Client,
}

impl OAuth1Handshake {
    pub fn new(config: OAuth1Config, client: reqwest::Client) -> Self {
        let signer = Arc::new(OAuth1Signer::from_config(&config));
        Self {
            config,
            signer,
            client,
        }
    }

    pub fn config(&self) -> &OAuth1Config {
        &self.config
    }

    pub fn signer(&self) -> Arc<OAuth1Signer> {
        Arc::clone(&self.signer)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Step 1: obtain temporary credentials signed with the consumer secret only
    pub async fn obtain_request_token(&self, cancel: &CancellationToken) -> Result<RequestToken> {
        self.config.validate()?;

        let callback = self
            .config
            .callback_url
            .clone()
            .unwrap_or_else(|| OUT_OF_BAND_CALLBACK.to_string());

        let request = Request::new(Method::POST, self.config.request_token_url.clone())
            .with_oauth(Arc::clone(&self.signer), None, "")
            .with_oauth_parameter("oauth_callback", callback);

        tracing::debug!(url = %self.config.request_token_url, "Requesting OAuth request token");
        let response = request.send(&self.client, cancel).await?;
        let body = check_token_response(&response, "request token")?;

        let (token, token_secret, extra) = parse_token_response(body)?;
        Ok(RequestToken {
            token,
            token_secret,
            callback_confirmed: extra
                .get("oauth_callback_confirmed")
                .is_some_and(|v| v == "true"),
        })
    }

    /// Step 2: the page where the user approves the request token
    pub fn build_authorize_url(&self, request_token: &RequestToken) -> Url {
        let mut url = self.config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair(TOKEN_KEY, &request_token.token);
        url
    }

    /// Step 3: trade the approved request token and verifier for token credentials
    pub async fn exchange_for_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        self.config.validate()?;

        let request = Request::new(Method::POST, self.config.access_token_url.clone())
            .with_oauth(
                Arc::clone(&self.signer),
                Some(request_token.token.as_str()),
                &request_token.token_secret,
            )
            .with_oauth_parameter("oauth_verifier", verifier);

        tracing::debug!(url = %self.config.access_token_url, "Exchanging request token");
        let response = request.send(&self.client, cancel).await?;
        let body = check_token_response(&response, "access token")?;

        let (token, token_secret, extra) = parse_token_response(body)?;
        Ok(AccessToken {
            token,
            token_secret,
            extra,
        })
    }

    /// Run all three legs
    ///
    /// Returns `Ok(None)` when the authorizer reports that the user cancelled.
    pub async fn authenticate(
        &self,
        authorizer: &dyn Authorizer,
        cancel: &CancellationToken,
    ) -> Result<Option<Account>> {
        let request_token = self.obtain_request_token(cancel).await?;
        let authorize_url = self.build_authorize_url(&request_token);

        let verifier = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SocialError::Cancelled),
            verifier = authorizer.authorize(&authorize_url) => verifier?,
        };

        let Some(verifier) = verifier.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        else {
            tracing::debug!("User cancelled authorization");
            return Ok(None);
        };

        let access_token = self
            .exchange_for_access_token(&request_token, &verifier, cancel)
            .await?;
        let account = access_token.into_account();
        tracing::info!(username = %account.username(), "Authenticated");
        Ok(Some(account))
    }
}

fn check_token_response<'a>(response: &'a Response, step: &str) -> Result<&'a str> {
    if !response.is_success() {
        return Err(SocialError::Authentication(format!(
            "{} request failed with HTTP {}: {}",
            step,
            response.status().as_u16(),
            response.text().trim()
        )));
    }
    Ok(response.text())
}
