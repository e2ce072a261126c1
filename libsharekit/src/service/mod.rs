//! Service abstraction and the share pipeline
//!
//! A [`Service`] is the per-network policy: how long an item's text will be
//! once the network has rewritten it, which endpoint an item goes to and what
//! a successful response looks like. The transport work common to every
//! network (sign, send, validate) lives in [`execute_share`], which also
//! tracks each attempt through [`ShareState`].
//!
//! # Examples
//!
//! ```no_run
//! use libsharekit::{Account, CancellationToken, Item, Service, TwitterService};
//!
//! # async fn example(account: Account) -> libsharekit::Result<()> {
//! let service = TwitterService::new("consumer-key", "consumer-secret")?;
//! let item = Item::new("Hello from sharekit")
//!     .with_link("https://example.com/".parse().unwrap());
//!
//! service.validate_item(&item)?;
//! let cancel = CancellationToken::new();
//! let result = service.share_item(&item, &account, &cancel).await?;
//! println!("{:?}", result);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::account::{Account, AccountStore};
use crate::config::Config;
use crate::error::{Result, SocialError};
use crate::oauth::Authorizer;
use crate::request::{Request, Response};
use crate::types::{Item, ShareResult};

pub mod twitter;

/// Identifiers accepted by [`build_service`]
pub const SUPPORTED_SERVICES: &[&str] = &[twitter::SERVICE_ID];

/// Static description of a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Lowercase identifier, also the account store key
    pub id: &'static str,
    pub title: &'static str,
    /// Verb shown on the share button (e.g. "Tweet")
    pub share_title: &'static str,
    /// `None` means unlimited
    pub max_text_length: Option<usize>,
    /// `None` means unlimited
    pub max_links: Option<usize>,
    pub max_images: usize,
    pub create_account_url: Option<Url>,
}

/// Per-network sharing policy
#[async_trait]
pub trait Service: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;

    /// Length of the item's text as the network will count it
    ///
    /// Pure function of the item and the service's static configuration.
    fn text_length(&self, item: &Item) -> usize;

    /// Characters left before `max_text_length`; negative when over
    ///
    /// `None` when the network has no limit.
    fn remaining_text_length(&self, item: &Item) -> Option<i64> {
        self.descriptor()
            .max_text_length
            .map(|max| max as i64 - self.text_length(item) as i64)
    }

    /// Check text length and link count against the descriptor limits
    ///
    /// # Errors
    ///
    /// Returns `SocialError::InvalidInput` naming the violated limit.
    fn validate_item(&self, item: &Item) -> Result<()> {
        let descriptor = self.descriptor();

        if let Some(max) = descriptor.max_text_length {
            let length = self.text_length(item);
            if length > max {
                return Err(SocialError::InvalidInput(format!(
                    "Text exceeds {}'s {} character limit (current: {} characters)",
                    descriptor.title, max, length
                )));
            }
        }

        if let Some(max) = descriptor.max_links {
            if item.links.len() > max {
                return Err(SocialError::InvalidInput(format!(
                    "{} accepts at most {} links (got {})",
                    descriptor.title,
                    max,
                    item.links.len()
                )));
            }
        }

        Ok(())
    }

    /// Publish `item` as `account`
    ///
    /// Returns `ShareResult::Cancelled` when `cancel` fires before or during
    /// the upload. Neither the item nor the account is retained.
    ///
    /// # Errors
    ///
    /// - `SocialError::Authentication` if the account lacks tokens
    /// - `SocialError::Network` on transport failure
    /// - `SocialError::Service` if the response is not a success
    async fn share_item(
        &self,
        item: &Item,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Result<ShareResult>;

    /// Previously stored accounts for this network
    async fn get_accounts(&self, store: &dyn AccountStore) -> Result<Vec<Account>> {
        store.load_accounts(self.descriptor().id)
    }

    /// Run the network's sign-in flow
    ///
    /// Returns `Ok(None)` when the user backs out.
    async fn authenticate(
        &self,
        authorizer: &dyn Authorizer,
        cancel: &CancellationToken,
    ) -> Result<Option<Account>>;
}

/// Lifecycle of one share attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareState {
    Idle,
    Signing,
    Sending,
    Succeeded,
    Failed,
    Cancelled,
}

impl ShareState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ShareState::Succeeded | ShareState::Failed | ShareState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: ShareState) -> bool {
        use ShareState::*;
        matches!(
            (self, next),
            (Idle, Signing)
                | (Signing, Sending)
                | (Signing, Failed)
                | (Signing, Cancelled)
                | (Sending, Succeeded)
                | (Sending, Failed)
                | (Sending, Cancelled)
        )
    }
}

impl std::fmt::Display for ShareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShareState::Idle => "idle",
            ShareState::Signing => "signing",
            ShareState::Sending => "sending",
            ShareState::Succeeded => "succeeded",
            ShareState::Failed => "failed",
            ShareState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Single-use tracker for one attempt's [`ShareState`]
#[derive(Debug)]
pub struct ShareAttempt {
    service_id: &'static str,
    state: ShareState,
}

impl ShareAttempt {
    pub fn new(service_id: &'static str) -> Self {
        Self {
            service_id,
            state: ShareState::Idle,
        }
    }

    pub fn state(&self) -> ShareState {
        self.state
    }

    /// Move to `next`; illegal transitions are ignored and logged
    pub fn advance(&mut self, next: ShareState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                service = self.service_id,
                from = %self.state,
                to = %next,
                "Ignoring invalid share state transition"
            );
            return false;
        }
        tracing::debug!(
            service = self.service_id,
            from = %self.state,
            to = %next,
            "Share state transition"
        );
        self.state = next;
        true
    }

    fn fail(&mut self, error: SocialError) -> SocialError {
        self.advance(ShareState::Failed);
        error
    }
}

/// How a network recognizes a successful share response
#[derive(Debug, Clone, Copy)]
pub struct ResponseCheck {
    pub service_title: &'static str,
    /// Substring a successful body must contain
    pub success_marker: &'static str,
}

impl ResponseCheck {
    /// Reject non-2xx responses and bodies without the success marker
    ///
    /// The marker test is a plain substring match on the raw body.
    pub fn validate(&self, response: &Response) -> Result<()> {
        if !response.is_success() {
            return Err(SocialError::Service(format!(
                "{} returned HTTP {}: {}",
                self.service_title,
                response.status().as_u16(),
                truncate(response.text().trim(), 200)
            )));
        }
        if !response.text().contains(self.success_marker) {
            return Err(SocialError::Service(format!(
                "{} did not return the expected response.",
                self.service_title
            )));
        }
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Sign, send and validate one share request
///
/// `build` runs after the attempt enters `Signing`; the request is fully
/// signed before anything is sent. Cancellation before or during the send
/// yields `Ok(ShareResult::Cancelled)`.
pub async fn execute_share<F>(
    service_id: &'static str,
    client: &reqwest::Client,
    check: ResponseCheck,
    cancel: &CancellationToken,
    build: F,
) -> Result<ShareResult>
where
    F: FnOnce() -> Result<Request>,
{
    let mut attempt = ShareAttempt::new(service_id);
    attempt.advance(ShareState::Signing);

    if cancel.is_cancelled() {
        attempt.advance(ShareState::Cancelled);
        return Ok(ShareResult::Cancelled);
    }

    let mut request = build().map_err(|e| attempt.fail(e))?;
    request.sign().map_err(|e| attempt.fail(e))?;

    attempt.advance(ShareState::Sending);
    let endpoint = request.url().clone();

    let response = match request.send(client, cancel).await {
        Ok(response) => response,
        Err(SocialError::Cancelled) => {
            attempt.advance(ShareState::Cancelled);
            return Ok(ShareResult::Cancelled);
        }
        Err(e) => return Err(attempt.fail(e)),
    };

    check.validate(&response).map_err(|e| {
        tracing::warn!(
            service = service_id,
            url = %endpoint,
            status = response.status().as_u16(),
            "Share response rejected"
        );
        attempt.fail(e)
    })?;

    attempt.advance(ShareState::Succeeded);
    tracing::info!(service = service_id, url = %endpoint, "Shared item");
    Ok(ShareResult::Done)
}

/// Construct the service registered under `id`
///
/// # Errors
///
/// - `SocialError::InvalidInput` for an unknown id
/// - `SocialError::Config` if the service's section is missing or invalid
pub fn build_service(id: &str, config: &Config, client: reqwest::Client) -> Result<Box<dyn Service>> {
    match id.to_lowercase().as_str() {
        twitter::SERVICE_ID => Ok(Box::new(twitter::TwitterService::from_config(
            config.twitter()?,
            client,
        )?)),
        other => Err(SocialError::InvalidInput(format!(
            "Unsupported service '{}' (supported: {})",
            other,
            SUPPORTED_SERVICES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    const CHECK: ResponseCheck = ResponseCheck {
        service_title: "Example",
        success_marker: "<status",
    };

    #[test]
    fn test_share_state_transitions() {
        use ShareState::*;

        assert!(Idle.can_transition_to(Signing));
        assert!(Signing.can_transition_to(Sending));
        assert!(Signing.can_transition_to(Cancelled));
        assert!(Sending.can_transition_to(Cancelled));
        assert!(Sending.can_transition_to(Succeeded));

        assert!(!Idle.can_transition_to(Sending));
        assert!(!Idle.can_transition_to(Cancelled));
        assert!(!Succeeded.can_transition_to(Sending));
        assert!(!Sending.can_transition_to(Signing));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ShareState::Succeeded.is_terminal());
        assert!(ShareState::Failed.is_terminal());
        assert!(ShareState::Cancelled.is_terminal());
        assert!(!ShareState::Sending.is_terminal());
    }

    #[test]
    fn test_attempt_rejects_reentry() {
        let mut attempt = ShareAttempt::new("example");
        assert!(attempt.advance(ShareState::Signing));
        assert!(attempt.advance(ShareState::Sending));
        assert!(attempt.advance(ShareState::Succeeded));

        assert!(!attempt.advance(ShareState::Sending));
        assert_eq!(attempt.state(), ShareState::Succeeded);
    }

    #[test]
    fn test_response_check_accepts_marker() {
        let response = Response::new(StatusCode::OK, "<?xml version=\"1.0\"?><status><id>1</id></status>");
        assert!(CHECK.validate(&response).is_ok());
    }

    #[test]
    fn test_response_check_rejects_missing_marker_on_success_status() {
        let response = Response::new(StatusCode::OK, "{\"id\": 1}");
        match CHECK.validate(&response) {
            Err(SocialError::Service(msg)) => {
                assert_eq!(msg, "Example did not return the expected response.")
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_response_check_rejects_error_status() {
        let response = Response::new(StatusCode::FORBIDDEN, "<status>duplicate</status>");
        match CHECK.validate(&response) {
            Err(SocialError::Service(msg)) => assert!(msg.contains("HTTP 403")),
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_execute_share_cancelled_before_build() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut built = false;
        let result = execute_share("example", &reqwest::Client::new(), CHECK, &cancel, || {
            built = true;
            Ok(Request::new(
                reqwest::Method::POST,
                Url::parse("http://127.0.0.1:9/").unwrap(),
            ))
        })
        .await
        .unwrap();

        assert_eq!(result, ShareResult::Cancelled);
        assert!(!built);
    }

    #[tokio::test]
    async fn test_execute_share_propagates_build_error() {
        let cancel = CancellationToken::new();
        let result = execute_share("example", &reqwest::Client::new(), CHECK, &cancel, || {
            Err(SocialError::Authentication("no token".to_string()))
        })
        .await;

        assert!(matches!(result, Err(SocialError::Authentication(_))));
    }

    #[test]
    fn test_build_service_rejects_unknown_id() {
        let config = Config::default_config();
        let result = build_service("myspace", &config, reqwest::Client::new());
        assert!(matches!(result, Err(SocialError::InvalidInput(msg)) if msg.contains("twitter")));
    }

    #[test]
    fn test_build_service_requires_twitter_section() {
        let mut config = Config::default_config();
        config.twitter = None;
        let result = build_service("twitter", &config, reqwest::Client::new());
        assert!(matches!(result, Err(SocialError::Config(_))));
    }
}
