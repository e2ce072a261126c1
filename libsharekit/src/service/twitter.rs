//! Twitter service implementation
//!
//! Plain statuses go to the form-encoded update endpoint; statuses with
//! images go to the multipart media endpoint. Both reply with an XML
//! `<status>` document on success.

use async_trait::async_trait;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::account::Account;
use crate::config::TwitterConfig;
use crate::error::{ConfigError, Result};
use crate::oauth::{Authorizer, OAuth1Config, OAuth1Handshake};
use crate::request::Request;
use crate::service::{execute_share, ResponseCheck, Service, ServiceDescriptor};
use crate::types::{Item, ShareResult};

pub const SERVICE_ID: &str = "twitter";

/// Characters every link or attachment costs once shortened by t.co
pub const CHARS_PER_ATTACHMENT: usize = 22;
pub const MAX_TEXT_LENGTH: usize = 140;
pub const MAX_IMAGES: usize = 1;

pub const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
pub const AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authorize";
pub const ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";
pub const UPDATE_URL: &str = "https://api.twitter.com/1/statuses/update.xml";
pub const UPLOAD_URL: &str = "https://upload.twitter.com/1/statuses/update_with_media.xml";
const SIGNUP_URL: &str = "https://twitter.com/signup";

const STATUS_PARAM: &str = "status";
const MEDIA_PART: &str = "media[]";

const RESPONSE_CHECK: ResponseCheck = ResponseCheck {
    service_title: "Twitter",
    success_marker: "<status",
};

/// Twitter client
pub struct TwitterService {
    descriptor: ServiceDescriptor,
    handshake: OAuth1Handshake,
    update_url: Url,
    upload_url: Url,
}

impl TwitterService {
    /// Service with the public endpoints and a default HTTP client
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Result<Self> {
        let config = TwitterConfig {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            ..Default::default()
        };
        Self::from_config(&config, reqwest::Client::new())
    }

    /// Service from the `[twitter]` config section
    ///
    /// Endpoint overrides replace the public endpoints. Consumer credentials
    /// are checked when a request is signed, not here.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` for an unparsable endpoint override.
    pub fn from_config(config: &TwitterConfig, client: reqwest::Client) -> Result<Self> {
        let mut oauth = OAuth1Config::new(
            &config.consumer_key,
            &config.consumer_secret,
            endpoint("request_token_url", config.request_token_url.as_deref(), REQUEST_TOKEN_URL)?,
            endpoint("authorize_url", config.authorize_url.as_deref(), AUTHORIZE_URL)?,
            endpoint("access_token_url", config.access_token_url.as_deref(), ACCESS_TOKEN_URL)?,
        );
        if let Some(callback) = &config.callback_url {
            oauth = oauth.with_callback(callback);
        }

        Ok(Self {
            descriptor: descriptor(),
            handshake: OAuth1Handshake::new(oauth, client),
            update_url: endpoint("update_url", config.update_url.as_deref(), UPDATE_URL)?,
            upload_url: endpoint("upload_url", config.upload_url.as_deref(), UPLOAD_URL)?,
        })
    }

    /// Replace the HTTP client, keeping credentials and endpoints
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.handshake = OAuth1Handshake::new(self.handshake.config().clone(), client);
        self
    }

    pub fn handshake(&self) -> &OAuth1Handshake {
        &self.handshake
    }

    pub fn update_url(&self) -> &Url {
        &self.update_url
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    /// Build the signed request that shares `item`
    ///
    /// Items without images become a form post to the update endpoint. Items
    /// with images become a multipart post to the upload endpoint carrying
    /// the status text and the first `max_images` images in order.
    pub fn build_share_request(&self, item: &Item, account: &Account) -> Result<Request> {
        self.handshake.config().validate()?;
        let status = item.compose_text();

        if item.images.is_empty() {
            let mut request = Request::create(
                Method::POST,
                self.update_url.clone(),
                account,
                self.handshake.signer(),
            )?;
            request.set_parameter(STATUS_PARAM, status);
            return Ok(request);
        }

        let mut request = Request::create(
            Method::POST,
            self.upload_url.clone(),
            account,
            self.handshake.signer(),
        )?;
        request.add_multipart_text(STATUS_PARAM, status);
        for (index, image) in item
            .images
            .iter()
            .take(self.descriptor.max_images)
            .enumerate()
        {
            request.add_multipart_binary(
                MEDIA_PART,
                image.data.clone(),
                Some(image.file_name(index)),
                Some(image.mime_type.as_str().to_string()),
            );
        }
        Ok(request)
    }
}

#[async_trait]
impl Service for TwitterService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    // Twitter counts UTF-16 code units, so astral characters cost two
    fn text_length(&self, item: &Item) -> usize {
        item.text.encode_utf16().count() + CHARS_PER_ATTACHMENT * item.attachment_count()
    }

    async fn share_item(
        &self,
        item: &Item,
        account: &Account,
        cancel: &CancellationToken,
    ) -> Result<ShareResult> {
        tracing::debug!(
            account = %account.username(),
            links = item.links.len(),
            images = item.images.len(),
            "Sharing item to Twitter"
        );
        execute_share(
            SERVICE_ID,
            self.handshake.client(),
            RESPONSE_CHECK,
            cancel,
            || self.build_share_request(item, account),
        )
        .await
    }

    async fn authenticate(
        &self,
        authorizer: &dyn Authorizer,
        cancel: &CancellationToken,
    ) -> Result<Option<Account>> {
        self.handshake.authenticate(authorizer, cancel).await
    }
}

fn descriptor() -> ServiceDescriptor {
    ServiceDescriptor {
        id: SERVICE_ID,
        title: "Twitter",
        share_title: "Tweet",
        max_text_length: Some(MAX_TEXT_LENGTH),
        max_links: None,
        max_images: MAX_IMAGES,
        create_account_url: Url::parse(SIGNUP_URL).ok(),
    }
}

fn endpoint(field: &str, configured: Option<&str>, default: &str) -> Result<Url> {
    let raw = configured.unwrap_or(default);
    Url::parse(raw).map_err(|source| {
        ConfigError::InvalidUrl {
            field: field.to_string(),
            source,
        }
        .into()
    })
}
