//! Typed client for the REST endpoints surrounding the relay.

use std::time::Duration;

use circle_core::logging::targets;
use circle_core::{
    ChatMessage, Circle, CircleId, Conversation, ConversationId, DmMessage, NewCircle, NewMessage,
    NotificationFeed, NotificationId, OpenConversation, UserId,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{NetworkError, Result};

const TARGET: &str = targets::HTTP;

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// REST client bound to a base URL and an acting user.
///
/// # Example
///
/// ```ignore
/// let api = CircleApi::new("https://circle.example", UserId::new("u1"))?;
///
/// let circles = api.my_circles().await?;
/// let history = api.circle_messages(&circles[0].id).await?;
/// ```
#[derive(Clone, Debug)]
pub struct CircleApi {
    client: reqwest::Client,
    base_url: Url,
    user: UserId,
}

impl CircleApi {
    /// Create a client with a 30 second request timeout.
    pub fn new(base_url: &str, user: UserId) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(client, base_url, user)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    ///
    /// `base_url` may carry a path prefix (`https://host/app`); endpoint
    /// paths are resolved beneath it.
    pub fn with_client(client: reqwest::Client, base_url: &str, user: UserId) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            user,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub async fn my_circles(&self) -> Result<Vec<Circle>> {
        self.get("/api/circles/my").await
    }

    pub async fn create_circle(&self, circle: &NewCircle) -> Result<Circle> {
        self.post("/api/circles", circle).await
    }

    pub async fn join_circle(&self, circle: &CircleId) -> Result<Circle> {
        self.post(&format!("/api/circles/{circle}/join"), &()).await
    }

    pub async fn leave_circle(&self, circle: &CircleId) -> Result<()> {
        self.send_empty(Method::POST, &format!("/api/circles/{circle}/leave"))
            .await
    }

    pub async fn circle_messages(&self, circle: &CircleId) -> Result<Vec<ChatMessage>> {
        self.get(&format!("/api/circles/{circle}/messages")).await
    }

    /// Post over REST instead of the socket; the server relays it the same way.
    pub async fn post_circle_message(
        &self,
        circle: &CircleId,
        content: impl Into<String>,
    ) -> Result<ChatMessage> {
        let body = NewMessage {
            content: content.into(),
        };
        self.post(&format!("/api/circles/{circle}/messages"), &body)
            .await
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.get("/api/dm/conversations").await
    }

    /// Open the conversation with `user`, or return the existing one.
    pub async fn open_conversation(&self, user: &UserId) -> Result<Conversation> {
        let body = OpenConversation {
            user_id: user.clone(),
        };
        self.post("/api/dm/conversations", &body).await
    }

    pub async fn conversation_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<DmMessage>> {
        self.get(&format!("/api/dm/conversations/{conversation}/messages"))
            .await
    }

    /// Persist a direct message. Follow up with a `dm` socket frame carrying
    /// the returned id so both participants receive it live.
    pub async fn send_dm(
        &self,
        conversation: &ConversationId,
        content: impl Into<String>,
    ) -> Result<DmMessage> {
        let body = NewMessage {
            content: content.into(),
        };
        self.post(
            &format!("/api/dm/conversations/{conversation}/messages"),
            &body,
        )
        .await
    }

    pub async fn notifications(&self) -> Result<NotificationFeed> {
        self.get("/api/notifications").await
    }

    pub async fn mark_notification_read(&self, notification: &NotificationId) -> Result<()> {
        self.send_empty(
            Method::POST,
            &format!("/api/notifications/{notification}/read"),
        )
        .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.send_empty(Method::POST, "/api/notifications/read-all")
            .await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        debug!(target: TARGET, %method, %url, "request");
        Ok(self
            .client
            .request(method, url)
            .header(USER_HEADER, self.user.as_str()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path)?.send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<()> {
        let response = self.request(method, path)?.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn 4xx/5xx responses into [`NetworkError::HttpStatus`].
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        None
    } else {
        Some(body)
    };
    Err(NetworkError::HttpStatus {
        status: status.as_u16(),
        message,
    })
}
