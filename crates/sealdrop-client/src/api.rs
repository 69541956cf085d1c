//! Typed HTTP client for the relay API.

use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use sealdrop_shared::constants::{APP_NAME, REGISTRATION_TOKEN_HEADER};
use sealdrop_shared::models::{FileMetadata, Session, User};
use sealdrop_shared::protocol::{
    AuthChallenge, AuthResponse, DeleteResponse, DownloadResponse, RegisterRequest, UploadRequest,
};

use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct ApiClient {
    remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &str) -> Result<Self> {
        let remote = Url::parse(remote).map_err(|e| ClientError::InvalidUrl {
            url: remote.to_string(),
            reason: e.to_string(),
        })?;
        if remote.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: remote.to_string(),
                reason: "not a base URL".into(),
            });
        }
        let client = Client::builder()
            .user_agent(format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { remote, client })
    }

    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.remote.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), %status, "api response");

        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(ClientError::HttpStatus(status, response.text().await?))
        }
    }

    async fn call_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ClientError::HttpStatus(status, response.text().await?))
        }
    }

    pub async fn ping(&self) -> Result<String> {
        let response = self.client.get(self.endpoint("/ping")).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::HttpStatus(status, body))
        }
    }

    pub async fn register(
        &self,
        request: &RegisterRequest,
        registration_token: Option<&str>,
    ) -> Result<User> {
        let mut builder = self.client.post(self.endpoint("/users")).json(request);
        if let Some(token) = registration_token {
            builder = builder.header(REGISTRATION_TOKEN_HEADER, token);
        }
        self.call(builder).await
    }

    pub async fn lookup_user(&self, username: &str) -> Result<User> {
        self.call(
            self.client
                .get(self.endpoint("/users"))
                .query(&[("username", username)]),
        )
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.call(self.client.get(self.endpoint("/users"))).await
    }

    pub async fn challenge(&self, username: &str) -> Result<AuthChallenge> {
        self.call(
            self.client
                .get(self.endpoint("/auth/challenge"))
                .query(&[("username", username)]),
        )
        .await
    }

    pub async fn login(&self, response: &AuthResponse) -> Result<Session> {
        self.call(self.client.post(self.endpoint("/auth/login")).json(response))
            .await
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.call_empty(
            self.client
                .post(self.endpoint("/auth/logout"))
                .bearer_auth(token),
        )
        .await
    }

    pub async fn upload(&self, token: &str, request: &UploadRequest) -> Result<FileMetadata> {
        self.call(
            self.client
                .post(self.endpoint("/files"))
                .bearer_auth(token)
                .json(request),
        )
        .await
    }

    pub async fn list_files(&self, token: &str) -> Result<Vec<FileMetadata>> {
        self.call(self.client.get(self.endpoint("/files")).bearer_auth(token))
            .await
    }

    pub async fn download(&self, token: &str, id: &str) -> Result<DownloadResponse> {
        self.call(
            self.client
                .get(self.endpoint("/files/download"))
                .bearer_auth(token)
                .query(&[("id", id)]),
        )
        .await
    }

    pub async fn delete_file(&self, token: &str, id: &str) -> Result<DeleteResponse> {
        self.call(
            self.client
                .delete(self.endpoint("/files"))
                .bearer_auth(token)
                .query(&[("id", id)]),
        )
        .await
    }
}
