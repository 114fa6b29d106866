//! Identity service client for the attendance workspace
//!
//! Talks to a GoTrue-compatible `/auth/v1` API: password sign-in,
//! sign-up, sign-out and the current session. The admin sub-client
//! provisions accounts with a service-role key.

use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an authentication failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    AccountExists,
    Network,
    Other,
}

/// Errors produced by [`Auth`] and [`AdminAuth`]
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {message} (Status: {status})")]
    ApiError { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Response did not contain a user")]
    MissingUser,
}

impl AuthError {
    /// Classify the failure for display
    pub fn failure(&self) -> AuthFailure {
        match self {
            AuthError::ApiError { status, message } => {
                let lowered = message.to_lowercase();
                if *status == StatusCode::UNPROCESSABLE_ENTITY
                    || lowered.contains("already registered")
                    || lowered.contains("already exists")
                    || lowered.contains("already been registered")
                {
                    AuthFailure::AccountExists
                } else if *status == StatusCode::BAD_REQUEST
                    || *status == StatusCode::UNAUTHORIZED
                    || lowered.contains("invalid")
                {
                    AuthFailure::InvalidCredentials
                } else {
                    AuthFailure::Other
                }
            }
            AuthError::NetworkError(_) => AuthFailure::Network,
            _ => AuthFailure::Other,
        }
    }

    /// Message suitable for showing to the person at the keyboard
    pub fn user_message(&self) -> String {
        match self.failure() {
            AuthFailure::InvalidCredentials => "Invalid email or password".to_string(),
            AuthFailure::AccountExists => "An account with this email already exists".to_string(),
            AuthFailure::Network => "Could not reach the authentication service".to_string(),
            AuthFailure::Other => self.to_string(),
        }
    }
}

/// A user as known to the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub app_metadata: Value,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub persist_session: bool,
    pub request_timeout: Option<Duration>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Auth client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    admin: Option<AdminAuth>,
}

/// Admin API client. Requires the service-role key; never ship it to devices.
pub struct AdminAuth {
    url: String,
    service_role_key: String,
    http_client: Client,
    request_timeout: Option<Duration>,
}

impl AdminAuth {
    pub fn new(url: &str, service_role_key: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            http_client,
            request_timeout: None,
        }
    }

    /// Create a confirmed account with a password
    ///
    /// # Example
    ///
    /// ```ignore
    /// let user = auth.admin().unwrap()
    ///     .create_user("student@example.edu", "s3cret", None)
    ///     .await?;
    /// ```
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        user_metadata: Option<Value>,
    ) -> Result<User, AuthError> {
        let url = format!("{}/auth/v1/admin/users", self.url);
        debug!("provisioning account for {}", email);

        let mut payload = serde_json::json!({
            "email": email,
            "password": password,
            "email_confirm": true,
        });
        if let Some(metadata) = user_metadata {
            payload["user_metadata"] = metadata;
        }

        let request = self
            .http_client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header(
                "Authorization",
                format!("Bearer {}", &self.service_role_key),
            )
            .json(&payload);

        let response = with_timeout(request, self.request_timeout).send().await?;
        let user_data = read_json(response).await?;

        Ok(serde_json::from_value::<User>(user_data)?)
    }
}

impl Auth {
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            admin: None,
        }
    }

    /// Enable the admin API
    pub fn init_admin(&mut self, service_role_key: &str) -> &Self {
        let mut admin = AdminAuth::new(&self.url, service_role_key, self.http_client.clone());
        admin.request_timeout = self.options.request_timeout;
        self.admin = Some(admin);
        self
    }

    pub fn admin(&self) -> Option<&AdminAuth> {
        self.admin.as_ref()
    }

    /// Register an account through the public sign-up endpoint.
    ///
    /// The resulting session, if any, is not stored: sign-up is used to
    /// provision other people's accounts and must not replace the caller's
    /// session.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let url = format!("{}/auth/v1/signup", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self.public_post(&url).json(&payload).send().await?;
        let body = read_json(response).await?;

        // With auto-confirm the body is a session; otherwise it is the user
        let has_user = body.get("user").map_or(false, |user| !user.is_null());
        let user = if has_user {
            body["user"].clone()
        } else if body.get("id").is_some() {
            body
        } else {
            return Err(AuthError::MissingUser);
        };

        Ok(serde_json::from_value::<User>(user)?)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self.public_post(&url).json(&payload).send().await?;
        let session: Session = serde_json::from_value(read_json(response).await?)?;

        if self.options.persist_session {
            self.store_session(Some(session.clone()));
        }

        Ok(session)
    }

    /// The current session, if signed in
    pub fn get_session(&self) -> Option<Session> {
        match self.current_session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fetch the signed-in user
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/user", self.url);

        let request = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token));

        let response = with_timeout(request, self.options.request_timeout)
            .send()
            .await?;

        Ok(serde_json::from_value(read_json(response).await?)?)
    }

    /// Sign out and forget the session
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;
        let url = format!("{}/auth/v1/logout", self.url);

        let request = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token));

        let response = with_timeout(request, self.options.request_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        self.store_session(None);
        Ok(())
    }

    fn public_post(&self, url: &str) -> RequestBuilder {
        let request = self
            .http_client
            .post(url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json");
        with_timeout(request, self.options.request_timeout)
    }

    fn store_session(&self, session: Option<Session>) {
        match self.current_session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }
}

fn with_timeout(request: RequestBuilder, timeout: Option<Duration>) -> RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

async fn read_json(response: Response) -> Result<Value, AuthError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json::<Value>().await?)
}

async fn api_error(response: Response) -> AuthError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    warn!("identity request failed with {}: {}", status, text);

    // GoTrue answers with `error_description`, `msg` or `message` depending on the endpoint
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(text);

    AuthError::ApiError { status, message }
}
