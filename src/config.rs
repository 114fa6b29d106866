//! Configuration for the attendance client

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Connection settings for the hosted backend.
/// Load these from the environment or a secure config source.
#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    pub url: Url,
    pub anon_key: String,
    /// Only administrator builds carry this; it unlocks account provisioning
    pub service_role_key: Option<String>,
}

impl AttendanceConfig {
    /// Creates a new configuration, validating the URL.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self {
            url,
            anon_key,
            service_role_key: None,
        })
    }

    /// Attach a service-role key for administrator flows
    pub fn with_service_role_key(mut self, key: String) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::config("service_role_key cannot be empty"));
        }
        self.service_role_key = Some(key);
        Ok(self)
    }

    /// Reads `SUPABASE_URL`, `SUPABASE_ANON_KEY` and, if present,
    /// `SUPABASE_SERVICE_ROLE_KEY`.
    pub fn from_env() -> Result<Self> {
        let url_str = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;

        let config = Self::new(&url_str, anon_key)?;
        match std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            Ok(key) if !key.is_empty() => config.with_service_role_key(key),
            _ => Ok(config),
        }
    }

    /// Base URL without the trailing slash `Url` adds
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

/// Names of the document collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub users: String,
    pub courses: String,
    pub attendance: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            users: "Users".to_string(),
            courses: "Courses".to_string(),
            attendance: "attendance".to_string(),
        }
    }
}

/// Client behaviour options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Keep the signed-in session in memory
    pub persist_session: bool,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Collection names in the document store
    pub collections: Collections,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            request_timeout: Some(Duration::from_secs(30)),
            collections: Collections::default(),
        }
    }
}

impl ClientOptions {
    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Override the collection names
    pub fn with_collections(mut self, value: Collections) -> Self {
        self.collections = value;
        self
    }
}
