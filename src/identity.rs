//! Email/password identity
//!
//! [`IdentityGateway`] turns credentials into a stable uid and provisions
//! new accounts. [`HostedIdentity`] uses the hosted identity service;
//! [`InMemoryIdentity`] keeps accounts in process.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use wifi_attendance_auth::{Auth, AuthError};

use crate::error::Result;

#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Exchange credentials for the account's uid
    async fn authenticate(&self, email: &str, password: &str) -> Result<String>;

    /// Create an account and return its uid. Does not change who is signed in.
    async fn provision_account(&self, email: &str, password: &str) -> Result<String>;

    async fn sign_out(&self) -> Result<()>;

    /// Uid of the signed-in account; fails with `MissingSession` when nobody is
    async fn current_user(&self) -> Result<String>;

    /// Bearer token of the signed-in account, if any
    fn access_token(&self) -> Option<String>;
}

/// Gateway backed by the hosted identity service
pub struct HostedIdentity {
    auth: Auth,
}

impl HostedIdentity {
    pub fn new(auth: Auth) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl IdentityGateway for HostedIdentity {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        debug!(email, "signing in");
        let session = self.auth.sign_in_with_password(email, password).await?;
        info!(uid = %session.user.id, "signed in");
        Ok(session.user.id)
    }

    async fn provision_account(&self, email: &str, password: &str) -> Result<String> {
        // The admin API creates confirmed accounts; without it fall back to public sign-up
        let user = match self.auth.admin() {
            Some(admin) => admin.create_user(email, password, None).await?,
            None => self.auth.sign_up(email, password).await?,
        };
        info!(uid = %user.id, "account provisioned");
        Ok(user.id)
    }

    async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<String> {
        let user = self.auth.get_user().await?;
        Ok(user.id)
    }

    fn access_token(&self) -> Option<String> {
        self.auth.get_session().map(|session| session.access_token)
    }
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password: String,
}

/// Accounts kept in process, keyed by lowercased email
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    accounts: RwLock<HashMap<String, Account>>,
    signed_in: std::sync::RwLock<Option<String>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a known uid
    pub async fn insert(&self, email: &str, password: &str, uid: &str) {
        self.accounts.write().await.insert(
            email.to_lowercase(),
            Account {
                uid: uid.to_string(),
                password: password.to_string(),
            },
        );
    }

    fn set_signed_in(&self, uid: Option<String>) {
        match self.signed_in.write() {
            Ok(mut guard) => *guard = uid,
            Err(poisoned) => *poisoned.into_inner() = uid,
        }
    }

    fn signed_in(&self) -> Option<String> {
        match self.signed_in.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl IdentityGateway for InMemoryIdentity {
    async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        let accounts = self.accounts.read().await;
        match accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => {
                self.set_signed_in(Some(account.uid.clone()));
                Ok(account.uid.clone())
            }
            _ => Err(AuthError::ApiError {
                status: StatusCode::BAD_REQUEST,
                message: "Invalid login credentials".to_string(),
            }
            .into()),
        }
    }

    async fn provision_account(&self, email: &str, password: &str) -> Result<String> {
        let mut accounts = self.accounts.write().await;
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(AuthError::ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "User already registered".to_string(),
            }
            .into());
        }
        let uid = Uuid::new_v4().to_string();
        accounts.insert(
            key,
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.signed_in().is_none() {
            return Err(AuthError::MissingSession.into());
        }
        self.set_signed_in(None);
        Ok(())
    }

    async fn current_user(&self) -> Result<String> {
        self.signed_in()
            .ok_or_else(|| AuthError::MissingSession.into())
    }

    fn access_token(&self) -> Option<String> {
        self.signed_in().map(|uid| format!("local-{}", uid))
    }
}
