use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut,
    PasswordRecovery,
    UserUpdated(User),
}

pub type SessionCallback = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Keeps a session listener registered until dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Hosted identity backend.
pub trait AuthProvider {
    fn current_user(&self) -> anyhow::Result<Option<User>>;

    fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Session>;

    /// Create an account. `redirect_to` is where the confirmation link lands.
    fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> anyhow::Result<User>;

    fn sign_out(&self) -> anyhow::Result<()>;

    /// Send a password reset email.
    fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> anyhow::Result<()>;

    /// Change the password of the signed-in user.
    fn update_password(&self, new_password: &str) -> anyhow::Result<()>;

    /// Replace the signed-in user's display name and phone number.
    fn update_user(&self, full_name: &str, phone: &str) -> anyhow::Result<User>;

    fn on_session_change(&self, callback: SessionCallback) -> Subscription;
}

impl<P: AuthProvider + ?Sized> AuthProvider for &P {
    fn current_user(&self) -> anyhow::Result<Option<User>> {
        (**self).current_user()
    }

    fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        (**self).sign_in(email, password)
    }

    fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> anyhow::Result<User> {
        (**self).sign_up(email, password, redirect_to)
    }

    fn sign_out(&self) -> anyhow::Result<()> {
        (**self).sign_out()
    }

    fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> anyhow::Result<()> {
        (**self).reset_password(email, redirect_to)
    }

    fn update_password(&self, new_password: &str) -> anyhow::Result<()> {
        (**self).update_password(new_password)
    }

    fn update_user(&self, full_name: &str, phone: &str) -> anyhow::Result<User> {
        (**self).update_user(full_name, phone)
    }

    fn on_session_change(&self, callback: SessionCallback) -> Subscription {
        (**self).on_session_change(callback)
    }
}

pub fn require_user<P: AuthProvider + ?Sized>(auth: &P) -> Result<User> {
    auth.current_user()
        .map_err(Error::auth)?
        .ok_or(Error::NotAuthenticated)
}

/// `origin` joined with an absolute `path`, without a doubled slash.
pub(crate) fn app_url(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}
