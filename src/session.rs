use std::fmt;
use std::sync::Arc;

use log::{debug, o, warn, Logger};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::errors::{Result, TourisError};
use crate::identity::IdentityService;

/// An opaque identity issued by the identity service.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the sign-in screens observe.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub user_id: Option<UserId>,
    pub is_signed_in: bool,
    /// The last failure, shown under the form. Empty when there is none.
    pub error_message: String,
}

/// The signed-in account on this device.
///
/// Store operations take a `&Session` to scope what they read and write.
/// Screens that need to react to sign-in or sign-out call [`Session::subscribe`].
pub struct Session {
    logger: Arc<Logger>,
    identity: Arc<dyn IdentityService>,
    sender: watch::Sender<SessionState>,
    // kept so that sends never fail for lack of subscribers
    receiver: watch::Receiver<SessionState>,
}

impl Session {
    pub fn new(logger: Arc<Logger>, identity: Arc<dyn IdentityService>) -> Self {
        let (sender, receiver) = watch::channel(SessionState::default());
        let logger = Arc::new(logger.new(o!("component" => "session")));

        Session {
            logger,
            identity,
            sender,
            receiver,
        }
    }

    pub fn state(&self) -> SessionState {
        self.receiver.borrow().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.receiver.borrow().user_id.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.receiver.borrow().is_signed_in
    }

    /// Returns the signed-in identity or [`TourisError::NotSignedIn`].
    pub fn require_user(&self) -> Result<UserId> {
        match self.user_id() {
            Some(id) if self.is_signed_in() => Ok(id),
            _ => Err(TourisError::NotSignedIn),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.receiver.clone()
    }

    /// The session state as a stream, for observers that prefer
    /// `StreamExt` combinators over polling a receiver.
    pub fn changes(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.subscribe())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId> {
        self.clear_error();
        check_credentials(email, password).map_err(|e| self.fail(e))?;

        debug!(self.logger, "Signing in...");

        let user_id = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|e| self.fail(e))?;

        debug!(self.logger, "Signed in"; "user_id" => %user_id);

        self.update(|state| {
            state.user_id = Some(user_id.clone());
            state.is_signed_in = true;
        });

        Ok(user_id)
    }

    /// Creates an account and, if that works, signs in with the same
    /// credentials.
    pub async fn create_account(&self, email: &str, password: &str) -> Result<UserId> {
        self.clear_error();
        check_credentials(email, password).map_err(|e| self.fail(e))?;

        debug!(self.logger, "Creating account...");

        let created = self
            .identity
            .create_account(email, password)
            .await
            .map_err(|e| self.fail(e))?;

        debug!(self.logger, "Created account"; "user_id" => %created);

        self.sign_in(email, password).await
    }

    pub fn sign_out(&self) {
        debug!(self.logger, "Signing out...");

        self.update(|state| *state = SessionState::default());
    }

    fn clear_error(&self) {
        self.update(|state| state.error_message.clear());
    }

    fn fail(&self, error: TourisError) -> TourisError {
        warn!(self.logger, "Session operation failed"; "error" => %error);

        let message = error.to_string();
        self.update(|state| state.error_message = message);

        error
    }

    fn update(&self, change: impl FnOnce(&mut SessionState)) {
        let mut state = self.state();
        change(&mut state);

        if *self.receiver.borrow() != state {
            // the receiver held above keeps the channel open
            let _ = self.sender.send(state);
        }
    }
}

fn check_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(TourisError::MissingField("email"));
    }

    if password.is_empty() {
        return Err(TourisError::MissingField("password"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::identity::memory::MemoryIdentity;

    fn session_with_account() -> Session {
        let identity = MemoryIdentity::new();
        identity.add_account("traveller@example.com", "correct horse");

        Session::new(Arc::new(log::discard()), Arc::new(identity))
    }

    #[tokio::test]
    async fn sign_in_with_correct_credentials() {
        let session = session_with_account();

        let id = session
            .sign_in("traveller@example.com", "correct horse")
            .await
            .unwrap();

        let state = session.state();
        assert!(state.is_signed_in);
        assert_eq!(state.user_id, Some(id));
        assert!(state.error_message.is_empty());
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_leaves_state_unchanged() {
        let session = session_with_account();

        let result = session.sign_in("traveller@example.com", "battery staple").await;

        assert!(matches!(result, Err(TourisError::Authentication(_))));
        let state = session.state();
        assert!(!state.is_signed_in);
        assert_eq!(state.user_id, None);
        assert!(!state.error_message.is_empty());
    }

    #[tokio::test]
    async fn failed_sign_in_keeps_previous_identity() {
        let session = session_with_account();
        let id = session
            .sign_in("traveller@example.com", "correct horse")
            .await
            .unwrap();

        assert!(session.sign_in("traveller@example.com", "nope").await.is_err());

        assert!(session.is_signed_in());
        assert_eq!(session.user_id(), Some(id));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_locally() {
        let session = session_with_account();

        let result = session.sign_in("", "correct horse").await;

        assert!(matches!(result, Err(TourisError::MissingField("email"))));
        assert_eq!(session.state().error_message, "Please fill in the email field.");
    }

    #[tokio::test]
    async fn create_account_signs_in() {
        let session = session_with_account();

        let id = session
            .create_account("new@example.com", "secret123")
            .await
            .unwrap();

        assert!(session.is_signed_in());
        assert_eq!(session.require_user().unwrap(), id);
    }

    #[tokio::test]
    async fn sign_out_clears_identity_and_notifies() {
        let session = session_with_account();
        let mut updates = session.subscribe();

        session
            .sign_in("traveller@example.com", "correct horse")
            .await
            .unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow().is_signed_in);

        session.sign_out();
        updates.changed().await.unwrap();
        assert!(!updates.borrow().is_signed_in);
        assert!(matches!(session.require_user(), Err(TourisError::NotSignedIn)));
    }

    #[tokio::test]
    async fn changes_stream_sees_sign_in() {
        let session = session_with_account();
        let mut changes = session.changes();

        let id = session
            .sign_in("traveller@example.com", "correct horse")
            .await
            .unwrap();

        let mut seen = None;
        while let Some(state) = changes.next().await {
            if state.is_signed_in {
                seen = state.user_id;
                break;
            }
        }

        assert_eq!(seen, Some(id));
    }
}
