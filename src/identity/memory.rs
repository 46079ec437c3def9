use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{self, BoxFuture, FutureExt};
use uuid::Uuid;

use crate::errors::{Result, TourisError};
use crate::identity::{describe_error_code, IdentityService};
use crate::session::UserId;

const MIN_PASSWORD_LENGTH: usize = 6;

/// Accounts held in process memory. Answers with the same messages as the
/// real service.
#[derive(Default)]
pub struct MemoryIdentity {
    accounts: RwLock<HashMap<String, (String, UserId)>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account directly and returns its identity.
    pub fn add_account(&self, email: &str, password: &str) -> UserId {
        let id = UserId::new(Uuid::new_v4().to_simple().to_string());

        self.accounts
            .write()
            .unwrap()
            .insert(email.to_lowercase(), (password.to_owned(), id.clone()));

        id
    }

    fn check(&self, email: &str, password: &str) -> Result<UserId> {
        let accounts = self.accounts.read().unwrap();

        match accounts.get(&email.to_lowercase()) {
            Some((stored, id)) if stored == password => Ok(id.clone()),
            Some(_) => Err(rejection("INVALID_PASSWORD")),
            None => Err(rejection("EMAIL_NOT_FOUND")),
        }
    }

    fn create(&self, email: &str, password: &str) -> Result<UserId> {
        if !email.contains('@') {
            return Err(rejection("INVALID_EMAIL"));
        }

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(rejection("WEAK_PASSWORD"));
        }

        if self.accounts.read().unwrap().contains_key(&email.to_lowercase()) {
            return Err(rejection("EMAIL_EXISTS"));
        }

        Ok(self.add_account(email, password))
    }
}

fn rejection(code: &str) -> TourisError {
    TourisError::Authentication(describe_error_code(code))
}

impl IdentityService for MemoryIdentity {
    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>> {
        future::ready(self.check(email, password)).boxed()
    }

    fn create_account(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>> {
        future::ready(self.create(email, password)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accounts() {
        let identity = MemoryIdentity::new();

        let id = identity
            .create_account("Someone@example.com", "hunter22")
            .await
            .unwrap();

        assert_eq!(identity.sign_in("someone@example.com", "hunter22").await.unwrap(), id);
        assert!(identity.create_account("someone@example.com", "hunter22").await.is_err());
        assert!(identity.create_account("other@example.com", "short").await.is_err());
        assert!(identity.sign_in("nobody@example.com", "hunter22").await.is_err());
    }
}
