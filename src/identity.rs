use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, TourisError};
use crate::session::UserId;

pub mod memory;

/// The service that owns accounts and passwords.
pub trait IdentityService: Send + Sync {
    /// Checks the credentials and returns the identity they belong to.
    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>>;

    /// Registers a new account and returns its identity.
    fn create_account(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>>;
}

const SERVICE: &str = "identity";
const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1/";

/// An identity service backed by the Firebase Auth REST API.
pub struct FirebaseIdentity {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseIdentity {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("parse identity service URL");

        Self::with_base_url(client, base_url, api_key)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: Url, api_key: impl Into<String>) -> Self {
        FirebaseIdentity {
            client,
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn call(&self, endpoint: &str, email: String, password: String) -> Result<UserId> {
        // endpoints contain a colon, so they are joined as `./name` to keep
        // the part before it from reading as a scheme
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|source| TourisError::FailedToGenerateUrl { source })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let response = self
            .client
            .post(url)
            .json(&CredentialsRequest {
                email: &email,
                password: &password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|source| TourisError::Http {
                service: SERVICE,
                source,
            })?;

        if response.status().is_success() {
            let account: AccountResponse = response.json().await.map_err(|source| {
                TourisError::Http {
                    service: SERVICE,
                    source,
                }
            })?;

            return Ok(UserId::new(account.local_id));
        }

        let status = response.status();
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => describe_error_code(&body.error.message),
            Err(_) => format!("The identity service returned {}.", status),
        };

        Err(TourisError::Authentication(message))
    }
}

impl IdentityService for FirebaseIdentity {
    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>> {
        self.call("./accounts:signInWithPassword", email.to_owned(), password.to_owned())
            .boxed()
    }

    fn create_account(&self, email: &str, password: &str) -> BoxFuture<Result<UserId>> {
        self.call("./accounts:signUp", email.to_owned(), password.to_owned())
            .boxed()
    }
}

/// Turns the service's error codes into the sentences the mobile SDK
/// shows. Unknown codes are passed through as they are.
pub(crate) fn describe_error_code(code: &str) -> String {
    // codes may carry a detail suffix, e.g. "WEAK_PASSWORD : Password should be..."
    let bare = code.split(" : ").next().unwrap_or(code).trim();

    let message = match bare {
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => {
            "There is no user record corresponding to this identifier. The user may have been deleted."
        }
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "The password is invalid or the user does not have a password."
        }
        "USER_DISABLED" => "The user account has been disabled by an administrator.",
        "EMAIL_EXISTS" => "The email address is already in use by another account.",
        "INVALID_EMAIL" => "The email address is badly formatted.",
        "WEAK_PASSWORD" => "The password must be 6 characters long or more.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            "We have blocked all requests from this device due to unusual activity. Try again later."
        }
        _ => return code.to_owned(),
    };

    message.to_owned()
}
