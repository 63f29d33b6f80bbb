//! Credentials module - per-user OAuth grants and their durable store.

mod credentials_model;
mod credentials_store;

pub use credentials_model::{
    censor_email, normalize_username, validate_username, Credential, OAuthToken, PersonalInfo,
    MAX_USERNAME_LEN, MIN_USERNAME_LEN,
};
pub use credentials_store::CredentialStore;
