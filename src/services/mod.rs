pub mod account_service;
pub mod account_service_impl;
pub use account_service::{AccountError, AccountStore, InMemoryAccountStore};
pub use account_service_impl::SeaOrmAccountStore;

pub mod auth_delegate;
pub use auth_delegate::{Identity, IdentityVerifier, RemoteAuthDelegate, VerifyError};

pub mod password;

pub mod tokens;
pub use tokens::{Claims, TokenError, TokenService};
