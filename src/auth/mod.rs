pub mod federation;
pub mod password;
pub mod tokens;

pub use federation::{FederatedIdentity, GoogleIdentityProvider, IdentityProvider};
pub use tokens::{Claims, TokenError, TokenIssuer, TokenPurpose};
