pub mod authz;
pub mod credentials;
mod error;
pub mod metrics;
pub mod sessions;
pub mod tokens;

pub use credentials::CredentialService;
pub use error::ServiceError;
pub use sessions::{spawn_idle_sweep, SessionRegistry};
pub use tokens::{TokenKind, TokenService};
