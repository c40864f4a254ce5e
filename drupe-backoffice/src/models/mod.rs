//! Core-owned data model: principals, sessions, and the plain records the
//! repository collaborator returns. Domain entities (products, sales,
//! shipments) live behind the repository boundary.

mod principal;
mod session;

pub use principal::{Principal, Role, UserRecord};
pub use session::{client_fingerprint, Session};
