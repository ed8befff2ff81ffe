//! Authentication Module
//! Mission: Single live session per account, checked cheaply on every request and
//! authoritatively on demand

pub mod account_store;
pub mod admin;
pub mod api;
pub mod authenticator;
pub mod clock;
pub mod jwt;
pub mod liveness;
pub mod middleware;
pub mod models;

pub use account_store::{CredentialStore, SqliteAccountStore};
pub use api::{AuthState, CookiePolicy};
pub use authenticator::{AuthError, Authenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use jwt::{BearerError, JwtHandler};
pub use liveness::{Indeterminate, Liveness, LivenessVerifier, StaleReason, Verdict};
pub use middleware::auth_middleware;
