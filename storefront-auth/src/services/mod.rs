//! Services layer for storefront-auth.
//!
//! Operator authentication (credentials, lockout, sessions) and the storefront
//! customer token lifecycle (login, signup, activation).

pub mod activation;
pub mod clock;
pub mod credentials;
pub mod customer;
pub mod error;
pub mod housekeeping;
pub mod lockout;
pub mod operator;
pub mod session;
pub mod storefront;

pub use activation::{ActivationFlow, ActivationGuard, ActivationLedger, ActivationOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialStore, InMemoryCredentialStore, PgCredentialStore};
pub use customer::{CustomerTokenClient, SignupOutcome, CUSTOMER_TOKEN_COOKIE};
pub use error::ServiceError;
pub use housekeeping::spawn_housekeeping;
pub use lockout::{
    AttemptAdmission, InMemoryLoginAttemptTracker, LockoutPolicy, LoginAttemptTracker,
};
pub use operator::OperatorAuthService;
pub use session::{AdminSessionManager, IssuedSession};
pub use storefront::{
    CustomerIdentityProvider, MockStorefront, PendingActivation, ProviderError, ProviderOutcome,
    StorefrontClient,
};
