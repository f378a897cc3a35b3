pub mod activation;
pub mod customer;
pub mod operator;

pub use activation::{ActivationArtifact, ActivationState};
pub use customer::{CustomerAccessToken, CustomerProfile, CustomerUserError, SignupProfile};
pub use operator::{OperatorAccount, OperatorSession};
