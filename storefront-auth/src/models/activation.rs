//! One-time activation artifacts and their lifecycle.

use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// `Pending → Activating → {Activated | Failed}`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Pending,
    Activating,
    Activated,
    Failed,
}

impl ActivationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivationState::Activated | ActivationState::Failed)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("provide either an activation URL or identifier, token and new password, not both")]
    Ambiguous,
    #[error("provide an activation URL or identifier, token and new password")]
    Missing,
    #[error("identifier, token and new password are all required")]
    Incomplete,
    #[error("activation URL must be an absolute http(s) URL")]
    InvalidUrl,
}

/// A single-use credential that finalizes a pending customer account.
#[derive(Clone)]
pub enum ActivationArtifact {
    Url {
        activation_url: Url,
    },
    Token {
        identifier: String,
        token: String,
        new_password: String,
    },
}

impl ActivationArtifact {
    /// Builds an artifact from request fields. Exactly one shape must be present; nothing is
    /// resolved by precedence.
    pub fn from_parts(
        activation_url: Option<String>,
        identifier: Option<String>,
        token: Option<String>,
        new_password: Option<String>,
    ) -> Result<Self, ArtifactError> {
        let activation_url = activation_url.filter(|s| !s.trim().is_empty());
        let identifier = identifier.filter(|s| !s.trim().is_empty());
        let token = token.filter(|s| !s.trim().is_empty());
        let new_password = new_password.filter(|s| !s.is_empty());

        let any_triple = identifier.is_some() || token.is_some() || new_password.is_some();

        match (activation_url, any_triple) {
            (Some(_), true) => Err(ArtifactError::Ambiguous),
            (None, false) => Err(ArtifactError::Missing),
            (Some(raw), false) => {
                let url = Url::parse(raw.trim()).map_err(|_| ArtifactError::InvalidUrl)?;
                if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
                    return Err(ArtifactError::InvalidUrl);
                }
                Ok(ActivationArtifact::Url {
                    activation_url: url,
                })
            }
            (None, true) => match (identifier, token, new_password) {
                (Some(identifier), Some(token), Some(new_password)) => {
                    Ok(ActivationArtifact::Token {
                        identifier: identifier.trim().to_string(),
                        token: token.trim().to_string(),
                        new_password,
                    })
                }
                _ => Err(ArtifactError::Incomplete),
            },
        }
    }

    /// Stable digest identifying the artifact. The new password is not part of it: the same
    /// token submitted with a different password is still the same artifact.
    pub fn ledger_key(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            ActivationArtifact::Url { activation_url } => {
                hasher.update(b"url\n");
                hasher.update(activation_url.as_str().as_bytes());
            }
            ActivationArtifact::Token {
                identifier, token, ..
            } => {
                hasher.update(b"token\n");
                hasher.update(identifier.as_bytes());
                hasher.update(b"\n");
                hasher.update(token.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActivationArtifact::Url { .. } => "url",
            ActivationArtifact::Token { .. } => "token",
        }
    }
}

impl fmt::Debug for ActivationArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationArtifact")
            .field("kind", &self.kind())
            .field("key", &self.ledger_key())
            .finish()
    }
}
