//! Error kinds surfaced by the deploy-and-verify flow.

/// The category of a [`DeployError`].
///
/// Callers branch on the kind instead of matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// Missing credentials, unknown network or contract, bad constructor arguments.
    Config,
    /// The deployment transaction could not be submitted or was reverted.
    Deployment,
    /// The deployed code never showed up within the retry budget.
    AvailabilityTimeout,
    /// The explorer rejected or failed the verification request.
    Verification,
}

/// Fatal (and non-fatal, for verification) errors of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("deployment of {contract} failed: {reason}")]
    Deployment { contract: String, reason: String },

    #[error("contract code not available at {address} after {attempts} attempts")]
    AvailabilityTimeout { address: String, attempts: u32 },

    #[error("verification of {address} failed: {reason}")]
    Verification { address: String, reason: String },
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Deployment { .. } => ErrorKind::Deployment,
            Self::AvailabilityTimeout { .. } => ErrorKind::AvailabilityTimeout,
            Self::Verification { .. } => ErrorKind::Verification,
        }
    }

    /// Build a configuration error from an `anyhow` chain, keeping every cause.
    pub(crate) fn config(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }

    pub(crate) fn deployment(contract: &str, err: anyhow::Error) -> Self {
        Self::Deployment {
            contract: contract.to_string(),
            reason: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DeployError::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(
            DeployError::AvailabilityTimeout {
                address: "0x01".into(),
                attempts: 3
            }
            .kind(),
            ErrorKind::AvailabilityTimeout
        );
    }

    #[test]
    fn test_anyhow_chain_is_flattened() {
        let err = anyhow::anyhow!("connection refused").context("Failed to send eth_gasPrice request");
        let err = DeployError::deployment("Token", err);
        assert_eq!(
            err.to_string(),
            "deployment of Token failed: Failed to send eth_gasPrice request: connection refused"
        );
    }

    #[test]
    fn test_timeout_message_carries_attempts() {
        let err = DeployError::AvailabilityTimeout {
            address: "0xabc".into(),
            attempts: 7,
        };
        assert!(err.to_string().contains("after 7 attempts"));
        assert_eq!(err.kind().to_string(), "availability-timeout");
    }
}
