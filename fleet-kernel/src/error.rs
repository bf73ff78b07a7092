/**
 * ERRORS & RESULT CODES - Taxonomy shared by every kernel module
 *
 * ROLE:
 * Component-local failures (one SSH session, one agent) are turned into
 * per-item records and never cross a batch. Store failures abort the whole
 * request. `ResultCode` is what callers of the kernel see.
 */

use serde::{Deserialize, Serialize};

use crate::keys::KeyError;

/// Status surfaced to callers of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Succeeded,
    PartialSucceeded,
    ParamError,
    DataExists,
    NoData,
    ConnectivityError,
    AuthError,
    ExecuteCommandError,
    StoreConnectError,
    StoreWriteError,
    TokenError,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Succeeded | ResultCode::PartialSucceeded)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResultCode::Succeeded => "operation succeeded",
            ResultCode::PartialSucceeded => "operation partially succeeded",
            ResultCode::ParamError => "invalid parameters",
            ResultCode::DataExists => "data already exists",
            ResultCode::NoData => "no such data",
            ResultCode::ConnectivityError => "ssh connection failed",
            ResultCode::AuthError => "ssh authentication failed",
            ResultCode::ExecuteCommandError => "remote command failed",
            ResultCode::StoreConnectError => "inventory unreachable",
            ResultCode::StoreWriteError => "inventory write failed",
            ResultCode::TokenError => "invalid or missing token",
        }
    }
}

/// Failure of the inventory collaborator. Always fatal to the request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("inventory unreachable: {0}")]
    Connect(String),
    #[error("inventory write failed: {0}")]
    Write(String),
    /// Write refused because it would break a uniqueness rule.
    #[error("{0}")]
    Conflict(String),
}

impl StoreError {
    pub fn code(&self) -> ResultCode {
        match self {
            StoreError::Connect(_) => ResultCode::StoreConnectError,
            StoreError::Write(_) => ResultCode::StoreWriteError,
            StoreError::Conflict(_) => ResultCode::DataExists,
        }
    }
}

/// Why key installation on one host did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProvisionError {
    #[error("ssh connection failed: {0}")]
    Connectivity(String),
    #[error("ssh authentication failed: {0}")]
    Auth(String),
    #[error("remote command failed (exit status {exit_status:?}): {stderr}")]
    RemoteExecution { exit_status: Option<u32>, stderr: String },
    /// No key to install; the host was never contacted.
    #[error(transparent)]
    KeyGeneration(#[from] KeyError),
}

impl ProvisionError {
    pub fn code(&self) -> ResultCode {
        match self {
            ProvisionError::Connectivity(_) => ResultCode::ConnectivityError,
            ProvisionError::Auth(_) => ResultCode::AuthError,
            ProvisionError::RemoteExecution { .. } | ProvisionError::KeyGeneration(_) => {
                ResultCode::ExecuteCommandError
            }
        }
    }
}

/// Request-level failure of a service operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FleetError {
    #[error("{0}")]
    Param(String),
    #[error("{0}")]
    DataExists(String),
    #[error("{0}")]
    NoData(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FleetError {
    pub fn code(&self) -> ResultCode {
        match self {
            FleetError::Param(_) => ResultCode::ParamError,
            FleetError::DataExists(_) => ResultCode::DataExists,
            FleetError::NoData(_) => ResultCode::NoData,
            FleetError::Store(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_store_codes() {
        let err: FleetError = StoreError::Connect("refused".into()).into();
        assert_eq!(err.code(), ResultCode::StoreConnectError);
        let err: FleetError = StoreError::Write("disk full".into()).into();
        assert_eq!(err.code(), ResultCode::StoreWriteError);
        let err: FleetError = StoreError::Conflict("taken".into()).into();
        assert_eq!(err.code(), ResultCode::DataExists);
    }

    #[test]
    fn test_provision_error_codes() {
        assert_eq!(ProvisionError::Auth("denied".into()).code(), ResultCode::AuthError);
        let exec = ProvisionError::RemoteExecution { exit_status: Some(1), stderr: "nope".into() };
        assert_eq!(exec.code(), ResultCode::ExecuteCommandError);
        assert!(exec.to_string().contains("nope"));
    }

    #[test]
    fn test_partial_success_counts_as_success() {
        assert!(ResultCode::PartialSucceeded.is_success());
        assert!(!ResultCode::ParamError.is_success());
    }
}
