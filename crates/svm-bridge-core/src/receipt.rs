//! Receipts produced by deploy, spawn and exec operations.
//!
//! These types mirror the codec's receipt JSON. A successful receipt is
//! discriminated by its `type` field, a failed one by its `err_type` field.
//! Failed receipts are ordinary outcomes and are represented as
//! [`ReceiptError`] values rather than panics.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, hex_bytes};

/// Outcome of a template deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTemplateReceipt {
    /// Whether the deployment succeeded.
    pub success: bool,
    /// Address of the deployed template.
    #[serde(rename = "addr")]
    pub template_addr: Address,
    /// Gas consumed.
    pub gas_used: u64,
}

/// Outcome of spawning an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnAppReceipt {
    /// Whether the spawn succeeded.
    pub success: bool,
    /// Address of the new app.
    #[serde(rename = "addr")]
    pub app_addr: Address,
    /// Initial app state.
    #[serde(rename = "init_state", with = "hex_bytes")]
    pub state: Vec<u8>,
    /// Encoded constructor return data.
    #[serde(with = "hex_bytes", default)]
    pub returndata: Vec<u8>,
    /// Gas consumed.
    pub gas_used: u64,
    /// Log lines emitted during the constructor.
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Outcome of executing an app transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecAppReceipt {
    /// Whether execution succeeded.
    pub success: bool,
    /// App state after execution.
    #[serde(with = "hex_bytes")]
    pub new_state: Vec<u8>,
    /// Encoded function return data.
    #[serde(with = "hex_bytes", default)]
    pub returndata: Vec<u8>,
    /// Gas consumed.
    pub gas_used: u64,
    /// Log lines emitted during execution.
    #[serde(default)]
    pub logs: Vec<String>,
}

impl fmt::Display for ExecAppReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "New State: {}", hex::encode(&self.new_state))?;
        writeln!(f, "Returndata: {}", hex::encode(&self.returndata))?;
        writeln!(f, "Logs: {:?}", self.logs)?;
        writeln!(f, "GasUsed: {}", self.gas_used)
    }
}

/// A successful receipt of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Receipt {
    /// `deploy-template`
    DeployTemplate(DeployTemplateReceipt),
    /// `spawn-app`
    SpawnApp(SpawnAppReceipt),
    /// `exec-app`
    ExecApp(ExecAppReceipt),
}

impl Receipt {
    /// The receipt's discriminant.
    pub fn kind(&self) -> ReceiptKind {
        match self {
            Self::DeployTemplate(_) => ReceiptKind::DeployTemplate,
            Self::SpawnApp(_) => ReceiptKind::SpawnApp,
            Self::ExecApp(_) => ReceiptKind::ExecApp,
        }
    }

    /// Gas consumed, whatever the kind.
    pub fn gas_used(&self) -> u64 {
        match self {
            Self::DeployTemplate(r) => r.gas_used,
            Self::SpawnApp(r) => r.gas_used,
            Self::ExecApp(r) => r.gas_used,
        }
    }
}

/// Discriminant of a successful receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptKind {
    /// `deploy-template`
    DeployTemplate,
    /// `spawn-app`
    SpawnApp,
    /// `exec-app`
    ExecApp,
}

impl fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeployTemplate => write!(f, "deploy-template"),
            Self::SpawnApp => write!(f, "spawn-app"),
            Self::ExecApp => write!(f, "exec-app"),
        }
    }
}

/// A failed receipt, discriminated by `err_type`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "err_type", rename_all = "kebab-case")]
pub enum ReceiptError {
    /// Ran out of gas.
    #[error("out of gas")]
    Oog,

    /// No template at the given address.
    #[error("template not found; template address: {template_addr}")]
    TemplateNotFound {
        /// The missing template.
        template_addr: Address,
    },

    /// No app at the given address.
    #[error("app not found; app address: {app_addr}")]
    AppNotFound {
        /// The missing app.
        app_addr: Address,
    },

    /// The template code failed to compile.
    #[error(
        "compilation failed; template address: {template_addr}, app address: {app_addr}, msg: {message}"
    )]
    CompilationFailed {
        /// Template being compiled.
        template_addr: Address,
        /// App being run.
        app_addr: Address,
        /// Compiler message.
        message: String,
    },

    /// The compiled template failed to instantiate.
    #[error(
        "instantiation failed; template address: {template_addr}, app address: {app_addr}, msg: {message}"
    )]
    InstantiationFailed {
        /// Template being instantiated.
        template_addr: Address,
        /// App being run.
        app_addr: Address,
        /// Instantiation message.
        message: String,
    },

    /// The requested function is not exported.
    #[error(
        "function not found; template address: {template_addr}, app address: {app_addr}, func: {func}"
    )]
    FunctionNotFound {
        /// Template of the app.
        template_addr: Address,
        /// App being run.
        app_addr: Address,
        /// Requested function.
        func: String,
    },

    /// The function trapped or returned an error.
    #[error(
        "function failed; template address: {template_addr}, app address: {app_addr}, func: {func}, msg: {message}"
    )]
    FunctionFailed {
        /// Template of the app.
        template_addr: Address,
        /// App being run.
        app_addr: Address,
        /// Function that failed.
        func: String,
        /// Failure message.
        message: String,
    },
}

impl ReceiptError {
    /// The error discriminant.
    pub fn kind(&self) -> ReceiptErrorKind {
        match self {
            Self::Oog => ReceiptErrorKind::Oog,
            Self::TemplateNotFound { .. } => ReceiptErrorKind::TemplateNotFound,
            Self::AppNotFound { .. } => ReceiptErrorKind::AppNotFound,
            Self::CompilationFailed { .. } => ReceiptErrorKind::CompilationFailed,
            Self::InstantiationFailed { .. } => ReceiptErrorKind::InstantiationFailed,
            Self::FunctionNotFound { .. } => ReceiptErrorKind::FunctionNotFound,
            Self::FunctionFailed { .. } => ReceiptErrorKind::FunctionFailed,
        }
    }
}

/// Discriminant of a failed receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptErrorKind {
    /// `oog`
    Oog,
    /// `template-not-found`
    TemplateNotFound,
    /// `app-not-found`
    AppNotFound,
    /// `compilation-failed`
    CompilationFailed,
    /// `instantiation-failed`
    InstantiationFailed,
    /// `function-not-found`
    FunctionNotFound,
    /// `function-failed`
    FunctionFailed,
}

impl ReceiptErrorKind {
    /// The `err_type` string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oog => "oog",
            Self::TemplateNotFound => "template-not-found",
            Self::AppNotFound => "app-not-found",
            Self::CompilationFailed => "compilation-failed",
            Self::InstantiationFailed => "instantiation-failed",
            Self::FunctionNotFound => "function-not-found",
            Self::FunctionFailed => "function-failed",
        }
    }
}

impl fmt::Display for ReceiptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "bc213ffe5f285adf9b2df9975a98a8f3b8106bf7";

    #[test]
    fn test_deploy_receipt_json() {
        let json = format!(
            r#"{{"type":"deploy-template","success":true,"addr":"{ADDR}","gas_used":42}}"#
        );
        let receipt: Receipt = serde_json::from_str(&json).unwrap();

        let Receipt::DeployTemplate(deploy) = receipt else {
            panic!("Expected deploy-template receipt");
        };
        assert!(deploy.success);
        assert_eq!(deploy.template_addr.to_string(), ADDR);
        assert_eq!(deploy.gas_used, 42);
    }

    #[test]
    fn test_spawn_receipt_json() {
        let json = format!(
            r#"{{"type":"spawn-app","success":true,"addr":"{ADDR}","init_state":"0a0b","returndata":"","gas_used":7,"logs":["hi"]}}"#
        );
        let receipt: Receipt = serde_json::from_str(&json).unwrap();
        assert_eq!(receipt.kind(), ReceiptKind::SpawnApp);
        assert_eq!(receipt.gas_used(), 7);

        let Receipt::SpawnApp(spawn) = receipt else {
            panic!("Expected spawn-app receipt");
        };
        assert_eq!(spawn.state, vec![0x0a, 0x0b]);
        assert_eq!(spawn.logs, vec!["hi".to_string()]);
    }

    #[test]
    fn test_large_gas_is_exact() {
        let json = r#"{"type":"exec-app","success":true,"new_state":"","gas_used":18446744073709551615}"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.gas_used(), u64::MAX);
    }

    #[test]
    fn test_error_receipts() {
        let oog: ReceiptError = serde_json::from_str(r#"{"err_type":"oog"}"#).unwrap();
        assert_eq!(oog, ReceiptError::Oog);
        assert_eq!(oog.kind().as_str(), "oog");

        let json = format!(
            r#"{{"err_type":"function-failed","template_addr":"{ADDR}","app_addr":"{ADDR}","func":"run","message":"boom"}}"#
        );
        let failed: ReceiptError = serde_json::from_str(&json).unwrap();
        assert_eq!(failed.kind(), ReceiptErrorKind::FunctionFailed);
        assert!(failed.to_string().contains("func: run, msg: boom"));
    }

    #[test]
    fn test_unknown_discriminant_rejected() {
        assert!(serde_json::from_str::<Receipt>(r#"{"type":"burn"}"#).is_err());
        assert!(serde_json::from_str::<ReceiptError>(r#"{"err_type":"meltdown"}"#).is_err());
    }
}
