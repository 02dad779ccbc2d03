//! High-level codec operations.
//!
//! [`Codec`] owns a compiled codec module and runs every operation against a
//! fresh [`GuestInstance`], so no guest state survives between calls.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use svm_bridge_core::{
    Address, BridgeConfig, DeployTemplateReceipt, ExecAppReceipt, GuestLimits, Receipt,
    ReceiptError, ReceiptKind, SpawnAppReceipt, hex_bytes,
};
use tracing::{debug, info, warn};

use crate::engine::{CodecEngine, IntoShared, SharedEngine};
use crate::error::{CodecError, CodecResult, GuestError};
use crate::guest::GuestInstance;
use crate::module::{CodecModule, ModuleLoader};

/// `wasm_encode_calldata`
pub const ENCODE_CALLDATA: &str = "wasm_encode_calldata";
/// `wasm_decode_calldata`
pub const DECODE_CALLDATA: &str = "wasm_decode_calldata";
/// `wasm_encode_deploy_template`
pub const ENCODE_DEPLOY_TEMPLATE: &str = "wasm_encode_deploy_template";
/// `wasm_encode_spawn_app`
pub const ENCODE_SPAWN_APP: &str = "wasm_encode_spawn_app";
/// `wasm_encode_exec_app`
pub const ENCODE_EXEC_APP: &str = "wasm_encode_exec_app";
/// `wasm_decode_receipt`
pub const DECODE_RECEIPT: &str = "wasm_decode_receipt";

/// Function arguments in their ABI form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    /// ABI type names, one per argument.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abi: Vec<String>,
    /// Argument values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<i64>,
}

impl CallData {
    /// Create calldata from ABI type names and values.
    pub fn new<S: Into<String>>(abi: impl IntoIterator<Item = S>, data: Vec<i64>) -> Self {
        Self {
            abi: abi.into_iter().map(Into::into).collect(),
            data,
        }
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.abi.is_empty() && self.data.is_empty()
    }
}

#[derive(Serialize)]
struct CalldataEnvelope<'a> {
    #[serde(serialize_with = "hex_bytes::serialize")]
    calldata: &'a [u8],
}

#[derive(Deserialize)]
struct CalldataResponse {
    #[serde(with = "hex_bytes")]
    calldata: Vec<u8>,
}

#[derive(Serialize)]
struct DataEnvelope<'a> {
    #[serde(serialize_with = "hex_bytes::serialize")]
    data: &'a [u8],
}

#[derive(Deserialize)]
struct DataResponse {
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
}

#[derive(Serialize)]
struct DeployTemplateRequest<'a> {
    version: u32,
    name: &'a str,
    #[serde(serialize_with = "hex_bytes::serialize")]
    code: &'a [u8],
    #[serde(serialize_with = "hex_bytes::serialize")]
    data: &'a [u8],
}

#[derive(Serialize)]
struct SpawnAppRequest<'a> {
    version: u32,
    template: &'a Address,
    name: &'a str,
    ctor_name: &'a str,
    #[serde(serialize_with = "hex_bytes::serialize")]
    calldata: &'a [u8],
}

#[derive(Serialize)]
struct ExecAppRequest<'a> {
    version: u32,
    app: &'a Address,
    func_name: &'a str,
    #[serde(serialize_with = "hex_bytes::serialize")]
    calldata: &'a [u8],
}

/// The SVM codec.
///
/// `Codec` is `Send + Sync`: the compiled module is shared and every call
/// instantiates its own guest.
///
/// # Example
///
/// ```ignore
/// let codec = Codec::from_file("svm_codec.wasm", &BridgeConfig::default())?;
/// let calldata = codec.encode_calldata(&CallData::new(["i32"], vec![10]))?;
/// ```
#[derive(Clone)]
pub struct Codec {
    engine: SharedEngine,
    module: CodecModule,
    limits: GuestLimits,
}

impl Codec {
    /// Create a codec from an already loaded module.
    pub fn new(engine: SharedEngine, module: CodecModule, limits: GuestLimits) -> Self {
        Self {
            engine,
            module,
            limits,
        }
    }

    /// Compile a codec from WASM bytes.
    pub fn from_bytes(bytes: &[u8], config: &BridgeConfig) -> CodecResult<Self> {
        let engine = CodecEngine::new(config.engine.clone())?.into_shared();
        let module = ModuleLoader::new(engine.clone()).load_bytes(bytes)?;
        Ok(Self::new(engine, module, config.guest.clone()))
    }

    /// Compile a codec from a `.wasm` file.
    pub fn from_file(path: impl AsRef<Path>, config: &BridgeConfig) -> CodecResult<Self> {
        let engine = CodecEngine::new(config.engine.clone())?.into_shared();
        let module = ModuleLoader::new(engine.clone()).load_file(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Codec ready");
        Ok(Self::new(engine, module, config.guest.clone()))
    }

    /// Compile a codec from WAT.
    pub fn from_wat(wat: &str, config: &BridgeConfig) -> CodecResult<Self> {
        let engine = CodecEngine::new(config.engine.clone())?.into_shared();
        let module = ModuleLoader::new(engine.clone()).load_wat(wat)?;
        Ok(Self::new(engine, module, config.guest.clone()))
    }

    /// The engine the module was compiled with.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// The compiled module.
    pub fn module(&self) -> &CodecModule {
        &self.module
    }

    /// A fresh guest instance.
    pub fn instantiate(&self) -> CodecResult<GuestInstance> {
        Ok(GuestInstance::new(&self.engine, &self.module, &self.limits)?)
    }

    /// Run `export` on a JSON request in a fresh instance.
    pub fn invoke<Req, Resp>(&self, export: &str, request: &Req) -> CodecResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut guest = self.instantiate()?;
        Ok(guest.call_json(export, request)?)
    }

    /// Encode function arguments.
    pub fn encode_calldata(&self, calldata: &CallData) -> CodecResult<Vec<u8>> {
        let response: CalldataResponse = self.invoke(ENCODE_CALLDATA, calldata)?;
        Ok(response.calldata)
    }

    /// Decode encoded function arguments.
    pub fn decode_calldata(&self, bytes: &[u8]) -> CodecResult<CallData> {
        self.invoke(DECODE_CALLDATA, &CalldataEnvelope { calldata: bytes })
    }

    /// Decode the return data of a spawn or exec receipt.
    pub fn decode_returndata(&self, bytes: &[u8]) -> CodecResult<CallData> {
        self.decode_calldata(bytes)
    }

    /// Encode a deploy-template transaction.
    pub fn encode_tx_deploy_template(
        &self,
        version: u32,
        name: &str,
        code: &[u8],
        data: &[u8],
    ) -> CodecResult<Vec<u8>> {
        let request = DeployTemplateRequest {
            version,
            name,
            code,
            data,
        };
        let response: DataResponse = self.invoke(ENCODE_DEPLOY_TEMPLATE, &request)?;
        Ok(response.data)
    }

    /// Encode a spawn-app transaction.
    pub fn encode_tx_spawn_app(
        &self,
        version: u32,
        template: &Address,
        name: &str,
        ctor_name: &str,
        calldata: &[u8],
    ) -> CodecResult<Vec<u8>> {
        let request = SpawnAppRequest {
            version,
            template,
            name,
            ctor_name,
            calldata,
        };
        let response: DataResponse = self.invoke(ENCODE_SPAWN_APP, &request)?;
        Ok(response.data)
    }

    /// Encode an exec-app transaction.
    pub fn encode_tx_exec_app(
        &self,
        version: u32,
        app: &Address,
        func_name: &str,
        calldata: &[u8],
    ) -> CodecResult<Vec<u8>> {
        let request = ExecAppRequest {
            version,
            app,
            func_name,
            calldata,
        };
        let response: DataResponse = self.invoke(ENCODE_EXEC_APP, &request)?;
        Ok(response.data)
    }

    /// Decode a raw receipt.
    ///
    /// # Errors
    ///
    /// A receipt carrying `err_type` decodes to [`CodecError::Receipt`].
    /// Unknown discriminants and missing fields are
    /// [`GuestError::MalformedResponse`].
    pub fn decode_receipt(&self, raw: &[u8]) -> CodecResult<Receipt> {
        let value: serde_json::Value = self.invoke(DECODE_RECEIPT, &DataEnvelope { data: raw })?;
        receipt_from_json(value)
    }

    /// Decode a deploy-template receipt.
    pub fn decode_deploy_template_receipt(&self, raw: &[u8]) -> CodecResult<DeployTemplateReceipt> {
        match self.decode_receipt(raw)? {
            Receipt::DeployTemplate(receipt) => Ok(receipt),
            other => Err(unexpected(ReceiptKind::DeployTemplate, &other)),
        }
    }

    /// Decode a spawn-app receipt.
    pub fn decode_spawn_app_receipt(&self, raw: &[u8]) -> CodecResult<SpawnAppReceipt> {
        match self.decode_receipt(raw)? {
            Receipt::SpawnApp(receipt) => Ok(receipt),
            other => Err(unexpected(ReceiptKind::SpawnApp, &other)),
        }
    }

    /// Decode an exec-app receipt.
    pub fn decode_exec_app_receipt(&self, raw: &[u8]) -> CodecResult<ExecAppReceipt> {
        match self.decode_receipt(raw)? {
            Receipt::ExecApp(receipt) => Ok(receipt),
            other => Err(unexpected(ReceiptKind::ExecApp, &other)),
        }
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("module", &self.module)
            .field("limits", &self.limits)
            .finish()
    }
}

fn receipt_from_json(value: serde_json::Value) -> CodecResult<Receipt> {
    let malformed = |e: serde_json::Error| {
        warn!(error = %e, "Malformed receipt");
        CodecError::from(GuestError::MalformedResponse(e.to_string()))
    };

    if value.get("err_type").is_some() {
        let err: ReceiptError = serde_json::from_value(value).map_err(malformed)?;
        debug!(err_type = %err.kind(), "Decoded failed receipt");
        return Err(CodecError::Receipt(err));
    }

    let receipt: Receipt = serde_json::from_value(value).map_err(malformed)?;
    debug!(kind = %receipt.kind(), gas_used = receipt.gas_used(), "Decoded receipt");
    Ok(receipt)
}

fn unexpected(expected: ReceiptKind, found: &Receipt) -> CodecError {
    CodecError::UnexpectedReceipt {
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CODEC_WAT;
    use svm_bridge_core::ReceiptErrorKind;

    const ADDR: &str = "bc213ffe5f285adf9b2df9975a98a8f3b8106bf7";

    fn codec() -> Codec {
        let config = BridgeConfig::default().with_guest_limits(GuestLimits::minimal());
        Codec::from_wat(CODEC_WAT, &config).unwrap()
    }

    fn deploy_receipt(gas_used: u64) -> Vec<u8> {
        format!(r#"{{"type":"deploy-template","success":true,"addr":"{ADDR}","gas_used":{gas_used}}}"#)
            .into_bytes()
    }

    #[test]
    fn test_codec_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Codec>();
    }

    #[test]
    fn test_calldata_round_trip() {
        let codec = codec();
        let calldata = CallData::new(["i32", "i64"], vec![10, -20]);

        let encoded = codec.encode_calldata(&calldata).unwrap();
        assert_eq!(codec.decode_calldata(&encoded).unwrap(), calldata);
        assert_eq!(codec.decode_returndata(&encoded).unwrap(), calldata);
    }

    #[test]
    fn test_empty_calldata_omits_fields() {
        let codec = codec();

        let encoded = codec.encode_calldata(&CallData::default()).unwrap();
        assert_eq!(encoded, b"{}");
        assert!(codec.decode_calldata(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_encode_deploy_template_request() {
        let codec = codec();

        let tx = codec
            .encode_tx_deploy_template(0, "counter", &[0xde, 0xad], &[1])
            .unwrap();
        let request: serde_json::Value = serde_json::from_slice(&tx).unwrap();
        assert_eq!(request["version"], 0);
        assert_eq!(request["name"], "counter");
        assert_eq!(request["code"], "dead");
        assert_eq!(request["data"], "01");
    }

    #[test]
    fn test_encode_spawn_app_keeps_name_and_ctor() {
        let codec = codec();
        let template: Address = ADDR.parse().unwrap();

        let tx = codec
            .encode_tx_spawn_app(1, &template, "my-app", "initialize", &[9])
            .unwrap();
        let request: serde_json::Value = serde_json::from_slice(&tx).unwrap();
        assert_eq!(request["template"], ADDR);
        assert_eq!(request["name"], "my-app");
        assert_eq!(request["ctor_name"], "initialize");
        assert_eq!(request["calldata"], "09");
    }

    #[test]
    fn test_encode_exec_app_request() {
        let codec = codec();
        let app: Address = ADDR.parse().unwrap();

        let tx = codec.encode_tx_exec_app(0, &app, "add", &[]).unwrap();
        let request: serde_json::Value = serde_json::from_slice(&tx).unwrap();
        assert_eq!(request["app"], ADDR);
        assert_eq!(request["func_name"], "add");
        assert_eq!(request["calldata"], "");
    }

    #[test]
    fn test_deploy_receipt_round_trip() {
        let codec = codec();

        let receipt = codec
            .decode_deploy_template_receipt(&deploy_receipt(1234))
            .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.template_addr.to_string(), ADDR);
        assert_eq!(receipt.gas_used, 1234);
    }

    #[test]
    fn test_decode_receipt_is_idempotent() {
        let codec = codec();
        let raw = deploy_receipt(u64::MAX);

        let first = codec.decode_receipt(&raw).unwrap();
        let second = codec.decode_receipt(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.gas_used(), u64::MAX);
    }

    #[test]
    fn test_error_receipt() {
        let codec = codec();
        let raw = format!(r#"{{"err_type":"app-not-found","app_addr":"{ADDR}"}}"#);

        let err = codec.decode_receipt(raw.as_bytes()).unwrap_err();
        let CodecError::Receipt(receipt_err) = err else {
            panic!("Expected receipt error, got {err:?}");
        };
        assert_eq!(receipt_err.kind(), ReceiptErrorKind::AppNotFound);
        assert_eq!(receipt_err.to_string(), format!("app not found; app address: {ADDR}"));
    }

    #[test]
    fn test_unknown_receipt_type_is_fatal() {
        let codec = codec();

        let err = codec.decode_receipt(br#"{"type":"burn-app"}"#).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Guest(GuestError::MalformedResponse(_))
        ));
        assert!(err.is_fatal());

        let err = codec.decode_receipt(br#"{"err_type":"meltdown"}"#).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Guest(GuestError::MalformedResponse(_))
        ));
        assert!(err.is_fatal());

        let err = codec.decode_receipt(b"not json").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_short_address_is_malformed() {
        let codec = codec();
        let raw = br#"{"type":"deploy-template","success":true,"addr":"bc21","gas_used":1}"#;

        let err = codec.decode_receipt(raw).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Guest(GuestError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_typed_decoder_rejects_other_kind() {
        let codec = codec();

        let err = codec.decode_spawn_app_receipt(&deploy_receipt(1)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedReceipt {
                expected: ReceiptKind::SpawnApp,
                found: ReceiptKind::DeployTemplate
            }
        ));
    }

    #[test]
    fn test_exec_receipt() {
        let codec = codec();
        let raw = br#"{"type":"exec-app","success":true,"new_state":"0102","returndata":"","gas_used":5,"logs":[]}"#;

        let receipt = codec.decode_exec_app_receipt(raw).unwrap();
        assert_eq!(receipt.new_state, vec![1, 2]);
        assert_eq!(receipt.gas_used, 5);
    }

    #[test]
    fn test_domain_error_via_invoke() {
        let codec = codec();

        let err = codec
            .invoke::<_, serde_json::Value>("wasm_fail", &CallData::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::Guest(GuestError::Domain(msg)) if msg == "boom"));
    }

    #[test]
    fn test_fatal_error_via_invoke() {
        let codec = codec();

        let err = codec
            .invoke::<_, serde_json::Value>("wasm_bad_marker", &CallData::default())
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
