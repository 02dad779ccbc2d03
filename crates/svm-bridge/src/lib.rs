//! # SVM Bridge
//!
//! Drives the SVM runtime library and its WebAssembly codec from Rust.
//!
//! ## Overview
//!
//! - Transactions are encoded and validated by the native runtime library
//! - Deploy, spawn and exec run in a native [`Runtime`] and return raw
//!   receipts
//! - Receipts are decoded by the codec guest into typed values
//! - Host functions written as closures are called by the runtime as imports
//!
//! Every call either returns a fully decoded result or a typed [`SvmError`].
//! A failed receipt surfaces as [`SvmError::Receipt`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use svm_bridge::prelude::*;
//!
//! let bridge = Svm::builder()
//!     .with_library_path("libsvm_runtime_c_api.so")
//!     .with_codec_path("svm_codec.wasm")
//!     .build()?;
//!
//! let mut imports = bridge.imports();
//! imports.register_function("add", &[ValueType::I32, ValueType::I32], &[ValueType::I32], add)?;
//! let table = imports.build_native(bridge.library())?;
//! let mut runtime = bridge.runtime(table, bridge.new_kv_store()?)?;
//!
//! let template = bridge.encode_app_template("counter", &wasm, &DataLayout::new(vec![4]))?;
//! let receipt = bridge.deploy_template(&mut runtime, &template, &author)?;
//! println!("template deployed at {}", receipt.template_addr);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │                   svm-bridge (facade)                   │
//! │  ┌──────────────┬──────────────────┬─────────────────┐  │
//! │  │ svm-bridge-  │ svm-bridge-      │ svm-bridge-     │  │
//! │  │ codec        │ native           │ host            │  │
//! │  │ (wasmtime)   │ (libloading)     │ (registry)      │  │
//! │  └──────────────┴──────────────────┴─────────────────┘  │
//! ├─────────────────────────────────────────────────────────┤
//! │                    svm-bridge-core                      │
//! └─────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use svm_bridge_codec::Codec;
use svm_bridge_core::{
    Address, BridgeConfig, ConfigError, DeployTemplateReceipt, ExecAppReceipt, GasConfig,
    GuestLimits, SpawnAppReceipt,
};
use svm_bridge_host::ImportsBuilder;
use svm_bridge_native::{CallMessage, DataLayout, GasOptions, NativeLibrary, SpawnMessage};
use tracing::{debug, info};

pub mod error;
pub mod runtime;

pub use error::{SvmError, SvmResult};
pub use runtime::{MemKvStore, Runtime, RuntimeId};

// Re-export from sub-crates
pub use svm_bridge_codec;
pub use svm_bridge_core;
pub use svm_bridge_host;
pub use svm_bridge_native;

/// Main entry point for the bridge.
pub struct Svm;

impl Svm {
    /// Create a new bridge builder.
    pub fn builder() -> SvmBuilder {
        SvmBuilder::new()
    }
}

enum CodecSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
    Wat(String),
}

/// Builder for configuring an [`SvmBridge`].
pub struct SvmBuilder {
    config: BridgeConfig,
    library: Option<Arc<NativeLibrary>>,
    codec: Option<CodecSource>,
}

impl SvmBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            library: None,
            codec: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    // Native library

    /// Use an already loaded library.
    pub fn with_library(mut self, library: Arc<NativeLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Load the library from a path at build time.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_library_path(path);
        self
    }

    // Codec

    /// Compile the codec from binary WebAssembly.
    pub fn with_codec_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.codec = Some(CodecSource::Bytes(bytes.into()));
        self
    }

    /// Load the codec from a file at build time.
    pub fn with_codec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.codec = Some(CodecSource::Path(path.into()));
        self
    }

    /// Compile the codec from WAT text.
    pub fn with_codec_wat(mut self, wat: impl Into<String>) -> Self {
        self.codec = Some(CodecSource::Wat(wat.into()));
        self
    }

    // Execution

    /// Set the guest limits for codec instances.
    pub fn with_guest_limits(mut self, limits: GuestLimits) -> Self {
        self.config = self.config.with_guest_limits(limits);
        self
    }

    /// Set the default gas options for new runtimes.
    pub fn with_gas(mut self, gas: GasConfig) -> Self {
        self.config = self.config.with_gas(gas);
        self
    }

    /// Set the transaction version used by the encoders.
    pub fn with_tx_version(mut self, version: u32) -> Self {
        self.config = self.config.with_tx_version(version);
        self
    }

    /// Build the bridge.
    pub fn build(self) -> SvmResult<SvmBridge> {
        self.config.validate()?;

        let library = match self.library {
            Some(library) => library,
            None => {
                let path = self
                    .config
                    .library_path
                    .as_ref()
                    .ok_or(SvmError::MissingLibrary)?;
                Arc::new(NativeLibrary::load(path)?)
            }
        };

        let codec = match self.codec {
            Some(CodecSource::Bytes(bytes)) => Codec::from_bytes(&bytes, &self.config)?,
            Some(CodecSource::Path(path)) => Codec::from_file(path, &self.config)?,
            Some(CodecSource::Wat(wat)) => Codec::from_wat(&wat, &self.config)?,
            None => {
                let path = self
                    .config
                    .codec_path
                    .as_ref()
                    .ok_or(SvmError::MissingCodec)?;
                Codec::from_file(path, &self.config)?
            }
        };

        info!(
            library = ?library.path(),
            tx_version = self.config.tx_version,
            "Built SVM bridge"
        );

        Ok(SvmBridge {
            config: self.config,
            library,
            codec,
        })
    }
}

impl Default for SvmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured bridge: the native library plus the codec.
pub struct SvmBridge {
    config: BridgeConfig,
    library: Arc<NativeLibrary>,
    codec: Codec,
}

impl SvmBridge {
    /// The configuration the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The native library.
    pub fn library(&self) -> &Arc<NativeLibrary> {
        &self.library
    }

    /// The codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Start declaring host imports.
    pub fn imports(&self) -> ImportsBuilder {
        ImportsBuilder::new()
    }

    /// Create an in-memory state store.
    pub fn new_kv_store(&self) -> SvmResult<MemKvStore> {
        MemKvStore::new(&self.library)
    }

    /// Create a runtime over `imports` and `kv`.
    ///
    /// The import table must have been built with
    /// [`ImportsBuilder::build_native`].
    pub fn runtime(
        &self,
        imports: svm_bridge_host::ImportTable,
        kv: MemKvStore,
    ) -> SvmResult<Runtime> {
        Runtime::new(&self.library, imports, kv, GasOptions::from(self.config.gas))
    }

    // Templates

    /// Encode an app template.
    pub fn encode_app_template(
        &self,
        name: &str,
        code: &[u8],
        data_layout: &DataLayout,
    ) -> SvmResult<Vec<u8>> {
        Ok(self
            .library
            .encode_app_template(self.config.tx_version, name, code, data_layout)?)
    }

    /// Validate an encoded template.
    pub fn validate_template(&self, runtime: &mut Runtime, template: &[u8]) -> SvmResult<()> {
        Ok(self.library.validate_template(runtime.handle()?, template)?)
    }

    /// Deploy a template.
    pub fn deploy_template(
        &self,
        runtime: &mut Runtime,
        template: &[u8],
        author: &Address,
    ) -> SvmResult<DeployTemplateReceipt> {
        debug!(runtime_id = %runtime.id(), %author, "Deploying template");
        let raw = self
            .library
            .deploy_template(runtime.handle()?, template, author, runtime.gas())?;
        Ok(self.codec.decode_deploy_template_receipt(&raw)?)
    }

    // Apps

    /// Encode a spawn-app transaction.
    pub fn encode_spawn_app(
        &self,
        template_addr: &Address,
        name: &str,
        ctor_name: &str,
        calldata: &[u8],
    ) -> SvmResult<Vec<u8>> {
        Ok(self.library.encode_spawn_app(
            self.config.tx_version,
            template_addr,
            name,
            ctor_name,
            calldata,
        )?)
    }

    /// Validate an encoded spawn-app transaction.
    pub fn validate_app(&self, runtime: &mut Runtime, app: &[u8]) -> SvmResult<()> {
        Ok(self.library.validate_app(runtime.handle()?, app)?)
    }

    /// Spawn an app.
    pub fn spawn_app(
        &self,
        runtime: &mut Runtime,
        app: &[u8],
        creator: &Address,
    ) -> SvmResult<SpawnAppReceipt> {
        debug!(runtime_id = %runtime.id(), %creator, "Spawning app");
        let raw = self
            .library
            .spawn_app(runtime.handle()?, app, creator, runtime.gas())?;
        Ok(self.codec.decode_spawn_app_receipt(&raw)?)
    }

    // Transactions

    /// Encode an app transaction.
    pub fn encode_app_tx(
        &self,
        app_addr: &Address,
        func_name: &str,
        calldata: &[u8],
    ) -> SvmResult<Vec<u8>> {
        Ok(self
            .library
            .encode_app_tx(self.config.tx_version, app_addr, func_name, calldata)?)
    }

    /// Validate an app transaction and return the target app's address.
    pub fn validate_tx(&self, runtime: &mut Runtime, tx: &[u8]) -> SvmResult<Address> {
        Ok(self.library.validate_tx(runtime.handle()?, tx)?)
    }

    /// Execute an app transaction against `state`.
    pub fn exec_app(&self, runtime: &mut Runtime, tx: &[u8], state: &[u8]) -> SvmResult<ExecAppReceipt> {
        debug!(runtime_id = %runtime.id(), len = tx.len(), "Executing app transaction");
        let raw = self
            .library
            .exec_app(runtime.handle()?, tx, state, runtime.gas())?;
        Ok(self.codec.decode_exec_app_receipt(&raw)?)
    }

    // Messages

    /// Encode a binary call message for `target`.
    pub fn encode_call_message(
        &self,
        target: &Address,
        func_name: &str,
        verify_data: &[u8],
        calldata: &[u8],
    ) -> SvmResult<Vec<u8>> {
        let message = CallMessage {
            version: self.message_version()?,
            target: *target,
            func_name: func_name.to_string(),
            verify_data: verify_data.to_vec(),
            calldata: calldata.to_vec(),
        };
        Ok(message.encode()?)
    }

    /// Encode a binary spawn message for `template`.
    pub fn encode_spawn_message(
        &self,
        template: &Address,
        name: &str,
        ctor_name: &str,
        calldata: &[u8],
    ) -> SvmResult<Vec<u8>> {
        let message = SpawnMessage {
            version: self.message_version()?,
            template: *template,
            name: name.to_string(),
            ctor_name: ctor_name.to_string(),
            calldata: calldata.to_vec(),
        };
        Ok(message.encode()?)
    }

    fn message_version(&self) -> SvmResult<u16> {
        let version = self.config.tx_version;
        u16::try_from(version).map_err(|_| {
            SvmError::Config(ConfigError::Invalid(format!(
                "tx_version {version} does not fit a message version"
            )))
        })
    }
}

impl std::fmt::Debug for SvmBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvmBridge")
            .field("library", &self.library)
            .field("tx_version", &self.config.tx_version)
            .finish()
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{MemKvStore, Runtime, RuntimeId, Svm, SvmBridge, SvmBuilder, SvmError, SvmResult};

    // Core types
    pub use svm_bridge_core::{
        Address, BridgeConfig, DeployTemplateReceipt, ExecAppReceipt, GasConfig, GuestLimits,
        Receipt, ReceiptError, SpawnAppReceipt, Value, ValueType,
    };

    // Codec, native and host types
    pub use svm_bridge_codec::{CallData, Codec};
    pub use svm_bridge_host::{ImportTable, ImportsBuilder};
    pub use svm_bridge_native::{CallMessage, DataLayout, GasOptions, NativeLibrary, SpawnMessage};

    // Common std types
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use svm_bridge_codec::testing::CODEC_WAT;
    use svm_bridge_core::{ReceiptError, Value, ValueType, value};
    use svm_bridge_host::{HostError, ImportTable, registry};
    use svm_bridge_native::NativeError;
    use svm_bridge_native::testing::{FAKE_GAS_USED, fake_library, live_allocations};

    const AUTHOR: Address = Address::new([0xab; 20]);

    fn bridge() -> SvmBridge {
        Svm::builder()
            .with_config(BridgeConfig::default().with_guest_limits(GuestLimits::minimal()))
            .with_library(Arc::new(fake_library()))
            .with_codec_wat(CODEC_WAT)
            .build()
            .unwrap()
    }

    fn add(args: &[Value]) -> anyhow::Result<Vec<Value>> {
        match args {
            [Value::I32(a), Value::I32(b)] => Ok(vec![Value::I32(a + b)]),
            _ => anyhow::bail!("add expects two i32"),
        }
    }

    fn imports(bridge: &SvmBridge) -> ImportTable {
        let mut imports = bridge.imports();
        imports
            .register_function("add", &[ValueType::I32, ValueType::I32], &[ValueType::I32], add)
            .unwrap()
            .register_function("refuse", &[], &[], |_| anyhow::bail!("refused"))
            .unwrap();
        imports.build_native(bridge.library()).unwrap()
    }

    fn runtime(bridge: &SvmBridge) -> Runtime {
        bridge
            .runtime(imports(bridge), bridge.new_kv_store().unwrap())
            .unwrap()
    }

    /// Deploy a template and spawn an app from it.
    fn spawned(bridge: &SvmBridge, runtime: &mut Runtime) -> SpawnAppReceipt {
        let template = bridge
            .encode_app_template("counter", b"\0asm", &DataLayout::new(vec![4]))
            .unwrap();
        let deployed = bridge.deploy_template(runtime, &template, &AUTHOR).unwrap();
        let app = bridge
            .encode_spawn_app(&deployed.template_addr, "my-app", "initialize", &[])
            .unwrap();
        bridge.spawn_app(runtime, &app, &AUTHOR).unwrap()
    }

    #[test]
    fn test_deploy_template() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);

        let template = bridge
            .encode_app_template("counter", b"\0asm", &DataLayout::new(vec![4, 8]))
            .unwrap();
        bridge.validate_template(&mut runtime, &template).unwrap();

        let receipt = bridge.deploy_template(&mut runtime, &template, &AUTHOR).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.template_addr, Address::from_bytes(b"counter"));
        assert_eq!(receipt.gas_used, FAKE_GAS_USED);
    }

    #[test]
    fn test_spawn_and_exec_calls_host_function() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);

        let spawned = spawned(&bridge, &mut runtime);
        assert_eq!(spawned.app_addr, Address::from_bytes(b"my-app"));
        assert_eq!(spawned.state, vec![0]);

        let calldata = value::encode_values(&[Value::I32(3), Value::I32(5)]).unwrap();
        let tx = bridge
            .encode_app_tx(&spawned.app_addr, "add", &calldata)
            .unwrap();
        assert_eq!(bridge.validate_tx(&mut runtime, &tx).unwrap(), spawned.app_addr);

        let receipt = bridge.exec_app(&mut runtime, &tx, &spawned.state).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.new_state, spawned.state);
        assert_eq!(
            value::decode_values(&receipt.returndata).unwrap(),
            vec![Value::I32(8)]
        );
    }

    #[test]
    fn test_host_function_failure_is_receipt_error() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);
        let spawned = spawned(&bridge, &mut runtime);

        let tx = bridge.encode_app_tx(&spawned.app_addr, "refuse", &[]).unwrap();
        let err = bridge.exec_app(&mut runtime, &tx, &spawned.state).unwrap_err();
        let SvmError::Receipt(ReceiptError::FunctionFailed { func, message, .. }) = err else {
            panic!("Expected function-failed receipt, got {err:?}");
        };
        assert_eq!(func, "refuse");
        assert!(message.ends_with("refused"));
    }

    #[test]
    fn test_missing_function_is_receipt_error() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);
        let spawned = spawned(&bridge, &mut runtime);

        let tx = bridge.encode_app_tx(&spawned.app_addr, "missing", &[]).unwrap();
        let err = bridge.exec_app(&mut runtime, &tx, &spawned.state).unwrap_err();
        assert!(matches!(
            err,
            SvmError::Receipt(ReceiptError::FunctionNotFound { .. })
        ));
    }

    #[test]
    fn test_runtimes_on_separate_threads() {
        let bridge = bridge();
        let factors = [2, 3];

        thread::scope(|scope| {
            let workers: Vec<_> = factors
                .into_iter()
                .map(|factor| {
                    let bridge = &bridge;
                    scope.spawn(move || {
                        let mut imports = bridge.imports();
                        imports
                            .register_function(
                                "scale",
                                &[ValueType::I32],
                                &[ValueType::I32],
                                move |args| match args {
                                    [Value::I32(x)] => Ok(vec![Value::I32(x * factor)]),
                                    _ => anyhow::bail!("scale expects one i32"),
                                },
                            )
                            .unwrap();
                        let table = imports.build_native(bridge.library()).unwrap();
                        let mut runtime = bridge
                            .runtime(table, bridge.new_kv_store().unwrap())
                            .unwrap();
                        let spawned = spawned(bridge, &mut runtime);

                        let results: Vec<i32> = (0..25)
                            .map(|x| {
                                let calldata = value::encode_values(&[Value::I32(x)]).unwrap();
                                let tx = bridge
                                    .encode_app_tx(&spawned.app_addr, "scale", &calldata)
                                    .unwrap();
                                let receipt =
                                    bridge.exec_app(&mut runtime, &tx, &spawned.state).unwrap();
                                match value::decode_values(&receipt.returndata).unwrap().as_slice() {
                                    [Value::I32(y)] => *y,
                                    other => panic!("Expected one i32, got {other:?}"),
                                }
                            })
                            .collect();

                        runtime.destroy();
                        assert_eq!(live_allocations(), 0);
                        results
                    })
                })
                .collect();

            for (worker, factor) in workers.into_iter().zip(factors) {
                let results = worker.join().unwrap();
                let expected: Vec<i32> = (0..25).map(|x| x * factor).collect();
                assert_eq!(results, expected);
            }
        });
    }

    #[test]
    fn test_spawn_unknown_template() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);
        let unknown = Address::new([9; 20]);

        let app = bridge.encode_spawn_app(&unknown, "orphan", "init", &[]).unwrap();
        let err = bridge.spawn_app(&mut runtime, &app, &AUTHOR).unwrap_err();
        assert!(matches!(
            err,
            SvmError::Receipt(ReceiptError::TemplateNotFound { template_addr }) if template_addr == unknown
        ));
    }

    #[test]
    fn test_out_of_gas() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge).with_gas(GasOptions {
            metering: true,
            limit: FAKE_GAS_USED - 1,
        });

        let template = bridge
            .encode_app_template("counter", b"\0asm", &DataLayout::default())
            .unwrap();
        let err = bridge.deploy_template(&mut runtime, &template, &AUTHOR).unwrap_err();
        assert!(matches!(err, SvmError::Receipt(ReceiptError::Oog)));
    }

    #[test]
    fn test_invalid_template_is_native_error() {
        let bridge = bridge();
        let mut runtime = runtime(&bridge);

        let err = bridge.validate_template(&mut runtime, b"garbage").unwrap_err();
        assert!(matches!(
            err,
            SvmError::Native(NativeError::Status { operation: "validate_template", .. })
        ));
    }

    #[test]
    fn test_guest_table_rejected() {
        let bridge = bridge();
        let table = bridge.imports().build_guest();

        let err = bridge
            .runtime(table, bridge.new_kv_store().unwrap())
            .unwrap_err();
        assert!(matches!(err, SvmError::NotNative));
    }

    #[test]
    fn test_runtime_teardown_releases_everything() {
        {
            let bridge = bridge();
            let mut runtime = runtime(&bridge);
            let handles = runtime.imports().handles();
            let spawned = spawned(&bridge, &mut runtime);

            let calldata = value::encode_values(&[Value::I32(1), Value::I32(2)]).unwrap();
            let tx = bridge.encode_app_tx(&spawned.app_addr, "add", &calldata).unwrap();
            bridge.exec_app(&mut runtime, &tx, &spawned.state).unwrap();

            runtime.destroy();
            for handle in handles {
                let err = registry().invoke(handle, &[]).unwrap_err();
                assert!(matches!(err, HostError::HandleNotFound(_)));
            }
        }
        assert_eq!(live_allocations(), 0);
    }

    #[test]
    fn test_builder_requires_library() {
        let err = Svm::builder().with_codec_wat(CODEC_WAT).build().unwrap_err();
        assert!(matches!(err, SvmError::MissingLibrary));
    }

    #[test]
    fn test_builder_requires_codec() {
        let err = Svm::builder()
            .with_library(Arc::new(fake_library()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SvmError::MissingCodec));
    }

    #[test]
    fn test_builder_validates_config() {
        let config = BridgeConfig::default().with_guest_limits(GuestLimits::new().with_max_memory(1));
        let err = Svm::builder()
            .with_config(config)
            .with_library(Arc::new(fake_library()))
            .with_codec_wat(CODEC_WAT)
            .build()
            .unwrap_err();
        assert!(matches!(err, SvmError::Config(_)));
    }

    #[test]
    fn test_tx_version_is_applied() {
        let bridge = Svm::builder()
            .with_library(Arc::new(fake_library()))
            .with_codec_wat(CODEC_WAT)
            .with_guest_limits(GuestLimits::minimal())
            .with_tx_version(3)
            .build()
            .unwrap();

        let tx = bridge.encode_app_tx(&AUTHOR, "add", &[]).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&tx).unwrap();
        assert_eq!(json["version"], 3);
    }

    #[test]
    fn test_encode_messages() {
        let bridge = Svm::builder()
            .with_library(Arc::new(fake_library()))
            .with_codec_wat(CODEC_WAT)
            .with_guest_limits(GuestLimits::minimal())
            .with_tx_version(2)
            .build()
            .unwrap();

        let call = bridge
            .encode_call_message(&AUTHOR, "add", &[], &[1, 2])
            .unwrap();
        assert_eq!(&call[..2], &[0, 2]);
        assert_eq!(&call[2..22], AUTHOR.as_bytes());
        assert_eq!(&call[22..], &[3, b'a', b'd', b'd', 0, 2, 1, 2]);

        let spawn = bridge
            .encode_spawn_message(&AUTHOR, "app", "init", &[])
            .unwrap();
        assert_eq!(&spawn[22..], b"\x03app\x04init\x00");

        let err = bridge
            .encode_call_message(&AUTHOR, &"f".repeat(300), &[], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            SvmError::Native(NativeError::MessageTooLong { field: "func_name", length: 300 })
        ));
    }

    #[test]
    fn test_message_version_out_of_range() {
        let bridge = Svm::builder()
            .with_library(Arc::new(fake_library()))
            .with_codec_wat(CODEC_WAT)
            .with_guest_limits(GuestLimits::minimal())
            .with_tx_version(u32::from(u16::MAX) + 1)
            .build()
            .unwrap();

        let err = bridge
            .encode_call_message(&AUTHOR, "add", &[], &[])
            .unwrap_err();
        assert!(matches!(err, SvmError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _bridge: SvmBridge = bridge();
        let _gas = GasOptions::from(GasConfig::unmetered());
    }
}
