//! Codec module loading and validation.
//!
//! A codec module must export a linear memory and the three buffer
//! primitives the host drives the protocol with. These are checked once at
//! load time; transform exports are looked up per call.

use std::path::Path;

use tracing::{debug, info};
use wasmtime::{ExternType, FuncType, Module, ValType};

use crate::engine::SharedEngine;
use crate::error::{ModuleError, ModuleResult};

/// Name of the exported linear memory.
pub const MEMORY_EXPORT: &str = "memory";
/// `wasm_alloc(size: i32) -> ptr: i32`
pub const ALLOC_EXPORT: &str = "wasm_alloc";
/// `wasm_buffer_length(ptr: i32) -> i32`
pub const BUFFER_LENGTH_EXPORT: &str = "wasm_buffer_length";
/// `wasm_buffer_data(ptr: i32) -> offset: i32`
pub const BUFFER_DATA_EXPORT: &str = "wasm_buffer_data";

const BUFFER_PRIMITIVES: [&str; 3] = [ALLOC_EXPORT, BUFFER_LENGTH_EXPORT, BUFFER_DATA_EXPORT];

/// A compiled codec module whose buffer exports have been validated.
///
/// Cloning is cheap; the compiled code is shared.
#[derive(Clone)]
pub struct CodecModule {
    inner: Module,
    exports: Vec<ExportInfo>,
}

impl CodecModule {
    /// Get a reference to the underlying Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Get the module name, if set.
    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Get the list of exports.
    pub fn exports(&self) -> &[ExportInfo] {
        &self.exports
    }

    /// Check if the module has a specific export.
    pub fn has_export(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e.name == name)
    }
}

impl std::fmt::Debug for CodecModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecModule")
            .field("name", &self.name())
            .field("exports", &self.exports.len())
            .finish()
    }
}

/// Information about an exported item.
#[derive(Debug, Clone)]
pub struct ExportInfo {
    /// Export name.
    pub name: String,
    /// Type of the export.
    pub kind: ExportKind,
}

/// The kind of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// A function export.
    Function {
        /// Number of parameters.
        params: usize,
        /// Number of results.
        results: usize,
    },
    /// A memory export.
    Memory,
    /// A global export.
    Global,
    /// A table export.
    Table,
}

/// Loader for codec modules.
pub struct ModuleLoader {
    engine: SharedEngine,
}

impl ModuleLoader {
    /// Create a new module loader with the given engine.
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// Load and validate a codec module from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid WASM module or a
    /// required export is missing or mistyped.
    pub fn load_bytes(&self, bytes: &[u8]) -> ModuleResult<CodecModule> {
        debug!(size = bytes.len(), "Loading codec module from bytes");

        let module = Module::new(self.engine.inner(), bytes)?;
        let codec = validate(module)?;

        info!(
            name = ?codec.name(),
            exports = codec.exports.len(),
            "Loaded codec module"
        );
        Ok(codec)
    }

    /// Load and validate a codec module from a file.
    pub fn load_file(&self, path: &Path) -> ModuleResult<CodecModule> {
        debug!(path = %path.display(), "Loading codec module from file");

        let bytes = std::fs::read(path)?;
        let module = Module::new(self.engine.inner(), &bytes)?;
        let codec = validate(module)?;

        info!(
            path = %path.display(),
            exports = codec.exports.len(),
            "Loaded codec module from file"
        );
        Ok(codec)
    }

    /// Load and validate a codec module from WAT.
    ///
    /// This is primarily useful for testing.
    pub fn load_wat(&self, wat: &str) -> ModuleResult<CodecModule> {
        debug!(size = wat.len(), "Loading codec module from WAT");

        let wasm = wat::parse_str(wat).map_err(|e| ModuleError::Invalid(e.to_string()))?;
        self.load_bytes(&wasm)
    }
}

fn validate(module: Module) -> ModuleResult<CodecModule> {
    match module.get_export(MEMORY_EXPORT) {
        Some(ExternType::Memory(_)) => {}
        Some(_) => {
            return Err(ModuleError::InvalidExport {
                name: MEMORY_EXPORT.to_string(),
                expected: "memory",
            });
        }
        None => return Err(ModuleError::MissingExport(MEMORY_EXPORT.to_string())),
    }

    for name in BUFFER_PRIMITIVES {
        match module.get_export(name) {
            Some(ExternType::Func(func)) if is_i32_to_i32(&func) => {}
            Some(_) => {
                return Err(ModuleError::InvalidExport {
                    name: name.to_string(),
                    expected: "func (param i32) (result i32)",
                });
            }
            None => return Err(ModuleError::MissingExport(name.to_string())),
        }
    }

    let exports = module
        .exports()
        .map(|export| ExportInfo {
            name: export.name().to_string(),
            kind: extern_type_to_export_kind(export.ty()),
        })
        .collect();

    Ok(CodecModule {
        inner: module,
        exports,
    })
}

pub(crate) fn is_i32_to_i32(func: &FuncType) -> bool {
    let params: Vec<ValType> = func.params().collect();
    let results: Vec<ValType> = func.results().collect();
    matches!(params.as_slice(), [ValType::I32]) && matches!(results.as_slice(), [ValType::I32])
}

fn extern_type_to_export_kind(ty: ExternType) -> ExportKind {
    match ty {
        ExternType::Func(func) => ExportKind::Function {
            params: func.params().len(),
            results: func.results().len(),
        },
        ExternType::Memory(_) => ExportKind::Memory,
        ExternType::Global(_) => ExportKind::Global,
        ExternType::Table(_) => ExportKind::Table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CodecEngine, IntoShared};
    use crate::testing::CODEC_WAT;

    fn create_loader() -> ModuleLoader {
        ModuleLoader::new(CodecEngine::default_engine().unwrap().into_shared())
    }

    #[test]
    fn test_load_codec_module() {
        let module = create_loader().load_wat(CODEC_WAT).unwrap();

        assert!(module.has_export(MEMORY_EXPORT));
        assert!(module.has_export("wasm_decode_receipt"));

        let alloc = module
            .exports()
            .iter()
            .find(|e| e.name == ALLOC_EXPORT)
            .unwrap();
        assert_eq!(
            alloc.kind,
            ExportKind::Function {
                params: 1,
                results: 1
            }
        );
    }

    #[test]
    fn test_missing_memory() {
        let result = create_loader().load_wat(
            r#"
            (module
                (func (export "wasm_alloc") (param i32) (result i32) local.get 0)
            )
        "#,
        );
        assert!(matches!(result, Err(ModuleError::MissingExport(name)) if name == "memory"));
    }

    #[test]
    fn test_missing_buffer_primitive() {
        let result = create_loader().load_wat(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "wasm_alloc") (param i32) (result i32) local.get 0)
                (func (export "wasm_buffer_length") (param i32) (result i32) local.get 0)
            )
        "#,
        );
        assert!(
            matches!(result, Err(ModuleError::MissingExport(name)) if name == BUFFER_DATA_EXPORT)
        );
    }

    #[test]
    fn test_mistyped_buffer_primitive() {
        let result = create_loader().load_wat(
            r#"
            (module
                (memory (export "memory") 1)
                (func (export "wasm_alloc") (param i64) (result i64) local.get 0)
                (func (export "wasm_buffer_length") (param i32) (result i32) local.get 0)
                (func (export "wasm_buffer_data") (param i32) (result i32) local.get 0)
            )
        "#,
        );
        assert!(matches!(
            result,
            Err(ModuleError::InvalidExport { name, .. }) if name == ALLOC_EXPORT
        ));
    }

    #[test]
    fn test_load_invalid_module() {
        let result = create_loader().load_bytes(&[0, 1, 2, 3]);
        assert!(result.is_err());
    }
}
