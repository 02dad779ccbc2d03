//! Binary call and spawn messages.
//!
//! Layout: a big-endian `u16` version, the 20-byte target address, then
//! each variable-length field as a one-byte length followed by its bytes.

use svm_bridge_core::Address;

use crate::error::{NativeError, NativeResult};

/// Longest variable-length field a message can carry.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// A call into a spawned app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMessage {
    pub version: u16,
    pub target: Address,
    pub func_name: String,
    pub verify_data: Vec<u8>,
    pub calldata: Vec<u8>,
}

impl CallMessage {
    /// Encode the message.
    pub fn encode(&self) -> NativeResult<Vec<u8>> {
        let mut writer = MessageWriter::new(self.version, &self.target);
        writer.field("func_name", self.func_name.as_bytes())?;
        writer.field("verify_data", &self.verify_data)?;
        writer.field("calldata", &self.calldata)?;
        Ok(writer.finish())
    }
}

/// A request to spawn an app from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnMessage {
    pub version: u16,
    pub template: Address,
    pub name: String,
    pub ctor_name: String,
    pub calldata: Vec<u8>,
}

impl SpawnMessage {
    /// Encode the message.
    pub fn encode(&self) -> NativeResult<Vec<u8>> {
        let mut writer = MessageWriter::new(self.version, &self.template);
        writer.field("name", self.name.as_bytes())?;
        writer.field("ctor_name", self.ctor_name.as_bytes())?;
        writer.field("calldata", &self.calldata)?;
        Ok(writer.finish())
    }
}

struct MessageWriter {
    bytes: Vec<u8>,
}

impl MessageWriter {
    fn new(version: u16, address: &Address) -> Self {
        let mut bytes = Vec::with_capacity(2 + address.as_bytes().len() + 3);
        bytes.extend_from_slice(&version.to_be_bytes());
        bytes.extend_from_slice(address.as_bytes());
        Self { bytes }
    }

    fn field(&mut self, field: &'static str, value: &[u8]) -> NativeResult<()> {
        let len = u8::try_from(value.len()).map_err(|_| NativeError::MessageTooLong {
            field,
            length: value.len(),
        })?;
        self.bytes.push(len);
        self.bytes.extend_from_slice(value);
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
