//! Codec registry mapping wire-format identifiers to constructors.
//!
//! The registry is built once while configuring the server and shared
//! read-only afterwards, so lookups need no locking.
//!
//! # Example
//!
//! ```
//! use seqwire::codec::{Codec, CodecRegistry, CodecType};
//!
//! let mut registry = CodecRegistry::new();
//! registry.register(CodecType::MsgPack, Codec::msgpack);
//!
//! assert!(registry.lookup("application/msgpack").is_some());
//! assert!(registry.lookup("application/json").is_none());
//! ```

use std::collections::HashMap;

use super::{Codec, CodecType};
use crate::transport::Connection;

/// Constructor producing a codec bound to a connection.
pub type NewCodecFn = fn(Connection) -> Codec;

/// Registry of codec constructors keyed by [`CodecType`].
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<CodecType, NewCodecFn>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for a wire format.
    pub fn register(&mut self, codec_type: CodecType, constructor: NewCodecFn) -> &mut Self {
        self.constructors.insert(codec_type, constructor);
        self
    }

    /// Look up a constructor by wire identifier.
    ///
    /// Unknown identifiers and formats without a registered constructor
    /// both yield `None`.
    pub fn lookup(&self, name: &str) -> Option<NewCodecFn> {
        CodecType::from_name(name).and_then(|codec_type| self.get(codec_type))
    }

    /// Look up a constructor by wire format.
    pub fn get(&self, codec_type: CodecType) -> Option<NewCodecFn> {
        self.constructors.get(&codec_type).copied()
    }

    /// Whether a wire format is registered.
    pub fn contains(&self, codec_type: CodecType) -> bool {
        self.constructors.contains_key(&codec_type)
    }

    /// Number of registered formats.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check if no format is registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl Default for CodecRegistry {
    /// Registry with every built-in format.
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(CodecType::MsgPack, Codec::msgpack)
            .register(CodecType::Json, Codec::json);
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}
