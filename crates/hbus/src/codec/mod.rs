// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Body codecs and the codec registry.
//!
//! A codec owns three jobs: producing the independent body copy every local
//! delivery receives ([`MessageCodec::transform`]), and encoding/decoding a
//! wire form for transport extensions that carry messages out of process.
//! The local bus only ever calls `transform`.
//!
//! Codec resolution for an emission, in order:
//! 1. the `codec_name` override from `DeliveryOptions`, looked up among
//!    user-registered codecs;
//! 2. a user-registered default codec for the body's concrete type;
//! 3. a built-in system codec for the body's concrete type.
//!
//! A body whose type matches none of the three is rejected with a codec
//! error.

mod system;

use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased message body.
pub type Body = Box<dyn Any + Send + Sync>;

/// Encode/decode contract for message bodies.
pub trait MessageCodec: Send + Sync {
    /// Unique codec name; referenced by `DeliveryOptions::codec_name`.
    fn name(&self) -> &str;

    /// Produce an independent copy of `body` for one local delivery.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `body` is not the type this codec handles.
    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body>;

    /// Encode `body` into `out` for a wire transport.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `body` is not the type this codec handles.
    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()>;

    /// Decode a body from its wire form.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `bytes` is truncated or malformed.
    fn decode(&self, bytes: &[u8]) -> Result<Body>;
}

/// Thread-safe codec lookup: user codecs by name, user defaults and system
/// codecs by body type.
pub(crate) struct CodecRegistry {
    by_name: DashMap<String, Arc<dyn MessageCodec>>,
    defaults: DashMap<TypeId, Arc<dyn MessageCodec>>,
    system: HashMap<TypeId, Arc<dyn MessageCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            defaults: DashMap::new(),
            system: system::system_codecs(),
        }
    }

    /// Register a named user codec.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a codec with the same name is already registered.
    pub fn register(&self, codec: Arc<dyn MessageCodec>) -> Result<()> {
        match self.by_name.entry(codec.name().to_string()) {
            Entry::Occupied(_) => Err(Error::IllegalState(format!(
                "codec '{}' is already registered",
                codec.name()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(codec);
                Ok(())
            }
        }
    }

    /// Remove a named user codec. Returns `false` if absent.
    pub fn unregister(&self, name: &str) -> bool {
        self.by_name.remove(name).is_some()
    }

    /// Register `codec` as the default for bodies of type `T`, replacing any
    /// previous default.
    pub fn register_default<T: Any>(&self, codec: Arc<dyn MessageCodec>) {
        self.defaults.insert(TypeId::of::<T>(), codec);
    }

    /// Remove the default codec for type `T`. Returns `false` if absent.
    pub fn unregister_default<T: Any>(&self) -> bool {
        self.defaults.remove(&TypeId::of::<T>()).is_some()
    }

    /// Resolve the codec for one emission.
    pub fn resolve(
        &self,
        name: Option<&str>,
        body: &(dyn Any + Send + Sync),
    ) -> Result<Arc<dyn MessageCodec>> {
        if let Some(name) = name {
            return self
                .by_name
                .get(name)
                .map(|entry| Arc::clone(entry.value()))
                .ok_or_else(|| Error::Codec(format!("no codec registered under name '{}'", name)));
        }
        let type_id = body.type_id();
        if let Some(codec) = self.defaults.get(&type_id) {
            return Ok(Arc::clone(codec.value()));
        }
        self.system.get(&type_id).cloned().ok_or_else(|| {
            Error::Codec(
                "no message codec for body type; register a codec or a default codec".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperCodec;

    impl MessageCodec for UpperCodec {
        fn name(&self) -> &str {
            "upper"
        }

        fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
            let s = body
                .downcast_ref::<String>()
                .ok_or_else(|| Error::Codec("upper codec expects String".to_string()))?;
            Ok(Box::new(s.to_uppercase()))
        }

        fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
            let s = body
                .downcast_ref::<String>()
                .ok_or_else(|| Error::Codec("upper codec expects String".to_string()))?;
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }

        fn decode(&self, bytes: &[u8]) -> Result<Body> {
            Ok(Box::new(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::Codec(format!("invalid utf-8: {}", e)))?,
            ))
        }
    }

    #[test]
    fn test_resolve_prefers_named_override() {
        let registry = CodecRegistry::new();
        registry.register(Arc::new(UpperCodec)).unwrap();

        let body: Body = Box::new("hi".to_string());
        let codec = registry.resolve(Some("upper"), body.as_ref()).unwrap();
        assert_eq!(codec.name(), "upper");
    }

    #[test]
    fn test_resolve_falls_back_to_system_codec() {
        let registry = CodecRegistry::new();
        let body: Body = Box::new("hi".to_string());
        let codec = registry.resolve(None, body.as_ref()).unwrap();
        assert_eq!(codec.name(), "string");
    }

    #[test]
    fn test_resolve_default_beats_system() {
        let registry = CodecRegistry::new();
        registry.register_default::<String>(Arc::new(UpperCodec));

        let body: Body = Box::new("hi".to_string());
        let codec = registry.resolve(None, body.as_ref()).unwrap();
        assert_eq!(codec.name(), "upper");

        assert!(registry.unregister_default::<String>());
        let codec = registry.resolve(None, body.as_ref()).unwrap();
        assert_eq!(codec.name(), "string");
    }

    #[test]
    fn test_resolve_unknown_type_is_rejected() {
        struct Opaque;
        let registry = CodecRegistry::new();
        let body: Body = Box::new(Opaque);
        assert!(matches!(
            registry.resolve(None, body.as_ref()),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let registry = CodecRegistry::new();
        registry.register(Arc::new(UpperCodec)).unwrap();
        assert!(registry.register(Arc::new(UpperCodec)).is_err());
        assert!(registry.unregister("upper"));
        assert!(registry.register(Arc::new(UpperCodec)).is_ok());
    }
}
