// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in system codecs for common body types.
//!
//! These back the final step of codec resolution. Numeric wire forms are
//! little-endian.

use super::{Body, MessageCodec};
use crate::error::{Error, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) fn system_codecs() -> HashMap<TypeId, Arc<dyn MessageCodec>> {
    let mut map: HashMap<TypeId, Arc<dyn MessageCodec>> = HashMap::new();
    map.insert(TypeId::of::<String>(), Arc::new(StringCodec));
    map.insert(TypeId::of::<&'static str>(), Arc::new(StrCodec));
    map.insert(TypeId::of::<i32>(), Arc::new(I32Codec));
    map.insert(TypeId::of::<i64>(), Arc::new(I64Codec));
    map.insert(TypeId::of::<f64>(), Arc::new(F64Codec));
    map.insert(TypeId::of::<bool>(), Arc::new(BoolCodec));
    map.insert(TypeId::of::<()>(), Arc::new(UnitCodec));
    map.insert(TypeId::of::<Vec<u8>>(), Arc::new(BytesCodec));
    map
}

fn expected<T>(codec: &str, body: &(dyn Any + Send + Sync)) -> Result<T>
where
    T: Clone + 'static,
{
    body.downcast_ref::<T>().cloned().ok_or_else(|| {
        Error::Codec(format!("system codec '{}' given a mismatched body type", codec))
    })
}

struct StringCodec;

impl MessageCodec for StringCodec {
    fn name(&self) -> &str {
        "string"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<String>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(expected::<String>(self.name(), body)?.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        let s = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Codec(format!("invalid utf-8 string body: {}", e)))?;
        Ok(Box::new(s))
    }
}

/// Borrowed string literals. Wire decode normalises to an owned `String`.
struct StrCodec;

impl MessageCodec for StrCodec {
    fn name(&self) -> &str {
        "str"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<&'static str>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(expected::<&'static str>(self.name(), body)?.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        let s = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Codec(format!("invalid utf-8 string body: {}", e)))?;
        Ok(Box::new(s))
    }
}

struct I32Codec;

impl MessageCodec for I32Codec {
    fn name(&self) -> &str {
        "i32"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<i32>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&expected::<i32>(self.name(), body)?.to_le_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| Error::Codec("i32 body must be exactly 4 bytes".to_string()))?;
        Ok(Box::new(i32::from_le_bytes(raw)))
    }
}

struct I64Codec;

impl MessageCodec for I64Codec {
    fn name(&self) -> &str {
        "i64"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<i64>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&expected::<i64>(self.name(), body)?.to_le_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Codec("i64 body must be exactly 8 bytes".to_string()))?;
        Ok(Box::new(i64::from_le_bytes(raw)))
    }
}

struct F64Codec;

impl MessageCodec for F64Codec {
    fn name(&self) -> &str {
        "f64"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<f64>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&expected::<f64>(self.name(), body)?.to_le_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Codec("f64 body must be exactly 8 bytes".to_string()))?;
        Ok(Box::new(f64::from_le_bytes(raw)))
    }
}

struct BoolCodec;

impl MessageCodec for BoolCodec {
    fn name(&self) -> &str {
        "bool"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<bool>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.push(u8::from(expected::<bool>(self.name(), body)?));
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        match bytes {
            [0] => Ok(Box::new(false)),
            [1] => Ok(Box::new(true)),
            _ => Err(Error::Codec("bool body must be a single 0/1 byte".to_string())),
        }
    }
}

/// Empty bodies; also carries failure-marker replies.
struct UnitCodec;

impl MessageCodec for UnitCodec {
    fn name(&self) -> &str {
        "unit"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        expected::<()>(self.name(), body)?;
        Ok(Box::new(()))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), _out: &mut Vec<u8>) -> Result<()> {
        expected::<()>(self.name(), body)?;
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        if !bytes.is_empty() {
            return Err(Error::Codec("unit body must be empty".to_string()));
        }
        Ok(Box::new(()))
    }
}

struct BytesCodec;

impl MessageCodec for BytesCodec {
    fn name(&self) -> &str {
        "bytes"
    }

    fn transform(&self, body: &(dyn Any + Send + Sync)) -> Result<Body> {
        Ok(Box::new(expected::<Vec<u8>>(self.name(), body)?))
    }

    fn encode(&self, body: &(dyn Any + Send + Sync), out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&expected::<Vec<u8>>(self.name(), body)?);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Body> {
        Ok(Box::new(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_copies_are_independent() {
        let codec = StringCodec;
        let original: Body = Box::new("payload".to_string());
        let copy = codec.transform(original.as_ref()).unwrap();
        let copied = copy.downcast_ref::<String>().unwrap();
        assert_eq!(copied, "payload");
        // Distinct allocations.
        let original_ref = original.downcast_ref::<String>().unwrap();
        assert_ne!(original_ref.as_ptr(), copied.as_ptr());
    }

    #[test]
    fn test_mismatched_body_is_rejected() {
        let codec = I64Codec;
        let body: Body = Box::new("not a number".to_string());
        assert!(codec.transform(body.as_ref()).is_err());
    }

    #[test]
    fn test_i64_wire_form_is_little_endian() {
        let codec = I64Codec;
        let body: Body = Box::new(0x0102_0304_0506_0708_i64);
        let mut out = Vec::new();
        codec.encode(body.as_ref(), &mut out).unwrap();
        assert_eq!(out, vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        let decoded = codec.decode(&out).unwrap();
        assert_eq!(*decoded.downcast_ref::<i64>().unwrap(), 0x0102_0304_0506_0708);
    }
}
