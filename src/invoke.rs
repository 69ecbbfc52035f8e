//! Signature-checked invocation of compiled entry points.

use std::marker::PhantomData;

use crate::context::{AbiSignature, AbiType};
use crate::error::InvokeError;

/// Result of a successful invocation, per the declared return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    Int32(i32),
    Int64(i64),
    Unit,
}

/// A compiled symbol looked up from an engine.
///
/// Holds the native address together with the signature the function was
/// declared with. The lifetime ties the entry to the engine that owns the
/// code pages, so the address cannot outlive them.
pub struct CompiledEntry<'jit> {
    name: String,
    addr: *const u8,
    sig: AbiSignature,
    _engine: PhantomData<&'jit ()>,
}

impl<'jit> CompiledEntry<'jit> {
    pub(crate) fn new(name: String, addr: *const u8, sig: AbiSignature) -> Self {
        CompiledEntry {
            name,
            addr,
            sig,
            _engine: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw native address. Calling through it unchecked is on the caller;
    /// prefer [`CompiledEntry::invoke`].
    pub fn address(&self) -> *const u8 {
        self.addr
    }

    /// The signature the function was compiled with.
    pub fn signature(&self) -> &AbiSignature {
        &self.sig
    }

    /// Call the compiled function after validating `expected` against the
    /// declared signature.
    ///
    /// A mismatch fails with `SignatureMismatch` before any control
    /// transfer — there is no unchecked fallback. Entry points take no
    /// arguments and return i32, i64, or nothing; a matching signature
    /// outside those shapes is refused explicitly.
    ///
    /// The call is synchronous: control returns when the callee returns.
    pub fn invoke(&self, expected: &AbiSignature) -> Result<ReturnValue, InvokeError> {
        if *expected != self.sig {
            return Err(InvokeError::SignatureMismatch {
                expected: expected.clone(),
                found: self.sig.clone(),
            });
        }
        if !self.sig.params.is_empty() || self.sig.variadic {
            return Err(InvokeError::UnsupportedEntrySignature {
                found: self.sig.clone(),
            });
        }

        // Safety: the address came from a finalized artifact whose pages the
        // engine keeps alive for at least 'jit, and the transmuted type
        // matches the signature the function was compiled with.
        match self.sig.ret {
            None => {
                let f: unsafe extern "C" fn() = unsafe { std::mem::transmute(self.addr) };
                unsafe { f() };
                Ok(ReturnValue::Unit)
            }
            Some(AbiType::I32) => {
                let f: unsafe extern "C" fn() -> i32 =
                    unsafe { std::mem::transmute(self.addr) };
                Ok(ReturnValue::Int32(unsafe { f() }))
            }
            Some(AbiType::I64) => {
                let f: unsafe extern "C" fn() -> i64 =
                    unsafe { std::mem::transmute(self.addr) };
                Ok(ReturnValue::Int64(unsafe { f() }))
            }
            Some(AbiType::I8) | Some(AbiType::Ptr) => {
                Err(InvokeError::UnsupportedEntrySignature {
                    found: self.sig.clone(),
                })
            }
        }
    }
}

impl std::fmt::Debug for CompiledEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledEntry")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("sig", &self.sig)
            .finish()
    }
}
