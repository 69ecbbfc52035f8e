//! Compilation context: type and constant-data uniqueness.
//!
//! A `Context` is an isolated universe. Every type and every string constant
//! built within it is interned, so two requests for the same structural type
//! yield the same `TyId` and two identical string constants share one byte
//! sequence at one stable address. Handles are meaningful only within the
//! context that produced them; nothing crosses contexts.
//!
//! The context moves into the `Module` it serves at module creation and from
//! there into the JIT engine together with the module, which keeps interned
//! string data alive for as long as compiled code may dereference it.

use std::ffi::CString;
use std::fmt;

use rustc_hash::FxHashMap;

/// Interned type handle. Equal handles mean structurally equal types
/// within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TyId(pub u32);

/// Interned string-constant handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(pub u32);

/// Structural shape of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Int { bits: u8 },
    Ptr(TyId),
}

/// Machine-level view of a type, detached from any context.
///
/// This is what signature checking and lowering work with: once a module is
/// compiled, its `TyId`s are private to the moved-away context, so the
/// artifact records signatures in this form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    I8,
    I32,
    I64,
    Ptr,
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::I8 => write!(f, "i8"),
            AbiType::I32 => write!(f, "i32"),
            AbiType::I64 => write!(f, "i64"),
            AbiType::Ptr => write!(f, "ptr"),
        }
    }
}

/// Context-free function signature: fixed parameters, optional return,
/// variadic flag. `ret == None` means the function returns nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiSignature {
    pub params: Vec<AbiType>,
    pub ret: Option<AbiType>,
    pub variadic: bool,
}

impl AbiSignature {
    /// Signature of an entry point: no parameters, optional return.
    pub fn nullary(ret: Option<AbiType>) -> Self {
        AbiSignature {
            params: Vec::new(),
            ret,
            variadic: false,
        }
    }
}

impl fmt::Display for AbiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;
        match self.ret {
            Some(t) => write!(f, " -> {}", t),
            None => write!(f, " -> void"),
        }
    }
}

/// Owner of interned types and string constants.
#[derive(Debug, Default)]
pub struct Context {
    types: Vec<TypeKind>,
    type_ids: FxHashMap<TypeKind, TyId>,
    data: Vec<CString>,
    data_ids: FxHashMap<Vec<u8>, DataId>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    fn intern_type(&mut self, kind: TypeKind) -> TyId {
        if let Some(&id) = self.type_ids.get(&kind) {
            return id;
        }
        let id = TyId(self.types.len() as u32);
        self.types.push(kind);
        self.type_ids.insert(kind, id);
        id
    }

    pub fn void(&mut self) -> TyId {
        self.intern_type(TypeKind::Void)
    }

    pub fn int8(&mut self) -> TyId {
        self.intern_type(TypeKind::Int { bits: 8 })
    }

    pub fn int32(&mut self) -> TyId {
        self.intern_type(TypeKind::Int { bits: 32 })
    }

    pub fn int64(&mut self) -> TyId {
        self.intern_type(TypeKind::Int { bits: 64 })
    }

    pub fn ptr_to(&mut self, pointee: TyId) -> TyId {
        debug_assert!((pointee.0 as usize) < self.types.len());
        self.intern_type(TypeKind::Ptr(pointee))
    }

    /// Structural shape of an interned type.
    pub fn type_kind(&self, ty: TyId) -> TypeKind {
        self.types[ty.0 as usize]
    }

    /// Machine-level view of a type; `None` for void.
    pub fn abi_type(&self, ty: TyId) -> Option<AbiType> {
        match self.type_kind(ty) {
            TypeKind::Void => None,
            TypeKind::Int { bits: 8 } => Some(AbiType::I8),
            TypeKind::Int { bits: 32 } => Some(AbiType::I32),
            TypeKind::Int { bits: 64 } => Some(AbiType::I64),
            TypeKind::Int { bits } => {
                debug_assert!(false, "unsupported integer width {}", bits);
                Some(AbiType::I64)
            }
            TypeKind::Ptr(_) => Some(AbiType::Ptr),
        }
    }

    /// Intern `text` as a NUL-terminated byte sequence at a stable address.
    ///
    /// Returns `None` if the text contains an interior NUL byte. Identical
    /// texts share one interned sequence.
    pub fn intern_cstr(&mut self, text: &str) -> Option<DataId> {
        if let Some(&id) = self.data_ids.get(text.as_bytes()) {
            return Some(id);
        }
        let cstr = CString::new(text).ok()?;
        let id = DataId(self.data.len() as u32);
        self.data_ids.insert(text.as_bytes().to_vec(), id);
        self.data.push(cstr);
        Some(id)
    }

    /// Address of an interned byte sequence. Stable for the life of the
    /// context; the sequence is NUL-terminated and never mutated.
    pub fn cstr_ptr(&self, id: DataId) -> *const u8 {
        self.data[id.0 as usize].as_ptr() as *const u8
    }

    pub(crate) fn valid_data(&self, id: DataId) -> bool {
        (id.0 as usize) < self.data.len()
    }
}
