//! Typed errors for every stage of the pipeline.
//!
//! Each stage surfaces its own enum rather than a stringly `Result<T, String>`;
//! `PipelineError` is the sum the driver hands to callers. No stage retries —
//! every failure is terminal for the affected module.

use std::fmt;

use crate::context::AbiSignature;

/// Error raised while constructing IR through the builder.
///
/// These are structural misuses of the builder API, caught synchronously at
/// emit time. Type-level mistakes (operand mismatches, bad returns) are the
/// verifier's job and surface as `VerificationError` at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// An emit operation was called with no active insertion point.
    NoInsertionPoint,
    /// The current block already has a terminator.
    BlockAlreadyTerminated { func: String, block: String },
    /// A name was re-declared with a different signature.
    SignatureConflict { name: String },
    /// A function name was declared or defined twice.
    DuplicateFunction { name: String },
    /// A function handle did not refer to a function of this module.
    UnknownFunction,
    /// A block handle did not refer to a block of the named function.
    UnknownBlock { func: String },
    /// A value handle did not refer to a value of the current function.
    UnknownValue { func: String },
    /// A parameter index was out of range for the named function.
    BadParamIndex { func: String, index: usize },
    /// Blocks were appended to an external declaration.
    ExternalBody { name: String },
    /// A function definition was created with a variadic signature.
    VariadicDefinition { name: String },
    /// A string constant contained an interior NUL byte.
    StringWithNul,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::NoInsertionPoint => {
                write!(f, "no insertion point: call set_insertion_point first")
            }
            BuildError::BlockAlreadyTerminated { func, block } => {
                write!(f, "block '{}' of '{}' is already terminated", block, func)
            }
            BuildError::SignatureConflict { name } => {
                write!(f, "'{}' re-declared with a conflicting signature", name)
            }
            BuildError::DuplicateFunction { name } => {
                write!(f, "function '{}' declared twice", name)
            }
            BuildError::UnknownFunction => write!(f, "unknown function handle"),
            BuildError::UnknownBlock { func } => {
                write!(f, "unknown block handle in function '{}'", func)
            }
            BuildError::UnknownValue { func } => {
                write!(f, "unknown value handle in function '{}'", func)
            }
            BuildError::BadParamIndex { func, index } => {
                write!(f, "function '{}' has no parameter {}", func, index)
            }
            BuildError::ExternalBody { name } => {
                write!(f, "external '{}' cannot have a body", name)
            }
            BuildError::VariadicDefinition { name } => {
                write!(f, "defined function '{}' cannot be variadic", name)
            }
            BuildError::StringWithNul => {
                write!(f, "string constant contains an interior NUL byte")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Structural verification failure, raised before any code is generated.
///
/// Every variant names the offending function so the report is actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// A block does not end in a terminator.
    MissingTerminator { func: String, block: String },
    /// A return does not match the function's declared return type.
    ReturnTypeMismatch { func: String, block: String },
    /// An instruction operand has the wrong type.
    OperandType { func: String, message: String },
    /// A call passes the wrong number of arguments.
    ArityMismatch {
        func: String,
        callee: String,
        expected: usize,
        got: usize,
    },
    /// A jump or branch targets a block that does not exist.
    BadBranchTarget { func: String, block: String },
    /// A defined function carries a variadic signature.
    VariadicDefinition { func: String },
    /// A defined function has no blocks at all.
    EmptyFunction { func: String },
    /// The function's value or parameter tables are inconsistent.
    Malformed { func: String, message: String },
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::MissingTerminator { func, block } => {
                write!(f, "block '{}' of '{}' has no terminator", block, func)
            }
            VerificationError::ReturnTypeMismatch { func, block } => {
                write!(
                    f,
                    "return in block '{}' of '{}' does not match the declared return type",
                    block, func
                )
            }
            VerificationError::OperandType { func, message } => {
                write!(f, "in '{}': {}", func, message)
            }
            VerificationError::ArityMismatch {
                func,
                callee,
                expected,
                got,
            } => write!(
                f,
                "in '{}': call to '{}' expects {} arguments, got {}",
                func, callee, expected, got
            ),
            VerificationError::BadBranchTarget { func, block } => {
                write!(f, "block '{}' of '{}' branches to a missing block", block, func)
            }
            VerificationError::VariadicDefinition { func } => {
                write!(f, "defined function '{}' has a variadic signature", func)
            }
            VerificationError::EmptyFunction { func } => {
                write!(f, "defined function '{}' has no blocks", func)
            }
            VerificationError::Malformed { func, message } => {
                write!(f, "function '{}' is malformed: {}", func, message)
            }
        }
    }
}

impl std::error::Error for VerificationError {}

/// Symbol resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No binding and (under process-wide resolution) no host symbol.
    NotFound { symbol: String },
    /// Process-wide resolution is not available on this platform.
    Unsupported { symbol: String },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound { symbol } => {
                write!(f, "symbol '{}' not found", symbol)
            }
            ResolveError::Unsupported { symbol } => {
                write!(
                    f,
                    "process-wide lookup of '{}' not supported on this platform",
                    symbol
                )
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Compilation failure. Fatal to the whole module; no partial artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The module failed structural verification.
    Verification(VerificationError),
    /// An external reference could not be resolved to an address.
    UnresolvedSymbol(String),
    /// A defined function's name collides with an already compiled symbol.
    DuplicateSymbol(String),
    /// Cranelift rejected the lowered function.
    Codegen(String),
    /// The host target could not be configured.
    Host(String),
}

impl CompileError {
    pub fn codegen(message: impl Into<String>) -> Self {
        CompileError::Codegen(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        CompileError::Host(message.into())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Verification(e) => write!(f, "verification failed: {}", e),
            CompileError::UnresolvedSymbol(name) => {
                write!(f, "unresolved external symbol '{}'", name)
            }
            CompileError::DuplicateSymbol(name) => {
                write!(f, "symbol '{}' is already compiled", name)
            }
            CompileError::Codegen(msg) => write!(f, "code generation failed: {}", msg),
            CompileError::Host(msg) => write!(f, "host target unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<VerificationError> for CompileError {
    fn from(e: VerificationError) -> Self {
        CompileError::Verification(e)
    }
}

/// Failed lookup of a compiled symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    UnknownSymbol(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::UnknownSymbol(name) => {
                write!(f, "no compiled symbol named '{}'", name)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Invocation refused before any control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The caller's expected signature does not match the compiled one.
    SignatureMismatch {
        expected: AbiSignature,
        found: AbiSignature,
    },
    /// The signature matches but is not a shape the invoker can call
    /// (entry points take no arguments and return i32, i64, or nothing).
    UnsupportedEntrySignature { found: AbiSignature },
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::SignatureMismatch { expected, found } => {
                write!(f, "signature mismatch: expected {}, found {}", expected, found)
            }
            InvokeError::UnsupportedEntrySignature { found } => {
                write!(f, "cannot invoke entry with signature {}", found)
            }
        }
    }
}

impl std::error::Error for InvokeError {}

/// Sum of all pipeline stage errors, as surfaced by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    Build(BuildError),
    Compile(CompileError),
    Lookup(LookupError),
    Invoke(InvokeError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Build(e) => write!(f, "build: {}", e),
            PipelineError::Compile(e) => write!(f, "compile: {}", e),
            PipelineError::Lookup(e) => write!(f, "lookup: {}", e),
            PipelineError::Invoke(e) => write!(f, "invoke: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<BuildError> for PipelineError {
    fn from(e: BuildError) -> Self {
        PipelineError::Build(e)
    }
}

impl From<CompileError> for PipelineError {
    fn from(e: CompileError) -> Self {
        PipelineError::Compile(e)
    }
}

impl From<LookupError> for PipelineError {
    fn from(e: LookupError) -> Self {
        PipelineError::Lookup(e)
    }
}

impl From<InvokeError> for PipelineError {
    fn from(e: InvokeError) -> Self {
        PipelineError::Invoke(e)
    }
}
