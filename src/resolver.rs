//! External symbol resolution.
//!
//! Maps the names a module leaves unresolved to native addresses. Two
//! strategies, chosen explicitly at construction — there is no default:
//!
//! - `ExplicitBind`: only names registered with [`SymbolResolver::bind`]
//!   resolve. The accepted host surface is exactly what was declared.
//! - `ProcessWide`: bound names first, then the host process's dynamic
//!   symbol table. Convenient, but any exported symbol becomes a candidate.
//!
//! Resolution is deterministic for a given configuration, so a failed
//! resolution is never retried.

use rustc_hash::FxHashMap;

use crate::error::ResolveError;

/// How unbound names are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Resolve only explicitly bound names.
    ExplicitBind,
    /// Fall back to the host process's dynamic symbol table.
    ProcessWide,
}

pub struct SymbolResolver {
    strategy: ResolutionStrategy,
    bindings: FxHashMap<String, *const u8>,
    cache: FxHashMap<String, *const u8>,
    #[cfg(unix)]
    process: Option<libloading::os::unix::Library>,
}

impl SymbolResolver {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        SymbolResolver {
            strategy,
            bindings: FxHashMap::default(),
            cache: FxHashMap::default(),
            #[cfg(unix)]
            process: None,
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Register an explicit binding. Later bindings shadow earlier ones.
    pub fn bind(&mut self, name: impl Into<String>, addr: *const u8) {
        self.bindings.insert(name.into(), addr);
    }

    /// Resolve `name` to a native address.
    ///
    /// Explicit bindings win under either strategy; process-wide lookups are
    /// memoized for the resolver's lifetime.
    pub fn resolve(&mut self, name: &str) -> Result<*const u8, ResolveError> {
        if let Some(&addr) = self.bindings.get(name) {
            return Ok(addr);
        }
        match self.strategy {
            ResolutionStrategy::ExplicitBind => Err(ResolveError::NotFound {
                symbol: name.to_string(),
            }),
            ResolutionStrategy::ProcessWide => {
                if let Some(&addr) = self.cache.get(name) {
                    return Ok(addr);
                }
                let addr = self.process_lookup(name)?;
                self.cache.insert(name.to_string(), addr);
                Ok(addr)
            }
        }
    }

    #[cfg(unix)]
    fn process_lookup(&mut self, name: &str) -> Result<*const u8, ResolveError> {
        let lib = self
            .process
            .get_or_insert_with(libloading::os::unix::Library::this);
        unsafe {
            lib.get::<*const std::ffi::c_void>(name.as_bytes())
                .map(|sym| *sym as *const u8)
                .map_err(|_| ResolveError::NotFound {
                    symbol: name.to_string(),
                })
        }
    }

    #[cfg(not(unix))]
    fn process_lookup(&mut self, name: &str) -> Result<*const u8, ResolveError> {
        Err(ResolveError::Unsupported {
            symbol: name.to_string(),
        })
    }
}

impl std::fmt::Debug for SymbolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolResolver")
            .field("strategy", &self.strategy)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
