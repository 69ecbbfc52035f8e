//! Compiled artifact keep-alive.

use cranelift_jit::JITModule;

use crate::context::Context;

/// Finalized code together with everything it points into.
///
/// The `JITModule` owns the executable pages; the `Context` owns the interned
/// string data the generated code holds addresses of. Neither is touched
/// again after finalization — they are held so that neither is freed while a
/// looked-up entry can still run.
pub(crate) struct Artifact {
    #[allow(dead_code)]
    module: JITModule,
    #[allow(dead_code)]
    ctx: Context,
}

impl Artifact {
    pub(crate) fn new(module: JITModule, ctx: Context) -> Self {
        Artifact { module, ctx }
    }
}
