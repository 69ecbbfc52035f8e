//! End-to-end pipeline tests.
//!
//! The host-side formatting routine is replaced by capture harnesses bound
//! through the explicit-bind resolver, so the tests observe exactly what the
//! generated code wrote and how often it called out.

use std::os::raw::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use smelt::{
    run_module, AbiSignature, AbiType, BinOp, CompileError, Context, ErrorPolicy, IrBuilder,
    Module, PipelineError, PipelineOptions, ResolutionStrategy, ReturnValue, Signature,
    SymbolResolver, VerificationError,
};

const GREETING: &str = "Hello from LLVM!\n";

fn options() -> PipelineOptions {
    PipelineOptions {
        policy: ErrorPolicy::Propagate,
        ..PipelineOptions::default()
    }
}

/// Build the hello program: declare `format(ptr, ...) -> i32`, define
/// `main() -> i32` that calls it with the greeting and returns 0.
fn build_hello() -> Module {
    let mut module = Module::new(Context::new(), "hello");
    let mut b = IrBuilder::new(&mut module);
    let i32t = b.int32();
    let i8t = b.int8();
    let bytes = b.ptr_to(i8t);
    let format = b
        .declare_external("format", Signature::variadic(vec![bytes], i32t))
        .unwrap();
    let main_fn = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
    let entry = b.append_block(main_fn, "entry").unwrap();
    b.set_insertion_point(main_fn, entry).unwrap();
    let text = b.const_str(GREETING).unwrap();
    b.call(format, &[text]).unwrap();
    let zero = b.const_int(i32t, 0).unwrap();
    b.ret(Some(zero)).unwrap();
    module
}

static HELLO_CAPTURE: Mutex<String> = Mutex::new(String::new());

unsafe extern "C" fn hello_sink(fmt: *const c_char) -> i32 {
    let text = std::ffi::CStr::from_ptr(fmt).to_string_lossy().into_owned();
    let len = text.len() as i32;
    HELLO_CAPTURE.lock().unwrap().push_str(&text);
    len
}

#[test]
fn hello_pipeline_writes_exactly_the_greeting() {
    let mut resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    resolver.bind("format", hello_sink as *const u8);

    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let ret = run_module(build_hello(), resolver, &options(), "main", &expected).unwrap();

    assert_eq!(ret, ReturnValue::Int32(0));
    assert_eq!(HELLO_CAPTURE.lock().unwrap().as_str(), GREETING);
}

static IDEM_CAPTURE: Mutex<String> = Mutex::new(String::new());
static IDEM_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn idem_sink(fmt: *const c_char) -> i32 {
    IDEM_CALLS.fetch_add(1, Ordering::SeqCst);
    let text = std::ffi::CStr::from_ptr(fmt).to_string_lossy().into_owned();
    IDEM_CAPTURE.lock().unwrap().push_str(&text);
    0
}

#[test]
fn invoking_twice_produces_identical_output() {
    let mut resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    resolver.bind("format", idem_sink as *const u8);

    let mut engine = smelt::Engine::new(resolver, smelt::EngineConfig::default()).unwrap();
    engine.add_module(build_hello()).unwrap();
    let entry = engine.lookup("main").unwrap();
    let expected = AbiSignature::nullary(Some(AbiType::I32));

    let first = entry.invoke(&expected).unwrap();
    let after_first = IDEM_CAPTURE.lock().unwrap().clone();
    let second = entry.invoke(&expected).unwrap();
    let after_second = IDEM_CAPTURE.lock().unwrap().clone();

    assert_eq!(first, second);
    assert_eq!(after_first.as_str(), GREETING);
    assert_eq!(after_second, GREETING.repeat(2));
    assert_eq!(IDEM_CALLS.load(Ordering::SeqCst), 2);
}

#[test]
fn unbound_format_fails_with_unresolved_symbol() {
    // Explicit-bind with no binding: compilation must fail before any code
    // exists, naming the symbol.
    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let err = run_module(build_hello(), resolver, &options(), "main", &expected).unwrap_err();
    match err {
        PipelineError::Compile(CompileError::UnresolvedSymbol(name)) => {
            assert_eq!(name, "format")
        }
        other => panic!("expected UnresolvedSymbol, got {:?}", other),
    }
}

#[test]
fn missing_terminator_fails_verification_with_block_name() {
    let mut module = Module::new(Context::new(), "broken");
    let mut b = IrBuilder::new(&mut module);
    let i32t = b.int32();
    let f = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
    let entry = b.append_block(f, "entry").unwrap();
    b.set_insertion_point(f, entry).unwrap();
    b.const_int(i32t, 1).unwrap();

    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let err = run_module(module, resolver, &options(), "main", &expected).unwrap_err();
    match err {
        PipelineError::Compile(CompileError::Verification(
            VerificationError::MissingTerminator { func, block },
        )) => {
            assert_eq!(func, "main");
            assert_eq!(block, "entry");
        }
        other => panic!("expected MissingTerminator, got {:?}", other),
    }
}

#[test]
fn bare_return_from_i32_function_fails_verification() {
    let mut module = Module::new(Context::new(), "broken");
    let mut b = IrBuilder::new(&mut module);
    let i32t = b.int32();
    let f = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
    let entry = b.append_block(f, "entry").unwrap();
    b.set_insertion_point(f, entry).unwrap();
    b.ret(None).unwrap();

    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let err = run_module(module, resolver, &options(), "main", &expected).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Compile(CompileError::Verification(
            VerificationError::ReturnTypeMismatch { .. }
        ))
    ));
}

#[test]
fn missing_entry_point_is_a_lookup_error() {
    let mut resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    resolver.bind("format", hello_sink as *const u8);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let err = run_module(build_hello(), resolver, &options(), "start", &expected).unwrap_err();
    assert!(matches!(err, PipelineError::Lookup(_)));
}

#[test]
fn wrong_expected_signature_is_refused_before_the_call() {
    static REFUSED_CALLS: AtomicUsize = AtomicUsize::new(0);
    unsafe extern "C" fn counting_sink(_fmt: *const c_char) -> i32 {
        REFUSED_CALLS.fetch_add(1, Ordering::SeqCst);
        0
    }

    let mut resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    resolver.bind("format", counting_sink as *const u8);

    let expected = AbiSignature::nullary(Some(AbiType::I64));
    let err = run_module(build_hello(), resolver, &options(), "main", &expected).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Invoke(smelt::InvokeError::SignatureMismatch { .. })
    ));
    // The mismatch was caught before any control transfer.
    assert_eq!(REFUSED_CALLS.load(Ordering::SeqCst), 0);
}

#[test]
fn void_entry_returns_unit() {
    let mut module = Module::new(Context::new(), "void");
    let mut b = IrBuilder::new(&mut module);
    let void = b.void();
    let f = b.create_function("noop", Signature::new(vec![], void)).unwrap();
    let entry = b.append_block(f, "entry").unwrap();
    b.set_insertion_point(f, entry).unwrap();
    b.ret(None).unwrap();

    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let expected = AbiSignature::nullary(None);
    let ret = run_module(module, resolver, &options(), "noop", &expected).unwrap();
    assert_eq!(ret, ReturnValue::Unit);
}

static VARARG_LAST: Mutex<Option<(String, i64)>> = Mutex::new(None);

unsafe extern "C" fn vararg_sink(fmt: *const c_char, value: i64) -> i32 {
    let text = std::ffi::CStr::from_ptr(fmt).to_string_lossy().into_owned();
    *VARARG_LAST.lock().unwrap() = Some((text, value));
    0
}

#[test]
fn variadic_call_passes_extra_arguments() {
    let mut module = Module::new(Context::new(), "vararg");
    let mut b = IrBuilder::new(&mut module);
    let i32t = b.int32();
    let i64t = b.int64();
    let i8t = b.int8();
    let bytes = b.ptr_to(i8t);
    let format = b
        .declare_external("format", Signature::variadic(vec![bytes], i32t))
        .unwrap();
    let main_fn = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
    let entry = b.append_block(main_fn, "entry").unwrap();
    b.set_insertion_point(main_fn, entry).unwrap();
    let text = b.const_str("count: %ld\n").unwrap();
    let six = b.const_int(i64t, 6).unwrap();
    let seven = b.const_int(i64t, 7).unwrap();
    let answer = b.binop(BinOp::Mul, six, seven).unwrap();
    b.call(format, &[text, answer]).unwrap();
    let zero = b.const_int(i32t, 0).unwrap();
    b.ret(Some(zero)).unwrap();

    let mut resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    resolver.bind("format", vararg_sink as *const u8);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let ret = run_module(module, resolver, &options(), "main", &expected).unwrap();

    assert_eq!(ret, ReturnValue::Int32(0));
    let seen = VARARG_LAST.lock().unwrap().clone();
    assert_eq!(seen, Some(("count: %ld\n".to_string(), 42)));
}

#[test]
fn entry_return_value_flows_back() {
    let mut module = Module::new(Context::new(), "codes");
    let mut b = IrBuilder::new(&mut module);
    let i32t = b.int32();
    let f = b.create_function("main", Signature::new(vec![], i32t)).unwrap();
    let entry = b.append_block(f, "entry").unwrap();
    b.set_insertion_point(f, entry).unwrap();
    let code = b.const_int(i32t, 17).unwrap();
    b.ret(Some(code)).unwrap();

    let resolver = SymbolResolver::new(ResolutionStrategy::ExplicitBind);
    let expected = AbiSignature::nullary(Some(AbiType::I32));
    let ret = run_module(module, resolver, &options(), "main", &expected).unwrap();
    assert_eq!(ret, ReturnValue::Int32(17));
}
