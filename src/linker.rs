//! Backend hand-off: verification, JIT materialization and the runtime
//! symbols generated code links against.
//!
//! `malloc`, `free` and `memcmp` resolve from the host process; the panic
//! runtime is provided here and mapped into the engine explicitly. Static
//! constructors run when the engine is created, static destructors when it
//! is dropped.

use std::{error::Error, fmt::Display};

use inkwell::{
    execution_engine::ExecutionEngine,
    module::Module,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};

/// A failure inside the backend: verifier complaints are compiler bugs,
/// lookup failures are usage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenError {
    pub message: String,
}

impl GenError {
    fn new(message: impl ToString) -> GenError {
        GenError {
            message: message.to_string(),
        }
    }
}

impl Display for GenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.as_str())
    }
}

impl Error for GenError {}

/// Host-side panic runtime. Generated code calls this through the
/// `stela_panic` symbol; it never returns.
extern "C" fn stela_panic(message: *const std::os::raw::c_char) -> ! {
    if message.is_null() {
        eprintln!("stela: panic");
    } else {
        let text = unsafe { std::ffi::CStr::from_ptr(message) }.to_string_lossy();
        eprintln!("stela: {text}");
    }
    std::process::abort()
}

/// The executing module. Dropping the engine runs the registered static
/// destructors.
pub struct Engine<'ctx> {
    module: Module<'ctx>,
    engine: ExecutionEngine<'ctx>,
}

impl<'ctx> Engine<'ctx> {
    /// Address of an `extern` function, castable to its C signature.
    pub fn address_of(&self, name: &str) -> Result<usize, GenError> {
        self.engine
            .get_function_address(name)
            .map_err(|err| GenError::new(format!("Function \"{name}\" not found: {err}")))
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        self.engine.run_static_destructors();
    }
}

/// Verifies the module and hands it to MCJIT. Any verifier complaint is an
/// internal error: the code generator emitted invalid IR.
pub fn link(module: Module) -> Result<Engine, GenError> {
    module
        .verify()
        .map_err(|err| GenError::new(format!("Module verification failed: {}", err.to_string())))?;

    Target::initialize_native(&InitializationConfig::default())
        .map_err(|err| GenError::new(format!("Native target unavailable: {err}")))?;

    let engine = module
        .create_jit_execution_engine(OptimizationLevel::Aggressive)
        .map_err(|err| GenError::new(format!("Failed to create execution engine: {err}")))?;

    if let Some(panic_fn) = module.get_function("stela_panic") {
        engine.add_global_mapping(&panic_fn, stela_panic as usize);
    }

    engine.run_static_constructors();

    Ok(Engine { module, engine })
}
