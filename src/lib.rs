//! SIML - staged evaluator and object flattener
//!
//! SIML describes simulation models as classes. The compiler executes the
//! module at compile time, folds everything that is known, inlines every
//! function call and turns each `compile` statement into a flat object:
//! a list of typed attributes and the generated code of its main functions.

pub mod location;
pub mod error;
pub mod role;
pub mod ast;
pub mod value;
pub mod heap;
pub mod residual;
pub mod builtins;
pub mod environment;
pub mod config;
pub mod interpreter;
pub mod evaluator;
pub mod flatten;
pub mod dataflow;

pub use ast::Module;
pub use config::BuildConfig;
pub use error::{Category, ErrorKind, Result, SimlError};
pub use flatten::FlatObject;
pub use interpreter::Interpreter;
pub use location::Location;

/// Convenience function to compile a module with the default configuration
pub fn compile_module(module: &Module) -> Result<Vec<FlatObject>> {
    compile_module_with(module, BuildConfig::default())
}

pub fn compile_module_with(module: &Module, config: BuildConfig) -> Result<Vec<FlatObject>> {
    let mut interpreter = Interpreter::with_config(config);
    interpreter.interpret(module)
}

/// Version of the SIML compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
