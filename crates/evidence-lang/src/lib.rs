#[cfg(test)]
mod tests;

pub mod ast;
pub mod ast_ext;
pub mod build;
pub mod builtins;
mod fmt;
pub mod host;
pub mod interpreter;
pub mod semantics;
pub mod value;

pub use ast_ext::CompileError;
pub use host::{Captured, Host, Limits};
pub use interpreter::Module;
pub use semantics::RuntimeError;
pub use value::{Kwargs, Value};
