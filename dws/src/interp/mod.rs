//! Tree-walking interpreter
//!
//! Values, environments and the type registry live in their own modules;
//! the evaluator is one [`Interpreter`] whose behavior is split by concern
//! (calls, member dispatch, casts, statements, ...).

mod arrays;
mod builtins;
mod call;
mod declare;
mod dispatch;
mod env;
mod error;
mod eval;
mod exceptions;
mod exec;
mod ops;
mod refs;
mod registry;
mod typecast;
mod types;
mod value;
mod variant;

pub use env::{EnvRef, Environment};
pub use error::{ErrorKind, ExceptionValue, InterpResult, RuntimeError};
pub use eval::{CallFrame, DEFAULT_MAX_RECURSION_DEPTH, Interpreter, InterpreterConfig, Output};
pub use registry::{
    class_explicitly_implements_interface, class_implements_interface, is_class_compatible, ClassInfo,
    InterfaceInfo, MethodOwner, RecordInfo, TypeRegistry,
};
pub use value::{ArrayValue, ObjectInstance, TypeTag, Value};
pub use variant::var_type_code;
