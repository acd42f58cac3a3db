//! Wire-facing structured error type and the narrower per-stage error enums
//! that convert into it.
//!
//! `VmError` is the canonical `{code, message, context}` triple from the
//! core spec's error taxonomy (§7): it is what crosses the loader/engine
//! boundary and what any embedding host serializes. Each compiler/runtime
//! stage defines its own `thiserror` enum for ergonomic `?`-propagation
//! internally, then converts to `VmError` at the boundary.

use std::collections::BTreeMap;
use std::fmt;

/// A context value attached to a structured error. Kept intentionally small
/// — just enough to report "what was observed and what was the limit".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Str(s.to_string())
    }
}
impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Str(s)
    }
}
impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Int(v)
    }
}
impl From<u64> for ContextValue {
    fn from(v: u64) -> Self {
        ContextValue::UInt(v)
    }
}
impl From<usize> for ContextValue {
    fn from(v: usize) -> Self {
        ContextValue::UInt(v as u64)
    }
}
impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Str(s) => write!(f, "{s}"),
            ContextValue::Int(v) => write!(f, "{v}"),
            ContextValue::UInt(v) => write!(f, "{v}"),
            ContextValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// The canonical structured error that crosses every public API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmError {
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, ContextValue>,
}

impl VmError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        VmError { code: code.into(), message: message.into(), context: BTreeMap::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {}

/// Error codes from the §7 taxonomy, as constants to avoid stringly-typed
/// drift between raise sites and tests.
pub mod codes {
    pub const FORBIDDEN_IMPORT: &str = "forbidden_import";
    pub const VM_ERROR: &str = "vm_error";
    pub const OUT_OF_GAS: &str = "out_of_gas";
    pub const ABI_REQUIRE_FAILED: &str = "abi.require_failed";
    pub const EVENT_INVALID: &str = "event_invalid";
    pub const CAPABILITY_DENIED: &str = "capability_denied";
    pub const RESOURCE_EXHAUSTED: &str = "resource_exhausted";
    pub const CODEC: &str = "codec";

    pub mod validation {
        pub const SYNTAX: &str = "validation.syntax";
        pub const NODE_UNSUPPORTED: &str = "validation.node_unsupported";
        pub const IMPORT_WILDCARD: &str = "validation.import_wildcard";
        pub const PRIVATE_NAME: &str = "validation.private_name";
        pub const SIZE_LIMIT: &str = "validation.size_limit";
        pub const NODE_LIMIT: &str = "validation.node_limit";
        pub const DEPTH_LIMIT: &str = "validation.depth_limit";
        pub const ARG_LIMIT: &str = "validation.arg_limit";
        pub const BUILTIN_FORBIDDEN: &str = "validation.builtin_forbidden";
        pub const STDLIB_CALL_SHAPE: &str = "validation.stdlib_call_shape";
        pub const METHOD_NOT_EXPORTED: &str = "validation.method_not_exported";
    }

    pub mod compile {
        pub const LOWER: &str = "compile.lower";
        pub const TYPECHECK: &str = "compile.typecheck";
        pub const ENCODE: &str = "compile.encode";
    }
}

/// Source-validation failures (spec §4.1, error family `validation.*` /
/// `forbidden_import`).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("syntax error: {reason}")]
    Syntax { reason: String },
    #[error("unsupported AST node: {node}")]
    NodeUnsupported { node: String },
    #[error("wildcard import is not allowed")]
    ImportWildcard,
    #[error("import of module '{module}' is not allowed")]
    ForbiddenImport { module: String },
    #[error("private/dunder name '{name}' is not allowed at module scope")]
    PrivateName { name: String },
    #[error("source size {actual} exceeds limit {limit}")]
    SizeLimit { actual: usize, limit: usize },
    #[error("AST node count {actual} exceeds limit {limit}")]
    NodeLimit { actual: usize, limit: usize },
    #[error("function nesting depth {actual} exceeds limit {limit}")]
    DepthLimit { actual: usize, limit: usize },
    #[error("argument count {actual} exceeds limit {limit}")]
    ArgLimit { actual: usize, limit: usize },
    #[error("builtin '{name}' is forbidden: {reason}")]
    BuiltinForbidden { name: String, reason: String },
    #[error("call shape not permitted: {reason}")]
    StdlibCallShape { reason: String },
    #[error("duplicate function name '{name}'")]
    DuplicateFunction { name: String },
}

impl From<ValidationError> for VmError {
    fn from(e: ValidationError) -> Self {
        use codes::validation::*;
        let code = match &e {
            ValidationError::Syntax { .. } => SYNTAX,
            ValidationError::NodeUnsupported { .. } => NODE_UNSUPPORTED,
            ValidationError::ImportWildcard => IMPORT_WILDCARD,
            ValidationError::ForbiddenImport { .. } => codes::FORBIDDEN_IMPORT,
            ValidationError::PrivateName { .. } => PRIVATE_NAME,
            ValidationError::SizeLimit { .. } => SIZE_LIMIT,
            ValidationError::NodeLimit { .. } => NODE_LIMIT,
            ValidationError::DepthLimit { .. } => DEPTH_LIMIT,
            ValidationError::ArgLimit { .. } => ARG_LIMIT,
            ValidationError::BuiltinForbidden { .. } => BUILTIN_FORBIDDEN,
            ValidationError::StdlibCallShape { .. } => STDLIB_CALL_SHAPE,
            ValidationError::DuplicateFunction { .. } => NODE_UNSUPPORTED,
        };
        VmError::new(code, e.to_string())
    }
}

/// Compile-pipeline failures: lowering, typechecking, encoding (spec §4.2).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("lowering failed: {reason}")]
    Lower { reason: String },
    #[error("type error: {reason}")]
    TypeCheck { reason: String },
    #[error("encode failed: {reason}")]
    Encode { reason: String },
    #[error("no codec available: need at least one of CBOR or MsgPack")]
    NoCodecAvailable,
}

impl From<CompileError> for VmError {
    fn from(e: CompileError) -> Self {
        use codes::compile::*;
        let code = match &e {
            CompileError::Lower { .. } => LOWER,
            CompileError::TypeCheck { .. } => TYPECHECK,
            CompileError::Encode { .. } | CompileError::NoCodecAvailable => ENCODE,
        };
        VmError::new(code, e.to_string())
    }
}

/// Canonical-codec failures (spec §4.2, §6): bad magic/version/format, or a
/// payload whose shape doesn't match its tag.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported version {version}")]
    UnsupportedVersion { version: u8 },
    #[error("unsupported format byte {format}")]
    UnsupportedFormat { format: u8 },
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },
}

impl From<CodecError> for VmError {
    fn from(e: CodecError) -> Self {
        VmError::new(codes::CODEC, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = VmError::new("resource_exhausted", "too much blob").with("kind", "blob.pin").with("used", 1025u64);
        let s = e.to_string();
        assert!(s.contains("resource_exhausted"));
        assert!(s.contains("kind=blob.pin"));
        assert!(s.contains("used=1025"));
    }

    #[test]
    fn validation_error_maps_to_expected_code() {
        let e: VmError = ValidationError::ForbiddenImport { module: "os".into() }.into();
        assert_eq!(e.code, codes::FORBIDDEN_IMPORT);
    }
}
