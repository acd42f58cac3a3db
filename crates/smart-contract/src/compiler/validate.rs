//! Source validator: parses a contract and enforces the deterministic
//! subset of Python the rest of the pipeline assumes (spec §4.1). Mirrors
//! `vm_py.validate` and `vm_py.compiler.builtins_allowlist`.

use super::py_ast::{self, ast};
use animica_config::{MAX_AST_NODES, MAX_FUNC_ARGS, MAX_LITERAL_BYTES, MAX_NESTED_FUNC_DEPTH, MAX_SOURCE_BYTES};
use animica_vm_core::ValidationError;
use std::collections::BTreeSet;

/// Import surfaces a contract may pull `from stdlib import ...`. Includes
/// `random`, unlike `vm_py.compiler.builtins_allowlist.ALLOWED_IMPORTS`,
/// because spec.md's stdlib import allowlist names it explicitly (see
/// SPEC_FULL.md's Open Question log in DESIGN.md).
pub const ALLOWED_STDLIB_MODULES: &[&str] = &["storage", "events", "hash", "abi", "treasury", "syscalls", "random"];

struct BuiltinRule {
    min_args: usize,
    max_args: Option<usize>,
}

fn allowed_builtin(name: &str) -> Option<BuiltinRule> {
    match name {
        "int" => Some(BuiltinRule { min_args: 0, max_args: Some(1) }),
        "bytes" => Some(BuiltinRule { min_args: 0, max_args: Some(1) }),
        "bool" => Some(BuiltinRule { min_args: 0, max_args: Some(1) }),
        "abs" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        "min" => Some(BuiltinRule { min_args: 1, max_args: None }),
        "max" => Some(BuiltinRule { min_args: 1, max_args: None }),
        "len" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        "sum" => Some(BuiltinRule { min_args: 1, max_args: Some(2) }),
        "all" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        "any" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        "enumerate" => Some(BuiltinRule { min_args: 1, max_args: Some(2) }),
        "range" => Some(BuiltinRule { min_args: 1, max_args: Some(3) }),
        "reversed" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        "sorted" => Some(BuiltinRule { min_args: 1, max_args: Some(1) }),
        _ => None,
    }
}

const BLOCKED_BUILTIN_NAMES: &[&str] = &[
    "open", "print", "input", "eval", "exec", "compile", "__import__", "dir", "vars", "locals", "globals", "getattr", "setattr",
    "delattr", "hasattr", "super", "hash", "memoryview", "format", "object", "type", "classmethod", "staticmethod", "property",
    "help", "quit", "exit",
];

/// Parsed contract, validated against the deterministic subset, ready for
/// AST lowering.
pub struct ValidatedModule {
    pub filename: String,
    pub body: ast::Suite,
}

struct Validator {
    filename: String,
    node_count: usize,
    func_depth: usize,
    defined_funcs: BTreeSet<String>,
    imported_stdlib: BTreeSet<String>,
}

pub fn validate_source(source: &str, filename: &str) -> Result<ValidatedModule, ValidationError> {
    let byte_len = source.len();
    if byte_len > MAX_SOURCE_BYTES {
        return Err(ValidationError::SizeLimit { actual: byte_len, limit: MAX_SOURCE_BYTES });
    }

    let body = py_ast::parse_module(source, filename).map_err(|reason| ValidationError::Syntax { reason })?;

    let mut validator = Validator {
        filename: filename.to_string(),
        node_count: 0,
        func_depth: 0,
        defined_funcs: BTreeSet::new(),
        imported_stdlib: BTreeSet::new(),
    };
    validator.visit_module(&body)?;

    Ok(ValidatedModule { filename: filename.to_string(), body })
}

impl Validator {
    fn bump_node_count(&mut self) -> Result<(), ValidationError> {
        self.node_count += 1;
        if self.node_count > MAX_AST_NODES {
            return Err(ValidationError::NodeLimit { actual: self.node_count, limit: MAX_AST_NODES });
        }
        Ok(())
    }

    fn visit_module(&mut self, body: &[ast::Stmt]) -> Result<(), ValidationError> {
        for stmt in body {
            match stmt {
                ast::Stmt::Expr(e) if matches!(*e.value, ast::Expr::Constant(_)) => continue,
                ast::Stmt::ImportFrom(imp) => self.check_import_from(imp)?,
                ast::Stmt::Import(imp) => self.check_import(imp)?,
                ast::Stmt::Assign(a) => self.check_module_assign(&a.targets, &a.value)?,
                ast::Stmt::AnnAssign(a) => {
                    let value = a.value.as_deref().ok_or_else(|| ValidationError::NodeUnsupported { node: "AnnAssign without value".to_string() })?;
                    self.check_module_assign(std::slice::from_ref(a.target.as_ref()), value)?
                }
                ast::Stmt::FunctionDef(f) => {
                    if f.name.as_str().starts_with('_') {
                        return Err(ValidationError::PrivateName { name: f.name.to_string() });
                    }
                    if !self.defined_funcs.insert(f.name.to_string()) {
                        return Err(ValidationError::DuplicateFunction { name: f.name.to_string() });
                    }
                }
                other => return Err(ValidationError::NodeUnsupported { node: format!("{other:?} at module scope") }),
            }
        }
        for stmt in body {
            if let ast::Stmt::FunctionDef(f) = stmt {
                self.visit_function(f)?;
            }
        }
        Ok(())
    }

    fn check_module_assign(&mut self, targets: &[ast::Expr], value: &ast::Expr) -> Result<(), ValidationError> {
        for t in targets {
            match t {
                ast::Expr::Name(n) => {
                    if n.id.as_str().starts_with('_') {
                        return Err(ValidationError::PrivateName { name: n.id.to_string() });
                    }
                }
                other => return Err(ValidationError::NodeUnsupported { node: format!("assignment target {other:?}") }),
            }
        }
        if !py_ast::is_constant_like(value, 0) {
            return Err(ValidationError::NodeUnsupported { node: "module-scope assignment must be a literal constant".to_string() });
        }
        if let ast::Expr::Constant(c) = value {
            if let ast::Constant::Bytes(b) = &c.value {
                if b.len() > MAX_LITERAL_BYTES {
                    return Err(ValidationError::SizeLimit { actual: b.len(), limit: MAX_LITERAL_BYTES });
                }
            }
        }
        Ok(())
    }

    fn check_import_from(&mut self, imp: &ast::StmtImportFrom) -> Result<(), ValidationError> {
        if imp.level.map(|l| l.to_u32() != 0).unwrap_or(false) {
            return Err(ValidationError::ForbiddenImport { module: "<relative>".to_string() });
        }
        let module = imp.module.as_ref().map(|m| m.to_string()).unwrap_or_default();
        if module != "stdlib" {
            return Err(ValidationError::ForbiddenImport { module });
        }
        for alias in &imp.names {
            if alias.name.as_str() == "*" {
                return Err(ValidationError::ImportWildcard);
            }
            if let Some(asname) = &alias.asname {
                if asname.as_str() != alias.name.as_str() {
                    return Err(ValidationError::NodeUnsupported { node: "aliased stdlib import".to_string() });
                }
            }
            if !ALLOWED_STDLIB_MODULES.contains(&alias.name.as_str()) {
                return Err(ValidationError::ForbiddenImport { module: format!("stdlib.{}", alias.name) });
            }
            self.imported_stdlib.insert(alias.name.to_string());
        }
        Ok(())
    }

    fn check_import(&mut self, imp: &ast::StmtImport) -> Result<(), ValidationError> {
        for alias in &imp.names {
            if alias.name.as_str() != "stdlib" || alias.asname.as_ref().map(|a| a.as_str() != "stdlib").unwrap_or(false) {
                return Err(ValidationError::ForbiddenImport { module: alias.name.to_string() });
            }
            self.imported_stdlib.insert("stdlib".to_string());
        }
        Ok(())
    }

    fn visit_function(&mut self, f: &ast::StmtFunctionDef) -> Result<(), ValidationError> {
        if !f.decorator_list.is_empty() {
            return Err(ValidationError::NodeUnsupported { node: "decorator".to_string() });
        }
        let params = py_ast::simple_positional_params(&f.args).map_err(|reason| ValidationError::NodeUnsupported { node: reason })?;
        if params.len() > MAX_FUNC_ARGS {
            return Err(ValidationError::ArgLimit { actual: params.len(), limit: MAX_FUNC_ARGS });
        }

        self.func_depth += 1;
        if self.func_depth > MAX_NESTED_FUNC_DEPTH {
            return Err(ValidationError::DepthLimit { actual: self.func_depth, limit: MAX_NESTED_FUNC_DEPTH });
        }
        for stmt in &f.body {
            self.visit_stmt(stmt)?;
        }
        self.func_depth -= 1;
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt) -> Result<(), ValidationError> {
        self.bump_node_count()?;
        match stmt {
            ast::Stmt::Assign(a) => {
                for t in &a.targets {
                    self.visit_assign_target(t)?;
                }
                self.visit_expr(&a.value)?;
            }
            ast::Stmt::AugAssign(a) => {
                self.visit_assign_target(&a.target)?;
                self.visit_expr(&a.value)?;
            }
            ast::Stmt::Expr(e) => self.visit_expr(&e.value)?,
            ast::Stmt::Return(r) => {
                if let Some(v) = &r.value {
                    self.visit_expr(v)?;
                }
            }
            ast::Stmt::If(i) => {
                self.visit_expr(&i.test)?;
                for s in &i.body {
                    self.visit_stmt(s)?;
                }
                for s in &i.orelse {
                    self.visit_stmt(s)?;
                }
            }
            ast::Stmt::While(w) => {
                self.visit_expr(&w.test)?;
                if !w.orelse.is_empty() {
                    return Err(ValidationError::NodeUnsupported { node: "while/else".to_string() });
                }
                for s in &w.body {
                    self.visit_stmt(s)?;
                }
            }
            ast::Stmt::Pass(_) => {}
            other => return Err(ValidationError::NodeUnsupported { node: format!("{other:?}") }),
        }
        Ok(())
    }

    fn visit_assign_target(&mut self, target: &ast::Expr) -> Result<(), ValidationError> {
        match target {
            ast::Expr::Name(n) => {
                if n.id.as_str().starts_with('_') {
                    return Err(ValidationError::PrivateName { name: n.id.to_string() });
                }
                Ok(())
            }
            ast::Expr::Tuple(t) => {
                for elt in &t.elts {
                    self.visit_assign_target(elt)?;
                }
                Ok(())
            }
            other => Err(ValidationError::NodeUnsupported { node: format!("assignment target {other:?}") }),
        }
    }

    fn visit_expr(&mut self, expr: &ast::Expr) -> Result<(), ValidationError> {
        self.bump_node_count()?;
        match expr {
            ast::Expr::Constant(_) | ast::Expr::Name(_) => Ok(()),
            ast::Expr::BinOp(b) => {
                self.visit_expr(&b.left)?;
                self.visit_expr(&b.right)
            }
            ast::Expr::BoolOp(b) => b.values.iter().try_for_each(|v| self.visit_expr(v)),
            ast::Expr::UnaryOp(u) => self.visit_expr(&u.operand),
            ast::Expr::Compare(c) => {
                if !c.ops.is_empty() && c.comparators.len() != 1 {
                    return Err(ValidationError::NodeUnsupported { node: "chained comparison".to_string() });
                }
                self.visit_expr(&c.left)?;
                c.comparators.iter().try_for_each(|v| self.visit_expr(v))
            }
            ast::Expr::Attribute(a) => {
                if a.attr.as_str().starts_with('_') {
                    return Err(ValidationError::NodeUnsupported { node: "private attribute access".to_string() });
                }
                self.visit_expr(&a.value)
            }
            ast::Expr::Subscript(s) => {
                self.visit_expr(&s.value)?;
                self.visit_expr(&s.slice)
            }
            ast::Expr::Call(c) => self.visit_call(c),
            other => Err(ValidationError::NodeUnsupported { node: format!("{other:?}") }),
        }
    }

    fn visit_call(&mut self, call: &ast::ExprCall) -> Result<(), ValidationError> {
        if call.keywords.iter().any(|k| k.arg.is_none()) {
            return Err(ValidationError::NodeUnsupported { node: "**kwargs expansion".to_string() });
        }
        match call.func.as_ref() {
            ast::Expr::Name(n) => {
                let name = n.id.as_str();
                if BLOCKED_BUILTIN_NAMES.contains(&name) {
                    return Err(ValidationError::BuiltinForbidden { name: name.to_string(), reason: "blocked builtin".to_string() });
                }
                if let Some(rule) = allowed_builtin(name) {
                    let argc = call.args.len();
                    if argc < rule.min_args || rule.max_args.map(|m| argc > m).unwrap_or(false) {
                        return Err(ValidationError::ArgLimit { actual: argc, limit: rule.max_args.unwrap_or(rule.min_args) });
                    }
                } else if name.starts_with('_') {
                    return Err(ValidationError::PrivateName { name: name.to_string() });
                }
            }
            attr @ ast::Expr::Attribute(_) => {
                let chain = py_ast::attribute_chain(attr).ok_or_else(|| ValidationError::StdlibCallShape { reason: "unresolvable call target".to_string() })?;
                self.check_stdlib_call_shape(&chain)?;
            }
            other => return Err(ValidationError::NodeUnsupported { node: format!("call target {other:?}") }),
        }
        for a in &call.args {
            self.visit_expr(a)?;
        }
        for k in &call.keywords {
            self.visit_expr(&k.value)?;
        }
        Ok(())
    }

    fn check_stdlib_call_shape(&self, chain: &[String]) -> Result<(), ValidationError> {
        let bad_shape = || ValidationError::StdlibCallShape { reason: chain.join(".") };
        if chain.first().map(String::as_str) == Some("stdlib") {
            if chain.len() != 3 || !ALLOWED_STDLIB_MODULES.contains(&chain[1].as_str()) || chain[2].starts_with('_') {
                return Err(bad_shape());
            }
            if !self.imported_stdlib.contains("stdlib") {
                return Err(ValidationError::ForbiddenImport { module: "stdlib".to_string() });
            }
        } else {
            if !self.imported_stdlib.contains(&chain[0]) {
                return Err(ValidationError::ForbiddenImport { module: chain[0].clone() });
            }
            if chain.len() != 2 || chain[1].starts_with('_') {
                return Err(bad_shape());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_minimal_counter_contract() {
        let source = "from stdlib import storage\n\ndef increment(amount):\n    storage.sstore(b'v', amount)\n";
        assert!(validate_source(source, "<contract>").is_ok());
    }

    #[test]
    fn rejects_forbidden_import() {
        let source = "import os\n";
        let err = validate_source(source, "<contract>").unwrap_err();
        matches!(err, ValidationError::ForbiddenImport { .. });
    }

    #[test]
    fn rejects_blocked_builtin() {
        let source = "from stdlib import storage\n\ndef f():\n    print(1)\n";
        let err = validate_source(source, "<contract>").unwrap_err();
        matches!(err, ValidationError::BuiltinForbidden { .. });
    }

    #[test]
    fn rejects_wildcard_import() {
        let source = "from stdlib import *\n";
        let err = validate_source(source, "<contract>").unwrap_err();
        matches!(err, ValidationError::ImportWildcard);
    }
}
