//! The one place `rustpython_parser`'s AST types are named directly. Every
//! other compiler stage pattern-matches on `ast::Stmt`/`ast::Expr` imported
//! from here, so a future parser swap only touches this file and
//! [`parse_module`].

pub use rustpython_parser::ast;

use rustpython_parser::Parse;

/// Parse `source` as a Python module, producing the raw `rustpython` AST.
/// Syntax errors surface as `ValidationError::Syntax` at the call site.
pub fn parse_module(source: &str, filename: &str) -> Result<ast::Suite, String> {
    ast::Suite::parse(source, filename).map_err(|e| e.to_string())
}

/// Positional parameter names of a function def. Rejects (by returning
/// `Err`) any `*args`/`**kwargs`/positional-only/keyword-only parameter,
/// since the structured IR has no representation for them.
pub fn simple_positional_params(args: &ast::Arguments) -> Result<Vec<String>, String> {
    if !args.posonlyargs.is_empty() || !args.kwonlyargs.is_empty() || args.vararg.is_some() || args.kwarg.is_some() {
        return Err("varargs/kwargs/pos-only/kw-only parameters are not supported".to_string());
    }
    Ok(args.args.iter().map(|a| a.def.arg.to_string()).collect())
}

/// A dotted attribute chain such as `stdlib.storage.get`, read leaf-first
/// in the AST (`Attribute{value: Attribute{value: Name("stdlib"), attr:
/// "storage"}, attr: "get"}`) and returned root-first.
pub fn attribute_chain(expr: &ast::Expr) -> Option<Vec<String>> {
    fn walk(expr: &ast::Expr, out: &mut Vec<String>) -> bool {
        match expr {
            ast::Expr::Name(n) => {
                out.push(n.id.to_string());
                true
            }
            ast::Expr::Attribute(a) => {
                if !walk(&a.value, out) {
                    return false;
                }
                out.push(a.attr.to_string());
                true
            }
            _ => false,
        }
    }
    let mut out = Vec::new();
    if walk(expr, &mut out) {
        Some(out)
    } else {
        None
    }
}

/// True if `expr` is a literal or a tuple/list/set/dict built only from
/// literals, recursing up to a shallow depth the same way `validate.py`'s
/// `_is_constant_like` does.
pub fn is_constant_like(expr: &ast::Expr, depth: u32) -> bool {
    if depth > 4 {
        return false;
    }
    match expr {
        ast::Expr::Constant(_) => true,
        ast::Expr::Tuple(t) => t.elts.iter().all(|e| is_constant_like(e, depth + 1)),
        ast::Expr::List(l) => l.elts.iter().all(|e| is_constant_like(e, depth + 1)),
        ast::Expr::Set(s) => s.elts.iter().all(|e| is_constant_like(e, depth + 1)),
        ast::Expr::Dict(d) => d.values.iter().all(|v| is_constant_like(v, depth + 1)) && d.keys.iter().all(|k| k.as_ref().map_or(true, |k| is_constant_like(k, depth + 1))),
        _ => false,
    }
}
