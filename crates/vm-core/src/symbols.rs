//! Compile-time symbol table: variables, constants, user functions, stdlib
//! methods, events, and storage-key hints. Mirrors `vm_py.compiler.symbols`,
//! supplemented here (spec.md is silent on symbol resolution) because every
//! non-trivial compiler needs one.
//!
//! `MethodDispatch` also backs the static-registry redesign direction: a
//! method's `dispatch_id` is a stable hash of its full signature, computed
//! once at declaration time instead of re-derived via string reflection on
//! every `CALL`.

use animica_cryptography::sha3_256_domain;
use std::collections::BTreeMap;

const METHOD_DOMAIN: &[u8] = b"animica.vm.method";
const STORAGE_KEY_DOMAIN: &[u8] = b"animica.vm.storage-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SymbolKind {
    Var,
    Const,
    Func,
    Method,
    Event,
    StorageKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSymbol {
    pub owner: String,
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

impl MethodSymbol {
    /// First 16 hex characters of `SHA3-256("animica.vm.method|" ||
    /// owner || "|" || name || "|" || params || "|" || return)`, matching
    /// `symbols.py`'s `MethodSymbol.dispatch_id`.
    pub fn dispatch_id(&self) -> String {
        let params_joined = self.params.join(",");
        let mut preimage = Vec::new();
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(self.owner.as_bytes());
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(self.name.as_bytes());
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(params_joined.as_bytes());
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(self.return_type.as_bytes());
        let digest = sha3_256_domain(&preimage, METHOD_DOMAIN);
        hex::encode(&digest[..8])
    }
}

/// A storage-key hint: the deterministic 32-byte key a named contract-level
/// symbol maps to in the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeyHint {
    pub contract: String,
    pub symbol: String,
}

impl StorageKeyHint {
    pub fn key32(&self) -> [u8; 32] {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(self.contract.as_bytes());
        preimage.extend_from_slice(b"|");
        preimage.extend_from_slice(self.symbol.as_bytes());
        sha3_256_domain(&preimage, STORAGE_KEY_DOMAIN)
    }

    pub fn hex(&self) -> String {
        format!("0x{}", hex::encode(self.key32()))
    }
}

/// Registry of compiled methods keyed by `dispatch_id`, and the reverse
/// lookup by `(owner, name)` used while lowering `obj.method(...)` calls.
#[derive(Debug, Clone, Default)]
pub struct MethodDispatch {
    by_id: BTreeMap<String, MethodSymbol>,
    by_owner_name: BTreeMap<(String, String), String>,
}

impl MethodDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: MethodSymbol) -> String {
        let id = method.dispatch_id();
        self.by_owner_name.insert((method.owner.clone(), method.name.clone()), id.clone());
        self.by_id.insert(id.clone(), method);
        id
    }

    pub fn resolve_id(&self, owner: &str, name: &str) -> Option<&str> {
        self.by_owner_name.get(&(owner.to_string(), name.to_string())).map(String::as_str)
    }

    pub fn get(&self, dispatch_id: &str) -> Option<&MethodSymbol> {
        self.by_id.get(dispatch_id)
    }
}

/// Per-module compile-time table of declared names. Declaration methods
/// reject redeclaration in the same scope, matching `symbols.py`'s
/// `SymbolTable`.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    vars: BTreeMap<String, Symbol>,
    consts: BTreeMap<String, Symbol>,
    funcs: BTreeMap<String, FunctionSymbol>,
    methods: MethodDispatch,
    events: BTreeMap<String, Symbol>,
    storage_keys: BTreeMap<String, StorageKeyHint>,
    contract_name: String,
}

impl SymbolTable {
    pub fn new(contract_name: impl Into<String>) -> Self {
        SymbolTable { contract_name: contract_name.into(), ..Default::default() }
    }

    pub fn declare_var(&mut self, name: &str) -> Result<(), String> {
        if self.vars.contains_key(name) {
            return Err(format!("variable '{name}' already declared"));
        }
        self.vars.insert(name.to_string(), Symbol { name: name.to_string(), kind: SymbolKind::Var });
        Ok(())
    }

    pub fn declare_const(&mut self, name: &str) -> Result<(), String> {
        if self.consts.contains_key(name) {
            return Err(format!("constant '{name}' already declared"));
        }
        self.consts.insert(name.to_string(), Symbol { name: name.to_string(), kind: SymbolKind::Const });
        Ok(())
    }

    pub fn declare_func(&mut self, name: &str, params: Vec<String>) -> Result<(), String> {
        if self.funcs.contains_key(name) {
            return Err(format!("function '{name}' already declared"));
        }
        self.funcs.insert(name.to_string(), FunctionSymbol { name: name.to_string(), params });
        Ok(())
    }

    pub fn declare_method(&mut self, owner: &str, name: &str, params: Vec<String>, return_type: &str) -> String {
        self.methods.register(MethodSymbol {
            owner: owner.to_string(),
            name: name.to_string(),
            params,
            return_type: return_type.to_string(),
        })
    }

    pub fn declare_event(&mut self, name: &str) -> Result<(), String> {
        if self.events.contains_key(name) {
            return Err(format!("event '{name}' already declared"));
        }
        self.events.insert(name.to_string(), Symbol { name: name.to_string(), kind: SymbolKind::Event });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.vars.get(name).or_else(|| self.consts.get(name)).or_else(|| self.events.get(name))
    }

    pub fn resolve_func(&self, name: &str) -> Option<&FunctionSymbol> {
        self.funcs.get(name)
    }

    pub fn resolve_method(&self, owner: &str, name: &str) -> Option<&str> {
        self.methods.resolve_id(owner, name)
    }

    /// Deterministic storage-key hint for a declared contract-level symbol,
    /// memoized so repeated lookups of the same symbol return the same hint.
    pub fn storage_key_hint(&mut self, symbol: &str) -> StorageKeyHint {
        self.storage_keys
            .entry(symbol.to_string())
            .or_insert_with(|| StorageKeyHint { contract: self.contract_name.clone(), symbol: symbol.to_string() })
            .clone()
    }

    pub fn all_symbols(&self) -> Vec<&Symbol> {
        self.vars.values().chain(self.consts.values()).chain(self.events.values()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_id_is_stable_and_16_hex_chars() {
        let m = MethodSymbol {
            owner: "Counter".to_string(),
            name: "increment".to_string(),
            params: vec!["int".to_string()],
            return_type: "int".to_string(),
        };
        let id = m.dispatch_id();
        assert_eq!(id.len(), 16);
        assert_eq!(id, m.dispatch_id());
    }

    #[test]
    fn storage_key_hint_is_deterministic_and_scoped_by_contract() {
        let a = StorageKeyHint { contract: "Counter".to_string(), symbol: "value".to_string() };
        let b = StorageKeyHint { contract: "Other".to_string(), symbol: "value".to_string() };
        assert_eq!(a.key32(), a.key32());
        assert_ne!(a.key32(), b.key32());
        assert!(a.hex().starts_with("0x"));
    }

    #[test]
    fn redeclaring_a_var_is_rejected() {
        let mut t = SymbolTable::new("Counter");
        t.declare_var("x").unwrap();
        assert!(t.declare_var("x").is_err());
    }

    #[test]
    fn method_dispatch_round_trips_by_owner_and_name() {
        let mut t = SymbolTable::new("Counter");
        let id = t.declare_method("Counter", "increment", vec!["int".to_string()], "int");
        assert_eq!(t.resolve_method("Counter", "increment"), Some(id.as_str()));
    }
}
