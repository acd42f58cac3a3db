//! Canonical IR ↔ bytes encoding (spec §4.2, §6). Mirrors
//! `vm_py.compiler.encode`: a 6-byte header (`ACIR` magic, version byte,
//! format byte) in front of a tree of tagged lists, with collections that
//! have identity — blocks, functions — serialized as lists sorted by key so
//! the encoding is deterministic across platforms.
//!
//! Only the CBOR format is implemented; `FMT_MSGPACK` is reserved in the
//! header but has no encoder here (see [`DESIGN.md`] for why).

use animica_vm_core::ir::{tags, AssignTarget, BinOpKind, Block, BoolOpKind, CallTarget, CmpOpKind, Expr, Function, Instr, Module, Prog, Stmt, UnOpKind};
use animica_vm_core::{CodecError, Value};
use ciborium::value::Value as Cbor;
use num_bigint::BigUint;
use std::collections::BTreeMap;

pub const MAGIC: &[u8; 4] = b"ACIR";
pub const VERSION: u8 = 1;
pub const FMT_CBOR: u8 = 0x01;
pub const FMT_MSGPACK: u8 = 0x02;

const SCHEMA_PROG: &str = "IR1";

fn wrap_with_header(payload: Vec<u8>, format: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(format);
    out.extend(payload);
    out
}

fn unwrap_header(blob: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    if blob.len() < 6 || &blob[0..4] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = blob[4];
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    let format = blob[5];
    Ok((format, &blob[6..]))
}

fn dumps_cbor(value: &Cbor) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| CodecError::MalformedPayload { reason: e.to_string() })?;
    Ok(out)
}

fn loads_cbor(data: &[u8]) -> Result<Cbor, CodecError> {
    ciborium::de::from_reader(data).map_err(|e| CodecError::MalformedPayload { reason: e.to_string() })
}

// ---------------------------------------------------------------------------
// Value <-> Cbor
// ---------------------------------------------------------------------------

const VAL_INT: u64 = 0;
const VAL_BYTES: u64 = 1;
const VAL_BOOL: u64 = 2;
const VAL_NULL: u64 = 3;

fn enc_value(v: &Value) -> Cbor {
    match v {
        Value::Int(i) => Cbor::Array(vec![tag(VAL_INT), Cbor::Bytes(i.to_bytes_be())]),
        Value::Bytes(b) => Cbor::Array(vec![tag(VAL_BYTES), Cbor::Bytes(b.clone())]),
        Value::Bool(b) => Cbor::Array(vec![tag(VAL_BOOL), Cbor::Bool(*b)]),
        Value::Null => Cbor::Array(vec![tag(VAL_NULL)]),
    }
}

fn dec_value(n: &Cbor) -> Result<Value, CodecError> {
    let items = as_array(n)?;
    let t = tag_of(items.first())?;
    match t {
        VAL_INT => Ok(Value::int(BigUint::from_bytes_be(&as_bytes(items.get(1))?))),
        VAL_BYTES => Ok(Value::bytes(as_bytes(items.get(1))?)),
        VAL_BOOL => Ok(Value::Bool(as_bool(items.get(1))?)),
        VAL_NULL => Ok(Value::Null),
        other => Err(CodecError::MalformedPayload { reason: format!("unknown value tag {other}") }),
    }
}

// ---------------------------------------------------------------------------
// Cbor helpers
// ---------------------------------------------------------------------------

fn tag(t: u64) -> Cbor {
    Cbor::Integer(t.into())
}

fn as_array(v: &Cbor) -> Result<&Vec<Cbor>, CodecError> {
    v.as_array().ok_or_else(|| CodecError::MalformedPayload { reason: "expected array".to_string() })
}

fn tag_of(v: Option<&Cbor>) -> Result<u64, CodecError> {
    let v = v.ok_or_else(|| CodecError::MalformedPayload { reason: "missing tag".to_string() })?;
    v.as_integer()
        .and_then(|i| i128::try_from(i).ok())
        .map(|i| i as u64)
        .ok_or_else(|| CodecError::MalformedPayload { reason: "tag is not an integer".to_string() })
}

fn as_bytes(v: Option<&Cbor>) -> Result<Vec<u8>, CodecError> {
    v.and_then(|v| v.as_bytes()).cloned().ok_or_else(|| CodecError::MalformedPayload { reason: "expected bytes".to_string() })
}

fn as_text(v: Option<&Cbor>) -> Result<String, CodecError> {
    v.and_then(|v| v.as_text()).map(|s| s.to_string()).ok_or_else(|| CodecError::MalformedPayload { reason: "expected text".to_string() })
}

fn as_bool(v: Option<&Cbor>) -> Result<bool, CodecError> {
    v.and_then(|v| v.as_bool()).ok_or_else(|| CodecError::MalformedPayload { reason: "expected bool".to_string() })
}

fn as_u32(v: Option<&Cbor>) -> Result<u32, CodecError> {
    v.and_then(|v| v.as_integer()).and_then(|i| i128::try_from(i).ok()).map(|i| i as u32).ok_or_else(|| CodecError::MalformedPayload { reason: "expected integer".to_string() })
}

fn text(s: impl Into<String>) -> Cbor {
    Cbor::Text(s.into())
}

// ---------------------------------------------------------------------------
// Instruction IR: Prog/Block/Instr
// ---------------------------------------------------------------------------

fn enc_call_target(target: &CallTarget) -> Cbor {
    match target {
        CallTarget::UserFunc(name) => Cbor::Array(vec![tag(0), text(name.clone())]),
        CallTarget::Stdlib { module, func } => Cbor::Array(vec![tag(1), text(module.clone()), text(func.clone())]),
    }
}

fn dec_call_target(n: &Cbor) -> Result<CallTarget, CodecError> {
    let items = as_array(n)?;
    match tag_of(items.first())? {
        0 => Ok(CallTarget::UserFunc(as_text(items.get(1))?)),
        1 => Ok(CallTarget::Stdlib { module: as_text(items.get(1))?, func: as_text(items.get(2))? }),
        other => Err(CodecError::MalformedPayload { reason: format!("unknown call-target tag {other}") }),
    }
}

fn enc_instr(instr: &Instr) -> Cbor {
    match instr {
        Instr::LoadConst(v) => Cbor::Array(vec![tag(tags::INSTR_LOAD_CONST), enc_value(v)]),
        Instr::LoadName(n) => Cbor::Array(vec![tag(tags::INSTR_LOAD_NAME), text(n.clone())]),
        Instr::StoreName(n) => Cbor::Array(vec![tag(tags::INSTR_STORE_NAME), text(n.clone())]),
        Instr::AttrGet(a) => Cbor::Array(vec![tag(tags::INSTR_ATTR_GET), text(a.clone())]),
        Instr::SubscriptGet => Cbor::Array(vec![tag(tags::INSTR_SUBSCRIPT_GET)]),
        Instr::BinOp(op) => Cbor::Array(vec![tag(tags::INSTR_BINOP), text(op.as_str())]),
        Instr::UnaryOp(op) => Cbor::Array(vec![tag(tags::INSTR_UNARYOP), text(op.as_str())]),
        Instr::Compare(op) => Cbor::Array(vec![tag(tags::INSTR_COMPARE), text(op.as_str())]),
        Instr::Iszero => Cbor::Array(vec![tag(tags::INSTR_ISZERO)]),
        Instr::BytesLen => Cbor::Array(vec![tag(tags::INSTR_BYTESLEN)]),
        Instr::Cat => Cbor::Array(vec![tag(tags::INSTR_CAT)]),
        Instr::SLoad { immediate_key } => Cbor::Array(vec![tag(tags::INSTR_SLOAD), enc_optional_bytes(immediate_key)]),
        Instr::SStore { immediate_key } => Cbor::Array(vec![tag(tags::INSTR_SSTORE), enc_optional_bytes(immediate_key)]),
        Instr::Call { target, n_pos, kw_names } => Cbor::Array(vec![
            tag(tags::INSTR_CALL),
            enc_call_target(target),
            Cbor::Integer((*n_pos as u64).into()),
            Cbor::Array(kw_names.iter().map(|n| text(n.clone())).collect()),
        ]),
        Instr::Pop => Cbor::Array(vec![tag(tags::INSTR_POP)]),
        Instr::Dup => Cbor::Array(vec![tag(tags::INSTR_DUP)]),
        Instr::Return => Cbor::Array(vec![tag(tags::INSTR_RETURN)]),
        Instr::Jump(label) => Cbor::Array(vec![tag(tags::INSTR_JUMP), text(label.clone())]),
        Instr::JumpIfTrue(label) => Cbor::Array(vec![tag(tags::INSTR_JUMP_IF_TRUE), text(label.clone())]),
        Instr::JumpIfFalse(label) => Cbor::Array(vec![tag(tags::INSTR_JUMP_IF_FALSE), text(label.clone())]),
        Instr::Nop => Cbor::Array(vec![tag(tags::INSTR_NOP)]),
    }
}

fn enc_optional_bytes(v: &Option<Vec<u8>>) -> Cbor {
    match v {
        Some(b) => Cbor::Bytes(b.clone()),
        None => Cbor::Null,
    }
}

fn dec_optional_bytes(v: Option<&Cbor>) -> Result<Option<Vec<u8>>, CodecError> {
    match v {
        None | Some(Cbor::Null) => Ok(None),
        Some(other) => Ok(Some(other.as_bytes().cloned().ok_or_else(|| CodecError::MalformedPayload { reason: "expected bytes or null".to_string() })?)),
    }
}

fn dec_instr(n: &Cbor) -> Result<Instr, CodecError> {
    let items = as_array(n)?;
    let t = tag_of(items.first())?;
    Ok(match t {
        x if x == tags::INSTR_LOAD_CONST => Instr::LoadConst(dec_value(items.get(1).ok_or_else(missing)?)?),
        x if x == tags::INSTR_LOAD_NAME => Instr::LoadName(as_text(items.get(1))?),
        x if x == tags::INSTR_STORE_NAME => Instr::StoreName(as_text(items.get(1))?),
        x if x == tags::INSTR_ATTR_GET => Instr::AttrGet(as_text(items.get(1))?),
        x if x == tags::INSTR_SUBSCRIPT_GET => Instr::SubscriptGet,
        x if x == tags::INSTR_BINOP => Instr::BinOp(decode_binop(&as_text(items.get(1))?)?),
        x if x == tags::INSTR_UNARYOP => Instr::UnaryOp(decode_unop(&as_text(items.get(1))?)?),
        x if x == tags::INSTR_COMPARE => Instr::Compare(decode_cmpop(&as_text(items.get(1))?)?),
        x if x == tags::INSTR_ISZERO => Instr::Iszero,
        x if x == tags::INSTR_BYTESLEN => Instr::BytesLen,
        x if x == tags::INSTR_CAT => Instr::Cat,
        x if x == tags::INSTR_SLOAD => Instr::SLoad { immediate_key: dec_optional_bytes(items.get(1))? },
        x if x == tags::INSTR_SSTORE => Instr::SStore { immediate_key: dec_optional_bytes(items.get(1))? },
        x if x == tags::INSTR_CALL => {
            let target = dec_call_target(items.get(1).ok_or_else(missing)?)?;
            let n_pos = as_u32(items.get(2))?;
            let kw_names = as_array(items.get(3).ok_or_else(missing)?)?.iter().map(|v| v.as_text().map(|s| s.to_string())).collect::<Option<Vec<_>>>().ok_or_else(|| CodecError::MalformedPayload { reason: "kw_names must be text".to_string() })?;
            Instr::Call { target, n_pos, kw_names }
        }
        x if x == tags::INSTR_POP => Instr::Pop,
        x if x == tags::INSTR_DUP => Instr::Dup,
        x if x == tags::INSTR_RETURN => Instr::Return,
        x if x == tags::INSTR_JUMP => Instr::Jump(as_text(items.get(1))?),
        x if x == tags::INSTR_JUMP_IF_TRUE => Instr::JumpIfTrue(as_text(items.get(1))?),
        x if x == tags::INSTR_JUMP_IF_FALSE => Instr::JumpIfFalse(as_text(items.get(1))?),
        x if x == tags::INSTR_NOP => Instr::Nop,
        other => return Err(CodecError::MalformedPayload { reason: format!("unknown instruction tag {other}") }),
    })
}

fn missing() -> CodecError {
    CodecError::MalformedPayload { reason: "missing field".to_string() }
}

fn decode_binop(s: &str) -> Result<BinOpKind, CodecError> {
    BinOpKind::from_str(s).ok_or_else(|| CodecError::MalformedPayload { reason: format!("unknown binop '{s}'") })
}
fn decode_unop(s: &str) -> Result<UnOpKind, CodecError> {
    UnOpKind::from_str(s).ok_or_else(|| CodecError::MalformedPayload { reason: format!("unknown unop '{s}'") })
}
fn decode_cmpop(s: &str) -> Result<CmpOpKind, CodecError> {
    CmpOpKind::from_str(s).ok_or_else(|| CodecError::MalformedPayload { reason: format!("unknown cmpop '{s}'") })
}
fn decode_boolop(s: &str) -> Result<BoolOpKind, CodecError> {
    BoolOpKind::from_str(s).ok_or_else(|| CodecError::MalformedPayload { reason: format!("unknown boolop '{s}'") })
}

fn enc_block(block: &Block) -> Cbor {
    Cbor::Array(vec![
        text(block.label.clone()),
        Cbor::Array(block.instrs.iter().map(enc_instr).collect()),
        match &block.fallthrough {
            Some(label) => text(label.clone()),
            None => Cbor::Null,
        },
    ])
}

fn dec_block(n: &Cbor) -> Result<Block, CodecError> {
    let items = as_array(n)?;
    if items.len() != 3 {
        return Err(CodecError::MalformedPayload { reason: "block needs 3 fields".to_string() });
    }
    let label = as_text(items.first())?;
    let instrs = as_array(&items[1])?.iter().map(dec_instr).collect::<Result<Vec<_>, _>>()?;
    let fallthrough = match &items[2] {
        Cbor::Null => None,
        other => Some(other.as_text().map(|s| s.to_string()).ok_or_else(|| CodecError::MalformedPayload { reason: "fallthrough must be text or null".to_string() })?),
    };
    Ok(Block { label, instrs, fallthrough })
}

/// Encode a `Prog` with the `ACIR` header, CBOR-only. Blocks are emitted
/// sorted by label so the byte stream is deterministic.
pub fn encode_prog(prog: &Prog) -> Result<Vec<u8>, CodecError> {
    let blocks_sorted: Vec<&Block> = prog.blocks.values().collect();
    let payload = Cbor::Array(vec![
        text(SCHEMA_PROG),
        text(prog.entry_label.clone()),
        Cbor::Array(blocks_sorted.into_iter().map(enc_block).collect()),
    ]);
    let bytes = dumps_cbor(&payload)?;
    Ok(wrap_with_header(bytes, FMT_CBOR))
}

pub fn decode_prog(blob: &[u8]) -> Result<Prog, CodecError> {
    let (format, payload) = unwrap_header(blob)?;
    if format != FMT_CBOR {
        return Err(CodecError::UnsupportedFormat { format });
    }
    let data = loads_cbor(payload)?;
    let items = as_array(&data)?;
    if items.len() != 3 || items[0].as_text() != Some(SCHEMA_PROG) {
        return Err(CodecError::MalformedPayload { reason: "invalid Prog payload".to_string() });
    }
    let entry_label = as_text(items.get(1))?;
    let mut blocks = BTreeMap::new();
    for item in as_array(items.get(2).ok_or_else(missing)?)? {
        let block = dec_block(item)?;
        blocks.insert(block.label.clone(), block);
    }
    Ok(Prog { entry_label, blocks })
}

// ---------------------------------------------------------------------------
// Structured IR: Module/Function/Stmt/Expr
// ---------------------------------------------------------------------------

fn enc_expr(e: &Expr) -> Cbor {
    match e {
        Expr::Const(v) => Cbor::Array(vec![tag(tags::EXPR_CONST), enc_value(v)]),
        Expr::Name(n) => Cbor::Array(vec![tag(tags::EXPR_NAME), text(n.clone())]),
        Expr::BinOp { op, left, right } => Cbor::Array(vec![tag(tags::EXPR_BINOP), text(op.as_str()), enc_expr(left), enc_expr(right)]),
        Expr::BoolOp { op, values } => Cbor::Array(vec![tag(tags::EXPR_BOOLOP), text(op.as_str()), Cbor::Array(values.iter().map(enc_expr).collect())]),
        Expr::UnaryOp { op, operand } => Cbor::Array(vec![tag(tags::EXPR_UNARYOP), text(op.as_str()), enc_expr(operand)]),
        Expr::Compare { op, left, right } => Cbor::Array(vec![tag(tags::EXPR_COMPARE), text(op.as_str()), enc_expr(left), enc_expr(right)]),
        Expr::Attribute { value, attr } => Cbor::Array(vec![tag(tags::EXPR_ATTRIBUTE), enc_expr(value), text(attr.clone())]),
        Expr::Subscript { value, index } => Cbor::Array(vec![tag(tags::EXPR_SUBSCRIPT), enc_expr(value), enc_expr(index)]),
        Expr::Call { func, args, kwargs } => Cbor::Array(vec![
            tag(tags::EXPR_CALL),
            enc_expr(func),
            Cbor::Array(args.iter().map(enc_expr).collect()),
            Cbor::Array(kwargs.iter().map(|(k, v)| Cbor::Array(vec![text(k.clone()), enc_expr(v)])).collect()),
        ]),
    }
}

fn dec_expr(n: &Cbor) -> Result<Expr, CodecError> {
    let items = as_array(n)?;
    let t = tag_of(items.first())?;
    Ok(match t {
        x if x == tags::EXPR_CONST => Expr::Const(dec_value(items.get(1).ok_or_else(missing)?)?),
        x if x == tags::EXPR_NAME => Expr::Name(as_text(items.get(1))?),
        x if x == tags::EXPR_BINOP => Expr::BinOp { op: decode_binop(&as_text(items.get(1))?)?, left: Box::new(dec_expr(items.get(2).ok_or_else(missing)?)?), right: Box::new(dec_expr(items.get(3).ok_or_else(missing)?)?) },
        x if x == tags::EXPR_BOOLOP => Expr::BoolOp { op: decode_boolop(&as_text(items.get(1))?)?, values: as_array(items.get(2).ok_or_else(missing)?)?.iter().map(dec_expr).collect::<Result<_, _>>()? },
        x if x == tags::EXPR_UNARYOP => Expr::UnaryOp { op: decode_unop(&as_text(items.get(1))?)?, operand: Box::new(dec_expr(items.get(2).ok_or_else(missing)?)?) },
        x if x == tags::EXPR_COMPARE => Expr::Compare { op: decode_cmpop(&as_text(items.get(1))?)?, left: Box::new(dec_expr(items.get(2).ok_or_else(missing)?)?), right: Box::new(dec_expr(items.get(3).ok_or_else(missing)?)?) },
        x if x == tags::EXPR_ATTRIBUTE => Expr::Attribute { value: Box::new(dec_expr(items.get(1).ok_or_else(missing)?)?), attr: as_text(items.get(2))? },
        x if x == tags::EXPR_SUBSCRIPT => Expr::Subscript { value: Box::new(dec_expr(items.get(1).ok_or_else(missing)?)?), index: Box::new(dec_expr(items.get(2).ok_or_else(missing)?)?) },
        x if x == tags::EXPR_CALL => {
            let func = Box::new(dec_expr(items.get(1).ok_or_else(missing)?)?);
            let args = as_array(items.get(2).ok_or_else(missing)?)?.iter().map(dec_expr).collect::<Result<_, _>>()?;
            let kwargs = as_array(items.get(3).ok_or_else(missing)?)?
                .iter()
                .map(|kv| {
                    let pair = as_array(kv)?;
                    Ok((as_text(pair.first())?, dec_expr(pair.get(1).ok_or_else(missing)?)?))
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            Expr::Call { func, args, kwargs }
        }
        other => return Err(CodecError::MalformedPayload { reason: format!("unknown expr tag {other}") }),
    })
}

fn enc_assign_target(target: &AssignTarget) -> Cbor {
    match target {
        AssignTarget::Name(n) => Cbor::Array(vec![tag(0), text(n.clone())]),
        AssignTarget::Tuple(names) => Cbor::Array(vec![tag(1), Cbor::Array(names.iter().map(|n| text(n.clone())).collect())]),
    }
}

fn dec_assign_target(n: &Cbor) -> Result<AssignTarget, CodecError> {
    let items = as_array(n)?;
    match tag_of(items.first())? {
        0 => Ok(AssignTarget::Name(as_text(items.get(1))?)),
        1 => Ok(AssignTarget::Tuple(as_array(items.get(1).ok_or_else(missing)?)?.iter().map(|v| v.as_text().map(|s| s.to_string())).collect::<Option<Vec<_>>>().ok_or_else(|| CodecError::MalformedPayload { reason: "tuple target names must be text".to_string() })?)),
        other => Err(CodecError::MalformedPayload { reason: format!("unknown assign-target tag {other}") }),
    }
}

fn enc_stmt(s: &Stmt) -> Cbor {
    match s {
        Stmt::Assign { targets, value } => Cbor::Array(vec![tag(tags::STMT_ASSIGN), Cbor::Array(targets.iter().map(enc_assign_target).collect()), enc_expr(value)]),
        Stmt::ExprStmt(e) => Cbor::Array(vec![tag(tags::STMT_EXPRSTMT), enc_expr(e)]),
        Stmt::Return(v) => Cbor::Array(vec![tag(tags::STMT_RETURN), match v { Some(e) => enc_expr(e), None => Cbor::Null }]),
        Stmt::If { cond, then, orelse } => Cbor::Array(vec![tag(tags::STMT_IF), enc_expr(cond), Cbor::Array(then.iter().map(enc_stmt).collect()), Cbor::Array(orelse.iter().map(enc_stmt).collect())]),
        Stmt::While { cond, body } => Cbor::Array(vec![tag(tags::STMT_WHILE), enc_expr(cond), Cbor::Array(body.iter().map(enc_stmt).collect())]),
    }
}

fn dec_stmt(n: &Cbor) -> Result<Stmt, CodecError> {
    let items = as_array(n)?;
    let t = tag_of(items.first())?;
    Ok(match t {
        x if x == tags::STMT_ASSIGN => Stmt::Assign {
            targets: as_array(items.get(1).ok_or_else(missing)?)?.iter().map(dec_assign_target).collect::<Result<_, _>>()?,
            value: dec_expr(items.get(2).ok_or_else(missing)?)?,
        },
        x if x == tags::STMT_EXPRSTMT => Stmt::ExprStmt(dec_expr(items.get(1).ok_or_else(missing)?)?),
        x if x == tags::STMT_RETURN => Stmt::Return(match items.get(1) { Some(Cbor::Null) | None => None, Some(e) => Some(dec_expr(e)?) }),
        x if x == tags::STMT_IF => Stmt::If {
            cond: dec_expr(items.get(1).ok_or_else(missing)?)?,
            then: as_array(items.get(2).ok_or_else(missing)?)?.iter().map(dec_stmt).collect::<Result<_, _>>()?,
            orelse: as_array(items.get(3).ok_or_else(missing)?)?.iter().map(dec_stmt).collect::<Result<_, _>>()?,
        },
        x if x == tags::STMT_WHILE => Stmt::While {
            cond: dec_expr(items.get(1).ok_or_else(missing)?)?,
            body: as_array(items.get(2).ok_or_else(missing)?)?.iter().map(dec_stmt).collect::<Result<_, _>>()?,
        },
        other => return Err(CodecError::MalformedPayload { reason: format!("unknown stmt tag {other}") }),
    })
}

fn enc_function(f: &Function) -> Cbor {
    Cbor::Array(vec![
        tag(tags::FUNCTION),
        text(f.name.clone()),
        Cbor::Array(f.params.iter().map(|p| text(p.clone())).collect()),
        Cbor::Array(f.body.iter().map(enc_stmt).collect()),
    ])
}

fn dec_function(n: &Cbor) -> Result<Function, CodecError> {
    let items = as_array(n)?;
    if tag_of(items.first())? != tags::FUNCTION {
        return Err(CodecError::MalformedPayload { reason: "function tag mismatch".to_string() });
    }
    Ok(Function {
        name: as_text(items.get(1))?,
        params: as_array(items.get(2).ok_or_else(missing)?)?.iter().map(|v| v.as_text().map(|s| s.to_string())).collect::<Option<Vec<_>>>().ok_or_else(|| CodecError::MalformedPayload { reason: "params must be text".to_string() })?,
        body: as_array(items.get(3).ok_or_else(missing)?)?.iter().map(dec_stmt).collect::<Result<_, _>>()?,
    })
}

/// Encode a structured-IR `Module` with the `ACIR` header. Functions are
/// emitted sorted by name — `Module::functions` is already a `BTreeMap`.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, CodecError> {
    let payload = Cbor::Array(vec![
        tag(tags::MODULE),
        text(module.filename.clone()),
        Cbor::Array(module.functions.values().map(|f| Cbor::Array(vec![text(f.name.clone()), enc_function(f)])).collect()),
    ]);
    let bytes = dumps_cbor(&payload)?;
    Ok(wrap_with_header(bytes, FMT_CBOR))
}

pub fn decode_module(blob: &[u8]) -> Result<Module, CodecError> {
    let (format, payload) = unwrap_header(blob)?;
    if format != FMT_CBOR {
        return Err(CodecError::UnsupportedFormat { format });
    }
    let data = loads_cbor(payload)?;
    let items = as_array(&data)?;
    if items.len() != 3 || tag_of(items.first())? != tags::MODULE {
        return Err(CodecError::MalformedPayload { reason: "invalid Module payload".to_string() });
    }
    let filename = as_text(items.get(1))?;
    let mut functions = BTreeMap::new();
    for entry in as_array(items.get(2).ok_or_else(missing)?)? {
        let pair = as_array(entry)?;
        let name = as_text(pair.first())?;
        let function = dec_function(pair.get(1).ok_or_else(missing)?)?;
        functions.insert(name, function);
    }
    Ok(Module { filename, functions })
}

/// SHA3-256 of the canonical encoded `Prog` bytes, `0x`-prefixed lowercase
/// hex (spec §6's `code_hash`).
pub fn code_hash(prog: &Prog) -> Result<String, CodecError> {
    let bytes = encode_prog(prog)?;
    let digest = animica_cryptography::sha3_256(&bytes);
    Ok(format!("0x{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use animica_vm_core::ir::CallTarget;

    fn sample_prog() -> Prog {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block {
                label: "entry".to_string(),
                instrs: vec![
                    Instr::LoadConst(Value::int(7u64)),
                    Instr::LoadConst(Value::int(35u64)),
                    Instr::BinOp(BinOpKind::Add),
                    Instr::Return,
                ],
                fallthrough: None,
            },
        );
        Prog { entry_label: "entry".to_string(), blocks }
    }

    #[test]
    fn prog_round_trips_through_cbor() {
        let prog = sample_prog();
        let bytes = encode_prog(&prog).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        assert_eq!(bytes[4], VERSION);
        assert_eq!(bytes[5], FMT_CBOR);
        let decoded = decode_prog(&bytes).unwrap();
        assert_eq!(decoded, prog);
    }

    #[test]
    fn code_hash_is_0x_prefixed_and_64_hex_chars() {
        let prog = sample_prog();
        let h = code_hash(&prog).unwrap();
        assert!(h.starts_with("0x"));
        assert_eq!(h.len(), 2 + 64);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = decode_prog(b"xxxxxx").unwrap_err();
        assert!(matches!(err, CodecError::BadMagic));
    }

    #[test]
    fn call_instr_round_trips_with_stdlib_target() {
        let instr = Instr::Call { target: CallTarget::Stdlib { module: "storage".to_string(), func: "get".to_string() }, n_pos: 1, kw_names: vec![] };
        let encoded = enc_instr(&instr);
        let decoded = dec_instr(&encoded).unwrap();
        assert_eq!(decoded, instr);
    }
}
