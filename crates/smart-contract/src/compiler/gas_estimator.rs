//! Static upper-bound gas estimator over the instruction IR (spec §4.2,
//! §4.3 "Gas Table"). Mirrors `vm_py.compiler.gas_estimator`: walks the
//! program's control-flow graph, takes the max cost across branch
//! successors, and bounds loops by a fixed per-block visit cap so the
//! estimate is always finite even over a malformed or adversarial `Prog`.

use animica_vm_core::ir::{BinOpKind, CmpOpKind, Instr, Prog, UnOpKind};
use animica_vm_core::GasTable;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub loop_unroll: u32,
    pub max_states: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig { loop_unroll: animica_config::DEFAULT_LOOP_UNROLL, max_states: animica_config::DEFAULT_MAX_ESTIMATOR_STATES }
    }
}

#[derive(Debug, Clone)]
pub struct GasEstimate {
    pub total_upper_bound: u64,
    pub per_block_costs: BTreeMap<String, u64>,
    pub config: EstimatorConfig,
}

fn binop_cost_key(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "binop_add",
        BinOpKind::Sub => "binop_sub",
        BinOpKind::Mul => "binop_mul",
        BinOpKind::FloorDiv => "binop_floordiv",
        BinOpKind::Mod => "binop_mod",
        BinOpKind::And => "binop_and",
        BinOpKind::Or => "binop_or",
        BinOpKind::Xor => "binop_xor",
        BinOpKind::LShift => "binop_lshift",
        BinOpKind::RShift => "binop_rshift",
    }
}

fn unop_cost_key(op: UnOpKind) -> &'static str {
    match op {
        UnOpKind::Pos => "unary_pos",
        UnOpKind::Neg => "unary_neg",
        UnOpKind::Not => "unary_not",
        UnOpKind::Invert => "unary_invert",
    }
}

fn cmp_cost_key(op: CmpOpKind) -> &'static str {
    match op {
        CmpOpKind::Eq => "cmp_eq",
        CmpOpKind::Ne => "cmp_ne",
        CmpOpKind::Lt => "cmp_lt",
        CmpOpKind::Le => "cmp_le",
        CmpOpKind::Gt => "cmp_gt",
        CmpOpKind::Ge => "cmp_ge",
        CmpOpKind::In => "cmp_in",
        CmpOpKind::NotIn => "cmp_not_in",
        CmpOpKind::Is => "cmp_is",
        CmpOpKind::IsNot => "cmp_is_not",
    }
}

fn instr_cost(instr: &Instr, table: &GasTable) -> u64 {
    match instr {
        Instr::LoadConst(_) => table.cost("load_const"),
        Instr::LoadName(_) => table.cost("load_name"),
        Instr::StoreName(_) => table.cost("store_name"),
        Instr::AttrGet(_) => table.cost("attr_get"),
        Instr::SubscriptGet => table.cost("subscript_get"),
        Instr::BinOp(op) => table.cost(binop_cost_key(*op)),
        Instr::UnaryOp(op) => table.cost(unop_cost_key(*op)),
        Instr::Compare(op) => table.cost(cmp_cost_key(*op)),
        Instr::Iszero => table.cost("iszero"),
        Instr::BytesLen => table.cost("byteslen"),
        Instr::Cat => table.cost("cat"),
        Instr::SLoad { .. } => table.cost("sload"),
        Instr::SStore { .. } => table.cost("sstore"),
        Instr::Call { n_pos, kw_names, .. } => {
            table.call_base() + (*n_pos as u64) * table.call_arg() + (kw_names.len() as u64) * table.call_kwarg()
        }
        Instr::Pop => table.cost("pop"),
        Instr::Dup => table.cost("dup"),
        Instr::Return => table.cost("return"),
        Instr::Jump(_) => table.cost("jump"),
        Instr::JumpIfTrue(_) | Instr::JumpIfFalse(_) => table.cost("jump_if"),
        Instr::Nop => table.cost("nop"),
    }
}

fn block_cost(instrs: &[Instr], table: &GasTable) -> u64 {
    instrs.iter().map(|i| instr_cost(i, table)).sum()
}

/// Successor labels for a block: unconditional jump → target only;
/// conditional jump → target plus fallthrough (if present); a block
/// ending in `Return` has no successors; otherwise the explicit
/// fallthrough field, if any.
fn build_cfg(prog: &Prog) -> BTreeMap<String, BTreeSet<String>> {
    let mut succ: BTreeMap<String, BTreeSet<String>> = prog.blocks.keys().map(|l| (l.clone(), BTreeSet::new())).collect();
    for (label, block) in &prog.blocks {
        if matches!(block.instrs.last(), Some(Instr::Return)) {
            continue;
        }
        match block.instrs.last() {
            Some(Instr::Jump(target)) => {
                succ.get_mut(label).unwrap().insert(target.clone());
            }
            Some(Instr::JumpIfTrue(target)) | Some(Instr::JumpIfFalse(target)) => {
                let set = succ.get_mut(label).unwrap();
                set.insert(target.clone());
                if let Some(fallthrough) = &block.fallthrough {
                    set.insert(fallthrough.clone());
                }
            }
            _ => {
                if let Some(fallthrough) = &block.fallthrough {
                    succ.get_mut(label).unwrap().insert(fallthrough.clone());
                }
            }
        }
    }
    succ
}

/// Compute a conservative upper bound on gas usage for `prog`.
pub fn estimate_prog_gas(prog: &Prog, table: &GasTable, config: EstimatorConfig) -> GasEstimate {
    let per_block: BTreeMap<String, u64> = prog.blocks.iter().map(|(l, b)| (l.clone(), block_cost(&b.instrs, table))).collect();
    let succ = build_cfg(prog);
    let labels: Vec<String> = prog.blocks.keys().cloned().collect();
    let idx: BTreeMap<&String, usize> = labels.iter().enumerate().map(|(i, l)| (l, i)).collect();

    let mut cache: BTreeMap<(usize, Vec<u32>), u64> = BTreeMap::new();
    let mut visited_states: u64 = 0;
    let zero_visits = vec![0u32; labels.len()];

    fn capped_inc(visits: &[u32], i: usize, loop_unroll: u32) -> Vec<u32> {
        let mut v = visits.to_vec();
        v[i] = (v[i] + 1).min(loop_unroll);
        v
    }

    fn worst_from(
        label: &str,
        visits: Vec<u32>,
        per_block: &BTreeMap<String, u64>,
        succ: &BTreeMap<String, BTreeSet<String>>,
        idx: &BTreeMap<&String, usize>,
        cache: &mut BTreeMap<(usize, Vec<u32>), u64>,
        visited_states: &mut u64,
        config: &EstimatorConfig,
    ) -> u64 {
        let li = *idx.get(&label.to_string()).expect("label present in cfg");
        let key = (li, visits.clone());
        if let Some(cost) = cache.get(&key) {
            return *cost;
        }
        *visited_states += 1;
        if *visited_states > config.max_states {
            let conservative = per_block.values().copied().max().unwrap_or(0) * config.loop_unroll as u64 * per_block.len() as u64;
            cache.insert(key, conservative);
            return conservative;
        }

        if visits[li] >= config.loop_unroll {
            let cost = per_block[label];
            cache.insert(key, cost);
            return cost;
        }

        let local = per_block[label];
        let vnext = capped_inc(&visits, li, config.loop_unroll);
        let empty = BTreeSet::new();
        let successors = succ.get(label).unwrap_or(&empty);
        if successors.is_empty() {
            cache.insert(key, local);
            return local;
        }

        let mut worst_succ = 0u64;
        for s in successors {
            worst_succ = worst_succ.max(worst_from(s, vnext.clone(), per_block, succ, idx, cache, visited_states, config));
        }
        let total = local + worst_succ;
        cache.insert(key, total);
        total
    }

    let total = worst_from(&prog.entry_label, zero_visits, &per_block, &succ, &idx, &mut cache, &mut visited_states, &config);
    GasEstimate { total_upper_bound: total, per_block_costs: per_block, config }
}

pub fn format_estimate(estimate: &GasEstimate) -> String {
    let mut lines = vec![
        format!("Gas upper bound: {}", estimate.total_upper_bound),
        format!("Config: loop_unroll={} max_states={}", estimate.config.loop_unroll, estimate.config.max_states),
    ];
    if !estimate.per_block_costs.is_empty() {
        let width = estimate.per_block_costs.keys().map(|l| l.len()).max().unwrap_or(0);
        lines.push("Per-block instruction costs:".to_string());
        for (label, cost) in &estimate.per_block_costs {
            lines.push(format!("  {:>width$} : {cost}", label, width = width));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use animica_vm_core::ir::Block;
    use animica_vm_core::Value;

    fn diamond_prog() -> Prog {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "entry".to_string(),
            Block { label: "entry".to_string(), instrs: vec![Instr::JumpIfTrue("left".to_string())], fallthrough: Some("right".to_string()) },
        );
        blocks.insert(
            "left".to_string(),
            Block { label: "left".to_string(), instrs: vec![Instr::LoadConst(Value::int(1u64)), Instr::Return], fallthrough: None },
        );
        blocks.insert(
            "right".to_string(),
            Block { label: "right".to_string(), instrs: vec![Instr::LoadConst(Value::int(2u64)), Instr::LoadConst(Value::int(3u64)), Instr::Return], fallthrough: None },
        );
        Prog { entry_label: "entry".to_string(), blocks }
    }

    #[test]
    fn estimate_takes_the_more_expensive_branch() {
        let table = GasTable::default();
        let est = estimate_prog_gas(&diamond_prog(), &table, EstimatorConfig::default());
        let right_cost = est.per_block_costs["right"];
        let entry_cost = est.per_block_costs["entry"];
        assert_eq!(est.total_upper_bound, entry_cost + right_cost);
    }

    #[test]
    fn loop_is_bounded_by_loop_unroll() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "loop".to_string(),
            Block { label: "loop".to_string(), instrs: vec![Instr::LoadConst(Value::int(1u64)), Instr::Pop, Instr::JumpIfTrue("loop".to_string())], fallthrough: Some("exit".to_string()) },
        );
        blocks.insert("exit".to_string(), Block { label: "exit".to_string(), instrs: vec![Instr::Return], fallthrough: None });
        let prog = Prog { entry_label: "loop".to_string(), blocks };
        let table = GasTable::default();
        let config = EstimatorConfig { loop_unroll: 3, max_states: animica_config::DEFAULT_MAX_ESTIMATOR_STATES };
        let est = estimate_prog_gas(&prog, &table, config);
        assert!(est.total_upper_bound > 0);
        assert!(est.total_upper_bound < 1_000_000);
    }
}
