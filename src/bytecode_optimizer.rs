//! Post-codegen peephole optimizer over the flat instruction stream: drops
//! redundant algebraic-identity literals, then collapses jump chains.
//!
//! Ported from the reference generator's two-pass-then-renumber algorithm:
//! mark instructions for deletion rather than removing them mid-scan (since
//! later indices are still meaningful while matching `JMP`/`JMC`/`CAL`
//! targets against original positions), sweep once at the end, then
//! renumber and remap every jump target through an old→new index table.

use std::collections::HashMap;

use crate::instruction::{Instruction, Opcode, OprCode};

const MAX_JUMP_CHAIN: usize = 10_000;

pub fn optimize(instructions: &mut Vec<Instruction>) {
    fold_algebraic_identities(instructions);
    compress_jump_chains(instructions);

    // Capture the old(pre-sweep)->new(dense, post-sweep) index mapping
    // before anything is actually removed: positions in `instructions`
    // right now are exactly the addresses every JMP/JMC/CAL parameter was
    // emitted against.
    let mut old_new_map: HashMap<i64, i64> = HashMap::new();
    let mut next = 0i64;
    for (old_index, ins) in instructions.iter().enumerate() {
        if ins.opcode != Opcode::Delete {
            old_new_map.insert(old_index as i64, next);
            next += 1;
        }
    }
    // New index one past the last surviving instruction, for a target that
    // resolves off the end of the stream (falls through to nothing).
    let end_index = next;

    // A jump's target may itself have been deleted — either an
    // algebraic-identity pair `fold_algebraic_identities` removed (never a
    // jump itself, but a `JMP`/`JMC`/`CAL` emitted earlier can still land on
    // its first instruction), or an intermediate `JMP` `compress_jump_chains`
    // collapsed. Either way the surviving instruction that now occupies that
    // point in the program is whichever live instruction comes next, so
    // resolve forward past any run of `Delete`s before consulting the map.
    let resolved_targets: Vec<Option<i64>> = instructions
        .iter()
        .map(|ins| {
            if !ins.is_jump_like() {
                return None;
            }
            let mut idx = ins.parameter;
            while idx >= 0
                && (idx as usize) < instructions.len()
                && instructions[idx as usize].opcode == Opcode::Delete
            {
                idx += 1;
            }
            Some(old_new_map.get(&idx).copied().unwrap_or(end_index))
        })
        .collect();

    for (ins, resolved) in instructions.iter_mut().zip(resolved_targets) {
        if let Some(new_param) = resolved {
            ins.parameter = new_param;
        }
    }

    instructions.retain(|ins| ins.opcode != Opcode::Delete);
}

fn fold_algebraic_identities(instructions: &mut [Instruction]) {
    for i in 0..instructions.len() {
        let Instruction { opcode, parameter, .. } = instructions[i];
        if opcode != Opcode::Opr || i == 0 {
            continue;
        }
        let is_add_sub = parameter == OprCode::Add as i64 || parameter == OprCode::Sub as i64;
        let is_mul_div = parameter == OprCode::Mul as i64 || parameter == OprCode::Div as i64;

        let prev = &instructions[i - 1];
        if is_add_sub && prev.opcode == Opcode::Lit && prev.parameter == 0 {
            instructions[i].opcode = Opcode::Delete;
            instructions[i - 1].opcode = Opcode::Delete;
        } else if is_mul_div && prev.opcode == Opcode::Lit && prev.parameter == 1 {
            instructions[i].opcode = Opcode::Delete;
            instructions[i - 1].opcode = Opcode::Delete;
        }
    }
}

fn compress_jump_chains(instructions: &mut [Instruction]) {
    // Resolve every chain against a snapshot taken before any mutation, not
    // against `instructions` as it's mutated: once an earlier iteration
    // marks an intermediate `JMP` `Delete`, a later jump landing on that same
    // link must still see what it used to point to, rather than stopping
    // short because the opcode it now sees is `Delete`, not `Jmp`.
    let original: Vec<Instruction> = instructions.to_vec();

    for i in 0..instructions.len() {
        if !instructions[i].is_jump_like() {
            continue;
        }
        let mut target = instructions[i].parameter as usize;
        let mut hops = 0;
        while target < original.len()
            && original[target].opcode == Opcode::Jmp
            && hops < MAX_JUMP_CHAIN
        {
            instructions[target].opcode = Opcode::Delete;
            target = original[target].parameter as usize;
            hops += 1;
        }
        instructions[i].parameter = target as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction as I;

    fn lit(n: i64) -> I {
        I::new(Opcode::Lit, 0, n)
    }
    fn opr(code: OprCode) -> I {
        I::new(Opcode::Opr, 0, code as i64)
    }

    #[test]
    fn removes_add_zero_identity() {
        let mut ins = vec![lit(5), lit(0), opr(OprCode::Add)];
        optimize(&mut ins);
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].parameter, 5);
    }

    #[test]
    fn removes_mul_one_identity() {
        let mut ins = vec![lit(7), lit(1), opr(OprCode::Mul)];
        optimize(&mut ins);
        assert_eq!(ins.len(), 1);
    }

    #[test]
    fn compresses_jump_chain_to_tail() {
        let mut ins = vec![
            I::new(Opcode::Jmp, 0, 1), // 0: jumps to chain start
            I::new(Opcode::Jmp, 0, 2), // 1: chain link
            I::new(Opcode::Ret, 0, 0), // 2: tail
        ];
        optimize(&mut ins);
        // instruction 1 (the intermediate JMP) is dropped; instruction 0's
        // target is repointed directly to the RET, now at index 1.
        assert_eq!(ins.len(), 2);
        assert_eq!(ins[0].opcode, Opcode::Jmp);
        assert_eq!(ins[0].parameter, 1);
        assert_eq!(ins[1].opcode, Opcode::Ret);
    }

    #[test]
    fn no_jmp_targets_another_jmp_post_optimize() {
        let mut ins = vec![
            I::new(Opcode::Jmp, 0, 1),
            I::new(Opcode::Jmp, 0, 2),
            I::new(Opcode::Jmp, 0, 3),
            I::new(Opcode::Ret, 0, 0),
        ];
        optimize(&mut ins);
        for i in &ins {
            if i.is_jump_like() {
                let target = &ins[i.parameter as usize];
                assert_ne!(target.opcode, Opcode::Jmp);
            }
        }
    }

    #[test]
    fn two_jumps_sharing_a_collapsed_intermediate_both_resolve_to_the_tail() {
        let mut ins = vec![
            I::new(Opcode::Jmp, 0, 2), // 0: targets the shared link
            I::new(Opcode::Jmp, 0, 2), // 1: also targets the shared link
            I::new(Opcode::Jmp, 0, 3), // 2: shared intermediate, collapsed by #0's pass
            I::new(Opcode::Ret, 0, 0), // 3: tail
        ];
        optimize(&mut ins);
        assert_eq!(ins.len(), 3);
        // Both surviving jumps must land on the RET, not on the deleted link.
        for i in ins.iter().take(2) {
            assert_eq!(i.opcode, Opcode::Jmp);
            assert_eq!(ins[i.parameter as usize].opcode, Opcode::Ret);
        }
    }

    #[test]
    fn jump_onto_a_folded_identity_pair_resolves_past_it() {
        let mut ins = vec![
            I::new(Opcode::Jmp, 0, 2), // 0: targets the identity pair below
            lit(99),                   // 1: unrelated filler
            lit(0),                    // 2: start of a `+ 0` identity pair
            opr(OprCode::Add),         // 3: folded away together with #2
            I::new(Opcode::Ret, 0, 0), // 4: next live instruction after the fold
        ];
        optimize(&mut ins);
        assert_eq!(ins.len(), 3);
        assert_eq!(ins[0].opcode, Opcode::Jmp);
        assert_eq!(ins[ins[0].parameter as usize].opcode, Opcode::Ret);
    }
}
