//! Bytecode instruction stream, wire format, and `OPR`/`OPF` operator codes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Lit,
    Opr,
    Opf,
    Itr,
    Rti,
    Lod,
    Sto,
    Lda,
    Sta,
    Pld,
    Pst,
    Int,
    Jmp,
    Jmc,
    Cal,
    Ret,
    New,
    Del,
    Rea,
    Wri,
    /// Tombstone used by the peephole optimizer; never written out.
    Delete,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lit => "LIT",
            Opcode::Opr => "OPR",
            Opcode::Opf => "OPF",
            Opcode::Itr => "ITR",
            Opcode::Rti => "RTI",
            Opcode::Lod => "LOD",
            Opcode::Sto => "STO",
            Opcode::Lda => "LDA",
            Opcode::Sta => "STA",
            Opcode::Pld => "PLD",
            Opcode::Pst => "PST",
            Opcode::Int => "INT",
            Opcode::Jmp => "JMP",
            Opcode::Jmc => "JMC",
            Opcode::Cal => "CAL",
            Opcode::Ret => "RET",
            Opcode::New => "NEW",
            Opcode::Del => "DEL",
            Opcode::Rea => "REA",
            Opcode::Wri => "WRI",
            Opcode::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// `OPR`/`OPF` operator parameter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OprCode {
    Neg = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Mod = 6,
    Odd = 7,
    Eq = 8,
    Neq = 9,
    Lt = 10,
    Geq = 11,
    Gt = 12,
    Leq = 13,
}

impl From<OprCode> for i64 {
    fn from(c: OprCode) -> Self {
        c as i64
    }
}

/// One emitted instruction: `<index> <MNEMONIC> <level> <parameter>`.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    pub level: i64,
    pub parameter: i64,
}

impl Instruction {
    pub fn new(opcode: Opcode, level: i64, parameter: i64) -> Self {
        Instruction {
            opcode,
            level,
            parameter,
        }
    }

    pub fn is_jump_like(&self) -> bool {
        matches!(self.opcode, Opcode::Jmp | Opcode::Jmc | Opcode::Cal)
    }
}

/// Render a finished instruction stream in the wire format of §6: one line
/// per instruction, dense zero-based indices, fields separated by spaces.
pub fn render(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for (i, ins) in instructions.iter().enumerate() {
        out.push_str(&format!(
            "{} {} {} {}\n",
            i,
            ins.opcode.mnemonic(),
            ins.level,
            ins.parameter
        ));
    }
    out
}
