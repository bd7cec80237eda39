//! Compiler library for a small imperative language targeting a PL/0-style
//! stack-machine bytecode.
//!
//! The pipeline is the usual five stages: lex+parse, analyze, optimize the
//! AST, generate code, optimize the bytecode. Each stage's error type is
//! folded into [`CompileError`] so callers only match on one enum.

pub mod analyzer;
pub mod ast;
pub mod ast_optimizer;
pub mod builtins;
pub mod bytecode_optimizer;
pub mod codegen;
pub mod error;
pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod symtab;
pub mod types;

pub use error::CompileError;
pub use instruction::Instruction;

use parser::Parser;

/// Optimization level, selected by the `-o`/`--opt` CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Emit exactly what codegen produces.
    Off,
    /// Run the AST-level and bytecode-level peephole passes.
    On,
}

impl From<u8> for OptLevel {
    fn from(n: u8) -> Self {
        if n == 0 {
            OptLevel::Off
        } else {
            OptLevel::On
        }
    }
}

/// Run the full pipeline over in-memory source, returning the generated
/// (and, depending on `opt`, optimized) instruction stream.
pub fn compile_str(source: &str, opt: OptLevel) -> Result<Vec<Instruction>, CompileError> {
    let mut block = Parser::parse_source(source)?;
    tracing::debug!(statements = block.statements.len(), "parsed");

    if opt == OptLevel::On {
        ast_optimizer::optimize(&mut block);
        tracing::debug!("ast optimizer pass complete");
    }

    let referenced = analyzer::analyze(&mut block)?;
    tracing::debug!(referenced_builtins = referenced.len(), "analyzed");
    let closed = builtins::close_over_dependencies(&referenced);

    let mut instructions = codegen::generate(&block, &closed)?;
    tracing::debug!(count = instructions.len(), "generated");

    if opt == OptLevel::On {
        bytecode_optimizer::optimize(&mut instructions);
        tracing::debug!(count = instructions.len(), "bytecode optimizer pass complete");
    }

    Ok(instructions)
}

/// Run the full pipeline over a source file on disk, returning the rendered
/// wire-format listing (one line per instruction, per §6).
pub fn compile_file(path: &std::path::Path, opt: OptLevel) -> Result<String, CompileError> {
    let source = std::fs::read_to_string(path)?;
    let instructions = compile_str(&source, opt)?;
    Ok(instruction::render(&instructions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_empty_main_unoptimized() {
        let ins = compile_str("int main() { return 0; }", OptLevel::Off).unwrap();
        assert!(!ins.is_empty());
    }

    #[test]
    fn compiles_empty_main_optimized() {
        let ins = compile_str("int main() { return 0; }", OptLevel::On).unwrap();
        assert!(!ins.is_empty());
    }

    #[test]
    fn optimized_stream_is_never_longer_than_unoptimized() {
        let src = "int main() { int a = 0 + 5; int b = a * 1; return b; }";
        let off = compile_str(src, OptLevel::Off).unwrap();
        let on = compile_str(src, OptLevel::On).unwrap();
        assert!(on.len() <= off.len());
    }

    #[test]
    fn syntax_error_is_reported_as_parse_variant() {
        let err = compile_str("int main() { return ; }", OptLevel::Off).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn undeclared_identifier_is_reported_as_analyze_variant() {
        let err = compile_str("int main() { return x; }", OptLevel::Off).unwrap_err();
        assert!(matches!(err, CompileError::Analyze(_)));
    }

    #[test]
    fn builtin_call_pulls_in_its_body() {
        let ins = compile_str("int main() { print_int(1); return 0; }", OptLevel::Off).unwrap();
        assert!(ins.iter().any(|i| i.opcode == instruction::Opcode::Wri));
    }

    #[test]
    fn missing_file_is_reported_as_io_variant() {
        let err = compile_file(std::path::Path::new("/no/such/file.pl0"), OptLevel::Off)
            .unwrap_err();
        assert!(matches!(err, CompileError::Io(_)));
    }

    #[test]
    fn rendered_output_has_one_line_per_instruction() {
        let tmp = tempfile::Builder::new().suffix(".pl0").tempfile().unwrap();
        std::fs::write(tmp.path(), "int main() { return 0; }").unwrap();
        let rendered = compile_file(tmp.path(), OptLevel::Off).unwrap();
        let instructions = compile_str("int main() { return 0; }", OptLevel::Off).unwrap();
        assert_eq!(rendered.lines().count(), instructions.len());
    }
}
