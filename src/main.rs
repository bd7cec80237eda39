//! CLI driver: `pl0c <input_file> [-o=0|-o=1]`.

use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;

use pl0c::{instruction, CompileError, OptLevel};

#[derive(ClapParser)]
#[command(name = "pl0c")]
#[command(about = "Compiler for a small imperative language targeting a PL/0-style stack-machine bytecode", long_about = None)]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Optimization level: 0 disables the AST and bytecode peephole passes,
    /// 1 (default) enables both.
    #[arg(short = 'o', long = "opt", default_value_t = 1)]
    opt: u8,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", CompileError::from(e));
            process::exit(1);
        }
    };

    match pl0c::compile_str(&source, OptLevel::from(cli.opt)) {
        Ok(instructions) => {
            let rendered = instruction::render(&instructions);
            if let Err(e) = std::fs::write("instructions.txt", &rendered) {
                eprintln!("{}", CompileError::from(e));
                process::exit(1);
            }
            print!("{rendered}");
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}
