//! Error types for every stage of the compilation pipeline.

use std::fmt;

/// A lexical error: a token the scanner could not form.
#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Syntax error: {}, error on line {}", self.message, self.line)
    }
}

impl std::error::Error for LexError {}

/// A grammar violation encountered by the parser.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Syntax error: {}, error on line {}", self.message, self.line)
    }
}

impl std::error::Error for ParseError {}

/// A single semantic diagnostic, carrying the source line it was raised on.
#[derive(Debug, Clone)]
pub struct AnalyzeError {
    pub message: String,
    pub line: u32,
}

impl AnalyzeError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        AnalyzeError {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semantic error: {}, error on line {}", self.message, self.line)
    }
}

impl std::error::Error for AnalyzeError {}

/// A batch of semantic diagnostics. Most checks stop at the first violation,
/// but label/forward-reference resolution reports every offending target
/// before the process exits.
#[derive(Debug, Clone)]
pub struct AnalyzeErrors(pub Vec<AnalyzeError>);

impl fmt::Display for AnalyzeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AnalyzeErrors {}

/// Codegen should never observe an error once the analyzer accepts a
/// program; this type exists for defensive checks only.
#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Format(std::fmt::Error),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "Semantic error: {s}, error on line 0"),
            CodeGenError::Format(e) => write!(f, "instruction formatting error: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

/// The unified error type returned by the library's top-level entry points.
#[derive(Debug)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Analyze(AnalyzeErrors),
    CodeGen(CodeGenError),
    Io(std::io::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "{e}"),
            CompileError::Parse(e) => write!(f, "{e}"),
            CompileError::Analyze(e) => write!(f, "{e}"),
            CompileError::CodeGen(e) => write!(f, "{e}"),
            CompileError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<AnalyzeErrors> for CompileError {
    fn from(e: AnalyzeErrors) -> Self {
        CompileError::Analyze(e)
    }
}

impl From<AnalyzeError> for CompileError {
    fn from(e: AnalyzeError) -> Self {
        CompileError::Analyze(AnalyzeErrors(vec![e]))
    }
}

impl From<CodeGenError> for CompileError {
    fn from(e: CodeGenError) -> Self {
        CompileError::CodeGen(e)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}
