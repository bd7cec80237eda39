//! Hand-written character-at-a-time tokenizer. No external parsing crate is
//! used, matching the teacher's own hand-rolled lexer.

use crate::error::LexError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float { whole: i64, frac: i64 },
    Str(String),

    KwInt,
    KwBool,
    KwFloat,
    KwString,
    KwVoid,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwRepeat,
    KwUntil,
    KwFor,
    KwBreak,
    KwContinue,
    KwReturn,
    KwGoto,
    KwNew,
    KwDelete,
    KwSizeof,
    KwConst,
    KwTrue,
    KwFalse,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AmpAmp,
    PipePipe,
    Amp,
    EqEq,
    NotEq,
    Lt,
    Leq,
    Gt,
    Geq,
    Eq,
    Question,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "int" => TokenKind::KwInt,
        "bool" => TokenKind::KwBool,
        "float" => TokenKind::KwFloat,
        "string" => TokenKind::KwString,
        "void" => TokenKind::KwVoid,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "do" => TokenKind::KwDo,
        "repeat" => TokenKind::KwRepeat,
        "until" => TokenKind::KwUntil,
        "for" => TokenKind::KwFor,
        "break" => TokenKind::KwBreak,
        "continue" => TokenKind::KwContinue,
        "return" => TokenKind::KwReturn,
        "goto" => TokenKind::KwGoto,
        "new" => TokenKind::KwNew,
        "delete" => TokenKind::KwDelete,
        "sizeof" => TokenKind::KwSizeof,
        "const" => TokenKind::KwConst,
        "true" => TokenKind::KwTrue,
        "false" => TokenKind::KwFalse,
        _ => return None,
    })
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let mut it = self.chars.clone();
                    it.next();
                    match it.next() {
                        Some('/') => {
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.advance();
                            }
                        }
                        Some('*') => {
                            self.advance();
                            self.advance();
                            loop {
                                match self.advance() {
                                    None => {
                                        return Err(LexError {
                                            message: "unterminated block comment".into(),
                                            line: self.line,
                                        })
                                    }
                                    Some('*') if self.peek() == Some('/') => {
                                        self.advance();
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => break,
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let line = self.line;
        let c = match self.advance() {
            None => return Ok(Token { kind: TokenKind::Eof, line }),
            Some(c) => c,
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semi,
            ',' => TokenKind::Comma,
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Leq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::Geq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::PipePipe
                } else {
                    return Err(LexError {
                        message: "unexpected character '|'".into(),
                        line,
                    });
                }
            }
            '"' => return self.lex_string(line),
            c if c.is_ascii_digit() => return self.lex_number(c, line),
            c if c.is_alphabetic() || c == '_' => return self.lex_ident(c, line),
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    line,
                })
            }
        };

        Ok(Token { kind, line })
    }

    fn lex_string(&mut self, line: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        line,
                    })
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some(other) => s.push(other),
                    None => {
                        return Err(LexError {
                            message: "unterminated escape sequence".into(),
                            line,
                        })
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str(s),
            line,
        })
    }

    fn lex_number(&mut self, first: char, line: u32) -> Result<Token, LexError> {
        let mut int_part = String::new();
        int_part.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                int_part.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance(); // consume '.'
                let mut frac_part = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        frac_part.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                let whole: i64 = int_part.parse().map_err(|_| LexError {
                    message: "malformed integer part of float literal".into(),
                    line,
                })?;
                let frac: i64 = frac_part.trim_end_matches('0').parse().unwrap_or(0);
                return Ok(Token {
                    kind: TokenKind::Float { whole, frac },
                    line,
                });
            }
        }

        let value: i64 = int_part.parse().map_err(|_| LexError {
            message: format!("malformed integer literal '{int_part}'"),
            line,
        })?;
        Ok(Token {
            kind: TokenKind::Int(value),
            line,
        })
    }

    fn lex_ident(&mut self, first: char, line: u32) -> Result<Token, LexError> {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = keyword(&s).unwrap_or(TokenKind::Ident(s));
        Ok(Token { kind, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_declaration() {
        let toks = Lexer::tokenize("int x = 2 + 0;").unwrap();
        assert!(matches!(toks[0].kind, TokenKind::KwInt));
        assert!(matches!(toks[1].kind, TokenKind::Ident(ref s) if s == "x"));
        assert!(matches!(toks[2].kind, TokenKind::Eq));
        assert!(matches!(toks[3].kind, TokenKind::Int(2)));
        assert!(matches!(toks[4].kind, TokenKind::Plus));
        assert!(matches!(toks[5].kind, TokenKind::Int(0)));
        assert!(matches!(toks[6].kind, TokenKind::Semi));
    }

    #[test]
    fn tokenizes_float_literal_strips_trailing_zeros() {
        let toks = Lexer::tokenize("3.140").unwrap();
        assert!(matches!(
            toks[0].kind,
            TokenKind::Float { whole: 3, frac: 14 }
        ));
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let toks = Lexer::tokenize("int x;\nint y;").unwrap();
        let semi_lines: Vec<u32> = toks
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Semi))
            .map(|t| t.line)
            .collect();
        assert_eq!(semi_lines, vec![1, 2]);
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Lexer::tokenize("\"abc").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
