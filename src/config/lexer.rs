use std::iter::Peekable;
use std::str::Chars;

use super::parser::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    Word(String),
    Number(u64),
    LBrace,
    RBrace,
    Newline,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenType,
    pub loc: Loc,
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.input.next() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn current_loc(&self) -> Loc {
        Loc {
            line: self.line,
            col: self.col,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, ConfigError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let loc = self.current_loc();
            match c {
                '#' => self.skip_comment(),
                '{' => {
                    tokens.push(Token {
                        kind: TokenType::LBrace,
                        loc,
                    });
                    self.advance();
                }
                '}' => {
                    tokens.push(Token {
                        kind: TokenType::RBrace,
                        loc,
                    });
                    self.advance();
                }
                '\n' => {
                    tokens.push(Token {
                        kind: TokenType::Newline,
                        loc,
                    });
                    self.advance();
                }
                c if c.is_whitespace() => self.advance(),
                _ => self.scan_word(&mut tokens, loc),
            }
        }

        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    // A word runs until whitespace, a brace, or a comment. Paths and URLs
    // pass through unmodified; pure digits become numbers.
    fn scan_word(&mut self, tokens: &mut Vec<Token>, loc: Loc) {
        let mut val = String::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '{' || c == '}' || c == '#' {
                break;
            }
            val.push(c);
            self.advance();
        }

        if let Ok(num) = val.parse::<u64>() {
            tokens.push(Token {
                kind: TokenType::Number(num),
                loc,
            });
        } else {
            tokens.push(Token {
                kind: TokenType::Word(val),
                loc,
            });
        }
    }
}
