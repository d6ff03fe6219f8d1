// src/fragment/parser.rs

//! Key grammar.
//!
//! ```text
//! :name          label (definition alias or word capture)
//! :name(glob)    named glob capture
//! :name`re`      named regex capture
//! &name          reference to a definition
//! `re`           raw regular expression
//! \c             the literal character c
//! anything else  text, or a glob when it contains `*` or `{`
//! ```

use crate::errors::{EmkError, Result};

use super::ast::FragmentAst;

/// Parse one namespace key into its AST.
pub fn parse_key(key: &str) -> Result<FragmentAst> {
    Parser::new(key).parse()
}

struct Parser<'a> {
    key: &'a str,
    chars: Vec<char>,
    pos: usize,
    parts: Vec<FragmentAst>,
    run: String,
}

impl<'a> Parser<'a> {
    fn new(key: &'a str) -> Self {
        Self {
            key,
            chars: key.chars().collect(),
            pos: 0,
            parts: Vec::new(),
            run: String::new(),
        }
    }

    fn parse(mut self) -> Result<FragmentAst> {
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.flush_run();
                    self.pos += 1;
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("dangling escape at end of key"));
                    };
                    self.pos += 1;
                    self.parts.push(FragmentAst::Text(escaped.to_string()));
                }
                ':' if self.ident_follows() => {
                    self.flush_run();
                    self.pos += 1;
                    let name = self.ident();
                    let part = match self.peek() {
                        Some('(') => {
                            let inner = self.delimited('(', ')')?;
                            FragmentAst::CaptureGlob {
                                name,
                                inner: Box::new(glob_or_text(inner)),
                            }
                        }
                        Some('`') => {
                            let inner = self.regex()?;
                            FragmentAst::CaptureRegex {
                                name,
                                inner: Box::new(FragmentAst::Regex(inner)),
                            }
                        }
                        _ => FragmentAst::Label(name),
                    };
                    self.parts.push(part);
                }
                '&' if self.ident_follows() => {
                    self.flush_run();
                    self.pos += 1;
                    let name = self.ident();
                    self.parts.push(FragmentAst::Reference(name));
                }
                '`' => {
                    self.flush_run();
                    let inner = self.regex()?;
                    self.parts.push(FragmentAst::Regex(inner));
                }
                other => {
                    self.run.push(other);
                    self.pos += 1;
                }
            }
        }
        self.flush_run();

        let mut parts = self.parts;
        Ok(match parts.len() {
            0 => FragmentAst::Text(String::new()),
            1 => parts.remove(0),
            _ => FragmentAst::Pattern(parts),
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn ident_follows(&self) -> bool {
        self.chars
            .get(self.pos + 1)
            .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
    }

    fn ident(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    /// Read `open ... close` with nesting, returning the inner text.
    fn delimited(&mut self, open: char, close: char) -> Result<String> {
        self.pos += 1;
        let mut depth = 1usize;
        let mut inner = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(inner);
                }
            }
            inner.push(c);
        }
        Err(self.error(&format!("unterminated '{open}'")))
    }

    /// Read a backtick-delimited regex. "\`" yields a literal backtick; any
    /// other escape is passed through to the regex engine.
    fn regex(&mut self) -> Result<String> {
        self.pos += 1;
        let mut inner = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '`' => return Ok(inner),
                '\\' if self.peek() == Some('`') => {
                    inner.push('`');
                    self.pos += 1;
                }
                other => inner.push(other),
            }
        }
        Err(self.error("unterminated regular expression"))
    }

    fn flush_run(&mut self) {
        if !self.run.is_empty() {
            let run = std::mem::take(&mut self.run);
            self.parts.push(glob_or_text(run));
        }
    }

    fn error(&self, reason: &str) -> EmkError {
        EmkError::PatternCompile {
            key: self.key.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn glob_or_text(value: String) -> FragmentAst {
    if value.contains('*') || value.contains('{') {
        FragmentAst::Glob(value)
    } else {
        FragmentAst::Text(value)
    }
}
