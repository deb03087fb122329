//! Formula tokenizer
//!
//! Converts formula strings like "(revenue - cost) / revenue" or
//! "SUM(current.revenue)" into a flat token sequence.

use std::iter::Peekable;
use std::str::CharIndices;

use super::ExpressionSyntaxError;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, 1.5e10)
    Number(f64),
    /// A binding name, an aggregate function name, or `context.column`
    Identifier(String),
    /// One of + - * /
    Operator(char),
    OpenParen,
    CloseParen,
    /// Only meaningful to report a wrong argument count
    Comma,
}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str) -> Self {
        Self {
            chars: formula.char_indices().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionSyntaxError> {
        let mut tokens = Vec::new();

        self.skip_whitespace();
        // A leading '=' is accepted for spreadsheet-style formulas
        if let Some((_, '=')) = self.chars.peek() {
            self.chars.next();
        }

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ExpressionSyntaxError> {
        self.skip_whitespace();

        let Some(&(position, c)) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' => {
                self.chars.next();
                Token::OpenParen
            }
            ')' => {
                self.chars.next();
                Token::CloseParen
            }
            ',' => {
                self.chars.next();
                Token::Comma
            }
            '+' | '-' | '*' | '/' => {
                self.chars.next();
                Token::Operator(c)
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number(position)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(position)?,
            c => {
                return Err(ExpressionSyntaxError::new(
                    format!("Unexpected character: '{}'", c),
                    position,
                ));
            }
        };

        Ok(Some(token))
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn take_digits(&mut self, into: &mut String) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                into.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self, start: usize) -> Result<Token, ExpressionSyntaxError> {
        let mut num_str = String::new();

        self.take_digits(&mut num_str);

        if let Some((_, '.')) = self.chars.peek() {
            num_str.push('.');
            self.chars.next();
            self.take_digits(&mut num_str);
        }

        if let Some(&(_, c)) = self.chars.peek() {
            if c == 'e' || c == 'E' {
                num_str.push(c);
                self.chars.next();
                if let Some(&(_, sign)) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        num_str.push(sign);
                        self.chars.next();
                    }
                }
                self.take_digits(&mut num_str);
            }
        }

        match num_str.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Token::Number(n)),
            _ => Err(ExpressionSyntaxError::new(
                format!("Invalid number: {}", num_str),
                start,
            )),
        }
    }

    /// Read an identifier, possibly dotted (`compare.revenue`)
    fn read_identifier(&mut self, start: usize) -> Result<Token, ExpressionSyntaxError> {
        let mut ident = String::new();

        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        let well_formed = ident.split('.').all(|segment| {
            segment
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        });
        if !well_formed {
            return Err(ExpressionSyntaxError::new(
                format!("Malformed identifier: {}", ident),
                start,
            ));
        }

        Ok(Token::Identifier(ident))
    }
}

pub fn tokenize(formula: &str) -> Result<Vec<Token>, ExpressionSyntaxError> {
    Tokenizer::new(formula).tokenize()
}
