//! Formula parser
//!
//! Recursive descent over the token stream with the usual precedence:
//! `+ -` below `* /` below unary minus. The only calls accepted are the
//! whitelisted aggregates, each taking exactly one column name.

use super::aggregate::{AggregateCall, AggregateContext, AggregateFn};
use super::tokenizer::Token;
use super::ExpressionSyntaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            _ => None,
        }
    }
}

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A named numeric binding
    Identifier(String),
    Aggregate(AggregateCall),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Whether any aggregate call appears in the tree
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            Expr::Number(_) | Expr::Identifier(_) => false,
            Expr::Negate(inner) => inner.contains_aggregate(),
            Expr::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
        }
    }
}

/// Deepest allowed run of parentheses and unary signs
pub const MAX_NESTING_DEPTH: usize = 256;

/// Longest accepted formula. Also bounds the depth of operator chains,
/// which the evaluator walks recursively.
pub const MAX_EXPRESSION_TOKENS: usize = 1024;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<Expr, ExpressionSyntaxError> {
        if self.tokens.is_empty() {
            return Err(ExpressionSyntaxError::new("Empty expression", 0));
        }
        if self.tokens.len() > MAX_EXPRESSION_TOKENS {
            return Err(ExpressionSyntaxError::new(
                format!("Expression is too long (more than {} tokens)", MAX_EXPRESSION_TOKENS),
                MAX_EXPRESSION_TOKENS,
            ));
        }
        let expr = self.term()?;

        if let Some(token) = self.peek() {
            return Err(ExpressionSyntaxError::new(
                format!("Unexpected token after expression: {:?}", token),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Run `inner` one nesting level deeper
    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, ExpressionSyntaxError>,
    ) -> Result<T, ExpressionSyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ExpressionSyntaxError::new("Expression nested too deeply", self.position));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn match_any_operator(&mut self, ops: &[char]) -> Option<BinaryOp> {
        if let Some(Token::Operator(c)) = self.peek() {
            if ops.contains(c) {
                let op = BinaryOp::from_char(*c);
                self.position += 1;
                return op;
            }
        }
        None
    }

    /// Term: factor (( "+" | "-" ) factor)*
    fn term(&mut self) -> Result<Expr, ExpressionSyntaxError> {
        let mut left = self.factor()?;

        while let Some(op) = self.match_any_operator(&['+', '-']) {
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Factor: unary (( "*" | "/" ) unary)*
    fn factor(&mut self) -> Result<Expr, ExpressionSyntaxError> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_any_operator(&['*', '/']) {
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Unary: ( "-" | "+" ) unary | primary
    fn unary(&mut self) -> Result<Expr, ExpressionSyntaxError> {
        if self.match_token(&Token::Operator('-')) {
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        if self.match_token(&Token::Operator('+')) {
            return self.nested(Self::unary);
        }
        self.primary()
    }

    /// Primary: NUMBER | IDENTIFIER | AGGREGATE "(" IDENTIFIER ")" | "(" term ")"
    fn primary(&mut self) -> Result<Expr, ExpressionSyntaxError> {
        let start = self.position;

        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if self.match_token(&Token::OpenParen) {
                    self.aggregate_call(name, start)
                } else if name.contains('.') {
                    Err(ExpressionSyntaxError::new(
                        format!("Property access is not supported: {}", name),
                        start,
                    ))
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            Some(Token::OpenParen) => {
                let expr = self.nested(Self::term)?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ExpressionSyntaxError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ExpressionSyntaxError::new(
                format!("Unexpected token: {:?}", token),
                start,
            )),
            None => Err(ExpressionSyntaxError::new(
                "Unexpected end of expression",
                start,
            )),
        }
    }

    /// The opening parenthesis has been consumed
    fn aggregate_call(&mut self, name: String, start: usize) -> Result<Expr, ExpressionSyntaxError> {
        let function: AggregateFn = name
            .parse()
            .map_err(|_| ExpressionSyntaxError::new(format!("Unknown function: {}", name), start))?;

        let argument = match self.advance() {
            Some(Token::Identifier(argument)) => argument,
            _ => {
                return Err(ExpressionSyntaxError::new(
                    format!("{} takes a single column name", function),
                    self.position,
                ));
            }
        };
        if !self.match_token(&Token::CloseParen) {
            return Err(ExpressionSyntaxError::new(
                format!("{} takes a single column name", function),
                self.position,
            ));
        }

        let (context, column) = match argument.split_once('.') {
            None => (None, argument),
            Some((prefix, column)) => {
                let context = AggregateContext::from_prefix(prefix).filter(|_| !column.contains('.'));
                match context {
                    Some(context) => (Some(context), column.to_string()),
                    None => {
                        return Err(ExpressionSyntaxError::new(
                            format!("Unknown aggregate context in {}: use current. or compare.", argument),
                            start,
                        ));
                    }
                }
            }
        };

        Ok(Expr::Aggregate(AggregateCall {
            function,
            context,
            column,
        }))
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Expr, ExpressionSyntaxError> {
    Parser::new(tokens).parse()
}
