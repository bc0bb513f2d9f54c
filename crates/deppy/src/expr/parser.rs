use crate::error::ExprError;

use super::token::{lex, Token};

/// Which entity binding a variable reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarRef {
    Entity,
    EntityOne,
    EntityTwo,
}

impl VarRef {
    pub fn name(self) -> &'static str {
        match self {
            VarRef::Entity => "Entity",
            VarRef::EntityOne => "EntityOne",
            VarRef::EntityTwo => "EntityTwo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    InSemverRange,
    SemverCompare,
    JsonPath,
}

/// A compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    /// The `#` element variable inside `any`.
    Elem,
    /// `X.Properties[key]`, yielding a sequence of strings.
    Property { var: VarRef, key: Box<Expr> },
    /// `seq[index]`, yielding a string.
    Index { seq: Box<Expr>, index: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `any(seq, predicate)` with `#` bound to each element in turn.
    Any { seq: Box<Expr>, predicate: Box<Expr> },
    Call { builtin: Builtin, args: Vec<Expr> },
}

/// An immutable compiled program. Compilation happens once per expression
/// value; the program is shared between clones.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub root: Expr,
}

/// Compile an expression source string into a program.
pub(crate) fn compile(src: &str) -> Result<Program, ExprError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Compile(format!(
            "unexpected trailing token {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(Program { root })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(other) => Err(ExprError::Compile(format!(
                "expected {expected:?} but found {other:?}"
            ))),
            None => Err(ExprError::Compile(format!(
                "expected {expected:?} but the expression ended"
            ))),
        }
    }

    /// Entry point: ternary is the lowest-precedence construct and nests to
    /// the right, so comparator chains parse without parentheses.
    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_binary(0)?;
        if self.peek() == Some(&Token::Question) {
            self.next();
            let then = self.parse_expr()?;
            self.expect(&Token::Colon)?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(cond)
    }

    fn parse_binary(&mut self, min_power: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some((op, power)) = self.peek().and_then(binary_op) else {
                break;
            };
            if power < min_power {
                break;
            }
            self.next();
            let rhs = self.parse_binary(power + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.next();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.next();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::LBracket) {
            self.next();
            let index = self.parse_expr()?;
            self.expect(&Token::RBracket)?;
            expr = Expr::Index {
                seq: Box::new(expr),
                index: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Hash) => Ok(Expr::Elem),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_ident(name),
            Some(other) => Err(ExprError::Compile(format!(
                "unexpected token {other:?} in expression"
            ))),
            None => Err(ExprError::Compile(
                "the expression ended unexpectedly".to_string(),
            )),
        }
    }

    fn parse_ident(&mut self, name: String) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            return self.parse_call(&name);
        }
        let var = match name.as_str() {
            "Entity" => VarRef::Entity,
            "EntityOne" => VarRef::EntityOne,
            "EntityTwo" => VarRef::EntityTwo,
            _ => {
                return Err(ExprError::Compile(format!(
                    "unknown identifier {name:?}; expected Entity, EntityOne or EntityTwo"
                )))
            }
        };
        // The only field on an entity binding is its property table, and it
        // is always keyed.
        self.expect(&Token::Dot)?;
        match self.next() {
            Some(Token::Ident(field)) if field == "Properties" => {}
            Some(other) => {
                return Err(ExprError::Compile(format!(
                    "unknown field {other:?}; entities expose only Properties"
                )))
            }
            None => {
                return Err(ExprError::Compile(
                    "the expression ended after '.'".to_string(),
                ))
            }
        }
        self.expect(&Token::LBracket)?;
        let key = self.parse_expr()?;
        self.expect(&Token::RBracket)?;
        Ok(Expr::Property {
            var,
            key: Box::new(key),
        })
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, ExprError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.peek() == Some(&Token::Comma) {
                    self.next();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;

        let builtin = match name {
            "any" => {
                let [seq, predicate] = take_args::<2>(name, args)?;
                return Ok(Expr::Any {
                    seq: Box::new(seq),
                    predicate: Box::new(predicate),
                });
            }
            "InSemverRange" => Builtin::InSemverRange,
            "SemverCompare" => Builtin::SemverCompare,
            "JSONPath" => Builtin::JsonPath,
            _ => {
                return Err(ExprError::Compile(format!(
                    "unknown function {name:?} in expression"
                )))
            }
        };
        let args = take_args::<2>(name, args)?.to_vec();
        Ok(Expr::Call { builtin, args })
    }
}

fn take_args<const N: usize>(name: &str, args: Vec<Expr>) -> Result<[Expr; N], ExprError> {
    let found = args.len();
    args.try_into().map_err(|_| {
        ExprError::Compile(format!(
            "{name} expects {N} arguments but {found} were provided"
        ))
    })
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::OrOr => (BinaryOp::Or, 1),
        Token::AndAnd => (BinaryOp::And, 2),
        Token::EqEq => (BinaryOp::Eq, 3),
        Token::NotEq => (BinaryOp::NotEq, 3),
        Token::Lt => (BinaryOp::Lt, 4),
        Token::Le => (BinaryOp::Le, 4),
        Token::Gt => (BinaryOp::Gt, 4),
        Token::Ge => (BinaryOp::Ge, 4),
        Token::Plus => (BinaryOp::Add, 5),
        Token::Minus => (BinaryOp::Sub, 5),
        Token::Star => (BinaryOp::Mul, 6),
        Token::Slash => (BinaryOp::Div, 6),
        _ => return None,
    })
}
