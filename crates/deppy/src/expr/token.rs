use crate::error::ExprError;

/// Lexical tokens of the expression language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    True,
    False,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Hash,
    Question,
    Colon,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
}

/// Tokenize an expression source string.
pub(crate) fn lex(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => push(&mut tokens, &mut chars, Token::LParen),
            ')' => push(&mut tokens, &mut chars, Token::RParen),
            '[' => push(&mut tokens, &mut chars, Token::LBracket),
            ']' => push(&mut tokens, &mut chars, Token::RBracket),
            '.' => push(&mut tokens, &mut chars, Token::Dot),
            ',' => push(&mut tokens, &mut chars, Token::Comma),
            '#' => push(&mut tokens, &mut chars, Token::Hash),
            '?' => push(&mut tokens, &mut chars, Token::Question),
            ':' => push(&mut tokens, &mut chars, Token::Colon),
            '+' => push(&mut tokens, &mut chars, Token::Plus),
            '-' => push(&mut tokens, &mut chars, Token::Minus),
            '*' => push(&mut tokens, &mut chars, Token::Star),
            '/' => push(&mut tokens, &mut chars, Token::Slash),
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExprError::Compile(
                        "expected '==' but found a single '='".to_string(),
                    ));
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(ExprError::Compile(
                        "expected '&&' but found a single '&'".to_string(),
                    ));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::OrOr);
                } else {
                    return Err(ExprError::Compile(
                        "expected '||' but found a single '|'".to_string(),
                    ));
                }
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => s.push('"'),
                            Some('\\') => s.push('\\'),
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => {
                                return Err(ExprError::Compile(format!(
                                    "unknown escape sequence '\\{other}' in string literal"
                                )))
                            }
                            None => {
                                return Err(ExprError::Compile(
                                    "unterminated string literal".to_string(),
                                ))
                            }
                        },
                        Some(other) => s.push(other),
                        None => {
                            return Err(ExprError::Compile(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = digits.parse::<i64>().map_err(|_| {
                    ExprError::Compile(format!("integer literal {digits} out of range"))
                })?;
                tokens.push(Token::Int(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(ExprError::Compile(format!(
                    "unexpected character {other:?} in expression"
                )))
            }
        }
    }

    Ok(tokens)
}

fn push(
    tokens: &mut Vec<Token>,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    token: Token,
) {
    chars.next();
    tokens.push(token);
}
