//! Tokenizer for XPath expressions.
//!
//! Applies the XPath 1.0 disambiguation rules: `*` and the names `and`,
//! `or`, `div`, `mod` are operators only when a preceding token exists that
//! is not `@`, `::`, `(`, `[`, `,` or another operator. A name followed by
//! `(` is a function or node type; a name followed by `::` is an axis.

use crate::errors::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    /// `*` used as a name test.
    Star,
    Literal(String),
    Number(f64),
    /// A name test, possibly `prefix:local` or `prefix:*`.
    Name(String),
    FunctionName(String),
    NodeType(String),
    AxisName(String),
}

impl Token {
    /// True if a following `*` or operator name must be read as an operator.
    fn allows_operator_after(&self) -> bool {
        !matches!(
            self,
            Self::At
                | Self::LParen
                | Self::LBracket
                | Self::Comma
                | Self::AxisName(_)
                | Self::Slash
                | Self::DoubleSlash
                | Self::Pipe
                | Self::Plus
                | Self::Minus
                | Self::Eq
                | Self::Neq
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Multiply
                | Self::And
                | Self::Or
                | Self::Div
                | Self::Mod
        )
    }
}

/// A token with the byte offset it starts at.
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(expr: &str) -> Result<Vec<Spanned>, XPathError> {
    let chars: Vec<(usize, char)> = expr.char_indices().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    let syntax = |position: usize, message: &str| XPathError::Syntax {
        expr: expr.to_string(),
        position,
        message: message.to_string(),
    };

    while i < chars.len() {
        let (pos, ch) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let operator_context = tokens
            .last()
            .is_some_and(|(token, _)| token.allows_operator_after());

        let token = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '.' if next == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if next.is_some_and(|c| c.is_ascii_digit()) => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::Neq
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '*' => {
                i += 1;
                if operator_context {
                    Token::Multiply
                } else {
                    Token::Star
                }
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&(_, c)| c == ch)
                    .ok_or_else(|| syntax(pos, "unterminated string literal"))?;
                let literal: String = chars[i + 1..i + 1 + close].iter().map(|&(_, c)| c).collect();
                i += close + 2;
                Token::Literal(literal)
            }
            c if c.is_ascii_digit() => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                let (name, end) = read_name(&chars, i);
                i = end;

                if operator_context {
                    match name.as_str() {
                        "and" => Token::And,
                        "or" => Token::Or,
                        "div" => Token::Div,
                        "mod" => Token::Mod,
                        _ => return Err(syntax(pos, &format!("expected an operator, found '{name}'"))),
                    }
                } else {
                    let mut look = i;
                    while look < chars.len() && chars[look].1.is_whitespace() {
                        look += 1;
                    }
                    let after = chars.get(look).map(|&(_, c)| c);
                    let after_next = chars.get(look + 1).map(|&(_, c)| c);

                    if after == Some(':') && after_next == Some(':') {
                        i = look + 2;
                        Token::AxisName(name)
                    } else if after == Some('(') {
                        if matches!(
                            name.as_str(),
                            "text" | "node" | "comment" | "processing-instruction"
                        ) {
                            Token::NodeType(name)
                        } else {
                            Token::FunctionName(name)
                        }
                    } else {
                        Token::Name(name)
                    }
                }
            }
            other => return Err(syntax(pos, &format!("unexpected character '{other}'"))),
        };

        tokens.push((token, pos));
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn read_number(chars: &[(usize, char)], start: usize) -> (f64, usize) {
    let mut end = start;
    let mut seen_dot = false;
    while end < chars.len() {
        let c = chars[end].1;
        if c.is_ascii_digit() {
            end += 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..end].iter().map(|&(_, c)| c).collect();
    (text.parse().unwrap_or(f64::NAN), end)
}

/// Reads an NCName with an optional `prefix:` and `*` or NCName local part.
fn read_name(chars: &[(usize, char)], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && is_name_char(chars[end].1) {
        end += 1;
    }

    let colon = chars.get(end).map(|&(_, c)| c) == Some(':');
    let after_colon = chars.get(end + 1).map(|&(_, c)| c);
    if colon {
        match after_colon {
            Some('*') => end += 2,
            Some(c) if is_name_start(c) => {
                end += 1;
                while end < chars.len() && is_name_char(chars[end].1) {
                    end += 1;
                }
            }
            _ => {}
        }
    }

    (chars[start..end].iter().map(|&(_, c)| c).collect(), end)
}
