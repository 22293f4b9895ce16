//! Recursive descent parser for the supported XPath subset.
//!
//! Grammar (XPath 1.0, precedence lowest first):
//! ```text
//! expr      := and ('or' and)*
//! and       := equality ('and' equality)*
//! equality  := relational (('=' | '!=') relational)*
//! relational:= additive (('<' | '<=' | '>' | '>=') additive)*
//! additive  := multiply (('+' | '-') multiply)*
//! multiply  := unary (('*' | 'div' | 'mod') unary)*
//! unary     := '-'* union
//! union     := path ('|' path)*
//! path      := location | filter (('/' | '//') relative)?
//! filter    := primary predicate*
//! primary   := '(' expr ')' | literal | number | function '(' args ')'
//! location  := '/' relative? | '//' relative | relative
//! relative  := step (('/' | '//') step)*
//! step      := axis? test predicate* | '.' | '..'
//! ```

use super::lexer::{tokenize, Spanned, Token};
use crate::errors::XPathError;

/// Functions the evaluator implements.
pub(crate) const FUNCTIONS: &[&str] = &[
    "last",
    "position",
    "count",
    "string",
    "concat",
    "contains",
    "starts-with",
    "ends-with",
    "substring",
    "substring-before",
    "substring-after",
    "string-length",
    "normalize-space",
    "translate",
    "lower-case",
    "upper-case",
    "not",
    "true",
    "false",
    "boolean",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
    "name",
    "local-name",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "self" => Self::SelfAxis,
            "attribute" => Self::Attribute,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "following" => Self::Following,
            "preceding" => Self::Preceding,
            _ => return None,
        })
    }

    /// Reverse axes number their nodes nearest first.
    pub(crate) fn is_reverse(self) -> bool {
        matches!(
            self,
            Self::Parent
                | Self::Ancestor
                | Self::AncestorOrSelf
                | Self::PrecedingSibling
                | Self::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeTest {
    /// A lower-cased qualified name.
    Name(String),
    /// `prefix:*`
    Prefix(String),
    /// `*`
    Any,
    Text,
    Comment,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    /// A location path, absolute or relative to the context node.
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression filtered by predicates and followed by steps.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

pub(crate) fn parse(expr: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        source: expr,
        tokens,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(parser.error("empty expression"));
    }
    let parsed = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(parsed)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), XPathError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn error(&self, message: &str) -> XPathError {
        let position = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |(_, offset)| *offset);
        XPathError::Syntax {
            expr: self.source.to_string(),
            position,
            message: message.to_string(),
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, XPathError>,
    ) -> Result<Expr, XPathError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[(Token::Eq, BinaryOp::Eq), (Token::Neq, BinaryOp::Neq)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[
                (Token::Le, BinaryOp::Le),
                (Token::Lt, BinaryOp::Lt),
                (Token::Ge, BinaryOp::Ge),
                (Token::Gt, BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[
                (Token::Multiply, BinaryOp::Mul),
                (Token::Div, BinaryOp::Div),
                (Token::Mod, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(
                Token::Literal(_) | Token::Number(_) | Token::LParen | Token::FunctionName(_),
            ) => self.parse_filter(),
            _ => self.parse_location(),
        }
    }

    fn parse_filter(&mut self) -> Result<Expr, XPathError> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;

        let mut steps = Vec::new();
        if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
            self.parse_relative_into(&mut steps, true)?;
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.advance() {
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::FunctionName(name)) => {
                if !FUNCTIONS.contains(&name.as_str()) {
                    self.pos -= 1;
                    return Err(self.error(&format!("unknown function '{name}'")));
                }
                self.expect(&Token::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or ')'")?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected an expression"))
            }
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn parse_location(&mut self) -> Result<Expr, XPathError> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if self.starts_step() {
                    self.parse_step_into(&mut steps)?;
                    self.parse_relative_into(&mut steps, false)?;
                }
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.parse_relative_into(&mut steps, true)?;
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ => {
                if !self.starts_step() {
                    return Err(self.error("expected a location step"));
                }
                self.parse_step_into(&mut steps)?;
                self.parse_relative_into(&mut steps, false)?;
                Ok(Expr::Path {
                    absolute: false,
                    steps,
                })
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::Star
                    | Token::Name(_)
                    | Token::NodeType(_)
                    | Token::AxisName(_)
            )
        )
    }

    /// Parses `(('/' | '//') step)*`; with `require_separator` the first
    /// separator must be present.
    fn parse_relative_into(
        &mut self,
        steps: &mut Vec<Step>,
        require_separator: bool,
    ) -> Result<(), XPathError> {
        let mut first = true;
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                }
                Some(Token::DoubleSlash) => {
                    self.pos += 1;
                    steps.push(Step::descendant_or_self());
                }
                _ if first && require_separator => {
                    return Err(self.error("expected '/' or '//'"));
                }
                _ => return Ok(()),
            }
            first = false;
            self.parse_step_into(steps)?;
        }
    }

    fn parse_step_into(&mut self, steps: &mut Vec<Step>) -> Result<(), XPathError> {
        if self.eat(&Token::Dot) {
            steps.push(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
            return Ok(());
        }
        if self.eat(&Token::DotDot) {
            steps.push(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
            return Ok(());
        }

        let axis = match self.peek() {
            Some(Token::At) => {
                self.pos += 1;
                Axis::Attribute
            }
            Some(Token::AxisName(name)) => {
                let name = name.clone();
                let axis = Axis::from_name(&name)
                    .ok_or_else(|| self.error(&format!("unknown axis '{name}'")))?;
                self.pos += 1;
                axis
            }
            _ => Axis::Child,
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => match name.strip_suffix(":*") {
                Some(prefix) => NodeTest::Prefix(prefix.to_ascii_lowercase()),
                None => NodeTest::Name(name.to_ascii_lowercase()),
            },
            Some(Token::NodeType(kind)) => {
                self.expect(&Token::LParen, "'('")?;
                // processing-instruction('target') literals are accepted and ignored.
                if let Some(Token::Literal(_)) = self.peek() {
                    self.pos += 1;
                }
                self.expect(&Token::RParen, "')'")?;
                match kind.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    "node" => NodeTest::Node,
                    _ => NodeTest::Name(String::new()),
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error("expected a node test"));
            }
        };

        let predicates = self.parse_predicates()?;
        steps.push(Step {
            axis,
            test,
            predicates,
        });
        Ok(())
    }
}
