//! Evaluation of parsed XPath expressions against a [`Document`].

use super::parser::{Axis, BinaryOp, Expr, NodeTest, Step};
use super::{XNode, XValue};
use crate::errors::XPathError;
use crate::markup::{Document, NodeId, NodeKind};

/// The dynamic context of one evaluation.
#[derive(Debug, Clone, Copy)]
struct Focus {
    node: XNode,
    position: usize,
    size: usize,
}

pub(crate) struct Evaluator<'d> {
    doc: &'d Document,
}

impl<'d> Evaluator<'d> {
    pub(crate) fn new(doc: &'d Document) -> Self {
        Self { doc }
    }

    pub(crate) fn evaluate(&self, expr: &Expr, node: XNode) -> Result<XValue, XPathError> {
        self.eval(
            expr,
            Focus {
                node,
                position: 1,
                size: 1,
            },
        )
    }

    fn eval(&self, expr: &Expr, focus: Focus) -> Result<XValue, XPathError> {
        match expr {
            Expr::Literal(text) => Ok(XValue::Str(text.clone())),
            Expr::Number(value) => Ok(XValue::Num(*value)),
            Expr::Negate(inner) => {
                let value = self.eval(inner, focus)?;
                Ok(XValue::Num(-self.number(&value)))
            }
            Expr::Binary(op, left, right) => self.binary(*op, left, right, focus),
            Expr::Union(left, right) => {
                let (XValue::Nodes(mut a), XValue::Nodes(b)) =
                    (self.eval(left, focus)?, self.eval(right, focus)?)
                else {
                    return Err(XPathError::Eval("'|' needs node-sets on both sides".to_string()));
                };
                a.extend(b);
                Ok(XValue::Nodes(self.document_order(a)))
            }
            Expr::Function(name, args) => self.function(name, args, focus),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    XNode::Node(self.doc.root())
                } else {
                    focus.node
                };
                Ok(XValue::Nodes(self.walk(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let XValue::Nodes(nodes) = self.eval(primary, focus)? else {
                    return Err(XPathError::Eval(
                        "predicates and steps need a node-set".to_string(),
                    ));
                };
                let mut nodes = self.document_order(nodes);
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(XValue::Nodes(self.walk(nodes, steps)?))
            }
        }
    }

    fn walk(&self, mut nodes: Vec<XNode>, steps: &[Step]) -> Result<Vec<XNode>, XPathError> {
        for step in steps {
            let mut next = Vec::new();
            for node in &nodes {
                let mut candidates: Vec<XNode> = self
                    .axis(step.axis, *node)
                    .into_iter()
                    .filter(|candidate| self.matches(step.axis, &step.test, *candidate))
                    .collect();
                for predicate in &step.predicates {
                    candidates = self.filter(candidates, predicate)?;
                }
                next.extend(candidates);
            }
            nodes = self.document_order(next);
        }
        Ok(nodes)
    }

    /// Keeps the nodes for which the predicate holds, numbering them in the
    /// order given.
    fn filter(&self, nodes: Vec<XNode>, predicate: &Expr) -> Result<Vec<XNode>, XPathError> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (index, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                #[allow(clippy::float_cmp)]
                XValue::Num(n) => n == focus.position as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn document_order(&self, mut nodes: Vec<XNode>) -> Vec<XNode> {
        nodes.sort_by_key(|node| node.order_key());
        nodes.dedup();
        nodes
    }

    fn subtree_end(&self, mut id: NodeId) -> NodeId {
        while let Some(&last) = self.doc.children(id).last() {
            id = last;
        }
        id
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.doc.parent(id);
        while let Some(parent) = current {
            out.push(parent);
            current = self.doc.parent(parent);
        }
        out
    }

    /// Returns the axis nodes in axis order (nearest first for reverse axes).
    fn axis(&self, axis: Axis, node: XNode) -> Vec<XNode> {
        let id = match node {
            XNode::Node(id) => id,
            XNode::Attr(owner, _) => {
                return match axis {
                    Axis::Parent => vec![XNode::Node(owner)],
                    Axis::SelfAxis => vec![node],
                    Axis::Ancestor => self.axis(Axis::AncestorOrSelf, XNode::Node(owner)),
                    Axis::AncestorOrSelf => {
                        let mut out = vec![node];
                        out.extend(self.axis(Axis::AncestorOrSelf, XNode::Node(owner)));
                        out
                    }
                    Axis::Following => {
                        let mut out = self.axis(Axis::Descendant, XNode::Node(owner));
                        out.extend(self.axis(Axis::Following, XNode::Node(owner)));
                        out
                    }
                    Axis::Preceding => self.axis(Axis::Preceding, XNode::Node(owner)),
                    _ => Vec::new(),
                };
            }
        };

        let nodes = |ids: Vec<NodeId>| -> Vec<XNode> { ids.into_iter().map(XNode::Node).collect() };
        match axis {
            Axis::Child => nodes(self.doc.children(id).to_vec()),
            Axis::Descendant => nodes(self.doc.descendants(id)),
            Axis::DescendantOrSelf => {
                let mut ids = vec![id];
                ids.extend(self.doc.descendants(id));
                nodes(ids)
            }
            Axis::Parent => nodes(self.doc.parent(id).into_iter().collect()),
            Axis::Ancestor => nodes(self.ancestors(id)),
            Axis::AncestorOrSelf => {
                let mut ids = vec![id];
                ids.extend(self.ancestors(id));
                nodes(ids)
            }
            Axis::SelfAxis => vec![node],
            Axis::Attribute => (0..self.doc.attributes(id).len())
                .map(|index| XNode::Attr(id, index))
                .collect(),
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some(parent) = self.doc.parent(id) else {
                    return Vec::new();
                };
                let siblings = self.doc.children(parent);
                let index = siblings.iter().position(|&s| s == id).unwrap_or(0);
                if axis == Axis::FollowingSibling {
                    nodes(siblings[index + 1..].to_vec())
                } else {
                    nodes(siblings[..index].iter().rev().copied().collect())
                }
            }
            Axis::Following => nodes((self.subtree_end(id) + 1..self.doc.len()).collect()),
            Axis::Preceding => {
                let ancestors = self.ancestors(id);
                nodes(
                    (1..id)
                        .rev()
                        .filter(|candidate| !ancestors.contains(candidate))
                        .collect(),
                )
            }
        }
    }

    fn matches(&self, axis: Axis, test: &NodeTest, node: XNode) -> bool {
        match node {
            XNode::Attr(owner, index) => {
                let Some((name, _)) = self.doc.attributes(owner).get(index) else {
                    return false;
                };
                match test {
                    NodeTest::Node => true,
                    NodeTest::Any => axis == Axis::Attribute,
                    NodeTest::Name(expected) => axis == Axis::Attribute && name == expected,
                    NodeTest::Prefix(prefix) => {
                        axis == Axis::Attribute && has_prefix(name, prefix)
                    }
                    NodeTest::Text | NodeTest::Comment => false,
                }
            }
            XNode::Node(id) => match (test, self.doc.kind(id)) {
                (NodeTest::Node, _) => true,
                (NodeTest::Text, NodeKind::Text(_)) => true,
                (NodeTest::Comment, NodeKind::Comment(_)) => true,
                (NodeTest::Any, NodeKind::Element { .. }) => axis != Axis::Attribute,
                (NodeTest::Name(expected), NodeKind::Element { name, .. }) => {
                    axis != Axis::Attribute && name == expected
                }
                (NodeTest::Prefix(prefix), NodeKind::Element { name, .. }) => {
                    axis != Axis::Attribute && has_prefix(name, prefix)
                }
                _ => false,
            },
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        focus: Focus,
    ) -> Result<XValue, XPathError> {
        match op {
            BinaryOp::Or => {
                let l = self.eval(left, focus)?;
                if self.boolean(&l) {
                    return Ok(XValue::Bool(true));
                }
                let r = self.eval(right, focus)?;
                Ok(XValue::Bool(self.boolean(&r)))
            }
            BinaryOp::And => {
                let l = self.eval(left, focus)?;
                if !self.boolean(&l) {
                    return Ok(XValue::Bool(false));
                }
                let r = self.eval(right, focus)?;
                Ok(XValue::Bool(self.boolean(&r)))
            }
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.eval(left, focus)?;
                let r = self.eval(right, focus)?;
                Ok(XValue::Bool(self.compare(op, &l, &r)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.number(&self.eval(left, focus)?);
                let r = self.number(&self.eval(right, focus)?);
                Ok(XValue::Num(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &XValue, right: &XValue) -> bool {
        match (left, right) {
            (XValue::Nodes(a), XValue::Nodes(b)) => a.iter().any(|x| {
                let sx = XValue::Str(self.node_string(*x));
                b.iter()
                    .any(|y| compare_atoms(op, &sx, &XValue::Str(self.node_string(*y))))
            }),
            (XValue::Nodes(a), XValue::Bool(_)) => {
                compare_atoms(op, &XValue::Bool(!a.is_empty()), right)
            }
            (XValue::Bool(_), XValue::Nodes(b)) => {
                compare_atoms(op, left, &XValue::Bool(!b.is_empty()))
            }
            (XValue::Nodes(a), atom) => a
                .iter()
                .any(|x| compare_atoms(op, &self.atomize(*x, atom), atom)),
            (atom, XValue::Nodes(b)) => b
                .iter()
                .any(|y| compare_atoms(op, atom, &self.atomize(*y, atom))),
            _ => compare_atoms(op, left, right),
        }
    }

    /// Converts a node to the type of `like` for comparison.
    fn atomize(&self, node: XNode, like: &XValue) -> XValue {
        let text = self.node_string(node);
        match like {
            XValue::Num(_) => XValue::Num(parse_number(&text)),
            _ => XValue::Str(text),
        }
    }

    pub(crate) fn node_string(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self.doc.string_value(id),
            XNode::Attr(owner, index) => self
                .doc
                .attributes(owner)
                .get(index)
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn string(&self, value: &XValue) -> String {
        match value {
            XValue::Nodes(nodes) => nodes
                .first()
                .map(|node| self.node_string(*node))
                .unwrap_or_default(),
            XValue::Str(text) => text.clone(),
            XValue::Num(n) => format_number(*n),
            XValue::Bool(b) => b.to_string(),
        }
    }

    pub(crate) fn number(&self, value: &XValue) -> f64 {
        match value {
            XValue::Num(n) => *n,
            XValue::Bool(b) => f64::from(u8::from(*b)),
            other => parse_number(&self.string(other)),
        }
    }

    pub(crate) fn boolean(&self, value: &XValue) -> bool {
        to_boolean(value)
    }

    fn node_name(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self.doc.name(id).unwrap_or_default().to_string(),
            XNode::Attr(owner, index) => self
                .doc
                .attributes(owner)
                .get(index)
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
        }
    }

    fn function(&self, name: &str, args: &[Expr], focus: Focus) -> Result<XValue, XPathError> {
        let arity = |min: usize, max: usize| -> Result<(), XPathError> {
            if args.len() < min || args.len() > max {
                return Err(XPathError::Eval(format!(
                    "{name}() takes {min}..={max} arguments, got {}",
                    args.len()
                )));
            }
            Ok(())
        };
        let arg = |index: usize| self.eval(&args[index], focus);
        let string_arg = |index: usize| -> Result<String, XPathError> {
            if args.len() > index {
                Ok(self.string(&arg(index)?))
            } else {
                Ok(self.node_string(focus.node))
            }
        };
        let node_arg = || -> Result<Option<XNode>, XPathError> {
            if args.is_empty() {
                return Ok(Some(focus.node));
            }
            match arg(0)? {
                XValue::Nodes(nodes) => Ok(self.document_order(nodes).first().copied()),
                _ => Err(XPathError::Eval(format!("{name}() needs a node-set"))),
            }
        };

        let value = match name {
            "last" => {
                arity(0, 0)?;
                XValue::Num(focus.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                XValue::Num(focus.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                match arg(0)? {
                    XValue::Nodes(nodes) => XValue::Num(nodes.len() as f64),
                    _ => return Err(XPathError::Eval("count() needs a node-set".to_string())),
                }
            }
            "sum" => {
                arity(1, 1)?;
                match arg(0)? {
                    XValue::Nodes(nodes) => XValue::Num(
                        nodes
                            .iter()
                            .map(|node| parse_number(&self.node_string(*node)))
                            .sum(),
                    ),
                    _ => return Err(XPathError::Eval("sum() needs a node-set".to_string())),
                }
            }
            "string" => {
                arity(0, 1)?;
                XValue::Str(string_arg(0)?)
            }
            "concat" => {
                if args.len() < 2 {
                    return Err(XPathError::Eval("concat() takes at least 2 arguments".to_string()));
                }
                let mut out = String::new();
                for index in 0..args.len() {
                    out.push_str(&string_arg(index)?);
                }
                XValue::Str(out)
            }
            "contains" => {
                arity(2, 2)?;
                XValue::Bool(string_arg(0)?.contains(&string_arg(1)?))
            }
            "starts-with" => {
                arity(2, 2)?;
                XValue::Bool(string_arg(0)?.starts_with(&string_arg(1)?))
            }
            "ends-with" => {
                arity(2, 2)?;
                XValue::Bool(string_arg(0)?.ends_with(&string_arg(1)?))
            }
            "substring-before" => {
                arity(2, 2)?;
                let haystack = string_arg(0)?;
                let needle = string_arg(1)?;
                XValue::Str(
                    haystack
                        .find(&needle)
                        .map(|at| haystack[..at].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring-after" => {
                arity(2, 2)?;
                let haystack = string_arg(0)?;
                let needle = string_arg(1)?;
                XValue::Str(
                    haystack
                        .find(&needle)
                        .map(|at| haystack[at + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                arity(2, 3)?;
                let text = string_arg(0)?;
                let start = self.number(&arg(1)?);
                let length = if args.len() == 3 {
                    Some(self.number(&arg(2)?))
                } else {
                    None
                };
                XValue::Str(substring(&text, start, length))
            }
            "string-length" => {
                arity(0, 1)?;
                XValue::Num(string_arg(0)?.chars().count() as f64)
            }
            "normalize-space" => {
                arity(0, 1)?;
                XValue::Str(string_arg(0)?.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "translate" => {
                arity(3, 3)?;
                let text = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                XValue::Str(
                    text.chars()
                        .filter_map(|c| match from.iter().position(|&f| f == c) {
                            Some(index) => to.get(index).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "lower-case" => {
                arity(1, 1)?;
                XValue::Str(string_arg(0)?.to_lowercase())
            }
            "upper-case" => {
                arity(1, 1)?;
                XValue::Str(string_arg(0)?.to_uppercase())
            }
            "not" => {
                arity(1, 1)?;
                XValue::Bool(!self.boolean(&arg(0)?))
            }
            "true" => {
                arity(0, 0)?;
                XValue::Bool(true)
            }
            "false" => {
                arity(0, 0)?;
                XValue::Bool(false)
            }
            "boolean" => {
                arity(1, 1)?;
                XValue::Bool(self.boolean(&arg(0)?))
            }
            "number" => {
                arity(0, 1)?;
                if args.is_empty() {
                    XValue::Num(parse_number(&self.node_string(focus.node)))
                } else {
                    XValue::Num(self.number(&arg(0)?))
                }
            }
            "floor" => {
                arity(1, 1)?;
                XValue::Num(self.number(&arg(0)?).floor())
            }
            "ceiling" => {
                arity(1, 1)?;
                XValue::Num(self.number(&arg(0)?).ceil())
            }
            "round" => {
                arity(1, 1)?;
                let n = self.number(&arg(0)?);
                XValue::Num((n + 0.5).floor())
            }
            "name" => {
                arity(0, 1)?;
                XValue::Str(node_arg()?.map(|node| self.node_name(node)).unwrap_or_default())
            }
            "local-name" => {
                arity(0, 1)?;
                let qualified = node_arg()?.map(|node| self.node_name(node)).unwrap_or_default();
                let local = qualified
                    .rsplit_once(':')
                    .map_or(qualified.as_str(), |(_, local)| local);
                XValue::Str(local.to_string())
            }
            other => return Err(XPathError::Eval(format!("unknown function '{other}'"))),
        };
        Ok(value)
    }
}

fn has_prefix(name: &str, prefix: &str) -> bool {
    name.split_once(':').is_some_and(|(p, _)| p == prefix)
}

pub(crate) fn to_boolean(value: &XValue) -> bool {
    match value {
        XValue::Nodes(nodes) => !nodes.is_empty(),
        XValue::Str(text) => !text.is_empty(),
        XValue::Num(n) => *n != 0.0 && !n.is_nan(),
        XValue::Bool(b) => *b,
    }
}

fn to_number_atom(value: &XValue) -> f64 {
    match value {
        XValue::Num(n) => *n,
        XValue::Bool(b) => f64::from(u8::from(*b)),
        XValue::Str(text) => parse_number(text),
        XValue::Nodes(_) => f64::NAN,
    }
}

#[allow(clippy::float_cmp)]
fn compare_atoms(op: BinaryOp, left: &XValue, right: &XValue) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Neq => {
            let equal = match (left, right) {
                (XValue::Bool(_), _) | (_, XValue::Bool(_)) => to_boolean(left) == to_boolean(right),
                (XValue::Num(_), _) | (_, XValue::Num(_)) => {
                    to_number_atom(left) == to_number_atom(right)
                }
                (XValue::Str(a), XValue::Str(b)) => a == b,
                _ => false,
            };
            if op == BinaryOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (l, r) = (to_number_atom(left), to_number_atom(right));
            match op {
                BinaryOp::Lt => l < r,
                BinaryOp::Le => l <= r,
                BinaryOp::Gt => l > r,
                _ => l >= r,
            }
        }
    }
}

/// Parses an XPath number: optional minus, digits with at most one dot.
pub(crate) fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = n as i64;
        whole.to_string()
    } else {
        n.to_string()
    }
}

fn substring(text: &str, start: f64, length: Option<f64>) -> String {
    let first = (start + 0.5).floor();
    let last = length.map_or(f64::INFINITY, |len| first + (len + 0.5).floor());
    text.chars()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= first && position < last
        })
        .map(|(_, c)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number("-1.5"), -1.5);
        assert!(parse_number("1e5").is_nan());
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("").is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_substring_rounding() {
        assert_eq!(substring("12345", 2.0, Some(3.0)), "234");
        assert_eq!(substring("12345", 1.5, Some(2.6)), "234");
        assert_eq!(substring("12345", 0.0, Some(3.0)), "12");
        assert_eq!(substring("12345", 4.0, None), "45");
    }

    #[test]
    fn test_compare_atoms() {
        let one = XValue::Num(1.0);
        let text = XValue::Str("1".to_string());
        assert!(compare_atoms(BinaryOp::Eq, &one, &text));
        assert!(compare_atoms(BinaryOp::Lt, &text, &XValue::Num(2.0)));
        assert!(compare_atoms(BinaryOp::Neq, &XValue::Bool(true), &XValue::Str(String::new())));
    }
}
