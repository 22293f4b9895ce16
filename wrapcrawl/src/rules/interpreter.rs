//! The recursive rule evaluator.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::{Operator, PropertyBag, RuleNode, Value};
use crate::errors::ParseFault;
use crate::markup::{CleanMode, Cleaner, NodeRef};
use crate::xpath::XPath;

/// Where a rule is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// Positioned at a tree node.
    Node(NodeRef),
    /// Positioned at a string.
    Text(String),
}

impl Context {
    /// Returns the context as a value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Node(node) => Value::Node(node.clone()),
            Self::Text(text) => Value::Scalar(text.clone()),
        }
    }

    /// The value returned when a rule cannot apply: the string itself in a
    /// string context, `Null` in a node context.
    fn fallback(&self) -> Value {
        match self {
            Self::Node(_) => Value::Null,
            Self::Text(text) => Value::Scalar(text.clone()),
        }
    }
}

/// Evaluates rule trees against a context.
///
/// XPath and regex failures are logged and become `Null`. The only error
/// that escapes is a [`ParseFault`], raised when `iterate` or `verify` get a
/// string that cannot be re-parsed as a tree.
pub struct Interpreter<'a> {
    bag: &'a mut PropertyBag,
    base_url: Option<Url>,
    cleaner: Cleaner,
}

impl<'a> Interpreter<'a> {
    /// Creates an interpreter writing to `bag`.
    pub fn new(bag: &'a mut PropertyBag) -> Self {
        Self {
            bag,
            base_url: None,
            cleaner: Cleaner::new(),
        }
    }

    /// Sets the base URL used by `url` rules.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Evaluates a sequence of sibling rules.
    ///
    /// A leading `find`/`findone` groups its same-tag siblings. Otherwise
    /// every rule is evaluated in order against the same context and the
    /// last result is returned; earlier rules contribute through the
    /// property bag. A failing `verify` ends the sequence with Null. An
    /// empty sequence returns the context.
    ///
    /// # Errors
    ///
    /// Propagates [`ParseFault`].
    pub fn evaluate_all(
        &mut self,
        context: &Context,
        rules: &[RuleNode],
    ) -> Result<Value, ParseFault> {
        if let Some(group) = leading_group(rules) {
            return self.find_group(context, &group);
        }
        let mut result = context.to_value();
        for rule in rules {
            result = self.evaluate(context, rule)?;
            if result.is_null() && rule.operator() == Operator::Verify {
                debug!("Guard failed, skipping remaining rules");
                return Ok(Value::Null);
            }
        }
        Ok(result)
    }

    /// Evaluates one rule.
    ///
    /// # Errors
    ///
    /// Propagates [`ParseFault`].
    pub fn evaluate(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        debug!(operator = %rule.operator(), "Evaluating rule");
        match rule.operator() {
            Operator::Context => self.context(context, rule),
            Operator::Verify => self.verify(context, rule),
            Operator::Expect => self.expect_alone(context, rule),
            Operator::Extract => self.extract(context, rule),
            Operator::Property => self.property(context, rule),
            Operator::Iterate => self.iterate(context, rule),
            Operator::Collect => self.collect(context, rule),
            Operator::Concat => self.concat(context, rule),
            Operator::Text => self.text(context, rule),
            Operator::Url => Ok(self.url(context, rule)),
            Operator::Substitute => self.substitute(context, rule),
            Operator::Split => self.split(context, rule),
            Operator::Find | Operator::FindOne => self.find_group(context, &[rule]),
        }
    }

    /// Continues the string chain with the first child, or returns the
    /// string when there are no children.
    fn chain(&mut self, text: String, children: &[RuleNode]) -> Result<Value, ParseFault> {
        let context = Context::Text(text);
        if let Some(group) = leading_group(children) {
            return self.find_group(&context, &group);
        }
        match children.first() {
            Some(child) => self.evaluate(&context, child),
            None => Ok(context.to_value()),
        }
    }

    /// Reads an attribute, resolving `$name` references from the bag.
    fn attr(&self, rule: &RuleNode, name: &str) -> Option<String> {
        rule.attribute(name).and_then(|raw| self.bag.resolve(raw))
    }

    fn compile_xpath(&self, rule: &RuleNode) -> Option<XPath> {
        let Some(source) = self.attr(rule, "xpath") else {
            warn!(operator = %rule.operator(), "Rule has no xpath");
            return None;
        };
        match XPath::compile(&source) {
            Ok(xpath) => Some(xpath),
            Err(err) => {
                warn!(operator = %rule.operator(), error = %err, "Invalid xpath");
                None
            }
        }
    }

    fn compile_regex(&self, rule: &RuleNode, attribute: &str) -> Option<Regex> {
        let Some(pattern) = self.attr(rule, attribute) else {
            warn!(operator = %rule.operator(), attribute, "Rule has no pattern");
            return None;
        };
        match Regex::new(&pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(operator = %rule.operator(), pattern = %pattern, error = %err, "Invalid regex");
                None
            }
        }
    }

    /// Returns the context node, re-parsing a string context as a tree.
    fn tree_context(&self, context: &Context, op: Operator) -> Result<NodeRef, ParseFault> {
        match context {
            Context::Node(node) => Ok(node.clone()),
            Context::Text(text) => {
                let doc = self
                    .cleaner
                    .parse(text, CleanMode::Html, &[])
                    .map_err(|err| ParseFault::new(op.as_str(), err.to_string()))?;
                Ok(NodeRef::root(Arc::new(doc)))
            }
        }
    }

    fn context(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        match context {
            Context::Node(node) => debug!(node = ?node, "Rule context"),
            Context::Text(text) => debug!(text = %text, "Rule context"),
        }
        match rule.children().first() {
            Some(child) => self.evaluate(context, child),
            None => Ok(context.to_value()),
        }
    }

    fn verify(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let node = self.tree_context(context, Operator::Verify)?;
        let tree = Context::Node(node.clone());

        for check in rule
            .children()
            .iter()
            .filter(|child| child.operator() == Operator::Expect)
        {
            if !self.expectation_holds(&tree, &node, check)? {
                debug!("Verification failed");
                return Ok(Value::Null);
            }
        }

        match rule
            .children()
            .iter()
            .find(|child| child.operator() != Operator::Expect)
        {
            Some(next) => self.evaluate(&tree, next),
            None => Ok(Value::Node(node)),
        }
    }

    fn expectation_holds(
        &mut self,
        tree: &Context,
        node: &NodeRef,
        check: &RuleNode,
    ) -> Result<bool, ParseFault> {
        let Some(regex) = self.compile_regex(check, "regex") else {
            return Ok(false);
        };
        let subject = match check.children().first() {
            Some(child) => self.evaluate(tree, child)?.as_text().unwrap_or_default(),
            None => node.text_content(),
        };
        Ok(regex.is_match(&subject))
    }

    fn expect_alone(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        match context {
            Context::Text(text) => {
                let holds = self
                    .compile_regex(rule, "regex")
                    .is_some_and(|regex| regex.is_match(text));
                Ok(if holds { context.to_value() } else { Value::Null })
            }
            Context::Node(node) => {
                if self.expectation_holds(context, node, rule)? {
                    Ok(context.to_value())
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    fn extract(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        if matches!(context, Context::Text(_)) {
            return Ok(context.fallback());
        }

        let mut map = BTreeMap::new();
        for child in rule.children() {
            if let Some(key) = self.attr(child, "key") {
                let value = self.evaluate(context, child)?;
                if !value.is_null() {
                    map.insert(key, value);
                }
                continue;
            }

            let value = self.evaluate(context, child)?;
            match value {
                Value::Null if child.operator() == Operator::Verify => {
                    debug!("Guard failed, dropping extracted group");
                    return Ok(Value::Null);
                }
                Value::Map(entries) => map.extend(entries),
                _ => {}
            }
        }

        Ok(if map.is_empty() {
            Value::Null
        } else {
            Value::Map(map)
        })
    }

    fn property(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        if matches!(context, Context::Text(_)) {
            return Ok(context.fallback());
        }

        let mut result = None;
        for child in rule.children() {
            match self.attr(child, "name") {
                Some(name) => {
                    let value = self.evaluate(context, child)?;
                    debug!(property = %name, kind = value.type_name(), "Setting property");
                    self.bag.set(name, value);
                }
                None if result.is_none() => {
                    let value = self.evaluate(context, child)?;
                    if value.is_null() && child.operator() == Operator::Verify {
                        debug!("Guard failed, skipping property assignments");
                        return Ok(Value::Null);
                    }
                    result = Some(value);
                }
                None => {}
            }
        }
        Ok(result.unwrap_or_else(|| context.to_value()))
    }

    fn iterate(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let node = self.tree_context(context, Operator::Iterate)?;
        let Some(xpath) = self.compile_xpath(rule) else {
            return Ok(Value::Null);
        };
        let items = match xpath.select(&node) {
            Ok(items) => items,
            Err(err) => {
                warn!(xpath = %xpath, error = %err, "Iteration query failed");
                return Ok(Value::Null);
            }
        };
        debug!(xpath = %xpath, count = items.len(), "Iterating");

        let mut results = Vec::new();
        for item in items {
            let item = Context::Node(item.standalone());
            let value = match rule.children().first() {
                Some(child) => self.evaluate(&item, child)?,
                None => item.to_value(),
            };
            if !value.is_null() {
                results.push(value);
            }
        }

        Ok(if results.is_empty() {
            Value::Null
        } else {
            Value::List(results)
        })
    }

    fn collect(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let Some(source) = rule.children().first() else {
            return Ok(context.fallback());
        };
        let separator = self.attr(rule, "separator").unwrap_or_else(|| " ".to_string());

        let items = match self.evaluate(context, source)? {
            Value::Null => return Ok(Value::Null),
            Value::List(items) => items,
            single => vec![single],
        };
        let joined = items
            .iter()
            .filter_map(Value::as_text)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(&separator);

        if joined.is_empty() {
            return Ok(Value::Null);
        }
        self.chain(joined, &rule.children()[1..])
    }

    fn concat(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let Context::Node(node) = context else {
            return Ok(context.fallback());
        };

        let target = if rule.attribute("xpath").is_some() {
            let Some(xpath) = self.compile_xpath(rule) else {
                return Ok(Value::Null);
            };
            match xpath.select(node) {
                Ok(nodes) => match nodes.into_iter().next() {
                    Some(first) => first,
                    None => return Ok(Value::Null),
                },
                Err(err) => {
                    warn!(xpath = %xpath, error = %err, "Concat query failed");
                    return Ok(Value::Null);
                }
            }
        } else {
            node.clone()
        };

        let text = target.text_content().trim().to_string();
        self.chain(text, rule.children())
    }

    fn text(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let Context::Node(node) = context else {
            return Ok(context.fallback());
        };
        let Some(xpath) = self.compile_xpath(rule) else {
            return Ok(Value::Null);
        };
        let text = match xpath.evaluate_string(node) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(xpath = %xpath, error = %err, "Text query failed");
                return Ok(Value::Null);
            }
        };
        if text.is_empty() {
            return Ok(Value::Null);
        }
        self.chain(text, rule.children())
    }

    fn url(&self, context: &Context, rule: &RuleNode) -> Value {
        let Context::Node(node) = context else {
            return context.fallback();
        };
        let Some(xpath) = self.compile_xpath(rule) else {
            return Value::Null;
        };
        let raw = match xpath.evaluate_string(node) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(xpath = %xpath, error = %err, "Url query failed");
                return Value::Null;
            }
        };
        if raw.is_empty() {
            return Value::Null;
        }

        let resolved = match &self.base_url {
            Some(base) => base.join(&raw),
            None => Url::parse(&raw),
        };
        match resolved {
            Ok(url) => Value::Url(url),
            Err(err) => {
                debug!(url = %raw, error = %err, "Unresolvable url");
                Value::Null
            }
        }
    }

    fn substitute(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let Context::Text(text) = context else {
            return Ok(context.fallback());
        };
        let Some(regex) = self.compile_regex(rule, "pattern") else {
            return Ok(Value::Null);
        };
        let replacement = self.attr(rule, "replacewith").unwrap_or_default();
        let replaced = regex.replace_all(text, replacement.as_str()).into_owned();
        self.chain(replaced, rule.children())
    }

    fn split(&mut self, context: &Context, rule: &RuleNode) -> Result<Value, ParseFault> {
        let Context::Text(text) = context else {
            return Ok(context.fallback());
        };

        let tokens: Vec<String> = match self.attr(rule, "delimiter") {
            Some(delimiters) if !delimiters.is_empty() => text
                .split(|c: char| delimiters.contains(c))
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect(),
            _ => text.split_whitespace().map(str::to_string).collect(),
        };

        let mut items = Vec::new();
        for token in tokens {
            let value = match rule.children().first() {
                Some(child) => self.evaluate(&Context::Text(token), child)?,
                None => Value::Scalar(token),
            };
            if !value.is_null() {
                items.push(value);
            }
        }

        Ok(if items.is_empty() {
            Value::Null
        } else {
            Value::List(items)
        })
    }

    /// Evaluates a group of sibling `find` or `findone` rules.
    fn find_group(&mut self, context: &Context, group: &[&RuleNode]) -> Result<Value, ParseFault> {
        let Context::Text(text) = context else {
            return Ok(context.fallback());
        };

        let keyed = group
            .first()
            .is_some_and(|rule| rule.operator() == Operator::Find);
        let mut map = BTreeMap::new();
        let mut last = Value::Null;

        for &rule in group {
            let Some(regex) = self.compile_regex(rule, "pattern") else {
                continue;
            };
            let Some(captures) = regex.captures(text) else {
                continue;
            };
            let Some(matched) = captures.get(1).or_else(|| captures.get(0)) else {
                continue;
            };
            let matched = matched.as_str().to_string();

            let value = match rule.children().first() {
                Some(child) => self.evaluate(&Context::Text(matched), child)?,
                None => Value::Scalar(matched),
            };
            if value.is_null() {
                continue;
            }

            if keyed {
                match self.attr(rule, "key") {
                    Some(key) => {
                        map.entry(key).or_insert(value);
                    }
                    None => debug!("Find rule without key"),
                }
            } else {
                last = value;
            }
        }

        if keyed {
            Ok(if map.is_empty() {
                Value::Null
            } else {
                Value::Map(map)
            })
        } else {
            Ok(last)
        }
    }
}

/// When the first rule is a `find` or `findone`, returns it with all its
/// same-tag siblings.
fn leading_group(rules: &[RuleNode]) -> Option<Vec<&RuleNode>> {
    let first = rules.first()?.operator();
    if !matches!(first, Operator::Find | Operator::FindOne) {
        return None;
    }
    Some(rules.iter().filter(|rule| rule.operator() == first).collect())
}
