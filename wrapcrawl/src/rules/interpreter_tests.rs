use std::collections::BTreeMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use url::Url;

use super::*;
use crate::errors::ParseFault;
use crate::markup::{CleanMode, Cleaner, NodeRef};

fn node(markup: &str) -> Context {
    let doc = Cleaner::new().parse(markup, CleanMode::Html, &[]).unwrap();
    Context::Node(NodeRef::root(Arc::new(doc)))
}

fn text(value: &str) -> Context {
    Context::Text(value.to_string())
}

fn run(context: &Context, rule: &str) -> Value {
    let rule = RuleNode::from_xml(rule).unwrap();
    let mut bag = PropertyBag::new();
    Interpreter::new(&mut bag).evaluate(context, &rule).unwrap()
}

fn scalars(items: &[&str]) -> Value {
    Value::List(items.iter().map(|item| Value::from(*item)).collect())
}

fn map(entries: &[(&str, Value)]) -> Value {
    Value::Map(
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

const ROWS: &str = r#"
<table>
  <tr><td class="t">Graph Mining</td><td class="a">Ada; Bob</td><td>2004</td></tr>
  <tr><td class="t">Untitled</td><td class="a"></td><td>n/a</td></tr>
  <tr><td class="t">Stream Joins</td><td class="a">Cy</td><td>1999</td></tr>
</table>
"#;

#[test]
fn test_verify_mismatch_aborts_group() {
    let context = node(ROWS);
    let value = run(
        &context,
        r#"<iterate xpath="//tr">
             <extract>
               <verify><expect regex="^\d{4}$"><text xpath="td[3]"/></expect></verify>
               <text key="title" xpath="td[1]"/>
             </extract>
           </iterate>"#,
    );

    assert_eq!(
        value,
        Value::List(vec![
            map(&[("title", Value::from("Graph Mining"))]),
            map(&[("title", Value::from("Stream Joins"))]),
        ])
    );
}

#[test]
fn test_verify_passes_node_through() {
    let context = node("<p>Volume 12</p>");
    let value = run(&context, r#"<verify><expect regex="Volume \d+"/></verify>"#);
    assert!(matches!(value, Value::Node(_)));

    let value = run(
        &context,
        r#"<verify><expect regex="Volume"/><text xpath="//p"/></verify>"#,
    );
    assert_eq!(value, Value::from("Volume 12"));

    let value = run(&context, r#"<verify><expect regex="Issue"/><text xpath="//p"/></verify>"#);
    assert_eq!(value, Value::Null);
}

#[test]
fn test_split_drops_empty_tokens() {
    let value = run(&text("a,b,,c"), r#"<split delimiter=","/>"#);
    assert_eq!(value, scalars(&["a", "b", "c"]));

    let value = run(&text("  x \n y "), "<split/>");
    assert_eq!(value, scalars(&["x", "y"]));

    assert_eq!(run(&text(",,"), r#"<split delimiter=","/>"#), Value::Null);
}

#[test]
fn test_split_delimiter_characters_are_alternatives() {
    let value = run(&text("Ada; Bob,Cy"), r#"<split delimiter=";,"/>"#);
    assert_eq!(value, scalars(&["Ada", " Bob", "Cy"]));
}

#[test]
fn test_substitute_replaces_all() {
    let value = run(
        &text("abc123def456"),
        r##"<substitute pattern="[0-9]+" replacewith="#"/>"##,
    );
    assert_eq!(value, Value::from("abc#def#"));

    let value = run(&text("a-b"), r#"<substitute pattern="-"/>"#);
    assert_eq!(value, Value::from("ab"));
}

#[test]
fn test_collect_over_split_round_trips() {
    let value = run(
        &text("x y z"),
        r#"<collect separator=" "><split delimiter=" "/></collect>"#,
    );
    assert_eq!(value, Value::from("x y z"));
}

#[test]
fn test_collect_default_separator_and_chain() {
    let context = node("<ul><li> a </li><li></li><li>b</li></ul>");
    let value = run(
        &context,
        r#"<collect>
             <iterate xpath="//li"><concat/></iterate>
             <substitute pattern=" " replacewith="+"/>
           </collect>"#,
    );
    assert_eq!(value, Value::from("a+b"));
}

#[test]
fn test_concat_flattens_in_document_order() {
    let context = node("<a>Foo<b>Bar</b>Baz</a>");
    assert_eq!(run(&context, "<concat/>"), Value::from("FooBarBaz"));
    assert_eq!(run(&context, r#"<concat xpath="//b"/>"#), Value::from("Bar"));
    assert_eq!(run(&context, r#"<concat xpath="//i"/>"#), Value::Null);
}

#[test]
fn test_text_trims_and_nulls_empty() {
    let context = node(ROWS);
    assert_eq!(
        run(&context, r#"<text xpath="//tr[1]/td[3]"/>"#),
        Value::from("2004")
    );
    assert_eq!(run(&context, r#"<text xpath="//tr[2]/td[2]"/>"#), Value::Null);
}

#[test]
fn test_find_keeps_first_and_findone_keeps_last() {
    let context = text("pages 10-20, year 2001, year 2003");

    let value = run(
        &context,
        r#"<substitute pattern="," replacewith="">
             <find key="year" pattern="year (\d+)"/>
             <find key="first" pattern="\d+"/>
             <find key="none" pattern="volume"/>
           </substitute>"#,
    );
    assert_eq!(
        value,
        map(&[("first", Value::from("10")), ("year", Value::from("2001"))])
    );

    let value = run(
        &context,
        r#"<context>
             <substitute pattern="pages ">
               <findone pattern="(\d+)-"/>
               <findone pattern="year (\d+)"/>
               <findone pattern="volume (\d+)"/>
             </substitute>
           </context>"#,
    );
    assert_eq!(value, Value::from("2001"));
}

#[test]
fn test_find_child_continues_chain() {
    let value = run(
        &text("Authors: Ada, Bob"),
        r#"<find key="authors" pattern="Authors: (.*)"><split delimiter=", "/></find>"#,
    );
    assert_eq!(value, map(&[("authors", scalars(&["Ada", "Bob"]))]));
}

#[test]
fn test_extract_merges_keyless_maps_and_drops_null() {
    let context = node(ROWS);
    let value = run(
        &context,
        r#"<extract>
             <text key="title" xpath="//tr[1]/td[1]"/>
             <text key="missing" xpath="//tr[2]/td[2]"/>
             <text xpath="//tr[1]/td[3]"><find key="year" pattern="\d{4}"/></text>
           </extract>"#,
    );
    assert_eq!(
        value,
        map(&[
            ("title", Value::from("Graph Mining")),
            ("year", Value::from("2004")),
        ])
    );
}

#[test]
fn test_property_writes_bag_and_passes_through() {
    let rule = RuleNode::from_xml(
        r#"<property>
             <url name="nextpage" xpath="//a[@class='next']/@href"/>
             <text name="gone" xpath="//missing"/>
             <text xpath="//h1"/>
           </property>"#,
    )
    .unwrap();
    let context = node(r#"<h1>Results</h1><a class="next" href="?p=2">more</a>"#);

    let mut bag = PropertyBag::new();
    bag.set("gone", "stale");
    let base = Url::parse("http://lib.example.org/search?p=1").unwrap();
    let value = Interpreter::new(&mut bag)
        .with_base_url(Some(base))
        .evaluate(&context, &rule)
        .unwrap();

    assert_eq!(value, Value::from("Results"));
    assert_eq!(
        bag.get("nextpage").and_then(Value::as_text).as_deref(),
        Some("http://lib.example.org/search?p=2")
    );
    assert!(!bag.contains("gone"));
}

#[test]
fn test_attribute_references_resolve_from_bag() {
    let rule = RuleNode::from_xml(r#"<text xpath="$titlePath"/>"#).unwrap();
    let context = node(ROWS);

    let mut bag = PropertyBag::new();
    bag.set("titlePath", "//tr[3]/td[1]");
    let value = Interpreter::new(&mut bag).evaluate(&context, &rule).unwrap();
    assert_eq!(value, Value::from("Stream Joins"));

    let mut empty = PropertyBag::new();
    let value = Interpreter::new(&mut empty).evaluate(&context, &rule).unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn test_url_resolution() {
    let context = node(r#"<a href="../doc?id=7">x</a><a href="">y</a>"#);
    let rule = RuleNode::from_xml(r#"<url xpath="//a[1]/@href"/>"#).unwrap();
    let mut bag = PropertyBag::new();

    let value = Interpreter::new(&mut bag)
        .with_base_url(Url::parse("http://lib.example.org/a/b/list").ok())
        .evaluate(&context, &rule)
        .unwrap();
    assert_eq!(
        value.as_url().unwrap().as_str(),
        "http://lib.example.org/a/doc?id=7"
    );

    // relative with no base cannot be resolved
    let value = Interpreter::new(&mut bag).evaluate(&context, &rule).unwrap();
    assert_eq!(value, Value::Null);

    assert_eq!(run(&context, r#"<url xpath="//a[2]/@href"/>"#), Value::Null);
}

#[test]
fn test_iterate_reroots_items() {
    let context = node(ROWS);
    let value = run(
        &context,
        r#"<iterate xpath="//tr"><text xpath="count(//td)"/></iterate>"#,
    );
    assert_eq!(value, scalars(&["3", "3", "3"]));

    assert_eq!(run(&context, r#"<iterate xpath="//li"><concat/></iterate>"#), Value::Null);
}

#[test]
fn test_iterate_reparses_string_context() {
    let value = run(
        &text("<ul><li>a</li><li>b</li></ul>"),
        r#"<iterate xpath="//li"><concat/></iterate>"#,
    );
    assert_eq!(value, scalars(&["a", "b"]));
}

#[test]
fn test_reparse_failure_is_a_parse_fault() {
    let rule = RuleNode::from_xml(r#"<iterate xpath="//li"/>"#).unwrap();
    let mut bag = PropertyBag::new();
    let err = Interpreter::new(&mut bag)
        .evaluate(&text("   "), &rule)
        .unwrap_err();
    assert_eq!(err, ParseFault::new("iterate", "Empty markup input"));
}

#[test]
fn test_xpath_and_regex_errors_become_null() {
    let context = node(ROWS);
    assert_eq!(run(&context, r#"<text xpath="//tr["/>"#), Value::Null);
    assert_eq!(run(&text("abc"), r#"<substitute pattern="(("/>"#), Value::Null);
    assert_eq!(run(&context, r#"<iterate xpath="count(//tr)"/>"#), Value::Null);
}

#[test]
fn test_context_fallbacks() {
    // string-only operators in node context
    assert_eq!(run(&node("<p>x</p>"), r#"<split/>"#), Value::Null);
    assert_eq!(run(&node("<p>x</p>"), r#"<find key="k" pattern="x"/>"#), Value::Null);

    // node-only operators in string context
    assert_eq!(run(&text("raw"), r#"<text xpath="//p"/>"#), Value::from("raw"));
    assert_eq!(run(&text("raw"), "<extract/>"), Value::from("raw"));
}

#[test]
fn test_context_operator_is_identity() {
    assert_eq!(run(&text("abc"), "<context/>"), Value::from("abc"));
    assert_eq!(
        run(&text("a b"), "<context><split/></context>"),
        scalars(&["a", "b"])
    );
}

#[test]
fn test_evaluate_all_returns_last_and_keeps_properties() {
    let rules = vec![
        RuleNode::from_xml(r#"<property><text name="total" xpath="count(//tr)"/></property>"#)
            .unwrap(),
        RuleNode::from_xml(r#"<iterate xpath="//tr[1]"><text xpath="td[3]"/></iterate>"#)
            .unwrap(),
    ];
    let mut bag = PropertyBag::new();
    let value = Interpreter::new(&mut bag)
        .evaluate_all(&node(ROWS), &rules)
        .unwrap();

    assert_eq!(value, scalars(&["2004"]));
    assert_eq!(bag.get("total"), Some(&Value::from("3")));
}

#[test]
fn test_evaluate_all_stops_after_failed_verify() {
    let rules = vec![
        RuleNode::from_xml(r#"<verify><expect regex="NO_SUCH_TEXT"/></verify>"#).unwrap(),
        RuleNode::from_xml(r#"<property><text name="total" xpath="count(//tr)"/></property>"#)
            .unwrap(),
        RuleNode::from_xml(r#"<iterate xpath="//tr[1]"><text xpath="td[3]"/></iterate>"#)
            .unwrap(),
    ];
    let mut bag = PropertyBag::new();
    let value = Interpreter::new(&mut bag)
        .evaluate_all(&node(ROWS), &rules)
        .unwrap();

    assert_eq!(value, Value::Null);
    assert!(!bag.contains("total"));
}

#[test]
fn test_property_failed_verify_writes_nothing() {
    let rule = RuleNode::from_xml(
        r#"<property>
             <verify><expect regex="NO_SUCH_TEXT"/></verify>
             <text name="title" xpath="//tr[1]/td[1]"/>
           </property>"#,
    )
    .unwrap();
    let mut bag = PropertyBag::new();
    let value = Interpreter::new(&mut bag)
        .evaluate(&node(ROWS), &rule)
        .unwrap();

    assert_eq!(value, Value::Null);
    assert!(!bag.contains("title"));
}
