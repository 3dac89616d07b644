// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use crate::component::{BaseScope, Component, DryRunScope, Importer, MemoryImporter, Scope};
use crate::error::{ComponentError, UnrecognizedArgumentError};
use crate::html::render_html;
use crate::parser::parse;
use crate::render::ChtmlComponent;
use crate::value::{value_to_html, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

// Renders a standalone template against an empty scope.
fn render_str(src: &str) -> String {
    render_with(src, &BaseScope::empty())
}

fn render_with(src: &str, scope: &dyn Scope) -> String {
    let doc = parse(src, None).unwrap();
    let mut comp = ChtmlComponent::new(doc);
    let out = comp.render(scope).unwrap();
    render_html(&value_to_html(out))
}

// Renders a template with components registered in a memory importer.
fn render_with_components(src: &str, components: &[(&str, &str)]) -> String {
    let importer = MemoryImporter::new();
    for (name, source) in components {
        importer.add_template(name, source);
    }
    let doc = parse(src, Some(importer)).unwrap();
    let mut comp = ChtmlComponent::new(doc);
    let out = comp.render(&BaseScope::empty()).unwrap();
    render_html(&value_to_html(out))
}

fn vars(entries: &[(&str, Value)]) -> HashMap<String, Value> {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

mod control_flow {
    use super::*;

    #[test]
    fn test_if_else_renders_exactly_one_branch() {
        let src = r#"<p c:if="${x == 1}">one</p><p c:else-if="${x == 2}">two</p><p c:else>other</p>"#;
        for (x, expected) in [(1, "<p>one</p>"), (2, "<p>two</p>"), (9, "<p>other</p>")] {
            let scope = BaseScope::new(vars(&[("x", Value::Int(x))]));
            assert_eq!(render_with(src, &scope), expected, "x = {x}");
        }
    }

    #[test]
    fn test_literal_false_condition() {
        assert_eq!(
            render_str(r#"<p c:if="false">NO</p><p c:else>YES</p>"#),
            "<p>YES</p>"
        );
    }

    #[test]
    fn test_bare_expression_condition() {
        // Conditions are expressions with or without the ${…} wrapper.
        let src = r#"<p c:if="x == 1">one</p><p c:else>other</p>"#;
        let scope = BaseScope::new(vars(&[("x", Value::Int(1))]));
        assert_eq!(render_with(src, &scope), "<p>one</p>");
        let scope = BaseScope::new(vars(&[("x", Value::Int(5))]));
        assert_eq!(render_with(src, &scope), "<p>other</p>");

        let src = r#"<p c:if="user.active">in</p><p c:else>out</p>"#;
        let user = Value::Map(
            [("active".to_string(), Value::Bool(true))].into_iter().collect(),
        );
        let scope = BaseScope::new(vars(&[("user", user)]));
        assert_eq!(render_with(src, &scope), "<p>in</p>");
    }

    #[test]
    fn test_chain_survives_repeated_renders() {
        let src = r#"<p c:if="${on}">on</p><p c:else>off</p>"#;
        let doc = parse(src, None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        for (on, expected) in
            [(true, "<p>on</p>"), (false, "<p>off</p>"), (true, "<p>on</p>")]
        {
            let scope = BaseScope::new(vars(&[("on", Value::Bool(on))]));
            let out = comp.render(&scope).unwrap();
            assert_eq!(render_html(&value_to_html(out)), expected);
        }
    }

    #[test]
    fn test_for_over_empty_slice_yields_nothing() {
        let scope = BaseScope::new(vars(&[("xs", Value::Array(vec![]))]));
        assert_eq!(
            render_with(r#"<ul><li c:for="x in xs">${x}</li></ul>"#, &scope),
            "<ul></ul>"
        );
    }

    #[test]
    fn test_for_binds_item_and_index() {
        let scope = BaseScope::new(vars(&[(
            "xs",
            Value::Array(vec![
                Value::String("a".into()),
                Value::String("b".into()),
                Value::String("c".into()),
            ]),
        )]));
        assert_eq!(
            render_with(r#"<i c:for="x, i in xs">${i}:${x} </i>"#, &scope),
            "<i>0:a </i><i>1:b </i><i>2:c </i>"
        );
    }

    #[test]
    fn test_for_over_map_iterates_in_sorted_key_order() {
        let src = r#"<c var="m">${{b: 2, a: 1, c: 3}}</c><i c:for="v, k in m">${k}${v}</i>"#;
        assert_eq!(render_str(src), "<i>a1</i><i>b2</i><i>c3</i>");
    }

    #[test]
    fn test_shape_match_condition_binds_variable() {
        let src =
            r#"<p c:if="${val is string as s}">str:${s}</p><p c:else>not a string</p>"#;
        let scope = BaseScope::new(vars(&[("val", Value::String("hi".into()))]));
        assert_eq!(render_with(src, &scope), "<p>str:hi</p>");
        let scope = BaseScope::new(vars(&[("val", Value::Int(5))]));
        assert_eq!(render_with(src, &scope), "<p>not a string</p>");

        // Bare form, same semantics.
        let bare = r#"<p c:if="val is string as s">str:${s}</p><p c:else>no</p>"#;
        let scope = BaseScope::new(vars(&[("val", Value::String("hi".into()))]));
        assert_eq!(render_with(bare, &scope), "<p>str:hi</p>");
    }

    #[test]
    fn test_condition_and_loop_on_same_element() {
        let scope = BaseScope::new(vars(&[(
            "xs",
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
        )]));
        assert_eq!(
            render_with(r#"<b c:if="${len(xs) > 0}" c:for="x in xs">${x}</b>"#, &scope),
            "<b>1</b><b>2</b>"
        );
        let empty = BaseScope::new(vars(&[("xs", Value::Array(vec![]))]));
        assert_eq!(
            render_with(r#"<b c:if="${len(xs) > 0}" c:for="x in xs">${x}</b>"#, &empty),
            ""
        );
    }
}

mod interpolation {
    use super::*;

    #[test]
    fn test_adjacent_text_expressions_concatenate() {
        assert_eq!(render_str(r#"<p>${"a"}${"b"}</p>"#), "<p>ab</p>");
    }

    #[test]
    fn test_verbatim_text_without_interpolation() {
        assert_eq!(render_str("<p>plain $ text { }</p>"), "<p>plain $ text { }</p>");
    }

    #[test]
    fn test_let_sequence_in_template() {
        assert_eq!(
            render_str(r#"<p>${let n = 6; n * 7}</p>"#),
            "<p>42</p>"
        );
    }

    #[test]
    fn test_cast_in_template() {
        assert_eq!(
            render_str(r#"<p>${cast('5', number) + 1}</p>"#),
            "<p>6</p>"
        );
    }

    #[test]
    fn test_builtins_in_template() {
        assert_eq!(
            render_str(r#"<i c:for="x in sort(['b','c','a'])">${x}</i>"#),
            "<i>a</i><i>b</i><i>c</i>"
        );
        assert_eq!(
            render_str(r#"<p>${formatDuration(duration('90s'))}</p>"#),
            "<p>1m30s</p>"
        );
    }
}

mod variable_binding {
    use super::*;
    use crate::error::CastError;

    #[test]
    fn test_c_var_binds_and_emits_nothing() {
        let src = r#"<c var="v">${{data: [1, 2, 3]}}</c><p c:for="i in v.data">${i}</p>"#;
        assert_eq!(render_str(src), "<p>1</p><p>2</p><p>3</p>");
    }

    #[test]
    fn test_c_var_first_write_wins() {
        let src = r#"<c var="v">first</c><c var="v">second</c><p>${v}</p>"#;
        assert_eq!(render_str(src), "<p>first</p>");
    }

    #[test]
    fn test_c_var_cast_failure() {
        let doc = parse(r#"<c var="v" c:as="number">abc</c>${v}"#, None);
        // The dry-run validation pass already trips over the cast.
        let err = doc.unwrap_err();
        assert!(err.errors[0].is::<CastError>());
    }

    #[test]
    fn test_c_without_var_emits_children() {
        assert_eq!(render_str("<c><p>a</p><p>b</p></c>"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_c_group_with_loop() {
        let src = r#"<c c:for="x in [1, 2]"><dt>${x}</dt><dd>${x * 10}</dd></c>"#;
        assert_eq!(render_str(src), "<dt>1</dt><dd>10</dd><dt>2</dt><dd>20</dd>");
    }
}

mod components {
    use super::*;

    #[test]
    fn test_simple_page_composition() {
        let out = render_with_components(
            r#"<c:simple-page title="T">C</c:simple-page>"#,
            &[(
                "simple-page",
                r#"<c:arg name="title">NoTitle</c:arg><h1>${title}</h1><div>${_}</div>"#,
            )],
        );
        assert_eq!(out, "<h1>T</h1><div>C</div>");
    }

    #[test]
    fn test_default_argument_used_when_absent() {
        let out = render_with_components(
            r#"<c:simple-page>C</c:simple-page>"#,
            &[(
                "simple-page",
                r#"<c:arg name="title">NoTitle</c:arg><h1>${title}</h1><div>${_}</div>"#,
            )],
        );
        assert_eq!(out, "<h1>NoTitle</h1><div>C</div>");
    }

    #[test]
    fn test_html_default_reused_twice() {
        let out = render_str(
            r#"<c:arg name="content"><ul><li>Item</li></ul></c:arg>${content}<p>${content}</p>"#,
        );
        assert_eq!(out, "<ul><li>Item</li></ul><p><ul><li>Item</li></ul></p>");
    }

    #[test]
    fn test_words_loop_from_default() {
        let out = render_str(
            r#"<c:arg name="words">${['foo','bar']}</c:arg><ul><li c:for="w in words">${w}</li></ul>"#,
        );
        assert_eq!(out, "<ul><li>foo</li><li>bar</li></ul>");
    }

    #[test]
    fn test_c_attr_adds_attribute_to_enclosing_element() {
        let out = render_str(r#"<div><c:attr name="class">wide</c:attr>body</div>"#);
        assert_eq!(out, r#"<div class="wide">body</div>"#);
    }

    #[test]
    fn test_interpolated_attr_value() {
        let out = render_str(
            r#"<div><c:attr name="data-n">${20 + 3}</c:attr>x</div>"#,
        );
        assert_eq!(out, r#"<div data-n="23">x</div>"#);
    }

    #[test]
    fn test_kebab_case_attrs_snake_cased() {
        let out = render_with_components(
            r#"<c:card max-items="3"></c:card>"#,
            &[("card", r#"<c:arg name="max-items">${0}</c:arg><b>${max_items}</b>"#)],
        );
        assert_eq!(out, "<b>3</b>");
    }

    #[test]
    fn test_argument_coerced_to_declared_shape() {
        // The card declares a numeric default, so the string "3" arrives as
        // a number.
        let out = render_with_components(
            r#"<c:card count="3"></c:card>"#,
            &[("card", r#"<c:arg name="count">${0}</c:arg><b>${count + 1}</b>"#)],
        );
        assert_eq!(out, "<b>4</b>");
    }

    #[test]
    fn test_empty_string_becomes_true_for_bool_argument() {
        let out = render_with_components(
            r#"<c:card on=""></c:card>"#,
            &[("card", r#"<c:arg name="on">${false}</c:arg><b c:if="${on}">on</b>"#)],
        );
        assert_eq!(out, "<b>on</b>");
    }

    #[test]
    fn test_bad_bool_argument_raises_decode_error() {
        use crate::error::DecodeError;
        let importer = MemoryImporter::new();
        importer.add_template(
            "card",
            r#"<c:arg name="on">${false}</c:arg><b c:if="${on}">on</b>"#,
        );
        // Argument value only goes wrong at render time, via a variable.
        let doc = parse(r#"<c:card on="${mode}"></c:card>"#, Some(importer)).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        let scope = BaseScope::new(vars(&[("mode", Value::String("maybe".into()))]));
        let err = comp.render(&scope).unwrap_err();
        let decode = err.find::<DecodeError>().expect("expected DecodeError");
        assert_eq!(decode.key, "on");
    }

    #[test]
    fn test_unknown_argument_raises_unrecognized() {
        let importer = MemoryImporter::new();
        importer.add_template("card", r#"<c:arg name="title"></c:arg>${title}"#);
        let err = parse(r#"<c:card bogus="1"></c:card>"#, Some(importer)).unwrap_err();
        assert!(err.errors[0].is::<UnrecognizedArgumentError>());
    }

    #[test]
    fn test_nested_component_error_carries_component_stack() {
        let importer = MemoryImporter::new();
        importer.add_template("outer", r#"<c:inner></c:inner>"#);
        importer.add_template("inner", r#"<p c:for="x in 'notalist'">${x}</p>"#);
        let err = parse(r#"<c:outer></c:outer>"#, Some(importer)).unwrap_err();
        // inner's parse failure surfaces through outer's import.
        let msg = err.to_string();
        assert!(msg.contains("c:for expression"), "unexpected message: {msg}");
    }

    #[test]
    fn test_component_default_from_component_child() {
        let importer = MemoryImporter::new();
        importer.add_template("badge", r#"<span class="badge">new</span>"#);
        importer.add_template(
            "page",
            r#"<c:arg name="mark"><c:badge></c:badge></c:arg><p>${mark}</p>"#,
        );
        let doc = parse(r#"<c:page></c:page>"#, Some(importer)).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        let out = comp.render(&BaseScope::empty()).unwrap();
        assert_eq!(
            render_html(&value_to_html(out)),
            r#"<p><span class="badge">new</span></p>"#
        );
    }
}

mod lifecycle {
    use super::*;

    #[derive(Default)]
    struct Counters {
        imports: usize,
        renders: usize,
        disposes: usize,
    }

    struct CountingComponent {
        counters: Rc<RefCell<Counters>>,
    }

    impl Component for CountingComponent {
        fn render(&mut self, _scope: &dyn Scope) -> Result<Value, ComponentError> {
            self.counters.borrow_mut().renders += 1;
            Ok(Value::String("x".into()))
        }

        fn dispose(&mut self) -> Result<(), ComponentError> {
            self.counters.borrow_mut().disposes += 1;
            Ok(())
        }
    }

    struct CountingImporter {
        counters: Rc<RefCell<Counters>>,
    }

    impl Importer for CountingImporter {
        fn import(&self, _name: &str) -> Result<Box<dyn Component>, ComponentError> {
            self.counters.borrow_mut().imports += 1;
            Ok(Box::new(CountingComponent { counters: self.counters.clone() }))
        }
    }

    #[test]
    fn test_import_once_render_many_dispose_once() {
        let counters = Rc::new(RefCell::new(Counters::default()));
        let importer = Rc::new(CountingImporter { counters: counters.clone() });
        let doc = parse("<c:test></c:test>", Some(importer)).unwrap();

        // The parse-time validation pass spins up its own instance; count
        // deltas from here.
        let base = {
            let c = counters.borrow();
            (c.imports, c.renders, c.disposes)
        };

        let mut comp = ChtmlComponent::new(doc);
        for _ in 0..3 {
            comp.render(&BaseScope::empty()).unwrap();
        }
        comp.dispose().unwrap();

        let c = counters.borrow();
        assert_eq!(c.imports - base.0, 1, "import resolves once");
        assert_eq!(c.renders - base.1, 3, "child renders per outer render");
        assert_eq!(c.disposes - base.2, 1, "dispose cascades exactly once");
    }

    #[test]
    fn test_loop_shrink_disposes_extra_children() {
        let counters = Rc::new(RefCell::new(Counters::default()));
        let importer = Rc::new(CountingImporter { counters: counters.clone() });
        let doc = parse(
            r#"<c c:for="x in xs"><c:test></c:test></c>"#,
            Some(importer),
        )
        .unwrap();
        let mut comp = ChtmlComponent::new(doc);

        let three = BaseScope::new(vars(&[(
            "xs",
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )]));
        comp.render(&three).unwrap();
        let after_three = counters.borrow().disposes;

        let one = BaseScope::new(vars(&[("xs", Value::Array(vec![Value::Int(1)]))]));
        comp.render(&one).unwrap();
        let after_one = counters.borrow().disposes;
        assert_eq!(after_one - after_three, 2, "two loop children disposed");
    }

    #[test]
    fn test_dry_run_rejects_unknown_argument() {
        let doc = parse("<c:arg name=\"title\"></c:arg><p>${title}</p>", None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        let scope = DryRunScope::new(vars(&[("unknown", Value::Int(1))]));
        let err = comp.render(&scope).unwrap_err();
        let unrec = err
            .find::<UnrecognizedArgumentError>()
            .expect("expected UnrecognizedArgumentError");
        assert_eq!(unrec.name, "unknown");
    }

    #[test]
    fn test_dry_run_accepts_declared_arguments() {
        let doc = parse("<c:arg name=\"title\"></c:arg><p>${title}</p>", None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        let scope = DryRunScope::new(vars(&[("title", Value::String("t".into()))]));
        comp.render(&scope).unwrap();
    }
}

mod round_trip {
    use super::*;
    use crate::parser::{Document, NodeId, NodeKind};

    // Canonical form of a rendered tree: element structure and
    // non-whitespace text, ignoring whitespace-only nodes.
    fn canonical(doc: &Document, id: NodeId, out: &mut String) {
        let node = doc.node(id);
        match node.kind {
            NodeKind::Document => {
                for child in doc.children_of(id) {
                    canonical(doc, child, out);
                }
            }
            NodeKind::Element => {
                out.push('<');
                out.push_str(&node.name);
                for attr in &node.attrs {
                    out.push(' ');
                    out.push_str(&attr.key);
                    out.push('=');
                    out.push_str(attr.val.raw_string());
                }
                out.push('>');
                for child in doc.children_of(id) {
                    canonical(doc, child, out);
                }
                out.push_str("</");
                out.push_str(&node.name);
                out.push('>');
            }
            NodeKind::Text => {
                let text = node.data.raw_string().trim().to_string();
                if !text.is_empty() {
                    out.push_str(&text);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_render_serialize_reparse_is_stable() {
        let sources = [
            "<div><p>hello</p><p>world</p></div>",
            "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>",
            "<table><tr><td>1</td><td>2</td></tr></table>",
            "<section><article title=\"x\">text &amp; more</article></section>",
        ];
        for src in sources {
            let rendered = render_str(src);
            let reparsed = parse(&rendered, None).unwrap();
            let rerendered = render_str(&rendered);
            assert_eq!(rendered, rerendered, "serialization must be a fixpoint");

            let original = parse(src, None).unwrap();
            let mut a = String::new();
            canonical(&original, original.root(), &mut a);
            let mut b = String::new();
            canonical(&reparsed, reparsed.root(), &mut b);
            assert_eq!(a, b, "tree mismatch for {src}");
        }
    }
}

mod output_values {
    use super::*;

    #[test]
    fn test_pure_text_template_renders_scalar() {
        let doc = parse("${1 + 2}", None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        assert_eq!(comp.render(&BaseScope::empty()).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_structured_value_result() {
        let doc = parse("${{status: 'ok', codes: [1, 2]}}", None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        match comp.render(&BaseScope::empty()).unwrap() {
            Value::Map(entries) => {
                assert_eq!(entries.get("status"), Some(&Value::String("ok".into())));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_template_renders_null() {
        let doc = parse("", None).unwrap();
        let mut comp = ChtmlComponent::new(doc);
        assert_eq!(comp.render(&BaseScope::empty()).unwrap(), Value::Null);
    }
}
