use std::thread;

use pagelang::{
    CompileErrorKind, CompiledExpr, CompiledPage, EvalErrorKind, EvalOptions, LoadError,
    MacroRegistry, Node, Value, render,
};

const SAMPLE_PAGE: &str = r#"
// Every method renders the same page; the argument only names the caller.
make_page`"From Root"

@Method "GET"    { make_page`"From GET" }
@Method "POST"   { make_page`"From POST" }
@Method "PATCH"  { make_page`"From PATCH" }
@Method "DELETE" { make_page`"From DELETE" }

@Def "make_page" {
    ;Node::Element(
        ;tag = "html",
        ;children = (
            ;Node::Element(
                ;tag = "body",
                ;children = (
                    ;Node::Element(
                        ;tag = "h1",
                        ;children = (;Node::Text(;value = $ ?> $ |> "Hello, Web!"),),
                    ),
                ),
            ),
        ),
    )
}
"#;

fn expected_tree() -> Node {
    Node::element(
        "html",
        vec![Node::element(
            "body",
            vec![Node::element("h1", vec![Node::text("Hello, Web!")])],
        )],
    )
}

fn load(source: &str) -> CompiledPage {
    CompiledPage::compile(source).expect("page should load")
}

fn compile_kinds(source: &str) -> Vec<CompileErrorKind> {
    match CompiledPage::compile(source) {
        Err(LoadError::Compile(errors)) => errors.iter().map(|e| e.kind).collect(),
        other => panic!("expected compile errors, got {other:?}"),
    }
}

// ── End to end ──────────────────────────────────────────────────────────

#[test]
fn test_sample_page_every_method() {
    let page = load(SAMPLE_PAGE);
    assert_eq!(page.methods(), vec!["DELETE", "GET", "PATCH", "POST"]);

    for method in ["GET", "POST", "PATCH", "DELETE", "PUT", "OPTIONS", ""] {
        assert_eq!(page.evaluate(method).unwrap(), expected_tree(), "method {method:?}");
    }
}

#[test]
fn test_sample_page_one_shot_render() {
    assert_eq!(render(SAMPLE_PAGE, "GET").unwrap(), expected_tree());
}

#[test]
fn test_sample_page_text_content() {
    let tree = load(SAMPLE_PAGE).evaluate("POST").unwrap();
    assert_eq!(tree.tag(), Some("html"));
    assert_eq!(tree.text_content(), "Hello, Web!");
}

#[test]
fn test_compiled_page_is_shared_across_threads() {
    let page = load(SAMPLE_PAGE);
    thread::scope(|s| {
        let handles: Vec<_> = ["GET", "POST", "PATCH", "DELETE", "HEAD"]
            .into_iter()
            .cycle()
            .take(20)
            .map(|method| {
                let page = &page;
                s.spawn(move || page.evaluate(method))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), expected_tree());
        }
    });
}

// ── Dispatch ────────────────────────────────────────────────────────────

#[test]
fn test_override_takes_precedence() {
    let page = load(
        r#"
        ;Node::Text(;value = "root")
        @Method "GET" { ;Node::Text(;value = "get") }
        "#,
    );
    assert_eq!(page.evaluate("GET").unwrap(), Node::text("get"));
    assert_eq!(page.evaluate("get").unwrap(), Node::text("root"));
    assert_eq!(page.evaluate("PUT").unwrap(), Node::text("root"));
}

#[test]
fn test_no_default_response() {
    let page = load(r#"@Method "GET" { ;Node::Text(;value = "get") }"#);
    assert!(page.evaluate("GET").is_ok());
    let err = page.evaluate("POST").unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::NoDefaultResponse);
    assert!(err.message.contains("POST"));
}

#[test]
fn test_empty_page_loads_but_cannot_answer() {
    let page = load("// nothing here\n");
    assert!(page.dispatch_table().is_empty());
    assert_eq!(page.evaluate("GET").unwrap_err().kind, EvalErrorKind::NoDefaultResponse);
}

// ── Macros ──────────────────────────────────────────────────────────────

#[test]
fn test_macro_argument_isolation() {
    let page = load(
        r#"
        outer`"from root"
        @Def "outer" { inner`"fixed" }
        @Def "inner" { ;Node::Text(;value = $) }
        "#,
    );
    assert_eq!(page.evaluate("GET").unwrap(), Node::text("fixed"));
}

#[test]
fn test_macro_builds_children_from_list() {
    let page = load(
        r#"
        list`("a", "b", "c")
        @Def "list" { ;Node::Element(;tag = "ul", ;children = $ |> item`$.0 <> item`$.1 <> item`$.2) }
        @Def "item" { ;Node::Element(;tag = "li", ;children = text`($,)) }
        "#,
    );
    let tree = page.evaluate("GET").unwrap();
    assert_eq!(tree.tag(), Some("ul"));
    assert_eq!(tree.children().len(), 3);
    assert_eq!(tree.text_content(), "abc");
}

#[test]
fn test_recursion_is_bounded() {
    let page = load(
        r#"
        loop`"x"
        @Def "loop" { loop`$ }
        "#,
    );
    let err = page.evaluate("GET").unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::RecursionLimit);

    let err = page
        .evaluate_with_options("GET", EvalOptions::new().max_call_depth(4))
        .unwrap_err();
    assert!(err.message.contains('4'));
}

// ── Nesting limits ──────────────────────────────────────────────────────

const SMALL_STACK: usize = 2 * 1024 * 1024;

fn chain_page(operands: usize) -> String {
    let chain = vec![r#""x""#; operands].join(" <> ");
    format!(r#";Node::Element(;tag = "ul", ;children = ({chain}) |> text`$)"#)
}

fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    thread::Builder::new()
        .stack_size(SMALL_STACK)
        .spawn(f)
        .expect("spawn failed")
        .join()
        .expect("worker thread panicked")
}

#[test]
fn test_very_long_chain_fails_to_load_instead_of_crashing() {
    let outcome = on_small_stack(|| render(&chain_page(5000), "GET").map(|_| ()));
    match outcome {
        Err(pagelang::RenderError::Load(LoadError::Parse(errors))) => {
            assert!(errors[0].message.contains("nests deeper than"));
        }
        other => panic!("expected a nesting error, got {other:?}"),
    }
}

#[test]
fn test_long_chain_under_limit_renders_on_small_stack() {
    let tree = on_small_stack(|| render(&chain_page(200), "GET")).unwrap();
    assert_eq!(tree.children().len(), 200);
}

#[test]
fn test_deep_macro_expansion_is_a_resource_limit() {
    let page = r#"
        grow`"x"
        @Def "grow" { grow`$ <> "a" <> "b" <> "c" <> "d" <> "e" <> "f" <> "g" }
    "#;
    let err = on_small_stack(move || load(page).evaluate("GET").unwrap_err());
    assert_eq!(err.kind, EvalErrorKind::ResourceLimit);
}

// ── Operators ───────────────────────────────────────────────────────────

#[test]
fn test_coalesce_skips_unknown_macro_on_right() {
    // Not compiled as a page, so the unknown name is only found if evaluated.
    let expr = CompiledExpr::compile(r#"$ ?> missing`"x""#).unwrap();
    let registry = MacroRegistry::new();

    let present = Value::from("here");
    assert_eq!(expr.evaluate(&registry, &present).unwrap(), present);

    let err = expr.evaluate(&registry, &Value::Empty).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::UnknownMacro);
}

#[test]
fn test_coalesce_then_pipe_discards_implicit() {
    let expr = CompiledExpr::compile(r#"$ ?> $ |> "Hello, Web!""#).unwrap();
    let registry = MacroRegistry::new();
    for implicit in [Value::Empty, Value::from("From GET")] {
        assert_eq!(expr.evaluate(&registry, &implicit).unwrap(), Value::from("Hello, Web!"));
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

#[test]
fn test_missing_children_is_type_mismatch() {
    let page = load(r#";Node::Element(;tag = "p")"#);
    let err = page.evaluate("GET").unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    assert!(err.message.contains("children"));
}

#[test]
fn test_non_node_body_is_type_mismatch() {
    let page = load(r#""just a string""#);
    assert_eq!(page.evaluate("GET").unwrap_err().kind, EvalErrorKind::TypeMismatch);
}

#[test]
fn test_duplicate_declarations() {
    assert_eq!(
        compile_kinds(
            r#"
            @Method "GET" { "a" }
            @Method "GET" { "b" }
            "#
        ),
        vec![CompileErrorKind::DuplicateMethod]
    );
    assert_eq!(
        compile_kinds(
            r#"
            @Def "m" { $ }
            @Def "m" { $ }
            "#
        ),
        vec![CompileErrorKind::DuplicateMacro]
    );
    assert_eq!(
        compile_kinds("\"a\"\n\"b\""),
        vec![CompileErrorKind::DuplicateRoot]
    );
}

#[test]
fn test_compile_time_checks() {
    assert_eq!(compile_kinds(r#"nope`"x""#), vec![CompileErrorKind::UnknownMacro]);
    assert_eq!(
        compile_kinds(r#";Node::Span(;tag = "x")"#),
        vec![CompileErrorKind::UnknownVariant]
    );
    assert_eq!(
        compile_kinds(r#";Node::Text(;value = "x", ;href = "/")"#),
        vec![CompileErrorKind::UnknownField]
    );
}

#[test]
fn test_parse_error_reports_location() {
    let source = "@Method \"GET\" {\n    ;Node::Text(;value = \"x\"\n}";
    let Err(err) = CompiledPage::compile(source) else {
        panic!("expected parse failure");
    };
    assert!(matches!(err, LoadError::Parse(_)));
    let rendered = err.format_with_source(source, Some("index.page"));
    assert!(rendered.contains("index.page:"));
}

#[test]
fn test_unknown_directive() {
    let Err(LoadError::Parse(errors)) = CompiledPage::compile(r#"@Route "/x" { "a" }"#) else {
        panic!("expected parse failure");
    };
    assert!(errors[0].message.contains("@Route"));
}
