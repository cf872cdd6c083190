use super::*;
use crate::test_utils::{context, rig_with, runtime};

fn items(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn eval(source: &str, scope: &ItemScope<'_>) -> Diagnosed<String> {
    let ctx = context(runtime());
    let template = TemplatedString::parse(source)?;
    template.evaluate(&ctx, scope).await
}

#[tokio::test]
async fn literal_text_evaluates_to_itself() {
    init_tracing();
    let scope = ItemScope::default();
    let (text, errors) = eval("no braces here", &scope).await.unwrap();
    assert_eq!(text, "no braces here");
    assert!(errors.is_empty());
}

#[tokio::test]
async fn items_and_conditionals() {
    init_tracing();
    let scope = ItemScope::new(items(&["a", "b"]));
    assert_eq!(eval("{1}-{0}", &scope).await.unwrap().0, "b-a");
    assert_eq!(eval("{? yes if {0} == a else no}", &scope).await.unwrap().0, "yes");
    assert_eq!(eval("{? yes if {1} == a else no}", &scope).await.unwrap().0, "no");

    let errors = eval("{5}", &scope).await.unwrap_err();
    assert!(errors.to_string().contains("out of range"));
}

#[tokio::test]
async fn multiple_evaluate_varies_leftmost_slowest() {
    init_tracing();
    let ctx = context(runtime());
    let scope = ItemScope::default();
    let template = TemplatedString::parse("{2 words}/{3 words}").unwrap();

    let (strings, errors) = template.multiple_evaluate(&ctx, &scope).await.unwrap();
    assert!(errors.is_empty());
    assert_eq!(strings.len(), 6);
    assert_eq!(strings[0], "alpha/alpha");
    assert_eq!(strings[1], "alpha/beta");
    assert_eq!(strings[3], "beta/alpha");

    let (single, _) = template.evaluate(&ctx, &scope).await.unwrap();
    assert_eq!(single, "alpha/alpha");
}

#[tokio::test]
async fn multiple_evaluate_is_bounded() {
    init_tracing();
    let rig = rig_with(Settings {
        max_combinations: 4,
        ..Settings::default()
    });
    let ctx = context(rig.runtime.clone());
    let scope = ItemScope::default();
    let template = TemplatedString::parse("{3 words}{3 words}").unwrap();

    let (strings, warnings) = template.multiple_evaluate(&ctx, &scope).await.unwrap();
    assert_eq!(strings.len(), 4);
    assert!(warnings.to_string().contains("Too many combinations"));
}

#[tokio::test]
async fn all_requires_a_depletable_source() {
    init_tracing();
    let ctx = context(runtime());
    let scope = ItemScope::default();

    let template = TemplatedString::parse("{ALL words}").unwrap();
    let (values, _) = template.evaluate_values(&ctx, &scope).await.unwrap();
    assert_eq!(values.len(), 5);

    let template = TemplatedString::parse("{ALL say hi}").unwrap();
    let errors = template.evaluate_values(&ctx, &scope).await.unwrap_err();
    assert!(errors.to_string().contains("cannot produce ALL"));
}

#[tokio::test]
async fn amounts_repeat_sources_without_n() {
    init_tracing();
    let ctx = context(runtime());
    let scope = ItemScope::default();
    let template = TemplatedString::parse("{3 say hey}").unwrap();
    let (values, _) = template.evaluate_values(&ctx, &scope).await.unwrap();
    assert_eq!(values, items(&["hey", "hey", "hey"]));
}

#[tokio::test]
async fn oversized_amounts_are_refused_up_front() {
    init_tracing();
    let rig = rig_with(Settings::default());
    let report = rig.runtime.execute("{200000 counted} > count", "tester", "test").await;
    assert!(report.is_terminal());
    assert!(report.errors.to_string().contains("Amount 200000 for `counted` exceeds the limit of 100"));
    assert_eq!(rig.counted.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(rig.invocations(), 0);

    let greeting = Macro::new(MacroKind::Source, "greeting", "hi", "author");
    rig.runtime.macros(MacroKind::Source).define(greeting).await.unwrap();
    let ctx = context(rig.runtime.clone());
    let scope = ItemScope::default();
    let template = TemplatedString::parse("{101 greeting}").unwrap();
    let errors = template.evaluate_values(&ctx, &scope).await.unwrap_err();
    assert!(errors.is_terminal());

    let template = TemplatedString::parse("{100 greeting}").unwrap();
    let (values, _) = template.evaluate_values(&ctx, &scope).await.unwrap();
    assert_eq!(values.len(), 100);
}

#[tokio::test]
async fn unknown_sources_are_terminal_with_breadcrumbs() {
    init_tracing();
    let scope = ItemScope::default();
    let errors = eval("x {nope} y", &scope).await.unwrap_err();
    assert!(errors.is_terminal());
    assert_eq!(errors.entries()[0].path, vec!["source `nope`"]);
}

#[tokio::test]
async fn pipes_variables_and_arguments_resolve() {
    init_tracing();
    let scope = ItemScope::new(Vec::new()).with_variable("who", "world");
    assert_eq!(eval("{upper hello there}", &scope).await.unwrap().0, "HELLO THERE");
    assert_eq!(eval("hi {who}", &scope).await.unwrap().0, "hi world");

    let ctx = context(runtime())
        .with_arguments(HashMap::from([("mood".to_string(), "glad".to_string())]));
    let template = TemplatedString::parse("{mood} and {arg mood}").unwrap();
    let (text, _) = template.evaluate(&ctx, &scope).await.unwrap();
    assert_eq!(text, "glad and glad");
}

#[tokio::test]
async fn source_macros_bind_their_parameters() {
    init_tracing();
    let runtime = runtime();
    let greet = Macro::new(MacroKind::Source, "greet", "hello {arg name}", "author")
        .with_param("name", Some("stranger"), None);
    runtime.macros(MacroKind::Source).define(greet).await.unwrap();

    let ctx = context(runtime);
    let scope = ItemScope::default();
    for (source, expected) in [("{greet name=bob}", "hello bob"), ("{greet}", "hello stranger")] {
        let template = TemplatedString::parse(source).unwrap();
        let (text, _) = template.evaluate(&ctx, &scope).await.unwrap();
        assert_eq!(text, expected);
    }
}

#[tokio::test]
async fn origin_values() {
    init_tracing();
    let ctx = context(runtime());
    let scope = ItemScope::new(items(&["a", "b", "c"]));

    let cases: [(&str, &[&str]); 4] = [
        ("{0:}", &["a", "b", "c"]),
        ("x {0:}", &["x a"]),
        ("{2 words}", &["alpha", "beta"]),
        ("", &[]),
    ];
    for (source, expected) in cases {
        let template = TemplatedString::parse(source).unwrap();
        let (values, _) = template.evaluate_values(&ctx, &scope).await.unwrap();
        assert_eq!(values, items(expected), "origin `{source}`");
    }
}

#[test]
fn calls_are_found_in_nested_positions() {
    let template = TemplatedString::parse("{a x={b}} {? {c} if {d} == 1 else e}").unwrap();
    let names: Vec<&str> = template.calls().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn inline_scripts_run_in_the_enclosing_scope() {
    init_tracing();
    let scope = ItemScope::new(items(&["a", "b"]));
    assert_eq!(eval("<{>> {0} > upper}>", &scope).await.unwrap().0, "<A>");
    assert_eq!(eval("x{>> {words n=2} > join sep=+}y", &scope).await.unwrap().0, "xalpha+betay");

    let ctx = context(runtime());
    let template = TemplatedString::parse("{>> {words n=3} > upper}").unwrap();
    let (values, _) = template.evaluate_values(&ctx, &scope).await.unwrap();
    assert_eq!(values, items(&["ALPHA", "BETA", "GAMMA"]));
}

#[tokio::test]
async fn inline_script_errors_carry_their_label() {
    init_tracing();
    let scope = ItemScope::default();
    let errors = eval("{>> x > nope}", &scope).await.unwrap_err();
    assert!(errors.is_terminal());
    assert_eq!(errors.entries()[0].path[0], "inline script");
    assert!(errors.to_string().contains("Unknown pipe `nope`"));

    let errors = TemplatedString::parse("{>> x > (join}").unwrap_err();
    assert!(errors.is_terminal());
    assert_eq!(errors.entries()[0].path[0], "inline script");
}

#[test]
fn inline_scripts_keep_their_calls_to_themselves() {
    let template = TemplatedString::parse("{a x={>> {b} > c}} {>> {d}}").unwrap();
    let names: Vec<&str> = template.calls().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
    let sources: Vec<&str> = template.inline_scripts().iter().map(|s| s.source.as_str()).collect();
    assert_eq!(sources, vec!["{b} > c", "{d}"]);
}
