use super::*;
use crate::test_utils::rig;

fn items(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn print_table_layout() {
    assert_eq!(render_print_values(&[items(&["hello"])]), "hello");
    assert_eq!(render_print_values(&[items(&[" "])]), "`empty string`");
    assert_eq!(render_print_values(&[Vec::new()]), "`no output`");

    let columns = [items(&["a", "bb"]), items(&["ccc"])];
    assert_eq!(render_print_values(&columns), "a  → ccc\nbb");

    let columns = [items(&["x", "y"]), items(&["X", "Y"])];
    assert_eq!(render_print_values(&columns), "x → X\ny → Y");
}

#[test]
fn origin_and_pipeline_split_on_the_first_arrow() {
    let script = PipelineWithOrigin::parse("\"a > b\" > upper > join");
    assert!(script.parse_errors().is_empty());
    assert_eq!(script.pipeline().steps().len(), 2);
    assert_eq!(script.origin().as_literal(), Some("a > b"));

    let (origin, pipeline) = PipelineWithOrigin::split("a -> upper").unwrap();
    assert_eq!(origin, "a");
    assert_eq!(pipeline, "print > upper");

    let script = PipelineWithOrigin::parse("{unclosed > upper");
    assert!(script.parse_errors().is_terminal());
}

#[tokio::test]
async fn identical_scripts_share_one_parse() {
    init_tracing();
    let rig = rig();
    let first = rig.runtime.script("a > upper");
    let second = rig.runtime.script("a > upper");
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn direct_scripts_print_and_remember_their_output() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("\"a > b\" > upper", "tester", "test").await;
    assert!(report.errors.is_empty());
    assert_eq!(report.items, items(&["A > B"]));
    assert_eq!(report.printed.as_deref(), Some("A > B"));
    assert_eq!(rig.io.delivered(), vec![(Some("test".to_string()), "A > B".to_string())]);
    assert_eq!(rig.runtime.previous_output("test").await, Some(items(&["A > B"])));

    let report = rig.runtime.execute("a -> upper", "tester", "test").await;
    assert_eq!(report.printed.as_deref(), Some("a → A"));
}

#[tokio::test]
async fn a_failing_step_still_runs_earlier_callbacks() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("x > log > fail > count", "tester", "test").await;

    assert!(report.is_terminal());
    assert!(report.items.is_empty());
    assert_eq!(report.printed, None);
    assert_eq!(rig.invocations(), 0);
    assert_eq!(rig.log.items(), vec![items(&["x"])]);

    let diagnostic = report.diagnostic.unwrap();
    assert!(diagnostic.terminal);
    assert_eq!(diagnostic.title, "Error log for script");
    assert_eq!(rig.io.reports(), vec![diagnostic]);
    assert_eq!(rig.runtime.previous_output("test").await, None);
}

#[tokio::test]
async fn spouts_suppress_the_automatic_print() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("x > log", "tester", "test").await;
    assert_eq!(report.printed, None);
    assert_eq!(rig.log.items(), vec![items(&["x"])]);

    // an explicit print brings it back
    let report = rig.runtime.execute("x > log > upper > print", "tester", "test").await;
    assert_eq!(report.printed.as_deref(), Some("X → X"));
}

#[tokio::test]
async fn aggregated_spouts_run_once() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("{words n=3} > (1) gather", "tester", "test").await;
    assert!(report.errors.is_empty(), "{}", report.errors);

    let callbacks = rig.gather.callbacks();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].len(), 3);
    assert_eq!(rig.gather.items(), vec![items(&["alpha"]), items(&["beta"]), items(&["gamma"])]);
}

#[tokio::test]
async fn failing_callbacks_become_warnings() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("x > broken > log", "tester", "test").await;

    assert!(!report.is_terminal());
    assert!(report.errors.to_string().contains("Failed to execute spout `broken`: spout exploded"));
    assert_eq!(rig.log.items(), vec![items(&["x"])]);
    assert_eq!(report.diagnostic.unwrap().title, "Warning log for script");
}

#[tokio::test]
async fn warnings_are_reported_alongside_output() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("{3 upper hi}", "tester", "test").await;

    assert_eq!(report.items, items(&["HI"]));
    assert_eq!(report.printed.as_deref(), Some("HI"));
    let diagnostic = report.diagnostic.unwrap();
    assert!(!diagnostic.terminal);
    assert!(diagnostic.body.contains("does not take an amount"));
}

#[tokio::test]
async fn empty_scripts_print_a_placeholder() {
    init_tracing();
    let rig = rig();
    let report = rig.runtime.execute("", "tester", "test").await;
    assert!(report.items.is_empty());
    assert_eq!(report.printed.as_deref(), Some("`no output`"));
}

#[tokio::test]
async fn evaluation_skips_side_effects() {
    init_tracing();
    let rig = rig();
    let ctx = crate::test_utils::context(rig.runtime.clone());
    let script = rig.runtime.script("x > log > upper");
    let (values, _) = script.evaluate(&ctx).await.unwrap();
    assert_eq!(values, items(&["X"]));
    assert!(rig.log.callbacks().is_empty());
    assert!(rig.io.delivered().is_empty());
}
