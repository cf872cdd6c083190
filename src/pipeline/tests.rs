use super::*;
use crate::test_utils::{Rig, context, rig, rig_with};

fn items(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn apply(rig: &Rig, source: &str, input: &[&str]) -> (Vec<String>, ErrorLog, SpoutState) {
    let ctx = context(rig.runtime.clone());
    let pipeline = Pipeline::parse(source);
    pipeline.apply(items(input), &ctx, None).await
}

#[tokio::test]
async fn split_invokes_once_per_group() {
    init_tracing();
    let rig = rig();
    let (output, errors, _) = apply(&rig, "(2) count", &["a", "b", "c", "d", "e"]).await;
    assert!(errors.is_empty());
    assert_eq!(output, items(&["2", "2", "1"]));
    assert_eq!(rig.invocations(), 3);
}

#[tokio::test]
async fn steps_thread_items() {
    init_tracing();
    let rig = rig();
    let (output, errors, _) = apply(&rig, "upper > join sep=-", &["a", "b"]).await;
    assert!(errors.is_empty());
    assert_eq!(output, items(&["A-B"]));

    let (output, _, _) = apply(&rig, "", &["a", "b"]).await;
    assert_eq!(output, items(&["a", "b"]));
}

#[tokio::test]
async fn branches_take_turns_or_all_run() {
    init_tracing();
    let rig = rig();
    let (output, _, _) = apply(&rig, "(1) [upper | count]", &["a", "b", "c"]).await;
    assert_eq!(output, items(&["A", "1", "C"]));

    let (output, _, _) = apply(&rig, "* [upper | join]", &["a", "b"]).await;
    assert_eq!(output, items(&["A", "B", "a,b"]));
}

#[tokio::test]
async fn inline_pipelines_run_per_group() {
    init_tracing();
    let rig = rig();
    let (output, errors, _) = apply(&rig, "(2) (upper > join sep=+)", &["a", "b", "c"]).await;
    assert!(errors.is_empty());
    assert_eq!(output, items(&["A+B", "C"]));
}

#[tokio::test]
async fn conditions_gate_groups() {
    init_tracing();
    let rig = rig();
    let (output, _, _) = apply(&rig, "(1) IF({0} == b) upper", &["a", "b", "c"]).await;
    assert_eq!(output, items(&["a", "B", "c"]));
}

#[tokio::test]
async fn referenced_items_are_consumed_or_set_aside() {
    init_tracing();
    let rig = rig();
    let (output, _, _) = apply(&rig, "join sep={0}", &["-", "a", "b"]).await;
    assert_eq!(output, items(&["a-b"]));

    let (output, _, _) = apply(&rig, "join sep={0!}", &["-", "a", "b"]).await;
    assert_eq!(output, items(&["-", "a-b"]));
}

#[tokio::test]
async fn carrots_reach_the_whole_step() {
    init_tracing();
    let rig = rig();
    // each group sees the step's items one scope up
    let (output, errors, _) = apply(&rig, "(1) say text={^0}", &["a", "b"]).await;
    assert!(errors.is_empty());
    assert_eq!(output, items(&["a", "a"]));
}

#[tokio::test]
async fn sources_in_pipe_position_discard_input() {
    init_tracing();
    let rig = rig();
    let (output, _, _) = apply(&rig, "words n=2", &["x", "y", "z"]).await;
    assert_eq!(output, items(&["alpha", "beta"]));
}

#[tokio::test]
async fn spouts_pass_items_through_and_defer() {
    init_tracing();
    let rig = rig();
    let (output, errors, spouts) = apply(&rig, "log > upper > print", &["a"]).await;
    assert!(errors.is_empty());
    assert_eq!(output, items(&["A"]));
    assert_eq!(spouts.callbacks(), 1);
    assert_eq!(spouts.print_values(), &[items(&["A"])]);
    // nothing runs until the orchestrator performs the callbacks
    assert!(rig.log.callbacks().is_empty());
}

#[tokio::test]
async fn a_failing_pipe_halts_the_pipeline() {
    init_tracing();
    let rig = rig();
    let (output, errors, spouts) = apply(&rig, "log > fail > count", &["a"]).await;
    assert!(output.is_empty());
    assert!(errors.is_terminal());
    assert_eq!(errors.entries()[0].path, vec!["`fail`"]);
    assert!(errors.to_string().contains("Failed to process pipe `fail`: deliberate failure"));
    assert_eq!(rig.invocations(), 0);
    // the spout from before the failure is still queued
    assert_eq!(spouts.callbacks(), 1);
}

#[tokio::test]
async fn leftover_argument_text_is_a_warning() {
    init_tracing();
    let rig = rig();
    let (output, errors, _) = apply(&rig, "upper loud", &["a"]).await;
    assert_eq!(output, items(&["A"]));
    assert!(!errors.is_terminal());
    assert_eq!(errors.len(), 1);
    assert!(errors.to_string().contains("Unused argument text `loud`"));
}

#[tokio::test]
async fn unknown_pipes_are_terminal() {
    init_tracing();
    let rig = rig();
    let (_, errors, _) = apply(&rig, "upper > nope", &["a"]).await;
    assert!(errors.is_terminal());
    assert!(errors.to_string().contains("Unknown pipe `nope`"));
}

#[tokio::test]
async fn parse_errors_are_kept_until_applied() {
    init_tracing();
    let pipeline = Pipeline::parse("upper > (join");
    assert!(pipeline.parse_errors().is_terminal());

    let pipeline = Pipeline::parse("up$per");
    assert!(pipeline.parse_errors().to_string().contains("Invalid pipe name"));

    let pipeline = Pipeline::parse("(1) SWITCH({0} == a | {0} == b) [upper]");
    assert!(pipeline.parse_errors().is_terminal());

    let rig = rig();
    let (output, errors, _) = apply(&rig, "count > (join", &["a"]).await;
    assert!(output.is_empty());
    assert!(errors.is_terminal());
    assert_eq!(rig.invocations(), 0);
}

#[tokio::test]
async fn items_in_flight_are_bounded() {
    init_tracing();
    let rig = rig_with(Settings {
        max_chars: 5,
        ..Settings::default()
    });
    let (_, errors, _) = apply(&rig, "nop", &["abcdef"]).await;
    assert!(errors.is_terminal());
    assert!(errors.to_string().contains("Too many characters"));

    // growth is caught after the last step too
    let (_, errors, _) = apply(&rig, "words n=-1", &["a"]).await;
    assert!(errors.is_terminal());
}

#[tokio::test]
async fn pipe_macros_bind_parameters() {
    init_tracing();
    let rig = rig();
    let shout = Macro::new(MacroKind::Pipe, "shout", "upper > join sep={arg sep}", "author")
        .with_param("sep", Some("!"), None);
    rig.runtime.macros(MacroKind::Pipe).define(shout).await.unwrap();

    let (output, errors, _) = apply(&rig, "shout sep=+", &["a", "b"]).await;
    assert!(errors.is_empty(), "{errors}");
    assert_eq!(output, items(&["A+B"]));

    let (output, _, _) = apply(&rig, "shout", &["a", "b"]).await;
    assert_eq!(output, items(&["A!B"]));
}

#[tokio::test]
async fn source_macros_replace_the_items() {
    init_tracing();
    let rig = rig();
    let greeting = Macro::new(MacroKind::Source, "greeting", "hello", "author");
    rig.runtime.macros(MacroKind::Source).define(greeting).await.unwrap();

    let (output, _, _) = apply(&rig, "greeting", &["x"]).await;
    assert_eq!(output, items(&["hello"]));
}

#[tokio::test]
async fn runaway_macros_hit_the_depth_limit() {
    init_tracing();
    let rig = rig();
    // registered directly, skipping the static check that would reject it
    let again = Macro::new(MacroKind::Pipe, "again", "again", "author");
    rig.runtime.macros(MacroKind::Pipe).define(again).await.unwrap();

    let (_, errors, _) = apply(&rig, "again", &["a"]).await;
    assert!(errors.is_terminal());
    assert!(errors.to_string().contains("Recursion too deep"));
}
