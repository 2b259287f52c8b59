use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio::sync::watch;

use agent::common::component::{Component, Options};
use agent::common::registry::{Params, Registration, Registry};
use agent::relabel::component::{Arguments, Exports, RelabelScriptComponent, UpdateOutcome};
use agent::relabel::stage::StageState;
use agent::relabel::transform::from_fn;
use common::error::Error;
use common::sd::target::Target;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn target(pairs: &[(&str, &str)]) -> Target {
    pairs.iter().copied().collect()
}

fn example_targets() -> Vec<Target> {
    vec![
        target(&[("__address__", "node01:12345"), ("job", "observability/agent"), ("cluster", "europe-south-1")]),
        target(&[("__address__", "node02:12345"), ("job", "observability/loki"), ("cluster", "europe-south-1")]),
        target(&[("__address__", "node03:12345"), ("job", "observability/mimir"), ("cluster", "europe-south-1")]),
    ]
}

fn split_expected() -> Vec<Target> {
    ["agent", "loki", "mimir"]
        .iter()
        .enumerate()
        .map(|(i, pod)| {
            let address = format!("node0{}:12345", i + 1);
            let job = format!("observability/{}", pod);
            target(&[
                ("__address__", address.as_str()),
                ("job", job.as_str()),
                ("cluster", "europe-south-1"),
                ("namespace", "observability"),
                ("pod", pod),
            ])
        })
        .collect()
}

fn args(transformation: &str, targets: Vec<Target>) -> Arguments {
    Arguments {
        targets,
        transformation: transformation.to_string(),
        ..Default::default()
    }
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Registry with the built-ins plus a few misbehaving transformations.
fn test_options() -> Options {
    let mut registry = Registry::with_builtins();
    registry
        .register(Registration::new("test.panics", |_| {
            Ok(Box::new(from_fn("test.panics", |targets: Vec<Target>| {
                let _ = &targets[100];
                Ok(targets)
            })) as _)
        }))
        .unwrap();
    registry
        .register(Registration::new("test.fails", |_| {
            Ok(Box::new(from_fn("test.fails", |_| Err(Error::ScriptExecution("boom".to_string())))) as _)
        }))
        .unwrap();
    registry
        .register(Registration::new("test.slow", |_| {
            Ok(Box::new(from_fn("test.slow", |targets| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(targets)
            })) as _)
        }))
        .unwrap();
    Options {
        registry: Arc::new(registry),
        ..Options::new("discovery.relabel_script.test")
    }
}

#[rstest]
#[case::identity_with_empty_targets("passthrough", vec![], vec![])]
#[case::pass_through("passthrough", example_targets(), example_targets())]
#[case::add_pod_and_namespace("split_label", example_targets(), split_expected())]
#[case::reference_scenario(
    "split_label",
    vec![target(&[("job", "team-a/worker-1")])],
    vec![target(&[("job", "team-a/worker-1"), ("namespace", "team-a"), ("pod", "worker-1")])]
)]
#[tokio::test]
async fn relabels_targets(#[case] transformation: &str, #[case] input: Vec<Target>, #[case] expected: Vec<Target>) {
    init_logs();
    let original = input.clone();
    let component = RelabelScriptComponent::new(test_options(), args(transformation, input))
        .await
        .unwrap();

    assert_eq!(component.exports().output, expected);
    assert_eq!(component.arguments().targets, original, "input targets were modified");
    assert_eq!(component.state(), StageState::Idle);
}

#[rstest]
#[case::empty_transformation("", "transformation must be set")]
#[case::unknown_transformation("starlark", "not registered")]
#[case::invalid_name("relabel targets", "is not valid")]
#[case::exception_in_script("test.panics", "index out of bounds")]
#[case::script_error("test.fails", "boom")]
#[case::malformed_target("split_label", "does not contain")]
#[tokio::test]
async fn construction_fails(#[case] transformation: &str, #[case] expected_err: &str) {
    init_logs();
    let input = vec![target(&[("job", "malformed")])];
    let err = RelabelScriptComponent::new(test_options(), args(transformation, input))
        .await
        .err()
        .expect("component should not build");
    assert!(err.to_string().contains(expected_err), "{err}");
}

#[tokio::test]
async fn malformed_cycle_keeps_previous_targets() {
    init_logs();
    let mut component = RelabelScriptComponent::new(
        test_options(),
        args("split_label", vec![target(&[("job", "team-a/worker-1")])]),
    )
    .await
    .unwrap();
    let before = component.exports();

    let err = component
        .refresh(vec![target(&[("job", "team-a/worker-1")]), target(&[("job", "malformed")])])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedTarget { .. }), "{err}");
    assert!(err.to_string().contains(r#"{job="malformed"}"#), "{err}");
    assert_eq!(component.state(), StageState::Failed);
    assert_eq!(component.exports(), before);

    // The next good cycle starts clean.
    let outcome = component
        .refresh(vec![target(&[("job", "team-b/worker-2")])])
        .await
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Changed);
    assert_eq!(component.state(), StageState::Idle);
    assert_eq!(component.exports().output[0].get("namespace"), Some("team-b"));
}

#[tokio::test]
async fn identical_cycles_are_unchanged() {
    init_logs();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let options = test_options().with_on_state_change(move |_: &Exports| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let mut component = RelabelScriptComponent::new(options, args("split_label", example_targets()))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = component.exports();

    assert_eq!(component.refresh(example_targets()).await.unwrap(), UpdateOutcome::Unchanged);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(component.exports(), first);

    let mut reordered = example_targets();
    reordered.reverse();
    assert_eq!(component.refresh(reordered).await.unwrap(), UpdateOutcome::Changed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(component.exports().output[0].get("pod"), Some("mimir"));
}

#[tokio::test]
async fn correlate_and_join_targets() {
    init_logs();
    let input = vec![
        target(&[("__address__", "mysql://node01/something"), ("job", "db/mysql")]),
        target(&[("__address__", "node01"), ("size", "xs"), ("cluster", "europe-south-1")]),
        target(&[("__address__", "node02"), ("size", "xxs"), ("cluster", "europe-middle-1")]),
        target(&[("__address__", "mysql://node02/something"), ("job", "db/mysql")]),
    ];
    let component = RelabelScriptComponent::new(test_options(), args("join_by_host", input))
        .await
        .unwrap();

    assert_eq!(
        component.exports().output,
        vec![
            target(&[
                ("__address__", "mysql://node01/something"),
                ("__host_address__", "node01"),
                ("job", "db/mysql"),
                ("size", "xs"),
                ("cluster", "europe-south-1"),
            ]),
            target(&[
                ("__address__", "mysql://node02/something"),
                ("__host_address__", "node02"),
                ("job", "db/mysql"),
                ("size", "xxs"),
                ("cluster", "europe-middle-1"),
            ]),
        ]
    );
}

#[tokio::test]
async fn update_switches_transformation() {
    init_logs();
    let mut component = RelabelScriptComponent::new(test_options(), args("passthrough", example_targets()))
        .await
        .unwrap();
    assert_eq!(component.exports().output, example_targets());

    let outcome = component.update(args("split_label", example_targets())).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Changed);
    assert_eq!(component.exports().output, split_expected());

    let custom = Arguments {
        params: params(&[("first_label", "team"), ("second_label", "service")]),
        ..args("split_label", vec![target(&[("job", "a/b")])])
    };
    component.update(custom).await.unwrap();
    assert_eq!(
        component.exports().output,
        vec![target(&[("job", "a/b"), ("team", "a"), ("service", "b")])]
    );

    // An unknown transformation is rejected and the old one stays.
    let err = component.update(args("nope", example_targets())).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(component.arguments().transformation, "split_label");
}

#[tokio::test]
async fn timeout_fails_cycle_and_keeps_exports() {
    init_logs();
    let mut component = RelabelScriptComponent::new(test_options(), args("passthrough", example_targets()))
        .await
        .unwrap();
    let before = component.exports();

    let slow = Arguments {
        timeout: Some(Duration::from_millis(20)),
        ..args("test.slow", vec![target(&[("job", "a/b")])])
    };
    let err = component.update(slow).await.unwrap_err();
    assert!(err.is_script_execution(), "{err}");
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(component.exports(), before);

    // While the timed-out call is still running the stage refuses new work.
    let err = component.refresh(vec![target(&[("job", "a/b")])]).await.unwrap_err();
    assert!(matches!(err, Error::ScriptExecution(_)), "{err}");
    assert_eq!(component.exports(), before);
}

#[tokio::test]
async fn run_consumes_discovery_cycles() {
    init_logs();
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    let options = test_options().with_on_state_change(move |exports: &Exports| {
        sink.lock().unwrap().push(exports.output.len());
    });

    let mut component = RelabelScriptComponent::new(options, args("split_label", vec![]))
        .await
        .unwrap();
    let input = component.input();
    let exports = component.exports_handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(async move { component.run(shutdown_rx).await });

    input.send(example_targets()).await.unwrap();
    input.send(vec![target(&[("job", "malformed")])]).await.unwrap();
    input.send(example_targets()).await.unwrap();
    drop(input);

    runner.await.unwrap().unwrap();
    drop(shutdown_tx);

    assert_eq!(exports.load().output, split_expected());
    // Initial empty export, then the first good cycle; the failure and the
    // identical third cycle publish nothing.
    assert_eq!(*published.lock().unwrap(), vec![0, 3]);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    init_logs();
    let mut component = RelabelScriptComponent::new(test_options(), args("passthrough", example_targets()))
        .await
        .unwrap();
    let _input = component.input();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(async move { component.run(shutdown_rx).await });

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("component did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn run_ignores_shutdown_reset_to_false() {
    init_logs();
    let mut component = RelabelScriptComponent::new(test_options(), args("passthrough", example_targets()))
        .await
        .unwrap();
    let _input = component.input();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut runner = tokio::spawn(async move { component.run(shutdown_rx).await });

    shutdown_tx.send(false).unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut runner).await.is_err(),
        "component stopped without a shutdown request"
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("component did not stop")
        .unwrap()
        .unwrap();
}
