use assert_cmd::Command;
use clap::Parser;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use slap::cli::{Cli, Commands, InputSelection};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("arguments should parse")
}

#[test]
fn publish_requires_credentials() {
    assert!(Cli::try_parse_from(["slap", "publish"]).is_err());
    assert!(Cli::try_parse_from(["slap", "publish", "-u", "user"]).is_err());
}

#[test]
fn publish_defaults_to_config_json_and_all_inputs() {
    let cli = parse(&["slap", "publish", "-u", "user", "-p", "pass"]);
    let Commands::Publish(args) = cli.command else {
        panic!("expected publish");
    };
    assert_eq!(args.config, PathBuf::from("config.json"));
    assert!(!args.site);
    assert!(!args.no_overwrite);
    assert_eq!(args.selection(), InputSelection::All);
}

#[test]
fn publish_merges_flagged_and_positional_inputs() {
    let cli = parse(&[
        "slap", "publish", "-u", "user", "-p", "pass", "-i", "mxd/foo.mxd", "mxd/bar.mxd",
        "mxd/baz.mxd",
    ]);
    let Commands::Publish(args) = cli.command else {
        panic!("expected publish");
    };
    assert_eq!(
        args.selection(),
        InputSelection::Explicit(vec![
            "mxd/foo.mxd".to_string(),
            "mxd/bar.mxd".to_string(),
            "mxd/baz.mxd".to_string(),
        ])
    );
}

#[test]
fn git_selection_wins_over_inputs() {
    let cli = parse(&[
        "slap", "publish", "-u", "user", "-p", "pass", "-g", "some-hash", "mxd/foo.mxd",
    ]);
    let Commands::Publish(args) = cli.command else {
        panic!("expected publish");
    };
    assert_eq!(args.selection(), InputSelection::Git("some-hash".to_string()));
}

#[test]
fn init_defaults_to_current_directory() {
    let cli = parse(&["slap", "init"]);
    let Commands::Init(args) = cli.command else {
        panic!("expected init");
    };
    let request = args.into_request(PathBuf::from("/work"));
    assert_eq!(request.directories, vec![PathBuf::from("/work")]);
    assert_eq!(request.filename, PathBuf::from("config.json"));
    assert_eq!(request.hostname, "hostname");
    assert!(!request.register_data_sources);
}

#[test]
fn publish_fails_on_missing_config() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("slap").expect("Binary exists");
    cmd.current_dir(dir.path())
        .args(["publish", "-u", "user", "-p", "pass", "-c", "missing.json"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn init_writes_config_for_found_inputs() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("mxd")).unwrap();
    fs::create_dir_all(dir.path().join("gp")).unwrap();
    fs::write(dir.path().join("mxd/roads.mxd"), b"").unwrap();
    fs::write(dir.path().join("gp/Buffer.tbx"), b"").unwrap();
    let out = dir.path().join("out.json");

    let mut cmd = Command::cargo_bin("slap").expect("Binary exists");
    cmd.current_dir(dir.path())
        .arg("init")
        .arg(dir.path())
        .arg("-c")
        .arg(&out)
        .args(["-n", "gis01"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 map and 1 gp services"));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["agsUrl"], "https://gis01:6443/arcgis/admin");
    assert_eq!(written["mapServices"]["services"][0]["serviceName"], "roads");
    assert_eq!(written["gpServices"]["services"][0]["tool"], "Buffer");
}

#[test]
fn explicit_input_prints_one_progress_line() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        br#"{ "agsUrl": "https://gis01:6443/arcgis/admin",
  "mapServices": { "services": [
    { "input": "mxd/foo.mxd", "output": "output", "serviceName": "foo",
      "connectionFilePath": "connections/gis01.ags" } ] } }"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("slap").expect("Binary exists");
    cmd.current_dir(dir.path())
        .env("SLAP_PYTHON", dir.path().join("no-such-python"))
        .args(["publish", "-u", "user", "-p", "pass", "-c"])
        .arg(&config)
        .arg("mxd/foo.mxd");
    cmd.assert().failure().stdout(predicate::function(|out: &str| {
        out.matches("Publishing mxd/foo.mxd").count() == 1
    }));
}

#[test]
fn legacy_binary_rejects_unknown_keys() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("legacy.json");
    fs::write(&config, br#"{ "services": [], "agsUrl": "https://x" }"#).unwrap();

    let mut cmd = Command::cargo_bin("map_service_publisher").expect("Binary exists");
    cmd.arg("-c").arg(&config);
    cmd.assert().failure();
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use slap::cli::run;

    // The dummy config does not exist, so run fails after tracing starts.
    let cli = parse(&[
        "slap", "publish", "-u", "user", "-p", "pass", "-c", "dummy.json",
    ]);
    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
