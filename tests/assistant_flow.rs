//! End-to-end flows: scripted model replies driving real shell execution
//! through the full classify/gate/run/diagnose pipeline.

use std::sync::Arc;

use sensei_core::Session;
use sensei_exec::{
    Diagnoser, ExecConfig, NullSink, Orchestrator, RiskClassifier, RiskConfig, ShellRunner,
    TurnProgress,
};
use sensei_learning::{Category, Tracker};
use sensei_llm::{MockProvider, Oracle};

fn exec_config() -> ExecConfig {
    ExecConfig {
        shell: Some("/bin/sh".to_string()),
        timeout_secs: 5,
        ..ExecConfig::default()
    }
}

fn session_with<S: sensei_exec::EventSink>(
    replies: Vec<&str>,
    risk: &RiskConfig,
    sink: S,
) -> Session<MockProvider, ShellRunner, S> {
    let config = exec_config();
    let orchestrator = Orchestrator::new(
        RiskClassifier::new(risk).unwrap(),
        ShellRunner::new(&config),
        Diagnoser::new(None),
        sink,
        config.max_retries,
    );
    let provider = MockProvider::new(replies.into_iter().map(String::from).collect());
    Session::new(Oracle::new(provider), orchestrator, String::new())
}

fn propose(command: &str) -> String {
    format!(r#"{{"command":"{command}","explanation":"","warning":"","next_steps":[]}}"#)
}

#[tokio::test]
async fn request_becomes_command_and_runs() {
    let mut session = session_with(
        vec![r#"{"command":"echo hi","explanation":"Prints hi.","warning":"","next_steps":[]}"#],
        &RiskConfig::default(),
        NullSink,
    );

    let output = session.ask("greet me").await.unwrap();
    let TurnProgress::Completed(report) = output.progress else {
        panic!("expected completion");
    };
    assert_eq!(report.result.stdout_lossy().trim(), "hi");
    assert_eq!(report.attempts, 1);
    assert!(!report.recovered);
}

#[tokio::test]
async fn approved_confirmation_runs_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("created");
    let risk = RiskConfig {
        confirm: vec!["touch".to_string()],
        ..RiskConfig::default()
    };
    let command = format!("touch {}", target.display());
    let mut session = session_with(vec![], &risk, NullSink);

    let output = session.run_verbatim(&command).await.unwrap();
    assert!(matches!(
        output.progress,
        TurnProgress::AwaitingConfirmation { .. }
    ));
    assert!(!target.exists());

    let output = session.confirm(true).await.unwrap();
    assert!(matches!(output.progress, TurnProgress::Completed(_)));
    assert!(target.exists());
}

#[tokio::test]
async fn declined_confirmation_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("never");
    let risk = RiskConfig {
        confirm: vec!["touch".to_string()],
        ..RiskConfig::default()
    };
    let mut session = session_with(vec![], &risk, NullSink);

    session
        .run_verbatim(&format!("touch {}", target.display()))
        .await
        .unwrap();
    let output = session.confirm(false).await.unwrap();
    assert!(matches!(output.progress, TurnProgress::Cancelled));
    assert!(!target.exists());
}

#[tokio::test]
async fn blocked_command_never_touches_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let risk = RiskConfig {
        blocked: vec!["wipe-disk".to_string()],
        ..RiskConfig::default()
    };
    let mut session = session_with(vec![], &risk, NullSink);

    let output = session
        .run_verbatim(&format!("touch {} # wipe-disk", marker.display()))
        .await
        .unwrap();
    assert!(matches!(output.progress, TurnProgress::Blocked { .. }));
    assert!(!marker.exists());

    // Approval cannot revive a blocked command.
    let output = session.confirm(true).await.unwrap();
    assert!(matches!(output.progress, TurnProgress::Noop));
    assert!(!marker.exists());
}

#[tokio::test]
async fn failure_surfaces_model_post_mortem() {
    let mut session = session_with(
        vec![
            &propose("false"),
            r#"{"diagnosis":"the command always exits non-zero","fix_command":"","explanation":""}"#,
        ],
        &RiskConfig::default(),
        NullSink,
    );

    let output = session.ask("please fail").await.unwrap();
    let TurnProgress::Exhausted(failure) = output.progress else {
        panic!("expected exhaustion");
    };
    assert_eq!(failure.result.exit_code, 1);
    assert!(
        output
            .diagnosis
            .as_ref()
            .is_some_and(|d| d.diagnosis.contains("non-zero"))
    );
}

#[tokio::test]
async fn timed_out_command_reports_timeout() {
    let config = ExecConfig {
        shell: Some("/bin/sh".to_string()),
        timeout_secs: 1,
        max_retries: 0,
        ..ExecConfig::default()
    };
    let orchestrator = Orchestrator::new(
        RiskClassifier::new(&RiskConfig::default()).unwrap(),
        ShellRunner::new(&config),
        Diagnoser::new(None),
        NullSink,
        0,
    );
    let provider = MockProvider::single(r#"{"diagnosis":"too slow","fix_command":"","explanation":""}"#);
    let mut session = Session::new(Oracle::new(provider), orchestrator, String::new());

    let output = session.run_verbatim("sleep 10").await.unwrap();
    let TurnProgress::Exhausted(failure) = output.progress else {
        panic!("expected exhaustion");
    };
    assert!(failure.result.timed_out);
}

#[tokio::test]
async fn interrupt_token_stops_a_running_command() {
    // The token handed out before the turn starts must control it; the
    // command ends as Cancelled well before its own runtime elapses.
    let mut session = session_with(vec![&propose("sleep 10")], &RiskConfig::default(), NullSink);

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let start = std::time::Instant::now();
    let err = session.ask("wait a while").await.unwrap_err();
    assert!(matches!(
        err,
        sensei_core::SessionError::Exec(sensei_exec::ExecError::Cancelled)
    ));
    assert!(start.elapsed() < std::time::Duration::from_secs(5));

    // The session is usable again afterwards.
    let output = session.run_verbatim("echo back").await.unwrap();
    assert!(matches!(output.progress, TurnProgress::Completed(_)));
}

#[tokio::test]
async fn successes_accumulate_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let progress_path = dir.path().join("progress.json");

    {
        let tracker = Arc::new(Tracker::load(progress_path.clone()).await);
        let mut session = session_with(
            vec![&propose("git --version")],
            &RiskConfig::default(),
            Arc::clone(&tracker),
        );
        session.ask("git version").await.unwrap();

        let unlocked = tracker.take_unlocked().await;
        assert!(unlocked.iter().any(|a| a.id == "first_cmd"));
    }

    // A fresh process sees the persisted progress.
    let tracker = Arc::new(Tracker::load(progress_path).await);
    let progress = tracker.progress().await;
    assert_eq!(progress.total, 1);
    assert_eq!(progress.categories.get(&Category::Git).copied(), Some(1));

    let mut session = session_with(
        vec![&propose("echo again")],
        &RiskConfig::default(),
        Arc::clone(&tracker),
    );
    session.ask("again").await.unwrap();
    assert_eq!(tracker.progress().await.total, 2);
}

#[tokio::test]
async fn declined_turns_do_not_count_as_progress() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(Tracker::load(dir.path().join("progress.json")).await);
    let risk = RiskConfig {
        confirm: vec!["touch".to_string()],
        ..RiskConfig::default()
    };
    let mut session = session_with(vec![], &risk, Arc::clone(&tracker));

    session.run_verbatim("touch /tmp/ignored").await.unwrap();
    session.confirm(false).await.unwrap();

    let progress = tracker.progress().await;
    assert_eq!(progress.total, 0);
    assert!(progress.history.is_empty());
}

#[tokio::test]
async fn operator_patterns_extend_builtins() {
    // Custom additions never replace the built-in destructive patterns.
    let risk = RiskConfig {
        blocked: vec!["my-internal-tool".to_string()],
        ..RiskConfig::default()
    };
    let classifier = RiskClassifier::new(&risk).unwrap();
    assert_eq!(
        classifier.classify("my-internal-tool --go").tier,
        sensei_exec::RiskTier::Blocked
    );
    assert_eq!(
        classifier.classify("rm -rf / --no-preserve-root").tier,
        sensei_exec::RiskTier::Blocked
    );
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn session_futures_are_send() {
    // The REPL moves turns across runtime threads.
    let mut session = session_with(vec![&propose("true")], &RiskConfig::default(), NullSink);
    let future = session.ask("noop");
    assert_send(&future);
    future.await.unwrap();
}
