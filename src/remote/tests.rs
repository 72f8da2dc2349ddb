//! Tests for SSH session handling.

use std::io::Write;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::ScriptedRunner;

#[fixture]
fn settings() -> SshSettings {
    SshSettings {
        ssh_port: 2222,
        ..SshSettings::default()
    }
}

fn executor(settings: SshSettings, runner: &ScriptedRunner) -> RemoteExecutor<ScriptedRunner> {
    RemoteExecutor::new(settings, runner.clone()).expect("settings should validate")
}

#[rstest]
fn open_starts_a_persistent_control_master(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);

    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");
    assert_eq!(session.destination(), "root@10.0.0.1");

    let invocations = runner.invocations();
    let master = invocations.first().expect("master invocation");
    let command = master.command_string();
    for fragment in [
        "ssh -p 2222",
        "-i /keys/id_rsa",
        "ControlMaster=yes",
        "ControlPersist=yes",
        "BatchMode=yes",
        "StrictHostKeyChecking=no",
        "UserKnownHostsFile=/dev/null",
        "root@10.0.0.1 true",
    ] {
        assert!(command.contains(fragment), "missing '{fragment}' in: {command}");
    }
}

#[rstest]
fn open_reports_connection_failures(settings: SshSettings) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(255), "", "Connection refused");
    let executor = executor(settings, &runner);

    let err = executor
        .open("10.0.0.1", "root", "")
        .expect_err("refused connection should fail");

    assert!(
        matches!(err, RemoteError::Connect { status: Some(255), ref stderr, .. } if stderr.contains("refused")),
        "unexpected error: {err}"
    );
    let command = runner
        .invocations()
        .first()
        .expect("one invocation")
        .command_string();
    assert!(!command.contains(" -i "), "empty identity should be omitted: {command}");
}

#[rstest]
fn run_surfaces_non_zero_exit_with_output(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    runner.push_success();
    runner.push_output(Some(3), "partial", "boom");
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    let err = session
        .run("make install")
        .expect_err("non-zero exit should fail");

    let RemoteError::Command(failure) = err else {
        panic!("expected command error, got {err:?}");
    };
    assert_eq!(failure.command, "make install");
    assert_eq!(failure.exit_status, Some(3));
    assert_eq!(failure.output, "partial\nboom");
    assert!(failure.to_string().contains("exited with status 3"));
}

#[rstest]
fn run_reuses_the_control_socket(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    session.run("echo hi").expect("command should succeed");

    let invocations = runner.invocations();
    let master_socket = control_path(invocations.first().expect("master"));
    let command_socket = control_path(invocations.get(1).expect("command"));
    assert_eq!(master_socket, command_socket);
    assert_eq!(runner.remote_commands(), vec![String::from("echo hi")]);
}

#[rstest]
fn upload_skips_missing_local_files(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    let outcome = session
        .upload(
            &Utf8PathBuf::from("/definitely/not/here.json"),
            "project/here.json",
        )
        .expect("missing file should be skipped");

    assert_eq!(outcome, UploadOutcome::Skipped);
    assert_eq!(runner.invocations().len(), 1, "only the master should run");
}

#[rstest]
fn upload_skips_directories(settings: SshSettings) {
    let dir = tempfile::tempdir().expect("temp dir");
    let local = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp path");
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    let outcome = session
        .upload(&local, "project/dir")
        .expect("directory should be skipped");

    assert_eq!(outcome, UploadOutcome::Skipped);
    assert_eq!(runner.invocations().len(), 1, "only the master should run");
}

#[rstest]
fn upload_creates_parent_then_copies(settings: SshSettings) {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "{{}}").expect("write temp file");
    let local = Utf8PathBuf::from_path_buf(file.path().to_path_buf()).expect("utf8 temp path");

    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    let outcome = session
        .upload(&local, "project/config.json")
        .expect("upload should succeed");

    assert_eq!(outcome, UploadOutcome::Uploaded);
    assert_eq!(runner.remote_commands(), vec![String::from("mkdir -p project")]);
    let copy = runner
        .invocations()
        .into_iter()
        .find(|invocation| invocation.program == "scp")
        .expect("scp invocation");
    let command = copy.command_string();
    assert!(command.starts_with("scp -P 2222"), "unexpected scp: {command}");
    assert!(
        command.ends_with(&format!("{local} root@10.0.0.1:project/config.json")),
        "unexpected scp: {command}"
    );
}

#[rstest]
fn close_sends_exit_to_the_master(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    let session = executor
        .open("10.0.0.1", "root", "/keys/id_rsa")
        .expect("session should open");

    session.close().expect("close should succeed");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2, "close must run exactly once");
    let close = invocations.last().expect("close invocation");
    assert!(close.is_session_control());
    assert!(close.command_string().ends_with("-O exit root@10.0.0.1"));
}

#[rstest]
fn dropping_an_open_session_closes_it(settings: SshSettings) {
    let runner = ScriptedRunner::accepting_all();
    let executor = executor(settings, &runner);
    {
        let _session = executor
            .open("10.0.0.1", "root", "/keys/id_rsa")
            .expect("session should open");
    }

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(
        invocations
            .last()
            .expect("close invocation")
            .command_string()
            .contains("-O exit")
    );
}

#[rstest]
#[case("ssh_bin")]
#[case("scp_bin")]
fn validation_rejects_blank_binaries(settings: SshSettings, #[case] field: &str) {
    let mut blank = settings;
    match field {
        "ssh_bin" => blank.ssh_bin = String::from("  "),
        _ => blank.scp_bin = String::new(),
    }

    let err = RemoteExecutor::new(blank, ScriptedRunner::new()).expect_err("blank binary");

    assert_eq!(
        err,
        RemoteError::InvalidConfig {
            field: field.to_owned()
        }
    );
    assert!(err.to_string().contains("HOIST_SSH_"));
}

fn control_path(invocation: &crate::test_support::CommandInvocation) -> String {
    invocation
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .find(|arg| arg.starts_with("ControlPath="))
        .expect("control path option")
}
