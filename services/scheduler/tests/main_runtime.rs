use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

fn spawn_scheduler(extra_args: &[&str]) -> std::process::Child {
    let bin = std::env::var("CARGO_BIN_EXE_vaccine-scheduler").unwrap_or_else(|_| {
        let current = std::env::current_exe().expect("current exe");
        let debug_dir = current
            .parent()
            .and_then(|p| p.parent())
            .expect("target debug dir");
        debug_dir
            .join("vaccine-scheduler")
            .to_string_lossy()
            .to_string()
    });
    let mut cmd = Command::new(bin);
    cmd.args(extra_args)
        .env("SCHEDULER_STORAGE_BACKEND", "memory")
        .env_remove("SCHEDULER_CONFIG")
        .env_remove("SCHEDULER_METRICS_BIND")
        .env_remove("SCHEDULER_SHOW_BANNER")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    cmd.spawn().expect("spawn scheduler")
}

fn wait_for_exit(child: &mut std::process::Child, timeout: Duration) -> std::process::ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }
        if Instant::now() >= deadline {
            child.kill().expect("kill on timeout");
            return child.wait().expect("wait after kill");
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

fn run_session(extra_args: &[&str], input: &str) -> (std::process::ExitStatus, String) {
    let mut child = spawn_scheduler(extra_args);
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    let status = wait_for_exit(&mut child, Duration::from_secs(5));
    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout")
        .read_to_string(&mut stdout)
        .expect("read stdout");
    (status, stdout)
}

#[test]
fn binary_prints_banner_and_exits_on_quit() {
    let (status, stdout) = run_session(&[], "quit\n");
    assert!(status.success());
    assert!(stdout.contains("Welcome to the COVID-19 Vaccine Reservation Scheduling Application!"));
    assert!(stdout.ends_with("> Bye!\n"));
}

#[test]
fn binary_exits_cleanly_at_end_of_input() {
    let (status, stdout) = run_session(
        &["--quiet"],
        "create_caregiver carol Str0ng!Pwd\nlogin_caregiver carol Str0ng!Pwd\n",
    );
    assert!(status.success());
    assert_eq!(stdout, "> Created user carol\n> Logged in as: carol\n> ");
}
