//! Argument parsing tests for the CLI

use std::path::PathBuf;

use clap::Parser;

use super::args::{Cli, Commands, ExecArgs};
use shepherd_config::ReaderKind;

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("shepherd").chain(args.iter().copied()))
}

fn run_exec(cli: Cli) -> (ExecArgs, Vec<String>, Vec<String>) {
    match cli.command {
        Commands::Run {
            exec,
            redirects,
            command,
        } => (exec, redirects, command),
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn test_build_cli_is_consistent() {
    super::build_cli().debug_assert();
}

#[test]
fn test_run_takes_command_after_separator() {
    let cli = parse(&["run", "--", "ls", "-la", "--color"]).unwrap();
    let (_, redirects, command) = run_exec(cli);

    assert!(redirects.is_empty());
    assert_eq!(command, ["ls", "-la", "--color"]);
}

#[test]
fn test_run_requires_a_command() {
    assert!(parse(&["run"]).is_err());
}

#[test]
fn test_run_collects_env_and_redirects() {
    let cli = parse(&[
        "run",
        "--env",
        "A=1",
        "--env",
        "B=x=y",
        "--redirect",
        "2>&1",
        "--",
        "make",
    ])
    .unwrap();
    let (exec, redirects, _) = run_exec(cli);

    assert_eq!(
        exec.env,
        [
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "x=y".to_string())
        ]
    );
    assert_eq!(redirects, ["2>&1"]);
}

#[test]
fn test_env_without_equals_is_rejected() {
    assert!(parse(&["run", "--env", "NOVALUE", "--", "true"]).is_err());
    assert!(parse(&["run", "--env", "=value", "--", "true"]).is_err());
}

#[test]
fn test_negative_expected_exit_code() {
    let cli = parse(&["run", "--expect", "-1", "--", "true"]).unwrap();
    let (exec, _, _) = run_exec(cli);
    assert_eq!(exec.expect, Some(-1));
}

#[test]
fn test_kill_on_timeout_requires_timeout() {
    assert!(parse(&["run", "--kill-on-timeout", "--", "sleep", "5"]).is_err());
    assert!(parse(&["run", "--timeout", "1", "--kill-on-timeout", "--", "sleep", "5"]).is_ok());
}

#[test]
fn test_idle_ms_conflicts_with_blocking() {
    assert!(parse(&["run", "--blocking", "--idle-ms", "10", "--", "true"]).is_err());
}

#[test]
fn test_cli_args_carry_overrides() {
    let cli = parse(&[
        "--config",
        "custom.toml",
        "run",
        "--expect",
        "2",
        "--blocking",
        "--timeout",
        "30",
        "--",
        "true",
    ])
    .unwrap();
    let args = cli.cli_args();

    assert_eq!(args.config_path, Some(PathBuf::from("custom.toml")));
    assert_eq!(args.expected_exit_code, Some(2));
    assert_eq!(args.reader, Some(ReaderKind::Blocking));
    assert_eq!(args.timeout_secs, Some(30));
    assert_eq!(args.idle_timeout_ms, None);
}

#[test]
fn test_config_flag_is_global() {
    let cli = parse(&["config", "--config", "other.toml", "-v"]).unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.cli_args().config_path, Some(PathBuf::from("other.toml")));
    assert_eq!(cli.cli_args().expected_exit_code, None);
}

#[test]
fn test_script_accepts_stdin_dash() {
    let cli = parse(&["script", "--stdin", "input.txt", "-"]).unwrap();
    match cli.command {
        Commands::Script { exec, file } => {
            assert_eq!(file, PathBuf::from("-"));
            assert_eq!(exec.stdin, Some(PathBuf::from("input.txt")));
        }
        other => panic!("expected script, got {other:?}"),
    }
}

#[test]
fn test_render_flags() {
    let cli = parse(&["render", "--multiline", "--cwd", "/tmp", "--", "ls", "x"]).unwrap();
    match cli.command {
        Commands::Render {
            multiline,
            cwd,
            redirects,
            command,
        } => {
            assert!(multiline);
            assert_eq!(cwd, Some(PathBuf::from("/tmp")));
            assert!(redirects.is_empty());
            assert_eq!(command, ["ls", "x"]);
        }
        other => panic!("expected render, got {other:?}"),
    }
}
