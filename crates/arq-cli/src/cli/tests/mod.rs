//! CLI parse tests.

use super::{Cli, CliCommand, PriorityArg};
use clap::Parser;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_get_defaults() {
    match parse(&["arq", "get", "https://api.example.com/items"]) {
        CliCommand::Get {
            url,
            params,
            cache_ttl,
            retries,
            no_retry,
            priority,
            timeout,
        } => {
            assert_eq!(url, "https://api.example.com/items");
            assert!(params.is_empty());
            assert!(cache_ttl.is_none());
            assert!(retries.is_none());
            assert!(!no_retry);
            assert_eq!(priority, PriorityArg::Normal);
            assert!(timeout.is_none());
        }
        other => panic!("expected Get, got {other:?}"),
    }
}

#[test]
fn cli_parse_get_with_options() {
    match parse(&[
        "arq",
        "get",
        "https://api.example.com/items",
        "--param",
        "page=2",
        "--param",
        "q=rust",
        "--cache-ttl",
        "60",
        "--retries",
        "5",
        "--priority",
        "high",
        "--timeout",
        "20",
    ]) {
        CliCommand::Get {
            params,
            cache_ttl,
            retries,
            priority,
            timeout,
            ..
        } => {
            assert_eq!(params, vec!["page=2".to_string(), "q=rust".to_string()]);
            assert_eq!(cache_ttl, Some(60));
            assert_eq!(retries, Some(5));
            assert_eq!(priority, PriorityArg::High);
            assert_eq!(timeout, Some(20));
        }
        other => panic!("expected Get, got {other:?}"),
    }
}

#[test]
fn cli_parse_get_no_retry_flag() {
    match parse(&["arq", "get", "https://example.com", "--no-retry"]) {
        CliCommand::Get { no_retry, .. } => assert!(no_retry),
        other => panic!("expected Get, got {other:?}"),
    }
}

#[test]
fn cli_parse_head() {
    match parse(&["arq", "head", "https://example.com/file.bin"]) {
        CliCommand::Head { url } => assert_eq!(url, "https://example.com/file.bin"),
        other => panic!("expected Head, got {other:?}"),
    }
}

#[test]
fn cli_parse_probe_defaults() {
    match parse(&["arq", "probe"]) {
        CliCommand::Probe { url, count } => {
            assert!(url.is_none());
            assert_eq!(count, 3);
        }
        other => panic!("expected Probe, got {other:?}"),
    }
}

#[test]
fn cli_parse_probe_with_target() {
    match parse(&["arq", "probe", "https://ping.example.com", "--count", "10"]) {
        CliCommand::Probe { url, count } => {
            assert_eq!(url.as_deref(), Some("https://ping.example.com"));
            assert_eq!(count, 10);
        }
        other => panic!("expected Probe, got {other:?}"),
    }
}

#[test]
fn cli_parse_config() {
    assert!(matches!(parse(&["arq", "config"]), CliCommand::Config));
}

#[test]
fn cli_rejects_unknown_priority() {
    assert!(Cli::try_parse_from(["arq", "get", "https://example.com", "--priority", "urgent"])
        .is_err());
}

#[test]
fn cli_parse_completions() {
    match parse(&["arq", "completions", "bash"]) {
        CliCommand::Completions { shell } => {
            assert_eq!(shell, clap_complete::Shell::Bash);
        }
        other => panic!("expected Completions, got {other:?}"),
    }
}
