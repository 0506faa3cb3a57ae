use clap::error::ErrorKind;
use clap::Parser;
use cloudharvest::cli::{Cli, Commands};

#[test]
fn call_parses_repeated_args_and_flags() {
    let cli = Cli::try_parse_from([
        "cloudharvest",
        "call",
        "get_devices",
        "--host",
        "nce.example.com",
        "--username",
        "ops",
        "--password",
        "s3cret",
        "--tenant-id",
        "t-1",
        "--arg",
        "siteId=abc",
        "--arg",
        "pageSize=100",
        "--insecure",
        "--print-body",
    ])
    .expect("parse");

    match cli.command {
        Commands::Call {
            endpoint,
            host,
            username,
            password,
            tenant_id,
            args,
            insecure,
            print_body,
        } => {
            assert_eq!(endpoint, "get_devices");
            assert_eq!(host, "nce.example.com");
            assert_eq!(username, "ops");
            assert_eq!(password.as_deref(), Some("s3cret"));
            assert_eq!(tenant_id.as_deref(), Some("t-1"));
            assert_eq!(args, vec!["siteId=abc", "pageSize=100"]);
            assert!(insecure);
            assert!(print_body);
        }
        _ => panic!("expected the call subcommand"),
    }
}

#[test]
fn call_requires_a_host() {
    let err = Cli::try_parse_from(["cloudharvest", "call", "get_tenants", "--username", "ops"])
        .expect_err("missing --host must not parse");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn password_is_optional_at_parse_time() {
    let cli = Cli::try_parse_from([
        "cloudharvest",
        "call",
        "get_tenants",
        "--host",
        "nce.example.com",
        "--username",
        "ops",
    ])
    .expect("parse");

    match cli.command {
        Commands::Call { password, .. } => assert!(password.is_none()),
        _ => panic!("expected the call subcommand"),
    }
}

#[test]
fn query_takes_a_database_and_a_statement() {
    let cli = Cli::try_parse_from([
        "cloudharvest",
        "query",
        "--database",
        "main",
        "SELECT version()",
    ])
    .expect("parse");

    match cli.command {
        Commands::Query { database, sql } => {
            assert_eq!(database, "main");
            assert_eq!(sql, "SELECT version()");
        }
        _ => panic!("expected the query subcommand"),
    }
}

#[test]
fn config_dir_is_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from(["cloudharvest", "endpoints", "--config-dir", "/etc/cloudharvest"])
        .expect("parse");
    assert_eq!(
        cli.config_dir.as_deref(),
        Some(std::path::Path::new("/etc/cloudharvest"))
    );
    assert!(matches!(cli.command, Commands::Endpoints));
}
