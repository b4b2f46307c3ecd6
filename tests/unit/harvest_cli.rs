use activity_harvester::cli::{Cli, Commands};
use clap::Parser;

fn parse(extra: &[&str]) -> Cli {
    try_parse(extra).unwrap()
}

fn try_parse(extra: &[&str]) -> Result<Cli, clap::Error> {
    let mut args = vec![
        "activity-harvester",
        "harvest",
        "--platform",
        "stackexchange",
        "--kind",
        "answers",
        "--scope",
        "stackoverflow",
        "--start",
        "2023-01-01",
        "--end",
        "2023-12-31",
    ];
    args.extend_from_slice(extra);
    Cli::try_parse_from(args)
}

#[test]
fn test_cli_defaults_to_max_retries_5() {
    assert_eq!(parse(&[]).max_retries, 5);
}

#[test]
fn test_cli_job_args_build_a_daily_job() {
    let cli = parse(&["--granularity-days", "7"]);
    let Commands::Harvest(args) = cli.command else {
        panic!("expected harvest command");
    };
    let job = args.job.to_job().unwrap();
    assert_eq!(job.granularity_days(), 7);
    // 365 days in weeks, the final chunk clipped
    assert_eq!(job.chunks().len(), 53);
    assert_eq!(job.identity().as_str().split(':').next(), Some("stackexchange"));
}

#[test]
fn test_cli_rfc3339_end_is_exclusive() {
    let cli = Cli::try_parse_from([
        "activity-harvester",
        "status",
        "--platform",
        "github",
        "--kind",
        "commits",
        "--scope",
        "tokio-rs/tokio",
        "--start",
        "2024-01-01T00:00:00Z",
        "--end",
        "2024-01-03T00:00:00Z",
    ])
    .unwrap();
    let Commands::Status(args) = cli.command else {
        panic!("expected status command");
    };
    assert_eq!(args.to_job().unwrap().chunks().len(), 2);
}

#[test]
fn test_cli_metrics_addr_parses_socket_address() {
    let cli = parse(&["--metrics-addr", "127.0.0.1:9000"]);
    assert_eq!(cli.metrics_addr.map(|a| a.port()), Some(9000));
    assert!(Cli::try_parse_from([
        "activity-harvester",
        "--metrics-addr",
        "not-an-address",
        "status",
    ])
    .is_err());
}

#[test]
fn test_cli_quota_threshold_is_optional_override() {
    let Commands::Harvest(args) = parse(&[]).command else {
        panic!("expected harvest command");
    };
    assert_eq!(args.quota_threshold, None);

    let Commands::Harvest(args) = parse(&["--quota-threshold", "10"]).command else {
        panic!("expected harvest command");
    };
    assert_eq!(args.quota_threshold, Some(10));
    assert!(try_parse(&["--quota-threshold=-1"]).is_err());
}

#[test]
fn test_cli_rejects_granularity_beyond_a_century() {
    assert!(try_parse(&["--granularity-days", "36500"]).is_ok());
    assert!(try_parse(&["--granularity-days", "200000000"]).is_err());
}
