use clap::Parser;

use dynacache::cli::commands::inspect::InspectCommands;
use dynacache::cli::{Cli, Commands};
use dynacache::domain::models::ChangeOperation;

#[test]
fn test_parse_run_with_preload_list() {
    let cli = Cli::try_parse_from(["dynacache", "run", "--agents", "web_agent,finance_agent", "--no-listener"]).unwrap();

    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.agents, vec!["web_agent", "finance_agent"]);
            assert!(args.no_listener);
            assert!(!args.preload);
            assert_eq!(args.stats_interval, 0);
        }
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_parse_inspect_with_global_flags() {
    let cli = Cli::try_parse_from(["dynacache", "inspect", "tools", "--build", "--json"]).unwrap();

    assert!(cli.json);
    match cli.command {
        Commands::Inspect(args) => {
            assert!(args.build);
            assert!(matches!(args.command, InspectCommands::Tools));
        }
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_parse_notify() {
    let cli = Cli::try_parse_from(["dynacache", "notify", "delete", "agents", "finance_agent", "--row-id", "6f1c"]).unwrap();

    match cli.command {
        Commands::Notify(args) => {
            assert_eq!(args.operation, ChangeOperation::Delete);
            assert_eq!(args.table, "agents");
            assert_eq!(args.id, "finance_agent");
            assert_eq!(args.row_id.as_deref(), Some("6f1c"));
        }
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_notify_rejects_unknown_operation() {
    assert!(Cli::try_parse_from(["dynacache", "notify", "update", "agents", "x"]).is_err());
}

#[test]
fn test_config_file_flag() {
    let cli = Cli::try_parse_from(["dynacache", "--config", "/etc/dynacache.yaml", "config"]).unwrap();
    assert!(matches!(cli.command, Commands::Config));
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/dynacache.yaml")));
}
