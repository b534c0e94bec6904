use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vault Monitor
///
/// Keeps a local file and the agent's environment in sync with a secret
/// stored in HashiCorp Vault.
#[derive(Parser, Debug)]
#[command(name = "vault-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the config file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Poll the secret and publish changes until interrupted (default)
    Run,
    /// Fetch and publish the secret once, then exit
    CheckNow,
    /// Check the config file and print a summary
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn no_subcommand_parses() {
        let args = Args::try_parse_from(["vault-monitor", "--config", "agent.toml"]).unwrap();
        assert_eq!(args.command, None);
        assert_eq!(args.config, Some(PathBuf::from("agent.toml")));
        assert!(!args.verbose);
    }

    #[test]
    fn subcommand_accepts_global_flags() {
        let args = Args::try_parse_from(["vault-monitor", "check-now", "-c", "agent.yaml", "-v"]).unwrap();
        assert_eq!(args.command, Some(Commands::CheckNow));
        assert!(args.verbose);
    }
}
