use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stow",
    version,
    about = "Consistency checks for deduplicated backup repositories"
)]
pub(crate) struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Check the repository for errors
    Check(CheckArgs),
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct CheckArgs {
    /// Repository directory (overrides the config file)
    #[arg(short = 'R', long = "repo")]
    pub repo: Option<String>,

    /// Read and verify every pack (slow but thorough)
    #[arg(long, conflicts_with = "read_data_subset")]
    pub read_data: bool,

    /// Read only bucket n of t buckets of packs (1 <= n <= t <= 256)
    #[arg(long, value_name = "n/t")]
    pub read_data_subset: Option<String>,

    /// Treat blobs no snapshot references as errors
    #[arg(long)]
    pub check_unused: bool,

    /// Treat packs not referenced by the index as errors
    #[arg(long)]
    pub orphans_are_errors: bool,

    /// Number of worker threads per phase
    #[arg(long)]
    pub workers: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_args(args: &[&str]) -> CheckArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Check(args) => args,
        }
    }

    #[test]
    fn check_defaults() {
        let args = check_args(&["stow", "check"]);
        assert!(args.repo.is_none());
        assert!(!args.read_data);
        assert!(args.read_data_subset.is_none());
        assert!(!args.check_unused);
        assert!(args.workers.is_none());
    }

    #[test]
    fn check_flags_parse() {
        let args = check_args(&[
            "stow",
            "check",
            "-R",
            "/srv/repo",
            "--read-data-subset",
            "2/5",
            "--check-unused",
            "--orphans-are-errors",
            "--workers",
            "8",
        ]);
        assert_eq!(args.repo.as_deref(), Some("/srv/repo"));
        assert_eq!(args.read_data_subset.as_deref(), Some("2/5"));
        assert!(args.check_unused);
        assert!(args.orphans_are_errors);
        assert_eq!(args.workers, Some(8));
    }

    #[test]
    fn read_data_flags_conflict() {
        let result = Cli::try_parse_from([
            "stow",
            "check",
            "--read-data",
            "--read-data-subset",
            "1/2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_parse() {
        let cli = Cli::try_parse_from(["stow", "-vv", "-c", "stow.yaml", "check"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some("stow.yaml"));
    }
}
