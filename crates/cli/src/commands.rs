use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run (or resume) the migration described by a config file
    Migrate {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Print every migration event as a JSON line")]
        events: bool,
    },
    /// Print the block sequence without migrating anything
    Plan {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Print at most this many blocks")]
        limit: Option<u64>,
    },
    /// Show recorded progress for the run a config file describes
    Progress {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
}
