//! # Pramuka CLI Module
//!
//! This module implements the CLI interface for Pramuka.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `status` - Show progress counts
//! - `institution` - Register or update an institution
//! - `member` - Register or update a member
//! - `promote-a` - Promote a member's Track A
//! - `promote-b` - Promote a member's Track B row
//! - `revert` - Revert one tier of a record
//! - `award` - Show or evaluate a member's award
//! - `approve` - Approve a pending award
//!
//! The CLI operates on the database directly, with administrator rights.

mod commands;

use crate::config::DEFAULT_CONFIG_FILE;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pramuka_core::{Examiner, Gender, PramukaError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Pramuka - skill-badge progression server
///
/// Tracks scouts through the TKU and TKK tiers, numbers their certificates
/// and decides Garuda award eligibility.
#[derive(Parser, Debug)]
#[command(name = "pramuka")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database
    #[arg(short = 'D', long, global = true, default_value = "pramuka.redb")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (discarded on exit)
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Path to the TOML configuration file
    #[arg(short = 'C', long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Storage backend selection.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Redb,
}

impl Backend {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Redb => "redb",
        }
    }
}

/// Examiner metadata recorded with a promotion.
#[derive(Args, Debug, Clone, Default)]
pub struct ExaminerArgs {
    /// Examiner name
    #[arg(long = "examiner", default_value = "")]
    pub name: String,

    /// Examiner address
    #[arg(long = "examiner-address", default_value = "")]
    pub address: String,

    /// Examiner position
    #[arg(long = "examiner-position", default_value = "")]
    pub position: String,
}

impl From<ExaminerArgs> for Examiner {
    fn from(args: ExaminerArgs) -> Self {
        Examiner::new(args.name, args.address, args.position)
    }
}

/// Member gender as given on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderArg {
    Male,
    Female,
    Unspecified,
}

impl From<GenderArg> for Gender {
    fn from(arg: GenderArg) -> Self {
        match arg {
            GenderArg::Male => Gender::Male,
            GenderArg::Female => Gender::Female,
            GenderArg::Unspecified => Gender::Unspecified,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show progress counts
    Status,

    /// Register or update an institution
    Institution {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        name: String,

        /// Gudep code for male members
        #[arg(long)]
        male_code: String,

        /// Gudep code for female members
        #[arg(long)]
        female_code: String,
    },

    /// Register or update a member
    Member {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        name: String,

        /// Home institution id
        #[arg(long)]
        institution: u64,

        #[arg(long, value_enum, default_value_t = GenderArg::Unspecified)]
        gender: GenderArg,

        /// Membership number
        #[arg(long, default_value = "")]
        number: String,
    },

    /// Promote a member's Track A (next tier unless --tier is given)
    PromoteA {
        #[arg(long)]
        member: u64,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        tier: Option<u8>,

        #[command(flatten)]
        examiner: ExaminerArgs,
    },

    /// Promote a member's Track B row in a category, or a row by record id
    PromoteB {
        #[arg(long, required_unless_present = "record", requires = "category")]
        member: Option<u64>,

        #[arg(long)]
        category: Option<u64>,

        /// Record id of the row (instead of --member/--category)
        #[arg(long, conflicts_with_all = ["member", "category"])]
        record: Option<u64>,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        tier: u8,

        #[command(flatten)]
        examiner: ExaminerArgs,
    },

    /// Revert one tier of a record
    Revert {
        #[arg(long)]
        record: u64,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        tier: u8,
    },

    /// Show award eligibility, or create the pending award with --evaluate
    Award {
        #[arg(long)]
        member: u64,

        #[arg(long)]
        evaluate: bool,
    },

    /// Approve a pending award
    Approve {
        #[arg(long)]
        member: u64,

        /// Name of the approver
        #[arg(long)]
        by: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PramukaError> {
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        config: cli.config,
        json_mode: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, host, port).await,
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Institution {
            id,
            name,
            male_code,
            female_code,
        }) => cmd_institution(&ctx, id, name, male_code, female_code),
        Some(Commands::Member {
            id,
            name,
            institution,
            gender,
            number,
        }) => cmd_member(&ctx, id, name, institution, gender.into(), number),
        Some(Commands::PromoteA {
            member,
            tier,
            examiner,
        }) => cmd_promote_a(&ctx, member, tier, examiner.into()),
        Some(Commands::PromoteB {
            member,
            category,
            record,
            tier,
            examiner,
        }) => cmd_promote_b(&ctx, member, category, record, tier, examiner.into()),
        Some(Commands::Revert { record, tier }) => cmd_revert(&ctx, record, tier),
        Some(Commands::Award { member, evaluate }) => cmd_award(&ctx, member, evaluate),
        Some(Commands::Approve { member, by }) => cmd_approve(&ctx, member, &by),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn promote_b_by_category() {
        let cli = Cli::try_parse_from([
            "pramuka", "promote-b", "--member", "3", "--category", "7", "--tier", "2",
            "--examiner", "Kak Wahyu",
        ])
        .expect("parse");
        match cli.command {
            Some(Commands::PromoteB {
                member,
                category,
                record,
                tier,
                examiner,
            }) => {
                assert_eq!((member, category, record, tier), (Some(3), Some(7), None, 2));
                assert_eq!(examiner.name, "Kak Wahyu");
            }
            other => unreachable!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn promote_b_rejects_record_with_member() {
        let result = Cli::try_parse_from([
            "pramuka", "promote-b", "--record", "5", "--member", "3", "--tier", "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn track_a_has_two_tiers() {
        let result =
            Cli::try_parse_from(["pramuka", "promote-a", "--member", "1", "--tier", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn backend_defaults_to_redb() {
        let cli = Cli::try_parse_from(["pramuka", "status"]).expect("parse");
        assert_eq!(cli.backend, Backend::Redb);
        assert!(!cli.json_mode);
    }
}
