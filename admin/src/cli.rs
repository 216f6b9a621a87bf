//! Command-line surface of the operator tool.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use idcard_workflow_core::record::{HolderAttributes, NewRequest};
use idcard_workflow_core::registrant::RegistrantId;
use idcard_workflow_core::state::Transition;
use std::str::FromStr;

/// Operator tool for the ID card request workflow.
#[derive(Parser, Debug)]
#[command(name = "idcard-admin", version, about)]
pub struct Cli {
    /// Database URL (overrides `DATABASE_URL`)
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Operator subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or upgrade the workflow tables
    Migrate,
    /// Add an identifier to the login allowlist
    Register {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
    },
    /// Submit a request on behalf of a registrant
    Submit(SubmitArgs),
    /// Show the derived status of an identifier
    Status {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
    },
    /// List pending requests, newest first
    List,
    /// Annotate the pending request's status label
    SetStatus {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
        /// New status label
        status: String,
    },
    /// Move a request along the lifecycle
    Advance {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
        /// Transition to apply
        #[arg(value_enum)]
        transition: TransitionArg,
    },
    /// Archive every accepted row for an identifier
    TransferAccepted {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
    },
    /// Archive the rejected row for an identifier
    TransferRejected {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
    },
    /// Show archived rows for an identifier
    History {
        /// Registrant identifier
        #[arg(value_parser = RegistrantId::from_str)]
        identifier: RegistrantId,
        /// Which archive to read
        #[arg(long, value_enum, default_value_t = HistoryKind::Accepted)]
        kind: HistoryKind,
    },
}

/// Fields of a new submission.
#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    /// Registrant identifier
    #[arg(value_parser = RegistrantId::from_str)]
    pub identifier: RegistrantId,
    /// Holder name
    #[arg(long)]
    pub name: String,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_of_birth: Option<NaiveDate>,
    /// Department
    #[arg(long, default_value = "")]
    pub department: String,
    /// Year of study
    #[arg(long, default_value = "")]
    pub year: String,
    /// Section
    #[arg(long, default_value = "")]
    pub section: String,
    /// Library code
    #[arg(long, default_value = "")]
    pub library_code: String,
    /// Reason for the request
    #[arg(long, default_value = "")]
    pub reason: String,
}

impl From<SubmitArgs> for NewRequest {
    fn from(args: SubmitArgs) -> Self {
        Self {
            identifier: args.identifier,
            holder: HolderAttributes {
                name: args.name,
                date_of_birth: args.date_of_birth,
                department: args.department,
                year: args.year,
                section: args.section,
                library_code: args.library_code,
            },
            reason: args.reason,
            attachment: None,
        }
    }
}

/// Lifecycle transition names accepted on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransitionArg {
    /// Pending to print queue
    Approve,
    /// Print queue to accepted
    MarkPrinted,
    /// Pending to rejected
    Reject,
}

impl From<TransitionArg> for Transition {
    fn from(arg: TransitionArg) -> Self {
        match arg {
            TransitionArg::Approve => Self::Approve,
            TransitionArg::MarkPrinted => Self::MarkPrinted,
            TransitionArg::Reject => Self::Reject,
        }
    }
}

/// History archive selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum HistoryKind {
    /// Archived accepted rows
    Accepted,
    /// Archived rejected rows
    Rejected,
}
