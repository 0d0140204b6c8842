use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Distributed job and cron dispatcher", long_about = None)]
pub struct Cli {
    /// Path to herald.toml (defaults to ~/.herald/herald.toml)
    #[arg(long, global = true, env = "HERALD_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job and schedule workers until SIGINT/SIGTERM
    Run,

    /// Manage one-off jobs
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Manage recurring schedules
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Evaluate cron expressions without touching the database
    Cron {
        #[command(subcommand)]
        command: CronCommand,
    },
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Start a job, immediately or at a later time
    Add {
        /// Target: a URL (http mode) or SNS topic ARN (sns mode)
        #[arg(long)]
        arn: String,

        /// Payload delivered to the target
        #[arg(long, default_value = "{}")]
        payload: String,

        /// RFC 3339 time to run at (defaults to now)
        #[arg(long)]
        when: Option<DateTime<Utc>>,
    },

    /// Show a job and its response
    Get { id: i64 },

    /// Delete a job that has not run and is not claimed
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Create a schedule with one or more crontabs
    Add {
        #[arg(long)]
        arn: String,

        #[arg(long, default_value = "{}")]
        payload: String,

        /// Cron expression; repeat for several cadences
        #[arg(long = "cron", required = true)]
        crontabs: Vec<String>,

        /// RFC 3339 start time (defaults to now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Identifier in the calling system
        #[arg(long, default_value = "")]
        external_id: String,

        /// Name of the calling system
        #[arg(long, default_value = "")]
        by: String,
    },

    /// Show a schedule and its crontabs
    Get { id: i64 },

    /// Stop a schedule from firing, permanently
    Deactivate { id: i64 },
}

#[derive(Subcommand)]
pub enum CronCommand {
    /// Print the next fire times of an expression
    Next {
        expression: String,

        /// RFC 3339 reference time (defaults to now)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long, default_value = "5")]
        count: usize,
    },
}
