use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a job/schedule target identifier.
pub const MAX_ARN_LEN: usize = 2048;
/// Maximum payload size in bytes (fits a MEDIUMTEXT-sized column).
pub const MAX_PAYLOAD_BYTES: usize = (1 << 24) - 1;
pub const MAX_EXTERNAL_ID_LEN: usize = 256;
pub const MAX_BY_LEN: usize = 256;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Primary key of a job row.
    JobId
);
row_id!(
    /// Primary key of a schedule row.
    ScheduleId
);
row_id!(
    /// Primary key of a crontab row.
    CrontabId
);

/// Fencing token bound to one claim instance on a crontab (or job) row.
///
/// A fresh UUIDv7 is minted on every successful claim, so a token from an
/// expired claim never matches the row again once somebody else re-claims it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(pub String);

impl ClaimToken {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClaimToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClaimToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Some work for an executor to do.
///
/// A job can be delayed by setting `when` in the future. It is terminal once a
/// [`JobResponse`] exists for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Set when the job was started by a crontab tick.
    pub schedule_id: Option<ScheduleId>,
    pub when: DateTime<Utc>,
    pub arn: String,
    pub payload: String,
}

/// The recorded outcome of executing a job. At most one exists per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: i64,
    pub job_id: JobId,
    pub time: DateTime<Utc>,
    pub response: String,
    pub is_error: bool,
    pub error: String,
}

/// Point-lookup result: a job plus its response, if it has completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithResponse {
    pub job: Job,
    pub response: Option<JobResponse>,
}

/// A recurring definition that produces jobs on one or more cron cadences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    /// Links this record to an external system.
    pub external_id: String,
    /// Which system made this record.
    pub by: String,
    pub arn: String,
    pub payload: String,
    pub created: DateTime<Utc>,
    /// The time the schedule starts from; every crontab's first `next`.
    pub from: DateTime<Utc>,
    pub active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// One cadence under a schedule, with its fire bookkeeping.
///
/// `next` only ever moves forward, and always from the previous `next`, so a
/// schedule that has fallen behind works through its missed ticks one by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crontab {
    pub id: CrontabId,
    pub schedule_id: ScheduleId,
    pub expression: String,
    pub previous: Option<DateTime<Utc>>,
    pub next: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Point-lookup result: a schedule plus all of its crontabs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWithCrontabs {
    pub schedule: Schedule,
    pub crontabs: Vec<Crontab>,
}

/// A due crontab tick claimed by one owner, with the fencing token that must
/// accompany the advance.
#[derive(Debug, Clone)]
pub struct ClaimedCrontab {
    pub schedule: Schedule,
    pub crontab: Crontab,
    pub token: ClaimToken,
}

/// Request to start a one-off job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub when: DateTime<Utc>,
    pub arn: String,
    pub payload: String,
}

/// Request to create a recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub from: DateTime<Utc>,
    pub arn: String,
    pub payload: String,
    pub crontabs: Vec<String>,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub by: String,
}
