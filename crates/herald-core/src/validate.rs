//! Input checks for new jobs and schedules, run before anything is written.

use crate::cron::CronExpression;
use crate::error::{HeraldError, Result};
use crate::types::{
    NewJob, NewSchedule, MAX_ARN_LEN, MAX_BY_LEN, MAX_EXTERNAL_ID_LEN, MAX_PAYLOAD_BYTES,
};

pub fn validate_job(job: &NewJob) -> Result<()> {
    check_arn(&job.arn)?;
    check_payload(&job.payload)
}

/// Checks field limits and that every crontab expression parses.
pub fn validate_schedule(schedule: &NewSchedule) -> Result<()> {
    check_arn(&schedule.arn)?;
    check_payload(&schedule.payload)?;
    check_len("external_id", &schedule.external_id, MAX_EXTERNAL_ID_LEN)?;
    check_len("by", &schedule.by, MAX_BY_LEN)?;

    if schedule.crontabs.is_empty() {
        return Err(HeraldError::Validation(
            "a schedule needs at least one crontab".to_string(),
        ));
    }
    for expression in &schedule.crontabs {
        CronExpression::parse(expression)?;
    }
    Ok(())
}

fn check_arn(arn: &str) -> Result<()> {
    if arn.trim().is_empty() {
        return Err(HeraldError::Validation("arn must not be empty".to_string()));
    }
    check_len("arn", arn, MAX_ARN_LEN)
}

fn check_payload(payload: &str) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(HeraldError::Validation(format!(
            "payload is {} bytes, limit is {}",
            payload.len(),
            MAX_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(HeraldError::Validation(format!(
            "{field} is {} bytes, limit is {max}",
            value.len()
        )));
    }
    Ok(())
}
