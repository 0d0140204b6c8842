//! One-shot administrative commands. Each returns the JSON document to print.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use herald_core::config::HeraldConfig;
use herald_core::cron::CronExpression;
use herald_core::types::{JobId, NewJob, NewSchedule, ScheduleId};
use herald_store::{init_db, open, JobManager, ScheduleManager};
use serde_json::{json, Value};

use crate::cli::{CronCommand, JobCommand, ScheduleCommand};

fn job_manager(config: &HeraldConfig) -> Result<JobManager> {
    let conn = open(
        &config.database.path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .with_context(|| format!("failed to open database {}", config.database.path))?;
    init_db(&conn)?;
    Ok(JobManager::new(conn))
}

fn schedule_manager(config: &HeraldConfig) -> Result<ScheduleManager> {
    let conn = open(
        &config.database.path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .with_context(|| format!("failed to open database {}", config.database.path))?;
    init_db(&conn)?;
    Ok(ScheduleManager::new(conn))
}

pub fn job(config: &HeraldConfig, command: JobCommand) -> Result<Value> {
    let jobs = job_manager(config)?;
    match command {
        JobCommand::Add { arn, payload, when } => {
            let job = jobs.start_job(
                &NewJob {
                    when: when.unwrap_or_else(Utc::now),
                    arn,
                    payload,
                },
                None,
            )?;
            Ok(serde_json::to_value(job)?)
        }
        JobCommand::Get { id } => {
            let found = jobs
                .get_job(JobId(id))?
                .ok_or_else(|| anyhow!("job {id} not found"))?;
            Ok(serde_json::to_value(found)?)
        }
        JobCommand::Delete { id } => {
            let deleted = jobs.delete_job(JobId(id))?;
            Ok(json!({ "id": id, "deleted": deleted }))
        }
    }
}

pub fn schedule(config: &HeraldConfig, command: ScheduleCommand) -> Result<Value> {
    let schedules = schedule_manager(config)?;
    match command {
        ScheduleCommand::Add {
            arn,
            payload,
            crontabs,
            from,
            external_id,
            by,
        } => {
            let created = schedules.create_schedule(&NewSchedule {
                from: from.unwrap_or_else(Utc::now),
                arn,
                payload,
                crontabs,
                external_id,
                by,
            })?;
            Ok(serde_json::to_value(created)?)
        }
        ScheduleCommand::Get { id } => {
            let found = schedules
                .get_schedule(ScheduleId(id))?
                .ok_or_else(|| anyhow!("schedule {id} not found"))?;
            Ok(serde_json::to_value(found)?)
        }
        ScheduleCommand::Deactivate { id } => {
            let deactivated = schedules.deactivate_schedule(ScheduleId(id))?;
            Ok(json!({ "id": id, "deactivated": deactivated }))
        }
    }
}

pub fn cron(command: CronCommand) -> Result<Value> {
    match command {
        CronCommand::Next {
            expression,
            from,
            count,
        } => {
            let from = from.unwrap_or_else(Utc::now);
            let parsed = CronExpression::parse(&expression)?;
            let next: Vec<DateTime<Utc>> = parsed.upcoming(from, count);
            Ok(json!({ "expression": expression, "from": from, "next": next }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(dir: &tempfile::TempDir) -> HeraldConfig {
        let mut config = HeraldConfig::default();
        config.database.path = dir.path().join("herald.db").to_string_lossy().into_owned();
        config
    }

    #[test]
    fn job_add_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let added = job(
            &config,
            JobCommand::Add {
                arn: "https://hooks.invalid/a".to_string(),
                payload: "{}".to_string(),
                when: Some(Utc::now() + chrono::Duration::hours(1)),
            },
        )
        .unwrap();
        let id = added["id"].as_i64().unwrap();

        let got = job(&config, JobCommand::Get { id }).unwrap();
        assert_eq!(got["job"]["arn"], "https://hooks.invalid/a");
        assert!(got["response"].is_null());

        let deleted = job(&config, JobCommand::Delete { id }).unwrap();
        assert_eq!(deleted["deleted"], true);
        assert!(job(&config, JobCommand::Get { id }).is_err());
    }

    #[test]
    fn schedule_add_then_deactivate() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let created = schedule(
            &config,
            ScheduleCommand::Add {
                arn: "https://hooks.invalid/s".to_string(),
                payload: "{}".to_string(),
                crontabs: vec!["0 * * * *".to_string(), "*/5 * * * *".to_string()],
                from: None,
                external_id: "order-9".to_string(),
                by: "shop".to_string(),
            },
        )
        .unwrap();
        let id = created["schedule"]["id"].as_i64().unwrap();
        assert_eq!(created["crontabs"].as_array().unwrap().len(), 2);

        let first = schedule(&config, ScheduleCommand::Deactivate { id }).unwrap();
        let second = schedule(&config, ScheduleCommand::Deactivate { id }).unwrap();
        assert_eq!(first["deactivated"], true);
        assert_eq!(second["deactivated"], false);

        let got = schedule(&config, ScheduleCommand::Get { id }).unwrap();
        assert_eq!(got["schedule"]["active"], false);
    }

    #[test]
    fn schedule_add_rejects_bad_cron() {
        let dir = tempfile::tempdir().unwrap();
        let result = schedule(
            &config(&dir),
            ScheduleCommand::Add {
                arn: "a".to_string(),
                payload: "{}".to_string(),
                crontabs: vec!["nope".to_string()],
                from: None,
                external_id: String::new(),
                by: String::new(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn cron_next_lists_fire_times() {
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let out = cron(CronCommand::Next {
            expression: "0 * * * *".to_string(),
            from: Some(from),
            count: 3,
        })
        .unwrap();
        let next: Vec<DateTime<Utc>> = serde_json::from_value(out["next"].clone()).unwrap();
        assert_eq!(
            next,
            vec![
                from + chrono::Duration::hours(1),
                from + chrono::Duration::hours(2),
                from + chrono::Duration::hours(3),
            ]
        );
    }
}
