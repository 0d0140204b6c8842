//! Claim/lease behaviour across independent connections to one database file.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use herald_core::clock::ManualClock;
use herald_core::cron::next_fire_time;
use herald_core::types::{JobId, NewJob, NewSchedule};
use herald_store::{init_db, open, CrontabQueue, JobManager, JobQueue, ScheduleManager, StoreError};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    path: String,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.db").to_string_lossy().into_owned();
        init_db(&open(&path, StdDuration::from_secs(5)).unwrap()).unwrap();
        Self {
            _dir: dir,
            path,
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    /// A job store on its own connection, like a separate worker process.
    fn jobs(&self) -> JobManager {
        let conn = open(&self.path, StdDuration::from_secs(5)).unwrap();
        JobManager::with_clock(conn, self.clock.clone())
    }

    fn schedules(&self) -> ScheduleManager {
        let conn = open(&self.path, StdDuration::from_secs(5)).unwrap();
        ScheduleManager::with_clock(conn, self.clock.clone())
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn due_job(arn: &str) -> NewJob {
    NewJob {
        when: t0() - Duration::seconds(1),
        arn: arn.to_string(),
        payload: "{}".to_string(),
    }
}

fn hourly_from(from: DateTime<Utc>) -> NewSchedule {
    NewSchedule {
        from,
        arn: "https://hooks.invalid/tick".to_string(),
        payload: r#"{"tick":true}"#.to_string(),
        crontabs: vec!["0 * * * *".to_string()],
        external_id: String::new(),
        by: String::new(),
    }
}

fn drain(jobs: &JobManager) -> Vec<JobId> {
    let mut ids = Vec::new();
    while let Some(job) = jobs.claim_job("drain", 30).unwrap() {
        ids.push(job.id);
    }
    ids
}

#[test]
fn second_claimant_gets_nothing_while_claim_is_valid() {
    let fx = Fixture::new();
    let (w1, w2) = (fx.jobs(), fx.jobs());
    w1.start_job(&due_job("a"), None).unwrap();

    assert!(w1.claim_job("w1", 30).unwrap().is_some());
    assert!(w2.claim_job("w2", 30).unwrap().is_none());
}

#[test]
fn concurrent_claimants_never_share_a_job() {
    let fx = Fixture::new();
    let seed = fx.jobs();
    for i in 0..40 {
        seed.start_job(&due_job(&format!("target-{i}")), None).unwrap();
    }

    let claimed: Vec<JobId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let jobs = fx.jobs();
                s.spawn(move || {
                    let owner = format!("w{w}");
                    let mut mine = Vec::new();
                    while let Some(job) = jobs.claim_job(&owner, 30).unwrap() {
                        mine.push(job.id);
                    }
                    mine
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let unique: HashSet<JobId> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 40);
    assert_eq!(unique.len(), 40);
}

#[test]
fn expired_lease_makes_job_claimable_again() {
    let fx = Fixture::new();
    let (w1, w2) = (fx.jobs(), fx.jobs());
    let job = w1.start_job(&due_job("a"), None).unwrap();
    w1.claim_job("w1", 30).unwrap().unwrap();

    fx.clock.advance(Duration::minutes(29));
    assert!(w2.claim_job("w2", 30).unwrap().is_none());

    fx.clock.advance(Duration::minutes(1));
    assert_eq!(w2.claim_job("w2", 30).unwrap().unwrap().id, job.id);
}

#[test]
fn first_completion_wins() {
    let fx = Fixture::new();
    let (w1, w2) = (fx.jobs(), fx.jobs());
    let job = w1.start_job(&due_job("a"), None).unwrap();
    w1.claim_job("w1", 1).unwrap().unwrap();

    // w1 stalls past its lease; w2 redelivers and finishes first
    fx.clock.advance(Duration::minutes(2));
    w2.claim_job("w2", 30).unwrap().unwrap();
    w2.complete_job(job.id, "from w2", None).unwrap();
    w1.complete_job(job.id, "", Some("late failure from w1")).unwrap();

    let response = w1.get_job(job.id).unwrap().unwrap().response.unwrap();
    assert_eq!(response.response, "from w2");
    assert!(!response.is_error);
    assert!(response.error.is_empty());
}

#[test]
fn token_is_single_use() {
    let fx = Fixture::new();
    let schedules = fx.schedules();
    let jobs = fx.jobs();
    schedules
        .create_schedule(&hourly_from(t0() - Duration::hours(2)))
        .unwrap();

    let claimed = schedules.claim_schedule("w1", 30).unwrap().unwrap();
    let next = next_fire_time(&claimed.crontab.expression, claimed.crontab.next).unwrap();
    let job_id = schedules
        .start_job_and_advance(claimed.crontab.id, claimed.schedule.id, &claimed.token, next)
        .unwrap();

    let again = schedules
        .start_job_and_advance(
            claimed.crontab.id,
            claimed.schedule.id,
            &claimed.token,
            next + Duration::hours(1),
        )
        .unwrap_err();
    assert!(matches!(again, StoreError::ClaimLost { .. }));

    let job = jobs.get_job(job_id).unwrap().unwrap().job;
    assert_eq!(job.schedule_id, Some(claimed.schedule.id));
    assert_eq!(job.arn, claimed.schedule.arn);
    assert_eq!(job.when, t0());
    assert_eq!(drain(&jobs), vec![job_id]);
}

#[test]
fn stale_claimant_is_fenced_out_after_reclaim() {
    let fx = Fixture::new();
    let (s1, s2) = (fx.schedules(), fx.schedules());
    let created = s1
        .create_schedule(&hourly_from(t0() - Duration::minutes(30)))
        .unwrap();

    let stale = s1.claim_schedule("w1", 30).unwrap().unwrap();
    fx.clock.advance(Duration::minutes(31));
    let fresh = s2.claim_schedule("w2", 30).unwrap().unwrap();
    assert_eq!(stale.crontab.id, fresh.crontab.id);
    assert_ne!(stale.token, fresh.token);

    let next = next_fire_time(&fresh.crontab.expression, fresh.crontab.next).unwrap();
    let err = s1
        .start_job_and_advance(stale.crontab.id, stale.schedule.id, &stale.token, next)
        .unwrap_err();
    assert!(matches!(err, StoreError::ClaimLost { .. }));

    s2.start_job_and_advance(fresh.crontab.id, fresh.schedule.id, &fresh.token, next)
        .unwrap();

    let crontab = &s1
        .get_schedule(created.schedule.id)
        .unwrap()
        .unwrap()
        .crontabs[0];
    assert_eq!(crontab.previous, Some(t0() - Duration::minutes(30)));
    assert_eq!(crontab.next, next);
    assert_eq!(drain(&fx.jobs()).len(), 1);
}

#[test]
fn deactivated_schedule_is_never_claimed() {
    let fx = Fixture::new();
    let schedules = fx.schedules();
    let created = schedules
        .create_schedule(&hourly_from(t0() - Duration::hours(5)))
        .unwrap();
    schedules.deactivate_schedule(created.schedule.id).unwrap();

    for _ in 0..3 {
        assert!(schedules.claim_schedule("w1", 30).unwrap().is_none());
        fx.clock.advance(Duration::hours(1));
    }
}

#[test]
fn deactivation_mid_tick_blocks_the_advance() {
    let fx = Fixture::new();
    let schedules = fx.schedules();
    let created = schedules
        .create_schedule(&hourly_from(t0() - Duration::hours(1)))
        .unwrap();
    let claimed = schedules.claim_schedule("w1", 30).unwrap().unwrap();
    schedules.deactivate_schedule(created.schedule.id).unwrap();

    let err = schedules
        .start_job_and_advance(claimed.crontab.id, claimed.schedule.id, &claimed.token, t0())
        .unwrap_err();
    assert!(matches!(err, StoreError::ClaimLost { .. }));
    assert!(drain(&fx.jobs()).is_empty());
}

#[test]
fn schedule_behind_works_through_each_missed_tick() {
    let fx = Fixture::new();
    let schedules = fx.schedules();
    schedules
        .create_schedule(&hourly_from(t0() - Duration::hours(3)))
        .unwrap();

    let mut fired = Vec::new();
    while let Some(claimed) = schedules.claim_schedule("w1", 30).unwrap() {
        fired.push(claimed.crontab.next);
        let next = next_fire_time(&claimed.crontab.expression, claimed.crontab.next).unwrap();
        schedules
            .start_job_and_advance(claimed.crontab.id, claimed.schedule.id, &claimed.token, next)
            .unwrap();
    }

    assert_eq!(
        fired,
        vec![
            t0() - Duration::hours(3),
            t0() - Duration::hours(2),
            t0() - Duration::hours(1),
        ]
    );
    assert_eq!(drain(&fx.jobs()).len(), 3);
}

#[test]
fn each_crontab_of_a_schedule_ticks_independently() {
    let fx = Fixture::new();
    let schedules = fx.schedules();
    let mut new = hourly_from(t0() - Duration::minutes(1));
    new.crontabs.push("30 * * * *".to_string());
    schedules.create_schedule(&new).unwrap();

    let a = schedules.claim_schedule("w1", 30).unwrap().unwrap();
    let b = schedules.claim_schedule("w2", 30).unwrap().unwrap();
    assert_ne!(a.crontab.id, b.crontab.id);
    assert!(schedules.claim_schedule("w3", 30).unwrap().is_none());
}
