use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use jobbench_core::EngineCounters;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::workload::{ProcessDefinition, Variables};

/// Attempts per job before it moves to the dead-letter table.
pub const JOB_RETRIES: u32 = 3;

/// Wall clock derived from the tokio clock, so paused-time tests see consistent history.
#[derive(Debug, Clone, Copy)]
struct Clock {
    origin_wall: SystemTime,
    origin: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            origin_wall: SystemTime::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> SystemTime {
        self.origin_wall + self.origin.elapsed()
    }
}

/// Which executor a job was handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOwner {
    /// Acquired from the job table by an embedded executor.
    Table,
    /// Travels through a broker queue; never acquired from the table.
    Queue,
}

#[derive(Debug)]
struct Job {
    instance: u64,
    step: u32,
    retries: u32,
    owner: JobOwner,
    locked: bool,
}

#[derive(Debug)]
struct Instance {
    definition: Arc<ProcessDefinition>,
    vars: Variables,
}

#[derive(Debug, Default)]
struct History {
    finished_instances: u64,
    finished_activities: u64,
    first_start: Option<SystemTime>,
    last_end: Option<SystemTime>,
}

impl History {
    fn record(&mut self, start: SystemTime, end: SystemTime) {
        self.finished_activities += 1;
        self.first_start = Some(self.first_start.map_or(start, |t| t.min(start)));
        self.last_end = Some(self.last_end.map_or(end, |t| t.max(end)));
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    deployed: HashMap<String, Arc<ProcessDefinition>>,
    instances: HashMap<u64, Instance>,
    jobs: BTreeMap<u64, Job>,
    dead_letter_jobs: u64,
    history: History,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn create_job(&mut self, instance: u64, step: u32, owner: JobOwner) -> u64 {
        let id = self.next_id();
        self.jobs.insert(
            id,
            Job {
                instance,
                step,
                retries: JOB_RETRIES,
                owner,
                locked: owner == JobOwner::Queue,
            },
        );
        id
    }

    fn finish_instance(&mut self, id: u64, now: SystemTime) {
        self.instances.remove(&id);
        self.history.finished_instances += 1;
        self.history.record(now, now);
    }
}

/// What happened to a job handed to [`Store::execute_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobResult {
    /// The step completed; `next_job` continues the instance, `None` means it finished.
    Completed { next_job: Option<u64> },
    /// The step failed and the job will be retried.
    Retry { job: u64, retries_left: u32 },
    /// The step failed with no retries left.
    DeadLetter { job: u64 },
}

/// Shared relational state of one `jdbc:memory:<name>` database.
#[derive(Debug)]
pub(crate) struct Store {
    name: String,
    username: String,
    password: String,
    clock: Clock,
    state: Mutex<State>,
    job_ready: Notify,
}

impl Store {
    pub(crate) fn new(name: &str, username: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            clock: Clock::new(),
            state: Mutex::new(State::default()),
            job_ready: Notify::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        if self.username == username && self.password == password {
            Ok(())
        } else {
            Err(Error::Authentication {
                user: username.to_string(),
            })
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops every table, deployments included.
    pub(crate) fn reset(&self) {
        *self.state() = State::default();
    }

    pub(crate) fn deploy(&self, definition: Arc<ProcessDefinition>) {
        self.state()
            .deployed
            .insert(definition.key().to_string(), definition);
    }

    /// Starts an instance; returns its id and the job of its first async step, if any.
    pub(crate) fn start_instance(
        &self,
        key: &str,
        input1: i64,
        input2: i64,
        owner: JobOwner,
    ) -> Result<(u64, Option<u64>)> {
        let now = self.clock.now();
        let mut state = self.state();
        let definition = state
            .deployed
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotDeployed(key.to_string()))?;

        let id = state.next_id();
        let vars = Variables::from([("input1".to_string(), input1), ("input2".to_string(), input2)]);
        let steps = definition.async_steps();
        state.instances.insert(id, Instance { definition, vars });

        // start event
        state.history.record(now, now);

        if steps == 0 {
            state.finish_instance(id, now);
            return Ok((id, None));
        }

        let job = state.create_job(id, 0, owner);
        drop(state);

        if owner == JobOwner::Table {
            self.job_ready.notify_one();
        }
        Ok((id, Some(job)))
    }

    /// Locks up to `max` unlocked table jobs, oldest first.
    pub(crate) fn acquire_jobs(&self, max: usize) -> Vec<u64> {
        let mut state = self.state();
        let mut out = Vec::new();
        for (id, job) in state.jobs.iter_mut() {
            if out.len() >= max {
                break;
            }
            if job.owner == JobOwner::Table && !job.locked {
                job.locked = true;
                out.push(*id);
            }
        }
        out
    }

    pub(crate) async fn job_ready(&self) {
        self.job_ready.notified().await;
    }

    /// Runs the service task behind `job`. Follow-up jobs inherit the job's owner.
    pub(crate) fn execute_job(&self, job_id: u64) -> Result<JobResult> {
        let start = self.clock.now();
        let mut state = self.state();
        let state = &mut *state;

        let job = state.jobs.get(&job_id).ok_or(Error::UnknownJob(job_id))?;
        let (instance_id, step, owner) = (job.instance, job.step, job.owner);

        let instance = state
            .instances
            .get_mut(&instance_id)
            .ok_or(Error::UnknownJob(job_id))?;
        let res = instance.definition.run_step(step, &mut instance.vars);
        let steps = instance.definition.async_steps();
        let end = self.clock.now();

        match res {
            Ok(()) => {
                state.jobs.remove(&job_id);
                state.history.record(start, end);

                let next = step + 1;
                if next >= steps {
                    state.finish_instance(instance_id, end);
                    return Ok(JobResult::Completed { next_job: None });
                }

                let next_job = state.create_job(instance_id, next, owner);
                if owner == JobOwner::Table {
                    self.job_ready.notify_one();
                }
                Ok(JobResult::Completed {
                    next_job: Some(next_job),
                })
            }
            Err(err) => {
                tracing::debug!(job = job_id, step, error = %err, "service task failed");
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    return Err(Error::UnknownJob(job_id));
                };
                job.retries = job.retries.saturating_sub(1);
                if job.retries == 0 {
                    state.jobs.remove(&job_id);
                    state.dead_letter_jobs += 1;
                    return Ok(JobResult::DeadLetter { job: job_id });
                }

                let left = job.retries;
                if owner == JobOwner::Table {
                    job.locked = false;
                    self.job_ready.notify_one();
                }
                Ok(JobResult::Retry {
                    job: job_id,
                    retries_left: left,
                })
            }
        }
    }

    /// Releases a table job that was acquired but never executed.
    pub(crate) fn unlock_job(&self, job_id: u64) {
        if let Some(job) = self.state().jobs.get_mut(&job_id) {
            job.locked = false;
        }
    }

    pub(crate) fn counters(&self) -> EngineCounters {
        let state = self.state();
        let live = state.instances.len() as u64;
        EngineCounters {
            process_instances: live,
            // Each running instance holds its process-level execution plus one child execution.
            executions: live * 2,
            tasks: 0,
            async_jobs: state.jobs.len() as u64,
            timer_jobs: 0,
            dead_letter_jobs: state.dead_letter_jobs,
            finished_process_instances: state.history.finished_instances,
            finished_tasks: 0,
            finished_activities: state.history.finished_activities,
        }
    }

    pub(crate) fn first_activity_start(&self) -> Option<SystemTime> {
        self.state().history.first_start
    }

    pub(crate) fn last_activity_end(&self) -> Option<SystemTime> {
        self.state().history.last_end
    }
}
