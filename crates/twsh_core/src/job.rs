//! Job table and process-group lifecycle.
//!
//! One Job per launched pipeline: a process group, its member pids with
//! their last-known status, and a lifecycle state. The table is only ever
//! mutated from the shell's single thread; SIGCHLD merely flags that a
//! `reap` sweep is worth running (flag-and-poll, never from the handler).

use crate::error::{ShellError, ShellResult};
use std::collections::BTreeMap;
use std::fmt;
use twsh_hal::{process, Pid, WaitEvent};

pub type JobId = u32;

/// Last observed state of one pipeline member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Exited(i32),
    Signaled(i32),
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signaled(_))
    }

    /// Shell-visible status: exit code, or 128+N for a signal death.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code & 0xff),
            Self::Signaled(sig) => Some(128 + sig),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProcess {
    pub pid: Pid,
    pub status: ProcessStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground | Self::Background => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// One pipeline tracked as a unit.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub pgid: Pid,
    pub processes: Vec<JobProcess>,
    pub state: JobState,
    /// Originating command text, as shown by `jobs`.
    pub command: String,
    /// A state change not yet reported at a notification point.
    changed: bool,
}

impl Job {
    /// Record a wait event if it belongs to this job. Returns whether it did.
    pub fn apply_wait_event(&mut self, event: WaitEvent) -> bool {
        let (pid, status) = match event {
            WaitEvent::Exited { pid, status } => (pid, ProcessStatus::Exited(status)),
            WaitEvent::Signaled { pid, signal } => (pid, ProcessStatus::Signaled(signal as i32)),
            WaitEvent::Stopped { pid, .. } => (pid, ProcessStatus::Stopped),
            WaitEvent::Continued { pid } => (pid, ProcessStatus::Running),
        };
        let Some(member) = self.processes.iter_mut().find(|p| p.pid == pid) else {
            return false;
        };
        member.status = status;
        self.refresh_state();
        true
    }

    /// Derive the job state from its members.
    fn refresh_state(&mut self) {
        let old = self.state;
        if self.processes.iter().all(|p| p.status.is_terminal()) {
            self.state = JobState::Done;
        } else if self
            .processes
            .iter()
            .any(|p| p.status == ProcessStatus::Stopped)
            && !self
                .processes
                .iter()
                .any(|p| p.status == ProcessStatus::Running)
        {
            self.state = JobState::Stopped;
        } else if self.state == JobState::Stopped
            && self
                .processes
                .iter()
                .any(|p| p.status == ProcessStatus::Running)
        {
            self.state = JobState::Background;
        }
        if self.state != old {
            self.changed = true;
            tracing::debug!(job = self.id, from = %old, to = %self.state, "job state");
        }
    }

    /// Mark the job's current state as already reported, so the next
    /// notification sweep stays quiet about it.
    pub fn acknowledge(&mut self) {
        self.changed = false;
    }

    /// After SIGCONT: stopped members count as running again, before the
    /// kernel gets around to reporting Continued events.
    pub fn continue_all(&mut self, foreground: bool) {
        for member in &mut self.processes {
            if member.status == ProcessStatus::Stopped {
                member.status = ProcessStatus::Running;
            }
        }
        if self.state != JobState::Done {
            self.state = if foreground {
                JobState::Foreground
            } else {
                JobState::Background
            };
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn is_stopped(&self) -> bool {
        self.state == JobState::Stopped
    }

    /// Combined exit status of the pipeline. Without `pipefail` the last
    /// stage decides; with it, the rightmost non-zero stage (else 0).
    pub fn exit_status(&self, pipefail: bool) -> i32 {
        let statuses: Vec<i32> = self
            .processes
            .iter()
            .map(|p| p.status.exit_status().unwrap_or(0))
            .collect();
        if pipefail {
            statuses.iter().rev().find(|s| **s != 0).copied().unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        }
    }
}

/// The job table: active jobs keyed by id, plus current/previous tracking
/// for `%+` and `%-`.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
    current: Option<JobId>,
    previous: Option<JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly launched pipeline. Ids count up from 1 and are
    /// never reused while the previous holder is still in the table.
    pub fn create(
        &mut self,
        pgid: Pid,
        pids: &[Pid],
        command: String,
        state: JobState,
    ) -> JobId {
        let id = self.jobs.keys().next_back().map_or(1, |max| max + 1);
        let processes = pids
            .iter()
            .map(|pid| JobProcess {
                pid: *pid,
                status: ProcessStatus::Running,
            })
            .collect();
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                processes,
                state,
                command,
                changed: false,
            },
        );
        self.previous = self.current.take();
        self.current = Some(id);
        tracing::debug!(job = id, pgid = pgid.as_raw(), "job registered");
        id
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(&id);
        if self.current == Some(id) {
            self.current = self.previous.take();
        }
        if self.previous == Some(id) {
            self.previous = None;
        }
        if self.previous.is_none() {
            self.previous = self
                .jobs
                .keys()
                .rev()
                .find(|k| Some(**k) != self.current)
                .copied();
        }
        job
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn current_id(&self) -> Option<JobId> {
        self.current
    }

    /// Marker for job listings: `+` current, `-` previous, space otherwise.
    pub fn marker(&self, id: JobId) -> char {
        if self.current == Some(id) {
            '+'
        } else if self.previous == Some(id) {
            '-'
        } else {
            ' '
        }
    }

    /// Resolve a `%` job specification: `%N`, `%%`/`%+`, `%-`, `%prefix`,
    /// `%?substring`.
    pub fn resolve(&self, spec: &str) -> ShellResult<JobId> {
        let body = spec.strip_prefix('%').unwrap_or(spec);
        let id = match body {
            "" | "%" | "+" => self.current,
            "-" => self.previous.or(self.current),
            _ => {
                if let Ok(n) = body.parse::<JobId>() {
                    self.jobs.contains_key(&n).then_some(n)
                } else if let Some(sub) = body.strip_prefix('?') {
                    self.jobs
                        .values()
                        .find(|j| j.command.contains(sub))
                        .map(|j| j.id)
                } else {
                    self.jobs
                        .values()
                        .find(|j| j.command.starts_with(body))
                        .map(|j| j.id)
                }
            }
        };
        id.ok_or_else(|| ShellError::job_spec(spec))
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<JobId> {
        self.jobs
            .values()
            .find(|j| j.processes.iter().any(|p| p.pid == pid))
            .map(|j| j.id)
    }

    /// Poll every live member non-blockingly and fold the results in. Safe
    /// to call at any main-loop point; never called from a signal handler.
    pub fn reap(&mut self) {
        let pending: Vec<(JobId, Pid)> = self
            .jobs
            .values()
            .flat_map(|job| {
                job.processes
                    .iter()
                    .filter(|p| !p.status.is_terminal())
                    .map(move |p| (job.id, p.pid))
            })
            .collect();

        for (job_id, pid) in pending {
            match process::wait_process(pid, false) {
                Ok(Some(event)) => {
                    if let Some(job) = self.jobs.get_mut(&job_id) {
                        job.apply_wait_event(event);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(pid = pid.as_raw(), %err, "reap failed");
                }
            }
        }
    }

    /// Report jobs whose state changed since the last notification point and
    /// drop the ones that finished. Returns formatted lines.
    pub fn take_notifications(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let changed: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.changed)
            .map(|j| j.id)
            .collect();
        for id in changed {
            let marker = self.marker(id);
            if let Some(job) = self.jobs.get_mut(&id) {
                job.changed = false;
                lines.push(format!(
                    "[{}]{}  {:<24}{}",
                    job.id,
                    marker,
                    job.state.to_string(),
                    job.command
                ));
            }
            if self.jobs.get(&id).is_some_and(|j| j.is_done()) {
                self.remove(id);
            }
        }
        lines
    }
}
