//! Tick scheduler
//!
//! Deferred and repeating work that runs on the world thread. A due task
//! runs to completion inside the tick that it falls due on; nothing is ever
//! preempted. Cancellation only takes effect between ticks.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, error};

use crate::error::Result;

/// What a task wants after running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Run again after the interval (one-shot tasks finish regardless)
    Continue,
    /// Finish now
    Stop,
}

/// Identifies a scheduled task for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

type TaskBody<C> = Box<dyn FnMut(&mut C) -> Result<TaskControl> + Send>;

/// A unit of scheduled work over a context `C` (the world in practice)
pub struct Task<C> {
    name: String,
    delay: u64,
    interval: Option<u64>,
    body: TaskBody<C>,
}

impl<C> Task<C> {
    /// Run once, `delay` ticks from now
    pub fn once(
        name: impl Into<String>,
        delay: u64,
        body: impl FnMut(&mut C) -> Result<TaskControl> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            delay: delay.max(1),
            interval: None,
            body: Box::new(body),
        }
    }

    /// Run every `interval` ticks, first after one interval
    pub fn repeating(
        name: impl Into<String>,
        interval: u64,
        body: impl FnMut(&mut C) -> Result<TaskControl> + Send + 'static,
    ) -> Self {
        let interval = interval.max(1);
        Self {
            name: name.into(),
            delay: interval,
            interval: Some(interval),
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Option<u64> {
        self.interval
    }
}

impl<C> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("interval", &self.interval)
            .finish()
    }
}

struct Scheduled<C> {
    handle: TaskHandle,
    due: u64,
    task: Task<C>,
}

/// Holds pending tasks and runs the due ones each tick
pub struct TaskScheduler<C> {
    tick: u64,
    next_handle: u64,
    tasks: Vec<Scheduled<C>>,
    cancelled: HashSet<TaskHandle>,
}

impl<C> Default for TaskScheduler<C> {
    fn default() -> Self {
        Self {
            tick: 0,
            next_handle: 0,
            tasks: Vec::new(),
            cancelled: HashSet::new(),
        }
    }
}

impl<C> TaskScheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ticks pulsed so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn schedule(&mut self, task: Task<C>) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle += 1;
        debug!(task = %task.name, delay = task.delay, interval = ?task.interval, "Scheduled task");
        self.tasks.push(Scheduled {
            handle,
            due: self.tick + task.delay,
            task,
        });
        handle
    }

    /// Cancel a task. It will not run on any later tick; a task that is
    /// running right now finishes its current run.
    pub fn cancel(&mut self, handle: TaskHandle) {
        self.cancelled.insert(handle);
    }

    /// Advance one tick and run every due task once
    pub fn pulse(&mut self, context: &mut C) {
        self.apply_cancellations();
        self.tick += 1;

        let tick = self.tick;
        let (due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|entry| entry.due <= tick);
        self.tasks = pending;

        for mut entry in due {
            match (entry.task.body)(context) {
                Ok(TaskControl::Continue) => match entry.task.interval {
                    Some(interval) => {
                        entry.due = tick + interval;
                        self.tasks.push(entry);
                    }
                    None => debug!(task = %entry.task.name, "Task finished"),
                },
                Ok(TaskControl::Stop) => debug!(task = %entry.task.name, "Task stopped"),
                Err(e) => {
                    error!(task = %entry.task.name, error = %e, "Task failed, removing");
                }
            }
        }
    }

    /// An empty scheduler that hands out handles this one will accept back
    /// through [`TaskScheduler::absorb`]. Used while this one is detached
    /// to run tasks that need the owning context.
    pub fn stand_in(&self) -> Self {
        Self {
            tick: self.tick,
            next_handle: self.next_handle,
            tasks: Vec::new(),
            cancelled: HashSet::new(),
        }
    }

    /// Take over tasks and cancellations recorded on a stand-in
    pub fn absorb(&mut self, other: TaskScheduler<C>) {
        self.next_handle = self.next_handle.max(other.next_handle);
        for mut entry in other.tasks {
            entry.due = self.tick + entry.task.delay;
            self.tasks.push(entry);
        }
        self.cancelled.extend(other.cancelled);
        self.apply_cancellations();
    }

    fn apply_cancellations(&mut self) {
        if self.cancelled.is_empty() {
            return;
        }
        let cancelled = std::mem::take(&mut self.cancelled);
        self.tasks.retain(|entry| {
            let keep = !cancelled.contains(&entry.handle);
            if !keep {
                debug!(task = %entry.task.name, "Task cancelled");
            }
            keep
        });
    }
}

impl<C> fmt::Debug for TaskScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tick", &self.tick)
            .field("pending", &self.tasks.len())
            .finish()
    }
}
