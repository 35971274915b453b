//! Cooperative one-shot task scheduler driven by the control loop.

use std::fmt;

use tracing::debug;

/// Work deferred until its deadline, run with the loop's context.
pub type Task<C> = Box<dyn FnOnce(&mut C)>;

struct Scheduled<C> {
    name: &'static str,
    due_ms: u64,
    task: Task<C>,
}

/// Named one-shot tasks.
///
/// Tasks never run from `schedule_once`; the control loop calls
/// [`TaskScheduler::tick`] and every due task runs there, oldest deadline
/// first.
pub struct TaskScheduler<C> {
    tasks: Vec<Scheduled<C>>,
}

impl<C> Default for TaskScheduler<C> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<C> TaskScheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once, `delay_ms` after `now_ms`.
    pub fn schedule_once<F>(&mut self, name: &'static str, delay_ms: u64, now_ms: u64, task: F)
    where
        F: FnOnce(&mut C) + 'static,
    {
        debug!(task = name, delay_ms, "Scheduled");
        self.tasks.push(Scheduled {
            name,
            due_ms: now_ms.saturating_add(delay_ms),
            task: Box::new(task),
        });
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task due at `now_ms`. Returns the names of the tasks run.
    pub fn tick(&mut self, now_ms: u64, ctx: &mut C) -> Vec<&'static str> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|t| t.due_ms <= now_ms);
        self.tasks = pending;
        due.sort_by_key(|t| t.due_ms);

        due.into_iter()
            .map(|t| {
                debug!(task = t.name, "Running");
                (t.task)(ctx);
                t.name
            })
            .collect()
    }
}

impl<C> fmt::Debug for TaskScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tasks.iter().map(|t| (t.name, t.due_ms)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_runs_once_when_due() {
        let mut scheduler = TaskScheduler::<Vec<&'static str>>::new();
        let mut log = Vec::new();
        scheduler.schedule_once("reboot", 1000, 500, |log| log.push("reboot"));

        assert!(scheduler.tick(1499, &mut log).is_empty());
        assert!(scheduler.is_scheduled("reboot"));
        assert_eq!(scheduler.tick(1500, &mut log), vec!["reboot"]);
        assert!(scheduler.tick(5000, &mut log).is_empty());
        assert_eq!(log, vec!["reboot"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_due_tasks_run_in_deadline_order() {
        let mut scheduler = TaskScheduler::<Vec<u32>>::new();
        let mut order = Vec::new();
        scheduler.schedule_once("late", 300, 0, |o| o.push(3));
        scheduler.schedule_once("early", 100, 0, |o| o.push(1));
        scheduler.schedule_once("later", 900, 0, |o| o.push(9));

        assert_eq!(scheduler.tick(500, &mut order), vec!["early", "late"]);
        assert_eq!(order, vec![1, 3]);
        assert_eq!(scheduler.len(), 1);
    }
}
