use chrono::{DateTime, Utc};
use scavbot_core_types::TaskId;

use crate::model::Task;

/// Ordered tasks of one lane.
#[derive(Clone, Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| &task.id == id)
    }

    /// Earliest `next_run` first, then highest priority. Stable, so ties
    /// keep their previous order.
    pub fn sort_for_dispatch(&mut self) {
        self.tasks
            .sort_by(|a, b| a.next_run.cmp(&b.next_run).then(b.priority.cmp(&a.priority)));
    }

    pub fn first_due_mut(&mut self, now: DateTime<Utc>) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.is_due(now))
    }

    pub fn due_mut(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut().filter(move |task| task.is_due(now))
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|task| &task.id == id)?;
        Some(self.tasks.remove(index))
    }

    /// Drop every task matching `predicate`; returns how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Task) -> bool,
    {
        let before = self.tasks.len();
        self.tasks.retain(|task| !predicate(task));
        before - self.tasks.len()
    }

    pub fn to_vec(&self) -> Vec<Task> {
        self.tasks.clone()
    }
}
