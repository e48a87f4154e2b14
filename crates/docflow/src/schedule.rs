//! Follow-up tasks requested by actions.
//!
//! Tasks wait on a virtual clock advanced by [`Document::tick`](crate::Document::tick).
//! Retiring a component cancels its tasks.

use crate::address::{ComponentId, VarName};
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A named action to run on `component` once the clock reaches `due`.
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    pub due: u64,
    /// Insertion order; keeps tasks due on the same tick in FIFO order.
    pub seq: u64,
    pub component: ComponentId,
    pub action: VarName,
    pub args: IndexMap<String, Value>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest due first, then earliest scheduled.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<ScheduledTask>,
    now: u64,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue `action` to run `delay` ticks from now. A zero delay runs on
    /// the next tick.
    pub fn schedule(
        &mut self,
        component: ComponentId,
        action: VarName,
        args: IndexMap<String, Value>,
        delay: u64,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(ScheduledTask {
            due: self.now + delay.max(1),
            seq,
            component,
            action,
            args,
        });
    }

    pub fn cancel_component(&mut self, component: ComponentId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|task| task.component != component);
        before - self.queue.len()
    }

    /// Advance the clock by one tick and pop every task now due.
    pub fn advance(&mut self) -> Vec<ScheduledTask> {
        self.now += 1;
        let mut due = Vec::new();
        while let Some(task) = self.queue.peek() {
            if task.due > self.now {
                break;
            }
            if let Some(task) = self.queue.pop() {
                due.push(task);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(scheduler: &mut Scheduler, component: u32, action: &str, delay: u64) {
        scheduler.schedule(ComponentId(component), action.into(), IndexMap::new(), delay);
    }

    #[test]
    fn due_tasks_come_out_in_order() {
        let mut scheduler = Scheduler::new();
        task(&mut scheduler, 1, "late", 2);
        task(&mut scheduler, 1, "first", 1);
        task(&mut scheduler, 2, "second", 1);

        let due: Vec<_> = scheduler.advance().into_iter().map(|t| t.action).collect();
        assert_eq!(due, vec!["first".into(), "second".into()] as Vec<VarName>);
        assert_eq!(scheduler.advance().len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn cancel_drops_tasks_of_component() {
        let mut scheduler = Scheduler::new();
        task(&mut scheduler, 1, "a", 1);
        task(&mut scheduler, 2, "b", 1);
        assert_eq!(scheduler.cancel_component(ComponentId(1)), 1);
        let due = scheduler.advance();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].component, ComponentId(2));
    }
}
