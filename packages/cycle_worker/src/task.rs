use std::any::type_name;
use std::fmt;

use crate::Worker;

/// One-shot callback that receives the worker and its persistent state.
///
/// Used for the init and exit callbacks and for dispatched tasks.
pub(crate) type OneShot<S> = Box<dyn FnOnce(&Worker<S>, &S) + Send>;

/// Callback invoked once per cycle.
pub(crate) type CycleCallback<S> = Box<dyn FnMut(&Worker<S>, &S) + Send>;

/// Element of a worker's task queue.
///
/// The queue is a growable pool, so a record has a vacant default form. The sequence number
/// restores submission order when records are drained, as slot order does not follow it once
/// nodes are reused after a clear.
pub(crate) struct TaskRecord<S> {
    pub(crate) sequence: u64,
    pub(crate) task: Option<OneShot<S>>,
}

impl<S> Default for TaskRecord<S> {
    fn default() -> Self {
        Self {
            sequence: 0,
            task: None,
        }
    }
}

impl<S> fmt::Debug for TaskRecord<S> {
    #[cfg_attr(test, mutants::skip)] // We have no API contract here.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("sequence", &self.sequence)
            .field("pending", &self.task.is_some())
            .finish()
    }
}

impl<S> TaskRecord<S> {
    /// Moves the task out of the record, leaving it in its vacant form.
    pub(crate) fn take(&mut self) -> Option<(u64, OneShot<S>)> {
        self.task.take().map(|task| (self.sequence, task))
    }
}

/// Orders items taken from task records by their sequence numbers.
pub(crate) fn into_submission_order<T>(mut taken: Vec<(u64, T)>) -> Vec<T> {
    taken.sort_unstable_by_key(|(sequence, _)| *sequence);

    taken.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(TaskRecord<u32>: Send, Default);

    #[test]
    fn default_record_is_empty() {
        let record = TaskRecord::<()>::default();

        assert_eq!(record.sequence, 0);
        assert!(record.task.is_none());
    }

    #[test]
    fn take_empties_record() {
        let mut record = TaskRecord::<()> {
            sequence: 9,
            task: Some(Box::new(|_, _| {})),
        };

        let (sequence, _task) = record.take().unwrap();

        assert_eq!(sequence, 9);
        assert!(record.take().is_none());
    }

    #[test]
    fn submission_order_follows_sequence() {
        let taken = vec![(7, "late"), (3, "early"), (5, "middle")];

        assert_eq!(
            into_submission_order(taken),
            vec!["early", "middle", "late"]
        );
    }
}
