// TaskBoard - the one multi-writer structure of a batch
//
// Every transition happens under the board lock, so a task can only be
// claimed once and only moves PENDING -> RUNNING -> COMPLETED | FAILED.

use crate::domain::{
    BatchProgress, BatchResult, MerchantTarget, MerchantTask, MerchantTaskStatus, ScrapedItem,
    WorkerId,
};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct BoardState {
    tasks: Vec<MerchantTask>,
    /// Indexes of terminal tasks in the order they finished
    finished: Vec<usize>,
}

pub struct TaskBoard {
    state: Mutex<BoardState>,
}

impl TaskBoard {
    pub fn new(targets: impl IntoIterator<Item = MerchantTarget>) -> Self {
        let tasks = targets
            .into_iter()
            .enumerate()
            .map(|(i, target)| MerchantTask::new(i, target))
            .collect();
        Self {
            state: Mutex::new(BoardState {
                tasks,
                finished: Vec::new(),
            }),
        }
    }

    // A worker panicking while holding the lock leaves the board consistent:
    // each transition is a single assignment sequence.
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim the next PENDING task for `worker`
    ///
    /// Returns the task index and a snapshot of the claimed task.
    pub fn claim(&self, worker: WorkerId, now: i64) -> Option<(usize, MerchantTask)> {
        let mut state = self.lock();
        let index = state
            .tasks
            .iter()
            .position(|t| t.status == MerchantTaskStatus::Pending)?;
        let task = &mut state.tasks[index];
        task.status = MerchantTaskStatus::Running;
        task.claimed_by = Some(worker);
        task.started_at = Some(now);
        Some((index, task.clone()))
    }

    /// RUNNING -> COMPLETED; None if the task was not running
    pub fn complete(&self, index: usize, item: ScrapedItem, now: i64) -> Option<MerchantTask> {
        let mut state = self.lock();
        let task = state.tasks.get_mut(index)?;
        if task.status != MerchantTaskStatus::Running {
            return None;
        }
        task.status = MerchantTaskStatus::Completed;
        task.finished_at = Some(now);
        task.result = Some(item);
        let done = task.clone();
        state.finished.push(index);
        Some(done)
    }

    /// RUNNING -> FAILED; None if the task was not running
    pub fn fail(&self, index: usize, error: impl Into<String>, now: i64) -> Option<MerchantTask> {
        let mut state = self.lock();
        let task = state.tasks.get_mut(index)?;
        if task.status != MerchantTaskStatus::Running {
            return None;
        }
        mark_failed(task, error.into(), now);
        let failed = task.clone();
        state.finished.push(index);
        Some(failed)
    }

    /// Fail whatever `worker` still has RUNNING (worker died mid-task)
    pub fn fail_running_for(&self, worker: WorkerId, error: &str, now: i64) -> Vec<MerchantTask> {
        self.fail_where(error, now, |t| {
            t.status == MerchantTaskStatus::Running && t.claimed_by == Some(worker)
        })
    }

    /// Fail every task nobody claimed
    pub fn fail_pending(&self, error: &str, now: i64) -> Vec<MerchantTask> {
        self.fail_where(error, now, |t| t.status == MerchantTaskStatus::Pending)
    }

    fn fail_where(
        &self,
        error: &str,
        now: i64,
        pred: impl Fn(&MerchantTask) -> bool,
    ) -> Vec<MerchantTask> {
        let mut state = self.lock();
        let BoardState { tasks, finished } = &mut *state;
        let mut failed = Vec::new();
        for (index, task) in tasks.iter_mut().enumerate() {
            if pred(task) {
                mark_failed(task, error.to_string(), now);
                finished.push(index);
                failed.push(task.clone());
            }
        }
        failed
    }

    pub fn has_pending(&self) -> bool {
        self.lock()
            .tasks
            .iter()
            .any(|t| t.status == MerchantTaskStatus::Pending)
    }

    pub fn progress(&self, elapsed_ms: i64, workers: usize) -> BatchProgress {
        BatchProgress::compute(&self.lock().tasks, elapsed_ms, workers)
    }

    /// Aggregate terminal tasks, in completion order
    pub fn result(&self, total_time_ms: i64) -> BatchResult {
        let state = self.lock();
        let mut completed_tasks = Vec::new();
        let mut failed_tasks = Vec::new();
        for &index in &state.finished {
            let task = state.tasks[index].clone();
            match task.status {
                MerchantTaskStatus::Completed => completed_tasks.push(task),
                MerchantTaskStatus::Failed => failed_tasks.push(task),
                _ => {}
            }
        }
        let total = state.tasks.len();
        let processed = completed_tasks.len() + failed_tasks.len();
        BatchResult {
            success: failed_tasks.is_empty(),
            total,
            completed: completed_tasks.len(),
            failed: failed_tasks.len(),
            completed_tasks,
            failed_tasks,
            total_time_ms,
            avg_time_per_task_ms: if processed == 0 {
                0
            } else {
                total_time_ms / processed as i64
            },
        }
    }
}

fn mark_failed(task: &mut MerchantTask, error: String, now: i64) {
    task.status = MerchantTaskStatus::Failed;
    task.finished_at = Some(now);
    task.error = Some(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn board(n: usize) -> TaskBoard {
        TaskBoard::new(
            (0..n).map(|i| MerchantTarget::from_url(&format!("https://portal.test/m/{}", i))),
        )
    }

    #[test]
    fn test_claim_in_input_order_then_exhaust() {
        let board = board(2);
        let (first, task) = board.claim(0, 10).unwrap();
        assert_eq!((first, task.id.as_str()), (0, "task-0"));
        assert_eq!(task.claimed_by, Some(0));
        assert_eq!(board.claim(1, 11).unwrap().0, 1);
        assert!(board.claim(0, 12).is_none());
        assert!(!board.has_pending());
    }

    #[test]
    fn test_result_keeps_completion_order() {
        let board = board(3);
        for w in 0..3 {
            board.claim(w, 0);
        }
        board.complete(2, ScrapedItem::new("https://portal.test/m/2", "merchant_portal"), 5);
        board.fail(1, "boom", 6);
        board.complete(0, ScrapedItem::new("https://portal.test/m/0", "merchant_portal"), 7);

        let result = board.result(30);
        assert!(!result.success);
        assert_eq!(result.completed, 2);
        let order: Vec<_> = result.completed_tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["task-2", "task-0"]);
        assert_eq!(result.failed_tasks[0].error.as_deref(), Some("boom"));
        assert_eq!(result.avg_time_per_task_ms, 10);
    }

    #[test]
    fn test_terminal_tasks_do_not_transition_again() {
        let board = board(1);
        board.claim(0, 0);
        assert!(board.fail(0, "first", 1).is_some());
        assert!(board
            .complete(0, ScrapedItem::new("https://portal.test/m/0", "merchant_portal"), 2)
            .is_none());
        assert_eq!(board.result(2).failed, 1);
    }

    #[test]
    fn test_fail_running_for_only_touches_that_worker() {
        let board = board(3);
        board.claim(0, 0);
        board.claim(1, 0);

        let aborted = board.fail_running_for(1, "worker aborted", 5);
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].id, "task-1");

        let leftover = board.fail_pending("batch cancelled", 6);
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover[0].id, "task-2");

        let progress = board.progress(10, 2);
        assert_eq!((progress.running, progress.failed, progress.pending), (1, 2, 0));
    }

    #[test]
    fn test_concurrent_claims_never_double_claim() {
        let board = Arc::new(board(200));
        let handles: Vec<_> = (0..8)
            .map(|w| {
                let board = board.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some((index, _)) = board.claim(w, 0) {
                        mine.push(index);
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for index in handle.join().unwrap() {
                assert!(seen.insert(index), "task {} claimed twice", index);
            }
        }
        assert_eq!(seen.len(), 200);
    }
}
