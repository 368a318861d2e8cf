//! Pure projection of the flat task list into board columns.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::types::{STATUS_ORDER, Task, TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub status: TaskStatus,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }
}

/// One column per status in `status_order`, each sorted by position.
/// The sort is stable, so equal positions keep their input order.
pub fn project(tasks: &[Task], status_order: &[TaskStatus]) -> Vec<Column> {
    status_order
        .iter()
        .map(|&status| {
            let mut column: Vec<Task> = tasks
                .iter()
                .filter(|task| task.status == status)
                .cloned()
                .collect();
            column.sort_by_key(|task| task.position);
            Column {
                status,
                title: status.title(),
                tasks: column,
            }
        })
        .collect()
}

/// The board in its fixed TODO, IN_PROGRESS, DONE order.
pub fn project_board(tasks: &[Task]) -> Vec<Column> {
    project(tasks, &STATUS_ORDER)
}

pub fn column_for(columns: &[Column], status: TaskStatus) -> Option<&Column> {
    columns.iter().find(|column| column.status == status)
}

/// Where a task currently sits: its status and index within that column.
pub fn locate(columns: &[Column], id: TaskId) -> Option<(TaskStatus, usize)> {
    columns
        .iter()
        .find_map(|column| column.index_of(id).map(|index| (column.status, index)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    /// Open tasks due before `today + due_soon_days`.
    pub due_soon: usize,
}

pub fn summarize(tasks: &[Task], today: NaiveDate, due_soon_days: u32) -> BoardStats {
    let limit = today
        .checked_add_days(Days::new(u64::from(due_soon_days)))
        .unwrap_or(NaiveDate::MAX);
    let count = |status: TaskStatus| tasks.iter().filter(|task| task.status == status).count();

    BoardStats {
        total: tasks.len(),
        todo: count(TaskStatus::Todo),
        in_progress: count(TaskStatus::InProgress),
        done: count(TaskStatus::Done),
        due_soon: tasks
            .iter()
            .filter(|task| task.status != TaskStatus::Done)
            .filter(|task| task.due_date.is_some_and(|due| due < limit))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task;

    fn ids(column: &Column) -> Vec<TaskId> {
        column.tasks.iter().map(|task| task.id).collect()
    }

    #[test]
    fn test_project_groups_and_sorts_by_position() {
        let tasks = vec![
            task(1, TaskStatus::Todo, 2),
            task(2, TaskStatus::Done, 0),
            task(3, TaskStatus::Todo, 0),
            task(4, TaskStatus::InProgress, 0),
            task(5, TaskStatus::Todo, 1),
        ];

        let columns = project_board(&tasks);

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].status, TaskStatus::Todo);
        assert_eq!(columns[0].title, "To Do");
        assert_eq!(ids(&columns[0]), vec![3, 5, 1]);
        assert_eq!(ids(&columns[1]), vec![4]);
        assert_eq!(ids(&columns[2]), vec![2]);
    }

    #[test]
    fn test_project_is_idempotent() {
        let tasks = vec![
            task(1, TaskStatus::InProgress, 1),
            task(2, TaskStatus::InProgress, 0),
        ];
        assert_eq!(project_board(&tasks), project_board(&tasks));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let tasks = vec![
            task(8, TaskStatus::Todo, 0),
            task(3, TaskStatus::Todo, 0),
            task(5, TaskStatus::Todo, 0),
        ];
        assert_eq!(ids(&project_board(&tasks)[0]), vec![8, 3, 5]);
    }

    #[test]
    fn test_empty_columns_are_still_present() {
        let columns = project_board(&[]);
        assert_eq!(columns.len(), 3);
        assert!(columns.iter().all(Column::is_empty));
    }

    #[test]
    fn test_custom_status_order() {
        let tasks = vec![task(1, TaskStatus::Todo, 0), task(2, TaskStatus::Done, 0)];
        let columns = project(&tasks, &[TaskStatus::Done, TaskStatus::Todo]);
        assert_eq!(columns[0].status, TaskStatus::Done);
        assert_eq!(ids(&columns[1]), vec![1]);
    }

    #[test]
    fn test_locate_reports_status_and_index() {
        let columns = project_board(&[
            task(1, TaskStatus::InProgress, 0),
            task(2, TaskStatus::InProgress, 1),
        ]);
        assert_eq!(locate(&columns, 2), Some((TaskStatus::InProgress, 1)));
        assert_eq!(locate(&columns, 9), None);
        assert_eq!(
            column_for(&columns, TaskStatus::InProgress).map(Column::len),
            Some(2)
        );
    }

    #[test]
    fn test_summarize_counts_due_soon_open_tasks() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        let mut soon = task(1, TaskStatus::Todo, 0);
        soon.due_date = NaiveDate::from_ymd_opt(2026, 10, 21);
        let mut overdue = task(2, TaskStatus::InProgress, 0);
        overdue.due_date = NaiveDate::from_ymd_opt(2026, 10, 1);
        let mut later = task(3, TaskStatus::Todo, 1);
        later.due_date = NaiveDate::from_ymd_opt(2026, 10, 22);
        let mut finished = task(4, TaskStatus::Done, 0);
        finished.due_date = NaiveDate::from_ymd_opt(2026, 10, 20);

        let stats = summarize(&[soon, overdue, later, finished], today, 3);

        assert_eq!(
            stats,
            BoardStats {
                total: 4,
                todo: 2,
                in_progress: 1,
                done: 1,
                due_soon: 2,
            }
        );
    }
}
