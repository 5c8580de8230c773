//! Transition classification: which audit verb a mutation records.
//!
//! The verb is derived from the transition, never from the request shape.
//! A status change decides the verb even when other fields change in the
//! same request, so the activity log reads as a lane-change history.

use crate::model::{Action, Lifecycle};

/// The mutation being classified, with the state it starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Create,
    Update {
        /// Status stored before the write.
        before: S,
        /// Status the request asks for, when it names one.
        requested: Option<S>,
    },
    Delete,
}

/// Map a transition to its audit action.
///
/// - a status change into the terminal value is `completed`
/// - any other status change is `moved`
/// - an update that leaves status alone, including a no-op, is `updated`
#[must_use]
pub fn classify<S: Lifecycle>(transition: Transition<S>) -> Action {
    match transition {
        Transition::Create => Action::Created,
        Transition::Delete => Action::Deleted,
        Transition::Update {
            before,
            requested: Some(next),
        } if next != before => {
            if next.is_terminal() {
                Action::Completed
            } else {
                Action::Moved
            }
        }
        Transition::Update { .. } => Action::Updated,
    }
}

#[cfg(test)]
mod tests {
    use super::{Transition, classify};
    use crate::model::Action;
    use crate::model::article::ArticleStatus;
    use crate::model::project::ProjectStatus;
    use crate::model::task::TaskStatus;

    fn update(before: TaskStatus, requested: Option<TaskStatus>) -> Action {
        classify(Transition::Update { before, requested })
    }

    #[test]
    fn status_to_done_completes() {
        assert_eq!(update(TaskStatus::Review, Some(TaskStatus::Done)), Action::Completed);
        assert_eq!(update(TaskStatus::Backlog, Some(TaskStatus::Done)), Action::Completed);
    }

    #[test]
    fn status_to_other_lane_moves() {
        assert_eq!(update(TaskStatus::Todo, Some(TaskStatus::InProgress)), Action::Moved);
        assert_eq!(update(TaskStatus::Done, Some(TaskStatus::Todo)), Action::Moved);
    }

    #[test]
    fn same_status_or_no_status_is_an_update() {
        assert_eq!(update(TaskStatus::Todo, None), Action::Updated);
        assert_eq!(update(TaskStatus::Done, Some(TaskStatus::Done)), Action::Updated);
    }

    #[test]
    fn create_and_delete_ignore_status() {
        assert_eq!(classify::<TaskStatus>(Transition::Create), Action::Created);
        assert_eq!(classify::<TaskStatus>(Transition::Delete), Action::Deleted);
    }

    #[test]
    fn terminal_value_is_per_kind() {
        assert_eq!(
            classify(Transition::Update {
                before: ProjectStatus::Active,
                requested: Some(ProjectStatus::Shipped),
            }),
            Action::Completed
        );
        assert_eq!(
            classify(Transition::Update {
                before: ArticleStatus::Reading,
                requested: Some(ArticleStatus::Archived),
            }),
            Action::Moved
        );
    }
}
