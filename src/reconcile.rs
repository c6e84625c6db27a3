use std::collections::{HashMap, HashSet};

use crate::models::{OrderSequence, OrderedView, Task, TaskId};

/// Merges a freshly polled task set into the user's order.
///
/// Tasks the order does not know yet come first, in the order they were
/// polled. Known tasks follow in their existing relative order; ids whose task
/// disappeared are dropped. The result holds exactly the ids of `tasks`.
pub fn merge_order(order: &[TaskId], tasks: &[Task]) -> OrderSequence {
    let known: HashSet<TaskId> = order.iter().copied().collect();
    let present: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();

    let mut seen = HashSet::with_capacity(tasks.len());
    let unknown = tasks
        .iter()
        .map(|t| t.id)
        .filter(|id| !known.contains(id));
    let kept = order.iter().copied().filter(|id| present.contains(id));

    // A malformed input with repeated ids still yields each id once.
    unknown.chain(kept).filter(|id| seen.insert(*id)).collect()
}

/// Removes the element at `from` and reinserts it at `to`, shifting the rest.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Computes the order after dragging `active` onto `over`.
///
/// Returns `None` when nothing changes: no drop target, dropping onto itself,
/// or either id not being part of the order.
pub fn reorder(order: &[TaskId], active: TaskId, over: Option<TaskId>) -> Option<OrderSequence> {
    let over = over?;
    if active == over {
        return None;
    }
    let old_index = order.iter().position(|id| *id == active)?;
    let new_index = order.iter().position(|id| *id == over)?;
    let mut next = order.to_vec();
    move_item(&mut next, old_index, new_index);
    Some(next)
}

/// Lays `tasks` out in `order`. Ids with no matching task are skipped.
pub fn ordered_view(order: &[TaskId], tasks: &[Task]) -> OrderedView {
    let by_id: HashMap<TaskId, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    order
        .iter()
        .filter_map(|id| by_id.get(id).map(|task| (*task).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_tasks;

    fn sorted(mut ids: Vec<TaskId>) -> Vec<TaskId> {
        ids.sort_unstable();
        ids
    }

    #[test]
    fn new_tasks_surface_before_known_ones() {
        let merged = merge_order(&[2, 1], &make_tasks(&[1, 2, 3]));
        assert_eq!(merged, vec![3, 2, 1]);
    }

    #[test]
    fn removed_tasks_are_dropped_keeping_relative_order() {
        let merged = merge_order(&[1, 2, 3], &make_tasks(&[1, 3]));
        assert_eq!(merged, vec![1, 3]);
    }

    #[test]
    fn several_unknown_tasks_keep_polled_order() {
        let merged = merge_order(&[5], &make_tasks(&[9, 5, 7, 8]));
        assert_eq!(merged, vec![9, 7, 8, 5]);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(merge_order(&[], &make_tasks(&[4, 2])), vec![4, 2]);
        assert!(merge_order(&[1, 2], &[]).is_empty());
        assert!(merge_order(&[], &[]).is_empty());
    }

    #[test]
    fn merge_is_idempotent() {
        let tasks = make_tasks(&[10, 3, 7, 1]);
        let order = vec![7, 99, 1];
        let first = merge_order(&order, &tasks);
        let second = merge_order(&order, &tasks);
        assert_eq!(first, second);
        // Feeding the result back in is stable as well.
        assert_eq!(merge_order(&first, &tasks), first);
    }

    #[test]
    fn merge_output_matches_task_ids_exactly() {
        let cases: Vec<(Vec<TaskId>, Vec<TaskId>)> = vec![
            (vec![], vec![1, 2, 3]),
            (vec![3, 2, 1], vec![1, 2, 3]),
            (vec![1, 2, 3, 4, 5], vec![2, 4]),
            (vec![8, 6], vec![6, 7, 8, 9]),
            (vec![1, 1, 2], vec![2, 1]),
            (vec![4, 5], vec![]),
        ];
        for (order, ids) in cases {
            let merged = merge_order(&order, &make_tasks(&ids));
            assert_eq!(sorted(merged.clone()), sorted(ids.clone()), "order={order:?}");
            let unique: HashSet<_> = merged.iter().collect();
            assert_eq!(unique.len(), merged.len(), "duplicates in {merged:?}");
        }
    }

    #[test]
    fn reorder_moves_before_target() {
        assert_eq!(reorder(&[1, 2, 3, 4], 4, Some(2)), Some(vec![1, 4, 2, 3]));
    }

    #[test]
    fn reorder_forward_lands_on_target_index() {
        assert_eq!(reorder(&[1, 2, 3, 4], 1, Some(3)), Some(vec![2, 3, 1, 4]));
        assert_eq!(reorder(&[1, 2, 3, 4], 1, Some(4)), Some(vec![2, 3, 4, 1]));
    }

    #[test]
    fn reorder_no_ops() {
        assert_eq!(reorder(&[1, 2, 3], 2, Some(2)), None);
        assert_eq!(reorder(&[1, 2, 3], 2, None), None);
        assert_eq!(reorder(&[1, 2, 3], 9, Some(1)), None);
        assert_eq!(reorder(&[1, 2, 3], 1, Some(9)), None);
    }

    #[test]
    fn move_item_ignores_out_of_range() {
        let mut items = vec!['a', 'b', 'c'];
        move_item(&mut items, 5, 0);
        move_item(&mut items, 0, 5);
        assert_eq!(items, vec!['a', 'b', 'c']);
        move_item(&mut items, 2, 0);
        assert_eq!(items, vec!['c', 'a', 'b']);
    }

    #[test]
    fn ordered_view_follows_order_and_skips_stale_ids() {
        let tasks = make_tasks(&[1, 2, 3]);
        let view = ordered_view(&[3, 42, 1, 2], &tasks);
        assert_eq!(view.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(view[0].text, "task-3");
    }
}
