//! Selection is derived state: the selected node is whichever node carries
//! `selected = true`, and every event rewrites the flag on every node.

use crate::graph::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A node was clicked.
    Activate(String),
    /// The background was clicked.
    Deactivate,
}

/// Re-derive `selected` on all nodes. Returns the id now selected, if any.
///
/// Activating an id that is not in `nodes` clears the selection.
pub fn reconcile(nodes: &mut [Node], event: &SelectionEvent) -> Option<String> {
    let target = match event {
        SelectionEvent::Activate(id) => Some(id.as_str()),
        SelectionEvent::Deactivate => None,
    };
    let mut hit = None;
    for n in nodes.iter_mut() {
        n.data.selected = target == Some(n.id.as_str());
        if n.data.selected {
            hit = Some(n.id.clone());
        }
    }
    hit
}

/// The currently selected node.
pub fn selected(nodes: &[Node]) -> Option<&Node> {
    nodes.iter().find(|n| n.data.selected)
}

/// Carry a selection over to a freshly projected node list. Only meaningful
/// with stable ids; with fresh ids the previous id never matches and the
/// selection is dropped.
pub fn reselect(nodes: &mut [Node], previous: Option<&str>) -> Option<String> {
    match previous {
        Some(id) => reconcile(nodes, &SelectionEvent::Activate(id.to_string())),
        None => reconcile(nodes, &SelectionEvent::Deactivate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{project, IdStrategy};
    use crate::hierarchy::compose;
    use crate::model::Queue;

    fn nodes(ids: IdStrategy) -> Vec<Node> {
        let qs = ["a", "b", "c"]
            .iter()
            .map(|n| Queue {
                name: (*n).into(),
                uid: None,
                creation_timestamp: None,
                state: None,
                weight: None,
                reclaimable: false,
                parent: None,
            })
            .collect();
        project(&compose(qs, vec![], vec![]), ids).nodes
    }

    #[test]
    fn activate_marks_exactly_one() {
        let mut ns = nodes(IdStrategy::Fresh);
        let id = ns[1].id.clone();
        assert_eq!(reconcile(&mut ns, &SelectionEvent::Activate(id.clone())), Some(id.clone()));
        assert_eq!(ns.iter().filter(|n| n.data.selected).count(), 1);
        assert_eq!(selected(&ns).map(|n| n.id.as_str()), Some(id.as_str()));

        let other = ns[2].id.clone();
        reconcile(&mut ns, &SelectionEvent::Activate(other.clone()));
        assert_eq!(ns.iter().filter(|n| n.data.selected).count(), 1);
        assert_eq!(selected(&ns).map(|n| n.id.clone()), Some(other));
    }

    #[test]
    fn deactivate_clears_all() {
        let mut ns = nodes(IdStrategy::Fresh);
        let id = ns[0].id.clone();
        reconcile(&mut ns, &SelectionEvent::Activate(id));
        assert_eq!(reconcile(&mut ns, &SelectionEvent::Deactivate), None);
        assert!(selected(&ns).is_none());
    }

    #[test]
    fn unknown_id_clears_selection() {
        let mut ns = nodes(IdStrategy::Fresh);
        let id = ns[0].id.clone();
        reconcile(&mut ns, &SelectionEvent::Activate(id));
        assert_eq!(reconcile(&mut ns, &SelectionEvent::Activate("nope".into())), None);
        assert!(ns.iter().all(|n| !n.data.selected));
    }

    #[test]
    fn selection_survives_refresh_only_with_stable_ids() {
        let mut before = nodes(IdStrategy::Stable);
        let id = before[2].id.clone();
        reconcile(&mut before, &SelectionEvent::Activate(id.clone()));
        let prev = selected(&before).map(|n| n.id.clone());

        let mut after = nodes(IdStrategy::Stable);
        assert_eq!(reselect(&mut after, prev.as_deref()), Some(id));

        let mut fresh = nodes(IdStrategy::Fresh);
        assert_eq!(reselect(&mut fresh, prev.as_deref()), None);
    }
}
