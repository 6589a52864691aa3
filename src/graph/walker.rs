// src/graph/walker.rs

//! Recursive dependency-graph evaluator.
//!
//! Triggered after every event: for each watched id the walker performs a
//! depth-first post-order evaluation, aggregating dependency state and
//! deciding per node whether it is missing a dependency, blocked by a failed
//! one, part of a cycle, or ready to dispatch. A per-pass `visited` set keeps
//! each node from being evaluated more than once within a single pass.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::engine::{Command, NodeId};
use crate::errors::{compose_errors, ReactorError};
use crate::graph::node::{set_node_state, Node, NodeState};

/// One evaluation pass over the watched part of the graph.
///
/// Borrows the engine's node map for the duration of the pass; transitions
/// and dispatch decisions are appended to `commands` in the order the states
/// were assigned.
pub struct Walker<'a> {
    nodes: &'a mut HashMap<NodeId, Node>,
    visited: HashSet<NodeId>,
}

impl<'a> Walker<'a> {
    /// Evaluate every watched node, in watch-registration order.
    pub fn run(
        nodes: &'a mut HashMap<NodeId, Node>,
        watching: &[NodeId],
        commands: &mut Vec<Command>,
    ) {
        let mut walker = Walker {
            nodes,
            visited: HashSet::new(),
        };

        for id in watching {
            let mut path = Vec::new();
            walker.evaluate(id, &mut path, commands);
        }
    }

    /// Post-order evaluation of a single node.
    ///
    /// `path` is the current recursion path, used for cycle detection. Nodes
    /// that do not need evaluation are marked visited and skipped; a parent
    /// still consults their authoritative state afterwards.
    fn evaluate(&mut self, id: &NodeId, path: &mut Vec<NodeId>, commands: &mut Vec<Command>) {
        let Some(node) = self.nodes.get(id) else {
            // Watched but not (yet) submitted; waiters report this.
            return;
        };

        self.visited.insert(id.clone());
        if !node.state.needs_evaluation() {
            return;
        }

        let deps = node.dependencies.clone();
        path.push(id.clone());

        let mut missing_dep = false;
        let mut is_blocked = false;
        let mut all_done = true;
        let mut blocking_errors = Vec::new();

        for dep in &deps {
            if path.contains(dep) {
                self.block_cycle(dep, path, commands);
                path.pop();
                return;
            }

            if !self.nodes.contains_key(dep) {
                missing_dep = true;
                all_done = false;
                continue;
            }

            if !self.visited.contains(dep) {
                self.evaluate(dep, path, commands);
            }

            // Reload: the recursion may have transitioned the dependency.
            if let Some(dep_node) = self.nodes.get(dep) {
                if dep_node.state.is_blocking() {
                    is_blocked = true;
                    if let Some(err) = &dep_node.err {
                        blocking_errors.push(err.clone());
                    }
                }
                if dep_node.state != NodeState::Done {
                    all_done = false;
                }
            }
        }

        path.pop();

        // A deeper frame may have blocked this node as a cycle member.
        let still_open = self
            .nodes
            .get(id)
            .map(|n| n.state.needs_evaluation())
            .unwrap_or(false);
        if !still_open {
            return;
        }

        // A missing dependency shadows a blocked one: the graph is incomplete
        // and may still resolve.
        if missing_dep {
            self.set_state(id, NodeState::MissingDependency, commands);
        } else if is_blocked {
            self.set_state(id, NodeState::Blocked, commands);
            if let Some(err) = compose_errors(blocking_errors) {
                self.set_error(id, err);
            }
        } else if all_done {
            self.dispatch(id, commands);
        }
    }

    /// Block every member of a detected cycle.
    ///
    /// `dep` is a node already on the recursion path; the cycle members are
    /// the path suffix starting at `dep`, through the current node.
    fn block_cycle(&mut self, dep: &NodeId, path: &[NodeId], commands: &mut Vec<Command>) {
        let start = path.iter().position(|p| p == dep).unwrap_or(0);
        let members: Vec<NodeId> = path[start..].to_vec();

        warn!(cycle = ?members, "dependency cycle detected; blocking members");

        let err = ReactorError::CycleDetected {
            path: members.clone(),
        };
        for member in &members {
            self.set_state(member, NodeState::Blocked, commands);
            self.set_error(member, err.clone());
        }
    }

    /// Elect a node to run: mark it dispatched and hand its task out.
    fn dispatch(&mut self, id: &NodeId, commands: &mut Vec<Command>) {
        self.set_state(id, NodeState::Dispatched, commands);

        let action = self.nodes.get_mut(id).and_then(|node| node.action.take());
        match action {
            Some(action) => commands.push(Command::Dispatch {
                id: id.clone(),
                action,
            }),
            None => warn!(task = %id, "dispatch elected a node with no task body"),
        }
    }

    fn set_state(&mut self, id: &str, next: NodeState, commands: &mut Vec<Command>) {
        if let Some(event) = set_node_state(self.nodes, id, next) {
            commands.push(Command::Notify(event));
        }
    }

    fn set_error(&mut self, id: &str, err: ReactorError) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.err = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeSpec;

    fn node(id: &str, deps: &[&str]) -> Node {
        Node::from_spec(NodeSpec::new(id, || async { Ok(()) }, deps.iter().copied()))
    }

    fn insert(nodes: &mut HashMap<NodeId, Node>, n: Node) {
        nodes.insert(n.id.clone(), n);
    }

    fn state_of(nodes: &HashMap<NodeId, Node>, id: &str) -> NodeState {
        nodes[id].state
    }

    fn dispatched_ids(commands: &[Command]) -> Vec<NodeId> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn node_without_dependencies_dispatches_immediately() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &[]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::Dispatched);
        assert_eq!(dispatched_ids(&commands), vec!["a"]);
        assert!(nodes["a"].action.is_none(), "task body must be taken out");
    }

    #[test]
    fn unsatisfied_dependency_holds_the_parent_back() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &[]));
        insert(&mut nodes, node("b", &["a"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["b".to_string()], &mut commands);

        // Only the leaf runs; the parent stays open for the next pass.
        assert_eq!(dispatched_ids(&commands), vec!["a"]);
        assert_eq!(state_of(&nodes, "b"), NodeState::Submitted);
    }

    #[test]
    fn parent_dispatches_once_all_dependencies_are_done() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &[]));
        insert(&mut nodes, node("b", &["a"]));
        nodes.get_mut("a").unwrap().state = NodeState::Done;

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["b".to_string()], &mut commands);

        assert_eq!(dispatched_ids(&commands), vec!["b"]);
    }

    #[test]
    fn missing_dependency_marks_the_node() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &["ghost"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::MissingDependency);
        assert!(dispatched_ids(&commands).is_empty());
    }

    #[test]
    fn missing_dependency_shadows_a_blocked_one() {
        let mut nodes = HashMap::new();
        let mut failed = node("bad", &[]);
        failed.state = NodeState::Errored;
        failed.err = Some(ReactorError::task(anyhow::anyhow!("boom")));
        insert(&mut nodes, failed);
        insert(&mut nodes, node("a", &["ghost", "bad"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::MissingDependency);
    }

    #[test]
    fn blocking_dependency_propagates_its_error() {
        let mut nodes = HashMap::new();
        let mut failed = node("bad", &[]);
        failed.state = NodeState::Errored;
        failed.err = Some(ReactorError::task(anyhow::anyhow!("boom")));
        insert(&mut nodes, failed);
        insert(&mut nodes, node("a", &["bad"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::Blocked);
        let err = nodes["a"].err.as_ref().expect("blocked node records error");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn transitive_failure_blocks_the_whole_chain() {
        let mut nodes = HashMap::new();
        let mut failed = node("c", &[]);
        failed.state = NodeState::Errored;
        failed.err = Some(ReactorError::task(anyhow::anyhow!("boom")));
        insert(&mut nodes, failed);
        insert(&mut nodes, node("b", &["c"]));
        insert(&mut nodes, node("a", &["b"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "b"), NodeState::Blocked);
        assert_eq!(state_of(&nodes, "a"), NodeState::Blocked);
        assert_eq!(nodes["a"].err.as_ref().map(|e| e.to_string()), Some("boom".into()));
    }

    #[test]
    fn duplicate_dependency_is_evaluated_once() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &[]));
        insert(&mut nodes, node("b", &["a", "a"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["b".to_string()], &mut commands);

        // "a" is dispatched exactly once despite being declared twice.
        assert_eq!(dispatched_ids(&commands), vec!["a"]);
    }

    #[test]
    fn self_dependency_is_a_one_member_cycle() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &["a"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::Blocked);
        match nodes["a"].err.as_ref() {
            Some(ReactorError::CycleDetected { path }) => {
                assert_eq!(path, &vec!["a".to_string()])
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn two_node_cycle_blocks_both_members() {
        let mut nodes = HashMap::new();
        insert(&mut nodes, node("a", &["b"]));
        insert(&mut nodes, node("b", &["a"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["a".to_string()], &mut commands);

        assert_eq!(state_of(&nodes, "a"), NodeState::Blocked);
        assert_eq!(state_of(&nodes, "b"), NodeState::Blocked);
        match nodes["b"].err.as_ref() {
            Some(ReactorError::CycleDetected { path }) => {
                assert_eq!(path, &vec!["a".to_string(), "b".to_string()])
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
        assert!(dispatched_ids(&commands).is_empty());
    }

    #[test]
    fn independent_branch_still_dispatches_next_to_a_failed_one() {
        let mut nodes = HashMap::new();
        let mut failed = node("a3", &[]);
        failed.state = NodeState::Errored;
        failed.err = Some(ReactorError::task(anyhow::anyhow!("boom")));
        insert(&mut nodes, failed);
        insert(&mut nodes, node("a2", &["a3"]));
        insert(&mut nodes, node("a1", &["a2"]));
        insert(&mut nodes, node("b1", &[]));
        insert(&mut nodes, node("top", &["a1", "b1"]));

        let mut commands = Vec::new();
        Walker::run(&mut nodes, &["top".to_string()], &mut commands);

        assert_eq!(dispatched_ids(&commands), vec!["b1"]);
        assert_eq!(state_of(&nodes, "top"), NodeState::Blocked);
        assert_eq!(state_of(&nodes, "a1"), NodeState::Blocked);
        assert_eq!(state_of(&nodes, "a2"), NodeState::Blocked);
    }
}
