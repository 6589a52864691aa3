// tests/walker_properties.rs

//! Property tests driving the pure core over random acyclic graphs.
//!
//! Graphs are generated with forward references only (task N may depend on
//! tasks 0..N-1), which guarantees acyclicity. The simulation plays the role
//! of the IO shell: it feeds TaskStart/TaskExit for every dispatch the core
//! emits and checks the engine's universal guarantees.

use std::collections::{HashMap, HashSet, VecDeque};

use proptest::prelude::*;

use task_reactor::engine::{Command, CoreEngine, CoreEvent, CoreStep, NodeId};
use task_reactor::errors::ReactorError;
use task_reactor::graph::node::NodeSpec;

#[derive(Default)]
struct Simulation {
    deps_of: HashMap<NodeId, Vec<NodeId>>,
    /// Tasks dispatched but not yet driven to exit.
    queue: VecDeque<NodeId>,
    done: HashSet<NodeId>,
    dispatch_counts: HashMap<NodeId, usize>,
    settled: Vec<Result<(), String>>,
}

impl Simulation {
    /// Record the commands of one core step, checking dispatch invariants.
    fn absorb(&mut self, step: CoreStep) {
        for command in step.commands {
            match command {
                Command::Dispatch { id, .. } => {
                    for dep in &self.deps_of[&id] {
                        assert!(
                            self.done.contains(dep),
                            "task {id} dispatched before its dependency {dep} was done"
                        );
                    }
                    let count = self.dispatch_counts.entry(id.clone()).or_insert(0);
                    *count += 1;
                    assert!(*count <= 1, "task {id} dispatched more than once");
                    self.queue.push_back(id);
                }
                Command::Settle { result, .. } => {
                    self.settled.push(result.map_err(|e| e.to_string()));
                }
                Command::Notify(_) => {}
            }
        }
    }
}

proptest! {
    #[test]
    fn random_dags_terminate_with_every_guarantee_held(
        raw_deps in proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..4),
            1..10,
        ),
        failing in proptest::collection::vec(any::<bool>(), 10),
    ) {
        let names: Vec<NodeId> = (0..raw_deps.len())
            .map(|i| format!("task_{i}"))
            .collect();

        let mut core = CoreEngine::new();
        let mut sim = Simulation::default();

        for (i, raw) in raw_deps.iter().enumerate() {
            // Forward references only: task i depends on tasks < i.
            // Duplicates are allowed; the engine records them verbatim.
            let deps: Vec<NodeId> = if i == 0 {
                Vec::new()
            } else {
                raw.iter().map(|d| names[d % i].clone()).collect()
            };

            sim.deps_of.insert(names[i].clone(), deps.clone());
            let spec = NodeSpec::new(names[i].clone(), || async { Ok(()) }, deps);
            sim.absorb(core.step(CoreEvent::Submit { spec }));
        }

        sim.absorb(core.step(CoreEvent::Execute { ids: names.clone() }));
        sim.absorb(core.step(CoreEvent::Wait {
            waiter: 0,
            ids: names.clone(),
        }));

        // Drive every dispatched task to its exit.
        let mut steps = 0;
        while let Some(id) = sim.queue.pop_front() {
            steps += 1;
            prop_assert!(steps <= 1000, "simulation did not terminate");

            sim.absorb(core.step(CoreEvent::TaskStart { id: id.clone() }));

            let index: usize = id
                .trim_start_matches("task_")
                .parse()
                .expect("generated task name");
            let fails = failing[index];

            let err = if fails {
                Some(ReactorError::task(anyhow::anyhow!("task failed")))
            } else {
                // Mark done before stepping: dependents dispatched by this
                // exit must observe the dependency as done.
                sim.done.insert(id.clone());
                None
            };
            sim.absorb(core.step(CoreEvent::TaskExit { id, err }));
        }

        // Every target was submitted and every branch terminates, so the
        // single waiter settles exactly once.
        prop_assert_eq!(sim.settled.len(), 1);

        // All watched nodes ended in a terminal state.
        for name in &names {
            let state = core.node_state(name).expect("submitted node exists");
            prop_assert!(
                state.is_terminal(),
                "node {} finished in non-terminal state {}", name, state
            );
        }

        // The wait result agrees with whether any executed task failed.
        let any_failed = sim
            .dispatch_counts
            .keys()
            .any(|id| {
                let index: usize = id
                    .trim_start_matches("task_")
                    .parse()
                    .expect("generated task name");
                failing[index]
            });
        prop_assert_eq!(sim.settled[0].is_err(), any_failed);
    }
}
