//! Cycle detection over target ids.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::target::Target;

/// Tracks the visitation state of a node during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// A detected cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cycle {
    /// Node re-entered while it was still on the traversal stack.
    pub(crate) witness: String,
    /// Path from the witness back to itself.
    pub(crate) path: Vec<String>,
}

/// Find the first cycle, visiting roots in declaration order.
pub(crate) fn find_cycle(targets: &IndexMap<String, Target>) -> Option<Cycle> {
    let mut detector = CycleDetector::new(targets);
    for id in targets.keys() {
        if detector.is_visited(id) {
            continue;
        }
        if let Some(found) = detector.visit(id) {
            return Some(found);
        }
    }
    None
}

struct CycleDetector<'a> {
    targets: &'a IndexMap<String, Target>,
    stack: Vec<&'a str>,
    states: HashMap<&'a str, VisitState>,
}

impl<'a> CycleDetector<'a> {
    fn new(targets: &'a IndexMap<String, Target>) -> Self {
        Self {
            targets,
            stack: Vec::new(),
            states: HashMap::new(),
        }
    }

    fn is_visited(&self, id: &str) -> bool {
        matches!(self.states.get(id), Some(VisitState::Visited))
    }

    /// Stack suffix starting at `id`, closed with `id` again. A node marked
    /// visiting but absent from the stack yields the degenerate `[id, id]`.
    fn path_back_to(&self, id: &str) -> Vec<String> {
        let start = self.stack.iter().position(|n| *n == id);
        let mut path: Vec<String> = match start.and_then(|idx| self.stack.get(idx..)) {
            Some(suffix) => suffix.iter().map(|n| (*n).to_owned()).collect(),
            None => vec![id.to_owned()],
        };
        path.push(id.to_owned());
        path
    }

    fn visit(&mut self, id: &'a str) -> Option<Cycle> {
        match self.states.get(id) {
            Some(VisitState::Visited) => return None,
            Some(VisitState::Visiting) => {
                return Some(Cycle {
                    witness: id.to_owned(),
                    path: self.path_back_to(id),
                });
            }
            None => {
                self.states.insert(id, VisitState::Visiting);
            }
        }

        self.stack.push(id);

        let targets = self.targets;
        if let Some(target) = targets.get(id) {
            for dep in target.dependencies() {
                let Some((key, _)) = targets.get_key_value(dep.as_str()) else {
                    tracing::debug!(
                        missing = %dep,
                        dependent = %id,
                        "skipping undeclared dependency during cycle detection",
                    );
                    continue;
                };
                if let Some(cycle) = self.visit(key.as_str()) {
                    return Some(cycle);
                }
            }
        }

        self.stack.pop();
        self.states.insert(id, VisitState::Visited);
        None
    }
}
