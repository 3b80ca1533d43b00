//! Task dependency graph
//!
//! Tasks and their `depends_on` edges are stored in a petgraph `DiGraph`.
//! Ordering is a depth-first walk with three-state coloring; dependencies are
//! visited in name order so the result never depends on map iteration order.

use std::collections::{BTreeMap, HashMap};

use petgraph::prelude::*;

use crate::configs::TaskSpec;
use crate::types::{PinionError, PinionResult};

#[derive(Debug, Clone)]
struct TaskNode {
    name: String,
    /// False for names that are only referenced from `depends_on`
    declared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build the graph. Undeclared dependencies become placeholder nodes and
    /// only fail once a traversal reaches them.
    pub fn build(tasks: &BTreeMap<String, TaskSpec>) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for name in tasks.keys() {
            let index = graph.add_node(TaskNode {
                name: name.clone(),
                declared: true,
            });
            nodes.insert(name.clone(), index);
        }

        for (name, task) in tasks {
            // Keyed by map entry; `task.name` may disagree
            let from = nodes[name];
            for dep in &task.depends_on {
                let to = *nodes.entry(dep.clone()).or_insert_with(|| {
                    graph.add_node(TaskNode {
                        name: dep.clone(),
                        declared: false,
                    })
                });
                // Edge: task -> dependency (dependency runs first)
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, nodes }
    }

    /// Declared task names, sorted
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .graph
            .node_weights()
            .filter(|node| node.declared)
            .map(|node| node.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Direct dependencies of `name`, sorted
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let Some(&index) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .neighbors(index)
            .map(|dep| self.graph[dep].name.clone())
            .collect();
        deps.sort();
        deps
    }

    /// Execution order for `root`: its transitive dependencies, each once,
    /// followed by `root` itself as the last element.
    pub fn resolve_order(&self, root: &str) -> PinionResult<Vec<String>> {
        let index = match self.nodes.get(root) {
            Some(&index) if self.graph[index].declared => index,
            _ => return Err(PinionError::UnknownTask(root.to_string())),
        };

        let mut marks: HashMap<NodeIndex, Mark> = HashMap::new();
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut order = Vec::new();
        self.visit(index, &mut marks, &mut stack, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        node: NodeIndex,
        marks: &mut HashMap<NodeIndex, Mark>,
        stack: &mut Vec<NodeIndex>,
        order: &mut Vec<String>,
    ) -> PinionResult<()> {
        match marks.get(&node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .map(|n| self.graph[*n].name.clone())
                    .collect();
                path.push(self.graph[node].name.clone());
                return Err(PinionError::Cycle { path });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);

        let mut deps: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        deps.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));

        for dep in deps {
            if !self.graph[dep].declared {
                return Err(PinionError::UnknownDependency {
                    task: self.graph[node].name.clone(),
                    dependency: self.graph[dep].name.clone(),
                });
            }
            self.visit(dep, marks, stack, order)?;
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(self.graph[node].name.clone());
        Ok(())
    }
}

/// Resolve the execution order of `root` within `tasks`
pub fn resolve_order(tasks: &BTreeMap<String, TaskSpec>, root: &str) -> PinionResult<Vec<String>> {
    TaskGraph::build(tasks).resolve_order(root)
}
