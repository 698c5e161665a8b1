//! Step dependency graph and deterministic topological ordering.

pub mod dot;

use crate::core::cwl::model::{SourceRef, Step, Workflow};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Node weight: a step id and the process it runs.
pub struct StepNode {
    pub id: String,
    pub run: String,
}

impl fmt::Display for StepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.id, self.run)
    }
}

/// Edge weight: the producer outputs the consumer reads.
pub struct Wiring {
    pub outputs: Vec<String>,
}

impl fmt::Display for Wiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outputs.join(", "))
    }
}

/// Directed graph with an edge A -> B when a step input of B reads an output of A.
///
/// Node indices follow step declaration order.
pub struct StepGraph {
    pub graph: DiGraph<StepNode, Wiring>,
    pub node_map: HashMap<String, NodeIndex>,
}

impl StepGraph {
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<String, NodeIndex> = HashMap::new();

        for step in &workflow.steps {
            let idx = graph.add_node(StepNode {
                id: step.id.clone(),
                run: step.run.id().to_string(),
            });
            node_map.insert(step.id.clone(), idx);
        }

        for step in &workflow.steps {
            let to = node_map[&step.id];
            for input in &step.inputs {
                for source in &input.sources {
                    let SourceRef::StepOutput { step: producer, output } = source else {
                        continue;
                    };
                    let Some(&from) = node_map.get(producer) else {
                        continue;
                    };
                    match graph.find_edge(from, to) {
                        Some(edge) => {
                            let wiring: &mut Wiring = &mut graph[edge];
                            if !wiring.outputs.contains(output) {
                                wiring.outputs.push(output.clone());
                            }
                        }
                        None => {
                            graph.add_edge(
                                from,
                                to,
                                Wiring {
                                    outputs: vec![output.clone()],
                                },
                            );
                        }
                    }
                }
            }
        }

        StepGraph { graph, node_map }
    }

    fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        next.sort();
        next
    }
}

/// Steps in a valid topological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    indices: Vec<usize>,
}

impl ExecutionOrder {
    /// Indices into `Workflow::steps`.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn steps<'a>(&'a self, workflow: &'a Workflow) -> impl Iterator<Item = &'a Step> + 'a {
        self.indices.iter().map(move |&index| &workflow.steps[index])
    }

    pub fn ids<'a>(&'a self, workflow: &'a Workflow) -> Vec<&'a str> {
        self.steps(workflow).map(|step| step.id.as_str()).collect()
    }
}

/// Order the workflow's steps with Kahn's algorithm.
///
/// Among steps that are ready at the same time, the one declared first goes first, so the
/// order is stable across runs. Fails with a cyclic dependency error naming the smallest cycle.
pub fn resolve_order(workflow: &Workflow) -> Result<ExecutionOrder, AppError> {
    let step_graph = StepGraph::build(workflow);
    let graph = &step_graph.graph;

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut indices = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(index)) = ready.pop() {
        indices.push(index);
        for next in step_graph.successors(NodeIndex::new(index)) {
            let degree = &mut in_degree[next.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    if indices.len() < workflow.steps.len() {
        let remaining: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| index)
            .collect();
        let cycle = smallest_cycle(&step_graph, &remaining);
        let names: Vec<&str> = cycle
            .iter()
            .map(|&index| workflow.steps[index].id.as_str())
            .collect();
        let first = &workflow.steps[cycle[0]];
        return Err(AppError::new(
            ErrorCategory::CyclicDependency,
            format!("steps depend on each other in a cycle: {}", names.join(" -> ")),
        )
        .with_field(first.field("in")));
    }

    debug!(order = ?indices, "resolved step order");
    Ok(ExecutionOrder { indices })
}

/// Shortest cycle through the nodes Kahn's algorithm could not remove.
///
/// Returned as a closed path: the first node is repeated at the end.
fn smallest_cycle(step_graph: &StepGraph, remaining: &[usize]) -> Vec<usize> {
    let mut best: Option<Vec<usize>> = None;
    for &start in remaining {
        let Some(path) = shortest_path_back(step_graph, start, remaining) else {
            continue;
        };
        if best.as_ref().map_or(true, |current| path.len() < current.len()) {
            best = Some(path);
        }
    }
    // Every node left over by Kahn's algorithm has an unresolved predecessor inside the
    // remainder, so some node lies on a cycle.
    best.unwrap_or_else(|| remaining.to_vec())
}

/// Breadth-first search from `start` back to itself, restricted to `allowed` nodes.
fn shortest_path_back(step_graph: &StepGraph, start: usize, allowed: &[usize]) -> Option<Vec<usize>> {
    let mut parent: HashMap<usize, usize> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        for next in step_graph.successors(NodeIndex::new(node)) {
            let next = next.index();
            if !allowed.contains(&next) {
                continue;
            }
            if next == start {
                let mut back = Vec::new();
                let mut cursor = node;
                while cursor != start {
                    back.push(cursor);
                    cursor = parent[&cursor];
                }
                back.reverse();
                let mut path = Vec::with_capacity(back.len() + 2);
                path.push(start);
                path.extend(back);
                path.push(start);
                return Some(path);
            }
            if !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}
