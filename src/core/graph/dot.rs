use crate::core::cwl::model::Workflow;
use crate::core::graph::StepGraph;
use petgraph::dot::Dot;

/// Render the step dependency graph as a Graphviz DOT string using petgraph.
///
/// Nodes are labelled with the step id and the process it runs; edges with the outputs
/// that flow between the two steps.
pub fn workflow_to_dot(workflow: &Workflow) -> String {
    let step_graph = StepGraph::build(workflow);
    format!("{}", Dot::new(&step_graph.graph))
}
