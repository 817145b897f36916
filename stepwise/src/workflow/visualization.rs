//! Control-flow diagrams for compiled workflows
//!
//! Top-level steps form a single chain from `Start` to `End`. Branch and loop
//! bodies are drawn as namespaced subgraphs hanging off their parent step and
//! are never joined back into the main chain.

use super::definition::Workflow;
use super::step::{Step, StepKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format for diagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationFormat {
    /// Mermaid flowchart
    #[default]
    Mermaid,
    /// Graphviz DOT
    Dot,
}

impl fmt::Display for VisualizationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisualizationFormat::Mermaid => write!(f, "mermaid"),
            VisualizationFormat::Dot => write!(f, "dot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Terminal,
    Decision,
    Process,
}

fn shape_of(step: &Step) -> Shape {
    match step.kind {
        StepKind::If { .. } | StepKind::While { .. } => Shape::Decision,
        _ => Shape::Process,
    }
}

trait GraphWriter {
    fn node(&mut self, id: &str, label: &str, shape: Shape);
    fn edge(&mut self, from: &str, to: &str, branch: Option<&str>);
    fn begin_subgraph(&mut self, id: &str, label: &str);
    fn end_subgraph(&mut self);
    fn comment(&mut self, text: &str);
    fn finish(self) -> String;
}

struct MermaidWriter {
    out: String,
    indent: usize,
}

impl MermaidWriter {
    fn new() -> Self {
        Self {
            out: String::from("flowchart TD\n"),
            indent: 1,
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(&"    ".repeat(self.indent));
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn escape(label: &str) -> String {
        label.replace('"', "#quot;")
    }
}

impl GraphWriter for MermaidWriter {
    fn node(&mut self, id: &str, label: &str, shape: Shape) {
        let label = Self::escape(label);
        let text = match shape {
            Shape::Terminal => format!("{}([\"{}\"])", id, label),
            Shape::Decision => format!("{}{{\"{}\"}}", id, label),
            Shape::Process => format!("{}[\"{}\"]", id, label),
        };
        self.line(&text);
    }

    fn edge(&mut self, from: &str, to: &str, branch: Option<&str>) {
        let text = match branch {
            Some(branch) => format!("{} -.->|{}| {}", from, branch, to),
            None => format!("{} --> {}", from, to),
        };
        self.line(&text);
    }

    fn begin_subgraph(&mut self, id: &str, label: &str) {
        self.line(&format!("subgraph {}[\"{}\"]", id, Self::escape(label)));
        self.indent += 1;
    }

    fn end_subgraph(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("end");
    }

    fn comment(&mut self, text: &str) {
        self.line(&format!("%% {}", text));
    }

    fn finish(self) -> String {
        self.out
    }
}

struct DotWriter {
    out: String,
    indent: usize,
}

impl DotWriter {
    fn new() -> Self {
        Self {
            out: String::from("digraph workflow {\n    rankdir=TB;\n"),
            indent: 1,
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(&"    ".repeat(self.indent));
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn escape(label: &str) -> String {
        label.replace('\\', "\\\\").replace('"', "\\\"")
    }
}

impl GraphWriter for DotWriter {
    fn node(&mut self, id: &str, label: &str, shape: Shape) {
        let shape = match shape {
            Shape::Terminal => "oval",
            Shape::Decision => "diamond",
            Shape::Process => "box",
        };
        self.line(&format!(
            "{} [label=\"{}\", shape={}];",
            id,
            Self::escape(label),
            shape
        ));
    }

    fn edge(&mut self, from: &str, to: &str, branch: Option<&str>) {
        let text = match branch {
            Some(branch) => format!("{} -> {} [style=dashed, label=\"{}\"];", from, to, branch),
            None => format!("{} -> {};", from, to),
        };
        self.line(&text);
    }

    fn begin_subgraph(&mut self, id: &str, label: &str) {
        self.line(&format!("subgraph cluster_{} {{", id));
        self.indent += 1;
        self.line(&format!("label=\"{}\";", Self::escape(label)));
    }

    fn end_subgraph(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    fn comment(&mut self, text: &str) {
        self.line(&format!("// {}", text));
    }

    fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }
}

const START_NODE: &str = "start";
const END_NODE: &str = "finish";

/// Renders workflows as diagrams
#[derive(Debug, Clone, Default)]
pub struct WorkflowVisualizer {
    format: VisualizationFormat,
}

impl WorkflowVisualizer {
    /// Create a visualizer for the given format
    pub fn new(format: VisualizationFormat) -> Self {
        Self { format }
    }

    /// Format this visualizer renders
    pub fn format(&self) -> VisualizationFormat {
        self.format
    }

    /// Render a workflow; the same workflow always renders identically
    pub fn render(&self, workflow: &Workflow) -> String {
        match self.format {
            VisualizationFormat::Mermaid => draw(MermaidWriter::new(), &workflow.steps),
            VisualizationFormat::Dot => draw(DotWriter::new(), &workflow.steps),
        }
    }
}

/// Render a workflow as a Mermaid flowchart
pub fn render(workflow: &Workflow) -> String {
    WorkflowVisualizer::default().render(workflow)
}

fn draw<W: GraphWriter>(mut writer: W, steps: &[Step]) -> String {
    writer.node(START_NODE, "Start", Shape::Terminal);
    if steps.is_empty() {
        writer.comment("No steps");
        writer.node("empty", "No steps", Shape::Process);
        writer.edge(START_NODE, "empty", None);
        writer.node(END_NODE, "End", Shape::Terminal);
        writer.edge("empty", END_NODE, None);
        return writer.finish();
    }

    let (first, last) = draw_chain(&mut writer, steps, "");
    writer.node(END_NODE, "End", Shape::Terminal);
    if let (Some(first), Some(last)) = (first, last) {
        writer.edge(START_NODE, &first, None);
        writer.edge(&last, END_NODE, None);
    }
    writer.finish()
}

/// Draw a linear chain of steps, then the subgraphs of any branching steps
fn draw_chain<W: GraphWriter>(
    writer: &mut W,
    steps: &[Step],
    prefix: &str,
) -> (Option<String>, Option<String>) {
    let mut first = None;
    let mut previous: Option<String> = None;

    for step in steps {
        let node_id = format!("{}{}", prefix, step.id);
        writer.node(&node_id, &step.natural_language, shape_of(step));
        if let Some(prev) = &previous {
            writer.edge(prev, &node_id, None);
        }
        if first.is_none() {
            first = Some(node_id.clone());
        }
        previous = Some(node_id);
    }

    for step in steps {
        let node_id = format!("{}{}", prefix, step.id);
        for (branch, children) in branches(step) {
            if children.is_empty() {
                continue;
            }
            let subgraph_id = format!("{}_{}", node_id, branch);
            writer.begin_subgraph(&subgraph_id, &format!("{} of {}", branch, step.id));
            let (entry, _) = draw_chain(writer, children, &format!("{}_", subgraph_id));
            writer.end_subgraph();
            if let Some(entry) = entry {
                writer.edge(&node_id, &entry, Some(branch));
            }
        }
    }

    (first, previous)
}

fn branches(step: &Step) -> Vec<(&'static str, &[Step])> {
    match &step.kind {
        StepKind::If {
            then, otherwise, ..
        } => vec![("then", then.as_slice()), ("else", otherwise.as_slice())],
        StepKind::While { body, .. } => vec![("body", body.as_slice())],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_helpers::assemble_lines;

    #[test]
    fn test_linear_chain() {
        let workflow = assemble_lines(&["set x to 1", "wait 2 seconds"]);
        let diagram = render(&workflow);
        assert!(diagram.starts_with("flowchart TD\n"));
        assert!(diagram.contains("step_1[\"Set x to 1\"]"));
        assert!(diagram.contains("start --> step_1"));
        assert!(diagram.contains("step_1 --> step_2"));
        assert!(diagram.contains("step_2 --> finish"));
    }

    #[test]
    fn test_branches_are_namespaced_subgraphs() {
        let workflow = assemble_lines(&["if x > 2 then set y to 1 else set y to 0"]);
        let diagram = render(&workflow);
        assert!(diagram.contains("step_1{\"If x > 2\"}"));
        assert!(diagram.contains("subgraph step_1_then[\"then of step_1\"]"));
        assert!(diagram.contains("step_1_then_step_2[\"Set y to 1\"]"));
        assert!(diagram.contains("step_1 -.->|then| step_1_then_step_2"));
        assert!(diagram.contains("step_1 -.->|else| step_1_else_step_3"));
        // Branches are not merged back into the main chain
        assert!(!diagram.contains("step_1_then_step_2 --> finish"));
        assert!(diagram.contains("step_1 --> finish"));
    }

    #[test]
    fn test_nested_loop_prefixes() {
        let workflow = assemble_lines(&["for 2 times repeat wait 1 seconds 3 times"]);
        let diagram = render(&workflow);
        assert!(diagram.contains("subgraph step_1_body_step_3_body"));
        assert!(diagram.contains("step_1_body_step_3_body_step_5"));
        assert!(diagram.contains("step_1 -.->|body| step_1_body_step_2"));
    }

    #[test]
    fn test_empty_workflow() {
        let workflow = assemble_lines(&[]);
        let diagram = render(&workflow);
        assert!(diagram.contains("No steps"));
        assert!(diagram.contains("start --> empty"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let workflow = assemble_lines(&[
            "set x to 0",
            "repeat set x to x + 1 3 times",
            "if x > 2 then set y to 1 else set y to 0",
        ]);
        assert_eq!(render(&workflow), render(&workflow));
        let dot = WorkflowVisualizer::new(VisualizationFormat::Dot);
        assert_eq!(dot.render(&workflow), dot.render(&workflow));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let workflow = assemble_lines(&["set msg to \"hi\""]);
        let mermaid = render(&workflow);
        assert!(mermaid.contains("Set msg to #quot;hi#quot;"));

        let dot = WorkflowVisualizer::new(VisualizationFormat::Dot).render(&workflow);
        assert!(dot.contains("label=\"Set msg to \\\"hi\\\"\""));
    }

    #[test]
    fn test_dot_output() {
        let workflow = assemble_lines(&["while busy do wait 1 seconds"]);
        let dot = WorkflowVisualizer::new(VisualizationFormat::Dot).render(&workflow);
        assert!(dot.starts_with("digraph workflow {"));
        assert!(dot.contains("step_1 [label=\"While busy === true\", shape=diamond];"));
        assert!(dot.contains("subgraph cluster_step_1_body {"));
        assert!(dot.contains("step_1 -> step_1_body_step_2 [style=dashed, label=\"body\"];"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(VisualizationFormat::Mermaid.to_string(), "mermaid");
        assert_eq!(VisualizationFormat::Dot.to_string(), "dot");
        assert_eq!(WorkflowVisualizer::default().format(), VisualizationFormat::Mermaid);
    }
}
