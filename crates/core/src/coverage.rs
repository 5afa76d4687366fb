//! Coverage/import graph builder.
//!
//! Depth-first traversal from a root document, restricted to omgroup
//! descent, transitive imports and document inclusions. Every node is
//! stamped covered or uncovered at the moment it is first discovered;
//! a coverage marker flips the global flag for everything discovered
//! afterwards. Early exit in covered-only mode is an explicit control
//! value returned up the call chain, never stack unwinding.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::grammar::EnvKind;
use crate::harvester::SourceFile;
use crate::position::Position;
use crate::report::{DiagnosticKind, Report, Severity};
use crate::tree::{FileId, MacroData, NodeData, NodeId};

/// What a coverage marker does to the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageMode {
    /// The marker only sets the flag; traversal continues past it.
    Full,
    /// The marker aborts the remainder of the current branch and stops
    /// the traversal.
    CoveredOnly,
}

/// How a document-inclusion cycle is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Report a cycle error for the branch; descent is skipped either way.
    FatalBranch,
    /// Skip silently, like any other re-discovered node.
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    pub mode: CoverageMode,
    pub cycle_policy: CyclePolicy,
}

impl Default for GraphOptions {
    fn default() -> Self {
        GraphOptions {
            mode: CoverageMode::Full,
            cycle_policy: CyclePolicy::FatalBranch,
        }
    }
}

/// Identity of a graph node: a file root or an omgroup node within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub file: FileId,
    pub node: NodeId,
}

#[derive(Debug)]
pub struct GraphNode {
    pub key: NodeKey,
    pub id: String,
    pub label: String,
    /// Fixed at first discovery, never revisited.
    pub covered: bool,
    /// Merged/suppressed nodes are flagged dead, never removed.
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Include,
    Import,
    Use,
    Reference,
}

impl EdgeStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStyle::Include => "include",
            EdgeStyle::Import => "import",
            EdgeStyle::Use => "use",
            EdgeStyle::Reference => "reference",
        }
    }
}

/// Directed edge in discovery order. Edges are not deduplicated --
/// parallel edges represent distinct macro occurrences.
#[derive(Debug)]
pub struct GraphEdge {
    pub source: NodeKey,
    /// `None` for unresolved targets; reported and dropped from rendering.
    pub target: Option<NodeKey>,
    pub seq: usize,
    /// Position of the originating macro; `None` after edge merging.
    pub origin: Option<Position>,
    pub style: EdgeStyle,
}

/// Result of one traversal run.
#[derive(Debug)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    index: HashMap<NodeKey, usize>,
    root: NodeKey,
}

impl Graph {
    pub fn node(&self, key: NodeKey) -> Option<&GraphNode> {
        self.index.get(&key).map(|&i| &self.nodes[i])
    }

    /// Find a live node by its label (omgroup title or position string).
    pub fn node_by_label(&self, label: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.alive && n.label == label)
    }

    /// Serialize to the external JSON schema:
    /// `{"nodes":[{"id","color","label"}],"edges":[{"id","style","from","to","label"}]}`.
    ///
    /// Dead nodes, the root document and edges with a dropped endpoint are
    /// omitted; covered nodes render green, uncovered blue.
    pub fn to_json(&self) -> Value {
        let mut rendered: HashMap<NodeKey, &GraphNode> = HashMap::new();
        for node in &self.nodes {
            if node.alive && node.key != self.root {
                rendered.insert(node.key, node);
            }
        }
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .filter(|n| rendered.contains_key(&n.key))
            .map(|n| {
                json!({
                    "id": n.id,
                    "color": if n.covered { "#00ff00" } else { "#0000ff" },
                    "label": n.label,
                })
            })
            .collect();
        let edges: Vec<Value> = self
            .edges
            .iter()
            .filter(|e| {
                rendered.contains_key(&e.source)
                    && e.target.is_some_and(|t| rendered.contains_key(&t))
            })
            .map(|e| {
                let from = &rendered[&e.source].id;
                let to = &rendered[&e.target.expect("filtered above")].id;
                let origin = e
                    .origin
                    .as_ref()
                    .map(|p| p.display(true))
                    .unwrap_or_else(|| "-".to_owned());
                json!({
                    "id": format!("{};{};{}", from, origin, to),
                    "style": e.style.as_str(),
                    "from": from,
                    "to": to,
                    "label": "",
                })
            })
            .collect();
        json!({ "nodes": nodes, "edges": edges })
    }
}

/// Explicit control value for early-exit propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Descent {
    Continue,
    /// Propagates up to the traversal entry point, which absorbs it.
    Stop,
}

/// Build the coverage graph for one root document.
pub fn build_graph(
    files: &[SourceFile],
    root: FileId,
    options: GraphOptions,
    report: &mut Report,
) -> Graph {
    let root_key = NodeKey {
        file: root,
        node: files[root.0].tree.root(),
    };
    let mut builder = GraphBuilder {
        files,
        options,
        report,
        graph: Graph {
            nodes: Vec::new(),
            edges: Vec::new(),
            index: HashMap::new(),
            root: root_key,
        },
        path: Vec::new(),
        coverage_reached: false,
        seq: 0,
    };
    // a Stop signal from covered-only mode is absorbed here; state built
    // so far is preserved
    builder.visit(root_key);
    builder.merge_single_omgroup_files();
    builder.graph
}

struct GraphBuilder<'a> {
    files: &'a [SourceFile],
    options: GraphOptions,
    report: &'a mut Report,
    graph: Graph,
    /// Keys on the current DFS path, for cycle detection.
    path: Vec<NodeKey>,
    /// Set once by the first coverage marker, never reset.
    coverage_reached: bool,
    seq: usize,
}

impl<'a> GraphBuilder<'a> {
    fn discovered(&self, key: NodeKey) -> bool {
        self.graph.index.contains_key(&key)
    }

    fn add_node(&mut self, key: NodeKey) {
        let files = self.files;
        let node = files[key.file.0].tree.node(key.node);
        let id = node.position.display(true);
        let label = match &node.data {
            NodeData::Env(env) => env.title.clone().unwrap_or_default(),
            _ => id.clone(),
        };
        self.graph.index.insert(key, self.graph.nodes.len());
        self.graph.nodes.push(GraphNode {
            key,
            id,
            label,
            covered: !self.coverage_reached,
            alive: true,
        });
    }

    fn add_edge(
        &mut self,
        source: NodeKey,
        target: Option<NodeKey>,
        origin: Option<Position>,
        style: EdgeStyle,
    ) {
        let seq = self.seq;
        self.seq += 1;
        self.graph.edges.push(GraphEdge {
            source,
            target,
            seq,
            origin,
            style,
        });
    }

    /// First discovery of a node: stamp coverage, then scan its subtree.
    fn visit(&mut self, key: NodeKey) -> Descent {
        self.add_node(key);
        self.path.push(key);
        let result = self.scan(key);
        self.path.pop();
        result
    }

    /// Scan the children of a file root or omgroup for structural macros.
    fn scan(&mut self, key: NodeKey) -> Descent {
        let files = self.files;
        let tree = &files[key.file.0].tree;
        let children = tree.node(key.node).children.clone();
        for child in children {
            let relevant = tree.collect(child, &|n| match &n.data {
                NodeData::Env(env) => env.kind == EnvKind::OmGroup,
                NodeData::Macro(m) => matches!(
                    m,
                    MacroData::GImport { .. }
                        | MacroData::ImportModule { .. }
                        | MacroData::InputRef { .. }
                        | MacroData::CoverageMarker
                ),
                NodeData::File => false,
            });
            for id in relevant {
                if let Descent::Stop = self.step(key, id) {
                    return Descent::Stop;
                }
            }
        }
        Descent::Continue
    }

    /// Handle one structural macro or omgroup found below `key`.
    fn step(&mut self, key: NodeKey, id: NodeId) -> Descent {
        let files = self.files;
        let tree = &files[key.file.0].tree;
        let origin = tree.node(id).position.clone();

        match &tree.node(id).data {
            NodeData::Macro(MacroData::CoverageMarker) => {
                self.coverage_reached = true;
                if self.options.mode == CoverageMode::CoveredOnly {
                    return Descent::Stop;
                }
            }
            NodeData::Env(env) => {
                if env.blind {
                    return Descent::Continue;
                }
                let omgroup_key = NodeKey {
                    file: key.file,
                    node: id,
                };
                self.add_edge(key, Some(omgroup_key), Some(origin), EdgeStyle::Include);
                if !self.discovered(omgroup_key) {
                    if let Descent::Stop = self.visit(omgroup_key) {
                        return Descent::Stop;
                    }
                }
            }
            NodeData::Macro(m) => {
                let style = match m {
                    MacroData::InputRef { .. } => EdgeStyle::Include,
                    _ => EdgeStyle::Import,
                };
                let is_input_ref = matches!(m, MacroData::InputRef { .. });
                let target = m.target().expect("structural macros carry a target");
                match target.file {
                    None => {
                        let message = format!(
                            "failed to find {} (unresolved target of \"{}\")",
                            target.position.display(true),
                            tree.node(id).text
                        );
                        self.add_edge(key, None, Some(origin.clone()), style);
                        self.report.log(
                            Severity::Error,
                            DiagnosticKind::MissingFile,
                            message,
                            Some(origin),
                        );
                    }
                    Some(target_file) => {
                        let target_key = NodeKey {
                            file: target_file,
                            node: files[target_file.0].tree.root(),
                        };
                        self.add_edge(key, Some(target_key), Some(origin.clone()), style);
                        if self.discovered(target_key) {
                            // re-discovery: never re-descend; a document
                            // inclusion back to the current path is a cycle
                            if is_input_ref
                                && self.path.contains(&target_key)
                                && self.options.cycle_policy == CyclePolicy::FatalBranch
                            {
                                self.report.log(
                                    Severity::Error,
                                    DiagnosticKind::CycleError,
                                    format!(
                                        "document inclusion cycle: {} reached again",
                                        files[target_file.0].position.display(true)
                                    ),
                                    Some(origin),
                                );
                            }
                        } else if let Descent::Stop = self.visit(target_key) {
                            return Descent::Stop;
                        }
                    }
                }
            }
            NodeData::File => {}
        }
        Descent::Continue
    }

    /// A live file node whose tree is exactly one omgroup is suppressed;
    /// its in-edges are redirected to the omgroup node.
    fn merge_single_omgroup_files(&mut self) {
        let files = self.files;
        for i in 0..self.graph.nodes.len() {
            if !self.graph.nodes[i].alive {
                continue;
            }
            let key = self.graph.nodes[i].key;
            let tree = &files[key.file.0].tree;
            if key.node != tree.root() {
                continue;
            }
            let children = &tree.node(tree.root()).children;
            if children.len() != 1 {
                continue;
            }
            let child = children[0];
            let is_omgroup = matches!(
                &tree.node(child).data,
                NodeData::Env(env) if env.kind == EnvKind::OmGroup
            );
            if !is_omgroup {
                continue;
            }
            let omgroup_key = NodeKey {
                file: key.file,
                node: child,
            };
            if !self.graph.index.contains_key(&omgroup_key) {
                continue;
            }
            self.graph.nodes[i].alive = false;
            for edge in &mut self.graph.edges {
                if edge.target == Some(key) {
                    edge.target = Some(omgroup_key);
                    edge.origin = None;
                }
            }
        }
    }
}
