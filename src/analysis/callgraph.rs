use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::analysis::{Analysis, MethodAnalysis, MethodKey, MethodOrigin, XrefLinked};

/// Node payload: the method and what is cheap to know about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallGraphNode {
    pub method: MethodKey,
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub external: bool,
    /// The method's class is one of the entry point classes.
    pub entrypoint: bool,
    pub native: bool,
    pub public: bool,
    pub is_static: bool,
    /// Position of the defining file plus one; 0 for external methods.
    pub vm: usize,
    /// Number of decoded instructions; 0 for external methods.
    pub codesize: usize,
}

impl CallGraphNode {
    fn new(m: &MethodAnalysis, entry_points: &[&str]) -> Self {
        let vm = match m.get_origin() {
            MethodOrigin::Internal { vm, .. } => vm + 1,
            MethodOrigin::External(_) => 0,
        };
        CallGraphNode {
            method: m.key(),
            class_name: m.class_name().to_string(),
            name: m.name().to_string(),
            descriptor: m.descriptor().to_string(),
            external: m.is_external(),
            entrypoint: entry_points.contains(&m.class_name()),
            native: m.access().contains("native"),
            public: m.access().contains("public"),
            is_static: m.access().contains("static"),
            vm,
            codesize: m.get_nb_instructions(),
        }
    }
}

impl fmt::Display for CallGraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class_name, self.name, self.descriptor)
    }
}

/// Directed multigraph of calls. Each edge carries the byte offset of the
/// call site in the caller; one caller may reach the same callee through
/// several edges.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraph<CallGraphNode, usize>,
    nodes: HashMap<MethodKey, NodeIndex>,
}

impl CallGraph {
    pub fn graph(&self) -> &DiGraph<CallGraphNode, usize> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, method: MethodKey) -> Option<&CallGraphNode> {
        self.nodes.get(&method).map(|ix| &self.graph[*ix])
    }

    pub fn contains(&self, method: MethodKey) -> bool {
        self.nodes.contains_key(&method)
    }

    /// Call site offsets from `caller` to `callee`, sorted.
    pub fn call_sites(&self, caller: MethodKey, callee: MethodKey) -> Vec<usize> {
        let (from, to) = match (self.nodes.get(&caller), self.nodes.get(&callee)) {
            (Some(a), Some(b)) => (*a, *b),
            _ => return Vec::new(),
        };
        let mut offsets: Vec<usize> = self
            .graph
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| e.target() == to)
            .map(|e| *e.weight())
            .collect();
        offsets.sort_unstable();
        offsets
    }

    pub fn callees(&self, method: MethodKey) -> Vec<MethodKey> {
        self.neighbors(method, Direction::Outgoing)
    }

    pub fn callers(&self, method: MethodKey) -> Vec<MethodKey> {
        self.neighbors(method, Direction::Incoming)
    }

    fn neighbors(&self, method: MethodKey, dir: Direction) -> Vec<MethodKey> {
        let mut keys: Vec<MethodKey> = match self.nodes.get(&method) {
            Some(ix) => self.graph.neighbors_directed(*ix, dir).map(|n| self.graph[n].method).collect(),
            None => Vec::new(),
        };
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Graphviz rendering, one edge per call site labelled with its offset.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }

    fn node_for(&mut self, m: &MethodAnalysis, entry_points: &[&str]) -> NodeIndex {
        if let Some(ix) = self.nodes.get(&m.key()) {
            return *ix;
        }
        let ix = self.graph.add_node(CallGraphNode::new(m, entry_points));
        self.nodes.insert(m.key(), ix);
        ix
    }
}

pub(crate) fn build(
    analysis: &Analysis<XrefLinked>,
    methods: Vec<&MethodAnalysis>,
    no_isolated: bool,
    entry_points: &[&str],
) -> CallGraph {
    let mut cg = CallGraph::default();
    let mut seen: HashSet<(NodeIndex, NodeIndex, usize)> = HashSet::new();

    for m in methods {
        if no_isolated && m.get_xref_to().is_empty() && m.get_xref_from().is_empty() {
            continue;
        }
        let me = cg.node_for(m, entry_points);

        for (_, callee, off) in m.get_xref_to() {
            if let Some(callee) = analysis.method(*callee) {
                let other = cg.node_for(callee, entry_points);
                if seen.insert((me, other, *off)) {
                    cg.graph.add_edge(me, other, *off);
                }
            }
        }
        for (_, caller, off) in m.get_xref_from() {
            if let Some(caller) = analysis.method(*caller) {
                let other = cg.node_for(caller, entry_points);
                if seen.insert((other, me, *off)) {
                    cg.graph.add_edge(other, me, *off);
                }
            }
        }
    }
    cg
}
