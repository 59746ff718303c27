use crate::{CallSite, Error, FunctionModel, Result, StaticModel};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// A function reachable from the entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphNode {
    /// Qualified name for declarations, the call text for leaves
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    /// Declaration line; `None` for unresolved leaves
    pub line: Option<usize>,
    /// Distance from the entry point
    pub depth: usize,
    /// The node names a declaration in the model
    pub resolved: bool,
    /// Outgoing calls were enumerated
    pub expanded: bool,
}

/// A caller to callee relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraphEdge {
    pub from: String,
    pub to: String,
    /// Line of the first call site
    pub line: usize,
    /// The edge closes a cycle back to a node still being expanded
    pub recursive: bool,
}

/// Directed call relationships rooted at one entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraph {
    pub entry_point: String,
    pub nodes: Vec<CallGraphNode>,
    pub edges: Vec<CallGraphEdge>,
    /// Some node at the depth bound still had calls left unexpanded
    pub max_depth_reached: bool,
}

impl CallGraph {
    pub fn node(&self, id: &str) -> Option<&CallGraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ids of the direct callees of a node, in call order.
    pub fn callees<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.from == id)
            .map(|e| e.to.as_str())
    }

    pub fn has_cycle(&self) -> bool {
        self.edges.iter().any(|e| e.recursive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    Visiting,
    Visited,
}

#[derive(Debug)]
struct Slot<'a> {
    function: Option<&'a FunctionModel>,
    parent: Option<usize>,
    state: NodeState,
}

/// Breadth-first call graph expansion over one static model
#[derive(Debug, Clone, Copy)]
pub struct CallGraphBuilder {
    max_depth: usize,
}

impl CallGraphBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Build the graph reachable from `entry_point`.
    ///
    /// Calls that resolve to nothing in the model become leaves. An edge back to
    /// the node being expanded, or to one of its ancestors, is kept once and
    /// marked recursive instead of being expanded again.
    pub fn build(&self, entry_point: &str, model: &StaticModel) -> Result<CallGraph> {
        let entry = model
            .find_function(entry_point)
            .ok_or_else(|| Error::EntryPointNotFound(entry_point.to_string()))?;

        let mut graph = CallGraph {
            entry_point: entry.qualified_name(),
            nodes: Vec::new(),
            edges: Vec::new(),
            max_depth_reached: false,
        };
        // arena of node states, parallel to `graph.nodes`
        let mut slots: Vec<Slot> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        let root = Self::add_node(
            &mut graph,
            &mut slots,
            &mut index,
            declaration_node(entry, 0),
            Some(entry),
            None,
        );
        queue.push_back(root);

        while let Some(current) = queue.pop_front() {
            let Some(function) = slots[current].function else {
                slots[current].state = NodeState::Visited;
                continue;
            };
            let depth = graph.nodes[current].depth;
            if depth >= self.max_depth {
                if !function.summary.calls.is_empty() {
                    graph.max_depth_reached = true;
                }
                slots[current].state = NodeState::Visited;
                continue;
            }

            slots[current].state = NodeState::Visiting;
            graph.nodes[current].expanded = true;
            let from = graph.nodes[current].id.clone();
            for call in &function.summary.calls {
                let target = model.resolve_call_from(call, function.owner.as_deref());
                let id = match target {
                    Some(f) => f.qualified_name(),
                    None => leaf_id(call),
                };
                let (to, recursive) = match index.get(&id).copied() {
                    Some(existing) => (existing, Self::closes_cycle(&slots, current, existing)),
                    None => {
                        let node = match target {
                            Some(f) => declaration_node(f, depth + 1),
                            None => leaf_node(call, depth + 1),
                        };
                        let added = Self::add_node(
                            &mut graph,
                            &mut slots,
                            &mut index,
                            node,
                            target,
                            Some(current),
                        );
                        if target.is_some() {
                            queue.push_back(added);
                        }
                        (added, false)
                    }
                };
                let to_id = &graph.nodes[to].id;
                if graph.edges.iter().any(|e| e.from == from && e.to == *to_id) {
                    continue;
                }
                graph.edges.push(CallGraphEdge {
                    from: from.clone(),
                    to: to_id.clone(),
                    line: call.line,
                    recursive,
                });
            }
            slots[current].state = NodeState::Visited;
        }

        debug!(
            "call graph from {}: {} node(s), {} edge(s)",
            graph.entry_point,
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(graph)
    }

    fn add_node<'a>(
        graph: &mut CallGraph,
        slots: &mut Vec<Slot<'a>>,
        index: &mut HashMap<String, usize>,
        node: CallGraphNode,
        function: Option<&'a FunctionModel>,
        parent: Option<usize>,
    ) -> usize {
        let position = graph.nodes.len();
        index.insert(node.id.clone(), position);
        graph.nodes.push(node);
        slots.push(Slot {
            function,
            parent,
            state: if function.is_some() {
                NodeState::Unvisited
            } else {
                NodeState::Visited
            },
        });
        position
    }

    /// Whether `target` is the node being expanded or one of its ancestors.
    fn closes_cycle(slots: &[Slot], current: usize, target: usize) -> bool {
        if slots[target].state == NodeState::Unvisited {
            return false;
        }
        let mut cursor = Some(current);
        while let Some(node) = cursor {
            if node == target {
                return true;
            }
            cursor = slots[node].parent;
        }
        false
    }
}

fn declaration_node(function: &FunctionModel, depth: usize) -> CallGraphNode {
    CallGraphNode {
        id: function.qualified_name(),
        name: function.name.clone(),
        owner: function.owner.clone(),
        line: Some(function.line),
        depth,
        resolved: true,
        expanded: false,
    }
}

fn leaf_node(call: &CallSite, depth: usize) -> CallGraphNode {
    CallGraphNode {
        id: leaf_id(call),
        name: call.callee.clone(),
        owner: None,
        line: None,
        depth,
        resolved: false,
        expanded: false,
    }
}

fn leaf_id(call: &CallSite) -> String {
    match &call.receiver {
        Some(receiver) => format!("{}.{}", receiver, call.callee),
        None => call.callee.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LanguageType, StaticAnalyzer};

    const SOURCE: &str = r#"
function main() {
  const tree = parse("1 + 2");
  return evaluate(tree);
}

function parse(text: string) {
  return tokenize(text);
}

function tokenize(text: string) {
  return text.split(" ");
}

function evaluate(node) {
  if (node.left) {
    return evaluate(node.left) + evaluate(node.right);
  }
  return helper(node);
}

function isEven(n: number): boolean {
  return n === 0 ? true : isOdd(n - 1);
}

function isOdd(n: number): boolean {
  return n === 0 ? false : isEven(n - 1);
}
"#;

    fn model() -> StaticModel {
        let mut analyzer = StaticAnalyzer::new();
        analyzer
            .analyze_source(SOURCE, LanguageType::TypeScript)
            .unwrap()
    }

    #[test]
    fn test_breadth_first_depths_and_leaves() {
        let graph = CallGraphBuilder::new(10).build("main", &model()).unwrap();
        assert_eq!(graph.entry_point, "main");
        assert_eq!(graph.node("main").unwrap().depth, 0);
        assert_eq!(graph.node("parse").unwrap().depth, 1);
        assert_eq!(graph.node("evaluate").unwrap().depth, 1);
        assert_eq!(graph.node("tokenize").unwrap().depth, 2);

        let leaf = graph.node("helper").unwrap();
        assert!(!leaf.resolved);
        assert!(!leaf.expanded);
        assert_eq!(leaf.line, None);
        assert!(graph.node("text.split").is_some());
        assert!(!graph.max_depth_reached);
    }

    #[test]
    fn test_self_recursion_is_one_edge() {
        let graph = CallGraphBuilder::new(10).build("main", &model()).unwrap();
        let loops: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| e.from == "evaluate" && e.to == "evaluate")
            .collect();
        assert_eq!(loops.len(), 1);
        assert!(loops[0].recursive);
        assert_eq!(
            graph.callees("main").collect::<Vec<_>>(),
            vec!["parse", "evaluate"]
        );
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let graph = CallGraphBuilder::new(10).build("isEven", &model()).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        let back = graph
            .edges
            .iter()
            .find(|e| e.from == "isOdd" && e.to == "isEven")
            .unwrap();
        assert!(back.recursive);
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_depth_bound() {
        let graph = CallGraphBuilder::new(1).build("main", &model()).unwrap();
        assert!(graph.max_depth_reached);
        assert!(graph.node("tokenize").is_none());
        assert!(!graph.node("parse").unwrap().expanded);
    }

    #[test]
    fn test_missing_entry_point() {
        let err = CallGraphBuilder::new(10)
            .build("nowhere", &model())
            .unwrap_err();
        assert!(matches!(err, Error::EntryPointNotFound(name) if name == "nowhere"));
    }
}
