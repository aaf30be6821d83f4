//! Boolean function graph
//!
//! Function trees from the configuration are flattened into an arena of
//! [`Node`]s. Switch leaves and named functions are shared, so the arena is a
//! DAG. Every node records its dependents (parent nodes and the relays it
//! drives), which is how a switch change finds the boards to recompute.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::board::BoardId;
use crate::error::ModelError;
use crate::switch::{SwitchId, SwitchRegistry};

/// Function tree as written in the configuration
///
/// Serialized externally tagged in lowercase:
/// `{"or": [{"switch": "West"}, {"not": {"function": "Night"}}]}`, `"on"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionSpec {
    /// Value of a switch
    Switch(String),
    /// Value of a named function
    Function(String),
    /// Negation
    Not(Box<FunctionSpec>),
    /// Left fold with `&&`
    And(Vec<FunctionSpec>),
    /// Left fold with `||`
    Or(Vec<FunctionSpec>),
    /// Left fold with `^`
    Xor(Vec<FunctionSpec>),
    /// Left fold with `==`
    Equals(Vec<FunctionSpec>),
    /// Always true
    On,
    /// Always false
    Off,
}

impl FunctionSpec {
    /// Reference a switch by name
    pub fn switch(name: impl Into<String>) -> Self {
        Self::Switch(name.into())
    }

    /// Reference a named function
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(name.into())
    }

    /// Negate an operand
    pub fn not(operand: FunctionSpec) -> Self {
        Self::Not(Box::new(operand))
    }
}

/// Reusable function definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFunctionSpec {
    /// Unique name (case-insensitive)
    pub name: String,
    /// Definition
    pub function: FunctionSpec,
}

impl NamedFunctionSpec {
    /// Create a named definition
    pub fn new(name: impl Into<String>, function: FunctionSpec) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

/// Index of a node within the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Node operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Switch(SwitchId),
    Not(NodeId),
    And(Vec<NodeId>),
    Or(Vec<NodeId>),
    Xor(Vec<NodeId>),
    Equals(Vec<NodeId>),
    On,
    Off,
}

/// Something that must be re-evaluated when a node's value may have changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependent {
    /// A parent node
    Node(NodeId),
    /// A relay slot of a board
    Relay { board: BoardId, relay: u8 },
}

/// A function node with its dependents
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    dependents: Vec<Dependent>,
}

impl Node {
    /// Operation performed by this node
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Nodes and relays notified when this node may change
    pub fn dependents(&self) -> &[Dependent] {
        &self.dependents
    }
}

/// Arena of function nodes
#[derive(Debug, Default)]
pub struct FunctionGraph {
    nodes: Vec<Node>,
    switch_nodes: HashMap<SwitchId, NodeId>,
}

impl FunctionGraph {
    /// Access a node
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Evaluate a node against the current switch states
    pub fn evaluate(&self, id: NodeId, switches: &SwitchRegistry) -> bool {
        match &self.node(id).kind {
            NodeKind::Switch(switch) => switches.get(*switch).is_on(),
            NodeKind::Not(operand) => !self.evaluate(*operand, switches),
            NodeKind::And(ops) => self.fold(ops, switches, |a, b| a && b),
            NodeKind::Or(ops) => self.fold(ops, switches, |a, b| a || b),
            NodeKind::Xor(ops) => self.fold(ops, switches, |a, b| a ^ b),
            NodeKind::Equals(ops) => self.fold(ops, switches, |a, b| a == b),
            NodeKind::On => true,
            NodeKind::Off => false,
        }
    }

    /// Left fold seeded with the first operand's value
    fn fold(&self, ops: &[NodeId], switches: &SwitchRegistry, op: fn(bool, bool) -> bool) -> bool {
        let mut values = ops.iter().map(|id| self.evaluate(*id, switches));
        // The builder rejects empty operand lists
        let first = values.next().unwrap_or(false);
        values.fold(first, op)
    }

    /// Boards with a relay that transitively depends on `switch`
    ///
    /// Each board appears once, however many paths lead to it.
    pub fn boards_depending_on(&self, switch: SwitchId) -> BTreeSet<BoardId> {
        let mut boards = BTreeSet::new();
        let Some(&start) = self.switch_nodes.get(&switch) else {
            return boards;
        };

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.0], true) {
                continue;
            }
            for dependent in &self.nodes[id.0].dependents {
                match *dependent {
                    Dependent::Node(parent) => stack.push(parent),
                    Dependent::Relay { board, .. } => {
                        boards.insert(board);
                    }
                }
            }
        }
        boards
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        let operands: Vec<NodeId> = match &kind {
            NodeKind::Not(op) => vec![*op],
            NodeKind::And(ops) | NodeKind::Or(ops) | NodeKind::Xor(ops) | NodeKind::Equals(ops) => {
                ops.clone()
            }
            NodeKind::Switch(_) | NodeKind::On | NodeKind::Off => Vec::new(),
        };
        self.nodes.push(Node {
            kind,
            dependents: Vec::new(),
        });
        for op in operands {
            self.add_dependent(op, Dependent::Node(id));
        }
        id
    }

    pub(crate) fn add_dependent(&mut self, id: NodeId, dependent: Dependent) {
        let dependents = &mut self.nodes[id.0].dependents;
        if !dependents.contains(&dependent) {
            dependents.push(dependent);
        }
    }
}

/// Builds a [`FunctionGraph`] from definitions, resolving names
pub(crate) struct GraphBuilder<'a> {
    switches: &'a SwitchRegistry,
    graph: FunctionGraph,
    definitions: HashMap<String, &'a NamedFunctionSpec>,
    resolved: HashMap<String, NodeId>,
    resolving: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    /// Register the named definitions and build every one of them, so cycles
    /// and dangling references are reported even in unused definitions
    pub(crate) fn new(
        switches: &'a SwitchRegistry,
        functions: &'a [NamedFunctionSpec],
    ) -> Result<Self, ModelError> {
        let mut definitions = HashMap::with_capacity(functions.len());
        for function in functions {
            let name = function.name.trim();
            if name.is_empty() {
                return Err(ModelError::EmptyFunctionName);
            }
            if definitions.insert(name.to_lowercase(), function).is_some() {
                return Err(ModelError::DuplicateFunction(name.to_string()));
            }
        }

        let mut builder = Self {
            switches,
            graph: FunctionGraph::default(),
            definitions,
            resolved: HashMap::new(),
            resolving: Vec::new(),
        };
        for function in functions {
            builder.named(&function.name)?;
        }
        Ok(builder)
    }

    /// Add a tree, returning its root node
    pub(crate) fn add(&mut self, spec: &FunctionSpec) -> Result<NodeId, ModelError> {
        let kind = match spec {
            FunctionSpec::Switch(name) => {
                let switch = self
                    .switches
                    .find(name)
                    .ok_or_else(|| ModelError::UnknownSwitch(name.clone()))?;
                return Ok(self.switch_node(switch));
            }
            FunctionSpec::Function(name) => return self.named(name),
            FunctionSpec::Not(operand) => NodeKind::Not(self.add(operand)?),
            FunctionSpec::And(ops) => NodeKind::And(self.operands("and", ops)?),
            FunctionSpec::Or(ops) => NodeKind::Or(self.operands("or", ops)?),
            FunctionSpec::Xor(ops) => NodeKind::Xor(self.operands("xor", ops)?),
            FunctionSpec::Equals(ops) => NodeKind::Equals(self.operands("equals", ops)?),
            FunctionSpec::On => NodeKind::On,
            FunctionSpec::Off => NodeKind::Off,
        };
        Ok(self.graph.push(kind))
    }

    /// Record that a relay is driven by `node`
    pub(crate) fn attach_relay(&mut self, node: NodeId, board: BoardId, relay: u8) {
        self.graph.add_dependent(node, Dependent::Relay { board, relay });
    }

    pub(crate) fn finish(self) -> FunctionGraph {
        self.graph
    }

    fn operands(&mut self, kind: &'static str, ops: &[FunctionSpec]) -> Result<Vec<NodeId>, ModelError> {
        if ops.is_empty() {
            return Err(ModelError::NoOperands(kind));
        }
        ops.iter().map(|op| self.add(op)).collect()
    }

    fn switch_node(&mut self, switch: SwitchId) -> NodeId {
        if let Some(&id) = self.graph.switch_nodes.get(&switch) {
            return id;
        }
        let id = self.graph.push(NodeKind::Switch(switch));
        self.graph.switch_nodes.insert(switch, id);
        id
    }

    fn named(&mut self, name: &str) -> Result<NodeId, ModelError> {
        let key = name.trim().to_lowercase();
        if let Some(&id) = self.resolved.get(&key) {
            return Ok(id);
        }
        let definition = *self
            .definitions
            .get(&key)
            .ok_or_else(|| ModelError::UnknownFunction(name.to_string()))?;

        if let Some(start) = self.resolving.iter().position(|n| n.to_lowercase() == key) {
            let mut path = self.resolving[start..].to_vec();
            path.push(definition.name.trim().to_string());
            return Err(ModelError::Cycle(path));
        }

        self.resolving.push(definition.name.trim().to_string());
        let id = self.add(&definition.function);
        self.resolving.pop();

        let id = id?;
        self.resolved.insert(key, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::SwitchSpec;
    use proptest::prelude::*;

    fn registry(names: &[&str]) -> SwitchRegistry {
        let specs: Vec<SwitchSpec> = names.iter().map(|n| SwitchSpec::new(*n)).collect();
        SwitchRegistry::new(&specs).unwrap()
    }

    fn build(switches: &SwitchRegistry, spec: &FunctionSpec) -> (FunctionGraph, NodeId) {
        let mut builder = GraphBuilder::new(switches, &[]).unwrap();
        let root = builder.add(spec).unwrap();
        (builder.finish(), root)
    }

    #[test]
    fn test_switch_leaves_are_shared() {
        let switches = registry(&["A", "B"]);
        let spec = FunctionSpec::Or(vec![
            FunctionSpec::switch("A"),
            FunctionSpec::And(vec![FunctionSpec::switch("a"), FunctionSpec::switch("B")]),
        ]);
        let (graph, _) = build(&switches, &spec);
        // A, B, And, Or
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_single_operand_returns_operand() {
        let switches = registry(&["A"]);
        for spec in [
            FunctionSpec::And(vec![FunctionSpec::switch("A")]),
            FunctionSpec::Xor(vec![FunctionSpec::switch("A")]),
            FunctionSpec::Equals(vec![FunctionSpec::switch("A")]),
        ] {
            let (graph, root) = build(&switches, &spec);
            assert!(!graph.evaluate(root, &switches));
            switches.get(SwitchId(0)).assign(true);
            assert!(graph.evaluate(root, &switches));
            switches.get(SwitchId(0)).assign(false);
        }
    }

    #[test]
    fn test_equals_is_left_fold_not_all_equal() {
        // ((false == false) == true) == true, while "all equal" would be false
        let switches = registry(&["A", "B", "C"]);
        switches.get(SwitchId(2)).assign(true);
        let spec = FunctionSpec::Equals(vec![
            FunctionSpec::switch("A"),
            FunctionSpec::switch("B"),
            FunctionSpec::switch("C"),
        ]);
        let (graph, root) = build(&switches, &spec);
        assert!(graph.evaluate(root, &switches));
    }

    #[test]
    fn test_unknown_switch_rejected() {
        let switches = registry(&["A"]);
        let mut builder = GraphBuilder::new(&switches, &[]).unwrap();
        let err = builder.add(&FunctionSpec::switch("Z")).unwrap_err();
        assert_eq!(err, ModelError::UnknownSwitch("Z".into()));
    }

    #[test]
    fn test_empty_operands_rejected() {
        let switches = registry(&[]);
        let mut builder = GraphBuilder::new(&switches, &[]).unwrap();
        let err = builder.add(&FunctionSpec::Xor(vec![])).unwrap_err();
        assert_eq!(err, ModelError::NoOperands("xor"));
    }

    #[test]
    fn test_cycle_rejected() {
        let switches = registry(&["A"]);
        let functions = vec![
            NamedFunctionSpec::new(
                "Lobby",
                FunctionSpec::Or(vec![FunctionSpec::switch("A"), FunctionSpec::function("Hall")]),
            ),
            NamedFunctionSpec::new("Hall", FunctionSpec::not(FunctionSpec::function("lobby"))),
        ];
        let err = GraphBuilder::new(&switches, &functions).err().unwrap();
        assert_eq!(
            err,
            ModelError::Cycle(vec!["Lobby".into(), "Hall".into(), "Lobby".into()])
        );
    }

    #[test]
    fn test_self_reference_rejected() {
        let switches = registry(&[]);
        let functions = vec![NamedFunctionSpec::new("Loop", FunctionSpec::function("Loop"))];
        let err = GraphBuilder::new(&switches, &functions).err().unwrap();
        assert_eq!(err, ModelError::Cycle(vec!["Loop".into(), "Loop".into()]));
    }

    #[test]
    fn test_named_functions_are_shared() {
        let switches = registry(&["A", "B"]);
        let functions = vec![NamedFunctionSpec::new(
            "Both",
            FunctionSpec::And(vec![FunctionSpec::switch("A"), FunctionSpec::switch("B")]),
        )];
        let mut builder = GraphBuilder::new(&switches, &functions).unwrap();
        let first = builder.add(&FunctionSpec::function("both")).unwrap();
        let second = builder.add(&FunctionSpec::function("BOTH")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_spec_json_shape() {
        let spec: FunctionSpec = serde_json::from_str(
            r#"{"or": [{"switch": "West"}, {"not": {"function": "Night"}}, "off"]}"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            FunctionSpec::Or(vec![
                FunctionSpec::switch("West"),
                FunctionSpec::not(FunctionSpec::function("Night")),
                FunctionSpec::Off,
            ])
        );
    }

    fn expected_fold(values: &[bool], op: fn(bool, bool) -> bool) -> bool {
        values[1..].iter().fold(values[0], |acc, v| op(acc, *v))
    }

    proptest! {
        #[test]
        fn variadic_functions_fold_left(values in prop::collection::vec(any::<bool>(), 1..6)) {
            let names: Vec<String> = (0..values.len()).map(|i| format!("S{i}")).collect();
            let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let switches = registry(&name_refs);
            for (i, on) in values.iter().enumerate() {
                switches.get(SwitchId(i)).assign(*on);
            }
            let leaves: Vec<FunctionSpec> = names.iter().map(FunctionSpec::switch).collect();

            let cases: [(FunctionSpec, fn(bool, bool) -> bool); 4] = [
                (FunctionSpec::And(leaves.clone()), |a, b| a && b),
                (FunctionSpec::Or(leaves.clone()), |a, b| a || b),
                (FunctionSpec::Xor(leaves.clone()), |a, b| a ^ b),
                (FunctionSpec::Equals(leaves.clone()), |a, b| a == b),
            ];
            for (spec, op) in cases {
                let (graph, root) = build(&switches, &spec);
                prop_assert_eq!(graph.evaluate(root, &switches), expected_fold(&values, op));
            }
        }

        #[test]
        fn not_negates(on: bool) {
            let switches = registry(&["A"]);
            switches.get(SwitchId(0)).assign(on);
            let (graph, root) = build(&switches, &FunctionSpec::not(FunctionSpec::switch("A")));
            prop_assert_eq!(graph.evaluate(root, &switches), !on);
        }
    }
}
