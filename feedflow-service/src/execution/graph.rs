// Execution Graph (DAG) Builder
// Builds a directed acyclic graph of actions from their data object ids

use crate::action::Action;
use crate::error::{ConfigError, ConfigErrorKind};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Anything that can be placed in the execution graph
pub trait GraphNode {
    fn node_id(&self) -> &str;

    /// Data objects this node reads
    fn input_ids(&self) -> &[String];

    /// Data objects this node writes
    fn output_ids(&self) -> &[String];
}

impl GraphNode for Arc<dyn Action> {
    fn node_id(&self) -> &str {
        self.id()
    }

    fn input_ids(&self) -> &[String] {
        Action::input_ids(self.as_ref())
    }

    fn output_ids(&self) -> &[String] {
        Action::output_ids(self.as_ref())
    }
}

/// Execution graph of actions connected through the data objects they share
#[derive(Debug, Clone)]
pub struct ExecutionGraph<N> {
    /// All nodes in declaration order
    pub nodes: Vec<ActionNode<N>>,
    /// Quick lookup of node index by action id
    node_indices: HashMap<String, usize>,
}

/// A node representing an action in the execution graph
#[derive(Debug, Clone)]
pub struct ActionNode<N> {
    pub action: N,
    /// Ids of actions producing one of this action's inputs
    pub dependencies: Vec<String>,
    /// Inputs with no producer in the graph; seeded with a start feed
    pub start_inputs: Vec<String>,
}

impl<N: GraphNode> ActionNode<N> {
    pub fn id(&self) -> &str {
        self.action.node_id()
    }
}

impl<N: GraphNode> ExecutionGraph<N> {
    /// Build an execution graph from actions. Fails on duplicate action ids,
    /// data objects written by more than one action, and cycles.
    pub fn from_actions(actions: Vec<N>) -> Result<Self, ConfigError> {
        let mut node_indices = HashMap::new();
        let mut producers: HashMap<&str, &str> = HashMap::new();

        for (i, action) in actions.iter().enumerate() {
            if node_indices.insert(action.node_id().to_string(), i).is_some() {
                return Err(ConfigError::invalid_structure(format!(
                    "duplicate action id '{}'",
                    action.node_id()
                )));
            }
            for output in action.output_ids() {
                if let Some(other) = producers.insert(output.as_str(), action.node_id()) {
                    return Err(ConfigError::new(
                        ConfigErrorKind::DuplicateProducer,
                        format!(
                            "data object '{}' is written by both '{}' and '{}'",
                            output,
                            other,
                            action.node_id()
                        ),
                    ));
                }
            }
        }

        let wiring: Vec<(Vec<String>, Vec<String>)> = actions
            .iter()
            .map(|action| Self::calculate_dependencies(action, &producers))
            .collect();

        let nodes = actions
            .into_iter()
            .zip(wiring)
            .map(|(action, (dependencies, start_inputs))| ActionNode {
                action,
                dependencies,
                start_inputs,
            })
            .collect();

        let graph = Self {
            nodes,
            node_indices,
        };

        // Validate the graph
        graph.detect_cycles()?;

        Ok(graph)
    }

    /// Split inputs into producing actions and start inputs
    fn calculate_dependencies(
        action: &N,
        producers: &HashMap<&str, &str>,
    ) -> (Vec<String>, Vec<String>) {
        let mut dependencies: Vec<String> = Vec::new();
        let mut start_inputs = Vec::new();

        for input in action.input_ids() {
            match producers.get(input.as_str()) {
                Some(producer) => {
                    if !dependencies.iter().any(|d| d == producer) {
                        dependencies.push(producer.to_string());
                    }
                }
                None => start_inputs.push(input.clone()),
            }
        }

        (dependencies, start_inputs)
    }

    /// Detect cycles in action dependencies using DFS
    fn detect_cycles(&self) -> Result<(), ConfigError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in &self.nodes {
            if !visited.contains(node.id()) {
                if let Some(mut cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack) {
                    // Drop the path leading into the cycle
                    let start = cycle
                        .last()
                        .and_then(|repeated| cycle.iter().position(|id| id == repeated));
                    if let Some(start) = start {
                        cycle.drain(..start);
                    }
                    return Err(ConfigError::cyclic(format!(
                        "circular dependency detected: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &ActionNode<N>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        let name = node.id().to_string();
        visited.insert(name.clone());
        rec_stack.insert(name.clone());

        for dep in &node.dependencies {
            if !visited.contains(dep) {
                if let Some(idx) = self.node_indices.get(dep) {
                    if let Some(mut cycle) = self.dfs_cycle(&self.nodes[*idx], visited, rec_stack)
                    {
                        cycle.insert(0, name.clone());
                        return Some(cycle);
                    }
                }
            } else if rec_stack.contains(dep) {
                return Some(vec![name.clone(), dep.clone()]);
            }
        }

        rec_stack.remove(&name);
        None
    }

    /// Get nodes in topological order. Ties are broken by declaration order,
    /// so the order is the same on every call.
    pub fn topological_order(&self) -> Vec<&ActionNode<N>> {
        // Kahn's algorithm for topological sort
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&dep_idx) = self.node_indices.get(dep) {
                    dependents[dep_idx].push(i);
                }
            }
        }

        // Find all nodes with in-degree 0
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop_front() {
            result.push(&self.nodes[idx]);

            for &neighbor in &dependents[idx] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        result
    }

    /// Get actions that can run in parallel (no dependencies between them)
    pub fn parallel_levels(&self) -> Vec<Vec<&ActionNode<N>>> {
        let mut levels: Vec<Vec<&ActionNode<N>>> = Vec::new();
        let mut assigned: HashMap<&str, usize> = HashMap::new();

        for node in self.topological_order() {
            let level = node
                .dependencies
                .iter()
                .filter_map(|dep| assigned.get(dep.as_str()))
                .max()
                .map(|l| l + 1)
                .unwrap_or(0);

            assigned.insert(node.id(), level);

            if level >= levels.len() {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(node);
        }

        levels
    }

    /// Get a node by action id
    pub fn get(&self, id: &str) -> Option<&ActionNode<N>> {
        self.node_indices.get(id).map(|&idx| &self.nodes[idx])
    }

    /// All actions that directly or transitively depend on `id`
    pub fn downstream(&self, id: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for node in &self.nodes {
                if node.dependencies.iter().any(|d| d == current)
                    && !found.iter().any(|f| f == node.id())
                {
                    found.push(node.id().to_string());
                    queue.push_back(node.id());
                }
            }
        }

        found
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
