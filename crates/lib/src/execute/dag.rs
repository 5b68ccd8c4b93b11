//! Execution DAG for resource dependency management.
//!
//! This module provides a directed acyclic graph (DAG) over resource URNs
//! and computes parallel execution waves.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::ResourceGraph;
use crate::resource::Urn;
use crate::snapshot::ResourceState;

use super::types::ExecuteError;

/// A DAG of resources, with edges from each dependency to its dependent.
pub struct ExecutionDag {
  graph: DiGraph<Urn, ()>,
  nodes: HashMap<Urn, NodeIndex>,
}

impl ExecutionDag {
  /// Build the DAG of a declared graph. Nodes keep declaration order.
  pub fn from_graph(resources: &ResourceGraph) -> Result<Self, ExecuteError> {
    Self::build(
      resources
        .intents()
        .iter()
        .map(|intent| (intent.urn.clone(), intent.dependencies().into_iter().collect())),
    )
  }

  /// Build the DAG of recorded resources.
  ///
  /// Dependencies on resources outside `states` are ignored.
  pub fn from_states<'a>(states: impl IntoIterator<Item = &'a ResourceState>) -> Result<Self, ExecuteError> {
    Self::build(
      states
        .into_iter()
        .map(|state| (state.urn.clone(), state.dependencies.iter().cloned().collect())),
    )
  }

  fn build(entries: impl Iterator<Item = (Urn, Vec<Urn>)>) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let entries: Vec<(Urn, Vec<Urn>)> = entries.collect();

    // First pass: one node per resource
    for (urn, _) in &entries {
      let idx = graph.add_node(urn.clone());
      nodes.insert(urn.clone(), idx);
    }

    // Second pass: edges from dependency to dependent
    for (urn, deps) in &entries {
      let dependent_idx = nodes[urn];
      for dep in deps {
        if let Some(&dep_idx) = nodes.get(dep) {
          graph.add_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  /// Resources organized into parallel execution waves.
  ///
  /// Each wave contains resources whose dependencies are all in previous
  /// waves. Within a wave, nodes keep insertion order.
  ///
  /// # Example
  ///
  /// If you have:
  /// - Service account A (no deps)
  /// - Bucket B (no deps)
  /// - Role C (depends on A)
  /// - Attachment D (depends on C)
  ///
  /// The waves would be:
  /// - Wave 0: [A, B]
  /// - Wave 1: [C]
  /// - Wave 2: [D]
  pub fn execution_waves(&self) -> Result<Vec<Vec<Urn>>, ExecuteError> {
    // Use Kahn's algorithm variant to compute levels
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    let mut node_level: BTreeMap<NodeIndex, usize> = BTreeMap::new();

    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut current_level = 0;
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for &idx in &ready {
        node_level.insert(idx, current_level);
        remaining.remove(&idx);

        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      current_level += 1;
    }

    let mut waves: Vec<Vec<Urn>> = vec![Vec::new(); current_level];
    // BTreeMap iteration is by node index, i.e. insertion order
    for (idx, level) in node_level {
      waves[level].push(self.graph[idx].clone());
    }

    Ok(waves)
  }

  /// Waves for tearing resources down: dependents before their dependencies.
  pub fn deletion_waves(&self) -> Result<Vec<Vec<Urn>>, ExecuteError> {
    let mut waves = self.execution_waves()?;
    waves.reverse();
    Ok(waves)
  }

  /// The direct dependencies of a resource.
  pub fn dependencies(&self, urn: &Urn) -> Vec<Urn> {
    let Some(&idx) = self.nodes.get(urn) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep_idx| self.graph[dep_idx].clone())
      .collect()
  }

  pub fn contains(&self, urn: &Urn) -> bool {
    self.nodes.contains_key(urn)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::DeclareOptions;
  use crate::resource::{PropertyBag, ResourceType};
  use crate::util::hash::ObjectHash;
  use serde_json::json;
  use std::collections::BTreeSet;

  fn state(urn: &Urn, deps: &[&Urn]) -> ResourceState {
    let (rtype, name) = urn.parts().unwrap();
    ResourceState {
      urn: urn.clone(),
      rtype,
      name: name.to_string(),
      inputs: json!({}),
      inputs_hash: ObjectHash("0".repeat(20)),
      outputs: Default::default(),
      dependencies: deps.iter().map(|d| (*d).clone()).collect(),
    }
  }

  #[test]
  fn empty_graph() {
    let dag = ExecutionDag::from_graph(&ResourceGraph::new()).unwrap();
    assert!(dag.is_empty());
    assert!(dag.execution_waves().unwrap().is_empty());
  }

  #[test]
  fn independent_resources_share_a_wave() {
    let mut graph = ResourceGraph::new();
    graph
      .declare(ResourceType::GcpStorageBucket, "my-bucket", PropertyBag::new())
      .unwrap();
    graph
      .declare(ResourceType::AwsS3Bucket, "my-bucket", PropertyBag::new())
      .unwrap();

    let waves = ExecutionDag::from_graph(&graph).unwrap().execution_waves().unwrap();
    assert_eq!(waves.len(), 1);
    assert_eq!(
      waves[0],
      vec![
        Urn::new(ResourceType::GcpStorageBucket, "my-bucket"),
        Urn::new(ResourceType::AwsS3Bucket, "my-bucket"),
      ]
    );
  }

  #[test]
  fn data_dependency_orders_waves() {
    let mut graph = ResourceGraph::new();
    let sa = graph
      .declare(
        ResourceType::GcpServiceAccount,
        "sa",
        PropertyBag::new().with("account_id", "federation"),
      )
      .unwrap();
    let bucket = graph
      .declare(ResourceType::AwsS3Bucket, "data", PropertyBag::new())
      .unwrap();
    let role = graph
      .declare(
        ResourceType::AwsIamRole,
        "role",
        PropertyBag::new().with("assume_role_policy", sa.string("unique_id").unwrap()),
      )
      .unwrap();
    graph
      .declare_with(
        ResourceType::AwsIamRolePolicyAttachment,
        "attach",
        PropertyBag::new().with("role", role.string("name").unwrap()),
        DeclareOptions {
          depends_on: vec![bucket.urn().clone()],
        },
      )
      .unwrap();

    let dag = ExecutionDag::from_graph(&graph).unwrap();
    let waves = dag.execution_waves().unwrap();
    assert_eq!(waves.len(), 3);
    assert_eq!(waves[0], vec![sa.urn().clone(), bucket.urn().clone()]);
    assert_eq!(waves[1], vec![role.urn().clone()]);

    let attach = Urn::new(ResourceType::AwsIamRolePolicyAttachment, "attach");
    let deps: BTreeSet<Urn> = dag.dependencies(&attach).into_iter().collect();
    assert_eq!(deps, BTreeSet::from([role.urn().clone(), bucket.urn().clone()]));
  }

  #[test]
  fn deletion_waves_reverse_dependencies() {
    let sa = Urn::new(ResourceType::GcpServiceAccount, "sa");
    let role = Urn::new(ResourceType::AwsIamRole, "role");
    let states = [state(&sa, &[]), state(&role, &[&sa])];

    let dag = ExecutionDag::from_states(&states).unwrap();
    assert_eq!(dag.deletion_waves().unwrap(), vec![vec![role], vec![sa]]);
  }

  #[test]
  fn dependencies_outside_the_set_are_ignored() {
    let sa = Urn::new(ResourceType::GcpServiceAccount, "sa");
    let role = Urn::new(ResourceType::AwsIamRole, "role");
    let states = [state(&role, &[&sa])];

    let dag = ExecutionDag::from_states(&states).unwrap();
    assert!(!dag.contains(&sa));
    assert_eq!(dag.execution_waves().unwrap(), vec![vec![role]]);
  }

  #[test]
  fn cycle_in_recorded_state_is_rejected() {
    let a = Urn::new(ResourceType::AwsIamRole, "a");
    let b = Urn::new(ResourceType::AwsIamRole, "b");
    let states = [state(&a, &[&b]), state(&b, &[&a])];

    assert!(matches!(
      ExecutionDag::from_states(&states),
      Err(ExecuteError::CycleDetected)
    ));
  }
}
