//! Provisioning driver.
//!
//! This module walks a declared resource graph and brings a stack in line
//! with it. It handles:
//! - DAG-based dependency ordering
//! - Parallel provider calls within a wave
//! - Resolving each resource's deferred outputs once its call returns
//! - Deleting resources no longer declared, dependents first
//! - Recording the outcome as a new snapshot
//!
//! A failed resource stops the run after its wave. Nothing is rolled back.

pub mod dag;
mod plan;
pub mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::StackConfig;
use crate::deferred::DeferredError;
use crate::graph::OutputCompleters;
use crate::program::Program;
use crate::provider::{ExistingResource, Outputs, Provider, ProviderError, ResourceRequest};
use crate::resource::{ResourceType, Urn};
use crate::snapshot::{ResourceState, Snapshot, SnapshotStore, compute_diff, generate_snapshot_id};
use crate::util::hash::ObjectHash;

use plan::plan_node;

pub use dag::ExecutionDag;
pub use types::{ApplyOptions, ApplyResult, ExecuteError, NodeFailure, Operation, ResourceChange};

/// Result of one provider task.
struct ProvisionOutcome {
  urn: Urn,
  result: Result<Outputs, ProviderError>,
  /// Whether the recorded resource was deleted (replace only).
  previous_deleted: bool,
}

/// A resource due for provisioning in the current wave.
struct PendingNode {
  operation: Operation,
  inputs: Option<serde_json::Value>,
  hash: Option<ObjectHash>,
}

/// Apply `program` to `stack`.
///
/// Runs the declaration pass, provisions every resource wave by wave, deletes
/// resources no longer declared and records a new snapshot. With
/// `options.dry_run` no provider call is made and nothing is saved.
///
/// A declaration error, an unreadable snapshot or a dependency cycle is
/// returned as `Err`. A failed resource is reported in
/// [`ApplyResult::failure`] after the resources created so far are recorded.
pub async fn apply<P: Provider>(
  program: &Program,
  stack: &str,
  config: StackConfig,
  provider: Arc<P>,
  store: &SnapshotStore,
  options: &ApplyOptions,
) -> Result<ApplyResult, ExecuteError> {
  info!(program = program.name, stack = %stack, dry_run = options.dry_run, "starting apply");

  let mut declared = program.run(stack, config)?;
  let previous = store.load_current()?;

  let dag = ExecutionDag::from_graph(declared.graph())?;
  let waves = dag.execution_waves()?;
  info!(wave_count = waves.len(), resources = dag.len(), "computed execution waves");

  let mut completers = declared.graph_mut().take_completers();
  let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));

  let mut states: BTreeMap<Urn, ResourceState> = previous.as_ref().map(|s| s.resources.clone()).unwrap_or_default();
  let mut changes: HashMap<Urn, ResourceChange> = HashMap::new();
  let mut failure: Option<NodeFailure> = None;

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, resources = wave.len(), "executing wave");

    let mut join_set = JoinSet::new();
    let mut pending: HashMap<Urn, PendingNode> = HashMap::new();
    let mut settled: Vec<(Urn, Result<Outputs, ExecuteError>)> = Vec::new();

    for urn in wave {
      let Some(intent) = declared.graph().intent(urn) else {
        continue;
      };
      let recorded = previous.as_ref().and_then(|s| s.resources.get(urn));

      let node = match plan_node(intent, recorded) {
        Ok(node) => node,
        Err(e) => {
          let preview = intent.properties.preview();
          changes.insert(urn.clone(), change(urn.clone(), intent.rtype, Operation::Create, preview));
          settled.push((urn.clone(), Err(e)));
          continue;
        }
      };
      debug!(urn = %urn, operation = %node.operation, "planned resource");
      changes.insert(urn.clone(), change(urn.clone(), intent.rtype, node.operation, node.preview));

      if let (Operation::Same, Some(recorded)) = (node.operation, recorded) {
        settled.push((urn.clone(), Ok(recorded.outputs.clone())));
        continue;
      }
      if options.dry_run {
        continue;
      }

      let Some(inputs) = node.inputs.clone() else {
        settled.push((urn.clone(), Err(ExecuteError::UnresolvedInput { urn: urn.clone() })));
        continue;
      };

      let request = ResourceRequest {
        urn: urn.clone(),
        rtype: intent.rtype,
        name: intent.name.clone(),
        inputs,
      };
      let existing = recorded.map(existing_resource);
      spawn_provision(&mut join_set, &provider, &semaphore, node.operation, request, existing);

      pending.insert(
        urn.clone(),
        PendingNode {
          operation: node.operation,
          inputs: node.inputs,
          hash: node.hash,
        },
      );
    }

    let mut outcomes: HashMap<Urn, ProvisionOutcome> = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(outcome) => {
          outcomes.insert(outcome.urn.clone(), outcome);
        }
        Err(e) => error!(error = %e, "provisioning task panicked"),
      }
    }

    // Resolve deferred outputs on this task, in declaration order
    for urn in wave {
      if let Some(position) = settled.iter().position(|(u, _)| u == urn) {
        let (urn, result) = settled.swap_remove(position);
        let completer = completers.remove(&urn);
        match result {
          Ok(outputs) => {
            if let Some(change) = changes.get_mut(&urn) {
              change.outputs = Some(outputs.clone());
            }
            if let Some(completer) = completer {
              completer.resolve(&outputs);
            }
          }
          Err(e) => {
            error!(urn = %urn, error = %e, "resource failed");
            fail_outputs(completer, &urn, &e);
            failure.get_or_insert(NodeFailure { urn: Some(urn), error: e });
          }
        }
        continue;
      }

      let Some(node) = pending.remove(urn) else {
        continue;
      };
      let completer = completers.remove(urn);
      let Some(outcome) = outcomes.remove(urn) else {
        let e = ExecuteError::Task {
          urn: urn.clone(),
          message: "task did not complete".to_string(),
        };
        error!(urn = %urn, error = %e, "resource failed");
        fail_outputs(completer, urn, &e);
        failure.get_or_insert(NodeFailure {
          urn: Some(urn.clone()),
          error: e,
        });
        continue;
      };

      match outcome.result {
        Ok(outputs) => {
          info!(urn = %urn, operation = %node.operation, "resource provisioned");
          let missing = completer.map(|c| c.resolve(&outputs)).unwrap_or_default();
          if let Some(change) = changes.get_mut(urn) {
            change.outputs = Some(outputs.clone());
          }
          if let Some(intent) = declared.graph().intent(urn)
            && let (Some(inputs), Some(hash)) = (node.inputs, node.hash)
          {
            states.insert(
              urn.clone(),
              ResourceState {
                urn: urn.clone(),
                rtype: intent.rtype,
                name: intent.name.clone(),
                inputs,
                inputs_hash: hash,
                outputs,
                dependencies: intent.dependencies(),
              },
            );
          }
          if !missing.is_empty() {
            let e = ExecuteError::MissingOutput {
              urn: urn.clone(),
              attrs: missing,
            };
            error!(urn = %urn, error = %e, "resource failed");
            failure.get_or_insert(NodeFailure {
              urn: Some(urn.clone()),
              error: e,
            });
          }
        }
        Err(e) => {
          error!(urn = %urn, operation = %node.operation, error = %e, "resource failed");
          if outcome.previous_deleted || node.operation == Operation::Create {
            states.remove(urn);
          }
          let e = ExecuteError::Provisioning(e);
          fail_outputs(completer, urn, &e);
          failure.get_or_insert(NodeFailure {
            urn: Some(urn.clone()),
            error: e,
          });
        }
      }
    }

    if failure.is_some() {
      warn!(wave = wave_idx, "stopping after failed wave");
      break;
    }
  }

  let declared_urns: Vec<Urn> = declared.graph().intents().iter().map(|i| i.urn.clone()).collect();
  let mut ordered: Vec<ResourceChange> = declared_urns.iter().filter_map(|urn| changes.remove(urn)).collect();

  // Resources no longer declared go only after every declared one succeeded
  if failure.is_none() {
    let diff = compute_diff(&declared_urns, previous.as_ref());
    if !diff.removed.is_empty() {
      let removed: BTreeSet<&Urn> = diff.removed.iter().collect();
      let doomed: Vec<ResourceState> = states.values().filter(|s| removed.contains(&s.urn)).cloned().collect();
      let (deleted, delete_failure) =
        delete_resources(&provider, &semaphore, &doomed, &mut states, options.dry_run).await?;
      ordered.extend(deleted);
      failure = delete_failure;
    }
  }

  let exports = if failure.is_some() && !options.dry_run {
    previous.as_ref().map(|s| s.exports.clone()).unwrap_or_default()
  } else {
    match declared.exports().resolve() {
      Ok(exports) => exports,
      Err(e) => {
        error!(error = %e, "export failed");
        failure.get_or_insert(NodeFailure {
          urn: None,
          error: ExecuteError::Export(e),
        });
        previous.as_ref().map(|s| s.exports.clone()).unwrap_or_default()
      }
    }
  };

  let snapshot = if options.dry_run {
    None
  } else {
    let mut snapshot = Snapshot::new(generate_snapshot_id(), stack, Some(program.name.to_string()));
    snapshot.resources = states;
    snapshot.exports = exports.clone();
    store.save_and_set_current(&snapshot)?;
    Some(snapshot)
  };

  let result = ApplyResult {
    stack: stack.to_string(),
    program: Some(program.name.to_string()),
    dry_run: options.dry_run,
    changes: ordered,
    exports,
    snapshot,
    failure,
  };

  info!(
    changes = result.changes.iter().filter(|c| c.operation.is_change()).count(),
    failed = !result.is_success(),
    "apply complete"
  );

  Ok(result)
}

/// Delete every resource recorded for the stack.
///
/// Dependents go before their dependencies. A failure stops the run after
/// its wave; resources not deleted stay in the saved snapshot.
pub async fn destroy<P: Provider>(
  stack: &str,
  provider: Arc<P>,
  store: &SnapshotStore,
  options: &ApplyOptions,
) -> Result<ApplyResult, ExecuteError> {
  info!(stack = %stack, dry_run = options.dry_run, "starting destroy");

  let previous = store.load_current()?;
  let program = previous.as_ref().and_then(|s| s.program.clone());
  let mut result = ApplyResult {
    stack: stack.to_string(),
    program: program.clone(),
    dry_run: options.dry_run,
    changes: Vec::new(),
    exports: BTreeMap::new(),
    snapshot: None,
    failure: None,
  };

  let Some(previous) = previous.filter(|s| !s.resources.is_empty()) else {
    info!(stack = %stack, "nothing to destroy");
    return Ok(result);
  };

  let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
  let mut states = previous.resources.clone();
  let doomed: Vec<ResourceState> = previous.resources.values().cloned().collect();

  let (deleted, failure) = delete_resources(&provider, &semaphore, &doomed, &mut states, options.dry_run).await?;
  result.changes = deleted;
  result.failure = failure;

  if !options.dry_run {
    let mut snapshot = Snapshot::new(generate_snapshot_id(), stack, program);
    if !result.is_success() {
      snapshot.exports = previous.exports.clone();
    }
    snapshot.resources = states;
    store.save_and_set_current(&snapshot)?;
    result.snapshot = Some(snapshot);
  }

  info!(deleted = result.changes.len(), failed = !result.is_success(), "destroy complete");

  Ok(result)
}

fn change(urn: Urn, rtype: ResourceType, operation: Operation, inputs: serde_json::Value) -> ResourceChange {
  ResourceChange {
    urn,
    rtype,
    operation,
    inputs,
    outputs: None,
  }
}

fn existing_resource(state: &ResourceState) -> ExistingResource {
  ExistingResource {
    urn: state.urn.clone(),
    rtype: state.rtype,
    outputs: state.outputs.clone(),
  }
}

fn fail_outputs(completer: Option<OutputCompleters>, urn: &Urn, error: &ExecuteError) {
  let Some(completer) = completer else {
    return;
  };
  let error = match error {
    ExecuteError::Input { source, .. } => source.clone(),
    other => DeferredError::Provisioning {
      urn: urn.clone(),
      message: other.to_string(),
    },
  };
  completer.fail(error);
}

fn spawn_provision<P: Provider>(
  join_set: &mut JoinSet<ProvisionOutcome>,
  provider: &Arc<P>,
  semaphore: &Arc<Semaphore>,
  operation: Operation,
  request: ResourceRequest,
  existing: Option<ExistingResource>,
) {
  let provider = Arc::clone(provider);
  let semaphore = Arc::clone(semaphore);

  join_set.spawn(async move {
    let urn = request.urn.clone();
    let _permit = match semaphore.acquire_owned().await {
      Ok(permit) => permit,
      Err(e) => {
        return ProvisionOutcome {
          result: Err(ProviderError::Failed {
            urn: urn.clone(),
            message: e.to_string(),
          }),
          urn,
          previous_deleted: false,
        };
      }
    };

    let mut previous_deleted = false;
    let result = match (operation, existing) {
      (Operation::Update, Some(existing)) => provider.update(request, existing).await,
      (Operation::Replace, Some(existing)) => match provider.delete(existing).await {
        Ok(()) => {
          previous_deleted = true;
          provider.create(request).await
        }
        Err(e) => Err(e),
      },
      _ => provider.create(request).await,
    };

    ProvisionOutcome {
      urn,
      result,
      previous_deleted,
    }
  });
}

/// Delete `doomed` in reverse dependency order, removing each from `states`.
async fn delete_resources<P: Provider>(
  provider: &Arc<P>,
  semaphore: &Arc<Semaphore>,
  doomed: &[ResourceState],
  states: &mut BTreeMap<Urn, ResourceState>,
  dry_run: bool,
) -> Result<(Vec<ResourceChange>, Option<NodeFailure>), ExecuteError> {
  let dag = ExecutionDag::from_states(doomed)?;
  let by_urn: HashMap<&Urn, &ResourceState> = doomed.iter().map(|s| (&s.urn, s)).collect();

  let mut changes = Vec::new();
  let mut failure = None;

  for (wave_idx, wave) in dag.deletion_waves()?.into_iter().enumerate() {
    debug!(wave = wave_idx, resources = wave.len(), "executing delete wave");

    let mut join_set = JoinSet::new();
    for urn in &wave {
      let Some(state) = by_urn.get(urn) else {
        continue;
      };
      changes.push(change(urn.clone(), state.rtype, Operation::Delete, state.inputs.clone()));
      if dry_run {
        continue;
      }

      let provider = Arc::clone(provider);
      let semaphore = Arc::clone(semaphore);
      let existing = existing_resource(state);
      join_set.spawn(async move {
        let urn = existing.urn.clone();
        let result = match semaphore.acquire_owned().await {
          Ok(_permit) => provider.delete(existing).await,
          Err(e) => Err(ProviderError::Failed {
            urn: urn.clone(),
            message: e.to_string(),
          }),
        };
        (urn, result)
      });
    }

    let mut deleted: BTreeSet<Urn> = BTreeSet::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((urn, Ok(()))) => {
          info!(urn = %urn, "resource deleted");
          deleted.insert(urn);
        }
        Ok((urn, Err(e))) => {
          error!(urn = %urn, error = %e, "delete failed");
          failure.get_or_insert(NodeFailure {
            urn: Some(urn),
            error: ExecuteError::Provisioning(e),
          });
        }
        Err(e) => error!(error = %e, "delete task panicked"),
      }
    }

    if !dry_run {
      for urn in &wave {
        if deleted.contains(urn) {
          states.remove(urn);
        } else if failure.is_none() {
          failure = Some(NodeFailure {
            urn: Some(urn.clone()),
            error: ExecuteError::Task {
              urn: urn.clone(),
              message: "task did not complete".to_string(),
            },
          });
        }
      }
    }

    if failure.is_some() {
      warn!(wave = wave_idx, "stopping after failed delete wave");
      break;
    }
  }

  Ok((changes, failure))
}
