use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use campus_core::{CampusError, CampusResult, Task, TaskType};

use crate::rules::DependencyRules;

/// The resolver's output: the full task set (decomposition order, injected
/// precedents appended) and the execution waves over task types.
#[derive(Debug)]
pub struct ExecutionPlan {
    /// All tasks for the request, including injected precedents.
    pub tasks: Vec<Task>,
    /// Topological levels. Wave `k + 1` may only start once every task in
    /// wave `k` is terminal.
    pub waves: Vec<Vec<TaskType>>,
}

impl ExecutionPlan {
    /// Task types that directly depend on `task_type`.
    pub fn dependents_of(&self, task_type: TaskType) -> Vec<TaskType> {
        self.tasks
            .iter()
            .filter(|t| t.dependencies.contains(&task_type))
            .map(|t| t.task_type)
            .collect()
    }
}

/// Builds a dependency graph over a request's tasks and orders it into
/// execution waves.
///
/// Sibling tasks of the same type within one context are one graph node, so
/// the graph is keyed by [`TaskType`].
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    rules: DependencyRules,
}

impl DependencyResolver {
    /// Creates a resolver over a validated rule table.
    pub fn new(rules: DependencyRules) -> Self {
        Self { rules }
    }

    /// The rule table in use.
    pub fn rules(&self) -> &DependencyRules {
        &self.rules
    }

    /// Resolves a set of freshly decomposed tasks into an execution plan.
    ///
    /// Injects missing precedents from the rule table, merges rule-derived
    /// dependencies into each task's declared set, rejects cyclic graphs
    /// with [`CampusError::DependencyCycle`] before anything is dispatched,
    /// and computes the waves.
    pub fn resolve(&self, mut tasks: Vec<Task>) -> CampusResult<ExecutionPlan> {
        self.inject_missing_precedents(&mut tasks);

        for task in &mut tasks {
            for &precedent in self.rules.precedents(task.task_type) {
                if !task.dependencies.contains(&precedent) {
                    task.dependencies.push(precedent);
                }
            }
        }

        let graph = build_graph(&tasks);
        detect_cycle(&graph)?;
        let waves = compute_waves(&graph);

        info!(
            tasks = tasks.len(),
            waves = waves.len(),
            "dependency resolution complete"
        );
        Ok(ExecutionPlan { tasks, waves })
    }

    /// Synthesizes a task for every rule-required precedent type not already
    /// present among the siblings. Injected tasks inherit the dependent's
    /// context and data payload (so e.g. a student id travels with them).
    fn inject_missing_precedents(&self, tasks: &mut Vec<Task>) {
        let mut present: BTreeSet<TaskType> = tasks.iter().map(|t| t.task_type).collect();
        let mut queue: Vec<usize> = (0..tasks.len()).collect();

        while let Some(idx) = queue.pop() {
            let (dependent_type, from_agent, context_id, data) = {
                let t = &tasks[idx];
                (t.task_type, t.from_agent.clone(), t.context_id, t.request_data())
            };

            for &precedent in self.rules.precedents(dependent_type) {
                if present.insert(precedent) {
                    debug!(%precedent, dependent = %dependent_type, "injecting precedent task");
                    let mut injected = Task::new(
                        from_agent.clone(),
                        precedent.department().router_agent_id(),
                        precedent,
                        format!("Automatic {precedent} check required by {dependent_type}"),
                        context_id,
                    );
                    if !data.is_null() {
                        injected = injected.with_data(data.clone());
                    }
                    tasks.push(injected);
                    // Injected precedents may require precedents of their own.
                    queue.push(tasks.len() - 1);
                }
            }
        }
    }
}

type Graph = BTreeMap<TaskType, BTreeSet<TaskType>>;

/// Adjacency: node → the precedents it waits on. Dependencies on types with
/// no task in this context are ignored (nothing to wait for).
fn build_graph(tasks: &[Task]) -> Graph {
    let present: BTreeSet<TaskType> = tasks.iter().map(|t| t.task_type).collect();
    let mut graph: Graph = present.iter().map(|&t| (t, BTreeSet::new())).collect();
    for task in tasks {
        for &dep in &task.dependencies {
            if present.contains(&dep) && dep != task.task_type {
                if let Some(edges) = graph.get_mut(&task.task_type) {
                    edges.insert(dep);
                }
            }
        }
    }
    graph
}

fn detect_cycle(graph: &Graph) -> CampusResult<()> {
    let mut colour: BTreeMap<TaskType, u8> = BTreeMap::new();
    for &node in graph.keys() {
        if dfs(node, graph, &mut colour) {
            return Err(CampusError::DependencyCycle(format!(
                "dependency cycle involving {node}"
            )));
        }
    }
    Ok(())
}

fn dfs(node: TaskType, graph: &Graph, colour: &mut BTreeMap<TaskType, u8>) -> bool {
    match colour.get(&node) {
        Some(1) => return true,
        Some(2) => return false,
        _ => {}
    }
    colour.insert(node, 1);
    if let Some(deps) = graph.get(&node) {
        for &dep in deps {
            if dfs(dep, graph, colour) {
                return true;
            }
        }
    }
    colour.insert(node, 2);
    false
}

/// Kahn's levels: wave 0 is every node with no precedents; wave k + 1 holds
/// nodes whose precedents all sit in waves <= k.
fn compute_waves(graph: &Graph) -> Vec<Vec<TaskType>> {
    let mut placed: BTreeSet<TaskType> = BTreeSet::new();
    let mut waves = Vec::new();

    while placed.len() < graph.len() {
        let wave: Vec<TaskType> = graph
            .iter()
            .filter(|(node, deps)| {
                !placed.contains(*node) && deps.iter().all(|d| placed.contains(d))
            })
            .map(|(&node, _)| node)
            .collect();
        // A cycle would make this empty; detect_cycle runs first.
        if wave.is_empty() {
            break;
        }
        placed.extend(wave.iter().copied());
        waves.push(wave);
    }
    waves
}
