//! Runtime workflow representation using a directed graph.
//!
//! Steps are graph nodes; `on_success` and `on_failure` pointers are edges
//! labelled with the [`Branch`] they follow. The first declared step is the
//! entry point. Loops are allowed and bounded at run time.

use std::collections::{HashMap, HashSet};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use tracing::warn;

use crate::{
    AutoflowError, Result, WorkflowModel,
    common::Vars,
    workflow::{
        edge::Branch,
        step::{Step, StepId},
        trigger::Trigger,
    },
};

pub struct Workflow {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub trigger: Trigger,
    /// seed values for every execution
    pub variables: Vars,
    graph: DiGraph<Step, Branch>,
    index: HashMap<StepId, NodeIndex>,
    entry: NodeIndex,
}

impl Workflow {
    /// Human-readable representation of the step graph.
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("=== Workflow {} ({}) ===", self.name, self.id));
        lines.push(format!("Trigger: {}", self.trigger.trigger_type));
        lines.push(format!("Steps: {}, Transitions: {}", self.graph.node_count(), self.graph.edge_count()));
        lines.push(String::new());

        for idx in self.graph.node_indices() {
            let step = &self.graph[idx];
            let actions = step.actions.iter().map(|a| format!("{}:{}", a.id, a.uses)).collect::<Vec<_>>().join(", ");
            lines.push(format!("[{}] {} ({}) [{}]", step.id, step.name, if step.parallel { "parallel" } else { "sequential" }, actions));

            let outgoing: Vec<String> = self.graph.edges_directed(idx, Direction::Outgoing).map(|e| format!("{}({})", self.graph[e.target()].id, e.weight().as_ref())).collect();
            if outgoing.is_empty() {
                lines.push(format!("  {} -> (end)", step.id));
            } else {
                lines.push(format!("  {} -> {}", step.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }

    pub fn entry_step(&self) -> &Step {
        &self.graph[self.entry]
    }

    pub fn step(
        &self,
        id: &str,
    ) -> Option<&Step> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Successor of `id` for the given outcome, if any.
    pub fn next_step(
        &self,
        id: &str,
        branch: Branch,
    ) -> Option<&Step> {
        let idx = self.index.get(id)?;
        self.graph.edges_directed(*idx, Direction::Outgoing).find(|e| *e.weight() == branch).map(|e| &self.graph[e.target()])
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.graph.node_indices().map(|idx| self.graph[idx].id.clone()).collect()
    }

    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

impl TryFrom<&WorkflowModel> for Workflow {
    type Error = AutoflowError;

    fn try_from(model: &WorkflowModel) -> Result<Self> {
        if model.steps.is_empty() {
            return Err(AutoflowError::Workflow(format!("workflow '{}' has no steps", model.name)));
        }
        let trigger = Trigger::try_from(&model.trigger)?;

        let mut graph: DiGraph<Step, Branch> = DiGraph::new();
        let mut index = HashMap::new();
        let mut action_ids = HashSet::new();

        for step_model in model.steps.iter() {
            let step = Step::try_from(step_model)?;
            if index.contains_key(&step.id) {
                return Err(AutoflowError::Workflow(format!("duplicate step id '{}'", step.id)));
            }
            for action in step.actions.iter() {
                if !action_ids.insert(action.id.clone()) {
                    return Err(AutoflowError::Workflow(format!("duplicate action id '{}'", action.id)));
                }
            }
            let sid = step.id.clone();
            let idx = graph.add_node(step);
            index.insert(sid, idx);
        }

        let mut edges = Vec::new();
        for idx in graph.node_indices() {
            let step = &graph[idx];
            for (target, branch) in [(&step.on_success, Branch::Success), (&step.on_failure, Branch::Failure)] {
                if let Some(target) = target {
                    let to = index.get(target).ok_or(AutoflowError::Workflow(format!(
                        "step '{}' points {} to unknown step '{}'",
                        step.id,
                        branch.as_ref(),
                        target
                    )))?;
                    edges.push((idx, *to, branch));
                }
            }
        }
        for (from, to, branch) in edges {
            graph.add_edge(from, to, branch);
        }

        let entry = index[&model.steps[0].id];
        let workflow = Self {
            id: model.id.clone(),
            name: model.name.clone(),
            owner: model.owner.clone(),
            trigger,
            variables: model.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<serde_json::Map<_, _>>().into(),
            graph,
            index,
            entry,
        };
        if workflow.is_cyclic() {
            warn!("workflow '{}' contains a step loop; runs are bounded by max_step_transitions", workflow.name);
        }
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn model(steps: serde_json::Value) -> WorkflowModel {
        serde_json::from_value(json!({
            "id": "wf1",
            "name": "test",
            "trigger": {"type": "user_action"},
            "steps": steps
        }))
        .unwrap()
    }

    fn delay(id: &str) -> serde_json::Value {
        json!({"id": id, "type": "delay", "config": {"milliseconds": 1}})
    }

    #[test]
    fn test_branch_navigation() {
        let wf = Workflow::try_from(&model(json!([
            {"id": "s1", "actions": [delay("a1")], "on_success": "s2", "on_failure": "s3"},
            {"id": "s2", "name": "happy", "actions": [delay("a2")]},
            {"id": "s3", "actions": [delay("a3")]}
        ])))
        .unwrap();

        assert_eq!(wf.entry_step().id, "s1");
        assert_eq!(wf.next_step("s1", Branch::Success).unwrap().id, "s2");
        assert_eq!(wf.next_step("s1", Branch::Failure).unwrap().id, "s3");
        assert!(wf.next_step("s2", Branch::Success).is_none());
        assert_eq!(wf.step("s2").unwrap().name, "happy");
        assert_eq!(wf.step("s3").unwrap().name, "s3");
        assert!(!wf.is_cyclic());
        let schema = wf.schema();
        assert!(schema.contains("s2(success)"));
        assert!(schema.contains("s3(failure)"));
        assert!(schema.contains("s2 -> (end)"));
    }

    #[test]
    fn test_rejects_unknown_pointer() {
        let err = Workflow::try_from(&model(json!([{"id": "s1", "actions": [delay("a1")], "on_success": "nope"}]))).err().unwrap();
        assert!(err.to_string().contains("unknown step 'nope'"));
    }

    #[test]
    fn test_rejects_duplicates() {
        let dup_steps = model(json!([{"id": "s1", "actions": [delay("a1")]}, {"id": "s1", "actions": [delay("a2")]}]));
        assert!(Workflow::try_from(&dup_steps).is_err());

        let dup_actions = model(json!([{"id": "s1", "actions": [delay("a1")]}, {"id": "s2", "actions": [delay("a1")]}]));
        assert!(Workflow::try_from(&dup_actions).err().unwrap().to_string().contains("duplicate action id"));
    }

    #[test]
    fn test_rejects_empty_steps() {
        assert!(Workflow::try_from(&model(json!([]))).is_err());
    }

    #[test]
    fn test_loops_are_allowed() {
        let wf = Workflow::try_from(&model(json!([
            {"id": "poll", "actions": [delay("a1")], "on_failure": "poll"}
        ])))
        .unwrap();
        assert!(wf.is_cyclic());
        assert_eq!(wf.next_step("poll", Branch::Failure).unwrap().id, "poll");
    }

    #[test]
    fn test_variables_seed() {
        let mut m = model(json!([{"id": "s1", "actions": [delay("a1")]}]));
        m.variables.insert("region".to_string(), json!("eu"));
        let wf = Workflow::try_from(&m).unwrap();
        assert_eq!(wf.variables.get::<String>("region"), Some("eu".to_string()));
    }
}
