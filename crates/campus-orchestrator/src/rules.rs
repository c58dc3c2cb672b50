use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use campus_core::{CampusError, CampusResult, TaskType};

/// Mapping from task type to the precedent task types it requires.
///
/// Loaded from configuration at startup; the defaults mirror the helpdesk's
/// standing rules but deployments may extend them. [`DependencyRules::
/// validate`] rejects self-references and cycles before the table is ever
/// consulted, so the resolver can trust it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyRules {
    rules: BTreeMap<TaskType, Vec<TaskType>>,
}

impl Default for DependencyRules {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            TaskType::CheckCourseRegistration,
            vec![TaskType::CheckFeeStatus, TaskType::CheckAcademicStatus],
        );
        rules.insert(TaskType::CheckPaymentStatus, vec![TaskType::CheckFeeStatus]);
        rules.insert(
            TaskType::CheckScholarship,
            vec![TaskType::CheckAcademicStatus],
        );
        Self { rules }
    }
}

impl DependencyRules {
    /// Builds a rule table from an explicit mapping, validating it.
    pub fn from_rules(rules: BTreeMap<TaskType, Vec<TaskType>>) -> CampusResult<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    /// Precedent task types required before `task_type` may run.
    pub fn precedents(&self, task_type: TaskType) -> &[TaskType] {
        self.rules.get(&task_type).map_or(&[], Vec::as_slice)
    }

    /// Rejects self-references and cycles within the rule table itself.
    pub fn validate(&self) -> CampusResult<()> {
        for (task_type, precedents) in &self.rules {
            if precedents.contains(task_type) {
                return Err(CampusError::Config(format!(
                    "dependency rule for {task_type} references itself"
                )));
            }
        }

        // Colours: 0 unvisited, 1 on the current path, 2 done.
        let mut colour: BTreeMap<TaskType, u8> = BTreeMap::new();
        for &task_type in self.rules.keys() {
            if self.dfs_cycle(task_type, &mut colour) {
                return Err(CampusError::Config(format!(
                    "dependency rules contain a cycle through {task_type}"
                )));
            }
        }
        Ok(())
    }

    fn dfs_cycle(&self, task_type: TaskType, colour: &mut BTreeMap<TaskType, u8>) -> bool {
        match colour.get(&task_type) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        colour.insert(task_type, 1);
        for &dep in self.precedents(task_type) {
            if self.dfs_cycle(dep, colour) {
                return true;
            }
        }
        colour.insert(task_type, 2);
        false
    }
}
