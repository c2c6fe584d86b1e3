//! Workflow planner - decomposes an intent into a dependency graph of
//! steps.
//!
//! A step is executable iff all of its dependencies are in the completed
//! set. Two steps may run in parallel iff neither depends (transitively)
//! on the other and they target different domains.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AssistantDomain, StepId};
use crate::domain::intent::Intent;

/// One unit of work assigned to a domain handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique step id within the plan.
    pub id: StepId,
    /// Domain handler that executes the step.
    pub domain: AssistantDomain,
    /// Action the handler should take (an intent category).
    pub action: String,
    /// Steps that must complete before this one starts.
    pub depends_on: Vec<StepId>,
}

impl WorkflowStep {
    /// Creates an independent step.
    pub fn new(domain: AssistantDomain, action: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            domain,
            action: action.into(),
            depends_on: Vec::new(),
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, step: &WorkflowStep) -> Self {
        self.depends_on.push(step.id);
        self
    }
}

/// A dependency graph of workflow steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPlan {
    steps: Vec<WorkflowStep>,
}

impl WorkflowPlan {
    /// Creates a plan from steps.
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Looks up a step by id.
    pub fn step(&self, id: StepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Every step whose dependencies are all completed and which is not
    /// itself completed.
    pub fn executable_steps(&self, completed: &HashSet<StepId>) -> Vec<&WorkflowStep> {
        self.steps
            .iter()
            .filter(|step| !completed.contains(&step.id))
            .filter(|step| step.depends_on.iter().all(|dep| completed.contains(dep)))
            .collect()
    }

    /// True once every step is completed.
    pub fn is_complete(&self, completed: &HashSet<StepId>) -> bool {
        self.steps.iter().all(|step| completed.contains(&step.id))
    }

    /// True iff neither step depends (transitively) on the other and they
    /// target different domains.
    pub fn can_run_parallel(&self, a: StepId, b: StepId) -> bool {
        let (Some(step_a), Some(step_b)) = (self.step(a), self.step(b)) else {
            return false;
        };
        if step_a.domain == step_b.domain {
            return false;
        }
        !self.depends_transitively(a, b) && !self.depends_transitively(b, a)
    }

    fn depends_transitively(&self, from: StepId, on: StepId) -> bool {
        let mut stack: Vec<StepId> = self
            .step(from)
            .map(|s| s.depends_on.clone())
            .unwrap_or_default();
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == on {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(step) = self.step(current) {
                stack.extend(step.depends_on.iter().copied());
            }
        }
        false
    }
}

/// Builds plans from classified intents.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowPlanner;

impl WorkflowPlanner {
    /// Creates a planner.
    pub fn new() -> Self {
        Self
    }

    /// Decomposes an intent into a plan.
    ///
    /// Most intents map to a single step in their target domain. A few
    /// categories fan out across domains: a VAT declaration needs the
    /// books reconciled first, and report categories read from a
    /// reconciled ledger.
    pub fn plan(&self, intent: &Intent) -> WorkflowPlan {
        match intent.category.as_str() {
            "vat_declaration" => {
                let reconcile = WorkflowStep::new(AssistantDomain::Bookkeeping, "reconcile");
                let declare =
                    WorkflowStep::new(AssistantDomain::Tax, "vat_declaration").depends_on(&reconcile);
                WorkflowPlan::new(vec![reconcile, declare])
            }
            "income_statement" | "balance_sheet" | "key_figures" => {
                let reconcile = WorkflowStep::new(AssistantDomain::Bookkeeping, "reconcile");
                let report = WorkflowStep::new(intent.target_domain, intent.category.clone())
                    .depends_on(&reconcile);
                WorkflowPlan::new(vec![reconcile, report])
            }
            _ => WorkflowPlan::new(vec![WorkflowStep::new(
                intent.target_domain,
                intent.category.clone(),
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_step_plan() -> (WorkflowPlan, StepId, StepId, StepId) {
        let a = WorkflowStep::new(AssistantDomain::Invoicing, "list_unpaid");
        let b = WorkflowStep::new(AssistantDomain::Bookkeeping, "reconcile");
        let c = WorkflowStep::new(AssistantDomain::Reporting, "key_figures")
            .depends_on(&a)
            .depends_on(&b);
        let (ida, idb, idc) = (a.id, b.id, c.id);
        (WorkflowPlan::new(vec![a, b, c]), ida, idb, idc)
    }

    #[test]
    fn executable_steps_before_any_completion() {
        let (plan, a, b, c) = three_step_plan();
        let completed = HashSet::new();

        let executable: Vec<StepId> = plan
            .executable_steps(&completed)
            .iter()
            .map(|s| s.id)
            .collect();

        assert!(executable.contains(&a));
        assert!(executable.contains(&b));
        assert!(!executable.contains(&c));
    }

    #[test]
    fn dependent_step_becomes_executable_after_all_deps() {
        let (plan, a, b, c) = three_step_plan();

        let mut completed = HashSet::from([a]);
        assert!(plan
            .executable_steps(&completed)
            .iter()
            .all(|s| s.id != c));

        completed.insert(b);
        let executable: Vec<StepId> = plan
            .executable_steps(&completed)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(executable, vec![c]);
    }

    #[test]
    fn completed_steps_are_never_executable() {
        let (plan, a, b, c) = three_step_plan();
        let completed = HashSet::from([a, b, c]);

        assert!(plan.executable_steps(&completed).is_empty());
        assert!(plan.is_complete(&completed));
    }

    #[test]
    fn independent_cross_domain_steps_can_run_parallel() {
        let (plan, a, b, c) = three_step_plan();

        assert!(plan.can_run_parallel(a, b));
        assert!(!plan.can_run_parallel(a, c));
        assert!(!plan.can_run_parallel(c, b));
    }

    #[test]
    fn transitive_dependency_blocks_parallelism() {
        let a = WorkflowStep::new(AssistantDomain::Invoicing, "list_unpaid");
        let b = WorkflowStep::new(AssistantDomain::Bookkeeping, "reconcile").depends_on(&a);
        let c = WorkflowStep::new(AssistantDomain::Reporting, "key_figures").depends_on(&b);
        let (ida, idc) = (a.id, c.id);
        let plan = WorkflowPlan::new(vec![a, b, c]);

        assert!(!plan.can_run_parallel(ida, idc));
        assert!(!plan.can_run_parallel(idc, ida));
    }

    #[test]
    fn same_domain_steps_never_run_parallel() {
        let a = WorkflowStep::new(AssistantDomain::Invoicing, "list_unpaid");
        let b = WorkflowStep::new(AssistantDomain::Invoicing, "send_reminder");
        let (ida, idb) = (a.id, b.id);
        let plan = WorkflowPlan::new(vec![a, b]);

        assert!(!plan.can_run_parallel(ida, idb));
    }

    #[test]
    fn single_domain_intent_plans_one_step() {
        let intent = Intent::new("send_reminder", AssistantDomain::Invoicing, 0.95);
        let plan = WorkflowPlanner::new().plan(&intent);

        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].domain, AssistantDomain::Invoicing);
        assert!(plan.steps()[0].depends_on.is_empty());
    }

    #[test]
    fn vat_declaration_plans_reconcile_then_declare() {
        let intent = Intent::new("vat_declaration", AssistantDomain::Tax, 0.95);
        let plan = WorkflowPlanner::new().plan(&intent);

        assert_eq!(plan.steps().len(), 2);
        let reconcile = &plan.steps()[0];
        let declare = &plan.steps()[1];
        assert_eq!(reconcile.domain, AssistantDomain::Bookkeeping);
        assert_eq!(declare.domain, AssistantDomain::Tax);
        assert_eq!(declare.depends_on, vec![reconcile.id]);
    }

    #[test]
    fn report_intents_depend_on_reconciliation() {
        let intent = Intent::new("income_statement", AssistantDomain::Reporting, 0.95);
        let plan = WorkflowPlanner::new().plan(&intent);

        assert_eq!(plan.steps().len(), 2);
        assert_eq!(plan.steps()[1].depends_on.len(), 1);
    }
}
