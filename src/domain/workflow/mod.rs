//! Workflow module - multi-step plans over the domain handlers.

mod planner;

pub use planner::{WorkflowPlan, WorkflowPlanner, WorkflowStep};
