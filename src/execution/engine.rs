//! Workflow Engine
//!
//! Drives one [`Workflow`] to completion or failure. The engine owns no
//! state record: "done" is recomputed from each step's completion predicate
//! on every invocation, which is what makes crash-and-rerun converge to the
//! same terminal state as an uninterrupted run.
//!
//! Besides `run`, the engine exposes the derived views of the same step
//! graph: per-step state walking for status displays, artifact cleaning,
//! DOT diagram export, and a standalone shell-script export.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::PipelineError;
use crate::execution::action::run_command;
use crate::workflow::{Step, Workflow};

/// Outcome counters for one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Steps whose action was invoked this run.
    pub executed: usize,
    /// Steps skipped because their predicate was already satisfied.
    pub skipped: usize,
}

/// Drives one workflow instance.
#[derive(Debug)]
pub struct Engine {
    workflow: Workflow,
    scope: String,
    dry_run: bool,
    working_dir: Option<PathBuf>,
}

impl Engine {
    /// Creates an engine for a workflow.
    ///
    /// `scope` labels this workflow in logs and errors ("preprocess",
    /// "chunk 3", "postprocess").
    pub fn new(workflow: Workflow, scope: impl Into<String>) -> Self {
        Self {
            workflow,
            scope: scope.into(),
            dry_run: false,
            working_dir: None,
        }
    }

    /// Enables or disables dry-run mode (print commands, execute nothing).
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Sets the working directory for step execution.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = Some(dir.into());
    }

    /// The underlying workflow definition.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// The workflow label used in logs and errors.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Walks steps in declared topological order, running what is not done.
    ///
    /// For each step the completion predicate is evaluated against current
    /// filesystem state: satisfied steps are skipped (idempotent resume),
    /// unless a transitive dependency re-executed earlier in this same run,
    /// in which case the step is considered stale and re-executed too. A
    /// non-zero exit halts this workflow immediately with a step-failure
    /// error; there is no automatic retry. Rerunning the same command later
    /// resumes by re-skipping every step whose predicate is now true.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let mut report = RunReport {
            executed: 0,
            skipped: 0,
        };
        let mut reran: HashSet<&str> = HashSet::new();

        for step in self.workflow.steps() {
            let stale_dep = step.previous.iter().any(|d| reran.contains(d.as_str()));

            if step.is_complete() && !stale_dep {
                debug!("[{}] step '{}' already complete", self.scope, step.name);
                report.skipped += 1;
                continue;
            }

            if stale_dep {
                info!(
                    "[{}] step '{}' stale (dependency re-executed), running",
                    self.scope, step.name
                );
            } else {
                info!("[{}] running step '{}'", self.scope, step.name);
            }

            if self.dry_run {
                println!("[DRY RUN] [{}] {}: {}", self.scope, step.name, step.command);
            } else {
                run_command(
                    &self.scope,
                    &step.name,
                    &step.command,
                    self.working_dir.as_deref(),
                )
                .map_err(|message| {
                    PipelineError::step_failure(&step.name, &self.scope, message)
                })?;

                if !step.is_complete() {
                    warn!(
                        "[{}] step '{}' ran but its completion check is still \
                         unsatisfied",
                        self.scope, step.name
                    );
                }
            }

            reran.insert(step.name.as_str());
            report.executed += 1;
        }

        info!(
            "[{}] workflow done: {} executed, {} skipped",
            self.scope, report.executed, report.skipped
        );
        Ok(report)
    }

    /// Invokes `callback(step, completed)` for every step in declared order.
    ///
    /// Used for status display and for cross-chunk aggregation.
    pub fn walk_states(&self, mut callback: impl FnMut(&Step, bool)) {
        for step in self.workflow.steps() {
            callback(step, step.is_complete());
        }
    }

    /// True when every step's completion predicate is satisfied.
    pub fn is_complete(&self) -> bool {
        self.workflow.steps().iter().all(|s| s.is_complete())
    }

    /// Deletes artifacts produced by steps; returns how many were removed.
    ///
    /// Ordinary clean skips precious artifacts; `deep` removes those too.
    pub fn clean(&self, deep: bool) -> usize {
        let mut removed = 0;

        for step in self.workflow.steps() {
            if step.precious && !deep {
                debug!("[{}] keeping precious artifacts of '{}'", self.scope, step.name);
                continue;
            }
            for output in &step.outputs {
                removed += remove_artifact(output);
            }
        }

        info!("[{}] clean removed {} artifacts", self.scope, removed);
        removed
    }

    /// Emits the step DAG in DOT form: nodes are step names, directed edges
    /// point from dependency to dependent.
    pub fn diagram(&self) -> String {
        let mut out = String::from("digraph workflow {\n");
        out.push_str("    rankdir=LR;\n");

        for step in self.workflow.steps() {
            out.push_str(&format!("    \"{}\";\n", step.name));
        }
        for step in self.workflow.steps() {
            for dep in &step.previous {
                out.push_str(&format!("    \"{}\" -> \"{}\";\n", dep, step.name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Emits the step commands, in topological order, as a standalone
    /// command sequence runnable without the engine.
    pub fn shell_script(&self) -> String {
        let mut out = String::from("#!/bin/bash\nset -e\n");

        for step in self.workflow.steps() {
            out.push('\n');
            if !step.comment.is_empty() {
                out.push_str(&format!("# {}\n", step.comment));
            }
            out.push_str(&step.command);
            out.push('\n');
        }

        out
    }
}

/// Removes one artifact (file or directory); returns 1 if something went.
fn remove_artifact(path: &Path) -> usize {
    if !path.exists() {
        return 0;
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => {
            debug!("Removed {}", path.display());
            1
        }
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            0
        }
    }
}
