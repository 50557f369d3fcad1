//! Workflow Data Model
//!
//! Core data structures for a chunk's step graph. A [`Workflow`] is an
//! ordered collection of [`Step`]s forming a DAG: `add_step` only accepts
//! dependencies on steps that are already declared, so the declared order
//! is always a valid topological order and cycles cannot be constructed.
//!
//! Completion is a filesystem fact, not a log entry: each step carries a
//! completion predicate, by convention "every declared output artifact
//! exists and is non-empty". The predicate is injectable so tests can fake
//! filesystem state.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Injectable completion check for a single step.
pub type CompletionPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// A named, idempotent unit of work with an opaque command, declared
/// output artifacts, and a completion predicate.
#[derive(Clone)]
pub struct Step {
    /// Unique step name within its workflow.
    pub name: String,

    /// Opaque shell command; zero exit status means "ran".
    pub command: String,

    /// Names of steps that must complete before this one.
    pub previous: Vec<String>,

    /// Artifacts this step produces; the default completion check.
    pub outputs: Vec<PathBuf>,

    /// Human-readable description shown in status displays.
    pub comment: String,

    /// Precious artifacts survive ordinary clean and fall only to deep clean.
    pub precious: bool,

    predicate: Option<CompletionPredicate>,
}

impl Step {
    /// Creates a step with the given name and command.
    ///
    /// # Example
    ///
    /// ```
    /// use chunkalign::workflow::Step;
    ///
    /// let step = Step::new("align", "bowtie2 -x idx -U reads.fq -S out.sam")
    ///     .with_output("out.sam")
    ///     .with_comment("Align chunk reads to the reference");
    /// ```
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            command: command.into().trim().to_string(),
            previous: Vec::new(),
            outputs: Vec::new(),
            comment: String::new(),
            precious: false,
            predicate: None,
        }
    }

    /// Adds a dependency on a previously declared step.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.previous.push(name.into());
        self
    }

    /// Declares an output artifact.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    /// Sets the human-readable comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Marks this step's artifacts as precious (kept by ordinary clean).
    pub fn precious(mut self) -> Self {
        self.precious = true;
        self
    }

    /// Replaces the default artifact check with an injected predicate.
    pub fn with_predicate(
        mut self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Evaluates the completion predicate against current filesystem state.
    ///
    /// A step with neither predicate nor outputs is never complete, so it
    /// runs on every invocation.
    pub fn is_complete(&self) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(),
            None => self.outputs_exist(),
        }
    }

    /// Checks that every declared output exists and is non-empty.
    fn outputs_exist(&self) -> bool {
        if self.outputs.is_empty() {
            return false;
        }
        self.outputs.iter().all(|path| artifact_present(path))
    }
}

/// The conventional artifact check: present and non-empty.
pub fn artifact_present(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("previous", &self.previous)
            .field("outputs", &self.outputs)
            .field("precious", &self.precious)
            .field("custom_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// An ordered collection of steps forming a DAG, bound to one chunk's (or
/// the postprocess) configuration.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    steps: Vec<Step>,
}

impl Workflow {
    /// Creates an empty workflow.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Builds a workflow from steps in declaration order.
    pub fn from_steps(steps: Vec<Step>) -> Result<Self, String> {
        let mut workflow = Self::new();
        for step in steps {
            workflow.add_step(step)?;
        }
        Ok(workflow)
    }

    /// Appends a step, enforcing topological construction.
    ///
    /// Rejects empty and duplicate names, and any dependency that does not
    /// reference an already declared step. Because every edge points
    /// backwards in declaration order, the step list is always a valid
    /// topological order and a cycle cannot be expressed.
    pub fn add_step(&mut self, step: Step) -> Result<(), String> {
        if step.name.is_empty() {
            return Err("step has an empty name".to_string());
        }
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(format!("step '{}' already declared", step.name));
        }
        for dep in &step.previous {
            if !self.steps.iter().any(|s| &s.name == dep) {
                return Err(format!(
                    "step '{}' depends on undeclared step '{}'",
                    step.name, dep
                ));
            }
        }

        self.steps.push(step);
        Ok(())
    }

    /// Steps in declared (topological) order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Looks up a step by name.
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_step_builder() {
        let step = Step::new("align", "bowtie2 -x idx")
            .with_output("out.sam")
            .with_comment("Align reads");

        assert_eq!(step.name, "align");
        assert_eq!(step.outputs, vec![PathBuf::from("out.sam")]);
        assert_eq!(step.comment, "Align reads");
        assert!(!step.precious);
    }

    #[test]
    fn test_step_names_are_trimmed() {
        let step = Step::new("  align ", " bowtie2 ");
        assert_eq!(step.name, "align");
        assert_eq!(step.command, "bowtie2");
    }

    #[test]
    fn test_step_without_outputs_never_complete() {
        let step = Step::new("noop", "true");
        assert!(!step.is_complete());
    }

    #[test]
    fn test_artifact_check_requires_non_empty() {
        let dir = tempdir().unwrap();
        let full = dir.path().join("full.txt");
        let empty = dir.path().join("empty.txt");
        fs::write(&full, "data").unwrap();
        fs::write(&empty, "").unwrap();

        let complete = Step::new("a", "true").with_output(&full);
        let incomplete = Step::new("b", "true").with_output(&empty);
        let missing = Step::new("c", "true").with_output(dir.path().join("gone.txt"));

        assert!(complete.is_complete());
        assert!(!incomplete.is_complete());
        assert!(!missing.is_complete());
    }

    #[test]
    fn test_all_outputs_must_be_present() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "data").unwrap();

        let step = Step::new("a", "true")
            .with_output(&present)
            .with_output(dir.path().join("absent.txt"));

        assert!(!step.is_complete());
    }

    #[test]
    fn test_injected_predicate_overrides_artifact_check() {
        let step = Step::new("a", "true").with_predicate(|| true);
        assert!(step.is_complete());

        let step = Step::new("b", "true")
            .with_output("/nonexistent/ignored.txt")
            .with_predicate(|| true);
        assert!(step.is_complete());
    }

    #[test]
    fn test_add_step_rejects_duplicate() {
        let mut workflow = Workflow::new();
        workflow.add_step(Step::new("a", "true")).unwrap();

        let result = workflow.add_step(Step::new("a", "false"));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("already declared"));
    }

    #[test]
    fn test_add_step_rejects_undeclared_dependency() {
        let mut workflow = Workflow::new();

        let result = workflow.add_step(Step::new("b", "true").depends_on("a"));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("undeclared"));
    }

    #[test]
    fn test_cycle_cannot_be_constructed() {
        // A cycle needs a forward reference, which add_step refuses, so
        // construction fails before any action could execute.
        let result = Workflow::from_steps(vec![
            Step::new("a", "true").depends_on("b"),
            Step::new("b", "true").depends_on("a"),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_declared_order_is_topological() {
        let workflow = Workflow::from_steps(vec![
            Step::new("a", "true"),
            Step::new("b", "true").depends_on("a"),
            Step::new("c", "true").depends_on("b"),
        ])
        .unwrap();

        let names: Vec<&str> = workflow.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_get_step() {
        let workflow = Workflow::from_steps(vec![Step::new("a", "true")]).unwrap();

        assert!(workflow.get_step("a").is_some());
        assert!(workflow.get_step("z").is_none());
    }

    #[test]
    fn test_empty_workflow() {
        let workflow = Workflow::new();
        assert!(workflow.is_empty());
        assert_eq!(workflow.len(), 0);
    }
}
