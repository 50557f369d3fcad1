//! Job Status Rendering
//!
//! Renders progress purely from `walk_states` across the job's workflows;
//! holds no state of its own. For the process phase every step name gets
//! one row aggregating a completion mark per chunk; preprocess and
//! postprocess are flat ordered lists.

use colored::Colorize;

use crate::execution::Engine;
use crate::job::Job;

/// Renders job progress from workflow state walks.
pub struct StatusReporter<'a> {
    job: &'a Job,
}

impl<'a> StatusReporter<'a> {
    pub fn new(job: &'a Job) -> Self {
        Self { job }
    }

    /// Renders the full status display.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "Job: {} ({} chunks)\n",
            self.job.config.output_dir.display(),
            self.job.chunk_count()
        ));

        out.push_str("\nPreprocess:\n");
        out.push_str(&render_flat(&self.job.preprocess));

        out.push_str("\nProcess:\n");
        out.push_str(&self.render_process());

        out.push_str("\nPostprocess:\n");
        out.push_str(&render_flat(&self.job.postprocess));

        out
    }

    /// One row per step name: a mark per chunk, the done count, and the
    /// step's comment, in declared step order.
    fn render_process(&self) -> String {
        // Every chunk workflow has the same shape; chunk 0 provides the
        // step order and comments, each chunk contributes its own states.
        let Some(first) = self.job.chunks.first() else {
            return "  (no chunks)\n".to_string();
        };

        let mut states: Vec<Vec<bool>> = Vec::new();
        for engine in &self.job.chunks {
            let mut chunk_states = Vec::new();
            engine.walk_states(|_, done| chunk_states.push(done));
            states.push(chunk_states);
        }

        let mut rows = Vec::new();
        let mut row_index = 0;
        first.walk_states(|step, _| {
            let done = states
                .iter()
                .filter(|chunk| chunk.get(row_index) == Some(&true))
                .count();
            rows.push((step.name.clone(), step.comment.clone(), done));
            row_index += 1;
        });

        let total = self.job.chunk_count();
        let width = rows.iter().map(|(name, _, _)| name.len()).max().unwrap_or(0);

        let mut out = String::new();
        for (index, (name, comment, done)) in rows.iter().enumerate() {
            let marks: String = states
                .iter()
                .map(|chunk| {
                    if chunk.get(index) == Some(&true) {
                        '+'
                    } else {
                        '.'
                    }
                })
                .collect();

            out.push_str(&format!(
                "  {name:<width$}  [{marks}]  {done}/{total}  {state}  {comment}\n",
                name = name,
                width = width,
                marks = marks,
                done = done,
                total = total,
                state = aggregate_state(*done, total),
                comment = comment
            ));
        }
        out
    }
}

/// Flat ordered list of (state, comment) pairs for one workflow.
fn render_flat(engine: &Engine) -> String {
    let mut out = String::new();
    engine.walk_states(|step, done| {
        let state = if done {
            "complete".green()
        } else {
            "incomplete".yellow()
        };
        out.push_str(&format!(
            "  [{state}] {name}  {comment}\n",
            state = state,
            name = step.name,
            comment = step.comment
        ));
    });
    out
}

/// The user-visible aggregate of one step across all chunks.
fn aggregate_state(done: usize, total: usize) -> colored::ColoredString {
    if total > 0 && done == total {
        "complete".green()
    } else if done == 0 {
        "not started".normal()
    } else {
        "incomplete".yellow()
    }
}
