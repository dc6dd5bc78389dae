//! Declarative workflow graphs
//!
//! A graph is a table of named steps plus a table of transitions. After a
//! step completes, its outgoing transitions are checked in declaration order
//! and the first whose guard accepts the state wins. Steps run strictly one
//! at a time. A step may also halt the run directly with a terminal status
//! (the no-op short-circuit).

use futures::future::BoxFuture;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use vitals_common::MonitorEvent;

use super::{TerminalStatus, WorkflowContext, WorkflowError};

/// Transition target that ends the run
pub const END: &str = "__end__";

/// Upper bound on steps per run; graphs are acyclic so this only trips on
/// a miswired table
const MAX_STEPS: usize = 32;

/// Identity of one run, handed to every step
#[derive(Debug, Clone, Copy)]
pub struct RunInfo {
    pub id: Uuid,
    pub workflow: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Follow the first matching transition
    Continue,
    /// End the run now with this status
    Halt(TerminalStatus),
}

pub type StepResult = Result<StepOutcome, WorkflowError>;

pub type StepFn<S> =
    for<'a> fn(&'a WorkflowContext, &'a RunInfo, &'a mut S) -> BoxFuture<'a, StepResult>;

pub type Guard<S> = fn(&S) -> bool;

/// Per-run state; reports the terminal status when a run reaches `END`
pub trait WorkflowState: Send {
    fn terminal_status(&self) -> TerminalStatus;
}

struct Step<S> {
    name: &'static str,
    run: StepFn<S>,
}

struct Transition<S> {
    from: &'static str,
    to: &'static str,
    guard: Option<Guard<S>>,
}

/// Result of one run
#[derive(Debug)]
pub struct RunReport<S> {
    pub run_id: Uuid,
    pub workflow: &'static str,
    pub status: TerminalStatus,
    /// Steps executed, in order
    pub path: Vec<&'static str>,
    pub state: S,
}

pub struct WorkflowGraph<S> {
    name: &'static str,
    entry: &'static str,
    steps: Vec<Step<S>>,
    transitions: Vec<Transition<S>>,
}

impl<S: WorkflowState> WorkflowGraph<S> {
    pub fn new(name: &'static str, entry: &'static str) -> Self {
        Self {
            name,
            entry,
            steps: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn step(mut self, name: &'static str, run: StepFn<S>) -> Self {
        self.steps.push(Step { name, run });
        self
    }

    /// Unconditional transition
    pub fn edge(mut self, from: &'static str, to: &'static str) -> Self {
        self.transitions.push(Transition { from, to, guard: None });
        self
    }

    /// Transition taken only when `guard` accepts the state
    pub fn edge_if(mut self, from: &'static str, guard: Guard<S>, to: &'static str) -> Self {
        self.transitions.push(Transition {
            from,
            to,
            guard: Some(guard),
        });
        self
    }

    fn has_step(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    /// Check that every name in the tables refers to a real step
    pub fn validate(self) -> Result<Self, WorkflowError> {
        if !self.has_step(self.entry) {
            return Err(WorkflowError::Graph(format!(
                "{}: entry step '{}' is not defined",
                self.name, self.entry
            )));
        }

        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.name == step.name) {
                return Err(WorkflowError::Graph(format!(
                    "{}: step '{}' defined twice",
                    self.name, step.name
                )));
            }
        }

        for t in &self.transitions {
            if !self.has_step(t.from) {
                return Err(WorkflowError::Graph(format!(
                    "{}: transition from unknown step '{}'",
                    self.name, t.from
                )));
            }
            if t.to != END && !self.has_step(t.to) {
                return Err(WorkflowError::Graph(format!(
                    "{}: transition to unknown step '{}'",
                    self.name, t.to
                )));
            }
        }

        Ok(self)
    }

    /// Target of the first transition out of `from` that accepts `state`
    pub fn next(&self, from: &str, state: &S) -> Option<&'static str> {
        self.transitions
            .iter()
            .filter(|t| t.from == from)
            .find(|t| t.guard.map_or(true, |guard| guard(state)))
            .map(|t| t.to)
    }

    /// Execute one run inside a span carrying the workflow name and run id
    pub async fn run(&self, ctx: &WorkflowContext, state: S) -> RunReport<S> {
        let run = RunInfo {
            id: Uuid::new_v4(),
            workflow: self.name,
        };
        let span = info_span!("workflow", workflow = self.name, run_id = %run.id);
        self.drive(ctx, run, state).instrument(span).await
    }

    async fn drive(&self, ctx: &WorkflowContext, run: RunInfo, mut state: S) -> RunReport<S> {
        let mut path = Vec::new();
        let mut current = self.entry;

        let outcome = loop {
            if path.len() >= MAX_STEPS {
                break Err(WorkflowError::Graph(format!(
                    "{}: exceeded {} steps",
                    self.name, MAX_STEPS
                )));
            }

            let Some(step) = self.steps.iter().find(|s| s.name == current) else {
                break Err(WorkflowError::Graph(format!(
                    "{}: unknown step '{}'",
                    self.name, current
                )));
            };

            debug!(step = current, "Running step");
            path.push(current);

            match (step.run)(ctx, &run, &mut state).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Halt(status)) => break Ok(status),
                Err(e) => break Err(e),
            }

            match self.next(current, &state) {
                Some(END) => break Ok(state.terminal_status()),
                Some(next) => current = next,
                None => {
                    break Err(WorkflowError::Graph(format!(
                        "{}: no transition out of '{}'",
                        self.name, current
                    )))
                }
            }
        };

        let status = match outcome {
            Ok(status) => status,
            Err(e) => {
                error!(step = current, "Workflow step failed: {}", e);
                e.terminal_status()
            }
        };

        match &status {
            TerminalStatus::CooledDown { kind } => {
                warn!(status = %status, kind = %kind, "Workflow finished")
            }
            s if s.is_failure() => error!(status = %status, "Workflow finished"),
            _ => info!(status = %status, "Workflow finished"),
        }

        ctx.events.emit_lossy(MonitorEvent::WorkflowFinished {
            workflow: self.name.to_string(),
            run_id: run.id,
            status: status.as_str().to_string(),
            timestamp: ctx.clock.now(),
        });

        RunReport {
            run_id: run.id,
            workflow: self.name,
            status,
            path,
            state,
        }
    }
}
