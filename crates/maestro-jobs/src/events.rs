use crate::types::Job;

/// Typed job lifecycle event carrying a full snapshot.
///
/// Delivered over a broadcast channel so subscribers can never re-enter
/// the manager from inside a mutation.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started(Job),
    Completed(Job),
    Failed(Job),
    Cancelled(Job),
}

impl JobEvent {
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::Started(j)
            | JobEvent::Completed(j)
            | JobEvent::Failed(j)
            | JobEvent::Cancelled(j) => j,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Started(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Started(_) => "job:started",
            JobEvent::Completed(_) => "job:completed",
            JobEvent::Failed(_) => "job:failed",
            JobEvent::Cancelled(_) => "job:cancelled",
        }
    }
}
