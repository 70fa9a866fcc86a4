//! Core traits for the HTT modules
//!
//! Every analysis step implements [`AnalysisModule`]. A driver calls
//! `pre_analysis` once, `execute` once per event and `post_analysis` once at
//! the end of the run; none of these calls overlap.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::event::TreeEvent;
use crate::histo::HistoSet;

/// Outcome of running a module on one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Keep the event and continue with the next module.
    Accept,
    /// Drop the event; later modules are not run.
    Reject,
}

impl Status {
    /// Framework return code: 0 for accept, 1 for reject.
    pub fn code(self) -> i32 {
        match self {
            Status::Accept => 0,
            Status::Reject => 1,
        }
    }

    /// Whether the event survives.
    pub fn is_accept(self) -> bool {
        self == Status::Accept
    }
}

/// A per-event analysis step.
pub trait AnalysisModule {
    /// Instance name, used in logs and counters.
    fn name(&self) -> &str;

    /// Validate configuration and book histograms.
    fn pre_analysis(&mut self) -> Result<()> {
        Ok(())
    }

    /// Process one event.
    fn execute(&mut self, event: &mut TreeEvent) -> Result<Status>;

    /// Called after the last event.
    fn post_analysis(&mut self) -> Result<()> {
        Ok(())
    }

    /// Log a summary of the module state.
    fn print_info(&self) {}

    /// Histograms booked by this module, if any.
    fn histograms(&self) -> Option<&HistoSet> {
        None
    }
}
