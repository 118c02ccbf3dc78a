use std::time::Duration;

/// How long a profile's actions keep repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileTiming {
    /// Until cancelled.
    #[default]
    Forever,
    /// Until the duration elapses; in-flight actions are cancelled at the deadline.
    Duration(Duration),
    /// A fixed number of rounds over all actions.
    Iterations(u64),
}

impl ProfileTiming {
    /// Iterations win over a timeout when both are given.
    pub fn from_options(timeout: Option<Duration>, iterations: Option<u64>) -> Self {
        match (iterations, timeout) {
            (Some(n), _) => ProfileTiming::Iterations(n),
            (None, Some(d)) => ProfileTiming::Duration(d),
            (None, None) => ProfileTiming::Forever,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self {
            ProfileTiming::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_complete(&self, completed_iterations: u64) -> bool {
        match self {
            ProfileTiming::Iterations(n) => completed_iterations >= *n,
            _ => false,
        }
    }
}
