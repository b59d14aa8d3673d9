//! Detection of user initiated app launches in the activity manager log.
//!
//! The pipeline for a single run is:
//!  - [position] counts lines already in the log so that they can be skipped.
//!  - [engine::LaunchDetector] reads the live stream line by line.
//!  - [matcher] pulls the component and the intent flags out of a candidate line.
//!  - [flags] decides whether the flags describe a launch done by the user.

pub mod engine;
pub mod flags;
pub mod matcher;
pub mod position;

use std::sync::Arc;

use matcher::LaunchCandidate;

/// An app started by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchEvent {
    pub package_name: Arc<str>,
    pub process_name: Arc<str>,
}

impl From<LaunchCandidate> for LaunchEvent {
    fn from(
        LaunchCandidate {
            package_name,
            process_name,
        }: LaunchCandidate,
    ) -> Self {
        Self {
            package_name,
            process_name,
        }
    }
}

/// Output of the detector, in the order the lines appeared in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSignal {
    Launch(LaunchEvent),
    /// The home screen was brought to front. Widgets should be refreshed.
    HomeResumed,
}
