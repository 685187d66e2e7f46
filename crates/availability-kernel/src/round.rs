//! Round participation state machine
//!
//! Tracks one node through a federated round:
//! Idle → Training → Uploading → Waiting → Downloading → Idle.
//! Both transfer phases are gated on an admitting [`AvailabilityDecision`]
//! so a node never starts a transfer that would outlast its contact window.

use crate::model::{AvailabilityDecision, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoundPhase {
    #[default]
    Idle,
    Training { round: u64 },
    Uploading { round: u64 },
    Waiting { round: u64 },
    Downloading { round: u64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Cannot {action} while {from:?}")]
    Invalid { from: RoundPhase, action: &'static str },
    #[error("Straggler: {remaining_s:?}s of contact left in round {round}")]
    Straggler { round: u64, remaining_s: Option<i64> },
}

impl RoundPhase {
    pub fn round(&self) -> Option<u64> {
        match *self {
            RoundPhase::Idle => None,
            RoundPhase::Training { round }
            | RoundPhase::Uploading { round }
            | RoundPhase::Waiting { round }
            | RoundPhase::Downloading { round } => Some(round),
        }
    }

    pub fn start_training(self, round: u64) -> Result<Self, TransitionError> {
        match self {
            RoundPhase::Idle => Ok(RoundPhase::Training { round }),
            from => Err(TransitionError::Invalid {
                from,
                action: "start training",
            }),
        }
    }

    pub fn begin_upload(self, decision: &AvailabilityDecision) -> Result<Self, TransitionError> {
        match self {
            RoundPhase::Training { round } => {
                admit(round, decision)?;
                Ok(RoundPhase::Uploading { round })
            }
            from => Err(TransitionError::Invalid {
                from,
                action: "begin upload",
            }),
        }
    }

    pub fn finish_upload(self) -> Result<Self, TransitionError> {
        match self {
            RoundPhase::Uploading { round } => Ok(RoundPhase::Waiting { round }),
            from => Err(TransitionError::Invalid {
                from,
                action: "finish upload",
            }),
        }
    }

    pub fn begin_download(self, decision: &AvailabilityDecision) -> Result<Self, TransitionError> {
        match self {
            RoundPhase::Waiting { round } => {
                admit(round, decision)?;
                Ok(RoundPhase::Downloading { round })
            }
            from => Err(TransitionError::Invalid {
                from,
                action: "begin download",
            }),
        }
    }

    /// Completes the round and advances the node's model version
    pub fn finish_download(self, node: &Node) -> Result<Self, TransitionError> {
        match self {
            RoundPhase::Downloading { round } => {
                let version = node.advance_model_version();
                debug!("{} finished round {} at model version {}", node.id, round, version);
                Ok(RoundPhase::Idle)
            }
            from => Err(TransitionError::Invalid {
                from,
                action: "finish download",
            }),
        }
    }

    /// Drop out of the current round; the model version is untouched
    pub fn abort(self) -> Self {
        RoundPhase::Idle
    }
}

fn admit(round: u64, decision: &AvailabilityDecision) -> Result<(), TransitionError> {
    if decision.available {
        Ok(())
    } else {
        Err(TransitionError::Straggler {
            round,
            remaining_s: decision.remaining.map(|r| r.num_seconds()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn admitted() -> AvailabilityDecision {
        AvailabilityDecision {
            available: true,
            remaining: Some(Duration::seconds(540)),
            window: None,
        }
    }

    #[test]
    fn test_full_round_cycle() {
        let node = Node::new("sat_0", "SAT 0");
        let mut phase = RoundPhase::Idle;

        phase = phase.start_training(7).unwrap();
        assert_eq!(phase, RoundPhase::Training { round: 7 });

        phase = phase.begin_upload(&admitted()).unwrap();
        phase = phase.finish_upload().unwrap();
        assert_eq!(phase, RoundPhase::Waiting { round: 7 });

        phase = phase.begin_download(&admitted()).unwrap();
        phase = phase.finish_download(&node).unwrap();
        assert_eq!(phase, RoundPhase::Idle);
        assert_eq!(node.model_version(), 1);
    }

    #[test]
    fn test_straggler_cannot_upload() {
        let phase = RoundPhase::Training { round: 3 };
        let decision = AvailabilityDecision {
            available: false,
            remaining: Some(Duration::seconds(120)),
            window: None,
        };

        let err = phase.begin_upload(&decision).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Straggler {
                round: 3,
                remaining_s: Some(120)
            }
        );
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        assert!(matches!(
            RoundPhase::Idle.finish_upload(),
            Err(TransitionError::Invalid { .. })
        ));
        assert!(RoundPhase::Training { round: 1 }.start_training(2).is_err());
        assert!(RoundPhase::Waiting { round: 1 }
            .begin_upload(&admitted())
            .is_err());
    }

    #[test]
    fn test_abort_keeps_model_version() {
        let node = Node::new("sat_0", "SAT 0");
        let phase = RoundPhase::Downloading { round: 2 }.abort();
        assert_eq!(phase, RoundPhase::Idle);
        assert_eq!(phase.round(), None);
        assert_eq!(node.model_version(), 0);
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let json = serde_json::to_string(&RoundPhase::Uploading { round: 4 }).unwrap();
        assert_eq!(json, r#"{"phase":"uploading","round":4}"#);
    }
}
