//! Onboarding wizard state machine.
//!
//! `CollectDate → CollectTime → CollectPlace → Done`, with `Cancelled`
//! reachable from any non-terminal stage. Invalid input leaves the stage
//! unchanged. Transitions are pure; persistence is the manager's job.

use serde::{Deserialize, Serialize};

use super::model::BirthDetails;
use super::validate::{validate_date, validate_place, validate_time};

/// The stages of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    CollectDate,
    CollectTime,
    CollectPlace,
    Done,
    Cancelled,
}

impl WizardStage {
    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for WizardStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CollectDate => "collect_date",
            Self::CollectTime => "collect_time",
            Self::CollectPlace => "collect_place",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Result of feeding one input to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Input rejected; stage unchanged.
    Rejected(WizardStage),
    /// Field stored; moved to the given stage.
    Advanced(WizardStage),
    /// All three fields collected and validated.
    Completed(BirthDetails),
    /// Session is already terminal.
    Finished,
}

/// Transient per-user wizard session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingSession {
    pub stage: WizardStage,
    /// Whether the user already had complete details (`/change` on a
    /// finished profile).
    pub is_update: bool,
    pub date_of_birth: Option<String>,
    pub time_of_birth: Option<String>,
}

impl OnboardingSession {
    pub fn new(is_update: bool) -> Self {
        Self {
            stage: WizardStage::CollectDate,
            is_update,
            date_of_birth: None,
            time_of_birth: None,
        }
    }

    /// Apply one user input to the current stage.
    pub fn step(&mut self, input: &str) -> StepOutcome {
        match self.stage {
            WizardStage::CollectDate => match validate_date(input) {
                Some(date) => {
                    self.date_of_birth = Some(date);
                    self.stage = WizardStage::CollectTime;
                    StepOutcome::Advanced(self.stage)
                }
                None => StepOutcome::Rejected(self.stage),
            },
            WizardStage::CollectTime => match validate_time(input) {
                Some(time) => {
                    self.time_of_birth = Some(time);
                    self.stage = WizardStage::CollectPlace;
                    StepOutcome::Advanced(self.stage)
                }
                None => StepOutcome::Rejected(self.stage),
            },
            WizardStage::CollectPlace => {
                let Some(place) = validate_place(input) else {
                    return StepOutcome::Rejected(self.stage);
                };
                match (&self.date_of_birth, &self.time_of_birth) {
                    (Some(date), Some(time)) => {
                        self.stage = WizardStage::Done;
                        StepOutcome::Completed(BirthDetails {
                            date_of_birth: date.clone(),
                            time_of_birth: time.clone(),
                            place_of_birth: place,
                        })
                    }
                    // Unreachable through `step`, but restart rather than
                    // persist a partial profile.
                    _ => {
                        *self = Self::new(self.is_update);
                        StepOutcome::Rejected(self.stage)
                    }
                }
            }
            WizardStage::Done | WizardStage::Cancelled => StepOutcome::Finished,
        }
    }

    /// Cancel the session. Returns false if it was already terminal.
    pub fn cancel(&mut self) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = WizardStage::Cancelled;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_collects_all_fields() {
        let mut s = OnboardingSession::new(false);
        assert_eq!(
            s.step("1990-01-15"),
            StepOutcome::Advanced(WizardStage::CollectTime)
        );
        assert_eq!(s.step("10:30"), StepOutcome::Advanced(WizardStage::CollectPlace));
        match s.step("Sydney, Australia") {
            StepOutcome::Completed(d) => {
                assert_eq!(d.date_of_birth, "1990-01-15");
                assert_eq!(d.time_of_birth, "10:30");
                assert_eq!(d.place_of_birth, "Sydney, Australia");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(s.stage, WizardStage::Done);
        assert_eq!(s.step("anything"), StepOutcome::Finished);
    }

    #[test]
    fn invalid_input_stays_in_stage() {
        let mut s = OnboardingSession::new(false);
        for bad in ["15-01-1990", "1990-02-30", "tomorrow"] {
            assert_eq!(s.step(bad), StepOutcome::Rejected(WizardStage::CollectDate));
        }
        assert_eq!(s.date_of_birth, None);

        s.step("1990-01-15");
        assert_eq!(s.step("25:61"), StepOutcome::Rejected(WizardStage::CollectTime));
        s.step("10:30");
        assert_eq!(s.step("Sydney"), StepOutcome::Rejected(WizardStage::CollectPlace));
        assert_eq!(s.stage, WizardStage::CollectPlace);
    }

    #[test]
    fn cancel_from_any_non_terminal_stage() {
        for inputs in [vec![], vec!["1990-01-15"], vec!["1990-01-15", "10:30"]] {
            let mut s = OnboardingSession::new(false);
            for i in inputs {
                s.step(i);
            }
            assert!(s.cancel());
            assert_eq!(s.stage, WizardStage::Cancelled);
            assert!(!s.cancel());
        }
    }

    #[test]
    fn stage_display() {
        assert_eq!(WizardStage::CollectDate.to_string(), "collect_date");
        assert!(WizardStage::Done.is_terminal());
        assert!(!WizardStage::CollectPlace.is_terminal());
    }
}
