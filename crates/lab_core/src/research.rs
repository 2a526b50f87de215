//! One attempt at solving one catalog problem.

use serde::{Deserialize, Serialize};

use crate::{
    GameError, PlayerId, ProblemSnapshot, ResearchId, SubmissionStatus, Timestamp, Violation,
};

/// Milestones a research record passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResearchStage {
    Started,
    Submitted,
    Solved,
    Finished,
    AnswerShown,
    Rewarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Research {
    pub id: ResearchId,
    /// Frozen at creation; later catalog edits do not touch it.
    pub problem: ProblemSnapshot,
    pub owner: PlayerId,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub solved_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub answer_shown_at: Option<Timestamp>,
    pub reward_received_at: Option<Timestamp>,
    pub battery_capacity_increment: Option<f64>,
    pub performance_increment: Option<f64>,
}

/// Increments sampled at reward time, before the qualifying checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub battery_capacity: f64,
    pub performance: f64,
}

impl Research {
    pub fn start(
        id: ResearchId,
        problem: ProblemSnapshot,
        owner: PlayerId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            problem,
            owner,
            created_at,
            submitted_at: None,
            solved_at: None,
            finished_at: None,
            answer_shown_at: None,
            reward_received_at: None,
            battery_capacity_increment: None,
            performance_increment: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_rewarded(&self) -> bool {
        self.reward_received_at.is_some()
    }

    pub fn is_solved(&self) -> bool {
        self.solved_at.is_some()
    }

    pub fn stage(&self) -> ResearchStage {
        if self.reward_received_at.is_some() {
            ResearchStage::Rewarded
        } else if self.answer_shown_at.is_some() {
            ResearchStage::AnswerShown
        } else if self.finished_at.is_some() {
            ResearchStage::Finished
        } else if self.solved_at.is_some() {
            ResearchStage::Solved
        } else if self.submitted_at.is_some() {
            ResearchStage::Submitted
        } else {
            ResearchStage::Started
        }
    }

    /// Capacity credit requires a solve.
    pub fn qualifies_for_capacity(&self) -> bool {
        self.solved_at.is_some()
    }

    /// Performance credit requires a submission and a look at the explanation.
    pub fn qualifies_for_performance(&self) -> bool {
        self.answer_shown_at.is_some() && self.submitted_at.is_some()
    }

    /// Rewarded capacity gain, or 0 when none was granted.
    pub fn capacity_credit(&self) -> f64 {
        if self.is_rewarded() && self.qualifies_for_capacity() {
            self.battery_capacity_increment.unwrap_or(0.0)
        } else {
            0.0
        }
    }

    pub fn performance_credit(&self) -> f64 {
        if self.is_rewarded() && self.qualifies_for_performance() {
            self.performance_increment.unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Latest milestone recorded so far.
    fn last_milestone(&self) -> Timestamp {
        [
            self.submitted_at,
            self.solved_at,
            self.finished_at,
            self.answer_shown_at,
            self.reward_received_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, Ord::max)
    }

    /// Record tracker results. Each timestamp is written only the first time
    /// it becomes known; times before `created_at` belong to an earlier
    /// attempt and are ignored. Returns whether anything changed.
    pub fn record_submission(&mut self, status: SubmissionStatus) -> Result<bool, GameError> {
        if self.is_finished() {
            return Err(Violation::AlreadyFinished.into());
        }
        let since = self.created_at;
        let mut changed = false;
        if self.submitted_at.is_none() {
            if let Some(at) = status.first_submitted_at.filter(|at| *at >= since) {
                self.submitted_at = Some(at);
                changed = true;
            }
        }
        if self.solved_at.is_none() {
            if let Some(at) = status.first_solved_at.filter(|at| *at >= since) {
                self.solved_at = Some(at);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Close the attempt. A clock reading earlier than the last milestone
    /// is moved up to it.
    pub fn finish(&mut self, at: Timestamp) -> Result<(), GameError> {
        if self.is_finished() {
            return Err(Violation::AlreadyFinished.into());
        }
        self.finished_at = Some(at.max(self.last_milestone()));
        Ok(())
    }

    /// Reveal the explanation. A second call keeps the first timestamp and returns `false`.
    pub fn show_answer(&mut self, at: Timestamp) -> Result<bool, GameError> {
        if !self.is_finished() {
            return Err(Violation::NotFinished.into());
        }
        if self.answer_shown_at.is_some() {
            return Ok(false);
        }
        self.answer_shown_at = Some(at.max(self.last_milestone()));
        Ok(true)
    }

    /// Grant the reward. Increments are stored only where the record
    /// qualifies; otherwise they stay `None` for good.
    pub fn reward(&mut self, at: Timestamp, growth: Growth) -> Result<(), GameError> {
        if self.is_rewarded() {
            return Err(Violation::AlreadyRewarded.into());
        }
        if !self.is_finished() {
            return Err(Violation::NotFinished.into());
        }
        self.battery_capacity_increment = self
            .qualifies_for_capacity()
            .then_some(growth.battery_capacity);
        self.performance_increment = self
            .qualifies_for_performance()
            .then_some(growth.performance);
        self.reward_received_at = Some(at.max(self.last_milestone()));
        Ok(())
    }
}
