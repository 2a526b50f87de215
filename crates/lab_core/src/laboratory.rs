//! A player's research history and the metrics derived from it.
//!
//! Rewarded records live in `history`; the single record that is not yet
//! rewarded (if any) lives in `active`. Holding it in its own slot makes
//! "at most one unfinished" and "at most one unrewarded" structural.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;

use crate::research::Growth;
use crate::{
    Constants, GameError, PlayerId, ProblemId, ProblemSnapshot, Research, ResearchId,
    SubmissionStatus, Timestamp, Violation,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LaboratoryRecords", into = "LaboratoryRecords")]
pub struct Laboratory {
    history: Vec<Research>,
    active: Option<Research>,
    candidates: SmallVec<[ProblemSnapshot; 4]>,
}

/// Flat storage form: every record in creation order, plus the open offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaboratoryRecords {
    #[serde(default)]
    pub records: Vec<Research>,
    #[serde(default)]
    pub candidates: Vec<ProblemSnapshot>,
}

impl Laboratory {
    /// Rebuild from stored records. Fails if any record other than the
    /// newest is unrewarded, if records are out of creation order, or if
    /// two records share an id.
    pub fn from_records(
        records: Vec<Research>,
        candidates: Vec<ProblemSnapshot>,
    ) -> Result<Self, GameError> {
        let mut history = Vec::with_capacity(records.len());
        let mut seen = HashSet::with_capacity(records.len());
        let mut active: Option<Research> = None;
        for record in records {
            if let Some(open) = &active {
                return Err(GameError::invalid(format!(
                    "research {} is unrewarded but not the newest record",
                    open.id
                )));
            }
            if !seen.insert(record.id.clone()) {
                return Err(GameError::Integrity {
                    kind: "research",
                    id: record.id.to_string(),
                });
            }
            if history
                .last()
                .is_some_and(|prev: &Research| prev.created_at > record.created_at)
            {
                return Err(GameError::invalid(format!(
                    "research {} is out of creation order",
                    record.id
                )));
            }
            if record.is_rewarded() {
                history.push(record);
            } else {
                active = Some(record);
            }
        }
        Ok(Self {
            history,
            active,
            candidates: candidates.into_iter().collect(),
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &Research> {
        self.history.iter().chain(self.active.as_ref())
    }

    pub fn len(&self) -> usize {
        self.history.len() + usize::from(self.active.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: &ResearchId) -> Option<&Research> {
        self.records().find(|r| r.id == *id)
    }

    /// Problems offered for selection and not yet picked.
    pub fn candidates(&self) -> &[ProblemSnapshot] {
        &self.candidates
    }

    /// The started-but-not-finished record.
    pub fn unfinished(&self) -> Option<&Research> {
        self.active.as_ref().filter(|r| !r.is_finished())
    }

    /// The finished-but-not-rewarded record.
    pub fn unrewarded(&self) -> Option<&Research> {
        self.active.as_ref().filter(|r| r.is_finished())
    }

    pub fn active(&self) -> Option<&Research> {
        self.active.as_ref()
    }

    // -----------------------------------------------------------------------
    // Derived metrics (recomputed on every call)
    // -----------------------------------------------------------------------

    pub fn battery_capacity(&self, constants: &Constants) -> f64 {
        constants.base_battery_capacity + self.records().map(Research::capacity_credit).sum::<f64>()
    }

    /// Whole charge units the battery holds when fully charged.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn battery_charge(&self, constants: &Constants) -> u32 {
        let capacity = self.battery_capacity(constants).floor();
        if capacity.is_nan() || capacity <= 0.0 {
            0
        } else {
            capacity.min(f64::from(u32::MAX)) as u32
        }
    }

    pub fn performance(&self, constants: &Constants) -> f64 {
        constants.base_performance
            + self
                .records()
                .map(Research::performance_credit)
                .sum::<f64>()
    }

    /// Running average of difficulty over the last `window` solved and
    /// rewarded records. 0 when there are none.
    pub fn researcher_rank(&self, window: usize) -> f64 {
        let solved: Vec<i32> = self
            .records()
            .filter(|r| r.is_rewarded() && r.is_solved())
            .map(|r| r.problem.difficulty)
            .collect();
        let recent = &solved[solved.len().saturating_sub(window)..];
        recent
            .iter()
            .enumerate()
            .fold(0.0, |avg, (i, difficulty)| {
                let i = i as f64;
                (avg * i + f64::from(*difficulty)) / (i + 1.0)
            })
    }

    // -----------------------------------------------------------------------
    // Transitions. Each validates before touching anything.
    // -----------------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), GameError> {
        match &self.active {
            Some(r) if !r.is_finished() => Err(Violation::UnfinishedResearchExists.into()),
            Some(_) => Err(Violation::UnrewardedResearchExists.into()),
            None => Ok(()),
        }
    }

    /// Replace the open offer.
    pub fn offer(&mut self, problems: Vec<ProblemSnapshot>) -> Result<(), GameError> {
        self.ensure_idle()?;
        self.candidates = problems.into_iter().collect();
        Ok(())
    }

    /// Start researching one of the offered problems. Clears the offer.
    pub fn start_research(
        &mut self,
        problem_id: &ProblemId,
        id: ResearchId,
        owner: PlayerId,
        now: Timestamp,
    ) -> Result<&Research, GameError> {
        self.ensure_idle()?;
        let problem = self
            .candidates
            .iter()
            .find(|p| p.id == *problem_id)
            .cloned()
            .ok_or_else(|| Violation::NotOffered(problem_id.to_string()))?;
        if self.find(&id).is_some() {
            return Err(GameError::Integrity {
                kind: "research",
                id: id.to_string(),
            });
        }
        // Keep creation order monotonic even if the clock steps back.
        let created_at = self
            .history
            .last()
            .map_or(now, |last| now.max(last.created_at));
        self.candidates.clear();
        Ok(&*self
            .active
            .insert(Research::start(id, problem, owner, created_at)))
    }

    pub fn record_submission(&mut self, status: SubmissionStatus) -> Result<bool, GameError> {
        let research = self
            .active
            .as_mut()
            .filter(|r| !r.is_finished())
            .ok_or(Violation::NoUnfinishedResearch)?;
        research.record_submission(status)
    }

    pub fn finish(&mut self, now: Timestamp) -> Result<&Research, GameError> {
        let research = self
            .active
            .as_mut()
            .filter(|r| !r.is_finished())
            .ok_or(Violation::NoUnfinishedResearch)?;
        research.finish(now)?;
        Ok(&*research)
    }

    pub fn show_answer(&mut self, now: Timestamp) -> Result<bool, GameError> {
        let research = self
            .active
            .as_mut()
            .filter(|r| r.is_finished())
            .ok_or(Violation::NoUnrewardedResearch)?;
        research.show_answer(now)
    }

    /// Reward the finished record and move it into the history.
    pub fn claim_reward(&mut self, now: Timestamp, growth: Growth) -> Result<&Research, GameError> {
        let research = self
            .active
            .as_mut()
            .filter(|r| r.is_finished())
            .ok_or(Violation::NoUnrewardedResearch)?;
        research.reward(now, growth)?;
        if let Some(rewarded) = self.active.take() {
            self.history.push(rewarded);
        }
        self.history
            .last()
            .ok_or_else(|| GameError::not_found("research", "rewarded"))
    }
}

impl From<Laboratory> for LaboratoryRecords {
    fn from(lab: Laboratory) -> Self {
        let Laboratory {
            mut history,
            active,
            candidates,
        } = lab;
        history.extend(active);
        Self {
            records: history,
            candidates: candidates.into_vec(),
        }
    }
}

impl TryFrom<LaboratoryRecords> for Laboratory {
    type Error = GameError;

    fn try_from(stored: LaboratoryRecords) -> Result<Self, Self::Error> {
        Laboratory::from_records(stored.records, stored.candidates)
    }
}
