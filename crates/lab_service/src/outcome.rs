use lab_core::Violation;
use serde::Serialize;

/// Result of a phase action that passed the infrastructure layer.
///
/// A rejected action serializes as `{"error": {"message": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Applied(T),
    Rejected { error: Rejection },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub message: String,
    #[serde(skip)]
    pub violation: Violation,
}

impl From<Violation> for Rejection {
    fn from(violation: Violation) -> Self {
        Self {
            message: violation.to_string(),
            violation,
        }
    }
}

impl<T> Outcome<T> {
    pub fn rejected(violation: Violation) -> Self {
        Outcome::Rejected {
            error: violation.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected { error } => Some(&error.violation),
        }
    }
}
