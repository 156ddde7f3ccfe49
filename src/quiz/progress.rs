use super::{Lockout, QuestionBank};

/// Where one player stands in the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizProgress {
    Active {
        index: usize,
        lockout: Option<Lockout>,
    },
    Completed,
}

impl Default for QuizProgress {
    fn default() -> Self {
        Self::Active {
            index: 0,
            lockout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Right answer, `next` is the question now being asked.
    Correct { next: usize },
    /// Right answer to the last question.
    Completed,
    /// Wrong answer. The question stays the same and guesses are blocked.
    Wrong { lockout: Lockout },
    /// A lockout is still running; nothing changed.
    Locked { remaining: i64 },
    AlreadyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Waiting { remaining: i64 },
    Unlocked,
}

impl QuizProgress {
    pub fn submit(&mut self, bank: &QuestionBank, answer: &str, now: i64) -> SubmitOutcome {
        let index = match *self {
            Self::Completed => return SubmitOutcome::AlreadyCompleted,
            Self::Active {
                lockout: Some(lockout),
                ..
            } if !lockout.is_expired(now) => {
                return SubmitOutcome::Locked {
                    remaining: lockout.remaining(now),
                }
            }
            // An expired lockout nobody ticked away yet no longer blocks.
            Self::Active { index, .. } => index,
        };

        let Some(question) = bank.get(index) else {
            *self = Self::Completed;
            return SubmitOutcome::AlreadyCompleted;
        };

        if !question.accepts(answer) {
            let lockout = Lockout::starting_at(now);
            *self = Self::Active {
                index,
                lockout: Some(lockout),
            };
            return SubmitOutcome::Wrong { lockout };
        }

        if bank.is_last(index) {
            *self = Self::Completed;
            SubmitOutcome::Completed
        } else {
            *self = Self::Active {
                index: index + 1,
                lockout: None,
            };
            SubmitOutcome::Correct { next: index + 1 }
        }
    }

    /// Periodic check of the lockout. Never touches the question index.
    pub fn tick(&mut self, now: i64) -> TickOutcome {
        match *self {
            Self::Active {
                index,
                lockout: Some(lockout),
            } => {
                if lockout.is_expired(now) {
                    *self = Self::Active {
                        index,
                        lockout: None,
                    };
                    TickOutcome::Unlocked
                } else {
                    TickOutcome::Waiting {
                        remaining: lockout.remaining(now),
                    }
                }
            }
            _ => TickOutcome::Idle,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        match self {
            Self::Active { index, .. } => Some(*index),
            Self::Completed => None,
        }
    }

    pub fn lockout(&self) -> Option<Lockout> {
        match self {
            Self::Active { lockout, .. } => *lockout,
            Self::Completed => None,
        }
    }

    /// Seconds left on an unexpired lockout.
    pub fn remaining(&self, now: i64) -> Option<i64> {
        self.lockout()
            .filter(|lockout| !lockout.is_expired(now))
            .map(|lockout| lockout.remaining(now))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
