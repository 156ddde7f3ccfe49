pub mod lockout;
pub mod progress;

use std::{fs::File, io::Read, path::Path};

use crate::error::BankError;

pub use lockout::{format_countdown, Lockout, LOCKOUT_DURATION_SECS};
pub use progress::{QuizProgress, SubmitOutcome, TickOutcome};

/// Lowercases and trims a guess so it can be compared with accepted answers.
pub fn normalize(answer: &str) -> String {
    answer.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub prompt: String,
    pub answers: Vec<String>,
}

impl Question {
    pub fn new(prompt: impl Into<String>, answers: &[&str]) -> Self {
        Self {
            prompt: prompt.into(),
            answers: answers.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// True if `answer` matches any accepted answer, ignoring case and
    /// surrounding whitespace. Nothing else is folded: accents and spelling
    /// variants have to be listed explicitly.
    pub fn accepts(&self, answer: &str) -> bool {
        let answer = normalize(answer);
        self.answers.iter().any(|accepted| normalize(accepted) == answer)
    }
}

/// The fixed, ordered list of questions of one quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }
        // An empty or blank answer would make "" a winning guess.
        if let Some(index) = questions
            .iter()
            .position(|q| q.answers.iter().all(|a| normalize(a).is_empty()))
        {
            return Err(BankError::NoAnswers { index });
        }
        Ok(Self { questions })
    }

    /// Reads a JSON array of `{ "prompt": ..., "answers": [...] }` objects.
    pub fn from_reader(reader: impl Read) -> Result<Self, BankError> {
        let questions: Vec<Question> = serde_json::from_reader(reader)?;
        Self::new(questions)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BankError> {
        Self::from_reader(File::open(path)?)
    }

    /// The birthday quiz.
    pub fn birthday() -> Self {
        Self {
            questions: vec![
                Question::new(
                    "Un melo costa 40, un limone 60 e una felce 10. Quanto costa una sequoia?",
                    &["100", "cento"],
                ),
                Question::new(
                    "Hai 9 palline di cui una leggermente piu' pesante delle altre. \
                     Hai una bilancia a due braccia. \
                     Quale e' il numero minimo di pesate con cui puoi trovare la pallina piu' pesante?",
                    &["2", "due"],
                ),
                Question::new("161 061 681 881 *** 981 281", &["187", "781"]),
                Question::new("Dove andiamo in vacanza quando torni?", &["parigi", "paris"]),
            ],
        }
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.questions.len()
    }
}
