use std::sync::Arc;

use log::{debug, info};

use crate::{
    clock::Clock,
    pack::{Pack, PackChoice},
    quiz::{Question, QuestionBank, QuizProgress, SubmitOutcome, TickOutcome},
    schema,
    store::{Notification, PersistentStore, Subscription},
};

/// What another tab did, as far as this tab has to show it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabUpdate {
    Started,
    Advanced { index: usize },
    Completed,
    Locked { remaining: i64 },
    Unlocked { index: usize },
    Reset,
}

impl TabUpdate {
    fn between(
        (was_started, old): (bool, QuizProgress),
        (started, new): (bool, QuizProgress),
        now: i64,
    ) -> Option<Self> {
        if was_started && !started {
            return Some(TabUpdate::Reset);
        }
        if !started {
            return None;
        }
        if !was_started {
            return Some(TabUpdate::Started);
        }
        if old == new {
            return None;
        }

        match (old, new) {
            (_, QuizProgress::Completed) => Some(TabUpdate::Completed),
            (_, QuizProgress::Active { index, lockout }) => {
                if old.current_index() != Some(index) {
                    return Some(TabUpdate::Advanced { index });
                }
                match (old.lockout(), lockout) {
                    (_, Some(lockout)) => Some(TabUpdate::Locked {
                        remaining: lockout.remaining(now),
                    }),
                    (Some(_), None) => Some(TabUpdate::Unlocked { index }),
                    (None, None) => None,
                }
            }
        }
    }
}

/// The quiz as seen from one tab: the in-memory state plus the store it is
/// mirrored to after every transition.
pub struct QuizSession<S> {
    store: S,
    bank: Arc<QuestionBank>,
    clock: Arc<dyn Clock>,
    progress: QuizProgress,
    started: bool,
}

impl<S: PersistentStore> QuizSession<S> {
    pub fn load(store: S, bank: Arc<QuestionBank>, clock: Arc<dyn Clock>) -> Self {
        let progress = schema::load_progress(&store, bank.len(), clock.now());
        let started = schema::load_started(&store);
        Self {
            store,
            bank,
            clock,
            progress,
            started,
        }
    }

    pub fn progress(&self) -> QuizProgress {
        self.progress
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Dismisses the intro for every tab of the profile.
    pub fn start(&mut self) {
        self.started = true;
        schema::save_started(&self.store);
    }

    pub fn current_question(&self) -> Option<(usize, &Question)> {
        let index = self.progress.current_index()?;
        self.bank.get(index).map(|question| (index, question))
    }

    /// Seconds left before the next guess is allowed.
    pub fn remaining(&self) -> Option<i64> {
        self.progress.remaining(self.clock.now())
    }

    pub fn submit(&mut self, answer: &str) -> SubmitOutcome {
        let before = self.progress;
        let outcome = self.progress.submit(&self.bank, answer, self.clock.now());
        if self.progress != before {
            schema::save_progress(&self.store, &self.progress);
        }
        info!("Quiz answer at {:?}: {:?}", before.current_index(), outcome);
        outcome
    }

    pub fn tick(&mut self) -> TickOutcome {
        let outcome = self.progress.tick(self.clock.now());
        if outcome == TickOutcome::Unlocked {
            info!("Lockout over at question {:?}", self.progress.current_index());
            schema::save_progress(&self.store, &self.progress);
        }
        outcome
    }

    pub fn reset(&mut self) {
        schema::reset_quiz(&self.store);
        self.progress = QuizProgress::default();
        self.started = false;
        info!("Quiz progress reset");
    }

    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    /// Converges on whatever another tab wrote. The full snapshot is re-read,
    /// so missed or reordered notifications cannot leave the tab behind.
    pub fn sync(&mut self, notification: &Notification) -> Option<TabUpdate> {
        if let Notification::Changed(event) = notification {
            if !schema::is_quiz_key(&event.key) {
                return None;
            }
        }

        let now = self.clock.now();
        let progress = schema::load_progress(&self.store, self.bank.len(), now);
        let started = schema::load_started(&self.store);
        let update = TabUpdate::between((self.started, self.progress), (started, progress), now);
        self.progress = progress;
        self.started = started;

        debug!("Synced quiz state from another tab: {update:?}");
        update
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooseOutcome {
    Chosen(Pack),
    AlreadyChosen(Pack),
}

/// The gift pack page. The choice is always read back from the store, so a
/// pick made in another tab wins over a stale one here.
pub struct PackSession<S> {
    store: S,
}

impl<S: PersistentStore> PackSession<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn choice(&self) -> PackChoice {
        schema::load_pack(&self.store)
    }

    pub fn choose(&mut self, pack: Pack) -> ChooseOutcome {
        let mut choice = self.choice();
        if let PackChoice::Chosen(existing) = choice {
            return ChooseOutcome::AlreadyChosen(existing);
        }
        let chosen = choice.choose(pack);
        schema::save_pack(&self.store, &choice);
        info!("Gift pack {chosen} chosen");
        ChooseOutcome::Chosen(chosen)
    }

    pub fn reset(&mut self) {
        let mut choice = self.choice();
        choice.reset();
        schema::save_pack(&self.store, &choice);
        info!("Gift pack choice reset");
    }
}
