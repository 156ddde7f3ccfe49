use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::debug;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{self, Interval, MissedTickBehavior},
};

use crate::{
    quiz::TickOutcome,
    session::{QuizSession, TabUpdate},
    store::{Notification, PersistentStore, Subscription},
};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// One open quiz page. A background task keeps the session in step with
/// other tabs and counts down an active lockout; it is aborted when the tab
/// is dropped.
pub struct QuizTab<S> {
    handle: TabHandle<S>,
    task: JoinHandle<()>,
}

/// Access to a tab's session from outside its task.
pub struct TabHandle<S> {
    session: Arc<Mutex<QuizSession<S>>>,
    wake: Arc<Notify>,
}

impl<S> Clone for TabHandle<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<S: PersistentStore> TabHandle<S> {
    /// Runs `f` against the session, then lets the task pick up a lockout
    /// that `f` may have started.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut QuizSession<S>) -> T) -> T {
        let result = f(&mut lock(&self.session));
        self.wake.notify_one();
        result
    }
}

impl<S: PersistentStore + 'static> QuizTab<S> {
    /// Starts the tab's task. Needs a running tokio runtime.
    pub fn spawn(mut session: QuizSession<S>) -> (Self, mpsc::UnboundedReceiver<TabUpdate>) {
        let changes = session.subscribe();
        let (updates, receiver) = mpsc::unbounded_channel();
        // Writes made between loading the session and subscribing were never
        // announced to this tab.
        if let Some(update) = session.sync(&Notification::Missed(0)) {
            let _ = updates.send(update);
        }
        let session = Arc::new(Mutex::new(session));
        let wake = Arc::new(Notify::new());
        let task = tokio::spawn(run(session.clone(), changes, wake.clone(), updates));
        (
            Self {
                handle: TabHandle { session, wake },
                task,
            },
            receiver,
        )
    }

    pub fn handle(&self) -> TabHandle<S> {
        self.handle.clone()
    }

    pub fn with_session<T>(&self, f: impl FnOnce(&mut QuizSession<S>) -> T) -> T {
        self.handle.with_session(f)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<S> Drop for QuizTab<S> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<S: PersistentStore>(
    session: Arc<Mutex<QuizSession<S>>>,
    mut changes: Subscription,
    wake: Arc<Notify>,
    updates: mpsc::UnboundedSender<TabUpdate>,
) {
    let mut ticker: Option<Interval> = None;
    loop {
        let has_lockout = lock(&session).progress().lockout().is_some();
        keep_ticker(&mut ticker, has_lockout);

        let update = tokio::select! {
            change = changes.recv() => match change {
                Some(notification) => lock(&session).sync(&notification),
                None => break,
            },
            _ = wake.notified() => None,
            _ = next_tick(&mut ticker) => {
                let mut guard = lock(&session);
                match guard.tick() {
                    TickOutcome::Unlocked => guard
                        .progress()
                        .current_index()
                        .map(|index| TabUpdate::Unlocked { index }),
                    TickOutcome::Waiting { .. } | TickOutcome::Idle => None,
                }
            }
        };

        if let Some(update) = update {
            if updates.send(update).is_err() {
                break;
            }
        }
    }
    debug!("Quiz tab stopped");
}

/// The ticker only exists while there is a lockout to count down.
fn keep_ticker(ticker: &mut Option<Interval>, has_lockout: bool) {
    match (has_lockout, ticker.is_some()) {
        (true, false) => {
            let mut interval = time::interval(TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
        }
        (false, true) => *ticker = None,
        _ => {}
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::{Clock, ManualClock},
        quiz::{QuestionBank, SubmitOutcome},
        schema,
        store::{Scope, StoreHandle},
    };

    const WAIT: Duration = Duration::from_secs(5);

    fn session(scope: &Scope, clock: &Arc<ManualClock>) -> QuizSession<StoreHandle> {
        let clock: Arc<dyn Clock> = clock.clone();
        QuizSession::load(scope.context(), Arc::new(QuestionBank::birthday()), clock)
    }

    async fn next(receiver: &mut mpsc::UnboundedReceiver<TabUpdate>) -> TabUpdate {
        time::timeout(WAIT, receiver.recv())
            .await
            .expect("no update in time")
            .expect("tab stopped")
    }

    #[tokio::test]
    async fn follows_a_lockout_set_in_another_tab() {
        let scope = Scope::in_memory();
        let clock = Arc::new(ManualClock::new(0));
        let (tab, mut updates) = QuizTab::spawn(session(&scope, &clock));
        let mut other = session(&scope, &clock);

        other.start();
        assert_eq!(next(&mut updates).await, TabUpdate::Started);

        other.submit("mille");
        assert_eq!(
            next(&mut updates).await,
            TabUpdate::Locked { remaining: 1799 }
        );
        assert_eq!(tab.with_session(|s| s.remaining()), Some(1799));

        clock.advance(1799);
        assert_eq!(next(&mut updates).await, TabUpdate::Unlocked { index: 0 });
        assert_eq!(scope.context().get(schema::LOCKOUT_END), None);
    }

    #[tokio::test]
    async fn counts_down_its_own_lockout() {
        let scope = Scope::in_memory();
        let clock = Arc::new(ManualClock::new(50));
        let (tab, mut updates) = QuizTab::spawn(session(&scope, &clock));

        tab.with_session(|s| {
            s.start();
            s.submit("");
        });
        assert_eq!(tab.with_session(|s| s.remaining()), Some(1799));

        clock.advance(1800);
        assert_eq!(next(&mut updates).await, TabUpdate::Unlocked { index: 0 });
        assert_eq!(tab.with_session(|s| s.progress().lockout()), None);
        assert_eq!(
            tab.with_session(|s| s.submit("cento")),
            SubmitOutcome::Correct { next: 1 }
        );
    }

    #[tokio::test]
    async fn stops_when_nobody_listens() {
        let scope = Scope::in_memory();
        let clock = Arc::new(ManualClock::new(0));
        let (tab, updates) = QuizTab::spawn(session(&scope, &clock));
        drop(updates);

        session(&scope, &clock).start();

        time::timeout(WAIT, async {
            while tab.is_running() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tab kept running");
    }

    #[tokio::test]
    async fn catches_up_with_writes_made_before_it_started() {
        let scope = Scope::in_memory();
        let clock = Arc::new(ManualClock::new(0));
        let loaded = session(&scope, &clock);
        let mut other = session(&scope, &clock);
        other.start();
        other.submit("cento");

        let (tab, mut updates) = QuizTab::spawn(loaded);

        assert_eq!(next(&mut updates).await, TabUpdate::Started);
        assert_eq!(
            tab.with_session(|s| s.progress().current_index()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn dropping_the_tab_ends_its_task() {
        let scope = Scope::in_memory();
        let clock = Arc::new(ManualClock::new(0));
        let (tab, _updates) = QuizTab::spawn(session(&scope, &clock));
        let handle = tab.handle();
        handle.with_session(|s| {
            s.start();
            s.submit("mille");
        });
        assert_eq!(Arc::strong_count(&handle.session), 3);

        drop(tab);

        time::timeout(WAIT, async {
            while Arc::strong_count(&handle.session) > 1 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("tab task outlived the tab");
    }

    #[tokio::test]
    async fn ticker_only_lives_during_a_lockout() {
        let mut ticker = None;
        keep_ticker(&mut ticker, false);
        assert!(ticker.is_none());

        keep_ticker(&mut ticker, true);
        assert!(ticker.is_some());
        keep_ticker(&mut ticker, true);
        assert!(ticker.is_some());

        keep_ticker(&mut ticker, false);
        assert!(ticker.is_none());
    }
}
