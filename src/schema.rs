//! Typed layout of everything kept in the persistent store.
//!
//! Loading never fails: a value that does not parse is logged and replaced by
//! the default for that field.

use log::warn;

use crate::{
    pack::{Pack, PackChoice},
    quiz::{Lockout, QuizProgress},
    store::PersistentStore,
};

pub const CURRENT_QUESTION_INDEX: &str = "quiz.currentQuestionIndex";
pub const COMPLETED: &str = "quiz.completed";
pub const LOCKOUT_END: &str = "quiz.lockout.endTimestamp";
pub const STARTED: &str = "quiz.started";
pub const SELECTED_PACK: &str = "giftpack.selected";

/// `STARTED` comes first so other tabs see the reset before the rest of
/// the snapshot disappears.
pub const QUIZ_KEYS: [&str; 4] = [STARTED, CURRENT_QUESTION_INDEX, COMPLETED, LOCKOUT_END];

pub fn is_quiz_key(key: &str) -> bool {
    QUIZ_KEYS.contains(&key)
}

/// Rebuilds the quiz state as of `now`. A lockout that already ran out is
/// dropped here and removed from the store.
pub fn load_progress<S>(store: &S, question_count: usize, now: i64) -> QuizProgress
where
    S: PersistentStore + ?Sized,
{
    if load_flag(store, COMPLETED) {
        return QuizProgress::Completed;
    }

    let index = match store.get(CURRENT_QUESTION_INDEX) {
        None => 0,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(index) if index < question_count => index,
            _ => {
                warn!("Ignoring stored question index {raw:?}, starting from the first question");
                0
            }
        },
    };

    let lockout = match store.get(LOCKOUT_END) {
        None => None,
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(ends_at) => {
                let lockout = Lockout::until(ends_at);
                if lockout.is_expired(now) {
                    store.remove(LOCKOUT_END);
                    None
                } else {
                    Some(lockout)
                }
            }
            Err(e) => {
                warn!("Ignoring stored lockout deadline {raw:?}: {e}");
                None
            }
        },
    };

    QuizProgress::Active { index, lockout }
}

/// Writes the full snapshot of `progress`.
pub fn save_progress<S>(store: &S, progress: &QuizProgress)
where
    S: PersistentStore + ?Sized,
{
    match progress {
        QuizProgress::Completed => {
            store.set(COMPLETED, "true");
            store.remove(LOCKOUT_END);
        }
        QuizProgress::Active { index, lockout } => {
            store.set(CURRENT_QUESTION_INDEX, &index.to_string());
            store.remove(COMPLETED);
            match lockout {
                Some(lockout) => store.set(LOCKOUT_END, &lockout.ends_at().to_string()),
                None => store.remove(LOCKOUT_END),
            }
        }
    }
}

/// Whether the intro was already dismissed on this profile.
pub fn load_started<S>(store: &S) -> bool
where
    S: PersistentStore + ?Sized,
{
    load_flag(store, STARTED)
}

pub fn save_started<S>(store: &S)
where
    S: PersistentStore + ?Sized,
{
    store.set(STARTED, "true");
}

/// Forgets all quiz progress, including the intro flag.
pub fn reset_quiz<S>(store: &S)
where
    S: PersistentStore + ?Sized,
{
    for key in QUIZ_KEYS {
        store.remove(key);
    }
}

pub fn load_pack<S>(store: &S) -> PackChoice
where
    S: PersistentStore + ?Sized,
{
    match store.get(SELECTED_PACK) {
        None => PackChoice::Unchosen,
        Some(raw) => match raw.parse::<Pack>() {
            Ok(pack) => PackChoice::Chosen(pack),
            Err(_) => {
                warn!("Ignoring stored gift pack {raw:?}");
                PackChoice::Unchosen
            }
        },
    }
}

pub fn save_pack<S>(store: &S, choice: &PackChoice)
where
    S: PersistentStore + ?Sized,
{
    match choice {
        PackChoice::Chosen(pack) => store.set(SELECTED_PACK, pack.as_str()),
        PackChoice::Unchosen => store.remove(SELECTED_PACK),
    }
}

fn load_flag<S>(store: &S, key: &str) -> bool
where
    S: PersistentStore + ?Sized,
{
    match store.get(key).as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            warn!("Ignoring stored {key} value {other:?}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Scope;

    #[test]
    fn empty_store_is_the_initial_state() {
        let store = Scope::in_memory().context();
        assert_eq!(load_progress(&store, 4, 0), QuizProgress::default());
        assert!(!load_started(&store));
        assert_eq!(load_pack(&store), PackChoice::Unchosen);
    }

    #[test]
    fn snapshot_round_trip() {
        let store = Scope::in_memory().context();
        let progress = QuizProgress::Active {
            index: 2,
            lockout: Some(Lockout::until(5_000)),
        };
        save_progress(&store, &progress);
        assert_eq!(load_progress(&store, 4, 4_000), progress);

        save_progress(&store, &QuizProgress::Completed);
        assert_eq!(load_progress(&store, 4, 4_000), QuizProgress::Completed);
        assert_eq!(store.get(LOCKOUT_END), None);
    }

    #[test]
    fn malformed_fields_fall_back_independently() {
        let store = Scope::in_memory().context();
        store.set(CURRENT_QUESTION_INDEX, "two");
        store.set(LOCKOUT_END, "9000");
        store.set(COMPLETED, "yes");
        assert_eq!(
            load_progress(&store, 4, 0),
            QuizProgress::Active {
                index: 0,
                lockout: Some(Lockout::until(9_000)),
            }
        );

        store.set(CURRENT_QUESTION_INDEX, "3");
        store.set(LOCKOUT_END, "soon");
        assert_eq!(
            load_progress(&store, 4, 0),
            QuizProgress::Active {
                index: 3,
                lockout: None,
            }
        );
    }

    #[test]
    fn index_outside_the_bank_is_malformed() {
        let store = Scope::in_memory().context();
        store.set(CURRENT_QUESTION_INDEX, "4");
        assert_eq!(load_progress(&store, 4, 0).current_index(), Some(0));
        store.set(CURRENT_QUESTION_INDEX, "-1");
        assert_eq!(load_progress(&store, 4, 0).current_index(), Some(0));
    }

    #[test]
    fn expired_lockout_is_removed_on_load() {
        let store = Scope::in_memory().context();
        store.set(CURRENT_QUESTION_INDEX, "1");
        store.set(LOCKOUT_END, "100");
        assert_eq!(load_progress(&store, 4, 100).lockout(), None);
        assert_eq!(store.get(LOCKOUT_END), None);
    }

    #[test]
    fn reset_clears_only_quiz_keys() {
        let store = Scope::in_memory().context();
        save_started(&store);
        save_progress(&store, &QuizProgress::Completed);
        save_pack(&store, &PackChoice::Chosen(Pack::C));

        reset_quiz(&store);

        assert!(!load_started(&store));
        assert_eq!(load_progress(&store, 4, 0), QuizProgress::default());
        assert_eq!(load_pack(&store), PackChoice::Chosen(Pack::C));
    }

    #[test]
    fn unknown_pack_loads_as_unchosen() {
        let store = Scope::in_memory().context();
        store.set(SELECTED_PACK, "D");
        assert_eq!(load_pack(&store), PackChoice::Unchosen);
        save_pack(&store, &PackChoice::Chosen(Pack::A));
        assert_eq!(store.get(SELECTED_PACK).as_deref(), Some("A"));
        save_pack(&store, &PackChoice::Unchosen);
        assert_eq!(store.get(SELECTED_PACK), None);
    }
}
