use std::{collections::HashMap, sync::Arc};

use dotenv::dotenv;
use greeting_bot::{
    clock::{Clock, SystemClock},
    config::Config,
    pack::{Pack, PackChoice},
    quiz::{format_countdown, QuestionBank, SubmitOutcome},
    route::Route,
    session::{ChooseOutcome, PackSession, QuizSession, TabUpdate},
    store::{Scope, StoreHandle},
    tab::{QuizTab, TabHandle},
};
use log::{info, warn};
use rand::seq::SliceRandom;
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove},
};
use tokio::sync::{mpsc, Mutex};

type GreetingDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type DialogueStorage = Arc<ErasedStorage<State>>;

/// Which page a chat is looking at. Everything else lives in the shared store.
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Quiz,
    GiftPack,
}

/// Shared by every chat. Each chat gets its own quiz tab on the same scope,
/// so progress made in one chat shows up in the others.
struct App {
    scope: Scope,
    bank: Arc<QuestionBank>,
    clock: Arc<dyn Clock>,
    tabs: Mutex<HashMap<ChatId, QuizTab<StoreHandle>>>,
    allow_reset: bool,
}

impl App {
    async fn with_tab<T>(
        &self,
        bot: &Bot,
        chat: ChatId,
        f: impl FnOnce(&mut QuizSession<StoreHandle>) -> T,
    ) -> T {
        let mut tabs = self.tabs.lock().await;
        // A tab whose task ended no longer follows the store.
        if tabs.get(&chat).is_some_and(|tab| !tab.is_running()) {
            warn!("Quiz tab for chat {chat} had stopped, reopening it");
            tabs.remove(&chat);
        }
        let tab = tabs.entry(chat).or_insert_with(|| {
            let store = self.scope.context();
            info!("Opening quiz tab {} for chat {chat}", store.context_id());
            let session = QuizSession::load(store, self.bank.clone(), self.clock.clone());
            let (tab, updates) = QuizTab::spawn(session);
            tokio::spawn(forward_updates(bot.clone(), chat, updates, tab.handle()));
            tab
        });
        tab.with_session(f)
    }

    /// Closes the chat's quiz tab, if it has one. Its task is aborted.
    async fn close_tab(&self, chat: ChatId) -> bool {
        self.tabs.lock().await.remove(&chat).is_some()
    }
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting greeting bot...");

    let config = Config::from_env()?;

    let bank = match &config.questions_path {
        Some(path) => QuestionBank::from_path(path)?,
        None => QuestionBank::birthday(),
    };
    info!("Loaded {} questions", bank.len());

    let scope = match &config.store_path {
        Some(path) => Scope::open(path),
        None => Scope::in_memory(),
    };
    if !scope.is_durable() {
        warn!("Quiz progress is kept in memory only");
    }

    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await?
        .erase();

    let app = Arc::new(App {
        scope,
        bank: Arc::new(bank),
        clock: Arc::new(SystemClock),
        tabs: Mutex::new(HashMap::new()),
        allow_reset: config.allow_reset,
    });

    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::filter(|msg: Message| is_command(&msg, "/start")).endpoint(start))
            .branch(dptree::filter(|msg: Message| is_command(&msg, "/reset")).endpoint(reset))
            .branch(dptree::filter(|msg: Message| is_command(&msg, "/stop")).endpoint(stop))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::Quiz].endpoint(quiz))
            .branch(dptree::case![State::GiftPack].endpoint(gift_pack)),
    )
    .dependencies(dptree::deps![storage, app])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

fn is_command(msg: &Message, command: &str) -> bool {
    msg.text()
        .and_then(|text| text.split_whitespace().next())
        .is_some_and(|first| first == command)
}

const INTRO_TITLE: &str = "Tanti Auguri Anna!";
const INTRO_TEXT: &str =
    "Prima di festeggiare, per meritarti il tuo regalo, devi risolvere qualche quiz";
const START_BUTTON: &str = "Iniziamo!";
const FINAL_TEXT: &str = "Hai risolto tutti i quiz! Il regalo è tuo. Buon compleanno! 🗼";
const RESET_TEXT: &str = "Il quiz è stato azzerato. Scrivi /start per ricominciare.";
const STOP_TEXT: &str = "A presto! Scrivi /start per tornare.";

const WRONG_REACTIONS: [&str; 4] = ["💥", "🤬", "🐂", "😕"];
const RIGHT_REACTIONS: [&str; 2] = ["🤩", "🎉"];
const FINAL_REACTIONS: [&str; 4] = ["🇫🇷", "🥐", "🥖", "🎨"];

fn reaction(choices: &[&'static str]) -> &'static str {
    choices.choose(&mut rand::thread_rng()).copied().unwrap_or("✨")
}

fn question_text(session: &QuizSession<StoreHandle>) -> String {
    match session.current_question() {
        Some((index, question)) => format!(
            "Domanda {}/{}\n\n{}",
            index + 1,
            session.bank().len(),
            question.prompt
        ),
        None => final_text(),
    }
}

fn final_text() -> String {
    format!("{} {}", reaction(&FINAL_REACTIONS), FINAL_TEXT)
}

fn blocked_text(remaining: i64) -> String {
    format!(
        "{} Risposta sbagliata! Puoi riprovare tra {}",
        reaction(&WRONG_REACTIONS),
        format_countdown(remaining)
    )
}

async fn start(bot: Bot, dialogue: GreetingDialogue, msg: Message, app: Arc<App>) -> HandlerResult {
    let payload = msg
        .text()
        .and_then(|text| text.strip_prefix("/start"))
        .unwrap_or_default();

    match Route::from_fragment(payload) {
        Route::GiftPack => {
            show_packs(&bot, msg.chat.id, &app).await?;
            dialogue.update(State::GiftPack).await?;
        }
        Route::Quiz => {
            show_quiz(&bot, msg.chat.id, &app).await?;
            dialogue.update(State::Quiz).await?;
        }
    }
    Ok(())
}

async fn show_quiz(bot: &Bot, chat: ChatId, app: &App) -> HandlerResult {
    let (started, completed, remaining, question) = app
        .with_tab(bot, chat, |s| {
            (
                s.is_started(),
                s.progress().is_completed(),
                s.remaining(),
                question_text(s),
            )
        })
        .await;

    if completed {
        bot.send_message(chat, final_text())
            .reply_markup(KeyboardRemove::new())
            .await?;
    } else if !started {
        bot.send_message(chat, INTRO_TITLE).await?;
        bot.send_message(chat, INTRO_TEXT)
            .reply_markup(KeyboardMarkup::new(vec![vec![KeyboardButton::new(
                START_BUTTON,
            )]]))
            .await?;
    } else if let Some(remaining) = remaining {
        bot.send_message(chat, blocked_text(remaining)).await?;
    } else {
        bot.send_message(chat, question)
            .reply_markup(KeyboardRemove::new())
            .await?;
    }
    Ok(())
}

enum Reply {
    Intro,
    Question(String),
    Correct(String),
    Wrong(i64),
    Locked(i64),
    Final,
}

async fn quiz(bot: Bot, msg: Message, app: Arc<App>) -> HandlerResult {
    let chat = msg.chat.id;
    let Some(text) = msg.text() else {
        bot.send_message(chat, "Scrivi la risposta (testo)").await?;
        return Ok(());
    };

    let reply = app
        .with_tab(&bot, chat, |s| {
            if s.progress().is_completed() {
                return Reply::Final;
            }
            if !s.is_started() {
                if text.trim() != START_BUTTON {
                    return Reply::Intro;
                }
                s.start();
                return Reply::Question(question_text(s));
            }
            match s.submit(text) {
                SubmitOutcome::Correct { .. } => Reply::Correct(question_text(s)),
                SubmitOutcome::Completed | SubmitOutcome::AlreadyCompleted => Reply::Final,
                SubmitOutcome::Wrong { lockout } => Reply::Wrong(lockout.remaining(s.now())),
                SubmitOutcome::Locked { remaining } => Reply::Locked(remaining),
            }
        })
        .await;

    match reply {
        Reply::Intro => {
            bot.send_message(chat, format!("Quando sei pronta, premi \"{START_BUTTON}\""))
                .await?;
        }
        Reply::Question(question) => {
            bot.send_message(chat, question)
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
        Reply::Correct(question) => {
            bot.send_message(chat, format!("{} Giusto!", reaction(&RIGHT_REACTIONS)))
                .await?;
            bot.send_message(chat, question).await?;
        }
        Reply::Wrong(remaining) => {
            bot.send_message(chat, blocked_text(remaining)).await?;
        }
        Reply::Locked(remaining) => {
            bot.send_message(
                chat,
                format!("⏳ Ancora bloccato: {}", format_countdown(remaining)),
            )
            .await?;
        }
        Reply::Final => {
            bot.send_message(chat, final_text())
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
    }
    Ok(())
}

/// Mirrors what other chats did, and the end of this chat's own lockout.
async fn forward_updates(
    bot: Bot,
    chat: ChatId,
    mut updates: mpsc::UnboundedReceiver<TabUpdate>,
    tab: TabHandle<StoreHandle>,
) {
    while let Some(update) = updates.recv().await {
        let text = match update {
            TabUpdate::Started => {
                let question = tab.with_session(|s| question_text(s));
                format!("Si comincia!\n\n{question}")
            }
            TabUpdate::Advanced { .. } => {
                let question = tab.with_session(|s| question_text(s));
                format!("{} Risposta giusta!\n\n{question}", reaction(&RIGHT_REACTIONS))
            }
            TabUpdate::Unlocked { .. } => {
                let question = tab.with_session(|s| question_text(s));
                format!("⏰ Tempo scaduto, puoi riprovare!\n\n{question}")
            }
            TabUpdate::Locked { remaining } => blocked_text(remaining),
            TabUpdate::Completed => final_text(),
            TabUpdate::Reset => RESET_TEXT.to_string(),
        };
        if let Err(e) = bot.send_message(chat, text).await {
            warn!("Failed to update chat {chat}: {e}");
        }
    }
}

const PACKS_TITLE: &str = "Per Anna\n\nUna piccola sorpresa (non aprire troppo in fretta)";
const PACKS_TEXT: &str = "Oggi niente quiz. Solo tre pacchi. Scegline uno.";
const NO_TRICKS: &str = "Niente trucchi: il pacco scelto resta.";

fn reveal_text(pack: Pack) -> String {
    format!(
        "{}\n\nVoucher\nLa scegli tu dove vuoi.\n\n{}",
        pack.title(),
        pack.line()
    )
}

async fn show_packs(bot: &Bot, chat: ChatId, app: &App) -> HandlerResult {
    match PackSession::new(app.scope.context()).choice() {
        PackChoice::Chosen(pack) => {
            bot.send_message(chat, reveal_text(pack))
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
        PackChoice::Unchosen => {
            let options = Pack::ALL
                .iter()
                .map(|pack| format!("{}: {}", pack.label(), pack.subtitle()))
                .collect::<Vec<_>>()
                .join("\n");
            let keyboard = KeyboardMarkup::new(
                Pack::ALL
                    .iter()
                    .map(|pack| vec![KeyboardButton::new(pack.label())])
                    .collect::<Vec<_>>(),
            );
            bot.send_message(chat, PACKS_TITLE).await?;
            bot.send_message(chat, format!("{PACKS_TEXT}\n\n{options}"))
                .reply_markup(keyboard)
                .await?;
        }
    }
    Ok(())
}

async fn gift_pack(bot: Bot, msg: Message, app: Arc<App>) -> HandlerResult {
    let chat = msg.chat.id;
    let Some(pack) = msg.text().and_then(Pack::from_label) else {
        return show_packs(&bot, chat, &app).await;
    };

    match PackSession::new(app.scope.context()).choose(pack) {
        ChooseOutcome::Chosen(pack) => {
            bot.send_message(chat, "🎉🎊").await?;
            bot.send_message(chat, reveal_text(pack))
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
        ChooseOutcome::AlreadyChosen(pack) => {
            bot.send_message(chat, format!("{NO_TRICKS}\n\n{}", reveal_text(pack)))
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
    }
    Ok(())
}

async fn reset(bot: Bot, dialogue: GreetingDialogue, msg: Message, app: Arc<App>) -> HandlerResult {
    let chat = msg.chat.id;
    if !app.allow_reset {
        bot.send_message(chat, "Niente trucchi 😉").await?;
        return Ok(());
    }

    match dialogue.get().await?.unwrap_or_default() {
        State::GiftPack => {
            PackSession::new(app.scope.context()).reset();
            show_packs(&bot, chat, &app).await?;
        }
        State::Quiz | State::Start => {
            app.with_tab(&bot, chat, |s| s.reset()).await;
            show_quiz(&bot, chat, &app).await?;
            dialogue.update(State::Quiz).await?;
        }
    }
    Ok(())
}

/// Leaves the page: the chat stops following the quiz until the next /start.
async fn stop(bot: Bot, dialogue: GreetingDialogue, msg: Message, app: Arc<App>) -> HandlerResult {
    let chat = msg.chat.id;
    if app.close_tab(chat).await {
        info!("Closed the quiz tab for chat {chat}");
    }
    dialogue.update(State::Start).await?;
    bot.send_message(chat, STOP_TEXT)
        .reply_markup(KeyboardRemove::new())
        .await?;
    Ok(())
}
