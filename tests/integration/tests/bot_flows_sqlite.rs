use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tempfile::tempdir;
use tonus_bot::{
    bot_replies, BotContext, BotDispatcher, InboundEvent, NotificationScheduler, OutboundMessage,
    RecordingBotFacade,
};
use tonus_core::FixedWallClock;
use tonus_navigation::{Menu, NavAction};
use tonus_store::{ReadingStore, SqliteReadingStore, UserId};

const ALICE: UserId = 1001;
const BOB: UserId = 2002;

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("valid datetime")
}

struct Bot {
    store: Arc<SqliteReadingStore>,
    facade: Arc<RecordingBotFacade>,
    clock: Arc<FixedWallClock>,
    dispatcher: BotDispatcher,
}

impl Bot {
    fn open(db_path: &Path, now: NaiveDateTime) -> Self {
        let store = Arc::new(SqliteReadingStore::new(db_path).expect("open sqlite store"));
        let facade = Arc::new(RecordingBotFacade::new());
        let clock = Arc::new(FixedWallClock::new(now));
        let dispatcher = BotDispatcher::new(BotContext::new(
            store.clone(),
            facade.clone(),
            clock.clone(),
        ));
        Self {
            store,
            facade,
            clock,
            dispatcher,
        }
    }

    fn context(&self) -> BotContext {
        self.dispatcher.context().clone()
    }

    async fn send(&self, event: InboundEvent) -> Vec<OutboundMessage> {
        self.dispatcher
            .handle_event(event)
            .await
            .expect("event handled");
        self.facade.take()
    }

    async fn command(&self, user_id: UserId, command: &str) -> Vec<OutboundMessage> {
        self.send(InboundEvent::command(user_id, command)).await
    }

    async fn text(&self, user_id: UserId, text: &str) -> Vec<OutboundMessage> {
        self.send(InboundEvent::free_text(user_id, text)).await
    }

    async fn press(&self, user_id: UserId, action: &NavAction) -> Vec<OutboundMessage> {
        self.send(InboundEvent::button_press(user_id, action.encode()))
            .await
    }

    async fn record_at(&self, user_id: UserId, now: NaiveDateTime, values: &str) {
        self.clock.set(now);
        let replies = self.text(user_id, values).await;
        assert_eq!(texts(&replies), vec![bot_replies::SAVED]);
    }
}

fn texts(messages: &[OutboundMessage]) -> Vec<&str> {
    messages.iter().map(OutboundMessage::text).collect()
}

fn single_menu(messages: &[OutboundMessage]) -> &Menu {
    match messages {
        [OutboundMessage::Menu { menu, .. }] => menu,
        other => panic!("expected a single menu, got {other:?}"),
    }
}

fn actions(menu: &Menu) -> Vec<NavAction> {
    menu.options().map(|option| option.action).collect()
}

#[tokio::test]
async fn integration_drill_down_reaches_sorted_day_listing() {
    let temp = tempdir().expect("tempdir");
    let bot = Bot::open(&temp.path().join("tonus.db"), at(2024, 3, 1, 8, 0));

    bot.record_at(ALICE, at(2024, 3, 1, 21, 15), "130 85 70").await;
    bot.record_at(ALICE, at(2024, 3, 1, 7, 45), "120 80 60").await;
    bot.record_at(ALICE, at(2024, 4, 2, 9, 0), "118 79 64").await;
    bot.record_at(ALICE, at(2023, 12, 31, 23, 59), "140 90 75").await;

    let root = bot.command(ALICE, "/get").await;
    let years = actions(single_menu(&root));
    assert!(years.contains(&NavAction::MonthList { year: 2023 }));
    assert!(years.contains(&NavAction::MonthList { year: 2024 }));
    assert!(years.contains(&NavAction::ShowAllGraph));

    let months = bot.press(ALICE, &NavAction::MonthList { year: 2024 }).await;
    let month_actions = actions(single_menu(&months));
    assert!(month_actions.contains(&NavAction::DayList {
        year: 2024,
        month: 3
    }));
    assert!(month_actions.contains(&NavAction::DayList {
        year: 2024,
        month: 4
    }));
    assert!(!month_actions.contains(&NavAction::DayList {
        year: 2024,
        month: 12
    }));

    let march_first = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
    let days = bot
        .press(
            ALICE,
            &NavAction::DayList {
                year: 2024,
                month: 3,
            },
        )
        .await;
    assert!(actions(single_menu(&days)).contains(&NavAction::LeafChoice { date: march_first }));

    let leaf = bot
        .press(ALICE, &NavAction::LeafChoice { date: march_first })
        .await;
    assert_eq!(
        actions(single_menu(&leaf)),
        vec![
            NavAction::ShowText { date: march_first },
            NavAction::ShowGraph { date: march_first }
        ]
    );

    let listing = bot
        .press(ALICE, &NavAction::ShowText { date: march_first })
        .await;
    assert_eq!(
        texts(&listing),
        vec![
            "Data saved on 01-03-2024:\n\
             Time: *07:45* | SBP: *120* | DBP: *80* | P: *60*\n\
             Time: *21:15* | SBP: *130* | DBP: *85* | P: *70*\n"
        ]
    );

    let summary = bot.press(ALICE, &NavAction::ShowAllGraph).await;
    match summary.as_slice() {
        [OutboundMessage::Image { png, caption, .. }] => {
            assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
            assert!(caption.contains("31-12-2023 to 02-04-2024"));
            assert!(caption.contains("(4 points)"));
        }
        other => panic!("expected one chart, got {other:?}"),
    }
}

#[tokio::test]
async fn integration_users_never_see_each_others_data() {
    let temp = tempdir().expect("tempdir");
    let bot = Bot::open(&temp.path().join("tonus.db"), at(2024, 3, 1, 8, 0));
    bot.record_at(ALICE, at(2024, 3, 1, 8, 0), "120 80 60").await;

    let empty = bot.command(BOB, "/graph").await;
    assert_eq!(texts(&empty), vec![bot_replies::NO_SAVED_DATA]);

    let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
    let foreign = bot.press(BOB, &NavAction::ShowText { date: day }).await;
    assert_eq!(texts(&foreign), vec![bot_replies::NO_DATA_FOR_SELECTION]);

    let cleared = bot.press(BOB, &NavAction::DeleteAllConfirmed).await;
    assert_eq!(texts(&cleared), vec![bot_replies::DATA_CLEARED]);
    let removed = bot.press(BOB, &NavAction::DeleteLast).await;
    assert_eq!(texts(&removed), vec![bot_replies::NO_SAVED_DATA]);
    assert_eq!(bot.store.count_readings(ALICE).await.expect("count"), 1);
}

#[tokio::test]
async fn integration_delete_flows_survive_reopen() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("tonus.db");
    {
        let bot = Bot::open(&db_path, at(2024, 3, 1, 8, 0));
        bot.record_at(ALICE, at(2024, 3, 2, 9, 0), "125 82 66").await;
        // Inserted last but dated earlier: "last" means most recently inserted.
        bot.record_at(ALICE, at(2024, 3, 1, 9, 0), "119 78 61").await;

        let removed = bot.press(ALICE, &NavAction::DeleteLast).await;
        assert_eq!(texts(&removed), vec![bot_replies::LAST_RECORD_REMOVED]);
    }

    let bot = Bot::open(&db_path, at(2024, 3, 3, 8, 0));
    let remaining = bot.store.all_readings(ALICE).await.expect("readings");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].systolic, 125);

    let menu = bot.command(ALICE, "/delete").await;
    assert_eq!(
        actions(single_menu(&menu)),
        vec![NavAction::DeleteConfirm, NavAction::DeleteLast]
    );
    let cancelled = bot.press(ALICE, &NavAction::DeleteAllCancelled).await;
    assert_eq!(texts(&cancelled), vec![bot_replies::DELETION_CANCELED]);
    assert_eq!(bot.store.count_readings(ALICE).await.expect("count"), 1);

    let cleared = bot.press(ALICE, &NavAction::DeleteAllConfirmed).await;
    assert_eq!(texts(&cleared), vec![bot_replies::DATA_CLEARED]);
    drop(bot);

    let reopened = Bot::open(&db_path, at(2024, 3, 3, 8, 0));
    assert_eq!(reopened.store.count_readings(ALICE).await.expect("count"), 0);
    let empty = reopened.command(ALICE, "/get").await;
    assert_eq!(texts(&empty), vec![bot_replies::NO_SAVED_DATA]);
}

#[tokio::test]
async fn integration_reminder_setup_persists_and_fires_once_per_day() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("tonus.db");
    {
        let bot = Bot::open(&db_path, at(2024, 3, 1, 6, 0));
        let status = bot.command(ALICE, "/notify").await;
        assert_eq!(status[0].text(), bot_replies::NOTIFICATION_OFF);

        let prompt = bot.press(ALICE, &NavAction::NotifyEnable).await;
        assert_eq!(texts(&prompt), vec![bot_replies::ENTER_TIME]);
        let rejected = bot.text(ALICE, "25:00").await;
        assert_eq!(texts(&rejected), vec![bot_replies::INCORRECT_TIME]);
        let accepted = bot.text(ALICE, "7:05").await;
        assert_eq!(texts(&accepted), vec!["Notifications enabled at: 07:05"]);
    }

    let bot = Bot::open(&db_path, at(2024, 3, 1, 7, 0));
    let preference = bot
        .store
        .get_preference(ALICE)
        .await
        .expect("load preference")
        .expect("preference exists");
    assert!(preference.enabled);
    assert_eq!(preference.time_of_day, NaiveTime::from_hms_opt(7, 5, 0));

    let mut scheduler = NotificationScheduler::new(bot.context());
    for minute in [4, 5, 5, 6] {
        scheduler
            .tick(at(2024, 3, 1, 7, minute))
            .await
            .expect("tick");
    }
    assert_eq!(texts(&bot.facade.take()), vec![bot_replies::REMINDER]);

    let next_day = at(2024, 3, 1, 7, 5) + Duration::days(1);
    scheduler.tick(next_day).await.expect("tick next day");
    assert_eq!(texts(&bot.facade.take()), vec![bot_replies::REMINDER]);

    let disabled = bot.press(ALICE, &NavAction::NotifyDisable).await;
    assert_eq!(texts(&disabled), vec![bot_replies::NOTIFICATION_DISABLED]);
    scheduler
        .tick(next_day + Duration::days(1))
        .await
        .expect("tick after disable");
    assert!(bot.facade.take().is_empty());
}
