use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tonus_core::FixedWallClock;
use tonus_navigation::{Menu, NavAction};
use tonus_store::{InMemoryReadingStore, NotificationPreference, ReadingStore};

use super::{BotCommand, BotContext, BotDispatcher};
use crate::bot_facade::{InboundEvent, OutboundMessage, RecordingBotFacade};
use crate::bot_replies;

const USER: i64 = 4242;

struct Harness {
    store: Arc<InMemoryReadingStore>,
    facade: Arc<RecordingBotFacade>,
    clock: Arc<FixedWallClock>,
    dispatcher: BotDispatcher,
}

fn at(day: u32, month: u32, year: i32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .expect("datetime")
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryReadingStore::new());
    let facade = Arc::new(RecordingBotFacade::new());
    let clock = Arc::new(FixedWallClock::new(at(1, 3, 2024, 8, 0)));
    let dispatcher = BotDispatcher::new(BotContext::new(
        store.clone(),
        facade.clone(),
        clock.clone(),
    ));
    Harness {
        store,
        facade,
        clock,
        dispatcher,
    }
}

impl Harness {
    async fn send(&self, event: InboundEvent) -> Vec<OutboundMessage> {
        self.dispatcher
            .handle_event(event)
            .await
            .expect("handle event");
        self.facade.take()
    }

    async fn text(&self, raw: &str) -> Vec<OutboundMessage> {
        self.send(InboundEvent::free_text(USER, raw)).await
    }

    async fn command(&self, raw: &str) -> Vec<OutboundMessage> {
        self.send(InboundEvent::command(USER, raw)).await
    }

    async fn press(&self, action: NavAction) -> Vec<OutboundMessage> {
        self.send(InboundEvent::button_press(USER, action.encode()))
            .await
    }

    async fn save_at(&self, when: NaiveDateTime, raw: &str) {
        self.clock.set(when);
        let replies = self.text(raw).await;
        assert_eq!(texts(&replies), vec![bot_replies::SAVED]);
    }
}

fn texts(messages: &[OutboundMessage]) -> Vec<&str> {
    messages.iter().map(OutboundMessage::text).collect()
}

fn only_menu(messages: &[OutboundMessage]) -> &Menu {
    match messages {
        [OutboundMessage::Menu { menu, .. }] => menu,
        other => panic!("expected a single menu, got {other:?}"),
    }
}

#[test]
fn unit_command_parse_strips_bot_suffix_and_arguments() {
    assert_eq!(BotCommand::parse("/get"), Some(BotCommand::Get));
    assert_eq!(BotCommand::parse("/Graph@tonus_bot"), Some(BotCommand::Graph));
    assert_eq!(BotCommand::parse("  /notify now"), Some(BotCommand::Notify));
    assert_eq!(
        BotCommand::parse("/weather"),
        Some(BotCommand::Unknown("weather".to_string()))
    );
    assert_eq!(BotCommand::parse("120 80 60"), None);
}

#[tokio::test]
async fn functional_start_creates_disabled_preference_and_sends_keyboard() {
    let h = harness();
    let replies = h.command("/start").await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].text(), bot_replies::HELP_TEXT);
    assert!(matches!(
        &replies[1],
        OutboundMessage::CommandKeyboard { commands, .. } if commands.len() == 4
    ));
    assert_eq!(
        h.store.get_preference(USER).await.expect("preference"),
        Some(NotificationPreference::disabled())
    );
}

#[tokio::test]
async fn functional_free_text_ingest_reports_each_validation_kind() {
    let h = harness();
    h.save_at(at(1, 3, 2024, 8, 0), "150 95 70").await;
    assert_eq!(
        texts(&h.text("301 80 60").await),
        vec!["Incorrect values. \nPlease, try again."]
    );
    assert_eq!(
        texts(&h.text("a b c").await),
        vec!["Invalid input. \nPlease enter numeric values."]
    );
    assert!(texts(&h.text("120 80").await)[0].starts_with("Please enter 3 values"));
    assert_eq!(h.store.count_readings(USER).await.expect("count"), 1);
}

#[tokio::test]
async fn integration_get_drills_down_to_day_text() {
    let h = harness();
    h.save_at(at(1, 3, 2024, 8, 0), "120 80 60").await;
    h.save_at(at(15, 3, 2024, 21, 30), "130 85 70").await;
    h.save_at(at(2, 4, 2024, 7, 45), "125 82 66").await;

    let root = h.command("/get").await;
    let years = only_menu(&root);
    assert_eq!(years.prompt, "Select year:");

    let months = h.press(NavAction::MonthList { year: 2024 }).await;
    let labels = only_menu(&months)
        .options()
        .filter(|option| matches!(option.action, NavAction::DayList { .. }))
        .map(|option| option.label.clone())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["03", "04"]);

    let days = h
        .press(NavAction::DayList {
            year: 2024,
            month: 3,
        })
        .await;
    let day = NaiveDate::from_ymd_opt(2024, 3, 15).expect("date");
    assert!(only_menu(&days)
        .options()
        .any(|option| option.action == NavAction::LeafChoice { date: day }));

    let listing = h.press(NavAction::ShowText { date: day }).await;
    assert_eq!(
        texts(&listing),
        vec!["Data saved on 15-03-2024:\nTime: *21:30* | SBP: *130* | DBP: *85* | P: *70*\n"]
    );
}

#[tokio::test]
async fn functional_graph_leaves_send_png_images() {
    let h = harness();
    h.save_at(at(1, 3, 2024, 8, 0), "120 80 60").await;
    h.save_at(at(1, 3, 2024, 20, 0), "135 88 71").await;

    for action in [
        NavAction::ShowGraph {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
        },
        NavAction::ShowMonthGraph {
            year: 2024,
            month: 3,
        },
        NavAction::ShowYearGraph { year: 2024 },
        NavAction::ShowAllGraph,
    ] {
        let replies = h.press(action).await;
        match replies.as_slice() {
            [OutboundMessage::Image { png, caption, .. }] => {
                assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
                assert!(caption.starts_with("Arterial Pressure"));
            }
            other => panic!("expected an image for {action:?}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn functional_empty_user_gets_no_data_from_every_entry_point() {
    let h = harness();
    for command in ["/get", "/graph"] {
        assert_eq!(texts(&h.command(command).await), vec![bot_replies::NO_SAVED_DATA]);
    }
    assert_eq!(
        texts(&h.press(NavAction::ShowAllGraph).await),
        vec![bot_replies::NO_SAVED_DATA]
    );
    assert_eq!(
        texts(&h.press(NavAction::MonthList { year: 2024 }).await),
        vec![bot_replies::NO_DATA_FOR_SELECTION]
    );
    assert_eq!(
        texts(&h.command("/delete").await),
        vec![bot_replies::NO_SAVED_DATA]
    );
}

#[tokio::test]
async fn regression_malformed_button_token_is_answered_not_raised() {
    let h = harness();
    for token in ["", "month_text_03-2024", "days|2024|13", "leaf|2023|02|29"] {
        let replies = h.send(InboundEvent::button_press(USER, token)).await;
        assert_eq!(texts(&replies), vec![bot_replies::NO_DATA_FOR_SELECTION]);
    }
}

#[tokio::test]
async fn functional_delete_flows_confirm_cancel_and_remove_last() {
    let h = harness();
    h.save_at(at(1, 3, 2024, 8, 0), "120 80 60").await;
    h.save_at(at(2, 3, 2024, 8, 0), "121 81 61").await;

    let menu = h.command("/delete").await;
    assert_eq!(only_menu(&menu).prompt, "Delete all information or last record?");

    assert_eq!(
        texts(&h.press(NavAction::DeleteLast).await),
        vec![bot_replies::LAST_RECORD_REMOVED]
    );
    let remaining = h.store.all_readings(USER).await.expect("readings");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].systolic, 120);

    let confirm = h.press(NavAction::DeleteConfirm).await;
    assert!(only_menu(&confirm).prompt.starts_with("Are you sure?"));
    assert_eq!(
        texts(&h.press(NavAction::DeleteAllCancelled).await),
        vec![bot_replies::DELETION_CANCELED]
    );
    assert_eq!(h.store.count_readings(USER).await.expect("count"), 1);
    assert_eq!(
        texts(&h.press(NavAction::DeleteAllConfirmed).await),
        vec![bot_replies::DATA_CLEARED]
    );
    assert_eq!(h.store.count_readings(USER).await.expect("count"), 0);
    assert_eq!(
        texts(&h.press(NavAction::DeleteLast).await),
        vec![bot_replies::NO_SAVED_DATA]
    );
}

#[tokio::test]
async fn functional_notify_enable_then_time_input_sets_preference() {
    let h = harness();
    let replies = h.command("/notify").await;
    assert_eq!(replies[0].text(), bot_replies::NOTIFICATION_OFF);
    assert_eq!(replies[1].text(), "Enable or disable notifications:");

    assert_eq!(
        texts(&h.press(NavAction::NotifyEnable).await),
        vec![bot_replies::ENTER_TIME]
    );
    assert!(h.dispatcher.is_awaiting_time(USER));
    assert_eq!(
        texts(&h.text("25:99").await),
        vec![bot_replies::INCORRECT_TIME]
    );
    assert!(h.dispatcher.is_awaiting_time(USER));
    assert_eq!(
        texts(&h.text("8:05").await),
        vec!["Notifications enabled at: 08:05"]
    );
    assert!(!h.dispatcher.is_awaiting_time(USER));
    assert_eq!(
        h.store.get_preference(USER).await.expect("preference"),
        Some(NotificationPreference {
            time_of_day: NaiveTime::from_hms_opt(8, 5, 0),
            enabled: true,
        })
    );

    let status = h.command("/notify").await;
    assert_eq!(status[0].text(), "Notification is enabled at: 08:05");
}

#[tokio::test]
async fn regression_command_cancels_pending_time_input() {
    let h = harness();
    h.press(NavAction::NotifyEnable).await;
    assert!(h.dispatcher.is_awaiting_time(USER));

    h.command("/get").await;
    assert!(!h.dispatcher.is_awaiting_time(USER));

    h.clock.advance(Duration::minutes(3));
    assert_eq!(texts(&h.text("120 80 60").await), vec![bot_replies::SAVED]);
    assert_eq!(
        texts(&h.text("08:30").await),
        vec!["Please enter 3 values separated by spaces. \nSystolic | Diastolic | Pulse. \nExample: \"120 80 60\""]
    );
}

#[tokio::test]
async fn regression_disable_is_idempotent_and_clears_pending_time() {
    let h = harness();
    h.press(NavAction::NotifyEnable).await;
    h.press(NavAction::NotifyDisable).await;
    let once = h.store.get_preference(USER).await.expect("once");
    assert_eq!(
        texts(&h.press(NavAction::NotifyDisable).await),
        vec![bot_replies::NOTIFICATION_DISABLED]
    );
    let twice = h.store.get_preference(USER).await.expect("twice");
    assert_eq!(once, twice);
    assert_eq!(once, Some(NotificationPreference::disabled()));
    assert!(!h.dispatcher.is_awaiting_time(USER));
}

#[tokio::test]
async fn regression_transport_failure_is_returned_to_caller() {
    let store = Arc::new(InMemoryReadingStore::new());
    let dispatcher = BotDispatcher::new(BotContext::new(
        store,
        Arc::new(RecordingBotFacade::failing()),
        Arc::new(FixedWallClock::new(at(1, 3, 2024, 8, 0))),
    ));
    let error = dispatcher
        .handle_event(InboundEvent::command(USER, "/help"))
        .await
        .expect_err("send failure must surface");
    assert!(error.to_string().contains("fail sends"));
}
