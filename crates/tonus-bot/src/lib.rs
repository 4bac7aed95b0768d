//! Blood-pressure diary bot logic, independent of any chat transport.
//!
//! Wires the reading store, navigation state machine and ingest validator
//! behind [`BotDispatcher`], renders charts, and runs the daily reminder
//! scheduler. Transports plug in through [`BotFacade`].

pub mod bot_facade;
pub mod bot_replies;
pub mod chart_render;
pub mod dispatcher;
pub mod ingest_validator;
pub mod notification_scheduler;

pub use bot_facade::{
    BotFacade, InboundEvent, InboundKind, OutboundMessage, RecordingBotFacade, COMMAND_KEYBOARD,
};
pub use chart_render::{render_chart, ChartError, ChartImage, ChartPoint};
pub use dispatcher::{parse_reminder_time, BotCommand, BotContext, BotDispatcher, TimeInputError};
pub use ingest_validator::{
    parse_vital_triplet, validate_reading, ValidationError, ValidationErrorKind, VitalTriplet,
    READING_VALUE_MAX, READING_VALUE_MIN,
};
pub use notification_scheduler::{
    inspect_notification_scheduler, next_tick_delay, start_notification_scheduler,
    NotificationScheduler, NotificationSchedulerConfig, NotificationSchedulerHandle,
    NotificationSchedulerSnapshot, SchedulerTickReport,
};
