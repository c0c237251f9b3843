//! Timestamp labels and date grouping for the chat views.
//!
//! Every formatter has an `_at` variant taking an explicit "now" so the
//! calendar tiers can be exercised deterministically; the plain variants
//! use the local clock.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::fmt::Display;

use crate::model::Message;

/// A run of consecutive messages sharing one calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup<'a> {
    pub date: NaiveDate,
    pub label: String,
    pub messages: Vec<&'a Message>,
}

#[derive(Clone, Copy)]
enum WeekdayStyle {
    Full,
    Short,
}

/// Label shown inside a message bubble
pub fn format_message_time(timestamp: i64) -> String {
    format_message_time_at(timestamp, &Local::now())
}

/// Label shown next to a conversation in the list
pub fn format_conversation_time(timestamp: i64) -> String {
    format_conversation_time_at(timestamp, &Local::now())
}

pub fn format_message_time_at<Tz>(timestamp: i64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format_tiered(timestamp, now, WeekdayStyle::Full)
}

pub fn format_conversation_time_at<Tz>(timestamp: i64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format_tiered(timestamp, now, WeekdayStyle::Short)
}

fn format_tiered<Tz>(timestamp: i64, now: &DateTime<Tz>, weekday: WeekdayStyle) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let date = to_zoned(timestamp, now);

    if date.date_naive() == now.date_naive() {
        return date.format("%H:%M").to_string();
    }

    if is_yesterday(date.date_naive(), now) {
        return "Yesterday".to_string();
    }

    if now.clone().signed_duration_since(date.clone()) < Duration::days(7) {
        let pattern = match weekday {
            WeekdayStyle::Full => "%A",
            WeekdayStyle::Short => "%a",
        };
        return date.format(pattern).to_string();
    }

    date.format("%d/%m/%y").to_string()
}

/// Split `messages` into groups of consecutive same-day messages, in input order
pub fn group_messages_by_date(messages: &[Message]) -> Vec<DateGroup<'_>> {
    group_messages_by_date_at(messages, &Local::now())
}

pub fn group_messages_by_date_at<'a, Tz>(
    messages: &'a [Message],
    now: &DateTime<Tz>,
) -> Vec<DateGroup<'a>>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut groups: Vec<DateGroup<'a>> = Vec::new();

    for message in messages {
        let date = to_zoned(message.timestamp, now);
        let key = date.date_naive();

        match groups.last_mut() {
            Some(current) if current.date == key => current.messages.push(message),
            _ => groups.push(DateGroup {
                date: key,
                label: date_label(&date, now),
                messages: vec![message],
            }),
        }
    }

    groups
}

fn date_label<Tz>(date: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if date.date_naive() == now.date_naive() {
        return "Today".to_string();
    }
    if is_yesterday(date.date_naive(), now) {
        return "Yesterday".to_string();
    }
    date.format("%A, %B %-d, %Y").to_string()
}

fn is_yesterday<Tz: TimeZone>(day: NaiveDate, now: &DateTime<Tz>) -> bool {
    now.date_naive().pred_opt() == Some(day)
}

fn to_zoned<Tz: TimeZone>(timestamp: i64, now: &DateTime<Tz>) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .with_timezone(&now.timezone())
}
