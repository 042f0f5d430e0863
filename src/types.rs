use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque per-user identifier. For Telegram this is the private chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Day of the week. Serialized by English name ("Monday") so persisted files
/// stay readable and compatible with the legacy JSON layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }

    /// Case-insensitive match on the English name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }

    /// 0 = Monday .. 6 = Sunday.
    pub fn days_from_monday(self) -> u32 {
        match self {
            Weekday::Monday => 0,
            Weekday::Tuesday => 1,
            Weekday::Wednesday => 2,
            Weekday::Thursday => 3,
            Weekday::Friday => 4,
            Weekday::Saturday => 5,
            Weekday::Sunday => 6,
        }
    }

    pub fn from_days_from_monday(n: u32) -> Self {
        Self::ALL[(n % 7) as usize]
    }

    /// Day-of-week field for 5-field cron expressions (Sunday = 0).
    pub fn cron_index(self) -> u32 {
        (self.days_from_monday() + 1) % 7
    }
}

impl From<Weekday> for chrono::Weekday {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wall-clock time, `00:00`..=`23:59`. Persisted as the `HH:MM` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTime(pub String);

impl fmt::Display for InvalidTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time '{}', expected HH:MM", self.0)
    }
}

impl std::error::Error for InvalidTime {}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    #[cfg(test)]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[cfg(test)]
    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn minute_of_day(self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTime;

    /// Two colon-separated, two-digit fields, range checked.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTime;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Whether each lead-time reminder fires once ever, or every week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Once,
    Recurring,
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderKind::Once => f.write_str("once"),
            ReminderKind::Recurring => f.write_str("recurring"),
        }
    }
}

/// Button rows for a reply keyboard.
pub type Keyboard = Vec<Vec<String>>;

/// What to do with the interactive menu under the chat input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// Leave whatever menu is currently shown.
    Keep,
    /// Remove the menu.
    Remove,
    /// Replace the menu with these buttons.
    Keyboard(Keyboard),
}

/// A message to be sent through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub markup: ReplyMarkup,
    /// Interpret `text` as Telegram HTML.
    pub html: bool,
}

impl OutgoingMessage {
    /// Plain text that also clears any menu.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Remove,
            html: false,
        }
    }

    /// Plain text that leaves the current menu in place (used for corrections).
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Keep,
            html: false,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Keyboard(keyboard),
            html: false,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Remove,
            html: true,
        }
    }
}
