//! Button labels and the parsers that map user input back to domain values.
//!
//! Domain code only sees `Weekday`, `ReminderKind` and `EditField`; which
//! strings appear on the buttons is decided by the active `Labels` table.
//! Parsing always accepts the canonical English keywords as well, so typed
//! input keeps working whichever locale renders the menus.

use serde::Deserialize;

use crate::conversation::EditField;
use crate::types::{Keyboard, ReminderKind, Weekday};

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Id,
}

#[derive(Debug)]
pub struct Labels {
    /// Indexed Monday-first.
    pub weekdays: [&'static str; 7],
    pub cancel: &'static str,
    pub finish_days: &'static str,
    pub no_note: &'static str,
    pub once: &'static str,
    pub recurring: &'static str,
    pub field_title: &'static str,
    pub field_time: &'static str,
    pub field_days: &'static str,
    pub field_note: &'static str,
    pub keep_editing: &'static str,
    pub done_editing: &'static str,
}

static ENGLISH: Labels = Labels {
    weekdays: [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ],
    cancel: "❌ Cancel",
    finish_days: "🔄 Finish selecting",
    no_note: "No note",
    once: "🔔 Once",
    recurring: "🔊 Recurring",
    field_title: "1️⃣ Title",
    field_time: "2️⃣ Time",
    field_days: "3️⃣ Days",
    field_note: "4️⃣ Note",
    keep_editing: "✏️ Keep editing",
    done_editing: "✅ Done",
};

static INDONESIAN: Labels = Labels {
    weekdays: [
        "Senin (Monday)",
        "Selasa (Tuesday)",
        "Rabu (Wednesday)",
        "Kamis (Thursday)",
        "Jumat (Friday)",
        "Sabtu (Saturday)",
        "Minggu (Sunday)",
    ],
    cancel: "❌ Batal",
    finish_days: "🔄 Selesai Pilih",
    no_note: "Tidak ada catatan",
    once: "🔔 Sekali",
    recurring: "🔊 Berkali-kali",
    field_title: "1️⃣ Title",
    field_time: "2️⃣ Waktu",
    field_days: "3️⃣ Hari",
    field_note: "4️⃣ Catatan",
    keep_editing: "✏️ Lanjut Edit",
    done_editing: "✅ Selesai",
};

/// Case-insensitive, whitespace-tolerant comparison.
fn same(input: &str, label: &str) -> bool {
    input.trim().to_lowercase() == label.trim().to_lowercase()
}

fn any_of(input: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|c| same(input, c))
}

impl Labels {
    pub fn for_locale(locale: Locale) -> &'static Labels {
        match locale {
            Locale::En => &ENGLISH,
            Locale::Id => &INDONESIAN,
        }
    }

    pub fn weekday(&self, day: Weekday) -> &'static str {
        self.weekdays[day.days_from_monday() as usize]
    }

    pub fn kind(&self, kind: ReminderKind) -> &'static str {
        match kind {
            ReminderKind::Once => self.once,
            ReminderKind::Recurring => self.recurring,
        }
    }

    /// One weekday, by button label or English name.
    pub fn parse_weekday(&self, input: &str) -> Option<Weekday> {
        Weekday::ALL
            .into_iter()
            .find(|&d| same(input, self.weekday(d)))
            .or_else(|| Weekday::from_name(input))
    }

    /// A comma-separated list of weekdays. `None` if any entry is unknown
    /// or the list is empty; duplicates collapse.
    pub fn parse_weekday_list(&self, input: &str) -> Option<Vec<Weekday>> {
        let mut days = Vec::new();
        for part in input.split(',') {
            let day = self.parse_weekday(part)?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        (!days.is_empty()).then_some(days)
    }

    pub fn is_cancel(&self, input: &str) -> bool {
        any_of(input, &[self.cancel, "cancel", "/cancel"])
    }

    pub fn is_finish_days(&self, input: &str) -> bool {
        any_of(input, &[self.finish_days, "finish", "done"])
    }

    /// Input that clears the note.
    pub fn is_no_note(&self, input: &str) -> bool {
        any_of(input, &[self.no_note, "-"])
    }

    pub fn parse_kind(&self, input: &str) -> Option<ReminderKind> {
        if any_of(input, &[self.once, "once"]) {
            Some(ReminderKind::Once)
        } else if any_of(input, &[self.recurring, "recurring"]) {
            Some(ReminderKind::Recurring)
        } else {
            None
        }
    }

    pub fn parse_edit_field(&self, input: &str) -> Option<EditField> {
        if any_of(input, &[self.field_title, "1", "title"]) {
            Some(EditField::Title)
        } else if any_of(input, &[self.field_time, "2", "time"]) {
            Some(EditField::Time)
        } else if any_of(input, &[self.field_days, "3", "days"]) {
            Some(EditField::Days)
        } else if any_of(input, &[self.field_note, "4", "note"]) {
            Some(EditField::Note)
        } else {
            None
        }
    }

    /// `Some(true)` to keep editing, `Some(false)` when done.
    pub fn parse_continue(&self, input: &str) -> Option<bool> {
        if any_of(input, &[self.keep_editing, "continue"]) {
            Some(true)
        } else if any_of(input, &[self.done_editing, "done"]) {
            Some(false)
        } else {
            None
        }
    }

    pub fn field(&self, field: EditField) -> &'static str {
        match field {
            EditField::Title => self.field_title,
            EditField::Time => self.field_time,
            EditField::Days => self.field_days,
            EditField::Note => self.field_note,
        }
    }

    // Keyboards

    pub fn cancel_keyboard(&self) -> Keyboard {
        vec![vec![self.cancel.to_string()]]
    }

    /// Whole hours; any other `HH:MM` can be typed.
    pub fn time_keyboard(&self) -> Keyboard {
        let hours: Vec<String> = (0..24).map(|h| format!("{:02}:00", h)).collect();
        let mut rows: Keyboard = hours.chunks(5).map(|c| c.to_vec()).collect();
        rows.push(vec![self.cancel.to_string()]);
        rows
    }

    pub fn days_keyboard(&self) -> Keyboard {
        let label = |d: Weekday| self.weekday(d).to_string();
        vec![
            vec![
                label(Weekday::Monday),
                label(Weekday::Tuesday),
                label(Weekday::Wednesday),
            ],
            vec![label(Weekday::Thursday), label(Weekday::Friday)],
            vec![label(Weekday::Saturday), label(Weekday::Sunday)],
            vec![self.finish_days.to_string(), self.cancel.to_string()],
        ]
    }

    /// Day buttons without the finish button (single-message edit).
    pub fn day_list_keyboard(&self) -> Keyboard {
        let mut rows = self.days_keyboard();
        rows.pop();
        rows.push(vec![self.cancel.to_string()]);
        rows
    }

    pub fn note_keyboard(&self) -> Keyboard {
        vec![
            vec![self.no_note.to_string()],
            vec![self.cancel.to_string()],
        ]
    }

    pub fn kind_keyboard(&self) -> Keyboard {
        vec![
            vec![self.once.to_string(), self.recurring.to_string()],
            vec![self.cancel.to_string()],
        ]
    }

    pub fn field_keyboard(&self) -> Keyboard {
        vec![
            vec![
                self.field(EditField::Title).to_string(),
                self.field(EditField::Time).to_string(),
            ],
            vec![
                self.field(EditField::Days).to_string(),
                self.field(EditField::Note).to_string(),
            ],
            vec![self.cancel.to_string()],
        ]
    }

    pub fn continue_keyboard(&self) -> Keyboard {
        vec![vec![
            self.keep_editing.to_string(),
            self.done_editing.to_string(),
        ]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_accepts_label_and_english_name() {
        let id = Labels::for_locale(Locale::Id);
        assert_eq!(id.parse_weekday("Senin (Monday)"), Some(Weekday::Monday));
        assert_eq!(id.parse_weekday("monday"), Some(Weekday::Monday));
        assert_eq!(id.parse_weekday("Funday"), None);
        let en = Labels::for_locale(Locale::En);
        assert_eq!(en.parse_weekday("  Sunday "), Some(Weekday::Sunday));
    }

    #[test]
    fn weekday_list_collapses_duplicates_and_rejects_unknown() {
        let en = Labels::for_locale(Locale::En);
        assert_eq!(
            en.parse_weekday_list("Monday, friday,Monday"),
            Some(vec![Weekday::Monday, Weekday::Friday])
        );
        assert_eq!(en.parse_weekday_list("Monday, Someday"), None);
        assert_eq!(en.parse_weekday_list(""), None);
    }

    #[test]
    fn keywords_work_in_every_locale() {
        for locale in [Locale::En, Locale::Id] {
            let l = Labels::for_locale(locale);
            assert!(l.is_cancel("cancel"));
            assert!(l.is_cancel(l.cancel));
            assert!(l.is_finish_days("finish"));
            assert!(l.is_no_note("-"));
            assert!(l.is_no_note(l.no_note));
            assert_eq!(l.parse_kind("once"), Some(ReminderKind::Once));
            assert_eq!(l.parse_kind(l.recurring), Some(ReminderKind::Recurring));
            assert_eq!(l.parse_kind("sometimes"), None);
            assert_eq!(l.parse_edit_field("3"), Some(EditField::Days));
            assert_eq!(l.parse_edit_field(l.field_note), Some(EditField::Note));
            assert_eq!(l.parse_continue(l.keep_editing), Some(true));
            assert_eq!(l.parse_continue(l.done_editing), Some(false));
        }
    }

    #[test]
    fn indonesian_labels_match_legacy_buttons() {
        let id = Labels::for_locale(Locale::Id);
        assert!(id.is_cancel("❌ Batal"));
        assert!(id.is_finish_days("🔄 Selesai Pilih"));
        assert_eq!(id.parse_kind("🔔 Sekali"), Some(ReminderKind::Once));
        assert_eq!(id.parse_kind("🔊 Berkali-kali"), Some(ReminderKind::Recurring));
    }

    #[test]
    fn time_keyboard_lists_every_hour() {
        let rows = Labels::for_locale(Locale::En).time_keyboard();
        let buttons: Vec<&String> = rows.iter().flatten().collect();
        assert_eq!(buttons.len(), 25);
        assert_eq!(buttons[0], "00:00");
        assert_eq!(buttons[23], "23:00");
    }
}
