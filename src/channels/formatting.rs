use crate::labels::Labels;
use crate::traits::Schedule;

/// Escape `<`, `>`, `&` for Telegram HTML.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Plain-text rendering of our own HTML: tags dropped, entities decoded.
pub(crate) fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// HTML listing of an owner's schedules, one block per schedule.
/// User-supplied text is escaped.
pub(crate) fn format_schedule_list(schedules: &[Schedule], labels: &Labels) -> String {
    let mut text = String::from("📅 <b>Your schedules</b>\n");
    for s in schedules {
        let days: Vec<&str> = s.days.iter().map(|&d| labels.weekday(d)).collect();
        text.push('\n');
        text.push_str(&format!("📌 <b>{}</b>\n", html_escape(&s.title)));
        text.push_str(&format!("⏰ Time: {}\n", s.time_of_day));
        text.push_str(&format!("📆 Days: {}\n", html_escape(&days.join(", "))));
        text.push_str(&format!("🔔 Type: {}\n", html_escape(labels.kind(s.kind))));
        if !s.note.is_empty() {
            text.push_str(&format!("📝 Note: {}\n", html_escape(&s.note)));
        }
    }
    text
}

/// Split a message into chunks of at most `max_len` bytes.
/// Prefers schedule (paragraph) boundaries, then line boundaries, and
/// never cuts through an HTML tag or a UTF-8 character.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let mut boundary = max_len;
        while boundary > 0 && !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let window = &remaining[..boundary];

        let split_at = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .unwrap_or(boundary);
        let split_at = outside_tag(window, split_at);

        // Always make progress, even for max_len smaller than one character.
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i)
        } else {
            split_at
        };

        let (chunk, rest) = remaining.split_at(split_at);
        let chunk = chunk.trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = rest.trim_start_matches('\n');
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Move `split_at` before an unterminated `<...` tag start.
fn outside_tag(text: &str, split_at: usize) -> usize {
    match text[..split_at].rfind(['<', '>']) {
        Some(i) if text.as_bytes()[i] == b'<' => i,
        _ => split_at,
    }
}

/// "1h, 30m, 5m"
pub(crate) fn describe_lead_times(lead_times: &[u32]) -> String {
    lead_times
        .iter()
        .map(|&m| {
            if m >= 60 && m % 60 == 0 {
                format!("{}h", m / 60)
            } else {
                format!("{}m", m)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn build_help_text(lead_times: &[u32]) -> String {
    format!(
        "🤖 Schedule Bot\n\
         \n\
         Commands:\n\
         /add - Add a new schedule\n\
         /list - Show your schedules\n\
         /edit - Change a schedule\n\
         /delete - Delete a schedule\n\
         /cancel - Stop the current step\n\
         /help - Show this message\n\
         \n\
         How it works:\n\
         1. Type /add\n\
         2. Follow the prompts (title, time, days, note, reminder type)\n\
         3. You get a reminder {} before each occurrence",
        describe_lead_times(lead_times)
    )
}
