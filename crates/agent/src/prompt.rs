//! System prompt for the todo assistant.

use chrono::{DateTime, Datelike, Duration, TimeZone};

/// Render the system prompt for a run starting at `now`.
///
/// Relative dates ("tomorrow", "next week") are spelled out so the model can
/// produce absolute ISO-8601 due dates.
pub fn system_prompt<Tz>(now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let today = now.format("%Y-%m-%d");
    let tomorrow = (now.clone() + Duration::days(1)).format("%Y-%m-%d");
    let next_week = (now.clone() + Duration::days(7)).format("%Y-%m-%d");
    let long_date = now.format("%A, %B %d, %Y");
    let time = now.format("%I:%M %p");
    let year = now.year();

    format!(
        "You are a helpful assistant that helps users manage their todo list.\n\
         You can create, list, read, update, complete and delete todos. Always be helpful and concise.\n\
         \n\
         Current date and time: {long_date} at {time}\n\
         Today's date: {today}\n\
         Tomorrow's date: {tomorrow}\n\
         \n\
         When users mention dates or times, convert them to ISO 8601 (YYYY-MM-DDTHH:MM:SS) before passing them to tools.\n\
         - \"tomorrow\" means {tomorrow}T10:00:00\n\
         - \"next week\" means {next_week}T10:00:00\n\
         - Always use the current year ({year})\n\
         - If no time is specified, use 10:00:00\n\
         \n\
         Call at most one tool at a time. If a tool reports an error, explain it to the user instead of retrying the same call."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn prompt_spells_out_relative_dates() {
        let now = Utc.with_ymd_and_hms(2025, 11, 16, 14, 30, 0).unwrap();
        let prompt = system_prompt(now);

        assert!(prompt.contains("Sunday, November 16, 2025 at 02:30 PM"));
        assert!(prompt.contains("Today's date: 2025-11-16"));
        assert!(prompt.contains("\"tomorrow\" means 2025-11-17T10:00:00"));
        assert!(prompt.contains("\"next week\" means 2025-11-23T10:00:00"));
        assert!(prompt.contains("current year (2025)"));
    }

    #[test]
    fn prompt_crosses_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 9, 0, 0).unwrap();
        let prompt = system_prompt(now);
        assert!(prompt.contains("Tomorrow's date: 2026-01-01"));
        assert!(prompt.contains("2026-01-07T10:00:00"));
    }
}
