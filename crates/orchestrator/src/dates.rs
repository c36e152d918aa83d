//! Date grounding for queries and prompts.
//!
//! Backends grade and answer relative to a training cutoff, so every prompt
//! that cares about currency carries the actual date. These helpers rewrite
//! relative date words ("today", "this year") into absolute ones and bump
//! date phrases a model injected from its own stale calendar.
//!
//! All functions are pure in (input, clock): tests drive them with a
//! [`ManualClock`](chatforge_core::ManualClock).

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

use chatforge_core::Clock;

/// How many calendar years back a bare year reference is treated as a stale
/// cutoff artifact rather than a genuine historical question.
const STALE_YEAR_WINDOW: i32 = 3;

static TODAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btoday\b").unwrap());
static CURRENT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcurrent date\b").unwrap());
static CURRENT_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcurrent year\b").unwrap());
static THIS_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bthis year\b").unwrap());
static AS_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)as of\s+[A-Za-z]+\s+\d{1,2},\s+\d{4}").unwrap());
static STALE_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(in|for|during|of)\s+((?:19|20)\d{2})\b").unwrap());

/// The current UTC date in prose form, e.g. "August 29, 2026".
pub fn formatted_date(clock: &dyn Clock) -> String {
    let now = clock.now();
    format!("{} {}, {}", month_name(now.month()), now.day(), now.year())
}

/// The current UTC year.
pub fn current_year(clock: &dyn Clock) -> i32 {
    clock.now().year()
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

/// Replace relative date words with their absolute values.
pub fn substitute_today(query: &str, clock: &dyn Clock) -> String {
    let date = formatted_date(clock);
    let year = current_year(clock).to_string();

    let out = TODAY_RE.replace_all(query, date.as_str());
    let out = CURRENT_DATE_RE.replace_all(&out, date.as_str());
    let out = CURRENT_YEAR_RE.replace_all(&out, year.as_str());
    THIS_YEAR_RE.replace_all(&out, year.as_str()).into_owned()
}

/// Rewrite date phrases that a model injected from a stale calendar:
/// "as of <Month D, YYYY>" becomes the actual date, and a recent-but-past
/// year after "in"/"for"/"during"/"of" is bumped to the current year.
///
/// Years further back than [`STALE_YEAR_WINDOW`] are left alone; those are
/// historical questions, not cutoff artifacts.
pub fn override_date(query: &str, clock: &dyn Clock) -> String {
    let date = formatted_date(clock);
    let year = current_year(clock);

    let out = AS_OF_RE.replace_all(query, format!("as of {date}"));
    STALE_YEAR_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let referenced: i32 = caps[2].parse().unwrap_or(year);
            if referenced < year && referenced >= year - STALE_YEAR_WINDOW {
                format!("{} {year}", &caps[1])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// All date-related substitutions, in order.
pub fn process_query(query: &str, clock: &dyn Clock) -> String {
    override_date(&substitute_today(query, clock), clock)
}
