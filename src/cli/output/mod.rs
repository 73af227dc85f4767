use ansi_term::{Colour, Style};
use chrono::{Duration, Local};

use crate::{
    classification::aggregate::UsageStat, daemon::storage::entities::SessionEntity,
    utils::time::format_duration,
};

/// Share of `part` in `total` as a percentage. Zero when nothing was tracked.
pub fn share_percentage(part: Duration, total: Duration) -> f64 {
    let total = total.num_milliseconds();
    if total <= 0 {
        return 0.;
    }
    part.num_milliseconds() as f64 * 100. / total as f64
}

pub fn format_stat(stat: &UsageStat, total: Duration) -> String {
    format!(
        "{:>5.1}%\t{}\t{}\t{}",
        share_percentage(stat.duration, total),
        Colour::Green.paint(format_duration(stat.duration)),
        Style::new().bold().paint(&stat.title),
        Colour::Fixed(245).paint(&stat.key),
    )
}

pub fn format_session(session: &SessionEntity) -> String {
    let start = session.start_time.with_timezone(&Local);
    let mut line = format!(
        "{}\t{}\t{}\t{}",
        start.format("%x %H:%M:%S"),
        Colour::Green.paint(format_duration(session.duration)),
        session.app_name,
        session.title,
    );
    if let Some(url) = session.url() {
        line.push('\t');
        line.push_str(&Colour::Fixed(245).paint(url).to_string());
    }
    line
}

/// Prints aggregated statistics, `total` being all tracked time in the range.
pub fn print_stats(stats: &[UsageStat], total: Duration) {
    if stats.is_empty() {
        println!("Nothing was tracked in this range");
        return;
    }
    println!(
        "{}",
        Style::new()
            .bold()
            .paint(format!("Tracked {}", format_duration(total)))
    );
    for stat in stats {
        println!("{}", format_stat(stat, total));
    }
}

pub fn print_history(sessions: &[SessionEntity]) {
    if sessions.is_empty() {
        println!("Nothing was tracked in this range");
        return;
    }
    for session in sessions {
        println!("{}", format_session(session));
    }
}
