/// Formats a millisecond offset as `H:MM:SS.mmm`, which is what ffmpeg accepts for `-ss`
/// and `-to`. The hours are not padded and are allowed to grow past 23.
pub fn millis_to_clock(ms: u64) -> String {
    let subsec = ms % 1000;
    let mut total = ms / 1000;

    let hours = total / 3600;
    total %= 3600;

    let minutes = total / 60;
    let seconds = total % 60;

    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, subsec)
}
