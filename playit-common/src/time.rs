//! Playback time display

/// Format a playback position or duration as `M:SS`.
///
/// Minutes are not wrapped into hours, matching what a now-playing bar
/// shows. Zero and negative values render as `0:00`.
///
/// # Examples
///
/// ```
/// use playit_common::time::format_time;
///
/// assert_eq!(format_time(0), "0:00");
/// assert_eq!(format_time(61_000), "1:01");
/// assert_eq!(format_time(3_725_000), "62:05");
/// ```
pub fn format_time(milliseconds: i64) -> String {
    if milliseconds <= 0 {
        return "0:00".to_string();
    }

    let total_seconds = milliseconds / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}", minutes, seconds)
}
