use chrono::{DateTime, Utc};
use image::RgbaImage;

/// Wrap a rendered RGBA frame in a Slint image
pub fn rgba_to_slint_image(frame: &RgbaImage) -> slint::Image {
    let width = frame.width();
    let height = frame.height();

    // Create Slint image from the pixel buffer (RGBA format)
    let pixel_buffer =
        slint::SharedPixelBuffer::<slint::Rgba8Pixel>::clone_from_slice(frame.as_raw(), width, height);
    slint::Image::from_rgba8(pixel_buffer)
}

/// Human readable age of a timestamp, e.g. "5 minutes ago". Clock skew can
/// put a fresh timestamp slightly in the future; that reads as "just now".
pub fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 10 {
        return "just now".to_string();
    }
    if seconds < 60 {
        return format!("{} seconds ago", seconds);
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} minute{} ago", minutes, plural(minutes));
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} hour{} ago", hours, plural(hours));
    }
    let days = hours / 24;
    format!("{} day{} ago", days, plural(days))
}

/// Absolute UTC form used for the observation time line of the badge
pub fn format_absolute_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_relative_time_just_now() {
        assert_eq!(format_relative_time(at(12, 0, 0), at(12, 0, 5)), "just now");
        // Future timestamp from clock skew
        assert_eq!(format_relative_time(at(12, 0, 30), at(12, 0, 0)), "just now");
    }

    #[test]
    fn test_relative_time_seconds_and_minutes() {
        assert_eq!(format_relative_time(at(12, 0, 0), at(12, 0, 45)), "45 seconds ago");
        assert_eq!(format_relative_time(at(12, 0, 0), at(12, 1, 30)), "1 minute ago");
        assert_eq!(format_relative_time(at(12, 0, 0), at(12, 12, 0)), "12 minutes ago");
    }

    #[test]
    fn test_relative_time_hours_and_days() {
        assert_eq!(format_relative_time(at(8, 0, 0), at(12, 0, 0)), "4 hours ago");
        let two_days_before = Utc.with_ymd_and_hms(2025, 5, 30, 11, 0, 0).unwrap();
        assert_eq!(format_relative_time(two_days_before, at(12, 0, 0)), "2 days ago");
    }

    #[test]
    fn test_absolute_time_format() {
        assert_eq!(format_absolute_time(at(16, 42, 7)), "2025-06-01 16:42:07 UTC");
    }

    #[test]
    fn test_rgba_frame_converts_to_slint_image() {
        let frame = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        let img = rgba_to_slint_image(&frame);
        assert_eq!(img.size().width, 4);
        assert_eq!(img.size().height, 2);
    }
}
