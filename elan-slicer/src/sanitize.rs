/// Characters that can't be part of a folder name on some platform
const FORBIDDEN: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Most filesystems refuse longer file names
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Turns an annotation label into a folder name: lower-cased, with path separators and
/// other troublesome characters replaced by `-`. Different labels may end up the same,
/// they then share a folder. Long labels are cut to [`MAX_SEGMENT_BYTES`] on a char
/// boundary. A label of only dots would point to `.` or `..`, so those dots are replaced
/// as well.
pub fn sanitize(label: &str) -> String {
    let mut cleaned: String = label
        .to_lowercase()
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '-' } else { c })
        .collect();
    cleaned.truncate(floor_char_boundary(&cleaned, MAX_SEGMENT_BYTES));

    if cleaned == "." || cleaned == ".." {
        cleaned.replace('.', "-")
    } else {
        cleaned
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}
