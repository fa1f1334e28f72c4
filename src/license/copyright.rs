const MARKERS: [&str; 2] = ["copyright (c)", "copyright ©"];

/// Collect copyright statements, one per matching line, in file order.
///
/// A line matches when it contains `copyright (c)` or `copyright ©` in any
/// case; the returned statement starts at the marker. Duplicates are kept.
pub fn extract_copyright(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            // lowercasing can shift byte offsets outside ASCII
            if !line.is_ascii() {
                return find_marker_by_chars(line);
            }
            let lower = line.to_ascii_lowercase();
            MARKERS
                .iter()
                .find_map(|marker| lower.find(marker))
                .map(|idx| line[idx..].to_string())
        })
        .collect()
}

fn find_marker_by_chars(line: &str) -> Option<String> {
    let starts: Vec<usize> = line.char_indices().map(|(i, _)| i).collect();
    MARKERS.iter().find_map(|marker| {
        starts
            .iter()
            .find(|&&i| {
                line[i..]
                    .chars()
                    .flat_map(char::to_lowercase)
                    .take(marker.chars().count())
                    .eq(marker.chars())
            })
            .map(|&i| line[i..].to_string())
    })
}
