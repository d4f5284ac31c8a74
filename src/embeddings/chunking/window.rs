use std::ops::Range;

/// Slides a window of `size` units over `units`, advancing by `size - overlap`.
///
/// Each unit is a `(start, end)` byte span; a window maps to the bytes from its
/// first unit's start to its last unit's end. The window stops once it covers
/// the final unit, so the last chunk may be shorter than `size`.
pub(super) fn sliding_window(
    units: &[(usize, usize)],
    size: usize,
    overlap: usize,
) -> Vec<Range<usize>> {
    let step = size.saturating_sub(overlap).max(1);
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < units.len() {
        let end = (start + size).min(units.len());
        let (first, last) = (units[start], units[end - 1]);
        if last.1 > first.0 {
            ranges.push(first.0..last.1);
        }
        if end == units.len() {
            break;
        }
        start += step;
    }

    ranges
}
