use std::collections::VecDeque;
use std::ops::Range;

/// Recursive boundary splitting over byte ranges of `text`.
///
/// Pieces keep their separator at the end, so adjacent pieces are contiguous
/// and any run of them maps back to a single range of the source. Lengths are
/// measured in characters.
pub(super) fn split_recursive(
    text: &str,
    separators: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Range<usize>> {
    let splitter = RecursiveSplitter {
        text,
        chunk_size,
        chunk_overlap,
    };
    splitter.split(0..text.len(), separators)
}

struct RecursiveSplitter<'a> {
    text: &'a str,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter<'_> {
    fn slice(&self, range: &Range<usize>) -> &str {
        self.text.get(range.clone()).unwrap_or_default()
    }

    fn char_len(&self, range: &Range<usize>) -> usize {
        self.slice(range).chars().count()
    }

    fn split(&self, range: Range<usize>, separators: &[String]) -> Vec<Range<usize>> {
        let (separator, finer) = choose_separator(self.slice(&range), separators);

        let mut chunks = Vec::new();
        let mut pending = Vec::new();

        for piece in split_keeping_separator(self.slice(&range), separator, range.start) {
            if self.char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                // Nothing finer to split on: emit whole rather than truncate
                chunks.extend(self.trim(piece));
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily packs small pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = self.char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                chunks.extend(joined(&window).and_then(|range| self.trim(range)));

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let Some((_, dropped)) = window.pop_front() else {
                        break;
                    };
                    total -= dropped;
                }
            }

            window.push_back((piece.clone(), len));
            total += len;
        }

        chunks.extend(joined(&window).and_then(|range| self.trim(range)));
        chunks
    }

    fn trim(&self, range: Range<usize>) -> Option<Range<usize>> {
        let slice = self.slice(&range);
        let trimmed_start = slice.trim_start();
        if trimmed_start.is_empty() {
            return None;
        }
        let leading = slice.len() - trimmed_start.len();
        let trailing = trimmed_start.len() - trimmed_start.trim_end().len();
        Some(range.start + leading..range.end - trailing)
    }
}

fn joined(window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let first = window.front()?;
    let last = window.back()?;
    Some(first.0.start..last.0.end)
}

/// First separator present in `text`, plus the finer separators after it.
fn choose_separator<'s>(text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator.as_str()) {
            return (separator, &separators[index + 1..]);
        }
    }
    (separators.last().map_or("", String::as_str), &[])
}

fn split_keeping_separator(text: &str, separator: &str, base: usize) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        let end = index + separator.len();
        pieces.push(base + start..base + end);
        start = end;
    }
    if start < text.len() {
        pieces.push(base + start..base + text.len());
    }
    pieces
}
