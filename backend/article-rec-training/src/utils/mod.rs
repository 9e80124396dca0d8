// Utility functions for article-rec-training

use std::ops::Range;
use std::time::{Duration, Instant};

/// Run `f` and return how long it took alongside its output.
pub fn timed<T, F>(f: F) -> (Duration, T)
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let output = f();
    (start.elapsed(), output)
}

/// Split `0..len` into consecutive ranges of at most `size` elements.
/// `size` must be at least 1.
pub fn chunk_ranges(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(move |start| start..(start + size).min(len))
}

/// Render a byte count with binary units, e.g. `176.0 MiB`
pub fn format_bytes(num_bytes: usize) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if num_bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = num_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges() {
        let chunks: Vec<_> = chunk_ranges(7, 3).collect();
        assert_eq!(chunks, vec![0..3, 3..6, 6..7]);

        let single: Vec<_> = chunk_ranges(4, 10).collect();
        assert_eq!(single, vec![0..4]);

        assert_eq!(chunk_ranges(0, 3).count(), 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(176 * 1024 * 1024), "176.0 MiB");
    }

    #[test]
    fn test_timed_returns_output() {
        let (elapsed, value) = timed(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(elapsed < Duration::from_secs(5));
    }
}
