//! Column extraction for fixed-width records.
//!
//! Ranges are zero-based, end-exclusive and counted in characters. Names in
//! legacy cases carry accented characters, so byte offsets cannot be used.

use std::ops::Range;

/// Outcome of decoding one numeric column.
///
/// Every variant carries the value the record builder should use; callers
/// that care about the difference (diagnostics) match on the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<T> {
    Parsed(T),
    /// Column empty, missing from a short line, or a lone `.`.
    Blank(T),
    /// Text present but not a number; holds the default.
    Malformed(T),
}

impl<T: Copy> Field<T> {
    pub fn value(&self) -> T {
        match *self {
            Field::Parsed(v) | Field::Blank(v) | Field::Malformed(v) => v,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Field::Malformed(_))
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Field::Parsed(_))
    }
}

/// Text of the given character range, or `""` past the end of the line.
pub fn column(line: &str, range: Range<usize>) -> &str {
    if range.end <= range.start {
        return "";
    }
    let mut indices = line.char_indices().map(|(i, _)| i).chain([line.len()]);
    let Some(start) = indices.nth(range.start) else {
        return "";
    };
    let end = indices
        .nth(range.end - range.start - 1)
        .unwrap_or(line.len());
    &line[start..end]
}

/// Trimmed text of a column.
pub fn text(line: &str, range: Range<usize>) -> &str {
    column(line, range).trim()
}

pub fn decode_f64(line: &str, range: Range<usize>, default: f64) -> Field<f64> {
    let raw = text(line, range);
    if raw.is_empty() || raw == "." {
        return Field::Blank(default);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Field::Parsed(v),
        _ => Field::Malformed(default),
    }
}

pub fn decode_int(line: &str, range: Range<usize>, default: i64) -> Field<i64> {
    let raw = text(line, range);
    if raw.is_empty() {
        return Field::Blank(default);
    }
    match raw.parse::<i64>() {
        Ok(v) => Field::Parsed(v),
        Err(_) => Field::Malformed(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_counts_characters() {
        let line = "  12 0  SÃO JOÃO    1000";
        assert_eq!(text(line, 0..5), "12");
        assert_eq!(text(line, 8..20), "SÃO JOÃO");
        assert_eq!(text(line, 20..24), "1000");
    }

    #[test]
    fn column_past_end_is_empty() {
        assert_eq!(column("abc", 5..9), "");
        assert_eq!(column("abcdef", 4..9), "ef");
        assert_eq!(column("abc", 1..1), "");
    }

    #[test]
    fn decode_leading_dot_forms() {
        assert_eq!(decode_f64("  .5", 0..4, 0.0), Field::Parsed(0.5));
        assert_eq!(decode_f64(" -.5", 0..4, 0.0), Field::Parsed(-0.5));
        assert_eq!(decode_f64("   .", 0..4, 9.0), Field::Blank(9.0));
        assert_eq!(decode_f64("    ", 0..4, 9.0), Field::Blank(9.0));
    }

    #[test]
    fn malformed_numeric_takes_default() {
        let f = decode_f64("1,02", 0..4, 1.0);
        assert!(f.is_malformed());
        assert_eq!(f.value(), 1.0);
        assert_eq!(decode_f64(" NaN", 0..4, 0.0), Field::Malformed(0.0));
    }

    #[test]
    fn int_decoding() {
        assert_eq!(decode_int("   42", 0..5, 0), Field::Parsed(42));
        assert_eq!(decode_int("   L1", 0..5, 0), Field::Malformed(0));
        assert_eq!(decode_int("", 0..5, 7), Field::Blank(7));
    }
}
