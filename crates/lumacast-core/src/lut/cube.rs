//! `.cube` (Adobe/Resolve 3D LUT) parsing and serialization.

use std::fmt::Write as _;

use super::{LutData, MAX_LUT_SIZE};
use crate::error::LutError;

/// Header keywords that carry no voxel data.
const METADATA_KEYWORDS: [&str; 4] = ["TITLE", "DOMAIN_MIN", "DOMAIN_MAX", "LUT_1D_SIZE"];

/// Parse `.cube` text into a [`LutData`].
///
/// Blank lines, `#` comments and metadata keywords are skipped. Float
/// triplets are read in file order into the buffer sized by `LUT_3D_SIZE`.
/// `name` is used when the file carries no `TITLE`.
pub fn parse_cube(name: &str, text: &str) -> Result<LutData, LutError> {
    let mut size: Option<u32> = None;
    let mut title: Option<String> = None;
    let mut data: Vec<f32> = Vec::new();
    let mut found = 0usize;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(first) = parts.next() else {
            continue;
        };

        if first == "LUT_3D_SIZE" {
            let value = parts.next().and_then(|v| v.parse::<u32>().ok());
            let Some(n) = value else {
                return Err(LutError::MalformedEntry {
                    line: line_no + 1,
                    text: line.to_string(),
                });
            };
            if !(2..=MAX_LUT_SIZE).contains(&n) {
                return Err(LutError::InvalidSize(n));
            }
            size = Some(n);
            data = vec![0.0; (n as usize).pow(3) * 3];
            continue;
        }
        if first == "TITLE" {
            title = Some(line["TITLE".len()..].trim().trim_matches('"').to_string());
            continue;
        }
        if METADATA_KEYWORDS.contains(&first) || first.starts_with("LUT_3D_INPUT_RANGE") {
            continue;
        }
        if first.starts_with(|c: char| c.is_ascii_alphabetic()) {
            tracing::debug!("skipping unknown .cube keyword `{first}`");
            continue;
        }

        let Some(n) = size else {
            return Err(LutError::MissingSize);
        };
        let triplet = parse_triplet(first, parts.next(), parts.next()).ok_or_else(|| {
            LutError::MalformedEntry {
                line: line_no + 1,
                text: line.to_string(),
            }
        })?;

        let expected = (n as usize).pow(3);
        if found >= expected {
            return Err(LutError::EntryCount {
                expected,
                found: found + 1,
            });
        }
        data[found * 3..found * 3 + 3].copy_from_slice(&triplet);
        found += 1;
    }

    let Some(size) = size else {
        return Err(LutError::MissingSize);
    };
    let expected = (size as usize).pow(3);
    if found != expected {
        return Err(LutError::EntryCount { expected, found });
    }

    Ok(LutData {
        name: title.unwrap_or_else(|| name.to_string()),
        size,
        data,
    })
}

fn parse_triplet(a: &str, b: Option<&str>, c: Option<&str>) -> Option<[f32; 3]> {
    Some([a.parse().ok()?, b?.parse().ok()?, c?.parse().ok()?])
}

impl LutData {
    /// Serialize to `.cube` text in the same voxel order [`parse_cube`] reads.
    pub fn to_cube(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 10 + 64);
        let _ = writeln!(out, "TITLE \"{}\"", self.name);
        let _ = writeln!(out, "LUT_3D_SIZE {}", self.size);
        for px in self.data.chunks_exact(3) {
            let _ = writeln!(out, "{:.6} {:.6} {:.6}", px[0], px[1], px[2]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::generate::{generate_identity, generate_teal_orange};

    #[test]
    fn test_teal_orange_cube_round_trip() {
        let lut = generate_teal_orange(9);
        let parsed = parse_cube("fallback", &lut.to_cube()).expect("round trip should parse");
        assert_eq!(parsed.size, 9);
        assert_eq!(parsed.name, "Teal & Orange");
        assert_eq!(parsed.data.len(), 9 * 9 * 9 * 3);
        for (i, (a, b)) in lut.data.iter().zip(parsed.data.iter()).enumerate() {
            assert!((a - b).abs() < 1e-5, "entry {i}: {a} vs {b}");
        }
    }

    #[test]
    fn test_identity_generation_and_parse_agree_on_order() {
        let text = "# comment\nLUT_3D_SIZE 2\n\
                    0 0 0\n1 0 0\n0 1 0\n1 1 0\n0 0 1\n1 0 1\n0 1 1\n1 1 1\n";
        let parsed = parse_cube("order", text).unwrap();
        assert_eq!(parsed.data, generate_identity(2).data);
    }

    #[test]
    fn test_metadata_lines_are_skipped() {
        let text = "TITLE \"Film\"\nDOMAIN_MIN 0 0 0\nDOMAIN_MAX 1 1 1\n\n\
                    LUT_3D_SIZE 2\n# note\n\
                    0 0 0\n1 0 0\n0 1 0\n1 1 0\n0 0 1\n1 0 1\n0 1 1\n1 1 1\n";
        let parsed = parse_cube("x", text).unwrap();
        assert_eq!(parsed.name, "Film");
        assert_eq!(parsed.size, 2);
    }

    #[test]
    fn test_missing_size_is_typed_error() {
        assert_eq!(parse_cube("x", "TITLE \"a\"\n"), Err(LutError::MissingSize));
        assert_eq!(parse_cube("x", "0 0 0\n"), Err(LutError::MissingSize));
    }

    #[test]
    fn test_short_file_reports_entry_count() {
        let err = parse_cube("x", "LUT_3D_SIZE 2\n0 0 0\n").unwrap_err();
        assert_eq!(err, LutError::EntryCount { expected: 8, found: 1 });
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_malformed_triplet_reports_line() {
        let err = parse_cube("x", "LUT_3D_SIZE 2\n0 0\n").unwrap_err();
        assert!(matches!(err, LutError::MalformedEntry { line: 2, .. }));
    }

    #[test]
    fn test_size_out_of_range() {
        assert_eq!(parse_cube("x", "LUT_3D_SIZE 1\n"), Err(LutError::InvalidSize(1)));
    }
}
