//! Glob matching for permission scopes.
//!
//! Patterns are compared segment by segment (split on `/`):
//! - `*` as a whole segment matches exactly one non-empty segment
//! - `*` inside a segment (`*.json`) matches any run of characters in that segment
//! - `**` as a whole segment matches zero or more whole segments
//!
//! Matching is anchored and case-sensitive. A single trailing slash is ignored
//! on both sides, so `/data/` and `/data` are the same path.

use thiserror::Error;

/// Upper bound on segments per pattern or path.
///
/// Keeps the matcher's O(pattern × path) table small for hostile inputs.
pub const MAX_SEGMENTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("empty path")]
    EmptyPath,
    #[error("too many segments: {count} (max {max})")]
    TooManySegments { count: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// `**`
    AnyDepth,
    /// `*`
    One,
    /// Literal, possibly with `*` inside.
    Text(&'a str),
}

/// Match `path` against `pattern`, rejecting invalid input.
pub fn try_match_path(pattern: &str, path: &str) -> Result<bool, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::EmptyPattern);
    }
    if path.is_empty() {
        return Err(PatternError::EmptyPath);
    }

    let pattern_segments = compile(pattern)?;
    let path_segments = split(path)?;

    Ok(match_segments(&pattern_segments, &path_segments))
}

/// Match `path` against `pattern`.
///
/// Invalid input (empty pattern or path, oversized input) never matches.
pub fn match_path(pattern: &str, path: &str) -> bool {
    match try_match_path(pattern, path) {
        Ok(matched) => matched,
        Err(err) => {
            tracing::debug!(error = %err, pattern, path, "rejected glob input");
            false
        }
    }
}

/// Reject a path that no pattern could ever be matched against.
pub fn validate_path(path: &str) -> Result<(), PatternError> {
    if path.is_empty() {
        return Err(PatternError::EmptyPath);
    }
    split(path).map(|_| ())
}

fn split(raw: &str) -> Result<Vec<&str>, PatternError> {
    let trimmed = if raw.len() > 1 {
        raw.strip_suffix('/').unwrap_or(raw)
    } else {
        raw
    };

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() > MAX_SEGMENTS {
        return Err(PatternError::TooManySegments {
            count: segments.len(),
            max: MAX_SEGMENTS,
        });
    }
    Ok(segments)
}

fn compile(pattern: &str) -> Result<Vec<Segment<'_>>, PatternError> {
    let mut out: Vec<Segment<'_>> = Vec::new();
    for raw in split(pattern)? {
        let segment = match raw {
            "**" => Segment::AnyDepth,
            "*" => Segment::One,
            text => Segment::Text(text),
        };
        // `**/**` is the same as `**`
        if segment == Segment::AnyDepth && out.last() == Some(&Segment::AnyDepth) {
            continue;
        }
        out.push(segment);
    }
    Ok(out)
}

/// Table-driven match: `reachable[j]` is true when the pattern consumed so far
/// can end exactly before path segment `j`.
fn match_segments(pattern: &[Segment<'_>], path: &[&str]) -> bool {
    let mut reachable = vec![false; path.len() + 1];
    reachable[0] = true;

    for segment in pattern {
        let mut next = vec![false; path.len() + 1];
        match segment {
            Segment::AnyDepth => {
                let mut seen = false;
                for j in 0..=path.len() {
                    seen |= reachable[j];
                    next[j] = seen;
                }
            }
            Segment::One => {
                for j in 0..path.len() {
                    next[j + 1] = reachable[j] && !path[j].is_empty();
                }
            }
            Segment::Text(text) => {
                for j in 0..path.len() {
                    next[j + 1] = reachable[j] && segment_matches(text, path[j]);
                }
            }
        }
        if !next.iter().any(|r| *r) {
            return false;
        }
        reachable = next;
    }

    reachable[path.len()]
}

/// Single-segment wildcard match (`*` = any run of characters).
///
/// Linear two-pointer scan that only ever backtracks to the last `*`.
fn segment_matches(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_star_is_one_segment() {
        assert!(match_path("/data/*", "/data/a"));
        assert!(!match_path("/data/*", "/data/a/b"));
        assert!(!match_path("/data/*", "/data"));
    }

    #[test]
    fn test_double_star_matches_any_depth_including_parent() {
        assert!(match_path("/data/**", "/data/a/b"));
        assert!(match_path("/data/**", "/data/a"));
        assert!(match_path("/data/**", "/data"));
        assert!(match_path("/data/**", "/data/"));
        assert!(!match_path("/data/**", "/database"));
        assert!(!match_path("/data/**", "/other/data"));
    }

    #[test]
    fn test_root_double_star_matches_everything() {
        assert!(match_path("/**", "/"));
        assert!(match_path("/**", "/a"));
        assert!(match_path("/**", "/a/b/c.txt"));
        assert!(!match_path("/*", "/"));
    }

    #[test]
    fn test_double_star_in_the_middle() {
        assert!(match_path("/data/**/x.json", "/data/x.json"));
        assert!(match_path("/data/**/x.json", "/data/a/b/x.json"));
        assert!(!match_path("/data/**/x.json", "/data/a/b/y.json"));
    }

    #[test]
    fn test_literal_match_trims_one_trailing_slash() {
        assert!(match_path("/data/reports", "/data/reports"));
        assert!(match_path("/data/reports/", "/data/reports"));
        assert!(match_path("/data/reports", "/data/reports/"));
        assert!(!match_path("/data/reports", "/data/reports//"));
        assert!(!match_path("/data/reports", "/data/report"));
    }

    #[test]
    fn test_case_sensitive_and_anchored() {
        assert!(!match_path("/Data/**", "/data/a"));
        assert!(!match_path("/data", "/data/a"));
        assert!(!match_path("data/**", "/data/a"));
    }

    #[test]
    fn test_intra_segment_wildcard() {
        assert!(match_path("/data/*.json", "/data/x.json"));
        assert!(!match_path("/data/*.json", "/data/x.yaml"));
        assert!(!match_path("/data/*.json", "/data/a/x.json"));
        assert!(match_path("/logs/app-*-*.log", "/logs/app-2024-01.log"));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert_eq!(try_match_path("", "/a"), Err(PatternError::EmptyPattern));
        assert_eq!(try_match_path("/a", ""), Err(PatternError::EmptyPath));
        assert!(!match_path("", ""));
    }

    #[test]
    fn test_segment_limit() {
        let deep = "/a".repeat(MAX_SEGMENTS + 1);
        assert!(matches!(
            try_match_path("/**", &deep),
            Err(PatternError::TooManySegments { .. })
        ));
    }

    #[test]
    fn test_adversarial_double_star_pattern_terminates() {
        let pattern = format!("{}/z", "/**/a".repeat(100));
        let path = "/a".repeat(150);
        assert!(!match_path(&pattern, &path));

        let hit = format!("{}/z", "/a".repeat(150));
        assert!(match_path(&pattern, &hit));
    }
}
