//! Whole-segment path matching for `in_path` filters.

/// Matches paths that contain a value as whole `/`-delimited segments.
///
/// `prod` matches `prod/db` and `staging/prod` but not `production/db` or
/// `game-products/x`. A multi-segment value such as `prod/db` must appear as a
/// contiguous run of segments. A path equal to the raw value always matches.
#[derive(Debug, Clone)]
pub struct PathSegmentMatcher {
    raw: String,
    segments: Vec<String>,
}

impl PathSegmentMatcher {
    pub fn new(value: &str) -> Self {
        let segments = value
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            raw: value.to_string(),
            segments,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        if path == self.raw {
            return true;
        }
        match self.segments.as_slice() {
            [] => false,
            [single] => path.split('/').any(|segment| segment == single),
            many => {
                let parts: Vec<&str> = path.split('/').collect();
                parts
                    .windows(many.len())
                    .any(|window| window.iter().zip(many).all(|(part, want)| *part == want))
            }
        }
    }
}
