//! Path templates with `{name}` placeholders.
//!
//! A template and a concrete path are compared segment by segment. Literal
//! segments match exactly (case-sensitive); a placeholder matches any single
//! non-empty segment. Segment counts must be equal.

use super::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

impl Segment {
    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == value,
            Segment::Placeholder(_) => !value.is_empty(),
        }
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, Segment::Placeholder(_))
    }
}

/// A parsed, validated path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    placeholders: usize,
}

impl PathTemplate {
    /// Parse a template such as `/applications/{id}/assessments`.
    ///
    /// A single trailing slash is ignored. `/` is the template with no segments.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| TemplateError::MissingLeadingSlash(raw.to_string()))?;
        let body = body.strip_suffix('/').unwrap_or(body);

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('/') {
                segments.push(parse_segment(raw, part)?);
            }
        }

        let placeholders = segments.iter().filter(|s| s.is_placeholder()).count();

        Ok(Self {
            raw: raw.to_string(),
            segments,
            placeholders,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of placeholder segments. Fewer placeholders is more specific.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    /// Whether the template matches an already split concrete path.
    pub fn matches(&self, path: &[&str]) -> bool {
        self.segments.len() == path.len()
            && self.segments.iter().zip(path).all(|(s, p)| s.matches(p))
    }

    /// Whether some concrete path matches both templates.
    pub fn overlaps(&self, other: &PathTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| match (a, b) {
                    (Segment::Literal(x), Segment::Literal(y)) => x == y,
                    _ => true,
                })
    }

    /// Whether both templates describe exactly the same set of paths.
    pub fn same_shape(&self, other: &PathTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| match (a, b) {
                    (Segment::Literal(x), Segment::Literal(y)) => x == y,
                    (Segment::Placeholder(_), Segment::Placeholder(_)) => true,
                    _ => false,
                })
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_segment(template: &str, part: &str) -> Result<Segment, TemplateError> {
    if part.is_empty() {
        return Err(TemplateError::EmptySegment(template.to_string()));
    }

    if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        if !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Ok(Segment::Placeholder(name.to_string()));
        }
    } else if !part.contains(['{', '}']) {
        return Ok(Segment::Literal(part.to_string()));
    }

    Err(TemplateError::InvalidPlaceholder {
        template: template.to_string(),
        segment: part.to_string(),
    })
}

/// Normalise a concrete request path before matching.
///
/// Strips the query string and fragment, drops a trailing slash and prepends
/// `prefix` when the path is not already under it. Returns `None` for paths
/// that can never match a rule: empty or relative ones.
pub fn normalize_path(path: &str, prefix: Option<&str>) -> Option<String> {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];

    if path.is_empty() || !path.starts_with('/') {
        return None;
    }

    let path = if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };

    match prefix {
        Some(prefix) if !is_under(path, prefix) => {
            if path == "/" {
                Some(prefix.to_string())
            } else {
                Some(format!("{}{}", prefix, path))
            }
        }
        _ => Some(path.to_string()),
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Split a normalised path into its segments. `/` has none.
pub fn split_path(path: &str) -> Vec<&str> {
    match path.strip_prefix('/') {
        Some("") | None => Vec::new(),
        Some(rest) => rest.split('/').collect(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn template(raw: &str) -> PathTemplate {
        PathTemplate::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_counts_placeholders() {
        let t = template("/applications/{id}/assessments/{assessmentId}");
        assert_eq!(t.segment_count(), 4);
        assert_eq!(t.placeholder_count(), 2);
        assert_eq!(
            t.segments()[1],
            Segment::Placeholder("id".to_string())
        );
    }

    #[test]
    fn test_root_template_has_no_segments() {
        assert_eq!(template("/").segment_count(), 0);
    }

    #[rstest]
    #[case("applications", TemplateError::MissingLeadingSlash("applications".into()))]
    #[case("/a//b", TemplateError::EmptySegment("/a//b".into()))]
    #[case(
        "/a/{}/b",
        TemplateError::InvalidPlaceholder { template: "/a/{}/b".into(), segment: "{}".into() }
    )]
    #[case(
        "/a/x{id}",
        TemplateError::InvalidPlaceholder { template: "/a/x{id}".into(), segment: "x{id}".into() }
    )]
    #[case(
        "/a/{id",
        TemplateError::InvalidPlaceholder { template: "/a/{id".into(), segment: "{id".into() }
    )]
    fn test_parse_rejects_malformed(#[case] raw: &str, #[case] expected: TemplateError) {
        assert_eq!(PathTemplate::parse(raw).unwrap_err(), expected);
    }

    #[rstest]
    #[case("/applications/{id}", "/applications/42", true)]
    #[case("/applications/{id}", "/applications", false)]
    #[case("/applications/{id}", "/applications/42/assessments", false)]
    #[case("/applications/{id}", "/Applications/42", false)]
    #[case("/applications/list", "/applications/list", true)]
    #[case("/", "/", true)]
    fn test_matches(#[case] raw: &str, #[case] path: &str, #[case] expected: bool) {
        let normalized = normalize_path(path, None).unwrap();
        assert_eq!(template(raw).matches(&split_path(&normalized)), expected);
    }

    #[test]
    fn test_placeholder_does_not_match_empty_segment() {
        assert!(!template("/a/{id}/b").matches(&["a", "", "b"]));
    }

    #[test]
    fn test_overlap_and_shape() {
        let a = template("/a/{id}");
        let b = template("/{x}/b");
        let c = template("/a/{other}");
        let d = template("/c/{id}");

        assert!(a.overlaps(&b));
        assert!(!a.same_shape(&b));
        assert!(a.same_shape(&c));
        assert!(!a.overlaps(&d));
    }

    #[rstest]
    #[case("/applications/", None, Some("/applications"))]
    #[case("/applications?page=2", None, Some("/applications"))]
    #[case("/applications/7#top", None, Some("/applications/7"))]
    #[case("", None, None)]
    #[case("?x=1", None, None)]
    #[case("applications", None, None)]
    #[case("/", None, Some("/"))]
    #[case("/applications", Some("/api/v1"), Some("/api/v1/applications"))]
    #[case("/api/v1/applications", Some("/api/v1"), Some("/api/v1/applications"))]
    #[case("/api/v1", Some("/api/v1"), Some("/api/v1"))]
    #[case("/api/v10/x", Some("/api/v1"), Some("/api/v1/api/v10/x"))]
    #[case("/", Some("/api/v1"), Some("/api/v1"))]
    fn test_normalize_path(
        #[case] path: &str,
        #[case] prefix: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(normalize_path(path, prefix).as_deref(), expected);
    }
}
