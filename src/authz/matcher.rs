//! Pre-indexed permission rules.
//!
//! Rules are bucketed by `(method, segment count)` and each bucket is sorted
//! by placeholder count, so the first template that matches a path is also
//! the most specific one. Templates that would tie are rejected when the
//! index is built.

use std::{collections::HashMap, sync::Arc};

use super::{
    RuleIndexError,
    template::{PathTemplate, split_path},
};
use crate::models::{HttpMethod, PermissionRule};

#[derive(Debug)]
struct IndexedRule {
    template: PathTemplate,
    rule: Arc<PermissionRule>,
}

/// Immutable lookup structure over a complete permission rule set.
#[derive(Debug, Default)]
pub struct RuleIndex {
    buckets: HashMap<(HttpMethod, usize), Vec<IndexedRule>>,
    len: usize,
}

impl RuleIndex {
    /// Build the index, validating every template and rejecting duplicate or
    /// ambiguous rules.
    pub fn build(rules: impl IntoIterator<Item = PermissionRule>) -> Result<Self, RuleIndexError> {
        let mut buckets: HashMap<(HttpMethod, usize), Vec<IndexedRule>> = HashMap::new();
        let mut len = 0;

        for rule in rules {
            let template = PathTemplate::parse(&rule.api_path)?;
            let bucket = buckets
                .entry((rule.method, template.segment_count()))
                .or_default();

            for existing in bucket.iter() {
                if existing.template.same_shape(&template) {
                    return Err(RuleIndexError::Duplicate {
                        method: rule.method,
                        template: rule.api_path.clone(),
                    });
                }
                if existing.template.placeholder_count() == template.placeholder_count()
                    && existing.template.overlaps(&template)
                {
                    return Err(RuleIndexError::Ambiguous {
                        method: rule.method,
                        first: existing.template.as_str().to_string(),
                        second: template.as_str().to_string(),
                    });
                }
            }

            bucket.push(IndexedRule {
                template,
                rule: Arc::new(rule),
            });
            len += 1;
        }

        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| {
                a.template
                    .placeholder_count()
                    .cmp(&b.template.placeholder_count())
                    .then_with(|| a.template.as_str().cmp(b.template.as_str()))
            });
        }

        tracing::debug!(rules = len, buckets = buckets.len(), "Built permission rule index");

        Ok(Self { buckets, len })
    }

    /// Find the most specific rule for a normalised path.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&Arc<PermissionRule>> {
        let segments = split_path(path);
        self.buckets
            .get(&(method, segments.len()))?
            .iter()
            .find(|entry| entry.template.matches(&segments))
            .map(|entry| &entry.rule)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn index(rules: Vec<PermissionRule>) -> RuleIndex {
        RuleIndex::build(rules).unwrap()
    }

    #[test]
    fn test_literal_beats_placeholder() {
        let idx = index(vec![
            PermissionRule::new("/applications/{id}", HttpMethod::Get).with_roles([4]),
            PermissionRule::new("/applications/list", HttpMethod::Get).with_roles([3]),
        ]);

        let rule = idx.find(HttpMethod::Get, "/applications/list").unwrap();
        assert_eq!(rule.api_path, "/applications/list");

        let rule = idx.find(HttpMethod::Get, "/applications/17").unwrap();
        assert_eq!(rule.api_path, "/applications/{id}");
    }

    #[test]
    fn test_fewer_placeholders_win_regardless_of_insertion_order() {
        let idx = index(vec![
            PermissionRule::new("/{a}/{b}/c", HttpMethod::Get),
            PermissionRule::new("/x/{b}/c", HttpMethod::Get),
        ]);
        let rule = idx.find(HttpMethod::Get, "/x/y/c").unwrap();
        assert_eq!(rule.api_path, "/x/{b}/c");
    }

    #[rstest]
    #[case(HttpMethod::Get, "/applications/9/assessments", None)]
    #[case(HttpMethod::Post, "/applications/9", None)]
    #[case(HttpMethod::Get, "/applications", Some("/applications"))]
    #[case(HttpMethod::Get, "/applications/9", Some("/applications/{id}"))]
    fn test_method_and_length_must_match(
        #[case] method: HttpMethod,
        #[case] path: &str,
        #[case] expected: Option<&str>,
    ) {
        let idx = index(vec![
            PermissionRule::new("/applications", HttpMethod::Get),
            PermissionRule::new("/applications/{id}", HttpMethod::Get),
        ]);
        assert_eq!(idx.find(method, path).map(|r| r.api_path.as_str()), expected);
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let err = RuleIndex::build(vec![
            PermissionRule::new("/applications", HttpMethod::Get),
            PermissionRule::new("/applications", HttpMethod::Get).with_roles([1]),
        ])
        .unwrap_err();
        assert!(matches!(err, RuleIndexError::Duplicate { method: HttpMethod::Get, .. }));
    }

    #[test]
    fn test_same_template_different_methods_allowed() {
        let idx = index(vec![
            PermissionRule::new("/applications", HttpMethod::Get),
            PermissionRule::new("/applications", HttpMethod::Post),
        ]);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_equal_specificity_overlap_rejected() {
        let err = RuleIndex::build(vec![
            PermissionRule::new("/a/{id}", HttpMethod::Get),
            PermissionRule::new("/{x}/b", HttpMethod::Get),
        ])
        .unwrap_err();
        assert!(matches!(err, RuleIndexError::Ambiguous { .. }));
    }

    #[test]
    fn test_renamed_placeholder_is_a_duplicate() {
        let err = RuleIndex::build(vec![
            PermissionRule::new("/a/{id}", HttpMethod::Get),
            PermissionRule::new("/a/{applicationId}/", HttpMethod::Get),
        ])
        .unwrap_err();
        assert!(matches!(err, RuleIndexError::Duplicate { .. }));
    }

    #[test]
    fn test_invalid_template_rejected() {
        let err = RuleIndex::build(vec![PermissionRule::new("no-slash", HttpMethod::Get)])
            .unwrap_err();
        assert!(matches!(err, RuleIndexError::Template(_)));
    }

    #[test]
    fn test_empty_index_matches_nothing() {
        let idx = RuleIndex::default();
        assert!(idx.is_empty());
        assert!(idx.find(HttpMethod::Get, "/").is_none());
    }
}
