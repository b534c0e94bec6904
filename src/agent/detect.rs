use crate::snapshot::SecretSnapshot;

/// Decide whether `current` must be published
///
/// The version alone is not trusted: content is compared even when the
/// versions match, because some stores reuse or omit version identifiers.
pub fn has_changed(previous: Option<&SecretSnapshot>, current: &SecretSnapshot) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if previous.version() != current.version() {
        return true;
    }

    !is_content_equal(previous, current)
}

/// Compare key sets and rendered values
fn is_content_equal(a: &SecretSnapshot, b: &SecretSnapshot) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.data().iter().all(|(key, value)| {
        b.data()
            .get(key)
            .map(|other| other.render() == value.render())
            .unwrap_or(false)
    })
}

/// Key-level summary of a change, without values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub version_changed: bool,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified{}",
            self.added,
            self.removed,
            self.modified,
            if self.version_changed { ", version bumped" } else { "" }
        )
    }
}

/// Summarize what differs between two snapshots
pub fn describe_change(previous: Option<&SecretSnapshot>, current: &SecretSnapshot) -> ChangeSummary {
    let Some(previous) = previous else {
        return ChangeSummary {
            version_changed: true,
            added: current.len(),
            ..Default::default()
        };
    };

    let old = previous.rendered();
    let new = current.rendered();

    let mut summary = ChangeSummary {
        version_changed: previous.version() != current.version(),
        ..Default::default()
    };

    for (key, value) in &new {
        match old.get(key) {
            None => summary.added += 1,
            Some(old_value) if old_value != value => summary.modified += 1,
            Some(_) => {}
        }
    }
    summary.removed = old.keys().filter(|k| !new.contains_key(*k)).count();

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SecretValue;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn snapshot(version: &str, pairs: &[(&str, &str)]) -> SecretSnapshot {
        SecretSnapshot::from_pairs(version, pairs.iter().copied())
    }

    #[test]
    fn first_fetch_is_always_a_change() {
        assert!(has_changed(None, &snapshot("1", &[("a", "1")])));
        assert!(has_changed(None, &snapshot("", &[])));
    }

    #[test]
    fn identical_snapshots_are_unchanged_regardless_of_order() {
        let previous = snapshot("7", &[("a", "1"), ("b", "2")]);
        let current = snapshot("7", &[("b", "2"), ("a", "1")]);
        assert!(!has_changed(Some(&previous), &current));
    }

    #[test]
    fn value_change_is_detected_with_equal_versions() {
        let previous = snapshot("7", &[("a", "1"), ("b", "2")]);
        let current = snapshot("7", &[("a", "1"), ("b", "3")]);
        assert!(has_changed(Some(&previous), &current));
    }

    #[test]
    fn version_change_alone_is_detected() {
        let previous = snapshot("7", &[("a", "1")]);
        let current = snapshot("8", &[("a", "1")]);
        assert!(has_changed(Some(&previous), &current));
    }

    #[test]
    fn added_or_removed_keys_are_detected() {
        let previous = snapshot("1", &[("a", "1")]);
        assert!(has_changed(Some(&previous), &snapshot("1", &[("a", "1"), ("b", "2")])));
        assert!(has_changed(Some(&previous), &snapshot("1", &[])));
    }

    #[test]
    fn same_key_count_with_different_keys_is_a_change() {
        let previous = snapshot("1", &[("a", "1")]);
        let current = snapshot("1", &[("b", "1")]);
        assert!(has_changed(Some(&previous), &current));
    }

    #[test]
    fn empty_snapshots_with_same_version_are_unchanged() {
        assert!(!has_changed(Some(&snapshot("", &[])), &snapshot("", &[])));
    }

    #[test]
    fn values_compare_by_rendered_string() {
        let mut numeric = BTreeMap::new();
        numeric.insert("port".to_string(), SecretValue::from_json(json!(5432)));
        let previous = SecretSnapshot::new("1", numeric);
        let current = snapshot("1", &[("port", "5432")]);

        assert!(!has_changed(Some(&previous), &current));
    }

    #[test]
    fn describe_change_counts_keys() {
        let previous = snapshot("1", &[("a", "1"), ("b", "2"), ("c", "3")]);
        let current = snapshot("2", &[("a", "1"), ("b", "20"), ("d", "4")]);

        let summary = describe_change(Some(&previous), &current);
        assert_eq!(
            summary,
            ChangeSummary {
                version_changed: true,
                added: 1,
                removed: 1,
                modified: 1,
            }
        );
    }

    #[test]
    fn describe_change_on_first_fetch_counts_everything_as_added() {
        let summary = describe_change(None, &snapshot("1", &[("a", "1"), ("b", "2")]));
        assert_eq!(summary.added, 2);
        assert!(summary.version_changed);
        assert_eq!(summary.to_string(), "2 added, 0 removed, 0 modified, version bumped");
    }
}
