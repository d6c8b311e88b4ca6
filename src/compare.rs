//! Expansion of declarative comparison groups into ordered sample pairs

use std::collections::HashSet;
use std::fmt;

/// Which samples a comparison group pits against each other
///
/// The shape is resolved once, when the settings are loaded; by the time a
/// group reaches the expander a cross group is guaranteed to have exactly two
/// sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// Compare every unordered pair of distinct members.
    Flat(Vec<String>),
    /// Compare every member of the left side against every member of the right.
    Cross(Vec<String>, Vec<String>),
}

/// One ordered comparison between two samples
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplePair {
    pub first: String,
    pub second: String,
}

impl SamplePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Label used in job names, file names and disambiguated column names
    pub fn label(&self) -> String {
        format!("{}_vs_{}", self.first, self.second)
    }

    /// Orientation-insensitive key, used to suppress duplicates within a group
    fn unordered_key(&self) -> (&str, &str) {
        if self.first <= self.second {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        }
    }
}

impl fmt::Display for SamplePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_vs_{}", self.first, self.second)
    }
}

/// Expand a single group into its ordered list of sample pairs
///
/// Output is deterministic for identical input. Deduplication is scoped to the
/// group: the same unordered pair is never emitted twice from one group, but
/// two different groups may well emit overlapping pairs.
pub fn expand_group(spec: &GroupSpec) -> Vec<SamplePair> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut pairs = Vec::new();

    match spec {
        GroupSpec::Cross(left, right) => {
            for l in left {
                for r in right {
                    let pair = SamplePair::new(l, r);
                    let (a, b) = pair.unordered_key();
                    if !seen.insert((a.to_string(), b.to_string())) {
                        continue;
                    }
                    pairs.push(pair);
                }
            }
        }
        GroupSpec::Flat(members) => {
            for (i, a) in members.iter().enumerate() {
                for b in members.iter().skip(i + 1) {
                    if a == b {
                        continue;
                    }
                    let pair = SamplePair::new(a, b);
                    let (x, y) = pair.unordered_key();
                    if !seen.insert((x.to_string(), y.to_string())) {
                        continue;
                    }
                    pairs.push(pair);
                }
            }
        }
    }

    pairs
}

/// Expand every group, keeping the group index alongside its pairs
pub fn expand_groups(specs: &[GroupSpec]) -> Vec<(usize, Vec<SamplePair>)> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| (index, expand_group(spec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[SamplePair]) -> Vec<String> {
        pairs.iter().map(|p| p.label()).collect()
    }

    #[test]
    fn test_flat_group_all_unordered_pairs() {
        let spec = GroupSpec::Flat(vec!["A".into(), "B".into(), "C".into(), "D".into()]);
        let pairs = expand_group(&spec);

        // n * (n - 1) / 2 pairs for n members
        assert_eq!(pairs.len(), 6);
        assert_eq!(
            labels(&pairs),
            vec!["A_vs_B", "A_vs_C", "A_vs_D", "B_vs_C", "B_vs_D", "C_vs_D"]
        );
    }

    #[test]
    fn test_flat_group_no_self_pairs() {
        let spec = GroupSpec::Flat(vec!["A".into(), "B".into()]);
        let pairs = expand_group(&spec);
        assert!(pairs.iter().all(|p| p.first != p.second));
    }

    #[test]
    fn test_flat_group_duplicate_member_emitted_once() {
        let spec = GroupSpec::Flat(vec!["A".into(), "B".into(), "A".into()]);
        let pairs = expand_group(&spec);
        assert_eq!(labels(&pairs), vec!["A_vs_B"]);
    }

    #[test]
    fn test_cross_group_full_product() {
        let spec = GroupSpec::Cross(
            vec!["A".into(), "B".into()],
            vec!["X".into(), "Y".into()],
        );
        let pairs = expand_group(&spec);
        assert_eq!(
            labels(&pairs),
            vec!["A_vs_X", "A_vs_Y", "B_vs_X", "B_vs_Y"]
        );
    }

    #[test]
    fn test_cross_group_overlapping_sides_deduplicated() {
        // {A, B} x {A, Y}: (A, A) survives as a single entry, and (B, A)
        // is not suppressed by (A, B) having never been emitted.
        let spec = GroupSpec::Cross(
            vec!["A".into(), "B".into()],
            vec!["A".into(), "Y".into()],
        );
        let pairs = expand_group(&spec);
        assert_eq!(
            labels(&pairs),
            vec!["A_vs_A", "A_vs_Y", "B_vs_A", "B_vs_Y"]
        );
    }

    #[test]
    fn test_cross_group_unordered_duplicate_suppressed() {
        // (B, A) after (A, B) is the same unordered comparison
        let spec = GroupSpec::Cross(
            vec!["A".into(), "B".into()],
            vec!["B".into(), "A".into()],
        );
        let pairs = expand_group(&spec);
        assert_eq!(labels(&pairs), vec!["A_vs_B", "A_vs_A", "B_vs_B"]);
    }

    #[test]
    fn test_expansion_is_stable() {
        let specs = vec![
            GroupSpec::Flat(vec!["A".into(), "B".into(), "C".into()]),
            GroupSpec::Cross(vec!["A".into()], vec!["X".into(), "Y".into()]),
        ];
        let first = expand_groups(&specs);
        let second = expand_groups(&specs);
        assert_eq!(first, second);
        assert_eq!(first[0].0, 0);
        assert_eq!(first[1].0, 1);
    }

    #[test]
    fn test_groups_expand_independently() {
        // The same pair may come out of two different groups
        let specs = vec![
            GroupSpec::Flat(vec!["A".into(), "B".into()]),
            GroupSpec::Cross(vec!["A".into()], vec!["B".into()]),
        ];
        let expanded = expand_groups(&specs);
        assert_eq!(labels(&expanded[0].1), vec!["A_vs_B"]);
        assert_eq!(labels(&expanded[1].1), vec!["A_vs_B"]);
    }
}
