//! Data group hash verification against the SOD hash table.

use std::collections::{BTreeMap, HashMap};

use pkd_core::DigestAlgorithm;
use serde::Serialize;
use tracing::{debug, warn};

use crate::lds::MAX_DATA_GROUP;

/// Verdict for one data group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataGroupResult {
    pub data_group: u8,
    pub valid: bool,
    /// Hex digest from the SOD; empty when the SOD does not list the group
    pub expected_hash: String,
    /// Hex digest of the presented bytes
    pub actual_hash: String,
}

/// Per-group verdicts plus counts. `valid_groups + invalid_groups == total_groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataGroupValidation {
    /// Groups actually compared
    pub total_groups: usize,
    pub valid_groups: usize,
    pub invalid_groups: usize,
    pub hash_algorithm: DigestAlgorithm,
    pub details: BTreeMap<u8, DataGroupResult>,
    /// Listed in the SOD but not presented; excluded from the counts
    pub not_presented: Vec<u8>,
}

impl DataGroupValidation {
    pub fn all_valid(&self) -> bool {
        self.invalid_groups == 0
    }

    /// Numbers of the groups that failed, ascending.
    pub fn invalid(&self) -> Vec<u8> {
        self.details
            .values()
            .filter(|d| !d.valid)
            .map(|d| d.data_group)
            .collect()
    }
}

/// Stateless hash comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataGroupVerifier;

impl DataGroupVerifier {
    /// Compare every presented group against `hash_table`.
    ///
    /// A presented group the SOD does not list is invalid with an empty
    /// expected hash.
    pub fn verify(
        hash_table: &BTreeMap<u8, Vec<u8>>,
        presented: &HashMap<u8, Vec<u8>>,
        hash_algorithm: DigestAlgorithm,
    ) -> DataGroupValidation {
        let ordered: BTreeMap<u8, &Vec<u8>> = presented.iter().map(|(n, b)| (*n, b)).collect();

        let mut details = BTreeMap::new();
        for (number, bytes) in ordered {
            let actual = hash_algorithm.digest(bytes);
            let result = match hash_table.get(&number) {
                Some(expected) => DataGroupResult {
                    data_group: number,
                    valid: *expected == actual,
                    expected_hash: hex::encode(expected),
                    actual_hash: hex::encode(&actual),
                },
                None => {
                    warn!(data_group = number, "presented data group not covered by the SOD");
                    DataGroupResult {
                        data_group: number,
                        valid: false,
                        expected_hash: String::new(),
                        actual_hash: hex::encode(&actual),
                    }
                }
            };
            if !result.valid {
                debug!(data_group = number, expected = %result.expected_hash, actual = %result.actual_hash, "hash mismatch");
            }
            details.insert(number, result);
        }

        let not_presented = hash_table
            .keys()
            .filter(|n| !presented.contains_key(n))
            .copied()
            .collect();

        let valid_groups = details.values().filter(|d| d.valid).count();
        let total_groups = details.len();
        DataGroupValidation {
            total_groups,
            valid_groups,
            invalid_groups: total_groups - valid_groups,
            hash_algorithm,
            details,
            not_presented,
        }
    }
}

/// Parse `DG1`, `dg01` or `1` into a data group number in `1..=16`.
pub fn parse_data_group_key(key: &str) -> Option<u8> {
    let key = key.trim();
    let digits = match key.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("dg") => &key[2..],
        _ => key,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=MAX_DATA_GROUP).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALG: DigestAlgorithm = DigestAlgorithm::Sha256;

    fn table(groups: &[(u8, &[u8])]) -> BTreeMap<u8, Vec<u8>> {
        groups.iter().map(|(n, b)| (*n, ALG.digest(b))).collect()
    }

    fn presented(groups: &[(u8, &[u8])]) -> HashMap<u8, Vec<u8>> {
        groups.iter().map(|(n, b)| (*n, b.to_vec())).collect()
    }

    #[test]
    fn matching_groups_are_valid() {
        let groups: &[(u8, &[u8])] = &[(1, b"MRZ"), (2, b"FACE"), (3, b"FINGER")];
        let result = DataGroupVerifier::verify(&table(groups), &presented(groups), ALG);
        assert_eq!(result.total_groups, 3);
        assert_eq!(result.valid_groups, 3);
        assert!(result.all_valid());
        assert!(result.not_presented.is_empty());
        assert_eq!(result.details[&2].expected_hash, result.details[&2].actual_hash);
    }

    #[test]
    fn altered_group_is_the_only_invalid_one() {
        let signed: &[(u8, &[u8])] = &[(1, b"MRZ"), (2, b"FACE"), (3, b"FINGER")];
        let tampered: &[(u8, &[u8])] = &[(1, b"MRZ"), (2, b"FACF"), (3, b"FINGER")];
        let result = DataGroupVerifier::verify(&table(signed), &presented(tampered), ALG);
        assert_eq!(result.invalid_groups, 1);
        assert_eq!(result.invalid(), vec![2]);
        assert!(result.details[&1].valid && result.details[&3].valid);
    }

    #[test]
    fn unpresented_groups_are_not_counted() {
        let table = table(&[(1, b"MRZ"), (2, b"FACE"), (14, b"SEC")]);
        let result = DataGroupVerifier::verify(&table, &presented(&[(1, b"MRZ")]), ALG);
        assert_eq!(result.total_groups, 1);
        assert_eq!(result.invalid_groups, 0);
        assert_eq!(result.not_presented, vec![2, 14]);
    }

    #[test]
    fn unlisted_group_is_invalid_with_empty_expected() {
        let table = table(&[(1, b"MRZ")]);
        let result =
            DataGroupVerifier::verify(&table, &presented(&[(1, b"MRZ"), (11, b"EXTRA")]), ALG);
        assert_eq!(result.total_groups, 2);
        assert_eq!(result.invalid_groups, 1);
        assert!(result.details[&11].expected_hash.is_empty());
        assert!(!result.details[&11].actual_hash.is_empty());
    }

    #[test]
    fn nothing_presented_checks_nothing() {
        let result = DataGroupVerifier::verify(&table(&[(1, b"MRZ")]), &HashMap::new(), ALG);
        assert_eq!(result.total_groups, 0);
        assert_eq!(result.not_presented, vec![1]);
    }

    #[test]
    fn order_independent() {
        let signed: &[(u8, &[u8])] = &[(1, b"a"), (2, b"b"), (3, b"c"), (4, b"d")];
        let forward: &[(u8, &[u8])] = &[(1, b"a"), (2, b"x"), (3, b"c"), (4, b"y")];
        let backward: Vec<(u8, &[u8])> = forward.iter().rev().copied().collect();

        let a = DataGroupVerifier::verify(&table(signed), &presented(forward), ALG);
        let b = DataGroupVerifier::verify(&table(signed), &presented(&backward), ALG);
        assert_eq!(a, b);
        assert_eq!((a.valid_groups, a.invalid_groups), (2, 2));
    }

    #[test]
    fn uses_declared_algorithm() {
        let table: BTreeMap<u8, Vec<u8>> =
            [(1, DigestAlgorithm::Sha1.digest(b"MRZ"))].into_iter().collect();
        let ok = DataGroupVerifier::verify(&table, &presented(&[(1, b"MRZ")]), DigestAlgorithm::Sha1);
        assert!(ok.all_valid());
        let wrong = DataGroupVerifier::verify(&table, &presented(&[(1, b"MRZ")]), ALG);
        assert!(!wrong.all_valid());
    }

    #[test]
    fn data_group_keys() {
        assert_eq!(parse_data_group_key("DG1"), Some(1));
        assert_eq!(parse_data_group_key("dg01"), Some(1));
        assert_eq!(parse_data_group_key("Dg14"), Some(14));
        assert_eq!(parse_data_group_key("16"), Some(16));
        assert_eq!(parse_data_group_key(" 2 "), Some(2));
        assert_eq!(parse_data_group_key("DG0"), None);
        assert_eq!(parse_data_group_key("17"), None);
        assert_eq!(parse_data_group_key("DG"), None);
        assert_eq!(parse_data_group_key("DG-1"), None);
        assert_eq!(parse_data_group_key("EF.COM"), None);
    }
}
