//! Signature sets and quorum checks

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::Signature;

/// Signatures on one entity, keyed by signer
///
/// Insertion order does not matter and a user can appear at most once.
#[derive(Debug, Clone, Default)]
pub struct SignatureSet {
    signatures: BTreeMap<Uuid, DateTime<Utc>>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature. Returns false if the user had already signed,
    /// in which case the original timestamp is kept.
    pub fn sign(&mut self, user_id: Uuid, at: DateTime<Utc>) -> bool {
        if self.signatures.contains_key(&user_id) {
            return false;
        }
        self.signatures.insert(user_id, at);
        true
    }

    pub fn has_signed(&self, user_id: Uuid) -> bool {
        self.signatures.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Signatures ordered by signing time
    pub fn to_vec(&self) -> Vec<Signature> {
        let mut out: Vec<Signature> = self
            .signatures
            .iter()
            .map(|(user_id, signed_at)| Signature {
                user_id: *user_id,
                signed_at: *signed_at,
            })
            .collect();
        out.sort_by_key(|s| s.signed_at);
        out
    }
}

impl FromIterator<Signature> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = Signature>>(iter: I) -> Self {
        let mut set = SignatureSet::new();
        for sig in iter {
            set.sign(sig.user_id, sig.signed_at);
        }
        set
    }
}

impl From<&[Signature]> for SignatureSet {
    fn from(signatures: &[Signature]) -> Self {
        signatures.iter().cloned().collect()
    }
}

/// Outcome of checking a signature set against a required signer list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuorumStatus {
    pub required: usize,
    pub collected: usize,
    pub missing: Vec<Uuid>,
}

impl QuorumStatus {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check every required signer against the set. Extra signers are ignored.
pub fn check(signatures: &SignatureSet, required: &[Uuid]) -> QuorumStatus {
    let missing: Vec<Uuid> = required
        .iter()
        .filter(|id| !signatures.has_signed(**id))
        .copied()
        .collect();
    QuorumStatus {
        required: required.len(),
        collected: required.len() - missing.len(),
        missing,
    }
}

/// True iff every required id has signed
pub fn is_complete(signatures: &SignatureSet, required: &[Uuid]) -> bool {
    required.iter().all(|id| signatures.has_signed(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_empty_set_is_incomplete() {
        let required = ids(3);
        let set = SignatureSet::new();
        assert!(!is_complete(&set, &required));
        let status = check(&set, &required);
        assert_eq!(status.collected, 0);
        assert_eq!(status.missing, required);
    }

    #[test]
    fn test_complete_regardless_of_order() {
        let required = ids(3);
        let now = Utc::now();

        let mut forward = SignatureSet::new();
        for id in &required {
            forward.sign(*id, now);
        }
        let mut backward = SignatureSet::new();
        for id in required.iter().rev() {
            backward.sign(*id, now);
        }

        assert!(is_complete(&forward, &required));
        assert!(is_complete(&backward, &required));
    }

    #[test]
    fn test_extra_signatures_do_not_count() {
        let required = ids(3);
        let mut set = SignatureSet::new();
        set.sign(required[0], Utc::now());
        set.sign(required[1], Utc::now());
        for stranger in ids(5) {
            set.sign(stranger, Utc::now());
        }
        let status = check(&set, &required);
        assert!(!status.is_complete());
        assert_eq!(status.collected, 2);
        assert_eq!(status.missing, vec![required[2]]);
    }

    #[test]
    fn test_extra_signatures_do_not_block_completion() {
        let required = ids(4);
        let mut set = SignatureSet::new();
        set.sign(Uuid::new_v4(), Utc::now());
        for id in &required {
            set.sign(*id, Utc::now());
        }
        assert!(is_complete(&set, &required));
    }

    #[test]
    fn test_duplicate_signature_not_double_counted() {
        let required = ids(2);
        let first = Utc::now();
        let mut set = SignatureSet::new();

        assert!(set.sign(required[0], first));
        assert!(!set.sign(required[0], first + Duration::minutes(5)));
        assert_eq!(set.len(), 1);
        assert!(!is_complete(&set, &required));
        assert_eq!(set.to_vec()[0].signed_at, first);
    }

    #[test]
    fn test_empty_requirement_is_trivially_complete() {
        assert!(is_complete(&SignatureSet::new(), &[]));
    }

    #[test]
    fn test_from_signatures_dedupes() {
        let user = Uuid::new_v4();
        let now = Utc::now();
        let sigs = vec![
            Signature {
                user_id: user,
                signed_at: now,
            },
            Signature {
                user_id: user,
                signed_at: now + Duration::seconds(1),
            },
        ];
        let set = SignatureSet::from(sigs.as_slice());
        assert_eq!(set.len(), 1);
    }
}
