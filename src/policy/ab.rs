use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use super::blender::Blender;

pub const DEFAULT_POLICY: &str = "default";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbGroup {
    A,
    B,
}

impl AbGroup {
    pub fn policy_name(self) -> &'static str {
        match self {
            AbGroup::A => "variant_a",
            AbGroup::B => "variant_b",
        }
    }
}

/// `SHA-256(user_id)` read as a big-endian integer, modulo `buckets`.
pub fn hash_bucket(user_id: &str, buckets: u32) -> u32 {
    let buckets = u128::from(buckets.max(1));
    let digest = Sha256::digest(user_id.as_bytes());
    let mut remainder: u128 = 0;
    for byte in digest.iter() {
        remainder = (remainder * 256 + u128::from(*byte)) % buckets;
    }
    remainder as u32
}

pub fn ab_group(user_id: &str) -> AbGroup {
    if hash_bucket(user_id, 2) == 0 {
        AbGroup::A
    } else {
        AbGroup::B
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("read policy file failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("parse policy json failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse policy toml failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported policy file extension: {0}")]
    UnsupportedFormat(String),
}

/// Named persona weight tables, e.g. `variant_a = { serious = 0.8, playful = 0.2 }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySet {
    policies: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for PolicySet {
    fn default() -> Self {
        let table = |serious: f64, playful: f64| {
            BTreeMap::from([
                ("serious".to_string(), serious),
                ("playful".to_string(), playful),
            ])
        };
        Self {
            policies: BTreeMap::from([
                (DEFAULT_POLICY.to_string(), table(0.7, 0.3)),
                ("variant_a".to_string(), table(0.8, 0.2)),
                ("variant_b".to_string(), table(0.3, 0.7)),
            ]),
        }
    }
}

impl PolicySet {
    pub fn new(policies: BTreeMap<String, BTreeMap<String, f64>>) -> Self {
        Self { policies }
    }

    /// Loads JSON or TOML depending on the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => Ok(serde_json::from_str(&raw)?),
            "toml" => Ok(toml::from_str(&raw)?),
            other => Err(PolicyError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Falls back to `default`, then to an all-serious table.
    pub fn get_policy(&self, name: &str) -> Blender {
        let weights = self
            .policies
            .get(name)
            .filter(|weights| !weights.is_empty())
            .or_else(|| self.policies.get(DEFAULT_POLICY))
            .cloned()
            .unwrap_or_else(|| BTreeMap::from([("serious".to_string(), 1.0)]));
        let blender = Blender::new(weights);
        if blender.is_empty() {
            return Blender::new(BTreeMap::from([("serious".to_string(), 1.0)]));
        }
        blender
    }

    pub fn assign_ab(&self, user_id: &str) -> (AbGroup, Blender) {
        let group = ab_group(user_id);
        (group, self.get_policy(group.policy_name()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn bucket_matches_sha256_integer_modulo() {
        // sha256("abc") = ba7816bf...15ad, which is odd.
        assert_eq!(hash_bucket("abc", 2), 1);
        // sha256("") = e3b0c442...b855, which is odd.
        assert_eq!(hash_bucket("", 2), 1);
        assert_eq!(hash_bucket("anything", 1), 0);
        assert_eq!(hash_bucket("anything", 0), 0);
    }

    #[test]
    fn bucket_is_stable_and_in_range() {
        for id in ["alice", "bob", "ip:10.0.0.1", "client-42"] {
            let first = hash_bucket(id, 7);
            assert!(first < 7);
            assert_eq!(first, hash_bucket(id, 7));
        }
    }

    #[test]
    fn groups_map_to_variant_policies() {
        let policies = PolicySet::default();
        let (group, blender) = policies.assign_ab("abc");
        assert_eq!(group, AbGroup::B);
        assert_eq!(blender, policies.get_policy("variant_b"));
        assert_eq!(blender.choose(false), Some("playful"));
    }

    #[test]
    fn missing_policy_falls_back_to_default_then_serious() {
        let policies = PolicySet::default();
        assert_eq!(policies.get_policy("nope"), policies.get_policy(DEFAULT_POLICY));

        let empty = PolicySet::new(BTreeMap::new());
        assert_eq!(empty.get_policy("variant_a").choose(true), Some("serious"));
    }

    #[test]
    fn loads_json_and_toml_files() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("policies.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        write!(file, r#"{{"variant_a": {{"playful": 1.0}}}}"#).unwrap();
        let from_json = PolicySet::load(&json_path).unwrap();
        assert_eq!(from_json.get_policy("variant_a").choose(false), Some("playful"));

        let toml_path = dir.path().join("policies.toml");
        std::fs::write(&toml_path, "[variant_b]\nserious = 2.0\nplayful = 1.0\n").unwrap();
        let from_toml = PolicySet::load(&toml_path).unwrap();
        assert_eq!(from_toml.get_policy("variant_b").choose(false), Some("serious"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        std::fs::write(&path, "default: {}").unwrap();
        assert!(matches!(
            PolicySet::load(&path),
            Err(PolicyError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }
}
