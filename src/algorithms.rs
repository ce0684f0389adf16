use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use russh::{cipher, kex, mac, Preferred};
use serde::{Deserialize, Serialize};

/// Negotiation slot in the SSH handshake.
///
/// Serialized names match what saved profiles use, so configs written by
/// older builds keep loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlgorithmCategory {
    #[serde(rename = "kex")]
    Kex,
    #[serde(rename = "serverHostKey")]
    HostKey,
    #[serde(rename = "cipher")]
    Cipher,
    #[serde(rename = "hmac")]
    Hmac,
}

impl AlgorithmCategory {
    pub const ALL: [AlgorithmCategory; 4] = [Self::Kex, Self::HostKey, Self::Cipher, Self::Hmac];

    pub fn label(self) -> &'static str {
        match self {
            Self::Kex => "Key exchange",
            Self::HostKey => "Host key",
            Self::Cipher => "Cipher",
            Self::Hmac => "HMAC",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Kex => "kex",
            Self::HostKey => "serverHostKey",
            Self::Cipher => "cipher",
            Self::Hmac => "hmac",
        }
    }
}

pub type AlgorithmLists = BTreeMap<AlgorithmCategory, Vec<String>>;

/// Null cipher/mac/kex entries russh accepts but no client should offer.
const NULL_ALGORITHMS: &[&str] = &["none", "clear"];

/// Kex-list entries that announce client extensions rather than name a key
/// exchange. They are kept off the toggle surface and always sent.
pub fn client_kex_markers() -> [kex::Name; 2] {
    [
        kex::EXTENSION_SUPPORT_AS_CLIENT,
        kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
    ]
}

fn server_kex_markers() -> [kex::Name; 2] {
    [
        kex::EXTENSION_SUPPORT_AS_SERVER,
        kex::EXTENSION_OPENSSH_STRICT_KEX_AS_SERVER,
    ]
}

/// Whether `name` may be offered as a user-selectable algorithm.
pub fn is_selectable(name: &str) -> bool {
    if NULL_ALGORITHMS.contains(&name) {
        return false;
    }
    !client_kex_markers()
        .iter()
        .chain(server_kex_markers().iter())
        .any(|m| m.as_ref() == name)
}

fn selectable(names: impl Iterator<Item = String>) -> Vec<String> {
    names.filter(|n| is_selectable(n)).collect()
}

/// What the transport library can use, and what it uses when unconfigured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub supported: AlgorithmLists,
    pub default_order: AlgorithmLists,
}

impl PlatformCapabilities {
    #[cfg(test)]
    pub fn new(supported: AlgorithmLists, default_order: AlgorithmLists) -> Self {
        Self {
            supported,
            default_order,
        }
    }

    /// Introspects russh. Only real negotiable algorithms are listed; every
    /// remaining default name is also listed as supported.
    pub fn from_transport() -> Self {
        let preferred = Preferred::default();
        let mut supported = AlgorithmLists::new();
        let mut default_order = AlgorithmLists::new();

        for category in AlgorithmCategory::ALL {
            let (all, defaults): (Vec<String>, Vec<String>) = match category {
                AlgorithmCategory::Kex => (
                    selectable(kex::ALL_KEX_ALGORITHMS.iter().map(|n| n.as_ref().to_string())),
                    selectable(preferred.kex.iter().map(|n| n.as_ref().to_string())),
                ),
                AlgorithmCategory::HostKey => {
                    let names = selectable(preferred.key.iter().map(|a| a.as_str().to_string()));
                    (names.clone(), names)
                }
                AlgorithmCategory::Cipher => (
                    selectable(cipher::ALL_CIPHERS.iter().map(|n| n.as_ref().to_string())),
                    selectable(preferred.cipher.iter().map(|n| n.as_ref().to_string())),
                ),
                AlgorithmCategory::Hmac => (
                    selectable(mac::ALL_MAC_ALGORITHMS.iter().map(|n| n.as_ref().to_string())),
                    selectable(preferred.mac.iter().map(|n| n.as_ref().to_string())),
                ),
            };
            supported.insert(category, merge_unique(all, &defaults));
            default_order.insert(category, defaults);
        }

        Self {
            supported,
            default_order,
        }
    }

    pub fn supported(&self, category: AlgorithmCategory) -> Result<&[String]> {
        self.supported
            .get(&category)
            .map(Vec::as_slice)
            .ok_or_else(|| missing_category(category, "supported"))
    }

    pub fn defaults(&self, category: AlgorithmCategory) -> Result<&[String]> {
        self.default_order
            .get(&category)
            .map(Vec::as_slice)
            .ok_or_else(|| missing_category(category, "default"))
    }

    pub fn is_supported(&self, category: AlgorithmCategory, name: &str) -> bool {
        self.supported
            .get(&category)
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}

fn missing_category(category: AlgorithmCategory, which: &str) -> anyhow::Error {
    anyhow!(
        "Transport library reports no {which} {} algorithms ({})",
        category.label().to_ascii_lowercase(),
        category.id()
    )
}

fn merge_unique(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    for name in extra {
        if !base.contains(name) {
            base.push(name.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ids_match_saved_profile_keys() {
        let json = serde_json::to_string(&AlgorithmCategory::ALL).unwrap();
        assert_eq!(json, r#"["kex","serverHostKey","cipher","hmac"]"#);
        for category in AlgorithmCategory::ALL {
            let quoted = format!("\"{}\"", category.id());
            let parsed: AlgorithmCategory = serde_json::from_str(&quoted).unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn transport_capabilities_cover_every_category() {
        let caps = PlatformCapabilities::from_transport();
        for category in AlgorithmCategory::ALL {
            let supported = caps.supported(category).unwrap();
            let defaults = caps.defaults(category).unwrap();
            assert!(!defaults.is_empty(), "{category:?} has no defaults");
            for name in defaults {
                assert!(supported.contains(name), "{name} missing from supported");
            }
        }
    }

    #[test]
    fn null_algorithms_and_markers_are_never_offered() {
        let caps = PlatformCapabilities::from_transport();
        let hidden = [
            "none",
            "clear",
            "ext-info-c",
            "ext-info-s",
            "kex-strict-c-v00@openssh.com",
            "kex-strict-s-v00@openssh.com",
        ];
        for category in AlgorithmCategory::ALL {
            for list in [caps.supported(category).unwrap(), caps.defaults(category).unwrap()] {
                for name in hidden {
                    assert!(!list.iter().any(|n| n == name), "{name} offered for {category:?}");
                }
            }
        }
        assert!(caps.is_supported(AlgorithmCategory::Kex, "curve25519-sha256"));
        assert!(!is_selectable("none"));
        assert!(is_selectable("aes256-ctr"));
    }

    #[test]
    fn missing_category_is_an_error() {
        let caps = PlatformCapabilities::default();
        let err = caps.supported(AlgorithmCategory::Cipher).unwrap_err();
        assert!(err.to_string().contains("cipher"));
        assert!(!caps.is_supported(AlgorithmCategory::Cipher, "aes128-ctr"));
    }

    #[test]
    fn merge_keeps_base_order_and_appends_new() {
        let merged = merge_unique(
            vec!["a".into(), "b".into()],
            &["b".to_string(), "c".to_string()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }
}
