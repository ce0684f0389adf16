use std::collections::BTreeMap;

use anyhow::Result;

use crate::algorithms::{AlgorithmCategory, AlgorithmLists, PlatformCapabilities};

/// Per-algorithm enable flags for one category.
///
/// Entries keep insertion order: that order is the preference order written
/// back on commit. Flipping a flag never moves an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToggleMap {
    entries: Vec<(String, bool)>,
}

impl ToggleMap {
    pub fn from_enabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::default();
        for name in names {
            map.set(&name.into(), true);
        }
        map
    }

    /// Absent names read as disabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, enabled)| *enabled)
            .unwrap_or(false)
    }

    pub fn set(&mut self, name: &str, enabled: bool) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, flag)) => *flag = enabled,
            None => self.entries.push((name.to_string(), enabled)),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(name, _)| name.as_str())
    }
}

/// Toggle state for every category, alive for one edit session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionState {
    categories: BTreeMap<AlgorithmCategory, ToggleMap>,
}

impl SelectionState {
    /// Fills missing or empty categories of `algorithms` with a copy of the
    /// platform defaults, then seeds one toggle per saved name.
    ///
    /// Saved names the platform does not support get no toggle, so they are
    /// dropped by the next commit.
    pub fn initialize(algorithms: &mut AlgorithmLists, caps: &PlatformCapabilities) -> Result<Self> {
        let mut categories = BTreeMap::new();
        for category in AlgorithmCategory::ALL {
            let defaults = caps.defaults(category)?;
            caps.supported(category)?;

            let saved = algorithms.entry(category).or_default();
            if saved.is_empty() {
                *saved = defaults.to_vec();
            }
            let seeded = saved.iter().filter(|name| caps.is_supported(category, name)).cloned();
            categories.insert(category, ToggleMap::from_enabled(seeded));
        }
        Ok(Self { categories })
    }

    pub fn toggle(&mut self, category: AlgorithmCategory, name: &str, enabled: bool) {
        self.categories.entry(category).or_default().set(name, enabled);
    }

    pub fn is_enabled(&self, category: AlgorithmCategory, name: &str) -> bool {
        self.categories
            .get(&category)
            .map(|map| map.is_enabled(name))
            .unwrap_or(false)
    }

    pub fn category(&self, category: AlgorithmCategory) -> Option<&ToggleMap> {
        self.categories.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = AlgorithmCategory> + '_ {
        self.categories.keys().copied()
    }

    /// Enabled names per category, in insertion order.
    pub fn commit(&self) -> AlgorithmLists {
        self.categories
            .iter()
            .map(|(category, map)| (*category, map.enabled().map(str::to_string).collect()))
            .collect()
    }

    /// Display rows: every supported name in platform order with its flag.
    pub fn rows<'a>(
        &'a self,
        category: AlgorithmCategory,
        caps: &'a PlatformCapabilities,
    ) -> Result<impl Iterator<Item = (&'a str, bool)> + 'a> {
        let supported = caps.supported(category)?;
        Ok(supported
            .iter()
            .map(move |name| (name.as_str(), self.is_enabled(category, name))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lists(entries: &[(AlgorithmCategory, &[&str])]) -> AlgorithmLists {
        entries
            .iter()
            .map(|(c, names)| (*c, names.iter().map(|n| n.to_string()).collect()))
            .collect()
    }

    fn caps() -> PlatformCapabilities {
        PlatformCapabilities::new(
            lists(&[
                (AlgorithmCategory::Kex, &["curve25519-sha256", "ecdh-sha2-nistp256", "diffie-hellman-group14-sha256"]),
                (AlgorithmCategory::HostKey, &["ssh-ed25519", "rsa-sha2-512", "ssh-rsa"]),
                (AlgorithmCategory::Cipher, &["aes128", "aes256", "chacha20"]),
                (AlgorithmCategory::Hmac, &["hmac-sha2-256", "hmac-sha2-512", "hmac-sha1"]),
            ]),
            lists(&[
                (AlgorithmCategory::Kex, &["curve25519-sha256", "ecdh-sha2-nistp256"]),
                (AlgorithmCategory::HostKey, &["ssh-ed25519", "rsa-sha2-512"]),
                (AlgorithmCategory::Cipher, &["chacha20", "aes256"]),
                (AlgorithmCategory::Hmac, &["hmac-sha2-256"]),
            ]),
        )
    }

    #[test]
    fn missing_algorithms_take_platform_defaults() {
        let caps = caps();
        let mut saved = AlgorithmLists::new();
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();

        for category in AlgorithmCategory::ALL {
            let enabled: Vec<&str> = state.category(category).unwrap().enabled().collect();
            assert_eq!(enabled, caps.default_order[&category]);
            assert_eq!(saved[&category], caps.default_order[&category]);
        }
    }

    #[test]
    fn empty_list_counts_as_absent() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &[])]);
        SelectionState::initialize(&mut saved, &caps).unwrap();
        assert_eq!(saved[&AlgorithmCategory::Cipher], vec!["chacha20", "aes256"]);
    }

    #[test]
    fn defaults_are_copied_not_shared() {
        let caps = caps();
        let mut saved = AlgorithmLists::new();
        let mut state = SelectionState::initialize(&mut saved, &caps).unwrap();
        saved.get_mut(&AlgorithmCategory::Hmac).unwrap().push("hmac-sha1".into());
        state.toggle(AlgorithmCategory::Hmac, "hmac-sha2-256", false);

        assert_eq!(caps.default_order[&AlgorithmCategory::Hmac], vec!["hmac-sha2-256"]);
    }

    #[test]
    fn commit_without_toggles_round_trips() {
        let caps = caps();
        let mut saved = lists(&[
            (AlgorithmCategory::Kex, &["ecdh-sha2-nistp256", "curve25519-sha256"]),
            (AlgorithmCategory::HostKey, &["ssh-rsa"]),
            (AlgorithmCategory::Cipher, &["aes128", "chacha20"]),
        ]);
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();
        assert_eq!(state.commit(), saved);
    }

    #[rstest]
    #[case::middle("b", &["a", "b", "c"])]
    #[case::first("a", &["a", "b", "c"])]
    #[case::last("c", &["a", "b", "c"])]
    fn re_enabling_keeps_original_position(#[case] flipped: &str, #[case] expected: &[&str]) {
        let mut caps = caps();
        caps.supported.insert(AlgorithmCategory::Cipher, vec!["a".into(), "b".into(), "c".into()]);
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["a", "b", "c"])]);
        let mut state = SelectionState::initialize(&mut saved, &caps).unwrap();

        state.toggle(AlgorithmCategory::Cipher, flipped, false);
        let without: Vec<String> = state.commit()[&AlgorithmCategory::Cipher].clone();
        assert!(!without.iter().any(|n| n == flipped));
        assert_eq!(without.len(), 2);

        state.toggle(AlgorithmCategory::Cipher, flipped, true);
        assert_eq!(state.commit()[&AlgorithmCategory::Cipher], expected);
    }

    #[test]
    fn unselected_supported_names_are_not_added() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["aes256"])]);
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();
        assert_eq!(state.commit()[&AlgorithmCategory::Cipher], vec!["aes256"]);
    }

    #[test]
    fn newly_enabled_name_is_appended() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["aes256"])]);
        let mut state = SelectionState::initialize(&mut saved, &caps).unwrap();

        state.toggle(AlgorithmCategory::Cipher, "chacha20", true);
        state.toggle(AlgorithmCategory::Cipher, "aes128", true);
        assert_eq!(
            state.commit()[&AlgorithmCategory::Cipher],
            vec!["aes256", "chacha20", "aes128"]
        );
    }

    #[test]
    fn toggle_is_idempotent() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["aes256", "aes128"])]);
        let mut state = SelectionState::initialize(&mut saved, &caps).unwrap();

        state.toggle(AlgorithmCategory::Cipher, "aes256", false);
        let once = state.clone();
        state.toggle(AlgorithmCategory::Cipher, "aes256", false);
        assert_eq!(state, once);

        state.toggle(AlgorithmCategory::Cipher, "chacha20", false);
        assert_eq!(state.commit()[&AlgorithmCategory::Cipher], vec!["aes128"]);
        assert!(!state.is_enabled(AlgorithmCategory::Cipher, "chacha20"));
    }

    #[test]
    fn every_category_gets_exactly_one_entry() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Kex, &["curve25519-sha256"])]);
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();

        let categories: Vec<AlgorithmCategory> = state.categories().collect();
        assert_eq!(categories, AlgorithmCategory::ALL.to_vec());
        assert_eq!(state.commit().len(), 4);
    }

    #[test]
    fn missing_platform_category_is_reported() {
        let mut caps = caps();
        caps.supported.remove(&AlgorithmCategory::HostKey);
        let mut saved = AlgorithmLists::new();
        let err = SelectionState::initialize(&mut saved, &caps).unwrap_err();
        assert!(err.to_string().contains("serverHostKey"));
    }

    #[test]
    fn rows_follow_platform_order() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["chacha20", "aes128"])]);
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();

        let rows: Vec<(&str, bool)> = state.rows(AlgorithmCategory::Cipher, &caps).unwrap().collect();
        assert_eq!(rows, vec![("aes128", true), ("aes256", false), ("chacha20", true)]);
    }

    #[test]
    fn unsupported_saved_names_stay_off_the_toggle_surface() {
        let caps = caps();
        let mut saved = lists(&[(AlgorithmCategory::Cipher, &["3des-cbc", "aes128"])]);
        let state = SelectionState::initialize(&mut saved, &caps).unwrap();

        let rows: Vec<&str> = state
            .rows(AlgorithmCategory::Cipher, &caps)
            .unwrap()
            .map(|(name, _)| name)
            .collect();
        assert!(!rows.contains(&"3des-cbc"));
        assert_eq!(state.commit()[&AlgorithmCategory::Cipher], vec!["aes128"]);
    }
}
