use anyhow::Result;

use crate::algorithms::{AlgorithmCategory, PlatformCapabilities};
use crate::config::{self, AppConfig, ConnectionProfile};
use crate::model::LoginScript;
use crate::selection::SelectionState;

/// One edit of one connection profile. Dropping it without calling `save`
/// discards every change.
#[derive(Clone, Debug)]
pub struct EditSession {
    pub profile: ConnectionProfile,
    origin: Option<usize>,
    pub selection: SelectionState,
    pub new_script: LoginScript,
    has_saved_password: bool,
}

impl EditSession {
    /// `origin` is the index of the stored profile being edited, `None` for a
    /// new one.
    pub fn open(
        mut profile: ConnectionProfile,
        origin: Option<usize>,
        caps: &PlatformCapabilities,
    ) -> Result<Self> {
        let selection = SelectionState::initialize(&mut profile.settings.algorithms, caps)?;
        let has_saved_password = profile.remember_password && !profile.settings.password.is_empty();
        Ok(Self {
            profile,
            origin,
            selection,
            new_script: LoginScript::default(),
            has_saved_password,
        })
    }

    pub fn has_saved_password(&self) -> bool {
        self.has_saved_password
    }

    /// Forgets the password in the draft and in the stored profile right away;
    /// cancelling the session does not bring it back. Returns whether `cfg`
    /// changed and needs saving.
    pub fn clear_saved_password(&mut self, cfg: &mut AppConfig) -> bool {
        self.has_saved_password = false;
        self.profile.remember_password = false;
        self.profile.settings.password.clear();
        self.origin
            .map(|idx| config::forget_password(cfg, idx))
            .unwrap_or(false)
    }

    pub fn set_private_key(&mut self, path: impl Into<String>) {
        self.profile.settings.private_key_path = path.into();
    }

    pub fn toggle(&mut self, category: AlgorithmCategory, name: &str, enabled: bool) {
        self.selection.toggle(category, name, enabled);
    }

    pub fn move_script_up(&mut self, index: usize) {
        let scripts = &mut self.profile.settings.scripts;
        if index > 0 && index < scripts.len() {
            scripts.swap(index, index - 1);
        }
    }

    pub fn move_script_down(&mut self, index: usize) {
        let scripts = &mut self.profile.settings.scripts;
        if index + 1 < scripts.len() {
            scripts.swap(index, index + 1);
        }
    }

    pub fn delete_script(&mut self, index: usize) -> Option<LoginScript> {
        let scripts = &mut self.profile.settings.scripts;
        (index < scripts.len()).then(|| scripts.remove(index))
    }

    pub fn add_script(&mut self) {
        self.profile.settings.scripts.push(self.new_script.clone());
        self.clear_script();
    }

    pub fn clear_script(&mut self) {
        self.new_script = LoginScript::default();
    }

    /// Writes the committed algorithm selection into the profile.
    pub fn save(mut self) -> ConnectionProfile {
        self.profile.settings.algorithms = self.selection.commit();
        self.profile
    }

    /// Saves into `cfg`, replacing the profile this session was opened from.
    /// Returns the profile's index, `None` when it has no name.
    pub fn save_into(self, cfg: &mut AppConfig) -> Option<usize> {
        let origin = self.origin;
        let profile = self.save();
        config::save_profile(cfg, origin, &profile)
    }

    pub fn cancel(self) {}
}
