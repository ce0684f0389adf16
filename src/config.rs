use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::model::ConnectionSettings;
use crate::{crypto, logger};

const CFG_MAGIC_PREFIX: &str = "RUSTYCFG1:";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UiThemeMode {
    #[default]
    Dark,
    Light,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub profiles: Vec<ConnectionProfile>,
    #[serde(default)]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub ui_theme_mode: UiThemeMode,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub settings: ConnectionSettings,
    pub remember_password: bool,
    #[serde(default)]
    pub remember_key_passphrase: bool,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: ConnectionSettings::default(),
            remember_password: false,
            remember_key_passphrase: false,
        }
    }
}

fn config_dir() -> Option<PathBuf> {
    // %APPDATA%\Rusty\config.json
    std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Rusty"))
}

pub fn config_path() -> PathBuf {
    match config_dir() {
        Some(dir) => dir.join("config.json"),
        None => PathBuf::from("config.json"),
    }
}

pub fn load() -> AppConfig {
    load_from(&config_path())
}

pub fn save(cfg: &AppConfig) -> Result<()> {
    save_to(&config_path(), cfg)
}

/// Missing, undecryptable or malformed configs load as the default config.
pub fn load_from(path: &Path) -> AppConfig {
    let Ok(bytes) = fs::read(path) else {
        return AppConfig::default();
    };
    match decode(&bytes) {
        Ok(cfg) => cfg,
        Err(err) => {
            logger::log_line(
                logger::CONFIG_LOG,
                &format!("Ignoring unreadable config {}: {err:#}", path.display()),
            );
            AppConfig::default()
        }
    }
}

fn decode(bytes: &[u8]) -> Result<AppConfig> {
    let plain = match bytes.strip_prefix(CFG_MAGIC_PREFIX.as_bytes()) {
        Some(b64) => {
            let cipher = base64::engine::general_purpose::STANDARD
                .decode(b64)
                .context("config payload is not base64")?;
            crypto::decrypt_for_current_user(&cipher)?
        }
        None => bytes.to_vec(),
    };
    serde_json::from_slice(&plain).context("config payload is not valid JSON")
}

fn encode(cfg: &AppConfig) -> Result<Vec<u8>> {
    let json = serde_json::to_vec_pretty(cfg).context("serialize config")?;
    if !crypto::ENCRYPTS {
        return Ok(json);
    }

    match crypto::encrypt_for_current_user(&json) {
        Ok(cipher) => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(cipher);
            let mut out = Vec::with_capacity(CFG_MAGIC_PREFIX.len() + b64.len());
            out.extend_from_slice(CFG_MAGIC_PREFIX.as_bytes());
            out.extend_from_slice(b64.as_bytes());
            Ok(out)
        }
        Err(err) => {
            logger::log_line(
                logger::CONFIG_LOG,
                &format!("Config encryption failed, writing plaintext: {err:#}"),
            );
            Ok(json)
        }
    }
}

/// Writes through a temp file and renames it into place.
pub fn save_to(path: &Path, cfg: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }

    let payload = encode(cfg)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).with_context(|| format!("write {}", tmp.display()))?;
    if let Err(err) = fs::rename(&tmp, path) {
        // Cross-device rename: copy, then drop the temp file.
        logger::log_line(logger::CONFIG_LOG, &format!("Config rename failed: {err}"));
        fs::copy(&tmp, path).with_context(|| format!("write {}", path.display()))?;
        let _ = fs::remove_file(&tmp);
    }
    Ok(())
}

pub fn find_profile_index(cfg: &AppConfig, name: &str) -> Option<usize> {
    cfg.profiles
        .iter()
        .position(|p| p.name.eq_ignore_ascii_case(name))
}

pub fn profile_display_name(p: &ConnectionProfile, cfg: &AppConfig) -> String {
    let is_default = cfg
        .default_profile
        .as_deref()
        .map(|d| d.eq_ignore_ascii_case(&p.name))
        .unwrap_or(false);
    if is_default {
        format!("{} (default)", p.name)
    } else {
        p.name.clone()
    }
}

pub fn sanitized_profile_name(name: &str) -> String {
    name.trim().to_string()
}

/// Profile as it goes to disk: secrets the user did not ask to remember are dropped.
pub fn stored_profile(profile: &ConnectionProfile) -> ConnectionProfile {
    let mut p = profile.clone();
    p.name = sanitized_profile_name(&p.name);
    if !p.remember_password {
        p.settings.password.clear();
    }
    if !p.remember_key_passphrase {
        p.settings.key_passphrase.clear();
    }
    p
}

/// Inserts or replaces (by case-insensitive name); returns the profile's index.
pub fn upsert_profile(cfg: &mut AppConfig, profile: &ConnectionProfile) -> Option<usize> {
    let stored = stored_profile(profile);
    if stored.name.is_empty() {
        return None;
    }
    match find_profile_index(cfg, &stored.name) {
        Some(i) => {
            cfg.profiles[i] = stored;
            Some(i)
        }
        None => {
            cfg.profiles.push(stored);
            Some(cfg.profiles.len() - 1)
        }
    }
}

/// Writes an edited profile back over the one at `origin`, so renames replace
/// instead of duplicating. Another profile already using the new name is
/// dropped, and the default follows the rename. Without a valid `origin` this
/// is `upsert_profile`.
pub fn save_profile(
    cfg: &mut AppConfig,
    origin: Option<usize>,
    profile: &ConnectionProfile,
) -> Option<usize> {
    let Some(mut idx) = origin.filter(|&i| i < cfg.profiles.len()) else {
        return upsert_profile(cfg, profile);
    };
    let stored = stored_profile(profile);
    if stored.name.is_empty() {
        return None;
    }

    let clash = cfg
        .profiles
        .iter()
        .enumerate()
        .position(|(i, p)| i != idx && p.name.eq_ignore_ascii_case(&stored.name));
    if let Some(j) = clash {
        cfg.profiles.remove(j);
        if j < idx {
            idx -= 1;
        }
    }

    let was_default = cfg
        .default_profile
        .as_deref()
        .map(|d| d.eq_ignore_ascii_case(&cfg.profiles[idx].name))
        .unwrap_or(false);
    if was_default {
        cfg.default_profile = Some(stored.name.clone());
    }
    cfg.profiles[idx] = stored;
    Some(idx)
}

/// Drops the stored password of the profile at `idx`. Returns whether
/// anything changed.
pub fn forget_password(cfg: &mut AppConfig, idx: usize) -> bool {
    let Some(p) = cfg.profiles.get_mut(idx) else {
        return false;
    };
    if !p.remember_password && p.settings.password.is_empty() {
        return false;
    }
    p.remember_password = false;
    p.settings.password.clear();
    true
}

/// `None` clears the default. Returns false for an unknown index.
pub fn set_default_profile(cfg: &mut AppConfig, idx: Option<usize>) -> bool {
    match idx {
        None => {
            cfg.default_profile = None;
            true
        }
        Some(i) => match cfg.profiles.get(i) {
            Some(p) => {
                cfg.default_profile = Some(p.name.clone());
                true
            }
            None => false,
        },
    }
}

pub fn is_default_profile(cfg: &AppConfig, idx: usize) -> bool {
    match (cfg.profiles.get(idx), cfg.default_profile.as_deref()) {
        (Some(p), Some(d)) => d.eq_ignore_ascii_case(&p.name),
        _ => false,
    }
}

pub fn delete_profile(cfg: &mut AppConfig, idx: usize) -> Option<ConnectionProfile> {
    if idx >= cfg.profiles.len() {
        return None;
    }
    let removed = cfg.profiles.remove(idx);
    let was_default = cfg
        .default_profile
        .as_deref()
        .map(|d| d.eq_ignore_ascii_case(&removed.name))
        .unwrap_or(false);
    if was_default {
        cfg.default_profile = None;
    }
    Some(removed)
}
