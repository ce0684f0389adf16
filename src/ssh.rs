use std::borrow::Cow;
use std::future::Future;
use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use russh::client::{self, AuthResult};
use russh::{cipher, kex, keys, mac, Disconnect, MethodKind, MethodSet, Preferred};

use crate::algorithms::{client_kex_markers, AlgorithmCategory};
use crate::logger;
use crate::model::ConnectionSettings;

const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckMessage {
    Status(String),
    Finished(CheckReport),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub endpoint: String,
    pub auth_methods: String,
    pub none_auth_accepted: bool,
}

fn lookup<T: Copy + AsRef<str>>(
    category: AlgorithmCategory,
    name: &str,
    candidates: impl IntoIterator<Item = T>,
) -> Result<T> {
    if matches!(name, "none" | "clear") {
        bail!("{} algorithm {name:?} disables protection and is not allowed", category.label());
    }
    candidates
        .into_iter()
        .find(|c| c.as_ref() == name)
        .ok_or_else(|| anyhow!("{} algorithm {name:?} is not supported by russh", category.label()))
}

fn saved<'a>(settings: &'a ConnectionSettings, category: AlgorithmCategory) -> &'a [String] {
    settings
        .algorithms
        .get(&category)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Extension negotiation and strict kex stay on whatever kex order was saved.
fn with_client_markers(mut list: Vec<kex::Name>) -> Vec<kex::Name> {
    for marker in client_kex_markers() {
        if !list.contains(&marker) {
            list.push(marker);
        }
    }
    list
}

/// Maps the profile's preference lists onto russh. Empty lists keep russh's
/// default order for that category.
pub fn preferred_algorithms(settings: &ConnectionSettings) -> Result<Preferred> {
    let defaults = Preferred::default();
    let mut preferred = Preferred::default();

    let names = saved(settings, AlgorithmCategory::Kex);
    if !names.is_empty() {
        let list = names
            .iter()
            .map(|n| {
                let all = kex::ALL_KEX_ALGORITHMS.iter().copied().copied();
                lookup(AlgorithmCategory::Kex, n, all.chain(defaults.kex.iter().copied()))
            })
            .collect::<Result<Vec<kex::Name>>>()?;
        preferred.kex = Cow::Owned(with_client_markers(list));
    }

    let names = saved(settings, AlgorithmCategory::HostKey);
    if !names.is_empty() {
        let list = names
            .iter()
            .map(|n| {
                keys::Algorithm::from_str(n).map_err(|err| {
                    anyhow!("{} algorithm {n:?} is not supported by russh: {err}", AlgorithmCategory::HostKey.label())
                })
            })
            .collect::<Result<Vec<keys::Algorithm>>>()?;
        preferred.key = Cow::Owned(list);
    }

    let names = saved(settings, AlgorithmCategory::Cipher);
    if !names.is_empty() {
        let list = names
            .iter()
            .map(|n| lookup(AlgorithmCategory::Cipher, n, cipher::ALL_CIPHERS.iter().copied().copied()))
            .collect::<Result<Vec<cipher::Name>>>()?;
        preferred.cipher = Cow::Owned(list);
    }

    let names = saved(settings, AlgorithmCategory::Hmac);
    if !names.is_empty() {
        let list = names
            .iter()
            .map(|n| lookup(AlgorithmCategory::Hmac, n, mac::ALL_MAC_ALGORITHMS.iter().copied().copied()))
            .collect::<Result<Vec<mac::Name>>>()?;
        preferred.mac = Cow::Owned(list);
    }

    Ok(preferred)
}

pub fn client_config(settings: &ConnectionSettings) -> Result<client::Config> {
    let mut config = client::Config::default();
    config.preferred = preferred_algorithms(settings)?;
    config.inactivity_timeout = Some(CHECK_TIMEOUT);
    Ok(config)
}

fn method_kind_name(method: MethodKind) -> &'static str {
    match method {
        MethodKind::None => "none",
        MethodKind::Password => "password",
        MethodKind::PublicKey => "publickey",
        MethodKind::HostBased => "hostbased",
        MethodKind::KeyboardInteractive => "keyboard-interactive",
    }
}

fn method_set_to_csv(methods: &MethodSet) -> String {
    if methods.is_empty() {
        "none".to_string()
    } else {
        methods
            .iter()
            .map(|m| method_kind_name(*m))
            .collect::<Vec<_>>()
            .join(",")
    }
}

struct CheckClient;

impl client::Handler for CheckClient {
    type Error = russh::Error;

    // The check only negotiates; host keys are not trusted for anything.
    fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }
}

/// Connects with the profile's algorithm preferences on a worker thread and
/// reports the outcome through `tx`.
pub fn start_check(
    settings: ConnectionSettings,
    tx: Sender<CheckMessage>,
    log_path: String,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        logger::log_line(&log_path, &format!("Probing {}.", settings.endpoint()));

        let result = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(async {
                tokio::time::timeout(CHECK_TIMEOUT, run_check(&settings, &tx, &log_path))
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("Timed out after {}s", CHECK_TIMEOUT.as_secs())))
            }),
            Err(err) => Err(anyhow!("Failed to create async runtime: {err}")),
        };

        let msg = match result {
            Ok(report) => {
                logger::log_line(&log_path, &format!("Check ok: auth methods {}.", report.auth_methods));
                CheckMessage::Finished(report)
            }
            Err(err) => {
                logger::log_line(&log_path, &format!("Check failed: {err:#}"));
                CheckMessage::Failed(format!("{err:#}"))
            }
        };
        let _ = tx.send(msg);
    })
}

async fn run_check(
    settings: &ConnectionSettings,
    tx: &Sender<CheckMessage>,
    log_path: &str,
) -> Result<CheckReport> {
    if settings.host.trim().is_empty() {
        bail!("Host is required");
    }
    if settings.username.trim().is_empty() {
        bail!("Username is required");
    }
    let config = Arc::new(client_config(settings)?);

    let addr = format!("{}:{}", settings.host.trim(), settings.port);
    let _ = tx.send(CheckMessage::Status(format!("Connecting to {addr}")));
    let tcp = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    let _ = tcp.set_nodelay(true);

    logger::log_line(log_path, "Performing SSH handshake.");
    let _ = tx.send(CheckMessage::Status("Negotiating algorithms".to_string()));
    let mut session = client::connect_stream(config, tcp, CheckClient)
        .await
        .context("SSH handshake failed")?;

    let outcome = session
        .authenticate_none(settings.username.trim())
        .await
        .context("Failed to query server auth methods")?;
    let (none_auth_accepted, methods) = match outcome {
        AuthResult::Success => (true, MethodSet::empty()),
        AuthResult::Failure {
            remaining_methods, ..
        } => (false, remaining_methods),
    };

    let _ = session
        .disconnect(Disconnect::ByApplication, "", "English")
        .await;

    Ok(CheckReport {
        endpoint: settings.endpoint(),
        auth_methods: method_set_to_csv(&methods),
        none_auth_accepted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::PlatformCapabilities;
    use std::sync::mpsc;

    fn settings_with(category: AlgorithmCategory, names: &[&str]) -> ConnectionSettings {
        let mut settings = ConnectionSettings::default();
        settings
            .algorithms
            .insert(category, names.iter().map(|n| n.to_string()).collect());
        settings
    }

    #[test]
    fn empty_preferences_keep_transport_defaults() {
        let preferred = preferred_algorithms(&ConnectionSettings::default()).unwrap();
        let defaults = Preferred::default();
        assert_eq!(preferred.kex.as_ref(), defaults.kex.as_ref());
        assert_eq!(preferred.key.as_ref(), defaults.key.as_ref());
        assert_eq!(preferred.cipher.as_ref(), defaults.cipher.as_ref());
        assert_eq!(preferred.mac.as_ref(), defaults.mac.as_ref());
    }

    #[test]
    fn transport_defaults_map_back_in_order() {
        let caps = PlatformCapabilities::from_transport();
        let mut settings = ConnectionSettings::default();
        for category in AlgorithmCategory::ALL {
            let mut names = caps.defaults(category).unwrap().to_vec();
            names.reverse();
            settings.algorithms.insert(category, names);
        }

        let preferred = preferred_algorithms(&settings).unwrap();
        let ciphers: Vec<&str> = preferred.cipher.iter().map(|n| n.as_ref()).collect();
        assert_eq!(ciphers, settings.algorithms[&AlgorithmCategory::Cipher]);
        let kexes: Vec<&str> = preferred.kex.iter().map(|n| n.as_ref()).collect();
        let saved_kex = &settings.algorithms[&AlgorithmCategory::Kex];
        assert_eq!(kexes[..saved_kex.len()], saved_kex[..]);
        assert_eq!(kexes.len(), saved_kex.len() + 2);
        let host_keys: Vec<&str> = preferred.key.iter().map(|a| a.as_str()).collect();
        assert_eq!(host_keys, settings.algorithms[&AlgorithmCategory::HostKey]);
    }

    #[test]
    fn trimmed_kex_list_keeps_client_markers() {
        let settings = settings_with(AlgorithmCategory::Kex, &["curve25519-sha256"]);
        let preferred = preferred_algorithms(&settings).unwrap();
        let kexes: Vec<&str> = preferred.kex.iter().map(|n| n.as_ref()).collect();
        assert_eq!(
            kexes,
            vec!["curve25519-sha256", "ext-info-c", "kex-strict-c-v00@openssh.com"]
        );
    }

    #[test]
    fn saved_markers_are_not_duplicated() {
        let settings = settings_with(
            AlgorithmCategory::Kex,
            &["kex-strict-c-v00@openssh.com", "curve25519-sha256"],
        );
        let preferred = preferred_algorithms(&settings).unwrap();
        let kexes: Vec<&str> = preferred.kex.iter().map(|n| n.as_ref()).collect();
        assert_eq!(
            kexes,
            vec!["kex-strict-c-v00@openssh.com", "curve25519-sha256", "ext-info-c"]
        );
    }

    #[test]
    fn unknown_cipher_is_a_config_error() {
        let settings = settings_with(AlgorithmCategory::Cipher, &["rot13-cbc"]);
        let err = client_config(&settings).unwrap_err();
        assert!(err.to_string().contains("rot13-cbc"));
    }

    #[test]
    fn null_cipher_from_an_old_profile_is_rejected() {
        let settings = settings_with(AlgorithmCategory::Cipher, &["aes256-ctr", "none"]);
        let err = preferred_algorithms(&settings).unwrap_err();
        assert!(err.to_string().contains("\"none\""));
    }

    #[test]
    fn unknown_mac_is_a_config_error() {
        let settings = settings_with(AlgorithmCategory::Hmac, &["hmac-crc32"]);
        assert!(preferred_algorithms(&settings).is_err());
    }

    #[test]
    fn check_requires_host_and_user() {
        let (tx, rx) = mpsc::channel();
        let dir = tempdir::TempDir::new("rusty-check").unwrap();
        let log = dir.path().join("check.log").display().to_string();
        start_check(ConnectionSettings::default(), tx, log).join().unwrap();

        let messages: Vec<CheckMessage> = rx.try_iter().collect();
        assert_eq!(messages, vec![CheckMessage::Failed("Host is required".to_string())]);
    }

    #[test]
    fn method_csv_lists_none_for_empty_set() {
        assert_eq!(method_set_to_csv(&MethodSet::empty()), "none");
    }
}
