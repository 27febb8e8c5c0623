// ── Snapshot feeds ──
//
// One background task per topic polls the JSON file the publishing agent
// writes and forwards whole-object changes over a typed channel. A file
// that is missing at startup, or disappears later, is reported as a
// delete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::CoreError;
use crate::model::{GlobalConfig, LedBlinkCounter, NetworkStatus, OnboardingStatus, PortConfigList};

const CHANNEL_CAPACITY: usize = 16;

/// A whole-object change notification for one key of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    Upsert { key: String, value: T },
    Delete { key: String },
}

impl<T> Change<T> {
    pub fn key(&self) -> &str {
        match self {
            Self::Upsert { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Receiving ends of the five input topics.
#[derive(Debug)]
pub struct Inputs {
    pub global_config: mpsc::Receiver<Change<GlobalConfig>>,
    pub led: mpsc::Receiver<Change<LedBlinkCounter>>,
    pub network: mpsc::Receiver<Change<NetworkStatus>>,
    pub port_configs: mpsc::Receiver<Change<PortConfigList>>,
    pub onboarding: mpsc::Receiver<Change<OnboardingStatus>>,
}

/// Sending ends matching [`Inputs`].
#[derive(Debug, Clone)]
pub struct InputSenders {
    pub global_config: mpsc::Sender<Change<GlobalConfig>>,
    pub led: mpsc::Sender<Change<LedBlinkCounter>>,
    pub network: mpsc::Sender<Change<NetworkStatus>>,
    pub port_configs: mpsc::Sender<Change<PortConfigList>>,
    pub onboarding: mpsc::Sender<Change<OnboardingStatus>>,
}

/// Create the five topic channels.
pub fn channels() -> (InputSenders, Inputs) {
    let (global_tx, global_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (led_tx, led_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (network_tx, network_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (dpc_tx, dpc_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (onboard_tx, onboard_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        InputSenders {
            global_config: global_tx,
            led: led_tx,
            network: network_tx,
            port_configs: dpc_tx,
            onboarding: onboard_tx,
        },
        Inputs {
            global_config: global_rx,
            led: led_rx,
            network: network_rx,
            port_configs: dpc_rx,
            onboarding: onboard_rx,
        },
    )
}

/// Spawn one file feed per topic.
pub fn spawn_feeds(
    config: &FeedConfig,
    senders: InputSenders,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let every = config.poll_interval;
    vec![
        spawn_file_feed(
            "global config",
            config.global_config.clone(),
            every,
            senders.global_config,
            cancel.child_token(),
        ),
        spawn_file_feed(
            "LED counter",
            config.led_counter.clone(),
            every,
            senders.led,
            cancel.child_token(),
        ),
        spawn_file_feed(
            "network status",
            config.network_status.clone(),
            every,
            senders.network,
            cancel.child_token(),
        ),
        spawn_file_feed(
            "port config list",
            config.port_config_list.clone(),
            every,
            senders.port_configs,
            cancel.child_token(),
        ),
        spawn_file_feed(
            "onboarding status",
            config.onboarding_status.clone(),
            every,
            senders.onboarding,
            cancel.child_token(),
        ),
    ]
}

/// The pub/sub key of a snapshot file: its stem (`global.json` → `global`).
pub fn key_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Poll `path` every `every` and forward changes until cancelled or the
/// receiver goes away.
pub fn spawn_file_feed<T>(
    topic: &'static str,
    path: PathBuf,
    every: Duration,
    tx: mpsc::Sender<Change<T>>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::spawn(async move {
        let key = key_of(&path);
        // `None` until the first poll; `Some(None)` while the file is absent.
        let mut last: Option<Option<Vec<u8>>> = None;

        loop {
            let change = match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    if last.as_ref().and_then(Option::as_ref) == Some(&bytes) {
                        None
                    } else {
                        let decoded = serde_json::from_slice::<T>(&bytes);
                        last = Some(Some(bytes));
                        match decoded {
                            Ok(value) => Some(Change::Upsert {
                                key: key.clone(),
                                value,
                            }),
                            Err(source) => {
                                warn!("{}", CoreError::Decode { topic, source });
                                None
                            }
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if last == Some(None) {
                        None
                    } else {
                        last = Some(None);
                        Some(Change::Delete { key: key.clone() })
                    }
                }
                Err(e) => {
                    warn!(topic, path = %path.display(), error = %e, "cannot read snapshot");
                    None
                }
            };

            if let Some(change) = change {
                debug!(topic, key = change.key(), "snapshot changed");
                if tx.send(change).await.is_err() {
                    debug!(topic, "receiver dropped; feed stopping");
                    break;
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(every) => {}
            }
        }
    })
}
