use zenoh::{Session, Wait};

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Build a Zenoh configuration from the connection settings.
pub fn zenoh_config(config: &ZenohConfig) -> Result<zenoh::Config> {
    if !matches!(config.mode.as_str(), "client" | "peer" | "router") {
        return Err(Error::Config(format!(
            "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
            config.mode
        )));
    }

    let mut zenoh_config = zenoh::Config::default();
    insert(&mut zenoh_config, "mode", &config.mode)?;

    for (key, endpoints) in [
        ("connect/endpoints", &config.connect),
        ("listen/endpoints", &config.listen),
    ] {
        if !endpoints.is_empty() {
            insert(&mut zenoh_config, key, endpoints)?;
        }
    }

    Ok(zenoh_config)
}

fn insert<T: serde::Serialize + ?Sized>(
    zenoh_config: &mut zenoh::Config,
    key: &str,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_string(value)?;
    zenoh_config
        .insert_json5(key, &json)
        .map_err(|e| Error::Config(format!("Invalid Zenoh setting {} = {}: {}", key, json, e)))
}

/// Open a Zenoh session, blocking until it is established.
pub fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = zenoh_config(config)?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).wait()?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}
