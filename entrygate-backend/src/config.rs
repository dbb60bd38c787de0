//! Server configuration.

use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use entrygate_common::MAX_TREE_DEPTH;

pub const DB_PATH_ENV: &str = "ENTRYGATE_DB_PATH";
pub const LISTEN_ADDR_ENV: &str = "ENTRYGATE_LISTEN_ADDR";
pub const TREE_DEPTH_ENV: &str = "ENTRYGATE_TREE_DEPTH";
pub const VKEY_PATH_ENV: &str = "ENTRYGATE_VKEY_PATH";
pub const SNARKJS_BIN_ENV: &str = "ENTRYGATE_SNARKJS_BIN";
pub const VERIFY_TIMEOUT_ENV: &str = "ENTRYGATE_VERIFY_TIMEOUT_SECS";

pub const DEFAULT_DB_PATH: &str = "data/entrygate.db";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TREE_DEPTH: u8 = 16;
pub const DEFAULT_VKEY_PATH: &str = "artifacts/verification_key.json";
pub const DEFAULT_SNARKJS_BIN: &str = "snarkjs";
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct GateConfig {
    /// sled database directory holding trees, roster and nullifiers.
    pub db_path: PathBuf,
    pub listen_addr: String,
    /// Tree depth; values above the maximum are clamped.
    pub tree_depth: u8,
    pub verification_key: PathBuf,
    pub snarkjs_bin: PathBuf,
    /// Upper bound on one verify request, proof check included.
    pub verify_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            tree_depth: DEFAULT_TREE_DEPTH,
            verification_key: PathBuf::from(DEFAULT_VKEY_PATH),
            snarkjs_bin: PathBuf::from(DEFAULT_SNARKJS_BIN),
            verify_timeout: Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let tree_depth = match lookup(TREE_DEPTH_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .with_context(|| format!("{TREE_DEPTH_ENV} must be an integer, got '{raw}'"))?
                .min(MAX_TREE_DEPTH),
            None => defaults.tree_depth,
        };

        let verify_timeout = match lookup(VERIFY_TIMEOUT_ENV) {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().with_context(|| {
                    format!("{VERIFY_TIMEOUT_ENV} must be a number of seconds, got '{raw}'")
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => defaults.verify_timeout,
        };

        Ok(Self {
            db_path: lookup(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            listen_addr: lookup(LISTEN_ADDR_ENV).unwrap_or(defaults.listen_addr),
            tree_depth,
            verification_key: lookup(VKEY_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.verification_key),
            snarkjs_bin: lookup(SNARKJS_BIN_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.snarkjs_bin),
            verify_timeout,
        })
    }
}
