//! Groth16 proof checking behind a narrow trait.
//!
//! The backend treats the SNARK verifier as an opaque collaborator: it hands
//! over the proof and public-signal JSON exactly as the wallet produced them
//! and gets back a yes/no answer or an infrastructure error.

use std::{fs, path::PathBuf, process::Command};

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("{label} is not valid JSON: {message}")]
    MalformedPayload { label: &'static str, message: String },

    #[error("failed to stage verifier inputs: {0}")]
    Io(#[from] std::io::Error),

    #[error("verifier command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

pub trait ProofChecker: Send + Sync {
    /// `Ok(false)` means the checker ran and the proof did not verify.
    fn verify(&self, proof_json: &str, public_signals_json: &str) -> Result<bool, CheckerError>;
}

/// Runs `snarkjs groth16 verify <vkey> <public> <proof>` against a fixed
/// verification key.
#[derive(Clone, Debug)]
pub struct SnarkjsChecker {
    binary: PathBuf,
    verification_key: PathBuf,
}

impl SnarkjsChecker {
    pub fn new(binary: impl Into<PathBuf>, verification_key: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            verification_key: verification_key.into(),
        }
    }

    fn command_line(&self) -> String {
        format!(
            "{} groth16 verify {}",
            self.binary.display(),
            self.verification_key.display()
        )
    }
}

impl ProofChecker for SnarkjsChecker {
    fn verify(&self, proof_json: &str, public_signals_json: &str) -> Result<bool, CheckerError> {
        ensure_json(proof_json, "proof")?;
        ensure_json(public_signals_json, "public signals")?;

        let staging = tempfile::tempdir()?;
        let proof_path = staging.path().join("proof.json");
        let public_path = staging.path().join("public.json");
        fs::write(&proof_path, proof_json)?;
        fs::write(&public_path, public_signals_json)?;

        let output = Command::new(&self.binary)
            .arg("groth16")
            .arg("verify")
            .arg(&self.verification_key)
            .arg(&public_path)
            .arg(&proof_path)
            .output()
            .map_err(|err| CheckerError::Command {
                command: self.command_line(),
                message: err.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() && stdout.contains("OK") {
            return Ok(true);
        }
        if stdout.contains("Invalid proof") || stderr.contains("Invalid proof") {
            return Ok(false);
        }
        Err(CheckerError::Command {
            command: self.command_line(),
            message: format!("exit status {}: {}", output.status, stderr.trim()),
        })
    }
}

fn ensure_json(raw: &str, label: &'static str) -> Result<(), CheckerError> {
    serde_json::from_str::<JsonValue>(raw)
        .map(|_| ())
        .map_err(|err| CheckerError::MalformedPayload {
            label,
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROOF: &str = r#"{"pi_a": ["1", "2", "1"], "protocol": "groth16"}"#;
    const SIGNALS: &str = r#"["1", "2", "3"]"#;

    #[test]
    fn malformed_payloads_are_errors() {
        let checker = SnarkjsChecker::new("snarkjs", "vk.json");
        let err = checker.verify("{not json", SIGNALS).unwrap_err();
        assert!(matches!(err, CheckerError::MalformedPayload { label: "proof", .. }));
        let err = checker.verify(PROOF, "[").unwrap_err();
        assert!(matches!(
            err,
            CheckerError::MalformedPayload { label: "public signals", .. }
        ));
    }

    #[test]
    fn missing_binary_is_an_infrastructure_error() {
        let checker = SnarkjsChecker::new("/nonexistent/snarkjs-binary", "vk.json");
        let err = checker.verify(PROOF, SIGNALS).unwrap_err();
        assert!(matches!(err, CheckerError::Command { .. }));
    }

    #[cfg(unix)]
    fn fake_snarkjs(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("snarkjs");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn interprets_snarkjs_output() {
        let dir = tempfile::tempdir().unwrap();

        let ok = fake_snarkjs(dir.path(), "echo '[INFO]  snarkJS: OK!'");
        assert!(SnarkjsChecker::new(&ok, "vk.json").verify(PROOF, SIGNALS).unwrap());

        let bad_dir = tempfile::tempdir().unwrap();
        let bad = fake_snarkjs(
            bad_dir.path(),
            "echo '[ERROR] snarkJS: Invalid proof'; exit 1",
        );
        assert!(!SnarkjsChecker::new(&bad, "vk.json").verify(PROOF, SIGNALS).unwrap());

        let broken_dir = tempfile::tempdir().unwrap();
        let broken = fake_snarkjs(broken_dir.path(), "echo 'ENOENT vk.json' >&2; exit 2");
        assert!(SnarkjsChecker::new(&broken, "vk.json")
            .verify(PROOF, SIGNALS)
            .is_err());
    }
}
