//! External prover adapter.
//!
//! Each proof takes two subprocess steps against the prover toolchain:
//!
//! ```text
//! <bin> compute-witness -a <args...> -o <scratch>/witness
//! <bin> generate-proof  -w <scratch>/witness -j <scratch>/proof.json
//! ```
//!
//! Both steps share scratch files, so callers must never run two proofs at
//! once against the same work directory.

use async_trait::async_trait;
use pos_merkle::ProofRequest;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::proof::ProofTuple;
use crate::storage::BlockRef;

/// Longest stderr excerpt kept in errors.
const STDERR_EXCERPT_LEN: usize = 512;

/// Failure of a single proof attempt.
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("prover I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{step} exited with {status}: {stderr}")]
    Exit {
        step: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("malformed proof output: {0}")]
    Malformed(String),

    #[error("pool id {0:?} cannot name a scratch directory")]
    UnsafePoolId(String),
}

/// Produces one proof tuple per request.
#[async_trait]
pub trait ProofBackend: Send + Sync {
    async fn prove(&self, block: &BlockRef, request: &ProofRequest) -> Result<ProofTuple, ProverError>;
}

#[derive(Deserialize)]
struct ProofFile {
    proof: ProofTuple,
}

/// Parse the prover's `proof.json`.
pub fn parse_proof_json(raw: &[u8]) -> Result<ProofTuple, ProverError> {
    serde_json::from_slice::<ProofFile>(raw)
        .map(|f| f.proof)
        .map_err(|e| ProverError::Malformed(e.to_string()))
}

/// Subprocess prover running ZoKrates-style `compute-witness` and
/// `generate-proof` commands inside `work_dir`.
#[derive(Clone, Debug)]
pub struct ZokratesProver {
    program: PathBuf,
    work_dir: PathBuf,
    timeout: Duration,
}

impl ZokratesProver {
    /// `binary` paths with a directory part are resolved against `work_dir`,
    /// bare names are looked up on `PATH`.
    pub fn new(binary: impl AsRef<Path>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let work_dir = work_dir.into();
        let binary = binary.as_ref();
        let program = if binary.is_relative() && binary.components().count() > 1 {
            let trimmed: PathBuf = binary
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            work_dir.join(trimmed)
        } else {
            binary.to_path_buf()
        };

        Self {
            program,
            work_dir,
            timeout,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `<work_dir>/<pool>_<id>`. The name must be a single plain path
    /// component so the scratch dir stays inside `work_dir`.
    fn scratch_dir(&self, block: &BlockRef) -> Result<PathBuf, ProverError> {
        let name = format!("{}_{}", block.pool, block.block_id);
        let mut components = Path::new(&name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.work_dir.join(name)),
            _ => Err(ProverError::UnsafePoolId(block.pool.clone())),
        }
    }

    async fn run_step(&self, step: &'static str, args: Vec<String>) -> Result<(), ProverError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProverError::Timeout {
                    step,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT_LEN).collect();
            return Err(ProverError::Exit {
                step,
                status: output.status.to_string(),
                stderr: excerpt,
            });
        }
        Ok(())
    }

    async fn prove_in(&self, scratch: &Path, request: &ProofRequest) -> Result<ProofTuple, ProverError> {
        let witness = scratch.join("witness").to_string_lossy().into_owned();
        let proof = scratch.join("proof.json");

        let mut args = vec!["compute-witness".to_string(), "-a".to_string()];
        args.extend(request.witness_args());
        args.push("-o".to_string());
        args.push(witness.clone());
        self.run_step("compute-witness", args).await?;

        let args = vec![
            "generate-proof".to_string(),
            "-w".to_string(),
            witness,
            "-j".to_string(),
            proof.to_string_lossy().into_owned(),
        ];
        self.run_step("generate-proof", args).await?;

        let raw = tokio::fs::read(&proof).await?;
        parse_proof_json(&raw)
    }
}

#[async_trait]
impl ProofBackend for ZokratesProver {
    async fn prove(&self, block: &BlockRef, request: &ProofRequest) -> Result<ProofTuple, ProverError> {
        let scratch = self.scratch_dir(block)?;
        tokio::fs::create_dir_all(&scratch).await?;

        debug!(block = %block, index = request.index, "Computing proof");
        let result = self.prove_in(&scratch, request).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = ?scratch, error = %e, "Failed to remove prover scratch dir");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::FieldElement;
    use pos_merkle::{MerkleCommitment, ProofRequestQueue};

    const PROOF_JSON: &str = r#"{
        "scheme": "g16",
        "proof": {
            "a": ["0x01", "0x02"],
            "b": [["0x03", "0x04"], ["0x05", "0x06"]],
            "c": ["0x07", "0x08"]
        },
        "inputs": []
    }"#;

    fn request() -> ProofRequest {
        let commitment = MerkleCommitment::build(&[5u8; 200], 64, 4).unwrap();
        ProofRequestQueue::new(&commitment, &[1]).unwrap().pop().unwrap()
    }

    #[test]
    fn test_parse_proof_json() {
        let tuple = parse_proof_json(PROOF_JSON.as_bytes()).unwrap();
        assert_eq!(tuple.a[1], FieldElement::from_hex("0x02").unwrap());
        assert_eq!(tuple.b[1][0], FieldElement::from_hex("0x05").unwrap());
        assert_eq!(tuple.c[0], FieldElement::from_hex("0x07").unwrap());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_proof_json(b"not json"),
            Err(ProverError::Malformed(_))
        ));
        assert!(parse_proof_json(br#"{"proof":{"a":["0x01"],"b":[],"c":[]}}"#).is_err());
        assert!(parse_proof_json(
            br#"{"proof":{"a":["zz","0x02"],"b":[["0x03","0x04"],["0x05","0x06"]],"c":["0x07","0x08"]}}"#
        )
        .is_err());
    }

    #[test]
    fn test_program_resolution() {
        let p = ZokratesProver::new("./zokrates", "/opt/zok", Duration::from_secs(1));
        assert_eq!(p.program, PathBuf::from("/opt/zok/zokrates"));

        let p = ZokratesProver::new("zokrates", "/opt/zok", Duration::from_secs(1));
        assert_eq!(p.program, PathBuf::from("zokrates"));

        let p = ZokratesProver::new("/usr/bin/zokrates", "/opt/zok", Duration::from_secs(1));
        assert_eq!(p.program, PathBuf::from("/usr/bin/zokrates"));
    }

    #[tokio::test]
    async fn test_pool_id_cannot_escape_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let prover = ZokratesProver::new("zokrates", &work, Duration::from_secs(1));

        for pool in ["../escape", "a/b", "/abs", "x/.."] {
            let err = prover
                .prove(&BlockRef::new(pool, 1), &request())
                .await
                .unwrap_err();
            assert!(
                matches!(&err, ProverError::UnsafePoolId(p) if p == pool),
                "unexpected error for {}: {}",
                pool,
                err
            );
        }
        assert!(!dir.path().join("escape_1").exists());
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);

        assert_eq!(
            prover.scratch_dir(&BlockRef::new("pool-a", 7)).unwrap(),
            work.join("pool-a_7")
        );
    }

    #[cfg(unix)]
    fn install_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-prover");
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_success_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let script = install_script(
            dir.path(),
            r#"case "$1" in
  compute-witness)
    echo "$#" > argc
    for a in "$@"; do out="$a"; done
    echo witness > "$out" ;;
  generate-proof)
    test -f "$3" || exit 3
    cat > "$5" <<EOF
{"proof":{"a":["0x01","0x02"],"b":[["0x03","0x04"],["0x05","0x06"]],"c":["0x07","0x08"]}}
EOF
    ;;
  *) exit 2 ;;
esac
"#,
        );
        let prover = ZokratesProver::new(&script, dir.path(), Duration::from_secs(10));
        let block = BlockRef::new("pool-a", 3);
        let req = request();

        let tuple = prover.prove(&block, &req).await.unwrap();
        assert_eq!(tuple.c[1], FieldElement::from_hex("0x08").unwrap());

        let argc: usize = std::fs::read_to_string(dir.path().join("argc"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(argc, req.witness_args().len() + 4);
        assert!(!dir.path().join("pool-a_3").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = install_script(dir.path(), "echo boom >&2\nexit 1\n");
        let prover = ZokratesProver::new(&script, dir.path(), Duration::from_secs(10));

        let err = prover
            .prove(&BlockRef::new("p", 1), &request())
            .await
            .unwrap_err();
        match err {
            ProverError::Exit { step, stderr, .. } => {
                assert_eq!(step, "compute-witness");
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dir.path().join("p_1").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = install_script(dir.path(), "sleep 5\n");
        let prover = ZokratesProver::new(&script, dir.path(), Duration::from_millis(200));

        let err = prover
            .prove(&BlockRef::new("p", 2), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProverError::Timeout { step: "compute-witness", .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = install_script(dir.path(), "exit 0\n");
        let prover = ZokratesProver::new(&script, dir.path(), Duration::from_secs(10));

        let err = prover
            .prove(&BlockRef::new("p", 3), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProverError::Io(_)));
    }
}
