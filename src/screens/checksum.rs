//! Checksums of the selected files, optionally compared to an expected value.
//!
//! Files are streamed through the hasher in fixed-size chunks so large
//! inputs never sit in memory whole, and cancellation is honoured between
//! chunks. Nothing is written: this screen never registers a save.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::str::FromStr;
use std::sync::mpsc::Receiver;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::batch::run_batch;
use crate::holder::{Activity, BatchSlot, HasActivity, dedup_inputs};
use crate::state::Store;
use crate::task::CancelToken;
use crate::types::{BatchReport, InputRef, ItemError};

const NAME: &str = "checksum";
const CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of a hex digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 56,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('-', "");
        Self::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| format!("unknown hash algorithm: {s}"))
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn stream<D: Digest>(reader: &mut impl Read, token: &CancelToken) -> Result<String, ItemError> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        token.check()?;
        let n = reader
            .read(&mut buf)
            .map_err(|e| ItemError::Decode(e.to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

/// Hex digest of everything `reader` yields.
pub fn digest_reader(
    reader: &mut impl Read,
    algorithm: HashAlgorithm,
    token: &CancelToken,
) -> Result<String, ItemError> {
    match algorithm {
        HashAlgorithm::Sha224 => stream::<Sha224>(reader, token),
        HashAlgorithm::Sha256 => stream::<Sha256>(reader, token),
        HashAlgorithm::Sha384 => stream::<Sha384>(reader, token),
        HashAlgorithm::Sha512 => stream::<Sha512>(reader, token),
    }
}

/// Hex digest of a UTF-8 string.
pub fn digest_text(text: &str, algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha224 => to_hex(&Sha224::digest(text)),
        HashAlgorithm::Sha256 => to_hex(&Sha256::digest(text)),
        HashAlgorithm::Sha384 => to_hex(&Sha384::digest(text)),
        HashAlgorithm::Sha512 => to_hex(&Sha512::digest(text)),
    }
}

/// Digest of one input and, when an expected value was set, whether it
/// matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMatch {
    pub digest: String,
    pub matches: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ChecksumState {
    pub inputs: Vec<InputRef>,
    pub algorithm: HashAlgorithm,
    /// Lowercase hex, whitespace trimmed.
    pub expected: Option<String>,
    pub activity: Activity,
    pub last_report: Option<BatchReport<ChecksumMatch>>,
}

impl HasActivity for ChecksumState {
    fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }
}

pub struct ChecksumScreen {
    store: Store<ChecksumState>,
    slot: BatchSlot,
}

impl Default for ChecksumScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ChecksumScreen {
    pub fn new() -> Self {
        Self {
            store: Store::new(ChecksumState {
                inputs: Vec::new(),
                algorithm: HashAlgorithm::default(),
                expected: None,
                activity: Activity::IDLE,
                last_report: None,
            }),
            slot: BatchSlot::new(NAME),
        }
    }

    pub fn snapshot(&self) -> ChecksumState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<ChecksumState> {
        self.store.subscribe()
    }

    pub fn set_inputs(&self, inputs: impl IntoIterator<Item = InputRef>) {
        let unique = dedup_inputs(inputs);
        self.store.update(|s| {
            s.inputs = unique;
            s.last_report = None;
        });
    }

    pub fn set_algorithm(&self, algorithm: HashAlgorithm) {
        self.store.update(|s| {
            if s.algorithm != algorithm {
                s.algorithm = algorithm;
                s.last_report = None;
            }
        });
    }

    /// Set the digest to compare against. Blank clears it.
    pub fn set_expected(&self, expected: Option<&str>) {
        let expected = expected
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty());
        self.store.update(|s| s.expected = expected);
    }

    /// Hash every input. Returns `false` and does nothing without inputs.
    pub fn run_batch(
        &self,
        on_result: impl FnOnce(BatchReport<ChecksumMatch>) + Send + 'static,
    ) -> bool {
        let (inputs, algorithm, expected) =
            self.store
                .read(|s| (s.inputs.clone(), s.algorithm, s.expected.clone()));
        if inputs.is_empty() {
            return false;
        }
        tracing::info!(screen = NAME, count = inputs.len(), %algorithm, "hashing");

        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let results = run_batch(
                    &inputs,
                    token,
                    |input, _| {
                        let file = File::open(input.path())
                            .map_err(|e| ItemError::Decode(format!("{input}: {e}")))?;
                        let digest =
                            digest_reader(&mut BufReader::new(file), algorithm, token)?;
                        let matches = expected.as_ref().map(|e| *e == digest);
                        Ok(ChecksumMatch { digest, matches })
                    },
                    progress,
                )?;
                Ok(BatchReport::new(results))
            },
            |s, report| s.last_report = Some(report.clone()),
            on_result,
        );
        true
    }

    pub fn cancel(&self) -> bool {
        self.slot.cancel(&self.store)
    }

    pub fn wait(&self) {
        self.slot.wait();
    }
}
