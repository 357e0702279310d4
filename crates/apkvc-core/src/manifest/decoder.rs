//! Binary XML decoding for `AndroidManifest.xml`.
//!
//! Packaged manifests are stored as Android binary XML. The [`Decoder`] trait
//! turns one into text XML; [`JavaDecoder`] does it by running
//! `AXMLPrinter2.jar` on a JVM. Callers never see how decoding happens, so a
//! native decoder can replace the JVM without touching the pipeline.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{LazyLock, OnceLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;
use wait_timeout::ChildExt;

use crate::config::DecoderConfig;

#[derive(Error, Debug)]
pub enum DecodeError {
    /// The runtime the decoder needs is missing, too old, or hung.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The decoder ran but could not decode the input.
    #[error("Decoder failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Text XML produced by a [`Decoder`].
///
/// The file lives in a scratch directory owned by this value and is deleted
/// when it is dropped.
#[derive(Debug)]
pub struct DecodedManifest {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl DecodedManifest {
    /// Wrap an output file that lives inside `scratch`.
    pub fn in_scratch(path: PathBuf, scratch: TempDir) -> Self {
        Self {
            path,
            _scratch: Some(scratch),
        }
    }

    /// Wrap an output file the caller manages.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            _scratch: None,
        }
    }

    /// Path of the decoded XML.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Converts a binary manifest into text XML.
pub trait Decoder: fmt::Debug + Send + Sync {
    /// Decode the binary manifest at `input`.
    fn decode(&self, input: &Path) -> Result<DecodedManifest, DecodeError>;

    /// Verify the decoder's runtime dependencies are present.
    fn check(&self) -> Result<String, DecodeError> {
        Ok("ready".to_string())
    }
}

/// Runs `java -jar AXMLPrinter2.jar <manifest>` and captures stdout.
#[derive(Debug)]
pub struct JavaDecoder {
    java: Option<PathBuf>,
    jar: PathBuf,
    timeout: Duration,
    min_major: u32,
    probed_major: OnceLock<u32>,
}

impl JavaDecoder {
    /// Build a decoder from configuration. The JVM is not probed until first use.
    pub fn new(config: &DecoderConfig) -> Self {
        let java = config
            .java
            .clone()
            .or_else(|| which::which("java").ok());
        Self {
            java,
            jar: config.jar.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            min_major: config.min_java_major,
            probed_major: OnceLock::new(),
        }
    }

    fn java(&self) -> Result<&Path, DecodeError> {
        self.java.as_deref().ok_or_else(|| {
            DecodeError::DependencyUnavailable(format!(
                "Java {} or higher is not installed",
                self.min_major
            ))
        })
    }

    /// Major version of the JVM, probed once with `java -version`.
    ///
    /// Fails if Java is missing, unparseable, or older than the configured minimum.
    pub fn java_major(&self) -> Result<u32, DecodeError> {
        if let Some(major) = self.probed_major.get() {
            return Ok(*major);
        }

        let java = self.java()?;
        let mut command = Command::new(java);
        command.arg("-version").stdout(Stdio::null());
        let (status, stderr) = run_bounded(command, self.timeout, "java -version")?;
        if !status.success() {
            return Err(DecodeError::DependencyUnavailable(format!(
                "java -version exited with {status}"
            )));
        }

        let major = parse_java_major(&stderr).ok_or_else(|| {
            DecodeError::DependencyUnavailable(format!(
                "could not determine Java version from: {}",
                stderr.trim()
            ))
        })?;
        if major < self.min_major {
            return Err(DecodeError::DependencyUnavailable(format!(
                "Java {} or higher is required, found Java {major}",
                self.min_major
            )));
        }

        tracing::debug!(java = %java.display(), major, "java runtime available");
        Ok(*self.probed_major.get_or_init(|| major))
    }
}

impl Decoder for JavaDecoder {
    fn decode(&self, input: &Path) -> Result<DecodedManifest, DecodeError> {
        self.java_major()?;
        if !self.jar.is_file() {
            return Err(DecodeError::DependencyUnavailable(format!(
                "decoder jar not found at {}",
                self.jar.display()
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("apkvc-decode-")
            .tempdir()?;
        let output = scratch.path().join("ManifestDecode.xml");
        let stdout = File::create(&output)?;

        let mut command = Command::new(self.java()?);
        command
            .arg("-jar")
            .arg(&self.jar)
            .arg(input)
            .stdout(Stdio::from(stdout));

        tracing::debug!(manifest = %input.display(), "decoding binary manifest");
        let (status, stderr) = run_bounded(command, self.timeout, "manifest decoder")?;
        if !status.success() {
            return Err(DecodeError::Failed(format!(
                "{status}: {}",
                stderr.trim()
            )));
        }
        if std::fs::metadata(&output)?.len() == 0 {
            return Err(DecodeError::Failed("decoder produced no output".to_string()));
        }

        Ok(DecodedManifest::in_scratch(output, scratch))
    }

    fn check(&self) -> Result<String, DecodeError> {
        let major = self.java_major()?;
        if !self.jar.is_file() {
            return Err(DecodeError::DependencyUnavailable(format!(
                "decoder jar not found at {}",
                self.jar.display()
            )));
        }
        Ok(format!("Java {major}, {}", self.jar.display()))
    }
}

/// Run a command to completion within `timeout`, collecting stderr.
///
/// On timeout the child is killed and reaped.
fn run_bounded(
    mut command: Command,
    timeout: Duration,
    what: &str,
) -> Result<(ExitStatus, String), DecodeError> {
    command.stdin(Stdio::null()).stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|e| {
        DecodeError::DependencyUnavailable(format!("failed to start {what}: {e}"))
    })?;

    // Drain stderr on a side thread so a chatty child cannot block on a full pipe.
    let stderr = child.stderr.take();
    let reader = thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut text);
        }
        text
    });

    if let Some(status) = child.wait_timeout(timeout)? {
        let stderr = reader.join().unwrap_or_default();
        Ok((status, stderr))
    } else {
        let _ = child.kill();
        let _ = child.wait();
        // The reader thread ends once every holder of the pipe has exited.
        drop(reader);
        Err(DecodeError::DependencyUnavailable(format!(
            "{what} timed out after {}s",
            timeout.as_secs()
        )))
    }
}

static QUOTED_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"version "([^"]+)""#).expect("quoted version regex is valid")
});

static BARE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("bare version regex is valid"));

/// Extract the major version from `java -version` output.
///
/// `1.8.0_292` is Java 8; `17.0.2` is 17; `21` is 21.
pub fn parse_java_major(output: &str) -> Option<u32> {
    let version = match QUOTED_VERSION_RE.captures(output) {
        Some(caps) => caps.get(1)?.as_str(),
        None => BARE_VERSION_RE.find(output)?.as_str(),
    };

    let mut parts = version.split(['.', '_', '-', '+']);
    let first = leading_number(parts.next()?)?;
    if first == 1 {
        leading_number(parts.next()?)
    } else {
        Some(first)
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
