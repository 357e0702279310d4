//! Manifest version reader
//!
//! Reads `android:versionName` from the `AndroidManifest.xml` at the root of
//! an extracted APK. Text manifests are parsed directly; binary ones go
//! through a [`Decoder`] first.

pub mod decoder;

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

pub use decoder::{DecodeError, DecodedManifest, Decoder, JavaDecoder};

/// Manifest filename at the APK root.
pub const MANIFEST_FILE: &str = "AndroidManifest.xml";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("{MANIFEST_FILE} not found in {}", .0.display())]
    Missing(PathBuf),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Attributes read from the root `<manifest>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    /// `package` attribute (application id).
    pub package: Option<String>,
    /// `android:versionName`, never empty.
    pub version_name: String,
    /// `android:versionCode`, when present and numeric.
    pub version_code: Option<u64>,
}

/// Read the version name of an extracted APK.
pub fn read_version(extracted_dir: &Path, decoder: &dyn Decoder) -> Result<String, ManifestError> {
    read_manifest(extracted_dir, decoder).map(|info| info.version_name)
}

/// Read the root manifest attributes of an extracted APK.
pub fn read_manifest(
    extracted_dir: &Path,
    decoder: &dyn Decoder,
) -> Result<ManifestInfo, ManifestError> {
    let path = extracted_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ManifestError::Missing(extracted_dir.to_path_buf()));
    }

    let bytes = fs::read(&path)?;
    if let Some(text) = as_text_xml(&bytes) {
        tracing::debug!(manifest = %path.display(), "manifest is text XML");
        return parse_manifest_xml(text);
    }

    let decoded = decoder.decode(&path)?;
    let raw = fs::read(decoded.path())?;
    let text = String::from_utf8_lossy(&raw);
    parse_manifest_xml(&text)
}

/// Returns the manifest as text if it is already text XML.
///
/// Binary XML starts with a `0x0003` chunk header, never with `<`.
pub fn as_text_xml(bytes: &[u8]) -> Option<&str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).ok()?;
    text.trim_start().starts_with('<').then_some(text)
}

/// Parse text XML and read the root `<manifest>` attributes.
///
/// The whole document must be well formed, including every end tag.
pub fn parse_manifest_xml(xml: &str) -> Result<ManifestInfo, ManifestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<ManifestInfo> = None;
    let mut depth = 0usize;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| ManifestError::VersionNotFound(format!("malformed manifest XML: {e}")))?;
        match event {
            Event::Start(element) => {
                if root.is_none() {
                    root = Some(root_attributes(&element)?);
                }
                depth += 1;
            }
            Event::Empty(element) if root.is_none() => {
                root = Some(root_attributes(&element)?);
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    // quick-xml reports Eof without complaining about open elements.
    if depth > 0 {
        return Err(ManifestError::VersionNotFound(
            "malformed manifest XML: unclosed element".into(),
        ));
    }

    root.ok_or_else(|| ManifestError::VersionNotFound("manifest XML has no root element".into()))
}

fn root_attributes(element: &BytesStart<'_>) -> Result<ManifestInfo, ManifestError> {
    if element.local_name().as_ref() != b"manifest" {
        return Err(ManifestError::VersionNotFound(format!(
            "root element is <{}>, expected <manifest>",
            String::from_utf8_lossy(element.name().as_ref())
        )));
    }

    let mut package = None;
    let mut version_name = None;
    let mut version_code = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            ManifestError::VersionNotFound(format!("malformed manifest attribute: {e}"))
        })?;
        let value: Cow<'_, str> = attr.unescape_value().map_err(|e| {
            ManifestError::VersionNotFound(format!("malformed manifest attribute: {e}"))
        })?;

        match attr.key.local_name().as_ref() {
            b"package" => package = Some(value.into_owned()),
            b"versionName" => version_name = Some(value.trim().to_string()),
            b"versionCode" => version_code = value.trim().parse().ok(),
            _ => {}
        }
    }

    let version_name = version_name
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ManifestError::VersionNotFound("android:versionName is missing".into()))?;

    Ok(ManifestInfo {
        package,
        version_name,
        version_code,
    })
}
