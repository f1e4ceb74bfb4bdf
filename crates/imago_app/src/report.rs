//! JSON imaging report written next to the completed image.

use anyhow::Result;
use chrono::Utc;
use imago_core::{Device, DigestReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ImagingReport {
    device: String,
    label: String,
    device_size: u64,
    destination: String,
    block_size: u64,
    parallelism: usize,
    bytes_written: u64,
    elapsed_seconds: f64,
    completed_at: String,
    image_digests: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_digests: Option<BTreeMap<&'static str, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verified: Option<bool>,
}

fn digest_map(report: &DigestReport) -> BTreeMap<&'static str, String> {
    report
        .entries()
        .iter()
        .map(|(algorithm, hex)| (algorithm.name(), hex.clone()))
        .collect()
}

/// `<image>.report.json`, next to the image itself.
pub fn report_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_os_string();
    name.push(".report.json");
    PathBuf::from(name)
}

#[allow(clippy::too_many_arguments)]
pub fn write_report(
    device: &Device,
    destination: &Path,
    block_size: u64,
    parallelism: usize,
    bytes_written: u64,
    elapsed_seconds: f64,
    image_digests: &DigestReport,
    source_digests: Option<&DigestReport>,
    verified: Option<bool>,
) -> Result<PathBuf> {
    let report = ImagingReport {
        device: device.identity.clone(),
        label: device.label.clone(),
        device_size: device.size_bytes,
        destination: destination.display().to_string(),
        block_size,
        parallelism,
        bytes_written,
        elapsed_seconds,
        completed_at: Utc::now().to_rfc3339(),
        image_digests: digest_map(image_digests),
        source_digests: source_digests.map(digest_map),
        verified,
    };

    let path = report_path(destination);
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imago_core::{DigestAccumulator, DigestAlgorithm};
    use tempfile::TempDir;

    #[test]
    fn test_report_path_appends_suffix() {
        let path = report_path(Path::new("/data/sda.img"));
        assert_eq!(path, Path::new("/data/sda.img.report.json"));
    }

    #[test]
    fn test_write_report_round_trips() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("disk.img");

        let mut accumulator = DigestAccumulator::new(&[DigestAlgorithm::Sha256]);
        accumulator.update(b"payload");
        let digests = accumulator.finalize();

        let device = Device::new("/dev/sdz", "sdz", 7, 512);
        let path = write_report(
            &device,
            &image,
            1024,
            1,
            7,
            0.5,
            &digests,
            None,
            None,
        )
        .unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["device"], "/dev/sdz");
        assert_eq!(parsed["bytes_written"], 7);
        assert_eq!(
            parsed["image_digests"]["sha256"],
            digests.get(DigestAlgorithm::Sha256).unwrap()
        );
        assert!(parsed.get("verified").is_none());
    }
}
