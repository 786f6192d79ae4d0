//! Operations behind the command line: convert, validate, report, register
//! and list.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::{HilError, Result};
use crate::hil::models::GoldenDeviceInfo;
use crate::hil::registry::GoldenDeviceRegistry;
use crate::hil::reporter;
use crate::hil::validator::{self, ValidationResult};
use crate::scenario::model::ProtocolScenario;
use crate::scenario::synthesizer::{ConversionOptions, ScenarioSynthesizer};
use crate::usb::capture;

/// Read a capture file and synthesize a scenario from it.
pub fn convert_capture(input: impl AsRef<Path>, protocol: &str, options: &ConversionOptions) -> Result<ProtocolScenario> {
    let input = input.as_ref();
    let packets = capture::parse_file(input)?;
    debug!("Converting {} packets from {}", packets.len(), input.display());
    Ok(ScenarioSynthesizer::default().synthesize(&packets, protocol, options))
}

/// Scenarios loaded for a validation run, with the comparison result.
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub actual: ProtocolScenario,
    pub golden: ProtocolScenario,
    pub result: ValidationResult,
}

/// Load two scenario files and compare `actual` against `golden`.
pub fn validate_files(actual: impl AsRef<Path>, golden: impl AsRef<Path>, tolerance: f64) -> Result<FileValidation> {
    let actual = ProtocolScenario::load(actual)?;
    let golden = ProtocolScenario::load(golden)?;
    let result = validator::validate(&actual, &golden, tolerance);
    Ok(FileValidation { actual, golden, result })
}

pub fn write_report(result: &ValidationResult, subject: &str, protocol: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, reporter::render(result, subject, protocol)).map_err(|e| HilError::io(path, e))?;
    info!("Wrote HIL report to {}", path.display());
    Ok(())
}

/// Register `scenario_path` as the golden `protocol` scenario of a device.
///
/// An existing entry keeps its other protocols, manufacturer, firmware
/// version and chipset; only `model` and this protocol's path change.
pub fn register_device(
    registry: &mut GoldenDeviceRegistry,
    device_id: &str,
    model: &str,
    protocol: &str,
    scenario_path: impl AsRef<Path>,
) -> Result<GoldenDeviceInfo> {
    let scenario_path = scenario_path.as_ref();
    // Reject paths that do not hold a usable scenario.
    ProtocolScenario::load(scenario_path)?;

    let mut info = match registry.get(device_id) {
        Some(existing) => existing.clone(),
        None => GoldenDeviceInfo::new(device_id, model),
    };
    info.model = model.to_string();
    info.scenarios
        .insert(protocol.to_string(), scenario_path.display().to_string());

    Ok(registry.register(info)?.clone())
}

pub fn list_devices(registry: &GoldenDeviceRegistry) -> impl Iterator<Item = &GoldenDeviceInfo> {
    registry.list()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::model::ScenarioStep;
    use crate::usb::packet_types::UsbDirection;
    use tempfile::tempdir;

    fn write_scenario(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        ProtocolScenario::new(name, "sahara")
            .with_step(ScenarioStep::new(UsbDirection::DeviceToHost, "Sahara_Hello", &[1, 0, 0, 0]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn capture_without_usb_packets_converts_to_empty_scenario() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("noise.pcap");
        fs::write(&input, b"definitely not a capture").unwrap();

        let scenario = convert_capture(&input, "firehose", &ConversionOptions::default()).unwrap();
        assert!(scenario.steps.is_empty());
        assert_eq!(scenario.protocol, "firehose");

        let output = dir.path().join("empty.json");
        scenario.save(&output).unwrap();
        assert_eq!(ProtocolScenario::load(&output).unwrap(), scenario);
    }

    #[test]
    fn register_merges_protocols() {
        let dir = tempdir().unwrap();
        let sahara = write_scenario(dir.path(), "sahara.json");
        let firehose = write_scenario(dir.path(), "firehose.json");
        let mut registry = GoldenDeviceRegistry::new(dir.path().join("registry"));

        register_device(&mut registry, "dev", "old", "sahara", &sahara).unwrap();
        let info = register_device(&mut registry, "dev", "new", "firehose", &firehose).unwrap();

        assert_eq!(info.model, "new");
        assert_eq!(info.scenarios.len(), 2);
        assert_eq!(list_devices(&registry).count(), 1);
    }

    #[test]
    fn register_keeps_existing_device_details() {
        let dir = tempdir().unwrap();
        let firehose = write_scenario(dir.path(), "firehose.json");
        let mut registry = GoldenDeviceRegistry::new(dir.path().join("registry"));

        let mut existing = GoldenDeviceInfo::new("dev", "Mi 10").with_scenario("sahara", "sahara.json");
        existing.manufacturer = "Xiaomi".to_string();
        existing.firmware_version = "V14".to_string();
        existing.chipset = Some("SM8250".to_string());
        registry.register(existing).unwrap();

        let info = register_device(&mut registry, "dev", "Mi 10 Pro", "firehose", &firehose).unwrap();
        assert_eq!(info.model, "Mi 10 Pro");
        assert_eq!(info.manufacturer, "Xiaomi");
        assert_eq!(info.firmware_version, "V14");
        assert_eq!(info.chipset.as_deref(), Some("SM8250"));
        assert_eq!(info.scenarios.get("sahara").map(String::as_str), Some("sahara.json"));
        assert!(info.scenarios.contains_key("firehose"));

        let reloaded = GoldenDeviceRegistry::new(dir.path().join("registry"));
        assert_eq!(reloaded.get("dev").map(|d| d.manufacturer.as_str()), Some("Xiaomi"));
    }

    #[test]
    fn register_rejects_missing_scenario() {
        let dir = tempdir().unwrap();
        let mut registry = GoldenDeviceRegistry::new(dir.path());
        let err = register_device(&mut registry, "dev", "m", "sahara", dir.path().join("missing.json"));
        assert!(matches!(err, Err(HilError::Io { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn validate_files_reports_load_errors() {
        let dir = tempdir().unwrap();
        let good = write_scenario(dir.path(), "good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "[]").unwrap();

        let validation = validate_files(&good, &good, 0.2).unwrap();
        assert!(validation.result.is_match);
        assert_eq!(validation.actual.protocol, "sahara");
        assert_eq!(validation.golden.name, "good.json");
        assert!(matches!(validate_files(&good, &bad, 0.2), Err(HilError::ScenarioJson(_))));
    }
}
