//! Parser for the text report printed by `simctl list`.
//!
//! The report has no schema. It is read as a small grammar with one pattern
//! per section, consumed through a single forward-only line iterator:
//!
//! ```text
//! == Device Types ==
//! iPhone 8 (com.apple.CoreSimulator.SimDeviceType.iPhone-8)
//! == Runtimes ==
//! iOS 13.1 (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1)
//! == Devices ==
//! -- iOS 13.1 --
//!     iPhone 8 (5A5D5C5E-4E0E-4A55-9A6C-7C6F1B4C9E32) (Shutdown)
//! == Device Pairs ==
//! ```
//!
//! Each section ends at the line that fails to match its pattern, and that
//! line must be the next section's header. Anything else is an error carrying
//! the offending line; no partial inventory is ever returned.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::model::{Device, DeviceType, InvalidVersion, Runtime, Version};

pub const DEVICE_TYPES_HEADER: &str = "== Device Types ==";
pub const RUNTIMES_HEADER: &str = "== Runtimes ==";
pub const DEVICES_HEADER: &str = "== Devices ==";
pub const DEVICE_PAIRS_HEADER: &str = "== Device Pairs ==";

static DEVICE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[^(]+)\((?P<identifier>[^)]+)\)").expect("device type pattern")
});

// The version captured here omits the revision; the full version sits in the
// first parenthesised group and is not retained.
static RUNTIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<os>i|watch|tv)OS (?P<version>\d+\.\d+)(?P<internal> Internal)? ",
        r"\(\d+\.\d+(\.\d+)? - (?P<build_version>[^)]+)\) ",
        r"\((?P<identifier>[^)]+)\)",
        r"( \((?P<availability>[^)]+)\))?",
    ))
    .expect("runtime pattern")
});

static VERSION_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-- (?P<os>i|watch|tv)OS (?P<version>\d+\.\d+)(?P<internal> Internal)? --")
        .expect("version header pattern")
});

static UNAVAILABLE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-- Unavailable: (?P<identifier>[^ ]+) --").expect("unavailable header pattern")
});

// Names may not contain '(': "iPad Pro (9.7-inch) (<udid>) (Shutdown)" reads
// as name "iPad Pro", udid "9.7-inch", with the real udid taken for the state.
static DEVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?P<name>[^(]+ )\((?P<udid>[^)]+)\) \((?P<state>[^)]+)\)",
        r"( \((?P<availability>[^)]+)\))?",
    ))
    .expect("device pattern")
});

/// Errors raised when the listing does not follow the expected grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line that is neither a section entry nor the expected next header.
    #[error("Expected {expected} header but got: \"{line}\"")]
    UnexpectedLine { expected: &'static str, line: String },

    /// The listing ended before the expected header appeared.
    #[error("Expected {expected} header but the listing ended")]
    UnexpectedEnd { expected: &'static str },

    /// A version field that is not dotted integers.
    #[error(transparent)]
    InvalidVersion(#[from] InvalidVersion),

    /// A device section names a runtime missing from the runtimes section.
    #[error("Device section \"{line}\" refers to runtime {version} (internal: {internal}) which was not listed")]
    UnknownRuntime {
        version: Version,
        internal: bool,
        line: String,
    },
}

/// Device types and runtimes (with their devices) read from one listing.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub device_types: Vec<DeviceType>,
    pub runtimes: Vec<Runtime>,
}

/// Parses a complete `simctl list` report.
///
/// `lines` is consumed once, front to back, and parsing stops at the
/// `== Device Pairs ==` header; pairing information is not modelled.
pub fn parse_listing<I, S>(lines: I) -> Result<Inventory, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = lines.into_iter();
    let mut inventory = Inventory::default();

    match lines.next() {
        Some(line) => expect_header(DEVICE_TYPES_HEADER, line.as_ref().trim_end())?,
        None => {
            return Err(ParseError::UnexpectedEnd {
                expected: DEVICE_TYPES_HEADER,
            })
        }
    }
    parse_device_types(&mut lines, &mut inventory.device_types)?;
    let platforms = parse_runtimes(&mut lines, &mut inventory.runtimes)?;
    parse_devices(&mut lines, &mut inventory.runtimes, &platforms)?;

    debug!(
        device_types = inventory.device_types.len(),
        runtimes = inventory.runtimes.len(),
        devices = inventory.runtimes.iter().map(|r| r.devices.len()).sum::<usize>(),
        "parsed simctl listing"
    );
    Ok(inventory)
}

fn expect_header(expected: &'static str, line: &str) -> Result<(), ParseError> {
    if line == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedLine {
            expected,
            line: line.to_string(),
        })
    }
}

fn parse_device_types<I, S>(lines: &mut I, device_types: &mut Vec<DeviceType>) -> Result<(), ParseError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    for line in lines {
        let line = line.as_ref().trim_end();
        let Some(caps) = DEVICE_TYPE_RE.captures(line) else {
            return expect_header(RUNTIMES_HEADER, line);
        };
        device_types.push(DeviceType::new(caps["name"].trim_end(), &caps["identifier"]));
    }
    Err(ParseError::UnexpectedEnd {
        expected: RUNTIMES_HEADER,
    })
}

/// Returns the OS family (`i`, `watch`, `tv`) of each runtime, index-aligned
/// with `runtimes`.
fn parse_runtimes<I, S>(lines: &mut I, runtimes: &mut Vec<Runtime>) -> Result<Vec<String>, ParseError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let mut platforms = Vec::new();
    for line in lines {
        let line = line.as_ref().trim_end();
        let Some(caps) = RUNTIME_RE.captures(line) else {
            expect_header(DEVICES_HEADER, line)?;
            return Ok(platforms);
        };
        let version: Version = caps["version"].parse()?;
        platforms.push(caps["os"].to_string());
        runtimes.push(Runtime::new(
            version,
            &caps["identifier"],
            caps.name("availability").is_none(),
            caps.name("internal").is_some(),
        ));
    }
    Err(ParseError::UnexpectedEnd {
        expected: DEVICES_HEADER,
    })
}

fn parse_devices<I, S>(
    lines: &mut I,
    runtimes: &mut [Runtime],
    platforms: &[String],
) -> Result<(), ParseError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    // Index of the runtime whose section is being read; None inside
    // "-- Unavailable: ... --" sections, whose devices are skipped.
    let mut current: Option<usize> = None;

    for line in lines {
        let line = line.as_ref().trim_end();

        if let Some(caps) = VERSION_HEADER_RE.captures(line) {
            let version: Version = caps["version"].parse()?;
            let internal = caps.name("internal").is_some();
            let platform = &caps["os"];
            let index = runtimes
                .iter()
                .zip(platforms)
                .position(|(r, p)| p == platform && r.version == version && r.is_internal == internal)
                .ok_or_else(|| ParseError::UnknownRuntime {
                    version,
                    internal,
                    line: line.to_string(),
                })?;
            current = Some(index);
            continue;
        }

        if UNAVAILABLE_HEADER_RE.is_match(line) {
            current = None;
            continue;
        }

        let Some(caps) = DEVICE_RE.captures(line) else {
            return expect_header(DEVICE_PAIRS_HEADER, line);
        };
        if let Some(index) = current {
            let runtime = &mut runtimes[index];
            let device = Device::new(
                caps["name"].trim_end(),
                &caps["udid"],
                caps.name("availability").is_none(),
                runtime.reference(),
            );
            runtime.devices.push(device);
        }
    }
    Err(ParseError::UnexpectedEnd {
        expected: DEVICE_PAIRS_HEADER,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
== Device Types ==
iPhone 8 (com.apple.CoreSimulator.SimDeviceType.iPhone-8)
iPad Pro (12.9-inch) (3rd generation) (com.apple.CoreSimulator.SimDeviceType.iPad-Pro--12-9-inch---3rd-generation-)
Apple Watch Series 5 - 44mm (com.apple.CoreSimulator.SimDeviceType.Apple-Watch-Series-5-44mm)
== Runtimes ==
iOS 12.4 (12.4 - 16G73) (com.apple.CoreSimulator.SimRuntime.iOS-12-4)
iOS 13.1 (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1)
iOS 13.1 Internal (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1-Internal)
watchOS 6.0 (6.0 - 17R566) (com.apple.CoreSimulator.SimRuntime.watchOS-6-0) (unavailable, runtime path not found)
== Devices ==
-- iOS 12.4 --
    iPhone 8 (11111111-1111-1111-1111-111111111111) (Shutdown)
-- iOS 13.1 --
    iPhone 8 (22222222-2222-2222-2222-222222222222) (Booted)
    iPhone 8 WebKit Tester0 (33333333-3333-3333-3333-333333333333) (Shutdown) (unavailable, device type profile not found)
-- iOS 13.1 Internal --
    iPhone 8 (44444444-4444-4444-4444-444444444444) (Shutdown)
-- Unavailable: com.apple.CoreSimulator.SimRuntime.watchOS-6-0 --
    Apple Watch Series 5 - 44mm (55555555-5555-5555-5555-555555555555) (Shutdown) (unavailable, runtime profile not found)
== Device Pairs ==
";

    #[test]
    fn test_parse_device_types() {
        let inventory = parse_listing(LISTING.lines()).unwrap();
        assert_eq!(inventory.device_types.len(), 3);
        assert_eq!(inventory.device_types[0].name, "iPhone 8");
        assert_eq!(
            inventory.device_types[0].identifier,
            "com.apple.CoreSimulator.SimDeviceType.iPhone-8"
        );
        // Names with their own parentheses keep only the leading text.
        assert_eq!(inventory.device_types[1].name, "iPad Pro");
        assert_eq!(inventory.device_types[1].identifier, "12.9-inch");
    }

    #[test]
    fn test_parse_runtimes() {
        let inventory = parse_listing(LISTING.lines()).unwrap();
        let runtimes = &inventory.runtimes;
        assert_eq!(runtimes.len(), 4);

        assert_eq!(runtimes[0].version, Version::from([12, 4]));
        assert!(runtimes[0].available);
        assert!(!runtimes[0].is_internal);

        assert_eq!(runtimes[2].identifier, "com.apple.CoreSimulator.SimRuntime.iOS-13-1-Internal");
        assert!(runtimes[2].is_internal);

        assert_eq!(runtimes[3].version, Version::from([6, 0]));
        assert!(!runtimes[3].available);
    }

    #[test]
    fn test_devices_attach_to_matching_runtime_in_order() {
        let inventory = parse_listing(LISTING.lines()).unwrap();
        let runtimes = &inventory.runtimes;

        let udids = |i: usize| -> Vec<&str> {
            runtimes[i].devices.iter().map(|d| d.udid.as_str()).collect()
        };
        assert_eq!(udids(0), ["11111111-1111-1111-1111-111111111111"]);
        assert_eq!(
            udids(1),
            [
                "22222222-2222-2222-2222-222222222222",
                "33333333-3333-3333-3333-333333333333"
            ]
        );
        assert_eq!(udids(2), ["44444444-4444-4444-4444-444444444444"]);

        let tester = &runtimes[1].devices[1];
        assert_eq!(tester.name, "iPhone 8 WebKit Tester0");
        assert!(!tester.available);
        assert!(tester.runtime.refers_to(&runtimes[1]));
    }

    #[test]
    fn test_unavailable_section_devices_are_skipped() {
        let inventory = parse_listing(LISTING.lines()).unwrap();
        assert!(inventory.runtimes[3].devices.is_empty());
        let total: usize = inventory.runtimes.iter().map(|r| r.devices.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_missing_device_types_header() {
        let err = parse_listing(["Device Types:", "iPhone 8 (x)"]).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedLine {
                expected: DEVICE_TYPES_HEADER,
                line: "Device Types:".to_string(),
            }
        );
    }

    #[test]
    fn test_garbage_instead_of_runtimes_header() {
        let lines = [
            "== Device Types ==",
            "iPhone 8 (com.apple.CoreSimulator.SimDeviceType.iPhone-8)",
            "garbage line",
            "== Runtimes ==",
        ];
        let err = parse_listing(lines).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedLine {
                expected: RUNTIMES_HEADER,
                line: "garbage line".to_string(),
            }
        );
        assert!(err.to_string().contains("garbage line"));
    }

    #[test]
    fn test_unrecognized_runtime_line() {
        let lines = [
            "== Device Types ==",
            "== Runtimes ==",
            "iOS 13.1 (13.1 - 17A844) - com.apple.CoreSimulator.SimRuntime.iOS-13-1",
        ];
        let err = parse_listing(lines).unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedLine { expected: DEVICES_HEADER, .. }
        ));
    }

    #[test]
    fn test_missing_device_pairs_header() {
        let lines = [
            "== Device Types ==",
            "== Runtimes ==",
            "== Devices ==",
            "== Pairs ==",
        ];
        let err = parse_listing(lines).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedLine {
                expected: DEVICE_PAIRS_HEADER,
                line: "== Pairs ==".to_string(),
            }
        );
    }

    #[test]
    fn test_truncated_listing_is_an_error() {
        assert_eq!(
            parse_listing(Vec::<String>::new()).unwrap_err(),
            ParseError::UnexpectedEnd { expected: DEVICE_TYPES_HEADER }
        );
        let lines = [
            "== Device Types ==",
            "iPhone 8 (com.apple.CoreSimulator.SimDeviceType.iPhone-8)",
        ];
        assert_eq!(
            parse_listing(lines).unwrap_err(),
            ParseError::UnexpectedEnd { expected: RUNTIMES_HEADER }
        );
        let lines = ["== Device Types ==", "== Runtimes ==", "== Devices =="];
        assert_eq!(
            parse_listing(lines).unwrap_err(),
            ParseError::UnexpectedEnd { expected: DEVICE_PAIRS_HEADER }
        );
    }

    #[test]
    fn test_device_section_for_unlisted_runtime() {
        let lines = [
            "== Device Types ==",
            "== Runtimes ==",
            "iOS 13.1 (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1)",
            "== Devices ==",
            "-- iOS 13.1 Internal --",
        ];
        let err = parse_listing(lines).unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnknownRuntime { internal: true, .. }
        ));
    }

    #[test]
    fn test_devices_before_any_section_are_ignored() {
        let lines = [
            "== Device Types ==",
            "== Runtimes ==",
            "== Devices ==",
            "    iPhone 8 (11111111-1111-1111-1111-111111111111) (Shutdown)",
            "== Device Pairs ==",
        ];
        let inventory = parse_listing(lines).unwrap();
        assert!(inventory.runtimes.is_empty());
    }

    #[test]
    fn test_parenthesised_device_name_is_split_at_first_paren() {
        let lines = [
            "== Device Types ==",
            "== Runtimes ==",
            "iOS 13.1 (13.1 - 17A844) (com.apple.CoreSimulator.SimRuntime.iOS-13-1)",
            "== Devices ==",
            "-- iOS 13.1 --",
            "    iPad Pro (9.7-inch) (55555555-5555-5555-5555-555555555555) (Shutdown)",
            "== Device Pairs ==",
        ];
        let inventory = parse_listing(lines).unwrap();
        let device = &inventory.runtimes[0].devices[0];
        assert_eq!(device.name, "iPad Pro");
        assert_eq!(device.udid, "9.7-inch");
        assert!(!device.available);
    }

    #[test]
    fn test_trailing_pairs_content_is_not_read() {
        let listing = format!("{}not a device pair line\n", LISTING);
        assert!(parse_listing(listing.lines()).is_ok());
    }

    #[test]
    fn test_crlf_line_endings() {
        let listing = LISTING.replace('\n', "\r\n");
        let inventory = parse_listing(listing.split('\n')).unwrap();
        assert_eq!(inventory.runtimes.len(), 4);
    }
}
