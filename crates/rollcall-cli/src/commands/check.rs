//! `rollcall check` command implementation.
//!
//! Loads a configuration file, runs `RollcallConfig::validate`, then looks for settings that are
//! legal but probably not what the operator meant:
//! - rooms outside the campus boundary or with a radius inside the edge warning ring
//! - scoring thresholds the factor weights make trivial or unreachable
//! - random check settings that can never flag anyone

use anyhow::Result;
use std::path::Path;

use rollcall_core::RollcallConfig;
use rollcall_verify::geofence::haversine_m;

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: String,
    pub message: String,
    /// Location within the configuration (e.g., "geofence.rooms.LAB_201").
    pub location: Option<String>,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            category: category.into(),
            message: message.into(),
            location: None,
        }
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Print human-readable summary, most severe first.
    pub fn print_summary(&self) {
        let mut findings: Vec<&CheckFinding> = self.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.category.cmp(&b.category)));

        for finding in &findings {
            let location = finding
                .location
                .as_ref()
                .map(|l| format!(" [{}]", l))
                .unwrap_or_default();
            println!(
                "  {:<5} [{}]{}: {}",
                finding.severity, finding.category, location, finding.message
            );
        }

        println!();
        println!("{}", "=".repeat(60));
        let errors = self.count(Severity::Error);
        let warnings = self.count(Severity::Warning);
        if errors == 0 && warnings == 0 {
            println!("All checks passed.");
        } else {
            println!("Summary: {} error(s), {} warning(s)", errors, warnings);
        }
    }
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run every check without printing.
pub fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let mut results = CheckResults::default();

    // 1. Parse
    let config = match RollcallConfig::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            results.extend([CheckFinding::error("load", err.to_string())
                .with_location(config_path.display().to_string())]);
            return Ok(results);
        }
    };

    // 2. Structural validation
    if let Err(err) = config.validate() {
        results.extend([CheckFinding::error("validate", err.to_string())]);
    }

    // 3. Rooms
    results.extend(check_rooms(&config));

    // 4. Scoring
    results.extend(check_scoring(&config));

    // 5. Random checks
    results.extend(check_challenges(&config));

    Ok(results)
}

/// Run all checks and print the summary.
pub fn run(config_path: &Path) -> Result<()> {
    println!("Checking {}...", config_path.display());
    println!();

    let results = run_quiet(config_path)?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!(
            "configuration check failed with {} error(s)",
            results.count(Severity::Error)
        );
    }
    Ok(())
}

// ============================================================================
// Checks
// ============================================================================

fn check_rooms(config: &RollcallConfig) -> Vec<CheckFinding> {
    let geofence = &config.geofence;
    let mut findings = Vec::new();

    if geofence.rooms.is_empty() {
        findings.push(
            CheckFinding::warning("rooms", "no rooms configured; every location check will fail")
                .with_location("geofence.rooms"),
        );
    }

    for (id, room) in &geofence.rooms {
        let location = format!("geofence.rooms.{}", id);

        let from_campus = haversine_m(room.lat, room.lng, geofence.campus.lat, geofence.campus.lng);
        if from_campus > geofence.campus.radius_m {
            findings.push(
                CheckFinding::warning(
                    "rooms",
                    format!(
                        "room is {:.0}m from the campus centre, outside the {:.0}m campus radius",
                        from_campus, geofence.campus.radius_m
                    ),
                )
                .with_location(location.clone()),
            );
        }

        let radius = geofence.radius_for(room);
        if radius <= geofence.edge_warning_radius_m {
            findings.push(
                CheckFinding::warning(
                    "rooms",
                    format!(
                        "radius {:.0}m is inside the {:.0}m edge warning ring; the edge tag can never fire",
                        radius, geofence.edge_warning_radius_m
                    ),
                )
                .with_location(location.clone()),
            );
        }

        if room.wifi_bssids.is_empty() && room.beacon_ids.is_empty() {
            findings.push(
                CheckFinding::info("rooms", "no access points or beacons registered; wireless factors unavailable")
                    .with_location(location),
            );
        }
    }

    findings
}

fn check_scoring(config: &RollcallConfig) -> Vec<CheckFinding> {
    let scoring = &config.scoring;
    let weights = &scoring.weights;
    let mut findings = Vec::new();

    if weights.token >= scoring.pass_threshold {
        findings.push(
            CheckFinding::warning(
                "scoring",
                format!(
                    "token weight {} reaches the pass threshold {} on its own",
                    weights.token, scoring.pass_threshold
                ),
            )
            .with_location("scoring.pass_threshold"),
        );
    }

    let without_biometrics = weights.total().saturating_sub(weights.face + weights.liveness);
    if without_biometrics < scoring.pass_threshold {
        findings.push(
            CheckFinding::info(
                "scoring",
                format!(
                    "non-biometric factors reach at most {} of {}; claims need face or liveness to pass",
                    without_biometrics, scoring.pass_threshold
                ),
            )
            .with_location("scoring.weights"),
        );
    }

    findings
}

fn check_challenges(config: &RollcallConfig) -> Vec<CheckFinding> {
    let challenges = &config.challenges;
    let mut findings = Vec::new();
    if !challenges.enabled {
        return findings;
    }

    if challenges.count == 0 {
        findings.push(
            CheckFinding::warning("challenges", "enabled with a count of zero; no checks will be sent")
                .with_location("challenges.count"),
        );
    } else if challenges.failure_threshold() >= challenges.count {
        findings.push(
            CheckFinding::warning(
                "challenges",
                format!(
                    "failure threshold {} is not below the count {}; failed checks can never flag a record",
                    challenges.failure_threshold(),
                    challenges.count
                ),
            )
            .with_location("challenges.fail_threshold"),
        );
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_sample_config_has_no_errors() {
        let file = write_config(
            r#"
geofence:
  rooms:
    ROOM_101:
      lat: 28.6139
      lng: 77.2090
      wifi_bssids: ["aa:bb:cc:dd:ee:01"]
"#,
        );
        let results = run_quiet(file.path()).unwrap();
        assert!(!results.has_errors());
        assert_eq!(results.count(Severity::Warning), 0);
    }

    #[test]
    fn test_example_config_passes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../rollcall.example.yaml");
        let results = run_quiet(&path).unwrap();
        assert!(!results.has_errors(), "{:?}", results.findings);
        assert_eq!(results.count(Severity::Warning), 0);
    }

    #[test]
    fn test_invalid_weights_are_an_error() {
        let file = write_config(
            r#"
scoring:
  weights:
    face: 40
"#,
        );
        let results = run_quiet(file.path()).unwrap();
        assert!(results.has_errors());
        assert!(run(file.path()).is_err());
    }

    #[test]
    fn test_suspicious_settings_are_warnings() {
        let file = write_config(
            r#"
geofence:
  rooms:
    FAR_AWAY:
      lat: 29.0
      lng: 77.2090
      radius_m: 10
challenges:
  count: 2
  fail_threshold: 2
"#,
        );
        let results = run_quiet(file.path()).unwrap();
        assert!(!results.has_errors());
        assert_eq!(results.count(Severity::Warning), 3);
    }

    #[test]
    fn test_unparseable_file_is_reported() {
        let file = write_config("geofence: [not, a, map]");
        let results = run_quiet(file.path()).unwrap();
        assert!(results.has_errors());
        assert_eq!(results.findings[0].category, "load");
    }
}
