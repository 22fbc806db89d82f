//! Probe results and the cross-driver comparison.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::driver::DriverKind;
use crate::probe::UpdateTally;

/// What one driver reported versus what the database committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub driver: DriverKind,
    pub executed: usize,
    pub reported_errors: usize,
    pub actual_updates: i64,
}

impl ProbeReport {
    pub fn new(driver: DriverKind, tally: UpdateTally, actual_updates: i64) -> Self {
        Self {
            driver,
            executed: tally.executed,
            reported_errors: tally.reported_errors,
            actual_updates,
        }
    }

    /// Updates the driver claims succeeded.
    pub fn expected_updates(&self) -> i64 {
        self.executed.saturating_sub(self.reported_errors) as i64
    }

    /// Committed minus claimed.
    ///
    /// Positive: updates committed although reported as failed.
    /// Negative: updates reported successful that never landed.
    pub fn discrepancy(&self) -> i64 {
        self.actual_updates - self.expected_updates()
    }

    pub fn is_consistent(&self) -> bool {
        self.discrepancy() == 0
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Exec'ed statements: {}", self.executed)?;
        writeln!(f, "Reported error count: {}", self.reported_errors)?;
        write!(f, "Actual updates: {}", self.actual_updates)
    }
}

/// Side-by-side view of several probe reports.
#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    reports: &'a [ProbeReport],
}

impl<'a> Comparison<'a> {
    pub fn new(reports: &'a [ProbeReport]) -> Self {
        Self { reports }
    }

    /// Drivers whose error reports disagree with the committed value.
    pub fn inconsistent_drivers(&self) -> Vec<DriverKind> {
        self.reports
            .iter()
            .filter(|report| !report.is_consistent())
            .map(|report| report.driver)
            .collect()
    }

    /// Whether every driver ended with the same discrepancy.
    pub fn drivers_agree(&self) -> bool {
        self.reports
            .windows(2)
            .all(|pair| pair[0].discrepancy() == pair[1].discrepancy())
    }
}

impl fmt::Display for Comparison<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        for report in self.reports {
            writeln!(
                f,
                "  {}: {} reported errors, {} actual of {} executed, discrepancy {:+}",
                report.driver,
                report.reported_errors,
                report.actual_updates,
                report.executed,
                report.discrepancy()
            )?;
        }

        let inconsistent = self.inconsistent_drivers();
        if inconsistent.is_empty() {
            write!(f, "Every driver's error count matches the committed state")?;
        } else {
            let names: Vec<&str> = inconsistent.iter().map(DriverKind::as_str).collect();
            write!(f, "Error count disagrees with committed state: {}", names.join(", "))?;
        }

        if self.reports.len() < 2 {
            return Ok(());
        }
        let discrepancies: Vec<String> = self
            .reports
            .iter()
            .map(|report| format!("{:+}", report.discrepancy()))
            .collect();
        if self.drivers_agree() {
            write!(f, "\nDrivers agree: discrepancy {}", discrepancies[0])
        } else {
            write!(
                f,
                "\nDrivers disagree: discrepancies {}",
                discrepancies.join(" vs ")
            )
        }
    }
}
