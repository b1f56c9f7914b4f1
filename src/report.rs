use log::info;

use crate::types::{ExpectationSet, HostPort};

/// Open ports split by whether they are allow-listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub expected: Vec<HostPort>,
    pub unexpected: Vec<HostPort>,
}

impl Diff {
    pub fn unexpected_count(&self) -> usize {
        self.unexpected.len()
    }

    pub fn open_count(&self) -> usize {
        self.expected.len() + self.unexpected.len()
    }

    /// Human-readable report, one line per entry.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.open_count() + 4);
        lines.push(format!("Found {} open ports.", self.open_count()));
        lines.push("== EXPECTED ==".to_string());
        lines.extend(self.expected.iter().map(HostPort::to_string));
        lines.push("== UNEXPECTED ==".to_string());
        lines.extend(self.unexpected.iter().map(HostPort::to_string));
        lines.push(format!("Found {} unexpected open ports.", self.unexpected_count()));
        lines
    }
}

/// Partition scan results by membership in the expectation set.
///
/// Each section is sorted by host then port, so the report does not depend on
/// the order probes happened to complete in.
pub fn diff(open: &[HostPort], expectations: &ExpectationSet) -> Diff {
    let (mut expected, mut unexpected): (Vec<HostPort>, Vec<HostPort>) = open
        .iter()
        .cloned()
        .partition(|hp| expectations.contains(hp));
    expected.sort();
    unexpected.sort();
    Diff {
        expected,
        unexpected,
    }
}

/// Diff, log the report and return the number of unexpected open ports.
pub fn report_results(open: &[HostPort], expectations: &ExpectationSet) -> usize {
    let d = diff(open, expectations);
    for line in d.report_lines() {
        info!("{line}");
    }
    d.unexpected_count()
}
