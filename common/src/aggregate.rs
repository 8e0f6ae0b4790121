//! Final reconciliation of the tally into a report

use crate::scheduler::SchedulerState;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    pub success_count: usize,
    /// Includes `missing`
    pub fail_count: usize,
    /// Hosts that never produced an outcome
    pub missing: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Hosts that are in neither list
    pub unaccounted: Vec<String>,
    /// Where per-host logs were kept, if they were
    pub artifacts: Option<std::path::PathBuf>,
    pub elapsed: std::time::Duration,
}

impl Report {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.fail_count == 0
    }
}

fn write_hosts(
    f: &mut std::fmt::Formatter<'_>,
    heading: &str,
    hosts: &[String],
) -> std::fmt::Result {
    writeln!(f, "{} ({}):", heading, hosts.len())?;
    for host in hosts {
        writeln!(f, "  {host}")?;
    }
    Ok(())
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_hosts(f, "succeeded", &self.succeeded)?;
        write_hosts(f, "failed", &self.failed)?;
        if !self.unaccounted.is_empty() {
            write_hosts(f, "unaccounted", &self.unaccounted)?;
        }
        write!(
            f,
            "hosts: {}, succeeded: {}, failed: {}, unaccounted: {}, elapsed: {}",
            self.total,
            self.success_count,
            self.fail_count,
            self.missing,
            humantime::format_duration(std::time::Duration::from_millis(
                u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
            ))
        )?;
        if let Some(artifacts) = &self.artifacts {
            write!(f, "\nlogs kept in {}", artifacts.display())?;
        }
        Ok(())
    }
}

/// Builds the report, folding hosts without an outcome into the failure count.
#[must_use]
pub fn aggregate(state: &SchedulerState, elapsed: std::time::Duration) -> Report {
    let hosts = state.hosts();
    let tally = state.tally();
    let total = hosts.len();
    let accounted = tally.success_count + tally.fail_count;
    if accounted > total {
        tracing::warn!(
            "{} outcome(s) recorded for {} host(s), counts are inconsistent",
            accounted,
            total
        );
    }
    let missing = total.saturating_sub(accounted);
    let names = |indices: &[usize]| -> Vec<String> {
        indices.iter().map(|&index| hosts[index].name.clone()).collect()
    };
    let mut listed = vec![false; total];
    for &index in tally.completed_hosts.iter().chain(&tally.failed_hosts) {
        listed[index] = true;
    }
    let unaccounted: Vec<String> = hosts
        .iter()
        .zip(&listed)
        .filter(|(_, listed)| !**listed)
        .map(|(host, _)| host.name.clone())
        .collect();
    if missing > 0 {
        tracing::warn!("{} host(s) finished without an outcome", missing);
    }
    Report {
        total,
        success_count: tally.success_count,
        fail_count: tally.fail_count + missing,
        missing,
        succeeded: names(&tally.completed_hosts),
        failed: names(&tally.failed_hosts),
        unaccounted,
        artifacts: None,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(hosts: &[&str]) -> SchedulerState {
        SchedulerState::new(hosts.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn missing_hosts_count_as_failures() {
        let mut state = state(&["h1", "h2", "h3"]);
        state.record_success(0);
        state.record_failure(1);
        let report = aggregate(&state, std::time::Duration::ZERO);
        assert_eq!(report.total, 3);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.fail_count, 2);
        assert_eq!(report.missing, 1);
        assert_eq!(report.unaccounted, vec!["h3".to_string()]);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn report_lists_hosts_by_name() {
        let mut state = state(&["web1", "web2", "web1"]);
        state.record_success(0);
        state.record_failure(1);
        state.record_success(2);
        let mut report = aggregate(&state, std::time::Duration::from_millis(1500));
        report.artifacts = Some("/tmp/fcp-1".into());
        assert_eq!(
            report.to_string(),
            "succeeded (2):\n  web1\n  web1\n\
             failed (1):\n  web2\n\
             hosts: 3, succeeded: 2, failed: 1, unaccounted: 0, elapsed: 1s 500ms\n\
             logs kept in /tmp/fcp-1"
        );
    }

    #[derive(Debug, Clone, Copy)]
    enum Fate {
        Success,
        Failure,
        RetrySuccess,
        Unreported,
    }

    fn fate() -> impl Strategy<Value = Fate> {
        prop_oneof![
            Just(Fate::Success),
            Just(Fate::Failure),
            Just(Fate::RetrySuccess),
            Just(Fate::Unreported),
        ]
    }

    proptest! {
        #[test]
        fn counts_always_add_up(fates in proptest::collection::vec(fate(), 1..40)) {
            let names: Vec<String> = (0..fates.len()).map(|i| format!("h{i}")).collect();
            let mut state = SchedulerState::new(names);
            for (index, fate) in fates.iter().enumerate() {
                match fate {
                    Fate::Success => state.record_success(index),
                    Fate::Failure | Fate::RetrySuccess => state.record_failure(index),
                    Fate::Unreported => {}
                }
            }
            for (index, fate) in fates.iter().enumerate() {
                if matches!(fate, Fate::RetrySuccess) {
                    state.promote(index);
                }
            }
            let report = aggregate(&state, std::time::Duration::ZERO);
            prop_assert_eq!(report.success_count + report.fail_count, fates.len());
            prop_assert_eq!(
                report.succeeded.len() + report.failed.len() + report.unaccounted.len(),
                fates.len()
            );
            for name in &report.succeeded {
                prop_assert!(!report.failed.contains(name));
            }
        }
    }
}
