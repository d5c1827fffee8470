//! Operator-facing console text.

use crate::core::{NodeResults, PrecheckResult};

pub const DB_HEALTH_COMPLETE: &str = "
Replica set is healthy     \u{2713}
Running on primary HA node \u{2713}
";

pub const RELEASE_AGENTS_CONTROL: &str = "
In a highly available setup, 'juju-restore' can stop and start the Juju
and database agents on the secondary controller machines.

Allow 'juju-restore' to manage the secondary machines [y/N]? ";

pub const SECONDARY_AGENTS_MUST_STOP: &str = "
Manual agent control selected: the Juju and database agents on all
secondary controller machines must be stopped before the restore
proceeds, and started again afterwards.
";

pub const PRECHECKS_COMPLETED: &str = "
All restore pre-checks are completed.

The restore can now proceed.
Continue [y/N]? ";

/// Summarises what is about to be restored and into what.
pub fn precheck_summary(result: &PrecheckResult) -> String {
    format!(
        "
You are about to restore this backup:

    Created at:         {created}
    Controller model:   {uuid}
    Backup version:     {backup_version}
    Controller version: {controller_version}
    Models:             {models}
",
        created = result.backup_date.format("%Y-%m-%d %H:%M:%S UTC"),
        uuid = result.controller_model_uuid,
        backup_version = result.backup_juju_version,
        controller_version = result.controller_juju_version,
        models = result.model_count,
    )
}

/// Renders a per-node result map, one sorted line per node.
pub fn node_results(results: &NodeResults) -> String {
    let mut ips: Vec<&String> = results.keys().collect();
    ips.sort();
    let mut out = String::new();
    for ip in ips {
        match &results[ip] {
            None => out.push_str(&format!("    {}: ok\n", ip)),
            Some(err) => out.push_str(&format!("    {}: {}\n", ip, err)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::core::Error;

    #[test]
    fn test_precheck_summary_contents() {
        let summary = precheck_summary(&PrecheckResult {
            backup_date: Utc.with_ymd_and_hms(2020, 2, 25, 4, 12, 41).unwrap(),
            controller_model_uuid: "e2a6a1e5".to_string(),
            backup_juju_version: "2.7.6.3".parse().unwrap(),
            controller_juju_version: "2.8-beta5.6".parse().unwrap(),
            model_count: 2,
        });
        assert!(summary.contains("2020-02-25 04:12:41 UTC"));
        assert!(summary.contains("e2a6a1e5"));
        assert!(summary.contains("2.7.6.3"));
        assert!(summary.contains("2.8-beta5.6"));
        assert!(summary.contains("Models:             2"));
    }

    #[test]
    fn test_node_results_sorted() {
        let mut results = NodeResults::new();
        results.insert("10.0.0.3".to_string(), None);
        results.insert("10.0.0.1".to_string(), Some(Error::NoPrimary));
        let rendered = node_results(&results);
        assert_eq!(
            rendered,
            "    10.0.0.1: no primary found in replica set\n    10.0.0.3: ok\n"
        );
    }
}
