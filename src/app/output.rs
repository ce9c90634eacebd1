use crate::app::Outcome;
use crate::core::orchestrator::{SweepOutcome, SweepProbe};
use crate::domain::model::{Domain, OwnershipMap};
use crate::utils::error::Result;
use std::collections::BTreeMap;

/// Text printed on stdout for a finished operation.
pub fn render(outcome: &Outcome, json: bool) -> Result<String> {
    match outcome {
        Outcome::Found(ownership) if json => render_ownership_json(ownership),
        Outcome::Found(ownership) => Ok(render_ownership(ownership)),
        Outcome::Attached(report) => Ok(report
            .attached
            .iter()
            .map(|device| format!("{} : {}\n", device, report.domain))
            .collect()),
        Outcome::Detached { report, sweep } => {
            let mut out: String = report
                .detached
                .iter()
                .map(|d| format!("{} : {} (detached)\n", d.device, d.domain))
                .collect();
            let swept: Vec<&str> = sweep
                .iter()
                .flat_map(|s| s.released())
                .map(|p| p.device.as_str())
                .collect();
            for device in &report.unlocated {
                if swept.contains(&device.as_str()) {
                    continue;
                }
                out.push_str(&format!("{} : not attached\n", device));
            }
            if let Some(sweep) = sweep {
                out.push_str(&render_released(&sweep.probes));
            }
            Ok(out)
        }
        Outcome::Swept(report) => Ok(render_released(&report.probes)),
        Outcome::Domains(domains) => Ok(render_domains(domains)),
    }
}

/// One `device : domain` line per located device, in device name order.
pub fn render_ownership(ownership: &OwnershipMap) -> String {
    ownership
        .iter()
        .map(|(device, domain)| format!("{} : {}\n", device, domain.name))
        .collect()
}

pub fn render_ownership_json(ownership: &OwnershipMap) -> Result<String> {
    let by_name: BTreeMap<&str, &str> = ownership
        .iter()
        .map(|(device, domain)| (device.as_str(), domain.name.as_str()))
        .collect();
    Ok(format!("{}\n", serde_json::to_string_pretty(&by_name)?))
}

fn render_released(probes: &[SweepProbe]) -> String {
    probes
        .iter()
        .filter(|probe| probe.outcome == SweepOutcome::Released)
        .map(|probe| format!("{} : {} (released)\n", probe.device, probe.domain))
        .collect()
}

pub fn render_domains(domains: &[Domain]) -> String {
    let mut out = String::from("ID\tName\t\tUUID\n");
    out.push_str("--------------------------------------------------------\n");
    for domain in domains {
        let id = if domain.is_active() {
            domain.id.to_string()
        } else {
            "-".to_string()
        };
        out.push_str(&format!("{}\t{}\t\t{}\n", id, domain.name, domain.uuid));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn domain(id: i32, name: &str) -> Domain {
        Domain::new(id, name, Uuid::nil())
    }

    #[test]
    fn test_find_lines() {
        let mut ownership = OwnershipMap::new();
        ownership.insert("b.xml".to_string(), domain(2, "vm2"));
        ownership.insert("a.xml".to_string(), domain(1, "vm1"));

        assert_eq!(render_ownership(&ownership), "a.xml : vm1\nb.xml : vm2\n");
    }

    #[test]
    fn test_find_json() {
        let mut ownership = OwnershipMap::new();
        ownership.insert("gpu.xml".to_string(), domain(1, "win10"));

        let json = render(&Outcome::Found(ownership), true).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["gpu.xml"], "win10");
    }

    #[test]
    fn test_domain_table_marks_inactive() {
        let table = render_domains(&[domain(3, "running"), domain(-1, "stopped")]);
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[2].starts_with("3\trunning"));
        assert!(rows[3].starts_with("-\tstopped"));
    }
}
