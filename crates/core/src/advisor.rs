use crate::{AdvisorError, DeviceRepository, TraceHop, Zone};
use object_model::Policy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    OverlyPermissive,
    BroadSource,
    BroadDestination,
    BroadService,
    LoggingDisabled,
    Consolidation,
    MultiZoneDevice,
    AnalysisError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub device_id: String,
    pub policy_id: Option<u32>,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
    pub suggestion: String,
}

impl Recommendation {
    fn new(
        device_id: &str,
        policy_id: Option<u32>,
        severity: Severity,
        category: Category,
        description: String,
        suggestion: &str,
    ) -> Self {
        Recommendation {
            device_id: device_id.to_string(),
            policy_id,
            severity,
            category,
            description,
            suggestion: suggestion.to_string(),
        }
    }
}

/// Flags broad, unlogged and fragmented policies along a traced path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOptimizationAdvisor;

impl PathOptimizationAdvisor {
    /// Never fails: a lookup problem becomes a single `analysis_error` record.
    pub fn analyze(&self, hops: &[TraceHop], repo: &DeviceRepository) -> Vec<Recommendation> {
        match self.try_analyze(hops, repo) {
            Ok(recommendations) => recommendations,
            Err(e) => {
                error!(error = %e, "path optimization analysis failed");
                let device_id = match &e {
                    AdvisorError::DeviceNotLoaded(id) => id.clone(),
                    AdvisorError::PolicyMissing { device_id, .. } => device_id.clone(),
                };
                vec![Recommendation::new(
                    &device_id,
                    None,
                    Severity::Low,
                    Category::AnalysisError,
                    e.to_string(),
                    "Reload the device configuration and trace again",
                )]
            }
        }
    }

    pub fn try_analyze(
        &self,
        hops: &[TraceHop],
        repo: &DeviceRepository,
    ) -> Result<Vec<Recommendation>, AdvisorError> {
        let mut out = Vec::new();
        let mut seen: HashSet<(&str, u32)> = HashSet::new();
        let mut zone_pairs: BTreeMap<(&str, Zone, Zone), BTreeSet<u32>> = BTreeMap::new();

        for hop in hops {
            let Some(policy_id) = hop.matched_policy_id else {
                continue;
            };
            zone_pairs
                .entry((hop.device_id.as_str(), hop.ingress_zone, hop.egress_zone))
                .or_default()
                .insert(policy_id);
            if !seen.insert((hop.device_id.as_str(), policy_id)) {
                continue;
            }
            let device = repo
                .get(&hop.device_id)
                .ok_or_else(|| AdvisorError::DeviceNotLoaded(hop.device_id.clone()))?;
            let policy = device.policy(policy_id).ok_or_else(|| AdvisorError::PolicyMissing {
                device_id: hop.device_id.clone(),
                policy_id,
            })?;
            policy_rules(&hop.device_id, policy, &mut out);
        }

        for ((device_id, ingress, egress), ids) in &zone_pairs {
            if ids.len() < 2 {
                continue;
            }
            let list: Vec<String> = ids.iter().map(u32::to_string).collect();
            out.push(Recommendation::new(
                device_id,
                None,
                Severity::Low,
                Category::Consolidation,
                format!(
                    "Policies {} all carry {ingress} -> {egress} traffic",
                    list.join(", ")
                ),
                "Candidate for consolidation into a single policy",
            ));
        }

        out.extend(multi_zone_devices(hops));
        Ok(out)
    }
}

fn policy_rules(device_id: &str, policy: &Policy, out: &mut Vec<Recommendation>) {
    let id = Some(policy.id);
    let (src, dst, svc) = (policy.any_source(), policy.any_destination(), policy.any_service());
    if src && dst && svc {
        out.push(Recommendation::new(
            device_id,
            id,
            Severity::High,
            Category::OverlyPermissive,
            format!("Policy {} matches any source, destination and service", policy.id),
            "Restrict the policy to the addresses and services actually required",
        ));
    } else {
        let broad = [
            (src, Category::BroadSource, "source"),
            (dst, Category::BroadDestination, "destination"),
            (svc, Category::BroadService, "service"),
        ];
        for (_, category, field) in broad.into_iter().filter(|(hit, _, _)| *hit) {
            out.push(Recommendation::new(
                device_id,
                id,
                Severity::Medium,
                category,
                format!("Policy {} uses a wildcard {field}", policy.id),
                "Replace the wildcard with specific objects or groups",
            ));
        }
    }
    if !policy.logging_enabled {
        out.push(Recommendation::new(
            device_id,
            id,
            Severity::Medium,
            Category::LoggingDisabled,
            format!("Policy {} does not log traffic", policy.id),
            "Enable logging for audit",
        ));
    }
}

fn multi_zone_devices(hops: &[TraceHop]) -> Vec<Recommendation> {
    let mut order: Vec<&str> = Vec::new();
    let mut zones: BTreeMap<&str, BTreeSet<Zone>> = BTreeMap::new();
    for hop in hops {
        let entry = zones.entry(hop.device_id.as_str()).or_insert_with(|| {
            order.push(hop.device_id.as_str());
            BTreeSet::new()
        });
        entry.insert(hop.ingress_zone);
        entry.insert(hop.egress_zone);
    }
    order
        .into_iter()
        .filter_map(|id| {
            let set = zones.get(id)?;
            (set.len() > 2).then(|| {
                let names: Vec<&str> = set.iter().map(Zone::as_str).collect();
                Recommendation::new(
                    id,
                    None,
                    Severity::Low,
                    Category::MultiZoneDevice,
                    format!("Device spans zones {}", names.join(", ")),
                    "Multi-zone device, consider splitting",
                )
            })
        })
        .collect()
}
