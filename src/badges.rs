//! Contribution badge derivation.
//!
//! Everything here is a pure transform over [`crate::chains`] output: the
//! highest tier across chains decides badge eligibility, and metadata
//! re-packages the same aggregate as named attributes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chains::{ContributionInfo, DonationRecord};
use crate::tiers::{self, Tier};

#[derive(Debug, Clone, Serialize)]
pub struct ContributionSummary {
    pub highest_level: u8,
    pub highest_level_name: &'static str,
    /// Sum of donations across chains where the user holds a tier
    pub total_donated: f64,
    pub active_chains: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeEligibility {
    pub eligible: bool,
    pub current_level: u8,
    pub current_level_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_amount: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeMetadata {
    pub level: u8,
    pub level_name: &'static str,
    pub total_donated: f64,
    pub chains_contributed: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub attributes: Vec<BadgeAttribute>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BadgeAttribute {
    pub trait_type: &'static str,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierRequirement {
    pub level: u8,
    pub name: &'static str,
    pub min_donation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub address: String,
    pub total_donated: f64,
    pub level: u8,
    pub level_name: &'static str,
    pub chains: Vec<String>,
}

/// Collapses per-chain contributions into the cross-chain aggregate: maximum
/// level seen, totals summed over chains where the user holds a tier.
pub fn summarize(contributions: &BTreeMap<String, ContributionInfo>) -> ContributionSummary {
    let mut highest = Tier::None;
    let mut total_donated = 0.0;
    let mut active_chains = Vec::new();
    for (chain, info) in contributions {
        if info.level > 0 {
            active_chains.push(chain.clone());
            total_donated += info.total_donated;
            highest = highest.max(Tier::from_level(info.level));
        }
    }
    ContributionSummary {
        highest_level: highest.level(),
        highest_level_name: highest.name(),
        total_donated,
        active_chains,
    }
}

pub fn eligibility(summary: &ContributionSummary) -> BadgeEligibility {
    let eligible = summary.highest_level > 0;
    let next_tier = (summary.highest_level < Tier::Diamond.level())
        .then(|| Tier::from_level(summary.highest_level + 1));
    let required_amount = next_tier
        .map(|tier| (tier.min_threshold() - summary.total_donated).max(0.0));
    let reason = if eligible {
        format!("Qualified for {} badge", summary.highest_level_name)
    } else {
        "No contributions found across any chain".to_string()
    };
    BadgeEligibility {
        eligible,
        current_level: summary.highest_level,
        current_level_name: summary.highest_level_name,
        next_level: next_tier.map(Tier::level),
        required_amount,
        reason,
    }
}

/// Badge metadata is only issued to eligible users.
pub fn badge_metadata(
    summary: &ContributionSummary,
    issued_at: DateTime<Utc>,
) -> Option<BadgeMetadata> {
    if summary.highest_level == 0 {
        return None;
    }
    let attributes = vec![
        BadgeAttribute {
            trait_type: "Contributor Level",
            value: summary.highest_level_name.into(),
        },
        BadgeAttribute {
            trait_type: "Total Donated",
            value: summary.total_donated.into(),
        },
        BadgeAttribute {
            trait_type: "Chains Contributed",
            value: summary.active_chains.len().into(),
        },
        BadgeAttribute {
            trait_type: "Active Chains",
            value: summary.active_chains.join(", ").into(),
        },
        BadgeAttribute {
            trait_type: "Issue Date",
            value: issued_at.format("%Y-%m-%d").to_string().into(),
        },
    ];
    Some(BadgeMetadata {
        level: summary.highest_level,
        level_name: summary.highest_level_name,
        total_donated: summary.total_donated,
        chains_contributed: summary.active_chains.clone(),
        issued_at,
        attributes,
    })
}

pub fn requirements() -> Vec<TierRequirement> {
    [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Diamond]
        .into_iter()
        .map(|tier| TierRequirement {
            level: tier.level(),
            name: tier.name(),
            min_donation: tier.min_threshold(),
        })
        .collect()
}

/// Ranks donors by their summed donation events, largest first.
pub fn rank_donors(records: &[DonationRecord], limit: usize) -> Vec<LeaderboardEntry> {
    let mut totals: BTreeMap<&str, (f64, BTreeSet<&str>)> = BTreeMap::new();
    for record in records {
        if record.donor.is_empty() {
            continue;
        }
        let entry = totals.entry(&record.donor).or_default();
        entry.0 += record.amount;
        entry.1.insert(&record.chain);
    }

    let mut ranked: Vec<(&str, f64, BTreeSet<&str>)> = totals
        .into_iter()
        .map(|(donor, (total, chains))| (donor, total, chains))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (donor, total, chains))| {
            let tier = Tier::from_total(total);
            LeaderboardEntry {
                rank: index as u32 + 1,
                address: donor.to_string(),
                total_donated: total,
                level: tier.level(),
                level_name: tier.name(),
                chains: chains.into_iter().map(str::to_string).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::contribution_from_raw;
    use chrono::TimeZone;

    fn contributions(entries: &[(&str, u128)]) -> BTreeMap<String, ContributionInfo> {
        entries
            .iter()
            .map(|(chain, mist)| {
                (
                    chain.to_string(),
                    contribution_from_raw(*mist, tiers::SUI_DECIMALS),
                )
            })
            .collect()
    }

    #[test]
    fn summary_takes_max_level_and_sums_active() {
        let map = contributions(&[
            ("ethereum", 5_000_000_000), // 5.0 -> Gold
            ("sui", 200_000_000),        // 0.2 -> Bronze
            ("polygon", 50_000_000),     // 0.05 -> None, excluded
        ]);
        let summary = summarize(&map);
        assert_eq!(summary.highest_level, 3);
        assert_eq!(summary.highest_level_name, "Gold");
        assert!((summary.total_donated - 5.2).abs() < 1e-9);
        assert_eq!(summary.active_chains, vec!["ethereum", "sui"]);
    }

    #[test]
    fn empty_contributions_are_ineligible() {
        let summary = summarize(&BTreeMap::new());
        let check = eligibility(&summary);
        assert!(!check.eligible);
        assert_eq!(check.current_level, 0);
        assert_eq!(check.next_level, Some(1));
        assert_eq!(check.required_amount, Some(0.1));
    }

    #[test]
    fn diamond_has_no_next_level() {
        let map = contributions(&[("ethereum", 15_000_000_000)]);
        let check = eligibility(&summarize(&map));
        assert!(check.eligible);
        assert_eq!(check.current_level, 4);
        assert!(check.next_level.is_none());
        assert!(check.required_amount.is_none());
    }

    #[test]
    fn metadata_requires_eligibility() {
        let issued_at = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
        assert!(badge_metadata(&summarize(&BTreeMap::new()), issued_at).is_none());

        let map = contributions(&[("sui", 1_500_000_000)]);
        let metadata = badge_metadata(&summarize(&map), issued_at).expect("eligible");
        assert_eq!(metadata.level, 2);
        assert_eq!(metadata.level_name, "Silver");
        assert_eq!(metadata.attributes.len(), 5);
        assert_eq!(metadata.attributes[0].value, "Silver");
        assert_eq!(metadata.attributes[4].value, "2026-01-06");
    }

    #[test]
    fn leaderboard_orders_by_total() {
        let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();
        let records = vec![
            DonationRecord {
                chain: "ethereum".to_string(),
                donor: "0xaaa".to_string(),
                amount: 2.0,
                message: String::new(),
                timestamp: at(1),
                tx_hash: "0x1".to_string(),
            },
            DonationRecord {
                chain: "sui".to_string(),
                donor: "0xbbb".to_string(),
                amount: 12.0,
                message: String::new(),
                timestamp: at(2),
                tx_hash: "0x2".to_string(),
            },
            DonationRecord {
                chain: "sui".to_string(),
                donor: "0xaaa".to_string(),
                amount: 4.0,
                message: String::new(),
                timestamp: at(3),
                tx_hash: "0x3".to_string(),
            },
        ];
        let board = rank_donors(&records, 10);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].address, "0xbbb");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].level_name, "Diamond");
        assert_eq!(board[1].address, "0xaaa");
        assert_eq!(board[1].total_donated, 6.0);
        assert_eq!(board[1].chains, vec!["ethereum", "sui"]);

        assert_eq!(rank_donors(&records, 1).len(), 1);
    }
}
