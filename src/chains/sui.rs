//! Sui-family adapter. Reads the shared FaucetPool object and its Move events
//! over the Sui JSON-RPC API.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ChainEntry;
use crate::tiers;

use super::{
    ChainAdapter, ChainFamily, ContributionInfo, CooldownInfo, DonationRecord, PoolStatistics,
    contribution_from_raw, cooldown_from_last_claim, datetime_from_ms,
};

/// Default drip when the pool object does not carry one: 0.1 SUI in MIST.
const DEFAULT_FAUCET_AMOUNT_MIST: u128 = 100_000_000;

pub struct SuiChain {
    chain_id: String,
    name: String,
    symbol: String,
    client: HttpClient,
    pool_object_id: Option<String>,
    package_id: Option<String>,
    cooldown_ms: i64,
}

impl SuiChain {
    pub fn new(entry: &ChainEntry) -> Result<Self> {
        assert!(entry.family == ChainFamily::Sui, "Entry is not a Sui chain");
        let client = HttpClientBuilder::default()
            .request_timeout(entry.request_timeout())
            .build(&entry.rpc_url)
            .with_context(|| format!("Failed to build Sui RPC client for {}", entry.id))?;

        Ok(Self {
            chain_id: entry.id.clone(),
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            client,
            pool_object_id: entry.pool_address.clone(),
            package_id: entry.package_id.clone(),
            cooldown_ms: i64::from(entry.cooldown_hours) * 3_600_000,
        })
    }

    async fn pool_fields(&self) -> Result<Value> {
        let pool_id = self
            .pool_object_id
            .as_ref()
            .ok_or_else(|| anyhow!("Sui pool object not configured for {}", self.chain_id))?;
        let response: ObjectResponse = self
            .client
            .request(
                "sui_getObject",
                rpc_params![pool_id, serde_json::json!({"showContent": true})],
            )
            .await
            .context("RPC call sui_getObject failed")?;

        let content = response
            .data
            .and_then(|data| data.content)
            .ok_or_else(|| anyhow!("Pool object {pool_id} has no content"))?;
        if content.data_type != "moveObject" {
            bail!("Pool object {pool_id} is not a Move object");
        }
        Ok(content.fields)
    }
}

#[async_trait]
impl ChainAdapter for SuiChain {
    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Sui
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn pool_reference(&self) -> &str {
        self.pool_object_id.as_deref().unwrap_or_default()
    }

    async fn check_cooldown(&self, address: &str) -> Result<CooldownInfo> {
        let fields = self.pool_fields().await?;
        let last_claim_ms = vec_map_lookup(&fields, "last_claims", address)
            .and_then(value_as_u128)
            .map(|ms| ms.min(i64::MAX as u128) as i64);
        Ok(cooldown_from_last_claim(
            last_claim_ms,
            self.cooldown_ms,
            Utc::now().timestamp_millis(),
        ))
    }

    async fn contribution(&self, address: &str) -> Result<ContributionInfo> {
        let fields = self.pool_fields().await?;
        let total_mist = vec_map_lookup(&fields, "donations", address)
            .and_then(value_as_u128)
            .unwrap_or(0);
        Ok(contribution_from_raw(total_mist, tiers::SUI_DECIMALS))
    }

    async fn pool_statistics(&self) -> Result<PoolStatistics> {
        let fields = self.pool_fields().await?;
        let balance = field_amount(&fields, "balance").unwrap_or(0);
        let total_donations = field_amount(&fields, "total_donations").unwrap_or(0);
        let total_claimed = field_amount(&fields, "total_claimed").unwrap_or(0);
        let faucet_amount =
            field_amount(&fields, "faucet_amount").unwrap_or(DEFAULT_FAUCET_AMOUNT_MIST);
        let available_claims = if faucet_amount > 0 {
            (balance / faucet_amount).min(u64::MAX as u128) as u64
        } else {
            0
        };

        Ok(PoolStatistics {
            current_balance: tiers::to_human_units(balance, tiers::SUI_DECIMALS),
            total_donations: tiers::to_human_units(total_donations, tiers::SUI_DECIMALS),
            total_claimed: tiers::to_human_units(total_claimed, tiers::SUI_DECIMALS),
            faucet_amount: tiers::to_human_units(faucet_amount, tiers::SUI_DECIMALS),
            available_claims,
            pool_reference: self.pool_reference().to_string(),
        })
    }

    async fn recent_donations(&self, limit: usize) -> Result<Vec<DonationRecord>> {
        let package = self
            .package_id
            .as_ref()
            .ok_or_else(|| anyhow!("Sui package id not configured for {}", self.chain_id))?;
        assert!(limit <= 1_000, "Event query limit exceeds defensive bound");

        let query = serde_json::json!({
            "MoveEventType": format!("{package}::sui_faucet::DonationReceived")
        });
        let response: EventPage = self
            .client
            .request(
                "suix_queryEvents",
                rpc_params![query, Value::Null, limit, true],
            )
            .await
            .context("RPC call suix_queryEvents failed")?;

        let mut records = Vec::with_capacity(response.data.len());
        for event in response.data {
            let donor = event
                .parsed_json
                .get("donor")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let amount_mist = event
                .parsed_json
                .get("amount")
                .and_then(value_as_u128)
                .unwrap_or(0);
            let timestamp_ms = event
                .timestamp_ms
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .unwrap_or(0);
            records.push(DonationRecord {
                chain: self.chain_id.clone(),
                donor,
                amount: tiers::to_human_units(amount_mist, tiers::SUI_DECIMALS),
                message: decode_move_string(event.parsed_json.get("message")),
                timestamp: datetime_from_ms(timestamp_ms),
                tx_hash: event.id.tx_digest,
            });
        }
        Ok(records)
    }

    async fn probe(&self) -> Result<serde_json::Value> {
        let chain_identifier: String = self
            .client
            .request("sui_getChainIdentifier", rpc_params![])
            .await
            .context("RPC call sui_getChainIdentifier failed")?;
        assert!(
            !chain_identifier.is_empty(),
            "RPC returned empty chain identifier"
        );
        Ok(serde_json::json!({"chain_identifier": chain_identifier}))
    }
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    data: Option<ObjectData>,
}

#[derive(Debug, Deserialize)]
struct ObjectData {
    content: Option<ObjectContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectContent {
    data_type: String,
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    data: Vec<SuiEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuiEvent {
    id: EventId,
    #[serde(default)]
    timestamp_ms: Option<String>,
    #[serde(default)]
    parsed_json: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventId {
    tx_digest: String,
}

/// Looks up `key` inside a Move `VecMap` field serialized as
/// `{field: {fields: {contents: [{fields: {key, value}}]}}}`.
fn vec_map_lookup<'a>(fields: &'a Value, field: &str, key: &str) -> Option<&'a Value> {
    fields
        .get(field)?
        .get("fields")?
        .get("contents")?
        .as_array()?
        .iter()
        .find_map(|entry| {
            let kv = entry.get("fields")?;
            if kv.get("key")?.as_str()? == key {
                kv.get("value")
            } else {
                None
            }
        })
}

/// Move u64 fields arrive as JSON strings or plain numbers depending on the
/// node version.
fn value_as_u128(value: &Value) -> Option<u128> {
    match value {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(number) => number.as_u64().map(u128::from),
        _ => None,
    }
}

/// Amount fields are either a bare value or a wrapped `Balance` struct.
fn field_amount(fields: &Value, name: &str) -> Option<u128> {
    let field = fields.get(name)?;
    value_as_u128(field).or_else(|| field.get("fields")?.get("value").and_then(value_as_u128))
}

/// Move `vector<u8>` messages arrive as byte arrays; `String` fields as text.
fn decode_move_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(bytes)) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().map(|v| v as u8))
                .collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool_fixture() -> Value {
        json!({
            "balance": {"fields": {"value": "12000000000"}},
            "total_donations": "20000000000",
            "total_claimed": "8000000000",
            "faucet_amount": "100000000",
            "last_claims": {"fields": {"contents": [
                {"fields": {"key": "0xaaa", "value": "1700000000000"}}
            ]}},
            "donations": {"fields": {"contents": [
                {"fields": {"key": "0xaaa", "value": "5000000000"}}
            ]}}
        })
    }

    #[test]
    fn vec_map_lookup_finds_entries() {
        let fields = pool_fixture();
        let claim = vec_map_lookup(&fields, "last_claims", "0xaaa").and_then(value_as_u128);
        assert_eq!(claim, Some(1_700_000_000_000));
        assert!(vec_map_lookup(&fields, "last_claims", "0xbbb").is_none());
        let donated = vec_map_lookup(&fields, "donations", "0xaaa").and_then(value_as_u128);
        assert_eq!(donated, Some(5_000_000_000));
    }

    #[test]
    fn amounts_unwrap_balance_structs() {
        let fields = pool_fixture();
        assert_eq!(field_amount(&fields, "balance"), Some(12_000_000_000));
        assert_eq!(field_amount(&fields, "total_donations"), Some(20_000_000_000));
        assert_eq!(field_amount(&fields, "missing"), None);
    }

    #[test]
    fn numeric_fields_accept_both_encodings() {
        assert_eq!(value_as_u128(&json!("42")), Some(42));
        assert_eq!(value_as_u128(&json!(42)), Some(42));
        assert_eq!(value_as_u128(&json!(null)), None);
        assert_eq!(value_as_u128(&json!("not-a-number")), None);
    }

    #[test]
    fn move_messages_decode() {
        assert_eq!(decode_move_string(Some(&json!("thanks"))), "thanks");
        assert_eq!(
            decode_move_string(Some(&json!([104, 101, 108, 108, 111]))),
            "hello"
        );
        assert_eq!(decode_move_string(None), "");
    }
}
