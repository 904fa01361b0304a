//! Order creation payload
//!
//! Field names follow the fulfillment API's snake_case JSON contract.
//! Optional item fields are `Option` and skipped when `None`, so an absent
//! gift message is never sent as `null` or `""`.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingSpeed {
    Standard,
    Expedited,
    Priority,
    NextDay,
}

impl ShippingSpeed {
    pub const ALL: [ShippingSpeed; 4] = [
        ShippingSpeed::Standard,
        ShippingSpeed::Expedited,
        ShippingSpeed::Priority,
        ShippingSpeed::NextDay,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentPolicy {
    FillOrKill,
    FillAll,
    FillAllAvailable,
}

impl FulfillmentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FillOrKill => "FILL_OR_KILL",
            Self::FillAll => "FILL_ALL",
            Self::FillAllAvailable => "FILL_ALL_AVAILABLE",
        }
    }
}

impl std::fmt::Display for FulfillmentPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    pub name: &'static str,
    pub address_line_1: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<&'static str>,
    pub city: &'static str,
    pub state_or_region: &'static str,
    pub postal_code: &'static str,
    pub country_code: &'static str,
}

const fn address(
    name: &'static str,
    line_1: &'static str,
    line_2: Option<&'static str>,
    city: &'static str,
    state: &'static str,
    postal_code: &'static str,
) -> Address {
    Address {
        name,
        address_line_1: line_1,
        address_line_2: line_2,
        city,
        state_or_region: state,
        postal_code,
        country_code: "US",
    }
}

/// Fixed destination pool
pub const DESTINATIONS: [Address; 8] = [
    address("John Doe", "123 Main Street", Some("Apt 4B"), "New York", "NY", "10001"),
    address("Jane Smith", "456 Oak Avenue", Some("Suite 200"), "Los Angeles", "CA", "90001"),
    address("Robert Johnson", "789 Pine Road", None, "Chicago", "IL", "60601"),
    address("Maria Garcia", "321 Elm Boulevard", Some("Floor 3"), "Houston", "TX", "77001"),
    address("Michael Brown", "654 Maple Drive", None, "Phoenix", "AZ", "85001"),
    address("Lisa Anderson", "987 Cedar Lane", Some("Unit 12"), "Philadelphia", "PA", "19019"),
    address("David Martinez", "147 Birch Street", None, "San Antonio", "TX", "78201"),
    address("Sarah Wilson", "258 Spruce Court", Some("Building A"), "San Diego", "CA", "92101"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    #[serde(rename = "seller_sku")]
    pub sku: String,
    #[serde(rename = "seller_fulfillment_order_item_id")]
    pub line_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_message: Option<String>,
    #[serde(rename = "displayable_comment", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    #[serde(rename = "seller_fulfillment_order_id")]
    pub seller_order_id: String,
    #[serde(rename = "displayable_order_id")]
    pub display_order_id: String,
    #[serde(rename = "displayable_order_date")]
    pub order_date: DateTime<Utc>,
    #[serde(rename = "displayable_order_comment")]
    pub comment: String,
    #[serde(rename = "shipping_speed_category")]
    pub shipping_speed: ShippingSpeed,
    pub destination_address: Address,
    pub items: Vec<OrderItem>,
    pub fulfillment_policy: FulfillmentPolicy,
}

impl OrderRequest {
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// True when no two items share a sku
    pub fn has_unique_skus(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.items.len());
        self.items.iter().all(|item| seen.insert(item.sku.as_str()))
    }
}

/// `Idempotency-Key` header value, fresh for every attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn generate(rng: &mut impl Rng) -> Self {
        let suffix: String = (0..16)
            .map(|_| {
                let idx = rng.gen_range(0..LOWER_ALNUM.len());
                LOWER_ALNUM[idx] as char
            })
            .collect();
        Self(format!("order-{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `{prefix}-{epoch_ms}-{1000..=9999}`
pub fn order_reference(prefix: &str, rng: &mut impl Rng) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().timestamp_millis(),
        rng.gen_range(1000..=9999)
    )
}

/// `item-{position}-{8 alphanumerics}`
pub fn line_id(position: usize, rng: &mut impl Rng) -> String {
    let tag: String = (0..8).map(|_| rng.sample(Alphanumeric) as char).collect();
    format!("item-{}-{}", position, tag)
}
