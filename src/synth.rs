//! Order payload synthesis
//!
//! Builds a structurally valid `OrderRequest` from the catalog and a random
//! source. Candidate products come from a shuffled prefix of the catalog;
//! a candidate whose sku is already in the order is skipped, not replaced,
//! so the final item count can be lower than the requested count.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::catalog::Catalog;
use crate::config::PayloadConfig;
use crate::error::SetupError;
use crate::order::{
    line_id, order_reference, FulfillmentPolicy, OrderItem, OrderRequest, ShippingSpeed,
    DESTINATIONS,
};
use crate::sampler::WeightedTable;

pub const GIFT_MESSAGE: &str = "Thank you for your purchase!";
pub const HANDLING_COMMENT: &str = "Handle with care";

/// Bookkeeping from one synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisStats {
    /// Item count drawn from the configured range
    pub requested_items: usize,
    /// Shuffled prefix length (bounded by catalog size)
    pub candidates: usize,
    /// Candidates dropped because their sku was already in the order
    pub duplicate_skus_skipped: usize,
}

#[derive(Debug, Clone)]
pub struct PayloadSynthesizer {
    config: PayloadConfig,
    policies: WeightedTable<FulfillmentPolicy>,
}

impl PayloadSynthesizer {
    pub fn new(config: PayloadConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let weights = &config.policy_weights;
        let policies = WeightedTable::new([
            (weights.fill_or_kill, FulfillmentPolicy::FillOrKill),
            (weights.fill_all, FulfillmentPolicy::FillAll),
            (weights.fill_all_available, FulfillmentPolicy::FillAllAvailable),
        ])?;
        Ok(Self { config, policies })
    }

    pub fn synthesize(&self, catalog: &Catalog, rng: &mut impl Rng) -> OrderRequest {
        self.synthesize_with_stats(catalog, rng).0
    }

    pub fn synthesize_with_stats(
        &self,
        catalog: &Catalog,
        rng: &mut impl Rng,
    ) -> (OrderRequest, SynthesisStats) {
        debug_assert!(!catalog.is_empty(), "catalog must hold at least one product");

        let requested = rng.gen_range(self.config.min_items..=self.config.max_items);

        let mut shuffled: Vec<_> = catalog.products().iter().collect();
        shuffled.shuffle(rng);
        shuffled.truncate(requested);
        let candidates = shuffled.len();

        let mut used_skus: HashSet<&str> = HashSet::with_capacity(candidates);
        let mut items = Vec::with_capacity(candidates);
        let mut skipped = 0;

        for (i, product) in shuffled.into_iter().enumerate() {
            if !used_skus.insert(product.sku.as_str()) {
                skipped += 1;
                tracing::debug!(sku = %product.sku, "Duplicate sku in candidates, skipping");
                continue;
            }
            items.push(self.item_for(&product.sku, i + 1, rng));
        }

        let request = OrderRequest {
            seller_order_id: order_reference("SELLER", rng),
            display_order_id: order_reference("ORDER", rng),
            order_date: Utc::now() - chrono::Duration::days(1),
            comment: format!("Load test order - {} items", requested),
            shipping_speed: *ShippingSpeed::ALL
                .choose(rng)
                .unwrap_or(&ShippingSpeed::Standard),
            destination_address: DESTINATIONS
                .choose(rng)
                .unwrap_or(&DESTINATIONS[0])
                .clone(),
            items,
            fulfillment_policy: self.policies.sample(rng),
        };

        let stats = SynthesisStats {
            requested_items: requested,
            candidates,
            duplicate_skus_skipped: skipped,
        };
        (request, stats)
    }

    fn item_for(&self, sku: &str, position: usize, rng: &mut impl Rng) -> OrderItem {
        let quantity = rng.gen_range(self.config.min_quantity..=self.config.max_quantity);
        let gift_message = rng
            .gen_bool(self.config.gift_message_probability)
            .then(|| GIFT_MESSAGE.to_string());
        let comment = rng
            .gen_bool(self.config.comment_probability)
            .then(|| HANDLING_COMMENT.to_string());

        OrderItem {
            sku: sku.to_string(),
            line_id: line_id(position, rng),
            quantity,
            gift_message,
            comment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn catalog_of(skus: &[&str]) -> Catalog {
        Catalog::new(skus.iter().map(|s| Product::new(*s)).collect(), "test").unwrap()
    }

    fn numbered_catalog(n: usize) -> Catalog {
        Catalog::new(
            (0..n).map(|i| Product::new(format!("SKU-{:04}", i))).collect(),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_skus_unique_across_seeds_and_sizes() {
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        for size in [1usize, 2, 3, 5, 8, 9, 10, 50, 500] {
            let catalog = numbered_catalog(size);
            for seed in 0..200u64 {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let (order, stats) = synth.synthesize_with_stats(&catalog, &mut rng);
                assert!(order.has_unique_skus(), "size={} seed={}", size, seed);
                assert!(order.item_count() <= stats.requested_items);
                assert!(order.item_count() >= 1);
                assert!((2..=9).contains(&stats.requested_items));
                assert_eq!(stats.candidates, stats.requested_items.min(size));
                assert_eq!(
                    order.item_count() + stats.duplicate_skus_skipped,
                    stats.candidates
                );
            }
        }
    }

    #[test]
    fn test_duplicate_catalog_skus_are_skipped_not_replaced() {
        // Every product shares one sku: only the first candidate survives
        let catalog = catalog_of(&["DUP"; 12]);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        for seed in 0..100u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (order, stats) = synth.synthesize_with_stats(&catalog, &mut rng);
            assert_eq!(order.item_count(), 1);
            assert_eq!(stats.duplicate_skus_skipped, stats.requested_items - 1);
        }
    }

    #[test]
    fn test_large_catalog_fills_requested_count() {
        let catalog = numbered_catalog(100);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..500 {
            let (order, stats) = synth.synthesize_with_stats(&catalog, &mut rng);
            assert_eq!(order.item_count(), stats.requested_items);
            assert_eq!(
                order.comment,
                format!("Load test order - {} items", stats.requested_items)
            );
        }
    }

    #[test]
    fn test_item_fields_within_bounds() {
        let catalog = numbered_catalog(30);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut saw_gift = false;
        let mut saw_no_gift = false;
        for _ in 0..300 {
            let order = synth.synthesize(&catalog, &mut rng);
            for item in &order.items {
                assert!((1..=5).contains(&item.quantity));
                assert!(item.line_id.starts_with("item-"));
                match &item.gift_message {
                    Some(msg) => {
                        assert_eq!(msg, GIFT_MESSAGE);
                        saw_gift = true;
                    }
                    None => saw_no_gift = true,
                }
                if let Some(comment) = &item.comment {
                    assert_eq!(comment, HANDLING_COMMENT);
                }
            }
        }
        assert!(saw_gift && saw_no_gift);
    }

    #[test]
    fn test_optional_field_rates() {
        let catalog = numbered_catalog(100);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let (mut items, mut gifts, mut comments) = (0usize, 0usize, 0usize);
        for _ in 0..4_000 {
            let order = synth.synthesize(&catalog, &mut rng);
            items += order.item_count();
            gifts += order.items.iter().filter(|i| i.gift_message.is_some()).count();
            comments += order.items.iter().filter(|i| i.comment.is_some()).count();
        }
        let gift_rate = gifts as f64 / items as f64;
        let comment_rate = comments as f64 / items as f64;
        assert!((gift_rate - 0.3).abs() < 0.02, "gift rate {}", gift_rate);
        assert!((comment_rate - 0.2).abs() < 0.02, "comment rate {}", comment_rate);
    }

    #[test]
    fn test_policy_distribution() {
        let catalog = numbered_catalog(20);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let n = 20_000;
        let mut counts = [0usize; 3];
        for _ in 0..n {
            let idx = match synth.synthesize(&catalog, &mut rng).fulfillment_policy {
                FulfillmentPolicy::FillOrKill => 0,
                FulfillmentPolicy::FillAll => 1,
                FulfillmentPolicy::FillAllAvailable => 2,
            };
            counts[idx] += 1;
        }
        for (count, expected) in counts.iter().zip([0.1, 0.2, 0.7]) {
            let observed = *count as f64 / n as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "observed {} expected {}",
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_order_date_is_yesterday() {
        let catalog = numbered_catalog(3);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let order = synth.synthesize(&catalog, &mut rng);
        let age = Utc::now() - order.order_date;
        assert!(age >= chrono::Duration::hours(23));
        assert!(age <= chrono::Duration::hours(25));
    }

    #[test]
    fn test_same_seed_same_payload_shape() {
        let catalog = numbered_catalog(40);
        let synth = PayloadSynthesizer::new(PayloadConfig::default()).unwrap();
        let a = synth.synthesize(&catalog, &mut ChaCha8Rng::seed_from_u64(77));
        let b = synth.synthesize(&catalog, &mut ChaCha8Rng::seed_from_u64(77));
        assert_eq!(a.items, b.items);
        assert_eq!(a.fulfillment_policy, b.fulfillment_policy);
        assert_eq!(a.shipping_speed, b.shipping_speed);
    }

    #[test]
    fn test_rejects_invalid_payload_config() {
        let mut config = PayloadConfig::default();
        config.min_items = 10;
        assert!(PayloadSynthesizer::new(config).is_err());
    }
}
