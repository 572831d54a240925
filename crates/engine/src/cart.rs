//! Cart engine: line items, tiered totals, persistence.
//!
//! The cart is the one piece of state shared between the checkout flow and
//! the rest of the storefront, and all mutation goes through the operations
//! here (sole-writer ownership). Every mutation persists the full item
//! collection synchronously and returns a fresh snapshot plus the transient
//! notice the UI shows as a toast.

use brisco_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing;
use crate::store::{self, KeyValueStore};

/// Namespace key the cart persists under.
pub const CART_STORAGE_KEY: &str = "brisco-cart";

/// Size key used when a product has no size dimension.
const NO_SIZE: &str = "no-size";

/// Notice shown when an item lands in the cart. Brand copy, kept verbatim.
const ADDED_NOTICE: &str = "Thank you, sincerely, Family.";

/// Errors from cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product's listed price is zero or negative.
    #[error("product {0} has a non-positive listed price")]
    NonPositivePrice(ProductId),
}

/// A product as offered on a product card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductOffer {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Listed single-unit price in dollars.
    pub list_price: Decimal,
    /// Reference to the front image asset.
    pub image_ref: String,
}

/// One line in the cart. Quantity is always at least one; reaching zero
/// removes the line instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Unique key per distinct product + size combination.
    pub item_key: String,
    /// Product identifier.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Listed single-unit price in dollars.
    pub unit_list_price: Decimal,
    /// Reference to the front image asset.
    pub image_ref: String,
    /// Selected size, if the product has sizes.
    pub size: Option<String>,
    /// Unit count, >= 1.
    pub quantity: u32,
}

/// Deterministic key for a product + size combination.
#[must_use]
pub fn item_key(product_id: ProductId, size: Option<&str>) -> String {
    format!("{product_id}-{}", size.unwrap_or(NO_SIZE))
}

/// Read-only view of one cart line with effective pricing applied.
#[derive(Debug, Clone, Serialize)]
pub struct LineView {
    /// Unique key per distinct product + size combination.
    pub item_key: String,
    /// Display name, with size appended by the presentation layer if set.
    pub name: String,
    /// Selected size, if any.
    pub size: Option<String>,
    /// Unit count.
    pub quantity: u32,
    /// Effective per-unit price under the current tier.
    pub unit_price: Decimal,
    /// `quantity * unit_price`.
    pub line_total: Decimal,
    /// Reference to the front image asset.
    pub image_ref: String,
}

/// Read-only snapshot of the whole cart for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    /// Lines in insertion order.
    pub lines: Vec<LineView>,
    /// Sum of all quantities.
    pub item_count: u32,
    /// Effective per-unit price for the current count.
    pub effective_unit_price: Decimal,
    /// Cart total under the flat tier formula, two decimal places.
    pub total: Decimal,
    /// Human-readable tier description, absent when the cart is empty.
    pub tier_label: Option<String>,
}

/// Result of a cart mutation: the new snapshot plus an optional transient
/// notice for the UI to toast.
#[derive(Debug, Clone, Serialize)]
pub struct CartUpdate {
    /// Snapshot after the mutation.
    pub snapshot: CartSnapshot,
    /// Toast text, if this mutation produces one.
    pub notice: Option<String>,
}

/// The cart engine. Owns the line items exclusively; rehydrates from the
/// store on construction and persists after every mutation.
#[derive(Debug)]
pub struct CartEngine<S: KeyValueStore> {
    items: Vec<LineItem>,
    store: S,
}

impl<S: KeyValueStore> CartEngine<S> {
    /// Construct the engine, rehydrating any persisted cart. Missing or
    /// corrupt data yields an empty cart; this never fails.
    pub fn new(store: S) -> Self {
        let items: Vec<LineItem> = store::load_or_default(&store, CART_STORAGE_KEY);
        Self { items, store }
    }

    /// Add one unit of `offer` in `size` to the cart.
    ///
    /// An existing line for the same product + size has its quantity
    /// incremented; otherwise a new line is appended with quantity one.
    ///
    /// # Errors
    ///
    /// Rejects offers with a zero or negative listed price.
    pub fn add_item(
        &mut self,
        offer: &ProductOffer,
        size: Option<&str>,
    ) -> Result<CartUpdate, CartError> {
        if offer.list_price <= Decimal::ZERO {
            return Err(CartError::NonPositivePrice(offer.id));
        }

        let key = item_key(offer.id, size);
        if let Some(existing) = self.items.iter_mut().find(|item| item.item_key == key) {
            existing.quantity += 1;
            tracing::debug!(item_key = %key, quantity = existing.quantity, "Incremented cart line");
        } else {
            self.items.push(LineItem {
                item_key: key.clone(),
                product_id: offer.id,
                name: offer.name.clone(),
                unit_list_price: offer.list_price,
                image_ref: offer.image_ref.clone(),
                size: size.map(str::to_owned),
                quantity: 1,
            });
            tracing::debug!(item_key = %key, "Appended cart line");
        }

        self.save();
        Ok(self.update(Some(ADDED_NOTICE.to_owned())))
    }

    /// Remove the line under `key`. A no-op (not an error) if absent.
    pub fn remove_item(&mut self, key: &str) -> CartUpdate {
        let Some(pos) = self.items.iter().position(|item| item.item_key == key) else {
            return self.update(None);
        };
        let removed = self.items.remove(pos);
        self.save();

        let notice = match &removed.size {
            Some(size) => format!("{} ({size}) removed from cart", removed.name),
            None => format!("{} removed from cart", removed.name),
        };
        self.update(Some(notice))
    }

    /// Set the quantity of the line under `key`. Zero removes the line;
    /// an absent key is a no-op.
    pub fn set_quantity(&mut self, key: &str, quantity: u32) -> CartUpdate {
        if quantity == 0 {
            return self.remove_item(key);
        }
        if let Some(item) = self.items.iter_mut().find(|item| item.item_key == key) {
            item.quantity = quantity;
            self.save();
        }
        self.update(None)
    }

    /// Append a confirmed checkout order for record-keeping.
    ///
    /// Unlike [`Self::add_item`] this lands the full confirmed quantity in
    /// one step, merging with an existing line for the same product + size.
    pub fn record_order(
        &mut self,
        offer: &ProductOffer,
        size: Option<&str>,
        quantity: u32,
    ) -> CartUpdate {
        if quantity == 0 {
            return self.update(None);
        }
        let key = item_key(offer.id, size);
        if let Some(existing) = self.items.iter_mut().find(|item| item.item_key == key) {
            existing.quantity += quantity;
        } else {
            self.items.push(LineItem {
                item_key: key,
                product_id: offer.id,
                name: offer.name.clone(),
                unit_list_price: offer.list_price,
                image_ref: offer.image_ref.clone(),
                size: size.map(str::to_owned),
                quantity,
            });
        }
        self.save();
        self.update(None)
    }

    /// Remove every line and persist the empty cart.
    pub fn clear(&mut self) -> CartUpdate {
        self.items.clear();
        self.save();
        self.update(None)
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Effective per-unit price for the current total count.
    #[must_use]
    pub fn effective_unit_price(&self) -> Decimal {
        pricing::effective_unit_price(self.item_count())
    }

    /// Cart total under the flat tier formula, two decimal places.
    #[must_use]
    pub fn total(&self) -> Decimal {
        pricing::total_for(self.item_count())
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The current lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Read-only snapshot for the presentation layer.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        let count = self.item_count();
        let unit_price = pricing::effective_unit_price(count);
        let lines = self
            .items
            .iter()
            .map(|item| LineView {
                item_key: item.item_key.clone(),
                name: item.name.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price,
                line_total: (Decimal::from(item.quantity) * unit_price).round_dp(2),
                image_ref: item.image_ref.clone(),
            })
            .collect();

        CartSnapshot {
            lines,
            item_count: count,
            effective_unit_price: unit_price,
            total: pricing::total_for(count),
            tier_label: pricing::tier_label(count),
        }
    }

    fn update(&self, notice: Option<String>) -> CartUpdate {
        CartUpdate {
            snapshot: self.snapshot(),
            notice,
        }
    }

    fn save(&mut self) {
        let items = self.items.clone();
        store::persist(&mut self.store, CART_STORAGE_KEY, &items);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    fn offer(id: i64, name: &str) -> ProductOffer {
        ProductOffer {
            id: ProductId::new(id),
            name: name.to_owned(),
            list_price: Decimal::from(65),
            image_ref: format!("/images/{id}-front.jpg"),
        }
    }

    fn engine() -> CartEngine<MemoryStore> {
        CartEngine::new(MemoryStore::new())
    }

    #[test]
    fn test_add_same_product_and_size_merges() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        let update = cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();

        assert_eq!(update.snapshot.lines.len(), 1);
        assert_eq!(update.snapshot.lines.first().unwrap().quantity, 2);
        assert_eq!(update.notice.as_deref(), Some("Thank you, sincerely, Family."));
    }

    #[test]
    fn test_same_product_different_size_is_distinct() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.add_item(&offer(1, "Torch Tee"), Some("L")).unwrap();
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_sizeless_product_uses_no_size_key() {
        let mut cart = engine();
        cart.add_item(&offer(7, "Sticker Pack"), None).unwrap();
        assert_eq!(cart.items().first().unwrap().item_key, "7-no-size");
    }

    #[test]
    fn test_count_equals_sum_of_quantities() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.add_item(&offer(2, "Light Hoodie"), Some("L")).unwrap();
        cart.set_quantity("1-M", 5);

        assert_eq!(cart.item_count(), 6);
        assert!(cart.items().iter().all(|item| item.quantity >= 1));
    }

    #[test]
    fn test_tiered_totals() {
        let mut cart = engine();
        let shirt = offer(1, "Torch Tee");

        cart.add_item(&shirt, Some("M")).unwrap();
        assert_eq!(cart.total(), Decimal::from(65));

        cart.add_item(&shirt, Some("M")).unwrap();
        assert_eq!(cart.total(), Decimal::from(110));

        cart.set_quantity("1-M", 3);
        assert_eq!(cart.total(), Decimal::from(165));

        cart.set_quantity("1-M", 4);
        assert_eq!(cart.total(), Decimal::from(200));

        cart.set_quantity("1-M", 5);
        assert_eq!(cart.total(), Decimal::from(250));
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        let update = cart.set_quantity("1-M", 0);

        assert!(update.snapshot.lines.is_empty());
        assert!(cart.is_empty());
        assert_eq!(
            update.notice.as_deref(),
            Some("Torch Tee (M) removed from cart")
        );
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        let update = cart.remove_item("99-XL");
        assert_eq!(update.snapshot.lines.len(), 1);
        assert!(update.notice.is_none());
    }

    #[test]
    fn test_set_quantity_missing_key_is_noop() {
        let mut cart = engine();
        let update = cart.set_quantity("99-XL", 3);
        assert!(update.snapshot.lines.is_empty());
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let mut cart = engine();
        let mut free = offer(1, "Torch Tee");
        free.list_price = Decimal::ZERO;
        assert!(matches!(
            cart.add_item(&free, Some("M")),
            Err(CartError::NonPositivePrice(_))
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.add_item(&offer(2, "Light Hoodie"), Some("L")).unwrap();
        cart.set_quantity("2-L", 3);

        // Reconstruct from the same backing store.
        let store = cart.store.clone();
        let revived = CartEngine::new(store);

        assert_eq!(revived.items(), cart.items());
        assert_eq!(revived.total(), cart.total());
    }

    #[test]
    fn test_corrupt_persisted_cart_falls_back_to_empty() {
        let mut store = MemoryStore::new();
        store.set(CART_STORAGE_KEY, "][ not json").unwrap();
        let cart = CartEngine::new(store);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_record_order_merges_full_quantity() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.record_order(&offer(1, "Torch Tee"), Some("M"), 3);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), Decimal::from(200));
    }

    #[test]
    fn test_snapshot_line_pricing_uses_cart_wide_tier() {
        let mut cart = engine();
        cart.add_item(&offer(1, "Torch Tee"), Some("M")).unwrap();
        cart.add_item(&offer(2, "Light Hoodie"), Some("L")).unwrap();

        let snapshot = cart.snapshot();
        // Two units total: every line prices at the pair tier.
        for line in &snapshot.lines {
            assert_eq!(line.unit_price, Decimal::from(55));
        }
        assert_eq!(snapshot.tier_label.as_deref(), Some("2+ shirts: $55 each"));
    }
}
