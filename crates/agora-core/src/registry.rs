//! Item registry.
//!
//! Maps `(contract, token_id)` to a unique [`Item`], records the first
//! registrant as creator, and keeps the append-only lifetime sale history.
//! Items are created once and never destroyed.

use crate::{AccountId, Item, ItemId, ItemSale, MarketError, Result, TokenRef};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<ItemId, Item>,
    by_token: BTreeMap<TokenRef, ItemId>,
    next_item: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new item for `token`.
    ///
    /// Postconditions:
    /// - Item ids are assigned sequentially starting at 1.
    /// - At most one item exists per `token`.
    pub fn create(&mut self, token: TokenRef, creator: AccountId) -> Result<ItemId> {
        if self.by_token.contains_key(&token) {
            return Err(MarketError::AlreadyExists(token));
        }
        self.next_item += 1;
        let item_id = ItemId(self.next_item);
        self.items.insert(
            item_id,
            Item {
                item_id,
                token,
                creator,
                position_count: 0,
                sales: Vec::new(),
            },
        );
        self.by_token.insert(token, item_id);
        Ok(item_id)
    }

    pub fn get(&self, item_id: ItemId) -> Result<&Item> {
        self.items
            .get(&item_id)
            .ok_or(MarketError::ItemNotFound(item_id))
    }

    pub fn get_mut(&mut self, item_id: ItemId) -> Result<&mut Item> {
        self.items
            .get_mut(&item_id)
            .ok_or(MarketError::ItemNotFound(item_id))
    }

    pub fn id_for_token(&self, token: TokenRef) -> Option<ItemId> {
        self.by_token.get(&token).copied()
    }

    pub fn append_sale(&mut self, item_id: ItemId, sale: ItemSale) -> Result<()> {
        self.get_mut(item_id)?.sales.push(sale);
        Ok(())
    }

    /// All items in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContractId;

    fn token(n: u64) -> TokenRef {
        TokenRef::new(ContractId(1), n)
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let mut reg = ItemRegistry::new();
        assert_eq!(reg.create(token(1), AccountId(1)).unwrap(), ItemId(1));
        assert_eq!(reg.create(token(2), AccountId(1)).unwrap(), ItemId(2));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let mut reg = ItemRegistry::new();
        reg.create(token(1), AccountId(1)).unwrap();
        let err = reg.create(token(1), AccountId(2)).unwrap_err();
        assert!(matches!(err, MarketError::AlreadyExists(t) if t == token(1)));
    }

    #[test]
    fn creator_is_first_registrant() {
        let mut reg = ItemRegistry::new();
        let id = reg.create(token(1), AccountId(7)).unwrap();
        assert_eq!(reg.get(id).unwrap().creator, AccountId(7));
    }

    #[test]
    fn sales_history_is_append_only() {
        let mut reg = ItemRegistry::new();
        let id = reg.create(token(1), AccountId(1)).unwrap();
        for n in 1..=3u64 {
            reg.append_sale(
                id,
                ItemSale {
                    seller: AccountId(1),
                    buyer: AccountId(2),
                    price: n as u128,
                    amount: n,
                },
            )
            .unwrap();
        }
        let sales = &reg.get(id).unwrap().sales;
        assert_eq!(sales.len(), 3);
        assert_eq!(sales[2].amount, 3);
    }

    #[test]
    fn missing_item_is_not_found() {
        let reg = ItemRegistry::new();
        assert!(matches!(
            reg.get(ItemId(9)),
            Err(MarketError::ItemNotFound(ItemId(9)))
        ));
    }
}
