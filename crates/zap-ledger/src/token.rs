//! Fungible token collaborator.
//!
//! The ledger never holds token balances itself; it asks a [`Token`] to move
//! value and treats a `false` answer as a rejected payment. [`InMemoryToken`]
//! is a self-contained implementation with ERC-20 style allowances.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use zap_core::{Address, Amount};

/// Value-transfer service the ledger settles bonds through.
pub trait Token: Send + Sync {
    /// Balance of `owner`.
    fn balance_of(&self, owner: &Address) -> Amount;

    /// Amount `spender` may still move out of `owner`'s balance.
    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` from `sender` to `to`. Returns `false` if rejected.
    fn transfer(&self, sender: &Address, to: &Address, amount: Amount) -> bool;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance. Returns `false` if rejected.
    fn transfer_from(&self, spender: &Address, from: &Address, to: &Address, amount: Amount)
    -> bool;
}

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
}

impl TokenState {
    fn balance(&self, owner: &Address) -> Amount {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    /// Debit then credit. Callers have checked `from` can afford `amount`.
    fn move_funds(&mut self, from: &Address, to: &Address, amount: Amount) -> bool {
        if from == to {
            return true;
        }
        let Some(debited) = self.balance(from).checked_sub(amount) else {
            return false;
        };
        let Some(credited) = self.balance(to).checked_add(amount) else {
            return false;
        };
        self.balances.insert(from.clone(), debited);
        self.balances.insert(to.clone(), credited);
        true
    }
}

/// An in-process token ledger.
#[derive(Debug, Default)]
pub struct InMemoryToken {
    state: Mutex<TokenState>,
}

impl InMemoryToken {
    /// Create a token with no supply.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `amount` new tokens for `to`. Returns `false` on overflow.
    pub fn mint(&self, to: &Address, amount: Amount) -> bool {
        let mut state = self.state.lock();
        let (Some(supply), Some(balance)) = (
            state.total_supply.checked_add(amount),
            state.balance(to).checked_add(amount),
        ) else {
            return false;
        };
        state.total_supply = supply;
        state.balances.insert(to.clone(), balance);
        debug!(to = %to, amount = %amount, "minted tokens");
        true
    }

    /// Let `spender` move up to `amount` of `owner`'s tokens.
    pub fn approve(&self, owner: &Address, spender: &Address, amount: Amount) {
        self.state
            .lock()
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Total tokens in existence.
    #[must_use]
    pub fn total_supply(&self) -> Amount {
        self.state.lock().total_supply
    }
}

impl Token for InMemoryToken {
    fn balance_of(&self, owner: &Address) -> Amount {
        self.state.lock().balance(owner)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.state
            .lock()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(&self, sender: &Address, to: &Address, amount: Amount) -> bool {
        self.state.lock().move_funds(sender, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> bool {
        let mut state = self.state.lock();
        let key = (from.clone(), spender.clone());
        let allowed = state.allowances.get(&key).copied().unwrap_or_default();
        let Some(remaining) = allowed.checked_sub(amount) else {
            debug!(spender = %spender, from = %from, %amount, %allowed, "allowance too small");
            return false;
        };
        if !state.move_funds(from, to, amount) {
            return false;
        }
        state.allowances.insert(key, remaining);
        true
    }
}
