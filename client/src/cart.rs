use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One cart line mirrored from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub farmer_id: String,
    pub name: String,
    pub unit_price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartState {
    pub lines: Vec<CartLine>,
}

impl CartState {
    pub fn subtotal(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.unit_price * i64::from(l.quantity))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id == product_id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    /// A checkout covers one farm; this is only enforced here, client-side.
    #[error("Cart is limited to a single farm per checkout")]
    MixedFarms,
    #[error("Cart sync failed: {0}")]
    Sync(String),
}

/// Remote half of the store. Every mutation pushes one operation and
/// receives the authoritative full cart back.
pub trait CartBackend {
    fn add_line(&mut self, line: &CartLine) -> Result<Vec<CartLine>, String>;
    fn remove_line(&mut self, product_id: &str) -> Result<Vec<CartLine>, String>;
    fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<Vec<CartLine>, String>;
    fn clear(&mut self) -> Result<Vec<CartLine>, String>;
}

type Subscriber = Box<dyn Fn(&CartState)>;

/// Observable cart store. Mutations are optimistic: subscribers see the
/// local change immediately, then either the server state or the rolled-back
/// snapshot once the sync resolves.
pub struct CartStore<B: CartBackend> {
    state: CartState,
    backend: B,
    subscribers: Vec<Subscriber>,
}

impl<B: CartBackend> CartStore<B> {
    pub fn new(backend: B) -> Self {
        CartStore {
            state: CartState::default(),
            backend,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&CartState) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn notify(&self) {
        for subscriber in &self.subscribers {
            subscriber(&self.state);
        }
    }

    fn reconcile(
        &mut self,
        result: Result<Vec<CartLine>, String>,
        snapshot: CartState,
    ) -> Result<(), CartError> {
        match result {
            Ok(lines) => {
                self.state.lines = lines;
                self.notify();
                Ok(())
            }
            Err(reason) => {
                self.state = snapshot;
                self.notify();
                Err(CartError::Sync(reason))
            }
        }
    }

    pub fn add_line(&mut self, line: CartLine) -> Result<(), CartError> {
        if self
            .state
            .lines
            .iter()
            .any(|l| l.farmer_id != line.farmer_id)
        {
            return Err(CartError::MixedFarms);
        }

        let snapshot = self.state.clone();
        match self.state.position(&line.product_id) {
            Some(index) => self.state.lines[index].quantity += line.quantity,
            None => self.state.lines.push(line.clone()),
        }
        self.notify();

        let result = self.backend.add_line(&line);
        self.reconcile(result, snapshot)
    }

    pub fn remove_line(&mut self, product_id: &str) -> Result<(), CartError> {
        let snapshot = self.state.clone();
        self.state.lines.retain(|l| l.product_id != product_id);
        self.notify();

        let result = self.backend.remove_line(product_id);
        self.reconcile(result, snapshot)
    }

    /// Quantity zero removes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let snapshot = self.state.clone();
        if quantity == 0 {
            self.state.lines.retain(|l| l.product_id != product_id);
        } else if let Some(index) = self.state.position(product_id) {
            self.state.lines[index].quantity = quantity;
        }
        self.notify();

        let result = self.backend.set_quantity(product_id, quantity);
        self.reconcile(result, snapshot)
    }

    pub fn clear(&mut self) -> Result<(), CartError> {
        let snapshot = self.state.clone();
        self.state.lines.clear();
        self.notify();

        let result = self.backend.clear();
        self.reconcile(result, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory stand-in for the server cart API.
    struct MockBackend {
        server: Vec<CartLine>,
        fail_next: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            MockBackend {
                server: Vec::new(),
                fail_next: false,
            }
        }

        fn take_failure(&mut self) -> bool {
            std::mem::take(&mut self.fail_next)
        }
    }

    impl CartBackend for MockBackend {
        fn add_line(&mut self, line: &CartLine) -> Result<Vec<CartLine>, String> {
            if self.take_failure() {
                return Err("network down".to_string());
            }
            match self.server.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => existing.quantity += line.quantity,
                None => self.server.push(line.clone()),
            }
            Ok(self.server.clone())
        }

        fn remove_line(&mut self, product_id: &str) -> Result<Vec<CartLine>, String> {
            if self.take_failure() {
                return Err("network down".to_string());
            }
            self.server.retain(|l| l.product_id != product_id);
            Ok(self.server.clone())
        }

        fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<Vec<CartLine>, String> {
            if self.take_failure() {
                return Err("network down".to_string());
            }
            if quantity == 0 {
                self.server.retain(|l| l.product_id != product_id);
            } else if let Some(line) = self.server.iter_mut().find(|l| l.product_id == product_id)
            {
                line.quantity = quantity;
            }
            Ok(self.server.clone())
        }

        fn clear(&mut self) -> Result<Vec<CartLine>, String> {
            if self.take_failure() {
                return Err("network down".to_string());
            }
            self.server.clear();
            Ok(self.server.clone())
        }
    }

    fn line(product: &str, farmer: &str, price: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: product.to_string(),
            farmer_id: farmer.to_string(),
            name: product.to_string(),
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn test_add_syncs_with_server() {
        let mut store = CartStore::new(MockBackend::new());
        store.add_line(line("carrots", "farm-1", 100, 3)).unwrap();

        assert_eq!(store.state().lines.len(), 1);
        assert_eq!(store.state().subtotal(), 300);
    }

    #[test]
    fn test_failed_add_rolls_back() {
        let mut backend = MockBackend::new();
        backend.fail_next = true;
        let mut store = CartStore::new(backend);

        let err = store.add_line(line("carrots", "farm-1", 100, 3)).unwrap_err();
        assert_eq!(err, CartError::Sync("network down".to_string()));
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_failed_update_restores_previous_quantity() {
        let mut store = CartStore::new(MockBackend::new());
        store.add_line(line("carrots", "farm-1", 100, 3)).unwrap();

        store.backend.fail_next = true;
        assert!(store.set_quantity("carrots", 5).is_err());
        assert_eq!(store.state().lines[0].quantity, 3);
    }

    #[test]
    fn test_mixed_farm_rejected_locally() {
        let mut store = CartStore::new(MockBackend::new());
        store.add_line(line("carrots", "farm-1", 100, 1)).unwrap();

        let err = store.add_line(line("milk", "farm-2", 80, 1)).unwrap_err();
        assert_eq!(err, CartError::MixedFarms);
        assert_eq!(store.state().lines.len(), 1);
        // The rejected line never reached the backend.
        assert_eq!(store.backend.server.len(), 1);
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let mut store = CartStore::new(MockBackend::new());
        store.add_line(line("carrots", "farm-1", 100, 2)).unwrap();
        store.set_quantity("carrots", 0).unwrap();
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_clear_empties_cart() {
        let mut store = CartStore::new(MockBackend::new());
        store.add_line(line("carrots", "farm-1", 100, 2)).unwrap();
        store.add_line(line("beets", "farm-1", 60, 1)).unwrap();
        store.clear().unwrap();
        assert!(store.state().is_empty());
    }

    #[test]
    fn test_subscribers_see_optimistic_then_final_state() {
        let notifications = Rc::new(Cell::new(0u32));
        let seen = notifications.clone();

        let mut store = CartStore::new(MockBackend::new());
        store.subscribe(move |_| seen.set(seen.get() + 1));

        store.add_line(line("carrots", "farm-1", 100, 1)).unwrap();
        // One optimistic notification plus one on reconciliation.
        assert_eq!(notifications.get(), 2);
    }
}
