use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FavoritesState {
    pub product_ids: Vec<String>,
}

impl FavoritesState {
    pub fn contains(&self, product_id: &str) -> bool {
        self.product_ids.iter().any(|id| id == product_id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FavoritesError {
    #[error("Favorites sync failed: {0}")]
    Sync(String),
}

pub trait FavoritesBackend {
    fn add(&mut self, product_id: &str) -> Result<Vec<String>, String>;
    fn remove(&mut self, product_id: &str) -> Result<Vec<String>, String>;
}

type Subscriber = Box<dyn Fn(&FavoritesState)>;

/// Observable favorites store with the same optimistic-then-reconcile
/// contract as the cart.
pub struct FavoritesStore<B: FavoritesBackend> {
    state: FavoritesState,
    backend: B,
    subscribers: Vec<Subscriber>,
}

impl<B: FavoritesBackend> FavoritesStore<B> {
    pub fn new(backend: B) -> Self {
        FavoritesStore {
            state: FavoritesState::default(),
            backend,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> &FavoritesState {
        &self.state
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&FavoritesState) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn notify(&self) {
        for subscriber in &self.subscribers {
            subscriber(&self.state);
        }
    }

    fn reconcile(
        &mut self,
        result: Result<Vec<String>, String>,
        snapshot: FavoritesState,
    ) -> Result<(), FavoritesError> {
        match result {
            Ok(product_ids) => {
                self.state.product_ids = product_ids;
                self.notify();
                Ok(())
            }
            Err(reason) => {
                self.state = snapshot;
                self.notify();
                Err(FavoritesError::Sync(reason))
            }
        }
    }

    pub fn add(&mut self, product_id: &str) -> Result<(), FavoritesError> {
        let snapshot = self.state.clone();
        if !self.state.contains(product_id) {
            self.state.product_ids.push(product_id.to_string());
        }
        self.notify();

        let result = self.backend.add(product_id);
        self.reconcile(result, snapshot)
    }

    pub fn remove(&mut self, product_id: &str) -> Result<(), FavoritesError> {
        let snapshot = self.state.clone();
        self.state.product_ids.retain(|id| id != product_id);
        self.notify();

        let result = self.backend.remove(product_id);
        self.reconcile(result, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockBackend {
        server: Vec<String>,
        fail_next: bool,
    }

    impl FavoritesBackend for MockBackend {
        fn add(&mut self, product_id: &str) -> Result<Vec<String>, String> {
            if std::mem::take(&mut self.fail_next) {
                return Err("network down".to_string());
            }
            if !self.server.iter().any(|id| id == product_id) {
                self.server.push(product_id.to_string());
            }
            Ok(self.server.clone())
        }

        fn remove(&mut self, product_id: &str) -> Result<Vec<String>, String> {
            if std::mem::take(&mut self.fail_next) {
                return Err("network down".to_string());
            }
            self.server.retain(|id| id != product_id);
            Ok(self.server.clone())
        }
    }

    fn store() -> FavoritesStore<MockBackend> {
        FavoritesStore::new(MockBackend {
            server: Vec::new(),
            fail_next: false,
        })
    }

    #[test]
    fn test_add_and_remove() {
        let mut favorites = store();
        favorites.add("carrots").unwrap();
        assert!(favorites.state().contains("carrots"));

        favorites.remove("carrots").unwrap();
        assert!(!favorites.state().contains("carrots"));
    }

    #[test]
    fn test_add_is_idempotent_locally() {
        let mut favorites = store();
        favorites.add("carrots").unwrap();
        favorites.add("carrots").unwrap();
        assert_eq!(favorites.state().product_ids.len(), 1);
    }

    #[test]
    fn test_failed_remove_rolls_back() {
        let mut favorites = store();
        favorites.add("carrots").unwrap();

        favorites.backend.fail_next = true;
        assert!(favorites.remove("carrots").is_err());
        assert!(favorites.state().contains("carrots"));
    }
}
