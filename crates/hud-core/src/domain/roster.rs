//! Ordered driver roster with id-based lookup.
//!
//! The roster always holds the "(Auto)" sentinel at position 0.  Every other
//! entry was announced by the plugin through DRIVERS_LIST or PLAYER_JOINED.
//! The visibility engine resolves `for_driver` / `compare_driver` through
//! [`DriverRoster::resolve`]; anything the roster does not know becomes the
//! sentinel id.
//!
//! `DriverRoster` itself is not synchronised.  Owners wrap it in a
//! `tokio::sync::Mutex` and hold the lock only for the mutation or lookup,
//! never across a network write.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Driver id meaning "no specific driver / currently viewed driver".
pub const AUTO_DRIVER_ID: i32 = -1;

/// Display name of the sentinel entry.
pub const AUTO_DRIVER_NAME: &str = "(Auto)";

/// One driver in the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Driver {
    pub id: i32,
    pub name: String,
}

impl Driver {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The "(Auto)" sentinel.
    pub fn auto() -> Self {
        Self::new(AUTO_DRIVER_ID, AUTO_DRIVER_NAME)
    }

    /// Stand-in for an id seen in DRIVERS_POSITIONS before it was announced.
    pub fn placeholder(id: i32) -> Self {
        Self::new(id, format!("Driver #{id}"))
    }

    pub fn is_auto(&self) -> bool {
        self.id == AUTO_DRIVER_ID
    }
}

/// Race order plus an id index.
#[derive(Debug, Clone)]
pub struct DriverRoster {
    ordered: Vec<Driver>,
    by_id: HashMap<i32, Driver>,
}

impl Default for DriverRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRoster {
    /// Creates a roster holding only the sentinel.
    pub fn new() -> Self {
        Self {
            ordered: vec![Driver::auto()],
            by_id: HashMap::new(),
        }
    }

    /// Replaces the whole roster with `drivers`, keeping their order.
    ///
    /// Entries using the sentinel id are ignored.  A repeated id keeps the
    /// last name announced for it.
    pub fn full_replace(&mut self, drivers: impl IntoIterator<Item = Driver>) {
        self.ordered.clear();
        self.by_id.clear();
        self.ordered.push(Driver::auto());
        let mut positions: HashMap<i32, usize> = HashMap::new();
        for driver in drivers {
            if driver.is_auto() {
                continue;
            }
            match positions.get(&driver.id) {
                Some(&index) => self.ordered[index] = driver.clone(),
                None => {
                    positions.insert(driver.id, self.ordered.len());
                    self.ordered.push(driver.clone());
                }
            }
            self.by_id.insert(driver.id, driver);
        }
    }

    /// Rebuilds the running order from `ids`.
    ///
    /// Ids never announced are filled with a placeholder; they are not added
    /// to the index, so a later DRIVERS_LIST still wins.  Drivers missing
    /// from `ids` drop out of the ordered list but stay resolvable.
    pub fn reorder(&mut self, ids: &[i32]) {
        let mut ordered = Vec::with_capacity(ids.len() + 1);
        ordered.push(Driver::auto());
        for &id in ids {
            if id == AUTO_DRIVER_ID {
                continue;
            }
            let driver = self
                .by_id
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Driver::placeholder(id));
            ordered.push(driver);
        }
        self.ordered = ordered;
    }

    /// Inserts `driver` so it becomes the `place`-th driver (1-based) after
    /// the sentinel.
    ///
    /// `place` is clamped into the current list; a driver that is already
    /// present is moved rather than duplicated.
    pub fn join(&mut self, driver: Driver, place: u16) {
        if driver.is_auto() {
            return;
        }
        self.ordered.retain(|d| d.id != driver.id);
        let index = usize::from(place).clamp(1, self.ordered.len());
        self.ordered.insert(index, driver.clone());
        self.by_id.insert(driver.id, driver);
    }

    /// Removes the driver from both the order and the index.
    ///
    /// Returns the removed entry, if the roster knew it.
    pub fn leave(&mut self, id: i32) -> Option<Driver> {
        if id == AUTO_DRIVER_ID {
            return None;
        }
        self.ordered.retain(|d| d.id != id);
        self.by_id.remove(&id)
    }

    /// Looks up an announced driver.
    pub fn lookup(&self, id: i32) -> Option<&Driver> {
        if id == AUTO_DRIVER_ID {
            return self.ordered.first();
        }
        self.by_id.get(&id)
    }

    /// Maps an optional driver reference to a wire id.
    ///
    /// `None` and any id the roster does not know resolve to
    /// [`AUTO_DRIVER_ID`].
    pub fn resolve(&self, id: Option<i32>) -> i32 {
        match id {
            Some(id) if self.by_id.contains_key(&id) => id,
            _ => AUTO_DRIVER_ID,
        }
    }

    /// Drivers in running order, sentinel first.
    pub fn drivers(&self) -> &[Driver] {
        &self.ordered
    }

    /// Announced drivers in running order, without the sentinel.
    ///
    /// Placeholders filled in by [`reorder`](Self::reorder) are left out.
    pub fn announced(&self) -> Vec<Driver> {
        self.ordered
            .iter()
            .filter(|d| self.by_id.contains_key(&d.id))
            .cloned()
            .collect()
    }

    /// Number of entries including the sentinel.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// `true` when only the sentinel is present.
    pub fn is_empty(&self) -> bool {
        self.ordered.len() <= 1
    }
}
