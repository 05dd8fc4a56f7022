//! Meta-progression: currency, per-mode level unlocks and shop items
//!
//! Persisted to LocalStorage as JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sim::OperatorMode;

/// Highest level offered on the level select screen
pub const MAX_SELECTABLE_LEVEL: u32 = 20;

/// Highest unlocked level for each mode (starts at 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighestLevels {
    pub addition: u32,
    pub subtraction: u32,
    pub multiplication: u32,
    pub division: u32,
}

impl Default for HighestLevels {
    fn default() -> Self {
        Self {
            addition: 1,
            subtraction: 1,
            multiplication: 1,
            division: 1,
        }
    }
}

impl HighestLevels {
    pub fn get(&self, mode: OperatorMode) -> u32 {
        match mode {
            OperatorMode::Addition => self.addition,
            OperatorMode::Subtraction => self.subtraction,
            OperatorMode::Multiplication => self.multiplication,
            OperatorMode::Division => self.division,
        }
    }

    fn get_mut(&mut self, mode: OperatorMode) -> &mut u32 {
        match mode {
            OperatorMode::Addition => &mut self.addition,
            OperatorMode::Subtraction => &mut self.subtraction,
            OperatorMode::Multiplication => &mut self.multiplication,
            OperatorMode::Division => &mut self.division,
        }
    }
}

/// Shop category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Ship,
    Outfit,
    Buddy,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Ship, ItemKind::Outfit, ItemKind::Buddy];

    /// Item every player owns from the start
    pub fn starter(&self) -> &'static str {
        match self {
            ItemKind::Ship => "default",
            ItemKind::Outfit => "light_blue",
            ItemKind::Buddy => "normal",
        }
    }
}

/// Items owned in one category and the one equipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub owned: Vec<String>,
    pub current: String,
}

impl Collection {
    fn starter(kind: ItemKind) -> Self {
        Self {
            owned: vec![kind.starter().to_string()],
            current: kind.starter().to_string(),
        }
    }

    pub fn owns(&self, id: &str) -> bool {
        self.owned.iter().any(|owned| owned == id)
    }
}

/// Owned and equipped cosmetics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hangar {
    pub ships: Collection,
    pub outfits: Collection,
    pub buddies: Collection,
}

impl Default for Hangar {
    fn default() -> Self {
        Self {
            ships: Collection::starter(ItemKind::Ship),
            outfits: Collection::starter(ItemKind::Outfit),
            buddies: Collection::starter(ItemKind::Buddy),
        }
    }
}

impl Hangar {
    pub fn get(&self, kind: ItemKind) -> &Collection {
        match kind {
            ItemKind::Ship => &self.ships,
            ItemKind::Outfit => &self.outfits,
            ItemKind::Buddy => &self.buddies,
        }
    }

    fn get_mut(&mut self, kind: ItemKind) -> &mut Collection {
        match kind {
            ItemKind::Ship => &mut self.ships,
            ItemKind::Outfit => &mut self.outfits,
            ItemKind::Buddy => &mut self.buddies,
        }
    }
}

/// Player progress that survives between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// SpaceBux balance
    #[serde(default)]
    pub currency: u64,
    #[serde(default)]
    pub highest_levels: HighestLevels,
    /// Last played mode/level, used to resume
    #[serde(default)]
    pub last_mode: OperatorMode,
    #[serde(default = "first_level")]
    pub last_level: u32,
    #[serde(default)]
    pub hangar: Hangar,
}

fn first_level() -> u32 {
    1
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "math_defenders_progress";

    /// Fresh progress: no currency, level 1 unlocked everywhere
    pub fn new() -> Self {
        Self {
            currency: 0,
            highest_levels: HighestLevels::default(),
            last_mode: OperatorMode::default(),
            last_level: 1,
            hangar: Hangar::default(),
        }
    }

    pub fn award_currency(&mut self, amount: u64) {
        self.currency = self.currency.saturating_add(amount);
    }

    pub fn highest_level(&self, mode: OperatorMode) -> u32 {
        self.highest_levels.get(mode)
    }

    /// Whether a level can be picked from level select
    pub fn is_unlocked(&self, mode: OperatorMode, level: u32) -> bool {
        level >= 1 && level <= self.highest_level(mode).saturating_add(1)
    }

    /// Levels shown on the level select screen
    pub fn selectable_levels(&self, mode: OperatorMode) -> std::ops::RangeInclusive<u32> {
        1..=self.highest_level(mode).saturating_add(1).min(MAX_SELECTABLE_LEVEL)
    }

    /// Record a completed level. Returns the new high-water mark if it moved.
    pub fn record_win(&mut self, mode: OperatorMode, level: u32) -> Option<u32> {
        let highest = self.highest_levels.get_mut(mode);
        if level >= *highest {
            *highest = level.saturating_add(1);
            Some(*highest)
        } else {
            None
        }
    }

    pub fn owns(&self, kind: ItemKind, id: &str) -> bool {
        self.hangar.get(kind).owns(id)
    }

    pub fn equipped(&self, kind: ItemKind) -> &str {
        &self.hangar.get(kind).current
    }

    /// Buy and equip an item. Fails if already owned or the balance is short.
    /// The caller saves on success.
    pub fn purchase(&mut self, kind: ItemKind, id: &str, cost: u64) -> bool {
        if self.owns(kind, id) || self.currency < cost {
            return false;
        }
        self.currency -= cost;
        let collection = self.hangar.get_mut(kind);
        collection.owned.push(id.to_string());
        collection.current = id.to_string();
        log::info!("Bought {:?} '{}' for {} SpaceBux", kind, id, cost);
        true
    }

    /// Equip an owned item
    pub fn equip(&mut self, kind: ItemKind, id: &str) -> bool {
        let collection = self.hangar.get_mut(kind);
        if !collection.owns(id) {
            return false;
        }
        collection.current = id.to_string();
        true
    }

    /// Remember what was played last
    pub fn remember_selection(&mut self, mode: OperatorMode, level: u32) {
        self.last_mode = mode;
        self.last_level = level.max(1);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse saved progress; missing fields fall back to fresh defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load progress from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(progress) => {
                        log::info!("Loaded progress ({} SpaceBux)", progress.currency);
                        return progress;
                    }
                    Err(e) => log::warn!("Discarding unreadable progress: {}", e),
                }
            }
        }

        log::info!("No saved progress found, starting fresh");
        Self::new()
    }

    /// Save progress to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = self.to_json() {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Progress saved");
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::new()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        log::debug!("Progress save requested (no storage on native)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_progress() {
        let progress = Progress::new();
        for mode in OperatorMode::ALL {
            assert_eq!(progress.highest_level(mode), 1);
            assert!(progress.is_unlocked(mode, 1));
            assert!(progress.is_unlocked(mode, 2));
            assert!(!progress.is_unlocked(mode, 3));
            assert!(!progress.is_unlocked(mode, 0));
        }
    }

    #[test]
    fn test_record_win_moves_high_water_mark() {
        let mut progress = Progress::new();
        assert_eq!(progress.record_win(OperatorMode::Division, 1), Some(2));
        assert_eq!(progress.record_win(OperatorMode::Division, 2), Some(3));
        // Replaying an older level never lowers the mark
        assert_eq!(progress.record_win(OperatorMode::Division, 1), None);
        assert_eq!(progress.highest_level(OperatorMode::Division), 3);
        assert_eq!(progress.highest_level(OperatorMode::Addition), 1);
    }

    #[test]
    fn test_selectable_levels_capped() {
        let mut progress = Progress::new();
        assert_eq!(progress.selectable_levels(OperatorMode::Addition), 1..=2);
        progress.highest_levels.addition = 40;
        assert_eq!(progress.selectable_levels(OperatorMode::Addition), 1..=20);
    }

    #[test]
    fn test_json_roundtrip_and_defaults() {
        let mut progress = Progress::new();
        progress.award_currency(120);
        progress.record_win(OperatorMode::Subtraction, 4);
        progress.remember_selection(OperatorMode::Subtraction, 5);
        let restored = Progress::from_json(&progress.to_json().unwrap()).unwrap();
        assert_eq!(restored, progress);

        let partial = Progress::from_json(r#"{ "currency": 7 }"#).unwrap();
        assert_eq!(partial.currency, 7);
        assert_eq!(partial.last_level, 1);
        assert_eq!(partial.highest_levels, HighestLevels::default());

        assert!(Progress::from_json(r#"{ "currency": "lots" }"#).is_err());
    }

    #[test]
    fn test_record_win_at_top_level() {
        let mut progress = Progress::new();
        assert_eq!(progress.record_win(OperatorMode::Addition, u32::MAX), Some(u32::MAX));
        assert!(progress.is_unlocked(OperatorMode::Addition, u32::MAX));
        assert_eq!(progress.selectable_levels(OperatorMode::Addition), 1..=MAX_SELECTABLE_LEVEL);
    }

    #[test]
    fn test_starter_items() {
        let progress = Progress::new();
        assert_eq!(progress.equipped(ItemKind::Ship), "default");
        assert_eq!(progress.equipped(ItemKind::Outfit), "light_blue");
        assert_eq!(progress.equipped(ItemKind::Buddy), "normal");
        for kind in ItemKind::ALL {
            assert!(progress.owns(kind, kind.starter()));
        }
    }

    #[test]
    fn test_purchase_needs_funds() {
        let mut progress = Progress::new();
        progress.award_currency(499);
        assert!(!progress.purchase(ItemKind::Ship, "interceptor", 500));
        assert_eq!(progress.currency, 499);
        assert!(!progress.owns(ItemKind::Ship, "interceptor"));
        assert_eq!(progress.equipped(ItemKind::Ship), "default");
    }

    #[test]
    fn test_purchase_spends_and_equips_once() {
        let mut progress = Progress::new();
        progress.award_currency(1000);
        assert!(progress.purchase(ItemKind::Buddy, "robot", 600));
        assert_eq!(progress.currency, 400);
        assert_eq!(progress.equipped(ItemKind::Buddy), "robot");

        // Owned items are never charged twice
        assert!(!progress.purchase(ItemKind::Buddy, "robot", 100));
        assert_eq!(progress.currency, 400);
        assert_eq!(progress.hangar.buddies.owned, vec!["normal", "robot"]);
    }

    #[test]
    fn test_equip_requires_ownership() {
        let mut progress = Progress::new();
        assert!(!progress.equip(ItemKind::Outfit, "gold"));
        progress.award_currency(50);
        assert!(progress.purchase(ItemKind::Outfit, "gold", 50));
        assert!(progress.equip(ItemKind::Outfit, "light_blue"));
        assert_eq!(progress.equipped(ItemKind::Outfit), "light_blue");
        assert!(progress.equip(ItemKind::Outfit, "gold"));
        assert_eq!(progress.equipped(ItemKind::Outfit), "gold");
    }

    #[test]
    fn test_hangar_survives_json() {
        let mut progress = Progress::new();
        progress.award_currency(300);
        progress.purchase(ItemKind::Ship, "falcon", 250);
        let restored = Progress::from_json(&progress.to_json().unwrap()).unwrap();
        assert_eq!(restored.hangar, progress.hangar);
        assert_eq!(restored.equipped(ItemKind::Ship), "falcon");
        assert_eq!(restored.currency, 50);

        // Saves from before the shop existed get the starter items
        let old = Progress::from_json(r#"{ "currency": 10 }"#).unwrap();
        assert_eq!(old.hangar, Hangar::default());
        let partial = Progress::from_json(r#"{ "hangar": { "buddies": { "owned": ["normal", "cat"], "current": "cat" } } }"#).unwrap();
        assert_eq!(partial.equipped(ItemKind::Buddy), "cat");
        assert_eq!(partial.equipped(ItemKind::Ship), "default");
    }
}
