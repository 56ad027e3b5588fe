//! Shared application state.
//!
//! [`AppState`] is the record the UI renders from. It is co-owned with UI code,
//! so it stays an open JSON object: the tracked progress fields have typed
//! accessors, everything else passes through untouched. Updates are always
//! merged in via [`merge_snapshot`], never assigned wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::value::{coerce_number, is_present};

/// Field name for the player level.
pub const LEVEL: &str = "level";
/// Field name for experience points.
pub const XP: &str = "xp";
/// Field name for the experience needed to reach the next level.
pub const XP_TO_NEXT_LEVEL: &str = "xpToNextLevel";
/// Field name for the in-game currency.
pub const GOLD: &str = "gold";
/// Field name for the avatar reference (URL or data URL).
pub const PROFILE_PICTURE: &str = "profilePicture";

/// Defaults used when a numeric progress field is missing or unusable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDefaults {
    /// Starting level.
    pub level: i64,
    /// Starting experience.
    pub xp: i64,
    /// Experience needed for the first level-up.
    pub xp_to_next_level: i64,
    /// Starting gold.
    pub gold: i64,
}

impl Default for StateDefaults {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            xp_to_next_level: 100,
            gold: 0,
        }
    }
}

impl StateDefaults {
    fn numeric(&self, key: &str) -> i64 {
        match key {
            LEVEL => self.level,
            XP_TO_NEXT_LEVEL => self.xp_to_next_level,
            GOLD => self.gold,
            _ => self.xp,
        }
    }
}

/// The shared, loosely-typed application state record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppState {
    fields: Map<String, Value>,
}

impl AppState {
    /// State seeded with the default progress values and no avatar.
    pub fn with_defaults(defaults: &StateDefaults) -> Self {
        let mut fields = Map::new();
        let _ = fields.insert(LEVEL.into(), Value::from(defaults.level));
        let _ = fields.insert(XP.into(), Value::from(defaults.xp));
        let _ = fields.insert(
            XP_TO_NEXT_LEVEL.into(),
            Value::from(defaults.xp_to_next_level),
        );
        let _ = fields.insert(GOLD.into(), Value::from(defaults.gold));
        let _ = fields.insert(PROFILE_PICTURE.into(), Value::Null);
        Self { fields }
    }

    /// Wrap an existing JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a single field (used by UI code that owns local-only fields).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let _ = self.fields.insert(key.into(), value.into());
    }

    /// Current level, coerced to a number.
    pub fn level(&self) -> Option<Number> {
        self.fields.get(LEVEL).and_then(coerce_number)
    }

    /// Current experience, coerced to a number.
    pub fn xp(&self) -> Option<Number> {
        self.fields.get(XP).and_then(coerce_number)
    }

    /// Current gold, coerced to a number.
    pub fn gold(&self) -> Option<Number> {
        self.fields.get(GOLD).and_then(coerce_number)
    }

    /// Avatar reference, if one is set.
    pub fn profile_picture(&self) -> Option<&str> {
        self.fields.get(PROFILE_PICTURE).and_then(Value::as_str)
    }

    /// Borrow the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume into the underlying object.
    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    /// The record written to the backend by a progress save.
    ///
    /// Every field is carried over; `level`, `xp` and `gold` are coerced to
    /// numbers, with zero / missing / unparsable values replaced by the
    /// defaults.
    pub fn to_persisted(&self, defaults: &StateDefaults) -> Map<String, Value> {
        let mut out = self.fields.clone();
        for key in [LEVEL, XP, GOLD] {
            let n = self
                .fields
                .get(key)
                .and_then(coerce_number)
                .filter(|n| n.as_f64().is_some_and(|f| f != 0.0))
                .unwrap_or_else(|| Number::from(defaults.numeric(key)));
            let _ = out.insert(key.into(), Value::Number(n));
        }
        out
    }
}

/// Fold a pushed user document into the current state.
///
/// `level`, `xp` and `gold` take the incoming value, else the current one,
/// else the default, always as numbers; a value that does not coerce counts
/// as absent. `profilePicture` takes the incoming
/// value if set, else keeps the current one. All other local fields are kept
/// as they are; other incoming fields are ignored.
pub fn merge_snapshot(
    current: &AppState,
    incoming: &Map<String, Value>,
    defaults: &StateDefaults,
) -> AppState {
    let mut next = current.clone();

    for key in [LEVEL, XP, GOLD] {
        let n = [incoming.get(key), current.fields.get(key)]
            .into_iter()
            .flatten()
            .find_map(coerce_number)
            .unwrap_or_else(|| Number::from(defaults.numeric(key)));
        next.set(key, Value::Number(n));
    }

    let picture = if is_present(incoming.get(PROFILE_PICTURE)) {
        incoming.get(PROFILE_PICTURE).cloned()
    } else if is_present(current.fields.get(PROFILE_PICTURE)) {
        current.fields.get(PROFILE_PICTURE).cloned()
    } else {
        None
    };
    next.set(PROFILE_PICTURE, picture.unwrap_or(Value::Null));

    next
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults_seed_progress_fields() {
        let state = AppState::with_defaults(&StateDefaults::default());
        assert_eq!(state.level(), Some(Number::from(1)));
        assert_eq!(state.xp(), Some(Number::from(0)));
        assert_eq!(state.get(XP_TO_NEXT_LEVEL), Some(&json!(100)));
        assert_eq!(state.profile_picture(), None);
    }

    #[test]
    fn persisted_record_coerces_numeric_strings() {
        let state = AppState::from_map(obj(json!({"level": "3", "xp": 50})));
        let out = state.to_persisted(&StateDefaults::default());
        assert_eq!(out["level"], json!(3));
        assert!(out["level"].is_number());
        assert_eq!(out["xp"], json!(50));
        assert_eq!(out["gold"], json!(0));
    }

    #[test]
    fn persisted_record_keeps_extra_fields() {
        let state = AppState::from_map(obj(json!({"level": 2, "theme": "dark"})));
        let out = state.to_persisted(&StateDefaults::default());
        assert_eq!(out["theme"], json!("dark"));
    }

    #[test]
    fn persisted_zero_level_falls_back_to_default() {
        let state = AppState::from_map(obj(json!({"level": 0, "gold": "abc"})));
        let out = state.to_persisted(&StateDefaults::default());
        assert_eq!(out["level"], json!(1));
        assert_eq!(out["gold"], json!(0));
    }

    #[test]
    fn merge_takes_incoming_numbers() {
        let current = AppState::with_defaults(&StateDefaults::default());
        let next = merge_snapshot(
            &current,
            &obj(json!({"level": 4, "xp": "70", "gold": 12})),
            &StateDefaults::default(),
        );
        assert_eq!(next.get(LEVEL), Some(&json!(4)));
        assert_eq!(next.get(XP), Some(&json!(70)));
        assert_eq!(next.get(GOLD), Some(&json!(12)));
    }

    #[test]
    fn merge_preserves_fields_absent_from_update() {
        let mut current = AppState::from_map(obj(json!({"level": 5, "xp": 10, "gold": 3})));
        current.set("streak", 7);
        let next = merge_snapshot(&current, &obj(json!({"xp": 20})), &StateDefaults::default());
        assert_eq!(next.get(LEVEL), Some(&json!(5)));
        assert_eq!(next.get(GOLD), Some(&json!(3)));
        assert_eq!(next.get("streak"), Some(&json!(7)));
        assert_eq!(next.get(XP), Some(&json!(20)));
    }

    #[test]
    fn merge_skips_unparsable_incoming_value() {
        let current = AppState::from_map(obj(json!({"level": 5, "xp": "12", "gold": 3})));
        let next = merge_snapshot(
            &current,
            &obj(json!({"level": "abc", "xp": [1], "gold": "7"})),
            &StateDefaults::default(),
        );
        assert_eq!(next.get(LEVEL), Some(&json!(5)));
        assert_eq!(next.get(XP), Some(&json!(12)));
        assert_eq!(next.get(GOLD), Some(&json!(7)));
    }

    #[test]
    fn merge_falls_back_to_default_when_nothing_parses() {
        let current = AppState::from_map(obj(json!({"level": "high"})));
        let next = merge_snapshot(
            &current,
            &obj(json!({"level": "abc"})),
            &StateDefaults::default(),
        );
        assert_eq!(next.get(LEVEL), Some(&json!(1)));
    }

    #[test]
    fn merge_ignores_untracked_incoming_fields() {
        let current = AppState::with_defaults(&StateDefaults::default());
        let next = merge_snapshot(
            &current,
            &obj(json!({"email": "a@b.c"})),
            &StateDefaults::default(),
        );
        assert!(next.get("email").is_none());
    }

    #[test]
    fn merge_keeps_current_picture_when_incoming_is_null() {
        let mut current = AppState::with_defaults(&StateDefaults::default());
        current.set(PROFILE_PICTURE, "https://img/me.png");
        let next = merge_snapshot(
            &current,
            &obj(json!({"profilePicture": null})),
            &StateDefaults::default(),
        );
        assert_eq!(next.profile_picture(), Some("https://img/me.png"));
    }

    #[test]
    fn merge_uses_defaults_when_nothing_known() {
        let next = merge_snapshot(&AppState::default(), &Map::new(), &StateDefaults::default());
        assert_eq!(next.get(LEVEL), Some(&json!(1)));
        assert_eq!(next.get(PROFILE_PICTURE), Some(&Value::Null));
    }

    #[test]
    fn merge_does_not_mutate_current() {
        let current = AppState::with_defaults(&StateDefaults::default());
        let before = current.clone();
        let _ = merge_snapshot(&current, &obj(json!({"level": 9})), &StateDefaults::default());
        assert_eq!(current, before);
    }
}
