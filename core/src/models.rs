use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "簡單")]
    Easy,
    #[default]
    #[serde(alias = "中等")]
    Medium,
    #[serde(alias = "困難")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "簡單" => Ok(Self::Easy),
            "medium" | "中等" => Ok(Self::Medium),
            "hard" | "困難" => Ok(Self::Hard),
            _ => bail!("Invalid difficulty '{s}'. Must be one of: easy, medium, hard"),
        }
    }
}

/// Meal category a recipe is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    #[serde(alias = "早餐")]
    Breakfast,
    #[serde(alias = "午餐")]
    Lunch,
    #[default]
    #[serde(alias = "晚餐")]
    Dinner,
    #[serde(alias = "點心")]
    Snack,
}

impl MealCategory {
    pub const ALL: [MealCategory; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl fmt::Display for MealCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" | "早餐" => Ok(Self::Breakfast),
            "lunch" | "午餐" => Ok(Self::Lunch),
            "dinner" | "晚餐" => Ok(Self::Dinner),
            "snack" | "點心" => Ok(Self::Snack),
            _ => bail!("Invalid category '{s}'. Must be one of: breakfast, lunch, dinner, snack"),
        }
    }
}

/// Slot on the meal calendar. Snacks are not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    #[serde(alias = "早餐")]
    Breakfast,
    #[serde(alias = "午餐")]
    Lunch,
    #[serde(alias = "晚餐")]
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }

    /// The recipe category that fills this slot.
    #[must_use]
    pub fn category(self) -> MealCategory {
        match self {
            Self::Breakfast => MealCategory::Breakfast,
            Self::Lunch => MealCategory::Lunch,
            Self::Dinner => MealCategory::Dinner,
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" | "早餐" => Ok(Self::Breakfast),
            "lunch" | "午餐" => Ok(Self::Lunch),
            "dinner" | "晚餐" => Ok(Self::Dinner),
            _ => bail!("Invalid meal type '{s}'. Must be one of: breakfast, lunch, dinner"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngredientCategory {
    #[serde(alias = "蔬菜")]
    Vegetable,
    #[serde(alias = "水果")]
    Fruit,
    #[serde(alias = "肉類")]
    Meat,
    #[serde(alias = "海鮮")]
    Seafood,
    #[serde(alias = "蛋奶")]
    Dairy,
    #[serde(alias = "調味料")]
    Seasoning,
    #[default]
    #[serde(alias = "其他")]
    Other,
}

impl IngredientCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vegetable => "vegetable",
            Self::Fruit => "fruit",
            Self::Meat => "meat",
            Self::Seafood => "seafood",
            Self::Dairy => "dairy",
            Self::Seasoning => "seasoning",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for IngredientCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngredientCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vegetable" | "vegetables" | "蔬菜" => Ok(Self::Vegetable),
            "fruit" | "水果" => Ok(Self::Fruit),
            "meat" | "肉類" => Ok(Self::Meat),
            "seafood" | "海鮮" => Ok(Self::Seafood),
            "dairy" | "egg" | "eggs" | "蛋奶" => Ok(Self::Dairy),
            "seasoning" | "調味料" => Ok(Self::Seasoning),
            "other" | "其他" => Ok(Self::Other),
            _ => bail!(
                "Invalid ingredient category '{s}'. Must be one of: vegetable, fruit, meat, seafood, dairy, seasoning, other"
            ),
        }
    }
}

/// An ingredient line inside a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, quantity: Option<&str>) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    /// Empty until the recipe is added locally or synced remotely.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    /// Preparation time in minutes. Zero means unknown: only a remote
    /// document without a usable time decodes that way.
    #[serde(rename = "time")]
    pub minutes: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: MealCategory,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ingredients: Vec<Ingredient>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

fn null_as_default<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Shallow field overwrite for a recipe. Arrays are replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::option_option)]
pub struct RecipePatch {
    pub name: Option<String>,
    pub image: Option<String>,
    pub minutes: Option<u32>,
    pub difficulty: Option<Difficulty>,
    pub category: Option<MealCategory>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<Ingredient>>,
    pub steps: Option<Vec<String>>,
    pub tips: Option<Option<String>>,
    pub is_favorite: Option<bool>,
}

impl RecipePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, recipe: &mut Recipe) {
        if let Some(name) = &self.name {
            recipe.name.clone_from(name);
        }
        if let Some(image) = &self.image {
            recipe.image.clone_from(image);
        }
        if let Some(minutes) = self.minutes {
            recipe.minutes = minutes;
        }
        if let Some(difficulty) = self.difficulty {
            recipe.difficulty = difficulty;
        }
        if let Some(category) = self.category {
            recipe.category = category;
        }
        if let Some(tags) = &self.tags {
            recipe.tags.clone_from(tags);
        }
        if let Some(ingredients) = &self.ingredients {
            recipe.ingredients.clone_from(ingredients);
        }
        if let Some(steps) = &self.steps {
            recipe.steps.clone_from(steps);
        }
        if let Some(tips) = &self.tips {
            recipe.tips.clone_from(tips);
        }
        if let Some(is_favorite) = self.is_favorite {
            recipe.is_favorite = is_favorite;
        }
    }
}

pub fn validate_recipe(recipe: &Recipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    if recipe.minutes == 0 {
        bail!("Preparation time must be greater than 0 minutes");
    }
    Ok(())
}

pub fn validate_recipe_patch(patch: &RecipePatch) -> Result<()> {
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        bail!("Recipe name must not be empty");
    }
    if patch.minutes == Some(0) {
        bail!("Preparation time must be greater than 0 minutes");
    }
    Ok(())
}

/// True for identifiers minted locally (digits only), as opposed to ids
/// assigned by the remote collection.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Mints millisecond-timestamp identifiers, bumped so two calls in the same
/// millisecond never collide.
#[derive(Debug, Default)]
pub struct LocalIdGenerator {
    last: i64,
}

impl LocalIdGenerator {
    pub fn next_id(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last.to_string()
    }

    /// Make sure later ids sort after `id` if it is a local one.
    pub fn observe(&mut self, id: &str) {
        if let Ok(n) = id.parse::<i64>() {
            self.last = self.last.max(n);
        }
    }
}

/// A document as stored in the remote collection: its key plus raw fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Days before the effective expiry at which a pantry item is flagged.
pub const EXPIRING_SOON_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryItem {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: IngredientCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_life_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

impl PantryItem {
    /// Explicit expiry date, else purchase date plus shelf life.
    #[must_use]
    pub fn effective_expiry(&self) -> Option<NaiveDate> {
        self.expiry_date.or_else(|| {
            let purchased = self.purchase_date?;
            let days = self.shelf_life_days?;
            purchased.checked_add_signed(Duration::days(i64::from(days)))
        })
    }

    /// Already expired items count as expiring soon.
    #[must_use]
    pub fn is_expiring_soon(&self, today: NaiveDate) -> bool {
        self.effective_expiry()
            .is_some_and(|expiry| (expiry - today).num_days() <= EXPIRING_SOON_DAYS)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::option_option)]
pub struct PantryPatch {
    pub name: Option<String>,
    pub category: Option<IngredientCategory>,
    pub quantity: Option<Option<String>>,
    pub purchase_date: Option<Option<NaiveDate>>,
    pub shelf_life_days: Option<Option<u32>>,
    pub expiry_date: Option<Option<NaiveDate>>,
    pub image: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl PantryPatch {
    pub fn apply_to(&self, item: &mut PantryItem) {
        if let Some(name) = &self.name {
            item.name.clone_from(name);
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(quantity) = &self.quantity {
            item.quantity.clone_from(quantity);
        }
        if let Some(purchase_date) = self.purchase_date {
            item.purchase_date = purchase_date;
        }
        if let Some(shelf_life_days) = self.shelf_life_days {
            item.shelf_life_days = shelf_life_days;
        }
        if let Some(expiry_date) = self.expiry_date {
            item.expiry_date = expiry_date;
        }
        if let Some(image) = &self.image {
            item.image.clone_from(image);
        }
        if let Some(tags) = &self.tags {
            item.tags.clone_from(tags);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub date: NaiveDate,
    pub recipe_id: String,
    pub meal_type: MealType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe() -> Recipe {
        Recipe {
            id: "abc".to_string(),
            name: "Miso Soup".to_string(),
            image: String::new(),
            minutes: 10,
            difficulty: Difficulty::Easy,
            category: MealCategory::Dinner,
            tags: vec!["quick".to_string()],
            ingredients: vec![Ingredient::new("Tofu", Some("100g"))],
            steps: vec!["Boil".to_string()],
            tips: None,
            is_favorite: false,
        }
    }

    #[test]
    fn test_difficulty_parse_case_insensitive() {
        assert_eq!("EASY".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!(" hard ".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!("中等".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("impossible".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_meal_type_rejects_snack() {
        assert!("snack".parse::<MealType>().is_err());
        assert_eq!("lunch".parse::<MealType>().unwrap(), MealType::Lunch);
        assert_eq!(MealType::Dinner.category(), MealCategory::Dinner);
    }

    #[test]
    fn test_recipe_json_uses_wire_names() {
        let json = serde_json::to_value(sample_recipe()).unwrap();
        assert_eq!(json["time"], 10);
        assert_eq!(json["isFavorite"], false);
        assert_eq!(json["difficulty"], "easy");
        assert!(json.get("tips").is_none());
    }

    #[test]
    fn test_recipe_null_arrays_deserialize_empty() {
        let raw = r#"{"id":"1","name":"Toast","time":5,"tags":null,"ingredients":null}"#;
        let recipe: Recipe = serde_json::from_str(raw).unwrap();
        assert!(recipe.tags.is_empty());
        assert!(recipe.ingredients.is_empty());
        assert!(recipe.steps.is_empty());
        assert_eq!(recipe.difficulty, Difficulty::Medium);
        assert!(!recipe.is_favorite);
    }

    #[test]
    fn test_recipe_accepts_legacy_labels() {
        let raw = r#"{"name":"粥","time":20,"difficulty":"簡單","category":"早餐"}"#;
        let recipe: Recipe = serde_json::from_str(raw).unwrap();
        assert_eq!(recipe.difficulty, Difficulty::Easy);
        assert_eq!(recipe.category, MealCategory::Breakfast);
        assert!(recipe.id.is_empty());
    }

    #[test]
    fn test_patch_replaces_arrays_wholesale() {
        let mut recipe = sample_recipe();
        let patch = RecipePatch {
            tags: Some(vec!["soup".to_string(), "soup".to_string()]),
            tips: Some(Some("Do not boil the miso".to_string())),
            ..RecipePatch::default()
        };
        patch.apply_to(&mut recipe);
        assert_eq!(recipe.tags, vec!["soup", "soup"]);
        assert_eq!(recipe.tips.as_deref(), Some("Do not boil the miso"));
        assert_eq!(recipe.name, "Miso Soup");
        assert_eq!(recipe.ingredients.len(), 1);
    }

    #[test]
    fn test_patch_can_clear_tips() {
        let mut recipe = sample_recipe();
        recipe.tips = Some("old".to_string());
        RecipePatch {
            tips: Some(None),
            ..RecipePatch::default()
        }
        .apply_to(&mut recipe);
        assert!(recipe.tips.is_none());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RecipePatch::default().is_empty());
        let patch = RecipePatch {
            minutes: Some(5),
            ..RecipePatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_validate_recipe() {
        assert!(validate_recipe(&sample_recipe()).is_ok());
        let mut blank = sample_recipe();
        blank.name = "   ".to_string();
        assert!(validate_recipe(&blank).is_err());
        let mut instant = sample_recipe();
        instant.minutes = 0;
        assert!(validate_recipe(&instant).is_err());
    }

    #[test]
    fn test_is_local_id() {
        assert!(is_local_id("1718000000000"));
        assert!(!is_local_id(""));
        assert!(!is_local_id("a1b2c3"));
        assert!(!is_local_id("12-34"));
    }

    #[test]
    fn test_local_ids_are_unique_and_increasing() {
        let mut ids = LocalIdGenerator::default();
        let a: i64 = ids.next_id().parse().unwrap();
        let b: i64 = ids.next_id().parse().unwrap();
        let c: i64 = ids.next_id().parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_effective_expiry_from_shelf_life() {
        let item = PantryItem {
            id: "1".to_string(),
            name: "Milk".to_string(),
            category: IngredientCategory::Dairy,
            quantity: None,
            purchase_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            shelf_life_days: Some(7),
            expiry_date: None,
            image: None,
            tags: vec![],
        };
        assert_eq!(item.effective_expiry(), NaiveDate::from_ymd_opt(2024, 6, 8));
        assert!(!item.is_expiring_soon(NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()));
        assert!(item.is_expiring_soon(NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()));
        assert!(item.is_expiring_soon(NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()));
    }

    #[test]
    fn test_explicit_expiry_wins() {
        let item = PantryItem {
            id: "1".to_string(),
            name: "Fish".to_string(),
            category: IngredientCategory::Seafood,
            quantity: None,
            purchase_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            shelf_life_days: Some(30),
            expiry_date: NaiveDate::from_ymd_opt(2024, 6, 2),
            image: None,
            tags: vec![],
        };
        assert_eq!(item.effective_expiry(), NaiveDate::from_ymd_opt(2024, 6, 2));
    }

    #[test]
    fn test_no_dates_never_expiring() {
        let item = PantryItem {
            id: "1".to_string(),
            name: "Salt".to_string(),
            category: IngredientCategory::Seasoning,
            quantity: None,
            purchase_date: None,
            shelf_life_days: None,
            expiry_date: None,
            image: None,
            tags: vec![],
        };
        assert!(!item.is_expiring_soon(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
    }

    #[test]
    fn test_menu_item_wire_format() {
        let item = MenuItem {
            date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            recipe_id: "r1".to_string(),
            meal_type: MealType::Lunch,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["date"], "2024-06-15");
        assert_eq!(json["recipeId"], "r1");
        assert_eq!(json["mealType"], "lunch");
    }
}
