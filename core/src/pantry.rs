use anyhow::{Result, bail};
use chrono::NaiveDate;
use tracing::warn;

use crate::db::Database;
use crate::models::{LocalIdGenerator, PantryItem, PantryPatch, Recipe};

pub const INGREDIENTS_KEY: &str = "cookoo_ingredients";
pub const RECOMMENDATION_LIMIT: usize = 5;

/// Ingredients on hand, persisted locally.
pub struct Pantry {
    db: Database,
    items: Vec<PantryItem>,
    ids: LocalIdGenerator,
}

impl Pantry {
    /// Load the stored pantry. Unreadable data is logged and treated as empty.
    #[must_use]
    pub fn load(db: Database) -> Self {
        let items = match db.get_json::<Vec<PantryItem>>(INGREDIENTS_KEY) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "stored pantry unreadable, starting empty");
                Vec::new()
            }
        };
        Self {
            db,
            items,
            ids: LocalIdGenerator::default(),
        }
    }

    #[must_use]
    pub fn list(&self) -> &[PantryItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PantryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Look up by id, then by case-insensitive name.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&PantryItem> {
        self.get(key)
            .or_else(|| self.items.iter().find(|i| i.name.eq_ignore_ascii_case(key.trim())))
    }

    pub fn add(&mut self, mut item: PantryItem) -> Result<PantryItem> {
        if item.name.trim().is_empty() {
            bail!("Ingredient name must not be empty");
        }
        if item.id.is_empty() {
            item.id = self.ids.next_id();
        }
        self.items.push(item.clone());
        self.persist()?;
        Ok(item)
    }

    pub fn update(&mut self, id: &str, patch: &PantryPatch) -> Result<Option<PantryItem>> {
        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        patch.apply_to(item);
        let updated = item.clone();
        self.persist()?;
        Ok(Some(updated))
    }

    pub fn remove(&mut self, id: &str) -> Result<Option<PantryItem>> {
        let Some(idx) = self.items.iter().position(|i| i.id == id) else {
            return Ok(None);
        };
        let removed = self.items.remove(idx);
        self.persist()?;
        Ok(Some(removed))
    }

    #[must_use]
    pub fn expiring_soon(&self, today: NaiveDate) -> Vec<&PantryItem> {
        self.items
            .iter()
            .filter(|i| i.is_expiring_soon(today))
            .collect()
    }

    /// Recipes using anything on hand: an ingredient whose name contains a
    /// pantry item's name, case-insensitively.
    #[must_use]
    pub fn recommend<'a>(&self, recipes: &'a [Recipe], limit: usize) -> Vec<&'a Recipe> {
        let on_hand: Vec<String> = self
            .items
            .iter()
            .map(|i| i.name.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        recipes
            .iter()
            .filter(|recipe| {
                recipe.ingredients.iter().any(|ing| {
                    let name = ing.name.to_lowercase();
                    on_hand.iter().any(|have| name.contains(have.as_str()))
                })
            })
            .take(limit)
            .collect()
    }

    fn persist(&self) -> Result<()> {
        self.db.set_json(INGREDIENTS_KEY, &self.items)
    }
}
