//! The local recipe cache: the ordered list the UI renders from, mirrored to
//! durable storage after every mutation.

use tracing::{debug, warn};

use crate::db::Database;
use crate::defaults::default_recipes;
use crate::models::{LocalIdGenerator, Recipe, RecipePatch};

pub const RECIPES_KEY: &str = "cookoo_recipes";

/// Load the stored recipe list, falling back to `defaults` when the key is
/// missing or its payload does not decode.
#[must_use]
pub fn load_recipes(db: &Database, key: &str, defaults: &[Recipe]) -> Vec<Recipe> {
    match db.get_json::<Vec<Recipe>>(key) {
        Ok(Some(recipes)) => recipes,
        Ok(None) => {
            debug!(key, "no stored recipes, using bundled defaults");
            defaults.to_vec()
        }
        Err(e) => {
            warn!(key, error = %format!("{e:#}"), "stored recipes unreadable, using bundled defaults");
            defaults.to_vec()
        }
    }
}

pub struct LocalCache {
    db: Database,
    key: String,
    recipes: Vec<Recipe>,
    ids: LocalIdGenerator,
}

impl LocalCache {
    /// Populate from durable storage (or the bundled defaults). Never fails.
    #[must_use]
    pub fn load(db: Database, key: &str) -> Self {
        Self::load_with_defaults(db, key, &default_recipes())
    }

    /// Records that arrive without an id get a local one, saved right away so
    /// the same record keeps the same id across loads.
    #[must_use]
    pub fn load_with_defaults(db: Database, key: &str, defaults: &[Recipe]) -> Self {
        let mut cache = Self {
            recipes: load_recipes(&db, key, defaults),
            db,
            key: key.to_string(),
            ids: LocalIdGenerator::default(),
        };

        for recipe in &cache.recipes {
            cache.ids.observe(&recipe.id);
        }
        let mut minted = 0;
        for recipe in &mut cache.recipes {
            if recipe.id.is_empty() {
                recipe.id = cache.ids.next_id();
                minted += 1;
            }
        }
        if minted > 0 {
            debug!(key, minted, "assigned local ids to unkeyed recipes");
            cache.persist();
        }
        cache
    }

    #[must_use]
    pub fn get_all(&self) -> &[Recipe] {
        &self.recipes
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&Recipe> {
        self.position(id).map(|idx| &self.recipes[idx])
    }

    /// An empty id never matches, even if a record somehow has one.
    fn position(&self, id: &str) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.recipes.iter().position(|r| r.id == id)
    }

    /// Append a recipe, minting a local id when it has none. Returns the
    /// stored copy.
    pub fn add(&mut self, mut recipe: Recipe) -> Recipe {
        if recipe.id.is_empty() {
            recipe.id = self.ids.next_id();
        }
        self.recipes.push(recipe.clone());
        self.persist();
        recipe
    }

    /// Returns the updated record, or `None` if no record has that id.
    pub fn update(&mut self, id: &str, patch: &RecipePatch) -> Option<Recipe> {
        let idx = self.position(id)?;
        let recipe = &mut self.recipes[idx];
        patch.apply_to(recipe);
        let updated = recipe.clone();
        self.persist();
        Some(updated)
    }

    pub fn remove(&mut self, id: &str) -> Option<Recipe> {
        let idx = self.position(id)?;
        let removed = self.recipes.remove(idx);
        self.persist();
        Some(removed)
    }

    /// Returns the new favorite flag.
    pub fn toggle_favorite(&mut self, id: &str) -> Option<bool> {
        let idx = self.position(id)?;
        let recipe = &mut self.recipes[idx];
        recipe.is_favorite = !recipe.is_favorite;
        let flag = recipe.is_favorite;
        self.persist();
        Some(flag)
    }

    pub fn replace_all(&mut self, recipes: Vec<Recipe>) {
        self.recipes = recipes;
        self.persist();
    }

    /// Re-key a record after the remote store assigned it an id.
    pub fn rewrite_id(&mut self, old_id: &str, new_id: &str) -> bool {
        let Some(idx) = self.position(old_id) else {
            return false;
        };
        self.recipes[idx].id = new_id.to_string();
        self.persist();
        true
    }

    /// Save failures are logged and dropped; the in-memory list stays authoritative.
    fn persist(&self) {
        if let Err(e) = self.db.set_json(&self.key, &self.recipes) {
            warn!(key = %self.key, error = %format!("{e:#}"), "failed to persist recipe cache");
        }
    }
}
