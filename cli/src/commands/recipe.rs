use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use cookoo_core::filter::RecipeFilter;
use cookoo_core::models::{
    Difficulty, MealCategory, Recipe, RecipePatch, validate_recipe, validate_recipe_patch,
};
use cookoo_core::store::RecipeStore;

use super::helpers::{
    exit_not_found, find_recipe, format_minutes, parse_ingredient, print_recipe_table,
};
use super::{SyncStatus, await_remote};

/// Recipe attributes shared by `recipe add` and `recipe update`.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct RecipeFields {
    /// Preparation time in minutes
    #[arg(short, long)]
    pub time: Option<u32>,
    /// Difficulty: easy, medium, hard
    #[arg(short, long)]
    pub difficulty: Option<Difficulty>,
    /// Category: breakfast, lunch, dinner, snack
    #[arg(short, long)]
    pub category: Option<MealCategory>,
    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Ingredient as "name" or "name:quantity" (repeatable)
    #[arg(short, long = "ingredient")]
    pub ingredients: Vec<String>,
    /// Preparation step (repeatable, in order)
    #[arg(short, long = "step")]
    pub steps: Vec<String>,
    /// Cooking tips (pass "" to clear)
    #[arg(long)]
    pub tips: Option<String>,
    /// Image URL
    #[arg(long)]
    pub image: Option<String>,
}

impl RecipeFields {
    fn into_patch(self, name: Option<String>) -> RecipePatch {
        RecipePatch {
            name,
            image: self.image,
            minutes: self.time,
            difficulty: self.difficulty,
            category: self.category,
            tags: non_empty(self.tags),
            ingredients: non_empty(self.ingredients)
                .map(|list| list.iter().map(|s| parse_ingredient(s)).collect()),
            steps: non_empty(self.steps),
            tips: self
                .tips
                .map(|t| Some(t.trim().to_string()).filter(|t| !t.is_empty())),
            is_favorite: None,
        }
    }
}

fn non_empty(list: Vec<String>) -> Option<Vec<String>> {
    if list.is_empty() { None } else { Some(list) }
}

#[derive(Serialize)]
struct WriteResult<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    recipe: Option<&'a Recipe>,
    sync: SyncStatus,
}

fn print_write(recipe: Option<&Recipe>, sync: SyncStatus, message: &str, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&WriteResult { recipe, sync })?
        );
    } else {
        println!("{message} ({})", sync.describe());
    }
    Ok(())
}

/// Resolve `key` to a recipe, or exit with code 2.
fn require_recipe(store: &RecipeStore, key: &str, json: bool) -> Recipe {
    let Some(recipe) = find_recipe(store, key) else {
        exit_not_found(&format!("Recipe '{key}' not found"), json);
    };
    recipe
}

pub(crate) fn cmd_recipe_list(store: &RecipeStore, filter: &RecipeFilter, json: bool) -> Result<()> {
    let all = store.get_all();
    let matched = filter.apply(&all);

    if json {
        println!("{}", serde_json::to_string_pretty(&matched)?);
        return Ok(());
    }
    if matched.is_empty() {
        println!("No recipes found.");
        return Ok(());
    }
    print_recipe_table(&matched);
    Ok(())
}

pub(crate) fn cmd_recipe_show(store: &RecipeStore, key: &str, json: bool) -> Result<()> {
    let Some(recipe) = find_recipe(store, key) else {
        exit_not_found(&format!("Recipe '{key}' not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let star = if recipe.is_favorite { " ★" } else { "" };
    println!("{}{star}", recipe.name);
    if !recipe.id.is_empty() {
        println!("  id: {}", recipe.id);
    }
    println!(
        "  {} · {} · {}",
        recipe.category,
        recipe.difficulty,
        format_minutes(recipe.minutes)
    );
    if !recipe.tags.is_empty() {
        println!("  tags: {}", recipe.tags.join(", "));
    }
    if !recipe.ingredients.is_empty() {
        println!("\nIngredients:");
        for ing in &recipe.ingredients {
            match &ing.quantity {
                Some(qty) => println!("  - {} ({qty})", ing.name),
                None => println!("  - {}", ing.name),
            }
        }
    }
    if !recipe.steps.is_empty() {
        println!("\nSteps:");
        for (i, step) in recipe.steps.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }
    if let Some(tips) = &recipe.tips {
        println!("\nTips: {tips}");
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_add(
    store: &RecipeStore,
    name: &str,
    fields: RecipeFields,
    json: bool,
) -> Result<()> {
    let minutes = fields
        .time
        .context("Preparation time is required (--time <minutes>)")?;
    let mut recipe = Recipe {
        id: String::new(),
        name: name.trim().to_string(),
        image: String::new(),
        minutes,
        difficulty: Difficulty::default(),
        category: MealCategory::default(),
        tags: Vec::new(),
        ingredients: Vec::new(),
        steps: Vec::new(),
        tips: None,
        is_favorite: false,
    };
    fields.into_patch(None).apply_to(&mut recipe);
    validate_recipe(&recipe)?;

    let receipt = store.add(recipe);
    let local_id = receipt.id().map(str::to_string);
    let sync = await_remote(receipt).await;

    // A committed create swaps the local id for the remote one.
    let stored = local_id
        .as_deref()
        .and_then(|id| store.get_by_id(id))
        .or_else(|| find_recipe(store, name));
    let message = match &stored {
        Some(r) => format!("Added recipe: {} (id: {})", r.name, r.id),
        None => format!("Added recipe: {name}"),
    };
    print_write(stored.as_ref(), sync, &message, json)
}

pub(crate) async fn cmd_recipe_update(
    store: &RecipeStore,
    key: &str,
    name: Option<String>,
    fields: RecipeFields,
    json: bool,
) -> Result<()> {
    let recipe = require_recipe(store, key, json);
    let patch = fields.into_patch(name);
    if patch.is_empty() {
        bail!("Nothing to update. Pass at least one field, e.g. --time 20");
    }
    validate_recipe_patch(&patch)?;

    let sync = await_remote(store.update(&recipe.id, &patch)).await;
    let updated = store.get_by_id(&recipe.id);
    print_write(
        updated.as_ref(),
        sync,
        &format!("Updated recipe: {}", recipe.name),
        json,
    )
}

pub(crate) async fn cmd_recipe_remove(store: &RecipeStore, key: &str, json: bool) -> Result<()> {
    let recipe = require_recipe(store, key, json);
    let sync = await_remote(store.remove(&recipe.id)).await;
    print_write(
        Some(&recipe),
        sync,
        &format!("Removed recipe: {}", recipe.name),
        json,
    )
}

pub(crate) async fn cmd_recipe_favorite(store: &RecipeStore, key: &str, json: bool) -> Result<()> {
    let recipe = require_recipe(store, key, json);
    let sync = await_remote(store.toggle_favorite(&recipe.id)).await;
    let updated = store.get_by_id(&recipe.id);
    let message = if updated.as_ref().is_some_and(|r| r.is_favorite) {
        format!("Added {} to favorites", recipe.name)
    } else {
        format!("Removed {} from favorites", recipe.name)
    };
    print_write(updated.as_ref(), sync, &message, json)
}

/// Random picks from `recipes`, optionally limited to one category.
fn pick_suggestions<'a, R: Rng + ?Sized>(
    recipes: &'a [Recipe],
    category: Option<MealCategory>,
    count: usize,
    rng: &mut R,
) -> Vec<&'a Recipe> {
    let mut candidates: Vec<&Recipe> = recipes
        .iter()
        .filter(|r| category.is_none_or(|c| r.category == c))
        .collect();
    candidates.shuffle(rng);
    candidates.truncate(count);
    candidates
}

pub(crate) fn cmd_suggest(
    store: &RecipeStore,
    category: Option<MealCategory>,
    count: usize,
    json: bool,
) -> Result<()> {
    let all = store.get_all();
    let picks = pick_suggestions(&all, category, count, &mut rand::rng());

    if json {
        println!("{}", serde_json::to_string_pretty(&picks)?);
        return Ok(());
    }
    if picks.is_empty() {
        println!("Nothing to suggest yet. Add a recipe with: cookoo recipe add <name> --time <minutes>");
        return Ok(());
    }
    println!("How about:");
    for recipe in picks {
        println!(
            "  - {} ({}, {})",
            recipe.name,
            recipe.category,
            format_minutes(recipe.minutes)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookoo_core::defaults::default_recipes;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_into_patch_only_sets_given_fields() {
        let fields = RecipeFields {
            time: Some(25),
            ingredients: vec!["Egg:2".to_string(), "Salt".to_string()],
            ..RecipeFields::default()
        };
        let patch = fields.into_patch(None);
        assert_eq!(patch.minutes, Some(25));
        assert!(patch.tags.is_none());
        assert!(patch.steps.is_none());
        assert!(patch.tips.is_none());
        let ingredients = patch.ingredients.unwrap();
        assert_eq!(ingredients[0].quantity.as_deref(), Some("2"));
        assert_eq!(ingredients[1].name, "Salt");
    }

    #[test]
    fn test_blank_tips_clears() {
        let fields = RecipeFields {
            tips: Some("  ".to_string()),
            ..RecipeFields::default()
        };
        assert_eq!(fields.into_patch(None).tips, Some(None));
    }

    #[test]
    fn test_empty_fields_make_empty_patch() {
        assert!(RecipeFields::default().into_patch(None).is_empty());
        assert!(!RecipeFields::default()
            .into_patch(Some("Congee".to_string()))
            .is_empty());
    }

    #[test]
    fn test_pick_suggestions_respects_category_and_count() {
        let recipes = default_recipes();
        let mut rng = StdRng::seed_from_u64(7);

        let picks = pick_suggestions(&recipes, None, 5, &mut rng);
        assert_eq!(picks.len(), 5);

        let breakfasts = pick_suggestions(&recipes, Some(MealCategory::Breakfast), 5, &mut rng);
        assert_eq!(breakfasts.len(), 2);
        assert!(breakfasts.iter().all(|r| r.category == MealCategory::Breakfast));

        assert!(pick_suggestions(&[], None, 5, &mut rng).is_empty());
    }
}
