use anyhow::Result;
use chrono::{Local, NaiveDate};

use cookoo_core::models::{IngredientCategory, PantryItem};
use cookoo_core::pantry::{Pantry, RECOMMENDATION_LIMIT};
use cookoo_core::store::RecipeStore;

use super::helpers::{exit_not_found, print_pantry_table, print_recipe_table};

pub(crate) fn cmd_pantry_list(pantry: &Pantry, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(pantry.list())?);
        return Ok(());
    }
    if pantry.list().is_empty() {
        println!("Pantry is empty. Add something with: cookoo pantry add <name>");
        return Ok(());
    }
    let items: Vec<&PantryItem> = pantry.list().iter().collect();
    print_pantry_table(&items);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_pantry_add(
    pantry: &mut Pantry,
    name: &str,
    category: Option<IngredientCategory>,
    quantity: Option<String>,
    purchased: Option<NaiveDate>,
    shelf_life_days: Option<u32>,
    expires: Option<NaiveDate>,
    tags: Vec<String>,
    json: bool,
) -> Result<()> {
    let item = pantry.add(PantryItem {
        id: String::new(),
        name: name.trim().to_string(),
        category: category.unwrap_or_default(),
        quantity,
        purchase_date: purchased,
        shelf_life_days,
        expiry_date: expires,
        image: None,
        tags,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        match item.effective_expiry() {
            Some(expiry) => println!("Added {} (id: {}, expires {expiry})", item.name, item.id),
            None => println!("Added {} (id: {})", item.name, item.id),
        }
    }
    Ok(())
}

pub(crate) fn cmd_pantry_remove(pantry: &mut Pantry, key: &str, json: bool) -> Result<()> {
    let Some(id) = pantry.find(key).map(|i| i.id.clone()) else {
        exit_not_found(&format!("Ingredient '{key}' not found"), json);
    };
    let Some(removed) = pantry.remove(&id)? else {
        exit_not_found(&format!("Ingredient '{key}' not found"), json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        println!("Removed {}", removed.name);
    }
    Ok(())
}

pub(crate) fn cmd_pantry_expiring(pantry: &Pantry, json: bool) -> Result<()> {
    let items = pantry.expiring_soon(Local::now().date_naive());
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("Nothing is expiring in the next few days.");
        return Ok(());
    }
    print_pantry_table(&items);
    Ok(())
}

pub(crate) fn cmd_pantry_recommend(pantry: &Pantry, store: &RecipeStore, json: bool) -> Result<()> {
    let all = store.get_all();
    let matched = pantry.recommend(&all, RECOMMENDATION_LIMIT);
    if json {
        println!("{}", serde_json::to_string_pretty(&matched)?);
        return Ok(());
    }
    if matched.is_empty() {
        println!("No recipes use what's in your pantry.");
        return Ok(());
    }
    print_recipe_table(&matched);
    Ok(())
}
