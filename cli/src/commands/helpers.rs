use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use cookoo_core::models::{Ingredient, PantryItem, Recipe};
use cookoo_core::store::RecipeStore;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse "name" or "name:quantity", e.g. "Egg:2" or "Soy sauce:1 tbsp".
pub(crate) fn parse_ingredient(s: &str) -> Ingredient {
    match s.split_once(':') {
        Some((name, qty)) if !qty.trim().is_empty() => Ingredient::new(name.trim(), Some(qty.trim())),
        Some((name, _)) => Ingredient::new(name.trim(), None),
        None => Ingredient::new(s.trim(), None),
    }
}

/// Look a recipe up by id, then by case-insensitive name.
pub(crate) fn find_recipe(store: &RecipeStore, key: &str) -> Option<Recipe> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    store.get_by_id(key).or_else(|| {
        store
            .get_all()
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(key))
    })
}

pub(crate) fn print_recipe_table(recipes: &[&Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Difficulty")]
        difficulty: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Tags")]
        tags: String,
        #[tabled(rename = "★")]
        favorite: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: truncate(&r.id, 20),
            name: truncate(&r.name, 30),
            category: r.category.to_string(),
            difficulty: r.difficulty.to_string(),
            time: format_minutes(r.minutes),
            tags: truncate(&r.tags.join(", "), 25),
            favorite: if r.is_favorite { "★".into() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Zero is the unknown time of a remote document without one.
pub(crate) fn format_minutes(minutes: u32) -> String {
    if minutes == 0 {
        "? min".to_string()
    } else {
        format!("{minutes} min")
    }
}

pub(crate) fn print_pantry_table(items: &[&PantryItem]) {
    #[derive(Tabled)]
    struct PantryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Expires")]
        expires: String,
    }

    let rows: Vec<PantryRow> = items
        .iter()
        .map(|i| PantryRow {
            id: i.id.clone(),
            name: truncate(&i.name, 30),
            category: i.category.to_string(),
            quantity: i.quantity.clone().unwrap_or_else(|| "-".into()),
            expires: i
                .effective_expiry()
                .map_or_else(|| "-".into(), |d| d.to_string()),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Print a not-found message in the requested format and exit with code 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    std::process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
