use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use cookoo_core::models::{MealType, MenuItem, Recipe};
use cookoo_core::planner::{MealPlanner, WEEK_DAYS};
use cookoo_core::store::RecipeStore;

use super::helpers::{exit_not_found, find_recipe, truncate};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlannedMeal<'a> {
    date: NaiveDate,
    meal_type: MealType,
    recipe_id: &'a str,
    recipe: Option<&'a str>,
}

fn describe<'a>(items: &'a [MenuItem], recipes: &'a [Recipe]) -> Vec<PlannedMeal<'a>> {
    items
        .iter()
        .map(|item| PlannedMeal {
            date: item.date,
            meal_type: item.meal_type,
            recipe_id: &item.recipe_id,
            recipe: recipes
                .iter()
                .find(|r| r.id == item.recipe_id)
                .map(|r| r.name.as_str()),
        })
        .collect()
}

fn print_plan_table(meals: &[PlannedMeal<'_>]) {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
    }

    let rows: Vec<PlanRow> = meals
        .iter()
        .map(|m| PlanRow {
            date: m.date.format("%a %Y-%m-%d").to_string(),
            meal: m.meal_type.to_string(),
            recipe: m
                .recipe
                .map_or_else(|| format!("(missing: {})", m.recipe_id), |n| truncate(n, 35)),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_plan_show(
    planner: &MealPlanner,
    store: &RecipeStore,
    from: NaiveDate,
    days: u32,
    json: bool,
) -> Result<()> {
    let to = from + Duration::days(i64::from(days.max(1)) - 1);
    let items: Vec<MenuItem> = planner
        .all()
        .range(from..=to)
        .flat_map(|(_, items)| items.iter().cloned())
        .collect();
    let recipes = store.get_all();
    let meals = describe(&items, &recipes);

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }
    if meals.is_empty() {
        println!("Nothing planned from {from} to {to}.");
        return Ok(());
    }
    print_plan_table(&meals);
    Ok(())
}

pub(crate) fn cmd_plan_add(
    planner: &mut MealPlanner,
    store: &RecipeStore,
    date: NaiveDate,
    key: &str,
    meal_type: MealType,
    json: bool,
) -> Result<()> {
    let Some(recipe) = find_recipe(store, key) else {
        exit_not_found(&format!("Recipe '{key}' not found"), json);
    };
    let item = planner.add_to_date(date, &recipe.id, meal_type)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Planned {} for {meal_type} on {date}", recipe.name);
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove(
    planner: &mut MealPlanner,
    store: &RecipeStore,
    date: NaiveDate,
    key: &str,
    json: bool,
) -> Result<()> {
    let recipe_id = find_recipe(store, key).map_or_else(|| key.to_string(), |r| r.id);
    let removed = planner.remove_from_date(date, &recipe_id)?;
    if removed == 0 {
        exit_not_found(&format!("'{key}' is not planned on {date}"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "date": date, "removed": removed }));
    } else {
        println!("Removed {removed} meal(s) from {date}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_week(
    planner: &mut MealPlanner,
    store: &RecipeStore,
    start: NaiveDate,
    json: bool,
) -> Result<()> {
    let recipes = store.get_all();
    let added = planner.generate_week(start, &recipes)?;
    let meals = describe(&added, &recipes);

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }
    if meals.is_empty() {
        println!("No recipes to plan with. Add one with `cookoo recipe add` first.");
        return Ok(());
    }
    println!("Planned {} meals over {WEEK_DAYS} days:", meals.len());
    print_plan_table(&meals);
    Ok(())
}

pub(crate) fn cmd_plan_shopping_list(
    planner: &MealPlanner,
    store: &RecipeStore,
    from: NaiveDate,
    to: NaiveDate,
    json: bool,
) -> Result<()> {
    let list = planner.shopping_list(&store.get_all(), from, to);
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.is_empty() {
        println!("Nothing to buy for {from} to {to}.");
        return Ok(());
    }
    println!("Shopping list ({from} to {to}):");
    for name in list {
        println!("  [ ] {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookoo_core::defaults::default_recipes;

    #[test]
    fn test_describe_names_known_recipes() {
        let mut recipes = default_recipes();
        recipes[0].id = "r0".to_string();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let items = vec![
            MenuItem {
                date,
                recipe_id: "r0".to_string(),
                meal_type: MealType::Dinner,
            },
            MenuItem {
                date,
                recipe_id: "gone".to_string(),
                meal_type: MealType::Lunch,
            },
        ];

        let meals = describe(&items, &recipes);
        assert_eq!(meals[0].recipe, Some(recipes[0].name.as_str()));
        assert_eq!(meals[1].recipe, None);

        let json = serde_json::to_value(&meals).unwrap();
        assert_eq!(json[0]["recipeId"], "r0");
        assert_eq!(json[0]["mealType"], "dinner");
    }
}
