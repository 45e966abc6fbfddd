use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::db::Database;
use crate::models::{MealType, MenuItem, Recipe};

pub const CALENDAR_KEY: &str = "cookoo_calendar";
pub const WEEK_DAYS: i64 = 7;

/// Meal calendar keyed by ISO date.
pub struct MealPlanner {
    db: Database,
    schedule: BTreeMap<NaiveDate, Vec<MenuItem>>,
}

impl MealPlanner {
    /// Load the stored calendar. Unreadable data is logged and treated as empty.
    #[must_use]
    pub fn load(db: Database) -> Self {
        let schedule = match db.get_json::<BTreeMap<NaiveDate, Vec<MenuItem>>>(CALENDAR_KEY) {
            Ok(schedule) => schedule.unwrap_or_default(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "stored calendar unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { db, schedule }
    }

    #[must_use]
    pub fn get_for_date(&self, date: NaiveDate) -> &[MenuItem] {
        self.schedule.get(&date).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn all(&self) -> &BTreeMap<NaiveDate, Vec<MenuItem>> {
        &self.schedule
    }

    pub fn add_to_date(&mut self, date: NaiveDate, recipe_id: &str, meal_type: MealType) -> Result<MenuItem> {
        let item = MenuItem {
            date,
            recipe_id: recipe_id.to_string(),
            meal_type,
        };
        self.schedule.entry(date).or_default().push(item.clone());
        self.persist()?;
        Ok(item)
    }

    /// Remove every entry of `recipe_id` on `date`. Returns how many went.
    pub fn remove_from_date(&mut self, date: NaiveDate, recipe_id: &str) -> Result<usize> {
        let Some(items) = self.schedule.get_mut(&date) else {
            return Ok(0);
        };
        let before = items.len();
        items.retain(|i| i.recipe_id != recipe_id);
        let removed = before - items.len();
        if items.is_empty() {
            self.schedule.remove(&date);
        }
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Fill `start` and the six days after it with the first recipe of each
    /// meal type. Slots with no matching recipe stay empty.
    pub fn generate_week(&mut self, start: NaiveDate, recipes: &[Recipe]) -> Result<Vec<MenuItem>> {
        let picks: Vec<(MealType, &Recipe)> = MealType::ALL
            .iter()
            .filter_map(|meal| {
                recipes
                    .iter()
                    .find(|r| r.category == meal.category() && !r.id.is_empty())
                    .map(|r| (*meal, r))
            })
            .collect();

        let mut added = Vec::new();
        for offset in 0..WEEK_DAYS {
            let Some(date) = start.checked_add_signed(Duration::days(offset)) else {
                break;
            };
            for (meal, recipe) in &picks {
                let item = MenuItem {
                    date,
                    recipe_id: recipe.id.clone(),
                    meal_type: *meal,
                };
                self.schedule.entry(date).or_default().push(item.clone());
                added.push(item);
            }
        }
        if !added.is_empty() {
            self.persist()?;
        }
        Ok(added)
    }

    /// Unique ingredient names across scheduled meals in `from..=to`, in
    /// first-seen order. Entries whose recipe no longer exists are skipped.
    #[must_use]
    pub fn shopping_list(&self, recipes: &[Recipe], from: NaiveDate, to: NaiveDate) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        if from > to {
            return list;
        }
        for item in self.schedule.range(from..=to).flat_map(|(_, items)| items) {
            let Some(recipe) = recipes.iter().find(|r| r.id == item.recipe_id) else {
                continue;
            };
            for ingredient in &recipe.ingredients {
                if seen.insert(ingredient.name.to_lowercase()) {
                    list.push(ingredient.name.clone());
                }
            }
        }
        list
    }

    fn persist(&self) -> Result<()> {
        self.db.set_json(CALENDAR_KEY, &self.schedule)
    }
}
