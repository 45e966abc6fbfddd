use crate::models::{Difficulty, MealCategory, Recipe};

/// Browse filter. Every criterion that is set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Case-insensitive substring of the name.
    pub query: Option<String>,
    pub category: Option<MealCategory>,
    pub difficulty: Option<Difficulty>,
    pub tag: Option<String>,
    pub max_minutes: Option<u32>,
    pub favorites_only: bool,
}

impl RecipeFilter {
    #[must_use]
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let query = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        if query.is_some_and(|q| !recipe.name.to_lowercase().contains(&q.to_lowercase())) {
            return false;
        }
        if self.category.is_some_and(|c| c != recipe.category) {
            return false;
        }
        if self.difficulty.is_some_and(|d| d != recipe.difficulty) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !recipe.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        // An unknown time never satisfies a time limit
        if self
            .max_minutes
            .is_some_and(|max| recipe.minutes == 0 || recipe.minutes > max)
        {
            return false;
        }
        !self.favorites_only || recipe.is_favorite
    }

    /// Matching recipes in their original order.
    #[must_use]
    pub fn apply<'a>(&self, recipes: &'a [Recipe]) -> Vec<&'a Recipe> {
        recipes.iter().filter(|r| self.matches(r)).collect()
    }
}
