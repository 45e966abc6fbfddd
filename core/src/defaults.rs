//! Bundled sample recipes.
//!
//! Used to seed an empty remote collection and as the last-resort contents of
//! the local cache when nothing usable is stored.

use crate::models::{Difficulty, Ingredient, MealCategory, Recipe};

struct Sample {
    name: &'static str,
    image: &'static str,
    minutes: u32,
    difficulty: Difficulty,
    category: MealCategory,
    tags: &'static [&'static str],
    ingredients: &'static [(&'static str, &'static str)],
    steps: &'static [&'static str],
    tips: Option<&'static str>,
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "Tomato Egg Stir-fry",
        image: "https://images.unsplash.com/photo-1594041680534-e8c8cdebd659?w=800",
        minutes: 15,
        difficulty: Difficulty::Easy,
        category: MealCategory::Dinner,
        tags: &["quick", "one-pot", "lunchbox"],
        ingredients: &[
            ("Tomato", "2"),
            ("Egg", "3"),
            ("Spring onion", "1 stalk"),
            ("Sugar", "1 tsp"),
            ("Salt", "to taste"),
        ],
        steps: &[
            "Beat the eggs with a pinch of salt.",
            "Scramble the eggs until just set, then set aside.",
            "Stir-fry the tomato wedges until soft and juicy.",
            "Return the eggs, season with sugar and salt, finish with spring onion.",
        ],
        tips: Some("A splash of water helps the tomatoes turn saucy."),
    },
    Sample {
        name: "Scallion Pancake",
        image: "https://images.unsplash.com/photo-1604908176997-125f25cc6f3d?w=800",
        minutes: 25,
        difficulty: Difficulty::Medium,
        category: MealCategory::Breakfast,
        tags: &["vegetarian"],
        ingredients: &[
            ("Flour", "200g"),
            ("Spring onion", "3 stalks"),
            ("Hot water", "120ml"),
            ("Oil", "2 tbsp"),
        ],
        steps: &[
            "Mix flour with hot water into a soft dough and rest 10 minutes.",
            "Roll out, brush with oil, scatter spring onion and roll up into a coil.",
            "Flatten and pan-fry both sides until golden.",
        ],
        tips: None,
    },
    Sample {
        name: "Soy Milk Oatmeal",
        image: "https://images.unsplash.com/photo-1517673400267-0251440c45dc?w=800",
        minutes: 8,
        difficulty: Difficulty::Easy,
        category: MealCategory::Breakfast,
        tags: &["quick", "few-dishes"],
        ingredients: &[("Rolled oats", "50g"), ("Soy milk", "250ml"), ("Banana", "1")],
        steps: &[
            "Simmer oats in soy milk for 5 minutes.",
            "Top with sliced banana.",
        ],
        tips: None,
    },
    Sample {
        name: "Three Cup Chicken",
        image: "https://images.unsplash.com/photo-1604908554007-0b5d9fd2d1f8?w=800",
        minutes: 35,
        difficulty: Difficulty::Medium,
        category: MealCategory::Dinner,
        tags: &["one-pot", "lunchbox"],
        ingredients: &[
            ("Chicken thigh", "500g"),
            ("Sesame oil", "1 cup"),
            ("Soy sauce", "1 cup"),
            ("Rice wine", "1 cup"),
            ("Garlic", "10 cloves"),
            ("Basil", "1 handful"),
        ],
        steps: &[
            "Fry garlic and ginger in sesame oil until fragrant.",
            "Brown the chicken pieces.",
            "Add soy sauce and rice wine, reduce until glossy.",
            "Fold in basil just before serving.",
        ],
        tips: Some("Use a clay pot if you have one."),
    },
    Sample {
        name: "Garlic Bok Choy",
        image: "https://images.unsplash.com/photo-1512621776951-a57141f2eefd?w=800",
        minutes: 10,
        difficulty: Difficulty::Easy,
        category: MealCategory::Lunch,
        tags: &["quick", "vegetarian", "few-dishes"],
        ingredients: &[("Bok choy", "300g"), ("Garlic", "3 cloves"), ("Salt", "to taste")],
        steps: &[
            "Sizzle minced garlic in oil.",
            "Add bok choy and toss over high heat for 2 minutes.",
            "Season with salt.",
        ],
        tips: None,
    },
    Sample {
        name: "Beef Noodle Soup",
        image: "https://images.unsplash.com/photo-1569718212165-3a8278d5f624?w=800",
        minutes: 120,
        difficulty: Difficulty::Hard,
        category: MealCategory::Lunch,
        tags: &["one-pot"],
        ingredients: &[
            ("Beef shank", "600g"),
            ("Noodles", "2 servings"),
            ("Tomato", "1"),
            ("Star anise", "2"),
            ("Chili bean paste", "1 tbsp"),
        ],
        steps: &[
            "Blanch the beef, then sear with chili bean paste.",
            "Simmer with tomato, aromatics and water for 90 minutes.",
            "Cook noodles separately and ladle the soup over them.",
        ],
        tips: Some("The broth tastes better the next day."),
    },
    Sample {
        name: "Teriyaki Salmon Bowl",
        image: "https://images.unsplash.com/photo-1467003909585-2f8a72700288?w=800",
        minutes: 20,
        difficulty: Difficulty::Medium,
        category: MealCategory::Dinner,
        tags: &["quick", "lunchbox"],
        ingredients: &[
            ("Salmon fillet", "1"),
            ("Rice", "1 bowl"),
            ("Soy sauce", "2 tbsp"),
            ("Mirin", "2 tbsp"),
        ],
        steps: &[
            "Pan-sear the salmon skin side down.",
            "Glaze with soy sauce and mirin.",
            "Serve over rice.",
        ],
        tips: None,
    },
    Sample {
        name: "Mango Yogurt Cup",
        image: "https://images.unsplash.com/photo-1488477181946-6428a0291777?w=800",
        minutes: 5,
        difficulty: Difficulty::Easy,
        category: MealCategory::Snack,
        tags: &["quick", "few-dishes"],
        ingredients: &[("Mango", "1"), ("Greek yogurt", "150g"), ("Granola", "2 tbsp")],
        steps: &["Layer yogurt, diced mango and granola in a glass."],
        tips: None,
    },
];

/// The bundled dataset in its fixed order. Ids are left empty.
#[must_use]
pub fn default_recipes() -> Vec<Recipe> {
    SAMPLES
        .iter()
        .map(|s| Recipe {
            id: String::new(),
            name: s.name.to_string(),
            image: s.image.to_string(),
            minutes: s.minutes,
            difficulty: s.difficulty,
            category: s.category,
            tags: s.tags.iter().map(ToString::to_string).collect(),
            ingredients: s
                .ingredients
                .iter()
                .map(|(name, qty)| Ingredient::new(*name, Some(*qty)))
                .collect(),
            steps: s.steps.iter().map(ToString::to_string).collect(),
            tips: s.tips.map(str::to_string),
            is_favorite: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::models::validate_recipe;

    #[test]
    fn test_defaults_are_valid_and_have_no_ids() {
        let recipes = default_recipes();
        assert!(!recipes.is_empty());
        for r in &recipes {
            validate_recipe(r).unwrap();
            assert!(r.id.is_empty());
        }
    }

    #[test]
    fn test_default_names_unique() {
        let recipes = default_recipes();
        let names: HashSet<&str> = recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), recipes.len());
        assert!(names.contains("Tomato Egg Stir-fry"));
    }

    #[test]
    fn test_every_meal_slot_covered() {
        let recipes = default_recipes();
        for category in MealCategory::ALL {
            assert!(recipes.iter().any(|r| r.category == category), "{category}");
        }
    }
}
