//! Remote document collection: the trait the reconciler talks to, plus the
//! codec between [`Recipe`] and wire documents.
//!
//! Documents carry every recipe attribute except the id (the document key)
//! plus an `updatedAt` field the store fills with its own clock. Writers ask
//! for that by sending the `{".sv": "timestamp"}` sentinel.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{Difficulty, Document, Ingredient, MealCategory, Recipe, RecipePatch};

pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Full-collection snapshots, one per change.
pub type Snapshots = mpsc::UnboundedReceiver<Vec<Document>>;

/// A hosted document collection.
///
/// Implementations need not time out hung requests; callers never await a
/// remote call on a path the user is blocked on.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn list(&self) -> Result<Vec<Document>>;

    /// Create a document and return the id the store assigned.
    async fn create(&self, fields: Map<String, Value>) -> Result<String>;

    /// Shallow-merge `fields` into an existing document.
    async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Subscribe to collection changes. The first snapshot may arrive
    /// immediately; each later one follows a change. Dropping the receiver
    /// ends the subscription.
    async fn subscribe(&self) -> Result<Snapshots>;
}

/// Sentinel asking the store to substitute its own timestamp.
#[must_use]
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

#[must_use]
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

/// Replace top-level server-timestamp sentinels with `now`.
pub fn resolve_server_values(fields: &mut Map<String, Value>, now: &str) {
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(now.to_string());
        }
    }
}

/// Shallow merge used by stores implementing `update`.
pub fn merge_fields(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

fn ingredients_value(ingredients: &[Ingredient]) -> Value {
    Value::Array(
        ingredients
            .iter()
            .map(|i| match &i.quantity {
                Some(q) => json!({ "name": i.name, "quantity": q }),
                None => json!({ "name": i.name }),
            })
            .collect(),
    )
}

/// Encode a recipe as document fields. The id is not included.
#[must_use]
pub fn encode_recipe(recipe: &Recipe) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("name".into(), json!(recipe.name));
    fields.insert("image".into(), json!(recipe.image));
    fields.insert("time".into(), json!(recipe.minutes));
    fields.insert("difficulty".into(), json!(recipe.difficulty.as_str()));
    fields.insert("category".into(), json!(recipe.category.as_str()));
    fields.insert("tags".into(), json!(recipe.tags));
    fields.insert("ingredients".into(), ingredients_value(&recipe.ingredients));
    fields.insert("steps".into(), json!(recipe.steps));
    fields.insert(
        "tips".into(),
        recipe.tips.as_ref().map_or(Value::Null, |t| json!(t)),
    );
    fields.insert("isFavorite".into(), json!(recipe.is_favorite));
    fields.insert(UPDATED_AT_FIELD.into(), server_timestamp());
    fields
}

/// Encode only the fields a patch touches.
#[must_use]
pub fn encode_patch(patch: &RecipePatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(name) = &patch.name {
        fields.insert("name".into(), json!(name));
    }
    if let Some(image) = &patch.image {
        fields.insert("image".into(), json!(image));
    }
    if let Some(minutes) = patch.minutes {
        fields.insert("time".into(), json!(minutes));
    }
    if let Some(difficulty) = patch.difficulty {
        fields.insert("difficulty".into(), json!(difficulty.as_str()));
    }
    if let Some(category) = patch.category {
        fields.insert("category".into(), json!(category.as_str()));
    }
    if let Some(tags) = &patch.tags {
        fields.insert("tags".into(), json!(tags));
    }
    if let Some(ingredients) = &patch.ingredients {
        fields.insert("ingredients".into(), ingredients_value(ingredients));
    }
    if let Some(steps) = &patch.steps {
        fields.insert("steps".into(), json!(steps));
    }
    if let Some(tips) = &patch.tips {
        fields.insert("tips".into(), tips.as_ref().map_or(Value::Null, |t| json!(t)));
    }
    if let Some(is_favorite) = patch.is_favorite {
        fields.insert("isFavorite".into(), json!(is_favorite));
    }
    fields.insert(UPDATED_AT_FIELD.into(), server_timestamp());
    fields
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn ingredient_list(value: Option<&Value>) -> Vec<Ingredient> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) if !name.trim().is_empty() => Some(Ingredient::new(name, None)),
            Value::Object(obj) => {
                let name = obj.get("name")?.as_str()?;
                if name.trim().is_empty() {
                    return None;
                }
                let quantity = match obj.get("quantity") {
                    Some(Value::String(q)) if !q.is_empty() => Some(q.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                Some(Ingredient {
                    name: name.to_string(),
                    quantity,
                })
            }
            _ => None,
        })
        .collect()
}

/// Anything that is not a positive whole number of minutes decodes as 0,
/// the unknown time.
fn minutes_value(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .and_then(|m| u32::try_from(m).ok())
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Decode a document into a recipe, coercing anything missing or
/// wrong-shaped to a safe default. Returns `None` only when the document has
/// no usable name.
#[must_use]
pub fn decode_document(doc: &Document) -> Option<Recipe> {
    let f = &doc.fields;
    let name = f
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let Some(name) = name else {
        warn!(id = %doc.id, "skipping remote document without a name");
        return None;
    };

    Some(Recipe {
        id: doc.id.clone(),
        name: name.to_string(),
        image: f
            .get("image")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        minutes: minutes_value(f.get("time")),
        difficulty: f
            .get("difficulty")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Difficulty>().ok())
            .unwrap_or_default(),
        category: f
            .get("category")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<MealCategory>().ok())
            .unwrap_or_default(),
        tags: string_list(f.get("tags")),
        ingredients: ingredient_list(f.get("ingredients")),
        steps: string_list(f.get("steps")),
        tips: f
            .get("tips")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string),
        is_favorite: f.get("isFavorite").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Decode a snapshot, dropping documents that cannot become recipes.
#[must_use]
pub fn decode_snapshot(docs: &[Document]) -> Vec<Recipe> {
    docs.iter().filter_map(decode_document).collect()
}
