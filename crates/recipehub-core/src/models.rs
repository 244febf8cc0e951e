//! Core data models shared by the store, bus, and search layers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum comment length, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// A user record as stored in the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized author data attached to comments so subscribers never need
/// a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSnapshot {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl From<&User> for AuthorSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub recipe_id: String,
    pub author_id: String,
    pub author: AuthorSnapshot,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub step: i64,
    pub text: String,
}

/// A normalized recipe with its owned ingredient and instruction rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cuisine: String,
    pub difficulty: String,
    pub cooking_time_minutes: i64,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
}

/// Fields for a new recipe. The author comes from the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cuisine: String,
    pub difficulty: String,
    pub cooking_time_minutes: i64,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

/// Partial update. When `ingredients` or `instructions` is present it
/// replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub cooking_time_minutes: Option<i64>,
    #[serde(default)]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(default)]
    pub instructions: Option<Vec<Instruction>>,
}

impl RecipePatch {
    /// Applies the patch to `recipe` in place.
    pub fn apply_to(&self, recipe: &mut Recipe) {
        if let Some(ref title) = self.title {
            recipe.title = title.clone();
        }
        if let Some(ref description) = self.description {
            recipe.description = Some(description.clone());
        }
        if let Some(ref cuisine) = self.cuisine {
            recipe.cuisine = cuisine.clone();
        }
        if let Some(ref difficulty) = self.difficulty {
            recipe.difficulty = difficulty.clone();
        }
        if let Some(minutes) = self.cooking_time_minutes {
            recipe.cooking_time_minutes = minutes;
        }
        if let Some(ref ingredients) = self.ingredients {
            recipe.ingredients = ingredients.clone();
        }
        if let Some(ref instructions) = self.instructions {
            recipe.instructions = instructions.clone();
        }
    }
}

/// Flattened, denormalized projection of a [`Recipe`] held by the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cuisine: String,
    pub difficulty: String,
    pub cooking_time_minutes: i64,
    /// Lower-cased ingredient names.
    pub ingredient_terms: BTreeSet<String>,
}

impl SearchDocument {
    pub fn from_recipe(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id.clone(),
            title: recipe.title.clone(),
            description: recipe.description.clone().unwrap_or_default(),
            cuisine: recipe.cuisine.clone(),
            difficulty: recipe.difficulty.clone(),
            cooking_time_minutes: recipe.cooking_time_minutes,
            ingredient_terms: recipe
                .ingredients
                .iter()
                .filter_map(|i| normalize_term(&i.name))
                .collect(),
        }
    }
}

/// Lower-cases and trims an ingredient term; blank terms yield `None`.
pub fn normalize_term(raw: &str) -> Option<String> {
    let term = raw.trim().to_lowercase();
    if term.is_empty() {
        None
    } else {
        Some(term)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub free_text: Option<String>,
    #[serde(default)]
    pub required_ingredients: Option<Vec<String>>,
}

impl SearchQuery {
    pub fn new(free_text: Option<String>, required_ingredients: Option<Vec<String>>) -> Self {
        Self {
            free_text,
            required_ingredients,
        }
    }

    /// Free text with surrounding whitespace removed, `None` when blank.
    pub fn text(&self) -> Option<&str> {
        self.free_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Normalized, de-duplicated required ingredient terms.
    pub fn required_terms(&self) -> BTreeSet<String> {
        self.required_ingredients
            .iter()
            .flatten()
            .filter_map(|t| normalize_term(t))
            .collect()
    }

    /// True when neither free text nor any required ingredient is present.
    pub fn is_empty(&self) -> bool {
        self.text().is_none() && self.required_terms().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe(id: &str, ingredients: &[&str]) -> Recipe {
        Recipe {
            id: id.to_string(),
            title: "Pancakes".to_string(),
            description: None,
            cuisine: "American".to_string(),
            difficulty: "easy".to_string(),
            cooking_time_minutes: 20,
            author_id: "u1".to_string(),
            created_at: Utc::now(),
            ingredients: ingredients
                .iter()
                .map(|n| Ingredient {
                    name: n.to_string(),
                    quantity: None,
                })
                .collect(),
            instructions: Vec::new(),
        }
    }

    #[test]
    fn test_projection_lowercases_terms() {
        let recipe = sample_recipe("r1", &["Egg", " FLOUR ", "egg", "  "]);
        let doc = SearchDocument::from_recipe(&recipe);
        let terms: Vec<&str> = doc.ingredient_terms.iter().map(String::as_str).collect();
        assert_eq!(terms, vec!["egg", "flour"]);
        assert_eq!(doc.description, "");
        assert_eq!(doc.id, "r1");
    }

    #[test]
    fn test_query_emptiness() {
        assert!(SearchQuery::default().is_empty());
        assert!(SearchQuery::new(Some("   ".into()), Some(vec![" ".into()])).is_empty());
        assert!(!SearchQuery::new(None, Some(vec!["Egg".into()])).is_empty());
        assert!(!SearchQuery::new(Some("soup".into()), None).is_empty());
    }

    #[test]
    fn test_patch_replaces_lists() {
        let mut recipe = sample_recipe("r1", &["egg", "flour"]);
        let patch = RecipePatch {
            title: Some("Crepes".into()),
            ingredients: Some(vec![Ingredient {
                name: "milk".into(),
                quantity: None,
            }]),
            ..Default::default()
        };
        patch.apply_to(&mut recipe);
        assert_eq!(recipe.title, "Crepes");
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].name, "milk");
    }

    #[test]
    fn test_comment_wire_shape_is_camel_case() {
        let comment = Comment {
            id: "c1".into(),
            text: "Great dish!".into(),
            recipe_id: "r1".into(),
            author_id: "u1".into(),
            author: AuthorSnapshot {
                id: "u1".into(),
                username: "ana".into(),
                display_name: None,
            },
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&comment).unwrap();
        assert_eq!(value["recipeId"], "r1");
        assert_eq!(value["author"]["username"], "ana");
        assert!(value["createdAt"].is_string());
    }
}
