use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::recipe::{self, Entity as Recipe, Model as RecipeModel};
use crate::entities::recipe_ingredient::{
    self, Entity as RecipeIngredient, Model as IngredientModel,
};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

#[async_trait]
pub trait RecipeRepository: Send + Sync {
    async fn insert_recipe(
        &self,
        recipe: RecipeModel,
        ingredients: Vec<IngredientModel>,
    ) -> Result<(RecipeModel, Vec<IngredientModel>), ServiceError>;
    /// Every active recipe that consumes `item_id`, paired with the consuming line.
    async fn recipes_using_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<(IngredientModel, RecipeModel)>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmRecipeRepository {
    base: BaseRepository,
}

impl SeaOrmRecipeRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmRecipeRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl RecipeRepository for SeaOrmRecipeRepository {
    async fn insert_recipe(
        &self,
        recipe: RecipeModel,
        ingredients: Vec<IngredientModel>,
    ) -> Result<(RecipeModel, Vec<IngredientModel>), ServiceError> {
        let recipe = recipe.into_active_model().insert(self.get_db()).await?;
        let mut stored = Vec::with_capacity(ingredients.len());
        for mut ingredient in ingredients {
            ingredient.recipe_id = recipe.id;
            stored.push(ingredient.into_active_model().insert(self.get_db()).await?);
        }
        Ok((recipe, stored))
    }

    async fn recipes_using_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<(IngredientModel, RecipeModel)>, ServiceError> {
        let rows = RecipeIngredient::find()
            .filter(recipe_ingredient::Column::InventoryItemId.eq(item_id))
            .find_also_related(Recipe)
            .filter(recipe::Column::IsActive.eq(true))
            .all(self.get_db())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(ingredient, recipe)| recipe.map(|r| (ingredient, r)))
            .collect())
    }
}
