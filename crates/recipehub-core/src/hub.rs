//! The facade the request layer talks to.
//!
//! A [`Hub`] owns one handle to each collaborator (event bus, primary
//! store, search index) and exposes the small set of calls the HTTP and
//! CLI layers need. It is created once at startup and shared behind an
//! `Arc`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use crate::bus::EventBus;
use crate::error::{with_timeout, CoreResult};
use crate::filter::{FilteredSubscription, Notification, SubscriptionDescriptor};
use crate::models::{Comment, Recipe, RecipeInput, RecipePatch, SearchDocument, SearchQuery, User};
use crate::notify::{
    publish_comment_added, CommentNotifier, NotificationDispatcher, DEFAULT_NOTIFY_QUEUE_CAPACITY,
};
use crate::recipes::{RecipeService, WriteOutcome};
use crate::search::{SearchIndex, SearchSettings, SearchSynchronizer};
use crate::store::PrimaryStore;

/// Tunables for a [`Hub`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub notify_queue_capacity: usize,
    pub store_timeout: Duration,
    pub search: SearchSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            notify_queue_capacity: DEFAULT_NOTIFY_QUEUE_CAPACITY,
            store_timeout: Duration::from_secs(5),
            search: SearchSettings::default(),
        }
    }
}

/// Live comments on one recipe, in the order they were published.
#[derive(Debug)]
pub struct CommentFeed {
    inner: FilteredSubscription,
}

impl CommentFeed {
    /// Next comment, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Comment> {
        match self.inner.next().await? {
            Notification::CommentAdded(comment) => Some(comment),
        }
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    /// Dropping the returned stream cancels the subscription.
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = Comment> + Send>> {
        Box::pin(futures::stream::unfold(self, |mut feed| async move {
            let comment = feed.next().await?;
            Some((comment, feed))
        }))
    }
}

pub struct Hub {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn PrimaryStore>,
    notifier: CommentNotifier,
    search: SearchSynchronizer,
    recipes: RecipeService,
    store_timeout: Duration,
}

impl Hub {
    /// Wires the collaborators together and starts the notification
    /// dispatcher. Must be called inside a tokio runtime.
    pub fn new(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn PrimaryStore>,
        index: Arc<dyn SearchIndex>,
        settings: HubSettings,
    ) -> Self {
        let dispatcher = NotificationDispatcher::spawn(bus.clone(), settings.notify_queue_capacity);
        let notifier = CommentNotifier::new(store.clone(), dispatcher, settings.store_timeout);
        let search = SearchSynchronizer::new(index, settings.search);
        let recipes = RecipeService::new(store.clone(), search.clone(), settings.store_timeout);
        Self {
            bus,
            store,
            notifier,
            search,
            recipes,
            store_timeout: settings.store_timeout,
        }
    }

    /// Creates the search collection when it is missing.
    pub async fn bootstrap(&self) -> CoreResult<()> {
        self.search.bootstrap().await
    }

    pub async fn create_user(&self, username: &str, display_name: Option<&str>) -> CoreResult<User> {
        with_timeout(
            "create user",
            self.store_timeout,
            self.store.create_user(username, display_name),
        )
        .await
    }

    pub async fn get_user(&self, id: &str) -> CoreResult<Option<User>> {
        with_timeout("get user", self.store_timeout, self.store.get_user(id)).await
    }

    /// Publishes an already persisted comment right away. Unlike
    /// [`create_comment`](Self::create_comment), transport failures are
    /// returned to the caller.
    pub async fn publish_comment_added(&self, comment: &Comment) -> CoreResult<usize> {
        publish_comment_added(self.bus.as_ref(), comment).await
    }

    /// Persists a comment, then notifies live subscribers on a best-effort basis.
    pub async fn create_comment(
        &self,
        text: &str,
        recipe_id: &str,
        author_id: &str,
    ) -> CoreResult<Comment> {
        self.notifier.create_comment(text, recipe_id, author_id).await
    }

    pub async fn comments_for_recipe(&self, recipe_id: &str) -> CoreResult<Vec<Comment>> {
        self.notifier.comments_for_recipe(recipe_id).await
    }

    /// Opens a feed of comments added to `recipe_id` from now on.
    pub async fn subscribe_comments_for_recipe(&self, recipe_id: &str) -> CoreResult<CommentFeed> {
        let inner = FilteredSubscription::open(
            self.bus.as_ref(),
            SubscriptionDescriptor::comment_added(recipe_id),
        )
        .await?;
        Ok(CommentFeed { inner })
    }

    pub async fn index_recipe(&self, recipe: &Recipe) -> CoreResult<SearchDocument> {
        self.search.index_record(recipe).await
    }

    pub async fn remove_recipe_from_index(&self, id: &str) -> CoreResult<()> {
        self.search.remove_record(id).await
    }

    pub async fn search_recipes(
        &self,
        free_text: Option<&str>,
        required_ingredients: Option<&[String]>,
    ) -> CoreResult<Vec<SearchDocument>> {
        let query = SearchQuery::new(
            free_text.map(str::to_string),
            required_ingredients.map(<[String]>::to_vec),
        );
        self.search.query(&query).await
    }

    pub async fn search(&self, query: &SearchQuery) -> CoreResult<Vec<SearchDocument>> {
        self.search.query(query).await
    }

    pub async fn create_recipe(
        &self,
        author_id: &str,
        input: &RecipeInput,
    ) -> CoreResult<WriteOutcome<Recipe>> {
        self.recipes.create(author_id, input).await
    }

    pub async fn update_recipe(
        &self,
        id: &str,
        actor_id: &str,
        patch: &RecipePatch,
    ) -> CoreResult<WriteOutcome<Recipe>> {
        self.recipes.update(id, actor_id, patch).await
    }

    pub async fn delete_recipe(&self, id: &str, actor_id: &str) -> CoreResult<WriteOutcome<Recipe>> {
        self.recipes.delete(id, actor_id).await
    }

    pub async fn get_recipe(&self, id: &str) -> CoreResult<Recipe> {
        self.recipes.get(id).await
    }

    pub async fn list_recipes(&self) -> CoreResult<Vec<Recipe>> {
        self.recipes.list().await
    }

    pub async fn resync_recipe(&self, id: &str) -> CoreResult<()> {
        self.recipes.resync(id).await
    }

    /// Drains pending notifications, then closes the bus.
    pub async fn shutdown(&self) {
        self.notifier.shutdown().await;
        self.bus.close();
        tracing::info!("hub shut down");
    }
}
