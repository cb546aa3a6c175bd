//! Activity registry for type-erased activity dispatch
//!
//! Workflows name activities by type string and pass JSON input. The
//! registry maps those names to implementations and handles the JSON
//! conversion on both sides.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::definition::error_types;
use super::{Activity, ActivityContext, ActivityError};

/// Type-erased activity interface
pub trait AnyActivity: Send + Sync {
    /// Get the activity type identifier
    fn activity_type(&self) -> &'static str;

    /// Execute with JSON input and output
    fn execute<'a>(
        &'a self,
        ctx: &'a ActivityContext,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, ActivityError>>;
}

/// Wrapper to implement AnyActivity for any Activity
struct ActivityWrapper<A: Activity> {
    inner: Arc<A>,
}

impl<A: Activity> AnyActivity for ActivityWrapper<A> {
    fn activity_type(&self) -> &'static str {
        A::TYPE
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ActivityContext,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, ActivityError>> {
        Box::pin(async move {
            let typed_input: A::Input = serde_json::from_value(input)?;
            let output = self.inner.execute(ctx, typed_input).await?;
            Ok(serde_json::to_value(output)?)
        })
    }
}

/// Registry of activity implementations keyed by type name
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn AnyActivity>>,
}

impl ActivityRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity implementation
    pub fn register<A: Activity>(&mut self, activity: A) {
        self.register_shared(Arc::new(activity));
    }

    /// Register an activity the caller keeps a handle to
    pub fn register_shared<A: Activity>(&mut self, activity: Arc<A>) {
        self.activities.insert(
            A::TYPE.to_string(),
            Arc::new(ActivityWrapper { inner: activity }),
        );
    }

    /// Check if an activity type is registered
    pub fn contains(&self, activity_type: &str) -> bool {
        self.activities.contains_key(activity_type)
    }

    /// Get the number of registered activity types
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Run one attempt of the named activity
    ///
    /// Unknown activity types fail permanently.
    pub async fn execute(
        &self,
        activity_type: &str,
        ctx: &ActivityContext,
        input: Value,
    ) -> Result<Value, ActivityError> {
        let activity = self.activities.get(activity_type).ok_or_else(|| {
            ActivityError::non_retryable(format!("unknown activity type: {activity_type}"))
                .with_type(error_types::UNKNOWN_ACTIVITY_TYPE)
        })?;

        activity.execute(ctx, input).await
    }
}

impl fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activity_types", &self.activities.keys().collect::<Vec<_>>())
            .finish()
    }
}
