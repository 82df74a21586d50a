//! Normalization of provider and hook calling conventions.
//!
//! Providers and registration hooks come in three styles: plain synchronous
//! functions, functions returning a future, and functions that report their
//! result through a [`Completion`] handle. Each style is wrapped once, at
//! registration, into the asynchronous [`BeforeHook`], [`AfterHook`] or
//! [`DataSource`] contract; the fetch lifecycle never inspects the style again.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::core::{
    AfterHook, BeforeHook, DataSource, FeatureServerError, FeatureServerResult, ProviderRequest,
};
use crate::model::Dataset;

/// Result handle given to callback-style hooks and providers.
///
/// Dropping it without calling [`Completion::complete`] fails the fetch.
pub struct Completion<T> {
    sender: oneshot::Sender<FeatureServerResult<T>>,
}

impl<T> Completion<T> {
    fn channel() -> (Self, oneshot::Receiver<FeatureServerResult<T>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn complete(self, result: FeatureServerResult<T>) {
        // The receiver only disappears if the fetch itself was dropped
        let _ = self.sender.send(result);
    }
}

async fn wait_for<T>(
    receiver: oneshot::Receiver<FeatureServerResult<T>>,
    what: &str,
) -> FeatureServerResult<T> {
    receiver.await.unwrap_or_else(|_| {
        Err(FeatureServerError::provider(format!(
            "{what} dropped its completion without signalling a result"
        )))
    })
}

/// Default `before` hook: does nothing
pub struct NoopBefore;

#[async_trait]
impl BeforeHook for NoopBefore {
    async fn before(&self, _req: &ProviderRequest) -> FeatureServerResult<()> {
        Ok(())
    }
}

/// Default `after` hook: returns the provider's dataset unchanged
pub struct PassthroughAfter;

#[async_trait]
impl AfterHook for PassthroughAfter {
    async fn after(&self, _req: &ProviderRequest, data: Dataset) -> FeatureServerResult<Dataset> {
        Ok(data)
    }
}

/// Wraps a synchronous function
pub struct SyncFn<F>(F);

/// Wraps a function returning a future
pub struct AsyncFn<F>(F);

/// Wraps a function reporting through a [`Completion`]
pub struct CallbackFn<F>(F);

#[async_trait]
impl<F> BeforeHook for SyncFn<F>
where
    F: Fn(&ProviderRequest) -> FeatureServerResult<()> + Send + Sync,
{
    async fn before(&self, req: &ProviderRequest) -> FeatureServerResult<()> {
        (self.0)(req)
    }
}

#[async_trait]
impl<F, Fut> BeforeHook for AsyncFn<F>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = FeatureServerResult<()>> + Send + 'static,
{
    async fn before(&self, req: &ProviderRequest) -> FeatureServerResult<()> {
        (self.0)(req.clone()).await
    }
}

#[async_trait]
impl<F> BeforeHook for CallbackFn<F>
where
    F: Fn(&ProviderRequest, Completion<()>) + Send + Sync,
{
    async fn before(&self, req: &ProviderRequest) -> FeatureServerResult<()> {
        let (completion, receiver) = Completion::channel();
        (self.0)(req, completion);
        wait_for(receiver, "before hook").await
    }
}

#[async_trait]
impl<F> AfterHook for SyncFn<F>
where
    F: Fn(&ProviderRequest, Dataset) -> FeatureServerResult<Dataset> + Send + Sync,
{
    async fn after(&self, req: &ProviderRequest, data: Dataset) -> FeatureServerResult<Dataset> {
        (self.0)(req, data)
    }
}

#[async_trait]
impl<F, Fut> AfterHook for AsyncFn<F>
where
    F: Fn(ProviderRequest, Dataset) -> Fut + Send + Sync,
    Fut: Future<Output = FeatureServerResult<Dataset>> + Send + 'static,
{
    async fn after(&self, req: &ProviderRequest, data: Dataset) -> FeatureServerResult<Dataset> {
        (self.0)(req.clone(), data).await
    }
}

#[async_trait]
impl<F> AfterHook for CallbackFn<F>
where
    F: Fn(&ProviderRequest, Dataset, Completion<Dataset>) + Send + Sync,
{
    async fn after(&self, req: &ProviderRequest, data: Dataset) -> FeatureServerResult<Dataset> {
        let (completion, receiver) = Completion::channel();
        (self.0)(req, data, completion);
        wait_for(receiver, "after hook").await
    }
}

#[async_trait]
impl<F> DataSource for SyncFn<F>
where
    F: Fn(&ProviderRequest) -> FeatureServerResult<Dataset> + Send + Sync,
{
    async fn get_data(&self, req: &ProviderRequest) -> FeatureServerResult<Dataset> {
        (self.0)(req)
    }
}

#[async_trait]
impl<F, Fut> DataSource for AsyncFn<F>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = FeatureServerResult<Dataset>> + Send + 'static,
{
    async fn get_data(&self, req: &ProviderRequest) -> FeatureServerResult<Dataset> {
        (self.0)(req.clone()).await
    }
}

#[async_trait]
impl<F> DataSource for CallbackFn<F>
where
    F: Fn(&ProviderRequest, Completion<Dataset>) + Send + Sync,
{
    async fn get_data(&self, req: &ProviderRequest) -> FeatureServerResult<Dataset> {
        let (completion, receiver) = Completion::channel();
        (self.0)(req, completion);
        wait_for(receiver, "provider").await
    }
}

pub fn before_sync<F>(f: F) -> Arc<dyn BeforeHook>
where
    F: Fn(&ProviderRequest) -> FeatureServerResult<()> + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

pub fn before_async<F, Fut>(f: F) -> Arc<dyn BeforeHook>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FeatureServerResult<()>> + Send + 'static,
{
    Arc::new(AsyncFn(f))
}

pub fn before_callback<F>(f: F) -> Arc<dyn BeforeHook>
where
    F: Fn(&ProviderRequest, Completion<()>) + Send + Sync + 'static,
{
    Arc::new(CallbackFn(f))
}

pub fn after_sync<F>(f: F) -> Arc<dyn AfterHook>
where
    F: Fn(&ProviderRequest, Dataset) -> FeatureServerResult<Dataset> + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

pub fn after_async<F, Fut>(f: F) -> Arc<dyn AfterHook>
where
    F: Fn(ProviderRequest, Dataset) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FeatureServerResult<Dataset>> + Send + 'static,
{
    Arc::new(AsyncFn(f))
}

pub fn after_callback<F>(f: F) -> Arc<dyn AfterHook>
where
    F: Fn(&ProviderRequest, Dataset, Completion<Dataset>) + Send + Sync + 'static,
{
    Arc::new(CallbackFn(f))
}

pub fn data_sync<F>(f: F) -> Arc<dyn DataSource>
where
    F: Fn(&ProviderRequest) -> FeatureServerResult<Dataset> + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

pub fn data_async<F, Fut>(f: F) -> Arc<dyn DataSource>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FeatureServerResult<Dataset>> + Send + 'static,
{
    Arc::new(AsyncFn(f))
}

pub fn data_callback<F>(f: F) -> Arc<dyn DataSource>
where
    F: Fn(&ProviderRequest, Completion<Dataset>) + Send + Sync + 'static,
{
    Arc::new(CallbackFn(f))
}
