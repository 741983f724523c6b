//! The loader capability: a zero-argument operation yielding an eventual unit.
//!
//! Code modules, images and page data are all loaded the same way, so the
//! retry machinery only ever sees a [`UnitLoader`]. Call sites either
//! implement the trait on their own type or adapt a closure with
//! [`loader_fn`].

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Something that can produce a unit on demand.
///
/// # Examples
///
/// ```rust
/// use steadyload_core::unit::UnitLoader;
/// use async_trait::async_trait;
///
/// struct SettingsPage;
///
/// #[async_trait]
/// impl UnitLoader for SettingsPage {
///     type Unit = String;
///     type Error = std::io::Error;
///
///     async fn load(&self) -> Result<String, std::io::Error> {
///         Ok("settings module".to_string())
///     }
///
///     fn label(&self) -> &str {
///         "settings"
///     }
/// }
/// ```
#[async_trait]
pub trait UnitLoader: Send + Sync + 'static {
    /// The loaded unit.
    type Unit: Send + Sync + 'static;

    /// Failure type of a single attempt.
    type Error: StdError + Send + Sync + 'static;

    /// Run one load attempt.
    async fn load(&self) -> Result<Self::Unit, Self::Error>;

    /// Short name used in logs and events.
    fn label(&self) -> &str {
        "unit"
    }
}

/// Closure adapter returned by [`loader_fn`].
pub struct LoaderFn<F> {
    f: F,
    label: String,
}

/// Adapt an async closure into a [`UnitLoader`].
///
/// ```rust
/// use steadyload_core::unit::{UnitLoader, loader_fn};
///
/// # async fn example() {
/// let loader = loader_fn(|| async { Ok::<_, std::io::Error>(7) }).with_label("answer");
/// assert_eq!(loader.load().await.unwrap(), 7);
/// assert_eq!(loader.label(), "answer");
/// # }
/// ```
pub fn loader_fn<F, Fut, T, E>(f: F) -> LoaderFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
{
    LoaderFn {
        f,
        label: "unit".to_string(),
    }
}

impl<F> LoaderFn<F> {
    /// Name this loader for logs and events.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl<F> fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderFn").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F, Fut, T, E> UnitLoader for LoaderFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
{
    type Unit = T;
    type Error = E;

    async fn load(&self) -> Result<T, E> {
        (self.f)().await
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Loads once, then hands out the cached unit.
///
/// Failures are not cached: the next `load` runs the inner loader again.
/// This mirrors a module cache, where a successfully fetched module is never
/// fetched twice but a failed fetch can be repeated.
pub struct CachedLoader<L: UnitLoader> {
    inner: L,
    cell: OnceCell<Arc<L::Unit>>,
}

impl<L: UnitLoader> CachedLoader<L> {
    /// Wrap a loader.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cell: OnceCell::new(),
        }
    }

    /// Whether a unit has been cached.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl<L: UnitLoader> UnitLoader for CachedLoader<L> {
    type Unit = Arc<L::Unit>;
    type Error = L::Error;

    async fn load(&self) -> Result<Arc<L::Unit>, L::Error> {
        self.cell
            .get_or_try_init(|| async { self.inner.load().await.map(Arc::new) })
            .await
            .cloned()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_loader_fn_runs_closure_each_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let loader = loader_fn(move || {
            let counter = Arc::clone(&counter);
            async move { Ok::<_, std::io::Error>(counter.fetch_add(1, Ordering::SeqCst)) }
        });

        assert_eq!(loader.load().await.unwrap(), 0);
        assert_eq!(loader.load().await.unwrap(), 1);
        assert_eq!(loader.label(), "unit");
    }

    #[tokio::test]
    async fn test_cached_loader_loads_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let loader = CachedLoader::new(
            loader_fn(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>("module")
                }
            })
            .with_label("dashboard"),
        );

        assert!(!loader.is_loaded());
        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.label(), "dashboard");
    }

    #[tokio::test]
    async fn test_cached_loader_does_not_cache_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let loader = CachedLoader::new(loader_fn(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(std::io::Error::other("ChunkLoadError"))
                } else {
                    Ok(5)
                }
            }
        }));

        assert!(loader.load().await.is_err());
        assert!(!loader.is_loaded());
        assert_eq!(*loader.load().await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
