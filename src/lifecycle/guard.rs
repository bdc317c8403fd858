//! Acquire-now, release-on-every-exit-path wrapper.

/// A resource with an explicit release step.
pub trait Resource: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    fn release(&mut self) -> Result<(), Self::Error>;
}

/// Owns a resource and releases it exactly once.
///
/// `release` is the normal path; `Drop` covers early returns and unwinding.
pub struct ScopedResource<R: Resource> {
    inner: Option<R>,
}

impl<R: Resource> ScopedResource<R> {
    pub fn new(resource: R) -> Self {
        Self {
            inner: Some(resource),
        }
    }

    pub fn get(&self) -> Option<&R> {
        self.inner.as_ref()
    }

    /// Release now. Later calls and the eventual drop do nothing.
    pub fn release(mut self) -> Result<(), R::Error> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), R::Error> {
        match self.inner.take() {
            Some(mut resource) => {
                tracing::debug!(resource = resource.name(), "Releasing");
                resource.release()
            }
            None => Ok(()),
        }
    }
}

impl<R: Resource> Drop for ScopedResource<R> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(error = %e, "Failed to release resource on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl Resource for Counted {
        type Error = std::io::Error;

        fn name(&self) -> &str {
            "counted"
        }

        fn release(&mut self) -> Result<(), Self::Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn explicit_release_happens_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let guard = ScopedResource::new(Counted(count.clone()));
        guard.release().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let _guard = ScopedResource::new(Counted(count.clone()));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwinding_releases() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = ScopedResource::new(Counted(inner));
            panic!("abort startup");
        });
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
