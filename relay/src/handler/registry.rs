use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, RelayResult};
use crate::handler::ChangeHandler;
use crate::relay_error;
use crate::types::ChangeBatch;

/// Creates a fresh handler for a single dispatch.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn ChangeHandler> + Send + Sync>;

/// How a handler is resolved when a batch is dispatched.
#[derive(Clone)]
pub enum HandlerRegistration {
    /// One instance reused for every dispatch.
    Shared(Arc<dyn ChangeHandler>),
    /// A new instance per dispatch, shut down once the batch was handled.
    PerDispatch { name: String, factory: HandlerFactory },
}

impl HandlerRegistration {
    fn name(&self) -> &str {
        match self {
            HandlerRegistration::Shared(handler) => handler.name(),
            HandlerRegistration::PerDispatch { name, .. } => name,
        }
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRegistration::Shared(handler) => {
                f.debug_tuple("Shared").field(&handler.name()).finish()
            }
            HandlerRegistration::PerDispatch { name, .. } => {
                f.debug_tuple("PerDispatch").field(name).finish()
            }
        }
    }
}

/// Collects handler registrations before the pipeline is built.
#[derive(Debug, Default)]
pub struct HandlerRegistryBuilder {
    registrations: Vec<HandlerRegistration>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler that lives as long as the pipeline.
    pub fn shared<H>(self, handler: H) -> Self
    where
        H: ChangeHandler + 'static,
    {
        self.shared_arc(Arc::new(handler))
    }

    pub fn shared_arc(mut self, handler: Arc<dyn ChangeHandler>) -> Self {
        self.registrations.push(HandlerRegistration::Shared(handler));
        self
    }

    /// Registers a factory invoked once per dispatched batch.
    ///
    /// The created handler is shut down right after it handled the batch.
    pub fn per_dispatch<F, H>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: ChangeHandler + 'static,
    {
        let factory: HandlerFactory =
            Arc::new(move || Box::new(factory()) as Box<dyn ChangeHandler>);
        self.registrations.push(HandlerRegistration::PerDispatch {
            name: name.into(),
            factory,
        });
        self
    }

    /// Builds the registry, failing when no handler was registered.
    pub fn build(self) -> RelayResult<HandlerRegistry> {
        if self.registrations.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "No change handler registered",
                "register at least one handler before building the pipeline"
            );
        }

        Ok(HandlerRegistry {
            registrations: self.registrations.into(),
        })
    }
}

/// The ordered, non-empty set of handlers a pipeline dispatches to.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    registrations: Arc<[HandlerRegistration]>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Always `false`, an empty registry cannot be built.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Hands `batch` to every handler in registration order.
    ///
    /// Stops at the first failing handler; later handlers do not see the batch.
    pub async fn dispatch(&self, batch: &ChangeBatch) -> RelayResult<()> {
        for registration in self.registrations.iter() {
            let result = match registration {
                HandlerRegistration::Shared(handler) => handler.handle(batch).await,
                HandlerRegistration::PerDispatch { name, factory } => {
                    let handler = factory();
                    let result = handler.handle(batch).await;
                    if let Err(err) = handler.shutdown().await {
                        warn!(
                            handler = %name,
                            error = %err,
                            "failed to shut down per-dispatch handler"
                        );
                    }
                    result
                }
            };

            if let Err(err) = result {
                return Err(relay_error!(
                    ErrorKind::HandlerFailed,
                    "Change handler failed",
                    format!(
                        "handler `{}` failed on batch {}",
                        registration.name(),
                        batch.batch_id
                    ),
                    source: err
                ));
            }

            debug!(handler = %registration.name(), batch_id = batch.batch_id, "batch handled");
        }

        Ok(())
    }

    /// Shuts down shared handlers. Failures are logged.
    pub async fn release(&self) {
        for registration in self.registrations.iter() {
            if let HandlerRegistration::Shared(handler) = registration {
                if let Err(err) = handler.shutdown().await {
                    warn!(handler = %handler.name(), error = %err, "failed to shut down handler");
                }
            }
        }
    }
}
