//! Sequential notebook execution against one live session.

use std::ops::{Deref, DerefMut};

use crate::document::CodeBlock;
use crate::error::{Error, Result};
use crate::kernel::{KernelProvider, LanguageInfo, Session, SessionInfo};
use crate::naming::UnitIdentity;
use crate::payload::BlockResult;

use super::context::{ExecuteOptions, ExecutionCallback};

/// What the session reported about itself after the last block.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub session: SessionInfo,
    pub language: LanguageInfo,
    /// Aggregate widget state; `None` without widget support.
    pub widget_state: Option<serde_json::Value>,
}

/// Results of running one notebook, one per block, in block order.
#[derive(Debug, Clone)]
pub struct UnitExecution {
    pub metadata: SessionMetadata,
    pub results: Vec<BlockResult>,
}

/// Owns a session for the duration of one notebook.
///
/// The session is shut down when the guard is dropped, whichever way the
/// notebook run ends. [`finish`](Self::finish) does the same but reports
/// shutdown failures.
struct SessionGuard {
    session: Box<dyn Session>,
    released: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    fn finish(mut self) -> Result<()> {
        self.released = true;
        self.session.shutdown()
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.session.shutdown() {
            tracing::warn!("Failed to shut down kernel '{}': {}", self.session.info().kernel, e);
        }
    }
}

/// Runs notebooks: one fresh session each, blocks strictly in order.
pub struct Orchestrator<P> {
    provider: P,
    options: ExecuteOptions,
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl<P: KernelProvider> Orchestrator<P> {
    pub fn new(provider: P, options: ExecuteOptions) -> Self {
        Self {
            provider,
            options,
            callback: None,
        }
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> ExecuteOptions {
        self.options
    }

    /// Run `blocks` in a new session of `identity.kernel`.
    ///
    /// Exceptions raised by block code are part of that block's result. Any
    /// other failure aborts the notebook and is returned attributed to it;
    /// the session is shut down in every case.
    pub fn execute(&self, identity: &UnitIdentity, blocks: &[CodeBlock]) -> Result<UnitExecution> {
        let unit = identity.name.as_str();
        let session = self
            .provider
            .start(&identity.kernel)
            .map_err(|e| e.in_unit(unit, None))?;
        let mut session = SessionGuard::new(session);

        tracing::info!(
            "Executing notebook '{}' ({} blocks, kernel {}, instance {})",
            unit,
            blocks.len(),
            identity.kernel,
            session.info().instance_id
        );
        if let Some(ref callback) = self.callback {
            callback.on_unit_started(unit, &identity.kernel, blocks.len());
        }

        let mut results = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            if let Some(ref callback) = self.callback {
                callback.on_block_started(unit, index);
            }
            tracing::debug!("Running block {} of '{}'", index + 1, unit);

            let payloads = match session.execute(&block.source, self.options.timeout) {
                Ok(payloads) => payloads,
                Err(e) => {
                    if let Some(ref callback) = self.callback {
                        callback.on_block_error(unit, index, &e);
                    }
                    return Err(e.in_unit(unit, Some(index)));
                }
            };
            let result = BlockResult::new(payloads);
            let raised = result.error().is_some();
            if let Some(ref callback) = self.callback {
                callback.on_block_completed(unit, index, raised);
            }
            results.push(result);

            if raised && !self.options.allow_errors {
                let skipped = blocks.len() - index - 1;
                tracing::warn!(
                    "Block {} of '{}' raised; skipping the remaining {} block(s)",
                    index + 1,
                    unit,
                    skipped
                );
                results.extend(std::iter::repeat_with(BlockResult::empty).take(skipped));
                break;
            }
        }

        let metadata = Self::query_metadata(&mut *session).map_err(|e| e.in_unit(unit, None))?;
        session.finish().map_err(|e| e.in_unit(unit, None))?;

        if let Some(ref callback) = self.callback {
            callback.on_unit_completed(unit);
        }
        Ok(UnitExecution { metadata, results })
    }

    fn query_metadata(session: &mut dyn Session) -> Result<SessionMetadata> {
        let language = session.language_info()?;
        let widget_state = if language.widgets {
            session.widget_state()?
        } else {
            None
        };
        Ok(SessionMetadata {
            session: session.info().clone(),
            language,
            widget_state,
        })
    }
}

impl<P> std::fmt::Debug for Orchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Check that every kernel name can be started before anything runs.
pub fn check_kernels<'a>(
    provider: &impl KernelProvider,
    kernels: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    for kernel in kernels {
        if !provider.has_kernel(kernel) {
            return Err(Error::KernelNotFound(kernel.to_string()));
        }
    }
    Ok(())
}
