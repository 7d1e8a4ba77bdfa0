//! Scripted in-memory kernels for tests.
//!
//! [`MockKernel`] answers each submitted block from a script keyed by the
//! exact source text, and records every session event in a shared
//! [`MockLog`] so tests can check ordering, isolation and teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kernel::{KernelProvider, LanguageInfo, Session, SessionInfo, new_instance_id};
use crate::payload::Payload;

/// What a mock session does when given a block.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Reply with these payloads.
    Outputs(Vec<Payload>),
    /// The session collapses.
    Crash(String),
    /// The round-trip never completes within the timeout.
    Hang,
}

/// One recorded session event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Started { kernel: String, instance: String },
    Executed { instance: String, code: String },
    LanguageQueried { instance: String },
    WidgetsQueried { instance: String },
    ShutDown { instance: String },
}

/// Shared record of session events.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Vec<MockEvent>>>);

impl MockLog {
    fn push(&self, event: MockEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Source text of every executed block, in submission order.
    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Executed { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn started(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Started { .. }))
    }

    pub fn shut_down(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::ShutDown { .. }))
    }

    fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// A scripted kernel.
#[derive(Debug, Clone)]
pub struct MockKernel {
    name: String,
    language: LanguageInfo,
    script: HashMap<String, MockResponse>,
    widget_state: Option<serde_json::Value>,
    unavailable: bool,
}

impl MockKernel {
    /// A Python-flavoured kernel without widget support.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: LanguageInfo {
                name: "python".to_string(),
                file_extension: ".py".to_string(),
                pygments_lexer: Some("ipython3".to_string()),
                widgets: false,
            },
            script: HashMap::new(),
            widget_state: None,
            unavailable: false,
        }
    }

    pub fn with_language(mut self, language: LanguageInfo) -> Self {
        self.language = language;
        self
    }

    /// Reply to `code` with `outputs`.
    pub fn on(mut self, code: impl Into<String>, outputs: Vec<Payload>) -> Self {
        self.script.insert(code.into(), MockResponse::Outputs(outputs));
        self
    }

    pub fn on_response(mut self, code: impl Into<String>, response: MockResponse) -> Self {
        self.script.insert(code.into(), response);
        self
    }

    /// Report widget support and this aggregate state.
    pub fn with_widget_state(mut self, state: serde_json::Value) -> Self {
        self.language.widgets = true;
        self.widget_state = Some(state);
        self
    }

    /// Refuse to start, as if the executable were missing.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

/// Provider over a fixed set of mock kernels.
#[derive(Debug, Clone, Default)]
pub struct MockKernelProvider {
    kernels: HashMap<String, MockKernel>,
    log: MockLog,
}

impl MockKernelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, kernel: MockKernel) -> Self {
        self.kernels.insert(kernel.name.clone(), kernel);
        self
    }

    pub fn log(&self) -> &MockLog {
        &self.log
    }
}

impl KernelProvider for MockKernelProvider {
    fn has_kernel(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }

    fn kernel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.kernels.keys().cloned().collect();
        names.sort();
        names
    }

    fn start(&self, name: &str) -> Result<Box<dyn Session>> {
        let kernel = self
            .kernels
            .get(name)
            .ok_or_else(|| Error::KernelNotFound(name.to_string()))?;
        if kernel.unavailable {
            return Err(Error::SessionUnavailable {
                kernel: name.to_string(),
                message: "mock kernel is unavailable".to_string(),
            });
        }
        let info = SessionInfo {
            kernel: name.to_string(),
            instance_id: new_instance_id(),
            display_name: name.to_string(),
            language: kernel.language.name.clone(),
        };
        self.log.push(MockEvent::Started {
            kernel: name.to_string(),
            instance: info.instance_id.clone(),
        });
        Ok(Box::new(MockSession {
            info,
            kernel: kernel.clone(),
            log: self.log.clone(),
            closed: false,
            shut_down: false,
        }))
    }
}

struct MockSession {
    info: SessionInfo,
    kernel: MockKernel,
    log: MockLog,
    closed: bool,
    shut_down: bool,
}

impl MockSession {
    fn instance(&self) -> String {
        self.info.instance_id.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ExecutionFailed("mock session is closed".to_string()));
        }
        Ok(())
    }
}

impl Session for MockSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn execute(&mut self, code: &str, timeout: Option<Duration>) -> Result<Vec<Payload>> {
        self.ensure_open()?;
        self.log.push(MockEvent::Executed {
            instance: self.instance(),
            code: code.to_string(),
        });
        match self.kernel.script.get(code).cloned() {
            None => Ok(Vec::new()),
            Some(MockResponse::Outputs(outputs)) => Ok(outputs),
            Some(MockResponse::Crash(message)) => {
                self.closed = true;
                Err(Error::ExecutionFailed(message))
            }
            Some(MockResponse::Hang) => {
                self.closed = true;
                Err(Error::Timeout(timeout.unwrap_or(Duration::MAX)))
            }
        }
    }

    fn language_info(&mut self) -> Result<LanguageInfo> {
        self.ensure_open()?;
        self.log.push(MockEvent::LanguageQueried {
            instance: self.instance(),
        });
        Ok(self.kernel.language.clone())
    }

    fn widget_state(&mut self) -> Result<Option<serde_json::Value>> {
        self.ensure_open()?;
        self.log.push(MockEvent::WidgetsQueried {
            instance: self.instance(),
        });
        Ok(self.kernel.widget_state.clone())
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.shut_down {
            self.shut_down = true;
            self.log.push(MockEvent::ShutDown {
                instance: self.instance(),
            });
        }
        self.closed = true;
        Ok(())
    }
}
