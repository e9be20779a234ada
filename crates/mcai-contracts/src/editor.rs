use std::thread;
use std::time::{Duration, Instant};

use crate::error::McaiError;

pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(18);
pub const LOCATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const CODE_TAB_LABELS: &[&str] = &["javascript", "typescript", "text"];
pub const BLOCKS_TAB_LABEL: &str = "blocks";
pub const EDITOR_NOT_FOUND: &str = "Monaco not found. Open the project editor, not the home page.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    pub const START: Self = Self { line: 1, column: 1 };
}

/// What the page overlay needs from the host code editor.
pub trait EditorGateway {
    type Model;

    fn locate_model(&mut self, timeout: Duration) -> Result<Self::Model, McaiError>;
    fn get_text(&self, model: &Self::Model) -> String;
    fn set_text(&mut self, model: &Self::Model, text: &str);
    fn set_cursor(&mut self, model: &Self::Model, position: CursorPosition);
    fn switch_tab(&mut self, label: &str) -> bool;
}

/// Polls `probe` until it yields a model or `timeout` elapses.
pub fn locate_with_poll<M>(
    timeout: Duration,
    interval: Duration,
    mut probe: impl FnMut() -> Option<M>,
) -> Result<M, McaiError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(model) = probe() {
            return Ok(model);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(McaiError::EditorNotFound(EDITOR_NOT_FOUND.to_string()));
        }
        thread::sleep(interval.min(deadline - now));
    }
}

/// Paste/revert sequencing on top of an [`EditorGateway`].
///
/// Every paste pushes the replaced text so it can be restored with `revert`.
pub struct EditorSession<G: EditorGateway> {
    gateway: G,
    undo: Vec<String>,
    locate_timeout: Duration,
}

impl<G: EditorGateway> EditorSession<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            undo: Vec::new(),
            locate_timeout: DEFAULT_LOCATE_TIMEOUT,
        }
    }

    pub fn with_locate_timeout(mut self, timeout: Duration) -> Self {
        self.locate_timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn can_revert(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn read_current_code(&mut self) -> Result<String, McaiError> {
        let model = self.gateway.locate_model(self.locate_timeout)?;
        Ok(self.gateway.get_text(&model))
    }

    pub fn paste(&mut self, code: &str) -> Result<(), McaiError> {
        let model = self.gateway.locate_model(self.locate_timeout)?;
        self.switch_to_code_tab();
        self.undo.push(self.gateway.get_text(&model));
        self.replace_text(&model, code);
        Ok(())
    }

    pub fn revert(&mut self) -> Result<(), McaiError> {
        let model = self.gateway.locate_model(self.locate_timeout)?;
        let previous = self.undo.pop().ok_or(McaiError::NothingToRevert)?;
        self.switch_to_code_tab();
        self.replace_text(&model, &previous);
        Ok(())
    }

    fn switch_to_code_tab(&mut self) -> bool {
        CODE_TAB_LABELS
            .iter()
            .any(|label| self.gateway.switch_tab(label))
    }

    fn replace_text(&mut self, model: &G::Model, text: &str) {
        self.gateway.set_text(model, text);
        self.gateway.set_cursor(model, CursorPosition::START);
        self.gateway.switch_tab(BLOCKS_TAB_LABEL);
    }
}
