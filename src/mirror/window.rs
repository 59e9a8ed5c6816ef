//! Main-window view model.

use chrono::{DateTime, Utc};

use super::{format_hms, Mirror, MirrorState, MirrorView};

/// View model of the main window (also used by the terminal `watch` view).
#[derive(Debug, Clone, Default)]
pub struct WindowMirror {
    name: String,
    state: MirrorState,
    view: MirrorView,
    renders: u64,
}

impl WindowMirror {
    /// Creates an unsynced window mirror.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The last rendered view.
    pub fn view(&self) -> &MirrorView {
        &self.view
    }

    /// Number of renders so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// One-line text of the last rendered view.
    pub fn headline(&self) -> String {
        if !self.view.is_running {
            return "⏸ 停止中".to_string();
        }
        match self.view.description.as_deref() {
            Some(desc) if !desc.is_empty() => {
                format!("⏱ {} {}", format_hms(self.view.elapsed_seconds), desc)
            }
            _ => format!("⏱ {}", format_hms(self.view.elapsed_seconds)),
        }
    }
}

impl Mirror for WindowMirror {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &MirrorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MirrorState {
        &mut self.state
    }

    fn render(&mut self, now: DateTime<Utc>) {
        self.view = self.state.view(now);
        self.renders += 1;
        tracing::trace!(mirror = %self.name, revision = self.view.revision, "再描画");
    }
}
