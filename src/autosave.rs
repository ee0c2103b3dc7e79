use std::time::{Duration, Instant};

use crate::path::VaultPath;

/// A save waiting for its debounce delay to pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub path: VaultPath,
    pub content: String,
    pub due: Instant,
}

/// Debounced auto-save. Each keystroke replaces the pending save and restarts
/// the delay; switching notes flushes whatever is pending.
#[derive(Debug)]
pub struct AutoSave {
    delay: Duration,
    pending: Option<PendingSave>,
}

impl AutoSave {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn pending(&self) -> Option<&PendingSave> {
        self.pending.as_ref()
    }

    /// Schedules `content` to be saved after the delay, superseding any pending save.
    ///
    /// A pending save for a different note is returned so it can be written now.
    pub fn schedule(&mut self, path: &VaultPath, content: &str, now: Instant) -> Option<PendingSave> {
        let superseded = self.pending.take().filter(|pending| &pending.path != path);
        self.pending = Some(PendingSave {
            path: path.clone(),
            content: content.to_string(),
            due: now + self.delay,
        });
        superseded
    }

    /// Takes the pending save if its delay has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<PendingSave> {
        if self.pending.as_ref().is_some_and(|pending| pending.due <= now) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Takes the pending save regardless of its deadline.
    pub fn flush(&mut self) -> Option<PendingSave> {
        self.pending.take()
    }

    /// Drops the pending save if it targets `path` or something under it.
    pub fn cancel_for(&mut self, path: &VaultPath) -> Option<PendingSave> {
        if self.pending.as_ref().is_some_and(|pending| pending.path.starts_with(path)) {
            self.pending.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> VaultPath {
        VaultPath::parse(raw).unwrap()
    }

    #[test]
    fn save_fires_after_delay() {
        let mut autosave = AutoSave::new(Duration::from_millis(750));
        let start = Instant::now();
        autosave.schedule(&p("a.md"), "x", start);

        assert!(autosave.poll(start + Duration::from_millis(500)).is_none());
        let due = autosave.poll(start + Duration::from_millis(750)).unwrap();
        assert_eq!(due.content, "x");
        assert!(autosave.pending().is_none());
    }

    #[test]
    fn new_keystroke_restarts_delay() {
        let mut autosave = AutoSave::new(Duration::from_millis(750));
        let start = Instant::now();
        autosave.schedule(&p("a.md"), "x", start);
        assert!(autosave.schedule(&p("a.md"), "xy", start + Duration::from_millis(500)).is_none());

        assert!(autosave.poll(start + Duration::from_millis(800)).is_none());
        let due = autosave.poll(start + Duration::from_millis(1250)).unwrap();
        assert_eq!(due.content, "xy");
    }

    #[test]
    fn switching_note_hands_back_previous_save() {
        let mut autosave = AutoSave::new(Duration::from_millis(750));
        let now = Instant::now();
        autosave.schedule(&p("a.md"), "a", now);
        let superseded = autosave.schedule(&p("b.md"), "b", now).unwrap();
        assert_eq!(superseded.path, p("a.md"));
        assert_eq!(autosave.flush().unwrap().path, p("b.md"));
    }

    #[test]
    fn cancel_for_directory() {
        let mut autosave = AutoSave::new(Duration::from_millis(10));
        autosave.schedule(&p("dir/a.md"), "a", Instant::now());
        assert!(autosave.cancel_for(&p("other")).is_none());
        assert!(autosave.cancel_for(&p("dir")).is_some());
        assert!(autosave.flush().is_none());
    }
}
