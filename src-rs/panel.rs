use crate::error::Result;
use crate::ports::{Key, Ui};
use crate::session::Session;
use std::ops::{Deref, DerefMut};
use tracing::{info, warn};

/// Holds an item detail panel open. The panel is closed with Escape on every
/// exit path: explicit `close`, early return, or error propagation.
pub struct PanelGuard<'a, U: Ui> {
    session: &'a mut Session<U>,
    closed: bool,
}

impl<'a, U: Ui> PanelGuard<'a, U> {
    pub fn new(session: &'a mut Session<U>) -> Self {
        PanelGuard {
            session,
            closed: false,
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("pressing escape to exit item view");
        self.session.pause(300);
        self.session.press(Key::Escape)
    }
}

impl<U: Ui> Deref for PanelGuard<'_, U> {
    type Target = Session<U>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<U: Ui> DerefMut for PanelGuard<'_, U> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<U: Ui> Drop for PanelGuard<'_, U> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close item view: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarehouseError;
    use crate::testing::{test_config, FakeUi, World};

    fn failing_step<U: Ui>(session: &mut Session<U>) -> Result<()> {
        let _panel = PanelGuard::new(session);
        Err(WarehouseError::ExtractionFailure("no text".into()))
    }

    #[test]
    fn escape_is_pressed_once_on_explicit_close() {
        let mut session = Session::new(FakeUi::new(World::default()), test_config());
        {
            let mut panel = PanelGuard::new(&mut session);
            panel.close().unwrap();
        }
        assert_eq!(session.ui().escapes, 1);
    }

    #[test]
    fn escape_is_pressed_on_error_path() {
        let mut session = Session::new(FakeUi::new(World::default()), test_config());
        assert!(failing_step(&mut session).is_err());
        assert_eq!(session.ui().escapes, 1);
    }
}
