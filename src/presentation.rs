use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::PresentationError;

/// Environment hooks for fullscreen and native picture-in-picture.
///
/// Unrelated to [`crate::types::ViewMode::PictureInPicture`], which is a page
/// layout; this is the platform's floating video window.
pub trait PresentationHost: Send + Sync {
    fn is_fullscreen(&self) -> bool;
    /// Fullscreen always targets the container holding every video surface.
    fn request_fullscreen(&self) -> Result<(), PresentationError>;
    fn exit_fullscreen(&self) -> Result<(), PresentationError>;

    /// Surface currently shown in the native PiP window, if any
    fn picture_in_picture_surface(&self) -> Option<String>;
    fn request_picture_in_picture(&self, surface_id: &str) -> Result<(), PresentationError>;
    fn exit_picture_in_picture(&self) -> Result<(), PresentationError>;
}

/// Enter or leave fullscreen. Failures are logged and dropped.
pub fn toggle_fullscreen(host: &dyn PresentationHost) {
    let result = if host.is_fullscreen() {
        debug!("🖥️ Leaving fullscreen");
        host.exit_fullscreen()
    } else {
        debug!("🖥️ Entering fullscreen");
        host.request_fullscreen()
    };

    if let Err(e) = result {
        warn!("Fullscreen toggle failed: {}", e);
    }
}

/// Enter or leave native picture-in-picture for one surface. Failures are
/// logged and dropped.
pub fn toggle_picture_in_picture(host: &dyn PresentationHost, surface_id: &str) {
    let result = match host.picture_in_picture_surface() {
        Some(current) if current == surface_id => {
            debug!("🪟 Leaving picture-in-picture for {}", surface_id);
            host.exit_picture_in_picture()
        }
        _ => {
            debug!("🪟 Entering picture-in-picture for {}", surface_id);
            host.request_picture_in_picture(surface_id)
        }
    };

    if let Err(e) = result {
        warn!("Picture-in-picture toggle for {} failed: {}", surface_id, e);
    }
}

/// What the page currently presents outside its own layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationState {
    pub fullscreen: bool,
    pub pip_surface: Option<String>,
}

/// Presentation state a visit keeps on behalf of its page. Only the visit's
/// own video surfaces may go into the native PiP window.
pub struct VisitPresentation {
    surfaces: Vec<String>,
    state: Mutex<PresentationState>,
}

impl VisitPresentation {
    pub fn new(surfaces: Vec<String>) -> Self {
        Self {
            surfaces,
            state: Mutex::new(PresentationState::default()),
        }
    }

    pub fn snapshot(&self) -> PresentationState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update<F>(&self, change: F) -> Result<(), PresentationError>
    where
        F: FnOnce(&mut PresentationState) -> Result<(), PresentationError>,
    {
        change(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl PresentationHost for VisitPresentation {
    fn is_fullscreen(&self) -> bool {
        self.snapshot().fullscreen
    }

    fn request_fullscreen(&self) -> Result<(), PresentationError> {
        self.update(|state| {
            state.fullscreen = true;
            Ok(())
        })
    }

    fn exit_fullscreen(&self) -> Result<(), PresentationError> {
        self.update(|state| {
            if !state.fullscreen {
                return Err(PresentationError::Rejected("not in fullscreen".to_string()));
            }
            state.fullscreen = false;
            Ok(())
        })
    }

    fn picture_in_picture_surface(&self) -> Option<String> {
        self.snapshot().pip_surface
    }

    fn request_picture_in_picture(&self, surface_id: &str) -> Result<(), PresentationError> {
        if !self.surfaces.iter().any(|surface| surface == surface_id) {
            return Err(PresentationError::PictureInPictureUnavailable);
        }
        self.update(|state| {
            state.pip_surface = Some(surface_id.to_string());
            Ok(())
        })
    }

    fn exit_picture_in_picture(&self) -> Result<(), PresentationError> {
        self.update(|state| match state.pip_surface.take() {
            Some(_) => Ok(()),
            None => Err(PresentationError::Rejected(
                "no picture-in-picture window open".to_string(),
            )),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Host double that records requests and can be told to refuse them
    #[derive(Default)]
    pub struct FakeHost {
        pub fullscreen: Mutex<bool>,
        pub pip_surface: Mutex<Option<String>>,
        pub refuse: Mutex<Option<PresentationError>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn outcome(&self) -> Result<(), PresentationError> {
            match self.refuse.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    impl PresentationHost for FakeHost {
        fn is_fullscreen(&self) -> bool {
            *self.fullscreen.lock().unwrap()
        }

        fn request_fullscreen(&self) -> Result<(), PresentationError> {
            self.requests.lock().unwrap().push("fullscreen".to_string());
            self.outcome()?;
            *self.fullscreen.lock().unwrap() = true;
            Ok(())
        }

        fn exit_fullscreen(&self) -> Result<(), PresentationError> {
            self.requests.lock().unwrap().push("exit_fullscreen".to_string());
            self.outcome()?;
            *self.fullscreen.lock().unwrap() = false;
            Ok(())
        }

        fn picture_in_picture_surface(&self) -> Option<String> {
            self.pip_surface.lock().unwrap().clone()
        }

        fn request_picture_in_picture(&self, surface_id: &str) -> Result<(), PresentationError> {
            self.requests.lock().unwrap().push(format!("pip:{}", surface_id));
            self.outcome()?;
            *self.pip_surface.lock().unwrap() = Some(surface_id.to_string());
            Ok(())
        }

        fn exit_picture_in_picture(&self) -> Result<(), PresentationError> {
            self.requests.lock().unwrap().push("exit_pip".to_string());
            self.outcome()?;
            *self.pip_surface.lock().unwrap() = None;
            Ok(())
        }
    }

    #[test]
    fn test_fullscreen_toggles_both_ways() {
        let host = FakeHost::default();

        toggle_fullscreen(&host);
        assert!(host.is_fullscreen());

        toggle_fullscreen(&host);
        assert!(!host.is_fullscreen());
        assert_eq!(*host.requests.lock().unwrap(), vec!["fullscreen", "exit_fullscreen"]);
    }

    #[test]
    fn test_pip_switches_between_surfaces() {
        let host = FakeHost::default();

        toggle_picture_in_picture(&host, "front");
        assert_eq!(host.picture_in_picture_surface().as_deref(), Some("front"));

        // another surface replaces the current one rather than closing it
        toggle_picture_in_picture(&host, "rear");
        assert_eq!(host.picture_in_picture_surface().as_deref(), Some("rear"));

        toggle_picture_in_picture(&host, "rear");
        assert_eq!(host.picture_in_picture_surface(), None);
    }

    #[test]
    fn test_visit_presentation_tracks_toggles() {
        let host = VisitPresentation::new(vec!["v-front".to_string(), "v-rear".to_string()]);

        toggle_fullscreen(&host);
        toggle_picture_in_picture(&host, "v-rear");
        assert_eq!(
            host.snapshot(),
            PresentationState {
                fullscreen: true,
                pip_surface: Some("v-rear".to_string()),
            }
        );

        toggle_picture_in_picture(&host, "v-rear");
        toggle_fullscreen(&host);
        assert_eq!(host.snapshot(), PresentationState::default());
    }

    #[test]
    fn test_visit_presentation_refuses_foreign_surface() {
        let host = VisitPresentation::new(vec!["v-front".to_string()]);

        assert_eq!(
            host.request_picture_in_picture("elsewhere"),
            Err(PresentationError::PictureInPictureUnavailable)
        );
        assert!(host.exit_picture_in_picture().is_err());
        assert!(host.exit_fullscreen().is_err());

        toggle_picture_in_picture(&host, "elsewhere");
        assert_eq!(host.snapshot(), PresentationState::default());
    }

    #[test]
    fn test_failures_are_swallowed() {
        let host = FakeHost::default();
        *host.refuse.lock().unwrap() = Some(PresentationError::PictureInPictureUnavailable);

        toggle_picture_in_picture(&host, "front");
        toggle_fullscreen(&host);

        assert_eq!(host.picture_in_picture_surface(), None);
        assert!(!host.is_fullscreen());
        assert_eq!(host.requests.lock().unwrap().len(), 2);
    }
}
