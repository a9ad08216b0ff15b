/// Audio crossfader: fade out, swap clip, fade back in.
use std::time::Duration;
use thiserror::Error;

use crate::core::surface::PresentationSurface;
use crate::core::timing::{Ramp, TaskStatus};
use crate::schema::asset::{AssetCategory, AssetHandle, AssetProvider};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("music track not found: {0}")]
    TrackNotFound(String),
}

/// What a `change_track` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadeOutcome {
    /// A crossfade is now in flight, replacing any earlier one.
    Started,
    /// The track is already playing or already being faded in.
    AlreadyPlaying,
}

#[derive(Debug, Clone)]
enum Stage {
    FadingOut {
        ramp: Ramp,
        next: AssetHandle,
        fade: Duration,
    },
    FadingIn { ramp: Ramp },
}

/// Owns the single music channel of a session.
#[derive(Debug, Clone)]
pub struct AudioCrossfader {
    volume: f32,
    // Volume to return to after a fade, captured before the first
    // fade-out of an uninterrupted sequence.
    rest_volume: f32,
    current: Option<String>,
    pending: Option<String>,
    stage: Option<Stage>,
    fade: Duration,
}

impl AudioCrossfader {
    pub fn new(volume: f32, fade: Duration) -> Self {
        Self {
            volume,
            rest_volume: volume,
            current: None,
            pending: None,
            stage: None,
            fade,
        }
    }

    /// Id of the track audible now (the outgoing one during a fade-out).
    pub fn current_track(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The track that will be playing once any in-flight fade settles.
    pub fn target_track(&self) -> Option<&str> {
        self.pending.as_deref().or(self.current.as_deref())
    }

    pub fn is_fading(&self) -> bool {
        self.stage.is_some()
    }

    /// Crossfade to `track_id` using the default fade duration.
    pub fn change_track<S>(
        &mut self,
        track_id: &str,
        assets: &dyn AssetProvider,
        surface: &mut S,
    ) -> Result<CrossfadeOutcome, AudioError>
    where
        S: PresentationSurface + ?Sized,
    {
        self.change_track_with(track_id, self.fade, assets, surface)
    }

    /// Crossfade to `track_id` over `fade` per ramp.
    ///
    /// An unresolvable track leaves the current one playing untouched.
    /// Supersedes any crossfade already in flight.
    pub fn change_track_with<S>(
        &mut self,
        track_id: &str,
        fade: Duration,
        assets: &dyn AssetProvider,
        surface: &mut S,
    ) -> Result<CrossfadeOutcome, AudioError>
    where
        S: PresentationSurface + ?Sized,
    {
        if self.target_track() == Some(track_id) {
            return Ok(CrossfadeOutcome::AlreadyPlaying);
        }
        if self.current.as_deref() == Some(track_id) {
            // Changed our mind mid fade-out: bring the same clip back up.
            self.pending = None;
            self.stage = Some(Stage::FadingIn {
                ramp: Ramp::new(self.volume, self.rest_volume, fade),
            });
            return Ok(CrossfadeOutcome::Started);
        }
        let clip = assets
            .resolve(AssetCategory::Music, track_id)
            .ok_or_else(|| AudioError::TrackNotFound(track_id.to_string()))?;

        if self.stage.is_none() {
            self.rest_volume = self.volume;
        }
        self.pending = Some(track_id.to_string());

        if self.current.is_none() {
            // Silence has nothing to fade out of.
            self.swap(clip, fade, surface);
        } else {
            self.stage = Some(Stage::FadingOut {
                ramp: Ramp::new(self.volume, 0.0, fade),
                next: clip,
                fade,
            });
        }
        Ok(CrossfadeOutcome::Started)
    }

    fn swap<S>(&mut self, clip: AssetHandle, fade: Duration, surface: &mut S)
    where
        S: PresentationSurface + ?Sized,
    {
        self.volume = 0.0;
        surface.set_volume(0.0);
        surface.play_clip(&clip, true);
        self.current = self.pending.take();
        self.stage = Some(Stage::FadingIn {
            ramp: Ramp::new(0.0, self.rest_volume, fade),
        });
    }

    pub fn tick<S>(&mut self, dt: Duration, surface: &mut S) -> TaskStatus
    where
        S: PresentationSurface + ?Sized,
    {
        match self.stage.take() {
            None => TaskStatus::Idle,
            Some(Stage::FadingOut {
                mut ramp,
                next,
                fade,
            }) => {
                self.volume = ramp.advance(dt);
                surface.set_volume(self.volume);
                if ramp.is_finished() {
                    self.swap(next, fade, surface);
                } else {
                    self.stage = Some(Stage::FadingOut { ramp, next, fade });
                }
                TaskStatus::Running
            }
            Some(Stage::FadingIn { mut ramp }) => {
                self.volume = ramp.advance(dt);
                surface.set_volume(self.volume);
                if ramp.is_finished() {
                    TaskStatus::Complete
                } else {
                    self.stage = Some(Stage::FadingIn { ramp });
                    TaskStatus::Running
                }
            }
        }
    }
}
