/// Panel fader: delayed opacity ramps for the dialogue container.
use std::time::Duration;

use crate::core::surface::PresentationSurface;
use crate::core::timing::{Delay, Ramp, TaskStatus};

#[derive(Debug, Clone)]
struct PanelFade {
    delay: Delay,
    ramp: Ramp,
}

/// Fades panel opacity. Starting a fade replaces the one in progress.
#[derive(Debug, Clone, Default)]
pub struct PanelFader {
    active: Option<PanelFade>,
    opacity: f32,
}

impl PanelFader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_fading(&self) -> bool {
        self.active.is_some()
    }

    /// Snap to `opacity` and cancel any fade.
    pub fn set<S>(&mut self, opacity: f32, surface: &mut S)
    where
        S: PresentationSurface + ?Sized,
    {
        self.active = None;
        self.opacity = opacity;
        surface.set_panel_opacity(opacity);
    }

    /// Hold at `from` for `delay`, then ramp to `to` over `duration`.
    pub fn fade<S>(&mut self, from: f32, to: f32, delay: Duration, duration: Duration, surface: &mut S)
    where
        S: PresentationSurface + ?Sized,
    {
        self.opacity = from;
        surface.set_panel_opacity(from);
        self.active = Some(PanelFade {
            delay: Delay::new(delay),
            ramp: Ramp::new(from, to, duration),
        });
    }

    pub fn tick<S>(&mut self, dt: Duration, surface: &mut S) -> TaskStatus
    where
        S: PresentationSurface + ?Sized,
    {
        let Some(fade) = self.active.as_mut() else {
            return TaskStatus::Idle;
        };
        let Some(spill) = fade.delay.consume(dt) else {
            return TaskStatus::Running;
        };

        self.opacity = fade.ramp.advance(spill);
        surface.set_panel_opacity(self.opacity);
        if fade.ramp.is_finished() {
            self.active = None;
            TaskStatus::Complete
        } else {
            TaskStatus::Running
        }
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }
}
