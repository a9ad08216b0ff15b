/// Typewriter effect: reveals a line a few characters per tick.
use std::time::Duration;

use crate::core::surface::PresentationSurface;
use crate::core::timing::TaskStatus;

/// Identifies one typing run. A new `start` invalidates older handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypingHandle(u64);

#[derive(Debug, Clone)]
struct Reveal {
    handle: TypingHandle,
    text: String,
    // Byte offsets of every char boundary after the first, plus the end.
    boundaries: Vec<usize>,
    shown: usize,
    since_last: Duration,
}

impl Reveal {
    fn visible(&self) -> &str {
        match self.shown {
            0 => "",
            n => &self.text[..self.boundaries[n - 1]],
        }
    }

    fn is_done(&self) -> bool {
        self.shown >= self.boundaries.len()
    }
}

/// Reveals text on a fixed interval. Only one reveal is ever active.
#[derive(Debug, Clone)]
pub struct Typewriter {
    interval: Duration,
    chars_per_tick: usize,
    active: Option<Reveal>,
    next_handle: u64,
}

impl Typewriter {
    pub fn new(interval: Duration, chars_per_tick: usize) -> Self {
        Self {
            interval,
            chars_per_tick: chars_per_tick.max(1),
            active: None,
            next_handle: 0,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.active.is_some()
    }

    /// The handle of the reveal in flight, if any.
    pub fn current(&self) -> Option<TypingHandle> {
        self.active.as_ref().map(|r| r.handle)
    }

    /// Begin revealing `text`, cancelling any reveal already running.
    ///
    /// Returns the new handle and `Complete` when `text` is empty (nothing
    /// to reveal), otherwise `Running`.
    pub fn start<S>(&mut self, text: &str, surface: &mut S) -> (TypingHandle, TaskStatus)
    where
        S: PresentationSurface + ?Sized,
    {
        self.cancel();
        let handle = TypingHandle(self.next_handle);
        self.next_handle += 1;

        surface.set_text("");
        if text.is_empty() {
            return (handle, TaskStatus::Complete);
        }

        let boundaries = text
            .char_indices()
            .skip(1)
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        self.active = Some(Reveal {
            handle,
            text: text.to_string(),
            boundaries,
            shown: 0,
            since_last: Duration::ZERO,
        });
        (handle, TaskStatus::Running)
    }

    /// Advance the reveal clock by `dt`, pushing partial text as it grows.
    pub fn tick<S>(&mut self, dt: Duration, surface: &mut S) -> TaskStatus
    where
        S: PresentationSurface + ?Sized,
    {
        let Some(reveal) = self.active.as_mut() else {
            return TaskStatus::Idle;
        };

        reveal.since_last = reveal.since_last.saturating_add(dt);
        let steps = if self.interval.is_zero() {
            usize::MAX
        } else {
            let elapsed = reveal.since_last.as_nanos();
            let interval = self.interval.as_nanos();
            let rest = elapsed % interval;
            reveal.since_last = Duration::new(
                (rest / 1_000_000_000) as u64,
                (rest % 1_000_000_000) as u32,
            );
            usize::try_from(elapsed / interval).unwrap_or(usize::MAX)
        };

        if steps > 0 {
            let grow = steps.saturating_mul(self.chars_per_tick);
            reveal.shown = reveal.shown.saturating_add(grow).min(reveal.boundaries.len());
            surface.set_text(reveal.visible());
        }

        if reveal.is_done() {
            self.active = None;
            TaskStatus::Complete
        } else {
            TaskStatus::Running
        }
    }

    /// Show the whole line at once and finish the reveal.
    ///
    /// Returns `Idle` if nothing was typing, which makes repeated skips
    /// harmless.
    pub fn skip<S>(&mut self, surface: &mut S) -> TaskStatus
    where
        S: PresentationSurface + ?Sized,
    {
        match self.active.take() {
            Some(reveal) => {
                surface.set_text(&reveal.text);
                TaskStatus::Complete
            }
            None => TaskStatus::Idle,
        }
    }

    /// Drop the active reveal without touching the surface.
    pub fn cancel(&mut self) {
        self.active = None;
    }
}

impl Default for Typewriter {
    fn default() -> Self {
        Self::new(Duration::from_millis(30), 1)
    }
}
