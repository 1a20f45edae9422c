//! Fixed-window moving-average filter.
//!
//! The window always holds exactly `width` samples. It starts out filled with
//! zeros, so the first `width - 1` outputs average real samples against the
//! zero padding and read low. Downstream plots and reports depend on that
//! start-up shape; keep it.
//!
//! ```
//! use sensor_link::filter::FilterWindow;
//!
//! let mut window = FilterWindow::new(3).unwrap();
//! assert_eq!(window.push(6.0), 2.0);
//! assert_eq!(window.push(6.0), 4.0);
//! assert_eq!(window.push(6.0), 6.0);
//! ```

use crate::error::{LinkError, LinkResult};
use std::collections::VecDeque;

/// Default window width used by the polling controller.
pub const DEFAULT_WIDTH: usize = 3;

/// Moving average over the last `width` raw samples, zero-seeded.
#[derive(Debug, Clone)]
pub struct FilterWindow {
    width: usize,
    buffer: VecDeque<f64>,
}

impl FilterWindow {
    /// Create a zero-filled window.
    ///
    /// # Errors
    /// `LinkError::InvalidWindow` when `width` is zero.
    pub fn new(width: usize) -> LinkResult<Self> {
        if width == 0 {
            return Err(LinkError::InvalidWindow(width));
        }
        Ok(Self {
            width,
            buffer: std::iter::repeat(0.0).take(width).collect(),
        })
    }

    /// Shift `raw` in, drop the oldest sample, return the new average.
    pub fn push(&mut self, raw: f64) -> f64 {
        self.buffer.pop_front();
        self.buffer.push_back(raw);
        self.average()
    }

    /// Arithmetic mean of the current window contents.
    pub fn average(&self) -> f64 {
        self.buffer.iter().sum::<f64>() / self.width as f64
    }

    /// Window width `W`, fixed at construction.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Current window contents, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().copied()
    }

    /// Refill the window with zeros.
    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = 0.0);
    }

    /// Replace every element of `samples` with its filtered value.
    ///
    /// The window is reset before the run and again afterwards, so each call
    /// shows the same zero-padded start-up and leaves no state behind.
    /// Returns the last filtered value, or `None` for an empty slice.
    pub fn filter_in_place(&mut self, samples: &mut [f64]) -> Option<f64> {
        self.reset();
        let mut last = None;
        for sample in samples.iter_mut() {
            *sample = self.push(*sample);
            last = Some(*sample);
        }
        self.reset();
        last
    }
}

impl Default for FilterWindow {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            buffer: std::iter::repeat(0.0).take(DEFAULT_WIDTH).collect(),
        }
    }
}
