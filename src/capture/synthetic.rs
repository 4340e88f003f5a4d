//! Synthetic capture source.
//!
//! Generates a deterministic document-style test pattern: a white page on a
//! dark desk, with "text" bands that shift every 50 frames to simulate the
//! operator moving the page. Always honors the requested resolution, which is
//! what lets the resolution-ladder and pipeline tests run without hardware.

use crate::frame::Frame;

const DESK_COLOR: [u8; 3] = [52, 58, 64];
const PAGE_COLOR: [u8; 3] = [245, 243, 238];
const INK_COLOR: [u8; 3] = [40, 40, 48];

/// Frames between simulated scene changes.
const SCENE_PERIOD: u64 = 50;

pub(super) struct SyntheticSource {
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub(super) fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub(super) fn next_frame(&mut self) -> Frame {
        self.frame_count += 1;
        if self.frame_count % SCENE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let (w, h) = (self.width, self.height);
        let mut frame = Frame::filled(w, h, DESK_COLOR);

        // Page occupies the middle 80% of the frame.
        let margin_x = w / 10;
        let margin_y = h / 10;
        for y in margin_y..h.saturating_sub(margin_y) {
            for x in margin_x..w.saturating_sub(margin_x) {
                frame.put_pixel(x as i64, y as i64, PAGE_COLOR);
            }
        }

        // Text bands every 8 rows, phase-shifted by the scene state so
        // consecutive scenes differ visibly.
        let phase = self.scene_state as u32 % 8;
        for y in (margin_y + 2)..h.saturating_sub(margin_y + 2) {
            if (y + phase) % 8 < 2 {
                for x in (margin_x + 4)..w.saturating_sub(margin_x + 4) {
                    frame.put_pixel(x as i64, y as i64, INK_COLOR);
                }
            }
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_requested_size() {
        let mut source = SyntheticSource::new(320, 240);
        assert_eq!(source.next_frame().size(), (320, 240));
    }

    #[test]
    fn scene_changes_over_the_period() {
        let mut source = SyntheticSource::new(64, 64);
        let first = source.next_frame();
        for _ in 0..SCENE_PERIOD {
            source.next_frame();
        }
        let later = source.next_frame();
        assert_ne!(first, later, "scene state must advance across the period");
    }
}
