//! Finger extension and named-gesture classification.
//!
//! A finger counts as extended only when both hold:
//! - its joints sit at strictly increasing distance from the wrist, base
//!   through tip, and
//! - the angle at the middle joint (rays toward tip and base) clears the
//!   straightness threshold.
//!
//! Named gestures are exact raised-finger sets; anything else is unnamed.

use crate::detect::{FingerName, HandLandmarks};
use crate::geometry::angle_at;
use crate::GestureTag;

/// Minimum middle-joint angle, in degrees, for a straight finger.
pub const STRAIGHTNESS_THRESHOLD_DEG: f32 = 150.0;

pub fn finger_extended(hand: &HandLandmarks, finger: FingerName) -> bool {
    let wrist = hand.wrist();
    let [base, proximal, distal, tip] = hand.finger_joints(finger);

    let mut previous = wrist.distance(&base);
    for joint in [proximal, distal, tip] {
        let d = wrist.distance(&joint);
        if d <= previous {
            return false;
        }
        previous = d;
    }

    angle_at(proximal, tip, base) > STRAIGHTNESS_THRESHOLD_DEG
}

/// Extension flags in thumb, index, middle, ring, pinky order.
pub fn extended_fingers(hand: &HandLandmarks) -> [bool; 5] {
    let mut flags = [false; 5];
    for (i, finger) in FingerName::ALL.into_iter().enumerate() {
        flags[i] = finger_extended(hand, finger);
    }
    flags
}

pub fn finger_count(hand: &HandLandmarks) -> u8 {
    extended_fingers(hand).iter().filter(|&&f| f).count() as u8
}

/// Exact-set gesture match over raised fingers.
pub fn recognize_gesture(extended: &[bool; 5]) -> Option<GestureTag> {
    match extended {
        [false, false, false, false, false] => Some(GestureTag::Fist),
        [true, false, false, false, false] => Some(GestureTag::ThumbsUp),
        [false, true, false, false, false] => Some(GestureTag::Point),
        [false, true, true, false, false] => Some(GestureTag::Peace),
        [true, true, true, true, true] => Some(GestureTag::OpenPalm),
        _ => None,
    }
}

/// Majority vote over the last `window` finger counts of one object.
/// Smooths single-frame classification noise without delaying a sustained
/// change by more than window/2 frames. A window of 1 reports raw counts.
#[derive(Clone, Debug)]
pub struct FingerSmoother {
    window: usize,
    recent: std::collections::VecDeque<u8>,
}

impl FingerSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            recent: std::collections::VecDeque::new(),
        }
    }

    /// Push a raw count and return the smoothed value. Ties go to the most
    /// recent count.
    pub fn push(&mut self, count: u8) -> u8 {
        while self.recent.len() >= self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(count);

        let mut best = count;
        let mut best_votes = 0;
        for candidate in self.recent.iter().rev() {
            let votes = self.recent.iter().filter(|c| *c == candidate).count();
            if votes > best_votes {
                best_votes = votes;
                best = *candidate;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::synthetic::hand_landmarks;
    use crate::geometry::Point;

    fn center() -> Point {
        Point::new(0.5, 0.5)
    }

    #[test]
    fn counts_three_raised_fingers() {
        // Thumb, index, middle raised.
        let hand = hand_landmarks(center(), [true, true, true, false, false]);
        assert_eq!(finger_count(&hand), 3);
        let flags = extended_fingers(&hand);
        assert_eq!(flags, [true, true, true, false, false]);
    }

    #[test]
    fn fist_has_zero_extended_fingers() {
        let hand = hand_landmarks(center(), [false; 5]);
        assert_eq!(finger_count(&hand), 0);
    }

    #[test]
    fn gesture_sets_are_exact() {
        assert_eq!(
            recognize_gesture(&[false, true, true, false, false]),
            Some(GestureTag::Peace)
        );
        assert_eq!(recognize_gesture(&[true; 5]), Some(GestureTag::OpenPalm));
        assert_eq!(recognize_gesture(&[false; 5]), Some(GestureTag::Fist));
        // Peace plus ring is not peace, nor anything else.
        assert_eq!(recognize_gesture(&[false, true, true, true, false]), None);
    }

    #[test]
    fn bent_finger_is_not_extended_even_if_monotonic() {
        // Joints move away from the wrist but kink at the proximal joint.
        let mut hand = hand_landmarks(center(), [false, true, false, false, false]);
        let [_, proximal, _, _] = hand.finger_joints(crate::detect::FingerName::Index);
        // Push distal and tip sideways: distances still grow, angle collapses.
        hand.points[7] = Point::new(proximal.x + 0.08, proximal.y);
        hand.points[8] = Point::new(proximal.x + 0.10, proximal.y + 0.04);
        assert!(!finger_extended(&hand, crate::detect::FingerName::Index));
    }

    #[test]
    fn smoother_suppresses_single_frame_noise() {
        let mut s = FingerSmoother::new(3);
        assert_eq!(s.push(3), 3);
        assert_eq!(s.push(3), 3);
        assert_eq!(s.push(2), 3); // lone flicker outvoted
        assert_eq!(s.push(2), 2); // sustained change wins
    }

    #[test]
    fn window_of_one_reports_raw_counts() {
        let mut s = FingerSmoother::new(1);
        assert_eq!(s.push(3), 3);
        assert_eq!(s.push(1), 1);
        assert_eq!(s.push(4), 4);
    }
}
