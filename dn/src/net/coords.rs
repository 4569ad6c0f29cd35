//! Local <-> virtual coordinate frames
//!
//! The wire carries positions with the vertical axis flipped around the
//! negotiated window height, so both peers agree on the values no matter
//! where each one puts its rendering origin.

use crate::message::Position;

/// Local position to the wire frame
pub fn to_virtual(local: Position, height: i32) -> Position {
    Position::new(local.x, height as f32 - local.y)
}

/// Wire frame back to a local position
pub fn from_virtual(virt: Position, height: i32) -> Position {
    Position::new(virt.x, height as f32 - virt.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_flip() {
        let v = to_virtual(Position::new(12.5, 7.25), 40);
        assert_eq!(v, Position::new(12.5, 32.75));
        assert_eq!(from_virtual(v, 40), Position::new(12.5, 7.25));
    }

    proptest! {
        // Positions on a 1/64 grid are exact in f32 for these heights
        #[test]
        fn round_trip_is_identity(h in 1i32..10_000, kx in 0i32..640_000, frac in 0u32..=64) {
            let y = h as f32 * frac as f32 / 64.0;
            let v = Position::new(kx as f32 / 64.0, y);
            prop_assert_eq!(to_virtual(from_virtual(v, h), h), v);
            prop_assert_eq!(from_virtual(to_virtual(v, h), h), v);
        }
    }
}
