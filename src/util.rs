//! Common Types and Limits
//!
//! Index and score types shared by the tournament model, the orchestrators and the matching
//! solver, together with the build limits that bound them. Scores are stored as ten times
//! their face value so that half points stay integral.
//!

use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature="u32_index")] {
        // use u32 to store index, for less memory usage
        pub type PlayerIndex = u32;
        pub type PlayerNum = PlayerIndex;
    } else {
        pub type PlayerIndex = usize;
        pub type PlayerNum = PlayerIndex;
    }
}

/// the vertex index inside the matching solver; orchestrators map player positions onto these
pub type VertexIndex = usize;
pub type VertexNum = VertexIndex;
/// index of a blossom node in the per-graph arena
pub type BlossomIndex = usize;
/// index of a root blossom in the per-graph arena
pub type RootIndex = usize;

pub type RoundIndex = usize;
/// a score scaled by ten, so 1.5 points is stored as 15
pub type Points = u32;
pub type Rating = u32;

/// the largest pairing number supported by a single tournament
pub const MAX_PLAYERS: PlayerIndex = 9999;
/// the largest ten-times score an accumulator may reach
pub const MAX_POINTS: Points = 1998;
pub const MAX_RATING: Rating = 9999;
pub const MAX_ROUNDS: RoundIndex = 99;

/// use Xoshiro256StarStar for deterministic random number generator
pub type DeterministicRng = rand_xoshiro::Xoshiro256StarStar;

/// The number of bits needed to represent `value`, i.e. the position of its highest set bit
/// plus one. Zero needs zero bits.
pub fn bits_to_represent(mut value: usize) -> u32 {
    let mut bits = 0;
    while value > 0 {
        value >>= 1;
        bits += 1;
    }
    bits
}

/// The six configurable point values of a tournament, each stored as ten times the face
/// value. The defaults are the standard FIDE values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSystem {
    pub points_for_win: Points,
    pub points_for_draw: Points,
    pub points_for_loss: Points,
    pub points_for_zero_point_bye: Points,
    pub points_for_forfeit_loss: Points,
    pub points_for_pairing_allocated_bye: Points,
}

impl Default for PointSystem {
    fn default() -> Self {
        Self {
            points_for_win: 10,
            points_for_draw: 5,
            points_for_loss: 0,
            points_for_zero_point_bye: 0,
            points_for_forfeit_loss: 0,
            points_for_pairing_allocated_bye: 10,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn util_bits_to_represent_1() {
        // cargo test util_bits_to_represent_1 -- --nocapture
        assert_eq!(bits_to_represent(0), 0);
        assert_eq!(bits_to_represent(1), 1);
        assert_eq!(bits_to_represent(2), 2);
        assert_eq!(bits_to_represent(3), 2);
        assert_eq!(bits_to_represent(4), 3);
        assert_eq!(bits_to_represent(255), 8);
        assert_eq!(bits_to_represent(256), 9);
    }
}
