// Test utilities shared by unit tests and integration tests.

use rand::SeedableRng;
use rand::rngs::StdRng;


// Dice and room ids are random; fix the seed to keep tests reproducible.
pub fn deterministic_rng() -> StdRng { StdRng::seed_from_u64(0) }
