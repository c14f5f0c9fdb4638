/// Deterministic xorshift32 generator.
///
/// Formulas calling `random()` and grid jitter get the same sequence for the same seed, so tiles
/// look identical every time they are rendered.
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Creates a generator. Zero is not a valid xorshift state and is replaced by a constant.
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    /// Generator for a lattice cell.
    pub fn for_cell(i: i64, j: i64) -> Self {
        let hash = (i as u32).wrapping_mul(73_856_093) ^ (j as u32).wrapping_mul(19_349_663);
        let mut rng = Self::new(hash);
        // Neighbouring seeds produce correlated first values.
        rng.next_u32();
        rng.next_u32();
        rng
    }

    /// Next value of the sequence.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }
}
