use log::debug;
use rand::Rng;

use crate::errors::LoadError;

/// Load ids are exactly six decimal digits.
pub const LOAD_ID_MIN: u32 = 100_000;
pub const LOAD_ID_MAX: u32 = 999_999;

/// Generous bound on candidate draws.  The space has 900,000 values and the
/// archive holds a few thousand loads at most, so hitting this means the
/// table is nearly full or something is wrong with the draw.
pub const MAX_ATTEMPTS: u32 = 10_000;

/// The set of load ids already committed to the archive, queried one
/// candidate at a time.  Read-only from the allocator's side; a storage
/// failure must surface as [LoadError::StorageUnavailable], never as a
/// zero count.
pub trait IdentifierSpace {
    fn count_matching(&self, candidate: u32) -> Result<usize, LoadError>;
}

/// Source of candidate load ids.  Split out from the allocator so tests can
/// script a deterministic sequence.
pub trait CandidateDraw {
    fn draw(&mut self) -> u32;
}

/// Uniform draw over an inclusive range of load ids.
pub struct UniformDraw {
    lo: u32,
    hi: u32,
}

impl UniformDraw {
    pub fn new(lo: u32, hi: u32) -> UniformDraw {
        assert!(lo <= hi);
        UniformDraw { lo, hi }
    }

    /// The full six-digit range [100000, 999999].
    pub fn six_digit() -> UniformDraw {
        UniformDraw::new(LOAD_ID_MIN, LOAD_ID_MAX)
    }
}

impl CandidateDraw for UniformDraw {
    fn draw(&mut self) -> u32 {
        rand::thread_rng().gen_range(self.lo..=self.hi)
    }
}

/// Allocates one unused load id per batch run.
///
/// Draws candidates and checks each against the identifier space until one
/// comes back with a zero count.  This is a check-then-act protocol, not a
/// reservation: the UNIQUE constraint on the load registry is the backstop
/// if two runs race between check and commit.
pub struct LoadIdAllocator<D: CandidateDraw> {
    draw: D,
    max_attempts: u32,
}

impl LoadIdAllocator<UniformDraw> {
    pub fn new() -> LoadIdAllocator<UniformDraw> {
        LoadIdAllocator::with_draw(UniformDraw::six_digit(), MAX_ATTEMPTS)
    }
}

impl Default for LoadIdAllocator<UniformDraw> {
    fn default() -> Self {
        LoadIdAllocator::new()
    }
}

impl<D: CandidateDraw> LoadIdAllocator<D> {
    pub fn with_draw(draw: D, max_attempts: u32) -> LoadIdAllocator<D> {
        LoadIdAllocator { draw, max_attempts }
    }

    /// Return a load id confirmed absent from `space` as of the check that
    /// accepted it.  One read query per attempt, no writes.
    ///
    /// Errors with [LoadError::StorageUnavailable] on the first failed query
    /// (connectivity failures are not retried), or with
    /// [LoadError::IdentifierSpaceExhausted] when the attempt bound is hit.
    pub fn allocate(&mut self, space: &dyn IdentifierSpace) -> Result<u32, LoadError> {
        for _ in 0..self.max_attempts {
            let candidate = self.draw.draw();
            match space.count_matching(candidate)? {
                0 => return Ok(candidate),
                n => debug!("load id {} already used by {} rows, drawing again", candidate, n),
            }
        }
        Err(LoadError::IdentifierSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}
