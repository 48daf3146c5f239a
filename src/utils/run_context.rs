use jiff::Zoned;
use rand::Rng;

/// Per-run logging context: a short random run id and the run's start
/// timestamp.  Passed explicitly into the pipeline; every row of the batch
/// gets the same creation timestamp from here.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: String,
    pub started: Zoned,
}

impl RunContext {
    pub fn new() -> RunContext {
        let mut rng = rand::thread_rng();
        let run_id: String = (0..8)
            .map(|_| char::from_digit(rng.gen_range(0u32..16), 16).unwrap())
            .collect();
        RunContext {
            run_id,
            started: Zoned::now(),
        }
    }

    /// Creation timestamp for the batch, formatted for the TIMESTAMP column.
    pub fn created_ts(&self) -> String {
        self.started.strftime("%Y-%m-%d %H:%M:%S").to_string()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        RunContext::new()
    }
}
