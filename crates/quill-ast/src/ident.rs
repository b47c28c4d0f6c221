use rand::distr::{Alphanumeric, SampleString};

/// Generator for table aliases, CTE names, and anonymous parameter labels.
///
/// [`IdGen::random`] produces unguessable 8-character alphanumeric tokens.
/// [`IdGen::deterministic`] produces `id0`, `id1`, ... so emitted SQL is
/// byte-stable across runs; constructing a fresh deterministic generator is
/// the reset point. Tokens are unique within one generator; callers that mix
/// generated and user-chosen names keep them apart by prefix (`t_`, `cte_`).
#[derive(Debug)]
pub struct IdGen {
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Random,
    Counter(u64),
}

impl IdGen {
    /// A generator backed by random tokens.
    #[must_use]
    pub const fn random() -> Self {
        Self { mode: Mode::Random }
    }

    /// A generator backed by a monotonic counter starting at `id0`.
    #[must_use]
    pub const fn deterministic() -> Self {
        Self {
            mode: Mode::Counter(0),
        }
    }

    /// Next bare token (`id3` or `x7Kq2mPa`).
    pub fn token(&mut self) -> String {
        match &mut self.mode {
            Mode::Random => Alphanumeric.sample_string(&mut rand::rng(), 8),
            Mode::Counter(n) => {
                let token = format!("id{n}");
                *n += 1;
                token
            }
        }
    }

    /// Next prefixed identifier: `"{prefix}_{token}"`.
    pub fn fresh(&mut self, prefix: &str) -> String {
        format!("{prefix}_{}", self.token())
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::random()
    }
}
