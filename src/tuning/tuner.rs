//! The full-search tuner: a restartable state machine walking the
//! enumerated search space, collecting wall-clock samples, and committing
//! to the winner.

use crate::error::{Error, Result};
use crate::options::{SelectorStrategy, TuningStrategyOption};
use crate::tuning::Configuration;
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct TuningOptions {
    pub selector_strategy: SelectorStrategy,
    pub tuning_strategy: TuningStrategyOption,
    /// Iterations between two tuning phases.
    pub tuning_interval: u64,
    /// Wall-clock samples per configuration.
    pub num_samples: usize,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            selector_strategy: SelectorStrategy::FastestAbs,
            tuning_strategy: TuningStrategyOption::FullSearch,
            tuning_interval: 1000,
            num_samples: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Walking the search space, sampling configuration `index`.
    Tuning { index: usize, samples_done: usize },
    /// A winner is committed until the next tuning phase.
    Committed,
}

pub struct Tuner {
    search_space: Vec<Configuration>,
    options: TuningOptions,
    state: State,
    samples: HashMap<Configuration, Vec<u64>>,
    committed: Configuration,
    iterations_since_tune: u64,
}

impl Tuner {
    pub fn new(search_space: Vec<Configuration>, options: TuningOptions) -> Result<Self> {
        if search_space.is_empty() {
            return Err(Error::EmptySearchSpace);
        }
        if options.tuning_strategy != TuningStrategyOption::FullSearch {
            return Err(Error::UnsupportedTuningStrategy(options.tuning_strategy));
        }
        let first = search_space[0];
        Ok(Self {
            search_space,
            options,
            state: State::Tuning {
                index: 0,
                samples_done: 0,
            },
            samples: HashMap::new(),
            committed: first,
            iterations_since_tune: 0,
        })
    }

    pub fn search_space(&self) -> &[Configuration] {
        &self.search_space
    }

    pub fn is_tuning(&self) -> bool {
        matches!(self.state, State::Tuning { .. })
    }

    /// The configuration the next pairwise iteration should use. Restarts
    /// the tuning phase when the interval has elapsed.
    pub fn begin_iteration(&mut self) -> Configuration {
        if self.state == State::Committed
            && self.iterations_since_tune >= self.options.tuning_interval
        {
            log::debug!("tuning interval elapsed, restarting tuning phase");
            self.samples.clear();
            self.state = State::Tuning {
                index: 0,
                samples_done: 0,
            };
        }
        self.current_configuration()
    }

    pub fn current_configuration(&self) -> Configuration {
        match self.state {
            State::Tuning { index, .. } => self.search_space[index],
            State::Committed => self.committed,
        }
    }

    /// Feed one wall-clock sample for the configuration just measured.
    /// Ignored outside a tuning phase (the committed configuration is not
    /// re-measured).
    pub fn record_sample(&mut self, nanos: u64) {
        let State::Tuning {
            index,
            samples_done,
        } = self.state
        else {
            self.iterations_since_tune += 1;
            return;
        };
        let config = self.search_space[index];
        log::trace!("sampled {config}: {nanos} ns");
        self.samples.entry(config).or_default().push(nanos);
        if samples_done + 1 >= self.options.num_samples {
            self.advance(index);
        } else {
            self.state = State::Tuning {
                index,
                samples_done: samples_done + 1,
            };
        }
    }

    /// Mark the current configuration unusable (inapplicable traversal,
    /// failed setup) and move on. It can never win.
    pub fn skip_current(&mut self) {
        if let State::Tuning { index, .. } = self.state {
            let config = self.search_space[index];
            log::debug!("skipping {config}");
            self.samples.entry(config).or_default().push(u64::MAX);
            self.advance(index);
        }
    }

    fn advance(&mut self, index: usize) {
        if index + 1 < self.search_space.len() {
            self.state = State::Tuning {
                index: index + 1,
                samples_done: 0,
            };
        } else {
            self.commit();
        }
    }

    /// Reduce all samples with the selector strategy and commit the
    /// fastest configuration.
    fn commit(&mut self) {
        let mut best_time = u64::MAX;
        let mut best = None;
        for config in &self.search_space {
            let Some(samples) = self.samples.get(config) else {
                continue;
            };
            let time = reduce(samples, self.options.selector_strategy);
            log::debug!("{config}: {time} ns ({})", self.options.selector_strategy);
            if time < best_time {
                best_time = time;
                best = Some(*config);
            }
        }
        // everything skipped: keep the previous commitment rather than
        // wedging; the next phase will retry
        if let Some(best) = best {
            self.committed = best;
            log::debug!("committed configuration {best}");
        }
        self.state = State::Committed;
        self.iterations_since_tune = 0;
        self.samples.clear();
    }
}

fn reduce(samples: &[u64], strategy: SelectorStrategy) -> u64 {
    if samples.iter().any(|&s| s == u64::MAX) {
        // a failed sample poisons the configuration
        return u64::MAX;
    }
    match strategy {
        SelectorStrategy::FastestAbs => samples.iter().copied().min().unwrap_or(u64::MAX),
        SelectorStrategy::FastestMean => {
            (samples.iter().copied().map(u128::from).sum::<u128>() / samples.len() as u128) as u64
        }
        SelectorStrategy::FastestMedian => {
            let mut sorted = samples.to_vec();
            sorted.sort_unstable();
            sorted[sorted.len() / 2]
        }
    }
}
