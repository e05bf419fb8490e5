//! Rank-collaborative tuning: splitting the search space, electing the
//! globally best configuration, and bucketing ranks by scenario
//! similarity.

use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::options::{
    ContainerOption, DataLayout, LoadEstimatorOption, Newton3Option, NumberSet, TraversalOption,
};
use crate::tuning::search_space::enumerate_search_space;
use crate::tuning::Configuration;

/// The five allowed option sets plus the cell-size-factor set: the raw
/// configuration surface before enumeration.
#[derive(Debug, Clone)]
pub struct OptionSets {
    pub containers: Vec<ContainerOption>,
    pub cell_size_factors: NumberSet,
    pub traversals: Vec<TraversalOption>,
    pub load_estimators: Vec<LoadEstimatorOption>,
    pub data_layouts: Vec<DataLayout>,
    pub newton3: Vec<Newton3Option>,
}

/// Size of the enumerated search space. Infinite cell-size sets count as
/// one slot.
pub fn search_space_size(options: &OptionSets) -> usize {
    enumerate_search_space(options).len()
}

/// Restrict `options` to the block of the search space this rank handles.
///
/// With at least as many configurations as ranks, the enumerated list is
/// cut into near-equal contiguous blocks. With fewer, ranks share
/// configurations; if the cell-size set is an interval, the sharing ranks
/// subdivide it instead, rank `r` of a block of `b` receiving the `r`-th of
/// `b` equal sub-intervals.
pub fn distribute_configurations(
    options: &mut OptionSets,
    rank: i32,
    comm_size: i32,
) -> Result<()> {
    let configs = enumerate_search_space(options);
    if configs.is_empty() {
        return Err(Error::EmptySearchSpace);
    }
    let num_configs = configs.len();
    let ranks = comm_size.max(1) as usize;
    let rank = (rank.max(0) as usize).min(ranks - 1);

    // indices of the enumerated list assigned to this rank
    let (begin, end, block_size, block_offset) = if num_configs >= ranks {
        let begin = rank * num_configs / ranks;
        let end = (rank + 1) * num_configs / ranks;
        (begin, end, 1, 0)
    } else {
        // several ranks per configuration
        let block_size = ranks.div_ceil(num_configs);
        let config_index = (rank / block_size).min(num_configs - 1);
        (config_index, config_index + 1, block_size, rank % block_size)
    };
    let mine = &configs[begin..end];

    let mut containers: Vec<ContainerOption> = mine.iter().map(|c| c.container).collect();
    containers.sort_unstable();
    containers.dedup();
    let mut traversals: Vec<TraversalOption> = mine.iter().map(|c| c.traversal).collect();
    traversals.sort_unstable();
    traversals.dedup();
    let mut load_estimators: Vec<LoadEstimatorOption> =
        mine.iter().map(|c| c.load_estimator).collect();
    load_estimators.sort_unstable();
    load_estimators.dedup();
    let mut data_layouts: Vec<DataLayout> = mine.iter().map(|c| c.data_layout).collect();
    data_layouts.sort_unstable();
    data_layouts.dedup();
    let mut newton3: Vec<Newton3Option> = mine.iter().map(|c| c.newton3).collect();
    newton3.sort_unstable();
    newton3.dedup();

    options.containers = containers;
    options.traversals = traversals;
    options.load_estimators = load_estimators;
    options.data_layouts = data_layouts;
    options.newton3 = newton3;

    options.cell_size_factors = match &options.cell_size_factors {
        NumberSet::Interval { min, max } => {
            let delta = (max - min) / block_size as f64;
            NumberSet::Interval {
                min: min + delta * block_offset as f64,
                max: min + delta * (block_offset + 1) as f64,
            }
        }
        NumberSet::Finite(_) => {
            let mut values: Vec<f64> = mine.iter().map(|c| c.cell_size_factor).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            NumberSet::Finite(values)
        }
    };

    log::debug!(
        "rank {rank}: {} containers, {} cellSizeFactors, {} traversals, {} dataLayouts, {} newton3s after distribution",
        options.containers.len(),
        options.cell_size_factors.size(),
        options.traversals.len(),
        options.data_layouts.len(),
        options.newton3.len(),
    );
    Ok(())
}

/// Two-step all-reduce: agree on the global minimum time, then broadcast
/// the winning configuration from the lowest rank that achieved it.
pub fn optimize_configuration(
    comm: &dyn Communicator,
    local_optimal: Configuration,
    local_time: u64,
) -> Result<Configuration> {
    let mut record = local_optimal.serialize();

    let global_time = comm.all_reduce_min_u64(local_time)?;
    // candidates send their rank, everyone else something above all ranks
    let candidate = if local_time == global_time {
        comm.rank()
    } else {
        comm.size()
    };
    let winner = comm.all_reduce_min_i32(candidate)?;
    comm.broadcast_record(&mut record, winner)?;

    let optimal = Configuration::deserialize(&record)?;
    log::debug!("globally optimal configuration: {optimal}");
    Ok(optimal)
}

/// Similarity metric over the local particle distribution.
pub fn similarity_metric(homogeneity: f64, max_density: f64, density_weight: f64) -> f64 {
    homogeneity + density_weight * max_density
}

/// Group ranks with similar scenarios into bucket communicators: gather
/// all similarity metrics, sort, and open a new bucket wherever the
/// relative jump between neighbours exceeds the threshold.
pub fn distribute_ranks_in_buckets(
    comm: &dyn Communicator,
    similarity: f64,
    max_relative_difference: f64,
) -> Result<Box<dyn Communicator>> {
    let mut metrics = comm.all_gather_f64(similarity)?;
    metrics.sort_by(f64::total_cmp);

    let mut bucket_of_metric = vec![0i32; metrics.len()];
    let mut bucket = 0i32;
    for i in 1..metrics.len() {
        let difference = (metrics[i] - metrics[i - 1]) / metrics[i];
        if difference > max_relative_difference {
            bucket += 1;
        }
        bucket_of_metric[i] = bucket;
    }

    let my_bucket = metrics
        .iter()
        .position(|&m| m == similarity)
        .map(|i| bucket_of_metric[i])
        .unwrap_or(0);
    log::debug!(
        "rank {} has similarity {similarity}, bucket {my_bucket}",
        comm.rank()
    );
    comm.split(my_bucket, comm.rank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleRank;
    use crate::tuning::search_space::full_option_sets;

    fn interval_options() -> OptionSets {
        OptionSets {
            containers: vec![ContainerOption::VerletClusterLists],
            cell_size_factors: NumberSet::interval(0.8, 1.2),
            traversals: vec![TraversalOption::VclClusterIteration],
            load_estimators: vec![LoadEstimatorOption::None],
            data_layouts: vec![DataLayout::Aos],
            newton3: vec![Newton3Option::Disabled],
        }
    }

    #[test]
    fn test_distribute_finite_non_empty_everywhere() {
        for comm_size in [1, 2, 7, 64] {
            for rank in 0..comm_size {
                let mut options = full_option_sets();
                options.cell_size_factors = NumberSet::finite(vec![0.9, 1.0, 1.1]);
                distribute_configurations(&mut options, rank, comm_size).unwrap();
                assert!(!options.containers.is_empty(), "rank {rank}/{comm_size}");
                assert!(!options.traversals.is_empty());
                assert!(!options.data_layouts.is_empty());
                assert!(!options.newton3.is_empty());
                assert!(!options.cell_size_factors.is_empty());
            }
        }
    }

    #[test]
    fn test_distribute_covers_whole_space() {
        // the union of all rank blocks is the full enumeration
        let full = enumerate_search_space(&full_option_sets());
        let comm_size = 5;
        let mut union = std::collections::HashSet::new();
        for rank in 0..comm_size {
            let mut options = full_option_sets();
            distribute_configurations(&mut options, rank, comm_size).unwrap();
            for config in enumerate_search_space(&options) {
                union.insert(config);
            }
        }
        for config in full {
            assert!(union.contains(&config), "{config} lost in distribution");
        }
    }

    #[test]
    fn test_distribute_interval_subdivides() {
        // one configuration, R ranks: rank r gets [0.8 + r*0.4/R, ...]
        let comm_size = 4;
        for rank in 0..comm_size {
            let mut options = interval_options();
            distribute_configurations(&mut options, rank, comm_size).unwrap();
            let expected_min = 0.8 + (0.4 / comm_size as f64) * rank as f64;
            let expected_max = 0.8 + (0.4 / comm_size as f64) * (rank + 1) as f64;
            assert!((options.cell_size_factors.min() - expected_min).abs() < 1e-12);
            assert!((options.cell_size_factors.max() - expected_max).abs() < 1e-12);
        }
    }

    #[test]
    fn test_distribute_rejects_empty_space() {
        let mut options = interval_options();
        options.traversals = vec![TraversalOption::LcC01]; // incompatible
        assert!(matches!(
            distribute_configurations(&mut options, 0, 1),
            Err(Error::EmptySearchSpace)
        ));
    }

    #[test]
    fn test_optimize_single_rank_returns_local() {
        let config = Configuration::new(
            ContainerOption::DirectSum,
            1.0,
            TraversalOption::DsSequential,
            LoadEstimatorOption::None,
            DataLayout::Aos,
            Newton3Option::Enabled,
        );
        let optimal = optimize_configuration(&SingleRank, config, 1234).unwrap();
        assert_eq!(optimal, config);
    }

    #[test]
    fn test_bucket_split_single_rank() {
        let bucket = distribute_ranks_in_buckets(&SingleRank, 0.7, 0.1).unwrap();
        assert_eq!(bucket.size(), 1);
    }

    #[test]
    fn test_similarity_metric() {
        assert_eq!(similarity_metric(0.5, 2.0, 0.25), 1.0);
    }
}
