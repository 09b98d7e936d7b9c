use std::{fmt::Debug, time::Duration};

use log::info;
use tokio::time::sleep;

use crate::{Context, DistErr, Result};

/// Checks that the group is wired correctly: all reducing the ranks must
/// give `W(W-1)/2` on every rank and the launcher's local rank must be the
/// context's.
///
/// # Arguments
/// * `local_rank` - The local rank the launcher assigned.
/// * `ctx` - The participant's context.
/// * `config` - Anything the caller wants echoed in the logs.
///
/// # Returns
/// The rank sum or `DistErr::Inconsistent` if the group disagrees.
pub async fn check_rank_sum<C: Debug + Send>(
    local_rank: usize,
    mut ctx: Context,
    config: C,
) -> Result<usize> {
    let rank = ctx.rank();
    let world_size = ctx.world_size();

    // Staggered so the log lines come out in rank order.
    sleep(Duration::from_millis(100 * rank as u64)).await;
    info!(
        rank = rank,
        local_rank = local_rank,
        world_size = world_size;
        "config={config:?} backend={} device={}",
        ctx.backend(),
        ctx.device()
    );

    let sum = ctx.all_reduce_scalar(rank as f32).await?;
    let expected = world_size * (world_size - 1) / 2;
    if !rank_sum_matches(sum, expected, world_size) {
        return Err(DistErr::Inconsistent {
            what: "rank sum",
            got: sum.to_string(),
            expected: expected.to_string(),
        });
    }

    if local_rank != ctx.local_rank() {
        return Err(DistErr::Inconsistent {
            what: "local rank",
            got: ctx.local_rank().to_string(),
            expected: local_rank.to_string(),
        });
    }

    Ok(expected)
}

/// Integers up to this one are exact in f32.
const F32_EXACT_LIMIT: f64 = (1u32 << f32::MANTISSA_DIGITS) as f64;

/// Compares the f32 sum of the ranks with `expected`, exactly while f32 can
/// hold it and within one rounding error per rank beyond that.
fn rank_sum_matches(sum: f32, expected: usize, world_size: usize) -> bool {
    let expected = expected as f64;
    let tolerance = if expected <= F32_EXACT_LIMIT {
        0.0
    } else {
        expected * f64::from(f32::EPSILON) * world_size as f64
    };

    (f64::from(sum) - expected).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(world_size: usize) -> f32 {
        (0..world_size).map(|r| r as f32).sum()
    }

    #[test]
    fn small_groups_must_match_exactly() {
        assert!(rank_sum_matches(reduce(4), 6, 4));
        assert!(!rank_sum_matches(5.0, 6, 4));
        assert!(rank_sum_matches(reduce(1), 0, 1));
    }

    #[test]
    fn large_groups_tolerate_f32_rounding() {
        let world_size = 10_000;
        let expected = world_size * (world_size - 1) / 2;
        let sum = reduce(world_size);

        assert!(expected as f64 > F32_EXACT_LIMIT);
        assert!(rank_sum_matches(sum, expected, world_size));
        assert!(!rank_sum_matches(sum * 2.0, expected, world_size));
        assert!(!rank_sum_matches(reduce(world_size / 2), expected, world_size));
    }
}
