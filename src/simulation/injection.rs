//! Boundary arrivals.

use crate::config::ArrivalPolicy;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Poisson};

/// Counts the vehicles arriving at one entry cell during step `step` (counted from 1).
///
/// `clock` holds the time of the next Poisson arrival and is advanced past `step`.
/// The work done is the same for any arrival rate.
pub(crate) fn arrivals(
    policy: ArrivalPolicy,
    step: u64,
    rng: &mut ChaCha8Rng,
    clock: &mut Option<f64>,
) -> u32 {
    match policy {
        ArrivalPolicy::Disabled => 0,
        ArrivalPolicy::FixedRate { period } => {
            (period > 0 && step % period as u64 == 0) as u32
        }
        ArrivalPolicy::Bernoulli { probability } => rng.gen_bool(probability) as u32,
        ArrivalPolicy::Poisson { rate } => {
            let Ok(exp) = Exp::new(rate) else {
                return 0;
            };
            let next = clock.get_or_insert_with(|| exp.sample(rng));
            let now = step as f64;
            if *next > now {
                return 0;
            }
            // Arrivals are memoryless, so those after the first are counted in one draw
            let rest = Poisson::new(rate * (now - *next))
                .map(|poisson| poisson.sample(rng))
                .unwrap_or(0.0);
            *next = now + exp.sample(rng);
            1u32.saturating_add(rest as u32)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fixed_rate() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let policy = ArrivalPolicy::FixedRate { period: 3 };
        let counts = (1..=9)
            .map(|step| arrivals(policy, step, &mut rng, &mut None))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![0, 0, 1, 0, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn bernoulli_extremes() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for step in 1..=20 {
            let never = ArrivalPolicy::Bernoulli { probability: 0.0 };
            let always = ArrivalPolicy::Bernoulli { probability: 1.0 };
            assert_eq!(arrivals(never, step, &mut rng, &mut None), 0);
            assert_eq!(arrivals(always, step, &mut rng, &mut None), 1);
        }
    }

    #[test]
    fn poisson_mean_rate() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let policy = ArrivalPolicy::Poisson { rate: 0.5 };
        let mut clock = None;
        let total: u32 = (1..=10_000)
            .map(|step| arrivals(policy, step, &mut rng, &mut clock))
            .sum();
        assert!((4_500..=5_500).contains(&total), "total = {}", total);
        assert!(clock.unwrap() > 10_000.0);
    }

    #[test]
    fn poisson_high_rate_is_counted_at_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let policy = ArrivalPolicy::Poisson { rate: 2e7 };
        let mut clock = None;
        for step in 1..=3 {
            let count = arrivals(policy, step, &mut rng, &mut clock);
            assert!(
                (19_900_000..=20_100_000).contains(&count),
                "count = {}",
                count
            );
            assert!(clock.unwrap() > step as f64);
        }
    }

    #[test]
    fn poisson_is_reproducible() {
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            let mut clock = None;
            (1..=100)
                .map(|step| arrivals(ArrivalPolicy::Poisson { rate: 1.5 }, step, &mut rng, &mut clock))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
