// Quick single-run report for development iteration: builds an index over
// random points and prints the cluster count at every zoom.
//
// Usage: cluster_quick [points] [seed]

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use viewcluster::{Bounds, ClusterOptions, PointFeature, Supercluster};

fn main() {
    let mut args = std::env::args().skip(1);
    let count: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);

    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<PointFeature<u32>> = (0..count)
        .map(|i| PointFeature::new(rng.gen_range(-180.0..180.0), rng.gen_range(-85.0..85.0), i as u32))
        .collect();
    let points: Arc<[PointFeature<u32>]> = Arc::from(points);

    let options: ClusterOptions<u32, u64> = ClusterOptions::default()
        .with_map(Arc::new(|p: &u32| *p as u64))
        .with_reduce(Arc::new(|acc: &mut u64, v: &u64| *acc += *v));

    println!("Building index over {} points (seed {})...", count, seed);
    let start = Instant::now();
    let index = match Supercluster::new(points, options) {
        Ok(index) => index,
        Err(err) => {
            eprintln!("build failed: {}", err);
            std::process::exit(1);
        }
    };
    println!("  built in {:?}", start.elapsed());

    println!("\n=== clusters per zoom ===");
    for zoom in 0..=17 {
        let start = Instant::now();
        let clusters = index.get_clusters(&Bounds::world(), zoom);
        let elapsed = start.elapsed();
        let aggregated = clusters.iter().filter(|c| c.is_cluster()).count();
        println!(
            "  z{:<2} {:>8} features ({:>7} clusters) in {:?}",
            zoom,
            clusters.len(),
            aggregated,
            elapsed
        );
    }
}
