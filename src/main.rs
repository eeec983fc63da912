use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use vehicle_trends::{AnalysisConfig, FilterSpec, Metric, QueryError, Workbench};

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: vehicle-trends <sports-file> <epa-file> [config.json]");
    }
    let config = match args.get(2) {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    let wb = Workbench::load(&PathBuf::from(&args[0]), &PathBuf::from(&args[1]), config)
        .context("loading vehicle tables")?;

    println!("== Cleaning ==");
    for report in wb.reports() {
        println!("{report}");
    }

    let spec = FilterSpec::default();

    println!("\n== Yearly aggregates ==");
    match wb.yearly_aggregates(&spec, &Metric::ALL) {
        Ok(aggs) => {
            for agg in &aggs {
                let means: Vec<String> = Metric::ALL
                    .iter()
                    .filter(|m| m.applies_to(agg.market))
                    .map(|m| format!("{m}={}", fmt_opt(agg.mean(*m))))
                    .collect();
                println!("{} {} n={} {}", agg.year, agg.market, agg.count, means.join(" "));
            }
        }
        Err(err) => println!("no aggregates: {err}"),
    }

    println!("\n== Comparison indices ==");
    match wb.comparison_indices(&spec) {
        Ok(series) => {
            for s in &series {
                let base = s
                    .normalized
                    .as_ref()
                    .map_or_else(|| "not normalizable".to_string(), |n| format!("base {}", n.base_year));
                println!("{} [{}] ({base})", s.index, s.market);
                for (year, raw) in &s.raw {
                    let idx = s.normalized.as_ref().and_then(|n| n.value_at(*year));
                    println!("  {year}: {} -> {}", fmt_opt(*raw), fmt_opt(idx));
                }
            }
        }
        Err(err) => println!("no indices: {err}"),
    }

    println!("\n== Segmentation ==");
    match wb.segment(&spec) {
        Ok(seg) => {
            let features: Vec<String> = seg.features.iter().map(ToString::to_string).collect();
            println!(
                "k={} features=[{}] explained=({:.2}, {:.2}) iterations={} converged={} inertia={:.3}",
                seg.k,
                features.join(", "),
                seg.explained_variance[0],
                seg.explained_variance[1],
                seg.iterations,
                seg.converged,
                seg.inertia
            );
            for (cluster, mix) in seg.market_mix() {
                let parts: Vec<String> = mix.iter().map(|(m, n)| format!("{m}={n}")).collect();
                println!("  cluster {cluster}: {}", parts.join(" "));
            }
            for (year, gap) in seg.market_gap_by_year() {
                println!("  {year}: market gap {}", fmt_opt(gap));
            }
        }
        Err(QueryError::InsufficientData { needed, available }) => {
            println!("not enough complete records to cluster ({available} < {needed})")
        }
        Err(err) => println!("segmentation failed: {err}"),
    }

    Ok(())
}
