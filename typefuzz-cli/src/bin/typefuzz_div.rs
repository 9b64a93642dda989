//! Generate graphs until an operator budget is spent, recording corpus diversity after each one.
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use typefuzz::graph::{GenConfig, GraphGenerator};
use typefuzz::metric::{EdgeDiversity, Metric, OpCoverage};
use typefuzz::ops::builtin;

#[derive(Parser, Debug)]
struct Args {
    /// Limit on the total number of generated operators
    #[arg(short = 'l', long)]
    limit: usize,

    /// Seed of the graph generator
    #[arg(short = 's', long, default_value_t = 42)]
    seed: u64,

    /// Generator configuration as JSON
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Comma-separated operator names to generate from, instead of every built-in operator
    #[arg(long, value_delimiter = ',')]
    ops: Vec<String>,

    /// File receiving one JSON diversity record per graph
    #[arg(short = 'r', long, default_value = "typefuzz-div.jsonl")]
    record: PathBuf,

    /// Directory to write each generated graph into as text
    #[arg(long)]
    dump_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct Record {
    opr_count: usize,
    op_coverage: f64,
    edge_diversity: f64,
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GenConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GenConfig::default(),
    };
    anyhow::ensure!(config.max_opr_num > 0, "max_opr_num must be positive");
    let registry = builtin()?;
    let registry = if args.ops.is_empty() {
        registry
    } else {
        registry.subset(args.ops.as_slice())?
    };
    if let Some(dir) = &args.dump_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut generator = GraphGenerator::seeded(&registry, config, args.seed)?;
    let mut coverage = OpCoverage::new(&registry);
    let mut edges = EdgeDiversity::new(&registry);
    let mut record = BufWriter::new(
        File::create(&args.record)
            .with_context(|| format!("creating {}", args.record.display()))?,
    );

    let mut opr_count = 0;
    let mut index = 0;
    while opr_count < args.limit {
        let graph = generator.generate()?;
        coverage.evaluate(&graph);
        edges.evaluate(&graph);
        opr_count += graph.oprs().len();

        if let Some(dir) = &args.dump_dir {
            std::fs::write(dir.join(format!("{index}.txt")), graph.to_string())?;
        }
        let line = Record {
            opr_count,
            op_coverage: coverage.result(),
            edge_diversity: edges.result(),
        };
        writeln!(record, "{}", serde_json::to_string(&line)?)?;
        if index % 10 == 0 {
            record.flush()?;
        }
        log::info!(
            "{opr_count}/{} operators, coverage {:.4}, edge diversity {:.4}",
            args.limit,
            line.op_coverage,
            line.edge_diversity
        );
        index += 1;
    }
    record.flush()?;

    println!("Operator detail:");
    for (name, count) in coverage.detail() {
        println!("{name}\t{count}");
    }
    println!("Operator coverage: {:.4}", coverage.result());
    println!("Edge diversity: {:.4}", edges.result());
    Ok(())
}
