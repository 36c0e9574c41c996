use anyhow::{Context, Result};
use clap::Parser;
use faultline::cli::{Cli, Command, OutputFormat};
use faultline::collector::{Collector, DirectorySource, HttpSource, JobFilter, MetricsSource};
use faultline::config::PipelineConfig;
use faultline::csv_output::CsvOutput;
use faultline::forest::HyperParameters;
use faultline::output::ModelOutput;
use faultline::pipeline::Pipeline;
use faultline::schema::FeatureSchema;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Print the payload in the requested format
fn print_output(output: &ModelOutput, format: OutputFormat, schema: &FeatureSchema) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", output.to_json()?),
        OutputFormat::Csv => {
            if let Some(error) = &output.error {
                eprintln!("error: {}", error);
            }
            let mut csv = CsvOutput::new(schema.dimension_names());
            for result in output.prediction.iter().flatten() {
                csv.add_result(result.clone());
            }
            print!("{}", csv.to_csv());
        }
    }
    Ok(())
}

/// Execute the subcommand against a metrics source
fn run<S: MetricsSource>(
    source: S,
    schema: FeatureSchema,
    jobs: JobFilter,
    config: PipelineConfig,
    command: Command,
) -> Result<ModelOutput> {
    let mut collector = Collector::new(source, jobs, config.quantile_steps.clone());
    let pipeline = Pipeline::new(schema, config);

    let output = match command {
        Command::Build { params, model } => {
            let params: HyperParameters = match params {
                Some(json) => serde_json::from_str(&json).context("Invalid --params JSON")?,
                None => HyperParameters::default(),
            };
            pipeline.build(&mut collector, &params, &model)
        }
        Command::Predict {
            model,
            medians,
            medians_score,
        } => {
            let medians: HashMap<String, f64> =
                serde_json::from_str(&medians).context("Invalid --medians JSON")?;
            pipeline.predict(&collector, &model, &medians, medians_score)
        }
    };
    Ok(output)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    let schema = FeatureSchema::commit_default()?;
    let jobs = JobFilter {
        start_job: args.start_job_id.clone(),
        last_job: args.last_job_id.clone(),
    };

    let output = match (&args.data, &args.ingest_url, &args.repo_id) {
        (Some(dir), _, _) => run(DirectorySource::new(dir), schema.clone(), jobs, config, args.command)?,
        (None, Some(url), Some(repo_id)) => {
            let source = HttpSource::new(url, repo_id, args.auth.as_deref())?;
            run(source, schema.clone(), jobs, config, args.command)?
        }
        (None, _, _) => {
            anyhow::bail!("Must specify either --data DIR or --ingest-url URL with --repo-id ID");
        }
    };

    print_output(&output, args.format, &schema)
}
