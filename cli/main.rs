#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

// ========================================================================================
//
//                      The command-line front end of cardiorisk
//
// ========================================================================================
//
// Owns the process lifecycle: settings resolution, the shared artifact context,
// and the translation of the form surface (flags, patient files, prompts) into
// `PatientForm` values. All computation lives in the library.

use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process;

use cardiorisk::artifact::ensure_local;
use cardiorisk::config::Settings;
use cardiorisk::context::{Assessment, SharedContext};
use cardiorisk::download::{FetchOutcome, HttpFetcher};
use cardiorisk::form::{CATEGORICAL_FIELDS, CONTINUOUS_FIELDS, FormError, PatientForm};

mod prompt;

const ARTIFACT_HELP: &str = "Artifacts are read from --artifact-dir (default: the working directory). \
A missing artifact is downloaded only when its remote is configured, either in the settings file

    [artifacts]
    model_url = \"https://...\"
    features_url = \"https://...\"

or through the CARDIORISK_MODEL_URL and CARDIORISK_FEATURES_URL environment variables.";

#[derive(Parser)]
#[command(
    name = "cardiorisk",
    version,
    about = "Estimate the five-year cardiovascular risk of a person living with HIV",
    long_about = "Feeds clinical variables into a pre-trained random survival forest and reports \
                  the probability of a cardiovascular event within the horizon, together with \
                  the estimated survival curve."
)]
struct Cli {
    /// Settings file (defaults to ./cardiorisk.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the model and feature-list artifacts
    #[arg(long, global = true, value_name = "DIR")]
    artifact_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download any missing artifacts and report where they are stored
    #[command(after_help = ARTIFACT_HELP)]
    Fetch,
    /// List every form field with its default, range and options
    Fields,
    /// Calculate the risk for one patient described by flags and/or a patient file
    #[command(after_help = ARTIFACT_HELP)]
    Predict(PredictArgs),
    /// Fill in the form interactively, one patient after another
    #[command(after_help = ARTIFACT_HELP)]
    Form(OutputArgs),
}

#[derive(Args)]
struct PredictArgs {
    /// Patient file with `Field = value` entries; flags take precedence over it
    #[arg(long, value_name = "PATH")]
    patient: Option<PathBuf>,

    /// Age in years
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    age: Option<u32>,

    /// CD4 nadir (cells/µL)
    #[arg(long)]
    cd4_nadir: Option<u32>,

    /// CD8 nadir (cells/µL)
    #[arg(long)]
    cd8_nadir: Option<u32>,

    /// CD4/CD8 ratio
    #[arg(long)]
    cd4_cd8_ratio: Option<f64>,

    /// Total cholesterol (mg/dL)
    #[arg(long)]
    cholesterol: Option<f64>,

    /// HDL cholesterol (mg/dL)
    #[arg(long)]
    hdl: Option<f64>,

    /// Triglycerides (mg/dL)
    #[arg(long)]
    triglycerides: Option<f64>,

    /// Non-HDL cholesterol (mg/dL)
    #[arg(long)]
    non_hdl_cholesterol: Option<f64>,

    /// Triglyceride/HDL ratio
    #[arg(long)]
    triglyceride_hdl_ratio: Option<f64>,

    /// Categorical answer as VARIABLE=OPTION, e.g. --select AIDS=Yes (repeatable)
    #[arg(long = "select", value_name = "VARIABLE=OPTION")]
    selections: Vec<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct OutputArgs {
    /// Where to write the survival curve plot
    #[arg(long, default_value = "survival_curve.svg", value_name = "PATH")]
    plot: PathBuf,

    /// Skip writing the plot
    #[arg(long)]
    no_plot: bool,

    /// Also write the curve's (time, survival) points as a TSV table
    #[arg(long, value_name = "PATH")]
    curve_table: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.artifact_dir {
        settings.artifacts.directory = dir;
    }

    match cli.command {
        Commands::Fetch => fetch(&settings),
        Commands::Fields => {
            print_fields();
            Ok(())
        }
        Commands::Predict(args) => {
            // Input is validated before any artifact is touched.
            let form = form_from_args(&args)?;
            let shared = SharedContext::new(settings);
            let context = shared.get_or_load(&HttpFetcher)?;
            let assessment = context.assess(&form)?;
            report(&assessment, &args.output)
        }
        Commands::Form(output) => {
            let shared = SharedContext::new(settings);
            prompt::run(&shared, &output)
        }
    }
}

fn fetch(settings: &Settings) -> Result<(), Box<dyn Error>> {
    let local = ensure_local(&settings.artifacts, &HttpFetcher)?;
    let describe = |outcome: FetchOutcome| match outcome {
        FetchOutcome::AlreadyPresent => "already present",
        FetchOutcome::Downloaded => "downloaded",
    };
    println!(
        "Model:        {} ({})",
        local.model_path.display(),
        describe(local.model)
    );
    println!(
        "Feature list: {} ({})",
        local.features_path.display(),
        describe(local.features)
    );
    Ok(())
}

fn print_fields() {
    println!("Continuous fields:");
    for field in &CONTINUOUS_FIELDS {
        let range = match (field.min, field.max) {
            (Some(min), Some(max)) => format!("[{min}, {max}]"),
            (Some(min), None) => format!(">= {min}"),
            (None, Some(max)) => format!("<= {max}"),
            (None, None) => "any".to_string(),
        };
        let kind = if field.integral { ", whole number" } else { "" };
        println!(
            "  {:<24} default {:<8} range {range}{kind}  ({})",
            field.name, field.default, field.label
        );
    }
    println!();
    println!("Categorical fields (first option is the reference):");
    for field in &CATEGORICAL_FIELDS {
        println!("  {}", field.name);
        for option in field.options {
            println!("    - {option}");
        }
    }
}

fn form_from_args(args: &PredictArgs) -> Result<PatientForm, FormError> {
    let mut form = match &args.patient {
        Some(path) => PatientForm::from_toml_file(path)?,
        None => PatientForm::default(),
    };

    let numbers = [
        ("Age", args.age.map(f64::from)),
        ("CD4_Nadir", args.cd4_nadir.map(f64::from)),
        ("CD8_Nadir", args.cd8_nadir.map(f64::from)),
        ("CD4_CD8_Ratio", args.cd4_cd8_ratio),
        ("Cholesterol", args.cholesterol),
        ("HDL", args.hdl),
        ("Triglycerides", args.triglycerides),
        ("Non_HDL_Cholesterol", args.non_hdl_cholesterol),
        ("Triglyceride_HDL_Ratio", args.triglyceride_hdl_ratio),
    ];
    for (name, value) in numbers {
        if let Some(value) = value {
            form.set_value(name, value)?;
        }
    }

    for selection in &args.selections {
        let (variable, option) = selection
            .split_once('=')
            .ok_or_else(|| FormError::WrongType {
                field: selection.clone(),
                expected: "the form VARIABLE=OPTION",
            })?;
        form.select(variable.trim(), option)?;
    }
    Ok(form)
}

/// Prints the risk first so it is shown even if the plot cannot be written.
fn report(assessment: &Assessment, output: &OutputArgs) -> Result<(), Box<dyn Error>> {
    println!("{}", assessment.estimate);
    if !output.no_plot {
        assessment.plot.write_svg(&output.plot)?;
        println!("Survival curve written to {}", output.plot.display());
    }
    if let Some(table) = output.curve_table.as_deref() {
        assessment.plot.write_table(table)?;
        println!("Survival table written to {}", table.display());
    }
    Ok(())
}
