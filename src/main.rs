//! Train the CVD random forest from `data/ess_model_ready.csv`.

use cvd_forest::pipeline::run_training;
use cvd_forest::project::ProjectPaths;
use cvd_forest::{config, logging};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    parse_args(std::env::args().skip(1).collect())?;
    let paths = ProjectPaths::from_manifest_dir();
    match paths.logs_dir() {
        Ok(dir) => {
            if let Err(err) = logging::init(&dir) {
                eprintln!("Logging disabled: {err}");
            }
        }
        Err(err) => eprintln!("Logging disabled: {err}"),
    }

    let config = config::load_or_default(&paths).map_err(|err| err.to_string())?;
    let summary = run_training(&config).map_err(|err| err.to_string())?;

    println!("Accuracy: {:.3}", summary.evaluation.accuracy);
    println!("ROC AUC: {:.3}", summary.evaluation.roc_auc);
    println!("{}", summary.evaluation.report);
    println!("Saved model to {}", summary.model_path.display());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<(), String> {
    match args.first().map(String::as_str) {
        None => Ok(()),
        Some("-h" | "--help") => Err(help_text()),
        Some(unknown) => Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
    }
}

fn help_text() -> String {
    [
        "cvd-forest",
        "",
        "Trains a random forest CVD classifier and saves it to models/rf_cvd.pkl.",
        "",
        "Usage:",
        "  cvd-forest",
        "",
        "Inputs and outputs are relative to the crate directory. Settings may be",
        "overridden in cvd-forest.toml there; RUST_LOG controls log verbosity.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_no_arguments() {
        assert!(parse_args(Vec::new()).is_ok());
    }

    #[test]
    fn help_and_unknown_flags_stop_the_run() {
        let help = parse_args(vec!["--help".into()]).unwrap_err();
        assert!(help.starts_with("cvd-forest"));
        let unknown = parse_args(vec!["--trees".into()]).unwrap_err();
        assert!(unknown.contains("Unknown argument: --trees"));
    }
}
